use crate::error::{Result, StoreError};
use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Handles mentioned as `@handle` anywhere in `path`, unique, in the order
/// they were first seen. With `first_only`, only the first mention on each
/// line counts (the post author column of a post collection file).
pub fn read_query_handles(path: &Path, first_only: bool) -> Result<Vec<String>> {
    let mention = Regex::new(r"@([A-Za-z0-9_]+)")?;
    let file = File::open(path).map_err(|e| StoreError::io(path, e))?;
    let mut seen = HashSet::new();
    let mut handles = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        for capture in mention.captures_iter(&line) {
            let handle = &capture[1];
            if seen.insert(handle.to_string()) {
                handles.push(handle.to_string());
            }
            if first_only {
                break;
            }
        }
    }
    Ok(handles)
}
