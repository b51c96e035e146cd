//! Node and post collection files.
//!
//! Comma-separated, one record per row, preceded by a `#`-prefixed header
//! naming each column. Every record kind declares its columns and how each one
//! is encoded; a row with the wrong number of columns is rejected.

use crate::error::{Result, StoreError};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use nucoll_client::{Tweet, UserObject};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Nodes collected by `init`.
pub const DAT_EXT: &str = "dat";
/// Posts collected by `tweets`, also read back as a handle source.
pub const QUERY_EXT: &str = "qry";

pub trait Record: Sized {
    const COLUMNS: &'static [&'static str];

    fn encode(&self) -> Vec<String>;
    fn decode(fields: &[&str]) -> std::result::Result<Self, String>;
}

/// `<dir>/<name>.<ext>`
pub fn collection_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, ext))
}

fn clean(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn parse<T: FromStr>(fields: &[&str], index: usize, column: &str) -> std::result::Result<T, String> {
    fields[index]
        .trim()
        .parse()
        .map_err(|_| format!("column {} has invalid value '{}'", column, fields[index]))
}

impl Record for UserObject {
    const COLUMNS: &'static [&'static str] = &[
        "ID",
        "ScreenName",
        "Protected",
        "Verified",
        "FriendsCount",
        "FollowersCount",
        "ListedCount",
        "StatusesCount",
        "CreatedAt",
        "URL",
        "ProfileImageURL",
        "Location",
        "Relation",
        "Subject",
    ];

    fn encode(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            clean(&self.screen_name),
            self.protected.to_string(),
            self.verified.to_string(),
            self.friends_count.to_string(),
            self.followers_count.to_string(),
            self.listed_count.to_string(),
            self.statuses_count.to_string(),
            clean(&self.created_at),
            clean(&self.url),
            clean(&self.profile_image_url),
            clean(&self.location),
            clean(&self.relation),
            clean(&self.subject),
        ]
    }

    fn decode(fields: &[&str]) -> std::result::Result<Self, String> {
        let c = Self::COLUMNS;
        Ok(UserObject {
            id: parse(fields, 0, c[0])?,
            screen_name: fields[1].to_string(),
            protected: parse(fields, 2, c[2])?,
            verified: parse(fields, 3, c[3])?,
            friends_count: parse(fields, 4, c[4])?,
            followers_count: parse(fields, 5, c[5])?,
            listed_count: parse(fields, 6, c[6])?,
            statuses_count: parse(fields, 7, c[7])?,
            created_at: fields[8].to_string(),
            url: fields[9].to_string(),
            profile_image_url: fields[10].to_string(),
            location: fields[11].to_string(),
            relation: fields[12].to_string(),
            subject: fields[13].to_string(),
        })
    }
}

impl Record for Tweet {
    const COLUMNS: &'static [&'static str] = &[
        "CreatedAt",
        "ID",
        "User",
        "Text",
        "InReplyToTweet",
        "InReplyToUser",
        "InReplyToScreenName",
        "RetweetCount",
        "FavoriteCount",
    ];

    fn encode(&self) -> Vec<String> {
        vec![
            clean(&self.created_at),
            self.id.to_string(),
            format!("@{}", clean(&self.user.screen_name)),
            clean(&self.text),
            self.in_reply_to_tweet.to_string(),
            self.in_reply_to_user.to_string(),
            clean(&self.in_reply_to_screen_name),
            self.retweet_count.to_string(),
            self.favorite_count.to_string(),
        ]
    }

    fn decode(fields: &[&str]) -> std::result::Result<Self, String> {
        let c = Self::COLUMNS;
        Ok(Tweet {
            created_at: fields[0].to_string(),
            id: parse(fields, 1, c[1])?,
            user: nucoll_client::model::TweetUser {
                screen_name: fields[2].trim_start_matches('@').to_string(),
            },
            text: fields[3].to_string(),
            in_reply_to_tweet: parse(fields, 4, c[4])?,
            in_reply_to_user: parse(fields, 5, c[5])?,
            in_reply_to_screen_name: fields[6].to_string(),
            retweet_count: parse(fields, 7, c[7])?,
            favorite_count: parse(fields, 8, c[8])?,
        })
    }
}

/// Write `records` to `path`. A fresh file (or `append == false`) starts with
/// the header row; appending to an existing file adds rows only.
pub fn write_records<R: Record>(path: &Path, records: &[R], append: bool) -> Result<()> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)
    } else {
        File::create(path)
    }
    .map_err(|e| StoreError::io(path, e))?;

    let needs_header = file.metadata().map_err(|e| StoreError::io(path, e))?.len() == 0;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    if needs_header {
        let header: Vec<String> = R::COLUMNS
            .iter()
            .enumerate()
            .map(|(i, c)| if i == 0 { format!("#{}", c) } else { c.to_string() })
            .collect();
        writer
            .write_record(&header)
            .map_err(|e| StoreError::csv(path, e))?;
    }
    for record in records {
        writer
            .write_record(record.encode())
            .map_err(|e| StoreError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Read every record of `path`, skipping `#` comment rows.
pub fn read_records<R: Record>(path: &Path) -> Result<Vec<R>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| StoreError::csv(path, e))?;

    let mut records = Vec::new();
    let mut row = StringRecord::new();
    loop {
        match reader.read_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {}
            Err(e) => return Err(StoreError::csv(path, e)),
        }
        if row.get(0).is_some_and(|first| first.starts_with('#')) {
            continue;
        }
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let fields: Vec<&str> = row.iter().collect();

        if fields.len() != R::COLUMNS.len() {
            return Err(StoreError::Format {
                path: path.to_path_buf(),
                line,
                message: format!(
                    "expected {} columns, found {}",
                    R::COLUMNS.len(),
                    fields.len()
                ),
            });
        }
        let record = R::decode(&fields).map_err(|message| StoreError::Format {
            path: path.to_path_buf(),
            line,
            message,
        })?;
        records.push(record);
    }
    Ok(records)
}
