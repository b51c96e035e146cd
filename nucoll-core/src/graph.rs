//! Graph assembly from collected nodes and adjacency records, and GML output.

use crate::adjacency::AdjacencyStore;
use crate::error::{Result, StoreError};
use nucoll_client::UserObject;
use nucoll_client::model::digits_only;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const GML_EXT: &str = "gml";

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub user: UserObject,
    /// Whether an adjacency record exists for this node.
    pub processed: bool,
}

/// Directed "follows" graph keyed by account ID.
#[derive(Debug, Default)]
pub struct SocialGraph {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<u64, NodeIndex>,
}

impl SocialGraph {
    fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let id = node.user.id;
        let idx = self.graph.add_node(node);
        self.index.insert(id, idx);
        idx
    }

    fn add_edge(&mut self, source: NodeIndex, target: NodeIndex) {
        self.graph.update_edge(source, target, ());
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: u64) -> Option<&GraphNode> {
        self.index.get(&id).map(|idx| &self.graph[*idx])
    }

    pub fn contains_edge(&self, source: u64, target: u64) -> bool {
        match (self.index.get(&source), self.index.get(&target)) {
            (Some(s), Some(t)) => self.graph.contains_edge(*s, *t),
            _ => false,
        }
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// `(source, target)` ID pairs in insertion order.
    pub fn edges(&self) -> Vec<(u64, u64)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(s, t)| (self.graph[s].user.id, self.graph[t].user.id))
            .collect()
    }

    /// Encode as GML, labelling nodes with their screen name.
    pub fn to_gml(&self) -> String {
        let mut out = String::from("graph [\n  directed 1\n");
        for node in self.nodes() {
            let user = &node.user;
            out.push_str("  node [\n");
            let attributes: [(&str, String); 12] = [
                ("ID", user.id.to_string()),
                ("Label", user.screen_name.clone()),
                ("Protected", user.protected.to_string()),
                ("Verified", user.verified.to_string()),
                ("FriendsCount", user.friends_count.to_string()),
                ("FollowersCount", user.followers_count.to_string()),
                ("ListedCount", user.listed_count.to_string()),
                ("StatusesCount", user.statuses_count.to_string()),
                ("CreatedAt", user.created_at.clone()),
                ("ProfileImageURL", user.profile_image_url.clone()),
                ("Relation", user.relation.clone()),
                ("Subject", user.subject.clone()),
            ];
            for (key, value) in &attributes {
                out.push_str(&format!("    {} {}\n", key, gml_value(value)));
            }
            out.push_str(&format!("    Processed \"{}\"\n", node.processed));
            out.push_str("  ]\n");
        }
        for (source, target) in self.edges() {
            out.push_str(&format!(
                "  edge [\n    source {}\n    target {}\n  ]\n",
                source, target
            ));
        }
        out.push_str("]\n");
        out
    }

    pub fn write_gml(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_gml()).map_err(|e| StoreError::io(path, e))
    }
}

/// All-digit values are written bare, anything else as a quoted string.
pub fn gml_value(value: &str) -> String {
    if digits_only(value) {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('"', "&quot;"))
    }
}

/// `<h1>_<h2>...gml`
pub fn gml_filename(handles: &[String]) -> String {
    format!("{}.{}", handles.join("_"), GML_EXT)
}

pub struct GraphAssembler<'a> {
    store: &'a AdjacencyStore,
    include_missing: bool,
    egos: Vec<UserObject>,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(store: &'a AdjacencyStore) -> Self {
        Self {
            store,
            include_missing: false,
            egos: Vec::new(),
        }
    }

    /// Keep collected nodes whose adjacency was never fetched.
    pub fn include_missing(mut self, include: bool) -> Self {
        self.include_missing = include;
        self
    }

    /// Add `ego` as a root with edges to every node it was the subject of.
    /// May be called once per collected handle.
    pub fn with_ego(mut self, mut ego: UserObject) -> Self {
        ego.subject.clear();
        self.egos.push(ego);
        self
    }

    pub fn assemble(&self, users: &[UserObject]) -> Result<SocialGraph> {
        let mut merged: Vec<UserObject> = Vec::with_capacity(users.len() + self.egos.len());
        let mut positions: HashMap<u64, usize> = HashMap::new();

        for user in users.iter().chain(self.egos.iter()) {
            match positions.get(&user.id) {
                None => {
                    positions.insert(user.id, merged.len());
                    merged.push(user.clone());
                }
                Some(&pos) if user.is_root() && !merged[pos].is_root() => {
                    merged[pos] = user.clone();
                }
                Some(_) => debug!("duplicate node {} ignored", user.id),
            }
        }

        let mut graph = SocialGraph::default();
        for user in merged {
            let processed = self.store.exists(user.id);
            if !processed && !user.is_root() && !self.include_missing {
                debug!("skipping unprocessed node {}", user.id);
                continue;
            }
            graph.add_node(GraphNode { user, processed });
        }

        let sources: Vec<NodeIndex> = graph.graph.node_indices().collect();
        for source in sources {
            let user = graph.graph[source].user.clone();
            if user.is_root() {
                if user.screen_name.is_empty() {
                    continue;
                }
                let targets: Vec<NodeIndex> = graph
                    .graph
                    .node_indices()
                    .filter(|idx| {
                        *idx != source
                            && graph.graph[*idx]
                                .user
                                .subject
                                .eq_ignore_ascii_case(&user.screen_name)
                    })
                    .collect();
                for target in targets {
                    graph.add_edge(source, target);
                }
                continue;
            }

            let Some(friends) = self.store.read(user.id)? else {
                continue;
            };
            for friend in friends {
                if let Some(&target) = graph.index.get(&friend) {
                    graph.add_edge(source, target);
                }
            }
        }

        info!(
            "assembled graph with {} nodes and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Write `<handles joined by _>.gml` under `dir`.
pub fn write_gml_file(dir: &Path, handles: &[String], graph: &SocialGraph) -> Result<PathBuf> {
    let path = dir.join(gml_filename(handles));
    graph.write_gml(&path)?;
    Ok(path)
}
