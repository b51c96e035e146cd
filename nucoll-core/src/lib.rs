pub mod adjacency;
pub mod collection;
pub mod config;
pub mod error;
pub mod graph;
pub mod query;

pub use adjacency::AdjacencyStore;
pub use collection::{Record, read_records, write_records};
pub use config::CredentialStore;
pub use error::StoreError;
pub use graph::{GraphAssembler, SocialGraph};
