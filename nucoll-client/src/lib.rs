pub mod client;
pub mod error;
pub mod image;
pub mod model;
pub mod paginate;
pub mod transport;

pub use client::{ApiClient, PostSource, Relation};
pub use error::ClientError;
pub use model::{Tweet, UserObject};
pub use transport::{BearerToken, RateLimitedTransport};
