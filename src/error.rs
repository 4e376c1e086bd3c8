use thiserror::Error;

use crate::feed::{FetchError, ParseError};
use crate::storage::DatabaseError;
use crate::util::UrlValidationError;

/// Error taxonomy of the engine boundary.
///
/// Fetch and parse failures are transient: the cycle that hit them reports
/// zero new articles and the next scheduled interval retries. They never
/// propagate across feeds — the sweep treats each feed's result
/// independently. A duplicate feed URL is not represented here at all;
/// creation resolves it transparently by returning the existing feed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Network/transport failure while fetching a feed
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Malformed feed content
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Unknown feed id
    #[error("Feed {0} not found")]
    FeedNotFound(i64),
    /// Unknown article id
    #[error("Article {0} not found")]
    ArticleNotFound(i64),
    /// Feed URL failed normalization or the network policy
    #[error(transparent)]
    InvalidUrl(#[from] UrlValidationError),
    /// Storage failure
    #[error(transparent)]
    Database(#[from] DatabaseError),
}
