use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Canonical feed record, shared across all readers.
///
/// Keyed by normalized URL (UNIQUE). `last_refreshed` only advances when an
/// ingestion cycle commits successfully; it stays untouched on fetch/parse
/// failure so the next scheduled cycle retries naturally.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub frequency_hours: i64,
    pub active: bool,
    pub last_refreshed: Option<i64>,
    pub created_at: i64,
}

/// Fields for a feed row about to be created.
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub name: String,
    pub description: Option<String>,
    pub frequency_hours: u32,
}

/// Partial feed update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct FeedUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub frequency_hours: Option<u32>,
    pub active: Option<bool>,
}

/// One ingested entry. Identity is (feed_id, guid); rows are immutable once
/// written and only ever created by the ingestion pipeline.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: i64,
    pub fetched_at: i64,
}

/// A staged article produced by one ingestion cycle, not yet persisted.
/// All string fields are already clipped to their storage bounds.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: i64,
}

/// Per-reader read/favorite overlay over a shared article.
///
/// Created lazily on first reader interaction, never by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ReaderStatus {
    pub reader_id: i64,
    pub article_id: i64,
    pub is_read: bool,
    pub read_at: Option<i64>,
    pub is_favorite: bool,
    pub favorited_at: Option<i64>,
}

/// Requested status mutation; `None` leaves the flag untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusChange {
    pub read: Option<bool>,
    pub favorite: Option<bool>,
}

impl StatusChange {
    pub fn mark_read() -> Self {
        Self {
            read: Some(true),
            favorite: None,
        }
    }

    pub fn mark_unread() -> Self {
        Self {
            read: Some(false),
            favorite: None,
        }
    }

    pub fn favorite() -> Self {
        Self {
            read: None,
            favorite: Some(true),
        }
    }

    pub fn unfavorite() -> Self {
        Self {
            read: None,
            favorite: Some(false),
        }
    }
}
