use feed_rs::parser;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::util::clip_chars;

/// GUIDs are bounded before storage and comparison; anything longer is
/// clipped on a character boundary.
pub const MAX_GUID_LEN: usize = 500;

/// Malformed feed content. The pipeline treats this as "zero new entries
/// this cycle" and leaves the feed's refresh timestamp untouched.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct ParseError(#[from] feed_rs::parser::ParseFeedError);

/// Feed-level metadata, used to bootstrap name/description on creation.
#[derive(Debug, Clone, Default)]
pub struct FeedMeta {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// One normalized entry with explicit optional fields.
///
/// The GUID is already derived and clipped; everything else is passed
/// through as the source provided it. Entries with no resolvable link are
/// dropped later by the pipeline, not here.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    /// Published timestamp, falling back to the entry's updated timestamp.
    /// `None` means the pipeline stamps ingestion wall-clock time instead.
    pub published: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub meta: FeedMeta,
    pub entries: Vec<ParsedEntry>,
}

/// Parse raw feed bytes (RSS or Atom) into normalized form.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, ParseError> {
    let feed = parser::parse(bytes)?;

    let meta = FeedMeta {
        title: feed.title.map(|t| t.content),
        description: feed.description.map(|t| t.content),
    };

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry.links.first().map(|l| l.href.clone());
            let published = entry.published.or(entry.updated).map(|dt| dt.timestamp());
            let title = entry.title.map(|t| t.content);
            let summary = entry.summary.map(|s| s.content);
            let content = entry.content.and_then(|c| c.body);
            let author = entry
                .authors
                .first()
                .map(|p| p.name.clone())
                .filter(|name| !name.trim().is_empty());

            let existing_id = if entry.id.trim().is_empty() {
                None
            } else {
                Some(entry.id.as_str())
            };
            let guid = derive_guid(
                existing_id,
                link.as_deref(),
                title.as_deref().unwrap_or(""),
                published,
            );

            ParsedEntry {
                guid,
                title,
                link,
                author,
                summary,
                content,
                published,
            }
        })
        .collect();

    Ok(ParsedFeed { meta, entries })
}

/// Derive a stable per-entry identifier.
///
/// Preference order: the source's explicit id, then the entry link, then a
/// SHA-256 digest over (link, title, published). The digest input contains
/// everything that identifies the entry, so re-parsing byte-identical
/// content always yields the same GUID.
fn derive_guid(
    existing: Option<&str>,
    link: Option<&str>,
    title: &str,
    published: Option<i64>,
) -> String {
    if let Some(guid) = existing {
        let trimmed = guid.trim();
        if !trimmed.is_empty() {
            return clip_chars(trimmed, MAX_GUID_LEN).into_owned();
        }
    }

    if let Some(link) = link {
        let trimmed = link.trim();
        if !trimmed.is_empty() {
            return clip_chars(trimmed, MAX_GUID_LEN).into_owned();
        }
    }

    let input = format!(
        "{}|{}|{}",
        link.unwrap_or(""),
        title,
        published.map(|p| p.to_string()).unwrap_or_default()
    );
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}
