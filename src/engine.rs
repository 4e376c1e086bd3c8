use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::EngineError;
use crate::feed::{fetch_bytes, parse_feed, FeedMeta};
use crate::storage::{
    Article, Database, Feed, FeedUpdate, NewArticle, NewFeed, ReaderStatus, StatusChange,
};
use crate::util::{clip_chars, normalize_feed_url};

/// Minimum time between refreshes of the same feed, enforced even for
/// forced refreshes. Bounds abuse from repeated manual triggers.
pub const REFRESH_FLOOR_SECS: i64 = 300;

/// Allowed range for a feed's configured refresh frequency.
pub const MIN_FREQUENCY_HOURS: u32 = 1;
pub const MAX_FREQUENCY_HOURS: u32 = 168;

const MAX_TITLE_CHARS: usize = 500;
const MAX_AUTHOR_CHARS: usize = 255;

/// How a refresh attempt ended.
///
/// Throttled and already-running attempts are not failures: they perform no
/// fetch, touch no state, and report zero new articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A full cycle ran and committed
    Fetched { new_articles: usize },
    /// The throttle policy rejected the attempt; no fetch was performed
    Throttled,
    /// Another cycle for this feed is in flight; this trigger was skipped
    AlreadyRunning,
}

impl RefreshOutcome {
    pub fn new_articles(&self) -> usize {
        match self {
            RefreshOutcome::Fetched { new_articles } => *new_articles,
            RefreshOutcome::Throttled | RefreshOutcome::AlreadyRunning => 0,
        }
    }
}

/// Result of a bulk status mutation: per-id failures are collected instead
/// of aborting the remaining ids.
#[derive(Debug)]
pub struct BulkStatusOutcome {
    pub applied: usize,
    pub failures: Vec<(i64, EngineError)>,
}

/// The feed aggregation engine: catalog, ingestion pipeline, throttle
/// policy, and reader status overlay behind one handle.
///
/// Cloning is cheap; all clones share the same run-lock set, so the
/// at-most-one-ingestion-per-feed guarantee holds across clones (the
/// scheduler's jobs and any API-layer force refresh contend on the same
/// locks).
#[derive(Clone)]
pub struct Engine {
    db: Database,
    client: reqwest::Client,
    running: Arc<Mutex<HashSet<i64>>>,
    /// Worker pool bound: caps concurrent fetches across every trigger
    /// source (timers, sweep, forced refreshes)
    fetch_permits: Arc<Semaphore>,
    request_timeout: Duration,
    max_feed_bytes: usize,
    default_frequency_hours: u32,
    allow_private_networks: bool,
}

/// Marks a feed's ingestion as in flight for the guard's lifetime.
/// Dropping releases the lock, including on early return and panic.
struct RunGuard {
    running: Arc<Mutex<HashSet<i64>>>,
    feed_id: i64,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.feed_id);
        }
    }
}

impl Engine {
    pub fn new(db: Database, client: reqwest::Client, config: &Config) -> Self {
        Self {
            db,
            client,
            running: Arc::new(Mutex::new(HashSet::new())),
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrent_refreshes.max(1))),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_feed_bytes: config.max_feed_bytes,
            default_frequency_hours: config.default_frequency_hours,
            allow_private_networks: config.allow_private_networks,
        }
    }

    // ========================================================================
    // Feed Catalog
    // ========================================================================

    /// Add a feed to the catalog, or return the existing feed for the same
    /// canonical URL. Feeds are shared: a second reader adding an already
    /// cataloged URL gets the existing row, reactivated if it had been
    /// deactivated.
    ///
    /// For a new URL the feed's own metadata is fetched best-effort to fill
    /// in name and description; an explicit `name` wins over the source's
    /// title. A metadata fetch failure is not fatal — the feed is created
    /// anyway and the first ingestion cycle will pick the content up.
    pub async fn add_feed(
        &self,
        url: &str,
        frequency_hours: Option<u32>,
        name: Option<&str>,
    ) -> Result<Feed, EngineError> {
        let url = normalize_feed_url(url, self.allow_private_networks)?;

        if let Some(existing) = self.db.get_feed_by_url(&url).await? {
            if !existing.active {
                tracing::info!(feed_id = existing.id, url = %url, "Reactivating feed on re-add");
                self.db.set_feed_active(existing.id, true).await?;
                return Ok(Feed {
                    active: true,
                    ..existing
                });
            }
            return Ok(existing);
        }

        let frequency = clamp_frequency(frequency_hours.unwrap_or(self.default_frequency_hours));
        let meta = self.fetch_meta(&url).await;
        let resolved_name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| meta.title.clone())
            .unwrap_or_else(|| "Untitled feed".to_string());

        let feed = self
            .db
            .create_feed(
                &NewFeed {
                    url: url.clone(),
                    name: resolved_name,
                    description: meta.description,
                    frequency_hours: frequency,
                },
                Utc::now().timestamp(),
            )
            .await?;

        tracing::info!(
            feed_id = feed.id,
            url = %url,
            frequency_hours = frequency,
            "Feed added to catalog"
        );
        Ok(feed)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Feed, EngineError> {
        self.db
            .get_feed(feed_id)
            .await?
            .ok_or(EngineError::FeedNotFound(feed_id))
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>, EngineError> {
        Ok(self.db.list_feeds().await?)
    }

    pub async fn active_feeds(&self) -> Result<Vec<Feed>, EngineError> {
        Ok(self.db.list_active_feeds().await?)
    }

    /// Active feeds whose refresh interval has elapsed. Consumed by the
    /// scheduler's sweep job.
    pub async fn due_feeds(&self) -> Result<Vec<Feed>, EngineError> {
        Ok(self.db.list_due_feeds(Utc::now().timestamp()).await?)
    }

    /// Apply a partial update. A frequency change is clamped to the allowed
    /// range; the caller re-arms the feed's timer if it holds one.
    pub async fn update_feed(
        &self,
        feed_id: i64,
        mut update: FeedUpdate,
    ) -> Result<Feed, EngineError> {
        if let Some(frequency) = update.frequency_hours {
            update.frequency_hours = Some(clamp_frequency(frequency));
        }
        self.db
            .update_feed(feed_id, &update)
            .await?
            .ok_or(EngineError::FeedNotFound(feed_id))
    }

    /// Deactivate a feed (no reader references it anymore). The row and its
    /// articles stay; only scheduling stops.
    pub async fn deactivate(&self, feed_id: i64) -> Result<(), EngineError> {
        if !self.db.set_feed_active(feed_id, false).await? {
            return Err(EngineError::FeedNotFound(feed_id));
        }
        tracing::info!(feed_id, "Feed deactivated");
        Ok(())
    }

    pub async fn reactivate(&self, feed_id: i64) -> Result<(), EngineError> {
        if !self.db.set_feed_active(feed_id, true).await? {
            return Err(EngineError::FeedNotFound(feed_id));
        }
        tracing::info!(feed_id, "Feed reactivated");
        Ok(())
    }

    // ========================================================================
    // Refresh / Ingestion
    // ========================================================================

    /// Refresh one feed: throttle check, then a full ingestion cycle.
    ///
    /// At most one cycle per feed runs at any instant. A trigger that finds
    /// a cycle already in flight is skipped (and logged), never queued. The
    /// run lock is a try-acquire flag — nothing ever blocks waiting on it —
    /// and the only database transaction of the cycle is the final commit,
    /// so no lock or transaction is held across the network fetch.
    pub async fn refresh(&self, feed_id: i64, force: bool) -> Result<RefreshOutcome, EngineError> {
        let feed = self.get_feed(feed_id).await?;

        let Some(_guard) = self.try_begin(feed_id) else {
            tracing::debug!(feed_id, "Refresh already in flight, skipping trigger");
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        if !Self::can_refresh(&feed, force, Utc::now().timestamp()) {
            tracing::debug!(feed_id, force, "Refresh throttled");
            return Ok(RefreshOutcome::Throttled);
        }

        let _permit = match self.fetch_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            // The semaphore is never closed; a closed pool means shutdown
            Err(_) => return Ok(RefreshOutcome::AlreadyRunning),
        };

        let new_articles = self.ingest(&feed).await?;
        Ok(RefreshOutcome::Fetched { new_articles })
    }

    /// Whether a refresh of `feed` is eligible at `now`.
    ///
    /// A feed that never refreshed is always eligible. A forced refresh
    /// only has to clear the global floor; an unforced one has to clear the
    /// feed's configured frequency.
    pub fn can_refresh(feed: &Feed, force: bool, now: i64) -> bool {
        match feed.last_refreshed {
            None => true,
            Some(last) => {
                let elapsed = now - last;
                if force {
                    elapsed >= REFRESH_FLOOR_SECS
                } else {
                    elapsed >= feed.frequency_hours * 3600
                }
            }
        }
    }

    /// True while an ingestion cycle for this feed is in flight.
    pub fn is_running(&self, feed_id: i64) -> bool {
        self.running
            .lock()
            .map(|running| running.contains(&feed_id))
            .unwrap_or(false)
    }

    fn try_begin(&self, feed_id: i64) -> Option<RunGuard> {
        let mut running = self.running.lock().ok()?;
        if !running.insert(feed_id) {
            return None;
        }
        Some(RunGuard {
            running: Arc::clone(&self.running),
            feed_id,
        })
    }

    /// One ingestion cycle: fetch, parse, dedupe, stage, commit atomically.
    ///
    /// Any fetch/parse error returns before a single write, leaving
    /// `last_refreshed` untouched so the next scheduled cycle retries. A
    /// successful cycle commits all staged articles and the timestamp
    /// advance as one transaction, even when the batch is empty.
    async fn ingest(&self, feed: &Feed) -> Result<usize, EngineError> {
        let bytes = fetch_bytes(
            &self.client,
            &feed.url,
            self.request_timeout,
            self.max_feed_bytes,
        )
        .await?;
        let parsed = parse_feed(&bytes)?;

        let total = parsed.entries.len();
        let linked: Vec<_> = parsed
            .entries
            .into_iter()
            .filter(|entry| {
                entry
                    .link
                    .as_deref()
                    .is_some_and(|link| !link.trim().is_empty())
            })
            .collect();
        let skipped = total - linked.len();
        if skipped > 0 {
            tracing::warn!(
                feed_id = feed.id,
                skipped,
                "Entries without a resolvable link skipped"
            );
        }

        let guids: Vec<String> = linked.iter().map(|entry| entry.guid.clone()).collect();
        let existing = self.db.existing_guids(feed.id, &guids).await?;

        let now = Utc::now().timestamp();
        let mut seen = HashSet::new();
        let mut staged = Vec::new();
        for entry in linked {
            if existing.contains(&entry.guid) || !seen.insert(entry.guid.clone()) {
                continue;
            }
            let link = entry.link.unwrap_or_default().trim().to_string();
            staged.push(NewArticle {
                guid: entry.guid,
                title: clip_chars(entry.title.as_deref().unwrap_or("Untitled"), MAX_TITLE_CHARS)
                    .into_owned(),
                link,
                author: entry
                    .author
                    .map(|a| clip_chars(&a, MAX_AUTHOR_CHARS).into_owned()),
                summary: entry.summary,
                content: entry.content,
                published_at: entry.published.unwrap_or(now),
            });
        }

        let inserted = self.db.commit_refresh(feed.id, &staged, now).await?;
        tracing::info!(feed_id = feed.id, new_articles = inserted, "Feed refreshed");
        Ok(inserted)
    }

    /// Best-effort fetch of feed-level metadata for a feed being created.
    async fn fetch_meta(&self, url: &str) -> FeedMeta {
        let bytes = match fetch_bytes(&self.client, url, self.request_timeout, self.max_feed_bytes)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Metadata fetch failed, using fallbacks");
                return FeedMeta::default();
            }
        };
        match parse_feed(&bytes) {
            Ok(parsed) => parsed.meta,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Metadata parse failed, using fallbacks");
                FeedMeta::default()
            }
        }
    }

    // ========================================================================
    // Articles
    // ========================================================================

    pub async fn list_articles(&self, feed_id: i64) -> Result<Vec<Article>, EngineError> {
        // Distinguish "unknown feed" from "feed with no articles yet"
        self.get_feed(feed_id).await?;
        Ok(self.db.list_articles(feed_id).await?)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Article, EngineError> {
        self.db
            .get_article(article_id)
            .await?
            .ok_or(EngineError::ArticleNotFound(article_id))
    }

    // ========================================================================
    // Reader Status Overlay
    // ========================================================================

    /// Upsert one reader's status for one article.
    pub async fn set_status(
        &self,
        reader_id: i64,
        article_id: i64,
        change: StatusChange,
    ) -> Result<ReaderStatus, EngineError> {
        self.db
            .set_status(reader_id, article_id, &change, Utc::now().timestamp())
            .await?
            .ok_or(EngineError::ArticleNotFound(article_id))
    }

    /// Apply the same status change to many articles independently.
    ///
    /// One article's failure is recorded and the rest still proceed; the
    /// outcome carries the success count and every (id, error) pair.
    pub async fn set_status_bulk(
        &self,
        reader_id: i64,
        article_ids: &[i64],
        change: StatusChange,
    ) -> BulkStatusOutcome {
        let mut applied = 0;
        let mut failures = Vec::new();

        for &article_id in article_ids {
            match self.set_status(reader_id, article_id, change).await {
                Ok(_) => applied += 1,
                Err(e) => {
                    tracing::debug!(reader_id, article_id, error = %e, "Bulk status item failed");
                    failures.push((article_id, e));
                }
            }
        }

        BulkStatusOutcome { applied, failures }
    }

    pub async fn list_favorites(&self, reader_id: i64) -> Result<Vec<Article>, EngineError> {
        Ok(self.db.list_favorites(reader_id).await?)
    }

    pub async fn unread_count(
        &self,
        reader_id: i64,
        feed_id: Option<i64>,
    ) -> Result<i64, EngineError> {
        if let Some(feed_id) = feed_id {
            self.get_feed(feed_id).await?;
        }
        Ok(self.db.unread_count(reader_id, feed_id).await?)
    }
}

fn clamp_frequency(hours: u32) -> u32 {
    let clamped = hours.clamp(MIN_FREQUENCY_HOURS, MAX_FREQUENCY_HOURS);
    if clamped != hours {
        tracing::warn!(
            requested = hours,
            clamped,
            "Refresh frequency outside allowed range, clamping"
        );
    }
    clamped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS_THREE_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Engine Test Feed</title>
    <description>Feed used by engine tests</description>
    <item><guid>e1</guid><title>One</title><link>https://example.com/1</link></item>
    <item><guid>e2</guid><title>Two</title><link>https://example.com/2</link></item>
    <item><guid>e3</guid><title>Three</title><link>https://example.com/3</link></item>
</channel></rss>"#;

    const RSS_EMPTY: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Empty</title></channel></rss>"#;

    fn test_config() -> Config {
        Config {
            allow_private_networks: true,
            ..Config::default()
        }
    }

    async fn test_engine() -> Engine {
        let db = Database::open(":memory:").await.unwrap();
        Engine::new(db, reqwest::Client::new(), &test_config())
    }

    async fn mock_feed_server(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/xml"),
            )
            .mount(&server)
            .await;
        server
    }

    fn feed_fixture(last_refreshed: Option<i64>, frequency_hours: i64) -> Feed {
        Feed {
            id: 1,
            url: "https://example.com/rss".to_string(),
            name: "Fixture".to_string(),
            description: None,
            frequency_hours,
            active: true,
            last_refreshed,
            created_at: 0,
        }
    }

    // ------------------------------------------------------------------
    // Throttle policy
    // ------------------------------------------------------------------

    #[test]
    fn test_can_refresh_never_refreshed() {
        let feed = feed_fixture(None, 6);
        assert!(Engine::can_refresh(&feed, false, 1000));
        assert!(Engine::can_refresh(&feed, true, 1000));
    }

    #[test]
    fn test_can_refresh_unforced_waits_for_frequency() {
        let feed = feed_fixture(Some(10_000), 6);
        // 1 hour later: not eligible
        assert!(!Engine::can_refresh(&feed, false, 10_000 + 3600));
        // just under 6 hours: still not eligible
        assert!(!Engine::can_refresh(&feed, false, 10_000 + 6 * 3600 - 1));
        // exactly 6 hours: eligible
        assert!(Engine::can_refresh(&feed, false, 10_000 + 6 * 3600));
    }

    #[test]
    fn test_can_refresh_forced_waits_for_floor() {
        let feed = feed_fixture(Some(10_000), 6);
        assert!(!Engine::can_refresh(&feed, true, 10_000 + 1));
        assert!(!Engine::can_refresh(&feed, true, 10_000 + REFRESH_FLOOR_SECS - 1));
        assert!(Engine::can_refresh(&feed, true, 10_000 + REFRESH_FLOOR_SECS));
    }

    #[test]
    fn test_clamp_frequency_bounds() {
        assert_eq!(clamp_frequency(0), MIN_FREQUENCY_HOURS);
        assert_eq!(clamp_frequency(24), 24);
        assert_eq!(clamp_frequency(500), MAX_FREQUENCY_HOURS);
    }

    // ------------------------------------------------------------------
    // add_feed
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_add_feed_uses_source_metadata() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;

        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        assert_eq!(feed.name, "Engine Test Feed");
        assert_eq!(feed.description.as_deref(), Some("Feed used by engine tests"));
        assert_eq!(feed.frequency_hours, 6);
        assert!(feed.active);
        assert!(feed.last_refreshed.is_none());
    }

    #[tokio::test]
    async fn test_add_feed_explicit_name_wins() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;

        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), None, Some("My Feed"))
            .await
            .unwrap();
        assert_eq!(feed.name, "My Feed");
        // Default frequency from config
        assert_eq!(feed.frequency_hours, 24);
    }

    #[tokio::test]
    async fn test_add_feed_unreachable_source_still_created() {
        let engine = test_engine().await;

        let feed = engine
            .add_feed("http://127.0.0.1:1/feed", Some(6), None)
            .await
            .unwrap();
        assert_eq!(feed.name, "Untitled feed");
    }

    #[tokio::test]
    async fn test_add_feed_reuses_existing_row() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let url = format!("{}/feed", server.uri());

        let first = engine.add_feed(&url, Some(6), None).await.unwrap();
        let second = engine.add_feed(&url, Some(12), Some("Other Name")).await.unwrap();

        // Same shared row; the second caller's parameters do not overwrite it
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Engine Test Feed");
        assert_eq!(second.frequency_hours, 6);
    }

    #[tokio::test]
    async fn test_add_feed_reactivates_deactivated() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let url = format!("{}/feed", server.uri());

        let feed = engine.add_feed(&url, Some(6), None).await.unwrap();
        engine.deactivate(feed.id).await.unwrap();

        let again = engine.add_feed(&url, None, None).await.unwrap();
        assert_eq!(again.id, feed.id);
        assert!(again.active);
    }

    #[tokio::test]
    async fn test_add_feed_rejects_bad_url() {
        let engine = test_engine().await;
        let result = engine.add_feed("ftp://example.com/feed", None, None).await;
        assert!(matches!(result, Err(EngineError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_add_feed_clamps_frequency() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;

        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(9999), None)
            .await
            .unwrap();
        assert_eq!(feed.frequency_hours, i64::from(MAX_FREQUENCY_HOURS));
    }

    // ------------------------------------------------------------------
    // refresh / ingest
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_ingests_new_articles() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        let outcome = engine.refresh(feed.id, false).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Fetched { new_articles: 3 });

        let articles = engine.list_articles(feed.id).await.unwrap();
        assert_eq!(articles.len(), 3);

        let feed = engine.get_feed(feed.id).await.unwrap();
        assert!(feed.last_refreshed.is_some());
    }

    #[tokio::test]
    async fn test_refresh_immediately_after_is_throttled() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        engine.refresh(feed.id, false).await.unwrap();

        // Within the floor, both unforced and forced attempts are no-ops
        let unforced = engine.refresh(feed.id, false).await.unwrap();
        assert_eq!(unforced, RefreshOutcome::Throttled);
        let forced = engine.refresh(feed.id, true).await.unwrap();
        assert_eq!(forced, RefreshOutcome::Throttled);
        assert_eq!(forced.new_articles(), 0);
    }

    #[tokio::test]
    async fn test_refresh_unknown_feed() {
        let engine = test_engine().await;
        let result = engine.refresh(999, false).await;
        assert!(matches!(result, Err(EngineError::FeedNotFound(999))));
    }

    #[tokio::test]
    async fn test_ingest_twice_is_idempotent() {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        // Drive the pipeline directly, bypassing the throttle
        let first = engine.ingest(&feed).await.unwrap();
        let second = engine.ingest(&feed).await.unwrap();
        assert_eq!(first, 3);
        assert_eq!(second, 0);

        let articles = engine.list_articles(feed.id).await.unwrap();
        assert_eq!(articles.len(), 3);
    }

    #[tokio::test]
    async fn test_ingest_zero_entries_advances_timestamp() {
        let server = mock_feed_server(RSS_EMPTY).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        let count = engine.ingest(&feed).await.unwrap();
        assert_eq!(count, 0);

        let feed = engine.get_feed(feed.id).await.unwrap();
        assert!(feed.last_refreshed.is_some(), "empty cycle is still a success");
    }

    #[tokio::test]
    async fn test_ingest_parse_error_leaves_timestamp_untouched() {
        let server = mock_feed_server("<not valid xml").await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        let result = engine.ingest(&feed).await;
        assert!(matches!(result, Err(EngineError::Parse(_))));

        let feed = engine.get_feed(feed.id).await.unwrap();
        assert!(feed.last_refreshed.is_none(), "failed cycle must not advance");
    }

    #[tokio::test]
    async fn test_ingest_http_error_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        let result = engine.ingest(&feed).await;
        assert!(matches!(result, Err(EngineError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_ingest_skips_entries_without_link() {
        let rss = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Partial</title>
    <item><guid>with-link</guid><title>Kept</title><link>https://example.com/kept</link></item>
    <item><guid>no-link</guid><title>Dropped</title></item>
</channel></rss>"#;
        let server = mock_feed_server(rss).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        let count = engine.ingest(&feed).await.unwrap();
        assert_eq!(count, 1);

        let articles = engine.list_articles(feed.id).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].guid, "with-link");
    }

    #[tokio::test]
    async fn test_ingest_clips_oversized_fields() {
        let long_title = "t".repeat(600);
        let long_author = "a".repeat(300);
        let rss = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Bounds</title>
    <item>
        <guid>big</guid>
        <title>{long_title}</title>
        <author>{long_author}</author>
        <link>https://example.com/big</link>
    </item>
</channel></rss>"#
        );
        let server = mock_feed_server(&rss).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();

        engine.ingest(&feed).await.unwrap();
        let articles = engine.list_articles(feed.id).await.unwrap();
        assert_eq!(articles[0].title.chars().count(), MAX_TITLE_CHARS);
        assert_eq!(
            articles[0].author.as_ref().unwrap().chars().count(),
            MAX_AUTHOR_CHARS
        );
    }

    // ------------------------------------------------------------------
    // status overlay
    // ------------------------------------------------------------------

    async fn engine_with_articles() -> (Engine, Vec<i64>) {
        let server = mock_feed_server(RSS_THREE_ITEMS).await;
        let engine = test_engine().await;
        let feed = engine
            .add_feed(&format!("{}/feed", server.uri()), Some(6), None)
            .await
            .unwrap();
        engine.ingest(&feed).await.unwrap();
        let ids = engine
            .list_articles(feed.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        (engine, ids)
    }

    #[tokio::test]
    async fn test_set_status_unknown_article() {
        let (engine, _) = engine_with_articles().await;
        let result = engine.set_status(7, 9999, StatusChange::mark_read()).await;
        assert!(matches!(result, Err(EngineError::ArticleNotFound(9999))));
    }

    #[tokio::test]
    async fn test_set_status_bulk_isolates_failures() {
        let (engine, mut ids) = engine_with_articles().await;
        ids.push(9999); // unknown article

        let outcome = engine
            .set_status_bulk(7, &ids, StatusChange::mark_read())
            .await;

        assert_eq!(outcome.applied, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, 9999);
        assert!(matches!(
            outcome.failures[0].1,
            EngineError::ArticleNotFound(9999)
        ));

        // All valid rows were updated despite the failure
        for &id in &ids[..3] {
            let status = engine
                .set_status(7, id, StatusChange::default())
                .await
                .unwrap();
            assert!(status.is_read);
        }
    }

    #[tokio::test]
    async fn test_unread_count_unknown_feed() {
        let (engine, _) = engine_with_articles().await;
        let result = engine.unread_count(7, Some(999)).await;
        assert!(matches!(result, Err(EngineError::FeedNotFound(999))));
    }
}
