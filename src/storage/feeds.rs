use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedUpdate, NewArticle, NewFeed};

const FEED_COLUMNS: &str =
    "id, url, name, description, frequency_hours, active, last_refreshed, created_at";

impl Database {
    // ========================================================================
    // Feed Catalog Operations
    // ========================================================================

    /// Create a feed row, or return the existing row for the same URL.
    ///
    /// The UNIQUE constraint on `url` plus `ON CONFLICT DO NOTHING` makes
    /// concurrent creates converge on a single row; the follow-up SELECT
    /// returns whichever row won.
    pub async fn create_feed(&self, feed: &NewFeed, now: i64) -> Result<Feed, DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO feeds (url, name, description, frequency_hours, active, created_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(&feed.url)
        .bind(&feed.name)
        .bind(&feed.description)
        .bind(feed.frequency_hours)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(&feed.url)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn list_active_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Active feeds whose refresh interval has elapsed (or that never ran).
    /// The sweep job triggers ingestion for each of these.
    pub async fn list_due_feeds(&self, now: i64) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS} FROM feeds
            WHERE active = 1
              AND (last_refreshed IS NULL OR ? - last_refreshed >= frequency_hours * 3600)
            ORDER BY last_refreshed
        "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Flip the active flag. Returns false if the feed does not exist.
    pub async fn set_feed_active(&self, feed_id: i64, active: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET active = ? WHERE id = ?")
            .bind(active)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Apply a partial update to a feed row. Returns the updated row,
    /// or `None` if the feed does not exist.
    pub async fn update_feed(
        &self,
        feed_id: i64,
        update: &FeedUpdate,
    ) -> Result<Option<Feed>, DatabaseError> {
        let Some(mut feed) = self.get_feed(feed_id).await? else {
            return Ok(None);
        };

        if let Some(name) = &update.name {
            feed.name = name.clone();
        }
        if let Some(description) = &update.description {
            feed.description = Some(description.clone());
        }
        if let Some(frequency) = update.frequency_hours {
            feed.frequency_hours = i64::from(frequency);
        }
        if let Some(active) = update.active {
            feed.active = active;
        }

        sqlx::query(
            "UPDATE feeds SET name = ?, description = ?, frequency_hours = ?, active = ? WHERE id = ?",
        )
        .bind(&feed.name)
        .bind(&feed.description)
        .bind(feed.frequency_hours)
        .bind(feed.active)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;

        Ok(Some(feed))
    }

    // ========================================================================
    // Ingestion Commit
    // ========================================================================

    /// Persist one ingestion cycle atomically: insert all staged articles and
    /// advance `last_refreshed`, in a single transaction. Either the whole
    /// batch (including the timestamp) commits, or none of it does.
    ///
    /// `INSERT OR IGNORE` makes the (feed_id, guid) UNIQUE constraint the
    /// backstop against residual races: a duplicate row from an overlapping
    /// cycle is dropped silently instead of failing the batch. The number of
    /// rows actually inserted is counted via `changes()`, which avoids
    /// before/after table scans.
    ///
    /// An empty batch is a valid, successful cycle: the timestamp still
    /// advances, marking the feed as freshly checked.
    pub async fn commit_refresh(
        &self,
        feed_id: i64,
        articles: &[NewArticle],
        now: i64,
    ) -> Result<usize, DatabaseError> {
        const BATCH_SIZE: usize = 50;
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for chunk in articles.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles \
                 (feed_id, guid, title, link, author, summary, content, published_at, fetched_at) ",
            );

            builder.push_values(chunk, |mut b, article| {
                b.push_bind(feed_id)
                    .push_bind(&article.guid)
                    .push_bind(&article.title)
                    .push_bind(&article.link)
                    .push_bind(&article.author)
                    .push_bind(&article.summary)
                    .push_bind(&article.content)
                    .push_bind(article.published_at)
                    .push_bind(now);
            });

            builder.build().execute(&mut *tx).await?;

            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            inserted += changes.0 as usize;
        }

        sqlx::query("UPDATE feeds SET last_refreshed = ? WHERE id = ?")
            .bind(now)
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(inserted)
    }
}
