use super::schema::Database;
use super::types::{Article, DatabaseError, ReaderStatus, StatusChange};

const STATUS_COLUMNS: &str = "reader_id, article_id, is_read, read_at, is_favorite, favorited_at";

impl Database {
    // ========================================================================
    // Reader Status Overlay
    // ========================================================================

    /// Upsert a reader's status row for one article and apply the requested
    /// changes. Returns `None` when the article does not exist (the caller
    /// surfaces that as a not-found error).
    ///
    /// A missing status row is created with defaults first, so the overlay is
    /// populated lazily on first interaction. Setting `read = true` stamps
    /// `read_at` with the current time; `read = false` clears it. Favorite
    /// follows the same pattern. Fields not named in the change are left
    /// untouched.
    pub async fn set_status(
        &self,
        reader_id: i64,
        article_id: i64,
        change: &StatusChange,
        now: i64,
    ) -> Result<Option<ReaderStatus>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let article: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&mut *tx)
            .await?;
        if article.is_none() {
            return Ok(None);
        }

        let current = sqlx::query_as::<_, ReaderStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM article_status WHERE reader_id = ? AND article_id = ?"
        ))
        .bind(reader_id)
        .bind(article_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut row = current.unwrap_or(ReaderStatus {
            reader_id,
            article_id,
            is_read: false,
            read_at: None,
            is_favorite: false,
            favorited_at: None,
        });

        if let Some(read) = change.read {
            row.is_read = read;
            row.read_at = read.then_some(now);
        }
        if let Some(favorite) = change.favorite {
            row.is_favorite = favorite;
            row.favorited_at = favorite.then_some(now);
        }

        sqlx::query(
            r#"
            INSERT INTO article_status (reader_id, article_id, is_read, read_at, is_favorite, favorited_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(reader_id, article_id) DO UPDATE SET
                is_read = excluded.is_read,
                read_at = excluded.read_at,
                is_favorite = excluded.is_favorite,
                favorited_at = excluded.favorited_at
        "#,
        )
        .bind(row.reader_id)
        .bind(row.article_id)
        .bind(row.is_read)
        .bind(row.read_at)
        .bind(row.is_favorite)
        .bind(row.favorited_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(row))
    }

    pub async fn get_status(
        &self,
        reader_id: i64,
        article_id: i64,
    ) -> Result<Option<ReaderStatus>, DatabaseError> {
        let row = sqlx::query_as::<_, ReaderStatus>(&format!(
            "SELECT {STATUS_COLUMNS} FROM article_status WHERE reader_id = ? AND article_id = ?"
        ))
        .bind(reader_id)
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// A reader's favorited articles, most recently favorited first.
    pub async fn list_favorites(&self, reader_id: i64) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT a.id, a.feed_id, a.guid, a.title, a.link, a.author, a.summary,
                   a.content, a.published_at, a.fetched_at
            FROM articles a
            JOIN article_status s ON s.article_id = a.id
            WHERE s.reader_id = ? AND s.is_favorite = 1
            ORDER BY s.favorited_at DESC
        "#,
        )
        .bind(reader_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    /// Count a reader's unread articles, optionally scoped to one feed.
    /// Articles with no status row count as unread.
    pub async fn unread_count(
        &self,
        reader_id: i64,
        feed_id: Option<i64>,
    ) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM articles a
            LEFT JOIN article_status s
                ON s.article_id = a.id AND s.reader_id = ?
            WHERE (s.is_read = 0 OR s.is_read IS NULL)
              AND (? IS NULL OR a.feed_id = ?)
        "#,
        )
        .bind(reader_id)
        .bind(feed_id)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}
