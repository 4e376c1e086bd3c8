use std::collections::HashSet;

use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, DatabaseError};

const ARTICLE_COLUMNS: &str =
    "id, feed_id, guid, title, link, author, summary, content, published_at, fetched_at";

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Which of the candidate GUIDs already exist for this feed.
    ///
    /// Used by the ingestion pipeline to decide new-vs-seen before staging.
    /// Candidates are queried in chunks to stay under SQLite's bind limit.
    pub async fn existing_guids(
        &self,
        feed_id: i64,
        guids: &[String],
    ) -> Result<HashSet<String>, DatabaseError> {
        const CHUNK_SIZE: usize = 100;
        let mut found = HashSet::new();

        for chunk in guids.chunks(CHUNK_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT guid FROM articles WHERE feed_id = ");
            builder.push_bind(feed_id);
            builder.push(" AND guid IN (");
            let mut separated = builder.separated(", ");
            for guid in chunk {
                separated.push_bind(guid);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(guid,)| guid));
        }

        Ok(found)
    }

    /// All articles for a feed, newest first.
    pub async fn list_articles(&self, feed_id: i64) -> Result<Vec<Article>, DatabaseError> {
        let articles = sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS} FROM articles
            WHERE feed_id = ?
            ORDER BY published_at DESC, fetched_at DESC
        "#
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(articles)
    }

    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>, DatabaseError> {
        let article = sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(article)
    }

}
