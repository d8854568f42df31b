//! Postgres-backed event source adapter.
//!
//! The source schema is one append-only `posts` table:
//! `(id BIGINT, author_key TEXT, author_name TEXT, category SMALLINT,
//! posted_at TIMESTAMPTZ)`. The adapter never writes to it. Category codes
//! are passed through raw; decoding (and the abort on unknown codes) is the
//! pipeline's job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::application::repos::{EventStore, RepoError};
use crate::domain::types::{AuthorRecord, EventRecord};

// Display name is the one on the author's first post, so renames after the
// fact do not reshuffle short-id assignment.
const AUTHORS_SQL: &str = "\
    SELECT g.author_key, \
           f.author_name AS display_name, \
           g.first_post_id, \
           g.first_post_at, \
           g.post_count \
    FROM ( \
        SELECT author_key, \
               MIN(id)        AS first_post_id, \
               MIN(posted_at) AS first_post_at, \
               COUNT(*)       AS post_count \
        FROM posts \
        GROUP BY author_key \
    ) g \
    JOIN posts f ON f.id = g.first_post_id \
    ORDER BY g.first_post_id";

const EVENTS_SQL: &str = "SELECT author_key, posted_at, category FROM posts ORDER BY id";

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct AuthorRow {
    author_key: String,
    display_name: String,
    first_post_id: i64,
    first_post_at: DateTime<Utc>,
    post_count: i64,
}

impl TryFrom<AuthorRow> for AuthorRecord {
    type Error = RepoError;

    fn try_from(row: AuthorRow) -> Result<Self, Self::Error> {
        let first_post_id = u64::try_from(row.first_post_id)
            .map_err(|_| RepoError::source(format!("negative post id {}", row.first_post_id)))?;
        let post_count = u64::try_from(row.post_count)
            .map_err(|_| RepoError::source(format!("negative post count {}", row.post_count)))?;
        Ok(AuthorRecord {
            key: row.author_key,
            display_name: row.display_name,
            first_post_id,
            first_post_at: row.first_post_at,
            post_count,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    author_key: String,
    posted_at: DateTime<Utc>,
    category: i16,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            author_key: row.author_key,
            posted_at: row.posted_at,
            category: row.category,
        }
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn health_check(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(RepoError::source)
    }

    async fn list_authors(&self) -> Result<Vec<AuthorRecord>, RepoError> {
        let rows = sqlx::query_as::<_, AuthorRow>(AUTHORS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(RepoError::source)?;
        rows.into_iter().map(AuthorRecord::try_from).collect()
    }

    fn stream_events(&self) -> BoxStream<'_, Result<EventRecord, RepoError>> {
        let stream = sqlx::query_as::<_, EventRow>(EVENTS_SQL)
            .fetch(&self.pool)
            .map(|row| match row {
                Ok(event) => Ok(EventRecord::from(event)),
                Err(err) => Err(RepoError::source(err)),
            });
        Box::pin(stream)
    }
}
