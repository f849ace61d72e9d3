//! PostgreSQL store adapters
//!
//! Schema lives in `migrations/0001_recommendation_tables.sql`. Nullable
//! columns are coalesced in SQL so a record with missing fields reads as
//! its documented defaults (empty tags, zero counters) instead of failing.

use super::{ActivityQuery, ActivityStore, ContentStore, StoreError, StoreResult};
use crate::models::{ActivityEvent, Post, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

type EventRow = (String, String, DateTime<Utc>);
type PostRow = (String, String, Vec<String>, i64, i64, i64, Option<Vec<f32>>);

const POST_COLUMNS: &str = r#"
    id,
    user_id,
    COALESCE(tags, '{}'::TEXT[]) AS tags,
    COALESCE(likes, 0) AS likes,
    COALESCE(saves, 0) AS saves,
    COALESCE(views, 0) AS views,
    embedding
"#;

fn counter(value: i64) -> u64 {
    value.max(0) as u64
}

fn to_event((user_id, post_id, timestamp): EventRow) -> ActivityEvent {
    ActivityEvent {
        user_id,
        post_id,
        timestamp,
    }
}

fn to_post((id, user_id, tags, likes, saves, views, embedding): PostRow) -> Post {
    Post {
        id,
        user_id,
        tags,
        likes: counter(likes),
        saves: counter(saves),
        views: counter(views),
        embedding,
    }
}

fn unavailable(context: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        error!("{}: {}", context, e);
        StoreError::Unavailable(format!("{}: {}", context, e))
    }
}

/// Activity log adapter over `user_activities_log`
#[derive(Clone)]
pub struct PgActivityStore {
    pool: PgPool,
}

impl PgActivityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityStore for PgActivityStore {
    async fn query_by_user(
        &self,
        user_id: &str,
        query: ActivityQuery,
    ) -> StoreResult<Vec<ActivityEvent>> {
        // Events without a post reference carry no signal; LIMIT NULL means no limit
        let sql = if query.newest_first {
            r#"
            SELECT user_id, post_id, COALESCE(occurred_at, to_timestamp(0))
            FROM user_activities_log
            WHERE user_id = $1 AND post_id IS NOT NULL
            ORDER BY occurred_at DESC NULLS LAST, id DESC
            LIMIT $2
            "#
        } else {
            r#"
            SELECT user_id, post_id, COALESCE(occurred_at, to_timestamp(0))
            FROM user_activities_log
            WHERE user_id = $1 AND post_id IS NOT NULL
            ORDER BY id
            LIMIT $2
            "#
        };

        let rows = sqlx::query_as::<_, EventRow>(sql)
            .bind(user_id)
            .bind(query.limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to query activity by user"))?;

        Ok(rows.into_iter().map(to_event).collect())
    }

    async fn distinct_user_ids(&self) -> StoreResult<Vec<UserId>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT user_id
            FROM user_activities_log
            GROUP BY user_id
            ORDER BY MIN(id)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Failed to list active users"))
    }

    async fn query_by_users(&self, user_ids: &[UserId]) -> StoreResult<Vec<ActivityEvent>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT user_id, post_id, COALESCE(occurred_at, to_timestamp(0))
            FROM user_activities_log
            WHERE user_id = ANY($1) AND post_id IS NOT NULL
            ORDER BY id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Failed to query activity by users"))?;

        Ok(rows.into_iter().map(to_event).collect())
    }
}

/// Content adapter over `posts` and `users`
#[derive(Clone)]
pub struct PgContentStore {
    pool: PgPool,
}

impl PgContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContentStore for PgContentStore {
    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);

        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to get post"))?;

        Ok(row.map(to_post))
    }

    async fn all_posts(&self) -> StoreResult<Vec<Post>> {
        let sql = format!("SELECT {} FROM posts ORDER BY created_at, id", POST_COLUMNS);

        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable("Failed to list posts"))?;

        Ok(rows.into_iter().map(to_post).collect())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT id, COALESCE(followers_count, 0), COALESCE(profile_views, 0)
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable("Failed to get user"))?;

        Ok(row.map(|(id, followers_count, profile_views)| User {
            id,
            followers_count: counter(followers_count),
            profile_views: counter(profile_views),
        }))
    }
}
