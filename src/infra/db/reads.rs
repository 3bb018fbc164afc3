use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ReadsRepo, RepoError};
use crate::domain::reader::ReaderId;
use crate::domain::types::Team;

use super::PostgresRepositories;
use super::util::{convert_count, map_sqlx_error};

fn push_reader_condition<'q>(qb: &mut QueryBuilder<'q, sqlx::Postgres>, reader: &'q ReaderId) {
    match reader {
        ReaderId::User(id) => {
            qb.push(" AND user_id = ");
            qb.push_bind(*id);
        }
        ReaderId::Client(token) => {
            qb.push(" AND client_id = ");
            qb.push_bind(token.as_str());
        }
    }
}

#[async_trait]
impl ReadsRepo for PostgresRepositories {
    async fn find_read_since(
        &self,
        reader: &ReaderId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT id FROM post_reads WHERE post_slug = ");
        qb.push_bind(slug);
        push_reader_condition(&mut qb, reader);
        qb.push(" AND created_at > ");
        qb.push_bind(since);
        qb.push(" LIMIT 1");

        qb.build_query_scalar()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn insert_read(&self, reader: &ReaderId, slug: &str) -> Result<Uuid, RepoError> {
        let (user_id, client_id) = reader.as_columns();
        sqlx::query_scalar(
            "INSERT INTO post_reads (post_slug, user_id, client_id) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(slug)
        .bind(user_id)
        .bind(client_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn count_reads(
        &self,
        slug: Option<&str>,
        team: Option<Team>,
    ) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM post_reads r WHERE 1=1 ");
        if let Some(slug) = slug {
            qb.push(" AND r.post_slug = ");
            qb.push_bind(slug);
        }
        if let Some(team) = team {
            qb.push(" AND EXISTS (SELECT 1 FROM users u WHERE u.id = r.user_id AND u.team = ");
            qb.push_bind(team);
            qb.push(")");
        }

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn count_recent_reads(
        &self,
        slug: Option<&str>,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM post_reads r WHERE r.created_at > ");
        qb.push_bind(since);
        if let Some(slug) = slug {
            qb.push(" AND r.post_slug = ");
            qb.push_bind(slug);
        }
        qb.push(" AND EXISTS (SELECT 1 FROM users u WHERE u.id = r.user_id AND u.team = ");
        qb.push_bind(team);
        qb.push(")");

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn count_active_members(
        &self,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users u WHERE u.team = $1 AND EXISTS \
             (SELECT 1 FROM post_reads r WHERE r.user_id = u.id AND r.created_at > $2)",
        )
        .bind(team)
        .bind(since)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn distinct_read_slugs(&self, reader: &ReaderId) -> Result<Vec<String>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT DISTINCT post_slug FROM post_reads WHERE 1=1 ");
        push_reader_condition(&mut qb, reader);

        qb.build_query_scalar()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn popular_post_slugs(&self) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar(
            "SELECT post_slug FROM post_reads GROUP BY post_slug ORDER BY COUNT(*) DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn reader_count(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(DISTINCT user_id) FROM post_reads WHERE user_id IS NOT NULL) \
                  + (SELECT COUNT(DISTINCT client_id) FROM post_reads WHERE client_id IS NOT NULL)",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        convert_count(count)
    }
}
