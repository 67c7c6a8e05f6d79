use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::HashSet;
use std::time::Duration;

use super::store::{GroupStore, JoinOutcome, RejectionLedger, StoreError, SubmissionStore};
use crate::core::filters::CompatibilityFilter;
use crate::models::{
    Group, GroupId, Location, NewGroup, Preference, Rejection, Submission, SubmissionId,
};

/// PostgreSQL-backed submission, group and rejection storage
///
/// Joins use optimistic concurrency: the group row carries a `version`
/// column and a join only applies when the version read by the engine is
/// still current. The group update and the submission pointer update share
/// one transaction, so a dropped or failed call leaves neither behind.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store from a connection string and run migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr<Err = crate::models::domain::ParseAttributeError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: crate::models::domain::ParseAttributeError| StoreError::Corrupt(e.to_string()))
}

fn submission_from_row(row: &PgRow) -> Result<Submission, StoreError> {
    let group_id: Option<i64> = row.try_get("group_id")?;

    Ok(Submission {
        id: SubmissionId::new(row.try_get::<String, _>("id")?),
        category: parse_column(row, "category")?,
        group_size: parse_column(row, "group_size")?,
        gender: parse_column(row, "gender")?,
        location: Location::new(row.try_get("latitude")?, row.try_get("longitude")?),
        created_at: row.try_get("created_at")?,
        group_id: group_id.map(GroupId),
    })
}

fn group_from_row(row: &PgRow) -> Result<Group, StoreError> {
    let members: Vec<String> = row.try_get("members")?;

    Ok(Group {
        id: GroupId(row.try_get("id")?),
        category: parse_column(row, "category")?,
        group_size: parse_column(row, "group_size")?,
        gender: parse_column(row, "gender")?,
        created_at: row.try_get("created_at")?,
        centroid: Location::new(
            row.try_get("centroid_latitude")?,
            row.try_get("centroid_longitude")?,
        ),
        members: members.into_iter().map(SubmissionId::new).collect(),
        version: row.try_get("version")?,
    })
}

/// Text bound to a filter column, `None` meaning "do not filter"
fn filter_value<T: crate::models::domain::Attribute>(preference: Preference<T>) -> Option<String> {
    match preference {
        Preference::Any => None,
        Preference::Exactly(_) => Some(preference.to_string()),
    }
}

fn member_ids(group: &Group) -> Vec<String> {
    group.members.iter().map(|m| m.as_str().to_string()).collect()
}

const GROUP_COLUMNS: &str = r#"
    id, category, group_size, gender, created_at,
    centroid_latitude, centroid_longitude, members, version
"#;

#[async_trait]
impl SubmissionStore for PostgresStore {
    async fn get_submission(&self, id: &SubmissionId) -> Result<Option<Submission>, StoreError> {
        let query = r#"
            SELECT id, category, group_size, gender, latitude, longitude, created_at, group_id
            FROM submissions
            WHERE id = $1
        "#;

        let row = sqlx::query(query)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(submission_from_row).transpose()
    }

    async fn insert_submission(&self, submission: &Submission) -> Result<bool, StoreError> {
        let query = r#"
            INSERT INTO submissions (id, category, group_size, gender, latitude, longitude, created_at, group_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(submission.id.as_str())
            .bind(submission.category.to_string())
            .bind(submission.group_size.to_string())
            .bind(submission.gender.to_string())
            .bind(submission.location.latitude)
            .bind(submission.location.longitude)
            .bind(submission.created_at)
            .bind(submission.group_id.map(|g| g.0))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Submission {} already exists", submission.id);
            return Ok(false);
        }

        tracing::debug!("Inserted submission {}", submission.id);
        Ok(true)
    }
}

#[async_trait]
impl GroupStore for PostgresStore {
    async fn query_compatible(&self, filter: &CompatibilityFilter) -> Result<Vec<Group>, StoreError> {
        let query = format!(
            r#"
            SELECT {GROUP_COLUMNS}
            FROM groups
            WHERE ($1::text IS NULL OR group_size = $1)
              AND ($2::text IS NULL OR gender = $2)
              AND ($3::text IS NULL OR category = $3)
              AND cardinality(members) < capacity
            ORDER BY created_at ASC, id ASC
            "#
        );

        let rows = sqlx::query(&query)
            .bind(filter_value(filter.group_size))
            .bind(filter_value(filter.gender))
            .bind(filter_value(filter.category))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(group_from_row).collect()
    }

    async fn get_group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        let query = format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(group_from_row).transpose()
    }

    async fn commit_join(
        &self,
        joined: &Group,
        expected_version: i64,
        submission_id: &SubmissionId,
    ) -> Result<JoinOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let update_group = r#"
            UPDATE groups
            SET members = $3,
                centroid_latitude = $4,
                centroid_longitude = $5,
                version = version + 1
            WHERE id = $1
              AND version = $2
              AND cardinality(members) < capacity
        "#;

        let result = sqlx::query(update_group)
            .bind(joined.id.0)
            .bind(expected_version)
            .bind(member_ids(joined))
            .bind(joined.centroid.latitude)
            .bind(joined.centroid.longitude)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            tracing::debug!(
                "Join of {} into group {} lost the version race at {}",
                submission_id,
                joined.id,
                expected_version
            );
            return Ok(JoinOutcome::Stale);
        }

        let pointer = sqlx::query("UPDATE submissions SET group_id = $2 WHERE id = $1")
            .bind(submission_id.as_str())
            .bind(joined.id.0)
            .execute(&mut *tx)
            .await?;

        if pointer.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Corrupt(format!(
                "submission {} vanished during join",
                submission_id
            )));
        }

        tx.commit().await?;

        let mut stored = joined.clone();
        stored.version = expected_version + 1;
        Ok(JoinOutcome::Committed(stored))
    }

    async fn create_group(&self, draft: NewGroup, founder: &SubmissionId) -> Result<Group, StoreError> {
        let mut tx = self.pool.begin().await?;

        let insert = r#"
            INSERT INTO groups (
                category, group_size, gender, capacity, created_at,
                centroid_latitude, centroid_longitude, members, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0)
            RETURNING id
        "#;

        let members: Vec<String> = draft.members.iter().map(|m| m.as_str().to_string()).collect();
        let row = sqlx::query(insert)
            .bind(draft.category.to_string())
            .bind(draft.group_size.to_string())
            .bind(draft.gender.to_string())
            .bind(crate::models::capacity(draft.group_size) as i32)
            .bind(draft.created_at)
            .bind(draft.centroid.latitude)
            .bind(draft.centroid.longitude)
            .bind(members)
            .fetch_one(&mut *tx)
            .await?;
        let id = GroupId(row.try_get("id")?);

        let pointer = sqlx::query("UPDATE submissions SET group_id = $2 WHERE id = $1")
            .bind(founder.as_str())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        if pointer.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Corrupt(format!("founder {} does not exist", founder)));
        }

        tx.commit().await?;

        tracing::debug!("Created group {} founded by {}", id, founder);

        Ok(draft.with_id(id))
    }
}

#[async_trait]
impl RejectionLedger for PostgresStore {
    async fn exists(&self, submission_id: &SubmissionId, group_id: GroupId) -> Result<bool, StoreError> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM rejections WHERE submission_id = $1 AND group_id = $2
            ) AS rejected
        "#;

        let row = sqlx::query(query)
            .bind(submission_id.as_str())
            .bind(group_id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("rejected")?)
    }

    async fn rejected_groups(&self, submission_id: &SubmissionId) -> Result<HashSet<GroupId>, StoreError> {
        let rows = sqlx::query("SELECT group_id FROM rejections WHERE submission_id = $1")
            .bind(submission_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<GroupId, StoreError> { Ok(GroupId(row.try_get("group_id")?)) })
            .collect()
    }

    async fn rejections(&self, submission_id: &SubmissionId) -> Result<Vec<Rejection>, StoreError> {
        let query = r#"
            SELECT submission_id, group_id, rejected_at
            FROM rejections
            WHERE submission_id = $1
            ORDER BY rejected_at ASC
        "#;

        let rows = sqlx::query(query)
            .bind(submission_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<Rejection, StoreError> {
                Ok(Rejection {
                    submission_id: SubmissionId::new(row.try_get::<String, _>("submission_id")?),
                    group_id: GroupId(row.try_get("group_id")?),
                    rejected_at: row.try_get("rejected_at")?,
                })
            })
            .collect()
    }

    async fn append(&self, rejection: &Rejection) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let insert = r#"
            INSERT INTO rejections (submission_id, group_id, rejected_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (submission_id, group_id) DO NOTHING
        "#;

        sqlx::query(insert)
            .bind(rejection.submission_id.as_str())
            .bind(rejection.group_id.0)
            .bind(rejection.rejected_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE submissions SET group_id = NULL WHERE id = $1")
            .bind(rejection.submission_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            "Recorded rejection: {} -> group {}",
            rejection.submission_id,
            rejection.group_id
        );

        Ok(())
    }
}
