use async_trait::async_trait;
use kiln_core::{DetailPatch, Instance, InstanceDetail, InstanceId, JobHandle, RequestIndex};
use sqlx::{
    Row,
    postgres::{PgPool, PgRow},
};
use uuid::Uuid;

use super::{InstanceStore, Result, Snapshot, StoreError};

const INSTANCE_COLUMNS: &str = r#"
    id, created_at, input, expiry, error, access_url, status, duration,
    log_path, output_path, job_endpoint, job_id
"#;

const DOCUMENT_FILTER: &str =
    "flavor = $1 AND owner = $2 AND parent_id = $3 AND fingerprint = $4";

/// PostgreSQL implementation of InstanceStore.
///
/// A document is a row of `instance_documents`; its instances live in
/// `instances` ordered by `seq`, which takes the document version produced by
/// the insert that created them.
pub struct PostgresInstanceStore {
    pool: PgPool,
}

impl PostgresInstanceStore {
    /// Create a new PostgresInstanceStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Ids are UUIDs here, so anything else names no stored instance
fn parse_id(id: &InstanceId) -> Result<Uuid> {
    Uuid::parse_str(id.as_str()).map_err(|_| StoreError::NotFound(id.to_string()))
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::DatabaseError(e.to_string())
}

fn row_to_instance(row: &PgRow) -> Instance {
    let id: Uuid = row.get("id");
    let job_endpoint: Option<String> = row.get("job_endpoint");
    let job_id: Option<String> = row.get("job_id");

    Instance {
        id: InstanceId::from_string(id.to_string()),
        created_at: row.get("created_at"),
        input: row.get("input"),
        detail: InstanceDetail {
            expiry: row.get("expiry"),
            error: row.get("error"),
            access_url: row.get("access_url"),
            status: row.get("status"),
            duration: row.get("duration"),
            log_path: row.get("log_path"),
            output_path: row.get("output_path"),
        },
        job: match (job_endpoint, job_id) {
            (Some(endpoint), Some(job_id)) => Some(JobHandle { endpoint, job_id }),
            _ => None,
        },
    }
}

#[async_trait]
impl InstanceStore for PostgresInstanceStore {
    async fn find_instances(&self, index: &RequestIndex) -> Result<Snapshot> {
        let version: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT version FROM instance_documents WHERE {}",
            DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(version) = version else {
            return Ok(Snapshot::default());
        };

        // Read after the version: a newer instance only makes our version stale
        let rows = sqlx::query(&format!(
            "SELECT {} FROM instances WHERE {} ORDER BY seq",
            INSTANCE_COLUMNS, DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(Snapshot {
            instances: rows.iter().map(row_to_instance).collect(),
            version: Some(version as u64),
        })
    }

    async fn find_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<Instance> {
        let uuid = parse_id(id)?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM instances WHERE {} AND id = $5",
            INSTANCE_COLUMNS, DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref()
            .map(row_to_instance)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn insert(
        &self,
        index: &RequestIndex,
        instance: Instance,
        version: Option<u64>,
    ) -> Result<Instance> {
        let uuid = parse_id(&instance.id)?;
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let next = match version {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO instance_documents (flavor, owner, parent_id, fingerprint, version)
                    VALUES ($1, $2, $3, $4, 1)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(index.flavor.to_string())
                .bind(&index.owner)
                .bind(&index.parent_id)
                .bind(index.fingerprint_key())
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::DocumentExists(index.to_string()));
                }
                1
            }
            Some(expected) => {
                let result = sqlx::query(&format!(
                    "UPDATE instance_documents SET version = version + 1 WHERE {} AND version = $5",
                    DOCUMENT_FILTER
                ))
                .bind(index.flavor.to_string())
                .bind(&index.owner)
                .bind(&index.parent_id)
                .bind(index.fingerprint_key())
                .bind(expected as i64)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;

                if result.rows_affected() == 0 {
                    return Err(StoreError::VersionConflict {
                        index: index.to_string(),
                        expected,
                    });
                }
                expected as i64 + 1
            }
        };

        sqlx::query(
            r#"
            INSERT INTO instances (
                id, flavor, owner, parent_id, fingerprint, seq, created_at, input,
                expiry, error, access_url, status, duration, log_path, output_path,
                job_endpoint, job_id
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
            )
            "#,
        )
        .bind(uuid)
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .bind(next)
        .bind(instance.created_at)
        .bind(&instance.input)
        .bind(instance.detail.expiry)
        .bind(&instance.detail.error)
        .bind(&instance.detail.access_url)
        .bind(&instance.detail.status)
        .bind(instance.detail.duration)
        .bind(&instance.detail.log_path)
        .bind(&instance.detail.output_path)
        .bind(instance.job.as_ref().map(|j| j.endpoint.clone()))
        .bind(instance.job.as_ref().map(|j| j.job_id.clone()))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(instance)
    }

    async fn update_detail(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        patch: &DetailPatch,
    ) -> Result<()> {
        let uuid = parse_id(id)?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE instances
            SET error = COALESCE($6, error),
                access_url = COALESCE($7, access_url),
                expiry = COALESCE($8, expiry),
                status = COALESCE($9, status),
                duration = COALESCE($10, duration),
                log_path = COALESCE($11, log_path),
                output_path = COALESCE($12, output_path)
            WHERE {} AND id = $5
            "#,
            DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .bind(uuid)
        .bind(&patch.error)
        .bind(&patch.access_url)
        .bind(patch.expiry)
        .bind(&patch.status)
        .bind(patch.duration)
        .bind(&patch.log_path)
        .bind(&patch.output_path)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn save_job(
        &self,
        index: &RequestIndex,
        id: &InstanceId,
        job: &JobHandle,
    ) -> Result<()> {
        let uuid = parse_id(id)?;

        let result = sqlx::query(&format!(
            "UPDATE instances SET job_endpoint = $6, job_id = $7 WHERE {} AND id = $5",
            DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .bind(uuid)
        .bind(&job.endpoint)
        .bind(&job.job_id)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    async fn remove_instance(&self, index: &RequestIndex, id: &InstanceId) -> Result<()> {
        let uuid = parse_id(id)?;

        let result = sqlx::query(&format!(
            "DELETE FROM instances WHERE {} AND id = $5",
            DOCUMENT_FILTER
        ))
        .bind(index.flavor.to_string())
        .bind(&index.owner)
        .bind(&index.parent_id)
        .bind(index.fingerprint_key())
        .bind(uuid)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }
}
