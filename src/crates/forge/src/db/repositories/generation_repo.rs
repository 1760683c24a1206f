//! Generation job repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::GenerationRow;
use crate::db::store::JobFilter;

/// Generation repository for managing job rows
pub struct GenerationRepository;

impl GenerationRepository {
    /// Insert a new job row. Fails with a unique violation on a taken `job_id`.
    pub async fn create(pool: &DatabasePool, row: &GenerationRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO generations (job_id, user_id, template_id, status, created_at, body)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.job_id)
        .bind(&row.user_id)
        .bind(&row.template_id)
        .bind(&row.status)
        .bind(&row.created_at)
        .bind(&row.body)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Get a job by ID
    pub async fn get_by_id(pool: &DatabasePool, job_id: &str) -> Result<Option<GenerationRow>, sqlx::Error> {
        sqlx::query_as::<_, GenerationRow>("SELECT * FROM generations WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Overwrite a job only while its stored status is still active
    ///
    /// # Returns
    /// Number of rows affected: 0 when the job is missing or terminal
    pub async fn update_active(pool: &DatabasePool, row: &GenerationRow) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generations SET status = ?, body = ?
             WHERE job_id = ? AND status IN ('pending', 'processing')",
        )
        .bind(&row.status)
        .bind(&row.body)
        .bind(&row.job_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Mark an active job cancelled in one statement. The JSON body is
    /// edited in place so the rest of the document stays as stored.
    ///
    /// # Returns
    /// The updated row, or `None` when the job is missing or terminal
    pub async fn cancel_active(
        pool: &DatabasePool,
        job_id: &str,
        message: &str,
        completed_at: &str,
    ) -> Result<Option<GenerationRow>, sqlx::Error> {
        sqlx::query_as::<_, GenerationRow>(
            "UPDATE generations
             SET status = 'cancelled',
                 body = json_set(body, '$.status', 'cancelled', '$.error_message', ?, '$.completed_at', ?)
             WHERE job_id = ? AND status IN ('pending', 'processing')
             RETURNING *",
        )
        .bind(message)
        .bind(completed_at)
        .bind(job_id)
        .fetch_optional(pool)
        .await
    }

    /// Check whether a job row exists
    pub async fn exists(pool: &DatabasePool, job_id: &str) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM generations WHERE job_id = ?")
            .bind(job_id)
            .fetch_one(pool)
            .await?;
        Ok(count > 0)
    }

    fn where_clause(filter: &JobFilter) -> String {
        let mut clause = String::from("WHERE user_id = ?");
        if filter.status.is_some() {
            clause.push_str(" AND status = ?");
        }
        if filter.template_id.is_some() {
            clause.push_str(" AND template_id = ?");
        }
        clause
    }

    /// Count the user's jobs matching the filter
    pub async fn count(pool: &DatabasePool, filter: &JobFilter) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM generations {}", Self::where_clause(filter));
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(&filter.user_id);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(template_id) = &filter.template_id {
            query = query.bind(template_id);
        }
        query.fetch_one(pool).await
    }

    /// List one page of the user's jobs, newest first
    pub async fn list(pool: &DatabasePool, filter: &JobFilter) -> Result<Vec<GenerationRow>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM generations {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            Self::where_clause(filter)
        );
        let mut query = sqlx::query_as::<_, GenerationRow>(&sql).bind(&filter.user_id);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(template_id) = &filter.template_id {
            query = query.bind(template_id);
        }
        query
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.skip))
            .fetch_all(pool)
            .await
    }
}
