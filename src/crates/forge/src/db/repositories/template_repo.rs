//! Template repository for database operations

use crate::db::connection::DatabasePool;
use crate::db::models::TemplateRow;
use crate::db::store::TemplateFilter;

/// Template repository for managing template rows
pub struct TemplateRepository;

const VISIBLE: &str = "(owner_id = ? OR is_public = 1)";

impl TemplateRepository {
    /// Insert a new template row
    pub async fn create(pool: &DatabasePool, row: &TemplateRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO templates (id, owner_id, name, category, is_public, tags, created_at, updated_at, body)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.owner_id)
        .bind(&row.name)
        .bind(&row.category)
        .bind(row.is_public)
        .bind(&row.tags)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .bind(&row.body)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Get a template by ID
    pub async fn get_by_id(pool: &DatabasePool, id: &str) -> Result<Option<TemplateRow>, sqlx::Error> {
        sqlx::query_as::<_, TemplateRow>("SELECT * FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Replace every column of an existing row
    ///
    /// # Returns
    /// Number of rows affected (0 when the id is unknown)
    pub async fn update(pool: &DatabasePool, row: &TemplateRow) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE templates
             SET owner_id = ?, name = ?, category = ?, is_public = ?, tags = ?, updated_at = ?, body = ?
             WHERE id = ?",
        )
        .bind(&row.owner_id)
        .bind(&row.name)
        .bind(&row.category)
        .bind(row.is_public)
        .bind(&row.tags)
        .bind(&row.updated_at)
        .bind(&row.body)
        .bind(&row.id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete a template
    pub async fn delete(pool: &DatabasePool, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM templates WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    fn where_clause(filter: &TemplateFilter) -> String {
        let mut clause = format!("WHERE {}", VISIBLE);
        if filter.category.is_some() {
            clause.push_str(" AND category = ?");
        }
        if filter.tag.is_some() {
            clause.push_str(" AND EXISTS (SELECT 1 FROM json_each(templates.tags) WHERE json_each.value = ?)");
        }
        if filter.is_public.is_some() {
            clause.push_str(" AND is_public = ?");
        }
        clause
    }

    /// Count templates visible to the filter's viewer
    pub async fn count(pool: &DatabasePool, filter: &TemplateFilter) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM templates {}", Self::where_clause(filter));
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(&filter.viewer);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        if let Some(tag) = &filter.tag {
            query = query.bind(tag);
        }
        if let Some(is_public) = filter.is_public {
            query = query.bind(i64::from(is_public));
        }
        query.fetch_one(pool).await
    }

    /// List one page of visible templates, most recently updated first
    pub async fn list(pool: &DatabasePool, filter: &TemplateFilter) -> Result<Vec<TemplateRow>, sqlx::Error> {
        let sql = format!(
            "SELECT * FROM templates {} ORDER BY updated_at DESC, rowid DESC LIMIT ? OFFSET ?",
            Self::where_clause(filter)
        );
        let mut query = sqlx::query_as::<_, TemplateRow>(&sql).bind(&filter.viewer);
        if let Some(category) = &filter.category {
            query = query.bind(category);
        }
        if let Some(tag) = &filter.tag {
            query = query.bind(tag);
        }
        if let Some(is_public) = filter.is_public {
            query = query.bind(i64::from(is_public));
        }
        query
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.skip))
            .fetch_all(pool)
            .await
    }
}
