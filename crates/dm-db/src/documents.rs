//! PostgreSQL document store
//!
//! Documents live in `documents`, their file metadata in `files`. Owner rows
//! live in whatever table the owner's registration names; those tables need
//! an `id` primary key and an `updated_at` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dm_core::traits::Id;
use dm_documents::{
    Document, DocumentError, DocumentQuery, DocumentResult, DocumentStore, DocumentTransaction,
    OwnerRef, OwnerType,
};
use dm_files::File;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{debug, instrument};

use crate::repository::RepositoryError;

const SELECT_DOCUMENTS: &str = r#"
SELECT d.id, d.owner_type, d.owner_id, d.text, d.created_at, d.updated_at,
       f.id AS file_id, f.original_name, f.saved_name, f.mime_type, f.size,
       f.digest, f.created_at AS file_created_at, f.updated_at AS file_updated_at
FROM documents d
LEFT JOIN files f ON f.id = d.file_id
"#;

/// Owner ids may be INT or BIGINT, so the lock reads back a constant
const LOCK_OWNER: &str = "SELECT TRUE FROM {table} WHERE id = $1 FOR UPDATE";

const COUNT_DOCUMENTS: &str = r#"
SELECT COUNT(*)
FROM documents d
LEFT JOIN files f ON f.id = d.file_id
"#;

/// Document row joined with its file
#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: i64,
    pub owner_type: String,
    pub owner_id: i64,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file_id: Option<i64>,
    pub original_name: Option<String>,
    pub saved_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: Option<i64>,
    pub digest: Option<String>,
    pub file_created_at: Option<DateTime<Utc>>,
    pub file_updated_at: Option<DateTime<Utc>>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        let file = match (row.file_id, row.original_name, row.saved_name) {
            (Some(file_id), Some(original_name), Some(saved_name)) => Some(File {
                id: Some(file_id),
                original_name,
                saved_name,
                mime_type: row.mime_type.unwrap_or_default(),
                size: row.size.unwrap_or_default(),
                digest: row.digest.unwrap_or_default(),
                created_at: row.file_created_at.unwrap_or(row.created_at),
                updated_at: row.file_updated_at.unwrap_or(row.updated_at),
            }),
            _ => None,
        };

        Document {
            id: row.id,
            owner_type: row.owner_type,
            owner_id: row.owner_id,
            text: row.text,
            file,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn db(err: sqlx::Error) -> DocumentError {
    RepositoryError::from(err).into()
}

/// Append the owner and search predicates of a query
fn push_predicates(builder: &mut QueryBuilder<'static, Postgres>, query: &DocumentQuery) {
    builder.push(" WHERE TRUE");

    if let Some(owner) = query.owner() {
        builder
            .push(" AND d.owner_type = ")
            .push_bind(owner.owner_type.clone())
            .push(" AND d.owner_id = ")
            .push_bind(owner.owner_id);
    }

    if let Some(pattern) = query.search_pattern() {
        builder
            .push(" AND (f.original_name LIKE ")
            .push_bind(pattern.clone())
            .push(" OR d.text LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

/// `SELECT` for a document query
pub fn select_query(query: &DocumentQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_DOCUMENTS);
    push_predicates(&mut builder, query);

    if query.is_ordered() {
        builder.push(" ORDER BY d.created_at DESC, d.id DESC");
    } else {
        builder.push(" ORDER BY d.id");
    }
    builder
}

/// `SELECT COUNT(*)` for a document query
pub fn count_query(query: &DocumentQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(COUNT_DOCUMENTS);
    push_predicates(&mut builder, query);
    builder
}

/// Quote a possibly schema-qualified table name
fn quote_table(table: &str) -> String {
    table
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn owner_sql(owner_type: &OwnerType, template: &str) -> String {
    template.replace("{table}", &quote_table(&owner_type.table))
}

/// PostgreSQL-backed [`DocumentStore`]
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn begin(&self) -> DocumentResult<Box<dyn DocumentTransaction>> {
        let tx = self.pool.begin().await.map_err(db)?;
        Ok(Box::new(PgDocumentTransaction { tx }))
    }

    async fn find(&self, id: Id) -> DocumentResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!("{} WHERE d.id = $1", SELECT_DOCUMENTS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        Ok(row.map(Document::from))
    }

    #[instrument(skip(self))]
    async fn query(&self, query: &DocumentQuery) -> DocumentResult<Vec<Document>> {
        let rows = select_query(query)
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn count(&self, query: &DocumentQuery) -> DocumentResult<usize> {
        let count = count_query(query)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db)?;

        Ok(count as usize)
    }

    async fn owner_exists(&self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        let sql = owner_sql(owner_type, "SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)");
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db)
    }
}

/// Transaction over [`PgDocumentStore`]; rolls back when dropped uncommitted
pub struct PgDocumentTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgDocumentTransaction {
    async fn find(&mut self, id: Id) -> DocumentResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!("{} WHERE d.id = $1", SELECT_DOCUMENTS))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;

        Ok(row.map(Document::from))
    }

    async fn delete_files(&mut self, documents: &[Document]) -> DocumentResult<()> {
        let file_ids: Vec<i64> = documents
            .iter()
            .filter_map(|d| d.file.as_ref().and_then(|f| f.id))
            .collect();
        if file_ids.is_empty() {
            return Ok(());
        }

        sqlx::query("DELETE FROM files WHERE id = ANY($1)")
            .bind(file_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentTransaction for PgDocumentTransaction {
    async fn lock_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        let sql = owner_sql(owner_type, LOCK_OWNER);
        let locked = sqlx::query_scalar::<_, bool>(&sql)
            .bind(owner_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db)?;

        debug!(table = %owner_type.table, owner_id, locked = locked.is_some(), "Owner row lock");
        Ok(locked.is_some())
    }

    async fn documents_for(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>> {
        let query = DocumentQuery::new().for_ref(owner.clone());
        let rows = select_query(&query)
            .build_query_as::<DocumentRow>()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(db)?;

        Ok(rows.into_iter().map(Document::from).collect())
    }

    async fn insert(&mut self, owner: &OwnerRef, mut file: File) -> DocumentResult<Document> {
        let file_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO files (original_name, saved_name, mime_type, size, digest, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&file.original_name)
        .bind(&file.saved_name)
        .bind(&file.mime_type)
        .bind(file.size)
        .bind(&file.digest)
        .bind(file.created_at)
        .bind(file.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;
        file.id = Some(file_id);

        let (id, created_at, updated_at) = sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            INSERT INTO documents (owner_type, owner_id, file_id, created_at, updated_at)
            VALUES ($1, $2, $3, clock_timestamp(), clock_timestamp())
            RETURNING id, created_at, updated_at
            "#,
        )
        .bind(&owner.owner_type)
        .bind(owner.owner_id)
        .bind(file_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)?;

        Ok(Document {
            id,
            owner_type: owner.owner_type.clone(),
            owner_id: owner.owner_id,
            text: None,
            file: Some(file),
            created_at,
            updated_at,
        })
    }

    async fn update_text(&mut self, id: Id, text: Option<String>) -> DocumentResult<Document> {
        let result = sqlx::query("UPDATE documents SET text = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(text)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;

        if result.rows_affected() == 0 {
            return Err(DocumentError::NotFound(id));
        }

        self.find(id).await?.ok_or(DocumentError::NotFound(id))
    }

    async fn delete(&mut self, id: Id) -> DocumentResult<Option<Document>> {
        let Some(document) = self.find(id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        self.delete_files(std::slice::from_ref(&document)).await?;

        Ok(Some(document))
    }

    async fn touch_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<()> {
        let sql = owner_sql(owner_type, "UPDATE {table} SET updated_at = NOW() WHERE id = $1");
        sqlx::query(&sql)
            .bind(owner_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(())
    }

    async fn has_documents(&mut self, owner: &OwnerRef) -> DocumentResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE owner_type = $1 AND owner_id = $2)",
        )
        .bind(&owner.owner_type)
        .bind(owner.owner_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db)
    }

    async fn delete_owner(&mut self, owner_type: &OwnerType, owner_id: Id) -> DocumentResult<bool> {
        let sql = owner_sql(owner_type, "DELETE FROM {table} WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_owner(&mut self, owner: &OwnerRef) -> DocumentResult<Vec<Document>> {
        let documents = self.documents_for(owner).await?;

        sqlx::query("DELETE FROM documents WHERE owner_type = $1 AND owner_id = $2")
            .bind(&owner.owner_type)
            .bind(owner.owner_id)
            .execute(&mut *self.tx)
            .await
            .map_err(db)?;
        self.delete_files(&documents).await?;

        Ok(documents)
    }

    async fn commit(self: Box<Self>) -> DocumentResult<()> {
        self.tx.commit().await.map_err(db)
    }

    async fn rollback(self: Box<Self>) -> DocumentResult<()> {
        self.tx.rollback().await.map_err(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all() {
        let builder = select_query(&DocumentQuery::new());
        let sql = builder.sql();
        assert!(sql.contains("LEFT JOIN files f ON f.id = d.file_id"));
        assert!(sql.ends_with(" WHERE TRUE ORDER BY d.id"));
        assert!(!sql.contains('$'));
    }

    #[test]
    fn test_select_for_owner_filtered_ordered() {
        let query = DocumentQuery::new()
            .for_owner("Project", 3)
            .filter("report")
            .ordered();
        let builder = select_query(&query);

        assert!(builder.sql().ends_with(
            " WHERE TRUE AND d.owner_type = $1 AND d.owner_id = $2 \
             AND (f.original_name LIKE $3 OR d.text LIKE $4) \
             ORDER BY d.created_at DESC, d.id DESC"
        ));
    }

    #[test]
    fn test_empty_filter_adds_no_predicate() {
        let builder = count_query(&DocumentQuery::new().for_owner("Project", 3).filter(""));
        assert!(builder.sql().trim_start().starts_with("SELECT COUNT(*)"));
        assert!(!builder.sql().contains("LIKE"));
    }

    #[test]
    fn test_quote_table() {
        assert_eq!(quote_table("projects"), "\"projects\"");
        assert_eq!(quote_table("crm.companies"), "\"crm\".\"companies\"");
        assert_eq!(quote_table("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn test_owner_sql() {
        let owner_type = OwnerType::new("Project", "projects");
        assert_eq!(
            owner_sql(&owner_type, "DELETE FROM {table} WHERE id = $1"),
            "DELETE FROM \"projects\" WHERE id = $1"
        );
    }

    #[test]
    fn test_lock_owner_sql_reads_no_id() {
        let owner_type = OwnerType::new("Invoice", "billing.invoices");
        assert_eq!(
            owner_sql(&owner_type, LOCK_OWNER),
            "SELECT TRUE FROM \"billing\".\"invoices\" WHERE id = $1 FOR UPDATE"
        );
    }

    #[test]
    fn test_row_without_file() {
        let now = Utc::now();
        let row = DocumentRow {
            id: 1,
            owner_type: "Project".to_string(),
            owner_id: 2,
            text: Some("hello".to_string()),
            created_at: now,
            updated_at: now,
            file_id: None,
            original_name: None,
            saved_name: None,
            mime_type: None,
            size: None,
            digest: None,
            file_created_at: None,
            file_updated_at: None,
        };

        let document = Document::from(row);
        assert!(document.file.is_none());
        assert_eq!(document.text.as_deref(), Some("hello"));
    }
}
