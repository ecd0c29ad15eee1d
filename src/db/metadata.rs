//! Metadata Store access.
//!
//! The Metadata Store is a pair of comment tables maintained by database
//! administrators, plus the key/relationship information PostgreSQL already
//! keeps in `information_schema`. This module reads all of it into an
//! in-memory [`MetadataSnapshot`] once per process (refreshable), so the
//! schema analyzer can work without touching the database per request.

use crate::error::{AgentError, AgentResult};
use crate::models::{ColumnComment, Relationship, TableComment};
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

// =============================================================================
// SQL Query Templates
// =============================================================================

mod queries {
    pub const LIST_TABLE_COMMENTS: &str = r#"
        SELECT id, table_name, comment, schema_name
        FROM {schema}.comment_on_table
        ORDER BY table_name
        "#;

    pub const LIST_COLUMN_COMMENTS: &str = r#"
        SELECT id, table_name, column_name, comment, schema_name
        FROM {schema}.comment_on_column
        ORDER BY table_name, column_name
        "#;

    pub const LIST_FOREIGN_KEYS: &str = r#"
        SELECT
            tc.table_name AS from_table,
            kcu.column_name AS from_column,
            ccu.table_name AS to_table,
            ccu.column_name AS to_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_name = tc.constraint_name
            AND ccu.table_schema = tc.table_schema
        WHERE tc.constraint_type = 'FOREIGN KEY'
        AND tc.table_schema = $1
        "#;

    pub const LIST_PRIMARY_KEYS: &str = r#"
        SELECT
            tc.table_name,
            kcu.column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema = $1
        "#;

    pub const LIST_COLUMN_TYPES: &str = r#"
        SELECT table_name, column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = $1
        ORDER BY table_name, ordinal_position
        "#;
}

/// In-memory mirror of the Metadata Store, loaded once and shared.
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    pub tables: Vec<TableComment>,
    pub columns: Vec<ColumnComment>,
    pub relationships: Vec<Relationship>,
    /// (table_name, column_name) pairs that are primary or foreign keys.
    pub key_columns: HashSet<(String, String)>,
    /// (table_name, column_name) -> data type from information_schema.
    pub column_types: HashMap<(String, String), String>,
}

impl MetadataSnapshot {
    /// Comment rows for one table, in column order.
    pub fn columns_of(&self, table_name: &str) -> Vec<&ColumnComment> {
        self.columns
            .iter()
            .filter(|c| c.table_name.eq_ignore_ascii_case(table_name))
            .collect()
    }

    /// Whether the given column is a primary or foreign key.
    pub fn is_key_column(&self, table_name: &str, column_name: &str) -> bool {
        self.key_columns
            .contains(&(table_name.to_lowercase(), column_name.to_lowercase()))
    }

    /// Data type of a column, when information_schema knows it.
    pub fn column_type(&self, table_name: &str, column_name: &str) -> Option<&str> {
        self.column_types
            .get(&(table_name.to_lowercase(), column_name.to_lowercase()))
            .map(String::as_str)
    }

    /// Foreign-key edges touching the given table.
    pub fn relationships_of(&self, table_name: &str) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|r| {
                r.from_table.eq_ignore_ascii_case(table_name)
                    || r.to_table.eq_ignore_ascii_case(table_name)
            })
            .collect()
    }
}

/// Reads the Metadata Store into snapshots.
pub struct MetadataStore {
    schema_name: String,
}

impl MetadataStore {
    /// Create a store reader for one database schema.
    ///
    /// The schema name is interpolated into the comment-table queries, so it
    /// must be a plain identifier; anything else is rejected up front.
    pub fn new(schema_name: impl Into<String>) -> AgentResult<Self> {
        let schema_name = schema_name.into();
        if !is_valid_identifier(&schema_name) {
            return Err(AgentError::invalid_input(format!(
                "Invalid schema name '{}': expected a plain SQL identifier",
                schema_name
            )));
        }
        Ok(Self { schema_name })
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    /// Load a full snapshot: comment rows, foreign keys, primary keys, and
    /// column types.
    pub async fn load(&self, pool: &PgPool) -> AgentResult<MetadataSnapshot> {
        let tables = self.fetch_table_comments(pool).await?;
        let columns = self.fetch_column_comments(pool).await?;
        let relationships = self.fetch_relationships(pool).await?;

        let mut key_columns: HashSet<(String, String)> = HashSet::new();
        for row in sqlx::query(queries::LIST_PRIMARY_KEYS)
            .bind(&self.schema_name)
            .fetch_all(pool)
            .await?
        {
            let table: String = row.get("table_name");
            let column: String = row.get("column_name");
            key_columns.insert((table.to_lowercase(), column.to_lowercase()));
        }
        for rel in &relationships {
            key_columns.insert((
                rel.from_table.to_lowercase(),
                rel.from_column.to_lowercase(),
            ));
            key_columns.insert((rel.to_table.to_lowercase(), rel.to_column.to_lowercase()));
        }

        let mut column_types = HashMap::new();
        for row in sqlx::query(queries::LIST_COLUMN_TYPES)
            .bind(&self.schema_name)
            .fetch_all(pool)
            .await?
        {
            let table: String = row.get("table_name");
            let column: String = row.get("column_name");
            let data_type: String = row.get("data_type");
            column_types.insert((table.to_lowercase(), column.to_lowercase()), data_type);
        }

        info!(
            tables = tables.len(),
            columns = columns.len(),
            relationships = relationships.len(),
            schema = %self.schema_name,
            "Loaded metadata snapshot"
        );

        Ok(MetadataSnapshot {
            tables,
            columns,
            relationships,
            key_columns,
            column_types,
        })
    }

    async fn fetch_table_comments(&self, pool: &PgPool) -> AgentResult<Vec<TableComment>> {
        let sql = queries::LIST_TABLE_COMMENTS.replace("{schema}", &self.schema_name);
        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let tables = rows
            .iter()
            .map(|row| TableComment {
                id: get_id(row),
                table_name: row.get("table_name"),
                comment: row.try_get("comment").unwrap_or_default(),
                schema_name: row
                    .try_get("schema_name")
                    .unwrap_or_else(|_| self.schema_name.clone()),
            })
            .collect::<Vec<_>>();

        debug!(count = tables.len(), "Fetched table comments");
        Ok(tables)
    }

    async fn fetch_column_comments(&self, pool: &PgPool) -> AgentResult<Vec<ColumnComment>> {
        let sql = queries::LIST_COLUMN_COMMENTS.replace("{schema}", &self.schema_name);
        let rows = sqlx::query(&sql).fetch_all(pool).await?;

        let columns = rows
            .iter()
            .map(|row| ColumnComment {
                id: get_id(row),
                table_name: row.get("table_name"),
                column_name: row.get("column_name"),
                comment: row.try_get("comment").unwrap_or_default(),
                schema_name: row
                    .try_get("schema_name")
                    .unwrap_or_else(|_| self.schema_name.clone()),
            })
            .collect::<Vec<_>>();

        debug!(count = columns.len(), "Fetched column comments");
        Ok(columns)
    }

    async fn fetch_relationships(&self, pool: &PgPool) -> AgentResult<Vec<Relationship>> {
        let rows = sqlx::query(queries::LIST_FOREIGN_KEYS)
            .bind(&self.schema_name)
            .fetch_all(pool)
            .await?;

        let relationships = rows
            .iter()
            .map(|row| Relationship {
                from_table: row.get("from_table"),
                from_column: row.get("from_column"),
                to_table: row.get("to_table"),
                to_column: row.get("to_column"),
            })
            .collect::<Vec<_>>();

        debug!(count = relationships.len(), "Fetched foreign keys");
        Ok(relationships)
    }
}

/// The comment tables ship with either INT or BIGINT ids depending on who
/// bootstrapped them; accept both.
fn get_id(row: &sqlx::postgres::PgRow) -> i64 {
    row.try_get::<i64, _>("id")
        .or_else(|_| row.try_get::<i32, _>("id").map(i64::from))
        .unwrap_or_default()
}

/// A plain SQL identifier: letters, digits, underscores, not starting with a
/// digit. Schema names are interpolated into SQL text, so anything fancier
/// is rejected.
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
