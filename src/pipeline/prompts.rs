//! Prompt templates for the three pipeline stages.
//!
//! Placeholders use `{question}`, `{catalog}`, `{context}`, and `{sql}` and
//! are filled by [`Stage::render_user`](crate::pipeline::Stage::render_user).

use crate::db::metadata::MetadataSnapshot;

// --- Stage 1: schema selection ---

pub const SCHEMA_SELECTION_SYSTEM_PROMPT: &str = "You are a PostgreSQL schema analyst. \
Given a user question and a catalog of tables with their descriptions, you identify which \
tables are needed to answer the question. You answer with a JSON array of table names and \
nothing else.";

pub const SCHEMA_SELECTION_USER_PROMPT: &str = r#"User question: {question}

Table catalog:
{catalog}

Select the tables needed to answer the question. Choose only from the catalog above; never
invent table names. Include tables needed for joins.

Return ONLY a JSON array of table names, for example: ["catchments", "water_resources"]"#;

// --- Stage 2: SQL generation ---

pub const SQL_GENERATION_SYSTEM_PROMPT: &str =
    "You are a PostgreSQL database expert. Generate only SQL queries.";

pub const SQL_GENERATION_USER_PROMPT: &str = r#"Generate a PostgreSQL query that answers the user's question using the provided database schema.

User question: {question}

{context}

Instructions:
1. Generate ONLY the SQL query, no explanations
2. Use proper PostgreSQL syntax
3. Reference only tables and columns present in the schema context above
4. The query must be a single read-only SELECT statement; never INSERT, UPDATE, DELETE, or DDL
5. Include JOINs along the listed relationships when multiple tables are involved
6. Columns named *_id are usually foreign keys; *_name columns hold the descriptive values for those ids
7. Use appropriate WHERE clauses and aggregations
8. Prefer readable, efficient SQL with clear aliases

Return the SQL query in a ```sql code block."#;

// --- Stage 3: validation ---

pub const VALIDATION_SYSTEM_PROMPT: &str = "You are a PostgreSQL reviewer. You check a \
generated query against the schema it is allowed to use, correct it when needed, and \
explain your verdict in one or two sentences.";

pub const VALIDATION_USER_PROMPT: &str = r#"Review this PostgreSQL query:

```sql
{sql}
```

It must answer the question: {question}

It may reference only the tables and columns in this schema context:

{context}

Check that the syntax is valid and that every referenced table and column exists in the
context. If the query is correct, return it unchanged. If it is not, return a corrected
query. If you cannot confirm the query is safe and correct, say so explicitly.

Return the final SQL in a ```sql code block, followed by a short rationale."#;

/// Render the unfiltered table catalog for the schema-selection stage.
///
/// Stage 1 sees every table the Metadata Store knows about; the fine-grained
/// per-column context is only built after selection.
pub fn render_catalog(snapshot: &MetadataSnapshot) -> String {
    let mut out = String::new();
    for table in &snapshot.tables {
        out.push_str(&format!("- {}", table.table_name));
        if !table.comment.is_empty() {
            out.push_str(&format!(": {}", table.comment));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TableComment;

    #[test]
    fn test_render_catalog_lists_all_tables() {
        let mut snapshot = MetadataSnapshot::default();
        snapshot.tables = vec![
            TableComment::new(1, "catchments", "Water catchment areas", "public"),
            TableComment::new(2, "districts", "", "public"),
        ];

        let catalog = render_catalog(&snapshot);
        assert!(catalog.contains("- catchments: Water catchment areas"));
        assert!(catalog.contains("- districts\n"));
    }
}
