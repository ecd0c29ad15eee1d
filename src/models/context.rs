//! Per-request schema context.
//!
//! A `SchemaContext` is the filtered view of the Metadata Store judged
//! relevant to one question: tables with their comments, a bounded set of
//! columns per table, and the foreign-key edges between included tables.
//! It is derived, in-memory, and ephemeral; every table in it must exist in
//! the Metadata Store snapshot it was built from.

use crate::models::Relationship;
use serde::Serialize;

/// One column inside a `TableContext`.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnContext {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Primary or foreign key. Key columns are always retained so joins can
    /// be reconstructed even under truncation.
    pub is_key: bool,
}

/// One table judged relevant to the current question.
#[derive(Debug, Clone, Serialize)]
pub struct TableContext {
    pub name: String,
    pub schema_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub columns: Vec<ColumnContext>,
    /// Relevance score assigned by the analyzer; higher is more relevant.
    pub score: u32,
}

/// The filtered, per-request view of relevant tables and columns.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaContext {
    pub tables: Vec<TableContext>,
    pub relationships: Vec<Relationship>,
}

impl SchemaContext {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Names of all included tables, in relevance order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Case-insensitive table membership test.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Restrict the context to the given table names (case-insensitive),
    /// dropping relationships that no longer connect two included tables.
    /// Used to intersect the mechanical filter with the model's selection.
    pub fn retain_tables(&self, names: &[String]) -> SchemaContext {
        let tables: Vec<TableContext> = self
            .tables
            .iter()
            .filter(|t| names.iter().any(|n| n.eq_ignore_ascii_case(&t.name)))
            .cloned()
            .collect();

        let relationships = self
            .relationships
            .iter()
            .filter(|r| {
                let has = |name: &str| {
                    tables.iter().any(|t| t.name.eq_ignore_ascii_case(name))
                };
                has(&r.from_table) && has(&r.to_table)
            })
            .cloned()
            .collect();

        SchemaContext {
            tables,
            relationships,
        }
    }

    /// Total character size of the rendered context, used by the analyzer to
    /// enforce the prompt budget.
    pub fn rendered_len(&self) -> usize {
        self.render().len()
    }

    /// Render the context as prompt text.
    ///
    /// The format mirrors what the schema analyzer feeds the model:
    /// one block per table with description and columns, followed by the
    /// foreign-key relationships between included tables.
    pub fn render(&self) -> String {
        let mut out = String::from("Database Schema Context:\n\n");

        for table in &self.tables {
            out.push_str(&format!("Table: {}.{}\n", table.schema_name, table.name));
            if let Some(comment) = &table.comment {
                out.push_str(&format!("  Description: {}\n", comment));
            }
            if !table.columns.is_empty() {
                out.push_str("  Columns:\n");
                for col in &table.columns {
                    out.push_str(&format!("    - {}", col.name));
                    if let Some(dt) = &col.data_type {
                        out.push_str(&format!(" ({})", dt));
                    }
                    if let Some(comment) = &col.comment {
                        out.push_str(&format!(": {}", comment));
                    }
                    out.push('\n');
                }
            }
            out.push('\n');
        }

        if !self.relationships.is_empty() {
            out.push_str("Relationships:\n");
            for rel in &self.relationships {
                out.push_str(&format!(
                    "  - {}.{} -> {}.{}\n",
                    rel.from_table, rel.from_column, rel.to_table, rel.to_column
                ));
            }
        }

        out
    }

    /// A short preview of the rendered context for API responses and logs.
    pub fn preview(&self, max_chars: usize) -> String {
        let rendered = self.render();
        if rendered.len() <= max_chars {
            return rendered;
        }
        let mut cut = max_chars;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &rendered[..cut])
    }
}
