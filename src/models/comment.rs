//! Metadata Store row types.
//!
//! The Metadata Store is a pair of human-authored comment tables maintained
//! by database administrators: `comment_on_table` and `comment_on_column`.
//! Rows are immutable reference data, read-only to the pipeline.

use serde::{Deserialize, Serialize};

/// One row of `comment_on_table(id, table_name, comment, schema_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableComment {
    pub id: i64,
    pub table_name: String,
    pub comment: String,
    pub schema_name: String,
}

impl TableComment {
    pub fn new(
        id: i64,
        table_name: impl Into<String>,
        comment: impl Into<String>,
        schema_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            table_name: table_name.into(),
            comment: comment.into(),
            schema_name: schema_name.into(),
        }
    }
}

/// One row of `comment_on_column(id, table_name, column_name, comment, schema_name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnComment {
    pub id: i64,
    pub table_name: String,
    pub column_name: String,
    pub comment: String,
    pub schema_name: String,
}

impl ColumnComment {
    pub fn new(
        id: i64,
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        comment: impl Into<String>,
        schema_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            table_name: table_name.into(),
            column_name: column_name.into(),
            comment: comment.into(),
            schema_name: schema_name.into(),
        }
    }
}

/// A foreign-key edge between two tables, from `information_schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl Relationship {
    pub fn new(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    /// The table on the other end of this edge, if `table` is one endpoint.
    pub fn other_end(&self, table: &str) -> Option<&str> {
        if self.from_table.eq_ignore_ascii_case(table) {
            Some(&self.to_table)
        } else if self.to_table.eq_ignore_ascii_case(table) {
            Some(&self.from_table)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_other_end() {
        let rel = Relationship::new("water_resources", "catchment_id", "catchments", "id");
        assert_eq!(rel.other_end("water_resources"), Some("catchments"));
        assert_eq!(rel.other_end("CATCHMENTS"), Some("water_resources"));
        assert_eq!(rel.other_end("districts"), None);
    }
}
