//! SQL statement validation for read-only enforcement.
//!
//! Only Stage-3 output (or an explicitly re-validated statement) is eligible
//! for execution, and this module is the gate: it checks that a candidate is
//! a single read-only SELECT and that every table it references exists in
//! the per-request [`SchemaContext`].
//!
//! Uses [sqlparser](https://docs.rs/sqlparser/) for accurate SQL parsing,
//! ensuring that no write operation can bypass validation through formatting
//! tricks, SQL comments, or string literals that merely contain dangerous
//! keywords.

use crate::error::{AgentError, AgentResult};
use crate::models::SchemaContext;
use sqlparser::ast::{
    Expr, Query, Select, SetExpr, Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::collections::BTreeSet;

/// Type of SQL statement detected by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlStatementType {
    /// SELECT and other read-only queries
    Select,
    /// INSERT, UPDATE, DELETE, MERGE, COPY
    DmlWrite,
    /// CREATE, DROP, ALTER, TRUNCATE
    Ddl,
    /// BEGIN, COMMIT, ROLLBACK, SAVEPOINT
    Transaction,
    /// CALL, EXECUTE, PREPARE
    ProcedureCall,
    /// GRANT, REVOKE, SET, VACUUM, ...
    Administrative,
    /// Unknown or unparseable statement
    Unknown,
}

/// Parse a candidate into statements, rejecting empty or unparsable input.
fn parse(sql: &str) -> AgentResult<Vec<Statement>> {
    let dialect = PostgreSqlDialect {};

    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| AgentError::unsafe_sql(sql, format!("failed to parse SQL: {}", e)))?;

    if statements.is_empty() {
        return Err(AgentError::unsafe_sql(sql, "empty SQL statement"));
    }

    Ok(statements)
}

/// Validate that a candidate is exactly one read-only SELECT statement.
///
/// Returns `Ok(())` for a single `SELECT` (including CTEs, subqueries, and
/// set operations), or `Err(AgentError::UnsafeSql)` for anything else:
/// multiple statements, DML, DDL, transaction control, procedure calls, or
/// administrative commands.
///
/// # Examples
///
/// ```
/// use nl2sql_server::guard::validate_read_only;
///
/// assert!(validate_read_only("SELECT * FROM catchments").is_ok());
/// assert!(validate_read_only("DROP TABLE catchments").is_err());
/// assert!(validate_read_only("SELECT 1; DELETE FROM catchments").is_err());
/// ```
pub fn validate_read_only(sql: &str) -> AgentResult<()> {
    let statements = parse(sql)?;

    if statements.len() > 1 {
        return Err(AgentError::unsafe_sql(
            sql,
            "multiple statements are not allowed; submit a single SELECT",
        ));
    }

    let (stmt_type, operation) = classify_statement(&statements[0]);
    if stmt_type != SqlStatementType::Select {
        return Err(AgentError::unsafe_sql(
            sql,
            format!("{} is not a read-only statement", operation),
        ));
    }

    Ok(())
}

/// Extract the base table names a SELECT references, lowercased and deduped.
///
/// Walks FROM/JOIN clauses, derived tables, set operations, and subqueries
/// in WHERE expressions. Names introduced by a WITH clause are aliases, not
/// base tables, and are excluded.
pub fn referenced_tables(sql: &str) -> AgentResult<Vec<String>> {
    let statements = parse(sql)?;

    let mut tables = BTreeSet::new();
    let mut cte_names = BTreeSet::new();
    for stmt in &statements {
        if let Statement::Query(query) = stmt {
            collect_from_query(query, &mut tables, &mut cte_names);
        }
    }

    Ok(tables
        .into_iter()
        .filter(|t| !cte_names.contains(t))
        .collect())
}

/// Check that every table referenced by a validated SELECT is present in the
/// schema context. Violations fail closed with `UnsafeSql` naming the first
/// offending table.
pub fn check_context_references(sql: &str, context: &SchemaContext) -> AgentResult<()> {
    for table in referenced_tables(sql)? {
        if !context.contains_table(&table) {
            return Err(AgentError::unsafe_sql(
                sql,
                format!(
                    "references table '{}' which is not in the schema context",
                    table
                ),
            ));
        }
    }
    Ok(())
}

/// Classify a parsed statement into a statement type.
fn classify_statement(stmt: &Statement) -> (SqlStatementType, &'static str) {
    match stmt {
        // Read-only operations - ALLOWED
        Statement::Query(_) => (SqlStatementType::Select, "SELECT"),

        // DML write operations - BLOCKED
        Statement::Insert(_) => (SqlStatementType::DmlWrite, "INSERT"),
        Statement::Update { .. } => (SqlStatementType::DmlWrite, "UPDATE"),
        Statement::Delete(_) => (SqlStatementType::DmlWrite, "DELETE"),
        Statement::Merge { .. } => (SqlStatementType::DmlWrite, "MERGE"),
        Statement::Copy { .. } => (SqlStatementType::DmlWrite, "COPY"),

        // DDL operations - BLOCKED
        Statement::CreateTable { .. } => (SqlStatementType::Ddl, "CREATE TABLE"),
        Statement::CreateView { .. } => (SqlStatementType::Ddl, "CREATE VIEW"),
        Statement::CreateIndex(_) => (SqlStatementType::Ddl, "CREATE INDEX"),
        Statement::CreateSchema { .. } => (SqlStatementType::Ddl, "CREATE SCHEMA"),
        Statement::CreateDatabase { .. } => (SqlStatementType::Ddl, "CREATE DATABASE"),
        Statement::CreateSequence { .. } => (SqlStatementType::Ddl, "CREATE SEQUENCE"),
        Statement::CreateFunction { .. } => (SqlStatementType::Ddl, "CREATE FUNCTION"),
        Statement::AlterTable { .. } => (SqlStatementType::Ddl, "ALTER TABLE"),
        Statement::AlterView { .. } => (SqlStatementType::Ddl, "ALTER VIEW"),
        Statement::AlterIndex { .. } => (SqlStatementType::Ddl, "ALTER INDEX"),
        Statement::Drop { .. } => (SqlStatementType::Ddl, "DROP"),
        Statement::DropFunction { .. } => (SqlStatementType::Ddl, "DROP FUNCTION"),
        Statement::Truncate { .. } => (SqlStatementType::Ddl, "TRUNCATE"),
        Statement::Comment { .. } => (SqlStatementType::Ddl, "COMMENT"),

        // Transaction control - BLOCKED
        Statement::StartTransaction { .. } => (SqlStatementType::Transaction, "BEGIN"),
        Statement::Commit { .. } => (SqlStatementType::Transaction, "COMMIT"),
        Statement::Rollback { .. } => (SqlStatementType::Transaction, "ROLLBACK"),
        Statement::Savepoint { .. } => (SqlStatementType::Transaction, "SAVEPOINT"),
        Statement::ReleaseSavepoint { .. } => (SqlStatementType::Transaction, "RELEASE SAVEPOINT"),

        // Procedure/function calls - BLOCKED (cannot verify behavior)
        Statement::Call { .. } => (SqlStatementType::ProcedureCall, "CALL"),
        Statement::Execute { .. } => (SqlStatementType::ProcedureCall, "EXECUTE"),
        Statement::Prepare { .. } => (SqlStatementType::ProcedureCall, "PREPARE"),
        Statement::Deallocate { .. } => (SqlStatementType::ProcedureCall, "DEALLOCATE"),

        // Administrative operations - BLOCKED
        Statement::Grant { .. } => (SqlStatementType::Administrative, "GRANT"),
        Statement::Revoke { .. } => (SqlStatementType::Administrative, "REVOKE"),
        Statement::Set(_) => (SqlStatementType::Administrative, "SET"),
        Statement::Use(_) => (SqlStatementType::Administrative, "USE"),
        Statement::Vacuum { .. } => (SqlStatementType::Administrative, "VACUUM"),
        Statement::Analyze { .. } => (SqlStatementType::Administrative, "ANALYZE"),
        Statement::Explain { .. } => (SqlStatementType::Administrative, "EXPLAIN"),
        Statement::LISTEN { .. } => (SqlStatementType::Administrative, "LISTEN"),
        Statement::NOTIFY { .. } => (SqlStatementType::Administrative, "NOTIFY"),

        // Unknown/other statements - BLOCKED (conservative)
        _ => (SqlStatementType::Unknown, "Unknown"),
    }
}

// =============================================================================
// AST walking for table references
// =============================================================================

fn collect_from_query(
    query: &Query,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            cte_names.insert(cte.alias.name.value.to_lowercase());
            collect_from_query(&cte.query, tables, cte_names);
        }
    }
    collect_from_set_expr(&query.body, tables, cte_names);
}

fn collect_from_set_expr(
    body: &SetExpr,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    match body {
        SetExpr::Select(select) => collect_from_select(select, tables, cte_names),
        SetExpr::Query(query) => collect_from_query(query, tables, cte_names),
        SetExpr::SetOperation { left, right, .. } => {
            collect_from_set_expr(left, tables, cte_names);
            collect_from_set_expr(right, tables, cte_names);
        }
        _ => {}
    }
}

fn collect_from_select(
    select: &Select,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    for twj in &select.from {
        collect_from_table_with_joins(twj, tables, cte_names);
    }
    if let Some(selection) = &select.selection {
        collect_from_expr(selection, tables, cte_names);
    }
}

fn collect_from_table_with_joins(
    twj: &TableWithJoins,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    collect_from_table_factor(&twj.relation, tables, cte_names);
    for join in &twj.joins {
        collect_from_table_factor(&join.relation, tables, cte_names);
    }
}

fn collect_from_table_factor(
    factor: &TableFactor,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    match factor {
        TableFactor::Table { name, .. } => {
            // Unqualify: "public.catchments" and "catchments" are the same base table
            let full = name.to_string();
            let last = full.rsplit('.').next().unwrap_or(&full);
            tables.insert(last.trim_matches('"').to_lowercase());
        }
        TableFactor::Derived { subquery, .. } => {
            collect_from_query(subquery, tables, cte_names);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_from_table_with_joins(table_with_joins, tables, cte_names);
        }
        _ => {}
    }
}

fn collect_from_expr(
    expr: &Expr,
    tables: &mut BTreeSet<String>,
    cte_names: &mut BTreeSet<String>,
) {
    match expr {
        Expr::InSubquery { subquery, .. } => collect_from_query(subquery, tables, cte_names),
        Expr::Exists { subquery, .. } => collect_from_query(subquery, tables, cte_names),
        Expr::Subquery(query) => collect_from_query(query, tables, cte_names),
        Expr::BinaryOp { left, right, .. } => {
            collect_from_expr(left, tables, cte_names);
            collect_from_expr(right, tables, cte_names);
        }
        Expr::UnaryOp { expr, .. } => collect_from_expr(expr, tables, cte_names),
        Expr::Nested(inner) => collect_from_expr(inner, tables, cte_names),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SchemaContext, TableContext};

    fn context_with(names: &[&str]) -> SchemaContext {
        SchemaContext {
            tables: names
                .iter()
                .map(|n| TableContext {
                    name: n.to_string(),
                    schema_name: "public".to_string(),
                    comment: None,
                    columns: Vec::new(),
                    score: 1,
                })
                .collect(),
            relationships: Vec::new(),
        }
    }

    // =========================================================================
    // Tests for validate_read_only
    // =========================================================================

    #[test]
    fn test_select_ok() {
        assert!(validate_read_only("SELECT * FROM catchments").is_ok());
    }

    #[test]
    fn test_select_with_subquery_ok() {
        let sql = r#"
            SELECT c.catchment_name, (SELECT COUNT(*) FROM water_resources WHERE catchment_id = c.id)
            FROM catchments c
            WHERE c.id IN (SELECT catchment_id FROM districts)
        "#;
        assert!(validate_read_only(sql).is_ok());
    }

    #[test]
    fn test_select_with_union_ok() {
        assert!(validate_read_only("SELECT a FROM t1 UNION ALL SELECT b FROM t2").is_ok());
    }

    #[test]
    fn test_insert_blocked() {
        let result = validate_read_only("INSERT INTO catchments VALUES (1)");
        assert!(matches!(result, Err(AgentError::UnsafeSql { .. })));
    }

    #[test]
    fn test_update_blocked() {
        assert!(validate_read_only("UPDATE catchments SET country = 'Uganda'").is_err());
    }

    #[test]
    fn test_delete_blocked() {
        assert!(validate_read_only("DELETE FROM catchments").is_err());
    }

    #[test]
    fn test_drop_blocked() {
        assert!(validate_read_only("DROP TABLE catchments").is_err());
    }

    #[test]
    fn test_alter_blocked() {
        assert!(validate_read_only("ALTER TABLE catchments ADD COLUMN x INT").is_err());
    }

    #[test]
    fn test_transaction_control_blocked() {
        assert!(validate_read_only("COMMIT").is_err());
    }

    #[test]
    fn test_multiple_statements_blocked() {
        assert!(validate_read_only("SELECT 1; DELETE FROM catchments").is_err());
    }

    #[test]
    fn test_insert_select_blocked() {
        // INSERT ... SELECT must be blocked even though it contains SELECT
        assert!(validate_read_only("INSERT INTO archive SELECT * FROM catchments").is_err());
    }

    #[test]
    fn test_dangerous_string_literal_not_flagged() {
        let sql = "SELECT * FROM catchments WHERE country = 'DROP TABLE catchments'";
        assert!(validate_read_only(sql).is_ok());
    }

    #[test]
    fn test_comment_bypass_still_blocked() {
        assert!(validate_read_only("-- harmless\nDELETE FROM catchments").is_err());
        assert!(validate_read_only("DELETE /* x */ FROM catchments").is_err());
    }

    #[test]
    fn test_parse_error_rejected() {
        let result = validate_read_only("NOT VALID SQL AT ALL !!!");
        assert!(matches!(result, Err(AgentError::UnsafeSql { .. })));
    }

    #[test]
    fn test_empty_sql_rejected() {
        assert!(validate_read_only("").is_err());
    }

    // =========================================================================
    // Tests for referenced_tables
    // =========================================================================

    #[test]
    fn test_referenced_tables_simple() {
        let tables = referenced_tables("SELECT COUNT(*) FROM catchments").unwrap();
        assert_eq!(tables, vec!["catchments"]);
    }

    #[test]
    fn test_referenced_tables_join() {
        let tables = referenced_tables(
            "SELECT w.resource_name FROM water_resources w JOIN catchments c ON w.catchment_id = c.id",
        )
        .unwrap();
        assert_eq!(tables, vec!["catchments", "water_resources"]);
    }

    #[test]
    fn test_referenced_tables_subquery_in_where() {
        let tables = referenced_tables(
            "SELECT * FROM catchments WHERE id IN (SELECT catchment_id FROM districts)",
        )
        .unwrap();
        assert_eq!(tables, vec!["catchments", "districts"]);
    }

    #[test]
    fn test_referenced_tables_schema_qualified() {
        let tables = referenced_tables("SELECT * FROM public.catchments").unwrap();
        assert_eq!(tables, vec!["catchments"]);
    }

    #[test]
    fn test_referenced_tables_cte_alias_excluded() {
        let tables = referenced_tables(
            "WITH recent AS (SELECT * FROM water_resources) SELECT * FROM recent",
        )
        .unwrap();
        assert_eq!(tables, vec!["water_resources"]);
    }

    #[test]
    fn test_referenced_tables_union() {
        let tables =
            referenced_tables("SELECT name FROM catchments UNION SELECT name FROM districts")
                .unwrap();
        assert_eq!(tables, vec!["catchments", "districts"]);
    }

    // =========================================================================
    // Tests for check_context_references
    // =========================================================================

    #[test]
    fn test_context_check_passes_for_known_tables() {
        let ctx = context_with(&["catchments", "water_resources"]);
        let sql = "SELECT * FROM water_resources w JOIN catchments c ON w.catchment_id = c.id";
        assert!(check_context_references(sql, &ctx).is_ok());
    }

    #[test]
    fn test_context_check_flags_unknown_table() {
        let ctx = context_with(&["catchments"]);
        let result = check_context_references("SELECT * FROM boreholes", &ctx);
        match result {
            Err(AgentError::UnsafeSql { reason, .. }) => {
                assert!(reason.contains("boreholes"));
            }
            other => panic!("expected UnsafeSql, got {:?}", other),
        }
    }

    #[test]
    fn test_context_check_case_insensitive() {
        let ctx = context_with(&["Catchments"]);
        assert!(check_context_references("SELECT * FROM CATCHMENTS", &ctx).is_ok());
    }
}
