//! Schema relevance analysis.
//!
//! Given a question and a [`MetadataSnapshot`], the analyzer produces the
//! bounded [`SchemaContext`] that seeds the prompt pipeline. The policy:
//!
//! - a table is included when a question keyword matches its name or its
//!   comment (case-insensitive), or when an already-included table references
//!   it through a foreign key;
//! - a column is included on keyword match against its name or comment, and
//!   primary/foreign-key columns are always retained so joins stay
//!   reconstructable;
//! - the result is bounded by table count, per-table column count, and a
//!   character budget, truncating lowest-relevance tables first and never
//!   dropping key columns.
//!
//! A question with no match yields `NoRelevantSchema`; callers must not run
//! SQL generation on an empty context.

pub mod cache;

pub use cache::AnalysisCache;

use crate::db::metadata::MetadataSnapshot;
use crate::error::{AgentError, AgentResult};
use crate::models::{ColumnContext, SchemaContext, TableContext};
use std::collections::BTreeSet;
use tracing::debug;

/// Default maximum number of tables in a context.
pub const DEFAULT_MAX_TABLES: usize = 10;

/// Default maximum number of columns kept per table.
pub const DEFAULT_MAX_COLUMNS_PER_TABLE: usize = 15;

/// Default character budget for the rendered context.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 6000;

/// A table keeps all its columns when fewer than this many matched the
/// question, so the model still sees enough of the table to write SQL.
const MIN_RELEVANT_COLUMNS: usize = 3;

/// Question words that carry no schema signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "do", "does", "did", "have",
    "has", "had", "in", "on", "at", "of", "for", "to", "with", "by", "from", "as", "and", "or",
    "not", "no", "how", "many", "much", "what", "which", "who", "whose", "where", "when", "why",
    "all", "any", "each", "per", "list", "show", "give", "get", "find", "me", "my", "our",
    "their", "there", "that", "this", "these", "those", "them", "they", "it", "its", "we", "you",
];

/// Size limits for the produced context.
#[derive(Debug, Clone)]
pub struct AnalyzerBudget {
    pub max_tables: usize,
    pub max_columns_per_table: usize,
    pub max_context_chars: usize,
}

impl Default for AnalyzerBudget {
    fn default() -> Self {
        Self {
            max_tables: DEFAULT_MAX_TABLES,
            max_columns_per_table: DEFAULT_MAX_COLUMNS_PER_TABLE,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}

/// The mechanical relevance filter.
#[derive(Debug, Clone, Default)]
pub struct SchemaAnalyzer {
    budget: AnalyzerBudget,
}

impl SchemaAnalyzer {
    pub fn new(budget: AnalyzerBudget) -> Self {
        Self { budget }
    }

    /// Build the schema context for a question.
    ///
    /// Fails with `NoRelevantSchema` when no table matches any question
    /// keyword; FK closure alone never makes a context non-empty.
    pub fn analyze(
        &self,
        question: &str,
        snapshot: &MetadataSnapshot,
    ) -> AgentResult<SchemaContext> {
        let tokens = tokenize(question);
        if tokens.is_empty() {
            return Err(AgentError::NoRelevantSchema);
        }

        // Score tables on direct keyword matches.
        let mut scored: Vec<(&str, u32)> = snapshot
            .tables
            .iter()
            .filter_map(|t| {
                let score = score_text(&tokens, &t.table_name, &t.comment);
                (score > 0).then_some((t.table_name.as_str(), score))
            })
            .collect();

        if scored.is_empty() {
            debug!(question_len = question.len(), "No table matched the question");
            return Err(AgentError::NoRelevantSchema);
        }

        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        // FK closure: tables referenced by an included table come along so
        // joins can be generated. Directional on purpose: a matched table
        // pulls in what it points at, not everything pointing at it.
        let mut included: Vec<(String, u32)> = scored
            .iter()
            .map(|(name, score)| (name.to_lowercase(), *score))
            .collect();
        let mut seen: BTreeSet<String> =
            included.iter().map(|(name, _)| name.clone()).collect();

        let mut frontier: Vec<String> = seen.iter().cloned().collect();
        while let Some(table) = frontier.pop() {
            for rel in snapshot.relationships_of(&table) {
                if !rel.from_table.eq_ignore_ascii_case(&table) {
                    continue;
                }
                let target = rel.to_table.to_lowercase();
                let known = snapshot
                    .tables
                    .iter()
                    .any(|t| t.table_name.eq_ignore_ascii_case(&target));
                if known && seen.insert(target.clone()) {
                    included.push((target.clone(), 0));
                    frontier.push(target);
                }
            }
        }

        included.truncate(self.budget.max_tables);

        let mut context = SchemaContext {
            tables: included
                .iter()
                .map(|(name, score)| self.build_table(name, *score, &tokens, snapshot))
                .collect(),
            relationships: Vec::new(),
        };
        context.relationships = snapshot
            .relationships
            .iter()
            .filter(|r| {
                context.contains_table(&r.from_table) && context.contains_table(&r.to_table)
            })
            .cloned()
            .collect();

        // Character budget: drop lowest-relevance tables until the rendered
        // context fits. Key columns were already protected per table.
        while context.tables.len() > 1 && context.rendered_len() > self.budget.max_context_chars {
            let dropped = context.tables.pop();
            if let Some(dropped) = dropped {
                context
                    .relationships
                    .retain(|r| {
                        !r.from_table.eq_ignore_ascii_case(&dropped.name)
                            && !r.to_table.eq_ignore_ascii_case(&dropped.name)
                    });
            }
        }

        debug!(
            tables = context.tables.len(),
            relationships = context.relationships.len(),
            chars = context.rendered_len(),
            "Built schema context"
        );

        Ok(context)
    }

    fn build_table(
        &self,
        table_name: &str,
        score: u32,
        tokens: &[String],
        snapshot: &MetadataSnapshot,
    ) -> TableContext {
        let meta = snapshot
            .tables
            .iter()
            .find(|t| t.table_name.eq_ignore_ascii_case(table_name));

        let all_columns = snapshot.columns_of(table_name);

        let mut columns: Vec<ColumnContext> = Vec::new();
        let mut matched_non_key = 0usize;
        for col in &all_columns {
            let is_key = snapshot.is_key_column(table_name, &col.column_name);
            let matches = score_text(tokens, &col.column_name, &col.comment) > 0;
            if is_key || matches {
                if matches && !is_key {
                    matched_non_key += 1;
                }
                columns.push(self.column_context(table_name, col, is_key, snapshot));
            }
        }

        // Too few relevant columns: keep the whole table (bounded) so the
        // model is not starved of selectable columns.
        if matched_non_key < MIN_RELEVANT_COLUMNS {
            columns = all_columns
                .iter()
                .map(|col| {
                    let is_key = snapshot.is_key_column(table_name, &col.column_name);
                    self.column_context(table_name, col, is_key, snapshot)
                })
                .collect();
        }

        if columns.len() > self.budget.max_columns_per_table {
            let keys: Vec<ColumnContext> =
                columns.iter().filter(|c| c.is_key).cloned().collect();
            let mut rest: Vec<ColumnContext> =
                columns.into_iter().filter(|c| !c.is_key).collect();
            rest.truncate(self.budget.max_columns_per_table.saturating_sub(keys.len()));
            columns = keys;
            columns.extend(rest);
        }

        TableContext {
            name: table_name.to_string(),
            schema_name: meta
                .map(|t| t.schema_name.clone())
                .unwrap_or_else(|| "public".to_string()),
            comment: meta
                .map(|t| t.comment.clone())
                .filter(|c| !c.is_empty()),
            columns,
            score,
        }
    }

    fn column_context(
        &self,
        table_name: &str,
        col: &crate::models::ColumnComment,
        is_key: bool,
        snapshot: &MetadataSnapshot,
    ) -> ColumnContext {
        ColumnContext {
            name: col.column_name.clone(),
            comment: (!col.comment.is_empty()).then(|| col.comment.clone()),
            data_type: snapshot
                .column_type(table_name, &col.column_name)
                .map(str::to_string),
            is_key,
        }
    }
}

/// Split a question into lowercase keywords, dropping stopwords and
/// one-character fragments.
pub fn tokenize(question: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Normalize a question for cache keying: lowercase, collapsed whitespace.
pub fn normalize_question(question: &str) -> String {
    question.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Score a name/comment pair against the question keywords. Name matches
/// weigh more than comment matches.
fn score_text(tokens: &[String], name: &str, comment: &str) -> u32 {
    let name_lower = name.to_lowercase();
    let comment_lower = comment.to_lowercase();

    let mut score = 0;
    for token in tokens {
        if name_lower.contains(token.as_str()) || token.contains(&name_lower) {
            score += 3;
        }
        if comment_lower.contains(token.as_str()) {
            score += 1;
        }
    }
    score
}
