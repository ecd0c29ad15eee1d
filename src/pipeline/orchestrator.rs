//! Three-stage prompt orchestration.
//!
//! One question produces one sequential run: mechanical schema analysis,
//! model-assisted schema selection, SQL generation, then validation. Each
//! stage fails closed; only the validation stage's output is ever handed to
//! the executor. Abandoning a run between stages needs no cleanup because
//! stages have no side effects beyond the external read calls themselves.

use crate::analyzer::SchemaAnalyzer;
use crate::db::metadata::MetadataSnapshot;
use crate::error::AgentResult;
use crate::guard;
use crate::llm::ChatModel;
use crate::models::{GeneratedQuery, SchemaContext};
use crate::pipeline::prompts;
use crate::pipeline::stage::{Stage, StageInput, StageOutput};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Characters of rendered context included in API responses.
const CONTEXT_PREVIEW_CHARS: usize = 500;

pub struct Orchestrator<M> {
    model: M,
    analyzer: SchemaAnalyzer,
}

impl<M: ChatModel> Orchestrator<M> {
    pub fn new(model: M, analyzer: SchemaAnalyzer) -> Self {
        Self { model, analyzer }
    }

    /// Run the full pipeline for one question.
    pub async fn generate(
        &self,
        question: &str,
        snapshot: &MetadataSnapshot,
    ) -> AgentResult<GeneratedQuery> {
        // The mechanical filter runs first; an empty context aborts the run
        // before any model call is made.
        let mechanical = self.analyzer.analyze(question, snapshot)?;
        self.generate_with_context(question, snapshot, mechanical)
            .await
    }

    /// Run the model stages against a pre-computed mechanical context
    /// (e.g. one served from the analysis cache).
    pub async fn generate_with_context(
        &self,
        question: &str,
        snapshot: &MetadataSnapshot,
        mechanical: SchemaContext,
    ) -> AgentResult<GeneratedQuery> {
        let start = Instant::now();

        let context = self.select_schema(question, snapshot, mechanical).await?;
        let candidate = self.generate_sql(question, &context).await?;
        let (sql, notes) = self.validate(question, &candidate, &context).await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            question_len = question.len(),
            tables = context.tables.len(),
            elapsed_ms,
            "Pipeline run complete"
        );

        Ok(GeneratedQuery {
            sql,
            notes,
            tables: context.table_names().iter().map(|s| s.to_string()).collect(),
            context_preview: context.preview(CONTEXT_PREVIEW_CHARS),
            elapsed_ms,
            generated_at: chrono::Utc::now(),
        })
    }

    /// Stage 1: intersect the model's table selection with the mechanical
    /// filter. Both must agree a table is relevant; when the model's output
    /// fails to parse, or the intersection comes up empty, the mechanical
    /// result stands.
    async fn select_schema(
        &self,
        question: &str,
        snapshot: &MetadataSnapshot,
        mechanical: SchemaContext,
    ) -> AgentResult<SchemaContext> {
        let stage = Stage::SchemaSelection;
        let catalog = prompts::render_catalog(snapshot);
        let user = stage.render_user(&StageInput {
            question,
            catalog: &catalog,
            ..StageInput::default()
        });

        let raw = self
            .model
            .chat(stage.kind(), stage.system_prompt(), &user)
            .await?;

        match stage.parse(&raw) {
            Ok(StageOutput::Tables(selected)) => {
                let intersected = mechanical.retain_tables(&selected);
                if intersected.is_empty() {
                    debug!("Model selection disjoint from mechanical filter, keeping mechanical result");
                    Ok(mechanical)
                } else {
                    debug!(
                        selected = selected.len(),
                        kept = intersected.tables.len(),
                        "Intersected model selection with mechanical filter"
                    );
                    Ok(intersected)
                }
            }
            Ok(_) => Ok(mechanical),
            Err(err) => {
                // Documented fallback: the mechanical filter's result is used
                // when the model's output cannot be parsed.
                warn!(error = %err, "Schema selection unparsable, falling back to mechanical filter");
                Ok(mechanical)
            }
        }
    }

    /// Stage 2: produce the candidate SQL. The candidate is not executable;
    /// it only feeds validation.
    async fn generate_sql(&self, question: &str, context: &SchemaContext) -> AgentResult<String> {
        let stage = Stage::SqlGeneration;
        let rendered = context.render();
        let user = stage.render_user(&StageInput {
            question,
            context: &rendered,
            ..StageInput::default()
        });

        let raw = self
            .model
            .chat(stage.kind(), stage.system_prompt(), &user)
            .await?;

        match stage.parse(&raw)? {
            StageOutput::Sql(sql) => Ok(sql),
            _ => unreachable!("SqlGeneration stage parses to Sql"),
        }
    }

    /// Stage 3: validate and possibly correct the candidate SQL.
    ///
    /// Mechanical checks run before and after the model exchange: the input
    /// must already be a single read-only SELECT over context tables (a
    /// violation here flags the generation stage's output as unsafe), and
    /// the model's corrected statement must satisfy the same rules before it
    /// becomes executable. Idempotent on already-correct SQL as long as the
    /// model returns it unchanged.
    pub async fn validate(
        &self,
        question: &str,
        sql: &str,
        context: &SchemaContext,
    ) -> AgentResult<(String, String)> {
        guard::validate_read_only(sql)?;
        guard::check_context_references(sql, context)?;

        let stage = Stage::Validation;
        let rendered = context.render();
        let user = stage.render_user(&StageInput {
            question,
            context: &rendered,
            sql,
            ..StageInput::default()
        });

        let raw = self
            .model
            .chat(stage.kind(), stage.system_prompt(), &user)
            .await?;

        let (final_sql, notes) = match stage.parse(&raw)? {
            StageOutput::Validated { sql, notes } => (sql, notes),
            _ => unreachable!("Validation stage parses to Validated"),
        };

        guard::validate_read_only(&final_sql)?;
        guard::check_context_references(&final_sql, context)?;

        Ok((final_sql, notes))
    }
}
