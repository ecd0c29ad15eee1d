//! Pipeline stages as explicit variants.
//!
//! Each stage carries its own prompt templates and its own output parser,
//! selected by this enum rather than dynamically dispatched "agent" objects.
//! A stage is a stateless pure function of its inputs and the external
//! model's behavior; nothing is remembered between calls.

use crate::error::{AgentError, AgentResult, StageKind};
use crate::llm::extract;
use crate::pipeline::prompts;

/// One prompt/response exchange in the orchestration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Refine the candidate table set from the full catalog.
    SchemaSelection,
    /// Produce one read-only SELECT from question + schema context.
    SqlGeneration,
    /// Confirm or correct the generated SQL against the context.
    Validation,
}

/// Structured output of one stage, produced by its parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Stage 1: the tables the model judged relevant.
    Tables(Vec<String>),
    /// Stage 2: the candidate SQL statement.
    Sql(String),
    /// Stage 3: final SQL plus the model's rationale.
    Validated { sql: String, notes: String },
}

/// Inputs available when rendering a stage's user prompt. Unused fields are
/// empty for stages that do not need them.
#[derive(Debug, Clone, Default)]
pub struct StageInput<'a> {
    pub question: &'a str,
    /// Full table catalog (stage 1).
    pub catalog: &'a str,
    /// Rendered schema context (stages 2 and 3).
    pub context: &'a str,
    /// Candidate SQL (stage 3).
    pub sql: &'a str,
}

impl Stage {
    /// The error-attribution identifier for this stage.
    pub fn kind(&self) -> StageKind {
        match self {
            Self::SchemaSelection => StageKind::SchemaSelection,
            Self::SqlGeneration => StageKind::SqlGeneration,
            Self::Validation => StageKind::Validation,
        }
    }

    /// The role instruction sent as the system message.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::SchemaSelection => prompts::SCHEMA_SELECTION_SYSTEM_PROMPT,
            Self::SqlGeneration => prompts::SQL_GENERATION_SYSTEM_PROMPT,
            Self::Validation => prompts::VALIDATION_SYSTEM_PROMPT,
        }
    }

    /// Fill this stage's user template from the inputs.
    pub fn render_user(&self, input: &StageInput<'_>) -> String {
        let template = match self {
            Self::SchemaSelection => prompts::SCHEMA_SELECTION_USER_PROMPT,
            Self::SqlGeneration => prompts::SQL_GENERATION_USER_PROMPT,
            Self::Validation => prompts::VALIDATION_USER_PROMPT,
        };
        template
            .replace("{question}", input.question)
            .replace("{catalog}", input.catalog)
            .replace("{context}", input.context)
            .replace("{sql}", input.sql)
    }

    /// Parse the raw model response into this stage's structured output.
    ///
    /// Extraction tolerates surrounding prose; when the expected payload is
    /// absent the stage fails with `UnparsableResponse` so the caller can
    /// fall back or abort, never guess.
    pub fn parse(&self, raw: &str) -> AgentResult<StageOutput> {
        match self {
            Self::SchemaSelection => extract::extract_table_list(raw)
                .map(StageOutput::Tables)
                .ok_or_else(|| {
                    AgentError::unparsable(self.kind(), "no table list found in response")
                }),
            Self::SqlGeneration => extract::extract_sql(raw)
                .map(StageOutput::Sql)
                .ok_or_else(|| {
                    AgentError::unparsable(self.kind(), "no SQL statement found in response")
                }),
            Self::Validation => extract::extract_validation(raw)
                .map(|(sql, notes)| StageOutput::Validated { sql, notes })
                .ok_or_else(|| {
                    AgentError::unparsable(self.kind(), "no SQL statement found in response")
                }),
        }
    }
}
