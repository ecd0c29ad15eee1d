//! Schema analyzer behavior against the sample Metadata Store rows.

mod common;

use common::sample_snapshot;
use nl2sql_server::analyzer::{AnalysisCache, AnalyzerBudget, SchemaAnalyzer, normalize_question};
use nl2sql_server::error::AgentError;

#[test]
fn catchments_question_yields_catchments_context() {
    let analyzer = SchemaAnalyzer::default();
    let ctx = analyzer
        .analyze("How many catchments are in Uganda?", &sample_snapshot())
        .unwrap();

    assert_eq!(ctx.table_names(), vec!["catchments"]);
    let columns: Vec<&str> = ctx.tables[0]
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert!(columns.contains(&"country"));
    assert!(columns.contains(&"catchment_name"));
}

#[test]
fn water_resources_question_includes_fk_neighbors() {
    let analyzer = SchemaAnalyzer::default();
    let ctx = analyzer
        .analyze(
            "List all water resources with their capacity",
            &sample_snapshot(),
        )
        .unwrap();

    assert!(ctx.contains_table("water_resources"));
    assert!(ctx.contains_table("catchments"));
    assert!(ctx.contains_table("districts"));

    let wr = ctx
        .tables
        .iter()
        .find(|t| t.name == "water_resources")
        .unwrap();
    let columns: Vec<&str> = wr.columns.iter().map(|c| c.name.as_str()).collect();
    assert!(columns.contains(&"resource_name"));
    assert!(columns.contains(&"capacity_cubic_meters"));
}

#[test]
fn gibberish_yields_no_relevant_schema() {
    let analyzer = SchemaAnalyzer::default();
    for question in ["asdkjf", "", "   ", "the of and"] {
        let result = analyzer.analyze(question, &sample_snapshot());
        assert!(
            matches!(result, Err(AgentError::NoRelevantSchema)),
            "question {:?} should yield NoRelevantSchema",
            question
        );
    }
}

#[test]
fn context_respects_table_budget() {
    let analyzer = SchemaAnalyzer::new(AnalyzerBudget {
        max_tables: 1,
        max_columns_per_table: 15,
        max_context_chars: 6000,
    });
    let ctx = analyzer
        .analyze(
            "List all water resources with their capacity",
            &sample_snapshot(),
        )
        .unwrap();

    assert_eq!(ctx.tables.len(), 1);
    assert_eq!(ctx.tables[0].name, "water_resources");
}

#[test]
fn rendered_context_mentions_relationships() {
    let analyzer = SchemaAnalyzer::default();
    let ctx = analyzer
        .analyze(
            "List all water resources with their capacity",
            &sample_snapshot(),
        )
        .unwrap();

    let rendered = ctx.render();
    assert!(rendered.contains("water_resources.catchment_id -> catchments.id"));
    assert!(rendered.contains("water_resources.district_id -> districts.id"));
}

#[test]
fn cache_returns_equivalent_context_for_normalized_question() {
    let analyzer = SchemaAnalyzer::default();
    let cache = AnalysisCache::new(8);
    let snapshot = sample_snapshot();

    let question_a = "How many catchments are in Uganda?";
    let question_b = "  how many   catchments are in uganda? ";
    assert_eq!(normalize_question(question_a), normalize_question(question_b));

    let ctx = analyzer.analyze(question_a, &snapshot).unwrap();
    cache.insert(normalize_question(question_a), ctx.clone());

    let cached = cache.get(&normalize_question(question_b)).unwrap();
    assert_eq!(cached.table_names(), ctx.table_names());
}
