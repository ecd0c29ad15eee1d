//! Shared fixtures for integration tests: the sample Metadata Store
//! snapshot and a scripted stand-in for the hosted model.
#![allow(dead_code)]

use nl2sql_server::db::metadata::MetadataSnapshot;
use nl2sql_server::error::{AgentError, AgentResult, StageKind};
use nl2sql_server::llm::ChatModel;
use nl2sql_server::models::{ColumnComment, Relationship, TableComment};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Sample Metadata Store rows: water catchments, resources, and districts.
pub fn sample_snapshot() -> MetadataSnapshot {
    let mut snapshot = MetadataSnapshot::default();
    snapshot.tables = vec![
        TableComment::new(
            1,
            "catchments",
            "Water catchment areas with their country and name",
            "public",
        ),
        TableComment::new(
            2,
            "water_resources",
            "Water resources with storage capacity per catchment and district",
            "public",
        ),
        TableComment::new(3, "districts", "Administrative districts", "public"),
    ];
    snapshot.columns = vec![
        ColumnComment::new(1, "catchments", "id", "Catchment identifier", "public"),
        ColumnComment::new(2, "catchments", "catchment_name", "Name of the catchment", "public"),
        ColumnComment::new(3, "catchments", "country", "Country the catchment belongs to", "public"),
        ColumnComment::new(4, "water_resources", "id", "Resource identifier", "public"),
        ColumnComment::new(5, "water_resources", "resource_name", "Name of the water resource", "public"),
        ColumnComment::new(6, "water_resources", "capacity_cubic_meters", "Storage capacity in cubic meters", "public"),
        ColumnComment::new(7, "water_resources", "catchment_id", "Owning catchment", "public"),
        ColumnComment::new(8, "water_resources", "district_id", "Owning district", "public"),
        ColumnComment::new(9, "districts", "id", "District identifier", "public"),
        ColumnComment::new(10, "districts", "district_name", "Name of the district", "public"),
    ];
    snapshot.relationships = vec![
        Relationship::new("water_resources", "catchment_id", "catchments", "id"),
        Relationship::new("water_resources", "district_id", "districts", "id"),
    ];
    for (t, c) in [
        ("catchments", "id"),
        ("water_resources", "id"),
        ("water_resources", "catchment_id"),
        ("water_resources", "district_id"),
        ("districts", "id"),
    ] {
        snapshot
            .key_columns
            .insert((t.to_string(), c.to_string()));
    }
    snapshot
}

/// A scripted model: per-stage response queues plus a call log.
#[derive(Clone, Default)]
pub struct MockModel {
    responses: Arc<Mutex<HashMap<StageKind, VecDeque<String>>>>,
    calls: Arc<Mutex<Vec<StageKind>>>,
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a stage. Responses are consumed in order.
    pub fn respond(self, stage: StageKind, response: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(response.into());
        self
    }

    /// Stages called so far, in order.
    pub fn calls(&self) -> Vec<StageKind> {
        self.calls.lock().unwrap().clone()
    }
}

impl ChatModel for MockModel {
    async fn chat(&self, stage: StageKind, _system: &str, _user: &str) -> AgentResult<String> {
        self.calls.lock().unwrap().push(stage);
        self.responses
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| AgentError::model_unavailable(stage, "no scripted response"))
    }
}
