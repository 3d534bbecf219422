//! Drives two pipeline runs against a scripted in-process backend.
//!
//! Run with: `cargo run --example run_pipeline`

use anyhow::Result;
use futures::future::join_all;
use qaflow::prelude::*;
use qaflow::testing::ScriptedTransport;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let transport = Arc::new(ScriptedTransport::new());
    transport.set_default(
        StageKind::Analysis,
        json!({"scenarios": [
            {"id": "login-01", "title": "Valid login", "priority": "critical"},
            {"id": "login-02", "title": "Wrong password"},
        ]}),
    );
    transport.set_default(
        StageKind::Generation,
        json!({"code": "def test_login(): pass", "language": "python"}),
    );
    transport.set_default(StageKind::Execution, json!({"passed": 2, "failed": 0}));
    transport.set_default(StageKind::Reporting, json!({"workbook": "reports/demo.xlsx"}));

    let engine = PipelineEngine::new(OrchestratorConfig::default(), transport);

    let documents = vec![
        DocumentRef::new("specs/login.md", "The user signs in with valid credentials."),
        DocumentRef::new("specs/logout.md", "The user signs out from the dashboard."),
    ];
    let run_ids: Vec<_> = documents.into_iter().map(|d| engine.submit(d)).collect();

    let runs = join_all(
        run_ids
            .iter()
            .map(|id| engine.wait_terminal(*id, Duration::from_secs(30))),
    )
    .await;

    for run in runs.into_iter().flatten() {
        println!(
            "run {} finished: {} ({} records)",
            run.id,
            run.status,
            run.records.len()
        );
    }
    Ok(())
}
