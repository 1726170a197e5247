//! Sync handler - runs one reconciliation cycle on demand.

use crate::error::Result;
use crate::Engine;
use geolab_engine::SyncReport;
use serde::Serialize;

/// Response for a completed sync cycle.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub message: String,
    #[serde(flatten)]
    pub report: SyncReport,
}

impl SyncResponse {
    pub fn new(report: SyncReport) -> Self {
        let message = if report.failed == 0 {
            "Sync completed".to_string()
        } else {
            format!("Sync completed with {} failed operation(s)", report.failed)
        };
        Self { message, report }
    }
}

/// Run a sync cycle and describe what it did.
pub async fn handle_sync(engine: &Engine) -> Result<SyncResponse> {
    let report = engine.run_cycle().await?;

    tracing::info!(
        upserted = report.upserted,
        deleted = report.deleted,
        failed = report.failed,
        "sync cycle finished"
    );

    Ok(SyncResponse::new(report))
}
