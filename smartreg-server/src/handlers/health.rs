use axum::{Json, extract::State};
use chrono::Utc;
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

/// GET /healthz - liveness plus the limits this instance runs with.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds().max(0);
    let registration = &state.config.registration;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "max_workers": state.orchestrator.max_workers(),
        "template_lines": state.template.lines().len(),
        "poll": {
            "timeout_seconds": registration.poll_timeout.as_secs(),
            "interval_seconds": registration.poll_interval.as_secs(),
            "status_check_every": registration.status_check_every,
        },
        "audit_dir": state.config.paths.audit_dir.display().to_string(),
    }))
}
