use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;
use crate::services::PresenceStats;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub data: HealthData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthData {
    pub uptime: f64,
    pub timestamp: String,
    pub presence: PresenceStats,
    pub memory: MemoryInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub rss: u64,
}

fn get_rss_bytes() -> u64 {
    // Second field of /proc/self/statm is resident pages (Linux only)
    std::fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|content| {
            content
                .split_whitespace()
                .nth(1)
                .and_then(|rss| rss.parse::<u64>().ok())
                .map(|pages| pages * 4096)
        })
        .unwrap_or(0)
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Neon chat server is running".to_string(),
        data: HealthData {
            uptime: state.start_time.elapsed().as_secs_f64(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            presence: state.hub.stats(),
            memory: MemoryInfo { rss: get_rss_bytes() },
        },
    })
}
