use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfoResponse {
    pub success: bool,
    pub message: String,
    pub data: ApiInfoData,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiInfoData {
    pub version: String,
    pub endpoints: ApiEndpoints,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoints {
    pub auth: String,
    pub chat: String,
    pub health: String,
    pub realtime: String,
}

pub async fn api_info() -> Json<ApiInfoResponse> {
    let version = env!("CARGO_PKG_VERSION");
    Json(ApiInfoResponse {
        success: true,
        message: format!("Neon chat API v{}", version),
        data: ApiInfoData {
            version: version.to_string(),
            endpoints: ApiEndpoints {
                auth: "/api/auth".to_string(),
                chat: "/api/chat".to_string(),
                health: "/api/health".to_string(),
                realtime: "/socket.io".to_string(),
            },
        },
    })
}
