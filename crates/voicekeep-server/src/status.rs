use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::supervisor::Sessions;

#[derive(Debug, Serialize)]
struct Overview {
    status: &'static str,
    clients: usize,
    message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionStatus {
    token: String,
    connected: bool,
    guild_id: Option<String>,
    channel_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    status: Vec<SessionStatus>,
}

pub fn build_router(sessions: Sessions) -> Router {
    Router::new()
        .route("/", get(overview))
        .route("/status", get(status))
        .with_state(sessions)
}

async fn overview(State(sessions): State<Sessions>) -> Json<Overview> {
    Json(Overview {
        status: "active",
        clients: sessions.read().await.len(),
        message: "Voice presence keeper is running",
    })
}

async fn status(State(sessions): State<Sessions>) -> Json<StatusReport> {
    let sessions = sessions.read().await;
    let status = sessions
        .iter()
        .map(|entry| {
            let target = entry.client.target();
            SessionStatus {
                token: entry.client.redacted_token().to_string(),
                connected: entry.client.is_connected(),
                guild_id: target.guild_id.clone(),
                channel_id: target.channel_id.clone(),
            }
        })
        .collect();
    Json(StatusReport { status })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SessionEntry;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;
    use voicekeep_gateway::transport::memory::MemoryConnector;
    use voicekeep_gateway::{GatewayClient, GatewayConfig};

    const TOKEN: &str = "MTIzNDU2Nzg5MDEyMzQ1Njc4.abcdef.ghijklmnopqrstuvwxyz";

    fn sessions_with(configs: Vec<GatewayConfig>) -> Sessions {
        let (connector, _remotes) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let entries = configs
            .into_iter()
            .enumerate()
            .map(|(index, config)| SessionEntry {
                index,
                client: GatewayClient::spawn_with_url(config, connector.clone(), "mem://gateway")
                    .expect("valid config"),
            })
            .collect();
        Arc::new(RwLock::new(entries))
    }

    async fn get_json(app: Router, uri: &str) -> Value {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn overview_counts_sessions() {
        let sessions = sessions_with(vec![GatewayConfig::new(TOKEN), GatewayConfig::new(TOKEN)]);
        let body = get_json(build_router(sessions), "/").await;
        assert_eq!(
            body,
            json!({
                "status": "active",
                "clients": 2,
                "message": "Voice presence keeper is running"
            })
        );
    }

    #[tokio::test]
    async fn status_lists_redacted_sessions() {
        let sessions = sessions_with(vec![
            GatewayConfig::new(TOKEN).with_target("g1", "c1"),
            GatewayConfig::new(TOKEN),
        ]);
        let body = get_json(build_router(sessions), "/status").await;
        assert_eq!(
            body,
            json!({
                "status": [
                    { "token": "MTIzNDU2Nz...", "connected": false, "guildId": "g1", "channelId": "c1" },
                    { "token": "MTIzNDU2Nz...", "connected": false, "guildId": null, "channelId": null }
                ]
            })
        );
    }

    #[tokio::test]
    async fn empty_registry_reports_zero() {
        let body = get_json(build_router(Arc::new(RwLock::new(Vec::new()))), "/").await;
        assert_eq!(body["clients"], 0);
        let body = get_json(build_router(Arc::new(RwLock::new(Vec::new()))), "/status").await;
        assert_eq!(body["status"], json!([]));
    }
}
