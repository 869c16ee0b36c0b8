use axum::Json;

use crate::domain::{Bounty, Domain, StudyFund};

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn ready() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ready",
        "domains": [Bounty::NAME, StudyFund::NAME],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_returns_ok() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_lists_domains() {
        let Json(body) = ready().await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["domains"], serde_json::json!(["bounty", "studyFund"]));
    }
}
