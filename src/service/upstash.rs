use axum::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::data::visit_model::VisitEvent;

use super::EventStore;

/// Upstash Redis over its REST API. Each append is a single `LPUSH`.
#[derive(Clone)]
pub struct UpstashStore {
    client: Client,
    url: String,
    token: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct UpstashResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

impl UpstashStore {
    pub fn init(url: String, token: String, key: String) -> Self {
        let url = url.trim_end_matches('/').to_string();
        info!("initialized upstash client; url: {}, key: {}", url, key);
        Self {
            client: Client::new(),
            url,
            token,
            key,
        }
    }
}

#[async_trait]
impl EventStore for UpstashStore {
    async fn append_event(&self, event: &VisitEvent) -> Result<(), anyhow::Error> {
        let payload = event.to_json()?;
        let res = match self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&json!(["LPUSH", self.key, payload]))
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return Err(anyhow::Error::msg(format!("Failed to reach upstash: {}", e))),
        };
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("upstash returned {}: {}", status, body);
        }
        let parsed: UpstashResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(anyhow::Error::msg(format!(
                    "Failed to parse upstash response: {}",
                    e
                )))
            }
        };
        if let Some(error) = parsed.error {
            anyhow::bail!("upstash LPUSH failed: {}", error);
        }
        debug!("upstash LPUSH {} -> {:?}", self.key, parsed.result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        extract::State,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::Value;
    use tokio::{net::TcpListener, sync::mpsc};

    use super::*;

    type Captured = mpsc::UnboundedSender<(Option<String>, Value)>;

    async fn fake_upstash(
        status: StatusCode,
        reply: Value,
    ) -> (String, mpsc::UnboundedReceiver<(Option<String>, Value)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/",
                post(
                    move |State(tx): State<Captured>, headers: HeaderMap, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            let auth = headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            let _ = tx.send((auth, body));
                            (status, Json(reply))
                        }
                    },
                ),
            )
            .with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/", addr), rx)
    }

    #[tokio::test]
    async fn test_append_sends_lpush() {
        let (url, mut rx) = fake_upstash(StatusCode::OK, json!({ "result": 1 })).await;
        let store = UpstashStore::init(url, "secret".to_string(), "visits".to_string());
        let event = VisitEvent::page_visit("/", &HeaderMap::new());

        store.append_event(&event).await.unwrap();

        let (auth, body) = rx.recv().await.unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer secret"));
        assert_eq!(body[0], "LPUSH");
        assert_eq!(body[1], "visits");
        let stored: Value = serde_json::from_str(body[2].as_str().unwrap()).unwrap();
        assert_eq!(stored["path"], "/");
        assert_eq!(stored["referrer"], "direct");
    }

    #[tokio::test]
    async fn test_append_reports_command_error() {
        let (url, _rx) = fake_upstash(StatusCode::OK, json!({ "error": "WRONGTYPE" })).await;
        let store = UpstashStore::init(url, "secret".to_string(), "visits".to_string());
        let event = VisitEvent::page_visit("/", &HeaderMap::new());

        let err = store.append_event(&event).await.unwrap_err();
        assert!(err.to_string().contains("WRONGTYPE"));
    }

    #[tokio::test]
    async fn test_append_reports_http_error() {
        let (url, _rx) = fake_upstash(
            StatusCode::UNAUTHORIZED,
            json!({ "error": "Unauthorized" }),
        )
        .await;
        let store = UpstashStore::init(url, "wrong".to_string(), "visits".to_string());
        let event = VisitEvent::page_visit("/", &HeaderMap::new());

        let err = store.append_event(&event).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }
}
