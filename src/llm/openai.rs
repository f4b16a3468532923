use axum::async_trait;
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::ChatCompleter;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn init(
        base_url: String,
        api_key: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        info!(
            "initialized completion client; base url: {}, model: {}",
            base_url, model
        );
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            temperature,
            max_tokens,
        }
    }
}

#[async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete(&self, prompt: &str, message: &str) -> Result<String, anyhow::Error> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        debug!("requesting completion from {} with model {}", url, self.model);

        let res = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => return Err(anyhow::Error::msg(format!("Request failed: {}", e))),
        };
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("API error {}: {}", status, body);
        }
        let parsed: CompletionResponse = match res.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(anyhow::Error::msg(format!(
                    "Failed to parse completion: {}",
                    e
                )))
            }
        };
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use tokio::{net::TcpListener, sync::mpsc};

    use super::*;

    async fn fake_api(
        status: StatusCode,
        reply: Value,
    ) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(
                    move |State(tx): State<mpsc::UnboundedSender<Value>>, Json(body): Json<Value>| {
                        let reply = reply.clone();
                        async move {
                            let _ = tx.send(body);
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
        (format!("http://{}/v1/", addr), rx)
    }

    fn client(base_url: String) -> OpenAiClient {
        OpenAiClient::init(base_url, "sk-test".to_string(), "gpt-4o".to_string(), 0.7, 350)
    }

    #[tokio::test]
    async fn test_complete_returns_reply() {
        let (url, mut rx) = fake_api(
            StatusCode::OK,
            json!({ "choices": [{ "message": { "role": "assistant", "content": "  Paolo builds things.\n" } }] }),
        )
        .await;

        let reply = client(url)
            .complete("You are Virgil.", "Who is Paolo?")
            .await
            .unwrap();
        assert_eq!(reply, "Paolo builds things.");

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent["model"], "gpt-4o");
        assert_eq!(sent["max_tokens"], 350);
        assert_eq!(sent["messages"][0]["role"], "system");
        assert_eq!(sent["messages"][0]["content"], "You are Virgil.");
        assert_eq!(sent["messages"][1]["role"], "user");
        assert_eq!(sent["messages"][1]["content"], "Who is Paolo?");
    }

    #[tokio::test]
    async fn test_complete_empty_choices() {
        let (url, _rx) = fake_api(StatusCode::OK, json!({ "choices": [] })).await;
        let reply = client(url).complete("p", "m").await.unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_complete_upstream_error() {
        let (url, _rx) = fake_api(
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "error": { "message": "rate limited" } }),
        )
        .await;
        let err = client(url).complete("p", "m").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
