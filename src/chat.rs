use axum::{
    debug_handler,
    extract::{rejection::JsonRejection, State},
    Json,
};
use log::{debug, error};

use crate::error::AppError;
use crate::AppState;

const MISSING_INPUT: &str = "Missing message or portfolio context";
const UPSTREAM_FAILED: &str = "Failed to generate response";

/// Sent when the model answers with nothing.
pub const FALLBACK_REPLY: &str =
    "Apologies, I seem to have wandered into one of the darker circles. Could you rephrase?";

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub portfolio_info: Option<Vec<String>>,
}

#[derive(Debug, serde::Serialize)]
pub struct ChatResponse {
    reply: String,
}

/// Virgil's system instruction with the visitor-supplied context embedded.
pub fn system_prompt(owner: &str, portfolio_info: &[String]) -> String {
    let context = portfolio_info.join("\n\n");
    format!(
        "You are Virgil, the wise and slightly sarcastic guide from Dante's Inferno.\n\
         You help visitors explore {owner}'s portfolio website. Be helpful, witty, concise, and stay in character.\n\
         Use the following context about {owner}, their work, projects, skills, and background to answer questions accurately:\n\
         \n\
         {context}\n\
         \n\
         If the question is unrelated to {owner} or the portfolio, politely redirect or say you're here to assist with their work."
    )
}

#[debug_handler]
pub async fn chat_handler(
    State(s): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(e) => {
            debug!("chat: rejected body: {}", e);
            return Err(AppError::BadRequest(MISSING_INPUT));
        }
    };
    let message = req.message.unwrap_or_default();
    let portfolio_info = req.portfolio_info.unwrap_or_default();
    if message.trim().is_empty() || portfolio_info.is_empty() {
        return Err(AppError::BadRequest(MISSING_INPUT));
    }

    let prompt = system_prompt(&s.site_owner, &portfolio_info);
    let reply = match s.completer.complete(&prompt, &message).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Virgil API error: {:#}", e);
            return Err(AppError::InternalServerError(UPSTREAM_FAILED));
        }
    };
    let reply = match reply.trim() {
        "" => FALLBACK_REPLY.to_string(),
        trimmed => trimmed.to_string(),
    };

    Ok(Json(ChatResponse { reply }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_embeds_context() {
        let prompt = system_prompt(
            "Paolo",
            &["Paolo is an engineer.".to_string(), "He likes Rust.".to_string()],
        );
        assert!(prompt.starts_with("You are Virgil"));
        assert!(prompt.contains("explore Paolo's portfolio"));
        assert!(prompt.contains("Paolo is an engineer.\n\nHe likes Rust."));
    }
}
