//! Chat-with-data handler

use std::sync::Arc;

use axum::{extract::State, Json};
use tracing::{info, warn};

use crate::{AppError, AppState};
use tally_core::chat::{ChatReply, ChatRequest};

/// POST /api/chat-with-data - Forward a question to the query service
pub async fn chat_with_data(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if request.query.trim().is_empty() {
        return Err(AppError::bad_request("Query is required"));
    }

    match state.chat.ask(&request).await {
        Ok(reply) => {
            info!(
                conversation = ?reply.conversation_id,
                has_sql = reply.sql.is_some(),
                "Chat query answered"
            );
            Ok(Json(reply))
        }
        Err(e) => {
            warn!(error = %e, "Chat query failed");
            Err(AppError::from_core(e))
        }
    }
}
