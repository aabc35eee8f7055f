//! Telegram update handlers.
//!
//! Text messages are handed to the core command router; every other update
//! kind is ignored.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, error};

use gastos_core::domain::ChatId;

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    if let Err(e) = state.expenses.dispatch(chat_id, text).await {
        error!(chat_id = chat_id.0, "failed to reply: {e}");
    }

    Ok(())
}
