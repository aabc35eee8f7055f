use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{ChatAction, MessagingCapabilities},
    Result,
};

/// Cross-messenger port.
///
/// Replies are plain text or an image; nothing is edited after it is sent.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Upload a local raster image shown inline in the chat. The caller owns the file.
    async fn send_photo(&self, chat_id: ChatId, path: &Path, caption: Option<&str>)
        -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
