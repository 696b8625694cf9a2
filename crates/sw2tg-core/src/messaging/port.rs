use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{BotCommand, ChatAction, IncomingUpdate, MessagingCapabilities, OutgoingMessage},
    Result,
};

/// Messenger port.
///
/// Implementations send exactly once per call. A platform throttle answer
/// must surface as `Error::RateLimited` so the delivery engine can back off.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Username of the bot account (without `@`).
    async fn bot_username(&self) -> Result<String>;

    /// Send one message. Link previews are always disabled.
    async fn send_message(&self, msg: &OutgoingMessage) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    /// Updates with an id of at least `offset`, in arrival order.
    async fn get_updates(&self, offset: i64) -> Result<Vec<IncomingUpdate>>;

    async fn get_commands(&self) -> Result<Vec<BotCommand>>;
    async fn set_commands(&self, commands: &[BotCommand]) -> Result<()>;
}
