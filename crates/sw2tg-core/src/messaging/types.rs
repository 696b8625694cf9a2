use crate::domain::{ChatId, MessageId};

/// Inbound update, reduced to what command dispatch needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingUpdate {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender: Option<String>,
    pub text: Option<String>,
}

/// Outgoing text message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    pub text: String,
    /// Render as MarkdownV2; plain text otherwise.
    pub markdown: bool,
    pub reply_to: Option<MessageId>,
}

impl OutgoingMessage {
    pub fn markdown(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            markdown: true,
            reply_to: None,
        }
    }

    pub fn reply_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Entry of the bot's published command menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCommand {
    /// Command name without the leading slash.
    pub command: String,
    pub description: String,
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
}
