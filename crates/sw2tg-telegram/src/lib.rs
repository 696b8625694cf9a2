//! Telegram adapter (teloxide).
//!
//! This crate implements the `sw2tg-core` MessagingPort over Telegram Bot API.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ParseMode, UpdateKind},
    RequestError,
};

pub mod router;

use sw2tg_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{
            BotCommand, ChatAction, IncomingMessage, IncomingUpdate, MessagingCapabilities,
            OutgoingMessage,
        },
    },
    Result,
};

const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    max_message_len: usize,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
        }
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len.min(TELEGRAM_MAX_MESSAGE_LEN);
        self
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }
}

/// Throttle answers become `RateLimited` so delivery can back off; API
/// rejections (bad markup, unknown chat) become `Delivery`.
fn map_err(e: RequestError) -> Error {
    match e {
        RequestError::RetryAfter(retry_after) => Error::RateLimited { retry_after },
        RequestError::Api(api) => Error::Delivery(format!("telegram api error: {api}")),
        RequestError::Network(net) => Error::Network(format!("telegram network error: {net}")),
        other => Error::External(format!("telegram error: {other}")),
    }
}

/// Reduce a Telegram update to what command dispatch reads.
pub fn incoming_update(update: Update) -> IncomingUpdate {
    let message = match update.kind {
        UpdateKind::Message(msg) => Some(IncomingMessage {
            message_id: MessageId(msg.id.0),
            chat_id: ChatId(msg.chat.id.0),
            sender: msg.from().and_then(|u| u.username.clone()),
            text: msg.text().map(str::to_string),
        }),
        _ => None,
    };
    IncomingUpdate {
        update_id: i64::from(update.id),
        message,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: self.max_message_len,
        }
    }

    async fn bot_username(&self) -> Result<String> {
        let me = self.bot.get_me().await.map_err(map_err)?;
        Ok(me.username().to_string())
    }

    async fn send_message(&self, msg: &OutgoingMessage) -> Result<MessageRef> {
        let mut req = self
            .bot
            .send_message(Self::tg_chat(msg.chat_id), msg.text.clone())
            .disable_web_page_preview(true);
        if msg.markdown {
            req = req.parse_mode(ParseMode::MarkdownV2);
        }
        if let Some(reply_to) = msg.reply_to {
            req = req.reply_to_message_id(Self::tg_msg_id(reply_to));
        }

        let sent = req.await.map_err(map_err)?;
        Ok(MessageRef {
            chat_id: msg.chat_id,
            message_id: MessageId(sent.id.0),
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(Self::tg_chat(chat_id), tg_action)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<IncomingUpdate>> {
        let offset = i32::try_from(offset)
            .map_err(|_| Error::External(format!("update offset out of range: {offset}")))?;
        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .await
            .map_err(map_err)?;
        Ok(updates.into_iter().map(incoming_update).collect())
    }

    async fn get_commands(&self) -> Result<Vec<BotCommand>> {
        let commands = self.bot.get_my_commands().await.map_err(map_err)?;
        Ok(commands
            .into_iter()
            .map(|c| BotCommand {
                command: c.command,
                description: c.description,
            })
            .collect())
    }

    async fn set_commands(&self, commands: &[BotCommand]) -> Result<()> {
        let commands = commands
            .iter()
            .map(|c| teloxide::types::BotCommand::new(c.command.clone(), c.description.clone()))
            .collect::<Vec<_>>();
        self.bot
            .set_my_commands(commands)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
