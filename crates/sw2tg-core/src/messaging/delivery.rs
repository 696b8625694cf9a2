use std::{sync::Arc, time::Duration};

use tokio::time::sleep;

use crate::{
    domain::{ChatId, MessageId},
    formatting::utf16_len,
    messaging::{port::MessagingPort, types::OutgoingMessage},
    Error, Result,
};

/// Sends composed messages with throttle backoff and a plain-text fallback.
///
/// Every attempt that the platform throttles is retried exactly once after
/// twice the requested delay. A MarkdownV2 send that still fails is repeated
/// once as plain text; whatever that second attempt returns is final.
#[derive(Clone)]
pub struct Delivery {
    port: Arc<dyn MessagingPort>,
}

impl Delivery {
    pub fn new(port: Arc<dyn MessagingPort>) -> Self {
        Self { port }
    }

    pub fn port(&self) -> &Arc<dyn MessagingPort> {
        &self.port
    }

    pub async fn send(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.deliver(OutgoingMessage::markdown(chat_id, text)).await
    }

    pub async fn send_reply(&self, chat_id: ChatId, text: &str, reply_to: MessageId) -> Result<()> {
        self.deliver(OutgoingMessage::markdown(chat_id, text).reply_to(reply_to))
            .await
    }

    pub async fn deliver(&self, msg: OutgoingMessage) -> Result<()> {
        match self.send_with_backoff(&msg).await {
            Ok(()) => Ok(()),
            Err(e) if msg.markdown => {
                tracing::warn!(
                    "MarkdownV2 send to {} failed ({e}), retrying as plain text",
                    msg.chat_id.0
                );
                let plain = OutgoingMessage {
                    markdown: false,
                    ..msg
                };
                self.send_with_backoff(&plain).await
            }
            Err(e) => Err(e),
        }
    }

    async fn send_with_backoff(&self, msg: &OutgoingMessage) -> Result<()> {
        match self.port.send_message(msg).await {
            Ok(_) => Ok(()),
            Err(Error::RateLimited { retry_after }) => {
                let wait = retry_after * 2;
                tracing::warn!(
                    "rate limited sending to {}, sleeping {}s before last try",
                    msg.chat_id.0,
                    wait.as_secs()
                );
                sleep(wait).await;
                self.port.send_message(msg).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    /// Send blocks in order, stopping at the first failure.
    pub async fn send_batch(&self, chat_id: ChatId, texts: &[String]) -> Result<()> {
        self.send_batch_paced(chat_id, texts, Duration::ZERO).await
    }

    /// Like [`Delivery::send_batch`], sleeping `interval` between sends.
    pub async fn send_batch_paced(
        &self,
        chat_id: ChatId,
        texts: &[String],
        interval: Duration,
    ) -> Result<()> {
        let total = texts.len();
        for (idx, text) in texts.iter().enumerate() {
            if idx > 0 && !interval.is_zero() {
                sleep(interval).await;
            }
            tracing::info!(
                "Sending to {} {}/{} {}chars",
                chat_id.0,
                idx + 1,
                total,
                utf16_len(text)
            );
            self.send(chat_id, text).await?;
        }
        Ok(())
    }
}
