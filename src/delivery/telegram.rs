//! Telegram Bot API adapter.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Delivery, DeliveryError, OutboundMessage};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<Vec<InlineButton<'a>>>,
}

#[derive(Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Posts messages through `sendMessage`.
#[derive(Clone)]
pub struct TelegramDelivery {
    client: Client,
    endpoint: String,
}

impl TelegramDelivery {
    /// Build an adapter for the bot identified by `token`.
    pub fn new(token: &str) -> Result<Self, reqwest::Error> {
        Self::with_base_url(API_BASE, token)
    }

    /// Same as [`TelegramDelivery::new`] against another API host.
    pub fn with_base_url(base_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", base_url.trim_end_matches('/'), token),
        })
    }

    fn payload<'a>(destination: &'a str, message: &'a OutboundMessage) -> SendMessage<'a> {
        let reply_markup = (!message.buttons.is_empty()).then(|| InlineKeyboard {
            inline_keyboard: vec![
                message
                    .buttons
                    .iter()
                    .map(|button| InlineButton {
                        text: &button.label,
                        callback_data: &button.payload,
                    })
                    .collect(),
            ],
        });
        SendMessage {
            chat_id: destination,
            text: &message.text,
            reply_markup,
        }
    }
}

impl Delivery for TelegramDelivery {
    fn send(
        &self,
        destination: &str,
        message: &OutboundMessage,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&Self::payload(destination, message));
        let destination = destination.to_owned();

        Box::pin(async move {
            let transport = |source: reqwest::Error| DeliveryError::Transport {
                destination: destination.clone(),
                source: Box::new(source),
            };

            let response = request.send().await.map_err(transport)?;
            let status = response.status();
            let body: ApiResponse = response.json().await.map_err(transport)?;

            if status.is_success() && body.ok {
                Ok(())
            } else {
                Err(DeliveryError::Rejected {
                    destination: destination.clone(),
                    reason: body
                        .description
                        .unwrap_or_else(|| format!("status {status}")),
                })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::AnswerButton;

    #[test]
    fn payload_renders_inline_keyboard_on_one_row() {
        let message = OutboundMessage {
            text: "Pick one".into(),
            buttons: vec![
                AnswerButton {
                    label: "A".into(),
                    payload: "answer_1_0".into(),
                },
                AnswerButton {
                    label: "B".into(),
                    payload: "answer_1_1".into(),
                },
            ],
        };

        let json = serde_json::to_value(TelegramDelivery::payload("-100", &message)).unwrap();

        assert_eq!(json["chat_id"], "-100");
        assert_eq!(json["reply_markup"]["inline_keyboard"][0][1]["callback_data"], "answer_1_1");
    }

    #[test]
    fn plain_text_has_no_keyboard() {
        let message = OutboundMessage::text("hi");
        let json = serde_json::to_value(TelegramDelivery::payload("-100", &message)).unwrap();
        assert!(json.get("reply_markup").is_none());
    }

    #[test]
    fn endpoint_includes_token() {
        let delivery = TelegramDelivery::with_base_url("http://localhost:9000/", "123:abc").unwrap();
        assert_eq!(delivery.endpoint, "http://localhost:9000/bot123:abc/sendMessage");
    }
}
