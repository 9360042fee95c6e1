use futures::future::BoxFuture;
use tracing::info;

use super::{Delivery, DeliveryError, OutboundMessage};

/// Writes messages to the log instead of a chat. Used when no bot token is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDelivery;

impl Delivery for LogDelivery {
    fn send(
        &self,
        destination: &str,
        message: &OutboundMessage,
    ) -> BoxFuture<'static, Result<(), DeliveryError>> {
        info!(
            destination = %destination,
            buttons = message.buttons.len(),
            text = %message.text,
            "outbound message"
        );
        Box::pin(async { Ok(()) })
    }
}
