//! Outbound message channel: questions and ceremony announcements.

/// Delivery that writes to the log only.
pub mod log;
pub mod render;
#[cfg(feature = "telegram-delivery")]
pub mod telegram;

use std::{error::Error, time::Duration};

use futures::future::{BoxFuture, join_all};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use self::log::LogDelivery;

/// Inline answer button attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerButton {
    /// Text shown on the button.
    pub label: String,
    /// Opaque payload echoed back by the channel when pressed.
    pub payload: String,
}

/// Channel-agnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Plain text body.
    pub text: String,
    /// Answer buttons, rendered on one row.
    pub buttons: Vec<AnswerButton>,
}

impl OutboundMessage {
    /// Message without buttons.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
        }
    }
}

/// Failure delivering to a single destination.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The channel could not be reached.
    #[error("failed to reach delivery channel for `{destination}`")]
    Transport {
        /// Target conversation.
        destination: String,
        /// Transport failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The channel answered with an error.
    #[error("delivery channel rejected message for `{destination}`: {reason}")]
    Rejected {
        /// Target conversation.
        destination: String,
        /// Reason reported by the channel.
        reason: String,
    },
    /// No answer within the delivery timeout.
    #[error("delivery to `{destination}` timed out")]
    Timeout {
        /// Target conversation.
        destination: String,
    },
}

/// Sends messages to one destination at a time.
pub trait Delivery: Send + Sync {
    /// Send `message` to `destination`.
    fn send(
        &self,
        destination: &str,
        message: &OutboundMessage,
    ) -> BoxFuture<'static, Result<(), DeliveryError>>;
}

/// Outcome of [`broadcast`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Destinations that accepted the message.
    pub delivered: usize,
    /// Destinations that failed or timed out.
    pub failed: usize,
}

/// Send `message` to every destination concurrently, each bounded by `limit`.
///
/// Failures are logged per destination and never affect the others.
pub async fn broadcast(
    delivery: &dyn Delivery,
    destinations: &[String],
    message: &OutboundMessage,
    limit: Duration,
) -> BroadcastReport {
    let sends = destinations.iter().map(|destination| {
        let send = delivery.send(destination, message);
        async move {
            match timeout(limit, send).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout {
                    destination: destination.clone(),
                }),
            }
        }
    });

    let mut report = BroadcastReport::default();
    for (destination, result) in destinations.iter().zip(join_all(sends).await) {
        match result {
            Ok(()) => {
                debug!(destination = %destination, "message delivered");
                report.delivered += 1;
            }
            Err(err) => {
                warn!(destination = %destination, error = %err, "message delivery failed");
                report.failed += 1;
            }
        }
    }
    report
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Records every message and fails for destinations listed in `failing`.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDelivery {
        sent: Arc<Mutex<Vec<(String, OutboundMessage)>>>,
        failing: Vec<String>,
        stalled: Vec<String>,
    }

    impl RecordingDelivery {
        pub(crate) fn failing(destinations: &[&str]) -> Self {
            Self {
                failing: destinations.iter().map(|d| d.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn stalled(destinations: &[&str]) -> Self {
            Self {
                stalled: destinations.iter().map(|d| d.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn sent(&self) -> Vec<(String, OutboundMessage)> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Delivery for RecordingDelivery {
        fn send(
            &self,
            destination: &str,
            message: &OutboundMessage,
        ) -> BoxFuture<'static, Result<(), DeliveryError>> {
            let destination = destination.to_owned();
            let message = message.clone();
            let sent = Arc::clone(&self.sent);
            let fails = self.failing.contains(&destination);
            let stalls = self.stalled.contains(&destination);
            Box::pin(async move {
                if stalls {
                    futures::future::pending::<()>().await;
                }
                if fails {
                    return Err(DeliveryError::Rejected {
                        destination,
                        reason: "chat not found".into(),
                    });
                }
                sent.lock().unwrap().push((destination, message));
                Ok(())
            })
        }
    }
}
