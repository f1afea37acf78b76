//! Push-notification plumbing.
//!
//! The delivery transport is external; it hands messages to an
//! [`mpsc`] channel owned by the process. A [`PushDispatcher`] routes each
//! message to the foreground consumer when one is attached, and otherwise
//! handles it in the background — logging only, since no UI state may be
//! assumed there. The dispatcher is registered at process start, before and
//! independent of any orchestrator.

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CHANNEL_CAPACITY: usize = 32;

/// Inbound push message; the body optionally carries a campaign URL.
#[derive(Clone, Debug)]
pub struct PushMessage {
    pub body: Option<String>,
}

/// Where a message ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Foreground,
    Background,
}

/// Create the transport-facing channel. The sender is handed to platform
/// glue (or tests); the receiver feeds a [`PushDispatcher`].
pub fn channel() -> (mpsc::Sender<PushMessage>, mpsc::Receiver<PushMessage>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

pub struct PushDispatcher {
    incoming: mpsc::Receiver<PushMessage>,
    foreground: Option<mpsc::Sender<PushMessage>>,
}

impl PushDispatcher {
    pub fn new(incoming: mpsc::Receiver<PushMessage>) -> Self {
        Self {
            incoming,
            foreground: None,
        }
    }

    /// Attach the foreground consumer (the campaign interceptor's inbox).
    pub fn attach_foreground(&mut self, tx: mpsc::Sender<PushMessage>) {
        self.foreground = Some(tx);
    }

    pub fn detach_foreground(&mut self) {
        self.foreground = None;
    }

    fn deliver(&self, message: PushMessage) -> Delivery {
        if let Some(tx) = &self.foreground
            && tx.try_send(message.clone()).is_ok()
        {
            return Delivery::Foreground;
        }

        // Background handler: no UI exists here, log and move on.
        info!("push message handled in the background: {message:?}");
        Delivery::Background
    }

    /// Run until the transport closes or the token is cancelled.
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("push dispatcher cancelled");
                        break;
                    }
                    message = self.incoming.recv() => {
                        match message {
                            Some(message) => {
                                self.deliver(message);
                            }
                            None => {
                                debug!("push transport closed");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}
