//! Progress events and the bounded channel that carries them
//!
//! The core never blocks on a slow observer: when the channel is full the
//! oldest queued event is discarded to make room for the newest one. The
//! terminal event is always the last one sent, so it is never the one dropped.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::debug;
use serde::Serialize;
use std::fmt;

/// Default number of queued events before the oldest is dropped
pub const PROGRESS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Paused,
    Stopped,
    Complete,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopped => "stopped",
            RunStatus::Complete => "complete",
            RunStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// One status update, immutable once emitted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub status: RunStatus,
    pub progress: u8,
    pub message: String,
    pub terminal: bool,
}

impl ProgressEvent {
    pub fn running(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Running,
            progress: progress.min(100),
            message: message.into(),
            terminal: false,
        }
    }

    pub fn paused(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Paused,
            progress: progress.min(100),
            message: message.into(),
            terminal: false,
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Complete,
            progress: 100,
            message: message.into(),
            terminal: true,
        }
    }

    pub fn stopped(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Stopped,
            progress: progress.min(100),
            message: message.into(),
            terminal: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            progress: 0,
            message: message.into(),
            terminal: true,
        }
    }

    /// Console rendering used by the text reporter
    pub fn to_text(&self) -> String {
        format!(
            "[{}] {}% - {}",
            self.status.to_string().to_uppercase(),
            self.progress,
            self.message
        )
    }
}

/// Percentage of `done` out of `total`, clamped to 0..=100
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

/// Sending half of the progress channel with drop-oldest backpressure
#[derive(Debug, Clone)]
pub struct ProgressSender {
    sender: Sender<ProgressEvent>,
    // Held only to evict the oldest event when the queue is full
    evict: Receiver<ProgressEvent>,
}

impl ProgressSender {
    /// Emit an event without ever blocking
    pub fn emit(&self, event: ProgressEvent) {
        let mut event = event;
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    if let Ok(dropped) = self.evict.try_recv() {
                        debug!("Progress queue full, dropping '{}'", dropped.message);
                    }
                    event = returned;
                }
                // Nobody is listening anymore
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Create a progress channel holding at most `capacity` undelivered events
pub fn channel(capacity: usize) -> (ProgressSender, Receiver<ProgressEvent>) {
    let (sender, receiver) = bounded(capacity.max(1));
    let sender = ProgressSender {
        sender,
        evict: receiver.clone(),
    };
    (sender, receiver)
}
