use crate::parser::EventFrame;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadyState {
    #[default]
    Initializing,
    Connecting,
    Open,
    Closed,
}

impl ReadyState {
    /// Transitions only move forward; anything may jump straight to `Closed`.
    pub fn can_transition_to(self, next: ReadyState) -> bool {
        (next == ReadyState::Closed && self != ReadyState::Closed) || next > self
    }

    pub fn is_closed(self) -> bool {
        self == ReadyState::Closed
    }
}

/// Why a request failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, reset or otherwise broken.
    Network,
    /// Non-200 response; `body` is the raw response text.
    Status,
    /// No bytes for longer than the idle timeout.
    Timeout,
    /// Response body could not be read.
    Decode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    // Lifecycle events
    Open,
    ReadyStateChange {
        ready_state: ReadyState,
    },

    // Content events
    Message {
        frame: EventFrame,
    },

    // Failure events
    Error {
        kind: FailureKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        body: String,
    },

    // Cancelled events
    Abort,
}

impl TransportEvent {
    /// The final event of every request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransportEvent::ReadyStateChange {
                ready_state: ReadyState::Closed
            }
        )
    }
}
