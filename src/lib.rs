pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod init;
pub mod lang;
pub mod models;
pub mod parser;
pub mod session;
pub mod transport;
pub mod types;

pub use crate::config::SessionConfig;
pub use crate::connector::{Connector, HttpConnector, RequestOptions, TransportError};
pub use crate::error::{AppError, ErrorCode, Result};
pub use crate::events::{FailureKind, ReadyState, TransportEvent};
pub use crate::models::{ChatMessage, ChatMessageParams};
pub use crate::parser::{EventFrame, EventFrameParser};
pub use crate::session::{ChatStreamSession, RejectReason, SessionUpdate, SessionView, Submission};
pub use crate::transport::StreamTransport;
pub use tokio_util::sync::CancellationToken;
