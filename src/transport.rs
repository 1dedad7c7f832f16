use crate::{
    error::{AdaptorError, Result},
    protocol::{AppReply, StateReport, ZwaveRequest},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

/// Outbound side of the host connection
///
/// Every send is fire-and-forget: implementations must not block the caller
/// and never wait for an acknowledgement.
pub trait Transport: Send {
    /// Send a request to the comms service
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::ChannelClosed`] if the comms side is gone.
    fn send_zwave(&self, request: ZwaveRequest) -> Result<()>;

    /// Send a lifecycle report to the manager
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::ChannelClosed`] if the manager side is gone.
    fn send_manager(&self, report: StateReport) -> Result<()>;

    /// Send a message to one app
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::ChannelClosed`] if the app side is gone.
    fn send_app(&self, app_id: &str, message: AppReply) -> Result<()>;
}

/// A message leaving the adaptor, tagged with its destination
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// To the comms service
    Zwave(ZwaveRequest),
    /// To the manager
    Manager(StateReport),
    /// To a single app
    App {
        /// Destination app id
        app_id: String,
        /// Message body
        message: AppReply,
    },
}

impl Outbound {
    /// Name of the collaborator this message is for
    #[must_use]
    pub fn destination(&self) -> &str {
        match self {
            Self::Zwave(_) => "comms",
            Self::Manager(_) => "manager",
            Self::App { app_id, .. } => app_id,
        }
    }

    /// Encode the message body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<Value> {
        let body = match self {
            Self::Zwave(request) => serde_json::to_value(request)?,
            Self::Manager(report) => serde_json::to_value(report)?,
            Self::App { message, .. } => serde_json::to_value(message)?,
        };
        Ok(body)
    }
}

/// Transport that queues outbound messages on an unbounded channel
///
/// The host drains the receiver and forwards each message over its own wire.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelTransport {
    /// Create a transport and the receiver the host reads from
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn push(&self, message: Outbound) -> Result<()> {
        trace!(destination = message.destination(), "Queueing outbound message");
        self.sender
            .send(message)
            .map_err(|rejected| AdaptorError::ChannelClosed {
                destination: rejected.0.destination().to_string(),
            })
    }
}

impl Transport for ChannelTransport {
    fn send_zwave(&self, request: ZwaveRequest) -> Result<()> {
        self.push(Outbound::Zwave(request))
    }

    fn send_manager(&self, report: StateReport) -> Result<()> {
        self.push(Outbound::Manager(report))
    }

    fn send_app(&self, app_id: &str, message: AppReply) -> Result<()> {
        self.push(Outbound::App {
            app_id: app_id.to_string(),
            message,
        })
    }
}
