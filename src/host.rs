use crate::{
    adaptor::BoilerAdaptor,
    error::Result,
    protocol::AppMessage,
    scheduler::{TimerExpiry, TokioScheduler},
    transport::Transport,
    types::{AdaptorConfig, StateAction},
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Inbound event delivered by the host platform
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Raw message from the comms service
    Zwave(Value),
    /// Raw message from an app
    App(Value),
    /// Adaptor configuration from the manager
    Configure(Value),
    /// Lifecycle action from the manager (`error`, `clear_error` or a state name)
    State(String),
    /// Shutdown request
    Stop,
}

/// Source of inbound host events
///
/// Returning `None` means the host connection is gone; the loop then stops.
#[async_trait]
pub trait EventSource: Send {
    /// Wait for the next event
    async fn next_event(&mut self) -> Option<HostEvent>;
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<HostEvent> {
    async fn next_event(&mut self) -> Option<HostEvent> {
        self.recv().await
    }
}

/// Event source adapter for any [`Stream`] of host events
#[derive(Debug)]
pub struct StreamSource<St>(pub St);

#[async_trait]
impl<St> EventSource for StreamSource<St>
where
    St: Stream<Item = HostEvent> + Unpin + Send,
{
    async fn next_event(&mut self) -> Option<HostEvent> {
        self.0.next().await
    }
}

/// Single-task event loop driving one [`BoilerAdaptor`]
///
/// The host owns the adaptor and selects between inbound host events and timer
/// expiries, running each handler to completion before taking the next one.
#[derive(Debug)]
pub struct AdaptorHost<T, E> {
    adaptor: BoilerAdaptor<T, TokioScheduler>,
    expiries: mpsc::UnboundedReceiver<TimerExpiry>,
    events: E,
}

impl<T: Transport, E: EventSource> AdaptorHost<T, E> {
    /// Create a host for the adaptor described by `config`
    ///
    /// # Errors
    ///
    /// Returns [`crate::AdaptorError::Configuration`] if the configuration is invalid.
    pub fn new(config: AdaptorConfig, transport: T, events: E) -> Result<Self> {
        config.validate()?;

        let (scheduler, expiries) = TokioScheduler::new();
        Ok(Self {
            adaptor: BoilerAdaptor::new(config, transport, scheduler),
            expiries,
            events,
        })
    }

    /// Get the hosted adaptor
    #[must_use]
    pub const fn adaptor(&self) -> &BoilerAdaptor<T, TokioScheduler> {
        &self.adaptor
    }

    /// Hand one host event to the adaptor
    ///
    /// Returns false once the adaptor has been stopped.
    pub fn dispatch(&mut self, event: HostEvent) -> bool {
        match event {
            HostEvent::Zwave(value) => self.adaptor.on_zwave_value(&value),
            HostEvent::App(value) => match AppMessage::from_value(value.clone()) {
                Ok(message) => {
                    debug!(app_id = message.app_id(), "App message received");
                    self.adaptor.on_app_message(&message);
                }
                Err(e) => warn!("Unexpected app message, {}: {}", e, value),
            },
            HostEvent::Configure(config) => self.adaptor.on_configure_message(&config),
            HostEvent::State(name) => match StateAction::from_name(&name) {
                Some(action) => {
                    self.adaptor.set_state(action);
                }
                None => warn!("Unknown lifecycle action: {}", name),
            },
            HostEvent::Stop => {
                self.adaptor.on_stop();
                return false;
            }
        }
        true
    }

    /// Run until a stop event or until the event source closes
    ///
    /// Returns the adaptor so its final state can be inspected.
    pub async fn run(mut self) -> BoilerAdaptor<T, TokioScheduler> {
        let span = info_span!("adaptor", id = %self.adaptor.config().id);

        async move {
            info!(address = %self.adaptor.config().address, "Adaptor host started");

            loop {
                let event = tokio::select! {
                    event = self.events.next_event() => event,
                    Some(expiry) = self.expiries.recv() => {
                        self.adaptor.on_timer_expiry(expiry);
                        continue;
                    }
                };

                match event {
                    Some(event) => {
                        if !self.dispatch(event) {
                            break;
                        }
                    }
                    None => {
                        info!("Event source closed");
                        self.adaptor.on_stop();
                        break;
                    }
                }
            }

            info!("Adaptor host stopped");
            self.adaptor
        }
        .instrument(span)
        .await
    }
}
