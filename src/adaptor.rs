use crate::{
    error::{AdaptorError, Result},
    protocol::{
        unix_timestamp, AppCommand, AppInit, AppMessage, AppReply, CharacteristicUpdate,
        CharacteristicValue, DataReport, ServiceAdvert, ServiceRequest, StateReport,
        ZwaveMessage, ZwaveRequest,
    },
    scheduler::{Scheduler, TimerExpiry, TimerKind},
    transport::Transport,
    types::{AdaptorConfig, Characteristic, LifecycleState, StateAction, SwitchState},
};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Mutable state of one adaptor instance
///
/// Nothing here survives a restart; [`AdaptorState::default`] is the state of a
/// freshly started process.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptorState {
    /// Adaptor status advertised to apps
    pub status: &'static str,
    /// Lifecycle as last reported to the manager
    pub lifecycle: LifecycleState,
    /// Last reported reachability of the device
    pub connected: bool,
    /// Last relay position confirmed by the device
    pub switch_state: SwitchState,
    /// Subscribed app ids per characteristic, in subscription order
    pub subscribers: IndexMap<Characteristic, IndexSet<String>>,
    /// Time of the last init or data report from the comms service
    pub last_update: Option<SystemTime>,
}

impl Default for AdaptorState {
    fn default() -> Self {
        Self {
            status: "ok",
            lifecycle: LifecycleState::Stopped,
            connected: false,
            switch_state: SwitchState::Unknown,
            subscribers: Characteristic::ALL
                .into_iter()
                .map(|characteristic| (characteristic, IndexSet::new()))
                .collect(),
            last_update: None,
        }
    }
}

impl AdaptorState {
    /// App ids subscribed to `characteristic`
    pub fn subscribers_of(&self, characteristic: Characteristic) -> impl Iterator<Item = &str> {
        self.subscribers
            .get(&characteristic)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Check if `app_id` is subscribed to `characteristic`
    #[must_use]
    pub fn is_subscribed(&self, app_id: &str, characteristic: Characteristic) -> bool {
        self.subscribers
            .get(&characteristic)
            .is_some_and(|apps| apps.contains(app_id))
    }
}

/// Adaptor between one Z-Wave boiler relay and the host's apps
///
/// `BoilerAdaptor` keeps the relay's last known state and translates in both
/// directions:
///
/// - **Inbound**: comms-service reports (`init`, class 64 `mode`, class 0 `isFailed`)
///   update local state and are pushed as characteristics to subscribed apps.
/// - **Outbound**: app `on`/`off` commands become class 64 `Set` requests.
///
/// It also polls device reachability on a timer and reports lifecycle changes to
/// the manager. Every handler runs to completion and never fails: malformed input
/// is logged at warning level and dropped, and delivery failures are logged and
/// otherwise ignored.
///
/// The adaptor is driven by a single event loop (see [`crate::host::AdaptorHost`]),
/// so it takes `&mut self` and holds no locks.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use zwave_boiler::{
///     AdaptorConfig, BoilerAdaptor, ChannelTransport, LifecycleState, TokioScheduler,
/// };
///
/// #[tokio::main]
/// async fn main() {
///     let (transport, mut outbound) = ChannelTransport::new();
///     let (scheduler, _expiries) = TokioScheduler::new();
///     let mut adaptor =
///         BoilerAdaptor::new(AdaptorConfig::new("BID7", "12"), transport, scheduler);
///
///     adaptor.on_configure_message(&json!({}));
///     assert_eq!(adaptor.state().lifecycle, LifecycleState::Starting);
///     assert_eq!(outbound.try_recv().unwrap().destination(), "manager");
/// }
/// ```
#[derive(Debug)]
pub struct BoilerAdaptor<T, S> {
    config: AdaptorConfig,
    transport: T,
    scheduler: S,
    state: AdaptorState,
}

impl<T: Transport, S: Scheduler> BoilerAdaptor<T, S> {
    /// Create an adaptor in the `stopped` state with no subscribers
    #[must_use]
    pub fn new(config: AdaptorConfig, transport: T, scheduler: S) -> Self {
        Self {
            config,
            transport,
            scheduler,
            state: AdaptorState::default(),
        }
    }

    /// Get the adaptor configuration
    #[must_use]
    pub const fn config(&self) -> &AdaptorConfig {
        &self.config
    }

    /// Get the current adaptor state
    #[must_use]
    pub const fn state(&self) -> &AdaptorState {
        &self.state
    }

    /// Get the scheduler the adaptor arms its timers on
    #[must_use]
    pub const fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Apply a lifecycle action and report the resulting state to the manager
    ///
    /// The report is sent even when the action is not valid from the current
    /// state; in that case it carries the unchanged state.
    pub fn set_state(&mut self, action: StateAction) -> LifecycleState {
        let previous = self.state.lifecycle;
        let next = action.apply(previous);

        if next == previous {
            if action != StateAction::Enter(previous) {
                debug!(?action, state = %previous, "Lifecycle action has no effect");
            }
        } else {
            info!(from = %previous, to = %next, "Lifecycle state changed");
            self.state.lifecycle = next;
        }

        let report = StateReport::new(&self.config.id, next);
        if let Err(e) = self.transport.send_manager(report) {
            debug!("Failed to report state to manager: {}", e);
        }

        next
    }

    /// Push a characteristic update to every app subscribed to it
    pub fn send_characteristic(
        &self,
        characteristic: Characteristic,
        data: CharacteristicValue,
        time_stamp: f64,
    ) {
        let update = CharacteristicUpdate::new(&self.config.id, characteristic, data, time_stamp);

        for app_id in self.state.subscribers_of(characteristic) {
            if let Err(e) = self
                .transport
                .send_app(app_id, AppReply::Characteristic(update.clone()))
            {
                debug!(app_id, %characteristic, "Failed to push characteristic: {}", e);
            }
        }
    }

    /// Stop hook; cancels outstanding timers
    ///
    /// Nothing else is held, so stopping while still `starting` is harmless.
    pub fn on_stop(&mut self) {
        info!("Adaptor stopping");
        self.scheduler.cancel_all();
    }

    /// Probe device reachability and re-arm the poll timer
    pub fn poll_sensors(&mut self) {
        debug!("Polling device");
        self.send_zwave(ZwaveRequest::check(&self.config.id, &self.config.address));

        if self.config.poll_mode_each_tick {
            self.send_zwave(ZwaveRequest::refresh_mode(
                &self.config.id,
                &self.config.address,
            ));
        }

        self.scheduler
            .schedule(TimerKind::Poll, self.config.poll_interval());
    }

    /// Record the device's failure flag, notifying `connected` subscribers on change
    ///
    /// Returns whether the reachability changed.
    pub fn check_connected(&mut self, is_failed: bool) -> bool {
        let connected = !is_failed;
        if connected == self.state.connected {
            return false;
        }

        info!(connected, "Device reachability changed");
        self.state.connected = connected;
        self.send_characteristic(
            Characteristic::Connected,
            CharacteristicValue::Flag(connected),
            unix_timestamp(),
        );
        true
    }

    /// Decode and handle a raw message from the comms service
    ///
    /// Malformed messages are logged at warning level and discarded.
    pub fn on_zwave_value(&mut self, value: &Value) {
        match ZwaveMessage::from_value(value) {
            Ok(message) => self.on_zwave_message(message),
            Err(e) => warn!("Unexpected Z-Wave message, {}: {}", e, value),
        }
    }

    /// Handle a decoded message from the comms service
    pub fn on_zwave_message(&mut self, message: ZwaveMessage) {
        self.state.last_update = Some(SystemTime::now());

        match message {
            ZwaveMessage::Init => {
                info!(address = %self.config.address, "Comms service attached to device");
                self.send_zwave(ZwaveRequest::get_mode(&self.config.id, &self.config.address));
                self.send_zwave(ZwaveRequest::get_node_status(
                    &self.config.id,
                    &self.config.address,
                ));

                self.scheduler.cancel(TimerKind::Poll);
                self.scheduler
                    .schedule(TimerKind::InitDelay, self.config.init_poll_delay());
            }
            ZwaveMessage::Data(DataReport::Mode(state)) => {
                debug!(%state, "Relay mode reported");
                self.state.switch_state = state;
                self.send_characteristic(
                    Characteristic::BinarySensor,
                    CharacteristicValue::State(state),
                    unix_timestamp(),
                );
            }
            ZwaveMessage::Data(DataReport::IsFailed(is_failed)) => {
                self.check_connected(is_failed);
            }
            ZwaveMessage::Data(DataReport::Unhandled {
                command_class,
                name,
            }) => {
                debug!(%command_class, ?name, "Ignoring Z-Wave report");
            }
        }
    }

    /// Command the relay on or off
    ///
    /// Local `switch_state` is left alone until the device confirms the change.
    pub fn switch(&self, state: SwitchState) {
        info!(%state, "Switching boiler");
        self.send_zwave(ZwaveRequest::set_switch(
            &self.config.id,
            &self.config.address,
            state,
        ));
    }

    /// Dispatch a decoded app message to its handler
    pub fn on_app_message(&mut self, message: &AppMessage) {
        match message {
            AppMessage::Init(init) => self.on_app_init(init),
            AppMessage::Service(request) => self.on_app_request(request),
            AppMessage::Command(command) => self.on_app_command(command),
        }
    }

    /// Advertise this adaptor's services to an app and enter `running`
    pub fn on_app_init(&mut self, init: &AppInit) {
        let advert = ServiceAdvert::new(
            &self.config.name,
            &self.config.id,
            self.config.poll_interval_secs,
        );
        if let Err(e) = self.transport.send_app(&init.id, AppReply::Service(advert)) {
            debug!(app_id = %init.id, "Failed to send service advert: {}", e);
        }

        self.set_state(StateAction::Enter(LifecycleState::Running));
    }

    /// Replace an app's subscriptions with the characteristics it now requests
    pub fn on_app_request(&mut self, request: &ServiceRequest) {
        for apps in self.state.subscribers.values_mut() {
            apps.shift_remove(request.id.as_str());
        }

        for service in &request.service {
            match Characteristic::from_name(&service.characteristic) {
                Some(characteristic) => {
                    self.state
                        .subscribers
                        .entry(characteristic)
                        .or_default()
                        .insert(request.id.clone());
                }
                None => {
                    let e = AdaptorError::UnknownCharacteristic(service.characteristic.clone());
                    warn!(app_id = %request.id, "Skipping service request: {}", e);
                }
            }
        }

        debug!(app_id = %request.id, subscribers = ?self.state.subscribers, "Apps updated");
    }

    /// Switch the relay if an app asks for a position other than the confirmed one
    pub fn on_app_command(&mut self, command: &AppCommand) {
        let state = match requested_state(command) {
            Ok(state) => state,
            Err(e) => {
                warn!(app_id = %command.id, "Dropping app command: {}", e);
                return;
            }
        };

        if state == self.state.switch_state {
            debug!(%state, "Relay already in requested state");
        } else {
            self.switch(state);
        }
    }

    /// Handle a (possibly repeated) configuration from the host
    pub fn on_configure_message(&mut self, config: &Value) {
        debug!(%config, "Configuration received");
        self.set_state(StateAction::Enter(LifecycleState::Starting));
    }

    /// Handle a timer expiry delivered by the event loop
    ///
    /// Expiries of timers that were replaced or cancelled are dropped.
    pub fn on_timer_expiry(&mut self, expiry: TimerExpiry) {
        if self.scheduler.fired(expiry) {
            self.on_timer(expiry.kind);
        } else {
            debug!(?expiry, "Dropping stale timer expiry");
        }
    }

    /// Run the work behind an expired timer
    pub fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::InitDelay | TimerKind::Poll => self.poll_sensors(),
        }
    }

    fn send_zwave(&self, request: ZwaveRequest) {
        if let Err(e) = self.transport.send_zwave(request) {
            debug!("Failed to send Z-Wave request: {}", e);
        }
    }
}

/// Parse the relay position an app command asks for
fn requested_state(command: &AppCommand) -> Result<SwitchState> {
    let data = command
        .data
        .as_ref()
        .ok_or_else(|| AdaptorError::InvalidCommand("missing data".to_string()))?;

    data.as_str()
        .and_then(SwitchState::from_command)
        .ok_or_else(|| AdaptorError::InvalidCommand(format!("expected on or off, got {data}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        protocol::{RequestKind, RequestedService},
        transport::{ChannelTransport, Outbound},
    };
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    /// Scheduler double that records what was armed
    #[derive(Debug, Default)]
    struct RecordingScheduler {
        armed: Vec<(TimerKind, Duration)>,
        pending: IndexMap<TimerKind, u64>,
        generation: u64,
    }

    impl Scheduler for RecordingScheduler {
        fn schedule(&mut self, kind: TimerKind, delay: Duration) {
            self.generation += 1;
            self.armed.push((kind, delay));
            self.pending.insert(kind, self.generation);
        }

        fn cancel(&mut self, kind: TimerKind) -> bool {
            self.pending.shift_remove(&kind).is_some()
        }

        fn cancel_all(&mut self) {
            self.pending.clear();
        }

        fn fired(&mut self, expiry: TimerExpiry) -> bool {
            if self.pending.get(&expiry.kind) == Some(&expiry.generation) {
                self.pending.shift_remove(&expiry.kind);
                true
            } else {
                false
            }
        }
    }

    impl RecordingScheduler {
        fn expiry(&self, kind: TimerKind) -> TimerExpiry {
            TimerExpiry {
                kind,
                generation: self.pending[&kind],
            }
        }
    }

    type TestAdaptor = BoilerAdaptor<ChannelTransport, RecordingScheduler>;

    fn adaptor() -> (TestAdaptor, UnboundedReceiver<Outbound>) {
        let (transport, outbound) = ChannelTransport::new();
        let adaptor = BoilerAdaptor::new(
            AdaptorConfig::new("BID7", "12"),
            transport,
            RecordingScheduler::default(),
        );
        (adaptor, outbound)
    }

    fn drain(outbound: &mut UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut messages = Vec::new();
        while let Ok(message) = outbound.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn zwave_requests(messages: &[Outbound]) -> Vec<&ZwaveRequest> {
        messages
            .iter()
            .filter_map(|message| match message {
                Outbound::Zwave(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn app_updates<'a>(messages: &'a [Outbound], app: &str) -> Vec<&'a CharacteristicUpdate> {
        messages
            .iter()
            .filter_map(|message| match message {
                Outbound::App {
                    app_id,
                    message: AppReply::Characteristic(update),
                } if app_id == app => Some(update),
                _ => None,
            })
            .collect()
    }

    fn subscribe(adaptor: &mut TestAdaptor, app_id: &str, characteristics: &[&str]) {
        adaptor.on_app_request(&ServiceRequest {
            id: app_id.to_string(),
            service: characteristics
                .iter()
                .map(|name| RequestedService {
                    characteristic: (*name).to_string(),
                    interval: None,
                })
                .collect(),
        });
    }

    fn command(data: Option<Value>) -> AppCommand {
        AppCommand {
            id: "AID1".to_string(),
            data,
        }
    }

    #[test]
    fn test_initial_state() {
        let (adaptor, mut outbound) = adaptor();
        let state = adaptor.state();

        assert_eq!(state.status, "ok");
        assert_eq!(state.lifecycle, LifecycleState::Stopped);
        assert!(!state.connected);
        assert_eq!(state.switch_state, SwitchState::Unknown);
        assert_eq!(state.subscribers.len(), 3);
        assert!(state.subscribers.values().all(IndexSet::is_empty));
        assert!(state.last_update.is_none());
        assert!(drain(&mut outbound).is_empty());
    }

    #[test]
    fn test_set_state_always_reports() {
        let (mut adaptor, mut outbound) = adaptor();

        assert_eq!(
            adaptor.set_state(StateAction::ClearError),
            LifecycleState::Stopped
        );
        assert_eq!(adaptor.set_state(StateAction::Error), LifecycleState::Stopped);

        let reports: Vec<_> = drain(&mut outbound)
            .into_iter()
            .map(|message| match message {
                Outbound::Manager(report) => report.state,
                other => panic!("unexpected message {other:?}"),
            })
            .collect();
        assert_eq!(reports, vec![LifecycleState::Stopped, LifecycleState::Stopped]);
    }

    #[test]
    fn test_error_is_cleared_back_to_running() {
        let (mut adaptor, mut outbound) = adaptor();
        adaptor.set_state(StateAction::Enter(LifecycleState::Running));
        adaptor.set_state(StateAction::Error);
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Error);

        adaptor.on_configure_message(&json!({}));
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Error);

        adaptor.set_state(StateAction::ClearError);
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Running);

        let last = drain(&mut outbound).pop().unwrap();
        assert_eq!(
            last.to_json().unwrap(),
            json!({"id": "BID7", "status": "state", "state": "running"})
        );
    }

    #[test]
    fn test_configure_then_app_init() {
        let (mut adaptor, mut outbound) = adaptor();

        adaptor.on_configure_message(&json!({"apps": ["AID1"]}));
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Starting);

        adaptor.on_app_init(&AppInit {
            id: "AID1".to_string(),
        });
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Running);

        let messages = drain(&mut outbound);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].destination(), "AID1");
        let advert = messages[1].to_json().unwrap();
        assert_eq!(advert["content"], "service");
        assert_eq!(advert["name"], "boiler-control");
        assert_eq!(advert["service"][0]["interval"], 15);
        assert_eq!(advert["service"][2]["interval"], 0);
        assert_eq!(messages[2].to_json().unwrap()["state"], "running");
    }

    #[test]
    fn test_init_requests_state_and_schedules_first_poll() {
        let (mut adaptor, mut outbound) = adaptor();
        adaptor.on_zwave_value(&json!({"content": "init"}));

        let messages = drain(&mut outbound);
        let requests = zwave_requests(&messages);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].request, RequestKind::Get);
        assert_eq!(requests[0].value.as_deref(), Some("mode"));
        assert_eq!(requests[1].request, RequestKind::Getc);
        assert_eq!(requests[1].command_class.as_deref(), Some("0"));

        assert_eq!(
            adaptor.scheduler().armed,
            vec![(TimerKind::InitDelay, Duration::from_secs(30))]
        );
        assert!(adaptor.state().last_update.is_some());
    }

    #[test]
    fn test_poll_rearms_itself() {
        let (mut adaptor, mut outbound) = adaptor();
        adaptor.on_zwave_message(ZwaveMessage::Init);
        drain(&mut outbound);

        let first = adaptor.scheduler().expiry(TimerKind::InitDelay);
        adaptor.on_timer_expiry(first);
        let second = adaptor.scheduler().expiry(TimerKind::Poll);
        adaptor.on_timer_expiry(second);

        let messages = drain(&mut outbound);
        let requests = zwave_requests(&messages);
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.request == RequestKind::Check));
        assert_eq!(
            adaptor.scheduler().armed.last(),
            Some(&(TimerKind::Poll, Duration::from_secs(15)))
        );
        assert!(adaptor.scheduler().pending.contains_key(&TimerKind::Poll));
    }

    #[test]
    fn test_poll_mode_each_tick() {
        let (transport, mut outbound) = ChannelTransport::new();
        let config = AdaptorConfig {
            poll_mode_each_tick: true,
            poll_interval_secs: 60,
            ..AdaptorConfig::new("BID7", "12")
        };
        let mut adaptor = BoilerAdaptor::new(config, transport, RecordingScheduler::default());

        adaptor.poll_sensors();

        let messages = drain(&mut outbound);
        let requests = zwave_requests(&messages);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].request, RequestKind::Check);
        assert_eq!(requests[1].request, RequestKind::Post);
        assert_eq!(requests[1].action.as_deref(), Some("Get"));
        assert_eq!(
            adaptor.scheduler().armed,
            vec![(TimerKind::Poll, Duration::from_secs(60))]
        );
    }

    #[test]
    fn test_reinit_replaces_poll_chain() {
        let (mut adaptor, _outbound) = adaptor();
        adaptor.on_zwave_message(ZwaveMessage::Init);
        let init_delay = adaptor.scheduler().expiry(TimerKind::InitDelay);
        adaptor.on_timer_expiry(init_delay);
        let stale_poll = adaptor.scheduler().expiry(TimerKind::Poll);

        adaptor.on_zwave_message(ZwaveMessage::Init);
        assert!(!adaptor.scheduler().pending.contains_key(&TimerKind::Poll));

        let armed_before = adaptor.scheduler().armed.len();
        adaptor.on_timer_expiry(stale_poll);
        assert_eq!(adaptor.scheduler().armed.len(), armed_before);
    }

    #[test]
    fn test_on_stop_cancels_timers() {
        let (mut adaptor, _outbound) = adaptor();
        adaptor.on_configure_message(&json!({}));
        adaptor.on_zwave_message(ZwaveMessage::Init);

        adaptor.on_stop();
        assert!(adaptor.scheduler().pending.is_empty());
        assert_eq!(adaptor.state().lifecycle, LifecycleState::Starting);
    }

    #[test]
    fn test_app_request_replaces_subscriptions() {
        let (mut adaptor, _outbound) = adaptor();

        subscribe(&mut adaptor, "AID1", &["binary_sensor", "connected", "binary_sensor"]);
        subscribe(&mut adaptor, "AID2", &["binary_sensor"]);
        assert!(adaptor.state().is_subscribed("AID1", Characteristic::BinarySensor));
        assert!(adaptor.state().is_subscribed("AID1", Characteristic::Connected));
        assert_eq!(
            adaptor
                .state()
                .subscribers_of(Characteristic::BinarySensor)
                .collect::<Vec<_>>(),
            vec!["AID1", "AID2"]
        );

        subscribe(&mut adaptor, "AID1", &["switch", "thermostat"]);
        let state = adaptor.state();
        assert!(!state.is_subscribed("AID1", Characteristic::BinarySensor));
        assert!(!state.is_subscribed("AID1", Characteristic::Connected));
        assert!(state.is_subscribed("AID1", Characteristic::Switch));
        assert!(state.is_subscribed("AID2", Characteristic::BinarySensor));

        subscribe(&mut adaptor, "AID1", &[]);
        assert!(Characteristic::ALL
            .iter()
            .all(|c| !adaptor.state().is_subscribed("AID1", *c)));
    }

    #[test]
    fn test_check_connected_only_notifies_on_change() {
        let (mut adaptor, mut outbound) = adaptor();
        subscribe(&mut adaptor, "AID1", &["connected"]);

        assert!(!adaptor.check_connected(true));
        assert!(adaptor.check_connected(false));
        assert!(!adaptor.check_connected(false));
        assert!(adaptor.check_connected(true));

        let messages = drain(&mut outbound);
        let updates = app_updates(&messages, "AID1");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].data, CharacteristicValue::Flag(true));
        assert_eq!(updates[1].data, CharacteristicValue::Flag(false));
        assert!(updates[0].time_stamp > 0.0);
    }

    #[test]
    fn test_sensor_and_connectivity_scenario() {
        let (mut adaptor, mut outbound) = adaptor();
        subscribe(&mut adaptor, "AID1", &["binary_sensor", "connected"]);
        adaptor.check_connected(false);
        drain(&mut outbound);

        adaptor.on_zwave_value(&json!({
            "content": "data",
            "commandClass": "64",
            "value": "mode",
            "data": {"value": 1}
        }));
        adaptor.on_zwave_value(&json!({
            "content": "data",
            "commandClass": "0",
            "data": {"name": "isFailed", "value": true}
        }));
        adaptor.on_zwave_value(&json!({
            "content": "data",
            "commandClass": "0",
            "data": {"name": "isFailed", "value": true}
        }));

        let messages = drain(&mut outbound);
        let updates = app_updates(&messages, "AID1");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].characteristic, Characteristic::BinarySensor);
        assert_eq!(updates[0].data, CharacteristicValue::State(SwitchState::On));
        assert_eq!(updates[1].characteristic, Characteristic::Connected);
        assert_eq!(updates[1].data, CharacteristicValue::Flag(false));
        assert_eq!(adaptor.state().switch_state, SwitchState::On);
    }

    #[test]
    fn test_characteristic_only_reaches_subscribers() {
        let (mut adaptor, mut outbound) = adaptor();
        subscribe(&mut adaptor, "AID1", &["binary_sensor"]);
        subscribe(&mut adaptor, "AID2", &["connected"]);
        subscribe(&mut adaptor, "AID3", &["binary_sensor"]);

        adaptor.on_zwave_message(ZwaveMessage::Data(DataReport::Mode(SwitchState::Off)));

        let destinations: Vec<_> = drain(&mut outbound)
            .iter()
            .map(|message| message.destination().to_string())
            .collect();
        assert_eq!(destinations, vec!["AID1", "AID3"]);
    }

    #[test]
    fn test_malformed_zwave_messages_are_dropped() {
        let (mut adaptor, mut outbound) = adaptor();
        subscribe(&mut adaptor, "AID1", &["binary_sensor", "connected"]);
        let before = adaptor.state().clone();

        for message in [
            json!("init"),
            json!({"content": "data", "commandClass": "64", "value": "mode"}),
            json!({"content": "data", "commandClass": "0", "data": {"name": "isFailed"}}),
            json!({"content": "data", "commandClass": "64", "value": "mode", "data": {"value": "1"}}),
            json!({"content": "bogus"}),
        ] {
            adaptor.on_zwave_value(&message);
        }

        assert!(drain(&mut outbound).is_empty());
        assert_eq!(adaptor.state(), &before);
    }

    #[test]
    fn test_unhandled_report_is_ignored() {
        let (mut adaptor, mut outbound) = adaptor();
        subscribe(&mut adaptor, "AID1", &["binary_sensor"]);

        adaptor.on_zwave_value(&json!({
            "content": "data",
            "commandClass": "64",
            "value": "level",
            "data": {"value": 1}
        }));

        assert!(drain(&mut outbound).is_empty());
        assert_eq!(adaptor.state().switch_state, SwitchState::Unknown);
    }

    #[test]
    fn test_command_sends_switch_when_state_differs() {
        let (mut adaptor, mut outbound) = adaptor();
        adaptor.on_zwave_message(ZwaveMessage::Data(DataReport::Mode(SwitchState::Off)));
        drain(&mut outbound);

        adaptor.on_app_command(&command(Some(json!("on"))));

        let messages = drain(&mut outbound);
        let requests = zwave_requests(&messages);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].action.as_deref(), Some("Set"));
        assert_eq!(requests[0].value.as_deref(), Some("1"));
        assert_eq!(adaptor.state().switch_state, SwitchState::Off);
    }

    #[test]
    fn test_command_matching_confirmed_state_is_suppressed() {
        let (mut adaptor, mut outbound) = adaptor();
        adaptor.on_zwave_message(ZwaveMessage::Data(DataReport::Mode(SwitchState::On)));
        drain(&mut outbound);

        adaptor.on_app_command(&command(Some(json!("on"))));
        assert!(drain(&mut outbound).is_empty());

        adaptor.on_app_command(&command(Some(json!("off"))));
        let messages = drain(&mut outbound);
        let requests = zwave_requests(&messages);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].value.as_deref(), Some("0"));
    }

    #[test]
    fn test_unconfirmed_commands_are_resent() {
        let (mut adaptor, mut outbound) = adaptor();

        adaptor.on_app_command(&command(Some(json!("off"))));
        adaptor.on_app_command(&command(Some(json!("off"))));

        let messages = drain(&mut outbound);
        assert_eq!(zwave_requests(&messages).len(), 2);
    }

    #[test]
    fn test_invalid_commands_are_dropped() {
        let (mut adaptor, mut outbound) = adaptor();

        for data in [None, Some(json!("toggle")), Some(json!(1)), Some(json!("ON"))] {
            adaptor.on_app_command(&command(data));
        }

        assert!(drain(&mut outbound).is_empty());
        assert_eq!(adaptor.state().switch_state, SwitchState::Unknown);
    }

    #[test]
    fn test_requested_state_errors() {
        assert_eq!(
            requested_state(&command(Some(json!("off")))).unwrap(),
            SwitchState::Off
        );

        let missing = requested_state(&command(None)).unwrap_err();
        assert!(matches!(missing, AdaptorError::InvalidCommand(_)));
        assert!(missing.is_malformed_input());

        let toggle = requested_state(&command(Some(json!("toggle")))).unwrap_err();
        assert!(format!("{toggle}").contains("toggle"));
    }

    #[test]
    fn test_on_app_message_dispatch() {
        let (mut adaptor, mut outbound) = adaptor();
        let message = AppMessage::from_value(json!({
            "id": "AID9",
            "request": "service",
            "service": [{"characteristic": "switch"}]
        }))
        .unwrap();

        adaptor.on_app_message(&message);
        assert!(adaptor.state().is_subscribed("AID9", Characteristic::Switch));
        assert!(drain(&mut outbound).is_empty());
    }
}
