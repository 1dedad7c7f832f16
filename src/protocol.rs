use crate::{
    error::{AdaptorError, Result},
    types::{Characteristic, LifecycleState, SwitchState},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Z-Wave instance addressed on the relay
pub const INSTANCE: &str = "0";

/// Value name under which the relay reports its position
pub const MODE_VALUE: &str = "mode";

/// Value name under which the controller reports a dead node
pub const IS_FAILED_VALUE: &str = "isFailed";

/// Z-Wave command classes the adaptor talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Class 64, the relay's on/off mode
    ThermostatMode,
    /// Class 0, node metadata held by the controller (failure status)
    Node,
}

impl CommandClass {
    /// Class id as it appears on the wire
    #[must_use]
    pub const fn as_wire(self) -> &'static str {
        match self {
            Self::ThermostatMode => "64",
            Self::Node => "0",
        }
    }

    /// Look up a class id received from the comms service
    #[must_use]
    pub fn from_wire(class: &str) -> Option<Self> {
        match class {
            "64" => Some(Self::ThermostatMode),
            "0" => Some(Self::Node),
            _ => None,
        }
    }
}

/// A message from the comms service, decoded and validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZwaveMessage {
    /// The comms service has attached to the device
    Init,
    /// A value report from the device or controller
    Data(DataReport),
}

/// Value report carried by a `data` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataReport {
    /// Class 64 `mode` report
    Mode(SwitchState),
    /// Class 0 `isFailed` report
    IsFailed(bool),
    /// A well-formed report the adaptor has no use for
    Unhandled {
        /// Command class of the report
        command_class: String,
        /// Value name, when one was given
        name: Option<String>,
    },
}

impl ZwaveMessage {
    /// Decode a comms message from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::Json`] if the text is not JSON, or
    /// [`AdaptorError::MalformedMessage`] if the shape is not recognised.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Decode a comms message from a JSON value
    ///
    /// The `data` report for class 64 names its value either at the top level
    /// (`"value": "mode"`) or inside the payload (`"data": {"name": "mode"}`).
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::MalformedMessage`] for a non-object message, a missing
    /// or unknown `content`, a missing `commandClass`, or a mode/failure payload of the
    /// wrong type.
    pub fn from_value(value: &Value) -> Result<Self> {
        let message = value
            .as_object()
            .ok_or_else(|| AdaptorError::malformed("message is not an object"))?;

        match str_field(message, "content")? {
            "init" => Ok(Self::Init),
            "data" => decode_data(message).map(Self::Data),
            other => Err(AdaptorError::malformed(format!("unknown content '{other}'"))),
        }
    }
}

fn str_field<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    object
        .get(key)
        .ok_or_else(|| AdaptorError::malformed(format!("missing '{key}'")))?
        .as_str()
        .ok_or_else(|| AdaptorError::malformed(format!("'{key}' is not a string")))
}

fn decode_data(message: &Map<String, Value>) -> Result<DataReport> {
    let class = str_field(message, "commandClass")?;
    let payload = message.get("data").and_then(Value::as_object);

    match CommandClass::from_wire(class) {
        Some(CommandClass::ThermostatMode) => {
            let name = message
                .get("value")
                .and_then(Value::as_str)
                .or_else(|| payload.and_then(|data| data.get("name")).and_then(Value::as_str))
                .ok_or_else(|| AdaptorError::malformed("class 64 report without a value name"))?;

            if name != MODE_VALUE {
                return Ok(unhandled(class, Some(name)));
            }

            let state = payload
                .and_then(|data| data.get("value"))
                .and_then(decode_mode)
                .ok_or_else(|| AdaptorError::malformed("mode report without a numeric value"))?;

            Ok(DataReport::Mode(state))
        }
        Some(CommandClass::Node) => {
            let data = payload.ok_or_else(|| AdaptorError::malformed("class 0 report without data"))?;
            let name = str_field(data, "name")?;

            if name != IS_FAILED_VALUE {
                return Ok(unhandled(class, Some(name)));
            }

            let is_failed = data
                .get("value")
                .and_then(Value::as_bool)
                .ok_or_else(|| AdaptorError::malformed("isFailed report without a boolean value"))?;

            Ok(DataReport::IsFailed(is_failed))
        }
        None => Ok(unhandled(class, None)),
    }
}

/// Mode values compare equal to 1 for on; `true` and `1.0` count as 1
fn decode_mode(value: &Value) -> Option<SwitchState> {
    match value {
        Value::Bool(on) => Some(SwitchState::from_mode(i64::from(*on))),
        Value::Number(number) => number.as_i64().map(SwitchState::from_mode).or_else(|| {
            number.as_f64().map(|mode| {
                if (mode - 1.0).abs() < f64::EPSILON {
                    SwitchState::On
                } else {
                    SwitchState::Off
                }
            })
        }),
        _ => None,
    }
}

fn unhandled(class: &str, name: Option<&str>) -> DataReport {
    DataReport::Unhandled {
        command_class: class.to_string(),
        name: name.map(str::to_string),
    }
}

/// Kind of request sent to the comms service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Reachability probe
    Check,
    /// Read a named value
    Get,
    /// Read a command class's metadata
    Getc,
    /// Invoke a command-class action on the device
    Post,
}

/// A request sent to the comms service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZwaveRequest {
    /// Adaptor id
    pub id: String,
    /// Request kind
    pub request: RequestKind,
    /// Device address
    pub address: String,
    /// Z-Wave instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Command class id
    #[serde(
        rename = "commandClass",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub command_class: Option<String>,
    /// Command-class action for `post`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Value name for `get`, or the argument of a `post`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ZwaveRequest {
    fn new(id: &str, address: &str, request: RequestKind) -> Self {
        Self {
            id: id.to_string(),
            request,
            address: address.to_string(),
            instance: None,
            command_class: None,
            action: None,
            value: None,
        }
    }

    fn on_class(mut self, class: CommandClass) -> Self {
        self.instance = Some(INSTANCE.to_string());
        self.command_class = Some(class.as_wire().to_string());
        self
    }

    /// Create a reachability probe
    #[must_use]
    pub fn check(id: &str, address: &str) -> Self {
        Self::new(id, address, RequestKind::Check)
    }

    /// Create a read of the relay's `mode` value
    #[must_use]
    pub fn get_mode(id: &str, address: &str) -> Self {
        let mut request =
            Self::new(id, address, RequestKind::Get).on_class(CommandClass::ThermostatMode);
        request.value = Some(MODE_VALUE.to_string());
        request
    }

    /// Create a read of the node metadata, which carries the failure flag
    #[must_use]
    pub fn get_node_status(id: &str, address: &str) -> Self {
        Self::new(id, address, RequestKind::Getc).on_class(CommandClass::Node)
    }

    /// Create a `Get` action asking the relay to report its mode
    #[must_use]
    pub fn refresh_mode(id: &str, address: &str) -> Self {
        let mut request =
            Self::new(id, address, RequestKind::Post).on_class(CommandClass::ThermostatMode);
        request.action = Some("Get".to_string());
        request.value = Some(String::new());
        request
    }

    /// Create a `Set` action switching the relay
    #[must_use]
    pub fn set_switch(id: &str, address: &str, state: SwitchState) -> Self {
        let mut request =
            Self::new(id, address, RequestKind::Post).on_class(CommandClass::ThermostatMode);
        request.action = Some("Set".to_string());
        request.value = Some(state.to_mode().to_string());
        request
    }
}

/// Lifecycle report sent to the manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateReport {
    /// Adaptor id
    pub id: String,
    /// Always `state`
    pub status: &'static str,
    /// Current lifecycle state
    pub state: LifecycleState,
}

impl StateReport {
    /// Create a report of `state`
    #[must_use]
    pub fn new(id: &str, state: LifecycleState) -> Self {
        Self {
            id: id.to_string(),
            status: "state",
            state,
        }
    }
}

/// A message from an app, tagged by its `request` field
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "request", rename_all = "lowercase")]
pub enum AppMessage {
    /// Initialisation handshake
    Init(AppInit),
    /// Subscription (re)configuration
    Service(ServiceRequest),
    /// Relay command
    Command(AppCommand),
}

impl AppMessage {
    /// Decode an app message from a JSON value
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::Json`] if the value has no known `request` tag or is
    /// missing required fields.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Id of the app that sent the message
    #[must_use]
    pub fn app_id(&self) -> &str {
        match self {
            Self::Init(init) => &init.id,
            Self::Service(request) => &request.id,
            Self::Command(command) => &command.id,
        }
    }
}

/// App initialisation handshake
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppInit {
    /// App id
    pub id: String,
}

/// App subscription request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceRequest {
    /// App id
    pub id: String,
    /// Characteristics the app wants, replacing any earlier request
    #[serde(default)]
    pub service: Vec<RequestedService>,
}

/// One entry of an app's subscription request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RequestedService {
    /// Characteristic name as sent by the app
    pub characteristic: String,
    /// Requested push interval; accepted but not used
    #[serde(default)]
    pub interval: Option<f64>,
}

/// App relay command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppCommand {
    /// App id
    pub id: String,
    /// Requested relay position; validated by the adaptor, not the decoder
    #[serde(default)]
    pub data: Option<Value>,
}

/// Service offered to apps on init
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDescriptor {
    /// Characteristic offered
    pub characteristic: Characteristic,
    /// Push interval in seconds; 0 means event driven
    pub interval: u64,
    /// Characteristic type hint
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

/// Reply to an app's init handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceAdvert {
    /// Adaptor name
    pub name: String,
    /// Adaptor id
    pub id: String,
    /// Always `ok`
    pub status: &'static str,
    /// Offered services
    pub service: Vec<ServiceDescriptor>,
    /// Always `service`
    pub content: &'static str,
}

impl ServiceAdvert {
    /// Build the advert for this adaptor's three characteristics
    #[must_use]
    pub fn new(name: &str, id: &str, poll_interval_secs: u64) -> Self {
        Self {
            name: name.to_string(),
            id: id.to_string(),
            status: "ok",
            service: vec![
                ServiceDescriptor {
                    characteristic: Characteristic::Connected,
                    interval: poll_interval_secs,
                    kind: Some("switch"),
                },
                ServiceDescriptor {
                    characteristic: Characteristic::BinarySensor,
                    interval: poll_interval_secs,
                    kind: Some("switch"),
                },
                ServiceDescriptor {
                    characteristic: Characteristic::Switch,
                    interval: 0,
                    kind: None,
                },
            ],
            content: "service",
        }
    }
}

/// Payload of a characteristic push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    /// Relay position (`on`/`off`)
    State(SwitchState),
    /// Boolean flag, used for `connected`
    Flag(bool),
}

/// Characteristic push to a subscribed app
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CharacteristicUpdate {
    /// Adaptor id
    pub id: String,
    /// Always `characteristic`
    pub content: &'static str,
    /// Characteristic being pushed
    pub characteristic: Characteristic,
    /// New value
    pub data: CharacteristicValue,
    /// Seconds since the Unix epoch
    #[serde(rename = "timeStamp")]
    pub time_stamp: f64,
}

impl CharacteristicUpdate {
    /// Create a push of `data` on `characteristic`
    #[must_use]
    pub fn new(
        id: &str,
        characteristic: Characteristic,
        data: CharacteristicValue,
        time_stamp: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            content: "characteristic",
            characteristic,
            data,
            time_stamp,
        }
    }
}

/// Message addressed to a single app
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AppReply {
    /// Init reply
    Service(ServiceAdvert),
    /// Characteristic push
    Characteristic(CharacteristicUpdate),
}

/// Current time as fractional seconds since the Unix epoch
#[must_use]
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |elapsed| elapsed.as_secs_f64())
}
