use serde_json::json;
use std::time::Duration;
use tokio::{sync::mpsc, time::sleep};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zwave_boiler::{
    AdaptorConfig, AdaptorError, AdaptorHost, ChannelTransport, HostEvent, Result,
};

const CONFIG: &str = r#"{
    "id": "BID7",
    "address": "12",
    "poll_interval_secs": 2,
    "init_poll_delay_secs": 1,
    "log_level": "info"
}"#;

fn send(events: &mpsc::UnboundedSender<HostEvent>, event: HostEvent) -> Result<()> {
    events.send(event).map_err(|_| AdaptorError::ChannelClosed {
        destination: "adaptor".to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AdaptorConfig::from_json(CONFIG)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🔥 Simulated boiler adaptor");

    let (transport, mut outbound) = ChannelTransport::new();
    let (events, inbound) = mpsc::unbounded_channel();
    let host = AdaptorHost::new(config, transport, inbound)?;
    let adaptor = tokio::spawn(host.run());

    let printer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message.to_json() {
                Ok(body) => info!("📤 {} <- {}", message.destination(), body),
                Err(e) => info!("❌ Unencodable message for {}: {}", message.destination(), e),
            }
        }
    });

    info!("⚙️  Manager configures the adaptor");
    send(&events, HostEvent::Configure(json!({"apps": ["AID1"]})))?;

    info!("📱 App initialises and subscribes");
    send(&events, HostEvent::App(json!({"id": "AID1", "request": "init"})))?;
    send(
        &events,
        HostEvent::App(json!({
            "id": "AID1",
            "request": "service",
            "service": [
                {"characteristic": "binary_sensor", "interval": 0},
                {"characteristic": "connected", "interval": 0}
            ]
        })),
    )?;

    info!("📡 Comms service attaches the relay");
    send(&events, HostEvent::Zwave(json!({"content": "init"})))?;
    send(
        &events,
        HostEvent::Zwave(json!({
            "content": "data",
            "commandClass": "0",
            "data": {"name": "isFailed", "value": false}
        })),
    )?;
    send(
        &events,
        HostEvent::Zwave(json!({
            "content": "data",
            "commandClass": "64",
            "value": "mode",
            "data": {"value": 0}
        })),
    )?;

    info!("🔌 App switches the boiler on");
    send(
        &events,
        HostEvent::App(json!({"id": "AID1", "request": "command", "data": "on"})),
    )?;
    sleep(Duration::from_millis(200)).await;
    send(
        &events,
        HostEvent::Zwave(json!({
            "content": "data",
            "commandClass": "64",
            "value": "mode",
            "data": {"value": 1}
        })),
    )?;

    info!("⏱️  Letting the poll timer run");
    sleep(Duration::from_secs(4)).await;

    send(&events, HostEvent::Stop)?;
    let adaptor = match adaptor.await {
        Ok(adaptor) => adaptor,
        Err(e) => {
            error!("❌ Adaptor task failed: {}", e);
            return Ok(());
        }
    };

    let state = adaptor.state();
    info!("📊 Final state:");
    info!("  Lifecycle: {}", state.lifecycle);
    info!("  Relay: {}", state.switch_state);
    info!("  Connected: {}", state.connected);

    drop(adaptor);
    if let Err(e) = printer.await {
        error!("❌ Printer task failed: {}", e);
    }
    Ok(())
}
