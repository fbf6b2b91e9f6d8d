//! # Simulated device
//!
//! Brings a fake device through its whole connectivity lifecycle:
//! - the link refuses its first association and is retried after the interval;
//! - the transport connects as soon as an address is acquired;
//! - the link drops once while READY, and the orchestrator degrades to LINK_CONNECTING
//!   until the reconnector brings it back.
//!
//! Every bus event is printed by [`LogWriter`](nodevisor::LogWriter).
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example device --features logging
//! ```

use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nodevisor::{
    AppState, BusConfig, Clock, Collaborator, Connectivity, ControlError, EventBus, EventId,
    LogWriter, MonotonicClock, Orchestrator, OrchestratorConfig, ReconnectConfig, ReconnectEvents,
    Reconnector, SourceId,
};

/// Radio driver stand-in: refuses the first association.
#[derive(Default)]
struct SimLink {
    enabled: AtomicBool,
    attempts: AtomicU32,
    associated: AtomicBool,
}

impl Collaborator for SimLink {
    fn name(&self) -> &'static str {
        "sim-link"
    }

    fn start(&self) -> Result<(), ControlError> {
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), ControlError> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Connectivity for SimLink {
    fn connect(&self) -> Result<(), ControlError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(ControlError::Failed {
                collaborator: "sim-link",
                reason: "association rejected".into(),
            });
        }
        self.associated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        self.associated.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Messaging client stand-in: connects instantly.
struct SimTransport {
    bus: EventBus,
}

impl Collaborator for SimTransport {
    fn name(&self) -> &'static str {
        "sim-transport"
    }

    fn start(&self) -> Result<(), ControlError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), ControlError> {
        Ok(())
    }
}

impl Connectivity for SimTransport {
    fn connect(&self) -> Result<(), ControlError> {
        self.bus
            .post(EventId::TRANSPORT_CONNECTED, SourceId::TRANSPORT)
            .map_err(|e| ControlError::Unavailable {
                collaborator: "sim-transport",
                reason: e.to_string(),
            })?;
        self.bus
            .post_data(EventId::TRANSPORT_DATA, SourceId::TRANSPORT, b"hello")
            .map_err(|e| ControlError::Failed {
                collaborator: "sim-transport",
                reason: e.to_string(),
            })
    }

    fn disconnect(&self) -> Result<(), ControlError> {
        Ok(())
    }
}

/// Link driver loop: steps the reconnector, reports association, drops the link once.
async fn drive_link(
    link: Arc<SimLink>,
    reconnector: Arc<Reconnector<SimLink>>,
    bus: EventBus,
    token: CancellationToken,
) {
    let clock = MonotonicClock::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let mut ready_ticks = 0u32;
    let mut dropped_once = false;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if !link.enabled.load(Ordering::SeqCst) {
                    continue;
                }
                reconnector.step(clock.now());

                if link.associated.swap(false, Ordering::SeqCst) {
                    reconnector.on_connected();
                    let _ = bus.post(EventId::LINK_ADDRESS_ACQUIRED, SourceId::LINK);
                }

                if reconnector.is_connected() && !dropped_once {
                    ready_ticks += 1;
                    if ready_ticks == 10 {
                        dropped_once = true;
                        println!("  (simulating link loss)");
                        reconnector.on_disconnected(clock.now());
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bus = EventBus::new(BusConfig::default());
    bus.init()?;
    bus.subscribe(EventId::ANY, Arc::new(LogWriter::new()))?;

    let link = Arc::new(SimLink::default());
    let transport = Arc::new(SimTransport { bus: bus.clone() });
    let reconnector = Arc::new(Reconnector::new(
        Arc::clone(&link),
        bus.clone(),
        SourceId::LINK,
        ReconnectEvents::LINK,
        ReconnectConfig {
            interval_ms: 1000,
            ..ReconnectConfig::default()
        },
    ));

    let orch = Arc::new(
        Orchestrator::builder(OrchestratorConfig {
            name: "device",
            ..OrchestratorConfig::default()
        })
        .with_link(link.clone())
        .with_transport(transport)
        .build(bus.clone())?,
    );
    orch.init()?;
    orch.start()?;

    let token = CancellationToken::new();
    let driver = tokio::spawn(drive_link(
        link,
        reconnector,
        bus.clone(),
        token.clone(),
    ));
    let host = {
        let orch = Arc::clone(&orch);
        let token = token.clone();
        tokio::spawn(async move { orch.run(token).await })
    };

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(6)) => token.cancel(),
        _ = token.cancelled() => {}
    }
    host.await??;
    driver.await?;

    println!();
    println!("Final:");
    println!(" ├─► State:   {}", orch.state_name());
    println!(" └─► Bus:     {:?}", bus.stats());
    if orch.state() != AppState::Ready {
        println!("   (stopped before the link recovered)");
    }

    bus.deinit().await?;
    Ok(())
}
