#![deny(unsafe_code)]
#![deny(warnings)]
//! Network session orchestration
//!
//! The embassy-net stack is `!Send` and lives entirely inside the network
//! task. The sample task sees the network only through [`NetShared`] (a set
//! of atomics recording which layers are up, plus the wall-clock anchor)
//! and through the bounded [`OutboundMessage`] queue. This module owns the
//! session lifecycle: wait for DHCP, sync the wall clock once, then keep an
//! MQTT session alive, reconnecting with backoff whenever it drops.

pub mod config;
pub mod error;
pub mod mqtt;
pub mod sntp;

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use defmt::{info, warn};
use embassy_net::Stack;
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;
use rtic_sync::channel::Receiver;
use weathermod_core::message::MAX_PAYLOAD;

use crate::Mono;

pub use config::{MqttConfig, NetworkConfig, SntpConfig};
pub use error::NetworkError;

/// Depth of the outbound publish queue.
pub const OUTBOUND_DEPTH: usize = 4;

/// Delay between reconnect attempts when the session drops.
const RECONNECT_BACKOFF_MS: u64 = 5_000;

/// One queued publish. Built by the sample task, drained by the session.
pub struct OutboundMessage {
    pub channel: heapless::String<32>,
    pub payload: heapless::String<MAX_PAYLOAD>,
}

/// Cross-task network state.
///
/// Written by the network task, read by the sample task's port adapters.
/// `boot_epoch_secs` is Unix seconds at monotonic zero; 0 means the wall
/// clock has never been synchronized.
pub struct NetShared {
    pub link_up: AtomicBool,
    pub ip_up: AtomicBool,
    pub messaging_up: AtomicBool,
    pub reconnect_requested: AtomicBool,
    pub sync_requested: AtomicBool,
    pub boot_epoch_secs: AtomicU32,
}

impl NetShared {
    pub const fn new() -> Self {
        Self {
            link_up: AtomicBool::new(false),
            ip_up: AtomicBool::new(false),
            messaging_up: AtomicBool::new(false),
            reconnect_requested: AtomicBool::new(false),
            sync_requested: AtomicBool::new(false),
            boot_epoch_secs: AtomicU32::new(0),
        }
    }
}

/// Wait for network configuration (DHCP) and log the address
pub async fn wait_for_config(stack: &Stack<'_>) {
    info!("Waiting for DHCP...");
    stack.wait_config_up().await;
    info!("Network is UP!");

    if let Some(config) = stack.config_v4() {
        let ip = config.address.address();
        let octets = ip.octets();
        info!("IP: {}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]);

        if let Some(gateway) = config.gateway {
            let gw = gateway.octets();
            info!("Gateway: {}.{}.{}.{}", gw[0], gw[1], gw[2], gw[3]);
        }
    }
}

/// Drive the network session forever.
///
/// Brings the IP layer up, performs the initial time sync, then loops
/// re-establishing the MQTT session whenever it fails. The session itself
/// drains the publish queue and services deferred resync requests.
pub async fn run_session(
    stack: &Stack<'static>,
    shared: &'static NetShared,
    receiver: &mut Receiver<'static, OutboundMessage, OUTBOUND_DEPTH>,
    mqtt_config: MqttConfig,
    sntp_config: SntpConfig,
) -> ! {
    wait_for_config(stack).await;
    shared.ip_up.store(true, Ordering::Relaxed);

    match sntp::sync(stack, &sntp_config, shared).await {
        Ok(ts) => info!("Initial SNTP sync: {}.{:06} UTC", ts.unix_secs, ts.micros),
        Err(e) => warn!("Initial SNTP sync failed: {:?}", e),
    }

    loop {
        shared.reconnect_requested.store(false, Ordering::Relaxed);
        let err =
            mqtt::messaging_session(stack, shared, receiver, &mqtt_config, &sntp_config).await;
        shared.messaging_up.store(false, Ordering::Relaxed);
        warn!("Messaging session ended: {:?}, reconnecting", err);
        backoff(shared).await;
    }
}

/// Sleep out the reconnect backoff, cut short when the sample task asks
/// for an immediate reconnect.
async fn backoff(shared: &NetShared) {
    let deadline = Mono::now() + RECONNECT_BACKOFF_MS.millis();
    while Mono::now() < deadline {
        if shared.reconnect_requested.swap(false, Ordering::Relaxed) {
            return;
        }
        Mono::delay(100_u64.millis()).await;
    }
}
