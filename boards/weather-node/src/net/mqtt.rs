#![deny(unsafe_code)]
#![deny(warnings)]
//! MQTT v5.0 messaging session
//!
//! One session = one TCP connection + one MQTT connection, held open for
//! as long as both survive. The session drains the outbound publish queue
//! and, on a one second housekeeping tick, services deferred SNTP resync
//! requests. Any transport or protocol error ends the session; the caller
//! owns reconnection.
//!
//! Uses the bump allocator pattern from `rust-mqtt` for no_std
//! compatibility: a 2KB packet buffer is enough for our largest payload
//! plus protocol overhead.

use core::convert::Infallible;
use core::sync::atomic::Ordering;

use defmt::{error, info, warn, Debug2Format};
use embassy_futures::select::{select, Either};
use embassy_net::tcp::TcpSocket;
use embassy_net::{dns::DnsQueryType, IpEndpoint, Stack};
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;
use rtic_sync::channel::Receiver;
use rust_mqtt::{
    buffer::BumpBuffer,
    client::{options::ConnectOptions, Client},
    config::{KeepAlive, SessionExpiryInterval},
    types::{MqttString, QoS},
};

use crate::device_id;
use crate::Mono;

use super::config::{MqttConfig, SntpConfig};
use super::error::NetworkError;
use super::{sntp, NetShared, OutboundMessage, OUTBOUND_DEPTH};

/// MQTT packet buffer size
const MQTT_BUFFER_SIZE: usize = 2048;

/// TCP socket buffer size, each direction
const TCP_BUFFER_SIZE: usize = 2048;

/// Run one messaging session to completion. Only ever returns the error
/// that ended it.
pub async fn messaging_session(
    stack: &Stack<'static>,
    shared: &'static NetShared,
    receiver: &mut Receiver<'static, OutboundMessage, OUTBOUND_DEPTH>,
    config: &MqttConfig,
    sntp_config: &SntpConfig,
) -> NetworkError {
    match session(stack, shared, receiver, config, sntp_config).await {
        Ok(never) => match never {},
        Err(e) => e,
    }
}

async fn session(
    stack: &Stack<'static>,
    shared: &'static NetShared,
    receiver: &mut Receiver<'static, OutboundMessage, OUTBOUND_DEPTH>,
    config: &MqttConfig,
    sntp_config: &SntpConfig,
) -> Result<Infallible, NetworkError> {
    info!(
        "Connecting to MQTT broker at {}:{}",
        config.broker_host, config.broker_port
    );

    let server_ip = stack
        .dns_query(config.broker_host, DnsQueryType::A)
        .await
        .map_err(|e| {
            error!("DNS query failed: {:?}", Debug2Format(&e));
            NetworkError::DnsError
        })?
        .first()
        .copied()
        .ok_or_else(|| {
            error!("DNS returned no results for {}", config.broker_host);
            NetworkError::DnsError
        })?;

    let endpoint = IpEndpoint::new(server_ip, config.broker_port);
    info!("Resolved {} to {}", config.broker_host, Debug2Format(&endpoint));

    let mut rx_buffer = [0u8; TCP_BUFFER_SIZE];
    let mut tx_buffer = [0u8; TCP_BUFFER_SIZE];
    let mut socket = TcpSocket::new(*stack, &mut rx_buffer, &mut tx_buffer);
    socket.connect(endpoint).await.map_err(|e| {
        error!("TCP connect failed: {:?}", Debug2Format(&e));
        NetworkError::SocketError
    })?;
    info!("TCP connection established to {}", Debug2Format(&endpoint));

    let client_id = device_id::client_id();
    info!("MQTT client ID: {}", client_id.as_str());

    let mut mqtt_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut buffer = BumpBuffer::new(&mut mqtt_buffer);
    let mut client = Client::<'_, _, _, 1, 1, 1, 0>::new(&mut buffer);

    let connect_opts = ConnectOptions {
        session_expiry_interval: SessionExpiryInterval::EndOnDisconnect,
        clean_start: config.clean_start,
        keep_alive: if config.keep_alive_secs == 0 {
            KeepAlive::Infinite
        } else {
            KeepAlive::Seconds(config.keep_alive_secs)
        },
        will: None,
        user_name: None,
        password: None,
    };

    let mqtt_client_id = MqttString::new(client_id.as_str().into()).map_err(|e| {
        error!("Failed to create MQTT client ID string: {:?}", Debug2Format(&e));
        NetworkError::MqttProtocolError
    })?;

    client
        .connect(socket, &connect_opts, Some(mqtt_client_id))
        .await
        .map_err(|e| {
            error!("MQTT connect failed: {:?}", Debug2Format(&e));
            NetworkError::MqttConnectionFailed
        })?;

    info!("MQTT connection established");
    shared.messaging_up.store(true, Ordering::Relaxed);

    loop {
        match select(receiver.recv(), Mono::delay(1_000_u64.millis())).await {
            Either::First(Ok(msg)) => {
                client
                    .publish(msg.channel.as_str(), msg.payload.as_bytes(), QoS::AtLeastOnce, false)
                    .await
                    .map_err(|e| {
                        error!("MQTT publish failed: {:?}", Debug2Format(&e));
                        NetworkError::MqttPublishFailed
                    })?;
                info!("Published {} bytes to {}", msg.payload.len(), msg.channel.as_str());
            }
            Either::First(Err(_)) => return Err(NetworkError::ChannelClosed),
            Either::Second(_) => {
                // Housekeeping tick: service deferred wall-clock resync.
                if shared.sync_requested.swap(false, Ordering::Relaxed) {
                    match sntp::sync(stack, sntp_config, shared).await {
                        Ok(ts) => info!("SNTP resync: {}.{:06} UTC", ts.unix_secs, ts.micros),
                        Err(e) => warn!("SNTP resync failed: {:?}", e),
                    }
                }
            }
        }
    }
}
