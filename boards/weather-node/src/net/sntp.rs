#![deny(unsafe_code)]
#![deny(warnings)]
//! SNTP wall-clock synchronization
//!
//! There is no battery-backed RTC on this board, so the wall clock is kept
//! as an anchor: Unix seconds at monotonic zero, stored in [`NetShared`].
//! Reading the clock is then anchor + monotonic seconds. One successful
//! sync per day keeps drift well under a second of publish-timestamp
//! error.

use core::sync::atomic::Ordering;

use defmt::{error, info, warn, Debug2Format};
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpEndpoint, Stack};
use embassy_time::{Duration, Instant, Timer};
use rtic_monotonics::fugit::ExtU64;
use rtic_monotonics::Monotonic;

use crate::Mono;

use super::config::SntpConfig;
use super::error::NetworkError;
use super::NetShared;

/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
const NTP_UNIX_OFFSET_SECS: u64 = 2_208_988_800;

/// A synchronized wall-clock instant.
#[derive(Clone, Copy)]
pub struct Timestamp {
    pub unix_secs: u64,
    pub micros: u32,
}

impl Timestamp {
    fn from_ntp(ntp_secs: u64, ntp_frac: u32) -> Self {
        Self {
            unix_secs: ntp_secs.saturating_sub(NTP_UNIX_OFFSET_SECS),
            micros: ((u64::from(ntp_frac) * 1_000_000) >> 32) as u32,
        }
    }
}

/// Synchronize the wall clock, trying each configured server in order.
///
/// On success the anchor in `shared` is rewritten, so the sample task's
/// clock adapter picks the corrected time up on its next read.
pub async fn sync(
    stack: &Stack<'static>,
    config: &SntpConfig,
    shared: &NetShared,
) -> Result<Timestamp, NetworkError> {
    info!("Starting SNTP synchronization");
    for server in config.servers {
        for attempt in 0..config.retry_count {
            info!("Attempting SNTP sync with {} (attempt {})", server, attempt + 1);
            match sntp_request(stack, config, server).await {
                Ok(timestamp) => {
                    anchor_wallclock(shared, timestamp);
                    return Ok(timestamp);
                }
                Err(e) => {
                    warn!("SNTP sync failed: {:?}, retrying...", e);
                    Mono::delay(2000_u64.millis()).await;
                }
            }
        }
    }
    error!("All SNTP sync attempts failed");
    Err(NetworkError::AllServersFailed)
}

fn anchor_wallclock(shared: &NetShared, timestamp: Timestamp) {
    let mono_secs = Mono::now().ticks() / 1_000_000;
    let anchor = timestamp.unix_secs.saturating_sub(mono_secs) as u32;
    shared.boot_epoch_secs.store(anchor, Ordering::Relaxed);
    info!(
        "Wall clock anchored: {}.{:06} UTC at mono {} s",
        timestamp.unix_secs, timestamp.micros, mono_secs
    );
}

async fn sntp_request(
    stack: &Stack<'static>,
    config: &SntpConfig,
    server: &str,
) -> Result<Timestamp, NetworkError> {
    let server_ip = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|_| NetworkError::DnsError)?
        .first()
        .copied()
        .ok_or(NetworkError::DnsError)?;

    let server_endpoint = IpEndpoint::new(server_ip, 123);
    info!("Resolved {} to {}", server, Debug2Format(&server_endpoint));

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 64];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 64];
    let mut socket = UdpSocket::new(
        *stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| NetworkError::SocketError)?;

    // NTP request: LI=0, VN=3, Mode=3 (Client)
    let mut ntp_packet = [0u8; 48];
    ntp_packet[0] = 0x1B;
    let transmit_time = Instant::now();
    socket
        .send_to(&ntp_packet, server_endpoint)
        .await
        .map_err(|_| NetworkError::SocketError)?;

    let mut response = [0u8; 48];
    let timeout_future = Timer::after(Duration::from_millis(config.timeout_ms));
    let recv_future = socket.recv_from(&mut response);
    let (recv_len, from_addr) =
        match embassy_futures::select::select(timeout_future, recv_future).await {
            embassy_futures::select::Either::First(_) => return Err(NetworkError::Timeout),
            embassy_futures::select::Either::Second(result) => {
                result.map_err(|_| NetworkError::SocketError)?
            }
        };
    let receive_time = Instant::now();

    if recv_len < 48 || from_addr.endpoint.addr != server_ip {
        return Err(NetworkError::InvalidResponse);
    }

    let stratum = response[1];
    if stratum == 0 || stratum > config.max_stratum {
        warn!("Invalid stratum {} (max {})", stratum, config.max_stratum);
        return Err(NetworkError::ServerError);
    }

    let tx_timestamp_secs =
        u32::from_be_bytes([response[40], response[41], response[42], response[43]]) as u64;
    let tx_timestamp_frac =
        u32::from_be_bytes([response[44], response[45], response[46], response[47]]);

    // Half the round trip approximates the one-way network delay.
    let rtt = receive_time.duration_since(transmit_time);
    let rtt_correction_micros = rtt.as_micros() / 2;

    let mut timestamp = Timestamp::from_ntp(tx_timestamp_secs, tx_timestamp_frac);
    timestamp.micros = timestamp.micros.saturating_add(rtt_correction_micros as u32);
    if timestamp.micros >= 1_000_000 {
        timestamp.unix_secs = timestamp.unix_secs.saturating_add(1);
        timestamp.micros -= 1_000_000;
    }

    info!(
        "NTP timestamp: {}.{:06} UTC (RTT correction: {} us)",
        timestamp.unix_secs, timestamp.micros, rtt_correction_micros
    );
    Ok(timestamp)
}
