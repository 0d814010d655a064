#![deny(unsafe_code)]
#![deny(warnings)]
//! Port adapters binding the sample cycle to this board
//!
//! Each adapter implements one `weathermod_core` port over the board's
//! hardware or over [`NetShared`]. The cycle itself never sees embassy,
//! RTIC, or the BME280 driver.

use core::fmt::Write;
use core::sync::atomic::Ordering;

use bme280::i2c::BME280;
use defmt::{warn, Debug2Format};
use embassy_stm32::gpio::Output;
use embassy_stm32::i2c::I2c;
use embassy_stm32::mode::Blocking;
use embassy_time::Delay;
use rtic_monotonics::Monotonic;
use rtic_sync::channel::Sender;
use weathermod_core::message::MAX_PAYLOAD;
use weathermod_core::ports::{Clock, Connectivity, Indicator, Provisioning, Publisher, SensorSource};
use weathermod_core::SENSOR_FAULT;

use crate::net::{NetShared, OutboundMessage, OUTBOUND_DEPTH};
use crate::{device_id, variant, Mono};

/// Wall and monotonic time over the TIM2 monotonic plus the SNTP anchor.
pub struct MonoClock {
    shared: &'static NetShared,
}

impl MonoClock {
    pub fn new(shared: &'static NetShared) -> Self {
        Self { shared }
    }
}

impl Clock for MonoClock {
    fn now(&mut self) -> u64 {
        let anchor = self.shared.boot_epoch_secs.load(Ordering::Relaxed);
        if anchor == 0 {
            // Never synchronized.
            return 0;
        }
        u64::from(anchor) + Mono::now().ticks() / 1_000_000
    }

    fn monotonic_millis(&mut self) -> u64 {
        Mono::now().ticks() / 1_000
    }

    fn request_sync(&mut self) {
        self.shared.sync_requested.store(true, Ordering::Relaxed);
    }
}

/// Connectivity readiness over the network task's shared flags.
pub struct NetLink {
    shared: &'static NetShared,
}

impl NetLink {
    pub fn new(shared: &'static NetShared) -> Self {
        Self { shared }
    }
}

impl Connectivity for NetLink {
    fn link_ready(&mut self) -> bool {
        self.shared.link_up.load(Ordering::Relaxed)
    }

    fn cloud_session_ready(&mut self) -> bool {
        self.shared.ip_up.load(Ordering::Relaxed)
    }

    fn messaging_ready(&mut self) -> bool {
        self.shared.messaging_up.load(Ordering::Relaxed)
    }

    fn reconnect_messaging(&mut self) -> bool {
        // The network task reconnects in the background; this only cuts
        // its backoff short.
        self.shared.reconnect_requested.store(true, Ordering::Relaxed);
        false
    }
}

/// BME280 over blocking I2C.
///
/// Every measurement reads all three channels; the pressure value is
/// cached so `read_pressure` reports the same sample as the paired
/// temperature/humidity read.
pub struct Bme280Sensor {
    driver: BME280<I2c<'static, Blocking>>,
    delay: Delay,
    last_pressure_hpa: Option<f32>,
}

impl Bme280Sensor {
    pub fn new(i2c: I2c<'static, Blocking>) -> Self {
        let mut driver = BME280::new_primary(i2c);
        let mut delay = Delay;
        if let Err(e) = driver.init(&mut delay) {
            defmt::error!("BME280 init failed: {:?}", Debug2Format(&e));
        }
        Self {
            driver,
            delay,
            last_pressure_hpa: None,
        }
    }
}

impl SensorSource for Bme280Sensor {
    fn read_temperature_humidity(&mut self) -> (f32, f32) {
        match self.driver.measure(&mut self.delay) {
            Ok(m) => {
                self.last_pressure_hpa = Some(m.pressure / 100.0);
                (m.temperature, m.humidity)
            }
            Err(e) => {
                warn!("BME280 read failed: {:?}", Debug2Format(&e));
                self.last_pressure_hpa = None;
                (SENSOR_FAULT, SENSOR_FAULT)
            }
        }
    }

    fn read_pressure(&mut self) -> Option<f32> {
        self.last_pressure_hpa
    }
}

/// Fire-and-forget publishing into the bounded session queue.
pub struct QueuedPublisher {
    sender: Sender<'static, OutboundMessage, OUTBOUND_DEPTH>,
}

impl QueuedPublisher {
    pub fn new(sender: Sender<'static, OutboundMessage, OUTBOUND_DEPTH>) -> Self {
        Self { sender }
    }
}

impl Publisher for QueuedPublisher {
    fn publish(&mut self, channel: &str, payload: &str) {
        let mut msg = OutboundMessage {
            channel: heapless::String::new(),
            payload: heapless::String::new(),
        };
        if msg.channel.push_str(channel).is_err() || msg.payload.push_str(payload).is_err() {
            warn!("Outbound message too large, dropped");
            return;
        }
        if self.sender.try_send(msg).is_err() {
            warn!("Outbound queue full, message dropped");
        }
    }
}

/// Activity LED.
pub struct LedIndicator {
    led: Output<'static>,
}

impl LedIndicator {
    pub fn new(led: Output<'static>) -> Self {
        Self { led }
    }
}

impl Indicator for LedIndicator {
    fn set_active(&mut self, on: bool) {
        if on {
            self.led.set_high();
        } else {
            self.led.set_low();
        }
    }
}

/// Build-time node name plus queued registration announcements.
pub struct NodeProvisioning {
    sender: Sender<'static, OutboundMessage, OUTBOUND_DEPTH>,
}

impl NodeProvisioning {
    pub fn new(sender: Sender<'static, OutboundMessage, OUTBOUND_DEPTH>) -> Self {
        Self { sender }
    }
}

impl Provisioning for NodeProvisioning {
    fn device_name(&mut self) -> Option<&str> {
        Some(variant::NODE_NAME)
    }

    fn register(&mut self) -> bool {
        let mut msg = OutboundMessage {
            channel: heapless::String::new(),
            payload: heapless::String::new(),
        };
        let mut payload: heapless::String<MAX_PAYLOAD> = heapless::String::new();
        let rendered = write!(
            payload,
            "{{\"device\":\"{}\",\"name\":\"{}\"}}",
            device_id::client_id(),
            variant::NODE_NAME
        );
        if rendered.is_err() || msg.channel.push_str("register").is_err() {
            return false;
        }
        msg.payload = payload;
        self.sender.try_send(msg).is_ok()
    }
}
