//! The sampling control loop.
//!
//! [`SampleCycle`] is a tick-driven state machine: every call to
//! [`SampleCycle::tick`] performs one bounded step against the platform
//! ports and returns how long the caller should sleep before the next
//! tick. The driver owns the actual delay (an RTIC monotonic on the
//! reference board, a fake clock in host tests), so the whole loop runs
//! deterministically without any real time passing.
//!
//! One pass through the machine is: wait for the device name, gate on
//! connectivity, acquire a sample with bounded retries, publish or skip,
//! then pace out the remainder of the publish interval.

use crate::limiter::RateLimiter;
use crate::message::{self, PayloadFormat};
use crate::ports::{
    Clock, Connectivity, ConnectivityState, Indicator, Provisioning, Publisher, SensorSource,
};
use crate::reading::{is_fault, Reading};

/// Longest device name the cycle will carry into payloads.
pub const MAX_NAME: usize = 32;

/// Tuning knobs for one node variant. All intervals in milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct CycleConfig {
    /// Target spacing between publishes, measured from indicator-on.
    pub publish_interval_ms: u32,
    /// Sensor settle time between a failed read and its retry.
    pub settle_delay_ms: u32,
    /// How long the indicator stays lit after acquisition resolves.
    pub indicator_dwell_ms: u32,
    /// Retries after the first failed read. Attempts = retries + 1.
    pub max_retries: u8,
    /// On and off half-period of the not-ready blink.
    pub blink_phase_ms: u32,
    /// Re-poll spacing while waiting for the device name.
    pub name_poll_ms: u32,
    /// Channel the payload is published on.
    pub channel: &'static str,
    /// Wire format of the payload.
    pub format: PayloadFormat,
    /// Whether to sample the pressure channel alongside each reading.
    pub sample_pressure: bool,
    /// Spacing between wall-clock resync requests.
    pub time_sync_interval_ms: u64,
    /// Spacing between registration announcements after the first.
    pub registration_interval_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: 60_000,
            settle_delay_ms: 2_001,
            indicator_dwell_ms: 100,
            max_retries: 3,
            blink_phase_ms: 1_000,
            name_poll_ms: 500,
            channel: "weatherdata",
            format: PayloadFormat::Plain,
            sample_pressure: false,
            time_sync_interval_ms: 24 * 60 * 60 * 1_000,
            registration_interval_ms: 10 * 60 * 1_000,
        }
    }
}

/// The platform ports, borrowed for the duration of one tick.
pub struct CycleIo<'a, C, N, S, P, I, V> {
    pub clock: &'a mut C,
    pub net: &'a mut N,
    pub sensor: &'a mut S,
    pub publisher: &'a mut P,
    pub indicator: &'a mut I,
    pub provisioning: &'a mut V,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitName,
    ReadyCheck,
    NotReadyBlink,
    Acquire,
    Dwell,
}

/// Per-cycle retry accounting. Resets when acquisition starts.
#[derive(Clone, Copy, Debug, Default)]
struct RetryBudget {
    attempts: u8,
    spent_ms: u32,
}

impl RetryBudget {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Edge detector over connectivity snapshots.
///
/// The first snapshot observed becomes the baseline and is never
/// reported; afterwards every change is reported exactly once.
pub struct ReadinessWatch {
    last: Option<ConnectivityState>,
}

impl ReadinessWatch {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Feed one snapshot; returns it back when it differs from the
    /// previous one.
    pub fn observe(&mut self, snapshot: ConnectivityState) -> Option<ConnectivityState> {
        let changed = match self.last {
            None => None,
            Some(prev) if prev != snapshot => Some(snapshot),
            Some(_) => None,
        };
        self.last = Some(snapshot);
        changed
    }
}

impl Default for ReadinessWatch {
    fn default() -> Self {
        Self::new()
    }
}

/// The sampling loop. One instance per node, driven forever.
pub struct SampleCycle {
    config: CycleConfig,
    phase: Phase,
    budget: RetryBudget,
    watch: ReadinessWatch,
    sync_gate: RateLimiter,
    registration_gate: RateLimiter,
    name: heapless::String<MAX_NAME>,
}

impl SampleCycle {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            phase: Phase::AwaitName,
            budget: RetryBudget::default(),
            watch: ReadinessWatch::new(),
            // Resync is deferred a full day because the session bring-up
            // already syncs once; registration announces right away.
            sync_gate: RateLimiter::deferred(config.time_sync_interval_ms),
            registration_gate: RateLimiter::immediate(config.registration_interval_ms),
            name: heapless::String::new(),
            config,
        }
    }

    /// Run one step of the machine. Returns how many milliseconds the
    /// caller must sleep before ticking again; zero means tick again
    /// immediately.
    pub fn tick<C, N, S, P, I, V>(&mut self, io: &mut CycleIo<'_, C, N, S, P, I, V>) -> u32
    where
        C: Clock,
        N: Connectivity,
        S: SensorSource,
        P: Publisher,
        I: Indicator,
        V: Provisioning,
    {
        match self.phase {
            Phase::AwaitName => self.await_name(io),
            Phase::ReadyCheck => self.ready_check(io),
            Phase::NotReadyBlink => {
                io.indicator.set_active(false);
                self.phase = Phase::ReadyCheck;
                self.config.blink_phase_ms
            }
            Phase::Acquire => self.acquire(io),
            Phase::Dwell => self.pace(io),
        }
    }

    fn await_name<C, N, S, P, I, V>(&mut self, io: &mut CycleIo<'_, C, N, S, P, I, V>) -> u32
    where
        V: Provisioning,
    {
        match io.provisioning.device_name() {
            Some(name) => {
                if self.name.push_str(name).is_err() {
                    log_name_overflow(name.len());
                }
                log_named(self.name.as_str());
                self.phase = Phase::ReadyCheck;
                0
            }
            None => self.config.name_poll_ms,
        }
    }

    fn ready_check<C, N, S, P, I, V>(&mut self, io: &mut CycleIo<'_, C, N, S, P, I, V>) -> u32
    where
        C: Clock,
        N: Connectivity,
        I: Indicator,
        V: Provisioning,
    {
        let mut snapshot = ConnectivityState {
            link_ready: io.net.link_ready(),
            cloud_session_ready: io.net.cloud_session_ready(),
            messaging_ready: io.net.messaging_ready(),
        };

        // Only the messaging layer is recoverable from here; the lower
        // layers reconnect on their own.
        if snapshot.link_ready && snapshot.cloud_session_ready && !snapshot.messaging_ready {
            snapshot.messaging_ready = io.net.reconnect_messaging();
        }

        if let Some(changed) = self.watch.observe(snapshot) {
            log_transition(changed);
        }

        let now = io.clock.monotonic_millis();
        if snapshot.cloud_session_ready && self.sync_gate.poll(now) {
            io.clock.request_sync();
        }
        if snapshot.link_ready && self.registration_gate.poll(now) && !io.provisioning.register() {
            log_registration_failed();
        }

        io.indicator.set_active(true);
        if snapshot.all_ready() {
            self.budget.reset();
            self.phase = Phase::Acquire;
            0
        } else {
            self.phase = Phase::NotReadyBlink;
            self.config.blink_phase_ms
        }
    }

    fn acquire<C, N, S, P, I, V>(&mut self, io: &mut CycleIo<'_, C, N, S, P, I, V>) -> u32
    where
        C: Clock,
        S: SensorSource,
        P: Publisher,
    {
        let (temperature, humidity) = io.sensor.read_temperature_humidity();
        if is_fault(temperature) || is_fault(humidity) {
            if self.budget.attempts < self.config.max_retries {
                self.budget.attempts += 1;
                self.budget.spent_ms += self.config.settle_delay_ms;
                return self.config.settle_delay_ms;
            }
            log_cycle_skipped(self.budget.attempts);
            self.phase = Phase::Dwell;
            return self.config.indicator_dwell_ms;
        }

        let reading = Reading {
            temperature,
            humidity,
            pressure: if self.config.sample_pressure {
                io.sensor.read_pressure()
            } else {
                None
            },
            timestamp: io.clock.now(),
        };

        match message::render(self.config.format, &reading, self.name.as_str()) {
            Ok(payload) => io.publisher.publish(self.config.channel, payload.as_str()),
            Err(_) => log_payload_overflow(),
        }

        self.phase = Phase::Dwell;
        self.config.indicator_dwell_ms
    }

    fn pace<C, N, S, P, I, V>(&mut self, io: &mut CycleIo<'_, C, N, S, P, I, V>) -> u32
    where
        I: Indicator,
    {
        io.indicator.set_active(false);
        let consumed = self.config.indicator_dwell_ms + self.budget.spent_ms;
        self.phase = Phase::ReadyCheck;
        self.config.publish_interval_ms.saturating_sub(consumed)
    }
}

fn log_named(name: &str) {
    #[cfg(feature = "defmt")]
    defmt::info!("device name: {}", name);
    #[cfg(not(feature = "defmt"))]
    let _ = name;
}

fn log_name_overflow(len: usize) {
    #[cfg(feature = "defmt")]
    defmt::warn!("device name truncated to empty, {} bytes", len);
    #[cfg(not(feature = "defmt"))]
    let _ = len;
}

fn log_transition(state: ConnectivityState) {
    #[cfg(feature = "defmt")]
    defmt::info!(
        "connectivity changed: link={} session={} messaging={}",
        state.link_ready,
        state.cloud_session_ready,
        state.messaging_ready
    );
    #[cfg(not(feature = "defmt"))]
    let _ = state;
}

fn log_registration_failed() {
    #[cfg(feature = "defmt")]
    defmt::warn!("registration announcement not sent");
}

fn log_cycle_skipped(attempts: u8) {
    #[cfg(feature = "defmt")]
    defmt::warn!("sensor unreadable after {} retries, skipping publish", attempts);
    #[cfg(not(feature = "defmt"))]
    let _ = attempts;
}

fn log_payload_overflow() {
    #[cfg(feature = "defmt")]
    defmt::warn!("payload exceeds buffer, skipping publish");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SENSOR_FAULT;
    use std::collections::VecDeque;
    use std::string::{String, ToString};
    use std::vec::Vec;

    struct FakeClock {
        epoch: u64,
        mono: u64,
        sync_requests: usize,
    }

    impl Clock for FakeClock {
        fn now(&mut self) -> u64 {
            self.epoch
        }

        fn monotonic_millis(&mut self) -> u64 {
            self.mono
        }

        fn request_sync(&mut self) {
            self.sync_requests += 1;
        }
    }

    struct FakeNet {
        link: bool,
        cloud: bool,
        messaging: bool,
        reconnects: usize,
        reconnect_succeeds: bool,
    }

    impl Connectivity for FakeNet {
        fn link_ready(&mut self) -> bool {
            self.link
        }

        fn cloud_session_ready(&mut self) -> bool {
            self.cloud
        }

        fn messaging_ready(&mut self) -> bool {
            self.messaging
        }

        fn reconnect_messaging(&mut self) -> bool {
            self.reconnects += 1;
            if self.reconnect_succeeds {
                self.messaging = true;
            }
            self.messaging
        }
    }

    struct ScriptedSensor {
        samples: VecDeque<(f32, f32)>,
        pressure: Option<f32>,
        reads: usize,
        pressure_reads: usize,
    }

    impl ScriptedSensor {
        fn good() -> Self {
            Self {
                samples: VecDeque::new(),
                pressure: None,
                reads: 0,
                pressure_reads: 0,
            }
        }

        fn scripted(samples: &[(f32, f32)]) -> Self {
            Self {
                samples: samples.iter().copied().collect(),
                pressure: None,
                reads: 0,
                pressure_reads: 0,
            }
        }
    }

    impl SensorSource for ScriptedSensor {
        fn read_temperature_humidity(&mut self) -> (f32, f32) {
            self.reads += 1;
            self.samples.pop_front().unwrap_or((21.5, 55.2))
        }

        fn read_pressure(&mut self) -> Option<f32> {
            self.pressure_reads += 1;
            self.pressure
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        messages: Vec<(String, String)>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&mut self, channel: &str, payload: &str) {
            self.messages.push((channel.to_string(), payload.to_string()));
        }
    }

    #[derive(Default)]
    struct FakeIndicator {
        active: bool,
        toggles: usize,
    }

    impl Indicator for FakeIndicator {
        fn set_active(&mut self, on: bool) {
            if self.active != on {
                self.toggles += 1;
            }
            self.active = on;
        }
    }

    struct DelayedName {
        remaining: usize,
        name: &'static str,
        registrations: usize,
    }

    impl Provisioning for DelayedName {
        fn device_name(&mut self) -> Option<&str> {
            if self.remaining > 0 {
                self.remaining -= 1;
                None
            } else {
                Some(self.name)
            }
        }

        fn register(&mut self) -> bool {
            self.registrations += 1;
            true
        }
    }

    struct Rig {
        cycle: SampleCycle,
        clock: FakeClock,
        net: FakeNet,
        sensor: ScriptedSensor,
        publisher: RecordingPublisher,
        indicator: FakeIndicator,
        provisioning: DelayedName,
    }

    impl Rig {
        fn new(config: CycleConfig) -> Self {
            Self {
                cycle: SampleCycle::new(config),
                clock: FakeClock {
                    epoch: 1_700_000_000,
                    mono: 0,
                    sync_requests: 0,
                },
                net: FakeNet {
                    link: true,
                    cloud: true,
                    messaging: true,
                    reconnects: 0,
                    reconnect_succeeds: false,
                },
                sensor: ScriptedSensor::good(),
                publisher: RecordingPublisher::default(),
                indicator: FakeIndicator::default(),
                provisioning: DelayedName {
                    remaining: 0,
                    name: "office",
                    registrations: 0,
                },
            }
        }

        /// One tick, then sleep by advancing the fake monotonic clock,
        /// exactly as the firmware driver would.
        fn tick(&mut self) -> u32 {
            let mut io = CycleIo {
                clock: &mut self.clock,
                net: &mut self.net,
                sensor: &mut self.sensor,
                publisher: &mut self.publisher,
                indicator: &mut self.indicator,
                provisioning: &mut self.provisioning,
            };
            let wait = self.cycle.tick(&mut io);
            self.clock.mono += u64::from(wait);
            wait
        }

        fn ticks(&mut self, n: usize) -> Vec<u32> {
            (0..n).map(|_| self.tick()).collect()
        }
    }

    #[test]
    fn readiness_gate_blocks_acquisition() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.net.link = true;
        rig.net.cloud = false;
        rig.net.messaging = false;

        assert_eq!(rig.tick(), 0); // name resolves
        assert_eq!(rig.tick(), 1_000); // not ready, blink on
        assert!(rig.indicator.active);
        assert_eq!(rig.tick(), 1_000); // blink off
        assert!(!rig.indicator.active);

        assert_eq!(rig.sensor.reads, 0);
        assert!(rig.publisher.messages.is_empty());
        // cloud session down, so no reconnect attempt either
        assert_eq!(rig.net.reconnects, 0);
    }

    #[test]
    fn messaging_drop_triggers_reconnect_and_recovers() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.net.messaging = false;
        rig.net.reconnect_succeeds = true;

        assert_eq!(rig.tick(), 0); // name
        assert_eq!(rig.tick(), 0); // ready check reconnects, proceeds
        assert_eq!(rig.net.reconnects, 1);
        assert_eq!(rig.tick(), 100); // acquire + publish
        assert_eq!(rig.publisher.messages.len(), 1);
    }

    #[test]
    fn failed_reconnect_keeps_the_gate_closed() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.net.messaging = false;
        rig.net.reconnect_succeeds = false;

        rig.tick(); // name
        assert_eq!(rig.tick(), 1_000);
        assert_eq!(rig.net.reconnects, 1);
        assert_eq!(rig.sensor.reads, 0);
    }

    #[test]
    fn clean_read_publishes_the_exact_payload() {
        let mut rig = Rig::new(CycleConfig::default());
        let waits = rig.ticks(4);
        assert_eq!(waits, [0, 0, 100, 59_900]);

        assert_eq!(rig.sensor.reads, 1);
        assert_eq!(rig.publisher.messages.len(), 1);
        let (channel, payload) = &rig.publisher.messages[0];
        assert_eq!(channel, "weatherdata");
        assert_eq!(payload, "timestamp:1700000000\ttemp:21.5\thumidity:55.2");
        // indicator went on for the cycle and off for pacing
        assert!(!rig.indicator.active);
        assert_eq!(rig.indicator.toggles, 2);
    }

    #[test]
    fn transient_faults_retry_with_settle_spacing() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.sensor = ScriptedSensor::scripted(&[
            (SENSOR_FAULT, SENSOR_FAULT),
            (SENSOR_FAULT, 55.0),
            (21.5, 55.2),
        ]);

        let waits = rig.ticks(6);
        assert_eq!(waits, [0, 0, 2_001, 2_001, 100, 60_000 - 100 - 2 * 2_001]);
        assert_eq!(rig.sensor.reads, 3);
        assert_eq!(rig.publisher.messages.len(), 1);
    }

    #[test]
    fn exhausted_retries_skip_the_publish_silently() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.sensor = ScriptedSensor::scripted(&[
            (SENSOR_FAULT, 0.0),
            (SENSOR_FAULT, 0.0),
            (SENSOR_FAULT, 0.0),
            (SENSOR_FAULT, 0.0),
        ]);

        let waits = rig.ticks(7);
        assert_eq!(waits, [0, 0, 2_001, 2_001, 2_001, 100, 60_000 - 100 - 3 * 2_001]);
        assert_eq!(rig.sensor.reads, 4);
        assert!(rig.publisher.messages.is_empty());
        // the machine recovers into the next cycle
        assert_eq!(rig.tick(), 0);
        assert_eq!(rig.tick(), 100);
        assert_eq!(rig.publisher.messages.len(), 1);
    }

    #[test]
    fn pacing_floors_at_zero_when_retries_overrun_the_interval() {
        let config = CycleConfig {
            publish_interval_ms: 4_000,
            ..CycleConfig::default()
        };
        let mut rig = Rig::new(config);
        rig.sensor = ScriptedSensor::scripted(&[
            (SENSOR_FAULT, 0.0),
            (SENSOR_FAULT, 0.0),
            (SENSOR_FAULT, 0.0),
            (21.5, 55.2),
        ]);

        let waits = rig.ticks(7);
        assert_eq!(waits, [0, 0, 2_001, 2_001, 2_001, 100, 0]);
    }

    #[test]
    fn retry_budget_resets_between_cycles() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.sensor = ScriptedSensor::scripted(&[
            (SENSOR_FAULT, 0.0),
            (21.5, 55.2),
            (21.6, 55.3),
        ]);

        rig.ticks(5); // first cycle with one retry
        let waits = rig.ticks(3); // second cycle, clean
        assert_eq!(waits, [0, 100, 59_900]);
    }

    #[test]
    fn pressure_channel_is_sampled_only_when_configured() {
        let config = CycleConfig {
            sample_pressure: true,
            ..CycleConfig::default()
        };
        let mut rig = Rig::new(config);
        rig.sensor.pressure = Some(1013.4);

        rig.ticks(3);
        assert_eq!(rig.sensor.pressure_reads, 1);
        assert_eq!(
            rig.publisher.messages[0].1,
            "timestamp:1700000000\ttemp:21.5\thumidity:55.2\tpressure:1013.4"
        );

        let mut plain = Rig::new(CycleConfig::default());
        plain.sensor.pressure = Some(1013.4);
        plain.ticks(3);
        assert_eq!(plain.sensor.pressure_reads, 0);
    }

    #[test]
    fn structured_format_carries_the_device_name() {
        let config = CycleConfig {
            format: PayloadFormat::Structured,
            ..CycleConfig::default()
        };
        let mut rig = Rig::new(config);
        rig.ticks(3);
        assert_eq!(
            rig.publisher.messages[0].1,
            "{\"location\":\"office\",\"timestamp\":1700000000,\"temperature\":21.5,\"humidity\":55.2}"
        );
    }

    #[test]
    fn cycle_polls_until_the_name_arrives() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.provisioning.remaining = 2;

        assert_eq!(rig.tick(), 500);
        assert_eq!(rig.tick(), 500);
        assert_eq!(rig.tick(), 0);
        assert_eq!(rig.sensor.reads, 0);
    }

    #[test]
    fn time_resync_is_requested_once_a_day() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.ticks(4); // one full cycle seeds the gate
        assert_eq!(rig.clock.sync_requests, 0);

        rig.clock.mono += 24 * 60 * 60 * 1_000;
        rig.tick(); // next ready check
        assert_eq!(rig.clock.sync_requests, 1);

        rig.ticks(3); // rest of the cycle, still within the window
        rig.tick();
        assert_eq!(rig.clock.sync_requests, 1);
    }

    #[test]
    fn registration_announces_immediately_then_on_interval() {
        let mut rig = Rig::new(CycleConfig::default());
        rig.ticks(4);
        assert_eq!(rig.provisioning.registrations, 1);

        rig.ticks(3); // next cycle only a minute later
        assert_eq!(rig.provisioning.registrations, 1);

        rig.clock.mono += 10 * 60 * 1_000;
        rig.tick();
        assert_eq!(rig.provisioning.registrations, 2);
    }

    #[test]
    fn readiness_watch_reports_changes_after_a_baseline() {
        let mut watch = ReadinessWatch::new();
        let down = ConnectivityState {
            link_ready: true,
            cloud_session_ready: false,
            messaging_ready: false,
        };
        let up = ConnectivityState {
            link_ready: true,
            cloud_session_ready: true,
            messaging_ready: true,
        };

        assert_eq!(watch.observe(down), None); // baseline, not a transition
        assert_eq!(watch.observe(down), None);
        assert_eq!(watch.observe(up), Some(up));
        assert_eq!(watch.observe(up), None);
        assert_eq!(watch.observe(down), Some(down));
    }
}
