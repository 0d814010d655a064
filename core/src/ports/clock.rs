//! Time source port.

/// Wall-clock and monotonic time, plus a best-effort resync hook.
pub trait Clock {
    /// Current wall-clock time, Unix epoch seconds. Implementations report
    /// 0 until the clock has been synchronized at least once.
    fn now(&mut self) -> u64;

    /// Milliseconds since boot. Used only for the housekeeping gates, so
    /// the origin is arbitrary as long as it is monotonic.
    fn monotonic_millis(&mut self) -> u64;

    /// Ask the platform to resynchronize the wall clock (SNTP on the
    /// reference board). Fire-and-forget; the caller rate-limits this to
    /// once per day. Default is a no-op for platforms with no sync source.
    fn request_sync(&mut self) {}
}
