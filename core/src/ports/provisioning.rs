//! Device identity and registration port.

/// Name acquisition and registration with the backend.
pub trait Provisioning {
    /// The node's assigned name, once known. Variants with remote naming
    /// return `None` until the name subscription delivers one; the cycle
    /// polls until it does and uses the name as the payload location.
    fn device_name(&mut self) -> Option<&str>;

    /// Announce this device to the backend. Rate-limited by the caller;
    /// returns whether the announcement was handed to the transport.
    /// Default no-op for variants without a registration endpoint.
    fn register(&mut self) -> bool {
        true
    }
}

/// Provisioning for nodes whose name is fixed at build time.
pub struct FixedName(pub &'static str);

impl Provisioning for FixedName {
    fn device_name(&mut self) -> Option<&str> {
        Some(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_name_resolves_immediately_and_registers_as_noop() {
        let mut provisioning = FixedName("garage");
        assert_eq!(provisioning.device_name(), Some("garage"));
        assert!(provisioning.register());
    }
}
