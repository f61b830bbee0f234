//! Process-wide configuration knobs, explicit rather than ambient.
//!
//! Two settings historically lived straight in the process environment.
//! Here they are an explicit `ClientConfig` object passed (or defaulted)
//! into a `Session`, so tests can inject values without mutating global
//! state; [`ClientConfig::from_env`] preserves the ambient reads as a
//! fallback for callers who want the old behavior.

use std::env;
use std::net::Ipv4Addr;
use std::time::Duration;

const ACTIVE_DT_HOST_ADDRESS_VAR: &str = "ACTIVE_DT_HOST_ADDRESS";
const DT_AUTO_NOOP_DELAY_VAR: &str = "DT_AUTO_NOOP_DELAY";

/// Process-wide knobs affecting active-mode and keep-alive behavior.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// IPv4 address to advertise in `PORT`/accept on for active mode.
    /// `None` means "use the connector's notion of the local address."
    pub active_dt_host_address: Option<Ipv4Addr>,
    /// Keep-alive NOOP interval. `None` (or zero) disables the ticker.
    pub dt_auto_noop_delay: Option<Duration>,
}

impl ClientConfig {
    /// Build a config with neither knob set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `ACTIVE_DT_HOST_ADDRESS` and `DT_AUTO_NOOP_DELAY` from the
    /// process environment. Invalid values are logged and ignored rather
    /// than rejected outright.
    pub fn from_env() -> Self {
        let active_dt_host_address = env::var(ACTIVE_DT_HOST_ADDRESS_VAR)
            .ok()
            .and_then(|raw| match parse_dotted_quad(&raw) {
                Some(addr) => Some(addr),
                None => {
                    log::warn!(
                        "{ACTIVE_DT_HOST_ADDRESS_VAR}={raw:?} is not a valid dotted IPv4 \
                         address; ignoring"
                    );
                    None
                }
            });

        let dt_auto_noop_delay = env::var(DT_AUTO_NOOP_DELAY_VAR)
            .ok()
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(0) => None,
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => {
                    log::warn!(
                        "{DT_AUTO_NOOP_DELAY_VAR}={raw:?} is not a positive integer; ignoring"
                    );
                    None
                }
            });

        Self {
            active_dt_host_address,
            dt_auto_noop_delay,
        }
    }
}

/// Validate four dotted octets in `[0,255]`. Rejects anything else
/// (extra components, non-numeric octets, leading/trailing whitespace).
fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let parts: Vec<&str> = s.trim().split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut octets = [0u8; 4];
    for (i, part) in parts.iter().enumerate() {
        octets[i] = part.parse::<u8>().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_dotted_quad() {
        assert_eq!(
            parse_dotted_quad("192.168.0.5"),
            Some(Ipv4Addr::new(192, 168, 0, 5))
        );
    }

    #[test]
    fn rejects_out_of_range_octet() {
        assert_eq!(parse_dotted_quad("192.168.0.999"), None);
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert_eq!(parse_dotted_quad("192.168.0"), None);
        assert_eq!(parse_dotted_quad("192.168.0.5.1"), None);
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(parse_dotted_quad("a.b.c.d"), None);
    }
}
