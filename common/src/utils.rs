//! Common Utilities
//!
//! Wall-clock helpers and the UE identity <-> address convention

use crate::types::UeId;
use chrono::Utc;
use std::net::{IpAddr, Ipv4Addr};
use tracing::trace;

/// Current wall-clock time in seconds since the Unix epoch
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Maps UE identities onto a /24 subnet
///
/// `UE<n>` lives at `<a>.<b>.<c>.<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeAddressing {
    subnet: [u8; 3],
}

impl UeAddressing {
    /// Build from any address inside the subnet
    pub fn new(subnet: Ipv4Addr) -> Self {
        let [a, b, c, _] = subnet.octets();
        Self { subnet: [a, b, c] }
    }

    /// Address of a UE
    pub fn ip_for(&self, ue: UeId) -> Ipv4Addr {
        let [a, b, c] = self.subnet;
        Ipv4Addr::new(a, b, c, ue.value())
    }

    /// Identity of the UE at `ip`
    ///
    /// Only the last octet is significant, so a UE is recognised whatever
    /// subnet its traffic arrives from.
    pub fn ue_for(&self, ip: IpAddr) -> Option<UeId> {
        let ue = match ip {
            IpAddr::V4(v4) => Some(UeId(v4.octets()[3])),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| UeId(v4.octets()[3])),
        };
        trace!("Derived {:?} from {}", ue, ip);
        ue
    }
}

impl Default for UeAddressing {
    fn default() -> Self {
        Self::new(Ipv4Addr::new(10, 0, 0, 0))
    }
}
