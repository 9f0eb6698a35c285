//! Shared address selection for the load-balancer pair.
//!
//! Each balancer always keeps its own primary floating address so it can
//! reach the cloud API. The pair additionally shares one address, which
//! keepalived moves to whichever instance is master. On a rerun the shared
//! address may sit on either instance, or nowhere yet on the first build.

use crate::openstack::{AddressRole, FloatingIp};

/// Where the shared address comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaAddressChoice {
    /// The primary already carries it.
    ReusePrimary(FloatingIp),
    /// The secondary carries it after a failover.
    ReuseSecondary(FloatingIp),
    /// Neither has one, a new address goes to the primary.
    AllocateNew,
}

impl HaAddressChoice {
    /// The reused address, if any.
    #[must_use]
    pub const fn reused(&self) -> Option<&FloatingIp> {
        match self {
            Self::ReusePrimary(ip) | Self::ReuseSecondary(ip) => Some(ip),
            Self::AllocateNew => None,
        }
    }
}

/// Finds the shared address among one server's floating addresses.
///
/// A `ha-shared` tag wins. Untagged lists fall back to position: the first
/// address is the server's own, the second is the shared one.
#[must_use]
pub fn shared_address(addresses: &[FloatingIp]) -> Option<&FloatingIp> {
    if let Some(tagged) = addresses
        .iter()
        .find(|ip| ip.role() == AddressRole::HaShared)
    {
        return Some(tagged);
    }

    if addresses.len() < 2 {
        return None;
    }

    if addresses.iter().any(|ip| ip.role() == AddressRole::Primary) {
        addresses.iter().find(|ip| ip.role() != AddressRole::Primary)
    } else {
        addresses.get(1)
    }
}

/// Chooses the shared address given each balancer's floating addresses.
#[must_use]
pub fn choose_ha_address(primary: &[FloatingIp], secondary: &[FloatingIp]) -> HaAddressChoice {
    if let Some(ip) = shared_address(primary) {
        return HaAddressChoice::ReusePrimary(ip.clone());
    }
    if let Some(ip) = shared_address(secondary) {
        return HaAddressChoice::ReuseSecondary(ip.clone());
    }
    HaAddressChoice::AllocateNew
}
