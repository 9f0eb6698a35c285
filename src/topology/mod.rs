//! Topology orchestration module.
//!
//! This module sequences the facade calls that stand an environment up or
//! tear it down, settles the load balancers' shared address, and inspects
//! what an environment currently consists of.

mod builder;
mod ha;
mod inspect;

pub use builder::{BuildReport, BuildStage, SALT_CLOUD_KEY_PAIR, ServerSummary, TopologyBuilder};
pub use ha::{HaAddressChoice, choose_ha_address, shared_address};
pub use inspect::{EnvironmentInspector, EnvironmentStatus, ObservedResource, ObservedServer};
