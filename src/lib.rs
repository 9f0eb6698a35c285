// ============================================================================
// Linting - Dangerous or non-idiomatic practices are flagged
// ============================================================================

#![warn(missing_docs)]                // Public items should be documented
#![warn(non_camel_case_types)]        // Types must follow CamelCase convention
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_must_use)]             // Must handle Result and Option explicitly
#![warn(nonstandard_style)]           // Non-standard code style is flagged
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # OpenStack Topology
//!
//! Idempotent build and teardown of salt-managed web application
//! environments on an OpenStack cloud.
//!
//! ## Overview
//!
//! One run stands up, or tears down, the environment of one application:
//!
//! - A router with an external gateway, a private network and its subnet
//! - A salt control server, `N` application servers and, optionally, a
//!   primary/secondary load-balancer pair sharing a floating address
//! - Floating addresses for every server, tagged with the role they play
//!
//! Every step looks the resource up by its derived name first, so running a
//! build twice creates nothing new and running a teardown twice deletes
//! nothing twice.
//!
//! ## Architecture
//!
//! 1. **Naming**: `app` and `environment` are sanitized into resource names
//! 2. **Facade**: find-or-create and find-then-delete over a
//!    [`openstack::CloudConnection`]
//! 3. **Builder**: sequences the facade calls and hands servers to a
//!    [`bootstrap::Bootstrapper`]
//!
//! ## Modules
//!
//! - [`naming`]: Resource name derivation
//! - [`config`]: Settings file, credentials and validation
//! - [`openstack`]: API client, resource facade and progress reporting
//! - [`topology`]: Build and teardown sequencing, HA address reuse, inspection
//! - [`bootstrap`]: Salt master and minion configuration over SSH
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```text
//! topology build hello_world dev 2 t1.small
//! topology build hello_world dev 2 t1.small --destroy
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod naming;
pub mod openstack;
pub mod topology;

// ============================================================================
// Re-exports
// ============================================================================

pub use bootstrap::{Bootstrapper, NoopBootstrapper, SshBootstrapper};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, OpenStackCredentials, Settings};
pub use error::{Result, TopologyError};
pub use naming::{DeployParams, EnvironmentNames};
pub use openstack::{CloudConnection, OpenStackClient, ResourceFacade};
pub use topology::{BuildReport, EnvironmentInspector, TopologyBuilder};
