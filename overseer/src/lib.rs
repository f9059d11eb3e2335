//! Client-side state synchronizer for a remote autonomous agent.
//!
//! The remote agent is only observable through a polling control surface. This
//! crate reconciles a local, editable operator state against the snapshots it
//! reports. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure state and transitions (edit guard, stall detection,
//!   channel gating, lifecycle resets). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP control surface, config files).
//!   Isolated behind the [`io::client::ControlSurface`] trait to enable fakes in tests.
//!
//! The [`driver`] module owns one [`core::state::SynchronizerState`] inside a
//! single task and ties core logic to I/O on a fixed polling cadence.

pub mod core;
pub mod driver;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
