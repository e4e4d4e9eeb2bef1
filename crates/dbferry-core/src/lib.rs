//! Core primitives shared by every dbferry crate.
//!
//! - [`ProvisioningContext`]: the append-only key/value bag threaded through
//!   the provisioning pipeline
//! - [`PollPolicy`] / [`await_ready`]: the bounded fixed-interval poller used
//!   for every "wait for X" case
//! - [`Properties`]: the flat `key=value` configuration surface
//! - [`ResourceBundle`]: templated documents, startup scripts and reference
//!   data shipped alongside the binary

pub mod bundle;
pub mod context;
pub mod error;
pub mod poll;
pub mod props;

pub use bundle::ResourceBundle;
pub use context::{ProvisioningContext, Value};
pub use error::{CoreError, Result};
pub use poll::{await_ready, PollPolicy};
pub use props::Properties;

/// Region used when the configuration does not name one.
pub const DEFAULT_REGION: &str = "us-east-2";
