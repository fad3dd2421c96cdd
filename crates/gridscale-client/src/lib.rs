//! gridscale-client — authenticated client for the orchestrator control plane.
//!
//! Two pieces: a credential manager that obtains and renews an opaque bearer
//! token (password or RS256 signed-assertion login), and a request layer that
//! keeps retrying through transient control-plane failures so the polling
//! loop above it never has to care about orchestrator downtime.

pub mod auth;
pub mod client;
pub mod error;
pub mod types;

pub use auth::{AuthConfig, Credential};
pub use client::{HttpClient, RemoteClient, APPS_PATH, ERR_THRESHOLD};
pub use error::{ClientError, ClientResult};
pub use types::{AppSnapshot, TaskRef};
