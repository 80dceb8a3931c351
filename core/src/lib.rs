//! Connector core for the network-analytics appliance REST API.
//!
//! # Overview
//! Runs named actions (flow search, endpoint and scope listings, annotation
//! management, connectivity checks) against the appliance and returns a
//! finished action result with records, summary and debug data.
//!
//! # Design
//! - Requests are built as plain `HttpRequest` values and executed through
//!   the `Transport` trait, so everything above the transport is
//!   deterministic and testable with a scripted fake.
//! - Every response goes through one classifier that decides success or
//!   failure from its content type and status.
//! - Handlers write through `ResultCollector` and stop at the first error;
//!   the dispatcher finalizes each result exactly once.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod actions;
pub mod auth;
pub mod classify;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod flows;
pub mod http;
pub mod normalize;
pub mod params;
pub mod result;
pub mod vault;
pub mod view;

#[cfg(test)]
mod testing;

pub use actions::{Action, Connector};
pub use client::{RestCall, TetrationClient};
pub use config::{load_config, load_from_env, ConfigError, ConnectorConfig};
pub use error::{ConnectorError, ConnectorResult};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use result::{ActionResult, ActionStatus, FinishedAction, ResultCollector};
pub use vault::{LocalVault, Vault};
