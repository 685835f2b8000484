//! # Phoebe
//!
//! A wiki served over the Gemini protocol (read) and the companion Titan
//! protocol (write), with an auxiliary read-only web view. One TLS
//! listener speaks all three protocols, dispatching on the first request
//! line.
//!
//! Usable as a standalone binary or as a library:
//!
//! ```rust,ignore
//! use phoebe::config::{Config, Overrides};
//! use phoebe::server::Wiki;
//!
//! let config = Config::load(&Overrides::default()).unwrap();
//! let wiki = Wiki::new(config);
//! // Drive connections with phoebe::server::dispatch::handle_connection,
//! // or hand everything to phoebe::server::run.
//! ```

pub mod auth;
pub mod config;
#[cfg(unix)]
pub mod daemon;
pub mod error;
pub mod extension;
pub mod gemtext;
pub mod server;
pub mod store;
pub mod tls;
pub mod wiki;
