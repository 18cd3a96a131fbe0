//! relink Common Types and Transport
//!
//! Shared building blocks for the relink client:
//!
//! - **[`error`]**: the [`RelinkError`] type and `Result` alias
//! - **[`config`]**: [`ClientConfig`], the client's only configuration surface
//! - **[`endpoint`]**: the ordered [`Endpoints`] list the connector walks
//! - **[`transport`]**: NUL-terminated framing and an echo peer
//!
//! # Example
//!
//! ```
//! use relink_common::{ClientConfig, Endpoints};
//! use std::time::Duration;
//!
//! let endpoints = Endpoints::parse(["127.0.0.1:7000", "127.0.0.1:7001"]).unwrap();
//! let config = ClientConfig::new().with_connect_timeout(Duration::from_secs(5));
//! assert_eq!(endpoints.len(), 2);
//! assert!(config.validate().is_ok());
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod transport;

pub use config::ClientConfig;
pub use endpoint::{resolve, Endpoints};
pub use error::{RelinkError, Result};
