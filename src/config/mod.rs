//! Configuration module for server-harness.
//!
//! This module handles parsing, validation, and access to the settings the
//! lifecycle manager reads on every start: the server's host and base ports,
//! its admin credentials, the coverage toggle, and the log markers and
//! timeouts. Configurations can be loaded from JSON or YAML.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use server_harness::config::HarnessConfig;
//!
//! let config = HarnessConfig::from_file("harness.yaml").unwrap();
//! println!("Managing server on {}", config.server.host);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use server_harness::config::{HarnessConfig, validate_config};
//!
//! let mut config = HarnessConfig::default();
//! config.server.ports.insert("https".to_string(), 9444);
//! config.lifecycle.login_timeout_secs = 30;
//!
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{Credentials, CoverageConfig, HarnessConfig, LifecycleConfig, ServerSection};
pub use validator::validate_config;
