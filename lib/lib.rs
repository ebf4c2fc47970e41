//! `eposctl` is an operator's tool for provisioning, mutating, inspecting, and tearing down
//! instances of the EPOS multi-service platform.
//!
//! # Overview
//!
//! eposctl drives a fixed application stack onto one of two runtime substrates. It handles:
//! - Environment lifecycle management (deploy, update, clean, delete)
//! - Declarative YAML configuration with validation and defaulting
//! - Artifact rendering (Compose files, Helm values) from embedded templates
//! - Ontology bootstrap and concurrent TTL metadata ingestion
//! - Crash-safe updates through a backup/restore discipline
//!
//! # Architecture
//!
//! eposctl consists of several key components:
//!
//! - **Config**: The environment configuration document, its validation and URL derivation
//! - **Render**: Substrate-specific deployment artifacts produced into transient bundles
//! - **Substrate**: Docker Compose and Kubernetes/Helm backends behind one capability trait
//! - **Store**: SQLite registry of Docker environments and their ingested files
//! - **Management**: The lifecycle orchestrator composing all of the above
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use eposctl::{
//!     config::EnvironmentConfig,
//!     management,
//!     substrate::DockerSubstrate,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EnvironmentConfig::default_docker("my-env");
//!     let substrate = DockerSubstrate::connect().await?;
//!
//!     let env = management::deploy(&substrate, config, false).await?;
//!     println!("GUI available at {}", env.get_urls().get_gui());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration types, validation, defaults, and URL building
//! - [`management`] - Environment lifecycle operations and the ingestion pipeline
//! - [`oci`] - Container registry digest queries for the image update check
//! - [`render`] - Template rendering into deployment bundles
//! - [`store`] - Local SQLite registry of environments and ingested files
//! - [`substrate`] - Docker and Kubernetes substrate invokers
//! - [`utils`] - Common utilities and helpers
//!
//! # Platform Support
//!
//! - Linux and macOS: full support
//! - Windows: supported; port-forward teardown falls back to a hard kill

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod management;
pub mod oci;
pub mod render;
pub mod store;
pub mod substrate;
pub mod utils;

pub use error::*;
