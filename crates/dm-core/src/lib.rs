//! # dm-core
//!
//! Core types, traits, and configuration for Documents RS.
//!
//! This crate provides the foundational building blocks used across the other crates:
//! - Common error type and its HTTP mapping
//! - Core traits (Identifiable, Timestamped)
//! - Configuration types, including the document deletion policy

pub mod config;
pub mod error;
pub mod traits;

pub use config::{AppConfig, DocumentsConfig, OnDeletePolicy, OwnerConfig};
pub use error::*;
pub use traits::*;
