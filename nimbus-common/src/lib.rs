//! # Nimbus Common Library
//!
//! Shared code for the Nimbus server and trainer including:
//! - Configuration loading and root folder layout
//! - Database schema and queries
//! - Password and session token primitives
//! - Audio decoding and acoustic feature extraction
//! - Feature scaling, random forest classifier and model bundle persistence

pub mod audio;
pub mod auth;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod model;

pub use error::{Error, Result};
