//! # stackwire-common
//!
//! Shared types, error definitions, configuration models, and constants
//! used across the entire stackwire workspace.
//!
//! This crate is the leaf of the dependency graph: it depends on no other
//! internal crate and provides the identifiers, the deferred-reference value
//! type, and the error enum that every other crate builds upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
