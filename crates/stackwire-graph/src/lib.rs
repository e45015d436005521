//! # stackwire-graph
//!
//! Builds the resource graph of a single stack.
//!
//! Handles:
//! - **Value**: Property values, including in-stack references and deferred
//!   cross-stack references.
//! - **Descriptor**: Named, typed resource declarations.
//! - **Kinds**: Marker types and typed handles returned by the builder.
//! - **Builder**: Accumulates descriptors, edges, inputs, and outputs.
//! - **Graph**: Cycle detection and deterministic topological ordering.
//! - **Stack**: The finalized, ordered stack graph.
//! - **Render**: Serialization of a resolved stack into a template document.
//! - **Legacy**: Migration of `{{resolve:ssm:...}}` string tokens.

pub mod builder;
pub mod descriptor;
pub mod graph;
pub mod kinds;
pub mod legacy;
pub mod render;
pub mod stack;
pub mod value;

pub use builder::GraphBuilder;
pub use descriptor::{ResourceDescriptor, ResourceKind};
pub use kinds::{AnyHandle, Kind, ResourceHandle};
pub use stack::{InputVariable, Output, StackGraph};
pub use value::PropertyValue;
