//! # stackwire-compose
//!
//! Orchestrates the composition of stacks from blueprints.
//!
//! Provides:
//! - [`Composer`](composer::Composer): Runs a blueprint's sections against a
//!   fresh graph builder, then finalizes, resolves, and publishes.
//! - [`Blueprint`](blueprint::Blueprint) and [`Section`](section::Section):
//!   The units of stack construction.
//! - [`catalog`]: Typed constructors for the built-in resource kinds.
//! - [`blueprints`]: The built-in blueprints.
//! - [`IdentityResolver`](identity::IdentityResolver): Physical ids used when
//!   publishing outputs.

pub mod blueprint;
pub mod blueprints;
pub mod catalog;
pub mod composer;
pub mod identity;
pub mod section;
pub mod state;

pub use blueprint::{Blueprint, BlueprintRegistry};
pub use composer::{Composer, Composition};
pub use section::{Section, SectionContext};
pub use state::{CancellationToken, CompositionState};
