#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Scenario reconciliation for the housing stress engine.
//!
//! [`schema::SchemaResolver`] decides which ordered feature list the
//! deployed model expects, and [`reconcile::FeatureReconciler`] turns an
//! area's baseline plus a user's scenario deltas into a vector in exactly
//! that order. A vector that cannot match the schema is never produced.

pub mod reconcile;
pub mod schema;

pub use reconcile::{FeatureReconciler, ReconcileError};
pub use schema::{SchemaError, SchemaResolver};
