#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Housing stress inference.
//!
//! Scores a [`FeatureVector`](housing_stress_scenario_models::FeatureVector)
//! through one of two paths:
//!
//! 1. **Remote**: the inference API configured in `services/remote.toml`
//!    (`POST /predict`, bounded by a timeout).
//! 2. **Local**: the cached scaler and regression model.
//!
//! The [`resolver::InferenceResolver`] tries the remote path while the
//! [`session::SessionState`] is in remote mode. Any remote failure switches
//! the session to local mode and the request is scored locally instead.
//! Only an explicit health probe switches the session back.

pub mod local;
pub mod remote;
pub mod resolver;
pub mod service_config;
pub mod session;

pub use local::{LocalInferenceError, LocalPredictor};
pub use remote::{HttpRemote, RemoteService, RemoteUnavailable};
pub use resolver::InferenceResolver;
pub use service_config::RemoteServiceConfig;
pub use session::SessionState;
