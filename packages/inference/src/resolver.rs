//! Remote-then-local prediction resolution.
//!
//! | Session mode | Remote result | Action                               |
//! |--------------|---------------|--------------------------------------|
//! | `Remote`     | value         | return a `Remote` prediction         |
//! | `Remote`     | unavailable   | switch to `Local`, score locally     |
//! | `Local`      | (not called)  | score locally                        |
//!
//! A local success never restores remote mode; only [`InferenceResolver::probe`]
//! does. The two paths run strictly one after the other.

use std::sync::Arc;

use housing_stress_data::cache::ResourceCache;
use housing_stress_scenario_models::{FeatureVector, InferenceMode, InferencePath, Prediction};

use crate::local::{LocalInferenceError, LocalPredictor};
use crate::remote::RemoteService;
use crate::session::SessionState;

/// Resolves predictions for feature vectors.
#[derive(Clone)]
pub struct InferenceResolver {
    remote: Arc<dyn RemoteService>,
    local: LocalPredictor,
}

impl std::fmt::Debug for InferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceResolver")
            .field("remote_enabled", &self.remote.is_enabled())
            .field("local", &self.local)
            .finish()
    }
}

impl InferenceResolver {
    /// Creates a resolver using `remote` first and the artifacts in
    /// `cache` as the fallback.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteService>, cache: Arc<ResourceCache>) -> Self {
        Self {
            remote,
            local: LocalPredictor::new(cache),
        }
    }

    /// A new session in the mode the remote configuration allows.
    #[must_use]
    pub fn new_session(&self) -> SessionState {
        if self.remote.is_enabled() {
            SessionState::new()
        } else {
            SessionState::starting_in(InferenceMode::Local)
        }
    }

    /// Resolves one prediction.
    ///
    /// In remote mode a failed remote call moves `session` to local mode
    /// and the vector is scored locally in the same call.
    ///
    /// # Errors
    ///
    /// Returns [`LocalInferenceError`] if local scoring was needed and
    /// failed.
    pub async fn resolve(
        &self,
        session: &mut SessionState,
        vector: &FeatureVector,
    ) -> Result<Prediction, LocalInferenceError> {
        let feature_count = vector.len();

        if session.mode() == InferenceMode::Remote {
            match self.remote.predict(vector).await {
                Ok(value) => {
                    log::debug!("Remote prediction: {value}");
                    return Ok(Prediction {
                        value,
                        path: InferencePath::Remote,
                        feature_count,
                    });
                }
                Err(e) => {
                    log::warn!("Remote inference unavailable, falling back to local model: {e}");
                    session.set_mode(InferenceMode::Local);
                }
            }
        }

        let value = self.local.predict(vector).inspect_err(|e| {
            log::error!("Local inference failed: {e}");
        })?;

        Ok(Prediction {
            value,
            path: InferencePath::Local,
            feature_count,
        })
    }

    /// Checks remote liveness. A healthy service moves a local session
    /// back to remote mode; an unhealthy one leaves the mode unchanged.
    pub async fn probe(&self, session: &mut SessionState) -> bool {
        let healthy = self.remote.is_healthy().await;
        if healthy {
            session.set_mode(InferenceMode::Remote);
        } else {
            log::info!("Remote service unreachable, staying in {} mode", session.mode());
        }
        healthy
    }

    /// The local fallback predictor.
    #[must_use]
    pub const fn local(&self) -> &LocalPredictor {
        &self.local
    }
}
