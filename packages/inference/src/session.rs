//! Per-session interactive state.

use housing_stress_scenario_models::InferenceMode;

/// State held for one interactive session.
///
/// Owned by the caller and passed by `&mut` into the resolver, so every
/// mode transition is visible at the call site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    mode: InferenceMode,
    confirmed_area: Option<String>,
}

impl SessionState {
    /// A fresh session: remote mode, no confirmed area.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh session starting in `mode`.
    #[must_use]
    pub const fn starting_in(mode: InferenceMode) -> Self {
        Self {
            mode,
            confirmed_area: None,
        }
    }

    /// Current inference mode.
    #[must_use]
    pub const fn mode(&self) -> InferenceMode {
        self.mode
    }

    /// Switches the inference mode.
    pub fn set_mode(&mut self, mode: InferenceMode) {
        if self.mode != mode {
            log::info!("Inference mode: {} -> {mode}", self.mode);
            self.mode = mode;
        }
    }

    /// The area the user confirmed, if any.
    #[must_use]
    pub fn confirmed_area(&self) -> Option<&str> {
        self.confirmed_area.as_deref()
    }

    /// Records the user's area selection, replacing any previous one.
    pub fn confirm_area(&mut self, area_id: impl Into<String>) {
        let area_id = area_id.into();
        log::debug!("Confirmed area {area_id}");
        self.confirmed_area = Some(area_id);
    }

    /// Forgets the confirmed area.
    pub fn clear_area(&mut self) {
        self.confirmed_area = None;
    }

    /// Restores the session-start defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
