//! Interactive scenario session.
//!
//! Holds one [`SessionState`] for the whole session: the confirmed area
//! and the inference mode persist across every prediction until the user
//! quits.

use dialoguer::{Confirm, Input, Select};
use housing_stress_engine::ScenarioEngine;
use housing_stress_inference::SessionState;
use housing_stress_scenario_models::{InferenceMode, ScenarioAdjustment};

use crate::render;

/// Menu actions in the interactive session.
enum SessionAction {
    SelectArea,
    Adjust,
    ResetAdjustments,
    Predict,
    ShowFeatures,
    Reconnect,
    UseLocal,
    Quit,
}

impl SessionAction {
    const ALL: &[Self] = &[
        Self::SelectArea,
        Self::Adjust,
        Self::ResetAdjustments,
        Self::Predict,
        Self::ShowFeatures,
        Self::Reconnect,
        Self::UseLocal,
        Self::Quit,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::SelectArea => "Select area",
            Self::Adjust => "Adjust scenario",
            Self::ResetAdjustments => "Reset adjustments",
            Self::Predict => "Predict housing stress",
            Self::ShowFeatures => "Show adjusted features",
            Self::Reconnect => "Reconnect to remote service",
            Self::UseLocal => "Use local model only",
            Self::Quit => "Quit",
        }
    }
}

/// Runs the interactive session until the user quits.
///
/// # Errors
///
/// Returns an error if a prompt fails or the area dataset cannot be
/// loaded.
pub async fn run(
    engine: &ScenarioEngine,
    base_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = engine.new_session();
    let mut adjustment = ScenarioAdjustment::ZERO;

    println!("Housing Stress Scenario Explorer");
    if session.mode() == InferenceMode::Remote && engine.probe(&mut session).await {
        println!("Connected to inference service at {base_url}.");
    } else {
        session.set_mode(InferenceMode::Local);
        println!("Inference service at {base_url} unavailable; using the local model.");
    }

    let labels: Vec<&str> = SessionAction::ALL
        .iter()
        .map(SessionAction::label)
        .collect();

    loop {
        println!();
        println!(
            "Area: {} | Mode: {} | Scenario: {}",
            session.confirmed_area().unwrap_or("(none)"),
            session.mode(),
            render::format_adjustment(&adjustment)
        );

        let idx = Select::new()
            .with_prompt("Action")
            .items(&labels)
            .default(0)
            .interact()?;

        match SessionAction::ALL[idx] {
            SessionAction::SelectArea => handle_select_area(engine, &mut session)?,
            SessionAction::Adjust => adjustment = prompt_adjustment(&adjustment)?,
            SessionAction::ResetAdjustments => adjustment = ScenarioAdjustment::ZERO,
            SessionAction::Predict => handle_predict(engine, &mut session, &adjustment).await,
            SessionAction::ShowFeatures => handle_show_features(engine, &session, &adjustment),
            SessionAction::Reconnect => {
                if engine.probe(&mut session).await {
                    println!("Inference service is up; using remote predictions.");
                } else {
                    println!("Inference service at {base_url} is still unreachable.");
                }
            }
            SessionAction::UseLocal => {
                session.set_mode(InferenceMode::Local);
                println!("Using the local model.");
            }
            SessionAction::Quit => break,
        }
    }

    Ok(())
}

/// Looks up an area by code or name and confirms it.
fn handle_select_area(
    engine: &ScenarioEngine,
    session: &mut SessionState,
) -> Result<(), Box<dyn std::error::Error>> {
    let areas = engine.areas()?;
    let key: String = Input::new()
        .with_prompt("Area code or name")
        .interact_text()?;

    let Some(area) = areas.find(key.trim()) else {
        println!("No area matches '{}'.", key.trim());
        return Ok(());
    };

    let confirmed = Confirm::new()
        .with_prompt(format!("Use {} ({})?", area.name, area.area_id))
        .default(true)
        .interact()?;

    if confirmed {
        session.confirm_area(area.area_id.clone());
    }
    Ok(())
}

/// Prompts for every delta, defaulting to the current values.
fn prompt_adjustment(
    current: &ScenarioAdjustment,
) -> Result<ScenarioAdjustment, Box<dyn std::error::Error>> {
    let prompt = |label: &str, value: f64| -> Result<f64, dialoguer::Error> {
        Input::<f64>::new()
            .with_prompt(label)
            .default(value)
            .interact_text()
    };

    Ok(ScenarioAdjustment {
        income_adj: prompt("Weekly income change ($)", current.income_adj)?,
        rent_adj: prompt("Weekly rent change ($)", current.rent_adj)?,
        mortgage_adj: prompt("Weekly mortgage change ($)", current.mortgage_adj)?,
        unemployment_adj: prompt(
            "Unemployment rate change (points)",
            current.unemployment_adj,
        )?,
        mining_pct_adj: prompt("Mining workforce change (%)", current.mining_pct_adj)?,
    })
}

async fn handle_predict(
    engine: &ScenarioEngine,
    session: &mut SessionState,
    adjustment: &ScenarioAdjustment,
) {
    let Some(area) = session.confirmed_area().map(ToString::to_string) else {
        println!("Select an area first.");
        return;
    };

    let outcome = engine.outcome(session, &area, adjustment).await;
    println!("{}", render::format_outcome(&outcome));
}

fn handle_show_features(
    engine: &ScenarioEngine,
    session: &SessionState,
    adjustment: &ScenarioAdjustment,
) {
    let Some(area) = session.confirmed_area() else {
        println!("Select an area first.");
        return;
    };

    match engine.reconciled_record(area, adjustment) {
        Ok(record) => {
            for (name, value) in record.iter() {
                println!("  {name:<32} {value:>14.3}");
            }
        }
        Err(e) => println!("Error ({}): {e}", e.kind()),
    }
}
