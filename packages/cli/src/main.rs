#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Housing stress scenario explorer.
//!
//! ```text
//! housing_stress areas [--limit 20]
//! housing_stress schema
//! housing_stress health
//! housing_stress locate --lng 116.85 --lat -20.74
//! housing_stress predict <area> [--rent-adj 20 --unemployment-adj -1.5 ...] [--local] [--json]
//! ```
//!
//! Running with no subcommand starts an interactive session.
//!
//! Data files are read from `HOUSING_STRESS_DATA_DIR` (default `data/`);
//! the inference API is `API_URL` (default `http://localhost:5000`).
//! Dataset column roles come from `layout.toml` in the data directory, or
//! from the file given with `--layout`.

mod interactive;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use housing_stress_data::cache::ResourceCache;
use housing_stress_data::dataset::DataLayout;
use housing_stress_data::paths::DataPaths;
use housing_stress_engine::ScenarioEngine;
use housing_stress_inference::HttpRemote;
use housing_stress_scenario_models::{InferenceMode, ScenarioAdjustment};

#[derive(Parser)]
#[command(
    name = "housing_stress",
    about = "Explore housing stress predictions under economic scenarios"
)]
struct Cli {
    /// Dataset layout file (TOML) overriding `layout.toml` in the data directory
    #[arg(long, global = true)]
    layout: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List areas in the dataset
    Areas {
        /// Maximum number of areas to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show the feature schema the model expects
    Schema,
    /// Check whether the remote inference service is reachable
    Health,
    /// Find the area containing a point
    Locate {
        /// Longitude (WGS84)
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Latitude (WGS84)
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
    },
    /// Predict the housing stress index for an area under a scenario
    Predict {
        /// Area code or name
        area: String,
        #[command(flatten)]
        adjustment: AdjustmentArgs,
        /// Skip the remote service and score with the local model
        #[arg(long)]
        local: bool,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct AdjustmentArgs {
    /// Change in average weekly income ($)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    income_adj: f64,
    /// Change in average weekly rent ($)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    rent_adj: f64,
    /// Change in average weekly mortgage repayment ($)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    mortgage_adj: f64,
    /// Change in unemployment rate (percentage points)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    unemployment_adj: f64,
    /// Change in mining workforce (percent)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    mining_pct_adj: f64,
}

impl From<AdjustmentArgs> for ScenarioAdjustment {
    fn from(args: AdjustmentArgs) -> Self {
        Self {
            income_adj: args.income_adj,
            rent_adj: args.rent_adj,
            mortgage_adj: args.mortgage_adj,
            unemployment_adj: args.unemployment_adj,
            mining_pct_adj: args.mining_pct_adj,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let remote = Arc::new(HttpRemote::from_env());
    let base_url = remote.config().base_url().to_string();
    let cache = match &cli.layout {
        Some(path) => ResourceCache::new(DataPaths::from_env(), DataLayout::load(path)?),
        None => ResourceCache::from_env(),
    };
    let engine = ScenarioEngine::new(Arc::new(cache), remote);

    let Some(command) = cli.command else {
        return interactive::run(&engine, &base_url).await;
    };

    match command {
        Commands::Areas { limit } => {
            let areas = engine.areas()?;
            println!("{}", render::area_header());
            println!("{}", "-".repeat(77));
            for area in areas.records().iter().take(limit) {
                println!("{}", render::format_area_row(area));
            }
            println!("\n{} of {} area(s)", limit.min(areas.len()), areas.len());
        }
        Commands::Schema => {
            let schema = engine.schema()?;
            println!("{} features (from {}):", schema.len(), schema.source());
            for (i, name) in schema.names().iter().enumerate() {
                println!("{:>4}  {name}", i + 1);
            }
        }
        Commands::Health => {
            let mut session = engine.new_session();
            if engine.probe(&mut session).await {
                println!("Remote inference service at {base_url} is up.");
            } else {
                println!("Remote inference service at {base_url} is unreachable; predictions will use the local model.");
            }
        }
        Commands::Locate { lng, lat } => match engine.locate(lng, lat)? {
            Some(code) => {
                let areas = engine.areas()?;
                match areas.get(&code) {
                    Some(area) => println!("{} ({})", area.name, area.area_id),
                    None => println!("{code} (not in dataset)"),
                }
            }
            None => {
                eprintln!("No area contains ({lng}, {lat})");
                std::process::exit(1);
            }
        },
        Commands::Predict {
            area,
            adjustment,
            local,
            json,
        } => {
            let mut session = engine.new_session();
            if local {
                session.set_mode(InferenceMode::Local);
            }
            let adjustment = ScenarioAdjustment::from(adjustment);
            let outcome = engine.outcome(&mut session, &area, &adjustment).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("Scenario: {}", render::format_adjustment(&adjustment));
                println!("{}", render::format_outcome(&outcome));
            }

            if outcome.value().is_none() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
