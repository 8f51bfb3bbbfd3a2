//! Lumbar Motion CLI
//!
//! Analyze a spine/pelvis recording pair, or inspect a single export.
//!
//! ```text
//! lumbar-motion analyze --spine spine.csv --pelvis pelvis.csv --exercise sit-to-stand --pretty
//! lumbar-motion inspect pelvis.csv
//! ```
//!
//! The JSON response goes to stdout (or `--output`); logs go to stderr and
//! follow `RUST_LOG`.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumbar_motion::{
    AnalysisConfig, AnalysisPipeline, AnalysisRequest, CsvInput, ExerciseType, SensorRole,
};

#[derive(Parser, Debug)]
#[command(name = "lumbar-motion", version, about = "Lumbo-pelvic IMU movement analysis")]
struct Cli {
    /// TOML configuration file; LUMBAR_* environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full analysis on a spine and a pelvis export
    Analyze {
        /// Spine sensor CSV
        #[arg(long)]
        spine: PathBuf,

        /// Pelvis sensor CSV
        #[arg(long)]
        pelvis: PathBuf,

        /// Exercise performed during the recording
        #[arg(long, value_enum, default_value_t = ExerciseArg::SitToStand)]
        exercise: ExerciseArg,

        /// Write the JSON response here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pretty-print the JSON response
        #[arg(long)]
        pretty: bool,
    },

    /// Validate one export and print its sample count, duration and rate
    Inspect {
        file: PathBuf,

        /// Body segment the sensor was worn on
        #[arg(long, value_enum, default_value_t = RoleArg::Spine)]
        role: RoleArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExerciseArg {
    Squat,
    SitToStand,
}

impl From<ExerciseArg> for ExerciseType {
    fn from(arg: ExerciseArg) -> Self {
        match arg {
            ExerciseArg::Squat => ExerciseType::Squat,
            ExerciseArg::SitToStand => ExerciseType::SitToStand,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RoleArg {
    Spine,
    Pelvis,
}

impl From<RoleArg> for SensorRole {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Spine => SensorRole::Spine,
            RoleArg::Pelvis => SensorRole::Pelvis,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = AnalysisConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let pipeline = AnalysisPipeline::new(config);

    match cli.command {
        Commands::Analyze {
            spine,
            pelvis,
            exercise,
            output,
            pretty,
        } => {
            let request = AnalysisRequest {
                spine: CsvInput::from_path(&spine)
                    .with_context(|| format!("reading {}", spine.display()))?,
                pelvis: CsvInput::from_path(&pelvis)
                    .with_context(|| format!("reading {}", pelvis.display()))?,
                exercise: exercise.into(),
            };

            let response = pipeline.run(&request);
            let json = pipeline
                .render(&response, pretty)
                .context("serializing response")?;

            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(path = %path.display(), "response written");
                }
                None => println!("{json}"),
            }

            if !response.is_success() {
                bail!(
                    "analysis failed: {}",
                    response.message.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Inspect { file, role } => {
            let input = CsvInput::from_path(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let metadata = pipeline
                .inspect(role.into(), &input)
                .with_context(|| format!("validating {}", file.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&metadata).context("serializing metadata")?
            );
        }
    }

    Ok(())
}
