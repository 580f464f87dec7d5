use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{scan_database, Config, DistanceMetric, FaceVerifier, ScanError, ScanReport, Verifier};
use dialoguer::Input;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const IMAGE_NOT_FOUND: &str = "Input image file not found.";
const DATABASE_NOT_FOUND: &str = "Database folder not found!";

#[derive(Parser)]
#[command(name = "facematch", about = "Find a face in a folder of reference images")]
struct Cli {
    /// Config file (default: $FACEMATCH_CONFIG or ./facematch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Distance metric: cosine, euclidean or euclidean_l2
    #[arg(long, global = true)]
    metric: Option<DistanceMetric>,

    /// Distance threshold (default depends on the metric)
    #[arg(long, global = true)]
    threshold: Option<f32>,

    /// Embed the whole image when no face is detected instead of failing
    #[arg(long, global = true)]
    allow_no_face: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a database folder for the first image showing the same person
    Find {
        /// Input image (prompted for when omitted)
        image: Option<PathBuf>,
        /// Database folder of reference images
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
    /// Compare two images directly
    Verify {
        probe: PathBuf,
        reference: PathBuf,
    },
    /// List the faces detected in an image
    Detect {
        image: PathBuf,
    },
}

/// How a command finished; mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Match found, images verified, or faces detected.
    Found,
    NotFound,
    /// Input image or database folder does not exist.
    MissingInput,
}

impl From<Outcome> for ExitCode {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Found => ExitCode::SUCCESS,
            Outcome::NotFound => ExitCode::from(1),
            Outcome::MissingInput => ExitCode::from(2),
        }
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let outcome = match cli.command {
        Commands::Find { image, database } => {
            let image = match image {
                Some(p) => p,
                None => match prompt_image_path()? {
                    Some(p) => p,
                    None => return Ok(missing_input(IMAGE_NOT_FOUND, cli.json).into()),
                },
            };
            let database = database.unwrap_or_else(|| config.database_dir.clone());
            run_find(&config, &image, &database, cli.json)
        }
        Commands::Verify { probe, reference } => run_verify(&config, &probe, &reference, cli.json),
        Commands::Detect { image } => run_detect(&config, &image, cli.json),
    }?;
    Ok(outcome.into())
}

/// Config file and environment, then command-line flags on top.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(metric) = cli.metric {
        config.metric = metric;
    }
    if let Some(threshold) = cli.threshold {
        config.threshold = Some(threshold);
    }
    if cli.allow_no_face {
        config.enforce_detection = false;
    }
    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}

/// Ask for the input image path on the terminal.
fn prompt_image_path() -> Result<Option<PathBuf>> {
    let answer: String = Input::new()
        .with_prompt("Enter path to the input image")
        .allow_empty(true)
        .interact_text()
        .context("reading input image path")?;
    Ok(image_path_from_answer(&answer))
}

/// `None` for a blank answer.
fn image_path_from_answer(answer: &str) -> Option<PathBuf> {
    let trimmed = answer.trim();
    (!trimmed.is_empty()).then(|| PathBuf::from(trimmed))
}

/// Text or `{"error": ...}` line for a missing input image or database.
fn missing_input_message(message: &str, json: bool) -> String {
    if json {
        serde_json::json!({ "error": message }).to_string()
    } else {
        message.to_string()
    }
}

fn missing_input(message: &str, json: bool) -> Outcome {
    println!("{}", missing_input_message(message, json));
    Outcome::MissingInput
}

fn run_find(config: &Config, image: &Path, database: &Path, json: bool) -> Result<Outcome> {
    // Checked before loading models so a typo fails instantly.
    if !image.is_file() {
        return Ok(missing_input(IMAGE_NOT_FOUND, json));
    }
    if !database.exists() {
        return Ok(missing_input(DATABASE_NOT_FOUND, json));
    }

    let mut verifier = FaceVerifier::load(config).context("loading face models")?;

    let report = match scan_database(database, image, &mut verifier) {
        Ok(report) => report,
        Err(ScanError::DatabaseNotFound(_)) => return Ok(missing_input(DATABASE_NOT_FOUND, json)),
        Err(ScanError::ProbeNotFound(_)) => return Ok(missing_input(IMAGE_NOT_FOUND, json)),
        Err(e) => return Err(e).context("scanning database"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in render_find(&report) {
            println!("{line}");
        }
    }

    Ok(if report.is_match() { Outcome::Found } else { Outcome::NotFound })
}

/// Human-readable lines for a finished scan.
fn render_find(report: &ScanReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .skipped
        .iter()
        .map(|s| format!("Error processing {}: {}", s.name, s.reason))
        .collect();

    match &report.matched {
        Some(m) => {
            lines.push(format!("Match found with: {}", m.name));
            lines.push(format!("Identity confirmed with {}", m.name));
        }
        None => {
            lines.push("No match found.".to_string());
            lines.push("No identity match found.".to_string());
        }
    }
    lines
}

fn run_verify(config: &Config, probe: &Path, reference: &Path, json: bool) -> Result<Outcome> {
    for path in [probe, reference] {
        if !path.is_file() {
            let message = format!("Input image file not found: {}", path.display());
            return Ok(missing_input(&message, json));
        }
    }

    let mut verifier = FaceVerifier::load(config).context("loading face models")?;
    let result = verifier
        .verify(probe, reference)
        .with_context(|| format!("verifying {} against {}", probe.display(), reference.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("verified:  {}", result.verified);
        println!("distance:  {:.4}", result.distance);
        println!("threshold: {:.4}", result.threshold);
        println!("metric:    {}", result.metric);
    }

    Ok(if result.verified { Outcome::Found } else { Outcome::NotFound })
}

fn run_detect(config: &Config, image: &Path, json: bool) -> Result<Outcome> {
    if !image.is_file() {
        return Ok(missing_input(IMAGE_NOT_FOUND, json));
    }

    let mut verifier = FaceVerifier::load(config).context("loading face models")?;
    let faces = verifier
        .detect(image)
        .with_context(|| format!("detecting faces in {}", image.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&faces)?);
    } else {
        println!("{} face(s) in {}", faces.len(), image.display());
        for (i, f) in faces.iter().enumerate() {
            println!(
                "  #{i}: x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}",
                f.x, f.y, f.width, f.height, f.confidence
            );
        }
    }

    Ok(if faces.is_empty() { Outcome::NotFound } else { Outcome::Found })
}
