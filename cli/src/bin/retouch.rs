use clap::{Parser, Subcommand};
use cli::{Job, Step};
use color_eyre::eyre::{Result, WrapErr, eyre};
use image::DynamicImage;
use retouch::{Harness, Operation, OperationKind, SharedImage};
use std::path::{Path, PathBuf};
use strum::IntoEnumIterator;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job file against an image
    Run {
        /// Path to the TOML or JSON job file
        #[arg(short, long)]
        job: PathBuf,
        /// Override the number of worker threads
        #[arg(long)]
        workers: Option<usize>,
        /// Log failed steps and continue instead of stopping
        #[arg(long)]
        keep_going: bool,
    },
    /// Write an example job file
    Init {
        /// Where to write the job (.toml or .json)
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List operation tags and their parameters
    Describe,
    /// Print a JSON schema
    Schema {
        /// Print the job file schema instead of the operation schema
        #[arg(long)]
        job: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { job, workers, keep_going } => {
            run_job(job, *workers, *keep_going).await?;
        }
        Commands::Init { output } => {
            Job::example().to_file(output)?;
            info!("Example job written to {:?}", output);
        }
        Commands::Describe => describe(),
        Commands::Schema { job } => {
            let schema = if *job {
                serde_json::to_string_pretty(&schemars::schema_for!(Job))?
            } else {
                serde_json::to_string_pretty(&Operation::schema())?
            };
            println!("{schema}");
        }
    }

    Ok(())
}

async fn run_job(job_path: &Path, workers: Option<usize>, keep_going: bool) -> Result<()> {
    let mut job = Job::from_file(job_path)?;
    if let Some(workers) = workers {
        job.harness.workers = workers;
    }
    info!("Job: {} step(s), {} -> {}", job.steps.len(), job.input, job.output);

    let image = image::open(&job.input)
        .wrap_err_with(|| format!("Failed to open {}", job.input))?
        .to_rgba8();

    let harness = Harness::new(job.harness.clone())?;
    let mut completions = harness.completions()?;
    tokio::spawn(async move {
        while let Some(completion) = completions.recv().await {
            match &completion.outcome {
                Ok(image) => info!(
                    "#{} {} -> {}x{}",
                    completion.ticket,
                    completion.operation,
                    image.width(),
                    image.height()
                ),
                Err(e) => warn!("#{} {} failed: {}", completion.ticket, completion.operation, e),
            }
        }
    });

    let session = harness.open_session(image);
    let mut failures = 0usize;

    for (index, step) in job.steps.iter().enumerate() {
        let outcome = match step {
            Step::Apply { operation, params } => session.apply(operation, params).await.map(|_| ()),
            Step::Undo => session.undo().await.map(|image| {
                if image.is_none() {
                    warn!("Step {}: nothing to undo", index + 1);
                }
            }),
            Step::Redo => session.redo().await.map(|image| {
                if image.is_none() {
                    warn!("Step {}: nothing to redo", index + 1);
                }
            }),
        };

        if let Err(e) = outcome {
            failures += 1;
            if !keep_going {
                error!("Step {} failed, stopping", index + 1);
                return Err(e).wrap_err(format!("Step {} failed", index + 1));
            }
            warn!("Step {} failed: {}", index + 1, e);
        }
    }

    let result = session.current_image().await?;
    save_image(&result, Path::new(&job.output))?;

    if failures > 0 {
        warn!("Finished with {} failed step(s)", failures);
    }
    info!("✅ Saved {}x{} image to {}", result.width(), result.height(), job.output);
    Ok(())
}

fn save_image(image: &SharedImage, path: &Path) -> Result<()> {
    let dynamic = DynamicImage::ImageRgba8(image.as_ref().clone());
    let is_jpeg = matches!(
        path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("jpg" | "jpeg")
    );
    // JPEG has no alpha channel
    let saved = if is_jpeg {
        dynamic.to_rgb8().save(path)
    } else {
        dynamic.save(path)
    };
    saved.map_err(|e| eyre!("Failed to save {:?}: {}", path, e))
}

fn describe() {
    println!("Available operations:\n");
    for kind in OperationKind::iter() {
        let marker = if kind.is_supported() { "" } else { " (unsupported)" };
        println!("• {}{}", kind, marker);
        println!("  Description: {}", kind.description());

        let params = kind.parameters_info();
        if !params.is_empty() {
            println!("  Parameters:");
            for (name, desc, required) in params {
                let req_marker = if required { " (required)" } else { " (optional)" };
                println!("    - {}{}: {}", name, req_marker, desc);
            }
        }
    }
}
