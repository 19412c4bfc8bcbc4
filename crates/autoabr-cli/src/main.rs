//! autoabr CLI: run ladder analyses and suggest ladders from existing results.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use autoabr_core::config::EngineConfig;
use autoabr_exec::{build_backend, AnalysisRequest, Analyzer};
use autoabr_io::readers::load_results;
use autoabr_io::writers::csv::ResultCsvWriter;
use autoabr_io::build_store_for;
use autoabr_ladder::{select_ladder, LadderPolicy, SelectionMode};
use autoabr_planner::load_job_file;

#[derive(Parser)]
#[command(name = "autoabr")]
#[command(about = "Perceptual ABR ladder analysis", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode and measure every candidate pair of a job, then select ladders
    Run {
        /// Path to the job YAML file
        #[arg(short, long)]
        job: PathBuf,

        /// Maximum pairs in flight (overrides config)
        #[arg(long)]
        max_parallel: Option<usize>,

        /// Process pairs and models one at a time
        #[arg(long)]
        no_concurrency: bool,

        /// Return every per-bitrate optimum instead of the pruned ladder
        #[arg(long)]
        include_all_bitrates: bool,
    },

    /// Select a ladder from quality results already on disk or in S3
    Suggest {
        /// Result directory or s3://bucket/prefix
        #[arg(short, long)]
        results: String,

        #[arg(long)]
        include_all_bitrates: bool,
    },

    /// Check a job file and its pipeline without running anything
    Validate {
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Show the candidate pairs and artifact names of a job (EXPLAIN)
    Explain {
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Write quality results as CSV
    ExportCsv {
        /// Result directory or s3://bucket/prefix
        #[arg(short, long)]
        results: String,

        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Flags that take precedence over the environment and the job file.
#[derive(Debug, Default, Clone, PartialEq)]
struct RunOverrides {
    max_parallel: Option<usize>,
    no_concurrency: bool,
    include_all_bitrates: bool,
}

fn apply_overrides(cfg: &mut EngineConfig, request: &mut AnalysisRequest, overrides: &RunOverrides) {
    if let Some(parallel) = overrides.max_parallel {
        cfg.max_parallel_pairs = Some(parallel.max(1));
    }
    if overrides.no_concurrency {
        request.concurrency = false;
    }
    if overrides.include_all_bitrates {
        request.selection = SelectionMode::IncludeAll;
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autoabr=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(e) = installed {
        eprintln!("warning: logging not initialised: {e}");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let outcome = match cli.command {
        Commands::Run {
            job,
            max_parallel,
            no_concurrency,
            include_all_bitrates,
        } => {
            let overrides = RunOverrides {
                max_parallel,
                no_concurrency,
                include_all_bitrates,
            };
            run_job(&job, &overrides).await
        }
        Commands::Suggest {
            results,
            include_all_bitrates,
        } => suggest(&results, include_all_bitrates).await,
        Commands::Validate { job } => validate_job(&job),
        Commands::Explain { job } => explain_job(&job),
        Commands::ExportCsv { results, output } => export_csv(&results, &output).await,
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_job(path: &Path, overrides: &RunOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let job = load_job_file(path)?;
    let mut config = EngineConfig::from_env();
    let mut request = AnalysisRequest::from_job(&job);
    apply_overrides(&mut config, &mut request, overrides);

    info!(job = %job.name, backend = job.backend.kind(), "starting analysis");
    let backend = build_backend(&job.backend, &job.encoding_profile, &config).await?;
    let report = Analyzer::new(backend, config).run(&request).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    eprintln!(
        "✓ {} pairs analysed ({} failed) in {}ms",
        report.manifest.pairs_total,
        report.manifest.pairs_failed,
        report.manifest.finished_ms.saturating_sub(report.manifest.started_ms)
    );
    Ok(())
}

async fn suggest(results: &str, include_all_bitrates: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env();
    let (store, prefix) = build_store_for(results, &config.storage_config())?;
    let loaded = load_results(&*store, &prefix).await?;
    let mode = if include_all_bitrates {
        SelectionMode::IncludeAll
    } else {
        SelectionMode::Pruned
    };
    if !loaded.rejected.is_empty() {
        warn!(results, rejected = loaded.rejected.len(), "some artifacts were not usable");
    }
    let ladder = select_ladder(&loaded.results, &LadderPolicy::default(), mode);
    info!(results, rungs = ladder.len(), "ladder selected");

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "results": loaded.results.len(),
            "rejected": loaded.rejected,
            "ladder": ladder,
        }))?
    );
    Ok(())
}

fn validate_job(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let job = load_job_file(path)?;
    println!(
        "✓ Job `{}` is valid ({} backend, {} candidate pairs, models: {})",
        job.name,
        job.backend.kind(),
        job.search.pairs().len(),
        job.models.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

fn explain_job(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let job = load_job_file(path)?;
    let request = AnalysisRequest::from_job(&job);
    let digest = request.search.digest()?;

    println!("Ladder Analysis Plan");
    println!("====================");
    println!();
    println!("Job: {}", job.name);
    println!("Backend: {}", job.backend.kind());
    println!("Reference: {}", job.reference);
    println!("Search hash: {}", digest.to_hex());
    println!("Concurrency: {}", if job.concurrency { "on" } else { "off" });
    println!("Skip transcode: {}", job.skip_transcode);
    println!();

    let planned = request.plan();
    println!("Candidate pairs ({}):", planned.len());
    for (i, p) in planned.iter().enumerate() {
        println!("  {}. {} ({})", i + 1, p.variant, p.pair);
        for (model, result) in &p.quality {
            println!("       {:<8} -> {}", model.as_str(), result);
        }
    }
    Ok(())
}

async fn export_csv(results: &str, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::from_env();
    let (store, prefix) = build_store_for(results, &config.storage_config())?;
    let loaded = load_results(&*store, &prefix).await?;

    let mut writer = ResultCsvWriter::to_path(&output.to_string_lossy())?;
    writer.write_all(&loaded.results)?;
    writer.finish()?;

    eprintln!(
        "✓ Wrote {} results to {} ({} rejected)",
        loaded.results.len(),
        output.display(),
        loaded.rejected.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoabr_core::{QualityModel, ResolutionTarget};
    use autoabr_planner::SearchSpace;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            name: "sintel".into(),
            reference: "ref.mp4".into(),
            models: vec![QualityModel::Hd],
            search: SearchSpace::new(vec![ResolutionTarget::new(1280, 720)], vec![1_000_000]),
            concurrency: true,
            skip_transcode: false,
            selection: SelectionMode::Pruned,
            policy: LadderPolicy::default(),
        }
    }

    #[test]
    fn flags_override_environment_and_job() {
        let mut cfg = EngineConfig {
            max_parallel_pairs: Some(16),
            ..EngineConfig::default()
        };
        let mut req = request();
        apply_overrides(
            &mut cfg,
            &mut req,
            &RunOverrides {
                max_parallel: Some(0),
                no_concurrency: true,
                include_all_bitrates: true,
            },
        );
        assert_eq!(cfg.max_parallel_pairs, Some(1));
        assert!(!req.concurrency);
        assert_eq!(req.selection, SelectionMode::IncludeAll);
    }

    #[test]
    fn absent_flags_keep_job_settings() {
        let mut cfg = EngineConfig::default();
        let mut req = request();
        apply_overrides(&mut cfg, &mut req, &RunOverrides::default());
        assert_eq!(cfg.max_parallel_pairs, None);
        assert!(req.concurrency);
        assert_eq!(req.selection, SelectionMode::Pruned);
    }

    #[test]
    fn explain_lists_variant_and_result_names() {
        let planned = request().plan();
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].variant, "sintel/1280x720_1000000.mp4");
        assert_eq!(planned[0].quality[0].1, "sintel/HD/1280x720_1000000_vmaf.json");
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from(["autoabr", "--log-json", "run", "--job", "job.yml", "--max-parallel", "4"]).unwrap();
        assert!(cli.log_json);
        match cli.command {
            Commands::Run { job, max_parallel, .. } => {
                assert_eq!(job, PathBuf::from("job.yml"));
                assert_eq!(max_parallel, Some(4));
            }
            _ => panic!("expected run"),
        }
    }
}
