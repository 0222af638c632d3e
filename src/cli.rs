use crate::{
    config::Config,
    dataset::{self, CandidateRoster},
    pipeline::{Pipeline, StopSignal},
    report::{Report, RunSummary},
    sampler,
    services::{
        Credentials, openai::ChatExtractor, prep::PrepLocator, vision::DocumentIngestor,
        vision::VisionOcr,
    },
    util::{ensure_dir, hash_file, now_rfc3339, run_id},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "acta-audit")]
#[command(about = "Reproducible spot-audit of polling-station result sheets (sampling + OCR + LLM extraction)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./acta-audit.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show effective settings and which credential variables are set.
    Doctor {},
    /// Print row counts, headers and the first rows of the input tables.
    Inspect {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long, default_value_t = 5)]
        rows: usize,
    },
    /// Print the sample that a run would audit, without any network call.
    Sample {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    Run {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        roster: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Doctor {} => {
            let _guard = init_logging(&args, &cfg, None)?;
            doctor(&cfg)
        }
        Command::Inspect {
            input,
            roster,
            rows,
        } => {
            let _guard = init_logging(&args, &cfg, None)?;
            inspect(&cfg, input.as_deref(), roster.as_deref(), *rows)
        }
        Command::Sample { input, size, seed } => {
            let _guard = init_logging(&args, &cfg, None)?;
            sample(&cfg, input.as_deref(), *size, *seed)
        }
        Command::Run {
            input,
            roster,
            out_dir,
            size,
            seed,
        } => {
            let mut cfg = cfg;
            if let Some(size) = size {
                cfg.sampling.size = *size;
            }
            if let Some(seed) = seed {
                cfg.sampling.seed = *seed;
            }
            run(
                &args,
                &cfg,
                input.as_deref(),
                roster.as_deref(),
                out_dir.as_deref(),
            )
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["acta-audit.toml", "acta-audit.example.toml"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let present = |name: &str| std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
    let mut credentials = serde_json::Map::new();
    for name in [&cfg.ocr.api_key_env, &cfg.extractor.api_key_env] {
        credentials.insert(name.clone(), present(name).into());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "dataset": {
                "path": cfg.paths.dataset,
                "entity_column": cfg.dataset.entity_column,
                "section_column": cfg.dataset.section_column,
            },
            "roster": cfg.paths.roster,
            "sampling": cfg.sampling,
            "locator": cfg.locator.url_template,
            "ocr_endpoint": cfg.ocr.endpoint,
            "extractor": {
                "endpoint": crate::services::openai::completions_endpoint(&cfg.extractor.base_url),
                "model": cfg.extractor.model,
            },
            "max_parallel_records": cfg.global.max_parallel_records,
            "credentials": credentials,
        }))?
    );
    Ok(())
}

fn inspect(cfg: &Config, input: Option<&Path>, roster: Option<&Path>, rows: usize) -> Result<()> {
    let input = input_path(cfg, input);
    let table = dataset::read_table(&input, cfg.dataset.delimiter)?;
    let records = dataset::records_from_table(cfg, &table)
        .map_err(|details| anyhow!("dataset {}: {details}", input.display()))?;

    let mut out = serde_json::json!({
        "dataset": {
            "path": input,
            "rows": table.rows.len(),
            "distinct_records": records.len(),
            "headers": table.headers,
            "head": table.preview(rows),
        }
    });

    if let Some(path) = roster {
        let roster = CandidateRoster::load(cfg, path)?;
        out["roster"] = serde_json::json!({
            "path": path,
            "rows": roster.len(),
            "headers": roster.table.headers,
            "head": roster.table.preview(rows),
        });
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn sample(cfg: &Config, input: Option<&Path>, size: Option<usize>, seed: Option<u64>) -> Result<()> {
    let input = input_path(cfg, input);
    let records = dataset::load_records(cfg, &input)?;
    let size = size.unwrap_or(cfg.sampling.size);
    let seed = seed.unwrap_or(cfg.sampling.seed);
    let sample = sampler::sample(&records, size, seed)?;

    let keys: Vec<_> = sample
        .keys()
        .enumerate()
        .map(|(i, k)| serde_json::json!({"position": i, "entity": k.entity, "section": k.section}))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "size": size,
            "seed": seed,
            "drawn": sample.len(),
            "records": keys,
        }))?
    );
    Ok(())
}

fn run(
    args: &Args,
    cfg: &Config,
    input: Option<&Path>,
    roster_override: Option<&Path>,
    out_override: Option<&Path>,
) -> Result<()> {
    // Nothing runs without both keys.
    let creds = Credentials::from_env(cfg)?;

    let out_dir = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    ensure_dir(&out_dir)?;

    let log_path = resolve_log_path(cfg, &out_dir);
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    let input = input_path(cfg, input);
    let records = dataset::load_records(cfg, &input)?;
    let roster = load_roster(cfg, roster_override)?;

    let sample = sampler::sample(&records, cfg.sampling.size, cfg.sampling.seed)?;
    info!(
        "sampled {} of {} records (size={} seed={})",
        sample.len(),
        records.len(),
        cfg.sampling.size,
        cfg.sampling.seed
    );

    let dataset_hash =
        hash_file(&input).with_context(|| format!("hashing dataset: {}", input.display()))?;
    let run_id = run_id(
        &cfg.normalized_for_hash(),
        &dataset_hash,
        cfg.sampling.size,
        cfg.sampling.seed,
    );
    info!("run_id={run_id} out={}", out_dir.display());

    if cfg.output.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(out_dir.join("effective-config.toml"), raw)?;
    }

    let locator = PrepLocator::new(cfg)?;
    let ingestor = DocumentIngestor::new(cfg, VisionOcr::new(cfg, &creds.ocr_key)?)?;
    let extractor = ChatExtractor::new(cfg, &creds.extractor_key)?;
    let pipeline = Pipeline::new(cfg, locator, ingestor, extractor);
    let stop = StopSignal::from_config(cfg);

    let started = now_rfc3339();
    let output = pipeline.run(&sample, &stop);
    let report = Report::aggregate(output.outcomes, output.pending);

    let report_path = out_dir.join(&cfg.output.report_filename);
    report.persist(&report_path)?;
    info!(
        "report written: {} rows={} successes={} failures={}",
        report_path.display(),
        report.outcomes.len(),
        report.successes(),
        report.failures()
    );

    let summary = RunSummary {
        run_id,
        job_name: cfg.global.job_name.clone(),
        started,
        finished: now_rfc3339(),
        sample_size: sample.len(),
        seed: cfg.sampling.seed,
        attempted: report.outcomes.len(),
        successes: report.successes(),
        failures: report.failures(),
        failures_by_stage: report.failures_by_stage(),
        failures_by_kind: report.failures_by_kind(),
        pending: report.pending,
        stopped_early: output.stopped_early,
        roster_rows: roster.as_ref().map(CandidateRoster::len),
        report: report_path.display().to_string(),
    };

    if cfg.output.write_summary_json {
        std::fs::write(
            out_dir.join(&cfg.output.summary_filename),
            serde_json::to_string_pretty(&summary)?,
        )?;
    }

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn input_path(cfg: &Config, input: Option<&Path>) -> PathBuf {
    input
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.dataset))
}

/// The roster only feeds the summary, so a missing default file is not fatal.
fn load_roster(cfg: &Config, user: Option<&Path>) -> Result<Option<CandidateRoster>> {
    if let Some(path) = user {
        return Ok(Some(CandidateRoster::load(cfg, path)?));
    }
    let path = PathBuf::from(&cfg.paths.roster);
    if !path.exists() {
        warn!("roster not found, skipping: {}", path.display());
        return Ok(None);
    }
    Ok(Some(CandidateRoster::load(cfg, &path)?))
}

fn resolve_log_path(cfg: &Config, out_dir: &Path) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(out_dir.join("logs").join("acta-audit.log"))
}
