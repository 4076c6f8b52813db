//! proofstack CLI.
//!
//! A thin shell over [`proofstack_engine`]: loads config and the specification
//! file, runs one command, prints a short report to stdout. Logs go to stderr
//! and, when it can be opened, `~/.proofstack/logs/proofstack.log`.

mod cli;

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use proofstack_cache::{CacheResult, ProofCache};
use proofstack_config::{OracleMode, ProofstackConfig, ResolvedSettings, config_path, load_spec};
use proofstack_engine::{
    CanonicalText, LeanRenderer, PipelineError, RunReport, RunRequest, canonicalize,
    orchestrator_from_settings,
};
use proofstack_types::{Algorithm, ToolchainVersion};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::cli::{BundleArgs, CacheCommand, Cli, Command, SpecArgs};

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_log_file();
    let file_layer = log_file.map(|(path, file)| {
        (
            path,
            fmt::layer().with_ansi(false).with_writer(Mutex::new(file)),
        )
    });
    let (log_path, file_layer) = match file_layer {
        Some((path, layer)) => (Some(path), Some(layer)),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .with(env_filter)
        .init();

    if let Some(path) = log_path {
        tracing::debug!(path = %path.display(), "Logging initialized");
    }
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: next to the config file
    if let Some(config_path) = config_path()
        && let Some(config_dir) = config_path.parent()
        && !config_dir.as_os_str().is_empty()
    {
        candidates.push(config_dir.join("logs").join("proofstack.log"));
    }

    // Fallback: ./.proofstack/logs/proofstack.log
    candidates.push(PathBuf::from(".proofstack").join("logs").join("proofstack.log"));

    candidates
}

fn load_settings() -> Result<ResolvedSettings> {
    let config = ProofstackConfig::load()
        .context("failed to load proofstack config")?
        .unwrap_or_default();
    ResolvedSettings::from_config(&config).context("invalid proofstack config")
}

fn parse_toolchain(value: Option<&str>, fallback: &ToolchainVersion) -> Result<ToolchainVersion> {
    match value {
        Some(v) => ToolchainVersion::new(v).context("invalid --toolchain"),
        None => Ok(fallback.clone()),
    }
}

/// `--algo`, then `[pipeline].algorithm`, then the spec file's own tag.
fn select_algorithm(
    flag: Option<Algorithm>,
    configured: Option<Algorithm>,
    from_spec: Algorithm,
) -> Algorithm {
    flag.or(configured).unwrap_or(from_spec)
}

/// The request every command derives from a spec file and its flags.
fn resolve_request(settings: &ResolvedSettings, args: &SpecArgs) -> Result<RunRequest> {
    let spec = load_spec(&args.spec)?;
    let algorithm = select_algorithm(args.algorithm, settings.algorithm, spec.algorithm);
    let toolchain = parse_toolchain(args.toolchain.as_deref(), &settings.toolchain_version)?;
    Ok(RunRequest::new(spec)
        .with_algorithm(algorithm)
        .with_toolchain(toolchain)
        .allow_cache_reuse(settings.allow_cache_reuse))
}

/// Canonical text and toolchain a `bundle` run would use for this spec file.
fn resolve_spec(
    settings: &ResolvedSettings,
    args: &SpecArgs,
) -> Result<(CanonicalText, ToolchainVersion)> {
    let request = resolve_request(settings, args)?;
    let canonical = canonicalize(&LeanRenderer, &request.spec, request.effective_algorithm());
    Ok((canonical, request.toolchain_version))
}

async fn bundle(mut settings: ResolvedSettings, args: BundleArgs) -> Result<()> {
    if args.mock {
        settings.oracle = OracleMode::Mock;
    }
    if args.stream {
        settings.streaming = true;
    }
    if let Some(out) = args.out {
        settings.output_dir = out;
    }

    let request = resolve_request(&settings, &args.target)?;
    let reuse = request.allow_cache_reuse && !args.no_cache_reuse;
    let request = request.allow_cache_reuse(reuse);
    let pipeline = orchestrator_from_settings(&settings).context("failed to set up pipeline")?;

    let (abort, run) = pipeline.run_abortable(request);
    let run = tokio::spawn(run);
    tokio::select! {
        result = run => {
            let report = result.context("pipeline task panicked")??;
            print_report(&report);
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            abort.abort();
            Err(PipelineError::Cancelled.into())
        }
    }
}

fn print_report(report: &RunReport) {
    println!("bundle:    {}", report.bundle.path.display());
    println!("cache:     {}", report.cache);
    println!("digest:    {}", report.digest);
    println!("algorithm: {}", report.algorithm);
    println!("toolchain: {}", report.toolchain);
    match report.artifact.degraded_reason() {
        Some(reason) => println!("proof:     DEGRADED ({reason})"),
        None => println!("proof:     {}", report.artifact.origin().as_str()),
    }
}

fn cache_clear(settings: &ResolvedSettings) -> Result<()> {
    let cache = ProofCache::new(&settings.cache)?;
    let removed = cache
        .clear()
        .with_context(|| format!("failed to clear {}", cache.dir().display()))?;
    println!("removed {removed} cached proof(s) from {}", cache.dir().display());
    Ok(())
}

fn cache_show(settings: &ResolvedSettings, args: &SpecArgs) -> Result<()> {
    let (canonical, toolchain) = resolve_spec(settings, args)?;
    let cache = ProofCache::new(&settings.cache)?;
    let key = canonical.cache_key(&toolchain);

    println!("key:   {key}");
    println!("path:  {}", cache.entry_path(&key).display());
    match cache.lookup(&key) {
        CacheResult::Hit(entry) => {
            println!("state: hit (stored {})", entry.created_at.to_rfc3339());
            println!("origin: {}", entry.artifact.origin().as_str());
            if let Some(reason) = entry.artifact.degraded_reason() {
                println!("degraded: {reason}");
            }
            println!();
            println!("{}", entry.artifact.proof());
        }
        CacheResult::Miss => println!("state: miss"),
        CacheResult::Corrupted(error) => println!("state: unreadable ({error})"),
    }
    Ok(())
}

fn fingerprint(settings: &ResolvedSettings, args: &SpecArgs) -> Result<()> {
    let (canonical, toolchain) = resolve_spec(settings, args)?;
    println!("{}", canonical.digest());
    println!("key: {}", canonical.cache_key(&toolchain));
    Ok(())
}

fn spec_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = load_settings()?;

    match cli.command {
        Command::Bundle(args) => {
            tracing::debug!(spec = %spec_label(&args.target.spec), "Running bundle");
            bundle(settings, args).await
        }
        Command::Cache(CacheCommand::Clear) => cache_clear(&settings),
        Command::Cache(CacheCommand::Show(args)) => cache_show(&settings, &args),
        Command::Fingerprint(args) => fingerprint(&settings, &args),
    }
}
