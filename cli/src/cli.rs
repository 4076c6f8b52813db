//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use proofstack_types::Algorithm;

#[derive(Debug, Parser)]
#[command(name = "proofstack")]
#[command(about = "Produce and reuse cached formal proofs for RL safety specifications")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline and publish an attestation bundle
    Bundle(BundleArgs),

    /// Inspect or clear the proof cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Print the digest and cache key of a specification
    Fingerprint(SpecArgs),
}

#[derive(Debug, clap::Args)]
pub(crate) struct BundleArgs {
    #[command(flatten)]
    pub(crate) target: SpecArgs,

    /// Always call the oracle; the result is still cached
    #[arg(long)]
    pub(crate) no_cache_reuse: bool,

    /// Use the offline mock oracle
    #[arg(long)]
    pub(crate) mock: bool,

    /// Stream the oracle response
    #[arg(long)]
    pub(crate) stream: bool,

    /// Bundle output directory
    #[arg(long)]
    pub(crate) out: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub(crate) struct SpecArgs {
    /// Specification file (.toml or .json)
    pub(crate) spec: PathBuf,

    /// Target algorithm; overrides the specification and config
    #[arg(long = "algo", value_parser = parse_algorithm)]
    pub(crate) algorithm: Option<Algorithm>,

    /// Pin the verification toolchain version
    #[arg(long)]
    pub(crate) toolchain: Option<String>,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CacheCommand {
    /// Remove every cached proof
    Clear,
    /// Show the cache entry a specification would use
    Show(SpecArgs),
}

fn parse_algorithm(value: &str) -> Result<Algorithm, String> {
    Algorithm::parse(value).map_err(|e| e.to_string())
}
