//! Batch generator CLI.
//!
//! Usage:
//!   ttsgen generate SENTENCES_AUDIO_BATCH.json --backend gtts
//!   ttsgen generate manifest.json --backend elevenlabs --voice lisa --difficulty 1
//!   ttsgen plan manifest.json --output-dir Audio/sentences
//!   ttsgen backends
//!
//! Settings are layered: built-in defaults, then `--config FILE`, then
//! `TTS_*` environment variables, then command-line flags.
//!
//! Exit status is 0 when every entry was generated or skipped, 1 when any
//! entry failed, and 2 when the run could not start (missing credential,
//! unreadable manifest, bad configuration).

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ttsgen::{BackendKind, Generator, GeneratorConfig, Manifest, Plan};

#[derive(Parser)]
#[command(name = "ttsgen", version, about = "Resumable batch text-to-speech generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate every missing clip in a manifest
    Generate {
        /// Manifest JSON file
        manifest: PathBuf,

        #[command(flatten)]
        opts: RunOpts,

        /// Write the run summary as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Show what `generate` would do without calling any backend
    Plan {
        /// Manifest JSON file
        manifest: PathBuf,

        #[command(flatten)]
        opts: RunOpts,
    },
    /// List the available backends
    Backends,
}

#[derive(Args)]
struct RunOpts {
    /// JSON config file (flags and TTS_* variables override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Speech backend: elevenlabs, google, gtts or playht
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// API key for the selected backend (or TTS_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Provider-specific voice name
    #[arg(short, long)]
    voice: Option<String>,

    /// Entries per pacing window
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between windows, in seconds
    #[arg(long)]
    pause_seconds: Option<f64>,

    /// Root directory for generated clips
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Only process entries of this difficulty tier
    #[arg(short, long)]
    difficulty: Option<u32>,

    /// Retries for rate-limited or unavailable backend responses
    #[arg(long)]
    max_retries: Option<u32>,

    /// Keep payloads that cannot be converted under their own extension
    #[arg(long)]
    raw_fallback: bool,

    /// Regenerate clips that are entirely silent
    #[arg(long)]
    replace_silent: bool,
}

impl RunOpts {
    fn resolve(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_file(path)?,
            None => GeneratorConfig::default(),
        };
        config.apply_env()?;

        if let Some(b) = self.backend {
            config.backend = b;
        }
        if let Some(k) = &self.api_key {
            config.api_key = Some(k.clone());
        }
        if let Some(v) = &self.voice {
            config.voice_hint = Some(v.clone());
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(s) = self.pause_seconds {
            config.pause_seconds = s;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        config.raw_fallback |= self.raw_fallback;
        config.replace_silent |= self.replace_silent;
        Ok(config)
    }
}

fn load_manifest(path: &Path, difficulty: Option<u32>) -> Result<Manifest> {
    let manifest = Manifest::load(path)?;
    Ok(match difficulty {
        Some(tier) => manifest.filter_difficulty(tier),
        None => manifest,
    })
}

fn generate(manifest_path: &Path, opts: &RunOpts, report: Option<&Path>) -> Result<ExitCode> {
    let config = opts.resolve()?;
    // Credentials are checked before the manifest is read.
    let generator = Generator::from_config(&config)?;
    let manifest = load_manifest(manifest_path, opts.difficulty)?;
    generator.prepare_output_root()?;

    let summary = generator.run(&manifest);
    println!("{summary}");

    if let Some(path) = report {
        let json = summary.to_json()?;
        std::fs::write(path, json).with_context(|| format!("Cannot write report: {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }

    Ok(if summary.is_success() { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

fn plan(manifest_path: &Path, opts: &RunOpts) -> Result<ExitCode> {
    let config = opts.resolve()?;
    let manifest = load_manifest(manifest_path, opts.difficulty)?;

    let plan = Plan::from_config(&config, &manifest)?;
    println!("Backend     : {}", config.backend);
    println!("Output dir  : {}", config.output_dir.display());
    println!("Entries     : {}", plan.total);
    println!("Existing    : {}", plan.existing);
    println!("To generate : {}", plan.to_generate.len());
    println!(
        "Pauses      : {} x {:.1}s",
        plan.expected_pauses,
        config.pause_seconds
    );
    for file in &plan.to_generate {
        println!("  {file}");
    }
    Ok(ExitCode::SUCCESS)
}

fn list_backends() {
    for kind in BackendKind::ALL {
        let key = if kind.requires_api_key() { "API key" } else { "no key" };
        println!("{:<12} {:<8} {}", kind.as_str(), key, kind.description());
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Generate { manifest, opts, report } => generate(manifest, opts, report.as_deref()),
        Command::Plan { manifest, opts } => plan(manifest, opts),
        Command::Backends => {
            list_backends();
            Ok(ExitCode::SUCCESS)
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}
