//! Sleuthgraph CLI
//!
//! - Generating mysteries into the persisted layout (`generate`)
//! - Reading a persisted mystery (`inspect`)
//! - Certifying it against a text-generation oracle (`validate`)
//! - Publishing it to an entity store (`publish`)
//! - Computing and registering its commitment (`commitment`)

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use sleuthgraph_core::{Commitment, GeneratorConfig, Mystery, MysteryForge};
use sleuthgraph_storage::{
    illustrate, DirEntityStore, JournalRegistrar, MysteryDir, PlaceholderCards, PublishOutcome,
    Publisher, Registrar,
};
use sleuthgraph_validate::{build_oracle, AntiAutomationValidator, Backend, OracleConfig, OracleOverrides};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sleuthgraph")]
#[command(author, version, about = "Sleuthgraph: procedurally generated investigation mysteries")]
struct Cli {
    /// Log filter (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate mysteries into `<out>/<mystery_id>/`.
    Generate(GenerateArgs),

    /// Print a persisted mystery.
    Inspect {
        dir: PathBuf,
        /// Also print the proof tree and the answer.
        #[arg(long)]
        reveal: bool,
    },

    /// Run the anti-automation validator against an oracle.
    Validate(ValidateArgs),

    /// Push a persisted mystery to a directory-backed entity store.
    Publish {
        dir: PathBuf,
        #[arg(long)]
        store_dir: PathBuf,
    },

    /// Print the commitment for a persisted mystery, optionally registering it.
    Commitment {
        dir: PathBuf,
        /// Append the commitment to this JSON-lines journal.
        #[arg(long)]
        journal: Option<PathBuf>,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// First seed; defaults to the current time.
    #[arg(long)]
    seed: Option<u64>,

    /// TOML generator configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "mysteries")]
    out: PathBuf,

    /// Number of mysteries, seeded `seed`, `seed + 1`, ...
    #[arg(long, default_value_t = 1)]
    count: u64,

    /// Render placeholder illustrations for planned images.
    #[arg(long)]
    illustrate: bool,
}

#[derive(Args)]
struct ValidateArgs {
    dir: PathBuf,

    #[arg(long, value_parser = parse_backend)]
    backend: Option<Backend>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    base_url: Option<String>,

    /// Per-request timeout; 0 disables.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the validation result as JSON.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn parse_backend(s: &str) -> Result<Backend, String> {
    s.parse().map_err(|e: sleuthgraph_validate::ConfigError| e.to_string())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Generate(args) => cmd_generate(&args),
        Commands::Inspect { dir, reveal } => cmd_inspect(&dir, reveal),
        Commands::Validate(args) => cmd_validate(&args),
        Commands::Publish { dir, store_dir } => cmd_publish(&dir, &store_dir),
        Commands::Commitment { dir, journal } => cmd_commitment(&dir, journal.as_deref()),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<GeneratorConfig> {
    let Some(path) = path else {
        return Ok(GeneratorConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let config: GeneratorConfig =
        toml::from_str(&text).with_context(|| format!("invalid generator config {}", path.display()))?;
    debug!(path = %path.display(), "generator config loaded");
    Ok(config)
}

fn load_mystery(dir: &Path) -> Result<(MysteryDir, Mystery)> {
    let layout = MysteryDir::open(dir);
    let mystery = layout
        .load()
        .with_context(|| format!("failed to load mystery from {}", dir.display()))?;
    Ok((layout, mystery))
}

fn cmd_generate(args: &GenerateArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let forge = MysteryForge::new(config).context("invalid generator config")?;
    let now = chrono::Utc::now();
    let first_seed = args.seed.unwrap_or_else(|| now.timestamp_micros() as u64);

    for offset in 0..args.count {
        let seed = first_seed.wrapping_add(offset);
        let mystery = forge
            .generate(seed, now.timestamp())
            .with_context(|| format!("generation failed for seed {seed}"))?;
        let layout = MysteryDir::write(&args.out, &mystery)
            .with_context(|| format!("failed to write mystery under {}", args.out.display()))?;

        if args.illustrate {
            let report = illustrate(&PlaceholderCards::default(), &layout, &mystery);
            info!(
                generated = report.generated.len(),
                failed = report.failed.len(),
                "illustrations rendered"
            );
        }

        eprintln!(
            "{} {} (seed {seed}, {} documents, {} hops, difficulty {})",
            "wrote".green().bold(),
            layout.path().display().to_string().bold(),
            mystery.documents().len(),
            mystery.proof_tree().total_hops,
            mystery.metadata().difficulty,
        );
        println!("{}", mystery.id());
    }
    Ok(())
}

fn cmd_inspect(dir: &Path, reveal: bool) -> Result<()> {
    let (_, mystery) = load_mystery(dir)?;
    let meta = mystery.metadata();
    println!("{} {}", "mystery".bold(), meta.mystery_id);
    println!("  question:   {}", meta.question);
    println!("  difficulty: {}", meta.difficulty);
    println!("  documents:  {}", meta.total_documents);
    println!("  images:     {}", meta.total_images);
    println!("  expires in: {}s", meta.expires_in);
    println!();
    for doc in mystery.documents() {
        let kind = if doc.document_type().is_narrative() {
            "narrative".normal()
        } else {
            "technical".cyan()
        };
        println!("  {}  {:<22} {}", doc.id(), doc.document_type().as_str(), kind);
    }

    if reveal {
        println!();
        println!("{}", "proof tree".bold());
        for hop in &mystery.proof_tree().hops {
            let cites: Vec<&str> = hop.supporting_document_ids.iter().map(|d| d.as_str()).collect();
            println!("  {}. {}", hop.step_number, hop.sub_question);
            println!("     => {}  [{}]", hop.expected_inference.green(), cites.join(", "));
        }
        println!("{} {}", "answer:".bold(), mystery.answer().green().bold());
    }
    Ok(())
}

fn cmd_validate(args: &ValidateArgs) -> Result<()> {
    let (_, mystery) = load_mystery(&args.dir)?;
    let config = OracleConfig::resolve(&OracleOverrides {
        backend: args.backend,
        model: args.model.clone(),
        base_url: args.base_url.clone(),
        timeout_secs: args.timeout_secs,
    })?;
    info!(backend = %config.backend, model = %config.model, "oracle configured");
    let oracle = build_oracle(&config)?;

    let result = AntiAutomationValidator::new(oracle.as_ref()).validate(&mystery);
    print!("{}", result.summary());

    if let Some(out) = &args.out {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(out, json).with_context(|| format!("failed to write {}", out.display()))?;
        eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    }

    if result.is_valid {
        eprintln!("{} {}", "valid".green().bold(), result.reason);
        Ok(())
    } else {
        bail!("mystery {} failed validation: {}", mystery.id(), result.reason)
    }
}

fn cmd_publish(dir: &Path, store_dir: &Path) -> Result<()> {
    let (layout, mystery) = load_mystery(dir)?;
    let store = DirEntityStore::open(store_dir)
        .with_context(|| format!("failed to open entity store {}", store_dir.display()))?;

    match Publisher::new(&store).publish(&layout, &mystery)? {
        PublishOutcome::Verified(report) => {
            eprintln!(
                "{} {} entities ({} documents, {} images)",
                "published".green().bold(),
                report.entity_keys.len(),
                report.document_entities,
                report.image_entities,
            );
            for key in &report.entity_keys {
                println!("{key}");
            }
            Ok(())
        }
        PublishOutcome::Unverified { report, reason } => Err(anyhow!(
            "pushed {} entities but verification failed: {reason}",
            report.entity_keys.len()
        )),
    }
}

fn cmd_commitment(dir: &Path, journal: Option<&Path>) -> Result<()> {
    let (_, mystery) = load_mystery(dir)?;
    let commitment = Commitment::for_mystery(&mystery);
    println!("{}", serde_json::to_string_pretty(&commitment)?);

    if let Some(path) = journal {
        let receipt = JournalRegistrar::open(path)
            .register(&commitment)
            .with_context(|| format!("failed to register in {}", path.display()))?;
        eprintln!("{} {}", "registered".green().bold(), receipt.reference);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn validate_flags_parse() {
        let cli = Cli::try_parse_from([
            "sleuthgraph",
            "validate",
            "mysteries/abc",
            "--backend",
            "ollama",
            "--timeout-secs",
            "0",
        ])
        .unwrap();
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.backend, Some(Backend::Ollama));
                assert_eq!(args.timeout_secs, Some(0));
            }
            _ => panic!("expected validate"),
        }
        assert!(Cli::try_parse_from(["sleuthgraph", "validate", "x", "--backend", "bard"]).is_err());
    }

    #[test]
    fn toml_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.toml");
        fs::write(
            &path,
            "difficulty = 7\n\n[graph]\nspine_subgraphs = 4\n\n[graph.category_weights]\nnetwork = 5\n",
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.difficulty, Some(7));
        assert_eq!(config.graph.spine_subgraphs, 4);
        assert_eq!(config.graph.category_weights.len(), 1);
        assert_eq!(config.synthesis, GeneratorConfig::default().synthesis);
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.toml");
        fs::write(&path, "[graph]\nspines = 4\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
