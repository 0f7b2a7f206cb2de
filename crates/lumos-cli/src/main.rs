//! lumos: redemption code operator tool
//!
//! Commands:
//!   generate [--count N]   - issue a batch, rewrite the registry and key-index artifact
//!   verify <CODE>          - resolve a code to its identifier and key index
//!   publish                - rewrite only the key-index artifact
//!   config show            - display the effective configuration
//!
//! Intended for a single operator at a time: `generate` reads the whole
//! registry, extends it, and overwrites it with no locking.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use lumos_codes::{
    backup_unreadable, generate_batch, planned_identifiers, publish, render_typescript,
    write_artifact, KeyRing, LoadOutcome, Registry, Rejection, Verdict, Verifier, MAX_BATCH_SIZE,
};
use lumos_core::config::{LogFormat, LumosConfig};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lumos",
    version,
    about = "Lumos redemption codes",
    long_about = "lumos: issue redemption codes from a small key ring and verify them without a lookup table"
)]
struct Cli {
    /// Path to lumos.toml configuration file
    #[arg(long, short = 'c', env = "LUMOS_CONFIG", default_value = "lumos.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "LUMOS_LOG")]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Issue a batch of new codes
    ///
    /// Without --count, asks interactively. A blank or non-numeric answer
    /// falls back to generate.default_count.
    Generate {
        /// Number of codes to issue
        #[arg(long, short = 'n', value_parser = clap::value_parser!(u64).range(1..=MAX_BATCH_SIZE))]
        count: Option<u64>,
    },

    /// Verify a code against the key ring
    Verify {
        /// Code text, e.g. LUMOS-ABCDEFGH
        code: String,
        /// Highest identifier to search (overrides verify.bound)
        #[arg(long, short = 'b')]
        bound: Option<u64>,
        /// Abort the search after this many seconds (overrides verify.timeout_secs)
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Scan on a single thread
        #[arg(long)]
        sequential: bool,
    },

    /// Rewrite the key-index artifact without issuing codes
    Publish,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, config.logging.format);

    match cli.command {
        Commands::Generate { count } => {
            let stdin = std::io::stdin();
            run_generate(&config, count, &mut stdin.lock(), &mut std::io::stdout())
        }
        Commands::Verify {
            code,
            bound,
            timeout_secs,
            sequential,
        } => cmd_verify(&config, &code, bound, timeout_secs, sequential),
        Commands::Publish => cmd_publish(&config),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

// ── Config, logging, key ring ─────────────────────────────────────────────────

fn load_config(path: &Path) -> Result<LumosConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(LumosConfig::default())
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn load_ring(config: &LumosConfig) -> Result<KeyRing> {
    match &config.keys.file {
        Some(path) => KeyRing::load_json(path),
        None => Ok(KeyRing::builtin()),
    }
}

fn build_verifier<'r>(
    config: &LumosConfig,
    ring: &'r KeyRing,
    bound: u64,
    timeout_secs: Option<u64>,
    parallel: bool,
) -> Verifier<'r> {
    let verifier = Verifier::new(ring, bound).parallel(parallel);
    match timeout_secs.or(config.verify.timeout_secs) {
        Some(secs) => verifier.timeout(Duration::from_secs(secs)),
        None => verifier,
    }
}

// ── Prompt helpers ────────────────────────────────────────────────────────────

/// Positive integer from `input`, otherwise `default`.
fn parse_count(input: &str, default: u64) -> u64 {
    match input.trim().parse::<u64>() {
        Ok(n) if n > 0 => n,
        _ => default,
    }
}

fn prompt_count(default: u64, input: &mut impl BufRead, out: &mut impl Write) -> Result<u64> {
    write!(out, "How many new codes? (default {default}): ")?;
    out.flush().context("flushing prompt")?;

    let mut line = String::new();
    input.read_line(&mut line).context("reading batch size")?;
    Ok(parse_count(&line, default))
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn describe(verdict: &Verdict, bound: u64) -> String {
    match verdict {
        Verdict::Valid {
            identifier,
            key_index,
        } => format!("valid (identifier #{identifier}, key index {key_index})"),
        Verdict::Invalid(Rejection::NoMatch) => {
            format!("invalid ({}, bound {bound})", Rejection::NoMatch)
        }
        Verdict::Invalid(reason) => format!("invalid ({reason})"),
    }
}

// ── `lumos generate` ──────────────────────────────────────────────────────────

fn run_generate(
    config: &LumosConfig,
    count: Option<u64>,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<()> {
    let ring = load_ring(config)?;
    let registry_path = &config.registry.path;

    let (registry, outcome) = Registry::load(registry_path);
    if let LoadOutcome::Recovered(reason) = &outcome {
        writeln!(out, "warning: registry {} unusable ({reason})", registry_path.display())?;
        match backup_unreadable(registry_path) {
            Ok(backup) => writeln!(out, "         copied to {}", backup.display())?,
            Err(e) => {
                warn!("registry backup failed: {e:#}");
                writeln!(out, "         backup failed ({e:#})")?;
            }
        }
        writeln!(out, "         starting empty")?;
    }

    writeln!(out, "Existing codes:  {}", registry.len())?;
    let next_id = registry.next_identifier()?;
    writeln!(out, "Next identifier: #{next_id}")?;

    let count = match count {
        Some(n) => n,
        None => prompt_count(config.generate.default_count, input, out)?,
    };
    let planned = planned_identifiers(&registry, count)?;
    writeln!(
        out,
        "Generating {count} new codes (#{} - #{})...",
        planned.start,
        planned.end - 1
    )?;

    let batch = generate_batch(count, registry, &ring)?;
    batch.check_collisions(config.generate.collision_policy)?;

    batch.registry.save(registry_path)?;
    let table = publish(&ring);
    let artifact = render_typescript(&table, &ring, config.publish.include_raw_keys);
    write_artifact(&config.publish.path, &artifact)?;

    writeln!(out)?;
    writeln!(out, "Done:")?;
    writeln!(out, "  total codes:  {}", batch.registry.len())?;
    if let Some(ids) = batch.identifiers() {
        writeln!(
            out,
            "  new codes:    {} (#{} - #{})",
            batch.records.len(),
            ids.start(),
            ids.end()
        )?;
    }
    writeln!(out, "  collisions:   {}", batch.collisions.len())?;
    writeln!(out, "  registry:     {} (keep secret)", registry_path.display())?;
    writeln!(
        out,
        "  key index:    {} ({} hashes)",
        config.publish.path.display(),
        table.len()
    )?;

    writeln!(out)?;
    writeln!(out, "New codes:")?;
    let sample = config.generate.sample_size;
    for record in batch.records.iter().take(sample) {
        writeln!(out, "  #{:>3}: {}", record.identifier, record.code)?;
    }
    if batch.records.len() > sample {
        writeln!(out, "  ... and {} more", batch.records.len() - sample)?;
    }

    let Some(first) = batch.records.first() else {
        return Ok(());
    };

    writeln!(out)?;
    writeln!(out, "Self-check:")?;
    let bound = config.verify.bound;
    let verifier = build_verifier(config, &ring, bound, None, config.verify.parallel);
    let spinner = make_spinner("verify");
    spinner.set_message(first.code.clone());
    let verdict = verifier.verify(&first.code);
    spinner.finish_and_clear();

    writeln!(out, "  code:   {}", first.code)?;
    writeln!(out, "  result: {}", describe(&verdict, bound))?;
    if !verdict.is_valid() && first.identifier > bound {
        writeln!(
            out,
            "  note:   identifier #{} is above verify.bound ({bound}); such codes never verify",
            first.identifier
        )?;
    }
    info!(code = %first.code, valid = verdict.is_valid(), "self-check");

    Ok(())
}

// ── `lumos verify` ────────────────────────────────────────────────────────────

fn cmd_verify(
    config: &LumosConfig,
    code: &str,
    bound: Option<u64>,
    timeout_secs: Option<u64>,
    sequential: bool,
) -> Result<()> {
    let ring = load_ring(config)?;
    let bound = bound.unwrap_or(config.verify.bound);
    let parallel = config.verify.parallel && !sequential;
    let verifier = build_verifier(config, &ring, bound, timeout_secs, parallel);

    let spinner = make_spinner("verify");
    spinner.set_message(format!("{} keys × {bound} identifiers", ring.len()));
    let verdict = verifier.verify(code);
    spinner.finish_and_clear();

    println!("Code:   {code}");
    println!("Result: {}", describe(&verdict, bound));

    // Cross-check against the registry when one is present.
    if config.registry.path.exists() {
        let (registry, _) = Registry::load(&config.registry.path);
        match registry.find_code(code) {
            Some(record) => println!(
                "Registry: issued for #{} with key index {}",
                record.identifier, record.key_index
            ),
            None => println!("Registry: not found in {}", config.registry.path.display()),
        }
    }

    Ok(())
}

// ── `lumos publish` ───────────────────────────────────────────────────────────

fn cmd_publish(config: &LumosConfig) -> Result<()> {
    let ring = load_ring(config)?;
    let table = publish(&ring);
    let artifact = render_typescript(&table, &ring, config.publish.include_raw_keys);
    write_artifact(&config.publish.path, &artifact)?;

    println!(
        "Wrote {} ({} hashes{})",
        config.publish.path.display(),
        table.len(),
        if config.publish.include_raw_keys {
            ", raw keys included"
        } else {
            ""
        }
    );
    Ok(())
}

// ── `lumos config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &LumosConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config")?;
    print!("{rendered}");
    Ok(())
}
