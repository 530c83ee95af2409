//! Console entry point.
mod console;

use anyhow::{Context, Result};
use cardshifter_core::{RuleSet, Session};
use cardshifter_modding::{compiled_backends, LuaRuleSet, ModRegistry};
use clap::Parser;
use console::ConsoleController;
use std::io;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "cardshifter")]
#[command(about = "Play a Cardshifter rule-set on the console", long_about = None)]
#[command(version)]
struct Cli {
    /// Lua rule-set file to play instead of a registry mod
    #[arg(long, value_name = "PATH", conflicts_with = "mod_name")]
    script: Option<PathBuf>,

    /// Registry mod to play (Skirmish when Lua is compiled in, else Vanilla)
    #[arg(long = "mod", value_name = "NAME")]
    mod_name: Option<String>,

    /// Seed for shuffles and the AI; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Directory holding one subdirectory per external mod
    #[arg(long, value_name = "DIR", env = "CARDSHIFTER_MODS")]
    mods_dir: Option<PathBuf>,

    /// AI controlling every player except the first
    #[arg(long, value_name = "NAME")]
    ai: Option<String>,

    /// Print the available rule-sets and AIs, then exit
    #[arg(long)]
    list_mods: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut registry = ModRegistry::new();
    match cli.mods_dir.clone().or_else(ModRegistry::default_mod_location) {
        Some(dir) => {
            registry.load_external(&dir);
        }
        None => warn!("no home directory, skipping external mods"),
    }

    if cli.list_mods {
        println!("Rule-sets:");
        for name in registry.available_mods() {
            println!("  {}", name);
        }
        println!("AIs:");
        for name in registry.ais() {
            println!("  {}", name);
        }
        println!("Script backends: {}", compiled_backends().join(", "));
        return Ok(());
    }

    let ruleset = select_ruleset(&cli, &registry)?;
    let seed = cli.seed.unwrap_or_else(rand::random);

    let ai = match &cli.ai {
        Some(name) => Some(
            registry
                .ai(name, seed)
                .with_context(|| format!("unknown AI '{}'", name))?,
        ),
        None => None,
    };

    let mut session = Session::new(ruleset, seed).context("failed to set up the rule-set")?;
    session.start().context("failed to start the game")?;
    info!(ruleset = session.ruleset().name(), seed, "session started");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = ConsoleController::new(session, stdin.lock(), stdout.lock());
    if let Some(ai) = ai {
        console = console.with_ai(ai);
    }
    console.play().context("console i/o failed")?;
    Ok(())
}

fn select_ruleset(cli: &Cli, registry: &ModRegistry) -> Result<Box<dyn RuleSet>> {
    if let Some(path) = &cli.script {
        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("script")
            .to_string();
        let rules = LuaRuleSet::from_file(name, path)
            .with_context(|| format!("failed to load script {}", path.display()))?;
        return Ok(Box::new(rules));
    }
    let name = cli
        .mod_name
        .clone()
        .unwrap_or_else(|| default_mod(registry).to_string());
    registry
        .instantiate(&name)
        .with_context(|| format!("mod '{}' is not available", name))
}

fn default_mod(registry: &ModRegistry) -> &'static str {
    if registry.contains("Skirmish") {
        "Skirmish"
    } else {
        "Vanilla"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_flag() {
        let cli = Cli::try_parse_from([
            "cardshifter",
            "--mod",
            "Vanilla",
            "--seed",
            "42",
            "--mods-dir",
            "/tmp/mods",
            "--ai",
            "Idiot",
        ])
        .expect("valid flags");
        assert_eq!(cli.mod_name.as_deref(), Some("Vanilla"));
        assert_eq!(cli.seed, Some(42));
        assert_eq!(cli.mods_dir, Some(PathBuf::from("/tmp/mods")));
        assert_eq!(cli.ai.as_deref(), Some("Idiot"));
        assert!(!cli.list_mods);
    }

    #[test]
    fn rejects_malformed_seed() {
        assert!(Cli::try_parse_from(["cardshifter", "--seed", "many"]).is_err());
    }

    #[test]
    fn script_conflicts_with_mod() {
        assert!(
            Cli::try_parse_from(["cardshifter", "--script", "a.lua", "--mod", "Vanilla"]).is_err()
        );
    }

    #[test]
    fn default_mod_prefers_skirmish() {
        assert_eq!(default_mod(&ModRegistry::new()), "Skirmish");
        assert_eq!(default_mod(&ModRegistry::empty()), "Vanilla");
    }

    #[test]
    fn unknown_mod_is_a_startup_error() {
        let cli = Cli::try_parse_from(["cardshifter", "--mod", "Nope"]).expect("flags");
        assert!(select_ruleset(&cli, &ModRegistry::new()).is_err());
    }

    #[test]
    fn named_mod_is_instantiated() {
        let cli = Cli::try_parse_from(["cardshifter", "--mod", "Vanilla"]).expect("flags");
        let rules = select_ruleset(&cli, &ModRegistry::new()).expect("vanilla");
        assert_eq!(rules.name(), "Vanilla");
    }
}
