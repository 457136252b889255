//! Tag-fulfillment CLI.
//!
//! Expands a markup template with the templated actions declared in a TOML
//! config (`fulfill.toml` by default) and prints the result to stdout.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, anyhow};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::debug;

use fulfill::io::config::{FulfillConfig, load_config};
use fulfill::templated::actions_from_config;
use fulfill::{Context, FulfillError, FulfillOptions, exit_codes, fulfill_blocking, logging, markup};

const DEFAULT_CONFIG: &str = "fulfill.toml";

#[derive(Parser)]
#[command(
    name = "fulfill",
    version,
    about = "Expand markup templates by fulfilling registered tags"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a template until no registered tag remains and print it.
    Render {
        /// Config declaring the actions (missing file means no actions).
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
        /// JSON object merged over the configured context.
        #[arg(long)]
        context: Option<String>,
        /// Override the configured tick limit.
        #[arg(long)]
        max_ticks: Option<u32>,
        /// Template file; reads stdin when omitted or `-`.
        input: Option<PathBuf>,
    },
    /// Validate the config and list its actions.
    Check {
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Print the parsed node sequence of a template as JSON.
    Parse {
        /// Template file; reads stdin when omitted or `-`.
        input: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Render {
            config,
            context,
            max_ticks,
            input,
        } => cmd_render(&config, context.as_deref(), max_ticks, input.as_deref()),
        Command::Check { config } => cmd_check(&config),
        Command::Parse { input } => cmd_parse(input.as_deref()),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<FulfillError>() {
        Some(FulfillError::Parse(_)) | None => exit_codes::INVALID,
        Some(_) => exit_codes::FAILED,
    }
}

fn cmd_render(
    config_path: &Path,
    context_json: Option<&str>,
    max_ticks: Option<u32>,
    input: Option<&Path>,
) -> Result<()> {
    let cfg = load_config(config_path)?;
    let actions = actions_from_config(&cfg)?;
    let template = read_input(input)?;

    let mut initial = cfg.context.clone();
    if let Some(raw) = context_json {
        initial.extend(parse_context(raw)?);
    }
    let mut options = FulfillOptions::new().with_context(Context::from_map(initial));
    options.max_ticks = max_ticks.or(cfg.max_ticks);
    debug!(actions = actions.len(), max_ticks = ?options.max_ticks, "rendering template");

    let fulfilled = fulfill_blocking(&actions, options, &template)?;
    debug!(ticks = fulfilled.ticks, "template rendered");
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(fulfilled.text.as_bytes())
        .context("write output")?;
    stdout.flush().context("flush output")?;
    Ok(())
}

fn cmd_check(config_path: &Path) -> Result<()> {
    let cfg = load_config(config_path)?;
    for line in describe_actions(&cfg) {
        println!("{line}");
    }
    Ok(())
}

fn cmd_parse(input: Option<&Path>) -> Result<()> {
    let template = read_input(input)?;
    let nodes = markup::parse(&template).map_err(FulfillError::from)?;
    let json = serde_json::to_string_pretty(&nodes).context("serialize nodes")?;
    println!("{json}");
    Ok(())
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("read template from stdin")?;
            Ok(buf)
        }
    }
}

fn parse_context(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw).context("parse --context json")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("--context must be a JSON object, got {other}")),
    }
}

/// One line per action: name, replace policy and scheduling group.
fn describe_actions(cfg: &FulfillConfig) -> Vec<String> {
    cfg.actions
        .iter()
        .map(|(name, action)| {
            let group = if action.series { "series" } else { "parallel" };
            format!("{name}\treplace={}\t{group}", action.replace.as_str())
        })
        .collect()
}
