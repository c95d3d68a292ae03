//! ect CLI - run operations and workflow graphs

mod config;
mod progress;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use config::Config;
use ect_core::{
    ConsoleMonitor, Graph, Monitor, NullMonitor, OpSignature, RETURN, Registry, Value,
    detect_format, parse_literal,
};
use indexmap::IndexMap;
use progress::ProgressMonitor;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Output verbosity level.
#[derive(Clone, Copy)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn info(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }

    fn debug(self, msg: &str) {
        if matches!(self, Verbosity::Verbose) {
            println!("[debug] {msg}");
        }
    }

    fn result(self, msg: &str) {
        if !matches!(self, Verbosity::Quiet) {
            println!("{msg}");
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    fn log_filter(self, configured: Option<&str>) -> String {
        match self {
            Verbosity::Quiet => "error".into(),
            Verbosity::Verbose => "info".into(),
            Verbosity::Normal => configured.unwrap_or("warn").into(),
        }
    }
}

#[derive(Parser)]
#[command(name = "ect", version)]
#[command(about = "Run operations and workflow graphs", long_about = None)]
struct Cli {
    /// Verbose output (show debug info)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to config file (default: ~/.config/ect/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an operation OP, or a graph file, with the given arguments
    Run {
        /// Display progress information during execution
        #[arg(short, long)]
        monitor: bool,
        /// Operation name, or a graph file (.json, .yaml, .yml, .toml)
        target: String,
        /// Arguments: positional literals or name=literal
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// List available operations
    List {
        /// Wildcard filter on names ('*' and '?', case insensitive)
        #[arg(short, long)]
        pattern: Option<String>,
        /// Only operations carrying this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Show an operation's signature
    Info {
        /// Operation name
        op: String,
        /// Print the signature as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man page
    Manpage,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config file
    let config = if let Some(ref path) = cli.config {
        Config::load_from_path(Some(path.as_path()))
    } else {
        Config::load()
    };

    // Apply config defaults, CLI flags override
    let verbose = cli.verbose || config.defaults.verbose;
    let quiet = cli.quiet || config.defaults.quiet;
    let verbosity = Verbosity::from_flags(verbose, quiet);
    init_tracing(&verbosity.log_filter(config.defaults.log_level.as_deref()));

    let mut registry = Registry::new();
    ect_ops::register_all(&mut registry).context("Failed to register operations")?;
    verbosity.debug(&format!("{} operations registered", registry.len()));

    match cli.command {
        Commands::Run {
            monitor,
            target,
            args,
        } => cmd_run(
            &registry,
            &target,
            &args,
            monitor || config.defaults.monitor,
            verbosity,
        ),
        Commands::List { pattern, tag } => {
            cmd_list(&registry, pattern.as_deref(), tag.as_deref(), verbosity)
        }
        Commands::Info { op, json } => cmd_info(&registry, &op, json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ect", &mut std::io::stdout());
            Ok(())
        }
        Commands::Manpage => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
            Ok(())
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Split `run` arguments into positional and keyword literals.
fn parse_run_args(args: &[String]) -> Result<(Vec<Value>, IndexMap<String, Value>)> {
    let mut positional = Vec::new();
    let mut keyword = IndexMap::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, text)) => {
                if !is_identifier(name) {
                    bail!("keyword '{name}' is not a valid identifier");
                }
                let value = parse_literal(text)
                    .with_context(|| format!("Invalid value for '{name}'"))?;
                keyword.insert(name.to_string(), value);
            }
            None => {
                let value = parse_literal(arg)
                    .with_context(|| format!("Invalid argument '{arg}'"))?;
                positional.push(value);
            }
        }
    }
    Ok((positional, keyword))
}

fn is_graph_file(target: &str) -> bool {
    detect_format(target).is_some() && Path::new(target).is_file()
}

/// Progress display for `run`: a bar on terminals, plain lines otherwise.
fn make_monitor(enabled: bool) -> Box<dyn Monitor> {
    if !enabled {
        Box::new(NullMonitor::new())
    } else if std::io::stderr().is_terminal() {
        Box::new(ProgressMonitor::new())
    } else {
        Box::new(ConsoleMonitor::stdout())
    }
}

fn describe_args(positional: &[Value], keyword: &IndexMap<String, Value>) -> String {
    let parts: Vec<String> = positional
        .iter()
        .map(|v| v.to_string())
        .chain(keyword.iter().map(|(k, v)| format!("{k}={v}")))
        .collect();
    parts.join(", ")
}

fn cmd_run(
    registry: &Registry,
    target: &str,
    args: &[String],
    monitor: bool,
    v: Verbosity,
) -> Result<()> {
    let (positional, keyword) = parse_run_args(args)?;
    let mut monitor = make_monitor(monitor);

    if is_graph_file(target) {
        return run_graph(registry, target, positional, keyword, monitor.as_mut(), v);
    }

    let op = registry
        .get(target)
        .with_context(|| format!("Unknown operation '{target}'. Use 'ect list' to list."))?;
    v.info(&format!(
        "Running operation {target} with ({})",
        describe_args(&positional, &keyword)
    ));

    let outputs = op
        .call(positional, keyword, monitor.as_mut())
        .with_context(|| format!("Operation '{target}' failed"))?;
    match outputs.get(RETURN) {
        Some(value) if outputs.len() == 1 => v.result(&format!("Output: {value}")),
        _ => {
            for (name, value) in &outputs {
                v.result(&format!("Output: {name} = {value}"));
            }
        }
    }
    Ok(())
}

fn run_graph(
    registry: &Registry,
    path: &str,
    positional: Vec<Value>,
    keyword: IndexMap<String, Value>,
    monitor: &mut dyn Monitor,
    v: Verbosity,
) -> Result<()> {
    if !positional.is_empty() {
        bail!(
            "Can't run graph with positional arguments ({}), please provide name=value only",
            describe_args(&positional, &IndexMap::new())
        );
    }

    let mut graph =
        Graph::from_path(path, registry).with_context(|| format!("Failed to load graph '{path}'"))?;
    info!(path, steps = graph.steps().len(), "graph loaded");
    v.debug(&format!(
        "Execution order: {}",
        graph.execution_order().join(" -> ")
    ));

    let summary = describe_args(&[], &keyword);
    for (name, value) in keyword {
        graph
            .bind(&name, value)
            .with_context(|| format!("Cannot bind graph input '{name}'"))?;
    }

    v.info(&format!("Running graph {path} with ({summary})"));
    let outputs = graph
        .invoke(monitor)
        .with_context(|| format!("Graph '{path}' failed"))?;
    for (name, value) in &outputs {
        v.result(&format!("Output: {name} = {value}"));
    }
    Ok(())
}

fn cmd_list(
    registry: &Registry,
    pattern: Option<&str>,
    tag: Option<&str>,
    v: Verbosity,
) -> Result<()> {
    let pattern = pattern
        .map(|p| glob::Pattern::new(&p.to_lowercase()))
        .transpose()
        .context("Invalid pattern")?;

    let names: Vec<&str> = registry
        .signatures()
        .filter(|sig| tag.is_none_or(|t| sig.has_tag(t)))
        .map(|sig| sig.name.as_str())
        .filter(|name| {
            pattern
                .as_ref()
                .is_none_or(|p| p.matches(&name.to_lowercase()))
        })
        .collect();

    match names.len() {
        0 => v.result("No operations found"),
        1 => v.result("One operation found"),
        n => v.result(&format!("{n} operations found")),
    }
    for (i, name) in names.iter().enumerate() {
        v.result(&format!("{:4}: {}", i + 1, name));
    }
    Ok(())
}

fn cmd_info(registry: &Registry, name: &str, json: bool) -> Result<()> {
    let op = registry
        .get(name)
        .with_context(|| format!("Unknown operation '{name}'. Use 'ect list' to list."))?;
    let sig = op.signature();

    if json {
        println!("{}", serde_json::to_string_pretty(sig)?);
        return Ok(());
    }
    print!("{}", describe(sig));
    Ok(())
}

fn describe(sig: &OpSignature) -> String {
    let mut out = format!("Operation: {}\n", sig.name);
    if !sig.version.is_empty() {
        out.push_str(&format!("Version: {}\n", sig.version));
    }
    if !sig.tags.is_empty() {
        let tags: Vec<&str> = sig.tags.iter().map(String::as_str).collect();
        out.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }
    if sig.accepts_monitor {
        out.push_str("Reports progress: yes\n");
    }
    if !sig.description.is_empty() {
        out.push_str(&format!("\n{}\n", sig.description));
    }

    out.push_str("\nInputs:\n");
    if sig.inputs.is_empty() {
        out.push_str("  (none)\n");
    }
    for (name, input) in &sig.inputs {
        let mut line = format!("  {name}: {}", input.data_type);
        if input.nullable {
            line.push_str(", optional");
        }
        if let Some(default) = &input.default {
            line.push_str(&format!(", default {default}"));
        }
        if let Some(source) = &input.value_set_source {
            line.push_str(&format!(", one of the values of '{source}'"));
        }
        out.push_str(&line);
        out.push('\n');
        if !input.description.is_empty() {
            out.push_str(&format!("      {}\n", input.description));
        }
    }

    out.push_str("\nOutputs:\n");
    for (name, data_type) in sig.output_ports() {
        out.push_str(&format!("  {name}: {data_type}\n"));
        let desc = sig.outputs.get(name).map_or("", |o| o.description.as_str());
        if !desc.is_empty() {
            out.push_str(&format!("      {desc}\n"));
        }
    }
    out
}
