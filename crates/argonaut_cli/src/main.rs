//! ARGONAUT CLI
//!
//! Lint and inspect compiled workflow documents, submit and create
//! workflows, and control running ones.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use argonaut_client::{ArgoClient, ArgoOptions, Operation, Submission, WorkflowResult, WorkflowStatus};
use argonaut_plan::{DependencyGraph, SpecValidator, load_spec};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::{WrapErr, bail, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value as Json;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "argonaut")]
#[command(about = "ARGONAUT - compile, submit and control workflows", long_about = None)]
struct Cli {
    /// Client configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Server URL
    #[arg(long, global = true)]
    server: Option<String>,
    /// Namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a compiled workflow document
    Lint {
        /// YAML or JSON document
        file: PathBuf,
        /// Maximum number of templates
        #[arg(long, default_value_t = 0)]
        max_templates: usize,
        /// Accept names that are not RFC 1123 labels
        #[arg(long)]
        allow_any_names: bool,
    },
    /// Print the step graph of a DAG template as Graphviz
    Graph {
        /// YAML or JSON document
        file: PathBuf,
        /// Template to draw, defaults to the entrypoint
        #[arg(short, long)]
        template: Option<String>,
    },
    /// Submit a workflow from a workflow template
    Submit {
        /// Workflow template name
        template: String,
        /// Parameter as key=value; values that parse as JSON are passed as JSON
        #[arg(short, long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Extra label as key=value
        #[arg(short, long = "label", value_parser = parse_key_value)]
        labels: Vec<(String, String)>,
        /// Wait for the workflow to finish
        #[arg(short, long)]
        wait: bool,
    },
    /// Create a workflow from a manifest
    Create {
        /// YAML or JSON manifest
        file: PathBuf,
        /// Wait for the workflow to finish
        #[arg(short, long)]
        wait: bool,
    },
    /// Show a workflow's phase
    Status {
        /// Workflow name
        name: String,
    },
    /// Wait for a workflow to finish
    Wait {
        /// Workflow name
        name: String,
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Stop a workflow
    Stop {
        /// Workflow name
        name: String,
    },
    /// Retry a failed workflow
    Retry {
        /// Workflow name
        name: String,
    },
    /// Resume a suspended workflow
    Resume {
        /// Workflow name
        name: String,
    },
    /// Suspend a running workflow
    Suspend {
        /// Workflow name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "argonaut=debug" } else { "argonaut=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Lint {
            ref file,
            max_templates,
            allow_any_names,
        } => lint(file, max_templates, allow_any_names),
        Commands::Graph { ref file, ref template } => graph(file, template.as_deref()),
        Commands::Submit {
            ref template,
            ref params,
            ref labels,
            wait,
        } => {
            let client = connect(&cli, None)?;
            let mut submission = Submission::new(template.as_str());
            for (key, value) in params {
                submission = submission.param(key.as_str(), parameter_json(value));
            }
            for (key, value) in labels {
                submission = submission.label(key.as_str(), value.as_str());
            }
            if let Some(namespace) = &cli.namespace {
                submission = submission.namespace(namespace.as_str());
            }
            let spinner = wait.then(spinner);
            let result = client.submit(&submission, wait).await;
            finish(spinner);
            report(&client, &result?);
            Ok(())
        }
        Commands::Create { ref file, wait } => {
            let client = connect(&cli, None)?;
            let manifest = read_manifest(file)?;
            let spinner = wait.then(spinner);
            let result = client.create(&manifest, cli.namespace.as_deref(), wait).await;
            finish(spinner);
            report(&client, &result?);
            Ok(())
        }
        Commands::Status { ref name } => {
            let client = connect(&cli, None)?;
            let result = client.status(name, None).await?;
            report(&client, &result);
            Ok(())
        }
        Commands::Wait { ref name, timeout } => {
            let client = connect(&cli, timeout.map(Duration::from_secs))?;
            let bar = spinner();
            let result = client
                .wait(name, None, |status| bar.set_message(format!("{} is {}", name, status)))
                .await;
            bar.finish_and_clear();
            report(&client, &result?);
            Ok(())
        }
        Commands::Stop { ref name } => control(&cli, name, Operation::Stop).await,
        Commands::Retry { ref name } => control(&cli, name, Operation::Retry).await,
        Commands::Resume { ref name } => control(&cli, name, Operation::Resume).await,
        Commands::Suspend { ref name } => control(&cli, name, Operation::Suspend).await,
    }
}

fn lint(file: &Path, max_templates: usize, allow_any_names: bool) -> Result<()> {
    let (kind, spec) = read_spec(file)?;
    let validator = SpecValidator::new()
        .with_max_templates(max_templates)
        .with_require_dns_names(!allow_any_names);
    match validator.validate(&spec) {
        Ok(()) => {
            println!("{}: {} with {} templates is valid", file.display(), kind, spec.templates.len());
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                eprintln!("{}: {}", file.display(), error);
            }
            bail!("{} problem(s) found", errors.len())
        }
    }
}

fn graph(file: &Path, template: Option<&str>) -> Result<()> {
    let (_, spec) = read_spec(file)?;
    let name = template.unwrap_or(&spec.entrypoint);
    let template = spec
        .template(name)
        .ok_or_else(|| eyre!("no template named '{}'", name))?;
    let graph = DependencyGraph::from_template(template)?;
    print!("{}", graph.to_dot());
    Ok(())
}

async fn control(cli: &Cli, name: &str, operation: Operation) -> Result<()> {
    let client = connect(cli, None)?;
    let result = client.operate(name, None, operation).await?;
    println!("{} {}: {}", operation, result.name(), result.status());
    Ok(())
}

fn connect(cli: &Cli, wait_timeout: Option<Duration>) -> Result<ArgoClient> {
    let mut options = match &cli.config {
        Some(path) => ArgoOptions::load(path)?,
        None => ArgoOptions::default(),
    }
    .with_process_env()?;
    if let Some(server) = &cli.server {
        options = options.with_server(server.as_str());
    }
    if let Some(namespace) = &cli.namespace {
        options = options.with_namespace(namespace.as_str());
    }
    if let Some(timeout) = wait_timeout {
        options = options.with_wait_timeout(timeout);
    }
    debug!(server = %options.server, namespace = %options.namespace, "connecting");
    Ok(ArgoClient::connect(&options)?)
}

fn read_spec(file: &Path) -> Result<(String, argonaut_plan::WorkflowSpec)> {
    let text = std::fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file.display()))?;
    Ok(load_spec(&text)?)
}

fn read_manifest(file: &Path) -> Result<Json> {
    let text = std::fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file.display()))?;
    serde_yaml::from_str(&text).wrap_err_with(|| format!("parsing {}", file.display()))
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("'{}' is not key=value", raw)),
    }
}

/// `3`, `true` and `[1,2]` are JSON; anything else is a plain string
fn parameter_json(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        bar.set_style(style);
    }
    bar.set_message("workflow is still running");
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn finish(spinner: Option<ProgressBar>) {
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
}

fn report(client: &ArgoClient, result: &WorkflowResult) {
    println!("{}\t{}", result.name(), result.status());
    println!("{}", client.web_link(result.namespace(), result.name()));
    if let Some(message) = result.message() {
        println!("message: {}", message);
    }
    if result.status() == WorkflowStatus::Succeeded {
        if let Ok(outputs) = result.outputs() {
            for (name, value) in &outputs.parameters {
                println!("{} = {}", name, value);
            }
        }
    }
}
