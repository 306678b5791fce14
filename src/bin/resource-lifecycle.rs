//! Resource Lifecycle CLI
//!
//! Command-line host for the lifecycle engine: loads a descriptor and a state
//! file, runs one operation against the remote API and writes the state back.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use resource_lifecycle::{
    load_config, load_descriptor, load_state, save_state, DeclarativeState, EngineConfig,
    HttpApiClient, LoadError, ResourceEngine,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resource-lifecycle")]
#[command(about = "Drive the lifecycle of remote HTTP resources from declarative state")]
#[command(version)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a descriptor file without contacting the API
    Validate {
        /// Descriptor file to check
        descriptor: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Create the resource from the state file
    Create(Target),

    /// Refresh the state file from the remote resource
    Read(Target),

    /// Push state file changes to the remote resource
    Update(Target),

    /// Delete the remote resource
    Delete(Target),

    /// Import an existing resource into a new state file
    Import {
        /// Resource id; subresources use parent1/.../parentN/id
        id: String,

        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args)]
struct Target {
    /// Resource descriptor file
    #[arg(long, short)]
    descriptor: PathBuf,

    /// State file, written back after the operation
    #[arg(long, short)]
    state: PathBuf,

    /// Base URL of the remote API (e.g., https://api.example.com)
    #[arg(long)]
    base_url: String,

    /// Header sent with every request, as NAME:VALUE (repeatable)
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Engine configuration file (timeouts, polling cadence)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    http_timeout: u64,
}

#[derive(Clone, Copy)]
enum Action {
    Create,
    Read,
    Update,
    Delete,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Validate { descriptor, json } => run_validate(&descriptor, json),
        Commands::Create(target) => run_operation(&target, Action::Create),
        Commands::Read(target) => run_operation(&target, Action::Read),
        Commands::Update(target) => run_operation(&target, Action::Update),
        Commands::Delete(target) => run_operation(&target, Action::Delete),
        Commands::Import { id, target } => run_import(&id, &target),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_validate(path: &std::path::Path, json_output: bool) -> Result<(), u8> {
    let result = load_descriptor(path);

    match result {
        Ok(descriptor) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::json!({ "valid": true, "resource": descriptor.name })
                );
            } else {
                println!("Valid: {}", descriptor.name);
            }
            Ok(())
        }
        Err(LoadError::InvalidDescriptor { issues }) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "errors": issues
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for issue in &issues {
                    eprintln!("  {}", issue);
                }
            }
            Err(LoadError::InvalidDescriptor { issues }.exit_code() as u8)
        }
        Err(e) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

fn run_operation(target: &Target, action: Action) -> Result<(), u8> {
    let engine = build_engine(target)?;
    let client = build_client(target)?;
    let mut state = load_state(&target.state).map_err(load_failure)?;

    let result = match action {
        Action::Create => engine.create(&mut state, &client),
        Action::Read => engine.read(&mut state, &client),
        Action::Update => engine.update(&mut state, &client),
        Action::Delete => engine.delete(&mut state, &client),
    };

    // The identifier may have been assigned before a later step failed, so
    // the state is persisted either way.
    save_state(&target.state, &state).map_err(load_failure)?;

    result.map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

fn run_import(id: &str, target: &Target) -> Result<(), u8> {
    let engine = build_engine(target)?;
    let client = build_client(target)?;

    let state: DeclarativeState = engine.import(id, &client).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    save_state(&target.state, &state).map_err(load_failure)
}

fn build_engine(target: &Target) -> Result<ResourceEngine, u8> {
    let descriptor = load_descriptor(&target.descriptor).map_err(load_failure)?;
    let config = match &target.config {
        Some(path) => load_config(path).map_err(load_failure)?,
        None => EngineConfig::default(),
    };
    Ok(ResourceEngine::new(Arc::new(descriptor), config))
}

fn build_client(target: &Target) -> Result<HttpApiClient, u8> {
    let mut builder = HttpApiClient::builder(target.base_url.clone())
        .timeout(Duration::from_secs(target.http_timeout));
    for (name, value) in &target.headers {
        builder = builder.header(name.clone(), value.clone());
    }
    builder.build().map_err(|e| {
        eprintln!("Error: cannot build HTTP client: {}", e);
        2u8
    })
}

fn load_failure(e: LoadError) -> u8 {
    eprintln!("Error: {}", e);
    e.exit_code() as u8
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
