//! kubecreds CLI
//!
//! Resolves the API server and credentials for a kubeconfig context.
//!
//! # Usage
//!
//! ```bash
//! # List contexts, marking the current one
//! kubecreds contexts
//!
//! # Print the bearer token for a context (runs its auth provider if needed)
//! kubecreds --context prod token
//!
//! # Everything at once, as JSON
//! kubecreds credentials --format json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use kubecreds_cli::config::{self, CliConfig};
use kubecreds_cli::report::{ContextList, CredentialReport};
use kubecreds_core::{CredentialContext, IN_CLUSTER_CONTEXT, Kubeconfig, kubeconfig_path};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "kubecreds")]
#[command(about = "Resolve server and credentials from a kubeconfig")]
#[command(version)]
struct Cli {
    /// Path to the kubeconfig (defaults to $KUBECONFIG, then ~/.kube/config)
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Context to activate (defaults to current-context)
    #[arg(long, global = true)]
    context: Option<String>,

    /// Use the pod's service account instead of a kubeconfig
    #[arg(long, global = true, conflicts_with_all = ["kubeconfig", "context"])]
    in_cluster: bool,

    /// Kill auth provider commands after this many seconds
    #[arg(long, global = true)]
    exec_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contexts in the kubeconfig, marking current-context
    Contexts,

    /// Print the API server URL
    Server,

    /// Print the bearer token
    Token,

    /// Print server, namespace, credential files, and token
    Credentials {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = config::load_config().and_then(|mut config| {
        init_logging(&config, cli.verbose);
        debug!("Loaded configuration from {:?}", config.config_path);
        if let Some(secs) = cli.exec_timeout {
            config.context.exec_timeout_secs = Some(secs);
        }
        run(&cli, config)
    });

    // Materialized files must not outlive the process.
    let removed = kubecreds_core::shutdown();
    debug!(removed, "removed credential files");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &CliConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli, config: CliConfig) -> Result<()> {
    match cli.command {
        Commands::Contexts => list_contexts(cli),
        Commands::Server => print_server(&activate(cli, config)?),
        Commands::Token => print_token(&activate(cli, config)?),
        Commands::Credentials { format } => print_credentials(&activate(cli, config)?, format),
    }
}

fn activate(cli: &Cli, config: CliConfig) -> Result<CredentialContext> {
    if cli.in_cluster {
        return CredentialContext::in_cluster().context("Failed to load in-cluster credentials");
    }
    let (path, context) = (cli.kubeconfig.as_deref(), cli.context.as_deref());
    CredentialContext::load_with(path, context, config.context).context("Failed to load kubeconfig")
}

// Reads the document only, so a broken current-context cannot stop the listing.
fn list_contexts(cli: &Cli) -> Result<()> {
    let list = if cli.in_cluster {
        ContextList {
            current: Some(IN_CLUSTER_CONTEXT.to_string()),
            names: vec![IN_CLUSTER_CONTEXT.to_string()],
        }
    } else {
        let path = kubeconfig_path(cli.kubeconfig.as_deref()).context("Failed to find kubeconfig")?;
        let document = Kubeconfig::read_from(&path).context("Failed to load kubeconfig")?;
        ContextList::from_document(&document)
    };
    print!("{}", list);
    Ok(())
}

fn print_server(creds: &CredentialContext) -> Result<()> {
    let url = creds.server_url()?;
    println!("{}", url);
    Ok(())
}

fn print_token(creds: &CredentialContext) -> Result<()> {
    match creds.token()? {
        Some(token) => {
            println!("{}", token.expose());
            Ok(())
        }
        None => bail!(
            "context {} has no bearer token",
            creds.active_context_name().unwrap_or("<none>")
        ),
    }
}

fn print_credentials(creds: &CredentialContext, format: Format) -> Result<()> {
    let report = CredentialReport::collect(creds)?;
    match format {
        Format::Text => print!("{}", report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
