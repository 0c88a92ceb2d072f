use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use inkpost_core::{load_config, InkpostConfig};

pub mod commands;

use commands::browse::{AuthArgs, PublishArgs};
use commands::draft::{DraftArgs, GenerateArgs};
use commands::history::HistoryArgs;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] inkpost_core::ConfigError),
    #[error("browser error: {0}")]
    Browser(#[from] inkpost_core::BrowserError),
    #[error("generation error: {0}")]
    Generation(#[from] inkpost_core::GenerationError),
    #[error("audit error: {0}")]
    Audit(#[from] inkpost_core::AuditError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("login state not confirmed ({0})")]
    AuthenticationUnknown(String),
    #[error("run did not complete: {0}")]
    RunFailed(String),
    #[error("one or more checks failed")]
    ChecksFailed,
    #[error("interrupted")]
    Interrupted,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Authenticate, fill and publish posts through a browser-driven blog editor", long_about = None)]
pub struct Cli {
    /// Path to inkpost.toml
    #[arg(long, default_value = "configs/inkpost.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Raise the default log level to debug
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in through the tiered authenticator and report the verdict
    Auth(AuthArgs),
    /// Ask the content collaborator for a post
    Generate(GenerateArgs),
    /// Fill the composer without saving
    Inject(DraftArgs),
    /// Fill the composer, save the draft and optionally publish it
    Publish(PublishArgs),
    /// Stored session maintenance
    #[command(subcommand)]
    Session(SessionCommands),
    /// Recent publish runs from the audit ledger
    History(HistoryArgs),
    /// Verify configuration and local resources
    Check,
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Delete the stored session for the configured target
    Clear,
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(*shell, &mut command, "inkpostctl", &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Auth(args) => {
            let report = block_on(commands::browse::authenticate(&context, args))??;
            render(&report, cli.format)?;
            if !report.confident {
                return Err(AppError::AuthenticationUnknown(report.state.clone()));
            }
        }
        Commands::Generate(args) => {
            let draft = block_on(commands::draft::generate(&context, args))??;
            render(&draft, cli.format)?;
        }
        Commands::Inject(args) => {
            let report = block_on(commands::browse::inject(&context, args))??;
            render(&report, cli.format)?;
            commands::browse::ensure_injected(&report)?;
        }
        Commands::Publish(args) => {
            let report = block_on(commands::browse::publish(&context, args))??;
            render(&report, cli.format)?;
            commands::browse::ensure_success(&report)?;
        }
        Commands::Session(SessionCommands::Clear) => {
            let cleared = context.clear_session();
            render(&cleared, cli.format)?;
        }
        Commands::History(args) => {
            let history = commands::history::history(&context, args)?;
            render(&history, cli.format)?;
        }
        Commands::Check => {
            let entries = commands::check::run_checks(&context);
            render(&entries, cli.format)?;
            if commands::check::any_failed(&entries) {
                return Err(AppError::ChecksFailed);
            }
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}

/// Runs a future on a current-thread runtime; browser sessions are not
/// `Send`.
fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl<T: DisplayFallback> DisplayFallback for Vec<T> {
    fn display(&self) -> String {
        self.iter()
            .map(DisplayFallback::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug)]
pub struct AppContext {
    config: InkpostConfig,
    config_path: PathBuf,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        Ok(Self {
            config,
            config_path: cli.config.clone(),
        })
    }

    pub fn config(&self) -> &InkpostConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn clear_session(&self) -> SessionCleared {
        let store = inkpost_core::SessionStore::from_config(&self.config);
        let removed = store.clear();
        SessionCleared {
            target_id: self.config.target.id.clone(),
            removed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionCleared {
    pub target_id: String,
    pub removed: bool,
}

impl DisplayFallback for SessionCleared {
    fn display(&self) -> String {
        if self.removed {
            format!("Stored session for {} removed", self.target_id)
        } else {
            format!("No stored session for {}", self.target_id)
        }
    }
}
