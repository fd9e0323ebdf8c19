pub mod cli;
pub mod error;
pub mod headless;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use veil_core::Config;

/// Initialize tracing/logging with the given directives.
///
/// Logs go to stderr; stdout is reserved for command output.
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring invalid log directive '{directive}': {e}"),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Data directory holding settings.json (defaults to the platform data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalOptions {
    pub fn config(&self) -> Config {
        match &self.data_dir {
            Some(dir) => Config::at(dir),
            None => Config::load_or_default(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Anonymize documents and write the results
    Process {
        /// Files or directories (.docx, .pdf, .txt, .md)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory (defaults to <data dir>/output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Bundle all results into anonymized_documents.zip
        #[arg(long)]
        zip: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Check that the rewriting service is reachable
    Ping {
        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Show or change saved settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },

    /// Line-oriented JSON control protocol on stdin/stdout
    Headless {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print settings (API keys masked)
    Show,
    /// Print the settings file location
    Path,
    /// Save a provider to the settings file
    SetProvider {
        #[arg(value_enum)]
        kind: ProviderKind,
        #[command(flatten)]
        options: ProviderOptions,
    },
    /// Set queue tuning
    SetQueue {
        /// Maximum number of documents in the queue
        #[arg(long)]
        capacity: Option<usize>,
        /// Pause before each document, in milliseconds
        #[arg(long)]
        job_delay_ms: Option<u64>,
    },
    /// Restore default settings
    Reset,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    Anthropic,
    #[value(name = "openai")]
    OpenAI,
    Echo,
}

/// Per-run provider overrides
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderArgs {
    /// Provider to use instead of the saved one
    #[arg(long, value_enum)]
    pub provider: Option<ProviderKind>,

    #[command(flatten)]
    pub options: ProviderOptions,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProviderOptions {
    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// API key (defaults to the provider's environment variable)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Alternative API endpoint
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Run a subcommand to completion.
pub fn run(command: Command, options: &GlobalOptions) -> ExitCode {
    let directives: &[&str] = if options.verbose {
        &["veil=debug", "veil_lib=debug", "veil_core=debug"]
    } else {
        &["veil=info", "veil_lib=info", "veil_core=info"]
    };
    init_logging(directives);

    let result = match command {
        Command::Headless { provider } => headless::run(options, &provider),
        command => block_on(cli::dispatch(command, options)).and_then(|r| r),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    Ok(rt.block_on(future))
}
