//! One-shot subcommands: batch processing, ping and settings.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use veil_core::documents::{bundle_zip, DocumentExtractor, DEFAULT_ARCHIVE_NAME};
use veil_core::provider::{anthropic, gemini, openai};
use veil_core::{AppState, DocumentSource, JobQueue, JobStatus, ProviderConfig, Settings};

use crate::{Command, GlobalOptions, ProviderArgs, ProviderKind, ProviderOptions, SettingsAction};

pub(crate) async fn dispatch(command: Command, options: &GlobalOptions) -> Result<ExitCode> {
    let config = options.config();

    match command {
        Command::Process {
            paths,
            output,
            zip,
            provider,
        } => {
            config.ensure_dirs().context("Failed to create data directories")?;
            let settings = Settings::load(&config.settings_file);
            let provider = resolve_provider(&provider, &settings)?;
            let output_dir = output.unwrap_or_else(|| config.output_dir.clone());

            let (state, _events) = AppState::new(config, settings, &provider);
            let summary = process(&state.queue, &paths, &output_dir, zip).await;
            state.queue.shutdown();

            let summary = summary?;
            print_summary(&summary);
            Ok(if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Ping { provider } => {
            let settings = Settings::load(&config.settings_file);
            let provider = resolve_provider(&provider, &settings)?;
            let (state, _events) = AppState::new(config, settings, &provider);

            let result = state.ping().await;
            state.queue.shutdown();
            match result {
                Ok(()) => {
                    println!("online: {} ({})", provider.provider_type(), provider.model_id());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    println!("error: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::Settings { action } => {
            settings_command(&config.settings_file, action.unwrap_or(SettingsAction::Show))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Headless { .. } => bail!("headless mode runs its own runtime"),
    }
}

/// Provider for this run: saved settings (or environment), then CLI overrides.
pub fn resolve_provider(args: &ProviderArgs, settings: &Settings) -> Result<ProviderConfig> {
    let base = match args.provider {
        Some(kind) => {
            let saved = settings
                .provider
                .clone()
                .filter(|p| p.provider_type() == kind_name(kind));
            match saved {
                Some(saved) => saved,
                None => provider_for(kind, &args.options)?,
            }
        }
        None => match settings.resolve_provider() {
            Some(provider) => provider,
            None => bail!(
                "No rewriting provider configured. Set GEMINI_API_KEY, ANTHROPIC_API_KEY \
                 or OPENAI_API_KEY, run `veil settings set-provider`, or pass \
                 --provider echo for a dry run"
            ),
        },
    };
    Ok(apply_overrides(base, &args.options))
}

/// Fresh provider config of `kind`, with the API key from the options or the
/// provider's environment variable.
fn provider_for(kind: ProviderKind, options: &ProviderOptions) -> Result<ProviderConfig> {
    let env_key = |names: &[&str]| {
        names
            .iter()
            .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
    };
    let api_key = |names: &[&str]| {
        options
            .api_key
            .clone()
            .or_else(|| env_key(names))
            .with_context(|| {
                format!(
                    "No API key for {}: pass --api-key or set {}",
                    kind_name(kind),
                    names.join(" or ")
                )
            })
    };

    let provider = match kind {
        ProviderKind::Gemini => ProviderConfig::Gemini {
            api_key: api_key(&["GEMINI_API_KEY", "API_KEY"])?,
            model: gemini::DEFAULT_MODEL.to_string(),
            base_url: None,
        },
        ProviderKind::Anthropic => ProviderConfig::Anthropic {
            api_key: api_key(&["ANTHROPIC_API_KEY"])?,
            model: anthropic::DEFAULT_MODEL.to_string(),
            base_url: None,
        },
        ProviderKind::OpenAI => ProviderConfig::OpenAI {
            api_key: api_key(&["OPENAI_API_KEY"])?,
            model: openai::DEFAULT_MODEL.to_string(),
            base_url: None,
        },
        ProviderKind::Echo => ProviderConfig::Echo,
    };
    Ok(apply_overrides(provider, options))
}

fn apply_overrides(provider: ProviderConfig, options: &ProviderOptions) -> ProviderConfig {
    match provider {
        ProviderConfig::Gemini {
            api_key,
            model,
            base_url,
        } => ProviderConfig::Gemini {
            api_key: options.api_key.clone().unwrap_or(api_key),
            model: options.model.clone().unwrap_or(model),
            base_url: options.base_url.clone().or(base_url),
        },
        ProviderConfig::Anthropic {
            api_key,
            model,
            base_url,
        } => ProviderConfig::Anthropic {
            api_key: options.api_key.clone().unwrap_or(api_key),
            model: options.model.clone().unwrap_or(model),
            base_url: options.base_url.clone().or(base_url),
        },
        ProviderConfig::OpenAI {
            api_key,
            model,
            base_url,
        } => ProviderConfig::OpenAI {
            api_key: options.api_key.clone().unwrap_or(api_key),
            model: options.model.clone().unwrap_or(model),
            base_url: options.base_url.clone().or(base_url),
        },
        ProviderConfig::Echo => ProviderConfig::Echo,
    }
}

fn kind_name(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Gemini => "gemini",
        ProviderKind::Anthropic => "anthropic",
        ProviderKind::OpenAI => "openai",
        ProviderKind::Echo => "echo",
    }
}

/// Expand the given paths into supported document files.
///
/// Directories contribute their supported files (not recursive), sorted by
/// name. Files named explicitly must exist and have a supported extension.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && DocumentExtractor::supports(p))
                .collect();
            found.sort();
            if found.is_empty() {
                tracing::warn!(dir = %path.display(), "No supported documents in directory");
            }
            files.extend(found);
        } else if !path.exists() {
            bail!("No such file: {}", path.display());
        } else if !DocumentExtractor::supports(path) {
            bail!(
                "Unsupported document type: {} (expected one of: {})",
                path.display(),
                DocumentExtractor::SUPPORTED.join(", ")
            );
        } else {
            files.push(path.clone());
        }
    }

    Ok(files)
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct ProcessSummary {
    /// Files written, one per document or a single archive
    pub written: Vec<PathBuf>,
    pub completed: usize,
    /// `(document name, error)` for every failed document
    pub failed: Vec<(String, String)>,
}

/// Queue every input, run the queue dry, and write the results.
pub async fn process(
    queue: &JobQueue,
    paths: &[PathBuf],
    output_dir: &Path,
    zip: bool,
) -> Result<ProcessSummary> {
    let files = collect_inputs(paths)?;
    if files.is_empty() {
        bail!("No documents to process");
    }

    let sources = files
        .iter()
        .map(|path| DocumentSource::read(path))
        .collect::<Result<Vec<_>>>()?;
    queue.enqueue(sources).await?;

    tracing::info!(documents = files.len(), "Processing documents");
    queue.start().await;
    queue.wait_idle().await;

    let mut summary = ProcessSummary::default();
    for job in queue.jobs().await {
        match job.status {
            JobStatus::Completed => summary.completed += 1,
            _ => summary.failed.push((
                job.name.clone(),
                job.error.unwrap_or_else(|| format!("not processed ({})", job.status)),
            )),
        }
    }

    let outputs = queue.completed_outputs().await;
    if outputs.is_empty() {
        return Ok(summary);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    if zip {
        let path = output_dir.join(DEFAULT_ARCHIVE_NAME);
        let archive = bundle_zip(outputs.iter().map(|(name, bytes)| (name, bytes.as_slice())))?;
        std::fs::write(&path, archive)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        summary.written.push(path);
    } else {
        summary.written = save_outputs(&outputs, output_dir)?;
    }

    Ok(summary)
}

/// Write each `(file name, bytes)` pair into `dir`.
pub fn save_outputs(
    outputs: &[(String, std::sync::Arc<Vec<u8>>)],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    outputs
        .iter()
        .map(|(name, bytes)| {
            let path = dir.join(name);
            std::fs::write(&path, bytes.as_slice())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path)
        })
        .collect()
}

fn print_summary(summary: &ProcessSummary) {
    for path in &summary.written {
        println!("wrote {}", path.display());
    }
    for (name, error) in &summary.failed {
        println!("failed {name}: {error}");
    }
    println!(
        "{} completed, {} failed",
        summary.completed,
        summary.failed.len()
    );
}

fn settings_command(path: &Path, action: SettingsAction) -> Result<()> {
    let mut settings = Settings::load(path);

    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&masked(&settings)?)?);
            return Ok(());
        }
        SettingsAction::Path => {
            println!("{}", path.display());
            return Ok(());
        }
        SettingsAction::SetProvider { kind, options } => {
            settings.provider = Some(provider_for(kind, &options)?);
        }
        SettingsAction::SetQueue {
            capacity,
            job_delay_ms,
        } => {
            if let Some(capacity) = capacity {
                settings.queue.capacity = capacity;
            }
            if let Some(delay) = job_delay_ms {
                settings.queue.job_delay_ms = delay;
            }
        }
        SettingsAction::Reset => settings = Settings::default(),
    }

    settings.save(path)?;
    tracing::info!(path = %path.display(), "Settings saved");
    Ok(())
}

/// Settings as JSON with the API key replaced.
fn masked(settings: &Settings) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    if let Some(key) = value.pointer_mut("/provider/api_key") {
        *key = serde_json::Value::String("***".to_string());
    }
    Ok(value)
}
