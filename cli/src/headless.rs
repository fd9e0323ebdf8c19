//! Headless mode: a line-oriented JSON control protocol.
//!
//! Each input line is a command with whitespace-separated arguments
//! (double or single quotes group an argument). Each command gets exactly one
//! response line:
//!
//! ```text
//! {"ok":true,"command":"start","data":{"state":"running"}}
//! {"ok":false,"command":"clear","error":{"code":"queue_busy","message":"..."}}
//! ```
//!
//! Queue events are interleaved as `{"event":"job_completed",...}` lines.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use veil_core::documents::bundle_zip;
use veil_core::{AppState, DocumentSource, QueueEvent, Settings};

use crate::cli;
use crate::error::{CommandError, CommandResult, ResultExt};
use crate::{GlobalOptions, ProviderArgs};

const OUTPUT_BUFFER: usize = 64;

/// Run the application in headless mode on stdin/stdout.
pub fn run(options: &GlobalOptions, provider: &ProviderArgs) -> Result<ExitCode> {
    tracing::info!("Starting Veil in headless mode");

    let config = options.config();
    config
        .ensure_dirs()
        .context("Failed to create data directories")?;
    tracing::info!("Data directory: {:?}", config.data_dir);
    let settings = Settings::load(&config.settings_file);

    crate::block_on(async move {
        let provider = match cli::resolve_provider(provider, &settings) {
            Ok(provider) => provider,
            Err(e) => {
                tracing::error!("{e:#}");
                let response = failure("init", CommandError::provider_not_configured());
                println!("{response}");
                return Ok(ExitCode::FAILURE);
            }
        };

        let (state, events) = AppState::new(config, settings, &provider);
        let input = BufReader::new(tokio::io::stdin());

        let result = tokio::select! {
            served = serve(&state, events, input, tokio::io::stdout()) => served.map(drop),
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                Ok(())
            }
        };

        state.queue.shutdown();
        result.map(|()| ExitCode::SUCCESS)
    })
    .and_then(|r| r)
}

/// Serve commands from `input` until `quit` or end of input.
///
/// Returns the output sink once every response has been written.
pub async fn serve<R, W>(
    state: &AppState,
    mut events: mpsc::Receiver<QueueEvent>,
    input: R,
    output: W,
) -> Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<String>(OUTPUT_BUFFER);

    let writer = tokio::spawn(async move {
        let mut output = output;
        while let Some(line) = rx.recv().await {
            output.write_all(line.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
        Ok::<W, std::io::Error>(output)
    });

    let event_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize queue event");
                    continue;
                }
            };
            if event_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("Failed to read command")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, response) = match split_args(line) {
            Ok(mut args) => {
                let command = args.remove(0);
                tracing::debug!(command = %command, args = ?args, "Headless command");
                let response = match handle(state, &command, &args).await {
                    Ok(data) => success(&command, data),
                    Err(e) => failure(&command, e),
                };
                (command, response)
            }
            Err(e) => (String::new(), failure("", e)),
        };

        tx.send(response.to_string())
            .await
            .context("Output closed")?;
        if command == "quit" {
            break;
        }
    }

    forwarder.abort();
    let _ = forwarder.await;
    drop(tx);

    let output = writer
        .await
        .context("Output writer panicked")?
        .context("Failed to write response")?;
    Ok(output)
}

async fn handle(state: &AppState, command: &str, args: &[String]) -> CommandResult<Value> {
    let queue = &state.queue;

    match command {
        "add" => {
            if args.is_empty() {
                return Err(CommandError::invalid_input("add expects at least one path"));
            }
            let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
            let sources = tokio::task::spawn_blocking(move || {
                let files = cli::collect_inputs(&paths)
                    .map_err(|e| CommandError::invalid_input(format!("{e:#}")))?;
                files
                    .iter()
                    .map(|path| DocumentSource::read(path))
                    .collect::<Result<Vec<_>>>()
                    .storage_err()
            })
            .await
            .internal_err()??;
            let ids = queue.enqueue(sources).await?;
            Ok(json!({ "ids": ids }))
        }
        "start" => Ok(json!({ "state": queue.start().await })),
        "stop" => Ok(json!({ "state": queue.stop() })),
        "clear" => Ok(json!({ "removed": queue.clear().await? })),
        "status" | "wait" => {
            if command == "wait" {
                queue.wait_idle().await;
            }
            Ok(json!({
                "state": queue.state(),
                "stats": queue.stats().await,
                "capacity": queue.capacity(),
            }))
        }
        "jobs" => serde_json::to_value(queue.jobs().await).internal_err(),
        "export" => {
            let [path] = args else {
                return Err(CommandError::invalid_input("export expects one archive path"));
            };
            let outputs = queue.completed_outputs().await;
            if outputs.is_empty() {
                return Err(CommandError::nothing_to_export());
            }
            let archive =
                bundle_zip(outputs.iter().map(|(name, bytes)| (name, bytes.as_slice())))
                    .internal_err()?;
            tokio::fs::write(path, archive).await?;
            Ok(json!({ "path": path, "documents": outputs.len() }))
        }
        "save" => {
            let [dir] = args else {
                return Err(CommandError::invalid_input("save expects one directory"));
            };
            let outputs = queue.completed_outputs().await;
            if outputs.is_empty() {
                return Err(CommandError::nothing_to_export());
            }
            let written = cli::save_outputs(&outputs, Path::new(dir))
                .map_err(|e| CommandError::storage(format!("{e:#}")))?;
            Ok(json!({ "paths": written }))
        }
        "ping" => {
            state.ping().await.external_err()?;
            Ok(json!({
                "provider": state.provider.provider_name(),
                "model": state.provider.model_id(),
            }))
        }
        "quit" => Ok(Value::Null),
        other => Err(CommandError::invalid_command(other)),
    }
}

fn success(command: &str, data: Value) -> Value {
    json!({ "ok": true, "command": command, "data": data })
}

fn failure(command: &str, error: CommandError) -> Value {
    json!({ "ok": false, "command": command, "error": error })
}

/// Split a command line on whitespace, honoring single and double quotes.
fn split_args(line: &str) -> CommandResult<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandError::invalid_input("unterminated quote"));
    }
    if in_arg {
        args.push(current);
    }
    if args.is_empty() {
        return Err(CommandError::invalid_input("empty command"));
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{Config, ProviderConfig};

    fn state_in(dir: &Path, job_delay_ms: u64) -> (AppState, mpsc::Receiver<QueueEvent>) {
        let mut settings = Settings::default();
        settings.pipeline.chunk_delay_ms = 0;
        settings.pipeline.pass_delay_ms = 0;
        settings.queue.job_delay_ms = job_delay_ms;
        AppState::new(Config::at(dir.join("data")), settings, &ProviderConfig::Echo)
    }

    /// Run a script and return only the command responses, in order.
    async fn script(
        state: &AppState,
        events: mpsc::Receiver<QueueEvent>,
        input: &str,
    ) -> Vec<Value> {
        let output = serve(state, events, input.as_bytes(), Vec::new())
            .await
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str::<Value>(line).unwrap())
            .filter(|value| value.get("command").is_some())
            .collect()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(split_args("add a.txt  b.txt").unwrap(), vec!["add", "a.txt", "b.txt"]);
        assert_eq!(
            split_args(r#"add "my file.txt" 'other one.md'"#).unwrap(),
            vec!["add", "my file.txt", "other one.md"]
        );
        assert_eq!(split_args(r#"save """#).unwrap(), vec!["save", ""]);
        assert!(matches!(
            split_args("add \"open"),
            Err(CommandError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_process_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.md");
        std::fs::write(&first, "First document").unwrap();
        std::fs::write(&second, "Second document").unwrap();
        let archive = dir.path().join("out.zip");

        let (state, events) = state_in(dir.path(), 0);
        let input = format!(
            "add \"{}\" \"{}\"\nstart\n\nwait\nexport \"{}\"\nquit\nstatus\n",
            first.display(),
            second.display(),
            archive.display()
        );
        let responses = script(&state, events, &input).await;

        let commands: Vec<_> = responses.iter().map(|r| r["command"].clone()).collect();
        assert_eq!(commands, vec!["add", "start", "wait", "export", "quit"]);
        assert!(responses.iter().all(|r| r["ok"] == true));

        assert_eq!(responses[0]["data"]["ids"].as_array().unwrap().len(), 2);
        assert_eq!(responses[1]["data"]["state"], "running");
        assert_eq!(responses[2]["data"]["state"], "idle");
        assert_eq!(responses[2]["data"]["stats"]["completed"], 2);
        assert_eq!(responses[3]["data"]["documents"], 2);
        assert!(archive.is_file());
        state.queue.shutdown();
    }

    #[tokio::test]
    async fn test_error_responses() {
        let dir = tempfile::tempdir().unwrap();
        let (state, events) = state_in(dir.path(), 0);
        let input = "frobnicate\nexport out.zip\nadd\nadd 'unterminated\nclear\n";
        let responses = script(&state, events, input).await;

        assert_eq!(responses.len(), 5);
        let codes: Vec<_> = responses[..4]
            .iter()
            .map(|r| {
                assert_eq!(r["ok"], false);
                r["error"]["code"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(
            codes,
            ["invalid_command", "nothing_to_export", "invalid_input", "invalid_input"]
        );
        // Clearing an idle, empty queue is fine.
        assert_eq!(responses[4]["ok"], true);
        assert_eq!(responses[4]["data"]["removed"], 0);
        state.queue.shutdown();
    }

    #[tokio::test]
    async fn test_add_reads_directory_off_the_command_loop() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("to redact");
        std::fs::create_dir(&input_dir).unwrap();
        std::fs::write(input_dir.join("a.txt"), "Alpha").unwrap();
        std::fs::write(input_dir.join("b.md"), "Beta").unwrap();
        std::fs::write(input_dir.join("notes.png"), "skip").unwrap();

        let (state, events) = state_in(dir.path(), 0);
        let input = format!(
            "add \"{}\"\nadd \"{}\"\nstatus\n",
            input_dir.display(),
            dir.path().join("missing.txt").display()
        );
        let responses = script(&state, events, &input).await;

        assert_eq!(responses[0]["ok"], true);
        assert_eq!(responses[0]["data"]["ids"].as_array().unwrap().len(), 2);
        assert_eq!(responses[1]["error"]["code"], "invalid_input");
        assert_eq!(responses[2]["data"]["stats"]["total"], 2);
        state.queue.shutdown();
    }

    #[tokio::test]
    async fn test_add_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.txt");
        std::fs::write(&doc, "Some text").unwrap();

        let (state, events) = state_in(dir.path(), 3_600_000);
        let input = format!("add \"{0}\"\nstart\nadd \"{0}\"\nstatus\n", doc.display());
        let responses = script(&state, events, &input).await;

        assert_eq!(responses[2]["ok"], false);
        assert_eq!(responses[2]["error"]["code"], "queue_busy");
        assert_eq!(responses[3]["data"]["stats"]["total"], 1);
        state.queue.shutdown();
    }

    #[tokio::test]
    async fn test_clear_refused_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("doc.txt");
        std::fs::write(&doc, "Some text").unwrap();

        // Long job delay keeps the scheduler in its pacing pause.
        let (state, events) = state_in(dir.path(), 3_600_000);
        let input = format!("add \"{}\"\nstart\nclear\nstop\n", doc.display());
        let responses = script(&state, events, &input).await;

        assert_eq!(responses[1]["data"]["state"], "running");
        assert_eq!(responses[2]["ok"], false);
        assert_eq!(responses[2]["error"]["code"], "queue_busy");
        assert_eq!(responses[3]["data"]["state"], "stopping");
        state.queue.shutdown();
    }

    #[tokio::test]
    async fn test_ping_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("memo.txt");
        std::fs::write(&doc, "Memo").unwrap();
        let out = dir.path().join("saved");

        let (state, events) = state_in(dir.path(), 0);
        let input = format!(
            "ping\nadd \"{}\"\nstart\nwait\nsave \"{}\"\njobs\n",
            doc.display(),
            out.display()
        );
        let responses = script(&state, events, &input).await;

        assert_eq!(responses[0]["data"]["provider"], "echo");
        assert_eq!(responses[4]["ok"], true);
        assert!(out.join("anonymized_memo.docx").is_file());
        assert_eq!(responses[5]["data"][0]["status"], "completed");
        assert_eq!(responses[5]["data"][0]["name"], "memo.txt");
        state.queue.shutdown();
    }
}
