//! LocalMind — local model manager and search client.

use std::path::PathBuf;
use std::sync::Arc;

use localmind_core::{CapabilityProbe, LocalMindConfig, SystemProbe};
use localmind_models::{CompatibilityScorer, DownloadStart, LifecycleEvent};
use localmind_runtime::Runtime;
use localmind_search::{DispatchOutcome, MockSearchBackend, ResultSource};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn resolve_data_dir() -> PathBuf {
    std::env::var("LOCALMIND_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

fn print_help() {
    println!("LocalMind — local AI model manager and search client");
    println!();
    println!("Usage: localmind <command> [args]");
    println!();
    println!("Commands:");
    println!("  probe                    Show detected device capabilities");
    println!("  models                   List models with status and compatibility");
    println!("  recommend                List models recommended for this device");
    println!("  score <model>            Show the compatibility verdict for a model");
    println!("  download <model>         Download a model (Ctrl-C cancels)");
    println!("  select <model>           Make an installed model current");
    println!("  remove <model>           Uninstall a model");
    println!("  search [--offline] <q>   Search with the current model");
    println!("  status                   Print runtime status as JSON");
    println!("  reset                    Forget installed models and selection");
    println!("  help                     Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("help");

    // Commands that need no runtime.
    match command {
        "--help" | "-h" | "help" => {
            print_help();
            return Ok(());
        }
        "probe" => {
            let caps = SystemProbe::from_env().detect();
            println!("{}", serde_json::to_string_pretty(&caps)?);
            return Ok(());
        }
        _ => {}
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());
    let config = LocalMindConfig::from_env(&data_dir)?;

    let offline = args.iter().any(|a| a == "--offline");
    let runtime = if offline {
        Runtime::builder(config)
            .search_backend(Arc::new(MockSearchBackend::new()))
            .build()?
    } else {
        Runtime::new(config)?
    };

    let result = run(&runtime, command, &args[2..]).await;
    runtime.shutdown()?;
    result
}

async fn run(runtime: &Runtime, command: &str, rest: &[String]) -> anyhow::Result<()> {
    let manager = runtime.manager();

    match command {
        "models" => {
            for model in runtime.status().models {
                let marker = if model.current { "*" } else { " " };
                let progress = model
                    .download_progress
                    .filter(|_| model.status == localmind_models::ModelStatus::Downloading)
                    .map(|p| format!(" {:.0}%", p))
                    .unwrap_or_default();
                println!(
                    "{} {:<12} {:<24} {:>8}  {:<11}{}  {}{}",
                    marker,
                    model.id,
                    model.display_name,
                    model.size,
                    model.status.to_string(),
                    progress,
                    if model.can_run { "runs " } else { "cannot run " },
                    model.performance,
                );
            }
        }
        "recommend" => {
            for id in CompatibilityScorer::recommend(&runtime.capabilities()) {
                println!("{}", id);
            }
        }
        "score" => {
            let model_id = required(rest, "score <model>")?;
            let score = manager.score(model_id);
            println!("{}", serde_json::to_string_pretty(&score)?);
        }
        "download" => {
            let model_id = required(rest, "download <model>")?;
            let mut events = manager.subscribe();
            match manager.start_download(model_id)? {
                DownloadStart::Started => {}
                DownloadStart::AlreadyInstalled => {
                    println!("{} is already installed", model_id);
                    return Ok(());
                }
                DownloadStart::AlreadyDownloading => {
                    println!("{} is already downloading", model_id);
                    return Ok(());
                }
            }

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        manager.cancel_download(model_id)?;
                        println!("\nCancelled");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) if event.model_id() != model_id => {}
                        Ok(LifecycleEvent::DownloadProgress { progress, .. }) => {
                            println!("{}: {:.0}%", model_id, progress);
                        }
                        Ok(LifecycleEvent::DownloadFinished { .. }) => {
                            println!("{} installed", model_id);
                            break;
                        }
                        Ok(LifecycleEvent::DownloadFailed { error, .. }) => {
                            anyhow::bail!("download of {} failed: {}", model_id, error);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(_)) => {}
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            println!("Current model: {}", runtime.status().current_model_id);
        }
        "select" => {
            let model_id = required(rest, "select <model>")?;
            if manager.select_current(model_id)? {
                println!("Current model: {}", model_id);
            } else {
                println!("{} must be installed and runnable on this device", model_id);
            }
        }
        "remove" => {
            let model_id = required(rest, "remove <model>")?;
            if manager.remove_model(model_id)? {
                println!("Removed {}", model_id);
            } else {
                println!("{} is not removable", model_id);
            }
        }
        "search" => {
            let query: Vec<&str> = rest
                .iter()
                .map(String::as_str)
                .filter(|a| *a != "--offline")
                .collect();
            if query.is_empty() {
                anyhow::bail!("Usage: localmind search [--offline] <query>");
            }

            match runtime.dispatcher().search_now(&query.join(" ")).await {
                DispatchOutcome::Resolved {
                    source, response, ..
                } => {
                    if source == ResultSource::Mock {
                        println!("(search service unavailable, showing local results)");
                    }
                    println!(
                        "{} results in {} ms using {}",
                        response.total_results, response.processing_time_ms, response.model_used
                    );
                    for result in response.results {
                        println!("  {:.2}  [{}] {}", result.score, result.file_type, result.title);
                    }
                }
                DispatchOutcome::Superseded { .. } | DispatchOutcome::Failed { .. } => {
                    println!("No results");
                }
            }
        }
        "status" => {
            println!("{}", serde_json::to_string_pretty(&runtime.status())?);
        }
        "reset" => {
            manager.clear_persisted()?;
            println!("Model state reset");
        }
        other => {
            anyhow::bail!("Unknown command: {}. Use 'localmind help' for usage.", other);
        }
    }

    Ok(())
}

fn required<'a>(rest: &'a [String], usage: &str) -> anyhow::Result<&'a str> {
    rest.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("Usage: localmind {}", usage))
}
