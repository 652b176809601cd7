//! Callrecorder - silent-participant call recorder
//!
//! The recording pipeline is driven by the platform adapter through the
//! library API. This binary covers operations on what is left on disk:
//! `callrecorder calls` lists working directories, `callrecorder package`
//! retries packaging and upload for one of them.

use callrecorder::call::{Packager, UploadOutcome};
use callrecorder::cli::{Cli, Commands};
use callrecorder::config::{self, Config, UploadBackend};
use callrecorder::recording::{CallLayout, RecordingRegistry};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("callrecorder={},warn", log_level))),
        )
        .with_target(false)
        .init();

    // Load configuration
    let mut config = config::load_config(cli.config.as_deref())?;

    // Apply CLI overrides
    if let Some(root) = cli.output_root {
        config.output.root = root.to_string_lossy().into_owned();
    }
    if cli.no_upload {
        config.upload.backend = UploadBackend::Disabled;
    }

    match cli.command.unwrap_or(Commands::Config) {
        Commands::Config => {
            show_config(&config)?;
        }

        Commands::Calls => {
            list_calls(&config)?;
        }

        Commands::Package { call_id, name } => {
            package_call(&config, &call_id, name.as_deref()).await?;
        }

        Commands::Init { force } => {
            init_config(cli.config, force)?;
        }
    }

    Ok(())
}

/// Write the default config file
fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let Some(config_path) = path.or_else(Config::default_path) else {
        anyhow::bail!("Could not determine config directory");
    };

    if config_path.exists() && !force {
        println!("Config file exists: {:?}", config_path);
        println!("  Use --force to overwrite");
        return Ok(());
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&config_path, config::DEFAULT_CONFIG)?;
    println!("✓ Created: {:?}", config_path);
    Ok(())
}

/// List call working directories under the output root
fn list_calls(config: &Config) -> anyhow::Result<()> {
    let root = config.output.root_dir();
    if !root.exists() {
        println!("No recordings at {:?}", root);
        return Ok(());
    }

    let mut calls: Vec<PathBuf> = std::fs::read_dir(&root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .map(|n| n != config.output.events_folder.as_str())
                .unwrap_or(false)
        })
        .collect();
    calls.sort();

    if calls.is_empty() {
        println!("No calls left in {:?}", root);
        return Ok(());
    }

    println!("Calls in {:?}:\n", root);
    for dir in calls {
        let layout = CallLayout::from_dir(dir, &config.output);
        let call_id = layout.call_id().unwrap_or("?").to_string();

        let status = match RecordingRegistry::load_manifest(&layout.call_dir) {
            Ok(registry) => {
                let entries = registry.snapshot();
                let done = entries.iter().filter(|e| e.is_process_done).count();
                match registry.audio_entry() {
                    Some(audio) => format!(
                        "{}/{} files done, {}s audio",
                        done,
                        entries.len(),
                        audio.during_seconds()
                    ),
                    None => format!("{}/{} files done, no audio", done, entries.len()),
                }
            }
            Err(_) => "no manifest".to_string(),
        };

        let archives = std::fs::read_dir(&layout.call_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("zip"))
            .count();

        println!(
            "  {}  {}{}",
            call_id,
            status,
            if archives > 0 { "  [archived]" } else { "" }
        );
    }
    Ok(())
}

/// Re-run packaging for a call from its manifest
async fn package_call(config: &Config, call_id: &str, name: Option<&str>) -> anyhow::Result<()> {
    let layout = CallLayout::new(&config.output, call_id);
    if !layout.call_dir.exists() {
        anyhow::bail!("No working directory for call {} at {:?}", call_id, layout.call_dir);
    }

    let registry = RecordingRegistry::load_manifest(&layout.call_dir)?;
    tracing::info!("Loaded {} recording entries for call {}", registry.len(), call_id);

    let packager = Packager::from_config(config);
    let report = packager
        .package(call_id, &layout, &registry, name.unwrap_or(call_id))
        .await?;

    println!("Archive: {:?}", report.archive);
    match report.upload {
        None => println!("Upload: disabled"),
        Some(UploadOutcome {
            succeeded: true,
            web_url,
            ..
        }) => println!(
            "Upload: ✓ {}",
            web_url.unwrap_or_else(|| "(no url returned)".to_string())
        ),
        Some(_) => println!("Upload: ✗ failed, working directory kept"),
    }
    Ok(())
}

fn show_config(config: &Config) -> anyhow::Result<()> {
    println!("Current Configuration\n");
    println!("=====================\n");

    println!("[output]");
    println!("  root = {:?}", config.output.root);
    println!("  (resolves to: {:?})", config.output.root_dir());
    println!("  audio_folder = {:?}", config.output.audio_folder);
    println!("  video_folder = {:?}", config.output.video_folder);
    println!("  vbss_folder = {:?}", config.output.vbss_folder);
    println!("  events_folder = {:?}", config.output.events_folder);

    println!("\n[media]");
    println!("  queue_capacity = {}", config.media.queue_capacity);
    println!("  write_silence = {}", config.media.write_silence);
    println!(
        "  max_consecutive_errors = {}",
        config.media.max_consecutive_errors
    );
    println!("  max_lane_restarts = {}", config.media.max_lane_restarts);

    println!("\n[sockets]");
    println!("  multiview_sockets = {}", config.sockets.multiview_sockets);

    println!("\n[packaging]");
    println!(
        "  wait_for_files_secs = {}",
        config.packaging.wait_for_files_secs
    );
    println!("  poll_interval_ms = {}", config.packaging.poll_interval_ms);
    println!("  capture_events = {}", config.packaging.capture_events);
    println!("  archiver = {:?}", config.packaging.archiver);

    println!("\n[upload]");
    println!("  backend = {:?}", config.upload.backend);
    println!("  target = {:?}", config.upload.target);
    if config.upload.backend == UploadBackend::Directory {
        println!("  (resolves to: {:?})", config.upload.target_path());
    }
    println!("  relative_path = {:?}", config.upload.relative_path);
    println!("  timeout_secs = {}", config.upload.timeout_secs);
    println!(
        "  api_key = {}",
        if config.upload.api_key.is_some() { "(set)" } else { "(not set)" }
    );

    println!("\n[mapping]");
    println!("  root = {:?}", config.mapping.root);
    println!("  (resolves to: {:?})", config.mapping.root_dir());
    println!("  container = {:?}", config.mapping.container);

    println!("\n---");
    println!(
        "Config file: {:?}",
        Config::default_path().unwrap_or_else(|| PathBuf::from("(not found)"))
    );

    Ok(())
}
