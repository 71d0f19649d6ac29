//! CLI subcommand handlers.

use crate::{Commands, ConfigAction};
use deepgyn_core::config::{ServiceConfig, load_config};
use deepgyn_core::{
    AppState, ModelHandle, RecordStore, ReportRenderer, ReportRequest, SqliteRecordStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port } => {
            handle_serve(load(workspace, config_file)?, host, port).await
        }
        Commands::Classify { image } => {
            handle_classify(load(workspace, config_file)?, &image).await
        }
        Commands::History { owner, json } => {
            handle_history(&load(workspace, config_file)?, &owner, json)
        }
        Commands::Report { request, output } => {
            handle_report(&load(workspace, config_file)?, &request, output)
        }
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

fn load(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    let config = load_config(Some(workspace), config_file, None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(resolve_paths(config, workspace))
}

/// Anchor relative model, store and font paths at the workspace.
fn resolve_paths(mut config: ServiceConfig, workspace: &Path) -> ServiceConfig {
    let anchor = |p: &Path| -> PathBuf {
        if p.is_relative() {
            workspace.join(p)
        } else {
            p.to_path_buf()
        }
    };
    config.model.path = anchor(&config.model.path);
    if config.store.path.as_os_str() != ":memory:" {
        config.store.path = anchor(&config.store.path);
    }
    config.report.font_dir = config.report.font_dir.as_deref().map(anchor);
    config
}

async fn handle_serve(
    mut config: ServiceConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let state = AppState::from_config(&config)?;
    tracing::info!(
        model_ready = state.model().is_ready(),
        store = %config.store.path.display(),
        "starting DeepGynScan API"
    );
    deepgyn_core::api::run(Arc::new(state), &config.server.host, config.server.port).await?;
    Ok(())
}

async fn handle_classify(config: ServiceConfig, image: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(image)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", image.display(), e))?;
    let model = ModelHandle::load(&config.model);
    let result = tokio::task::spawn_blocking(move || model.analyze(&bytes)).await??;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn handle_history(config: &ServiceConfig, owner: &str, json: bool) -> anyhow::Result<()> {
    let store = SqliteRecordStore::open(&config.store.path)?;
    let records = store.history(owner)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No scans saved for {}.", owner);
        return Ok(());
    }
    println!(
        "{:>5}  {:<20}  {:<24}  {:>4}  {:<22}  {:>10}",
        "ID", "Date", "Patient", "Age", "Category", "Confidence"
    );
    for r in &records {
        println!(
            "{:>5}  {:<20}  {:<24}  {:>4}  {:<22}  {:>9.2}%",
            r.id,
            r.timestamp.format("%Y-%m-%d %H:%M"),
            r.name,
            r.age,
            r.category,
            r.confidence * 100.0
        );
    }
    println!("\n{} scan(s).", records.len());
    Ok(())
}

fn handle_report(
    config: &ServiceConfig,
    request: &Path,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(request)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", request.display(), e))?;
    let request: ReportRequest = serde_json::from_str(&raw)?;
    let renderer = ReportRenderer::new(config.report.clone());
    let output = output.unwrap_or_else(|| PathBuf::from(renderer.filename()));
    let written = renderer.render_to_file(&request, &output)?;
    println!("Report written to {}", written.display());
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = init_config(workspace)?;
            println!("Configuration file: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace, config_file)?;
            println!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Write the default configuration to `<workspace>/.deepgyn/config.toml`
/// unless a file already exists there.
fn init_config(workspace: &Path) -> anyhow::Result<PathBuf> {
    let config_dir = workspace.join(".deepgyn");
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "configuration already exists");
        return Ok(config_path);
    }
    let toml_str = toml::to_string_pretty(&ServiceConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    tracing::info!(path = %config_path.display(), "created default configuration");
    Ok(config_path)
}
