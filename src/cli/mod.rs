//! Command-line interface for hvp.
//!
//! Provides commands for inspecting installed libraries, upgrading content
//! between library versions, exporting and importing archives, and running
//! the maintenance tasks.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::adapters::{HubClient, IdentityUpgrader, ParamsUpgrader, ScriptUpgrader};
use crate::api::{ActionRequest, AllowAll, Dispatcher};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    library_overview, library_scope, run_upgrade, tasks, AuditLog, DependencyResolver,
    LibraryRegistry, Store, TokenService, UpgradeCoordinator,
};
use crate::domain::{LibraryId, LibraryManifest};
use crate::restore::{export_archive, import_archive, Archive};

/// User id recorded for actions taken from the command line
const CLI_USER_ID: i64 = 0;

/// hvp - Interactive content library registry and upgrade tool
#[derive(Parser, Debug)]
#[command(name = "hvp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed libraries
    Libraries,

    /// Register a library from its library.json (and semantics.json, if present)
    Register {
        /// Library directory or path to library.json
        path: PathBuf,
    },

    /// Show other installed versions of a library and whether they are upgrade targets
    Candidates {
        /// Library id
        library_id: i64,
    },

    /// Restrict a library (or lift the restriction)
    Restrict {
        /// Library id
        library_id: i64,

        /// Lift the restriction instead
        #[arg(long)]
        lift: bool,
    },

    /// Upgrade all content from one library version to another
    Upgrade {
        /// Source library id
        from: i64,

        /// Target library id
        to: i64,

        /// Command that transforms parameters (stdin/stdout JSON); identity if omitted
        #[arg(short, long)]
        script: Option<String>,
    },

    /// Export contents (and libraries, unless disabled) to an archive
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Import an archive
    Import {
        /// Archive file
        input: PathBuf,
    },

    /// Show recent audit events
    Events {
        /// Maximum number of events to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Run the cleanup tasks (old log entries, temp files)
    Cleanup,

    /// Refresh the cached latest versions from the content type hub
    FetchUpdates,

    /// Call an action endpoint directly
    Action {
        /// Action name (e.g. "libraryupgradeprogress")
        name: String,

        /// Send as POST
        #[arg(long)]
        post: bool,

        /// Parameters as key=value
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Show resolved configuration (debug)
    Config,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let cfg = config::config()?;

        match self.command {
            Commands::Libraries => list_libraries(cfg),
            Commands::Register { path } => register(cfg, &path),
            Commands::Candidates { library_id } => show_candidates(cfg, library_id),
            Commands::Restrict { library_id, lift } => restrict(cfg, library_id, !lift),
            Commands::Upgrade { from, to, script } => upgrade(cfg, from, to, script).await,
            Commands::Export { output } => export(cfg, &output),
            Commands::Import { input } => import(cfg, &input),
            Commands::Events { limit } => list_events(cfg, limit),
            Commands::Cleanup => cleanup(cfg),
            Commands::FetchUpdates => fetch_updates(cfg).await,
            Commands::Action { name, post, params } => call_action(cfg, name, post, params),
            Commands::Config => show_config(cfg),
        }
    }
}

/// Open the configured database, creating its directory if needed
fn open_store(cfg: &ResolvedConfig) -> Result<Store> {
    if let Some(parent) = cfg.database.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Store::open(&cfg.database)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))
}

fn list_libraries(cfg: &ResolvedConfig) -> Result<()> {
    let store = open_store(cfg)?;
    let overview = library_overview(&store)?;

    if overview.is_empty() {
        println!("No libraries installed. Use 'hvp import <archive>' to add some.");
        return Ok(());
    }

    println!(
        "{:<6} {:<40} {:<11} {:>8} {:>10} {:<8} {:<8}",
        "ID", "TITLE", "RESTRICTED", "CONTENT", "DEPENDENTS", "UPGRADE", "HUB"
    );
    println!("{}", "-".repeat(98));

    for row in &overview {
        let restricted = match row.restricted {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        };
        println!(
            "{:<6} {:<40} {:<11} {:>8} {:>10} {:<8} {:<8}",
            row.id,
            truncate(&row.title, 38),
            restricted,
            row.content_count,
            row.dependents,
            if row.upgrades_available { "yes" } else { "" },
            row.hub_update.as_deref().unwrap_or(""),
        );
    }

    println!("\nTotal: {} libraries", overview.len());
    Ok(())
}

/// Read a library manifest, plus the semantics.json stored next to it
fn read_manifest(path: &Path) -> Result<(LibraryManifest, Option<String>)> {
    let manifest_path = if path.is_dir() {
        path.join("library.json")
    } else {
        path.to_path_buf()
    };
    let raw = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read manifest: {}", manifest_path.display()))?;
    let manifest: LibraryManifest = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid manifest: {}", manifest_path.display()))?;

    let semantics_path = manifest_path.with_file_name("semantics.json");
    let semantics = if semantics_path.is_file() {
        Some(std::fs::read_to_string(&semantics_path).with_context(|| {
            format!("Failed to read semantics: {}", semantics_path.display())
        })?)
    } else {
        None
    };
    Ok((manifest, semantics))
}

fn register(cfg: &ResolvedConfig, path: &Path) -> Result<()> {
    let (manifest, semantics) = read_manifest(path)?;
    let store = open_store(cfg)?;
    let id = LibraryRegistry::new(&store).install(&manifest, semantics)?;

    println!("{}", id);
    eprintln!(
        "Registered {} {}.{}.{}",
        manifest.machine_name,
        manifest.major_version,
        manifest.minor_version,
        manifest.patch_version
    );
    Ok(())
}

fn show_candidates(cfg: &ResolvedConfig, library_id: i64) -> Result<()> {
    let store = open_store(cfg)?;
    let registry = LibraryRegistry::new(&store);
    let library = registry.get(LibraryId(library_id))?;
    let candidates =
        DependencyResolver::new(&registry).list_upgrade_candidates(LibraryId(library_id))?;

    println!("{} {}", library.key.machine_name, library.version_string());
    if candidates.is_empty() {
        println!("No other versions installed");
        return Ok(());
    }

    println!("{:<6} {:<12} {:<10}", "ID", "VERSION", "TARGET");
    println!("{}", "-".repeat(30));
    for candidate in candidates {
        println!(
            "{:<6} {:<12} {:<10}",
            candidate.library.id,
            candidate.library.version_string(),
            if candidate.reachable { "yes" } else { "no" }
        );
    }
    Ok(())
}

fn restrict(cfg: &ResolvedConfig, library_id: i64, restrict: bool) -> Result<()> {
    let store = open_store(cfg)?;
    let tokens = TokenService::from_store(&store)?;
    let dispatcher = Dispatcher::new(&store, &tokens, &AllowAll, &cfg.libraries);

    let id = LibraryId(library_id);
    let request = ActionRequest::post("restrictlibrary")
        .as_user(CLI_USER_ID)
        .param("library_id", id.to_string())
        .param("restrict", if restrict { "1" } else { "0" })
        .param("token", tokens.create_token(&library_scope(id)));

    let response = dispatcher.handle(&request);
    if !response.is_success() {
        anyhow::bail!("{}", response.body["message"].as_str().unwrap_or("restrict failed"));
    }

    eprintln!(
        "Library {} {}",
        library_id,
        if restrict { "restricted" } else { "unrestricted" }
    );
    Ok(())
}

async fn upgrade(cfg: &ResolvedConfig, from: i64, to: i64, script: Option<String>) -> Result<()> {
    let store = open_store(cfg)?;
    let tokens = TokenService::from_store(&store)?;
    let coordinator = UpgradeCoordinator::new(&store, &tokens, CLI_USER_ID)
        .with_batch_size(cfg.upgrade.batch_size);

    let upgrader: Box<dyn ParamsUpgrader> = match script {
        Some(command) => Box::new(ScriptUpgrader::from_command_line(
            &command,
            cfg.upgrade.script_timeout(),
        )?),
        None => Box::new(IdentityUpgrader),
    };

    let total = coordinator.content_count(LibraryId(from))?;
    eprintln!(
        "Upgrading {} content(s) from library {} to {} using {} upgrader",
        total,
        from,
        to,
        upgrader.name()
    );

    let report = run_upgrade(&coordinator, upgrader.as_ref(), LibraryId(from), LibraryId(to)).await?;

    eprintln!("\nUpgraded: {}", report.upgraded);
    if !report.skipped.is_empty() {
        let ids: Vec<String> = report.skipped.iter().map(|id| id.to_string()).collect();
        eprintln!("Skipped:  {} ({})", report.skipped.len(), ids.join(", "));
    }
    for failure in &report.failed {
        eprintln!("  content {}: {}", failure.content_id, failure.reason);
    }
    Ok(())
}

fn export(cfg: &ResolvedConfig, output: &Path) -> Result<()> {
    let store = open_store(cfg)?;
    let archive = export_archive(&store, cfg.include_libraries_in_backup)?;
    archive.write(output)?;

    eprintln!(
        "Exported {} libraries and {} contents to {}",
        archive.libraries.len(),
        archive.contents.len(),
        output.display()
    );
    Ok(())
}

fn import(cfg: &ResolvedConfig, input: &Path) -> Result<()> {
    let archive = Archive::read(input)?;
    let store = open_store(cfg)?;
    let summary = import_archive(&store, &archive)?;

    println!("Libraries created:     {}", summary.libraries_created);
    println!("Libraries reused:      {}", summary.libraries_reused);
    println!("Dependencies inserted: {}", summary.dependencies_inserted);
    println!("Translations inserted: {}", summary.translations_inserted);
    println!("Contents imported:     {}", summary.contents_imported);
    if summary.contents_skipped > 0 {
        println!("Contents skipped:      {}", summary.contents_skipped);
    }
    if summary.dependencies_dropped > 0 {
        println!("Dependencies dropped:  {}", summary.dependencies_dropped);
    }
    Ok(())
}

fn list_events(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let store = open_store(cfg)?;
    let events = AuditLog::new(&store).recent(limit)?;

    if events.is_empty() {
        println!("No events recorded");
        return Ok(());
    }

    println!(
        "{:<20} {:<18} {:<30} {:<30}",
        "TIME", "TYPE", "CONTENT", "LIBRARY"
    );
    println!("{}", "-".repeat(100));
    for event in events {
        let content = match (event.content_id, event.content_title.as_deref()) {
            (Some(id), Some(title)) => format!("{} {}", id, title),
            (Some(id), None) => id.to_string(),
            _ => String::new(),
        };
        let library = match (event.library_name.as_deref(), event.library_version.as_deref()) {
            (Some(name), Some(version)) => format!("{} {}", name, version),
            (Some(name), None) => name.to_string(),
            _ => String::new(),
        };
        println!(
            "{:<20} {:<18} {:<30} {:<30}",
            event.created_at.format("%Y-%m-%d %H:%M:%S"),
            event.counter_type(),
            truncate(&content, 28),
            truncate(&library, 28),
        );
    }
    Ok(())
}

fn cleanup(cfg: &ResolvedConfig) -> Result<()> {
    let store = open_store(cfg)?;

    let events =
        tasks::remove_old_log_entries(&store, Utc::now(), cfg.retention.log_retention())?;
    let files = tasks::remove_tmpfiles(
        &cfg.tmp_dir(),
        SystemTime::now(),
        cfg.retention.tmpfile_max_age(),
    )?;

    eprintln!("Removed {} old log entries and {} temp files", events, files);
    Ok(())
}

async fn fetch_updates(cfg: &ResolvedConfig) -> Result<()> {
    if !cfg.hub.enabled {
        eprintln!("Content type hub is disabled (set hub.enabled in .hvp/config.yaml)");
        return Ok(());
    }

    let store = open_store(cfg)?;
    let client = HubClient::new(&cfg.hub.url);
    let stored = tasks::look_for_updates(&store, &client).await?;

    eprintln!("Cached {} content type versions from {}", stored, client.url());
    Ok(())
}

fn call_action(
    cfg: &ResolvedConfig,
    name: String,
    post: bool,
    params: Vec<(String, String)>,
) -> Result<()> {
    let store = open_store(cfg)?;
    let tokens = TokenService::from_store(&store)?;
    let dispatcher = Dispatcher::new(&store, &tokens, &AllowAll, &cfg.libraries)
        .with_batch_size(cfg.upgrade.batch_size);

    let mut request = if post {
        ActionRequest::post(name)
    } else {
        ActionRequest::get(name)
    }
    .as_user(CLI_USER_ID);
    for (key, value) in params {
        request = request.param(key, value);
    }

    let response = dispatcher.handle(&request);
    println!(
        "{}",
        serde_json::to_string_pretty(&response.body).context("Failed to render response")?
    );

    if !response.is_success() {
        anyhow::bail!("Action failed with status {}", response.status);
    }
    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) -> Result<()> {
    println!("hvp configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Database:  {}", cfg.database.display());
    println!("  Libraries: {}", cfg.libraries.display());
    println!("  Temp:      {}", cfg.tmp_dir().display());
    println!();
    println!("Upgrade:");
    println!("  Batch size:     {}", cfg.upgrade.batch_size);
    println!("  Script timeout: {}s", cfg.upgrade.script_timeout_seconds);
    println!();
    println!("Retention:");
    println!("  Log entries: {} days", cfg.retention.log_days);
    println!("  Temp files:  {} hours", cfg.retention.tmpfile_hours);
    println!();
    println!("Backup includes libraries: {}", cfg.include_libraries_in_backup);
    println!(
        "Hub: {} ({})",
        if cfg.hub.enabled { "enabled" } else { "disabled" },
        cfg.hub.url
    );

    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
