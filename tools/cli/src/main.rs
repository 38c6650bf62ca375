//! LedgerBridge CLI - Command line interface for account authorization
//! and sync runs.
//!
//! Workspace tables and sync bookkeeping live in a JSON state file so
//! consecutive invocations build on each other; tokens are sealed into a
//! separate token file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ledgerbridge_netsuite::{oauth, FileSecretStore, NetSuiteClient, NetSuiteConfig, SecretStore};
use ledgerbridge_sync::{
    mappers, ConflictChoice, ConflictStrategy, EntityMapper, MemoryLocalStore,
    MemoryMetadataStore, MemoryRunLogStore, RunStatus, ScheduleMode, SyncConfig, SyncDirection,
    SyncEngine, SyncMetadata, SyncRunLog, SyncScheduler, SyncStatus, SyncSummary, SyncType,
};

#[derive(Parser)]
#[command(name = "ledgerbridge")]
#[command(about = "LedgerBridge - NetSuite workspace synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Account configuration JSON.
    #[arg(short, long, default_value = "ledgerbridge.json")]
    config: PathBuf,

    /// Workspace state JSON (tables and sync bookkeeping).
    #[arg(long, default_value = "ledgerbridge-state.json")]
    state_file: PathBuf,

    /// Sealed token store.
    #[arg(long, default_value = "ledgerbridge-tokens.json")]
    tokens_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL to visit to authorize the integration.
    AuthUrl {
        /// Opaque state echoed back on the redirect.
        #[arg(short, long, default_value = "ledgerbridge-cli")]
        state: String,
    },

    /// Exchange an authorization code for tokens and store them.
    Exchange {
        /// Authorization code from the redirect URI.
        code: String,
    },

    /// Show the stored token record.
    Tokens {
        /// Remove the stored tokens instead.
        #[arg(long)]
        clear: bool,
    },

    /// Fetch one remote record and print it as JSON.
    Get {
        /// Remote record type, e.g. "customer".
        record_type: String,

        /// Remote internal id.
        id: String,

        /// Comma-separated fields to select (default: all).
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Run a SuiteQL query and print the matching rows.
    Query {
        /// SuiteQL statement.
        sql: String,

        /// Maximum rows to return.
        #[arg(short, long, default_value_t = 100)]
        limit: u32,
    },

    /// Pull and push one entity, or every entity.
    Sync {
        /// Entity to sync: customer, vendor, project, invoice, or
        /// vendor-bill. All of them when omitted.
        #[arg(short, long)]
        entity: Option<String>,

        /// Conflict handling: "remote-wins", "local-wins", "newest-wins",
        /// or "manual".
        #[arg(long, default_value = "newest-wins")]
        strategy: String,

        /// Keep running, repeating the pass every N seconds.
        #[arg(short, long)]
        watch: Option<u64>,
    },

    /// Show recent sync runs.
    History {
        /// Maximum runs to print.
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List records flagged for manual conflict resolution.
    Conflicts,

    /// Resolve one flagged conflict.
    Resolve {
        /// Metadata id printed by `conflicts`.
        id: String,

        /// Side to keep: "local" or "remote".
        #[arg(short, long)]
        keep: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let paths = Paths {
        config: cli.config,
        state: cli.state_file,
        tokens: cli.tokens_file,
    };

    match cli.command {
        Commands::AuthUrl { state } => cmd_auth_url(&paths, &state),

        Commands::Exchange { code } => cmd_exchange(&paths, &code).await,

        Commands::Tokens { clear } => cmd_tokens(&paths, clear).await,

        Commands::Get {
            record_type,
            id,
            fields,
        } => cmd_get(&paths, &record_type, &id, &fields).await,

        Commands::Query { sql, limit } => cmd_query(&paths, &sql, limit).await,

        Commands::Sync {
            entity,
            strategy,
            watch,
        } => cmd_sync(&paths, entity.as_deref(), &strategy, watch).await,

        Commands::History { limit } => cmd_history(&paths, limit),

        Commands::Conflicts => cmd_conflicts(&paths),

        Commands::Resolve { id, keep } => cmd_resolve(&paths, &id, &keep).await,
    }
}

/// Where the three on-disk files live.
struct Paths {
    config: PathBuf,
    state: PathBuf,
    tokens: PathBuf,
}

/// Workspace tables and sync bookkeeping, persisted between invocations.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkspaceState {
    #[serde(default)]
    tables: HashMap<String, HashMap<String, Value>>,
    #[serde(default)]
    metadata: Vec<SyncMetadata>,
    #[serde(default)]
    runs: Vec<SyncRunLog>,
}

impl WorkspaceState {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Invalid state file {}", path.display()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Failed to serialize state")?;
        std::fs::write(path, data)
            .with_context(|| format!("Failed to write state file {}", path.display()))
    }
}

/// Engine plus the stores it runs over, seeded from one state file.
struct Workspace {
    engine: SyncEngine,
    metadata: Arc<MemoryMetadataStore>,
    runs: Arc<MemoryRunLogStore>,
    local: Arc<MemoryLocalStore>,
}

impl Workspace {
    fn open(client: &NetSuiteClient, state: WorkspaceState, config: SyncConfig) -> Self {
        let metadata = Arc::new(MemoryMetadataStore::from_rows(state.metadata));
        let runs = Arc::new(MemoryRunLogStore::from_runs(state.runs));
        let local = Arc::new(MemoryLocalStore::from_tables(state.tables));
        let engine = SyncEngine::new(client, metadata.clone(), runs.clone(), local.clone(), config);
        Self {
            engine,
            metadata,
            runs,
            local,
        }
    }

    async fn freeze(&self) -> WorkspaceState {
        WorkspaceState {
            tables: self.local.snapshot().await,
            metadata: self.metadata.snapshot().await,
            runs: self.runs.snapshot().await,
        }
    }
}

fn load_config(paths: &Paths) -> Result<NetSuiteConfig> {
    let data = std::fs::read_to_string(&paths.config)
        .with_context(|| format!("Failed to read config file {}", paths.config.display()))?;
    NetSuiteConfig::from_json(&data).context("Invalid config file")
}

fn build_client(paths: &Paths) -> Result<NetSuiteClient> {
    let config = load_config(paths)?;
    let store = Arc::new(FileSecretStore::new(&paths.tokens));
    NetSuiteClient::new(config, store).context("Failed to build client")
}

/// Print the authorization URL.
fn cmd_auth_url(paths: &Paths, state: &str) -> Result<()> {
    let config = load_config(paths)?;
    let url =
        oauth::authorize_url(&config, state).context("Failed to build authorization URL")?;

    println!("Visit this URL to authorize LedgerBridge:");
    println!("  {}", url);
    println!();
    println!("Then store the returned code with:");
    println!("  ledgerbridge exchange <code>");

    Ok(())
}

/// Exchange an authorization code and seal the returned tokens.
async fn cmd_exchange(paths: &Paths, code: &str) -> Result<()> {
    let client = build_client(paths)?;
    info!(
        "Exchanging authorization code for account {}",
        client.config().account_id
    );

    let tokens = oauth::exchange_code(client.config(), code)
        .await
        .context("Code exchange failed")?;
    let expires_at = tokens.expires_at();

    client
        .tokens()
        .store_tokens(tokens)
        .await
        .context("Failed to store tokens")?;

    println!("Tokens stored.");
    println!("  Account: {}", client.config().account_id);
    println!("  Access token valid until: {}", expires_at);

    Ok(())
}

/// Show or clear the stored token record.
async fn cmd_tokens(paths: &Paths, clear: bool) -> Result<()> {
    let config = load_config(paths)?;
    let store = FileSecretStore::new(&paths.tokens);

    if clear {
        store
            .delete(config.account_id.as_str())
            .await
            .context("Failed to clear tokens")?;
        println!("Stored tokens cleared for account {}.", config.account_id);
        return Ok(());
    }

    match store.load(config.account_id.as_str()).await? {
        Some(record) => {
            let expires_at =
                record.issued_at + chrono::Duration::seconds(record.expires_in as i64);
            let status = if Utc::now() >= expires_at {
                "expired; refreshed on next use"
            } else {
                "valid"
            };
            println!("Tokens stored for account {}:", record.account);
            println!("  Type: {}", record.token_type);
            println!("  Issued: {}", record.issued_at);
            println!("  Expires: {} ({})", expires_at, status);
        }
        None => {
            println!("No tokens stored for account {}.", config.account_id);
            println!("Run `ledgerbridge auth-url` to begin authorization.");
        }
    }

    Ok(())
}

/// Fetch one record through the REST record API.
async fn cmd_get(paths: &Paths, record_type: &str, id: &str, fields: &[String]) -> Result<()> {
    let client = build_client(paths)?;
    let fields = if fields.is_empty() {
        None
    } else {
        Some(fields)
    };

    let record = client
        .resources()
        .get(record_type, id, fields)
        .await
        .with_context(|| format!("Failed to fetch {}/{}", record_type, id))?;

    println!("{}", serde_json::to_string_pretty(&record)?);

    Ok(())
}

/// Run one SuiteQL page and print each row as a JSON line.
async fn cmd_query(paths: &Paths, sql: &str, limit: u32) -> Result<()> {
    let client = build_client(paths)?;
    let page = client
        .query()
        .query(sql, limit, 0)
        .await
        .context("Query failed")?;

    for row in &page.items {
        println!("{}", serde_json::to_string(row)?);
    }
    if page.has_more {
        println!("({} rows shown; more available beyond --limit)", page.items.len());
    } else {
        println!("({} rows)", page.items.len());
    }

    Ok(())
}

/// Run sync passes, once or on an interval.
async fn cmd_sync(
    paths: &Paths,
    entity: Option<&str>,
    strategy: &str,
    watch: Option<u64>,
) -> Result<()> {
    let strategy = parse_strategy(strategy)?;
    let selected = select_mappers(entity)?;

    let client = build_client(paths)?;
    let state = WorkspaceState::load(&paths.state)?;
    let config = SyncConfig {
        conflict_strategy: strategy,
        ..SyncConfig::default()
    };
    let workspace = Arc::new(Workspace::open(&client, state, config));

    match watch {
        None => {
            let result = run_pass(&workspace, &selected).await;
            // Failed runs still produced bookkeeping worth keeping.
            workspace.freeze().await.save(&paths.state)?;
            let summary = result.context("Sync pass failed")?;
            print_summary(&summary);
        }
        Some(secs) => watch_loop(workspace, selected, paths.state.clone(), secs).await?,
    }

    Ok(())
}

/// Full sync of every selected entity, aggregated into one summary.
async fn run_pass(
    workspace: &Workspace,
    mappers: &[Box<dyn EntityMapper>],
) -> ledgerbridge_common::Result<SyncSummary> {
    let mut summary = SyncSummary::default();
    for mapper in mappers {
        let report = workspace.engine.full_sync(mapper.as_ref()).await?;
        summary.pulled += report.pull.pulled;
        summary.pushed += report.push.pushed;
        summary.conflicts += report.pull.conflicts;
        summary.failed += report.pull.errors.len() as u64 + report.push.failed;
    }
    Ok(summary)
}

/// Drive the scheduler until Ctrl-C, saving state after every pass.
async fn watch_loop(
    workspace: Arc<Workspace>,
    mappers: Vec<Box<dyn EntityMapper>>,
    state_path: PathBuf,
    secs: u64,
) -> Result<()> {
    let interval = Duration::from_secs(secs.max(1));
    let (scheduler, task) = SyncScheduler::new(ScheduleMode::Periodic { interval });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received; stopping");
            scheduler.shutdown().await;
        }
    });

    println!(
        "Syncing every {}s; press Ctrl-C to stop.",
        interval.as_secs()
    );

    let mappers = Arc::new(mappers);
    task.run(move || {
        let workspace = workspace.clone();
        let mappers = mappers.clone();
        let state_path = state_path.clone();
        async move {
            let result = run_pass(&workspace, &mappers).await;
            if let Err(e) = workspace.freeze().await.save(&state_path) {
                error!("Failed to persist workspace state: {:#}", e);
            }
            if let Ok(summary) = &result {
                print_summary(summary);
            }
            result
        }
    })
    .await;

    Ok(())
}

fn select_mappers(entity: Option<&str>) -> Result<Vec<Box<dyn EntityMapper>>> {
    match entity {
        None => Ok(mappers::all()),
        Some(name) => match mappers::by_name(name) {
            Some(mapper) => Ok(vec![mapper]),
            None => {
                anyhow::bail!(
                    "Unknown entity '{}'. Use: customer, vendor, project, invoice, or vendor-bill",
                    name
                );
            }
        },
    }
}

fn parse_strategy(text: &str) -> Result<ConflictStrategy> {
    match text {
        "remote-wins" => Ok(ConflictStrategy::RemoteWins),
        "local-wins" => Ok(ConflictStrategy::LocalWins),
        "newest-wins" => Ok(ConflictStrategy::NewestWins),
        "manual" => Ok(ConflictStrategy::Manual),
        _ => {
            anyhow::bail!("Invalid strategy. Use: remote-wins, local-wins, newest-wins, or manual");
        }
    }
}

fn print_summary(summary: &SyncSummary) {
    println!("Sync pass complete.");
    println!("  Pulled: {}", summary.pulled);
    println!("  Pushed: {}", summary.pushed);
    println!("  Conflicts: {}", summary.conflicts);
    println!("  Failed: {}", summary.failed);
    if summary.conflicts > 0 {
        println!("Run `ledgerbridge conflicts` to review flagged records.");
    }
}

/// Show recent runs from the state file, newest first.
fn cmd_history(paths: &Paths, limit: usize) -> Result<()> {
    let state = WorkspaceState::load(&paths.state)?;
    let mut runs = state.runs;
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs.truncate(limit);

    if runs.is_empty() {
        println!("No sync runs recorded yet.");
        return Ok(());
    }

    println!("Recent sync runs:");
    for run in runs {
        let note = run
            .error_summary
            .map(|e| format!(" ({})", e))
            .unwrap_or_default();
        println!(
            "  {}  {:<4} {:<5} {:<12} {} processed, {} failed  {}{}",
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            direction_label(run.direction),
            type_label(run.sync_type),
            run.entity_type,
            run.records_processed,
            run.records_failed,
            status_label(run.status),
            note
        );
    }

    Ok(())
}

/// List conflicts from the state file.
fn cmd_conflicts(paths: &Paths) -> Result<()> {
    let state = WorkspaceState::load(&paths.state)?;
    let flagged: Vec<&SyncMetadata> = state
        .metadata
        .iter()
        .filter(|m| m.sync_status == SyncStatus::Conflict)
        .collect();

    if flagged.is_empty() {
        println!("No conflicts waiting on resolution.");
        return Ok(());
    }

    println!("{} conflict(s) waiting on resolution:", flagged.len());
    for meta in flagged {
        println!("  {}", meta.id);
        println!("    Table: {}", meta.local_table);
        println!("    Local record: {}", meta.local_record_id);
        if let Some(remote_id) = &meta.remote_id {
            println!("    Remote record: {}", remote_id);
        }
        if let Some(payload) = &meta.conflict_payload {
            println!("    Reason: {}", payload.reason);
            println!("    Flagged: {}", payload.flagged_at);
        }
    }
    println!();
    println!("Resolve with: ledgerbridge resolve <id> --keep local|remote");

    Ok(())
}

/// Resolve one conflict and persist the outcome.
async fn cmd_resolve(paths: &Paths, id: &str, keep: &str) -> Result<()> {
    let choice = match keep {
        "local" => ConflictChoice::UseLocal,
        "remote" => ConflictChoice::UseRemote,
        _ => {
            anyhow::bail!("Invalid choice. Use: local or remote");
        }
    };

    let client = build_client(paths)?;
    let state = WorkspaceState::load(&paths.state)?;
    let workspace = Workspace::open(&client, state, SyncConfig::default());

    let resolved = workspace
        .engine
        .resolve_conflict(id, choice)
        .await
        .context("Failed to resolve conflict")?;
    workspace.freeze().await.save(&paths.state)?;

    match choice {
        ConflictChoice::UseLocal => {
            println!(
                "Kept the local copy; {}/{} is queued for the next push.",
                resolved.local_table, resolved.local_record_id
            );
        }
        ConflictChoice::UseRemote => {
            println!(
                "Applied the remote copy to {}/{}.",
                resolved.local_table, resolved.local_record_id
            );
        }
    }

    Ok(())
}

fn direction_label(direction: SyncDirection) -> &'static str {
    match direction {
        SyncDirection::Pull => "pull",
        SyncDirection::Push => "push",
    }
}

fn type_label(sync_type: SyncType) -> &'static str {
    match sync_type {
        SyncType::Full => "full",
        SyncType::Delta => "delta",
        SyncType::Push => "push",
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut state = WorkspaceState::default();
        state.tables.insert(
            "customers".to_string(),
            HashMap::from([("local-1".to_string(), json!({"name": "Acme"}))]),
        );
        state
            .metadata
            .push(SyncMetadata::new_pending("customers", "local-1", "customer"));
        state.save(&path).unwrap();

        let loaded = WorkspaceState::load(&path).unwrap();
        assert_eq!(loaded.tables["customers"]["local-1"]["name"], "Acme");
        assert_eq!(loaded.metadata.len(), 1);
        assert_eq!(loaded.metadata[0].sync_status, SyncStatus::PendingPush);
    }

    #[test]
    fn test_missing_state_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = WorkspaceState::load(&dir.path().join("absent.json")).unwrap();
        assert!(state.tables.is_empty());
        assert!(state.metadata.is_empty());
        assert!(state.runs.is_empty());
    }

    #[test]
    fn test_parse_strategy_spellings() {
        assert_eq!(
            parse_strategy("newest-wins").unwrap(),
            ConflictStrategy::NewestWins
        );
        assert_eq!(parse_strategy("manual").unwrap(), ConflictStrategy::Manual);
        assert!(parse_strategy("coin-flip").is_err());
    }

    #[test]
    fn test_select_mappers_validates_entity() {
        assert_eq!(select_mappers(None).unwrap().len(), 5);
        assert_eq!(
            select_mappers(Some("vendor-bill")).unwrap()[0].remote_type(),
            "vendorBill"
        );
        assert!(select_mappers(Some("timesheet")).is_err());
    }
}
