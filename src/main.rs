use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald::account::{AccountRegistry, WebhookDirectory};
use herald::config::{Config, StoreBackend};
use herald::filter::{parse_group_ids, ListAction, ListKind, ListUpdate};
use herald::notice::NoticeStore;
use herald::push::{ChannelReporter, PushMode, PushOrchestrator, PushOutcome};
use herald::scheduler::DailyScheduler;
use herald::store::{Keys, KvStore, MemoryStore, RedisStore, RedisStoreConfig};

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Multi-account announcement broadcaster",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Print Prometheus metrics of this process before exiting
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Arm the daily scheduler and run until interrupted
    Serve,

    /// Broadcast the current notice now
    Push,

    /// Manage the current notice
    #[command(subcommand)]
    Notice(NoticeCommand),

    /// Manage the global whitelist or blacklist
    List {
        /// whitelist or blacklist
        kind: ListKind,

        /// add, del or view
        action: ListAction,

        /// Group ids, or ALL for every group of every account
        ids: Vec<String>,
    },

    /// Inspect and configure accounts
    #[command(subcommand)]
    Account(AccountCommand),
}

#[derive(Subcommand)]
enum NoticeCommand {
    /// Publish a new current notice
    Publish {
        content: String,

        #[arg(long, default_value = "admin")]
        creator: String,
    },

    /// Replace the content of the current notice
    Edit { content: String },

    /// Recall the current notice
    Recall,

    /// Show the current notice
    Show,

    /// List past notices
    History {
        #[arg(short, long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "10")]
        page_size: usize,
    },

    /// Show the progress of a push job
    Progress { job_id: String },
}

#[derive(Subcommand)]
enum AccountCommand {
    /// List online accounts and their groups
    List,

    /// Show account and group counts
    Stats,

    /// Show the last stored group snapshot of an account
    Groups { uin: String },

    /// Enable pushes through every account
    EnableAll,

    /// Disable pushes through every account
    DisableAll,

    /// Change one account's settings
    Set {
        uin: String,

        #[arg(long)]
        enabled: Option<bool>,

        /// Base delay between deliveries (500-10000 ms)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Retry count (0-10)
        #[arg(long)]
        retry_count: Option<u32>,
    },

    /// Manage one account's own whitelist or blacklist
    Rules {
        uin: String,
        kind: ListKind,
        action: ListAction,
        ids: Vec<String>,
    },
}

/// Wired-up services
struct App {
    config: Config,
    notices: Arc<NoticeStore>,
    registry: Arc<AccountRegistry>,
    orchestrator: Arc<PushOrchestrator>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    config.validate().context("Invalid configuration")?;

    setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;

    if let Err(e) = herald::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let app = build_app(config).await?;
    let print_metrics = cli.metrics;

    match cli.command {
        Commands::Serve => serve(&app).await?,
        Commands::Push => push(&app).await?,
        Commands::Notice(command) => notice(&app, command).await?,
        Commands::List { kind, action, ids } => list(&app, kind, action, ids).await?,
        Commands::Account(command) => account(&app, command).await?,
    }

    if print_metrics {
        dump_metrics();
    }
    Ok(())
}

fn dump_metrics() {
    if !herald::metrics::metrics_initialized() {
        println!("Metrics are unavailable.");
        return;
    }
    match herald::metrics::encode_metrics() {
        Ok(text) => print!("{text}"),
        Err(e) => tracing::warn!(error = %e, "Failed to encode metrics"),
    }
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("herald=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("herald={level},warn"))
            .context("Invalid log level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn build_app(config: Config) -> Result<App> {
    let store: Arc<dyn KvStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store; state is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Redis => {
            let redis = RedisStore::connect(&RedisStoreConfig {
                url: config.store.url.clone(),
                pool_size: config.store.pool_size,
            })
            .await
            .context("Failed to connect to Redis")?;
            Arc::new(redis)
        }
    };

    let notices = Arc::new(NoticeStore::new(
        store,
        Keys::new(config.store.key_prefix.clone()),
    ));
    let directory = Arc::new(WebhookDirectory::new(&config.directory)?);
    tracing::info!(accounts = directory.len(), "Loaded webhook accounts");

    let registry = Arc::new(AccountRegistry::new(
        directory,
        Arc::clone(&notices),
        config.accounts.clone(),
    ));
    let orchestrator = Arc::new(PushOrchestrator::new(
        Arc::clone(&registry),
        Arc::clone(&notices),
    ));

    Ok(App {
        config,
        notices,
        registry,
        orchestrator,
    })
}

async fn serve(app: &App) -> Result<()> {
    let scheduler = Arc::new(DailyScheduler::new(
        &app.config.schedule,
        Arc::clone(&app.registry),
        Arc::clone(&app.notices),
        Arc::clone(&app.orchestrator),
    ));

    if !scheduler.start().await {
        println!("Scheduling is disabled (set HERALD_ENABLE_SCHEDULE=true).");
        return Ok(());
    }

    let status = scheduler.status().await;
    if let Some(next) = status.next_run {
        println!("Daily push armed for {}; next run {next}.", status.schedule);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    scheduler.stop().await;
    tracing::info!("Shutting down");
    Ok(())
}

async fn push(app: &App) -> Result<()> {
    let (reporter, mut events) = ChannelReporter::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{event}");
        }
    });

    let outcome = app.orchestrator.push(PushMode::Interactive, &reporter).await;
    drop(reporter);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer stopped unexpectedly");
    }

    if let PushOutcome::Completed(report) = outcome? {
        tracing::info!(job_id = %report.job_id, "Push completed");
    }
    Ok(())
}

async fn notice(app: &App, command: NoticeCommand) -> Result<()> {
    match command {
        NoticeCommand::Publish { content, creator } => {
            let notice = app.notices.create_notice(&content, &creator).await?;
            println!("Published notice {} at {}.", notice.id, notice.timestamp);
        }
        NoticeCommand::Edit { content } => {
            if app.notices.edit_notice(&content).await? {
                println!("Current notice updated.");
            } else {
                println!("There is no current notice to edit.");
            }
        }
        NoticeCommand::Recall => {
            if app.notices.recall_notice().await? {
                println!("Current notice recalled.");
            } else {
                println!("There is no current notice to recall.");
            }
        }
        NoticeCommand::Show => match app.notices.get_current_notice().await? {
            Some(notice) => {
                println!("ID: {}", notice.id);
                println!("Creator: {}", notice.creator);
                println!("Published: {}", notice.timestamp);
                println!("Pushed: {}", if notice.pushed { "yes" } else { "no" });
                println!();
                println!("{}", notice.content);
            }
            None => println!("There is no current notice."),
        },
        NoticeCommand::History { page, page_size } => {
            let notices = app.notices.get_history(page, page_size).await?;
            if notices.is_empty() {
                println!("No notices on page {page}.");
            }
            for notice in notices {
                println!(
                    "{}  {}  [{}]  {}",
                    notice.id,
                    notice.timestamp,
                    notice.status.as_str(),
                    notice.content.lines().next().unwrap_or_default()
                );
            }
        }
        NoticeCommand::Progress { job_id } => match app.notices.get_push_progress(&job_id).await? {
            Some(job) => println!(
                "Job {}: {}/{} ({})",
                job.id,
                job.sent,
                job.total,
                job.status.as_str()
            ),
            None => println!("No push job {job_id}."),
        },
    }
    Ok(())
}

/// Resolve CLI arguments to group ids, expanding `ALL`
async fn resolve_ids(app: &App, args: &[String]) -> Vec<String> {
    if args.iter().any(|a| a.eq_ignore_ascii_case("all")) {
        return app.registry.all_group_ids().await;
    }
    parse_group_ids(&args.join(" "))
}

fn print_list_update(kind: ListKind, update: &ListUpdate) {
    match update {
        ListUpdate::Added(outcome) => {
            println!(
                "{kind}: {} added, {} already present ({} requested).",
                outcome.added, outcome.already_exist, outcome.total
            );
            if !outcome.new_ids.is_empty() {
                println!("New: {}", outcome.new_ids.join(", "));
            }
        }
        ListUpdate::Removed(count) => println!("{kind}: {count} removed."),
        ListUpdate::Members(members) if members.is_empty() => println!("{kind} is empty."),
        ListUpdate::Members(members) => {
            println!("{kind} ({}):", members.len());
            for id in members {
                println!("  {id}");
            }
        }
    }
}

async fn list(app: &App, kind: ListKind, action: ListAction, ids: Vec<String>) -> Result<()> {
    let ids = resolve_ids(app, &ids).await;
    let update = app.notices.update_list(kind, action, &ids).await?;
    print_list_update(kind, &update);
    Ok(())
}

async fn account(app: &App, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::List => {
            let accounts = app.registry.get_all_accounts(true).await;
            if accounts.is_empty() {
                println!("No accounts online.");
            }
            for account in accounts {
                let config = app.registry.get_account_config(&account.uin).await;
                println!(
                    "{}  {}  groups: {}",
                    account.label(),
                    if config.enabled { "enabled" } else { "disabled" },
                    account.groups.len()
                );
            }
        }
        AccountCommand::Stats => {
            let stats = app.registry.get_push_stats().await;
            println!(
                "Accounts: {} ({} enabled)",
                stats.total_accounts, stats.enabled_accounts
            );
            println!(
                "Groups: {} ({} pushable)",
                stats.total_groups, stats.pushable_groups
            );
            for account in stats.accounts {
                println!(
                    "  {}({}): {}/{}{}",
                    account.nickname,
                    account.uin,
                    account.pushable_groups,
                    account.total_groups,
                    if account.enabled { "" } else { " [disabled]" }
                );
            }
        }
        AccountCommand::Groups { uin } => {
            let groups = app.registry.cached_account_groups(&uin).await;
            if groups.is_empty() {
                println!("No group snapshot for account {uin}.");
            } else {
                println!("Account {uin} ({} groups):", groups.len());
                for id in groups {
                    println!("  {id}");
                }
            }
        }
        AccountCommand::EnableAll => {
            let (updated, total) = app.registry.set_all_enabled(true).await;
            println!("Enabled {updated}/{total} accounts.");
        }
        AccountCommand::DisableAll => {
            let (updated, total) = app.registry.set_all_enabled(false).await;
            println!("Disabled {updated}/{total} accounts.");
        }
        AccountCommand::Set {
            uin,
            enabled,
            interval_ms,
            retry_count,
        } => {
            let mut config = app.registry.get_account_config(&uin).await;
            if let Some(enabled) = enabled {
                config.enabled = enabled;
            }
            if let Some(interval_ms) = interval_ms {
                config.push_interval_ms = interval_ms;
            }
            if let Some(retry_count) = retry_count {
                config.retry_count = retry_count;
            }
            config.validate()?;

            if !app.registry.update_account_config(&uin, &config).await {
                anyhow::bail!("Failed to save settings of account {uin}");
            }
            println!(
                "Account {uin}: {}, interval {} ms, retry count {}.",
                if config.enabled { "enabled" } else { "disabled" },
                config.push_interval_ms,
                config.retry_count
            );
        }
        AccountCommand::Rules {
            uin,
            kind,
            action,
            ids,
        } => {
            let ids = resolve_ids(app, &ids).await;
            let update = app
                .registry
                .update_account_list(&uin, kind, action, &ids)
                .await?;
            print_list_update(kind, &update);
        }
    }
    Ok(())
}
