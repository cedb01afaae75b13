use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use mailrelay::{
    Config, EmailFetcher, FileRelayStore, ForwardBuilder, FsObjectStore, IngestionProcessor,
    MemoryCache, OutboxMailer, PlaceholderSummarizer, QueuePoller, RelayDirectory, RelayError,
    Result, SpoolQueue, VerificationService,
};

#[derive(Parser)]
#[command(name = "mailrelay", version, about = "Relay-address mail forwarder")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "MAILRELAY_CONFIG",
        default_value = "config.toml"
    )]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the spool queue and forward mail (default)
    Run,
    /// Add a notification payload file to the spool queue
    Enqueue { file: PathBuf },
    /// Verify a primary address, then issue a relay address for it
    Claim {
        primary: String,
        /// Custom username instead of a random one
        #[arg(long)]
        username: Option<String>,
    },
    /// List relay addresses forwarding to a primary address
    List {
        primary: String,
        #[arg(long)]
        json: bool,
    },
    /// Stop forwarding mail sent to a relay address
    Pause { relay: String },
    /// Resume forwarding mail sent to a relay address
    Resume { relay: String },
}

/// Shared state behind every command.
struct Services {
    cache: Arc<MemoryCache>,
    store: Arc<FileRelayStore>,
    directory: Arc<RelayDirectory>,
    mailer: Arc<OutboxMailer>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    // Load configuration
    let (config, load_error) = match Config::load_with_env(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => {
            let mut config = Config::default();
            config.apply_env_overrides();
            (config, Some(e))
        }
    };

    // Initialize logging
    if matches!(command, Commands::Run) {
        if let Err(e) = mailrelay::logging::init(&config.logging) {
            eprintln!("Failed to open log file {}: {e}", config.logging.file);
            mailrelay::logging::init_stderr(&config.logging.level);
        }
    } else {
        mailrelay::logging::init_stderr(&config.logging.level);
    }

    if let Some(e) = load_error {
        warn!(
            "Failed to load {}: {}; using default configuration",
            cli.config.display(),
            e
        );
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let result = match build_services(&config).await {
        Ok(services) => match command {
            Commands::Run => cmd_run(&config, services).await,
            Commands::Enqueue { file } => cmd_enqueue(&config, &file).await,
            Commands::Claim { primary, username } => {
                cmd_claim(&config, &services, &primary, username.as_deref()).await
            }
            Commands::List { primary, json } => cmd_list(&services, &primary, json).await,
            Commands::Pause { relay } => cmd_set_active(&services, &relay, false).await,
            Commands::Resume { relay } => cmd_set_active(&services, &relay, true).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(kind = e.kind(), "{}", e);
        std::process::exit(1);
    }
}

async fn build_services(config: &Config) -> Result<Services> {
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(FileRelayStore::open(&config.relay.store_file).await?);
    let directory = Arc::new(RelayDirectory::new(
        cache.clone(),
        store.clone(),
        config.service.domain.clone(),
    ));

    directory.import(&config.relay.mappings).await?;
    directory.sync_cache().await?;

    Ok(Services {
        cache,
        store,
        directory,
        mailer: Arc::new(OutboxMailer::new(&config.mail.outbox_dir)),
    })
}

async fn cmd_run(config: &Config, services: Services) -> Result<()> {
    info!("MailRelay - relay-address email forwarding");
    info!(
        "Service '{}' relaying for domain {}",
        config.service.name, config.service.domain
    );

    let processor = Arc::new(IngestionProcessor::new(
        services.directory.clone(),
        EmailFetcher::new(Arc::new(FsObjectStore::new(&config.storage.root))),
        ForwardBuilder::new(config.service.name.clone(), config.mail.from.clone()),
        Arc::new(PlaceholderSummarizer),
        services.mailer.clone(),
        config.storage.bucket.clone(),
    ));

    let queue = Arc::new(
        SpoolQueue::new(&config.queue.spool_dir)
            .with_visibility_timeout(config.queue.visibility_timeout())
            .with_max_receives(config.queue.max_receives),
    );
    let poller = QueuePoller::new(queue, processor, &config.queue);

    let purger = {
        let cache = services.cache.clone();
        let period = Duration::from_secs(config.cache.purge_interval_secs);
        tokio::spawn(async move { cache.run_purger(period).await })
    };
    let refresher = tokio::spawn(refresh_relays(
        services.store.clone(),
        services.directory.clone(),
        Duration::from_secs(config.relay.sync_interval_secs),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            // Dropping the sender would stop the poller.
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    poller.run(shutdown_rx).await;
    purger.abort();
    refresher.abort();
    Ok(())
}

/// Pick up mappings changed by other commands and rebuild the projections.
async fn refresh_relays(
    store: Arc<FileRelayStore>,
    directory: Arc<RelayDirectory>,
    period: Duration,
) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Startup already synchronized.
    timer.tick().await;

    loop {
        timer.tick().await;
        if let Err(e) = store.reload().await {
            error!("Failed to reload relay store: {}", e);
            continue;
        }
        if let Err(e) = directory.sync_cache().await {
            error!("Failed to synchronize relay cache: {}", e);
        }
    }
}

async fn cmd_enqueue(config: &Config, file: &Path) -> Result<()> {
    let body = tokio::fs::read_to_string(file).await?;
    mailrelay::EventEnvelope::from_json(&body)?;

    let receipt = SpoolQueue::new(&config.queue.spool_dir)
        .enqueue(&body)
        .await?;
    println!("{receipt}");
    Ok(())
}

async fn cmd_claim(
    config: &Config,
    services: &Services,
    primary: &str,
    username: Option<&str>,
) -> Result<()> {
    mailrelay::relay::validate_primary_email(primary)?;

    let verification = VerificationService::new(
        services.cache.clone(),
        services.mailer.clone(),
        config.service.name.clone(),
        config.mail.from.clone(),
        &config.verification,
    );
    verification.send_code(primary).await?;
    eprintln!(
        "A verification code was sent to {primary} (outbox: {}).",
        config.mail.outbox_dir
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("Verification code: ");
        let Some(code) = lines.next_line().await? else {
            return Err(RelayError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "no verification code entered",
            )));
        };
        match verification.verify_code(primary, &code).await {
            Ok(()) => break,
            Err(RelayError::InvalidCode) => eprintln!("Invalid or expired code, try again."),
            Err(e) => return Err(e),
        }
    }

    let address = match username {
        Some(username) => {
            services
                .directory
                .create_custom_relay_address(primary, username)
                .await?
        }
        None => services.directory.generate_relay_address(primary).await?,
    };
    println!("{address}");
    Ok(())
}

async fn cmd_list(services: &Services, primary: &str, json: bool) -> Result<()> {
    let mappings = services.directory.list_for_primary(primary).await?;

    if json {
        let out = serde_json::to_string_pretty(&mappings)
            .map_err(|e| RelayError::Store(format!("failed to encode mappings: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    for mapping in &mappings {
        println!(
            "{}\t{}\t{}\t{}",
            mapping.relay_address,
            if mapping.is_active { "active" } else { "paused" },
            mapping.created_at.format("%Y-%m-%d %H:%M"),
            mapping.description.as_deref().unwrap_or("")
        );
    }
    if mappings.is_empty() {
        eprintln!("No relay addresses for {primary}");
    }
    Ok(())
}

async fn cmd_set_active(services: &Services, relay: &str, active: bool) -> Result<()> {
    services.directory.set_relay_active(relay, active).await
}
