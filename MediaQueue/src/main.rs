use mqconfig::Config;
use mqqueue::{
    Category, Classified, DisplaySynchronizer, FileSurface, Principal, QueueConfigExt,
    QueueManager, QueueStore, Settings, announcement, classify,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Surface des objets créés par l'entrée console
const CONSOLE_SURFACE: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::load_config("")?);
    init_logging(&config);

    // ========== Store et affichage ==========
    let store = Arc::new(QueueStore::open_with_timeout(
        &config.queue_db_path()?,
        config.store_timeout(),
    )?);
    let surface = Arc::new(FileSurface::new(config.display_dir()?));

    let mut settings = Settings::load(&config)?;
    let mut provisioned = false;
    for category in Category::ALL {
        if settings.bindings.get(category).is_none() {
            let binding = surface.provision(CONSOLE_SURFACE).await?;
            info!(category = %category, binding = %binding, "Display created");
            settings.bindings.insert(category, binding);
            provisioned = true;
        }
    }
    if provisioned {
        settings.persist(&config)?;
    }

    let display = DisplaySynchronizer::new(
        store.clone(),
        surface.clone(),
        settings.bindings.clone(),
        config.sync_options(),
    );
    let manager = QueueManager::new(store, display);

    for (category, status) in manager.display().refresh(None).await {
        debug!(category = %category, ?status, "Initial display sync");
    }
    info!(displays = %surface.root().display(), "MediaQueue ready");

    // ========== Entrée console ==========
    let principal = config.console_principal();
    if !settings.channels.accepts(CONSOLE_SURFACE) {
        warn!("Console is not an accepted queue channel, submissions are disabled");
    }

    let privileged = config.console_privileged();

    println!("Type '<title> (show|movie|anime)' to request, '!undo' to take back the last one,");
    println!("'!remove <category> <position>...' to remove, or press ENTER on an empty line to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            break;
        }

        if !settings.channels.accepts(CONSOLE_SURFACE) {
            continue;
        }

        match parse_command(&line) {
            Some(command) => run_command(&manager, &principal, privileged, command).await,
            None => debug!(line = %line, "No category marker, ignored"),
        }
    }

    info!("MediaQueue stopped");
    Ok(())
}

/// Ligne de la console
#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Request(Classified),
    Undo,
    Remove { category: String, positions: Vec<i64> },
}

fn parse_command(line: &str) -> Option<ConsoleCommand> {
    let line = line.trim();
    let Some(command) = line.strip_prefix('!') else {
        return classify(line).map(ConsoleCommand::Request);
    };

    let mut words = command.split_whitespace();
    match words.next()? {
        "undo" => Some(ConsoleCommand::Undo),
        "remove" => {
            let category = words.next()?.to_string();
            let positions = words
                .map(|w| w.trim_end_matches(',').parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            Some(ConsoleCommand::Remove { category, positions })
        }
        _ => None,
    }
}

async fn run_command(
    manager: &QueueManager,
    principal: &Principal,
    privileged: bool,
    command: ConsoleCommand,
) {
    match command {
        ConsoleCommand::Request(request) => {
            match manager
                .submit(&request.title, request.category.as_str(), principal)
                .await
            {
                Ok(outcome) => {
                    if outcome.is_display_stale() {
                        warn!(category = %request.category, "Display is out of date");
                    }
                    println!("{}", announcement(&principal.name, &request));
                }
                Err(e) => error!(category = %request.category, "Failed to add request: {}", e),
            }
        }
        ConsoleCommand::Undo => match manager.undo(principal).await {
            Ok(outcome) => {
                let entry = outcome.into_inner();
                println!("Removed the {} {} from the queue.", entry.category, entry.title);
            }
            Err(e) => println!("{}", e),
        },
        ConsoleCommand::Remove { category, positions } => {
            match manager
                .remove_many(&positions, &category, principal, privileged)
                .await
            {
                Ok(outcome) => {
                    let report = outcome.into_inner();
                    for title in &report.removed_titles {
                        println!("Removed {} from the {} queue.", title, category);
                    }
                    if !report.failed_positions.is_empty() {
                        warn!(positions = ?report.failed_positions, "Some entries could not be removed");
                    }
                }
                Err(e) => println!("{}", e),
            }
        }
    }
}

fn init_logging(config: &Config) {
    if !config.get_log_enable_console().unwrap_or(true) {
        return;
    }

    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string())
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}
