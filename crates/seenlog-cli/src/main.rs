use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use seenlog_bus::{EventBus, Topic};
use seenlog_catalog::create_catalog;
use seenlog_core::*;
use seenlog_schema::{BusMessage, Episode, EpisodeId};
use seenlog_store::open_store;

#[derive(Parser)]
#[command(name = "seenlog", version, about = "Track which episodes you have seen")]
struct Cli {
    #[arg(
        long,
        default_value = "~/.seenlog",
        help = "Config root directory (contains config/, data/ and logs/)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List episodes with their seen flag")]
    Episodes {
        #[arg(long, help = "Only list episodes marked as seen")]
        seen: bool,
    },
    #[command(about = "Show how much of the catalog has been seen")]
    Stats,
    #[command(about = "Mark episodes as seen")]
    Mark {
        #[arg(required = true, help = "Episode IDs")]
        ids: Vec<EpisodeId>,
    },
    #[command(about = "Remove the seen mark from episodes")]
    Unmark {
        #[arg(required = true, help = "Episode IDs")]
        ids: Vec<EpisodeId>,
    },
    #[command(about = "Flip the seen flag of a single episode")]
    Toggle {
        #[arg(help = "Episode ID")]
        id: EpisodeId,
    },
    #[command(about = "Show episode details and characters")]
    Show {
        #[arg(help = "Episode ID")]
        id: EpisodeId,
    },
    #[command(about = "Validate config files")]
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log dir: {}", log_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "seenlog.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    match command {
        Commands::Validate => {
            let config = load_config(&cli.config_root.join("config"))?;
            println!(
                "Config valid. user={}, catalog={}, store={}.",
                config.user_id,
                config.catalog.base_url,
                config.store.resolved_path(&cli.config_root).display()
            );
        }
        Commands::Stats => {
            let config = load_config(&cli.config_root.join("config"))?;
            let catalog = create_catalog(&config.catalog);
            let store = open_store(&config.store, &cli.config_root)?;
            let progress = load_progress(catalog.as_ref(), store.as_ref(), &config.user_id).await?;
            println!(
                "Seen {} of {} episodes ({}%).",
                progress.seen_count, progress.total, progress.percent
            );
        }
        Commands::Episodes { seen } => {
            let (view, _bus) = build_view(&cli.config_root).await?;
            let mode = if seen {
                FilterMode::SeenOnly
            } else {
                FilterMode::All
            };
            let visible = view.set_filter(mode).await;
            if visible.is_empty() {
                println!("No episodes to show.");
            } else {
                print_episodes(&visible);
            }
            let progress = view.progress().await;
            println!(
                "\n{} / {} seen ({}%)",
                progress.seen_count, progress.total, progress.percent
            );
        }
        Commands::Mark { ids } => {
            let (view, bus) = build_view(&cli.config_root).await?;
            commit_ids(&view, &bus, ids, true).await?;
        }
        Commands::Unmark { ids } => {
            let (view, bus) = build_view(&cli.config_root).await?;
            commit_ids(&view, &bus, ids, false).await?;
        }
        Commands::Toggle { id } => {
            let (view, _bus) = build_view(&cli.config_root).await?;
            let current = view
                .snapshot()
                .await
                .into_iter()
                .find(|e| e.id == id)
                .ok_or_else(|| anyhow!("episode not found: {id}"))?;
            let seen = !current.seen;
            view.set_seen(id, seen).await?;
            println!(
                "{} '{}' {}.",
                current.code,
                current.title,
                if seen { "marked as seen" } else { "unmarked" }
            );
        }
        Commands::Show { id } => {
            let (view, _bus) = build_view(&cli.config_root).await?;
            let detail = view.detail(id).await?;
            let episode = &detail.episode;
            println!("Episode: {} ({})", episode.title, episode.code);
            println!("Aired: {}", episode.air_date);
            println!("Seen: {}", if episode.seen { "yes" } else { "no" });
            if detail.characters.is_empty() {
                println!("Characters: -");
            } else {
                println!("Characters:");
                for character in &detail.characters {
                    println!("  {:<6} {:<30} {}", character.id, character.name, character.image_ref);
                }
            }
        }
    }

    Ok(())
}

/// Wire the service handles from config and run the first load cycle.
async fn build_view(config_root: &Path) -> Result<(EpisodeView, EventBus)> {
    let config = load_config(&config_root.join("config"))?;
    let catalog = create_catalog(&config.catalog);
    let store = open_store(&config.store, config_root).with_context(|| {
        format!(
            "failed to open seen store at {}",
            config.store.resolved_path(config_root).display()
        )
    })?;
    let bus = EventBus::new(config.bus_capacity);

    let view = EpisodeView::new(catalog, store, config.user_id).with_bus(bus.publisher());
    view.load().await.context("failed to load episode catalog")?;
    Ok((view, bus))
}

async fn commit_ids(
    view: &EpisodeView,
    bus: &EventBus,
    ids: Vec<EpisodeId>,
    mark_seen: bool,
) -> Result<()> {
    let ids: BTreeSet<EpisodeId> = ids.into_iter().collect();
    for id in &ids {
        if let Err(err) = view.toggle_selection(*id).await {
            view.clear_selection().await;
            return Err(err.into());
        }
    }

    let mut batches = bus.subscribe(Topic::BatchCompleted).await;
    let outcome = view.commit_selection(mark_seen).await;
    while let Ok(BusMessage::BatchCompleted {
        batch_id, failed, ..
    }) = batches.try_recv()
    {
        tracing::info!(%batch_id, failed = failed.len(), "batch announced");
    }
    let verb = if mark_seen { "marked" } else { "unmarked" };
    println!("{} {} episode(s).", verb, outcome.report.succeeded.len());
    for (id, err) in &outcome.report.failed {
        println!("  failed {id}: {err}");
    }

    match outcome.reload {
        Some(Ok(_)) => {
            let progress = view.progress().await;
            println!(
                "{} / {} seen ({}%)",
                progress.seen_count, progress.total, progress.percent
            );
        }
        Some(Err(err)) => tracing::warn!(error = %err, "reload after batch failed"),
        None => {}
    }

    if outcome.report.all_succeeded() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} of {} writes failed",
            outcome.report.failed.len(),
            outcome.report.total()
        ))
    }
}

fn print_episodes(episodes: &[Episode]) {
    println!("{:<6} {:<8} {:<6} {:<40}", "ID", "CODE", "SEEN", "TITLE");
    println!("{}", "-".repeat(62));
    for episode in episodes {
        println!(
            "{:<6} {:<8} {:<6} {:<40}",
            episode.id,
            episode.code,
            if episode.seen { "yes" } else { "" },
            episode.title
        );
    }
}
