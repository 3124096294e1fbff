//! Inspect a configured content catalog from the command line

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use content_catalog::{
    CancellationToken, ContentProvider, ContentQuery, ContentStatus, DirectoryItem, ProviderRegistry, Settings,
    SortDirection, SortField,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "content-catalog")]
#[command(version)]
#[command(about = "Inspect Git-hosted content catalogs", long_about = None)]
struct Cli {
    /// TOML settings file
    #[arg(short, long, default_value = "content.toml")]
    config: PathBuf,

    /// Provider id; the configured default when omitted
    #[arg(short, long)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the directory tree
    Tree {
        #[arg(long)]
        locale: Option<String>,
    },
    /// List items, newest first
    Items {
        #[arg(long)]
        locale: Option<String>,
        /// Only items carrying every given tag
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long)]
        drafts: bool,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one item by path or URL
    Show {
        target: String,
        #[arg(long)]
        locale: Option<String>,
    },
    /// Tag counts
    Tags {
        #[arg(long)]
        locale: Option<String>,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let settings = Settings::load(Some(cli.config.as_path()))
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let registry = ProviderRegistry::from_settings(&settings)?;
    let provider = match &cli.provider {
        Some(id) => registry.get(id).await?,
        None => registry.get_default().await?,
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Tree { locale } => print_tree(provider, locale.as_deref(), &cancel).await?,
        Commands::Items {
            locale,
            tags,
            drafts,
            limit,
        } => {
            let mut query = ContentQuery::new()
                .sort(SortField::Date, SortDirection::Descending)
                .page(0, limit);
            if let Some(locale) = locale {
                query = query.locale(locale);
            }
            if !drafts {
                query = query.status(ContentStatus::Published);
            }
            for tag in tags {
                query = query.tag(tag);
            }

            let result = provider.find_by_query(&query, &cancel).await?;
            for item in &result.items {
                let date = item.date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
                println!("{:<10}  {:<40}  {}", date, item.title, item.url);
            }
            println!("{} of {} items", result.items.len(), result.total);
        }
        Commands::Show { target, locale } => {
            let item = match provider.get_item_by_path(&target, &cancel).await? {
                Some(item) => Some(item),
                None => provider.get_item_by_url(&target, locale.as_deref(), &cancel).await?,
            };
            let item = item.with_context(|| format!("no item at {}", target))?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Commands::Tags { locale } => {
            for tag in provider.get_tags(locale.as_deref(), &cancel).await? {
                println!("{:>5}  {}", tag.count, tag.name);
            }
        }
    }
    Ok(())
}

async fn print_tree(provider: Arc<dyn ContentProvider>, locale: Option<&str>, cancel: &CancellationToken) -> Result<()> {
    let directories = provider.get_directories(locale, cancel).await?;
    let items = provider.get_all_items(cancel).await?;

    let roots: Vec<&DirectoryItem> = directories
        .iter()
        .filter(|d| d.parent_id.as_ref().map_or(true, |p| !directories.iter().any(|o| &o.id == p)))
        .collect();

    // Explicit stack instead of recursion
    let mut stack: Vec<(&DirectoryItem, usize)> = roots.into_iter().rev().map(|d| (d, 0)).collect();
    while let Some((directory, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        println!("{}{}/  {}", indent, directory.name, directory.url);
        for id in &directory.items {
            if let Some(item) = items.iter().find(|i| &i.id == id) {
                println!("{}  {}  {}", indent, item.title, item.url);
            }
        }
        for id in directory.children.iter().rev() {
            if let Some(child) = directories.iter().find(|d| &d.id == id) {
                stack.push((child, depth + 1));
            }
        }
    }
    Ok(())
}
