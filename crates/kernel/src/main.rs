//! Canopy command line.
//!
//! Runs page commands against the configured PostgreSQL database.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use canopy_kernel::commands::{
    AddPage, CopyPage, CreateSite, DeletePage, MovePage, PublishPage, UnpublishPage,
};
use canopy_kernel::config::Config;
use canopy_kernel::content::BlockErrorValidator;
use canopy_kernel::db;
use canopy_kernel::definitions::{DefinitionKind, DefinitionRegistry};
use canopy_kernel::models::Version;
use canopy_kernel::{ObserverRegistry, PageError, PageService, PgPageStore, TracingObserver};

/// Manage draft and published page trees.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Acting user recorded on every change.
    #[arg(long, global = true, default_value_t = Uuid::nil())]
    user: Uuid,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending database migrations.
    Migrate,

    /// Create a site with a draft homepage.
    CreateSite {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "")]
        path: String,
        #[arg(long, default_value = "Home")]
        title: String,
        #[arg(long)]
        layout: String,
        #[arg(long, default_value = "1")]
        layout_version: i32,
    },

    /// Add a draft page under a parent.
    AddPage {
        #[arg(long)]
        parent: Uuid,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        layout: String,
        #[arg(long, default_value = "1")]
        layout_version: i32,

        /// Insert before this sibling instead of last.
        #[arg(long)]
        before: Option<Uuid>,
    },

    /// Copy a draft page next to itself.
    CopyPage {
        page: Uuid,
        #[arg(long)]
        slug: String,
        #[arg(long)]
        title: String,
    },

    /// Publish a draft page.
    Publish {
        page: Uuid,

        /// Also publish every descendant.
        #[arg(long)]
        tree: bool,
    },

    /// Remove a page and its descendants from the published tree.
    Unpublish { page: Uuid },

    /// Move a draft page under a new parent.
    MovePage {
        page: Uuid,
        #[arg(long)]
        parent: Uuid,
        #[arg(long)]
        before: Option<Uuid>,
    },

    /// Delete a draft page and its descendants.
    DeletePage { page: Uuid },

    /// Print one tree of a site.
    Tree {
        site: Uuid,
        #[arg(long, default_value = "draft")]
        version: Version,
    },

    /// List sites.
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = db::create_pool(&config).await?;

    if matches!(cli.command, Command::Migrate) {
        db::run_migrations(&pool).await?;
        info!("migrations applied");
        return Ok(());
    }

    let definitions = DefinitionRegistry::load_dir(&config.definitions_dir)
        .await
        .context("failed to load definitions")?;
    info!(
        layouts = definitions.count(DefinitionKind::Layout),
        regions = definitions.count(DefinitionKind::Region),
        blocks = definitions.count(DefinitionKind::Block),
        "definitions loaded"
    );

    let mut observers = ObserverRegistry::new();
    observers.register(0, Arc::new(TracingObserver));
    let service = PageService::new(
        Arc::new(PgPageStore::new(pool)),
        Arc::new(definitions),
        Arc::new(BlockErrorValidator),
        observers,
    );

    match run(&service, cli.command, cli.user).await {
        Ok(()) => Ok(()),
        Err(PageError::Validation(errors)) => {
            for (field, messages) in errors.iter() {
                for message in messages {
                    eprintln!("{field}: {message}");
                }
            }
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(service: &PageService, command: Command, user: Uuid) -> Result<(), PageError> {
    match command {
        Command::Migrate => {}
        Command::CreateSite {
            name,
            host,
            path,
            title,
            layout,
            layout_version,
        } => {
            let (site, homepage) = service
                .create_site(
                    CreateSite {
                        name,
                        host,
                        path,
                        homepage_title: title,
                        layout_name: layout,
                        layout_version,
                    },
                    user,
                )
                .await?;
            println!("site {} ({}{})", site.id, site.host, site.path);
            println!("homepage {}", homepage.id);
        }
        Command::AddPage {
            parent,
            slug,
            title,
            layout,
            layout_version,
            before,
        } => {
            let page = service
                .add_page(
                    AddPage {
                        parent_id: parent,
                        slug,
                        title,
                        layout_name: layout,
                        layout_version,
                        next_id: before,
                    },
                    user,
                )
                .await?;
            println!("{}", page.id);
        }
        Command::CopyPage { page, slug, title } => {
            let copy = service
                .copy_page(
                    CopyPage {
                        page_id: page,
                        new_slug: slug,
                        new_title: title,
                    },
                    user,
                )
                .await?;
            println!("{}", copy.id);
        }
        Command::Publish { page, tree } => {
            let input = PublishPage { page_id: page };
            let outcomes = if tree {
                service.publish_page_tree(input, user).await?
            } else {
                vec![service.publish_page(input, user).await?]
            };
            for outcome in outcomes {
                let action = if outcome.created { "created" } else { "updated" };
                println!("{} {action}", outcome.page.id);
                for removed in &outcome.removed {
                    println!("{} removed", removed.id);
                }
            }
        }
        Command::Unpublish { page } => {
            let removed = service
                .unpublish_page(UnpublishPage { page_id: page }, user)
                .await?;
            println!("{} page(s) unpublished", removed.len());
        }
        Command::MovePage {
            page,
            parent,
            before,
        } => {
            let moved = service
                .move_page(
                    MovePage {
                        page_id: page,
                        parent_id: parent,
                        next_id: before,
                    },
                    user,
                )
                .await?;
            println!("{} depth {}", moved.id, moved.depth);
        }
        Command::DeletePage { page } => {
            let removed = service
                .delete_page(DeletePage { page_id: page }, user)
                .await?;
            println!("{} page(s) deleted", removed.len());
        }
        Command::Tree { site, version } => {
            for entry in service.tree(site, version).await? {
                let indent = "  ".repeat(entry.page.depth.max(0) as usize);
                println!(
                    "{indent}{} {} {}",
                    entry.path,
                    entry.page.id,
                    entry.title.as_deref().unwrap_or("-")
                );
            }
        }
        Command::Sites => {
            for site in service.list_sites().await? {
                println!("{} {} {}{}", site.id, site.name, site.host, site.path);
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
