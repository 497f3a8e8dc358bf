use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use revhub_storage::PgRepository;
use revhub_sync::{google_sync_from_config, open_repository, AppConfig, HostawaySeeder};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "revhub-cli")]
#[command(about = "RevHub guest review service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Load the Hostaway export once and print a summary.
    Seed,
    /// Apply the embedded SQL migrations.
    Migrate,
    /// Fetch Google Places reviews into an existing listing.
    SyncGoogle {
        #[arg(long)]
        listing_id: Uuid,
        #[arg(long)]
        place_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    info!(?config, "configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => revhub_web::serve(config).await?,
        Commands::Seed => {
            let repo = open_repository(&config).await?;
            let summary = HostawaySeeder::new(repo, config.hostaway_seed_path.clone())
                .run()
                .await?;
            println!(
                "seed complete: processed={} created={} updated={} failed={}",
                summary.processed, summary.created, summary.updated, summary.failed
            );
        }
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required to run migrations")?;
            let repo = PgRepository::connect(url, config.database_max_connections).await?;
            repo.migrate().await?;
            println!("migrations applied");
        }
        Commands::SyncGoogle {
            listing_id,
            place_id,
        } => {
            let repo = open_repository(&config).await?;
            let sync = google_sync_from_config(&config, repo)?;
            let report = sync.sync(listing_id, &place_id).await?;
            if !report.ok {
                bail!(report.message);
            }
            println!("{}", report.message);
        }
    }

    Ok(())
}
