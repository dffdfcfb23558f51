use age_guesser::app::App;
use age_guesser::models::Config;
use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "age-guesser")]
#[command(about = "Serve the camera age-guessing demo")]
struct CliArgs {
    /// Address to listen on; overrides BIND_ADDR.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Use the in-memory stage and canned answers instead of real services.
    #[arg(long)]
    dry_run: bool,
}

impl CliArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "age_guesser=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting age-guesser");

    let args = CliArgs::parse();

    // --dry-run must be able to rescue an environment without an API key
    dotenvy::dotenv().ok();
    let mut config = match Config::from_lookup(|key| match key {
        "DRY_RUN" if args.dry_run => Some("true".to_string()),
        _ => std::env::var(key).ok(),
    }) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    args.apply(&mut config);

    match App::new(config).await {
        Ok(app) => match app.serve().await {
            Ok(_) => {
                info!("Server stopped");
                Ok(())
            }
            Err(e) => {
                error!("Server failed: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    }
}
