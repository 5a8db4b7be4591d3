use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warehouse_core::cli::{
    handle_config, handle_db_migrate, handle_events_replay, handle_stock_reduce, Cli, Commands,
    DbCommands, EventCommands, StockCommands,
};
use warehouse_core::config::Config;
use warehouse_core::server;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { role } => server::serve(role, config).await,
        Commands::Db(DbCommands::Migrate) => handle_db_migrate(&config).await,
        Commands::Config => handle_config(&config),
        Commands::Stock(StockCommands::Reduce {
            location,
            product,
            quantity,
        }) => handle_stock_reduce(&config, location, product, quantity).await,
        Commands::Events(EventCommands::Replay { event_id }) => {
            handle_events_replay(&config, event_id).await
        }
    }
}
