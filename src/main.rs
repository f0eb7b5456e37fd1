use std::env;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Secrets may live in a local .env during development.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agenda=info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let cmd = args.next().unwrap_or_default();
    if cmd != "serve" {
        eprintln!("Usage: agenda serve --config <path>");
        std::process::exit(2);
    }

    let mut config_path = String::from("./config/agenda.yaml");
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(v) = args.next() {
                config_path = v;
            }
        }
    }

    let cfg = match agenda_config::load_and_validate(&config_path) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("failed to load config: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(config = %config_path, store = %cfg.store.kind, "Starting agenda bot");

    if let Err(e) = agenda_server::serve(cfg).await {
        eprintln!("server exited with error: {e}");
        std::process::exit(1);
    }
}
