// trellis - component-oriented page framework server
//
// Architecture:
// - Server (axum): reduces HTTP requests to framework requests
// - Request pipeline: event, XHR action and page render dispatchers
// - Page pool: assembled page instances, one per in-flight request
// - Render queue: drives the component lifecycle to produce markup
// - Forms: record actions while rendering, replay them on submit

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

use trellis::app::Application;
use trellis::cli::{self, Cli, Commands};
use trellis::config::Config;
use trellis::{demo, logging, server, startup};

fn build_application(config: &Config) -> Result<Application> {
    let (pages, components) = demo::registry();
    Application::new(config, pages, components)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that need no server or subscriber
    match &cli.command {
        Some(Commands::Config { show, reset, path }) => {
            return cli::handle_config(*show, *reset, *path);
        }
        Some(Commands::Pages) => {
            let config = Config::from_env()?;
            cli::handle_pages(&build_application(&config)?);
            return Ok(());
        }
        Some(Commands::Render {
            path,
            fields,
            xhr,
            logs,
        }) => {
            let config = Config::from_env()?;
            let app = build_application(&config)?;
            return cli::handle_render(&app, path, fields, *xhr, *logs);
        }
        Some(Commands::Serve) | None => {}
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env()?;

    // The guard must be kept alive for the duration of the program to ensure logs flush
    let _file_guard = logging::init(&config.logging);

    let app = Arc::new(build_application(&config)?);
    startup::print_startup(&config, &app);
    startup::log_startup(&config, &app);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_config = config.clone();
    let server_app = app.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::start_server(server_config, server_app, shutdown_rx).await {
            tracing::error!("Server error: {:#}", e);
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    // If the send fails, the server has already stopped
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
