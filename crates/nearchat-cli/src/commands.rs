//! Command handlers for the NearChat CLI

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use nearchat_core::{Coordinates, MemoryQueue};
use nearchat_runtime::{Router, RouterServer};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::client::{ChatClient, ClientCommand};
use crate::config::{AppConfig, ConfigOverrides};
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command; `shutdown` stops a running server
    pub async fn execute<F>(cli: Cli, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let config_file = cli.config.as_deref().map(Path::new);
        match cli.command {
            Commands::Serve {
                host,
                port,
                range,
                retry_interval_ms,
            } => {
                let overrides = ConfigOverrides {
                    server_host: host,
                    server_port: port,
                    range,
                    retry_interval_ms,
                    ..Default::default()
                };
                let config = AppConfig::load_with_overrides(config_file, overrides)?;
                Self::handle_serve_command(config, shutdown).await
            }
            Commands::Client {
                name,
                lat,
                lon,
                host,
                port,
            } => {
                let overrides = ConfigOverrides {
                    client_host: host,
                    client_port: port,
                    ..Default::default()
                };
                let config = AppConfig::load_with_overrides(config_file, overrides)?;
                Self::handle_client_command(config, name, lat, lon).await
            }
            Commands::ExampleConfig => {
                println!("{}", AppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Handle the serve command
    async fn handle_serve_command<F>(config: AppConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let router_config = config.router_config();
        router_config.validate()?;
        info!(
            range = router_config.range,
            retry_interval_ms = config.routing.retry_interval_ms,
            "Starting router"
        );

        let addr = resolve(&config.server.host, config.server.port).await?;
        let router = Arc::new(Router::new(router_config, Arc::new(MemoryQueue::new())));
        let server = RouterServer::bind(addr, router).await?;
        server.run_until(shutdown).await?;

        info!("Router exited");
        Ok(())
    }

    /// Handle the client command
    async fn handle_client_command(config: AppConfig, name: String, lat: f64, lon: f64) -> Result<()> {
        let location = Coordinates::new(lat, lon)?;
        let addr = format!("{}:{}", config.client.host, config.client.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| CliError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!(%addr, username = %name, "Connected to router");

        let (reader, writer) = stream.into_split();
        let mut client = ChatClient::new(name, location, writer);
        println!("{}", ClientCommand::HELP);

        client
            .run(
                BufReader::new(reader),
                BufReader::new(tokio::io::stdin()),
                config.refresh_interval(),
            )
            .await
    }
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| CliError::AddressResolution(format!("{}:{}", host, port)))
}
