//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proximity router
    Serve {
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Delivery radius in coordinate units
        #[arg(long)]
        range: Option<f64>,
        /// Milliseconds between retries of pending messages
        #[arg(long)]
        retry_interval_ms: Option<u64>,
    },
    /// Connect to a router as an interactive terminal client
    Client {
        /// Username to register as
        #[arg(short, long)]
        name: String,
        /// Starting latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Starting longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Router host
        #[arg(long)]
        host: Option<String>,
        /// Router port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Print an example configuration file
    ExampleConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::parse_from(["nearchat", "serve", "--port", "6000", "--range", "50"]);
        match cli.command {
            Commands::Serve { host, port, range, .. } => {
                assert_eq!(host, None);
                assert_eq!(port, Some(6000));
                assert_eq!(range, Some(50.0));
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_parse_client_with_negative_coordinates() {
        let cli = Cli::parse_from([
            "nearchat", "client", "--name", "alice", "--lat", "-23.5", "--lon", "-46.6", "-v",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Client { name, lat, lon, .. } => {
                assert_eq!(name, "alice");
                assert_eq!(lat, -23.5);
                assert_eq!(lon, -46.6);
            }
            _ => panic!("expected client"),
        }
    }
}
