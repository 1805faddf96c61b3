//! Configuration loading.
//!
//! Precedence, highest first: command-line flags, environment variables,
//! values from an optional `.env` file (loaded into the environment before
//! parsing), built-in defaults.

use clap::Parser;

/// Bridge configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "webridge", version, about = "erssi fe-web to WeeChat relay bridge")]
pub struct Config {
    /// erssi fe-web WebSocket URL.
    #[arg(long = "erssi", env = "ERSSI_URL", default_value = "ws://localhost:9001")]
    pub upstream_url: String,

    /// Shared password for the fe-web connection.
    #[arg(
        long = "password",
        env = "ERSSI_PASSWORD",
        default_value = "",
        hide_env_values = true
    )]
    pub password: String,

    /// Listen address for relay clients.
    #[arg(long = "listen", env = "LISTEN_ADDR", default_value = "0.0.0.0:9000")]
    pub listen_addr: String,

    /// Enable debug logging.
    #[arg(short = 'v', long = "verbose", env = "VERBOSE")]
    pub verbose: bool,
}

impl Config {
    /// Default log filter directive for this configuration.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::parse_from(["webridge"]);
        assert_eq!(config.upstream_url, "ws://localhost:9001");
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert!(config.password.is_empty());
        assert!(!config.verbose);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn flags_override() {
        let config = Config::parse_from([
            "webridge",
            "--erssi",
            "wss://irc.example.net:9001",
            "--password",
            "hunter2",
            "--listen",
            "127.0.0.1:9900",
            "-v",
        ]);
        assert_eq!(config.upstream_url, "wss://irc.example.net:9001");
        assert_eq!(config.password, "hunter2");
        assert_eq!(config.listen_addr, "127.0.0.1:9900");
        assert_eq!(config.log_filter(), "debug");
    }
}
