use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spectre: a Kubernetes observability server unifying timeline, graph,
/// and log-integration backends behind one REST/MCP surface.
#[derive(Debug, Parser)]
#[command(name = "spectre", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server: loads integration configuration, reconciles
    /// the integration set, and serves REST, MCP, health, and metrics
    /// on one port until signalled to shut down.
    Server(ServerArgs),
}

#[derive(Debug, Parser)]
pub struct ServerArgs {
    /// Address the HTTP server binds to.
    #[arg(long, env = "SPECTRE_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Directory holding `integrations.yaml`, the store's persisted
    /// document. Created if it does not already exist.
    #[arg(long, env = "SPECTRE_CONFIG_DIR", default_value = "./config")]
    pub config_dir: PathBuf,

    /// Log verbosity, passed through to `tracing_subscriber`'s
    /// `EnvFilter` (e.g. `info`, `debug`, `spectre=debug,tower=warn`).
    #[arg(long, env = "SPECTRE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Namespace the in-cluster secret resolver watches `Secret`
    /// objects in. Ignored when no Kubernetes client is reachable; the
    /// resolver then falls back to a permanently-`NotReady` source.
    #[arg(long, env = "SPECTRE_SECRET_NAMESPACE", default_value = "default")]
    pub secret_namespace: String,

    /// Deadline given to in-flight pipelines and instances to drain on
    /// shutdown before the process exits anyway.
    #[arg(long, env = "SPECTRE_SHUTDOWN_DEADLINE_SECS", default_value_t = 10)]
    pub shutdown_deadline_secs: u64,
}

impl ServerArgs {
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("integrations.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_with_defaults() {
        let cli = Cli::try_parse_from(["spectre", "server"]).unwrap();
        let Command::Server(args) = cli.command;
        assert_eq!(args.listen, "0.0.0.0:8080");
        assert_eq!(args.config_dir, PathBuf::from("./config"));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "spectre",
            "server",
            "--listen",
            "127.0.0.1:9000",
            "--config-dir",
            "/etc/spectre",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let Command::Server(args) = cli.command;
        assert_eq!(args.listen, "127.0.0.1:9000");
        assert_eq!(args.config_dir, PathBuf::from("/etc/spectre"));
        assert_eq!(args.log_level, "debug");
    }
}
