//! Command line, configuration and service bring-up

use std::path::PathBuf;
use std::sync::Arc;

use badgesync_core::{Config, ConfigError, SyncService};
use badgesync_net::Server;
use clap::Parser;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Core(#[from] badgesync_core::Error),

    #[error("Network error: {0}")]
    Net(#[from] badgesync_net::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Parser)]
#[command(name = "badgesync", version, about = "Badge hub synchronization server")]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BADGESYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overrides server.listen
    #[arg(short, long, env = "BADGESYNC_LISTEN")]
    pub listen: Option<String>,

    /// SQLite database file, overrides database.path
    #[arg(short, long, env = "BADGESYNC_DATABASE")]
    pub database: Option<PathBuf>,
}

/// Resolved settings ready to serve
#[derive(Debug)]
pub struct Startup {
    pub config: Config,
    pub db_path: PathBuf,
}

impl Startup {
    /// Load the config file (if any) and apply command line overrides
    pub fn from_args(args: &Args) -> Result<Self, StartupError> {
        let mut config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(listen) = &args.listen {
            config.server.listen = listen.clone();
        }
        if let Some(database) = &args.database {
            config.database.path = Some(database.clone());
        }

        let db_path = config.database.resolve_path()?;
        Ok(Self { config, db_path })
    }

    pub async fn serve(self) -> Result<Server, StartupError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let service = SyncService::open(
            &self.db_path,
            self.config.database.busy_timeout(),
            self.config.sync.clone(),
        )?;
        info!(path = %service.path().display(), "Database opened");

        let server = Server::start(
            self.config.server.listen.as_str(),
            Arc::new(service),
            self.config.server.max_connections,
        )
        .await?;
        Ok(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use badgesync_net::Client;
    use tempfile::tempdir;

    fn args(config: Option<PathBuf>, listen: Option<&str>, database: Option<PathBuf>) -> Args {
        Args {
            config,
            listen: listen.map(str::to_string),
            database,
        }
    }

    #[test]
    fn test_flags_override_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("badgesync.toml");
        std::fs::write(
            &config_path,
            "[server]\nlisten = \"0.0.0.0:9000\"\nmax_connections = 8\n\n[sync]\ndefault_project = \"LAB\"\n",
        )
        .unwrap();

        let db = dir.path().join("override.db");
        let startup =
            Startup::from_args(&args(Some(config_path), Some("127.0.0.1:0"), Some(db.clone()))).unwrap();
        assert_eq!(startup.config.server.listen, "127.0.0.1:0");
        assert_eq!(startup.config.server.max_connections, 8);
        assert_eq!(startup.config.sync.default_project, "LAB");
        assert_eq!(startup.db_path, db);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = Startup::from_args(&args(Some(dir.path().join("nope.toml")), None, None));
        assert!(matches!(result, Err(StartupError::Config(ConfigError::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_serve_creates_database_directory() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("nested").join("sync.db");
        let startup = Startup::from_args(&args(None, Some("127.0.0.1:0"), Some(db.clone()))).unwrap();

        let server = startup.serve().await.unwrap();
        assert!(db.exists());

        let mut client = Client::connect(server.addr()).await.unwrap();
        client.ping().await.unwrap();
        server.shutdown();
    }
}
