//! Configuration for Chastor
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Chastor - directory of fractional real-estate investment platforms
#[derive(Parser, Debug, Clone)]
#[command(name = "chastor")]
#[command(about = "Platform directory and data-quality audit service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Which database environment to read from
    #[arg(long, env = "DB_TARGET", value_enum, default_value_t = DbTarget::Local)]
    pub db_target: DbTarget,

    /// MongoDB connection string for the `online` target
    #[arg(long, env = "MONGODB_URI_ONLINE")]
    pub mongodb_uri_online: Option<String>,

    /// MongoDB connection string for the `local` target
    #[arg(long, env = "MONGODB_URI_LOCAL")]
    pub mongodb_uri_local: Option<String>,

    /// Database name override. When unset, the connection string's default
    /// database is used.
    #[arg(long, env = "MONGODB_DB")]
    pub mongodb_db: Option<String>,

    /// Development mode: keeps one connection for the whole process and
    /// allows serving from a fixture file
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JSON array of platform documents to serve instead of MongoDB
    #[arg(long, env = "FIXTURES")]
    pub fixtures: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

/// Named database environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DbTarget {
    Online,
    Local,
}

impl DbTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Local => "local",
        }
    }

    /// Environment variable expected to carry this target's connection string
    pub fn uri_variable(&self) -> &'static str {
        match self {
            Self::Online => "MONGODB_URI_ONLINE",
            Self::Local => "MONGODB_URI_LOCAL",
        }
    }
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Args {
    /// Connection string for the selected target, if configured
    pub fn selected_uri(&self) -> Option<&str> {
        let uri = match self.db_target {
            DbTarget::Online => self.mongodb_uri_online.as_deref(),
            DbTarget::Local => self.mongodb_uri_local.as_deref(),
        };
        uri.map(str::trim).filter(|u| !u.is_empty())
    }

    /// Validate configuration
    ///
    /// A missing connection string is deliberately not checked here: it is
    /// reported by the connection provider on first use.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref path) = self.fixtures {
            if !self.dev_mode {
                return Err("FIXTURES is only allowed together with DEV_MODE".to_string());
            }
            if !path.is_file() {
                return Err(format!("FIXTURES file not found: {}", path.display()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["chastor"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn test_selected_uri_follows_target() {
        let args = parse(&[
            "--db-target",
            "online",
            "--mongodb-uri-online",
            "mongodb://remote/chastor",
            "--mongodb-uri-local",
            "mongodb://localhost/chastor",
        ]);
        assert_eq!(args.db_target, DbTarget::Online);
        assert_eq!(args.selected_uri(), Some("mongodb://remote/chastor"));
    }

    #[test]
    fn test_blank_uri_counts_as_missing() {
        let args = parse(&["--db-target", "local", "--mongodb-uri-local", "  "]);
        assert_eq!(args.selected_uri(), None);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_fixtures_require_dev_mode() {
        let args = parse(&["--fixtures", "Cargo.toml"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_target_names() {
        assert_eq!(DbTarget::Online.to_string(), "online");
        assert_eq!(DbTarget::Local.uri_variable(), "MONGODB_URI_LOCAL");
    }
}
