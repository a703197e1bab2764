// ⚙️ Configuration - environment (+ optional .env file)
//
//   LOAN_DB_PATH      SQLite file           (default: loans.db)
//   LOAN_SERVER_ADDR  API bind address      (default: 0.0.0.0:3000)
//   LOAN_ACTOR        name stamped on audit events (default: system)

use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "loans.db";
pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_ACTOR: &str = "system";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_path: PathBuf,
    pub server_addr: String,
    pub actor: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            server_addr: DEFAULT_SERVER_ADDR.to_string(),
            actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        Config {
            database_path: get("LOAN_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            server_addr: get("LOAN_SERVER_ADDR").unwrap_or(defaults.server_addr),
            actor: get("LOAN_ACTOR").unwrap_or(defaults.actor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.database_path, PathBuf::from("loans.db"));
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let env: HashMap<&str, &str> = [
            ("LOAN_DB_PATH", "/var/lib/loans/prod.db"),
            ("LOAN_SERVER_ADDR", "127.0.0.1:8080"),
            ("LOAN_ACTOR", "   "),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/var/lib/loans/prod.db"));
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.actor, "system");
    }
}
