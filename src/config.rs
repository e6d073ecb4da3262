use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://flood_history.db";
pub const DEFAULT_MODEL_PATH: &str = "models/flood_gbm.json";
pub const DEFAULT_HISTORY_RETENTION: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub model_path: PathBuf,
    pub history_retention: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),

            model_path: lookup("FLOOD_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),

            history_retention: lookup("FLOOD_HISTORY_RETENTION")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_HISTORY_RETENTION),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(config.history_retention, DEFAULT_HISTORY_RETENTION);
    }

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite://other.db"),
            ("FLOOD_MODEL_PATH", "/srv/model.json"),
            ("FLOOD_HISTORY_RETENTION", "500"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.model_path, PathBuf::from("/srv/model.json"));
        assert_eq!(config.history_retention, 500);
    }

    #[test]
    fn invalid_retention_falls_back() {
        for raw in ["zero", "0", "-4"] {
            let config = Config::from_lookup(|key| {
                (key == "FLOOD_HISTORY_RETENTION").then(|| raw.to_string())
            });
            assert_eq!(config.history_retention, DEFAULT_HISTORY_RETENTION);
        }
    }
}
