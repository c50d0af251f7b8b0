//! Runtime configuration resolved from command-line flags and environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `DEPTRACK_HOME` | `$HOME/.deptrack` |
//! | `DEPTRACK_DB` (or `--db`) | `<home>/deptrack.json` |
//! | `DEPTRACK_SECRET` | generated once into `<home>/secret.key` |
//! | `DEPTRACK_TOKEN_TTL_HOURS` | `168` |
//! | `DEPTRACK_HASH_ROUNDS` | `100000` |
//! | `DEPTRACK_LOG` | `warn` |

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Duration;
use tracing::info;

use crate::auth::DEFAULT_HASH_ROUNDS;
use crate::error::{Result, TrackerError};

pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24 * 7;
const SECRET_FILE: &str = "secret.key";
const SESSION_FILE: &str = "session";
const DB_FILE: &str = "deptrack.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub token_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub hash_rounds: u32,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env(db: Option<PathBuf>) -> Result<Self> {
        Self::resolve(db, |key| std::env::var(key).ok())
    }

    /// Resolve configuration using `lookup` for environment variables.
    pub fn resolve(db: Option<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match non_empty(&lookup, "DEPTRACK_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = non_empty(&lookup, "HOME").unwrap_or_else(|| ".".to_string());
                PathBuf::from(home).join(".deptrack")
            }
        };
        let db_path = db
            .or_else(|| non_empty(&lookup, "DEPTRACK_DB").map(PathBuf::from))
            .unwrap_or_else(|| data_dir.join(DB_FILE));

        let token_secret = match non_empty(&lookup, "DEPTRACK_SECRET") {
            Some(s) => s.into_bytes(),
            None => load_or_create_secret(&data_dir)?,
        };
        let ttl_hours: i64 = parsed_or(&lookup, "DEPTRACK_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?;
        if ttl_hours <= 0 {
            return Err(TrackerError::Config("DEPTRACK_TOKEN_TTL_HOURS must be positive".into()));
        }
        let hash_rounds = parsed_or(&lookup, "DEPTRACK_HASH_ROUNDS", DEFAULT_HASH_ROUNDS)?;

        Ok(Config {
            data_dir,
            db_path,
            token_secret,
            token_ttl: Duration::hours(ttl_hours),
            hash_rounds,
        })
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match non_empty(lookup, key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| TrackerError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

/// Read the persisted signing secret, generating one on first use.
fn load_or_create_secret(data_dir: &Path) -> Result<Vec<u8>> {
    let path = data_dir.join(SECRET_FILE);
    if path.exists() {
        let hex_secret = fs::read_to_string(&path)?;
        return hex::decode(hex_secret.trim())
            .map_err(|e| TrackerError::Config(format!("{} is not valid hex: {e}", path.display())));
    }
    fs::create_dir_all(data_dir)?;
    let secret: [u8; 32] = rand::random();
    fs::write(&path, hex::encode(secret))?;
    info!(path = %path.display(), "generated token signing secret");
    Ok(secret.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_under_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_str().unwrap();
        let cfg = Config::resolve(None, env(&[("HOME", home)])).unwrap();
        assert_eq!(cfg.data_dir, dir.path().join(".deptrack"));
        assert_eq!(cfg.db_path, dir.path().join(".deptrack").join("deptrack.json"));
        assert_eq!(cfg.token_ttl, Duration::hours(168));
        assert_eq!(cfg.token_secret.len(), 32);

        // The generated secret is stable across runs.
        let again = Config::resolve(None, env(&[("HOME", home)])).unwrap();
        assert_eq!(cfg.token_secret, again.token_secret);
    }

    #[test]
    fn test_flag_and_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_str().unwrap();
        let lookup = env(&[
            ("DEPTRACK_HOME", home),
            ("DEPTRACK_DB", "/tmp/from-env.json"),
            ("DEPTRACK_SECRET", "s3cret"),
            ("DEPTRACK_TOKEN_TTL_HOURS", "2"),
        ]);
        let cfg = Config::resolve(Some(PathBuf::from("/tmp/from-flag.json")), &lookup).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/from-flag.json"));
        assert_eq!(cfg.token_secret, b"s3cret".to_vec());
        assert_eq!(cfg.token_ttl, Duration::hours(2));
        assert!(!dir.path().join("secret.key").exists());

        let cfg = Config::resolve(None, &lookup).unwrap();
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/from-env.json"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let lookup = env(&[("DEPTRACK_SECRET", "x"), ("DEPTRACK_TOKEN_TTL_HOURS", "soon")]);
        assert!(matches!(Config::resolve(None, lookup), Err(TrackerError::Config(_))));
        let lookup = env(&[("DEPTRACK_SECRET", "x"), ("DEPTRACK_TOKEN_TTL_HOURS", "0")]);
        assert!(matches!(Config::resolve(None, lookup), Err(TrackerError::Config(_))));
    }
}
