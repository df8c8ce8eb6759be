use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use crate::workflow::PageLimits;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = lookup("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let default_page_size = lookup("DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|| "20".to_string())
            .parse::<u32>()
            .context("DEFAULT_PAGE_SIZE must be a valid number")?;

        let max_page_size = lookup("MAX_PAGE_SIZE")
            .unwrap_or_else(|| "100".to_string())
            .parse::<u32>()
            .context("MAX_PAGE_SIZE must be a valid number")?;

        if default_page_size == 0 || max_page_size == 0 {
            bail!("page sizes must be at least 1");
        }
        if default_page_size > max_page_size {
            bail!(
                "DEFAULT_PAGE_SIZE ({}) exceeds MAX_PAGE_SIZE ({})",
                default_page_size,
                max_page_size
            );
        }

        Ok(Config {
            port,
            state_dir,
            default_page_size,
            max_page_size,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("payflow.db")
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path(), PathBuf::from("./payflow.db"));
        assert_eq!(config.page_limits(), PageLimits::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("STATE_DIR", "/var/lib/payflow"),
            ("DEFAULT_PAGE_SIZE", "50"),
            ("MAX_PAGE_SIZE", "50"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path(), PathBuf::from("/var/lib/payflow/payflow.db"));
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("MAX_PAGE_SIZE", "-1")]).is_err());
    }

    #[test]
    fn test_page_size_bounds() {
        assert!(config(&[("DEFAULT_PAGE_SIZE", "0")]).is_err());
        assert!(config(&[("MAX_PAGE_SIZE", "0")]).is_err());
        assert!(config(&[("DEFAULT_PAGE_SIZE", "200")]).is_err());
    }
}
