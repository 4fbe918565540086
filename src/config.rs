use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "jobfeed.toml";
pub const ENV_PREFIX: &str = "JOBFEED";

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:140.0) Gecko/20100101 Firefox/140.0";

/// Runtime settings. Sources in increasing priority: built-in defaults, `jobfeed.toml`
/// in the working directory, `JOBFEED_*` environment variables. CLI flags are applied
/// on top by the binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    /// Relative paths resolve against `data_dir`.
    pub keywords_file: PathBuf,
    pub max_pages: usize,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("data"),
            keywords_file: PathBuf::from("Upwork_keywords.csv"),
            max_pages: 99,
            request_timeout_secs: 60,
            max_retries: 3,
            base_backoff_ms: 1000,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Load settings; `file` may be absent.
    pub fn load_from(file: &Path) -> Result<Self> {
        let d = Settings::default();
        let fail = |e: config::ConfigError| Error::config_load(&file.display().to_string(), e);

        Config::builder()
            .set_default("data_dir", d.data_dir.display().to_string())
            .and_then(|b| b.set_default("keywords_file", d.keywords_file.display().to_string()))
            .and_then(|b| b.set_default("max_pages", d.max_pages as i64))
            .and_then(|b| b.set_default("request_timeout_secs", d.request_timeout_secs as i64))
            .and_then(|b| b.set_default("max_retries", d.max_retries as i64))
            .and_then(|b| b.set_default("base_backoff_ms", d.base_backoff_ms as i64))
            .and_then(|b| b.set_default("user_agent", d.user_agent))
            .map_err(fail)?
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(fail)
    }

    pub fn keywords_path(&self) -> PathBuf {
        if self.keywords_file.is_absolute() {
            self.keywords_file.clone()
        } else {
            self.data_dir.join(&self.keywords_file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let s = Settings::load_from(Path::new("does/not/exist.toml")).unwrap();
        assert_eq!(s.data_dir, PathBuf::from("data"));
        assert_eq!(s.max_pages, 99);
        assert_eq!(s.keywords_path(), PathBuf::from("data/Upwork_keywords.csv"));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(f, "max_pages = 5\ndata_dir = \"/tmp/jobs\"\nmax_retries = 0").unwrap();

        let s = Settings::load_from(f.path()).unwrap();
        assert_eq!(s.max_pages, 5);
        assert_eq!(s.max_retries, 0);
        assert_eq!(s.data_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(s.request_timeout_secs, 60);
        assert_eq!(s.keywords_path(), PathBuf::from("/tmp/jobs/Upwork_keywords.csv"));
    }

    #[test]
    fn bad_file_is_config_error() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(f, "max_pages = \"lots\"").unwrap();
        assert!(matches!(
            Settings::load_from(f.path()),
            Err(Error::ConfigLoad { .. })
        ));
    }
}
