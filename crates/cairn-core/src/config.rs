use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CairnError, CairnResult};
use crate::types::SecretRecord;

/// Prefix for environment overrides: `CAIRN_<SECTION>_<KEY>`.
pub const ENV_PREFIX: &str = "CAIRN";

/// Sections whose scalar keys may be overridden from the environment.
const OVERRIDABLE_SECTIONS: &[&str] = &["log", "storage", "crypto", "retry"];

/// Top-level client configuration (loaded from cairn.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CairnConfig {
    /// Warn if the config file is group/world-readable (default: true)
    pub config_file_mode_check: bool,
    pub log: LogConfig,
    pub storage: StorageConfig,
    pub crypto: CryptoConfig,
    pub retry: RetryConfig,
    /// Secret records keyed by account identifier
    pub accounts: BTreeMap<String, SecretRecord>,
}

impl Default for CairnConfig {
    fn default() -> Self {
        Self {
            config_file_mode_check: true,
            log: LogConfig::default(),
            storage: StorageConfig::default(),
            crypto: CryptoConfig::default(),
            retry: RetryConfig::default(),
            accounts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible gateway
    S3,
    /// Local directory
    Fs,
    /// In-process, non-persistent
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind (default: fs)
    pub backend: StorageBackend,
    /// S3 gateway endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Refuse plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
}

/// Content encryption configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Encrypt uploads by default (default: false)
    pub enabled: bool,
    /// Base64-encoded 256-bit content key
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per network operation, including the first (default: 3)
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per retry (default: 1000)
    pub base_delay_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "cairn".into(),
            root: PathBuf::from("~/.local/share/cairn/blobs"),
            enforce_tls: false,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl CairnConfig {
    /// Read a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> CairnResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CairnError::Config(format!("parsing {}: {e}", path.display())))?;

        if config.config_file_mode_check {
            warn_if_readable_by_others(path);
        }
        Ok(config)
    }

    /// [`load`](Self::load) followed by process environment overrides.
    pub fn load_with_env(path: &Path) -> CairnResult<Self> {
        let mut config = Self::load(path)?;
        // vars() panics on non-UTF-8 entries; those can never name a cairn key
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)));
        config.apply_env_overrides(vars)?;
        Ok(config)
    }

    /// Write the config file, creating parent directories. The file is
    /// restricted to the owner on Unix since it may hold secret records.
    pub fn save(&self, path: &Path) -> CairnResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CairnError::Config(format!("serializing config: {e}")))?;
        write_private(path, content.as_bytes())?;
        Ok(())
    }

    /// Apply `CAIRN_<SECTION>_<KEY>` overrides from `vars`.
    ///
    /// Values are parsed to the type of the key they replace. Returns the
    /// number of keys overridden.
    pub fn apply_env_overrides<I, K, V>(&mut self, vars: I) -> CairnResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut root = toml::Value::try_from(&*self)
            .map_err(|e| CairnError::Config(format!("serializing config: {e}")))?;
        let mut applied = 0;

        for (name, value) in vars {
            let Some((section, key)) = split_env_name(name.as_ref()) else {
                continue;
            };
            let Some(table) = root.get_mut(section).and_then(toml::Value::as_table_mut) else {
                continue;
            };

            let parsed = match table.get(&key) {
                Some(existing) => parse_like(existing, value.as_ref()).ok_or_else(|| {
                    CairnError::Config(format!(
                        "{}: cannot parse override for {section}.{key}",
                        name.as_ref()
                    ))
                })?,
                // Unset optional keys are absent from the serialized form
                None => toml::Value::String(value.as_ref().to_string()),
            };

            tracing::debug!(section, key = %key, "config override from environment");
            table.insert(key, parsed);
            applied += 1;
        }

        if applied > 0 {
            *self = root
                .try_into()
                .map_err(|e| CairnError::Config(format!("applying env overrides: {e}")))?;
        }
        Ok(applied)
    }

    pub fn secret(&self, account: &str) -> Option<&SecretRecord> {
        self.accounts.get(account)
    }

    /// Store a secret record, replacing any previous record for `account`.
    pub fn set_secret(&mut self, account: impl Into<String>, record: SecretRecord) {
        self.accounts.insert(account.into(), record);
    }

    pub fn remove_secret(&mut self, account: &str) -> Option<SecretRecord> {
        self.accounts.remove(account)
    }
}

/// `CAIRN_RETRY_MAX_ATTEMPTS` -> `("retry", "max_attempts")`
fn split_env_name(name: &str) -> Option<(&'static str, String)> {
    let rest = name.strip_prefix(ENV_PREFIX)?.strip_prefix('_')?;
    OVERRIDABLE_SECTIONS.iter().find_map(|section| {
        let key = rest
            .strip_prefix(&section.to_ascii_uppercase())?
            .strip_prefix('_')?;
        (!key.is_empty()).then(|| (*section, key.to_ascii_lowercase()))
    })
}

fn parse_like(existing: &toml::Value, raw: &str) -> Option<toml::Value> {
    match existing {
        toml::Value::String(_) => Some(toml::Value::String(raw.to_string())),
        toml::Value::Integer(_) => raw.trim().parse().ok().map(toml::Value::Integer),
        toml::Value::Float(_) => raw.trim().parse().ok().map(toml::Value::Float),
        toml::Value::Boolean(_) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(toml::Value::Boolean(true)),
            "false" | "0" | "no" | "off" => Some(toml::Value::Boolean(false)),
            _ => None,
        },
        _ => None,
    }
}

/// Write `contents` so that no other user can read them at any point:
/// new files are created 0600 and existing files are narrowed before the
/// truncating open.
#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    if path.exists() {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[cfg(unix)]
fn warn_if_readable_by_others(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            tracing::warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "config file is readable by other users; it may contain secret records"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_readable_by_others(_path: &Path) {}

/// Expand a leading `~/` to `$HOME`
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}
