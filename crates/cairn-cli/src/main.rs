//! cairn: encrypted content-addressed storage client
//!
//! Commands:
//!   put <file> [--encrypt]             - upload a file, print its content id
//!   get <cid> [-o out] [--decrypt]     - download a blob to a file or stdout
//!   exists <cid> / pin <cid>           - query or retain a blob
//!   status                             - storage backend health
//!   keygen                             - print a fresh base64 content key
//!   secret set|show|remove <account>   - manage stored recovery phrases
//!   config show                        - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use cairn_core::config::{expand_tilde, CairnConfig, CryptoConfig, StorageBackend};
use cairn_core::{ContentId, SecretRecord};
use cairn_crypto::{open_record, seal_record, ContentCipher, OsRandom, SymmetricKey};
use cairn_storage::{
    build_from_core_config, OpendalStore, RetryPolicy, S3Credentials, TransferClient,
};

/// Non-interactive password source, checked before prompting.
const PASSWORD_ENV: &str = "CAIRN_PASSWORD";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cairn",
    version,
    about = "Encrypted content-addressed storage client",
    long_about = "cairn: upload, download and pin blobs with optional AES-256 content \
                  encryption, and keep password-protected recovery phrases"
)]
struct Cli {
    /// Path to the cairn configuration file
    #[arg(
        long,
        short = 'c',
        env = "CAIRN_CONFIG",
        default_value = "~/.config/cairn/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "CAIRN_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "CAIRN_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file and print its content id
    ///
    /// S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY.
    Put {
        file: PathBuf,
        /// Encrypt with the configured content key (implied by crypto.enabled)
        #[arg(long)]
        encrypt: bool,
    },

    /// Download a blob by content id
    Get {
        cid: String,
        /// Destination file (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Decrypt with the configured content key (implied by crypto.enabled)
        #[arg(long)]
        decrypt: bool,
    },

    /// Check whether a blob is stored
    Exists { cid: String },

    /// Ask the storage network to retain a blob
    Pin { cid: String },

    /// Check storage backend connectivity
    Status,

    /// Generate a random 256-bit content key
    Keygen,

    /// Recovery phrase management
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum SecretAction {
    /// Store a secret for an account (prompts for the secret)
    Set {
        account: String,
        /// Protect the secret with a password instead of storing it in the clear
        #[arg(long)]
        encode: bool,
    },
    /// Print the secret stored for an account
    Show { account: String },
    /// Delete the secret stored for an account
    Remove { account: String },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (defaults + file + environment)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = CairnConfig::load_with_env(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(f) => f,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("invalid log.format {:?}: {e}", config.log.format))?,
    };
    init_logging(&level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        backend = ?config.storage.backend,
        "cairn starting"
    );

    match cli.command {
        Commands::Put { file, encrypt } => cmd_put(&config, &file, encrypt).await,
        Commands::Get { cid, output, decrypt } => {
            cmd_get(&config, &cid, output.as_deref(), decrypt).await
        }
        Commands::Exists { cid } => cmd_exists(&config, &cid).await,
        Commands::Pin { cid } => cmd_pin(&config, &cid).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Keygen => cmd_keygen(),
        Commands::Secret { action } => cmd_secret(&config_path, action),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output (`get` writes blobs there)
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Wiring ────────────────────────────────────────────────────────────────────

fn content_cipher(crypto: &CryptoConfig) -> Result<ContentCipher> {
    match crypto.key.as_deref() {
        Some(encoded) => {
            let key = SymmetricKey::from_base64(encoded).context("invalid crypto.key")?;
            Ok(ContentCipher::new(Some(key)))
        }
        None => Ok(ContentCipher::disabled()),
    }
}

fn open_store(config: &CairnConfig) -> Result<OpendalStore> {
    let creds = match config.storage.backend {
        StorageBackend::S3 => Some(S3Credentials::from_env()?),
        StorageBackend::Fs | StorageBackend::Memory => None,
    };
    let op = build_from_core_config(&config.storage, creds.as_ref())?;
    Ok(OpendalStore::new(op))
}

fn build_client(config: &CairnConfig) -> Result<TransferClient<OpendalStore>> {
    Ok(TransferClient::new(
        open_store(config)?,
        content_cipher(&config.crypto)?,
        RetryPolicy::from_config(&config.retry),
    ))
}

fn password_from(env_value: Option<String>) -> Option<SecretString> {
    env_value
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// `CAIRN_PASSWORD` if set, otherwise an interactive prompt.
fn read_password(confirm: bool) -> Result<SecretString> {
    if let Some(pw) = password_from(std::env::var(PASSWORD_ENV).ok()) {
        return Ok(pw);
    }

    let pw = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if again != pw {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(pw))
}

// ── Transfers ─────────────────────────────────────────────────────────────────

async fn cmd_put(config: &CairnConfig, file: &Path, encrypt: bool) -> Result<()> {
    let encrypt = encrypt || config.crypto.enabled;
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;

    let client = build_client(config)?;
    let cid = client.put(data, encrypt).await?;
    println!("{cid}");
    Ok(())
}

async fn cmd_get(
    config: &CairnConfig,
    cid: &str,
    output: Option<&Path>,
    decrypt: bool,
) -> Result<()> {
    let decrypt = decrypt || config.crypto.enabled;
    let client = build_client(config)?;
    let data = client.get(&ContentId::new(cid), decrypt).await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &data)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("{} bytes -> {}", data.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data).context("writing to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

async fn cmd_exists(config: &CairnConfig, cid: &str) -> Result<()> {
    let client = build_client(config)?;
    let present = client.exists(&ContentId::new(cid)).await?;
    println!("{cid}: {}", if present { "present" } else { "absent" });
    Ok(())
}

async fn cmd_pin(config: &CairnConfig, cid: &str) -> Result<()> {
    let client = build_client(config)?;
    if !client.pin(&ContentId::new(cid)).await? {
        anyhow::bail!("no blob stored under {cid}");
    }
    println!("{cid}: pinned");
    Ok(())
}

async fn cmd_status(config: &CairnConfig) -> Result<()> {
    let storage = &config.storage;
    let location = match storage.backend {
        StorageBackend::S3 => format!("{}/{}", storage.endpoint, storage.bucket),
        StorageBackend::Fs => expand_tilde(&storage.root).display().to_string(),
        StorageBackend::Memory => "in-process".to_string(),
    };
    let policy = RetryPolicy::from_config(&config.retry);
    let encryption = content_cipher(&config.crypto)?.is_available();

    println!("cairn v{}", env!("CARGO_PKG_VERSION"));
    println!("  backend:    {:?} ({location})", storage.backend);
    println!(
        "  retry:      {} attempts, {} ms base delay",
        policy.max_attempts(),
        policy.base_delay().as_millis()
    );
    println!(
        "  encryption: {}",
        match (encryption, config.crypto.enabled) {
            (true, true) => "on by default",
            (true, false) => "key configured, opt-in",
            (false, _) => "no key configured",
        }
    );

    let store = open_store(config)?;
    match store.check_health().await {
        Ok(()) => println!("  storage:    ok"),
        Err(e) => {
            println!("  storage:    unreachable ({e:#})");
            anyhow::bail!("storage health check failed");
        }
    }
    Ok(())
}

// ── Keys and secrets ──────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    let key = SymmetricKey::generate(&OsRandom)?;
    println!("{}", key.to_base64());
    eprintln!("Store this under [crypto] key, or export CAIRN_CRYPTO_KEY.");
    Ok(())
}

fn cmd_secret(config_path: &Path, action: SecretAction) -> Result<()> {
    // Mutations work on the file as written, without environment overrides
    let mut config = CairnConfig::load(config_path)?;

    match action {
        SecretAction::Set { account, encode } => {
            let secret = rpassword::prompt_password(format!("Secret for {account}: "))
                .context("reading secret")?;
            if secret.is_empty() {
                anyhow::bail!("refusing to store an empty secret");
            }
            let secret = SecretString::from(secret);
            let password = if encode { Some(read_password(true)?) } else { None };

            let record = seal_record(&secret, password.as_ref(), encode, &OsRandom)?;
            config.set_secret(account.as_str(), record);
            config.save(config_path)?;
            println!(
                "stored {} secret for {account} in {}",
                if encode { "password-protected" } else { "plaintext" },
                config_path.display()
            );
        }
        SecretAction::Show { account } => {
            let record = config
                .secret(&account)
                .with_context(|| format!("no secret stored for {account}"))?;
            let password = if record.encoded {
                Some(read_password(false)?)
            } else {
                None
            };
            let secret = open_record(record, password.as_ref())?;
            println!("{}", secret.expose_secret());
        }
        SecretAction::Remove { account } => {
            if config.remove_secret(&account).is_none() {
                anyhow::bail!("no secret stored for {account}");
            }
            config.save(config_path)?;
            println!("removed secret for {account}");
        }
    }
    Ok(())
}

// ── Config ────────────────────────────────────────────────────────────────────

/// Copy of `config` safe to print: the content key and plaintext secrets
/// are masked, encoded envelopes are shown as stored.
fn redacted(config: &CairnConfig) -> CairnConfig {
    let mut shown = config.clone();
    if shown.crypto.key.is_some() {
        shown.crypto.key = Some("[REDACTED]".into());
    }
    for record in shown.accounts.values_mut() {
        if !record.encoded {
            *record = SecretRecord::plaintext("[REDACTED]");
        }
    }
    shown
}

fn cmd_config_show(config: &CairnConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered =
        toml::to_string_pretty(&redacted(config)).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
