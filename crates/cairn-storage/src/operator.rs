//! OpenDAL Operator factory for cairn storage backends

use anyhow::{Context, Result};
use cairn_core::config::{expand_tilde, StorageBackend, StorageConfig};
use opendal::Operator;

/// Access keys for an S3-compatible gateway
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, falling back to
    /// the `CAIRN_`-prefixed names.
    pub fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("CAIRN_ACCESS_KEY_ID"))
            .context("S3 credentials not set: export AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("CAIRN_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Ok(Self {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Build an S3 operator (path-style addressing, as S3-compatible gateways expect).
///
/// No retry layer is installed; retries belong to [`crate::retry`].
pub fn build_operator(storage: &StorageConfig, creds: &S3Credentials) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(&creds.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build the operator selected by `[storage] backend`.
///
/// For `s3`, an HTTP endpoint is an error when `enforce_tls` is set and a
/// warning otherwise. `creds` is only consulted for `s3`.
pub fn build_from_core_config(
    storage: &StorageConfig,
    creds: Option<&S3Credentials>,
) -> Result<Operator> {
    match storage.backend {
        StorageBackend::S3 => {
            if storage.endpoint.starts_with("http://") {
                if storage.enforce_tls {
                    anyhow::bail!(
                        "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                         Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                        storage.endpoint
                    );
                }
                tracing::warn!(
                    endpoint = %storage.endpoint,
                    "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
                     Set storage.enforce_tls = true and use HTTPS in production."
                );
            }
            let creds = creds.context("s3 backend requires credentials")?;
            build_operator(storage, creds)
        }
        StorageBackend::Fs => {
            let root = expand_tilde(&storage.root);
            let root = root
                .to_str()
                .with_context(|| format!("storage root is not UTF-8: {}", root.display()))?;
            let op = Operator::new(opendal::services::Fs::default().root(root))
                .context("creating OpenDAL fs operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .finish();
            Ok(op)
        }
        StorageBackend::Memory => {
            tracing::warn!("memory storage backend selected; uploads do not outlive this process");
            let op = Operator::new(opendal::services::Memory::default())
                .context("creating OpenDAL memory operator")?
                .finish();
            Ok(op)
        }
    }
}
