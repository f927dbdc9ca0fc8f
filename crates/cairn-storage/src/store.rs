//! Content-addressed blob store
//!
//! Layout inside the operator root:
//! ```text
//! blobs/<blake3-hex>   stored bytes (ciphertext envelopes are opaque here)
//! pins/<blake3-hex>    empty marker, present once the blob is pinned
//! ```

use std::future::Future;

use anyhow::{Context, Result};
use cairn_core::ContentId;
use opendal::Operator;

/// The storage network as seen by the client: opaque bytes in, content
/// identifiers out.
pub trait ContentStore: Send + Sync {
    fn upload(&self, data: Vec<u8>) -> impl Future<Output = Result<ContentId>> + Send;

    fn download(&self, cid: &ContentId) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn exists(&self, cid: &ContentId) -> impl Future<Output = Result<bool>> + Send;

    /// Ask the network to retain `cid`. `false` if there is no such blob.
    fn pin(&self, cid: &ContentId) -> impl Future<Output = Result<bool>> + Send;
}

/// [`ContentStore`] over any OpenDAL operator, addressed by BLAKE3 digest.
#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Listing the root is the lightest round trip every backend supports.
    pub async fn check_health(&self) -> Result<()> {
        self.op
            .list("/")
            .await
            .map(|_| ())
            .context("storage health check failed")
    }
}

/// Content id for `data`.
pub fn content_id_for(data: &[u8]) -> ContentId {
    ContentId::new(blake3::hash(data).to_hex().to_string())
}

fn checked_digest(cid: &ContentId) -> Result<&str> {
    let s = cid.as_str();
    if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        anyhow::bail!("invalid content id: {s:?} (expected 64 hex characters)");
    }
    Ok(s)
}

fn blob_path(cid: &ContentId) -> Result<String> {
    Ok(format!("blobs/{}", checked_digest(cid)?))
}

fn pin_path(cid: &ContentId) -> Result<String> {
    Ok(format!("pins/{}", checked_digest(cid)?))
}

impl ContentStore for OpendalStore {
    async fn upload(&self, data: Vec<u8>) -> Result<ContentId> {
        let cid = content_id_for(&data);
        let path = blob_path(&cid)?;
        let len = data.len();

        let present = self
            .op
            .exists(&path)
            .await
            .with_context(|| format!("stat {path}"))?;
        if present {
            tracing::debug!(cid = %cid, "blob already stored");
            return Ok(cid);
        }

        self.op
            .write(&path, data)
            .await
            .with_context(|| format!("writing {path}"))?;
        tracing::debug!(cid = %cid, bytes = len, "stored blob");
        Ok(cid)
    }

    async fn download(&self, cid: &ContentId) -> Result<Vec<u8>> {
        let path = blob_path(cid)?;
        let data = self
            .op
            .read(&path)
            .await
            .with_context(|| format!("reading {path}"))?
            .to_vec();

        let actual = content_id_for(&data);
        if &actual != cid {
            anyhow::bail!("content hash mismatch for {cid}: stored bytes hash to {actual}");
        }
        Ok(data)
    }

    async fn exists(&self, cid: &ContentId) -> Result<bool> {
        let path = blob_path(cid)?;
        self.op
            .exists(&path)
            .await
            .with_context(|| format!("stat {path}"))
    }

    async fn pin(&self, cid: &ContentId) -> Result<bool> {
        if !self.exists(cid).await? {
            tracing::debug!(cid = %cid, "pin requested for unknown blob");
            return Ok(false);
        }
        let path = pin_path(cid)?;
        self.op
            .write(&path, Vec::<u8>::new())
            .await
            .with_context(|| format!("writing {path}"))?;
        tracing::debug!(cid = %cid, "pinned blob");
        Ok(true)
    }
}
