use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use serde_json::Value as JsonValue;
use tokio::fs;

use sos_core::{Dictionary, PeerEngine, PeerInfo, PrivateKey, PublicKey};

use crate::json::dictionary_from_json;

pub const KEY_BUNDLE_VERSION: u8 = 1;

/// Private key file written by `sos keygen`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretKeyBundle {
    pub version: u8,
    pub created_at: u64,
    #[serde(with = "serde_bytes")]
    pub public_key: ByteBuf,
    #[serde(with = "serde_bytes")]
    pub private_key: ByteBuf,
}

/// Companion `.pub` file shared with sponsors and verifiers.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublicKeyBundle {
    pub version: u8,
    pub created_at: u64,
    #[serde(with = "serde_bytes")]
    pub public_key: ByteBuf,
    pub peer_id: String,
}

/// Private key bundle path and its `.pub` companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPairPaths {
    pub private: PathBuf,
    pub public: PathBuf,
}

impl KeyPairPaths {
    pub fn for_private(private: PathBuf) -> Self {
        let mut public = private.clone().into_os_string();
        public.push(".pub");
        Self {
            private,
            public: public.into(),
        }
    }

    /// Creates the key directories and refuses to replace an existing key.
    pub async fn prepare(&self) -> Result<()> {
        for path in [&self.private, &self.public] {
            create_parent_dir(path).await?;
            let exists = fs::try_exists(path)
                .await
                .with_context(|| format!("checking for an existing key at {}", path.display()))?;
            if exists {
                bail!("key file {} already exists; choose another --out", path.display());
            }
        }
        Ok(())
    }

    /// Writes both bundles; the private one is readable by its owner only.
    pub async fn write(&self, secret: &SecretKeyBundle, public: &PublicKeyBundle) -> Result<()> {
        write_key_bundle(&self.private, secret, "private key bundle").await?;
        restrict_to_owner(&self.private).await?;
        write_key_bundle(&self.public, public, "public key bundle").await
    }
}

/// Seconds since the Unix epoch, stamped into new key bundles.
pub fn bundle_timestamp() -> Result<u64> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|err| anyhow!("cannot stamp key bundle, clock is before 1970: {err}"))?;
    Ok(elapsed.as_secs())
}

pub async fn read_private_key(path: &Path) -> Result<PrivateKey> {
    let bundle: SecretKeyBundle = read_key_bundle(path, "private key bundle").await?;
    check_bundle_version(bundle.version, path)?;
    Ok(PrivateKey::from_bytes(bundle.private_key.into_vec()))
}

pub async fn read_public_key(path: &Path) -> Result<PublicKey> {
    let bundle: PublicKeyBundle = read_key_bundle(path, "public key bundle").await?;
    check_bundle_version(bundle.version, path)?;
    Ok(PublicKey::from_bytes(bundle.public_key.into_vec()))
}

fn check_bundle_version(version: u8, path: &Path) -> Result<()> {
    if version != KEY_BUNDLE_VERSION {
        bail!(
            "unsupported key bundle version {version} in {} (expected {KEY_BUNDLE_VERSION})",
            path.display()
        );
    }
    Ok(())
}

async fn write_key_bundle<T: Serialize>(path: &Path, bundle: &T, kind: &str) -> Result<()> {
    let mut encoded = Vec::new();
    ciborium::ser::into_writer(bundle, &mut encoded)
        .map_err(|err| anyhow!("encoding {kind} for {}: {err}", path.display()))?;
    fs::write(path, encoded)
        .await
        .with_context(|| format!("writing {kind} {}", path.display()))
}

async fn read_key_bundle<T: DeserializeOwned>(path: &Path, kind: &str) -> Result<T> {
    let encoded = fs::read(path)
        .await
        .with_context(|| format!("reading {kind} {}", path.display()))?;
    ciborium::de::from_reader(encoded.as_slice())
        .map_err(|err| anyhow!("{} is not a {kind}: {err}", path.display()))
}

async fn restrict_to_owner(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("restricting private key {} to its owner", path.display()))?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// Reads a JSON object from `path` as a gestalt dictionary.
pub async fn read_gestalt(path: &Path) -> Result<Dictionary> {
    let contents = fs::read(path)
        .await
        .with_context(|| format!("reading gestalt {}", path.display()))?;
    let json: JsonValue = serde_json::from_slice(&contents)
        .with_context(|| format!("gestalt {} is not valid JSON", path.display()))?;
    let object = json
        .as_object()
        .ok_or_else(|| anyhow!("gestalt {} must be a JSON object", path.display()))?;
    dictionary_from_json(object).with_context(|| format!("converting gestalt {}", path.display()))
}

pub async fn read_record(engine: &PeerEngine, path: &Path) -> Result<PeerInfo> {
    let bytes = fs::read(path)
        .await
        .with_context(|| format!("reading peer record {}", path.display()))?;
    engine
        .decode_record(&bytes)
        .with_context(|| format!("decoding peer record {}", path.display()))
}

pub async fn write_record(engine: &PeerEngine, path: &Path, record: &PeerInfo) -> Result<()> {
    let bytes = engine
        .encode_record(record)
        .with_context(|| format!("encoding peer record for {}", path.display()))?;
    create_parent_dir(path).await?;
    fs::write(path, bytes)
        .await
        .with_context(|| format!("writing peer record {}", path.display()))?;
    tracing::info!(peer_id = %record.id(), path = %path.display(), "wrote peer record");
    Ok(())
}

async fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating directory for {}", path.display())),
        _ => Ok(()),
    }
}
