//! Materialization of embedded credential data.
//!
//! Base64 `*-data` fields are decoded and written to temp files named with
//! the [`TEMP_FILE_PREFIX`] prefix. Each [`MaterializedFile`] owns its file
//! and deletes it on drop. A process-wide registry records every live
//! materialized path so [`shutdown`] can sweep whatever is left at exit.
//!
//! A path is only ever removed from disk if it is present in the registry
//! and still exists. Paths supplied directly in the document are never
//! registered.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CredentialError, Result};
use crate::model::str_field;

/// Prefix of every temp file created by this crate.
pub const TEMP_FILE_PREFIX: &str = "kubecreds-";

static REGISTRY: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

/// One kind of credential file a kubeconfig entry can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialField {
    /// Key holding base64 data, e.g. `client-key-data`.
    pub data_key: &'static str,
    /// Key holding a plain filesystem path, e.g. `client-key`.
    pub path_key: &'static str,
    suffix: &'static str,
}

pub const CERTIFICATE_AUTHORITY: CredentialField = CredentialField {
    data_key: "certificate-authority-data",
    path_key: "certificate-authority",
    suffix: "-ca.crt",
};

pub const CLIENT_CERTIFICATE: CredentialField = CredentialField {
    data_key: "client-certificate-data",
    path_key: "client-certificate",
    suffix: "-client.crt",
};

pub const CLIENT_KEY: CredentialField = CredentialField {
    data_key: "client-key-data",
    path_key: "client-key",
    suffix: "-client.key",
};

/// A temp file holding decoded credential bytes.
///
/// Dropping it deletes the file and removes it from the registry.
#[derive(Debug)]
pub struct MaterializedFile {
    path: PathBuf,
}

impl MaterializedFile {
    /// Write `data` to a new temp file and register it.
    ///
    /// Uses the system temp dir unless `dir` is given.
    pub fn create(field: &CredentialField, data: &[u8], dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_FILE_PREFIX).suffix(field.suffix);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(data)?;
        file.flush()?;

        let (_, path) = file.keep().map_err(|e| e.error)?;
        REGISTRY.lock().insert(path.clone());
        debug!(path = %path.display(), field = field.data_key, "materialized credential");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MaterializedFile {
    fn drop(&mut self) {
        release(&self.path);
    }
}

fn release(path: &Path) {
    let registered = REGISTRY.lock().remove(path);
    if registered && path.exists() {
        remove(path);
    }
}

fn remove(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed credential file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove credential file");
            false
        }
    }
}

/// Whether `path` is a live materialized file.
pub fn is_registered(path: &Path) -> bool {
    REGISTRY.lock().contains(path)
}

/// Delete every registered temp file, regardless of which context owns it.
///
/// Intended to run once at process exit. Returns the number of files
/// removed. Owners dropped afterwards find their paths unregistered and
/// leave the filesystem alone.
pub fn shutdown() -> usize {
    let paths: Vec<PathBuf> = REGISTRY.lock().drain().collect();
    let removed = paths
        .iter()
        .filter(|path| path.exists() && remove(path))
        .count();
    debug!(removed, "swept materialized credential files");
    removed
}

/// Where a credential file lives.
#[derive(Debug)]
pub enum CredentialFile {
    /// A path given literally in the document. Never deleted.
    Supplied(PathBuf),
    /// Decoded from embedded data; deleted when dropped.
    Materialized(MaterializedFile),
}

impl CredentialFile {
    pub fn path(&self) -> &Path {
        match self {
            Self::Supplied(path) => path,
            Self::Materialized(file) => file.path(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized(_))
    }
}

/// Produce the credential file for `field` from an entry body.
///
/// Embedded data takes precedence over a plain path. Returns `Ok(None)`
/// when the body carries neither.
pub fn materialize(
    body: &Value,
    field: &CredentialField,
    dir: Option<&Path>,
) -> Result<Option<CredentialFile>> {
    if let Some(encoded) = str_field(body, field.data_key) {
        let bytes = decode(field, encoded)?;
        let file = MaterializedFile::create(field, &bytes, dir)?;
        return Ok(Some(CredentialFile::Materialized(file)));
    }

    Ok(str_field(body, field.path_key).map(|path| CredentialFile::Supplied(PathBuf::from(path))))
}

fn decode(field: &CredentialField, encoded: &str) -> Result<Vec<u8>> {
    let compact: String = encoded.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map_err(|source| CredentialError::CredentialDecode {
            field: field.data_key,
            source,
        })
}
