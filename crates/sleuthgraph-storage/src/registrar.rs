//! Commitment registration.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sleuthgraph_core::commitment::sha256_hex;
use sleuthgraph_core::Commitment;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RegistrarError {
    #[error("mystery {0} is already registered")]
    AlreadyRegistered(String),

    #[error("registrar journal I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registrar journal is corrupt at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub mystery_id: String,
    pub mystery_key: String,
    pub proof_hash: String,
    /// Hash of the journal line that recorded the registration.
    pub reference: String,
    pub registered_at: i64,
}

pub trait Registrar {
    fn register(&self, commitment: &Commitment) -> Result<Receipt, RegistrarError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalLine {
    #[serde(flatten)]
    commitment: Commitment,
    registered_at: i64,
}

/// Append-only JSON-lines journal of commitments. One registration per
/// mystery key.
pub struct JournalRegistrar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JournalRegistrar {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self) -> impl FnOnce(std::io::Error) -> RegistrarError + '_ {
        move |source| RegistrarError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Every registered commitment, in registration order.
    pub fn entries(&self) -> Result<Vec<Commitment>, RegistrarError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&self.path).map_err(self.io())?;
        text.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str::<JournalLine>(l)
                    .map(|line| line.commitment)
                    .map_err(|e| RegistrarError::Corrupt {
                        line: i + 1,
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

impl Registrar for JournalRegistrar {
    fn register(&self, commitment: &Commitment) -> Result<Receipt, RegistrarError> {
        let _guard = self.lock.lock();
        if self
            .entries()?
            .iter()
            .any(|c| c.mystery_key == commitment.mystery_key)
        {
            return Err(RegistrarError::AlreadyRegistered(commitment.mystery_id.clone()));
        }

        let registered_at = Utc::now().timestamp();
        let line = serde_json::to_string(&JournalLine {
            commitment: commitment.clone(),
            registered_at,
        })
        .map_err(|e| RegistrarError::Corrupt {
            line: 0,
            reason: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(self.io())?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(self.io())?;
        writeln!(file, "{line}").map_err(self.io())?;

        info!(mystery_id = %commitment.mystery_id, "commitment registered");
        Ok(Receipt {
            mystery_id: commitment.mystery_id.clone(),
            mystery_key: commitment.mystery_key.clone(),
            proof_hash: commitment.proof_hash.clone(),
            reference: sha256_hex(line.as_bytes()),
            registered_at,
        })
    }
}
