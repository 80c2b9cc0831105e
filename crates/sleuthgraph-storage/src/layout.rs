//! On-disk layout of one mystery.
//!
//! ```text
//! <root>/<mystery_id>/
//!   mystery.json          complete artifact
//!   proof_tree.json       proof tree alone
//!   documents/<id>.json   public view, no clue references
//!   images/               illustrations
//! ```

use serde::Serialize;
use sleuthgraph_core::{ImageRecord, Mystery};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MYSTERY_FILE: &str = "mystery.json";
pub const PROOF_TREE_FILE: &str = "proof_tree.json";
pub const DOCUMENTS_DIR: &str = "documents";
pub const IMAGES_DIR: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("directory {path} holds mystery {found}")]
    IdMismatch { path: PathBuf, found: String },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LayoutError + '_ {
    move |source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), LayoutError> {
    let text = serde_json::to_string_pretty(value).map_err(|source| LayoutError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, text).map_err(io_err(path))
}

/// Directory holding one persisted mystery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysteryDir {
    path: PathBuf,
}

impl MysteryDir {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn under(root: &Path, mystery_id: &str) -> Self {
        Self::open(root.join(mystery_id))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mystery_file(&self) -> PathBuf {
        self.path.join(MYSTERY_FILE)
    }

    pub fn proof_tree_file(&self) -> PathBuf {
        self.path.join(PROOF_TREE_FILE)
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.path.join(DOCUMENTS_DIR)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.path.join(IMAGES_DIR)
    }

    pub fn image_path(&self, image: &ImageRecord) -> PathBuf {
        self.images_dir().join(&image.file_name)
    }

    /// Write `mystery` under `root/<mystery_id>`.
    pub fn write(root: &Path, mystery: &Mystery) -> Result<Self, LayoutError> {
        let dir = Self::under(root, mystery.id());
        let documents = dir.documents_dir();
        let images = dir.images_dir();
        fs::create_dir_all(&documents).map_err(io_err(&documents))?;
        fs::create_dir_all(&images).map_err(io_err(&images))?;

        write_json(&dir.mystery_file(), mystery)?;
        write_json(&dir.proof_tree_file(), mystery.proof_tree())?;
        for doc in mystery.documents() {
            let path = documents.join(format!("{}.json", doc.id()));
            write_json(&path, &doc.public_view())?;
        }
        info!(
            mystery_id = mystery.id(),
            path = %dir.path.display(),
            documents = mystery.documents().len(),
            "mystery written"
        );
        Ok(dir)
    }

    /// Read `mystery.json`. Deserialization re-runs every assembly check.
    pub fn load(&self) -> Result<Mystery, LayoutError> {
        let path = self.mystery_file();
        let text = fs::read_to_string(&path).map_err(io_err(&path))?;
        let mystery: Mystery =
            serde_json::from_str(&text).map_err(|source| LayoutError::Json { path, source })?;

        if let Some(name) = self.path.file_name().and_then(|n| n.to_str()) {
            if name != mystery.id() {
                return Err(LayoutError::IdMismatch {
                    path: self.path.clone(),
                    found: mystery.id().to_string(),
                });
            }
        }
        debug!(mystery_id = mystery.id(), "mystery loaded");
        Ok(mystery)
    }

    /// Planned images whose file exists.
    pub fn present_images<'m>(&self, mystery: &'m Mystery) -> Vec<&'m ImageRecord> {
        mystery
            .images()
            .iter()
            .filter(|img| self.image_path(img).is_file())
            .collect()
    }
}
