//! Document illustrations.
//!
//! Illustrations are cosmetic: [`illustrate`] records failures and carries on.

use crate::layout::MysteryDir;
use image::{Rgb, RgbImage};
use sleuthgraph_core::commitment::sha256_hex;
use sleuthgraph_core::Mystery;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("image backend failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub image_id: String,
    pub path: PathBuf,
}

pub trait ImageSynthesizer {
    fn generate_image(&self, prompt: &str, id: &str, output_dir: &Path) -> Result<GeneratedImage, ImageError>;
}

/// Offline backend: a striped card whose palette is derived from the prompt.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderCards {
    pub width: u32,
    pub height: u32,
}

impl Default for PlaceholderCards {
    fn default() -> Self {
        Self {
            width: 320,
            height: 200,
        }
    }
}

fn palette(prompt: &str) -> [Rgb<u8>; 2] {
    let digest = sha256_hex(prompt.as_bytes());
    let byte = |i: usize| {
        digest
            .get(2 + 2 * i..4 + 2 * i)
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .unwrap_or(0x80)
    };
    [
        Rgb([byte(0) / 2 + 96, byte(1) / 2 + 96, byte(2) / 2 + 96]),
        Rgb([byte(3) / 4, byte(4) / 4, byte(5) / 4]),
    ]
}

impl ImageSynthesizer for PlaceholderCards {
    fn generate_image(&self, prompt: &str, id: &str, output_dir: &Path) -> Result<GeneratedImage, ImageError> {
        fs::create_dir_all(output_dir).map_err(|source| ImageError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let [paper, ink] = palette(prompt);
        let card = RgbImage::from_fn(self.width, self.height, |x, y| {
            let border = x < 6 || y < 6 || x + 6 >= self.width || y + 6 >= self.height;
            if border || ((y / 12) % 3 == 0 && x % 40 < 30) {
                ink
            } else {
                paper
            }
        });
        let path = output_dir.join(format!("{id}.png"));
        card.save(&path)?;
        Ok(GeneratedImage {
            image_id: id.to_string(),
            path,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllustrationFailure {
    pub image_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IllustrationReport {
    pub generated: Vec<GeneratedImage>,
    pub failed: Vec<IllustrationFailure>,
}

/// Render every planned illustration of `mystery` into `dir/images`.
pub fn illustrate(synth: &dyn ImageSynthesizer, dir: &MysteryDir, mystery: &Mystery) -> IllustrationReport {
    let output = dir.images_dir();
    let mut report = IllustrationReport::default();
    for image in mystery.images() {
        let stem = image
            .file_name
            .strip_suffix(".png")
            .unwrap_or(&image.file_name);
        match synth.generate_image(&image.prompt, stem, &output) {
            Ok(done) => {
                debug!(image_id = %image.image_id, path = %done.path.display(), "illustration written");
                report.generated.push(done);
            }
            Err(e) => {
                warn!(image_id = %image.image_id, error = %e, "illustration failed, continuing");
                report.failed.push(IllustrationFailure {
                    image_id: image.image_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
    report
}
