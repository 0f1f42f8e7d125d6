// Persistence of composed photos

use chrono::Local;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::StorageError;

pub fn ensure_directory(dir: &Path) -> Result<(), StorageError> {
    if dir.is_dir() {
        return Ok(());
    }
    info!("Creating missing directory {:?}", dir);
    std::fs::create_dir_all(dir).map_err(|e| StorageError::CreateDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// First free `<stem>.<ext>`, then `<stem>_1.<ext>`, `<stem>_2.<ext>`, ...
pub fn next_free_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let extension = extension.trim_start_matches('.');
    let candidate = |suffix: Option<u32>| {
        let name = match suffix {
            None => format!("{}.{}", stem, extension),
            Some(n) => format!("{}_{}.{}", stem, n, extension),
        };
        dir.join(name)
    };

    let mut path = candidate(None);
    let mut count = 1;
    while path.exists() {
        path = candidate(Some(count));
        count += 1;
    }
    path
}

/// `prefix + timestamp + extension` inside `dir`, never an existing file.
pub fn generate_filename(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let stem = format!("{}{}", prefix, Local::now().format("%Y%m%d_%H%M%S"));
    next_free_path(dir, &stem, extension)
}

pub fn save_image(
    image: &RgbImage,
    dir: &Path,
    prefix: &str,
    extension: &str,
) -> Result<PathBuf, StorageError> {
    ensure_directory(dir)?;
    let path = generate_filename(dir, prefix, extension);
    image
        .save(&path)
        .map_err(|e| StorageError::ImageSaveError {
            path: path.clone(),
            message: e.to_string(),
        })?;
    info!("Saved composed photo to {:?}", path);
    Ok(path)
}
