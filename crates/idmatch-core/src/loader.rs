//! Image loading from storage into an in-memory raster.

use crate::types::FailureKind;
use image::{DynamicImage, ImageError, ImageReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),
    #[error("failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: ImageError,
    },
}

impl LoadError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LoadError::ImageNotFound(_) => FailureKind::ImageNotFound,
            LoadError::ImageDecode { .. } => FailureKind::ImageDecodeError,
        }
    }
}

/// Read and decode the image at `path`.
///
/// The format is sniffed from the file contents, so an upload saved under
/// the wrong extension still decodes.
pub fn load(path: &Path) -> Result<DynamicImage, LoadError> {
    if !path.is_file() {
        return Err(LoadError::ImageNotFound(path.to_path_buf()));
    }

    let decode_err = |source: ImageError| LoadError::ImageDecode {
        path: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::ImageNotFound(path.to_path_buf()),
            _ => decode_err(ImageError::IoError(e)),
        })?
        .with_guessed_format()
        .map_err(|e| decode_err(ImageError::IoError(e)))?;

    let image = reader.decode().map_err(decode_err)?;

    tracing::debug!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "image loaded"
    );

    Ok(image)
}
