//! Boot image loading.
//!
//! An image is raw machine code, read straight from disk. Only the first
//! `limit` bytes are used (512 for a boot sector); anything after that is
//! ignored.

use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Load at most `limit` bytes of a raw image from disk.
pub fn load_image<P: AsRef<Path>>(path: P, limit: usize) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| LoadError::Io(e.to_string()))?;
    let image = read_image(file, limit)?;
    tracing::debug!(path = %path.display(), bytes = image.len(), "loaded image");
    Ok(image)
}

/// Read at most `limit` bytes of an image from any reader.
pub fn read_image<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, LoadError> {
    let mut image = Vec::new();
    reader
        .take(limit as u64)
        .read_to_end(&mut image)
        .map_err(|e| LoadError::Io(e.to_string()))?;

    if image.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(image)
}

/// Errors that can occur while loading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("image is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_to_limit() {
        let data = vec![0x90u8; 600];
        let image = read_image(&data[..], 512).unwrap();
        assert_eq!(image.len(), 512);
    }

    #[test]
    fn test_short_image() {
        let image = read_image(&[0xEB, 0xFE][..], 512).unwrap();
        assert_eq!(image, vec![0xEB, 0xFE]);
    }

    #[test]
    fn test_huge_limit_reads_only_what_exists() {
        let image = read_image(&[0x90u8; 4][..], usize::MAX).unwrap();
        assert_eq!(image.len(), 4);
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(read_image(std::io::empty(), 512), Err(LoadError::Empty));
    }

    #[test]
    fn test_missing_file() {
        let result = load_image("/nonexistent/boot.bin", 512);
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
