//! Image validation and display encoding.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::{Error, Result};
use crate::types::{ImageFile, StagedImage, MAX_IMAGE_BYTES};

/// Check the declared type and size of a selected file.
pub fn validate(file: &ImageFile) -> Result<()> {
    if !file.mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(Error::InvalidFileType {
            mime: file.mime_type.clone(),
        });
    }

    let size = file.size_bytes();
    if size > MAX_IMAGE_BYTES {
        return Err(Error::FileTooLarge {
            size,
            limit: MAX_IMAGE_BYTES,
        });
    }

    Ok(())
}

/// Turn a validated file into a [`StagedImage`] with a data URL.
///
/// The content is sniffed from its magic bytes; files whose content is not a
/// recognisable image fail with [`Error::Decode`]. Encoding runs on the
/// blocking pool so large files do not stall other tasks.
pub async fn decode(file: ImageFile) -> Result<StagedImage> {
    tokio::task::spawn_blocking(move || decode_blocking(file))
        .await
        .map_err(|e| Error::Decode(format!("decoder task failed: {}", e)))?
}

fn decode_blocking(file: ImageFile) -> Result<StagedImage> {
    let sniffed = sniff_image_mime(&file.bytes).ok_or_else(|| {
        Error::Decode(format!("{} is not a readable image", file.filename))
    })?;

    let data_url = format!("data:{};base64,{}", sniffed, BASE64.encode(&file.bytes));

    Ok(StagedImage {
        filename: file.filename,
        mime_type: sniffed.to_string(),
        bytes: file.bytes,
        data_url,
    })
}

/// Rebuild a [`StagedImage`] from a `data:<mime>;base64,...` URL.
pub fn from_data_url(filename: &str, data_url: &str) -> Result<StagedImage> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| Error::Decode("not a data URL".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Decode("data URL has no payload".to_string()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| Error::Decode("data URL is not base64 encoded".to_string()))?;

    if !mime.starts_with("image/") {
        return Err(Error::InvalidFileType {
            mime: mime.to_string(),
        });
    }

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| Error::Decode(format!("invalid base64 payload: {}", e)))?;

    Ok(StagedImage {
        filename: filename.to_string(),
        mime_type: mime.to_string(),
        bytes,
        data_url: data_url.to_string(),
    })
}

/// Read an image from disk, taking its MIME type from the content or,
/// failing that, the extension.
pub async fn read_file(path: &Path) -> Result<ImageFile> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let mime_type = infer::get(&bytes)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| mime_from_extension(&filename).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    Ok(ImageFile::new(filename, mime_type, bytes))
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type())
}

fn mime_from_extension(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// JPEG magic followed by filler, `len` bytes in total.
    pub(crate) fn jpeg_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len.max(4)];
        bytes[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        bytes
    }

    #[test]
    fn test_validate_accepts_jpeg() {
        let file = ImageFile::new("padi.jpg", "image/jpeg", jpeg_bytes(1024 * 1024));
        assert!(validate(&file).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_image() {
        let file = ImageFile::new("notes.pdf", "application/pdf", vec![0; 10]);
        assert!(matches!(
            validate(&file),
            Err(Error::InvalidFileType { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_large_file() {
        let file = ImageFile::new("big.jpg", "image/jpeg", jpeg_bytes(11 * 1024 * 1024));
        assert!(matches!(
            validate(&file),
            Err(Error::FileTooLarge { size, limit })
                if size == 11 * 1024 * 1024 && limit == MAX_IMAGE_BYTES
        ));

        let exact = ImageFile::new("edge.jpg", "image/jpeg", jpeg_bytes(MAX_IMAGE_BYTES as usize));
        assert!(validate(&exact).is_ok());
    }

    #[tokio::test]
    async fn test_decode_and_back() {
        let file = ImageFile::new("padi.jpg", "image/jpeg", jpeg_bytes(64));
        let staged = decode(file).await.unwrap();
        assert_eq!(staged.mime_type, "image/jpeg");
        assert!(staged.data_url.starts_with("data:image/jpeg;base64,/9j/"));

        let restored = from_data_url("padi.jpg", &staged.data_url).unwrap();
        assert_eq!(restored.bytes, staged.bytes);
        assert_eq!(restored.mime_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let file = ImageFile::new("fake.jpg", "image/jpeg", b"definitely not an image".to_vec());
        assert!(matches!(decode(file).await, Err(Error::Decode(_))));
    }

    #[test]
    fn test_from_data_url_errors() {
        assert!(matches!(
            from_data_url("x", "hasil/x.jpg"),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            from_data_url("x", "data:text/plain;base64,aGk="),
            Err(Error::InvalidFileType { .. })
        ));
        assert!(matches!(
            from_data_url("x", "data:image/png;base64,%%%"),
            Err(Error::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_read_file_sniffs_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.bin");
        std::fs::write(&path, jpeg_bytes(32)).unwrap();

        let file = read_file(&path).await.unwrap();
        assert_eq!(file.filename, "photo.bin");
        assert_eq!(file.mime_type, "image/jpeg");
        assert_eq!(file.size_bytes(), 32);
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(mime_from_extension("A.JPG"), Some("image/jpeg"));
        assert_eq!(mime_from_extension("a.txt"), None);
        assert_eq!(mime_from_extension("noext"), None);
    }
}
