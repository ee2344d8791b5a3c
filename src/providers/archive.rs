//! Image archive decoding
//!
//! The image provider answers with a zip container rather than a bare PNG.
//! Only the first entry with a `.png` name is used.

use std::io::{Cursor, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::ProviderError;

const IMAGE_EXTENSION: &str = ".png";

/// Extract the first PNG entry and return it base64-encoded.
///
/// Zip decoding is synchronous, so it runs on the blocking pool.
pub async fn extract_first_png(bytes: Vec<u8>) -> Result<String, ProviderError> {
    tokio::task::spawn_blocking(move || extract_first_png_blocking(&bytes))
        .await
        .map_err(|e| ProviderError::Decode(e.to_string()))?
}

pub fn extract_first_png_blocking(bytes: &[u8]) -> Result<String, ProviderError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ProviderError::Decode(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(IMAGE_EXTENSION) {
            continue;
        }

        tracing::debug!("Extracting {} ({} bytes)", entry.name(), entry.size());

        let mut image = Vec::new();
        entry
            .read_to_end(&mut image)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        return Ok(STANDARD.encode(image));
    }

    Err(ProviderError::AssetNotFound)
}

/// Build an in-memory zip with the given entries
#[cfg(test)]
pub(crate) fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Write;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer
            .start_file(*name, zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
