// SPDX-License-Identifier: MIT

//! Agent-Image Fetcher (§4.11): download an agent image tarball, verify
//! its size and checksum against the published manifest, classify its
//! compression, and sanity-check that it actually contains an agent
//! image before handing the path back to the installer.

use serde::Deserialize;
use sha1::{Digest, Sha1};
use std::io::Read;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ImageFetchError {
    #[error("image {0} not found")]
    ImageNotFound(Uuid),
    #[error("downloaded size {actual} does not match manifest size {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("downloaded sha1 {actual} does not match manifest sha1 {expected}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("could not determine compression for {0}")]
    UnknownCompression(PathBuf),
    #[error("archive does not contain an agent image: missing {0}")]
    NotAnAgentImage(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestFile {
    pub size: u64,
    pub sha1: String,
    #[serde(default)]
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
}

impl Compression {
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "tar.gz",
            Compression::Bzip2 => "tar.bz2",
        }
    }

    fn from_manifest_hint(hint: &str) -> Option<Self> {
        match hint {
            "gzip" | "gz" => Some(Compression::Gzip),
            "bzip2" | "bz2" => Some(Compression::Bzip2),
            _ => None,
        }
    }
}

/// Sniffs the compression format from file-magic bytes: gzip starts with
/// `1f 8b`; bzip2 starts with `BZh` (§4.11).
pub fn sniff_compression(bytes: &[u8]) -> Option<Compression> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        Some(Compression::Gzip)
    } else if bytes.starts_with(b"BZh") {
        Some(Compression::Bzip2)
    } else {
        None
    }
}

pub struct ImageFetchContext {
    pub image_uuid: Uuid,
    pub base_url: String,
    pub output_dir: PathBuf,
    pub output_prefix: String,
}

pub struct FetchedImage {
    pub path: PathBuf,
    pub agent_name: String,
}

pub async fn fetch(client: &reqwest::Client, ctx: &ImageFetchContext) -> Result<FetchedImage, ImageFetchError> {
    let manifest = fetch_manifest(client, ctx).await?;
    let manifest_file = manifest.files.first().ok_or(ImageFetchError::NotAnAgentImage("files[0]".to_string()))?;

    let raw_path = ctx.output_dir.join(format!("{}.file", ctx.output_prefix));
    download_file(client, ctx, &raw_path).await?;

    verify_size(&raw_path, manifest_file.size).await?;
    verify_checksum(&raw_path, &manifest_file.sha1).await?;

    let compression = classify_compression(&raw_path, manifest_file.compression.as_deref()).await?;
    let final_path = ctx.output_dir.join(format!("{}.{}", ctx.output_prefix, compression.extension()));
    tokio::fs::rename(&raw_path, &final_path).await?;

    verify_contains_agent_image(&final_path, compression, &manifest.name)?;

    Ok(FetchedImage { path: final_path, agent_name: manifest.name })
}

async fn fetch_manifest(client: &reqwest::Client, ctx: &ImageFetchContext) -> Result<Manifest, ImageFetchError> {
    let url = format!("{}/{}", ctx.base_url, ctx.image_uuid);
    let response = client.get(&url).send().await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ImageFetchError::ImageNotFound(ctx.image_uuid));
    }
    let response = response.error_for_status()?;
    Ok(response.json().await?)
}

async fn download_file(client: &reqwest::Client, ctx: &ImageFetchContext, dest: &Path) -> Result<(), ImageFetchError> {
    use futures_util::StreamExt;
    let url = format!("{}/{}/file", ctx.base_url, ctx.image_uuid);
    let response = client.get(&url).send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut file = tokio::fs::File::create(dest).await?;
    use tokio::io::AsyncWriteExt;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    Ok(())
}

async fn verify_size(path: &Path, expected: u64) -> Result<(), ImageFetchError> {
    let actual = tokio::fs::metadata(path).await?.len();
    if actual != expected {
        return Err(ImageFetchError::SizeMismatch { expected, actual });
    }
    Ok(())
}

async fn verify_checksum(path: &Path, expected: &str) -> Result<(), ImageFetchError> {
    let bytes = tokio::fs::read(path).await?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    let actual = hex_encode(&hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(ImageFetchError::ChecksumMismatch { expected: expected.to_string(), actual });
    }
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

async fn classify_compression(path: &Path, hint: Option<&str>) -> Result<Compression, ImageFetchError> {
    if let Some(compression) = hint.and_then(Compression::from_manifest_hint) {
        return Ok(compression);
    }
    let mut header = [0u8; 4];
    let mut file = tokio::fs::File::open(path).await?;
    use tokio::io::AsyncReadExt;
    let n = file.read(&mut header).await?;
    sniff_compression(&header[..n]).ok_or_else(|| ImageFetchError::UnknownCompression(path.to_path_buf()))
}

/// Confirms the archive contains `<agentName>/image_uuid`, the heuristic
/// this is really an agent image and not an arbitrary tarball (§4.11).
fn verify_contains_agent_image(path: &Path, compression: Compression, agent_name: &str) -> Result<(), ImageFetchError> {
    let file = std::fs::File::open(path)?;
    let expected_entry = format!("{agent_name}/image_uuid");
    let found = match compression {
        Compression::Gzip => {
            let decoder = flate2::read::GzDecoder::new(file);
            archive_contains(decoder, &expected_entry)?
        }
        Compression::Bzip2 => {
            let decoder = bzip2_rs::DecoderReader::new(file);
            archive_contains(decoder, &expected_entry)?
        }
    };
    if found {
        Ok(())
    } else {
        Err(ImageFetchError::NotAnAgentImage(expected_entry))
    }
}

fn archive_contains(reader: impl Read, expected_entry: &str) -> std::io::Result<bool> {
    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.path()?.to_string_lossy() == expected_entry {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "image_fetch_tests.rs"]
mod tests;
