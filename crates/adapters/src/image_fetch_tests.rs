use super::*;
use std::io::Write;

#[test]
fn sniffs_gzip_magic() {
    assert_eq!(sniff_compression(&[0x1f, 0x8b, 0x08, 0x00]), Some(Compression::Gzip));
}

#[test]
fn sniffs_bzip2_magic() {
    assert_eq!(sniff_compression(b"BZh91AY"), Some(Compression::Bzip2));
}

#[test]
fn unknown_magic_sniffs_to_none() {
    assert_eq!(sniff_compression(b"\x00\x00\x00\x00"), None);
}

#[test]
fn manifest_hint_recognizes_aliases() {
    assert_eq!(Compression::from_manifest_hint("gz"), Some(Compression::Gzip));
    assert_eq!(Compression::from_manifest_hint("bzip2"), Some(Compression::Bzip2));
    assert_eq!(Compression::from_manifest_hint("zstd"), None);
}

fn build_gzip_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar_bytes = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_bytes);
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.finish().unwrap();
    }
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn archive_contains_finds_expected_entry() {
    let gz = build_gzip_tar(&[("my-agent/image_uuid", b"abc-123")]);
    let decoder = flate2::read::GzDecoder::new(gz.as_slice());
    assert!(archive_contains(decoder, "my-agent/image_uuid").unwrap());
}

#[test]
fn archive_contains_is_false_when_entry_missing() {
    let gz = build_gzip_tar(&[("my-agent/other-file", b"x")]);
    let decoder = flate2::read::GzDecoder::new(gz.as_slice());
    assert!(!archive_contains(decoder, "my-agent/image_uuid").unwrap());
}

#[tokio::test]
async fn verify_size_matches_actual_file_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload");
    tokio::fs::write(&path, b"0123456789").await.unwrap();
    verify_size(&path, 10).await.unwrap();
    let err = verify_size(&path, 5).await.unwrap_err();
    assert!(matches!(err, ImageFetchError::SizeMismatch { expected: 5, actual: 10 }));
}

#[tokio::test]
async fn verify_checksum_matches_sha1_of_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload");
    tokio::fs::write(&path, b"hello world").await.unwrap();
    let mut hasher = Sha1::new();
    hasher.update(b"hello world");
    let expected = hex_encode(&hasher.finalize());
    verify_checksum(&path, &expected).await.unwrap();
    let err = verify_checksum(&path, "deadbeef").await.unwrap_err();
    assert!(matches!(err, ImageFetchError::ChecksumMismatch { .. }));
}
