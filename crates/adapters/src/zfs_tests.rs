use super::*;

#[test]
fn parses_migration_snapshot_suffixes_sorted() {
    let listing = "zones/abc@vm-migration-3\nzones/abc@vm-migration-1\nzones/abc@other\nzones/abc@vm-migration-2\n";
    let suffixes = parse_snapshot_suffixes("zones/abc", "vm-migration-", listing);
    assert_eq!(suffixes, vec![1, 2, 3]);
}

#[test]
fn parses_empty_listing_as_no_snapshots() {
    assert!(parse_snapshot_suffixes("zones/abc", "vm-migration-", "").is_empty());
}

#[test]
fn resume_token_dash_is_none() {
    assert_eq!(parse_resume_token("-\n"), None);
    assert_eq!(parse_resume_token(""), None);
}

#[test]
fn resume_token_value_is_some() {
    assert_eq!(parse_resume_token("1-abcdef-token\n"), Some("1-abcdef-token".to_string()));
}

#[test]
fn parses_full_send_size() {
    let output = "size 104857600\n";
    assert_eq!(parse_send_size(output).unwrap(), 104_857_600);
}

#[test]
fn parses_incremental_send_size() {
    let output = "incremental vm-migration-4 52428800\n";
    assert_eq!(parse_send_size(output).unwrap(), 52_428_800);
}

#[test]
fn rejects_malformed_dryrun_output() {
    assert!(parse_send_size("garbage line").is_err());
}

#[test]
fn send_command_uses_replicate_flag_for_recursive_sends() {
    let args = SendArgs {
        dataset: "zones/abc".to_string(),
        snapshot: "vm-migration-2".to_string(),
        prev_snapshot: Some("vm-migration-1".to_string()),
        replicate: true,
        resume_token: None,
    };
    let cmd = send_stream_command(&args);
    let rendered: Vec<String> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    assert!(rendered.contains(&"--replicate".to_string()));
    assert!(rendered.contains(&"-I".to_string()));
    assert!(rendered.iter().any(|a| a == "zones/abc@vm-migration-2"));
}

#[test]
fn send_command_uses_props_flag_for_docker_datasets() {
    let args = SendArgs {
        dataset: "zones/def".to_string(),
        snapshot: "vm-migration-1".to_string(),
        prev_snapshot: None,
        replicate: false,
        resume_token: None,
    };
    let cmd = send_stream_command(&args);
    let rendered: Vec<String> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    assert!(rendered.contains(&"--props".to_string()));
    assert!(!rendered.contains(&"-I".to_string()));
}

#[test]
fn send_command_uses_only_the_resume_token_when_present() {
    let args = SendArgs {
        dataset: "zones/abc".to_string(),
        snapshot: "vm-migration-2".to_string(),
        prev_snapshot: Some("vm-migration-1".to_string()),
        replicate: true,
        resume_token: Some("1-deadbeef-token".to_string()),
    };
    let cmd = send_stream_command(&args);
    let rendered: Vec<String> = cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
    assert_eq!(rendered, vec!["send".to_string(), "--parsable".to_string(), "-t".to_string(), "1-deadbeef-token".to_string()]);
}
