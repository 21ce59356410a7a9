use super::*;
use tokio::process::Command;

#[tokio::test]
async fn captures_stdout_and_exit_status() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("echo hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), DEFAULT_OUTPUT_LIMIT_BYTES).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout_str().trim(), "hello");
    assert!(!output.stdout_truncated);
}

#[tokio::test]
async fn times_out_and_kills_child() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("sleep 30");
    let err = run_with_timeout(cmd, Duration::from_millis(50), DEFAULT_OUTPUT_LIMIT_BYTES).await.unwrap_err();
    assert!(matches!(err, SubprocessError::Timeout { .. }));
}

#[tokio::test]
async fn truncates_output_past_the_limit() {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg("head -c 1000 /dev/zero");
    let output = run_with_timeout(cmd, Duration::from_secs(5), 100).await.unwrap();
    assert_eq!(output.stdout.len(), 100);
    assert!(output.stdout_truncated);
}

#[test]
fn stderr_excerpt_keeps_head_and_tail() {
    let body = vec![b'x'; 10_000];
    let excerpt = truncate_excerpt(&body);
    assert!(excerpt.contains("...[truncated]..."));
    assert!(excerpt.len() < body.len());
}

#[test]
fn stderr_excerpt_is_verbatim_when_short() {
    let body = b"boom".to_vec();
    assert_eq!(truncate_excerpt(&body), "boom");
}
