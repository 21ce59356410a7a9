use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn invokes_callback_once_immediately_on_spawn() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sysinfo.json");
    std::fs::write(&path, b"{}").expect("write fixture file");

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let _watcher = SysinfoFileWatcher::spawn(path, move || {
        counted.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rewriting_the_file_triggers_another_callback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("sysinfo.json");
    std::fs::write(&path, b"{}").expect("write fixture file");

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let _watcher = SysinfoFileWatcher::spawn(path.clone(), move || {
        counted.fetch_add(1, Ordering::SeqCst);
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(&path, b"{\"changed\":true}").expect("rewrite fixture file");
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(calls.load(Ordering::SeqCst) >= 2);
}
