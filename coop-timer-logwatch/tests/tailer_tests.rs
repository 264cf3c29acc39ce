use coop_timer_logwatch::{LogTailer, TriggerRule};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

const POLL: Duration = Duration::from_millis(10);

async fn wait_for(count: &AtomicUsize, expected: usize) {
    for _ in 0..200 {
        if count.load(Ordering::SeqCst) >= expected {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!(
        "expected {} trigger(s), saw {}",
        expected,
        count.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_spawned_tailer_follows_appends() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("latest.log");

    let starts = Arc::new(AtomicUsize::new(0));
    let resets = Arc::new(AtomicUsize::new(0));
    let mut tailer = LogTailer::new(&path);
    {
        let starts = Arc::clone(&starts);
        tailer.add_rule(TriggerRule::contains("Set the time to 0", move || {
            starts.fetch_add(1, Ordering::SeqCst);
        }));
        let resets = Arc::clone(&resets);
        tailer.add_rule(TriggerRule::contains("Stopping the server", move || {
            resets.fetch_add(1, Ordering::SeqCst);
        }));
    }
    let handle = tailer.spawn(POLL);

    // File appears later; the tailer must just keep waiting
    tokio::time::sleep(POLL * 3).await;
    std::fs::write(&path, "").unwrap();
    tokio::time::sleep(POLL * 3).await;

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "[12:00:00] Starting").unwrap();
    writeln!(file, "[12:00:01] Set the time to 0").unwrap();
    writeln!(file, "[12:00:02] Done").unwrap();
    file.flush().unwrap();

    wait_for(&starts, 1).await;

    writeln!(file, "[12:30:00] Stopping the server").unwrap();
    file.flush().unwrap();
    wait_for(&resets, 1).await;

    let tailer = handle.shutdown().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    assert_eq!(tailer.last_line_count(), 4);
}

#[tokio::test]
async fn test_pattern_rule_in_background() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("latest.log");

    let hits = Arc::new(AtomicUsize::new(0));
    let mut tailer = LogTailer::new(&path);
    let counter = Arc::clone(&hits);
    tailer.add_rule(
        TriggerRule::pattern(r"\[\d+:\d+:\d+\] \[Server thread/INFO\]: Done", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap(),
    );
    let handle = tailer.spawn(POLL);

    std::fs::write(
        &path,
        "noise [1:2:3] [Server thread/INFO]: Done\n[10:20:30] [Server thread/INFO]: Done (3.2s)!\n",
    )
    .unwrap();
    wait_for(&hits, 1).await;

    handle.shutdown().await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_flag_ends_loop() {
    let dir = tempdir().unwrap();
    let handle = LogTailer::new(dir.path().join("never.log")).spawn(POLL);
    assert!(handle.is_running());

    handle.stop();
    assert!(!handle.is_running());
    let tailer = tokio::time::timeout(Duration::from_secs(1), handle.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tailer.last_line_count(), 0);
}

#[tokio::test]
async fn test_read_errors_do_not_stop_loop() {
    let dir = tempdir().unwrap();
    let logs = dir.path().join("logs");
    // A regular file where the logs directory should be makes every stat fail
    std::fs::write(&logs, "not a directory").unwrap();

    let starts = Arc::new(AtomicUsize::new(0));
    let mut tailer = LogTailer::new(logs.join("latest.log"));
    let counter = Arc::clone(&starts);
    tailer.add_rule(TriggerRule::contains("Set the time to 0", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let handle = tailer.spawn(POLL);

    tokio::time::sleep(POLL * 5).await;
    assert!(handle.is_running());

    std::fs::remove_file(&logs).unwrap();
    std::fs::create_dir(&logs).unwrap();
    std::fs::write(logs.join("latest.log"), "Set the time to 0\n").unwrap();
    wait_for(&starts, 1).await;

    let tailer = handle.shutdown().await.unwrap();
    assert_eq!(tailer.last_line_count(), 1);
    assert_eq!(starts.load(Ordering::SeqCst), 1);
}
