use std::{fs, thread::sleep, time::Duration};

use serial_test::serial;
use tempfile::tempdir;

#[test]
#[serial]
fn writes_log_file_and_ignores_later_init() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.txt");

    trayframe::logging::init(true, Some(&path));
    trayframe::logging::init(false, None);
    tracing::info!("presenter test line");

    sleep(Duration::from_millis(100));

    assert!(path.exists(), "log file was not created");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("presenter test line"));
}
