#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use cityeye::channel::SpoolChannel;

const ZONES: &str = r#"[{"content": [{"x": 0, "y": 0}, {"x": 64, "y": 0}, {"x": 64, "y": 48}, {"x": 0, "y": 48}]}]"#;

fn presence(outbox: &Path) -> Vec<String> {
    let Ok(spool) = SpoolChannel::open(outbox) else {
        return Vec::new();
    };
    spool
        .read_all()
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.topic == "cityeye/cam-sig/status")
        .filter_map(|m| m.payload["status"].as_str().map(str::to_string))
        .collect()
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    done()
}

fn run_until_signal(signal: &str) -> (Option<i32>, Vec<String>) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("xlines.json"), ZONES).unwrap();
    let config = serde_json::json!({
        "device_id": "cam-sig",
        "xlines_path": root.join("xlines.json"),
        "db_path": root.join("results.db"),
        "outbox_dir": root.join("outbox"),
        "capture_dir": root.join("captures"),
        "inbox_dir": root.join("inbox"),
        "source": {"kind": "blank", "width": 64, "height": 48, "frames": 100_000_000u64}
    });
    fs::write(root.join("config.json"), config.to_string()).unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_cityeye"))
        .arg("--config")
        .arg(root.join("config.json"))
        .current_dir(root)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let outbox = root.join("outbox");
    assert!(
        wait_for(Duration::from_secs(20), || presence(&outbox).contains(&"online".to_string())),
        "pipeline never came online"
    );

    let status = Command::new("kill")
        .arg(format!("-{signal}"))
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let exit = child.wait().unwrap();
    (exit.code(), presence(&outbox))
}

#[test]
fn test_sigterm_shuts_down_gracefully() {
    let (code, statuses) = run_until_signal("TERM");
    assert_eq!(code, Some(0));
    assert_eq!(statuses, vec!["online", "offline"]);
}

#[test]
fn test_sigint_shuts_down_gracefully() {
    let (code, statuses) = run_until_signal("INT");
    assert_eq!(code, Some(0));
    assert_eq!(statuses, vec!["online", "offline"]);
}
