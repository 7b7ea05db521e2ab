use std::{thread::sleep, time::Duration};

use heartline::args::{DummyCmd, SubCommands, TopLevelCmd};
use heartline::sinks::snapshot::read_snapshot;
use tokio_util::sync::CancellationToken;

use ntest::timeout;

use common::headless_thread;
mod common;

#[tokio::test]
#[ignore = "binds a fixed port"]
#[timeout(10000)] // 10s timeout
async fn dummy_feeds_http_and_snapshot() -> Result<(), heartline::errors::AppError> {
    let parent_token = CancellationToken::new();

    let arg_config = TopLevelCmd {
        config_override: Some("tests/test_configs/headless_dummy.toml".into()),
        config_required: true,
        no_save: true,
        headless: true,
        subcommands: Some(SubCommands::Dummy(DummyCmd {})),
    };

    tokio::fs::create_dir_all("tests/output").await?;

    let parent_clone = parent_token.clone();
    let app_thread = std::thread::spawn(move || headless_thread(arg_config, parent_clone));
    // Scan, connect and a handful of samples
    sleep(Duration::from_millis(1500));

    let body = reqwest::get("http://127.0.0.1:3131/heartrate")
        .await
        .expect("HTTP sink not reachable")
        .text()
        .await
        .unwrap();
    let bpm: u16 = serde_json::from_str(&body).unwrap();
    assert!((60..=63).contains(&bpm), "unexpected bpm {bpm}");

    let missing = reqwest::get("http://127.0.0.1:3131/nope").await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    let (snapshot_bpm, timestamp) = read_snapshot("tests/output/headless_snapshot.bin").await?;
    assert!((60..=63).contains(&snapshot_bpm), "unexpected bpm {snapshot_bpm}");
    assert!(timestamp > 0.0);

    parent_token.cancel();
    app_thread.join().unwrap()?;

    // Outputs are zeroed on the way out
    let (snapshot_bpm, _) = read_snapshot("tests/output/headless_snapshot.bin").await?;
    assert_eq!(snapshot_bpm, 0);
    Ok(())
}
