//! End-to-end tests for the acquisition path: stub-backed bus reads feeding
//! a session, its cycle log, and the session tracker.

use chrono::{TimeZone, Utc};
use fieldlog_core::{
    AcquisitionSession, ClientBackend, CycleLogWriter, DefaultClientFactory, LogRecord, ModbusBus,
    PortConfig, SessionState, SessionTracker,
};
use serde_json::json;

fn stub_bus(config: PortConfig) -> ModbusBus {
    let factory = DefaultClientFactory::new(ClientBackend::Stub);
    ModbusBus::new(config, Box::new(factory))
}

fn fast_port() -> PortConfig {
    let mut port = PortConfig::new("p1", "COM1", 9600, 1);
    port.connect_retries = 1;
    port.read_retries = 2;
    port.connect_retry_delay_secs = 0.0;
    port.read_retry_delay_secs = 0.01;
    port
}

#[tokio::test]
async fn stub_bus_returns_deterministic_payload() {
    let mut bus = stub_bus(fast_port());
    bus.connect().await.unwrap();

    let response = bus.read_holding_registers(0, 3).await.unwrap();
    assert_eq!(response.values, vec![0, 1, 2]);
    assert_eq!(response.detail["sample"], 1);

    let response = bus.read_holding_registers(0, 3).await.unwrap();
    assert_eq!(response.detail["sample"], 2);

    bus.close().await;
}

#[tokio::test]
async fn scenario_roast1_single_record() {
    let dir = tempfile::tempdir().unwrap();
    let started_at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

    let mut writer = CycleLogWriter::new(dir.path(), "roast1", started_at);
    let path = writer.open().unwrap();

    let record = LogRecord {
        timestamp: started_at,
        port_id: "p1".to_string(),
        payload: json!({"val": 123}),
        meta: json!({"m": 1}),
    };
    writer.write(&record).unwrap();
    writer.close();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.contains("roast1"));
    assert!(name.ends_with(".log"));

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(
        parsed,
        json!({
            "ts": "2024-01-01T12:00:00",
            "port_id": "p1",
            "data": {"val": 123},
            "meta": {"m": 1},
        })
    );
}

#[tokio::test]
async fn full_cycle_writes_records_and_clears_tracker() {
    let dir = tempfile::tempdir().unwrap();
    let port = fast_port();

    let mut bus = stub_bus(port.clone());
    bus.connect().await.unwrap();

    let tracker = SessionTracker::for_log_dir(dir.path());
    assert!(tracker.load().unwrap().is_none());

    let mut session = AcquisitionSession::new("cycle1", dir.path());
    let log_path = session.start().unwrap();
    let started_at = session.started_at().unwrap();
    tracker
        .save(&SessionState::new("cycle1", &port.id, started_at, &log_path))
        .unwrap();

    for i in 0..2u32 {
        let response = bus.read_holding_registers(0, 4).await.unwrap();
        let record = LogRecord::new(&port.id, json!({ "holding_registers": response.detail }))
            .with_meta(json!({ "iteration": i }));
        session.log(&record).unwrap();
    }

    session.stop();
    tracker.clear().unwrap();
    bus.close().await;

    let content = std::fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["port_id"], "p1");
    assert_eq!(first["meta"]["iteration"], 0);
    assert_eq!(first["data"]["holding_registers"]["values"], json!([0, 1, 2, 3]));

    assert!(tracker.load().unwrap().is_none());
}

#[tokio::test]
async fn tracker_save_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = SessionTracker::for_log_dir(dir.path());

    let state = SessionState::new(
        "cycle1",
        "p1",
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        dir.path().join("cycle1_20240101T120000.log").as_path(),
    );
    tracker.save(&state).unwrap();
    assert_eq!(tracker.load().unwrap(), Some(state));

    tracker.clear().unwrap();
    tracker.clear().unwrap();
    assert!(tracker.load().unwrap().is_none());
}

#[tokio::test]
async fn session_stop_twice_keeps_log_intact() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = AcquisitionSession::new("cycle1", dir.path());

    let path = session.start().unwrap();
    session
        .log(&LogRecord::new("p1", json!({"val": 1})))
        .unwrap();
    session.stop();
    session.stop();

    let content = std::fs::read_to_string(path).unwrap();
    assert_eq!(content.lines().count(), 1);
}
