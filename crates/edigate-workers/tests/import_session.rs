//! End-to-end exercise of the import worker against a scripted host.

#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::process::Command;
use std::thread;

use edigate_protocol::{Record, RecordSession, SessionOutcome, SessionStream};

fn sample_envelope() -> serde_json::Value {
    serde_json::json!({
        "message_id": "ORDER_G41_PROJ1_701052",
        "timestamp": "2017-01-27T08:30:00",
        "version": "1.0",
        "from": {"identity": "mm@customer.example", "domain": "customer.example"},
        "to": {"identity": "edigate@operator.example", "domain": "operator.example"},
        "order": {
            "order_number": "701052",
            "project_number": "PROJ1",
            "contract_number": "G41",
            "lines": [
                {"line_number": "1", "quantity": "2", "material_item_code": "91G5999000378"}
            ]
        },
        "summary": {"total_line_items": "1", "total_amount": "40.00", "total_quantity": "2"}
    })
}

#[test]
fn import_round_trips_an_envelope() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind host listener");
    let port = listener.local_addr().expect("listener address").port();

    let host = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept worker connection");
        let mut session = RecordSession::new(SessionStream::Tcp(stream));
        let records = session.receive().expect("receive record stream");
        session
            .send_outcome(&SessionOutcome::new("OK", "order imported"))
            .expect("send outcome");
        records
    });

    let dir = tempfile::tempdir().expect("temp dir");
    let envelope = dir.path().join("ORDER_G41_PROJ1_701052.json");
    fs::write(
        &envelope,
        serde_json::to_vec_pretty(&sample_envelope()).expect("serialise envelope"),
    )
    .expect("write envelope");
    let out_dir = dir.path().join("out");

    let status = Command::new(env!("CARGO_BIN_EXE_edigate-import"))
        .arg("--partner")
        .arg(format!("tcp://127.0.0.1:{port}"))
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--customer")
        .arg("ACME")
        .arg("--log-format")
        .arg("compact")
        .arg(&envelope)
        .status()
        .expect("run import worker");
    assert!(status.success(), "import should exit zero");

    let records = host.join().expect("join host");
    let find = |key: &str| {
        records
            .iter()
            .find(|record| record.key() == key)
            .map(Record::value)
    };
    assert_eq!(find("Ordno"), Some("701052"));
    assert_eq!(find("MaterialItemCode"), Some("91G5999000378"));

    let response_path = out_dir.join("RESPONSE_ACME_PROJ1_PO_RESPONSE_701052.json");
    let response = fs::read_to_string(response_path).expect("read response document");
    assert!(response.contains("\"action\": \"OK\""));
    assert!(response.contains("order imported"));
}

#[test]
fn unreadable_envelope_writes_an_error_response_and_exits_nonzero() {
    let dir = tempfile::tempdir().expect("temp dir");
    let envelope = dir.path().join("ORDER_G41_PROJ1_701052.json");
    fs::write(&envelope, b"this is not an envelope").expect("write bad envelope");
    let out_dir = dir.path().join("out");

    let status = Command::new(env!("CARGO_BIN_EXE_edigate-import"))
        .arg("--partner")
        .arg("tcp://127.0.0.1:9")
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--customer")
        .arg("ACME")
        .arg("--log-format")
        .arg("compact")
        .arg(&envelope)
        .status()
        .expect("run import worker");
    assert!(!status.success(), "import should exit non-zero");

    let response_path = out_dir.join("RESPONSE_ACME_PROJ1_PO_RESPONSE_701052.json");
    let response = fs::read_to_string(response_path).expect("read error response");
    assert!(response.contains("\"action\": \"ERROR\""));
}
