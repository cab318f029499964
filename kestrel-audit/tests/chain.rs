use chrono::DateTime;
use kestrel_audit::{
    AuditConfig, AuditRecord, AuditWriter, Redactor, verify_segment, verify_str,
};
use serde_json::json;
use std::fs;
use std::path::PathBuf;

const KEY: &[u8] = b"test-integrity-key";

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("kestrel-chain-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn writer(dir: &PathBuf) -> AuditWriter {
    AuditWriter::new(AuditConfig::new(dir), Redactor::default(), KEY.to_vec()).unwrap()
}

fn record(index: usize) -> AuditRecord {
    AuditRecord::new(
        format!("r-{index}"),
        DateTime::from_timestamp(index as i64, 0).unwrap(),
        "riskEvent",
        "info",
        json!({"sequence": index, "note": format!("event {index}")}),
    )
}

/// One hundred events verify end-to-end; flipping a byte inside the 42nd
/// record's data is reported as the first broken link at line 42.
#[test]
fn tampering_is_located_at_the_exact_line() {
    let dir = temp_dir("tamper");
    let mut writer = writer(&dir);
    for index in 1..=100 {
        writer.append(record(index)).unwrap();
    }
    let segment = writer.segments().unwrap()[0].clone();

    let report = verify_segment(&segment, KEY).unwrap();
    assert!(report.valid);
    assert_eq!(report.lines, 100);

    // Flip one byte in line 42's data payload.
    let content = fs::read_to_string(&segment).unwrap();
    let tampered: Vec<String> = content
        .lines()
        .enumerate()
        .map(|(index, line)| {
            if index == 41 {
                line.replacen("event 42", "event 4X", 1)
            } else {
                line.to_string()
            }
        })
        .collect();
    fs::write(&segment, tampered.join("\n")).unwrap();

    let report = verify_segment(&segment, KEY).unwrap();
    assert!(!report.valid);
    assert!(report.chain_broken);
    let (line, reason) = report.first_broken.unwrap();
    assert_eq!(line, 42);
    assert!(reason.contains("hash mismatch"), "{reason}");

    let _ = fs::remove_dir_all(&dir);
}

/// Removing a record breaks the linkage at the next line.
#[test]
fn deleted_record_breaks_the_link() {
    let dir = temp_dir("delete");
    let mut writer = writer(&dir);
    for index in 1..=10 {
        writer.append(record(index)).unwrap();
    }
    let segment = writer.segments().unwrap()[0].clone();

    let content = fs::read_to_string(&segment).unwrap();
    let without_fifth: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(index, _)| *index != 4)
        .map(|(_, line)| line)
        .collect();

    let report = verify_str(&without_fifth.join("\n"), KEY).unwrap();
    assert!(!report.valid);
    let (line, _) = report.first_broken.unwrap();
    assert_eq!(line, 5);

    let _ = fs::remove_dir_all(&dir);
}

/// Verification with the wrong integrity key fails on the first record.
#[test]
fn wrong_key_fails_immediately() {
    let dir = temp_dir("key");
    let mut writer = writer(&dir);
    writer.append(record(1)).unwrap();
    let segment = writer.segments().unwrap()[0].clone();

    let report = verify_segment(&segment, b"other-key").unwrap();
    assert!(!report.valid);
    assert_eq!(report.first_broken.unwrap().0, 1);

    let _ = fs::remove_dir_all(&dir);
}

/// The prefix property: every prefix of a valid chain is itself valid.
#[test]
fn chain_prefixes_are_valid() {
    let dir = temp_dir("prefix");
    let mut writer = writer(&dir);
    for index in 1..=20 {
        writer.append(record(index)).unwrap();
    }
    let segment = writer.segments().unwrap()[0].clone();
    let content = fs::read_to_string(&segment).unwrap();
    let lines: Vec<&str> = content.lines().collect();

    for cut in 1..=lines.len() {
        let prefix = lines[..cut].join("\n");
        let report = verify_str(&prefix, KEY).unwrap();
        assert!(report.valid, "prefix of {cut} lines must verify");
    }

    let _ = fs::remove_dir_all(&dir);
}
