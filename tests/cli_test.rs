use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

fn operations(rows: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "type, seller, reference, amount, rate").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg("tests/fixtures/operations.csv").arg("--method").arg("manual");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("seller,balance"))
        // 10.00 + 20.00 commission, 20.00 paid out
        .stdout(predicate::str::contains("1,10.00"))
        // 10.00 commission, payout cancelled before processing
        .stdout(predicate::str::contains("2,10.00"))
        .stdout(predicate::str::contains("3,20.00"));

    Ok(())
}

#[test]
fn test_payouts_report() {
    let report = NamedTempFile::new().unwrap();
    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg("tests/fixtures/operations.csv")
        .arg("--method")
        .arg("manual")
        .arg("--payouts")
        .arg(report.path());

    cmd.assert().success();

    let written = std::fs::read_to_string(report.path()).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("id,seller,amount,status,method,external_id,failure_reason")
    );
    let first = lines.next().unwrap();
    assert!(first.starts_with("1,1,20.00,completed,manual,manual-"));
    assert_eq!(lines.next(), Some("2,2,10.00,cancelled,manual,,"));
}

#[test]
fn test_disabled_method_refunds_payout() {
    let file = operations(&[
        "credit, 1, , 50.00,",
        "payout, 1, , 20.00,",
        "process, , 1, ,",
    ]);

    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg(file.path()).env("PAYOUT_DEFAULT_METHOD", "disabled");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1,50.00"));
}

#[test]
fn test_invalid_rows_are_reported_and_skipped() {
    let file = operations(&[
        "credit, 1, , 10.00,",
        "refund, 1, , 10.00,",
        "debit, 1, , 99.00,",
        "credit, 1, , 1.005,",
        "process, , abc, ,",
        "credit, 1, , 2.50,",
    ]);

    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading operation"))
        .stderr(predicate::str::contains("Insufficient balance"))
        .stderr(predicate::str::contains("more than two decimal places"))
        .stderr(predicate::str::contains("payout id"))
        .stdout(predicate::str::contains("1,12.50"));
}

#[test]
fn test_payout_below_minimum_is_rejected() {
    let file = operations(&["credit, 1, , 50.00,", "payout, 1, , 5.00,"]);

    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg(file.path()).env("PAYOUT_MINIMUM", "10.00");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("must be between 10.00 and"));
}

#[test]
fn test_invalid_configuration_fails() {
    let file = operations(&["credit, 1, , 50.00,"]);

    let mut cmd = Command::new(cargo_bin!("payout-ledger"));
    cmd.arg(file.path()).env("PAYOUT_MINIMUM", "lots");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("PAYOUT_MINIMUM"));
}
