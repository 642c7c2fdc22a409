use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::new(cargo_bin!("pesaflow"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("book"))
        .stdout(predicate::str::contains("pay"));
}

#[test]
fn test_pay_requires_booking_id_and_phone() {
    let mut cmd = Command::new(cargo_bin!("pesaflow"));
    cmd.arg("pay");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--booking-id"));
}

#[test]
fn test_book_requires_slot_arguments() {
    let mut cmd = Command::new(cargo_bin!("pesaflow"));
    cmd.args(["book", "--phone", "0712345678"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--service-id"));
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    let mut cmd = Command::new(cargo_bin!("pesaflow"));
    cmd.arg("refund");
    cmd.assert().failure();
}
