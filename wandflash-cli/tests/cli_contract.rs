//! Integration tests for core CLI contract behavior.
//!
//! None of these need hardware: every run either stops before opening a
//! device or points at a device node that does not exist.

use {predicates::prelude::*, std::fs, std::path::Path, tempfile::tempdir};

const MISSING_SERIAL: &str = "/nonexistent/wandflash/ttyUSB9";
const MISSING_USB: &str = "/nonexistent/wandflash/ttyACM9";

/// Command isolated from the user's config files and environment.
fn cli_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("wandflash");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("WANDFLASH_DEVICE")
        .env_remove("WANDFLASH_BAUD")
        .env_remove("WANDFLASH_MODE")
        .env_remove("RUST_LOG");
    cmd
}

fn image(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("firmware.bin");
    fs::write(&path, [0u8; 300]).expect("write image");
    path
}

// ============================================================================
// Help / Version
// ============================================================================

#[test]
fn help_exits_one_and_writes_stdout() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--help")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("--flash"))
        .stdout(predicate::str::contains("--print"));
}

#[test]
fn no_arguments_prints_help_and_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Usage"))
        .stderr(predicate::str::contains("Nothing to do"));
}

#[test]
fn version_exits_zero() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wandflash"));
}

// ============================================================================
// Usage errors
// ============================================================================

#[test]
fn invalid_mode_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--print", "--mode", "uart"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("uart"));
}

#[test]
fn unknown_flag_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .arg("--flsh")
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn missing_explicit_config_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--print", "--config", "/nonexistent/wandflash.toml"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

// ============================================================================
// Device not found
// ============================================================================

#[test]
fn flash_missing_device_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let image = image(dir.path());

    cli_cmd(dir.path())
        .arg("--flash")
        .arg(&image)
        .args(["--device", MISSING_SERIAL])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Error while establishing communication with device",
        ));
}

#[test]
fn device_from_environment() {
    let dir = tempdir().expect("tempdir should be created");
    let image = image(dir.path());

    cli_cmd(dir.path())
        .env("WANDFLASH_DEVICE", MISSING_SERIAL)
        .arg("--flash")
        .arg(&image)
        .assert()
        .code(1)
        .stderr(predicate::str::contains(MISSING_SERIAL));
}

#[test]
fn device_from_local_config_file() {
    let dir = tempdir().expect("tempdir should be created");
    let image = image(dir.path());
    fs::write(
        dir.path().join("wandflash.toml"),
        format!("[connection]\ndevice = \"{MISSING_SERIAL}\"\n"),
    )
    .expect("write config");

    cli_cmd(dir.path())
        .arg("--flash")
        .arg(&image)
        .assert()
        .code(1)
        .stderr(predicate::str::contains(MISSING_SERIAL));
}

#[test]
fn invalid_local_config_is_skipped() {
    let dir = tempdir().expect("tempdir should be created");
    let image = image(dir.path());
    fs::write(dir.path().join("wandflash.toml"), "invalid toml [[[").expect("write config");

    cli_cmd(dir.path())
        .arg("--flash")
        .arg(&image)
        .args(["--device", MISSING_SERIAL])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn print_missing_serial_device_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--print", "--device", MISSING_SERIAL])
        .assert()
        .code(1);
}

// ============================================================================
// Reported failures that still exit 0
// ============================================================================

#[test]
fn missing_binary_is_reported_and_exits_zero() {
    let dir = tempdir().expect("tempdir should be created");
    let missing = dir.path().join("absent.bin");

    cli_cmd(dir.path())
        .arg("--flash")
        .arg(&missing)
        .args(["--device", MISSING_SERIAL])
        .assert()
        .success()
        .stderr(predicate::str::contains("Error opening the binary image file"))
        .stderr(predicate::str::contains("Flash operation aborted"));
}

#[test]
fn print_on_usb_link_is_unsupported() {
    let dir = tempdir().expect("tempdir should be created");
    cli_cmd(dir.path())
        .args(["--print", "--device", MISSING_USB])
        .assert()
        .success()
        .stderr(predicate::str::contains("USB mode"));
}

// ============================================================================
// TTY Detection Tests (colors disabled on non-TTY)
// ============================================================================

#[test]
fn colors_disabled_when_not_tty() {
    let dir = tempdir().expect("tempdir should be created");
    let image = image(dir.path());
    let output = cli_cmd(dir.path())
        .arg("--flash")
        .arg(&image)
        .args(["--device", MISSING_SERIAL])
        .output()
        .expect("command should execute");

    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf-8");
    assert!(
        !stderr.contains("\x1b["),
        "Colors should be disabled in non-TTY mode"
    );
}
