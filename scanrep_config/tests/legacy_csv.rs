use scanrep_config::{
    Config, KEY_ENCODER_CALIBRATION, LEGACY_DEFAULTS, load_legacy_csv, write_default_legacy_csv,
};
use std::fs;
use tempfile::tempdir;

#[test]
fn default_file_is_written_once_and_is_well_formed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.csv");

    assert!(write_default_legacy_csv(&path).unwrap());
    assert!(!write_default_legacy_csv(&path).unwrap());

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), LEGACY_DEFAULTS.len());
    assert!(text.lines().all(|l| l.matches(',').count() == 1));

    let legacy = load_legacy_csv(&path).unwrap();
    assert_eq!(legacy.len(), LEGACY_DEFAULTS.len());
    assert_eq!(legacy.get(KEY_ENCODER_CALIBRATION), Some(-1.8122e-05));
}

#[test]
fn lookup_is_by_key_not_position() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.csv");
    fs::write(
        &path,
        "force_error_margin,0.25\n# comment,1\nunknown_key,7\nposition_error_margin, 0.5\n",
    )
    .unwrap();

    let legacy = load_legacy_csv(&path).unwrap();
    let mut cfg = Config::default();
    cfg.apply_legacy(&legacy);
    assert!((cfg.display.force_error_margin - 0.25).abs() < 1e-12);
    assert!((cfg.display.position_error_margin - 0.5).abs() < 1e-12);
    // untouched keys keep TOML/default values
    assert!((cfg.display.force_display_sensitivity - 30.0).abs() < 1e-12);
    assert!(legacy.get("unknown_key").is_none());
}

#[test]
fn encoder_calibration_is_negated_on_overlay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.csv");
    fs::write(&path, "encoder_calibration,-2.0e-05\n").unwrap();
    let mut cfg = Config::default();
    cfg.apply_legacy(&load_legacy_csv(&path).unwrap());
    assert!((cfg.encoder.calibration - 2.0e-05).abs() < 1e-15);
}

#[test]
fn rejects_non_numeric_and_malformed_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.csv");

    fs::write(&path, "force_error_margin,abc\n").unwrap();
    let err = load_legacy_csv(&path).expect_err("non-numeric");
    assert!(format!("{err}").contains("non-numeric"));

    fs::write(&path, "force_display_sensitivity,30,encoder_calibration\n").unwrap();
    let err = load_legacy_csv(&path).expect_err("three fields");
    assert!(format!("{err}").contains("exactly 2 fields"));
}
