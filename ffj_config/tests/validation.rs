use ffj_config::load_toml;
use rstest::rstest;

#[test]
fn empty_file_is_a_valid_config() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults validate");
    assert_eq!(cfg.motion.slider_home_steps, -58_000);
    assert_eq!(cfg.axes.sealer.half_period_us, 3000);
    assert!(!cfg.axes.slider.forward_high);
    assert!((cfg.scale.calibration_factor - 13.40).abs() < f32::EPSILON);
    assert_eq!(cfg.camera.window_s, 300);
    assert_eq!(cfg.relays.motor_settle_ms, 1000);
}

#[test]
fn motor_settle_lives_under_relays() {
    let cfg = load_toml("[relays]\nmotor_settle_ms = 250\n").expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.relays.motor_settle_ms, 250);
    assert!(cfg.relays.active_low);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let toml = r#"
[axes.mixer]
half_period_us = 5

[dosing]
threshold_g = 250.0
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.axes.mixer.half_period_us, 5);
    assert!(cfg.axes.mixer.forward_high);
    assert_eq!(cfg.dosing.poll_ms, 250);
    assert_eq!(cfg.pins.hx711_dt, 2);
}

#[rstest]
#[case("[axes.sealer]\nhalf_period_us = 0\n", "axes.sealer.half_period_us must be >= 1")]
#[case("[motion]\nmixer_up_steps = 0\n", "motion.mixer_up_steps must be non-zero")]
#[case("[dosing]\nthreshold_g = 0.0\n", "dosing.threshold_g must be > 0")]
#[case("[dosing]\nsamples = 0\n", "dosing.samples must be >= 1")]
#[case("[dosing]\nmolasses_speed_pct = 120\n", "dosing speeds must be in 0..=100")]
#[case("[scale]\ncalibration_factor = 0.0\n", "scale.calibration_factor must be non-zero")]
#[case("[camera]\nwindow_s = 0\n", "camera.window_s must be >= 1")]
#[case("[state]\npath = \"  \"\n", "state.path must not be empty")]
#[case("[estop]\ndebounce_n = 0\n", "estop.debounce_n must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation must be one of")]
#[case("[controller]\nidle_ms = 0\n", "controller.idle_ms must be >= 1")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn rejects_duplicate_pins() {
    let toml = r#"
[pins]
pump_pwm = 12
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("duplicate pin");
    let msg = format!("{err}");
    assert!(msg.contains("pins.pump_pwm and pins.slider_home both use GPIO 12"), "{msg}");
}

#[test]
fn rejects_pins_beyond_header() {
    let cfg = load_toml("[pins]\nbuzzer = 40\n").expect("parse TOML");
    let err = cfg.validate().expect_err("invalid pin");
    assert!(format!("{err}").contains("pins.buzzer = 40 is not a valid GPIO"));
}

#[test]
fn estop_pin_joins_uniqueness_check() {
    let cfg = load_toml("[pins]\nestop_in = 26\n").expect("parse TOML");
    let err = cfg.validate().expect_err("estop clashes with buzzer");
    assert!(format!("{err}").contains("pins.estop_in and pins.buzzer"));

    let cfg = load_toml("[pins]\nestop_in = 27\n").expect("parse TOML");
    cfg.validate().expect("free pin");
}

#[test]
fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ffj.toml");
    std::fs::write(&path, "[state]\npath = \"/tmp/progress.toml\"\n").unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let cfg = load_toml(&text).unwrap();
    assert_eq!(cfg.state.path, "/tmp/progress.toml");
}

#[test]
fn wrong_types_fail_to_parse() {
    assert!(load_toml("[dosing]\nsamples = \"many\"\n").is_err());
}
