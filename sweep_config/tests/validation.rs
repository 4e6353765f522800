use rstest::rstest;
use sweep_config::load_toml;

#[test]
fn empty_toml_yields_defaults_and_validates() {
    let cfg = load_toml("").unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.limits.max_temperature_k, 299.0);
    assert_eq!(cfg.limits.max_temp_rate_k_per_min, 2.5);
    assert_eq!(cfg.limits.max_field_t, 8.0);
    assert_eq!(cfg.limits.temp_floor_k, 10.0);
    assert_eq!(cfg.stabilize.window, 10);
    assert_eq!(cfg.pacing.tick_ms, 1000);
    assert!(cfg.telegram.token.is_none());
}

#[test]
fn full_config_round_trips() {
    let cfg = load_toml(
        r#"
[limits]
max_temperature_k = 250.0
max_temp_rate_k_per_min = 2.0
max_field_t = 6.0
max_field_rate_t_per_min = 0.5
max_bias_v = 5.0
temp_floor_k = 4.2

[stabilize]
window = 20
approach_band_k = 0.5
max_drift_k = 0.05
drift_window_s = 60.0

[pacing]
tick_ms = 500
settle_ms = 1000
field_poll_ms = 250
field_tolerance_t = 0.0005

[logging]
level = "debug"
file = "sweep.log"
rotation = "daily"

[telegram]
token = "123:abc"
chat_id = "42"

[addresses]
sourcemeter = "GPIB0::24::INSTR"
cryostat = "GPIB0::8::INSTR"
"#,
    )
    .unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.limits.temp_floor_k, 4.2);
    assert_eq!(cfg.stabilize.window, 20);
    assert_eq!(cfg.pacing.field_tolerance_t, 0.0005);
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));
    assert_eq!(cfg.addresses.sourcemeter.as_deref(), Some("GPIB0::24::INSTR"));
}

#[rstest]
#[case::zero_temp("[limits]\nmax_temperature_k = 0.0", "max_temperature_k")]
#[case::negative_rate("[limits]\nmax_temp_rate_k_per_min = -1.0", "max_temp_rate_k_per_min")]
#[case::floor_above_max("[limits]\ntemp_floor_k = 400.0", "temp_floor_k")]
#[case::tiny_window("[stabilize]\nwindow = 1", "stabilize.window")]
#[case::zero_band("[stabilize]\napproach_band_k = 0.0", "approach_band_k")]
#[case::zero_tick("[pacing]\ntick_ms = 0", "tick_ms")]
#[case::zero_tolerance("[pacing]\nfield_tolerance_t = 0.0", "field_tolerance_t")]
#[case::bad_rotation("[logging]\nrotation = \"weekly\"", "rotation")]
#[case::half_telegram("[telegram]\ntoken = \"123:abc\"", "telegram")]
#[case::bad_address("[addresses]\nmagnet = \"COM3\"", "addresses.magnet")]
#[case::malformed_gpib("[addresses]\nmagnet = \"GPIB0::x::INSTR\"", "addresses.magnet")]
fn invalid_configs_are_rejected(#[case] toml: &str, #[case] fragment: &str) {
    let cfg = load_toml(toml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(
        err.to_string().contains(fragment),
        "error {err} does not mention {fragment}"
    );
}

#[test]
fn unknown_rotation_value_parses_but_fails_validation() {
    // serde accepts any string; validate() restricts it.
    let cfg = load_toml("[logging]\nrotation = \"sometimes\"").unwrap();
    assert!(cfg.validate().is_err());
}
