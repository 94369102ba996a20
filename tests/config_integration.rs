//! Integration tests for configuration loading
//!
//! Tests that verify config loading from files and environment variables.

use broad2d::config::AppConfig;
use broad2d_physics::FilterRule;
use serial_test::serial;
use std::path::PathBuf;

fn temp_config_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("broad2d-config-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
#[serial]
fn test_env_override() {
    std::env::set_var("B2D_DEMO__BODY_COUNT", "17");
    let config = AppConfig::load().unwrap();
    assert_eq!(config.demo.body_count, 17);
    std::env::remove_var("B2D_DEMO__BODY_COUNT");
}

#[test]
#[serial]
fn test_nested_env_override() {
    std::env::set_var("B2D_PHYSICS__BROADPHASE__AABB_MARGIN", "0.25");
    std::env::set_var("B2D_PHYSICS__BROADPHASE__FILTER_RULE", "either");
    let config = AppConfig::load().unwrap();
    assert_eq!(config.physics.broadphase.aabb_margin, 0.25);
    assert_eq!(config.physics.broadphase.filter_rule, FilterRule::Either);
    std::env::remove_var("B2D_PHYSICS__BROADPHASE__AABB_MARGIN");
    std::env::remove_var("B2D_PHYSICS__BROADPHASE__FILTER_RULE");
}

#[test]
#[serial]
fn test_default_file_matches_builtin_defaults() {
    let config = AppConfig::load().unwrap();
    let defaults = AppConfig::default();
    assert_eq!(config.demo.body_count, defaults.demo.body_count);
    assert_eq!(config.demo.seed, defaults.demo.seed);
    assert_eq!(config.physics.gravity, defaults.physics.gravity);
    assert_eq!(config.physics.broadphase.aabb_margin, defaults.physics.broadphase.aabb_margin);
    assert_eq!(
        config.physics.broadphase.displacement_multiplier,
        defaults.physics.broadphase.displacement_multiplier
    );
    assert_eq!(config.debug.overlay, defaults.debug.overlay);
}

#[test]
#[serial]
fn test_user_file_overrides_default_file() {
    let dir = temp_config_dir("user");
    std::fs::write(dir.join("default.toml"), "[demo]\nticks = 10\nseed = 1\n").unwrap();
    std::fs::write(dir.join("user.toml"), "[demo]\nticks = 20\n").unwrap();

    let config = AppConfig::load_from(&dir).unwrap();
    assert_eq!(config.demo.ticks, 20);
    assert_eq!(config.demo.seed, 1);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_partial_section_keeps_defaults() {
    let dir = temp_config_dir("partial");
    std::fs::write(dir.join("default.toml"), "[physics.broadphase]\nself_collision = true\n").unwrap();

    let config = AppConfig::load_from(&dir).unwrap();
    assert!(config.physics.broadphase.self_collision);
    assert_eq!(config.physics.broadphase.aabb_margin, 0.1);
    assert_eq!(config.physics.time_to_sleep, 0.5);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
#[serial]
fn test_invalid_value_is_an_error() {
    let dir = temp_config_dir("invalid");
    std::fs::write(dir.join("default.toml"), "[demo]\nticks = \"many\"\n").unwrap();

    let err = AppConfig::load_from(&dir).unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));

    std::fs::remove_dir_all(&dir).unwrap();
}
