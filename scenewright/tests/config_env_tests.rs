// tests/config_env_tests.rs
//
// Note: These tests manipulate process environment variables and must not
// interleave. They share ENV_MUTEX.

use scenewright::config::{ENV_METADATA_TIER, ENV_NOISE, ENV_SEED, ENV_TEAM};
use scenewright::{ConfigSource, MetadataTier, SessionConfig};
use std::sync::Mutex;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [ENV_METADATA_TIER, ENV_NOISE, ENV_SEED, ENV_TEAM] {
        std::env::remove_var(key);
    }
}

#[test]
fn env_tier_is_honored_by_from_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var(ENV_METADATA_TIER, "level2");
    std::env::set_var(ENV_TEAM, "lab");

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.metadata_tier, MetadataTier::Level2);
    assert_eq!(cfg.tier_source, ConfigSource::Env);
    assert_eq!(cfg.team, "lab");
    assert!(!cfg.render_flags().consistent_colors);

    clear_env();
}

#[test]
fn builder_overrides_env() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var(ENV_METADATA_TIER, "level1");

    let cfg = SessionConfig::builder()
        .metadata_tier(MetadataTier::Oracle)
        .build()
        .unwrap();
    assert_eq!(cfg.metadata_tier, MetadataTier::Oracle);
    assert_eq!(cfg.tier_source, ConfigSource::Builder);

    clear_env();
}

#[test]
fn unparseable_env_values_fall_back_to_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();
    std::env::set_var(ENV_METADATA_TIER, "level9");
    std::env::set_var(ENV_SEED, "not-a-seed");

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.metadata_tier, MetadataTier::Default);
    assert_eq!(cfg.tier_source, ConfigSource::Default);
    assert_eq!(cfg.seed, None);

    clear_env();
}

#[test]
fn no_env_gives_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap();
    clear_env();

    let cfg = SessionConfig::from_env().unwrap();
    assert_eq!(cfg.metadata_tier, MetadataTier::Default);
    assert!(!cfg.noise);
    assert_eq!(cfg.screen_width, 600);
    assert_eq!(cfg.screen_height(), 400);
}
