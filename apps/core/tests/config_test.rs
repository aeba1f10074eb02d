use sift_core::config::{self, Config, ConfigError};

#[test]
fn rejects_max_results_out_of_range() {
    let cfg = Config {
        max_results: 200,
        ..Default::default()
    };
    assert!(config::validate(&cfg).is_err());
}

#[test]
fn accepts_default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.max_results, 20);
    assert_eq!(cfg.debounce_ms, 200);
    assert_eq!(cfg.phonetic_max_len, 40);
    assert_eq!(cfg.history_per_source, 100);
    assert_eq!(cfg.query_history_limit, 300);
    assert!(cfg.state_db_path.starts_with(config::stable_app_data_dir()));
    assert!(config::validate(&cfg).is_ok());
}

#[test]
fn rejects_engine_without_placeholder() {
    let mut cfg = Config::default();
    cfg.web_search.engines[0].url = "https://example.com".to_string();
    assert!(matches!(config::validate(&cfg), Err(ConfigError::Invalid(_))));
}

#[test]
fn missing_file_yields_defaults_at_that_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");

    let cfg = config::load(Some(&path)).unwrap();

    assert_eq!(cfg.config_path, path);
    assert_eq!(cfg.max_results, 20);
}

#[test]
fn json5_config_allows_comments_and_partial_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        "{\n  // fewer rows\n  max_results: 8,\n  debounce_ms: 50,\n}\n",
    )
    .unwrap();

    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 8);
    assert_eq!(cfg.debounce_ms, 50);
    assert_eq!(cfg.history_per_source, 100);
}

#[test]
fn toml_config_is_read_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "max_results = 12\ntransliteration_enabled = false\n").unwrap();

    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 12);
    assert!(!cfg.transliteration_enabled);
}

#[test]
fn invalid_values_fail_to_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ max_results: 1 }").unwrap();
    assert!(config::load(Some(&path)).is_err());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["config.json", "config.toml"] {
        let cfg = Config {
            max_results: 30,
            file_max_depth: 5,
            config_path: dir.path().join(name),
            ..Config::default()
        };
        config::save(&cfg).unwrap();

        let loaded = config::load(Some(&cfg.config_path)).unwrap();
        assert_eq!(loaded, cfg);
    }
}
