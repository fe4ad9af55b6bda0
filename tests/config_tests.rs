use std::io::Write;
use std::time::Duration;

use tile_rotator::config::{Configuration, DEFAULT_SEARCH_URL};

#[test]
fn empty_config_uses_defaults() {
    let cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.slot_count, 20);
    assert_eq!(cfg.rotation_interval, Duration::from_secs(2));
    assert_eq!(cfg.initial_query, "rock");
    assert!(!cfg.autoplay);
    assert_eq!(cfg.rng_seed, None);
    assert_eq!(cfg.provider.search_url, DEFAULT_SEARCH_URL);
    assert_eq!(cfg.provider.artwork_field, "artworkUrl100");
    assert_eq!(cfg.provider.result_limit, 50);
    cfg.validated().expect("defaults are valid");
}

#[test]
fn parse_kebab_case_config() {
    let yaml = r#"
slot-count: 12
rotation-interval: 750ms
initial-query: "daft punk"
autoplay: true
rng-seed: 42
event-buffer: 8
provider:
  artwork-field: artworkUrl60
  result-limit: 30
  request-timeout: 3s
"#;
    let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.slot_count, 12);
    assert_eq!(cfg.rotation_interval, Duration::from_millis(750));
    assert_eq!(cfg.initial_query, "daft punk");
    assert!(cfg.autoplay);
    assert_eq!(cfg.rng_seed, Some(42));
    assert_eq!(cfg.event_buffer, 8);
    assert_eq!(cfg.provider.artwork_field, "artworkUrl60");
    assert_eq!(cfg.provider.result_limit, 30);
    assert_eq!(cfg.provider.request_timeout, Duration::from_secs(3));
    assert_eq!(cfg.provider.search_url, DEFAULT_SEARCH_URL);
    cfg.validated().unwrap();
}

#[test]
fn unknown_fields_are_rejected() {
    let err = serde_yaml::from_str::<Configuration>("slots: 20\n").unwrap_err();
    assert!(err.to_string().contains("unknown field"), "{err}");

    let err = serde_yaml::from_str::<Configuration>("provider:\n  limit: 5\n").unwrap_err();
    assert!(err.to_string().contains("unknown field"), "{err}");
}

#[test]
fn result_limit_must_leave_a_reserve() {
    let cfg: Configuration = serde_yaml::from_str("provider:\n  result-limit: 20\n").unwrap();
    let err = cfg.validated().unwrap_err();
    assert!(format!("{err:#}").contains("result-limit"), "{err:#}");

    let cfg: Configuration =
        serde_yaml::from_str("slot-count: 4\nprovider:\n  result-limit: 5\n").unwrap();
    cfg.validated().unwrap();
}

#[test]
fn rejects_zero_values() {
    for yaml in [
        "slot-count: 0\n",
        "rotation-interval: 0s\n",
        "event-buffer: 0\n",
        "provider:\n  request-timeout: 0s\n",
        "provider:\n  result-limit: 500\n",
        "provider:\n  search-url: ftp://example.com\n",
        "provider:\n  artwork-field: \"\"\n",
    ] {
        let cfg: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert!(cfg.validated().is_err(), "expected rejection for {yaml:?}");
    }
}

#[test]
fn loads_from_yaml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "initial-query: jazz\nrotation-interval: 5s").unwrap();
    let cfg = Configuration::from_yaml_file(file.path())
        .unwrap()
        .validated()
        .unwrap();
    assert_eq!(cfg.initial_query, "jazz");
    assert_eq!(cfg.rotation_interval, Duration::from_secs(5));
}
