//! Table-driven tests for configuration loading and validation.

use serial_test::serial;

use playscan::config::{load_config, load_config_from_str, load_default_config};
use playscan::pipeline::PipelineConfig;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "limits": {
                "max_file_size_bytes": 10485760,
                "max_pages_per_document": 40,
                "max_files_per_job": 5,
                "soft_timeout_ms": 120000
            },
            "consent": { "require_ai_consent": true, "allow_local_ocr_fallback": false },
            "render": { "scale": 1.5 },
            "ocr": { "languages": ["eng", "deu"] },
            "ai": {
                "base_url": "https://api.example.com/v1",
                "vision_model": "vision-large",
                "text_model": "text-large",
                "api_key_env_var": "EXAMPLE_API_KEY",
                "request_timeout_ms": 30000,
                "temperature": 0.1,
                "max_output_tokens": 4096,
                "max_input_chars": 30000
            },
            "storage": {
                "blob_root": "/var/lib/playscan/blobs",
                "scenes_directory": "/var/lib/playscan/scenes",
                "database_path": "/var/lib/playscan/playscan.db"
            },
            "sweeper": { "stale_threshold_secs": 900, "batch_limit": 25, "interval_secs": 60 }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_soft_timeout_disabled",
        config_json: r#"{ "version": "1.0", "limits": { "soft_timeout_ms": 0 } }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "limits": {} }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "2.0" }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_top_level_field",
        config_json: r#"{ "version": "1.0", "workers": 4 }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_file_size",
        config_json: r#"{ "version": "1.0", "limits": { "max_file_size_bytes": 0 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "negative_timeout",
        config_json: r#"{ "version": "1.0", "limits": { "soft_timeout_ms": -1 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "scale_out_of_range",
        config_json: r#"{ "version": "1.0", "render": { "scale": 12 } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "bad_language_code",
        config_json: r#"{ "version": "1.0", "ocr": { "languages": ["English!"] } }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "non_http_base_url",
        config_json: r#"{ "version": "1.0", "ai": { "base_url": "ftp://models.example.com" } }"#,
        should_succeed: false,
        expected_error: Some("ai.base_url must be an http(s) URL"),
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: r#"{ "version": "1.0", "#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_config_loading() {
    for test_case in CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "[{}] Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            let err = match result {
                Ok(_) => panic!("[{}] Expected error but loading succeeded", test_case.name),
                Err(e) => e.to_string(),
            };
            if let Some(expected) = test_case.expected_error {
                assert!(
                    err.contains(expected),
                    "[{}] Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected,
                    err
                );
            }
        }
    }
}

#[test]
fn test_defaults_match_documented_values() {
    let config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();

    assert_eq!(config.limits.max_file_size_bytes, 20 * 1024 * 1024);
    assert_eq!(config.limits.max_pages_per_document, 20);
    assert_eq!(config.limits.max_files_per_job, 10);
    assert_eq!(config.limits.soft_timeout_ms, 240_000);
    assert!(config.consent.require_ai_consent);
    assert!(config.consent.allow_local_ocr_fallback);
    assert_eq!(config.render.scale, 2.0);
    assert_eq!(config.ocr.languages, vec!["eng"]);
    assert_eq!(config.ai.request_timeout_ms, 60_000);
    assert_eq!(config.ai.max_output_tokens, 8192);
    assert_eq!(config.sweeper.stale_threshold_secs, 600);
    assert_eq!(config.sweeper.batch_limit, 10);
}

#[test]
fn test_load_from_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("playscan.json");
    std::fs::write(
        &path,
        r#"{ "version": "1.0", "limits": { "max_pages_per_document": 7 } }"#,
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.limits.max_pages_per_document, 7);

    let missing = load_config(dir.path().join("nope.json")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn test_env_overrides_apply_to_default_config() {
    std::env::set_var("PLAYSCAN_MAX_PAGES_PER_DOCUMENT", "3");
    std::env::set_var("PLAYSCAN_REQUIRE_AI_CONSENT", "false");
    std::env::set_var("PLAYSCAN_SOFT_TIMEOUT_MS", "0");

    let result = load_default_config();

    std::env::remove_var("PLAYSCAN_MAX_PAGES_PER_DOCUMENT");
    std::env::remove_var("PLAYSCAN_REQUIRE_AI_CONSENT");
    std::env::remove_var("PLAYSCAN_SOFT_TIMEOUT_MS");

    let config = result.unwrap();
    assert_eq!(config.limits.max_pages_per_document, 3);
    assert!(!config.consent.require_ai_consent);
    assert_eq!(config.limits.soft_timeout_ms, 0);
}

#[test]
#[serial]
fn test_invalid_env_override_is_config_error() {
    std::env::set_var("PLAYSCAN_ALLOW_LOCAL_OCR_FALLBACK", "maybe");
    let result = load_default_config();
    std::env::remove_var("PLAYSCAN_ALLOW_LOCAL_OCR_FALLBACK");

    let err = result.unwrap_err().to_string();
    assert!(err.contains("PLAYSCAN_ALLOW_LOCAL_OCR_FALLBACK"), "{}", err);
}

#[test]
#[serial]
fn test_api_key_from_env_marks_remote_ai_configured() {
    let mut config = load_config_from_str(r#"{ "version": "1.0" }"#).unwrap();
    config.ai.api_key = None;
    config.ai.api_key_file = None;
    config.ai.api_key_env_var = Some("PLAYSCAN_TEST_AI_KEY".to_string());

    std::env::remove_var("PLAYSCAN_TEST_AI_KEY");
    let without = PipelineConfig::from_config(&config).unwrap();
    assert!(!without.remote_ai_configured());

    std::env::set_var("PLAYSCAN_TEST_AI_KEY", "sk-test");
    let with = PipelineConfig::from_config(&config);
    std::env::remove_var("PLAYSCAN_TEST_AI_KEY");
    assert!(with.unwrap().remote_ai_configured());
}
