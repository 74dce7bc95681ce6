//! Integration tests for cloudperf-config

use cloudperf_config::*;
use cloudperf_core::BackendKind;
use std::io::Write;
use std::time::Duration;
use temp_env::with_vars;

#[test]
fn test_from_env_discovers_every_family() {
    let vars = vec![
        ("CPT_NC_INSTANCE_1_URL", Some("https://nc1.example.com")),
        ("CPT_NC_INSTANCE_1_USER", Some("monitor")),
        ("CPT_NC_INSTANCE_1_PASS", Some("password-1")),
        ("CPT_NC_INSTANCE_2_URL", Some("https://nc2.example.com")),
        ("CPT_NC_INSTANCE_2_USER", Some("monitor")),
        ("CPT_NC_INSTANCE_2_PASS", Some("password-2")),
        ("CPT_MAGENTACLOUD_INSTANCE_1_URL", Some("https://magentacloud.example.com")),
        ("CPT_MAGENTACLOUD_INSTANCE_1_USER", Some("user@example.com")),
        ("CPT_MAGENTACLOUD_INSTANCE_1_PASS", Some("password-3")),
        ("CPT_MAGENTACLOUD_INSTANCE_1_ANID", Some("120049010000000012345678")),
        ("CPT_DROPBOX_INSTANCE_1_NAME", Some("dropbox-main")),
        ("CPT_DROPBOX_INSTANCE_1_REFRESH_TOKEN", Some("rt")),
        ("CPT_DROPBOX_INSTANCE_1_APP_KEY", Some("key")),
        ("CPT_DROPBOX_INSTANCE_1_APP_SECRET", Some("secret")),
        ("CPT_HIDRIVE_LEGACY_INSTANCE_1_REFRESH_TOKEN", Some("rt")),
        ("CPT_HIDRIVE_LEGACY_INSTANCE_1_CLIENT_ID", Some("id")),
        ("CPT_HIDRIVE_LEGACY_INSTANCE_1_CLIENT_SECRET", Some("secret")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::with_prefix("CPT").from_env().unwrap();
        let names: Vec<&str> = config.instances.iter().map(|i| i.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "https://nc1.example.com",
                "https://nc2.example.com",
                "https://magentacloud.example.com",
                "dropbox-main",
                "hidrive_legacy-1",
            ]
        );

        let magenta = &config.instances[2];
        assert_eq!(magenta.kind, BackendKind::WebdavAnid);
        assert_eq!(magenta.service(), "magentacloud");

        let dropbox = &config.instances[3];
        assert_eq!(dropbox.url, "https://api.dropboxapi.com");

        let hidrive = &config.instances[4];
        assert_eq!(hidrive.url, "https://api.hidrive.strato.com");
        assert!(matches!(hidrive.credentials, Credentials::HidriveOauth { .. }));
    });
}

#[test]
fn test_discovery_stops_at_first_gap() {
    let vars = vec![
        ("CPG_NC_INSTANCE_1_URL", Some("https://nc1.example.com")),
        ("CPG_NC_INSTANCE_1_USER", Some("monitor")),
        ("CPG_NC_INSTANCE_1_PASS", Some("password-1")),
        ("CPG_NC_INSTANCE_3_URL", Some("https://nc3.example.com")),
        ("CPG_NC_INSTANCE_3_USER", Some("monitor")),
        ("CPG_NC_INSTANCE_3_PASS", Some("password-3")),
    ];

    with_vars(vars, || {
        let instances = ConfigLoader::with_prefix("CPG").discover_instances().unwrap();
        assert_eq!(instances.len(), 1);
    });
}

#[test]
fn test_missing_credentials_are_an_error() {
    let vars = vec![
        ("CPM_HIDRIVE_INSTANCE_1_URL", Some("https://webdav.hidrive.example.com")),
        ("CPM_HIDRIVE_INSTANCE_1_USER", Some("monitor")),
        ("CPM_HIDRIVE_INSTANCE_1_PASS", None),
    ];

    with_vars(vars, || {
        let error = ConfigLoader::with_prefix("CPM").from_env().unwrap_err();
        assert!(matches!(error, ConfigError::EnvError(ref message) if message.contains("CPM_HIDRIVE_INSTANCE_1_PASS")));
    });
}

#[test]
fn test_no_instances_is_fatal() {
    with_vars(vec![("CPE_NC_INSTANCE_1_URL", None::<&str>)], || {
        let error = ConfigLoader::with_prefix("CPE").from_env().unwrap_err();
        assert!(matches!(error, ConfigError::ValidationError(_)));
    });
}

#[test]
fn test_shared_overrides_apply_to_every_instance() {
    let vars = vec![
        ("CPO_NC_INSTANCE_1_URL", Some("https://nc1.example.com")),
        ("CPO_NC_INSTANCE_1_USER", Some("monitor")),
        ("CPO_NC_INSTANCE_1_PASS", Some("password-1")),
        ("CPO_TEST_FILE_SIZE_MB", Some("100")),
        ("CPO_TEST_CHUNK_SIZE_MB", Some("10")),
        ("CPO_TEST_INTERVAL_SECONDS", Some("600")),
        ("CPO_HTTP_TIMEOUT", Some("120")),
        ("CPO_LOG_LEVEL", Some("debug")),
        ("CPO_LOG_FORMAT", Some("json")),
        ("CPO_HEALTH_BIND_ADDRESS", Some("127.0.0.1:9200")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::with_prefix("CPO").from_env().unwrap();
        let instance = &config.instances[0];

        assert_eq!(instance.file_size_mb, 100);
        assert_eq!(instance.chunk_size_mb, 10);
        assert_eq!(instance.interval, Duration::from_secs(600));
        assert_eq!(config.http.timeout, Duration::from_secs(120));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.server.bind_address, "127.0.0.1:9200");
    });
}

#[test]
fn test_invalid_override_is_reported() {
    let vars = vec![
        ("CPI_NC_INSTANCE_1_URL", Some("https://nc1.example.com")),
        ("CPI_NC_INSTANCE_1_USER", Some("monitor")),
        ("CPI_NC_INSTANCE_1_PASS", Some("password-1")),
        ("CPI_TEST_FILE_SIZE_MB", Some("ten")),
    ];

    with_vars(vars, || {
        let error = ConfigLoader::with_prefix("CPI").from_env().unwrap_err();
        assert!(error.to_string().contains("TEST_FILE_SIZE_MB"));
    });
}

#[test]
fn test_from_file() {
    let yaml = r#"
test_directory: /perf
http:
  timeout: 60
  assembly_timeout: 900
resilience:
  circuit_breaker:
    max_failures: 3
    success_threshold: 1
    reset_timeout: 120
instances:
  - name: nextcloud-a
    service: nextcloud
    kind: webdav-basic
    url: https://cloud.example.com
    credentials:
      type: basic
      username: monitor
      password: secret-password
    file_size_mb: 20
    chunk_size_mb: 4
    interval: 120
  - name: hidrive-legacy
    kind: oauth2-hidrive-legacy
    url: https://api.hidrive.strato.com
    credentials:
      type: hidrive_oauth
      refresh_token: rt
      client_id: id
      client_secret: secret
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let config = ConfigLoader::with_prefix("CPF").from_file(file.path()).unwrap();

    assert_eq!(config.test_directory, "/perf");
    assert_eq!(config.http.assembly_timeout, Duration::from_secs(900));
    assert_eq!(config.resilience.circuit_breaker.max_failures, 3);
    assert_eq!(config.instances.len(), 2);
    assert_eq!(config.instances[0].chunk_size_bytes(), 4 * 1024 * 1024);
    assert_eq!(config.instances[1].service(), "oauth2-hidrive-legacy");
    assert_eq!(config.instances[1].interval, Duration::from_secs(300));
}

#[test]
fn test_invalid_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"instances: [not, a, mapping").unwrap();

    let error = ConfigLoader::with_prefix("CPX").from_file(file.path()).unwrap_err();
    assert!(matches!(error, ConfigError::ParseError(_)));
}
