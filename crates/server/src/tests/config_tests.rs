use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

fn temp_root(label: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("craftconnect_{label}_{suffix}"))
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("sqlite:data.db"), "sqlite://data.db");
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn creates_parent_dir_for_sqlite_file() {
    let root = temp_root("config");
    let db_path = root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(root.join("data").exists());

    fs::remove_dir_all(root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let root = temp_root("open");
    let db_path = root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn prefixed_env_vars_override_short_names() {
    let mut settings = Settings::default();
    apply_env(
        &mut settings,
        env_from(&[
            ("SERVER_BIND", "0.0.0.0:1"),
            ("APP__BIND_ADDR", "0.0.0.0:2"),
            ("DATABASE_URL", "sqlite://short.db"),
            ("API_KEY", "short"),
            ("APP__GEMINI_API_KEY", "prefixed"),
            ("APP__GEMINI_TIMEOUT_SECONDS", "nope"),
            ("APP__SEED_DEMO_DATA", "off"),
        ]),
    );

    assert_eq!(settings.server_bind, "0.0.0.0:2");
    assert_eq!(settings.database_url, "sqlite://short.db");
    assert_eq!(settings.gemini_api_key.as_deref(), Some("prefixed"));
    assert_eq!(settings.gemini_timeout_seconds, 20);
    assert!(!settings.seed_demo_data);
}

#[test]
fn config_file_values_apply_before_env() {
    let root = temp_root("file");
    fs::create_dir_all(&root).expect("root");
    let path = root.join("server.toml");
    fs::write(
        &path,
        "bind_addr = \"127.0.0.1:9000\"\ngemini_model = \"gemini-test\"\ngemini_timeout_seconds = 5\nseed_demo_data = false\n",
    )
    .expect("write");

    let mut settings = Settings::default();
    apply_file(&mut settings, &path);
    apply_env(&mut settings, env_from(&[("APP__BIND_ADDR", "127.0.0.1:9001")]));

    assert_eq!(settings.server_bind, "127.0.0.1:9001");
    assert_eq!(settings.gemini_model, "gemini-test");
    assert_eq!(settings.gemini_timeout_seconds, 5);
    assert!(!settings.seed_demo_data);

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn gemini_requires_a_non_blank_key() {
    let mut settings = Settings::default();
    assert!(settings.gemini().is_none());

    settings.gemini_api_key = Some("  ".to_string());
    assert!(settings.gemini().is_none());

    settings.gemini_api_key = Some("key".to_string());
    let cfg = settings.gemini().expect("configured");
    assert_eq!(cfg.api_key, "key");
    assert_eq!(cfg.model, DEFAULT_MODEL);
    assert_eq!(cfg.timeout, Duration::from_secs(20));
}
