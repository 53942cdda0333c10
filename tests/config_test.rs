use cryptorag::Config;

#[test]
fn test_validate_creates_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().join("crypto_data");

    config.validate().unwrap();
    assert!(config.storage.data_dir.is_dir());
    assert_eq!(
        config.memory_path(),
        dir.path().join("crypto_data").join("memory.json")
    );
}

#[test]
fn test_serialized_config_hides_secrets() {
    let mut config = Config::default();
    config.apis.openai_api_key = Some("sk-secret".to_string());
    config.storage.database_url = Some("postgres://user:pw@host/db".to_string());

    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("sk-secret"));
    assert!(!json.contains("pw@host"));
    assert!(config.has_ai());
}
