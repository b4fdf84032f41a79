use std::sync::Mutex;

use tempfile::NamedTempFile;

use fishscope::{
    AppConfig, ConfigStore, ErrorKind, RenderConfig, CONFIG_ENV, CONF_THRESHOLD_ENV,
    MODEL_PATH_ENV,
};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [CONFIG_ENV, MODEL_PATH_ENV, CONF_THRESHOLD_ENV] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "model_path": "weights/pond.onnx",
        "render": {
            "box_color": [255, 64, 0],
            "box_thickness": 3,
            "font_scale": 1.5,
            "confidence_threshold": 0.4
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var(CONFIG_ENV, file.path());
    std::env::set_var(CONF_THRESHOLD_ENV, "0.55");

    let loaded = ConfigStore::from_env().load();
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    let cfg = loaded.config;
    assert_eq!(cfg.model_path, "weights/pond.onnx");
    assert_eq!(cfg.render.box_color(), [255, 64, 0]);
    assert_eq!(cfg.render.box_thickness(), 3);
    assert_eq!(cfg.render.font_scale(), 1.5);
    assert_eq!(cfg.render.confidence_threshold(), 0.55);

    std::env::set_var(MODEL_PATH_ENV, "stub://bench");
    assert_eq!(ConfigStore::from_env().load().config.model_path, "stub://bench");

    clear_env();
}

#[test]
fn missing_file_yields_defaults_without_warnings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let loaded = ConfigStore::new(dir.path().join("absent.json")).load();
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.config, AppConfig::default());
}

#[test]
fn corrupt_file_and_bad_env_fall_back() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json").expect("write config");
    std::env::set_var(CONF_THRESHOLD_ENV, "1.5");

    let loaded = ConfigStore::new(file.path()).load();
    assert_eq!(loaded.config, AppConfig::default());
    assert_eq!(loaded.warnings.len(), 2);
    assert!(loaded
        .warnings
        .iter()
        .all(|w| w.kind() == ErrorKind::ConfigParse));

    clear_env();
}

#[test]
fn save_then_load_keeps_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let store = ConfigStore::new(dir.path().join("nested/fishscope.json"));
    let config = AppConfig {
        model_path: "models/carp.onnx".to_string(),
        render: RenderConfig::new([10, 20, 30], 5, 2.0, 0.25).expect("valid render config"),
    };
    store.save(&config).expect("save config");
    assert!(!store.path().with_extension("tmp").exists());

    let loaded = store.load();
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.config, config);
}
