use std::path::Path;

use wlaunch_core::config::{self, Config, ConfigError};
use wlaunch_core::model::ProviderId;
use wlaunch_core::providers::{build_registry, ProviderDeps};
use wlaunch_core::router::PrefixRouter;

fn isolated(dir: &Path) -> Config {
    Config {
        script_dir: dir.join("scripts"),
        data_dir: dir.join("data"),
        config_path: dir.join("config.toml"),
        file_search_roots: Vec::new(),
        ..Config::default()
    }
}

#[test]
fn missing_file_yields_defaults_at_that_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 20);
    assert_eq!(cfg.clipboard.max_entries, 50);
    assert_eq!(cfg.config_path, path);
}

#[test]
fn toml_file_is_loaded_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
max_results = 500

[clipboard]
max_entries = 200

[prefixes]
windows = "win"
"#,
    )
    .unwrap();

    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 20, "out-of-range value resets to default");
    assert_eq!(cfg.clipboard.max_entries, 200);
    assert_eq!(cfg.prefixes.get("windows").map(String::as_str), Some("win"));
}

#[test]
fn json_config_tolerates_comments() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        "{\n  // legacy launcher config\n  \"gemini_api_key\": \"abc\",\n  \"max_results\": 10,\n}\n",
    )
    .unwrap();

    let cfg = config::load(Some(&path)).unwrap();
    assert_eq!(cfg.max_results, 10);
    assert_eq!(cfg.api_keys.gemini.as_deref(), Some("abc"));
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "max_results = [").unwrap();
    match config::load(Some(&path)) {
        Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        _ => panic!("expected parse error"),
    }
}

#[test]
fn saved_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = isolated(dir.path());
    cfg.max_results = 30;
    cfg.prefixes.insert("emoji".to_string(), "em".to_string());
    config::save(&cfg).unwrap();

    let loaded = config::load(Some(&cfg.config_path)).unwrap();
    assert_eq!(loaded.max_results, 30);
    assert_eq!(loaded.script_dir, cfg.script_dir);
    assert_eq!(loaded.prefixes, cfg.prefixes);
    assert_eq!(loaded.ranking, cfg.ranking);
}

#[test]
fn prefix_override_replaces_builtin_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = isolated(dir.path());
    cfg.prefixes.insert("windows".to_string(), "win".to_string());

    let registry = build_registry(&cfg, &ProviderDeps::from_config(&cfg)).unwrap();
    let router = PrefixRouter::new(&registry);
    assert_eq!(router.route("win firefox").providers, vec![ProviderId::Windows]);
    assert!(router.route("w firefox").is_default());
}

#[test]
fn empty_override_moves_provider_into_default_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = isolated(dir.path());
    cfg.prefixes.insert("emoji".to_string(), String::new());

    let registry = build_registry(&cfg, &ProviderDeps::from_config(&cfg)).unwrap();
    let route = PrefixRouter::new(&registry).route("smile");
    assert!(route.providers.contains(&ProviderId::Emoji));
    assert!(!route.providers.contains(&ProviderId::Windows));
}

#[test]
fn colliding_override_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = isolated(dir.path());
    cfg.prefixes.insert("windows".to_string(), "cb".to_string());

    match build_registry(&cfg, &ProviderDeps::from_config(&cfg)) {
        Err(ConfigError::PrefixTable(message)) => assert!(message.contains("cb")),
        _ => panic!("expected prefix table error"),
    }
}

#[test]
fn configured_web_alias_gets_its_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = isolated(dir.path());
    cfg.web_search.push(config::WebSearchAlias {
        prefix: "ddg".to_string(),
        key: "duckduckgo".to_string(),
        label: "DuckDuckGo".to_string(),
        url: "https://duckduckgo.com/?q={query}".to_string(),
    });

    let registry = build_registry(&cfg, &ProviderDeps::from_config(&cfg)).unwrap();
    let route = PrefixRouter::new(&registry).route("ddg rust");
    assert_eq!(
        route.providers,
        vec![ProviderId::WebSearch("duckduckgo".to_string())]
    );
}

#[test]
fn builtin_web_alias_routes_with_residual() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = isolated(dir.path());

    let registry = build_registry(&cfg, &ProviderDeps::from_config(&cfg)).unwrap();
    let route = PrefixRouter::new(&registry).route("gh wlaunch");
    assert_eq!(route.providers, vec![ProviderId::WebSearch("github".to_string())]);
    assert_eq!(route.residual, "wlaunch");
    assert!(PrefixRouter::new(&registry).route("cbb").is_default());
}

#[test]
fn wifi_prefix_routes_to_network_manager() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = isolated(dir.path());

    let registry = build_registry(&cfg, &ProviderDeps::from_config(&cfg)).unwrap();
    let route = PrefixRouter::new(&registry).route("wifi home password hunter2");
    assert_eq!(route.providers, vec![ProviderId::Network]);
    assert_eq!(route.residual, "home password hunter2");
}
