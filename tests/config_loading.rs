// tests/config_loading.rs
use api_scraper::config::{load_default, load_from, ENV_CONFIG_PATH, ENV_TSP_API_KEY};
use std::{env, fs};

const MINIMAL: &str = r#"{
    "scrapers": [{"id": "a", "url": "https://api.test/a", "requestIntervalMs": 5000}],
    "outputs": {"tsp": {"url": "https://tsp.test/", "apiKey": "ENV"}}
}"#;

#[serial_test::serial]
#[test]
fn env_secret_and_config_path() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("scrapers.json");
    fs::write(&p, MINIMAL).unwrap();

    env::remove_var(ENV_TSP_API_KEY);
    let err = load_from(&p).unwrap_err();
    assert!(format!("{err:#}").contains("Missing TSP_API_KEY env var"));

    env::set_var(ENV_TSP_API_KEY, "from-env");
    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    let cfg = load_default().unwrap();
    let tsp = cfg.outputs.tsp.unwrap();
    assert_eq!(tsp.api_key, "from-env");
    assert_eq!(tsp.url, "https://tsp.test");
    assert!(tsp.bindings.is_empty());

    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_TSP_API_KEY);
}

#[serial_test::serial]
#[test]
fn missing_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("nope.json");
    let err = load_from(&p).unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));
}

#[test]
fn toml_file_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("scrapers.toml");
    fs::write(
        &p,
        r#"
[[scrapers]]
id = "weather"
url = "https://api.test/w"
requestCronSchedule = "0 */10 * * * *"
filterDuplicateValues = true

[scrapers.headers]
Accept = "application/json"
"#,
    )
    .unwrap();
    let cfg = load_from(&p).unwrap();
    let s = &cfg.sources[0];
    assert!(s.filter_duplicates);
    assert!(s.schedule.cron.is_some());
    assert_eq!(
        s.request.headers.get("Accept").map(String::as_str),
        Some("application/json")
    );
}
