mod utils;
#[allow(unused)]
use utils::*;

use geoload::core::ConfigError;
use geoload::prelude::*;
use geoload::SampleRecorder;
use geoload_runtime::run_scenarios;
use mock_service::MockConfig;
use std::time::{Duration, Instant};

const REVERSE: &str = r#"{ "method": "GET", "path": "/api/reverse", "fields": { "lat": -6.179842, "lon": 106.749864 } }"#;

#[test]
fn negative_duration_never_starts() {
    let json = r#"{
        "base_url": "http://127.0.0.1:1",
        "scenarios": [ {
            "name": "bad",
            "stages": [ { "duration": "10s", "target": 5 }, { "duration": -1, "target": 5 } ],
            "request": { "method": "GET", "path": "/api/reverse" }
        } ]
    }"#;
    assert!(matches!(
        RunConfig::from_json(json),
        Err(ConfigError::NegativeDuration { stage: 1, .. })
    ));
}

#[test]
fn stock_scenario_files_load() {
    let stock = [
        ("autocomplete", Method::Post, Encoding::Json),
        ("reverse", Method::Get, Encoding::Query),
        ("search", Method::Post, Encoding::Json),
    ];
    for (name, method, encoding) in stock {
        let path = format!("{}/../scenarios/{name}.json", env!("CARGO_MANIFEST_DIR"));
        let config = RunConfig::from_file(&path).unwrap();
        let scenario = config.scenario(name).unwrap();
        assert_eq!(scenario.profile().total_duration(), Duration::from_secs(90));
        assert_eq!(scenario.profile().peak_target(), 2000);
        assert_eq!(scenario.request().method(), method, "{name}");
        assert_eq!(scenario.request().wire_encoding(), encoding, "{name}");
    }
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn cancellation_stops_spawning_and_drains() {
    init();
    let base = mock(MockConfig::default().delay(Duration::from_millis(20))).await;
    let config = single(
        &base,
        r#"[ { "duration": "2s", "target": 50 }, { "duration": "1h", "target": 50 } ]"#,
        REVERSE,
        "",
    );
    let profile = config.scenario("e2e").unwrap().profile().clone();
    let recorder = SampleRecorder::new("e2e");
    let (canceller, token) = cancellation();

    let launched = Instant::now();
    let run = tokio::spawn(
        Scenario::new(config.scenario("e2e").unwrap().clone())
            .recorder(recorder.clone())
            .cancel_on(token),
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    let cancelled_at = Instant::now();
    canceller.cancel();

    let stats = run.await.unwrap().unwrap();
    assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    assert!(stats.count > 0);
    // Mid-ramp: well short of the 50-user target.
    assert!(stats.peak_users > 0 && stats.peak_users < 50, "{stats}");

    // No user is spawned once cancelled: the population never outgrows the
    // ramp level at the moment of cancellation, plus one reconciliation of slack.
    let ceiling = profile.target_at(cancelled_at - launched + Duration::from_millis(50)) as usize;
    assert!(stats.peak_users <= ceiling, "peak {} > {ceiling}", stats.peak_users);
    assert_eq!(stats.users, stats.peak_users);
    assert!(recorder
        .snapshot()
        .iter()
        .all(|sample| sample.user < ceiling as u64));

    // Nobody is left to record anything.
    let recorded = recorder.snapshot().len();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.snapshot().len(), recorded);
    assert_eq!(recorded as u64, stats.count);
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn runtime_runs_every_scenario() {
    init();
    let base = mock(MockConfig::default()).await;
    let json = format!(
        r#"{{
            "base_url": "{base}",
            "defaults": {{ "think_time": "20ms", "poll_interval": "10ms" }},
            "scenarios": [
                {{ "name": "autocomplete", "stages": [ {{ "duration": "300ms", "target": 3 }} ],
                   "request": {{ "method": "POST", "path": "/api/autocomplete", "fields": {{ "query": "Taman Min" }} }} }},
                {{ "name": "reverse", "stages": [ {{ "duration": "300ms", "target": 3 }} ],
                   "request": {REVERSE} }},
                {{ "name": "search", "stages": [ {{ "duration": "300ms", "target": 3 }} ],
                   "request": {{ "method": "POST", "path": "/api/search",
                                "fields": {{ "query": "Kebun Binatang Ragunan", "top_k": 10 }} }} }}
            ]
        }}"#
    );
    let config = RunConfig::from_json(&json).unwrap();
    let (_canceller, token) = cancellation();

    let stats = run_scenarios(config.into_scenarios(), token).await.unwrap();
    let names: Vec<_> = stats.iter().map(|s| s.scenario.as_str()).collect();
    assert_eq!(names, ["autocomplete", "reverse", "search"]);
    assert!(stats.iter().all(|s| s.count > 0 && s.error_rate == 0.), "{stats:?}");
}
