mod utils;
#[allow(unused)]
use utils::*;

use geoload::prelude::*;
use mock_service::MockConfig;
use std::time::Duration;

const AUTOCOMPLETE: &str =
    r#"{ "method": "POST", "path": "/api/autocomplete", "fields": { "query": "Taman Min" } }"#;

fn scenario(config: &RunConfig) -> ScenarioConfig {
    config.scenario("e2e").unwrap().clone()
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn injected_failures_show_in_error_rate() {
    init();
    let base = mock(MockConfig::default().error_every(10)).await;
    let config = single(
        &base,
        r#"[ { "duration": "1s", "target": 10 } ]"#,
        AUTOCOMPLETE,
        r#", "think_time": "5ms""#,
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();

    assert!(stats.count >= 100, "{stats}");
    assert!(
        (0.08..=0.11).contains(&stats.error_rate),
        "error rate {}",
        stats.error_rate
    );
    assert_eq!(stats.failures.get("status 500"), Some(&stats.failed));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn unexpected_status_fails_every_call() {
    init();
    let base = mock(MockConfig::default()).await;
    let config = single(
        &base,
        r#"[ { "duration": "300ms", "target": 2 } ]"#,
        AUTOCOMPLETE,
        r#", "expect": { "status": 201 }"#,
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();

    assert!(stats.count > 0);
    assert_eq!(stats.error_rate, 1.);
    assert_eq!(stats.failures.get("status 200"), Some(&stats.count));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn missing_fields_are_protocol_failures() {
    init();
    let base = mock(MockConfig::default()).await;
    let config = single(
        &base,
        r#"[ { "duration": "300ms", "target": 2 } ]"#,
        r#"{ "method": "GET", "path": "/api/reverse", "fields": { "top_k": 3 } }"#,
        "",
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();
    assert!(stats.count > 0);
    assert_eq!(stats.failures.get("status 400"), Some(&stats.count));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn over_capacity_is_counted_not_fatal() {
    init();
    let base = mock(MockConfig::default().max_tps(20)).await;
    let config = single(
        &base,
        r#"[ { "duration": "1s", "target": 10 } ]"#,
        AUTOCOMPLETE,
        r#", "think_time": "5ms""#,
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();
    assert!(stats.failed > 0, "{stats}");
    assert!(stats.failures.contains_key("status 503"));
    assert!(stats.count > stats.failed);
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn unreachable_target_records_transport_failures() {
    init();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = single(
        &base,
        r#"[ { "duration": "300ms", "target": 3 } ]"#,
        AUTOCOMPLETE,
        "",
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();
    assert!(stats.count >= 3);
    assert_eq!(stats.error_rate, 1.);
    assert_eq!(stats.failures.get("connect"), Some(&stats.count));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn slow_target_times_out() {
    init();
    let base = mock(MockConfig::default().delay(Duration::from_secs(2))).await;
    let config = single(
        &base,
        r#"[ { "duration": "400ms", "target": 2 } ]"#,
        AUTOCOMPLETE,
        r#", "timeout": "100ms""#,
    );

    let stats = Scenario::new(scenario(&config)).await.unwrap();
    assert!(stats.count >= 2);
    assert_eq!(stats.failures.get("timeout"), Some(&stats.count));
    assert!(stats.latency.max < Duration::from_millis(500));
}
