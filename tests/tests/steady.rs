mod utils;
#[allow(unused)]
use utils::*;

use geoload::prelude::*;
use geoload::SampleRecorder;
use mock_service::MockConfig;
use std::time::Duration;

const REVERSE: &str = r#"{ "method": "GET", "path": "/api/reverse", "fields": { "lat": -6.179842, "lon": 106.749864 } }"#;

#[tokio::test]
#[ntest::timeout(15_000)]
async fn all_ok_has_no_errors_and_tracks_latency() {
    let metrics = init();
    let base = mock(MockConfig::default().delay(Duration::from_millis(50))).await;
    let config = single(
        &base,
        r#"[ { "duration": "500ms", "target": 8 }, { "duration": "500ms", "target": 8 } ]"#,
        REVERSE,
        "",
    );
    let scenario = config.scenario("e2e").unwrap().clone();

    let stats = Scenario::new(scenario).await.unwrap();

    assert!(stats.count > 8, "{stats}");
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.error_rate, 0.);
    assert_eq!(stats.peak_users, 8);

    let p95 = stats.latency.get(0.95).unwrap();
    assert!(p95 >= Duration::from_millis(50), "{p95:?}");
    assert!(p95 < Duration::from_millis(250), "{p95:?}");
    assert!(stats.latency.min >= Duration::from_millis(50));

    let rendered = metrics.render();
    assert!(rendered.contains("geoload_requests_total"));
    assert!(rendered.contains(r#"scenario="e2e""#));
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn search_with_json_body_on_get() {
    init();
    let base = mock(MockConfig::default()).await;
    let config = single(
        &base,
        r#"[ { "duration": "300ms", "target": 3 } ]"#,
        r#"{ "method": "GET", "path": "/api/search", "encoding": "json",
             "fields": { "query": ["Kebun Binatang Ragunan", "Monas"], "top_k": 10, "lat": -6.303057, "lon": 106.827039 } }"#,
        "",
    );
    let recorder = SampleRecorder::new("e2e");

    let stats = Scenario::new(config.scenario("e2e").unwrap().clone())
        .recorder(recorder.clone())
        .await
        .unwrap();

    assert!(stats.count > 0);
    assert_eq!(stats.error_rate, 0., "{stats}");
    assert_eq!(recorder.snapshot().len() as u64, stats.count);
}

#[tokio::test]
#[ntest::timeout(15_000)]
async fn snapshots_while_running() {
    init();
    let base = mock(MockConfig::default()).await;
    let config = single(
        &base,
        r#"[ { "duration": "600ms", "target": 4 } ]"#,
        REVERSE,
        r#", "report_interval": "100ms""#,
    );
    let recorder = SampleRecorder::new("e2e");
    let run = tokio::spawn(
        Scenario::new(config.scenario("e2e").unwrap().clone()).recorder(recorder.clone()),
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let mid = recorder.snapshot().len();
    assert!(mid > 0);

    let stats = run.await.unwrap().unwrap();
    assert!(stats.count as usize >= mid);
}
