use std::collections::HashMap;
use std::time::Duration;

use cdn_proxy_common::config::ScanSettings;
use cdn_proxy_common::scan::{ScanResult, ServiceState};
use cdn_proxy_core::scanner::{BypassScanner, ScanRequest};
use tokio_util::sync::CancellationToken;

use crate::support::{Behavior, MockServer, closed_port, plain_http};

async fn run(request: ScanRequest) -> HashMap<String, ScanResult> {
    let mut rx = BypassScanner::new(plain_http())
        .scan(request, None, CancellationToken::new())
        .await
        .unwrap();

    let mut results: HashMap<String, ScanResult> = HashMap::new();
    while let Some(result) = rx.recv().await {
        assert!(results.insert(result.origin.clone(), result).is_none());
    }
    results
}

#[tokio::test]
async fn blocked_origin_reachable_through_proxy_is_a_bypass() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let origin = MockServer::start(Behavior::Status(503)).await;

    let results = run(ScanRequest {
        origins: vec![origin.origin()],
        host: None,
        proxy_domain: Some(proxy.origin()),
    })
    .await;

    let result = &results[&origin.origin()];
    assert_eq!(result.origin_state, ServiceState::Closed);
    assert_eq!(result.proxy_state, ServiceState::Open);
    assert!(result.is_bypass());
    assert!(result.to_string().ends_with("-- Proxy Bypass Found"));
}

#[tokio::test]
async fn open_origin_is_not_a_bypass() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let origin = MockServer::start(Behavior::Status(404)).await;

    let results = run(ScanRequest {
        origins: vec![origin.origin()],
        host: None,
        proxy_domain: Some(proxy.origin()),
    })
    .await;

    let result = &results[&origin.origin()];
    assert_eq!(result.origin_state, ServiceState::Open);
    assert!(!result.is_bypass());
}

#[tokio::test]
async fn probes_carry_the_routing_headers() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let origin = MockServer::start(Behavior::Status(200)).await;

    let results = run(ScanRequest {
        origins: vec![origin.origin()],
        host: Some("test-host".to_string()),
        proxy_domain: Some(proxy.origin()),
    })
    .await;
    assert_eq!(results[&origin.origin()].host, "test-host");

    let proxied = proxy.requests();
    assert_eq!(proxied.len(), 1);
    assert!(proxied[0].contains(&format!("cdn-proxy-origin: {}", origin.origin())));
    assert!(proxied[0].contains("cdn-proxy-host: test-host"));

    let direct = origin.requests();
    assert_eq!(direct.len(), 1);
    assert!(direct[0].contains("host: test-host"));
    assert!(!direct[0].contains("cdn-proxy-origin"));
}

#[tokio::test]
async fn transport_failures_are_classified() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let refused: String = closed_port().await;
    let reset = MockServer::start(Behavior::Reset).await;
    let looping = MockServer::start(Behavior::RedirectLoop).await;
    let gateway = MockServer::start(Behavior::Status(504)).await;
    let failing = MockServer::start(Behavior::Status(500)).await;

    let results = run(ScanRequest {
        origins: vec![
            refused.clone(),
            reset.origin(),
            looping.origin(),
            gateway.origin(),
            failing.origin(),
        ],
        host: None,
        proxy_domain: Some(proxy.origin()),
    })
    .await;

    assert_eq!(results[&refused].origin_state, ServiceState::Filtered);
    assert_eq!(results[&reset.origin()].origin_state, ServiceState::Filtered);
    assert_eq!(results[&looping.origin()].origin_state, ServiceState::Open);
    assert_eq!(results[&gateway.origin()].origin_state, ServiceState::Filtered);
    assert_eq!(results[&failing.origin()].origin_state, ServiceState::OpenServerFail);
    assert!(results.values().all(|r| !r.is_bypass()));
}

#[tokio::test]
async fn every_origin_reports_exactly_once() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let mut servers: Vec<MockServer> = Vec::new();
    for i in 0..12u16 {
        let status: u16 = if i % 3 == 0 { 502 } else { 200 };
        servers.push(MockServer::start(Behavior::Status(status)).await);
    }

    let results = run(ScanRequest {
        origins: servers.iter().map(MockServer::origin).collect(),
        host: None,
        proxy_domain: Some(proxy.origin()),
    })
    .await;

    assert_eq!(results.len(), 12);
    assert_eq!(results.values().filter(|r| r.is_bypass()).count(), 4);
    assert_eq!(proxy.requests().len(), 12);
}

#[tokio::test]
async fn dropping_the_receiver_stops_the_scan() {
    let proxy = MockServer::start(Behavior::Status(200)).await;
    let origin = MockServer::start(Behavior::Status(200)).await;
    let settings = ScanSettings {
        workers: 1,
        ..plain_http()
    };

    let mut rx = BypassScanner::new(settings)
        .scan(
            ScanRequest {
                origins: vec![origin.origin(); 50],
                host: None,
                proxy_domain: Some(proxy.origin()),
            },
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(rx.recv().await.is_some());
    drop(rx);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(proxy.requests().len() <= 4, "{} probes ran", proxy.requests().len());
}
