use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use cdn_proxy_common::config::{Config, RetrySettings};
use cdn_proxy_common::deployment::{ResourceNames, TAG_TARGET};
use cdn_proxy_common::error::{CdnProxyError, codes};
use cdn_proxy_common::progress::{Recorder, Silent};
use cdn_proxy_core::Orchestrator;
use cdn_proxy_core::function::{EdgeFunctionManager, package};
use cdn_proxy_core::identity::ExecutionIdentityManager;
use cdn_proxy_core::testing::FakeProvider;
use cdn_proxy_edge::RewriteSettings;

fn config() -> Config {
    Config {
        retry: RetrySettings::immediate(3),
        ..Config::default()
    }
}

#[tokio::test]
async fn full_lifecycle() {
    let fake = FakeProvider::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&fake, &cfg);

    let record = orchestrator.create(&Silent).await.unwrap();
    assert_eq!(orchestrator.status().await.unwrap(), Some(record.clone()));
    assert_eq!(orchestrator.list().await.unwrap(), vec![record]);

    orchestrator.update(&Silent).await.unwrap();
    orchestrator.delete(&Silent).await.unwrap();

    assert_eq!(orchestrator.status().await.unwrap(), None);
    assert!(!fake.has_function("cdn-proxy"));
    assert!(fake.role("cdn-proxy").is_none());
}

#[tokio::test]
async fn existing_deployment_blocks_create_without_side_effects() {
    let fake = FakeProvider::new();
    let tags: BTreeMap<String, String> = [(TAG_TARGET.to_string(), "example.com".to_string())].into();
    fake.add_distribution("E1LIVE", tags, &[]);
    let cfg = config();

    let err = Orchestrator::new(&fake, &cfg).create(&Silent).await.unwrap_err();

    assert!(matches!(err, CdnProxyError::Conflict(_)));
    assert!(fake.calls().iter().all(|op| !op.starts_with("Create") && !op.starts_with("Put")));
}

#[tokio::test]
async fn identity_and_function_ensure_are_idempotent() {
    let fake = FakeProvider::new();
    let cfg = config();
    let identity = ExecutionIdentityManager::new(&fake, ResourceNames::from(&cfg));
    let function = EdgeFunctionManager::new(&fake, &cfg);

    let first = identity.ensure(&Silent).await.unwrap();
    let second = identity.ensure(&Silent).await.unwrap();
    assert_eq!(first.arn, second.arn);

    let v1 = function.ensure(&first.arn, &Silent).await.unwrap();
    let v2 = function.ensure(&second.arn, &Silent).await.unwrap();
    assert_ne!(v1.arn, v2.arn);
    assert_eq!(fake.count("CreateFunction"), 1);
}

#[tokio::test]
async fn failed_distribution_create_is_finished_by_a_rerun() {
    let fake = FakeProvider::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&fake, &cfg);
    fake.fail("CreateDistributionWithTags", "AccessDenied", 1);

    assert!(orchestrator.create(&Silent).await.is_err());
    assert!(fake.has_function("cdn-proxy"));
    assert!(fake.distribution_ids().is_empty());

    let record = orchestrator.create(&Silent).await.unwrap();
    assert_eq!(fake.distribution_ids(), vec![record.distribution_id]);
    assert_eq!(fake.count("CreateRole"), 1);
}

#[tokio::test]
async fn distribution_fault_prevents_function_deletion() {
    let fake = FakeProvider::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&fake, &cfg);
    orchestrator.create(&Silent).await.unwrap();
    fake.fail_always("WaitDistributionDeployed", "AccessDenied");
    fake.clear_calls();

    assert!(orchestrator.delete(&Silent).await.is_err());

    let calls = fake.calls();
    assert!(calls.contains(&"UpdateDistribution"));
    assert!(!calls.contains(&"DeleteDistribution"));
    assert!(!calls.contains(&"DeleteFunction"));
    assert!(!calls.contains(&"DeleteRole"));
}

#[tokio::test]
async fn delete_is_resumable() {
    let fake = FakeProvider::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&fake, &cfg);
    orchestrator.create(&Silent).await.unwrap();
    fake.fail("DeleteRole", "AccessDenied", 1);

    assert!(orchestrator.delete(&Silent).await.is_err());
    assert!(fake.role("cdn-proxy").is_some());

    let progress = Recorder::new();
    orchestrator.delete(&progress).await.unwrap();
    assert!(fake.role("cdn-proxy").is_none());
    assert!(progress.warnings().contains(&"Distribution -- Nothing to delete".to_string()));
}

#[tokio::test]
async fn replicas_delay_function_deletion() {
    let fake = FakeProvider::new();
    let cfg = config();
    let orchestrator = Orchestrator::new(&fake, &cfg);
    orchestrator.create(&Silent).await.unwrap();
    fake.fail("DeleteFunction", codes::INVALID_PARAMETER_VALUE, 2);

    orchestrator.delete(&Silent).await.unwrap();
    assert!(!fake.has_function("cdn-proxy"));
}

#[tokio::test]
async fn uploaded_package_carries_the_forwarded_for_setting() {
    let fake = FakeProvider::new();
    let cfg = Config {
        x_forwarded_for: Some(Ipv4Addr::new(8, 8, 4, 4)),
        ..config()
    };

    Orchestrator::new(&fake, &cfg).update(&Silent).await.unwrap();

    let expected = package::build(&RewriteSettings {
        x_forwarded_for: Some(Ipv4Addr::new(8, 8, 4, 4)),
    })
    .unwrap();
    assert_eq!(fake.function_package("cdn-proxy"), Some(expected));
    assert_eq!(fake.published_versions("cdn-proxy"), vec![1]);
}

#[tokio::test]
async fn busy_function_still_gets_the_replicator_grant() {
    let fake = FakeProvider::new();
    let cfg = config();
    fake.fail("AddPermission", codes::RESOURCE_CONFLICT, 1);

    let record = Orchestrator::new(&fake, &cfg).create(&Silent).await.unwrap();

    assert_eq!(fake.distribution_ids(), vec![record.distribution_id]);
    assert_eq!(fake.permissions("cdn-proxy").len(), 1);
    assert_eq!(fake.count("AddPermission"), 2);
    assert_eq!(fake.count("CreateDistributionWithTags"), 1);
}
