//! End-to-end tests for the staged change pipeline against a mock appliance.

use opnsense_core::client::RetryPolicy;
use opnsense_core::{ApplianceClientBuilder, Credentials};
use opnsense_firewall::{
    Action, ChangeRevision, Endpoint, FilterClient, OutcomeStatus, PipelineState,
    RuleChangePipeline, RuleSpec,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RULE_UUID: &str = "5e8f1c2a-3b4d-4e6f-a7b8-c9d0e1f2a3b4";
const REVISION: &str = "1718000000.1234";

fn pipeline(server: &MockServer) -> RuleChangePipeline {
    let transport = ApplianceClientBuilder::new(server.uri(), Credentials::new("key", "secret"))
        .unwrap()
        .with_retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap();
    RuleChangePipeline::new(FilterClient::new(transport))
}

async fn mount_post(server: &MockServer, route: &str, body: serde_json::Value, times: u64) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_block_rule_staged_then_applied() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/firewall/filter/addRule"))
        .and(body_partial_json(json!({"rule": {
            "description": "block-test",
            "action": "block",
            "protocol": "icmp",
            "source_net": "10.0.2.58",
            "destination_net": "any",
            "enabled": "1"
        }})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"result": "saved", "uuid": RULE_UUID})),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_post(&server, "/api/firewall/filter/savepoint", json!({"revision": REVISION}), 1).await;
    mount_post(
        &server,
        "/api/firewall/filter/searchRule",
        json!({"rows": [{"uuid": RULE_UUID, "description": "block-test", "action": "block"}]}),
        2,
    )
    .await;
    mount_post(
        &server,
        &format!("/api/firewall/filter/apply/{REVISION}"),
        json!({"status": "OK\n\n"}),
        1,
    )
    .await;

    let pipeline = pipeline(&server);
    let spec = RuleSpec::new("block-test")
        .with_action(Action::Block)
        .with_protocol("icmp")
        .with_source(Endpoint::net("10.0.2.58"))
        .with_destination(Endpoint::net("any"));

    let change = pipeline.create_rule(&spec, false).await.unwrap();
    let outcome = serde_json::to_value(&change.outcome).unwrap();
    assert_eq!(outcome["status"], "success");
    assert_eq!(outcome["applied"], false);
    assert_eq!(outcome["rule_uuid"], RULE_UUID);
    assert_eq!(outcome["revision"], REVISION);

    // Reachable through searchRule, but not live yet.
    let uuid = change.outcome.rule_uuid.unwrap();
    let status = pipeline.rule_status(uuid).await.unwrap();
    assert!(status.exists);
    assert!(!status.applied);

    let applied = change.staged.unwrap().apply().await;
    assert_eq!(applied.status, OutcomeStatus::Success);
    assert_eq!(applied.state, PipelineState::Applied);
    assert!(applied.applied);

    let status = pipeline.rule_status(uuid).await.unwrap();
    assert!(status.applied);
}

#[tokio::test]
async fn test_resumed_revision_can_be_applied() {
    let server = MockServer::start().await;
    mount_post(
        &server,
        &format!("/api/firewall/filter/apply/{REVISION}"),
        json!({"status": "ok"}),
        1,
    )
    .await;

    let pipeline = pipeline(&server);
    let outcome = pipeline
        .resume(ChangeRevision::from_token(REVISION))
        .apply()
        .await;
    assert!(outcome.is_success());
    assert_eq!(outcome.revision.as_deref(), Some(REVISION));
}

#[tokio::test]
async fn test_applied_revision_cannot_be_replayed() {
    let server = MockServer::start().await;
    mount_post(&server, "/api/firewall/filter/savepoint", json!({"revision": REVISION}), 1).await;
    mount_post(
        &server,
        &format!("/api/firewall/filter/apply/{REVISION}"),
        json!({"status": "ok"}),
        1,
    )
    .await;
    mount_post(
        &server,
        &format!("/api/firewall/filter/cancelRollback/{REVISION}"),
        json!({"status": "ok"}),
        0,
    )
    .await;

    let pipeline = pipeline(&server);
    let staged = pipeline.stage().await.unwrap();
    let token = staged.revision().unwrap().to_string();

    let first = staged.apply().await;
    assert_eq!(first.status, OutcomeStatus::Success);

    let replayed = pipeline.resume(ChangeRevision::from_token(token.clone())).apply().await;
    assert_eq!(replayed.status, OutcomeStatus::Error);
    assert!(!replayed.applied);
    assert_eq!(replayed.revision.as_deref(), Some(token.as_str()));
    assert_eq!(replayed.error_code, Some("INVALID_REQUEST"));
    assert!(replayed.error.unwrap().contains("already applied or cancelled"));

    // Clones share the record of used revisions.
    let cancelled = pipeline.clone().resume(ChangeRevision::from_token(token)).cancel().await;
    assert_eq!(cancelled.status, OutcomeStatus::Error);
}
