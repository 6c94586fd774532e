use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use agora_server::{AppState, MarketConfig, router};
use agora_types::{ManualClock, content_hash, to_hex};
use agora_validation::{Ballot, CommitScheme, vote_commitment};

const START: u64 = 5_000;

struct Node {
    app: Router,
    governance: Uuid,
    validators: Vec<Uuid>,
}

impl Node {
    fn new() -> Self {
        let validators: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let config = MarketConfig {
            validators: validators.clone(),
            ..MarketConfig::default()
        };
        let governance = config.governance();
        let state = AppState::with_clock(&config, Arc::new(ManualClock::new(START))).unwrap();
        Self {
            app: router(state),
            governance,
            validators,
        }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    /// Mint, acknowledge the policy and optionally stake.
    async fn onboard(&self, who: Uuid, funds: u64, stake: Option<&str>) {
        let (status, _) = self
            .post(
                "/api/v1/token/mint",
                json!({ "caller": self.governance, "to": who, "amount": funds }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self.post("/api/v1/policy/acknowledge", json!({ "who": who })).await;
        assert_eq!(status, StatusCode::OK);
        if let Some(role) = stake {
            let (status, body) = self
                .post(
                    "/api/v1/stake/deposit",
                    json!({ "holder": who, "role": role, "amount": funds }),
                )
                .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }
    }
}

fn ballot(validator: &Uuid) -> Ballot {
    Ballot {
        approve: true,
        burn_tx: [0u8; 32],
        salt: content_hash(validator.as_bytes()),
    }
}

#[tokio::test]
async fn test_health() {
    let node = Node::new();
    let (status, body) = node.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_job_lifecycle_over_http() {
    let node = Node::new();
    let employer = Uuid::new_v4();
    let agent = Uuid::new_v4();
    node.onboard(employer, 105, None).await;
    node.onboard(agent, 10, Some("Agent")).await;
    for v in &node.validators {
        node.onboard(*v, 100, Some("Validator")).await;
    }

    let spec_hash = content_hash(b"translate the manual");
    let (status, body) = node
        .post(
            "/api/v1/jobs",
            json!({
                "employer": employer,
                "reward": 100,
                "deadline": START + 10_000,
                "spec_hash": to_hex(&spec_hash),
                "uri": "ipfs://spec",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let job_id = body["job_id"].as_u64().unwrap();

    let (status, body) = node
        .post(&format!("/api/v1/jobs/{job_id}/apply"), json!({ "agent": agent }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["state"], "Applied");

    let (status, body) = node
        .post(
            &format!("/api/v1/jobs/{job_id}/submit"),
            json!({ "agent": agent, "result_hash": to_hex(&content_hash(b"manual.ja")) }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, round) = node.get(&format!("/api/v1/jobs/{job_id}/validation")).await;
    assert_eq!(status, StatusCode::OK);
    let nonce = round["nonce"].as_u64().unwrap();
    let selected: Vec<Uuid> = serde_json::from_value(round["validators"].clone()).unwrap();
    assert_eq!(selected.len(), 3);

    for v in &selected {
        let commitment = vote_commitment(&CommitScheme::Plain, job_id, nonce, v, &ballot(v), &spec_hash);
        let (status, body) = node
            .post(
                &format!("/api/v1/jobs/{job_id}/validation/commit"),
                json!({ "validator": v, "commitment": to_hex(&commitment) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    for v in &selected {
        let (status, body) = node
            .post(
                &format!("/api/v1/jobs/{job_id}/validation/reveal"),
                json!({ "validator": v, "approve": true, "salt": to_hex(&ballot(v).salt) }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    let (status, body) = node
        .post(&format!("/api/v1/jobs/{job_id}/validation/finalize"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"], "Approved");
    assert_eq!(body["state"], "Completed");

    let (status, body) = node
        .post(&format!("/api/v1/jobs/{job_id}/finalize"), json!({ "caller": employer }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["payout"], 100);
    assert_eq!(body["fee"], 5);

    let (_, balance) = node.get(&format!("/api/v1/token/{agent}")).await;
    assert_eq!(balance["balance"], 100);

    let (status, entries) = node.get(&format!("/api/v1/jobs/{job_id}/audit")).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap())
        .collect();
    for kind in ["JobCreated", "AgentAssigned", "ValidatorsSelected", "JobFinalized"] {
        assert!(kinds.contains(&kind), "missing {kind}");
    }

    let (status, integrity) = node.get("/api/v1/audit/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(integrity["valid"], true);
    assert!(integrity["entries"].as_u64().unwrap() > kinds.len() as u64);
}

#[tokio::test]
async fn test_error_classes_map_to_status() {
    let node = Node::new();

    let (status, body) = node.get("/api/v1/jobs/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["class"], "notfound");

    let outsider = Uuid::new_v4();
    let (status, body) = node
        .post(
            "/api/v1/token/mint",
            json!({ "caller": outsider, "to": outsider, "amount": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["class"], "authorization");

    let (status, body) = node
        .post(
            "/api/v1/stake/deposit",
            json!({ "holder": outsider, "role": "Agent", "amount": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");

    let employer = Uuid::new_v4();
    node.onboard(employer, 105, None).await;
    let (_, body) = node
        .post(
            "/api/v1/jobs",
            json!({
                "employer": employer,
                "reward": 100,
                "deadline": START + 10_000,
                "spec_hash": to_hex(&content_hash(b"spec")),
            }),
        )
        .await;
    let job_id = body["job_id"].as_u64().unwrap();
    let (status, body) = node
        .post(&format!("/api/v1/jobs/{job_id}/finalize"), json!({ "caller": employer }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["class"], "state");
}

#[tokio::test]
async fn test_malformed_hash_is_bad_request() {
    let node = Node::new();
    let (status, body) = node
        .post(
            "/api/v1/jobs",
            json!({
                "employer": Uuid::new_v4(),
                "reward": 1,
                "deadline": START + 100,
                "spec_hash": "not-hex",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("spec_hash"));
}

#[tokio::test]
async fn test_cancel_refunds_and_lists_by_state() {
    let node = Node::new();
    let employer = Uuid::new_v4();
    node.onboard(employer, 210, None).await;
    let mut ids = Vec::new();
    for _ in 0..2 {
        let (_, body) = node
            .post(
                "/api/v1/jobs",
                json!({
                    "employer": employer,
                    "reward": 100,
                    "deadline": START + 10_000,
                    "spec_hash": to_hex(&content_hash(b"spec")),
                }),
            )
            .await;
        ids.push(body["job_id"].as_u64().unwrap());
    }

    let (status, body) = node
        .post(&format!("/api/v1/jobs/{}/cancel", ids[0]), json!({ "caller": employer }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["refunded"], 105);

    let (_, created) = node.get("/api/v1/jobs?state=Created").await;
    assert_eq!(created.as_array().unwrap().len(), 1);
    assert_eq!(created[0]["id"], ids[1]);
    let (_, all) = node.get("/api/v1/jobs").await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_optional_backends_report_not_configured() {
    let node = Node::new();
    let tag = to_hex(&content_hash(b"tag"));
    let (status, _) = node
        .post(
            "/api/v1/beacon/commit",
            json!({ "participant": Uuid::new_v4(), "tag": tag, "commitment": tag }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = node
        .post(
            "/api/v1/jobs/1/dispute/ruling",
            json!({ "caller": Uuid::new_v4(), "favor_employer": true }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
