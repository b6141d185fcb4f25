use alloy::primitives::U256;
use bgt_booster::{
    api::{self, Context},
    chain::{self, mocks::Chain, Gateway},
    orchestrator::{Orchestrator, Trigger},
    retry,
    signer::mocks::{address, signer, OPERATOR_KEY, OTHER_KEY},
    store::{Memory, Store},
    types::MIN_BOOST_THRESHOLD,
};
use prometheus_client::registry::Registry;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::{net::SocketAddr, sync::Arc, time::Duration};

const KEY: &str = "secret";

const PUBKEY: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

struct Harness {
    addr: SocketAddr,
    chain: Chain,
    store: Memory,
    http: reqwest::Client,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with_cors(&[]).await
    }

    async fn start_with_cors(origins: &[&str]) -> Self {
        let chain = Chain::new(5);
        let store = Memory::new();
        let mut registry = Registry::default();
        let gateway = Gateway::new(
            chain.clone(),
            chain::Config {
                contract: chain.contract(),
                gas_limit: 150_000,
                policy: retry::Policy {
                    initial_ms: 1,
                    max_interval_ms: 10,
                    multiplier: 2.0,
                    randomization: 0.0,
                    max_elapsed_secs: Some(5),
                },
                poll_interval: Duration::from_millis(10),
                confirmation_timeout: Duration::from_secs(2),
            },
        );
        let orchestrator = Orchestrator::new(
            gateway,
            store.clone(),
            signer(&[OPERATOR_KEY]),
            &mut registry,
        );
        let trigger: Arc<dyn Trigger> = Arc::new(orchestrator);
        let context = Context::new(store.clone(), trigger, Arc::new(registry), KEY);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let origins: Vec<String> = origins.iter().map(|origin| origin.to_string()).collect();
        let mut router = api::router(context);
        if let Some(cors) = api::cors(&origins).unwrap() {
            router = router.layer(cors);
        }
        tokio::spawn(api::serve(listener, router, std::future::pending::<()>()));
        Self {
            addr,
            chain,
            store,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let response = request.header("X-API-Key", KEY).send().await.unwrap();
        let status = response.status();
        (status, response.json().await.unwrap())
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.http.get(self.url(path))).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.http.post(self.url(path)).json(&body)).await
    }

    async fn put(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.http.put(self.url(path)).json(&body)).await
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        self.send(self.http.delete(self.url(path))).await
    }
}

fn validator() -> Value {
    json!({
        "pubkey": PUBKEY,
        "operatorAddress": address(OPERATOR_KEY).to_string(),
        "boostThreshold": MIN_BOOST_THRESHOLD.to_string(),
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let harness = Harness::start().await;
    let response = reqwest::get(harness.url("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"code": 200, "data": {"status": "ok"}}));
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let harness = Harness::start().await;

    let response = reqwest::get(harness.url("/validators")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"code": 401, "message": "invalid api key"}));

    let response = harness
        .http
        .post(harness.url("/ticks"))
        .header("X-API-Key", "wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(harness.chain.calls().is_empty());
}

#[tokio::test]
async fn test_validator_lifecycle() {
    let harness = Harness::start().await;

    let (status, body) = harness.post("/validators", validator()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "validator added");

    let (status, body) = harness.post("/validators", validator()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = harness.get("/validators").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([validator()]));

    let path = format!("/validators/{PUBKEY}");
    let (status, _) = harness
        .put(&path, json!({"boostThreshold": "5000000000000000000"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let stored = harness.store.validator(PUBKEY).await.unwrap().unwrap();
    assert_eq!(stored.boost_threshold, "5000000000000000000");
    assert_eq!(stored.operator_address, address(OPERATOR_KEY).to_string());

    let (status, _) = harness.delete(&path).await;
    assert_eq!(status, StatusCode::OK);
    assert!(harness.store.validators().await.unwrap().is_empty());

    let (status, _) = harness.delete(&path).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .put(&path, json!({"boostThreshold": "5000000000000000000"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_bodies_rejected() {
    let harness = Harness::start().await;

    // Not JSON
    let (status, body) = harness
        .send(
            harness
                .http
                .post(harness.url("/validators"))
                .header("content-type", "application/json")
                .body("{"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], 422);

    // Missing field
    let (status, _) = harness
        .post("/validators", json!({"pubkey": PUBKEY}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Threshold below one token
    let mut low = validator();
    low["boostThreshold"] = json!("999999999999999999");
    let (status, body) = harness.post("/validators", low).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "boost threshold 999999999999999999 is below the minimum of 10^18"
    );

    // Threshold not a number
    let mut nan = validator();
    nan["boostThreshold"] = json!("1e18");
    let (status, _) = harness.post("/validators", nan).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Bad operator address
    let mut bad = validator();
    bad["operatorAddress"] = json!("0x1234");
    let (status, _) = harness.post("/validators", bad).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.store.validators().await.unwrap().is_empty());

    // Updates are held to the same floor
    let (status, _) = harness.post("/validators", validator()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = harness
        .put(
            &format!("/validators/{PUBKEY}"),
            json!({"boostThreshold": "1"}),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let stored = harness.store.validator(PUBKEY).await.unwrap().unwrap();
    assert_eq!(stored.boost_threshold, MIN_BOOST_THRESHOLD.to_string());
}

#[tokio::test]
async fn test_tick_on_demand() {
    let harness = Harness::start().await;
    let (status, _) = harness.post("/validators", validator()).await;
    assert_eq!(status, StatusCode::OK);
    let amount = MIN_BOOST_THRESHOLD * U256::from(3u8);
    harness.chain.set_unboosted(address(OPERATOR_KEY), amount);

    let (status, body) = harness.post("/ticks", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({"validators": 1, "queued": 1, "activated": 0})
    );

    let (status, body) = harness.get("/boosts/pending").await;
    assert_eq!(status, StatusCode::OK);
    let pending = body["data"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["validatorPubkey"], PUBKEY);
    assert_eq!(pending[0]["amount"], amount.to_string());
    assert_eq!(pending[0]["activated"], false);

    let response = reqwest::get(harness.url("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4"
    );
    let metrics = response.text().await.unwrap();
    assert!(metrics.contains("queued_total 1"));
    assert!(metrics.contains(r#"ticks_total{status="success"} 1"#));
    assert!(metrics.contains("validators 1"));
}

#[tokio::test]
async fn test_operator_locked_while_queue_pending() {
    let harness = Harness::start().await;
    let (status, _) = harness.post("/validators", validator()).await;
    assert_eq!(status, StatusCode::OK);
    harness
        .chain
        .set_unboosted(address(OPERATOR_KEY), MIN_BOOST_THRESHOLD * U256::from(2u8));
    let (status, body) = harness.post("/ticks", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["queued"], 1);

    let path = format!("/validators/{PUBKEY}");
    let other = address(OTHER_KEY).to_string();
    let (status, body) = harness
        .put(&path, json!({"operatorAddress": other}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        format!("validator {PUBKEY} has a pending queue boost, operator address cannot change")
    );
    let stored = harness.store.validator(PUBKEY).await.unwrap().unwrap();
    assert_eq!(stored.operator_address, address(OPERATOR_KEY).to_string());

    // Same operator in another case and threshold changes are still allowed
    let lower = address(OPERATOR_KEY).to_string().to_lowercase();
    let (status, _) = harness
        .put(
            &path,
            json!({"operatorAddress": lower, "boostThreshold": "3000000000000000000"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Once the queue is activated the operator may change
    harness.chain.advance(10);
    let (status, body) = harness.post("/ticks", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["activated"], 1);
    let (status, _) = harness
        .put(&path, json!({"operatorAddress": other}))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cors_for_allowed_origins() {
    const DASHBOARD: &str = "https://dashboard.example";
    let harness = Harness::start_with_cors(&[DASHBOARD]).await;

    // Preflight is answered without the api key
    let response = harness
        .http
        .request(reqwest::Method::OPTIONS, harness.url("/validators"))
        .header("origin", DASHBOARD)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "x-api-key,content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        DASHBOARD
    );
    let allowed = response.headers()["access-control-allow-headers"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(allowed.contains("x-api-key"));

    let response = harness
        .http
        .get(harness.url("/validators"))
        .header("origin", DASHBOARD)
        .header("X-API-Key", KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        DASHBOARD
    );

    let response = harness
        .http
        .get(harness.url("/"))
        .header("origin", "https://elsewhere.example")
        .send()
        .await
        .unwrap();
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}

#[tokio::test]
async fn test_no_cors_by_default() {
    let harness = Harness::start().await;
    let response = harness
        .http
        .get(harness.url("/"))
        .header("origin", "https://dashboard.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("access-control-allow-origin")
        .is_none());
}
