//! The assembled demo application against mocked facilitators.

use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use clap::Parser;
use paygate::networks::Network;
use paygate::proto::{PaymentPayload, Scheme, X402Version1};
use paygate::timestamp::UnixTimestamp;
use paygate_http::ReceiptEncoder;
use paygate_http::headers::encode_payment;
use paygate_server::config::Cli;
use paygate_server::{ServerConfig, app, build_gate};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EVM_PAYER: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";
const EVM_PAY_TO: &str = "0x1111111111111111111111111111111111111111";
const SOL_PAY_TO: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

async fn facilitator(network: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/verify"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "isValid": true,
            "payer": EVM_PAYER
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/settle"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "transaction": "0xfeed",
            "network": network,
            "payer": EVM_PAYER
        })))
        .mount(&server)
        .await;
    server
}

fn config(evm: &MockServer, solana: &MockServer, extra: &[&str]) -> ServerConfig {
    let evm_uri = evm.uri();
    let solana_uri = solana.uri();
    let mut args = vec![
        "paygate-server",
        "--evm-pay-to",
        EVM_PAY_TO,
        "--evm-facilitator-url",
        &evm_uri,
        "--solana-pay-to",
        SOL_PAY_TO,
        "--solana-facilitator-url",
        &solana_uri,
        "--facilitator-api-key",
        "secret",
    ];
    args.extend_from_slice(extra);
    ServerConfig::from_cli(Cli::try_parse_from(args).unwrap()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn evm_payment(nonce: &str) -> String {
    let now = UnixTimestamp::now();
    encode_payment(&PaymentPayload {
        x402_version: X402Version1,
        scheme: Scheme::Exact,
        network: Network::BaseSepolia,
        payer: EVM_PAYER.into(),
        nonce: nonce.into(),
        valid_after: now.saturating_sub(Duration::from_secs(30)),
        valid_before: now.saturating_add(Duration::from_secs(300)),
        signed_blob: "0xsig".into(),
    })
    .unwrap()
}

#[tokio::test]
async fn catalog_is_free_and_lists_every_paid_route() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &[]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let catalog = json_body(response).await;
    let paths: Vec<&str> = catalog
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["path"].as_str().unwrap())
        .collect();
    assert_eq!(
        paths,
        ["/agent/tasks", "/compute", "/images/generations", "/weather"]
    );
    let weather = &catalog[3];
    assert_eq!(weather["maxAmountRequired"], "1000");
    assert_eq!(weather["network"], "base-sepolia");
    assert_eq!(weather["facilitator"], "evm");
    assert_eq!(catalog[1]["facilitator"], "solana");
    assert_eq!(catalog[1]["maxAmountRequired"], "50000");
}

#[tokio::test]
async fn challenge_uses_the_host_header_without_a_base_url() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &[]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(
            Request::get("/weather?city=Oslo")
                .header("host", "shop.local:8080")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = json_body(response).await;
    assert_eq!(
        body["accepts"][0]["resource"],
        "http://shop.local:8080/weather?city=Oslo"
    );
    assert_eq!(body["accepts"][0]["payTo"], EVM_PAY_TO);
}

#[tokio::test]
async fn head_is_priced_like_get() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &["--base-url", "https://api.example.com"]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(Request::head("/weather").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn paid_weather_echoes_the_receipt() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &["--base-url", "https://api.example.com"]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(
            Request::get("/weather?city=Oslo")
                .header("X-PAYMENT", evm_payment("0xaa"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let receipt =
        ReceiptEncoder::decode(response.headers()["x-payment-response"].as_bytes()).unwrap();
    assert_eq!(receipt.transaction, "0xfeed");
    let body = json_body(response).await;
    assert_eq!(body["city"], "Oslo");
    assert_eq!(body["receipt"]["transaction"], "0xfeed");
    assert!(solana.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn handler_errors_pass_through_with_the_receipt() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &[]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(
            Request::post("/images/generations")
                .header("X-PAYMENT", evm_payment("0xbb"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"prompt":"   "}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.headers().contains_key("x-payment-response"));
    assert_eq!(json_body(response).await["error"], "prompt must not be empty");
}

#[tokio::test]
async fn wrong_network_payment_is_malformed() {
    let evm = facilitator("base-sepolia").await;
    let solana = facilitator("solana-devnet").await;
    let config = config(&evm, &solana, &[]);
    let app = app(build_gate(&config).unwrap(), config.base_url.clone());

    let response = app
        .oneshot(
            Request::post("/compute")
                .header("X-PAYMENT", evm_payment("0xcc"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"values":[1,2,3]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json_body(response).await["reason"], "malformed_payment");
    assert!(solana.received_requests().await.unwrap().is_empty());
    assert!(evm.received_requests().await.unwrap().is_empty());
}
