//! Beam client tests
//!
//! Exercises the live-delivery wire contract against a mock receiver.

use httpmock::prelude::*;
use serde_json::json;
use uuid::Uuid;

use tokmeter::config::PricingTable;
use tokmeter::models::api::{ApiMessage, ExchangeResponse, TokenUsage};
use tokmeter::models::session::RoundTrip;
use tokmeter::services::{BeamClient, CostCalculator};
use tokmeter::MonitorError;

fn calculator() -> CostCalculator {
    let table = PricingTable::from_json(r#"{"gpt-x": {"per_tokens": 1000, "cost": 0.002}}"#)
        .unwrap();
    CostCalculator::new(table)
}

fn round_trip() -> RoundTrip {
    RoundTrip::new(
        json!({"model": "gpt-x", "messages": [{"role": "user", "content": "hi"}]}),
        ExchangeResponse {
            model: "gpt-x".to_string(),
            messages: vec![ApiMessage::assistant("hello")],
            usage: TokenUsage::from_parts(10, 5),
        },
    )
}

#[tokio::test]
async fn round_trips_post_to_the_exchange_endpoint() {
    let server = MockServer::start_async().await;
    let id = Uuid::new_v4();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/exchange")
                .header("content-type", "application/json")
                .json_body_partial(format!(
                    r#"{{"conversation_id": "{}"}}"#,
                    id
                ));
            then.status(200);
        })
        .await;

    let rt = round_trip();
    let summary = calculator().summarize(id, &[rt.clone()]).unwrap().unwrap();
    let client = BeamClient::new(&server.base_url(), "curl").unwrap();
    client.send_round_trip(id, &rt, &summary).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn summary_posts_without_raw_exchange_data() {
    let server = MockServer::start_async().await;
    let id = Uuid::new_v4();
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/summary")
                .matches(|req| {
                    let body = req.body.as_deref().unwrap_or(&[]);
                    let value: serde_json::Value = match serde_json::from_slice(body) {
                        Ok(v) => v,
                        Err(_) => return false,
                    };
                    let summary = &value["summary"];
                    summary["monitored_program"] == "curl"
                        && summary["total_cost"].is_number()
                        && summary.get("raw_data").is_none()
                });
            then.status(200);
        })
        .await;

    let summary = calculator()
        .summarize(id, &[round_trip()])
        .unwrap()
        .unwrap();
    let client = BeamClient::new(&server.base_url(), "curl").unwrap();
    client.send_summary(&summary).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_delivery_surfaces_a_beam_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/summary");
            then.status(500);
        })
        .await;

    let id = Uuid::new_v4();
    let summary = calculator()
        .summarize(id, &[round_trip()])
        .unwrap()
        .unwrap();
    let client = BeamClient::new(&server.base_url(), "curl").unwrap();
    let err = client.send_summary(&summary).await.unwrap_err();
    assert!(matches!(err, MonitorError::Beam(_)));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn unreachable_receiver_surfaces_a_beam_error() {
    // port 1 is never listening
    let client = BeamClient::new("http://127.0.0.1:1", "curl").unwrap();
    let id = Uuid::new_v4();
    let summary = calculator()
        .summarize(id, &[round_trip()])
        .unwrap()
        .unwrap();
    let err = client.send_summary(&summary).await.unwrap_err();
    assert!(matches!(err, MonitorError::Beam(_)));
}

#[test]
fn trailing_slash_in_base_url_is_normalized() {
    let client = BeamClient::new("http://localhost:8080/", "curl").unwrap();
    assert_eq!(client.base_url(), "http://localhost:8080");
}
