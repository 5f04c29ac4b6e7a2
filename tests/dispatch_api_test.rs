// Integration tests for POST /api/v1/trip/{book,nearby}

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cabtrack::api::{create_dispatch_router, DispatchAppState};
use cabtrack::auth::{AuthGate, TokenVerifier, Verification};
use cabtrack::dispatch::{ProximityClient, BEST_AVAILABLE_PATH, NEARBY_BUSY_PATH};
use mockito::{Matcher, Server};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const CABS: &str = r#"[
    {
        "id": "cab-9",
        "location": {"type": "Point", "coordinates": [77.6, 12.9]},
        "status": "Busy",
        "last_updated": "2026-02-17T12:00:00Z",
        "distance": 812.4
    }
]"#;

fn make_router(base_url: String, auth: AuthGate) -> Router {
    let client = ProximityClient::new(base_url, Duration::from_secs(2)).unwrap();
    create_dispatch_router(DispatchAppState { client, auth })
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Book forwards the rider point to the available endpoint and relays the list
#[tokio::test]
async fn test_book_trip_relays_best_available() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", BEST_AVAILABLE_PATH)
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("latitude".into(), "12.9".into()),
            Matcher::UrlEncoded("longitude".into(), "77.6".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(CABS)
        .create_async()
        .await;

    let app = make_router(server.url(), AuthGate::disabled());
    let response = app
        .oneshot(post_json(
            "/api/v1/trip/book",
            r#"{"latitude":"12.9","longitude":"77.6"}"#,
        ))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body[0]["id"], "cab-9");
    assert_eq!(body[0]["distance"], 812.4);
}

#[tokio::test]
async fn test_nearby_uses_busy_endpoint() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", NEARBY_BUSY_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let app = make_router(server.url(), AuthGate::disabled());
    let response = app
        .oneshot(post_json(
            "/api/v1/trip/nearby",
            r#"{"latitude":"12.9","longitude":"77.6"}"#,
        ))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test]
async fn test_invalid_body_returns_400() {
    let app = make_router("http://127.0.0.1:9".to_string(), AuthGate::disabled());

    for body in ["not json", r#"{"latitude":"12.9"}"#, r#"{"latitude":12.9,"longitude":77.6}"#] {
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/trip/book", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(json_body(response).await["error"], "Invalid request body");
    }
}

/// Non-2xx from the proximity service keeps its status code
#[tokio::test]
async fn test_upstream_error_status_propagated() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", BEST_AVAILABLE_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":"Invalid latitude: north"}"#)
        .create_async()
        .await;

    let app = make_router(server.url(), AuthGate::disabled());
    let response = app
        .oneshot(post_json(
            "/api/v1/trip/book",
            r#"{"latitude":"north","longitude":"77.6"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Failed to fetch available cabs"
    );
}

#[tokio::test]
async fn test_unreachable_upstream_returns_500() {
    let app = make_router("http://127.0.0.1:9".to_string(), AuthGate::disabled());

    let response = app
        .oneshot(post_json(
            "/api/v1/trip/nearby",
            r#"{"latitude":"12.9","longitude":"77.6"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

struct RiderVerifier;

#[async_trait]
impl TokenVerifier for RiderVerifier {
    async fn verify(&self, token: &str) -> Verification {
        match token {
            "rider" => Verification::Allowed,
            "banned" => Verification::Forbidden,
            _ => Verification::Rejected,
        }
    }
}

/// Auth gate answers 401/403 and forwards the caller's token upstream
#[tokio::test]
async fn test_auth_gate_and_token_forwarding() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", BEST_AVAILABLE_PATH)
        .match_query(Matcher::Any)
        .match_header("authorization", "Bearer rider")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let app = make_router(server.url(), AuthGate::new(Arc::new(RiderVerifier)));
    let body = r#"{"latitude":"12.9","longitude":"77.6"}"#;

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/trip/book", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/api/v1/trip/book", body);
    request
        .headers_mut()
        .insert("authorization", "Bearer banned".parse().unwrap());
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let mut request = post_json("/api/v1/trip/book", body);
    request
        .headers_mut()
        .insert("authorization", "Bearer rider".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    mock.assert_async().await;
}
