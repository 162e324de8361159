//! End-to-end dispatch through the HTTP server.

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use serde_json::{json, Value};
use woodland::{error_handler, handler, Flow, HttpError, Router, RouterConfig};

mod common;

#[tokio::test]
async fn test_params_json_and_allow() {
    let mut router = Router::default();
    router
        .get(
            "/users/:id",
            vec![handler(|req, res| {
                Box::pin(async move {
                    let id = req.param("id").cloned().unwrap_or(Value::Null);
                    res.json(&json!({ "id": id }));
                    Ok(Flow::Stop)
                })
            })],
        )
        .unwrap();
    let server = common::start_server(router).await;

    let res = common::client().get(server.url("/users/42")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["allow"], "GET, HEAD, OPTIONS");
    assert_eq!(res.headers()["content-type"], "application/json; charset=utf-8");
    let body: Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    assert_eq!(body, json!({ "id": 42 }));
}

#[tokio::test]
async fn test_missing_route_and_wrong_method() {
    let mut router = Router::default();
    router
        .post(
            "/items",
            vec![handler(|_req, res| {
                Box::pin(async move {
                    res.status(StatusCode::CREATED);
                    res.send("created");
                    Ok(Flow::Stop)
                })
            })],
        )
        .unwrap();
    let server = common::start_server(router).await;
    let client = common::client();

    let res = client.get(server.url("/items")).send().await.unwrap();
    assert_eq!(res.status(), 405);
    assert_eq!(res.headers()["allow"], "OPTIONS, POST");

    let res = client.post(server.url("/items")).send().await.unwrap();
    assert_eq!(res.status(), 201);
    assert_eq!(res.text().await.unwrap(), "created");

    let res = client.get(server.url("/nowhere")).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "Not Found");
}

#[tokio::test]
async fn test_error_handler_recovers() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let log = Arc::clone(&seen);

    let mut router = Router::default();
    router
        .always(
            None,
            vec![handler(|req, _res| {
                Box::pin(async move {
                    if req.header("x-token").is_none() {
                        return Err(HttpError::new("401"));
                    }
                    Ok(Flow::Next)
                })
            })],
        )
        .unwrap()
        .get(
            "/secret",
            vec![
                handler(|_req, res| {
                    Box::pin(async move {
                        res.send("classified");
                        Ok(Flow::Stop)
                    })
                }),
                error_handler(move |err, _req, res| {
                    let log = Arc::clone(&log);
                    Box::pin(async move {
                        log.lock().unwrap().push(err.to_string());
                        res.status(StatusCode::UNAUTHORIZED);
                        res.send("sign in first");
                        Ok(Flow::Stop)
                    })
                }),
            ],
        )
        .unwrap();
    let server = common::start_server(router).await;
    let client = common::client();

    let res = client.get(server.url("/secret")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(res.text().await.unwrap(), "sign in first");
    assert_eq!(*seen.lock().unwrap(), ["401"]);

    let res = client
        .get(server.url("/secret"))
        .header("x-token", "t")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "classified");
}

#[tokio::test]
async fn test_cors_preflight_and_rejection() {
    let mut config = RouterConfig::default();
    config.origins = vec!["https://app.example".into()];
    let mut router = Router::new(config);
    router
        .put(
            "/doc",
            vec![handler(|_req, res| {
                Box::pin(async move {
                    res.send("saved");
                    Ok(Flow::Stop)
                })
            })],
        )
        .unwrap();
    let server = common::start_server(router).await;
    let client = common::client();

    let res = client
        .request(reqwest::Method::OPTIONS, server.url("/doc"))
        .header("origin", "https://app.example")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 204);
    assert_eq!(res.headers()["access-control-allow-origin"], "https://app.example");
    assert_eq!(res.headers()["access-control-allow-methods"], "OPTIONS, PUT");
    assert_eq!(res.headers()["access-control-allow-headers"], "content-type");

    let res = client
        .put(server.url("/doc"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 403);
}

#[tokio::test]
async fn test_response_time_header() {
    let mut config = RouterConfig::default();
    config.time = true;
    config.digit = 2;
    let mut router = Router::new(config);
    router
        .get(
            "/",
            vec![handler(|_req, res| {
                Box::pin(async move {
                    res.send("root");
                    Ok(Flow::Stop)
                })
            })],
        )
        .unwrap();
    let server = common::start_server(router).await;

    let res = common::client().get(server.url("/")).send().await.unwrap();
    let value = res.headers()["x-response-time"].to_str().unwrap().to_string();
    let number = value.strip_suffix(" ms").unwrap();
    assert_eq!(number.split('.').nth(1).map(str::len), Some(2));
}
