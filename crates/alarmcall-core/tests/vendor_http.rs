use alarmcall_core::config::{BustraxConfig, RetellConfig, TokenLocator};
use alarmcall_core::errors::VendorError;
use alarmcall_core::model::CallRequest;
use alarmcall_core::providers::bustrax::BustraxClient;
use alarmcall_core::providers::retell::RetellClient;
use alarmcall_core::providers::{http_client, CallPlacer, TrackingSource};
use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn login(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    let ok = q.get("action").map(String::as_str) == Some("login")
        && q.get("username").map(String::as_str) == Some("ops")
        && q.get("password").map(String::as_str) == Some("secret")
        && q.get("version").map(String::as_str) == Some("2.0");
    if ok {
        (StatusCode::OK, "1,ok,ops,tok_live,2026-10-16".to_string())
    } else {
        (StatusCode::UNAUTHORIZED, "bad credentials".to_string())
    }
}

async fn track_bare(
    State(captured): State<Captured>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    captured.lock().unwrap().push(form.clone());
    if form.get("data[bttkn]").map(String::as_str) != Some("tok_live") {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "token"})));
    }
    (
        StatusCode::OK,
        Json(json!([
            {"trip": "T1", "driver_name": "Ana", "cellphone": "5512345678", "fin_kpi": "-10"},
            {"trip": "T2", "driver name": "Beto", "fin_kpi": 3}
        ])),
    )
}

async fn track_wrapped() -> Json<Value> {
    Json(json!({"status": "ok", "data": [{"trip": "W1", "status": "Verificar unidad"}]}))
}

async fn track_unexpected() -> Json<Value> {
    Json(json!({"status": "ok", "rows": 0}))
}

async fn track_html() -> &'static str {
    "<html>maintenance</html>"
}

async fn track_down() -> impl IntoResponse {
    (StatusCode::BAD_GATEWAY, "upstream timeout")
}

fn bustrax_cfg(base: &str, track_path: &str) -> BustraxConfig {
    BustraxConfig {
        auth_url: format!("{base}/auth"),
        track_url: format!("{base}{track_path}"),
        username: "ops".into(),
        password: "secret".into(),
        auth_version: "2.0".into(),
        protocol_version: "1.0.1".into(),
        business_unit: "lip_vdm".into(),
        anticipation_minutes: 45,
        after_trip_minutes: 15,
        token_locator: TokenLocator::Field(3),
    }
}

async fn bustrax_server() -> (String, Captured) {
    let captured: Captured = Arc::default();
    let app = Router::new()
        .route("/auth", get(login))
        .route("/track", post(track_bare))
        .route("/track-wrapped", post(track_wrapped))
        .route("/track-unexpected", post(track_unexpected))
        .route("/track-html", post(track_html))
        .route("/track-down", post(track_down))
        .with_state(captured.clone());
    (spawn(app).await, captured)
}

fn client() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn bustrax_login_then_fetch() {
    let (base, captured) = bustrax_server().await;
    let bx = BustraxClient::new(bustrax_cfg(&base, "/track"), client());

    let token = bx.authenticate().await.unwrap();
    assert_eq!(token, "tok_live");

    let batch = bx.fetch(&token).await.unwrap();
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.records[0].alarm_id(), Some("T1"));
    assert_eq!(batch.records[1].driver(), "Beto");

    let forms = captured.lock().unwrap();
    let form = &forms[0];
    assert_eq!(form["data[iuser]"], "ops");
    assert_eq!(form["data[ver]"], "1.0.1");
    assert_eq!(form["data[bunit]"], "lip_vdm");
    assert_eq!(form["data[anticipation_minutes]"], "45");
    assert_eq!(form["data[after_trip_minutes]"], "15");
    assert_eq!(form["type"], "get_route_tracking");
}

#[tokio::test]
async fn bustrax_bad_credentials_surface_status() {
    let (base, _) = bustrax_server().await;
    let mut cfg = bustrax_cfg(&base, "/track");
    cfg.password = "wrong".into();
    let bx = BustraxClient::new(cfg, client());

    match bx.authenticate().await.unwrap_err() {
        VendorError::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad credentials");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn bustrax_token_index_mismatch_is_decode_error() {
    let (base, _) = bustrax_server().await;
    let mut cfg = bustrax_cfg(&base, "/track");
    cfg.token_locator = TokenLocator::Field(7);
    let bx = BustraxClient::new(cfg, client());

    assert!(matches!(
        bx.authenticate().await.unwrap_err(),
        VendorError::Decode(_)
    ));
}

#[tokio::test]
async fn bustrax_wrapped_payload_is_accepted() {
    let (base, _) = bustrax_server().await;
    let bx = BustraxClient::new(bustrax_cfg(&base, "/track-wrapped"), client());

    let batch = bx.fetch("tok_live").await.unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].status, "Verificar unidad");
}

#[tokio::test]
async fn bustrax_fetch_failures_are_distinct() {
    let (base, _) = bustrax_server().await;

    let bx = BustraxClient::new(bustrax_cfg(&base, "/track-unexpected"), client());
    let err = bx.fetch("tok_live").await.unwrap_err();
    assert!(matches!(err, VendorError::Decode(_)));
    assert!(err.to_string().contains("without a data array"));

    let bx = BustraxClient::new(bustrax_cfg(&base, "/track-html"), client());
    assert!(matches!(
        bx.fetch("tok_live").await.unwrap_err(),
        VendorError::Decode(_)
    ));

    let bx = BustraxClient::new(bustrax_cfg(&base, "/track-down"), client());
    match bx.fetch("tok_live").await.unwrap_err() {
        VendorError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream timeout");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn bustrax_unreachable_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let bx = BustraxClient::new(bustrax_cfg(&base, "/track"), client());
    assert!(matches!(
        bx.authenticate().await.unwrap_err(),
        VendorError::Transport(_)
    ));
}

#[derive(Clone, Default)]
struct RetellState {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
}

async fn create_call(
    State(state): State<RetellState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.auth.lock().unwrap().push(auth);
    let to = body["to_number"].as_str().unwrap_or_default().to_string();
    state.bodies.lock().unwrap().push(body);

    if to == "+520000000000" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error_message": "invalid to_number"})),
        );
    }
    (
        StatusCode::CREATED,
        Json(json!({"call_id": "call_abc", "call_status": "registered"})),
    )
}

fn call_request(to: &str) -> CallRequest {
    let mut vars = BTreeMap::new();
    vars.insert("driver_name".to_string(), "Ana".to_string());
    vars.insert("route".to_string(), "Ruta Norte".to_string());
    CallRequest {
        from_number: "+525500000000".into(),
        to_number: to.into(),
        call_type: "phone_call".into(),
        agent_id: "agent_1".into(),
        dynamic_variables: vars,
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn retell_call_round_trip() {
    let state = RetellState::default();
    let app = Router::new()
        .route("/v2/create-phone-call", post(create_call))
        .with_state(state.clone());
    let base = spawn(app).await;

    let cfg = RetellConfig {
        base_url: base,
        api_key: "key_live".into(),
        from_number: "+525500000000".into(),
        agent_id: "agent_1".into(),
        test_phone_number: None,
    };
    let retell = RetellClient::new(&cfg, client());

    let receipt = retell.place_call(&call_request("+525512345678")).await.unwrap();
    assert_eq!(receipt.call_id.as_deref(), Some("call_abc"));

    assert_eq!(state.auth.lock().unwrap()[0], "Bearer key_live");
    let body = state.bodies.lock().unwrap()[0].clone();
    assert_eq!(body["from_number"], "+525500000000");
    assert_eq!(body["to_number"], "+525512345678");
    assert_eq!(body["call_type"], "phone_call");
    assert_eq!(body["agent_id"], "agent_1");
    assert_eq!(body["retell_llm_dynamic_variables"]["driver_name"], "Ana");
    assert_eq!(body["retell_llm_dynamic_variables"]["route"], "Ruta Norte");
    assert!(body.get("metadata").is_none());

    match retell
        .place_call(&call_request("+520000000000"))
        .await
        .unwrap_err()
    {
        VendorError::Status { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("invalid to_number"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

async fn create_call_plain() -> impl IntoResponse {
    (StatusCode::CREATED, "queued")
}

#[tokio::test]
async fn retell_success_without_json_body_counts_as_placed() {
    let app = Router::new().route("/v2/create-phone-call", post(create_call_plain));
    let base = spawn(app).await;

    let cfg = RetellConfig {
        base_url: base,
        api_key: "key_live".into(),
        from_number: "+525500000000".into(),
        agent_id: "agent_1".into(),
        test_phone_number: None,
    };
    let retell = RetellClient::new(&cfg, client());

    let receipt = retell.place_call(&call_request("+525512345678")).await.unwrap();
    assert_eq!(receipt.call_id, None);
    assert_eq!(receipt.raw, Value::Null);
}
