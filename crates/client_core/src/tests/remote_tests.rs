use super::*;

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response as AxumResponse},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::{
    domain::{Role, User, UserId},
    protocol::{ApiResponse, AuthPayload, Filters, Pagination},
};
use storage::MemoryStore;
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    list_requests: Arc<Mutex<Vec<(HashMap<String, String>, Option<String>)>>>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
struct Team {
    id: i64,
    name: String,
}

fn admin() -> User {
    User {
        id: UserId(1),
        name: "Root".into(),
        email: "root@example.com".into(),
        is_active: true,
        role: Role::Admin,
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned)
}

async fn handle_login(Json(request): Json<LoginRequest>) -> AxumResponse {
    if request.password == "secret" {
        Json(ApiResponse::success(AuthPayload {
            user: admin(),
            token: "tok-1".into(),
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse::failure("Invalid credentials")),
        )
            .into_response()
    }
}

async fn handle_me(headers: HeaderMap) -> AxumResponse {
    match bearer(&headers).as_deref() {
        Some("tok-1") => Json(ApiResponse::success(admin())).into_response(),
        Some("expired") => (
            StatusCode::UNAUTHORIZED,
            Json(MeResponse::failure("Token expired")),
        )
            .into_response(),
        _ => (StatusCode::UNAUTHORIZED, "missing token").into_response(),
    }
}

async fn handle_teams(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<ListResult<Team>> {
    let page = params
        .get("page")
        .and_then(|page| page.parse().ok())
        .unwrap_or(1);
    let limit = params
        .get("limit")
        .and_then(|limit| limit.parse().ok())
        .unwrap_or(10);
    state
        .list_requests
        .lock()
        .await
        .push((params, bearer(&headers)));
    Json(ListResult {
        items: vec![Team {
            id: 7,
            name: "Eagles".into(),
        }],
        pagination: Pagination {
            page,
            total_pages: 3,
            total: 21,
            limit,
        },
    })
}

async fn spawn_api_server() -> Result<(Url, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/auth/login", post(handle_login))
        .route("/api/auth/me", get(handle_me))
        .route("/api/teams", get(handle_teams))
        .route(
            "/api/broken",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/api/"))?, state))
}

fn credentials(password: &str) -> LoginRequest {
    LoginRequest {
        email: "root@example.com".into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn login_returns_success_envelope() {
    let (base_url, _) = spawn_api_server().await.expect("spawn server");
    let api = HttpAuthApi::new(Client::new(), base_url);

    let response = api.login(&credentials("secret")).await.expect("login");
    let payload = response.into_data().expect("success");
    assert_eq!(payload.token, "tok-1");
    assert_eq!(payload.user, admin());
}

#[tokio::test]
async fn rejected_login_body_is_parsed_despite_error_status() {
    let (base_url, _) = spawn_api_server().await.expect("spawn server");
    let api = HttpAuthApi::new(Client::new(), base_url);

    let response = api.login(&credentials("wrong")).await.expect("envelope");
    assert!(!response.is_success());
    assert_eq!(response.message(), Some("Invalid credentials"));
}

#[tokio::test]
async fn me_sends_bearer_token_and_maps_unparseable_rejections() {
    let (base_url, _) = spawn_api_server().await.expect("spawn server");
    let api = HttpAuthApi::new(Client::new(), base_url);

    let me = api.me("tok-1").await.expect("me");
    assert_eq!(me.into_data(), Some(admin()));

    let expired = api.me("expired").await.expect("envelope");
    assert_eq!(expired.message(), Some("Token expired"));

    let err = api.me("unknown").await.expect_err("plain-text 401");
    let api_err = err.downcast_ref::<ApiError>().expect("api error");
    assert_eq!(api_err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let base_url = Url::parse(&format!("http://{addr}/api/")).expect("url");
    let api = HttpAuthApi::new(Client::new(), base_url);
    let err = api.me("tok-1").await.expect_err("connection refused");
    assert_eq!(
        err.downcast_ref::<ApiError>().map(|e| e.code),
        Some(ErrorCode::Transport)
    );
}

#[tokio::test]
async fn list_fetcher_flattens_query_and_reads_token_from_store() {
    let (base_url, server) = spawn_api_server().await.expect("spawn server");
    let store = MemoryStore::new();
    store
        .set(keys::ACCESS_TOKEN, "tok-1")
        .await
        .expect("store token");
    let fetcher: HttpListFetcher<Team> =
        HttpListFetcher::new(Client::new(), base_url, "teams", Arc::new(store));

    let mut filters = Filters::new();
    filters.insert("search".into(), json!("eag"));
    filters.insert("category".into(), json!(3));
    filters.insert("city".into(), serde_json::Value::Null);
    let page = ListFetcher::<Team, Filters>::fetch(
        &fetcher,
        ListQuery {
            page: 2,
            limit: 5,
            filters,
        },
    )
    .await
    .expect("page");

    assert_eq!(page.items[0].name, "Eagles");
    assert_eq!(page.pagination.page, 2);
    assert_eq!(page.pagination.limit, 5);

    let requests = server.list_requests.lock().await;
    let (params, token) = &requests[0];
    assert_eq!(params.get("page").map(String::as_str), Some("2"));
    assert_eq!(params.get("limit").map(String::as_str), Some("5"));
    assert_eq!(params.get("search").map(String::as_str), Some("eag"));
    assert_eq!(params.get("category").map(String::as_str), Some("3"));
    assert!(!params.contains_key("city"));
    assert_eq!(token.as_deref(), Some("tok-1"));
}

#[tokio::test]
async fn list_fetcher_without_token_sends_no_authorization() {
    let (base_url, server) = spawn_api_server().await.expect("spawn server");
    let fetcher: HttpListFetcher<Team> =
        HttpListFetcher::new(Client::new(), base_url, "teams", Arc::new(MemoryStore::new()));

    ListFetcher::<Team, Filters>::fetch(
        &fetcher,
        ListQuery {
            page: 1,
            limit: 10,
            filters: Filters::new(),
        },
    )
    .await
    .expect("page");

    let requests = server.list_requests.lock().await;
    assert_eq!(requests[0].1, None);
}

#[tokio::test]
async fn list_fetcher_maps_error_status() {
    let (base_url, _) = spawn_api_server().await.expect("spawn server");
    let fetcher: HttpListFetcher<Team> =
        HttpListFetcher::new(Client::new(), base_url, "broken", Arc::new(MemoryStore::new()));
    assert_eq!(fetcher.resource(), "broken");

    let err = ListFetcher::<Team, Filters>::fetch(
        &fetcher,
        ListQuery {
            page: 1,
            limit: 10,
            filters: Filters::new(),
        },
    )
    .await
    .expect_err("500");
    assert_eq!(
        err.downcast_ref::<ApiError>().map(|e| e.code),
        Some(ErrorCode::Internal)
    );
}
