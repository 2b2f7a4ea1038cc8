use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use clap::Parser;
use pact_api::{
    AddCommentRequest, ApiError, CreatePromiseRequest, PactApi, ReframeRequest,
    UpdatePromiseRequest, API_CONTRACT_VERSION,
};
use pact_core::{CommentId, FriendRequestId, NotificationId, PromiseId, UserId};
use serde::{Deserialize, Serialize};

const SERVICE_CONTRACT_VERSION: &str = "service.v1";
const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
struct ServiceState {
    api: PactApi,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ServiceError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: message.into(),
            status,
        }
    }
}

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        let status = match &err {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

fn envelope<T>(data: T) -> Json<ServiceEnvelope<T>>
where
    T: Serialize,
{
    Json(ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    })
}

/// The session collaborator in front of this service resolves cookies to a
/// user id and forwards it in the `x-user-id` header.
fn caller(headers: &HeaderMap) -> Result<UserId, ServiceError> {
    let raw = headers
        .get(USER_HEADER)
        .ok_or_else(|| ServiceError::new(StatusCode::UNAUTHORIZED, "missing x-user-id header"))?;
    raw.to_str()
        .ok()
        .and_then(|value| value.parse::<i64>().ok())
        .map(UserId)
        .ok_or_else(|| ServiceError::new(StatusCode::UNAUTHORIZED, "invalid x-user-id header"))
}

#[derive(Debug, Clone, Deserialize)]
struct RegisterBody {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    email: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ProgressBody {
    current_value: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct FriendRequestBody {
    to_user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct SuggestBody {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    category: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LimitParams {
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchParams {
    q: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Parser)]
#[command(name = "pact-service")]
#[command(about = "Local HTTP service for the pact promise tracker")]
struct Args {
    #[arg(long, default_value = "./pact.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/users", post(register_user))
        .route("/api/users/search", get(search_users))
        .route("/api/users/:user_id", get(get_user))
        .route("/api/promises", get(dashboard).post(create_promise))
        .route("/api/promises/:promise_id", get(promise_detail).patch(update_promise))
        .route("/api/promises/:promise_id/complete", post(complete))
        .route("/api/promises/:promise_id/undo-complete", post(undo_complete))
        .route("/api/promises/:promise_id/forfeit", post(forfeit))
        .route("/api/promises/:promise_id/progress", patch(update_progress))
        .route("/api/promises/:promise_id/comments", get(comments).post(add_comment))
        .route("/api/promises/:promise_id/comments/:comment_id/like", post(toggle_comment_like))
        .route("/api/reframe/:promise_id/apply", post(apply_reframe))
        .route("/api/reframe/:promise_id/suggest", post(reframe_suggestions))
        .route("/api/activity", get(activity))
        .route("/api/categories", get(categories))
        .route("/api/friends", get(list_friends))
        .route("/api/friends/:friend_id", delete(remove_friend))
        .route("/api/friends/requests", post(send_friend_request))
        .route("/api/friends/requests/incoming", get(incoming_requests))
        .route("/api/friends/requests/outgoing", get(outgoing_requests))
        .route("/api/friends/requests/:request_id/accept", post(accept_friend_request))
        .route("/api/friends/requests/:request_id/decline", post(decline_friend_request))
        .route("/api/friends/requests/:request_id", delete(cancel_friend_request))
        .route("/api/notifications", get(notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/:notification_id/read", patch(mark_notification_read))
        .route("/api/notifications/read-all", post(mark_all_notifications_read))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let state = ServiceState { api: PactApi::new(args.db) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health() -> Json<ServiceEnvelope<HealthResponse>> {
    envelope(HealthResponse { status: "ok" })
}

async fn register_user(
    State(state): State<ServiceState>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<ServiceEnvelope<pact_api::UserSummary>>, ServiceError> {
    let user = state.api.register_user(&body.name, body.display_name.as_deref(), &body.email)?;
    Ok(envelope(user))
}

async fn search_users(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::UserSummary>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.search_users(&params.q, user)?))
}

async fn get_user(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<pact_api::UserSummary>>, ServiceError> {
    caller(&headers)?;
    Ok(envelope(state.api.get_user(UserId(user_id))?))
}

async fn dashboard(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<pact_api::DashboardResponse>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.dashboard(user)?))
}

async fn create_promise(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<CreatePromiseRequest>,
) -> Result<Json<ServiceEnvelope<PromiseId>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.create_promise(user, &body)?))
}

async fn promise_detail(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<pact_api::PromiseDetail>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.promise_detail(PromiseId(promise_id), user)?))
}

async fn update_promise(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
    Json(body): Json<UpdatePromiseRequest>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.update_promise(PromiseId(promise_id), user, &body)?;
    Ok(envelope(()))
}

async fn complete(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<pact_api::CompleteOutcome>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.complete(PromiseId(promise_id), user)?))
}

async fn undo_complete(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<pact_api::StatusOutcome>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.undo_complete(PromiseId(promise_id), user)?))
}

async fn forfeit(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<pact_api::StatusOutcome>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.forfeit(PromiseId(promise_id), user)?))
}

async fn update_progress(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
    Json(body): Json<ProgressBody>,
) -> Result<Json<ServiceEnvelope<pact_api::ProgressOutcome>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.update_progress(PromiseId(promise_id), user, body.current_value)?))
}

async fn comments(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::CommentView>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.comments(PromiseId(promise_id), user)?))
}

async fn add_comment(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
    Json(body): Json<AddCommentRequest>,
) -> Result<Json<ServiceEnvelope<pact_api::CommentView>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.add_comment(PromiseId(promise_id), user, &body)?))
}

async fn toggle_comment_like(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path((promise_id, comment_id)): Path<(i64, i64)>,
) -> Result<Json<ServiceEnvelope<pact_api::LikeOutcome>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.toggle_comment_like(
        PromiseId(promise_id),
        CommentId(comment_id),
        user,
    )?))
}

async fn apply_reframe(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
    Json(body): Json<ReframeRequest>,
) -> Result<Json<ServiceEnvelope<PromiseId>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.apply_reframe(PromiseId(promise_id), user, &body)?))
}

async fn reframe_suggestions(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(promise_id): Path<i64>,
    Json(body): Json<SuggestBody>,
) -> Result<Json<ServiceEnvelope<Vec<pact_core::ReframeSuggestion>>>, ServiceError> {
    caller(&headers)?;
    Ok(envelope(state.api.reframe_suggestions(
        PromiseId(promise_id),
        &body.reason,
        &body.category,
    )?))
}

async fn activity(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<LimitParams>,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::ActivityItem>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.activity(user, params.limit)?))
}

async fn categories(
    State(state): State<ServiceState>,
) -> Json<ServiceEnvelope<Vec<String>>> {
    envelope(state.api.categories())
}

async fn list_friends(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::FriendView>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.list_friends(user)?))
}

async fn remove_friend(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(friend_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.remove_friend(user, UserId(friend_id))?;
    Ok(envelope(()))
}

async fn send_friend_request(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<FriendRequestBody>,
) -> Result<Json<ServiceEnvelope<pact_api::SentRequest>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.send_friend_request(user, UserId(body.to_user_id))?))
}

async fn incoming_requests(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::FriendRequestView>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.incoming_requests(user)?))
}

async fn outgoing_requests(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::FriendRequestView>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.outgoing_requests(user)?))
}

async fn accept_friend_request(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(request_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.accept_friend_request(FriendRequestId(request_id), user)?;
    Ok(envelope(()))
}

async fn decline_friend_request(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(request_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.decline_friend_request(FriendRequestId(request_id), user)?;
    Ok(envelope(()))
}

async fn cancel_friend_request(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(request_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.cancel_friend_request(FriendRequestId(request_id), user)?;
    Ok(envelope(()))
}

async fn notifications(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<LimitParams>,
) -> Result<Json<ServiceEnvelope<Vec<pact_api::NotificationView>>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.notifications(user, params.limit)?))
}

async fn unread_count(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<i64>>, ServiceError> {
    let user = caller(&headers)?;
    Ok(envelope(state.api.unread_count(user)?))
}

async fn mark_notification_read(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(notification_id): Path<i64>,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.mark_notification_read(NotificationId(notification_id), user)?;
    Ok(envelope(()))
}

async fn mark_all_notifications_read(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<ServiceEnvelope<()>>, ServiceError> {
    let user = caller(&headers)?;
    state.api.mark_all_notifications_read(user)?;
    Ok(envelope(()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    struct TempDb {
        router: Router,
        path: PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn temp_router() -> TempDb {
        let path =
            std::env::temp_dir().join(format!("pact-service-{}.sqlite3", ulid::Ulid::new()));
        let state = ServiceState { api: PactApi::new(path.clone()) };
        TempDb { router: app(state), path }
    }

    async fn response_json(response: Response) -> Value {
        let bytes = match to_bytes(response.into_body(), 1024 * 1024).await {
            Ok(bytes) => bytes,
            Err(err) => panic!("failed to read response body: {err}"),
        };
        let body = match String::from_utf8(bytes.to_vec()) {
            Ok(body) => body,
            Err(err) => panic!("response body is not UTF-8: {err}"),
        };
        match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(err) => panic!("response body is not JSON: {err}; body={body}"),
        }
    }

    fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user.to_string());
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        builder.body(body).unwrap_or_else(|err| panic!("failed to build request: {err}"))
    }

    async fn send(router: &Router, req: Request<Body>) -> Response {
        match router.clone().oneshot(req).await {
            Ok(response) => response,
            Err(err) => panic!("router request failed: {err}"),
        }
    }

    async fn register(router: &Router, name: &str) -> i64 {
        let response = send(
            router,
            request(
                "POST",
                "/api/users",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": format!("{name}@example.com"),
                })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        value
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing data.id in response: {value}"))
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let db = temp_router();
        let response = send(&db.router, request("GET", "/health", None, None)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let value = response_json(response).await;
        assert_eq!(
            value.get("service_contract_version").and_then(Value::as_str),
            Some(SERVICE_CONTRACT_VERSION)
        );
        assert_eq!(
            value.get("data").and_then(|data| data.get("status")).and_then(Value::as_str),
            Some("ok")
        );
    }

    #[tokio::test]
    async fn missing_user_header_is_unauthorized() {
        let db = temp_router();
        let response = send(&db.router, request("GET", "/api/promises", None, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_complete_and_dashboard_flow_round_trip() {
        let db = temp_router();
        let ada = register(&db.router, "ada").await;

        let response = send(
            &db.router,
            request(
                "POST",
                "/api/promises",
                Some(ada),
                Some(serde_json::json!({
                    "name": "run",
                    "content": "run 5k",
                    "deadline": "1h 30m",
                })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        let promise_id = value
            .get("data")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing promise id in response: {value}"));

        let response =
            send(&db.router, request("GET", "/api/promises", Some(ada), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        let promises = value
            .get("data")
            .and_then(|data| data.get("promises"))
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("missing data.promises in response: {value}"));
        assert_eq!(promises.len(), 1);
        assert_eq!(promises[0].get("status").and_then(Value::as_str), Some("ACTIVE"));
        assert!(promises[0].get("time_left").and_then(Value::as_str).is_some());

        let response = send(
            &db.router,
            request(
                "POST",
                &format!("/api/promises/{promise_id}/complete"),
                Some(ada),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        assert_eq!(
            value
                .get("data")
                .and_then(|data| data.get("status"))
                .and_then(Value::as_str),
            Some("completed")
        );
    }

    #[tokio::test]
    async fn error_taxonomy_maps_to_status_codes() {
        let db = temp_router();
        let ada = register(&db.router, "ada").await;
        let bob = register(&db.router, "bob").await;

        // InvalidInput -> 400
        let response = send(
            &db.router,
            request(
                "POST",
                "/api/promises",
                Some(ada),
                Some(serde_json::json!({ "name": "run", "deadline": "whenever" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // NotFound -> 404
        let response =
            send(&db.router, request("GET", "/api/promises/999", Some(ada), None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Forbidden -> 403
        let response = send(
            &db.router,
            request(
                "POST",
                "/api/promises",
                Some(ada),
                Some(serde_json::json!({ "name": "run", "deadline": "1h" })),
            ),
        )
        .await;
        let value = response_json(response).await;
        let promise_id = value
            .get("data")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing promise id in response: {value}"));
        let response = send(
            &db.router,
            request(
                "PATCH",
                &format!("/api/promises/{promise_id}"),
                Some(bob),
                Some(serde_json::json!({ "name": "mine now" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Conflict -> 409
        let response = send(
            &db.router,
            request(
                "POST",
                "/api/friends/requests",
                Some(ada),
                Some(serde_json::json!({ "to_user_id": ada })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn friend_request_flow_notifies_the_recipient() {
        let db = temp_router();
        let ada = register(&db.router, "ada").await;
        let bob = register(&db.router, "bob").await;

        let response = send(
            &db.router,
            request(
                "POST",
                "/api/friends/requests",
                Some(ada),
                Some(serde_json::json!({ "to_user_id": bob })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        let request_id = value
            .get("data")
            .and_then(|data| data.get("id"))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing data.id in response: {value}"));

        let response = send(
            &db.router,
            request("GET", "/api/notifications/unread-count", Some(bob), None),
        )
        .await;
        let value = response_json(response).await;
        assert_eq!(value.get("data").and_then(Value::as_i64), Some(1));

        let response = send(
            &db.router,
            request(
                "POST",
                &format!("/api/friends/requests/{request_id}/accept"),
                Some(bob),
                None,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&db.router, request("GET", "/api/friends", Some(ada), None)).await;
        let value = response_json(response).await;
        let friends = value
            .get("data")
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("missing data array in response: {value}"));
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].get("name").and_then(Value::as_str), Some("bob"));
    }

    #[tokio::test]
    async fn reframe_suggest_returns_the_templated_fallback() {
        let db = temp_router();
        let ada = register(&db.router, "ada").await;

        let response = send(
            &db.router,
            request(
                "POST",
                "/api/promises",
                Some(ada),
                Some(serde_json::json!({ "name": "run", "deadline": "1h" })),
            ),
        )
        .await;
        let value = response_json(response).await;
        let promise_id = value
            .get("data")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("missing promise id in response: {value}"));

        let response = send(
            &db.router,
            request(
                "POST",
                &format!("/api/reframe/{promise_id}/suggest"),
                Some(ada),
                Some(serde_json::json!({ "reason": "too busy", "category": "Time" })),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let value = response_json(response).await;
        let suggestions = value
            .get("data")
            .and_then(Value::as_array)
            .unwrap_or_else(|| panic!("missing data array in response: {value}"));
        assert_eq!(suggestions.len(), 3);
    }
}
