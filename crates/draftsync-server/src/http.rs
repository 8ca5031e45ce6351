//! HTTP surface
//!
//! - `PUT /reports/{id}`: update under `If-Unmodified-Since` / `X-Report-Version`
//! - `POST /reports`: create, `201`
//! - `GET /reports/{id}`: current report
//! - `GET /me`: session ping
//!
//! Every route requires `Authorization: Bearer <token>`; a missing or expired
//! session is a `401` with an empty body.

use crate::auth::{bearer_token, Authenticator, Principal};
use crate::controller::ConcurrencyController;
use crate::error::ServerError;
use draftsync_core::{Marker, Precondition, ReportId, ReportPayload};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Header carrying the version the writer last observed
pub const VERSION_HEADER: &str = "x-report-version";

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    controller: ConcurrencyController,
    auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Bundle a controller and an authenticator
    #[must_use]
    pub fn new(controller: ConcurrencyController, auth: Arc<dyn Authenticator>) -> Self {
        Self { controller, auth }
    }

    /// The controller behind the routes
    #[must_use]
    pub fn controller(&self) -> &ConcurrencyController {
        &self.controller
    }

    async fn authorize(&self, header: Option<&str>) -> Result<Principal, ServerError> {
        let token = header.and_then(bearer_token).ok_or(ServerError::Unauthorized)?;
        self.auth
            .authenticate(token)
            .await
            .ok_or(ServerError::Unauthorized)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_by: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<Marker>,
}

impl<'a> ErrorBody<'a> {
    fn code(code: &'a str) -> Self {
        Self {
            code,
            message: None,
            updated_by: None,
            updated_at: None,
        }
    }
}

/// All routes, with rejections turned into JSON error bodies
pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone + Send + Sync + 'static {
    let with_state = warp::any().map(move || state.clone());
    let authorization = warp::header::optional::<String>("authorization");

    let update = warp::path!("reports" / u64)
        .and(warp::put())
        .and(authorization.clone())
        .and(warp::header::optional::<String>("if-unmodified-since"))
        .and(warp::header::optional::<String>(VERSION_HEADER))
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_update);

    let create = warp::path!("reports")
        .and(warp::post())
        .and(authorization.clone())
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_create);

    let fetch = warp::path!("reports" / u64)
        .and(warp::get())
        .and(authorization.clone())
        .and(with_state.clone())
        .and_then(handle_fetch);

    let me = warp::path!("me")
        .and(warp::get())
        .and(authorization)
        .and(with_state)
        .and_then(handle_me);

    update
        .or(create)
        .unify()
        .or(fetch)
        .unify()
        .or(me)
        .unify()
        .recover(handle_rejection)
        .unify()
}

/// Bind the routes to `addr` (port 0 picks a free port)
///
/// # Errors
/// `warp::Error` if the address cannot be bound
pub fn bind(
    state: AppState,
    addr: SocketAddr,
) -> Result<(SocketAddr, impl Future<Output = ()> + 'static), warp::Error> {
    warp::serve(routes(state)).try_bind_ephemeral(addr)
}

/// [`bind`], stopping when `shutdown` resolves
///
/// # Errors
/// `warp::Error` if the address cannot be bound
pub fn bind_with_shutdown(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, impl Future<Output = ()> + 'static), warp::Error> {
    warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, shutdown)
}

async fn handle_update(
    id: u64,
    authorization: Option<String>,
    if_unmodified_since: Option<String>,
    version: Option<String>,
    body: Bytes,
    state: AppState,
) -> Result<Response, Infallible> {
    let result = async {
        let principal = state.authorize(authorization.as_deref()).await?;
        let precondition = parse_precondition(if_unmodified_since.as_deref(), version.as_deref())?;
        let payload = parse_payload(&body)?;
        state
            .controller
            .update(ReportId(id), payload, precondition, &principal.name)
    }
    .await;

    Ok(match result {
        Ok(receipt) => warp::reply::json(&receipt).into_response(),
        Err(err) => error_reply(&err),
    })
}

async fn handle_create(
    authorization: Option<String>,
    body: Bytes,
    state: AppState,
) -> Result<Response, Infallible> {
    let result = async {
        let principal = state.authorize(authorization.as_deref()).await?;
        let payload = parse_payload(&body)?;
        state.controller.create(payload, &principal.name)
    }
    .await;

    Ok(match result {
        Ok(receipt) => {
            warp::reply::with_status(warp::reply::json(&receipt), StatusCode::CREATED)
                .into_response()
        }
        Err(err) => error_reply(&err),
    })
}

async fn handle_fetch(
    id: u64,
    authorization: Option<String>,
    state: AppState,
) -> Result<Response, Infallible> {
    let result = async {
        state.authorize(authorization.as_deref()).await?;
        state.controller.get(ReportId(id))
    }
    .await;

    Ok(match result {
        Ok(report) => warp::reply::json(&report).into_response(),
        Err(err) => error_reply(&err),
    })
}

async fn handle_me(authorization: Option<String>, state: AppState) -> Result<Response, Infallible> {
    Ok(match state.authorize(authorization.as_deref()).await {
        Ok(principal) => warp::reply::json(&principal).into_response(),
        Err(err) => error_reply(&err),
    })
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    if rejection.is_not_found() {
        return Ok(json_reply(StatusCode::NOT_FOUND, &ErrorBody::code("not_found")));
    }
    if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    tracing::debug!("Rejected request: {:?}", rejection);
    Ok(error_reply(&ServerError::BadRequest(format!("{rejection:?}"))))
}

fn parse_precondition(
    if_unmodified_since: Option<&str>,
    version: Option<&str>,
) -> Result<Precondition, ServerError> {
    let if_unmodified_since = if_unmodified_since
        .map(Marker::parse_header)
        .transpose()
        .map_err(|err| ServerError::BadRequest(err.to_string()))?;
    let version = version
        .map(|raw| raw.trim().parse::<u64>())
        .transpose()
        .map_err(|err| ServerError::BadRequest(format!("invalid {VERSION_HEADER}: {err}")))?;

    Ok(Precondition {
        if_unmodified_since,
        version,
    })
}

fn parse_payload(body: &[u8]) -> Result<ReportPayload, ServerError> {
    serde_json::from_slice(body)
        .map_err(|err| ServerError::BadRequest(format!("invalid report body: {err}")))
}

fn error_reply(err: &ServerError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match err {
        ServerError::Unauthorized => return StatusCode::UNAUTHORIZED.into_response(),
        ServerError::Conflict { details, .. } => ErrorBody {
            updated_by: Some(&details.updated_by),
            updated_at: Some(details.updated_at),
            ..ErrorBody::code("conflict")
        },
        ServerError::NotFound(_) => ErrorBody::code("not_found"),
        ServerError::BadRequest(message) => ErrorBody {
            message: Some(message.clone()),
            ..ErrorBody::code("bad_request")
        },
        ServerError::Config(_) => ErrorBody::code("internal"),
    };
    json_reply(status, &body)
}

fn json_reply(status: StatusCode, body: &ErrorBody<'_>) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticSessions;
    use crate::repository::InMemoryReportRepository;
    use chrono::{TimeZone, Utc};
    use draftsync_core::{ManualClock, UpdateReceipt};
    use serde_json::{json, Value};

    fn state() -> (AppState, Arc<StaticSessions>) {
        let sessions = Arc::new(StaticSessions::from_pairs([
            ("tok-a", "A. Lee"),
            ("tok-b", "B. Cruz"),
        ]));
        let controller = ConcurrencyController::new(
            Arc::new(InMemoryReportRepository::new()),
            Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap())),
        );
        (AppState::new(controller, sessions.clone()), sessions)
    }

    async fn create(
        filter: &(impl Filter<Extract = (Response,), Error = Infallible> + Clone + 'static),
    ) -> UpdateReceipt {
        let res = warp::test::request()
            .method("POST")
            .path("/reports")
            .header("authorization", "Bearer tok-a")
            .json(&json!({ "fields": { "school": "Northside" } }))
            .reply(filter)
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn put_with_current_marker_returns_new_marker() {
        let (state, _) = state();
        let filter = routes(state);
        let created = create(&filter).await;

        let res = warp::test::request()
            .method("PUT")
            .path(&format!("/reports/{}", created.report_id))
            .header("authorization", "Bearer tok-a")
            .header("if-unmodified-since", created.updated_at.to_header())
            .header(VERSION_HEADER, created.version.to_string())
            .json(&json!({ "fields": { "school": "Southside" } }))
            .reply(&filter)
            .await;

        assert_eq!(res.status(), StatusCode::OK);
        let receipt: UpdateReceipt = serde_json::from_slice(res.body()).unwrap();
        assert!(receipt.updated_at > created.updated_at);
        assert_eq!(receipt.version, 2);
    }

    #[tokio::test]
    async fn stale_marker_is_409_with_details() {
        let (state, _) = state();
        let filter = routes(state);
        let created = create(&filter).await;

        let theirs = warp::test::request()
            .method("PUT")
            .path(&format!("/reports/{}", created.report_id))
            .header("authorization", "Bearer tok-b")
            .json(&json!({}))
            .reply(&filter)
            .await;
        let theirs: UpdateReceipt = serde_json::from_slice(theirs.body()).unwrap();

        let res = warp::test::request()
            .method("PUT")
            .path(&format!("/reports/{}", created.report_id))
            .header("authorization", "Bearer tok-a")
            .header("if-unmodified-since", created.updated_at.to_header())
            .json(&json!({}))
            .reply(&filter)
            .await;

        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], "conflict");
        assert_eq!(body["updatedBy"], "B. Cruz");
        let (updated_at, _) = Marker::parse_header(body["updatedAt"].as_str().unwrap()).unwrap();
        assert_eq!(updated_at, theirs.updated_at);
    }

    #[tokio::test]
    async fn missing_or_revoked_session_is_401() {
        let (state, sessions) = state();
        let filter = routes(state);

        let res = warp::test::request().method("GET").path("/me").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert!(res.body().is_empty());

        let res = warp::test::request()
            .method("GET")
            .path("/me")
            .header("authorization", "Bearer tok-a")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::OK);

        sessions.revoke("tok-a");
        let res = warp::test::request()
            .method("PUT")
            .path("/reports/1")
            .header("authorization", "Bearer tok-a")
            .json(&json!({}))
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_report_is_404() {
        let (state, _) = state();
        let filter = routes(state);

        let res = warp::test::request()
            .method("GET")
            .path("/reports/77")
            .header("authorization", "Bearer tok-a")
            .reply(&filter)
            .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn malformed_inputs_are_400() {
        let (state, _) = state();
        let filter = routes(state);
        let created = create(&filter).await;
        let path = format!("/reports/{}", created.report_id);

        let bad_marker = warp::test::request()
            .method("PUT")
            .path(&path)
            .header("authorization", "Bearer tok-a")
            .header("if-unmodified-since", "yesterday")
            .json(&json!({}))
            .reply(&filter)
            .await;
        assert_eq!(bad_marker.status(), StatusCode::BAD_REQUEST);

        let bad_body = warp::test::request()
            .method("PUT")
            .path(&path)
            .header("authorization", "Bearer tok-a")
            .body("{ not json")
            .reply(&filter)
            .await;
        assert_eq!(bad_body.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(bad_body.body()).unwrap();
        assert_eq!(body["code"], "bad_request");
    }
}
