//! reqwest-backed [`ReportApi`]

use crate::api::{RemoteError, ReportApi};
use crate::session::SessionGuard;
use async_trait::async_trait;
use draftsync_core::{
    ConflictDetails, Precondition, ReportId, ReportPayload, ServerReport, UpdateReceipt,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, IF_UNMODIFIED_SINCE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the version the writer last observed
pub const VERSION_HEADER: &str = "x-report-version";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Talks to a draftsync report endpoint over HTTP
#[derive(Debug, Clone)]
pub struct HttpReportApi {
    client: reqwest::Client,
    base_url: String,
    guard: Arc<SessionGuard>,
}

impl HttpReportApi {
    /// Client for the endpoint at `base_url`, authenticating with the guard's token
    #[must_use]
    pub fn new(base_url: impl Into<String>, guard: Arc<SessionGuard>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client, base_url, guard)
    }

    /// Use a preconfigured reqwest client
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        guard: Arc<SessionGuard>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            guard,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<HeaderMap, RemoteError> {
        let token = self.guard.token().ok_or(RemoteError::AuthExpired)?;
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| RemoteError::Network(format!("invalid auth header: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Network(err.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::Network(format!("invalid response body: {e}")))
}

/// Map a non-success response onto the error taxonomy
async fn failure(report_id: Option<ReportId>, response: Response) -> RemoteError {
    match (response.status(), report_id) {
        (StatusCode::UNAUTHORIZED, _) => RemoteError::AuthExpired,
        (StatusCode::CONFLICT, Some(report_id)) => match decode::<ConflictDetails>(response).await {
            Ok(details) => RemoteError::Conflict { report_id, details },
            Err(err) => err,
        },
        (StatusCode::NOT_FOUND, Some(report_id)) => RemoteError::NotFound(report_id),
        (status, _) => RemoteError::Network(format!("unexpected status {status}")),
    }
}

#[async_trait]
impl ReportApi for HttpReportApi {
    async fn update(
        &self,
        report_id: ReportId,
        payload: &ReportPayload,
        precondition: Precondition,
    ) -> Result<UpdateReceipt, RemoteError> {
        let mut headers = self.auth_headers()?;
        if let Some((marker, _)) = precondition.if_unmodified_since {
            let value = HeaderValue::from_str(&marker.to_header())
                .map_err(|e| RemoteError::Network(format!("invalid marker header: {e}")))?;
            headers.insert(IF_UNMODIFIED_SINCE, value);
        }
        if let Some(version) = precondition.version {
            headers.insert(VERSION_HEADER, HeaderValue::from(version));
        }

        let response = self
            .client
            .put(self.url(&format!("/reports/{report_id}")))
            .headers(headers)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::OK {
            decode(response).await
        } else {
            Err(failure(Some(report_id), response).await)
        }
    }

    async fn create(&self, payload: &ReportPayload) -> Result<UpdateReceipt, RemoteError> {
        let response = self
            .client
            .post(self.url("/reports"))
            .headers(self.auth_headers()?)
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            decode(response).await
        } else {
            Err(failure(None, response).await)
        }
    }

    async fn fetch(&self, report_id: ReportId) -> Result<ServerReport, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/reports/{report_id}")))
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(transport)?;

        if response.status() == StatusCode::OK {
            decode(response).await
        } else {
            Err(failure(Some(report_id), response).await)
        }
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(self.url("/me"))
            .headers(self.auth_headers()?)
            .send()
            .await
            .map_err(transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(failure(None, response).await)
        }
    }
}
