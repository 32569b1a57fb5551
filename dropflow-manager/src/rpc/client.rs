//! HTTP client for a remote manager.

use super::wire::{CreateSessionRequest, DeployRequest, ErrorBody, TriggerRequest};
use crate::manager::{
    DropManager, GraphStatus, GraphView, ManagerFuture, ManagerInfo, RemoteLink,
    SessionStatusReport,
};
use dropflow_core::error::{DropflowError, ErrorKind, Result};
use dropflow_core::event::DropEvent;
use dropflow_core::spec::GraphSpec;
use dropflow_core::types::{Oid, SessionId};
use reqwest::{Client as HttpClient, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A manager reached over HTTP.
///
/// Transport failures, including timeouts, surface as
/// [`DropflowError::Unreachable`]; error responses as
/// [`DropflowError::Remote`] carrying the remote error's kind.
///
/// # Example
///
/// ```no_run
/// use dropflow_manager::rpc::ManagerClient;
/// use std::time::Duration;
///
/// let nm = ManagerClient::new("nm-1", "http://nm-1:8000", Duration::from_secs(30))?;
/// # Ok::<(), dropflow_core::DropflowError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ManagerClient {
    /// Identity of the remote manager.
    name: String,
    /// Base URL of the remote manager.
    base_url: String,
    /// HTTP client.
    http: HttpClient,
}

impl ManagerClient {
    /// Create a client for the manager `name` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the HTTP client cannot
    /// be created.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DropflowError::Config {
                cause: format!("URL must start with http:// or https://, got: {base_url}"),
            });
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DropflowError::Config {
                cause: format!("HTTP client: {e}"),
            })?;

        Ok(Self {
            name: name.into(),
            base_url,
            http,
        })
    }

    /// Base URL of the remote manager.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path.
    fn url(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn session_url(&self, session_id: &SessionId, rest: &str) -> String {
        if rest.is_empty() {
            self.url(&format!("sessions/{session_id}"))
        } else {
            self.url(&format!("sessions/{session_id}/{rest}"))
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await.map_err(|e| self.unreachable(&e))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => DropflowError::Remote {
                subordinate: self.name.clone(),
                kind: parsed.error.kind,
                message: parsed.error.message,
            },
            Err(_) => DropflowError::Remote {
                subordinate: self.name.clone(),
                kind: ErrorKind::Remote,
                message: format!("HTTP {}: {body}", status.as_u16()),
            },
        })
    }

    /// Send and deserialize a JSON answer.
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.unreachable(&e)
            } else {
                DropflowError::Serialization {
                    cause: format!("response from {}: {e}", self.name),
                }
            }
        })
    }

    /// Send and discard the answer.
    async fn call_empty(&self, request: RequestBuilder) -> Result<()> {
        self.send(request).await.map(|_| ())
    }

    fn unreachable(&self, e: &reqwest::Error) -> DropflowError {
        DropflowError::Unreachable {
            subordinate: self.name.clone(),
            cause: e.to_string(),
        }
    }
}

impl DropManager for ManagerClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_session_ids(&self) -> ManagerFuture<'_, Vec<SessionId>> {
        Box::pin(async move { self.call(self.http.get(self.url("sessions"))).await })
    }

    fn create_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let body = CreateSessionRequest { session_id };
            self.call_empty(self.http.post(self.url("sessions")).json(&body))
                .await
        })
    }

    fn destroy_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            self.call_empty(self.http.delete(self.session_url(&session_id, "")))
                .await
        })
    }

    fn add_graph_spec(&self, session_id: SessionId, graph: GraphSpec) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let url = self.session_url(&session_id, "graph/append");
            self.call_empty(self.http.post(url).json(&graph)).await
        })
    }

    fn deploy_session(
        &self,
        session_id: SessionId,
        completed: Vec<Oid>,
    ) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let url = self.session_url(&session_id, "deploy");
            self.call_empty(self.http.post(url).json(&DeployRequest { completed }))
                .await
        })
    }

    fn cancel_session(&self, session_id: SessionId) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            self.call_empty(self.http.post(self.session_url(&session_id, "cancel")))
                .await
        })
    }

    fn get_session_status(
        &self,
        session_id: SessionId,
    ) -> ManagerFuture<'_, SessionStatusReport> {
        Box::pin(async move {
            self.call(self.http.get(self.session_url(&session_id, "status")))
                .await
        })
    }

    fn get_graph_status(&self, session_id: SessionId) -> ManagerFuture<'_, GraphStatus> {
        Box::pin(async move {
            self.call(self.http.get(self.session_url(&session_id, "graph/status")))
                .await
        })
    }

    fn get_graph(&self, session_id: SessionId) -> ManagerFuture<'_, GraphView> {
        Box::pin(async move {
            self.call(self.http.get(self.session_url(&session_id, "graph")))
                .await
        })
    }

    fn add_node_subscriptions(
        &self,
        session_id: SessionId,
        links: Vec<RemoteLink>,
    ) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let url = self.session_url(&session_id, "subscriptions");
            self.call_empty(self.http.post(url).json(&links)).await
        })
    }

    fn trigger_drops(&self, session_id: SessionId, oids: Vec<Oid>) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let url = self.session_url(&session_id, "trigger");
            self.call_empty(self.http.post(url).json(&TriggerRequest { oids }))
                .await
        })
    }

    fn deliver_event(&self, event: DropEvent) -> ManagerFuture<'_, ()> {
        Box::pin(async move {
            let url = self.session_url(&event.session_id, "events");
            self.call_empty(self.http.post(url).json(&event)).await
        })
    }

    fn info(&self) -> ManagerFuture<'_, ManagerInfo> {
        Box::pin(async move { self.call(self.http.get(self.url(""))).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> ManagerClient {
        ManagerClient::new("nm-1", url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_client_invalid_url() {
        let err = ManagerClient::new("nm-1", "nm-1:8000", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DropflowError::Config { .. }));
    }

    #[test]
    fn test_url_building() {
        let c = client("http://localhost:8000");
        assert_eq!(c.url("sessions"), "http://localhost:8000/api/sessions");
        assert_eq!(c.url("/sessions"), "http://localhost:8000/api/sessions");
        assert_eq!(
            c.session_url(&SessionId::new("s1"), "graph/status"),
            "http://localhost:8000/api/sessions/s1/graph/status"
        );
        assert_eq!(
            c.session_url(&SessionId::new("s1"), ""),
            "http://localhost:8000/api/sessions/s1"
        );
    }

    #[test]
    fn test_url_building_with_trailing_slash() {
        let c = client("http://localhost:8000/");
        assert_eq!(c.url("sessions"), "http://localhost:8000/api/sessions");
        assert_eq!(c.name(), "nm-1");
    }
}
