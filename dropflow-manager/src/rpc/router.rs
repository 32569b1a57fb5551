//! Request routing.
//!
//! Maps `(method, path)` onto [`DropManager`] operations.

use super::API_PREFIX;
use super::error::ApiError;
use super::response;
use super::wire::{CreateSessionRequest, DeployRequest, TriggerRequest};
use crate::manager::{DropManager, RemoteLink};
use bytes::Bytes;
use dropflow_core::error::{DropflowError, Result};
use dropflow_core::event::DropEvent;
use dropflow_core::spec::GraphSpec;
use dropflow_core::types::SessionId;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Method, Request, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, warn};

type HttpResponse = Response<Full<Bytes>>;

/// Route an incoming request to `manager`.
pub async fn route<B>(
    req: Request<B>,
    manager: Arc<dyn DropManager>,
) -> std::result::Result<HttpResponse, Infallible>
where
    B: Body + Send,
    B::Data: Send,
    B::Error: Display,
{
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(method = %method, path = %path, "Routing request");

    let Some(path) = path.strip_prefix(API_PREFIX) else {
        return Ok(response::not_found());
    };

    let response = match (&method, path) {
        (&Method::GET, "" | "/") => respond(manager.info().await, response::ok),

        (&Method::GET, "/sessions") => respond(manager.get_session_ids().await, response::ok),
        (&Method::POST, "/sessions") => match read_json::<CreateSessionRequest, _>(req).await {
            Ok(body) => {
                let created = manager
                    .create_session(body.session_id.clone())
                    .await
                    .map(|()| body);
                respond(created, response::created)
            }
            Err(r) => r,
        },
        (_, "/sessions") => response::method_not_allowed(&["GET", "POST"]),

        (_, p) if p.starts_with("/sessions/") => route_session(req, manager, p).await,

        _ => response::not_found(),
    };

    Ok(response)
}

/// Route requests under /sessions/{id}/...
async fn route_session<B>(req: Request<B>, manager: Arc<dyn DropManager>, path: &str) -> HttpResponse
where
    B: Body + Send,
    B::Data: Send,
    B::Error: Display,
{
    let method = req.method().clone();

    // Parse /sessions/{id} or /sessions/{id}/...
    let path = path.strip_prefix("/sessions/").unwrap_or("");
    let (id, subpath) = match path.split_once('/') {
        Some((id, rest)) => (id, Some(rest)),
        None => (path, None),
    };
    if id.is_empty() {
        return response::not_found();
    }
    let session_id = SessionId::new(id);

    match (&method, subpath) {
        // DELETE /sessions/{id}
        (&Method::DELETE, None) => respond_empty(manager.destroy_session(session_id).await),
        (_, None) => response::method_not_allowed(&["DELETE"]),

        // GET /sessions/{id}/status
        (&Method::GET, Some("status")) => {
            respond(manager.get_session_status(session_id).await, response::ok)
        }

        // POST /sessions/{id}/graph/append
        (&Method::POST, Some("graph/append")) => {
            let graph = match read_json::<serde_json::Value, _>(req).await {
                Ok(value) => GraphSpec::from_value(value),
                Err(r) => return r,
            };
            match graph {
                Ok(graph) => respond_empty(manager.add_graph_spec(session_id, graph).await),
                Err(e) => error_response(e),
            }
        }

        // GET /sessions/{id}/graph
        (&Method::GET, Some("graph")) => respond(manager.get_graph(session_id).await, response::ok),

        // GET /sessions/{id}/graph/status
        (&Method::GET, Some("graph/status")) => {
            respond(manager.get_graph_status(session_id).await, response::ok)
        }

        // POST /sessions/{id}/deploy
        (&Method::POST, Some("deploy")) => match read_body(req).await {
            Ok(bytes) if bytes.is_empty() => {
                respond_empty(manager.deploy_session(session_id, Vec::new()).await)
            }
            Ok(bytes) => match serde_json::from_slice::<DeployRequest>(&bytes) {
                Ok(body) => respond_empty(manager.deploy_session(session_id, body.completed).await),
                Err(e) => ApiError::bad_request(format!("Invalid request body: {e}")).into_response(),
            },
            Err(r) => r,
        },

        // POST /sessions/{id}/cancel
        (&Method::POST, Some("cancel")) => respond_empty(manager.cancel_session(session_id).await),

        // POST /sessions/{id}/subscriptions
        (&Method::POST, Some("subscriptions")) => match read_json::<Vec<RemoteLink>, _>(req).await {
            Ok(links) => respond_empty(manager.add_node_subscriptions(session_id, links).await),
            Err(r) => r,
        },

        // POST /sessions/{id}/trigger
        (&Method::POST, Some("trigger")) => match read_json::<TriggerRequest, _>(req).await {
            Ok(body) => respond_empty(manager.trigger_drops(session_id, body.oids).await),
            Err(r) => r,
        },

        // POST /sessions/{id}/events
        (&Method::POST, Some("events")) => match read_json::<DropEvent, _>(req).await {
            Ok(event) if event.session_id != session_id => ApiError::bad_request(format!(
                "Event for session {} posted to session {session_id}",
                event.session_id
            ))
            .into_response(),
            Ok(event) => respond_empty(manager.deliver_event(event).await),
            Err(r) => r,
        },

        _ => response::not_found(),
    }
}

fn respond<T: Serialize>(result: Result<T>, ok: impl FnOnce(&T) -> HttpResponse) -> HttpResponse {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

fn respond_empty(result: Result<()>) -> HttpResponse {
    match result {
        Ok(()) => response::no_content(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: DropflowError) -> HttpResponse {
    warn!(code = err.code(), error = %err, "Request failed");
    ApiError::from(err).into_response()
}

async fn read_body<B>(req: Request<B>) -> std::result::Result<Bytes, HttpResponse>
where
    B: Body,
    B::Error: Display,
{
    req.into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| ApiError::bad_request(format!("Failed to read body: {e}")).into_response())
}

async fn read_json<T, B>(req: Request<B>) -> std::result::Result<T, HttpResponse>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: Display,
{
    let bytes = read_body(req).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::manager::NodeManager;
    use dropflow_core::dispatch::InlineDispatcher;
    use hyper::StatusCode;
    use serde_json::{Value, json};

    fn manager() -> Arc<dyn DropManager> {
        Arc::new(
            NodeManager::new("nm-1", ManagerConfig::default())
                .with_dispatcher(Arc::new(InlineDispatcher)),
        )
    }

    async fn call(
        manager: &Arc<dyn DropManager>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body)))
            .unwrap();
        let resp = route(req, Arc::clone(manager)).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn session_lifecycle_over_http() {
        let m = manager();
        let (status, body) = call(
            &m,
            Method::POST,
            "/api/sessions",
            Some(json!({"sessionId": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["sessionId"], "s1");

        let graph = json!([
            {"oid": "A", "categoryType": "Data", "dropclass": "memory", "node": "nm-1", "consumers": ["B"]},
            {"oid": "B", "categoryType": "Application", "dropclass": "copy", "node": "nm-1", "outputs": ["C"]},
            {"oid": "C", "categoryType": "Data", "dropclass": "memory", "node": "nm-1"}
        ]);
        let (status, _) = call(&m, Method::POST, "/api/sessions/s1/graph/append", Some(graph)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(
            &m,
            Method::POST,
            "/api/sessions/s1/deploy",
            Some(json!({"completed": ["A"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&m, Method::GET, "/api/sessions/s1/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("FINISHED"));

        let (_, body) = call(&m, Method::GET, "/api/sessions/s1/graph/status", None).await;
        assert_eq!(body["C"]["status"], "COMPLETED");
        assert_eq!(body["B"]["execStatus"], "FINISHED");

        let (_, body) = call(&m, Method::GET, "/api/sessions/s1/graph", None).await;
        assert_eq!(body["B"]["dropclass"], "copy");

        let (status, _) = call(&m, Method::DELETE, "/api/sessions/s1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, body) = call(&m, Method::GET, "/api/sessions", None).await;
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let m = manager();
        let (status, body) = call(&m, Method::GET, "/api/sessions/nope/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E203");
        assert_eq!(body["error"]["kind"], "state");

        call(&m, Method::POST, "/api/sessions", Some(json!({"sessionId": "s1"}))).await;
        let (status, body) = call(
            &m,
            Method::POST,
            "/api/sessions",
            Some(json!({"sessionId": "s1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "E204");

        let (status, _) = call(&m, Method::POST, "/api/sessions/s1/deploy", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let bad = json!([{"oid": "A", "categoryType": "Data", "dropclass": "memory", "node": "nm-2"}]);
        let (status, body) = call(&m, Method::POST, "/api/sessions/s1/graph/append", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "E104");

        let (status, _) = call(
            &m,
            Method::POST,
            "/api/sessions",
            Some(json!({"wrong": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_routes() {
        let m = manager();
        let (status, _) = call(&m, Method::GET, "/other", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&m, Method::PUT, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _) = call(&m, Method::GET, "/api/sessions/s1/nothing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&m, Method::GET, "/api", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "nm-1");
        assert_eq!(body["level"], "node");
    }
}
