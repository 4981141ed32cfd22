//! Scripted in-memory transport for tests.
//!
//! Responses are queued per `(method, path)`. Each call pops the next
//! queued response; the last one keeps answering once the queue is down to
//! a single entry. Every request is recorded so tests can assert call
//! counts and the exact IDs sent.

#![allow(clippy::missing_panics_doc)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use brickwork_core::{BearerToken, Error, Result};

use crate::transport::{ApiRequest, ApiResponse, Method, Transport, WorkspaceClient};

enum Scripted {
    Respond(ApiResponse),
    Fail(String),
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// HTTP method.
    pub method: Method,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Value>,
    /// Raw bearer token used.
    pub token: String,
}

impl RecordedCall {
    /// Returns the value of a query parameter.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that answers from a script and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    /// Creates an empty script. Unscripted routes answer 404.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a JSON response.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.push(method, path, Scripted::Respond(ApiResponse::new(status, body.to_string())))
    }

    /// Queues a raw text response.
    pub fn respond_text(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.push(method, path, Scripted::Respond(ApiResponse::new(status, body)))
    }

    /// Queues a transport failure (no response).
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.push(method, path, Scripted::Fail(message.to_string()))
    }

    fn push(&self, method: Method, path: &str, entry: Scripted) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(entry);
        self
    }

    /// Returns every recorded call in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the recorded calls for one route.
    #[must_use]
    pub fn calls_to(&self, method: Method, path: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    /// Counts the recorded calls for one route.
    #[must_use]
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls_to(method, path).len()
    }

    /// Builds a [`WorkspaceClient`] over this transport.
    #[must_use]
    pub fn client(self: &Arc<Self>, token: &str) -> WorkspaceClient {
        let transport: Arc<dyn Transport> = Arc::clone(self) as Arc<dyn Transport>;
        WorkspaceClient::with_transport(transport, BearerToken::new(token))
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                method: request.method,
                path: request.path.clone(),
                query: request.query.clone(),
                body: request.body.clone(),
                token: request.token.expose().to_string(),
            });

        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = routes.get_mut(&(request.method, request.path.clone())) else {
            return Ok(ApiResponse::new(
                404,
                r#"{"error_code":"ENDPOINT_NOT_FOUND","message":"unscripted route"}"#,
            ));
        };

        let entry = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().map(|e| match e {
                Scripted::Respond(r) => Scripted::Respond(r.clone()),
                Scripted::Fail(m) => Scripted::Fail(m.clone()),
            })
        };

        match entry {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(Error::Transport {
                message,
                source: None,
            }),
            None => Ok(ApiResponse::new(404, "")),
        }
    }
}
