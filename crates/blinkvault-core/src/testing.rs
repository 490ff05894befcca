//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use reqwest::{Method, StatusCode};

use crate::api::{ApiError, ApiRequest, ApiResponse, FileUpload, Transport};
use crate::auth::{MemoryTokenStore, SessionManager};

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
    pub upload: Option<FileUpload>,
}

enum Scripted {
    Reply(u16, String),
    Fail,
}

/// Replies are queued per path and consumed in order; an unscripted path
/// answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, path: &str, status: u16, body: serde_json::Value) -> Self {
        self.push(path, Scripted::Reply(status, body.to_string()));
        self
    }

    pub fn reply_raw(self, path: &str, status: u16, body: &str) -> Self {
        self.push(path, Scripted::Reply(status, body.to_string()));
        self
    }

    pub fn fail(self, path: &str) -> Self {
        self.push(path, Scripted::Fail);
        self
    }

    fn push(&self, path: &str, scripted: Scripted) {
        self.replies
            .lock()
            .expect("replies lock")
            .entry(path.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, path: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.path == path).collect()
    }
}

impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.calls.lock().expect("calls lock").push(Call {
            method: request.method.clone(),
            path: request.path.clone(),
            bearer: bearer.map(str::to_string),
            body: request.body.clone(),
            upload: request.upload.clone(),
        });

        let next = self
            .replies
            .lock()
            .expect("replies lock")
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Scripted::Reply(status, body)) => Ok(ApiResponse::new(
                StatusCode::from_u16(status).expect("valid status"),
                body,
            )),
            Some(Scripted::Fail) => Err(ApiError::ServerError("connection reset".to_string())),
            None => Ok(ApiResponse::new(StatusCode::NOT_FOUND, "")),
        }
    }
}

/// A session over an in-memory store, optionally pre-seeded with a token.
pub fn session_with(token: Option<&str>) -> (Arc<SessionManager>, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new(token.map(str::to_string)));
    let session = Arc::new(SessionManager::new(store.clone()));
    (session, store)
}

pub fn user_json(id: &str, username: &str, role: &str) -> serde_json::Value {
    serde_json::json!({ "_id": id, "username": username, "role": role })
}
