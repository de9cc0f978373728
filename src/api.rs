//! GraphQL client for the project-hosting API.
//!
//! Blocking reqwest client, called from worker threads only. Two
//! operations: `me` (token check) and `projects` (project + service list).

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::RemoteProject;

pub const DEFAULT_ENDPOINT: &str = "https://api.zeabur.com/graphql";

const ME_QUERY: &str = "query { me { _id username name } }";
const PROJECTS_QUERY: &str =
    "query { projects { edges { node { _id name services { _id name status } } } } }";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated, run `zeal login <token>` first")]
    NotAuthenticated,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("server error: {0}")]
    Server(String),
    #[error("could not decode server response")]
    Decode,
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
}

/// The two remote operations, behind a trait so the project provider can
/// be exercised without a network.
pub trait GraphApi: Send + Sync {
    fn me(&self, token: &str) -> Result<User, ApiError>;
    fn projects(&self, token: &str) -> Result<Vec<RemoteProject>, ApiError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorsOnly {
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeData {
    me: User,
}

#[derive(Debug, Deserialize)]
struct ProjectsData {
    projects: Connection,
}

#[derive(Debug, Deserialize)]
struct Connection {
    edges: Vec<Edge>,
}

#[derive(Debug, Deserialize)]
struct Edge {
    node: RemoteProject,
}

/// Turns an HTTP status and body into typed data or a typed failure.
/// A GraphQL `errors` array wins over any `data` that came with it.
fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, ApiError> {
    let errors = serde_json::from_str::<ErrorsOnly>(body).ok();
    let message = errors
        .as_ref()
        .and_then(|e| e.errors.first())
        .map(|e| e.message.clone().unwrap_or_else(|| "unknown error".to_string()));

    match status {
        200 => {}
        401 | 403 => return Err(ApiError::InvalidCredentials),
        code => return Err(ApiError::Server(message.unwrap_or_else(|| format!("HTTP {code}")))),
    }

    if let Some(message) = message {
        return Err(ApiError::Server(message));
    }

    serde_json::from_str::<Envelope<T>>(body)
        .map(|envelope| envelope.data)
        .map_err(|_| ApiError::Decode)
}

pub struct ApiClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl ApiClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("zeal/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    fn query<T: DeserializeOwned>(&self, token: &str, query: &str) -> Result<T, ApiError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().map_err(|e| ApiError::Network(e.to_string()))?;
        debug!("API responded {} ({} bytes)", status, body.len());
        decode_response(status, &body)
    }
}

impl GraphApi for ApiClient {
    fn me(&self, token: &str) -> Result<User, ApiError> {
        self.query::<MeData>(token, ME_QUERY).map(|d| d.me)
    }

    fn projects(&self, token: &str) -> Result<Vec<RemoteProject>, ApiError> {
        self.query::<ProjectsData>(token, PROJECTS_QUERY)
            .map(|d| d.projects.edges.into_iter().map(|e| e.node).collect())
    }
}
