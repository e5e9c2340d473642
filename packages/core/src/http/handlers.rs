//! Route handlers and the central error-to-status mapping.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, SET_COOKIE};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Node, UserType};
use crate::services::{crypto, ServiceError, SessionRequest};

use super::server::AppState;
use super::session::{session_cookie, session_from_headers};

/// Service errors rendered as HTTP responses, in one place.
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotEnoughRights(_) => StatusCode::FORBIDDEN,
            ServiceError::EntityNotFound(_) | ServiceError::NotExists(_) => StatusCode::NOT_FOUND,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::InvalidSchema(_)
            | ServiceError::InvalidRequest(_)
            | ServiceError::NotValidIncomeData(_)
            | ServiceError::NotValidOperation(_)
            | ServiceError::EntityDefinition(_)
            | ServiceError::DuplicatedEntity(_)
            | ServiceError::UserValidation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Transmission(_)
            | ServiceError::Internal(_)
            | ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        debug!("request failed: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn developer(state: &AppState, headers: &HeaderMap) -> Result<(), ServiceError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServiceError::authentication("missing authorization"))?;
    state.users.authenticate_developer(authorization)?;
    Ok(())
}

fn session(state: &AppState, headers: &HeaderMap) -> Result<Node, ServiceError> {
    let credential = session_from_headers(headers)
        .ok_or_else(|| ServiceError::authentication("missing session"))?;
    state.users.authenticate(&credential)
}

// Context administration

pub async fn post_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Response> {
    developer(&state, &headers)?;
    let stored = state.schemas.post_context(&body)?;
    Ok(([("content-type", "application/json")], stored).into_response())
}

pub async fn get_contexts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<String>>> {
    developer(&state, &headers)?;
    Ok(Json(state.schemas.get_contexts()))
}

/// GET/PUT/DELETE/LINK/UNLINK dispatch for one context. LINK and UNLINK are
/// extension methods axum's method router does not cover, so the dispatch
/// mirrors the registry operations directly.
pub async fn context_item(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Response> {
    developer(&state, &headers)?;
    match method.as_str() {
        "GET" => {
            let stored = state.schemas.get_context(&uuid)?;
            Ok(([("content-type", "application/json")], stored).into_response())
        }
        "PUT" => {
            let parsed: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| ServiceError::invalid_request(e.to_string()))?;
            if parsed.get("uuid").and_then(|v| v.as_str()) != Some(uuid.as_str()) {
                return Err(ServiceError::invalid_request(
                    "Body uuid does not match the path.",
                )
                .into());
            }
            let stored = state.schemas.put_context(&body)?;
            Ok(([("content-type", "application/json")], stored).into_response())
        }
        "DELETE" => {
            state.schemas.delete_context(&uuid)?;
            Ok(StatusCode::OK.into_response())
        }
        "LINK" => {
            let link = link_header(&headers)?;
            state.schemas.link_context(&uuid, &link)?;
            Ok(StatusCode::OK.into_response())
        }
        "UNLINK" => {
            let link = link_header(&headers)?;
            state.schemas.unlink_context(&uuid, &link)?;
            Ok(StatusCode::OK.into_response())
        }
        _ => Ok((
            StatusCode::METHOD_NOT_ALLOWED,
            [("allow", "GET, PUT, DELETE, LINK, UNLINK")],
        )
            .into_response()),
    }
}

fn link_header(headers: &HeaderMap) -> Result<String, ServiceError> {
    headers
        .get("link")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ServiceError::invalid_request("Link header is not valid."))
}

pub async fn get_versions(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<String>>> {
    developer(&state, &headers)?;
    Ok(Json(state.schemas.get_linked_versions(&uuid)?))
}

pub async fn get_version(
    State(state): State<Arc<AppState>>,
    Path((uuid, version)): Path<(String, u32)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    developer(&state, &headers)?;
    let stored = if version == 0 {
        state.schemas.get_context(&uuid)?
    } else {
        state.schemas.get_linked_version(&uuid, version)?
    };
    Ok(([("content-type", "application/json")], stored).into_response())
}

// User administration

#[derive(Debug, Deserialize)]
pub struct PostUserBody {
    pub identifier: String,
    pub name: String,
    pub password: String,
    #[serde(rename = "type", default)]
    pub user_type: Option<String>,
}

pub async fn post_user(
    State(state): State<Arc<AppState>>,
    Path(ctx): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PostUserBody>,
) -> ApiResult<Json<serde_json::Value>> {
    developer(&state, &headers)?;
    let user_type = body
        .user_type
        .as_deref()
        .map(UserType::from_name)
        .unwrap_or(UserType::Internal);
    let user = state
        .users
        .save_user(&body.identifier, &body.name, &body.password, user_type, &ctx)?;
    Ok(Json(public_user(&user)))
}

pub async fn get_users(
    State(state): State<Arc<AppState>>,
    Path(ctx): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<serde_json::Value>>> {
    developer(&state, &headers)?;
    let users = state.users.get_users(&ctx)?;
    Ok(Json(users.iter().map(public_user).collect()))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path((ctx, uuid)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    developer(&state, &headers)?;
    let user = state.users.get_user(&uuid, &ctx)?;
    Ok(Json(public_user(&user)))
}

#[derive(Debug, Deserialize)]
pub struct PutUserBody {
    pub name: String,
    #[serde(default)]
    pub password: Option<String>,
}

pub async fn put_user(
    State(state): State<Arc<AppState>>,
    Path((ctx, uuid)): Path<(String, Uuid)>,
    headers: HeaderMap,
    Json(body): Json<PutUserBody>,
) -> ApiResult<Json<serde_json::Value>> {
    developer(&state, &headers)?;
    let user = state
        .users
        .update_user(&uuid, &body.name, body.password.as_deref(), &ctx)?;
    Ok(Json(public_user(&user)))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path((ctx, uuid)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    developer(&state, &headers)?;
    state.users.remove_user(&uuid, &ctx)?;
    Ok(StatusCode::OK)
}

/// The password hash and salt never leave the server.
fn public_user(user: &crate::models::User) -> serde_json::Value {
    json!({
        "uuid": user.uuid,
        "identifier": user.identifier,
        "name": user.name,
        "type": user.user_type,
    })
}

// Session lifecycle

#[derive(Debug, Deserialize)]
pub struct SignUpBody {
    pub name: String,
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub module: Option<Uuid>,
    #[serde(default)]
    pub node: Option<Uuid>,
    #[serde(default)]
    pub nodekey: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    #[serde(rename = "type", default)]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub jwt: Option<String>,
    #[serde(default)]
    pub module: Option<Uuid>,
    #[serde(default)]
    pub node: Option<Uuid>,
    #[serde(default)]
    pub nodekey: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
}

fn session_request(
    module: Option<Uuid>,
    node: Option<Uuid>,
    nodekey: Option<String>,
    version: Option<u32>,
) -> SessionRequest {
    SessionRequest {
        node_key: nodekey.unwrap_or_default(),
        node_uuid: node.unwrap_or_else(Uuid::new_v4),
        module: module.unwrap_or_else(Uuid::nil),
        version: version.unwrap_or(0),
    }
}

fn session_response(node: &Node) -> Response {
    let credential = format!("{}_{}", node.id, crypto::encode_key(&node.key));
    (
        [(SET_COOKIE, session_cookie(&credential))],
        Json(json!({ "sessionId": credential })),
    )
        .into_response()
}

pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    Path(ctx): Path<String>,
    Json(body): Json<SignUpBody>,
) -> ApiResult<Response> {
    let request = session_request(body.module, body.node, body.nodekey, body.version);
    let node = state
        .users
        .sign_up(&body.name, &body.identifier, &body.password, &request, &ctx)?;
    Ok(session_response(&node))
}

pub async fn sign_in(
    State(state): State<Arc<AppState>>,
    Path(ctx): Path<String>,
    Json(body): Json<SignInBody>,
) -> ApiResult<Response> {
    let request = session_request(body.module, body.node, body.nodekey, body.version);
    let node = match body.auth_type.as_deref().map(UserType::from_name) {
        Some(UserType::Google) => {
            let token = body
                .jwt
                .ok_or_else(|| ServiceError::invalid_request("Missing jwt."))?;
            state.users.sign_in_federated(&token, &request, &ctx)?
        }
        _ => {
            let identifier = body
                .identifier
                .ok_or_else(|| ServiceError::invalid_request("Missing identifier."))?;
            let password = body
                .password
                .ok_or_else(|| ServiceError::invalid_request("Missing password."))?;
            state.users.sign_in(&identifier, &password, &request, &ctx)?
        }
    };
    Ok(session_response(&node))
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let node = session(&state, &headers)?;
    state.users.sign_out(&node)?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct SignOffBody {
    pub password: String,
}

pub async fn sign_off(
    State(state): State<Arc<AppState>>,
    Path(ctx): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SignOffBody>,
) -> ApiResult<StatusCode> {
    let node = session(&state, &headers)?;
    state
        .users
        .sign_off(&node.user.identifier, &body.password, &ctx)?;
    Ok(StatusCode::OK)
}
