use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use gitward_core::{
    BodyFormat, Error, GitOpsRequest, ObjectKey, Operation, Orchestrator, parse_objects,
};
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::info;

use super::{ApiError, AppState, token};

#[derive(Debug, Deserialize)]
pub struct ApiPath {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenParams {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetParams {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub token: Option<String>,
}

pub async fn apply(
    State(state): State<AppState>,
    Path(path): Path<ApiPath>,
    Query(params): Query<TokenParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, String), ApiError> {
    submit(&state, &path, &params, &headers, &body, Operation::Apply).await
}

pub async fn delete(
    State(state): State<AppState>,
    Path(path): Path<ApiPath>,
    Query(params): Query<TokenParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, String), ApiError> {
    submit(&state, &path, &params, &headers, &body, Operation::Delete).await
}

async fn submit(
    state: &AppState,
    path: &ApiPath,
    params: &TokenParams,
    headers: &HeaderMap,
    body: &[u8],
    operation: Operation,
) -> Result<(StatusCode, String), ApiError> {
    let ws = &state.workspace;
    let api = ws.config.api(&path.namespace, &path.name)?;
    let presented = token::resolve(path.token.as_deref(), params.token.as_deref(), headers);
    ws.authorize(api, presented)?;

    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let objects = parse_objects(body, BodyFormat::from_content_type(content_type))?;
    let connector = ws.api_connector(api)?;
    let api = api.clone();
    let request = GitOpsRequest { operation, objects };

    // Clone, commit and push block, so the whole run leaves the async
    // workers. The pull request call is driven through the runtime handle.
    let runtime = Handle::current();
    let outcome = tokio::task::spawn_blocking(move || {
        runtime.block_on(Orchestrator::new(&connector, &api).run(&request))
    })
    .await
    .map_err(|e| ApiError::Task(e.to_string()))??;

    info!(api = %path.name, branch = %outcome.branch, "{outcome}");
    Ok((StatusCode::ACCEPTED, outcome.to_string()))
}

pub async fn get_object(
    State(state): State<AppState>,
    Path(path): Path<ApiPath>,
    Query(params): Query<GetParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let ws = &state.workspace;
    let api = ws.config.api(&path.namespace, &path.name)?.clone();
    let presented = token::resolve(path.token.as_deref(), params.token.as_deref(), &headers);
    ws.authorize(&api, presented)?;

    let key = ObjectKey::new(
        params.kind,
        params.namespace.unwrap_or(path.namespace),
        params.name,
    );
    let connector = ws.api_connector(&api)?;

    // Clone and search run on the blocking pool.
    let value = tokio::task::spawn_blocking(move || Orchestrator::new(&connector, &api).get(&key))
        .await
        .map_err(|e| ApiError::Task(e.to_string()))??;

    let wants_yaml = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("yaml"));

    if wants_yaml {
        let text = serde_yaml::to_string(&value).map_err(Error::from)?;
        Ok((
            [(CONTENT_TYPE, HeaderValue::from_static("application/yaml"))],
            text,
        )
            .into_response())
    } else {
        let json = serde_json::to_value(&value).map_err(Error::from)?;
        Ok(Json(json).into_response())
    }
}
