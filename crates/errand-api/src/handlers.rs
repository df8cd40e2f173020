//! Route handlers.
//!
//! Handlers run innermost in each pipeline: by the time one is called the
//! caller is authenticated, within quota and past any precondition check.
//! They only talk to the repository and render JSON.

use bytes::Bytes;
use errand_auth::{AuthResolver, TokenError};
use errand_core::{ErrandError, ErrandResult, Principal};
use errand_middleware::{PageRequest, Paginator, Response, ResponseExt};
use http::{header, HeaderValue, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::repository::TodoRepository;
use crate::router::{Operation, RouteMatch};
use crate::todo::{ResourceUrls, TodoId, TodoInput};

const ITEM_NOT_FOUND: &str = "item not found";

/// Shared state every handler reads.
pub struct AppState {
    /// Todo storage.
    pub todos: Arc<dyn TodoRepository>,
    /// Resolver whose signer issues tokens.
    pub resolver: AuthResolver,
    /// Page-size policy for collection fallbacks.
    pub paginator: Paginator,
    /// URL builder for representations and `Location`.
    pub urls: ResourceUrls,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("paginator", &self.paginator)
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}

/// Everything a handler may need from the request and its context.
#[derive(Debug, Clone)]
pub struct HandlerCall {
    /// The matched route.
    pub route: RouteMatch,
    /// Authenticated caller.
    pub principal: Option<Principal>,
    /// Page parameters, on collection routes.
    pub page: Option<PageRequest>,
    /// Raw request body.
    pub body: Bytes,
}

/// Runs the handler for `call.route` and renders any error.
pub async fn dispatch(state: &AppState, call: HandlerCall) -> Response {
    let result = match call.route.operation() {
        Operation::ListTodos => list_todos(state, call.page).await,
        Operation::GetTodo => get_todo(state, &call.route).await,
        Operation::CreateTodo => create_todo(state, call.principal.as_ref(), &call.body).await,
        Operation::UpdateTodo => {
            update_todo(state, &call.route, call.principal.as_ref(), &call.body).await
        }
        Operation::DeleteTodo => delete_todo(state, &call.route, call.principal.as_ref()).await,
        Operation::RequestToken => request_token(state, call.principal.as_ref()),
    };
    result.unwrap_or_else(|e| Response::error(&e))
}

fn todo_id(route: &RouteMatch) -> ErrandResult<TodoId> {
    route
        .param("id")
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ErrandError::not_found(ITEM_NOT_FOUND))
}

fn actor(principal: Option<&Principal>) -> String {
    principal.map_or_else(|| "-".to_string(), Principal::log_id)
}

async fn list_todos(state: &AppState, page: Option<PageRequest>) -> ErrandResult<Response> {
    let page = page.unwrap_or_else(|| {
        let base = format!("{}{}", state.urls.public_url(), state.urls.todos_path());
        state.paginator.request(None, base)
    });

    let urls: Vec<String> = state
        .todos
        .list()
        .await?
        .iter()
        .map(|todo| state.urls.todo(todo.id))
        .collect();

    let body = state.paginator.paginate(&urls, &page).into_body("urls");
    Ok(Response::json(StatusCode::OK, &body))
}

async fn get_todo(state: &AppState, route: &RouteMatch) -> ErrandResult<Response> {
    let id = todo_id(route)?;
    let todo = state
        .todos
        .get(id)
        .await?
        .ok_or_else(|| ErrandError::not_found(ITEM_NOT_FOUND))?;
    Ok(Response::json(StatusCode::OK, &todo.to_json(&state.urls)))
}

async fn create_todo(
    state: &AppState,
    principal: Option<&Principal>,
    body: &[u8],
) -> ErrandResult<Response> {
    let input = TodoInput::from_json(body)?;
    let todo = state.todos.create(input).await?;
    let location = state.urls.todo(todo.id);
    info!(principal = %actor(principal), todo_id = todo.id, "todo created");

    let mut response = Response::json(StatusCode::CREATED, &json!({}));
    if let Ok(value) = HeaderValue::from_str(&location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    Ok(response)
}

async fn update_todo(
    state: &AppState,
    route: &RouteMatch,
    principal: Option<&Principal>,
    body: &[u8],
) -> ErrandResult<Response> {
    let id = todo_id(route)?;
    if state.todos.get(id).await?.is_none() {
        return Err(ErrandError::not_found(ITEM_NOT_FOUND));
    }
    let input = TodoInput::from_json(body)?;
    state
        .todos
        .update(id, input)
        .await?
        .ok_or_else(|| ErrandError::not_found(ITEM_NOT_FOUND))?;
    info!(principal = %actor(principal), todo_id = id, "todo updated");
    Ok(Response::json(StatusCode::OK, &json!({})))
}

async fn delete_todo(
    state: &AppState,
    route: &RouteMatch,
    principal: Option<&Principal>,
) -> ErrandResult<Response> {
    let id = todo_id(route)?;
    if !state.todos.delete(id).await? {
        return Err(ErrandError::not_found(ITEM_NOT_FOUND));
    }
    info!(principal = %actor(principal), todo_id = id, "todo deleted");
    Ok(Response::json(StatusCode::OK, &json!({})))
}

fn request_token(state: &AppState, principal: Option<&Principal>) -> ErrandResult<Response> {
    let principal = principal.ok_or_else(|| ErrandError::unauthorized("unauthorized"))?;
    let issued = state.resolver.issue_token(principal).map_err(|e| {
        error!(principal = %principal.log_id(), error = %e, "token signing failed");
        signing_failure(e)
    })?;
    info!(principal = %principal.log_id(), "token issued");
    Ok(Response::json(StatusCode::OK, &issued))
}

fn signing_failure(error: TokenError) -> ErrandError {
    ErrandError::internal("token signing failed", error)
}
