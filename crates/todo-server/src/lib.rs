//! HTTP surface of the todo resource store.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use todo_core::todos::{NewTodo, RepoError, Todo, TodoRepository, TodoUpdate};
use tokio::net::TcpListener;
use tracing::{error, info};

type SharedRepo = Arc<dyn TodoRepository>;

/// Build the router over any repository implementation.
pub fn router(repo: SharedRepo) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/", get(list_todos).post(create_todo))
        .route(
            "/todos/:id",
            get(read_todo).put(update_todo).delete(delete_todo),
        )
        .route(
            "/todos/:id/",
            get(read_todo).put(update_todo).delete(delete_todo),
        )
        .with_state(repo)
}

/// Bind `addr` and serve until the process stops.
pub async fn serve(addr: SocketAddr, repo: SharedRepo) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, repo).await
}

/// Serve on an already bound listener (tests bind port 0 and read it back).
pub async fn serve_on(listener: TcpListener, repo: SharedRepo) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "todo store listening");
    axum::serve(listener, router(repo)).await?;
    Ok(())
}

struct ApiError(RepoError);

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            RepoError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                Json(json!({"detail": "Todo not found"})),
            )
                .into_response(),
            RepoError::Storage { reason } => {
                error!(%reason, "todo store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": reason})),
                )
                    .into_response()
            }
        }
    }
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Welcome to the TODO API",
        "status": "Todo API is running successfully",
        "documentation": "See /todos/ for the todo collection",
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: usize,
    limit: Option<usize>,
}

async fn list_todos(
    State(repo): State<SharedRepo>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Todo>>, ApiError> {
    Ok(Json(repo.list(params.skip, params.limit).await?))
}

async fn create_todo(
    State(repo): State<SharedRepo>,
    Json(body): Json<NewTodo>,
) -> Result<Json<Todo>, ApiError> {
    Ok(Json(repo.create(body).await?))
}

async fn read_todo(
    State(repo): State<SharedRepo>,
    Path(id): Path<i64>,
) -> Result<Json<Todo>, ApiError> {
    Ok(Json(repo.get(id).await?))
}

async fn update_todo(
    State(repo): State<SharedRepo>,
    Path(id): Path<i64>,
    Json(body): Json<TodoUpdate>,
) -> Result<Json<Todo>, ApiError> {
    Ok(Json(repo.update(id, body).await?))
}

async fn delete_todo(
    State(repo): State<SharedRepo>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    repo.delete(id).await?;
    Ok(Json(json!({"detail": "Todo deleted"})))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request},
    };
    use serde_json::Value;
    use todo_core::todos::InMemoryTodoRepo;
    use tower::ServiceExt;

    use super::*;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn app() -> Router {
        router(Arc::new(InMemoryTodoRepo::new()))
    }

    #[tokio::test]
    async fn crud_cycle_over_http() {
        let app = app();

        let (status, created) = send(
            &app,
            Method::POST,
            "/todos/",
            Some(json!({"title": "Test Todo", "description": "Test Description"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["title"], "Test Todo");
        assert_eq!(created["completed"], false);

        let (status, fetched) = send(&app, Method::GET, "/todos/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, updated) = send(
            &app,
            Method::PUT,
            "/todos/1/",
            Some(json!({"title": "Updated Todo", "description": "Updated Description"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Updated Todo");

        let (status, body) = send(&app, Method::DELETE, "/todos/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"detail": "Todo deleted"}));

        let (status, body) = send(&app, Method::GET, "/todos/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Todo not found"}));
    }

    #[tokio::test]
    async fn lists_with_paging() {
        let app = app();
        for title in ["a", "b", "c"] {
            send(&app, Method::POST, "/todos/", Some(json!({"title": title}))).await;
        }
        let (status, all) = send(&app, Method::GET, "/todos/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().map(Vec::len), Some(3));

        let (_, page) = send(&app, Method::GET, "/todos/?skip=1&limit=1", None).await;
        assert_eq!(page[0]["title"], "b");
        assert_eq!(page.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn missing_todo_is_404_for_update_and_delete() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::PUT,
            "/todos/9/",
            Some(json!({"title": "x", "description": "y"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, "/todos/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_body_without_title() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::POST,
            "/todos/",
            Some(json!({"description": "no title"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    struct BrokenRepo;

    #[async_trait]
    impl TodoRepository for BrokenRepo {
        async fn list(&self, _: usize, _: Option<usize>) -> Result<Vec<Todo>, RepoError> {
            Err(RepoError::Storage {
                reason: "disk on fire".into(),
            })
        }
        async fn get(&self, id: i64) -> Result<Todo, RepoError> {
            Err(RepoError::NotFound { id })
        }
        async fn create(&self, _: NewTodo) -> Result<Todo, RepoError> {
            Err(RepoError::Storage {
                reason: "read only".into(),
            })
        }
        async fn update(&self, id: i64, _: TodoUpdate) -> Result<Todo, RepoError> {
            Err(RepoError::NotFound { id })
        }
        async fn delete(&self, id: i64) -> Result<Todo, RepoError> {
            Err(RepoError::NotFound { id })
        }
    }

    #[tokio::test]
    async fn storage_failures_map_to_500() {
        let app = router(Arc::new(BrokenRepo));
        let (status, body) = send(&app, Method::GET, "/todos/", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"detail": "disk on fire"}));
    }
}
