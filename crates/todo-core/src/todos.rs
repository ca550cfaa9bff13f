use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

/// Todo entity as stored by the resource store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Todo {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// Payload for creating a todo. A missing description is stored as empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTodo {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: Some(description.into()),
        }
    }
}

/// Payload for updating a todo. Title and description are replaced;
/// `completed` is only touched when present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoUpdate {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TodoUpdate {
    /// Apply the update to an existing record.
    pub fn apply(self, todo: &mut Todo) {
        todo.title = self.title;
        todo.description = self.description.unwrap_or_default();
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
    }
}

/// Errors produced by todo repositories.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoError {
    /// No todo with the requested id.
    #[error("todo {id} not found")]
    NotFound { id: i64 },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Repository contract for todo persistence.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    /// List todos ordered by id, skipping `skip` and returning at most `limit`.
    async fn list(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Todo>, RepoError>;
    async fn get(&self, id: i64) -> Result<Todo, RepoError>;
    async fn create(&self, todo: NewTodo) -> Result<Todo, RepoError>;
    async fn update(&self, id: i64, update: TodoUpdate) -> Result<Todo, RepoError>;
    /// Remove a todo and return the removed record.
    async fn delete(&self, id: i64) -> Result<Todo, RepoError>;
}

#[derive(Debug)]
struct Arena {
    todos: BTreeMap<i64, Todo>,
    next_id: i64,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            todos: BTreeMap::new(),
            next_id: 1,
        }
    }
}

/// In-memory repository. Ids start at 1 and are never reused; the map and
/// the id counter share one lock.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTodoRepo {
    inner: Arc<Mutex<Arena>>,
}

impl InMemoryTodoRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_arena<T>(
        &self,
        f: impl FnOnce(&mut Arena) -> Result<T, RepoError>,
    ) -> Result<T, RepoError> {
        let mut arena = self.inner.lock().map_err(|err| RepoError::Storage {
            reason: format!("lock poisoned: {err}"),
        })?;
        f(&mut arena)
    }
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepo {
    #[instrument(skip(self))]
    async fn list(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Todo>, RepoError> {
        self.with_arena(|arena| {
            Ok(arena
                .todos
                .values()
                .skip(skip)
                .take(limit.unwrap_or(usize::MAX))
                .cloned()
                .collect())
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Todo, RepoError> {
        self.with_arena(|arena| {
            arena
                .todos
                .get(&id)
                .cloned()
                .ok_or(RepoError::NotFound { id })
        })
    }

    #[instrument(skip(self, todo))]
    async fn create(&self, todo: NewTodo) -> Result<Todo, RepoError> {
        self.with_arena(|arena| {
            let id = arena.next_id;
            arena.next_id += 1;
            let created = Todo {
                id,
                title: todo.title,
                description: todo.description.unwrap_or_default(),
                completed: false,
            };
            arena.todos.insert(id, created.clone());
            Ok(created)
        })
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: i64, update: TodoUpdate) -> Result<Todo, RepoError> {
        self.with_arena(|arena| {
            let todo = arena.todos.get_mut(&id).ok_or(RepoError::NotFound { id })?;
            update.apply(todo);
            Ok(todo.clone())
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<Todo, RepoError> {
        self.with_arena(|arena| {
            arena
                .todos
                .remove(&id)
                .ok_or(RepoError::NotFound { id })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_and_lists_todos() {
        let repo = InMemoryTodoRepo::new();
        let created = repo
            .create(NewTodo::new("Write docs", "MVP tasks"))
            .await
            .expect("create");
        assert_eq!(created.id, 1);
        assert!(!created.completed);

        let todos = repo.list(0, None).await.expect("list");
        assert_eq!(todos, vec![created]);
    }

    #[tokio::test]
    async fn missing_description_defaults_to_empty() {
        let repo = InMemoryTodoRepo::new();
        let created = repo
            .create(NewTodo {
                title: "Ship".into(),
                description: None,
            })
            .await
            .expect("create");
        assert_eq!(created.description, "");
    }

    #[tokio::test]
    async fn update_replaces_fields_and_keeps_completion_unless_given() {
        let repo = InMemoryTodoRepo::new();
        let created = repo.create(NewTodo::new("a", "b")).await.expect("create");

        let done = repo
            .update(
                created.id,
                TodoUpdate {
                    title: "a2".into(),
                    description: Some("b2".into()),
                    completed: Some(true),
                },
            )
            .await
            .expect("update");
        assert!(done.completed);

        let renamed = repo
            .update(
                created.id,
                TodoUpdate {
                    title: "a3".into(),
                    description: None,
                    completed: None,
                },
            )
            .await
            .expect("update");
        assert_eq!(renamed.title, "a3");
        assert_eq!(renamed.description, "");
        assert!(renamed.completed);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let repo = InMemoryTodoRepo::new();
        let first = repo.create(NewTodo::new("one", "")).await.expect("create");
        repo.delete(first.id).await.expect("delete");
        let second = repo.create(NewTodo::new("two", "")).await.expect("create");
        assert_eq!(second.id, 2);

        let err = repo.get(first.id).await.expect_err("deleted todo is gone");
        assert_eq!(err, RepoError::NotFound { id: 1 });
    }

    #[tokio::test]
    async fn list_applies_skip_and_limit() {
        let repo = InMemoryTodoRepo::new();
        for title in ["a", "b", "c", "d"] {
            repo.create(NewTodo::new(title, "")).await.expect("create");
        }
        let page = repo.list(1, Some(2)).await.expect("list");
        let titles: Vec<_> = page.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["b", "c"]);
    }

    #[tokio::test]
    async fn missing_ids_report_not_found() {
        let repo = InMemoryTodoRepo::new();
        assert!(matches!(
            repo.delete(42).await,
            Err(RepoError::NotFound { id: 42 })
        ));
        assert!(matches!(
            repo.update(
                42,
                TodoUpdate {
                    title: "x".into(),
                    description: None,
                    completed: None
                }
            )
            .await,
            Err(RepoError::NotFound { id: 42 })
        ));
    }
}
