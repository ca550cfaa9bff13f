use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use todo_core::todos::{NewTodo, RepoError, Todo, TodoRepository, TodoUpdate};
use tracing::{debug, instrument};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS todos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT    NOT NULL,
    description TEXT    NOT NULL DEFAULT '',
    completed   INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_todos_title ON todos(title);
";

const SELECT_COLUMNS: &str = "SELECT id, title, description, completed FROM todos";

/// Todo repository persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteTodoRepo {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTodoRepo {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        debug!(?path, "opening sqlite todo store");
        let conn = Connection::open(path).map_err(storage)?;
        Self::with_connection(conn)
    }

    /// Private database that disappears with the repository.
    pub fn open_in_memory() -> Result<Self, RepoError> {
        Self::with_connection(Connection::open_in_memory().map_err(storage)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RepoError> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on tokio's blocking pool.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, RepoError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, RepoError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|err| RepoError::Storage {
                reason: format!("lock poisoned: {err}"),
            })?;
            f(&guard)
        })
        .await
        .map_err(|err| RepoError::Storage {
            reason: format!("sqlite task failed: {err}"),
        })?
    }
}

fn storage(err: rusqlite::Error) -> RepoError {
    RepoError::Storage {
        reason: err.to_string(),
    }
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
    })
}

fn fetch(conn: &Connection, id: i64) -> Result<Todo, RepoError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id],
        todo_from_row,
    )
    .optional()
    .map_err(storage)?
    .ok_or(RepoError::NotFound { id })
}

#[async_trait]
impl TodoRepository for SqliteTodoRepo {
    #[instrument(skip(self))]
    async fn list(&self, skip: usize, limit: Option<usize>) -> Result<Vec<Todo>, RepoError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |l| l as i64);
        self.run_blocking(move |conn| {
            let mut stmt = conn
                .prepare(&format!("{SELECT_COLUMNS} ORDER BY id LIMIT ?1 OFFSET ?2"))
                .map_err(storage)?;
            let rows = stmt
                .query_map(params![limit, skip as i64], todo_from_row)
                .map_err(storage)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(storage)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get(&self, id: i64) -> Result<Todo, RepoError> {
        self.run_blocking(move |conn| fetch(conn, id)).await
    }

    #[instrument(skip(self, todo))]
    async fn create(&self, todo: NewTodo) -> Result<Todo, RepoError> {
        self.run_blocking(move |conn| {
            conn.execute(
                "INSERT INTO todos (title, description) VALUES (?1, ?2)",
                params![todo.title, todo.description.unwrap_or_default()],
            )
            .map_err(storage)?;
            fetch(conn, conn.last_insert_rowid())
        })
        .await
    }

    #[instrument(skip(self, update))]
    async fn update(&self, id: i64, update: TodoUpdate) -> Result<Todo, RepoError> {
        self.run_blocking(move |conn| {
            let changed = conn
                .execute(
                    "UPDATE todos
                     SET title = ?1, description = ?2, completed = COALESCE(?3, completed)
                     WHERE id = ?4",
                    params![
                        update.title,
                        update.description.unwrap_or_default(),
                        update.completed,
                        id
                    ],
                )
                .map_err(storage)?;
            if changed == 0 {
                return Err(RepoError::NotFound { id });
            }
            fetch(conn, id)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<Todo, RepoError> {
        self.run_blocking(move |conn| {
            let existing = fetch(conn, id)?;
            conn.execute("DELETE FROM todos WHERE id = ?1", params![id])
                .map_err(storage)?;
            Ok(existing)
        })
        .await
    }
}
