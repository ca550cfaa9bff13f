use std::{path::Path, sync::Arc};

use color_eyre::Result;
use todo_core::todos::{InMemoryTodoRepo, TodoRepository};
use todo_store::SqliteTodoRepo;
use tracing::{debug, info};

/// Pick the repository backing `todo serve`: SQLite when a file is given,
/// memory otherwise.
pub fn open_repo(database: Option<&Path>) -> Result<Arc<dyn TodoRepository>> {
    match database {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            info!(path = %path.display(), "opening sqlite todo store");
            let repo = SqliteTodoRepo::open(path)
                .map_err(|e| color_eyre::eyre::eyre!("opening {}: {e}", path.display()))?;
            Ok(Arc::new(repo))
        }
        None => {
            debug!("using in-memory todo store");
            Ok(Arc::new(InMemoryTodoRepo::new()))
        }
    }
}
