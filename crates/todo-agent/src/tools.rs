use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use thiserror::Error;
use todo_core::{
    agent::{ToolCall, ToolDefinition},
    todos::{NewTodo, Todo, TodoUpdate},
};
use tracing::instrument;

use crate::error::AgentError;

/// Where the resource store listens unless configured otherwise.
pub const DEFAULT_RESOURCE_URL: &str = "http://127.0.0.1:8000";

/// Errors raised while talking to the resource store.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Store answered with an unexpected status.
    #[error("Failed to {action}: {status}")]
    Status {
        action: &'static str,
        status: StatusCode,
    },
    /// Transport or decoding failure.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Thin HTTP client over the resource store's `/todos/` endpoints.
#[derive(Debug, Clone)]
pub struct TodoClient {
    http: Client,
    base_url: String,
}

impl TodoClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn list_todos(&self) -> Result<Vec<Todo>, ToolError> {
        let resp = self.http.get(self.url("/todos/")).send().await?;
        expect_success(resp.status(), "retrieve todos")?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn get_todo(&self, todo_id: i64) -> Result<Todo, ToolError> {
        let resp = self
            .http
            .get(self.url(&format!("/todos/{todo_id}")))
            .send()
            .await?;
        expect_success(resp.status(), "retrieve todo")?;
        Ok(resp.json().await?)
    }

    /// A missing todo is reported in the message rather than as an error.
    #[instrument(skip(self), fields(base = %self.base_url))]
    pub async fn delete_todo(&self, todo_id: i64) -> Result<String, ToolError> {
        let resp = self
            .http
            .delete(self.url(&format!("/todos/{todo_id}")))
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok("Todo not found".to_string()),
            status => {
                expect_success(status, "delete todo")?;
                Ok("Todo deleted successfully".to_string())
            }
        }
    }

    #[instrument(skip(self, todo), fields(base = %self.base_url))]
    pub async fn add_todo(&self, todo: &NewTodo) -> Result<String, ToolError> {
        let resp = self
            .http
            .post(self.url("/todos/"))
            .json(todo)
            .send()
            .await?;
        expect_success(resp.status(), "add todo")?;
        Ok("Todo added successfully".to_string())
    }

    #[instrument(skip(self, update), fields(base = %self.base_url))]
    pub async fn update_todo(
        &self,
        todo_id: i64,
        update: &TodoUpdate,
    ) -> Result<String, ToolError> {
        let resp = self
            .http
            .put(self.url(&format!("/todos/{todo_id}/")))
            .json(update)
            .send()
            .await?;
        expect_success(resp.status(), "update todo")?;
        Ok("Todo updated successfully".to_string())
    }
}

fn expect_success(status: StatusCode, action: &'static str) -> Result<(), ToolError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ToolError::Status { action, status })
    }
}

/// The tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoTool {
    ListTodos,
    GetTodo,
    DeleteTodo,
    AddTodo,
    UpdateTodo,
}

impl TodoTool {
    pub const ALL: [TodoTool; 5] = [
        TodoTool::ListTodos,
        TodoTool::GetTodo,
        TodoTool::DeleteTodo,
        TodoTool::AddTodo,
        TodoTool::UpdateTodo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TodoTool::ListTodos => "list_todos",
            TodoTool::GetTodo => "get_todo",
            TodoTool::DeleteTodo => "delete_todo",
            TodoTool::AddTodo => "add_todo",
            TodoTool::UpdateTodo => "update_todo",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn definition(self) -> ToolDefinition {
        let (description, parameters) = match self {
            TodoTool::ListTodos => (
                "Retrieves the list of all todo items.",
                json!({"type": "object", "properties": {}}),
            ),
            TodoTool::GetTodo => (
                "Retrieves a single todo item by its id.",
                json!({
                    "type": "object",
                    "properties": {
                        "todo_id": {"type": "integer", "description": "The id of the todo item."}
                    },
                    "required": ["todo_id"]
                }),
            ),
            TodoTool::DeleteTodo => (
                "Deletes a todo item by its id.",
                json!({
                    "type": "object",
                    "properties": {
                        "todo_id": {"type": "integer", "description": "The id of the todo item to delete."}
                    },
                    "required": ["todo_id"]
                }),
            ),
            TodoTool::AddTodo => (
                "Adds a new todo item.",
                json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string", "description": "The title of the todo item."},
                        "description": {"type": "string", "description": "The description of the todo item."}
                    },
                    "required": ["title"]
                }),
            ),
            TodoTool::UpdateTodo => (
                "Updates the title and description of a todo item by its id, optionally marking it completed.",
                json!({
                    "type": "object",
                    "properties": {
                        "todo_id": {"type": "integer", "description": "The id of the todo item to update."},
                        "title": {"type": "string", "description": "The new title."},
                        "description": {"type": "string", "description": "The new description."},
                        "completed": {"type": "boolean", "description": "Whether the todo is done."}
                    },
                    "required": ["todo_id", "title", "description"]
                }),
            ),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TodoIdArgs {
    todo_id: i64,
}

#[derive(Debug, Deserialize)]
struct AddTodoArgs {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct UpdateTodoArgs {
    todo_id: i64,
    title: String,
    description: String,
    #[serde(default)]
    completed: Option<bool>,
}

/// Set of tools offered to the model for one session.
#[async_trait]
pub trait Toolbox: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool call and return its JSON result.
    async fn invoke(&self, call: &ToolCall) -> Result<Value, AgentError>;
}

/// The five todo tools backed by a [`TodoClient`].
#[derive(Debug, Clone)]
pub struct TodoToolbox {
    client: TodoClient,
}

impl TodoToolbox {
    pub fn new(client: TodoClient) -> Self {
        Self { client }
    }
}

fn decode<T: DeserializeOwned>(call: &ToolCall) -> Result<T, AgentError> {
    // Providers send `{}` or nothing at all for parameterless calls.
    let args = if call.arguments.is_null() {
        json!({})
    } else {
        call.arguments.clone()
    };
    serde_json::from_value(args).map_err(|source| AgentError::InvalidArguments {
        name: call.name.clone(),
        source,
    })
}

#[async_trait]
impl Toolbox for TodoToolbox {
    fn definitions(&self) -> Vec<ToolDefinition> {
        TodoTool::ALL.into_iter().map(TodoTool::definition).collect()
    }

    #[instrument(skip(self, call), fields(tool = %call.name))]
    async fn invoke(&self, call: &ToolCall) -> Result<Value, AgentError> {
        let tool = TodoTool::from_name(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;
        let failed = |source| AgentError::Tool {
            name: call.name.clone(),
            source,
        };

        let output = match tool {
            TodoTool::ListTodos => json!(self.client.list_todos().await.map_err(failed)?),
            TodoTool::GetTodo => {
                let args: TodoIdArgs = decode(call)?;
                json!(self.client.get_todo(args.todo_id).await.map_err(failed)?)
            }
            TodoTool::DeleteTodo => {
                let args: TodoIdArgs = decode(call)?;
                json!(self.client.delete_todo(args.todo_id).await.map_err(failed)?)
            }
            TodoTool::AddTodo => {
                let args: AddTodoArgs = decode(call)?;
                let todo = NewTodo::new(args.title, args.description);
                json!(self.client.add_todo(&todo).await.map_err(failed)?)
            }
            TodoTool::UpdateTodo => {
                let args: UpdateTodoArgs = decode(call)?;
                let update = TodoUpdate {
                    title: args.title,
                    description: Some(args.description),
                    completed: args.completed,
                };
                json!(self
                    .client
                    .update_todo(args.todo_id, &update)
                    .await
                    .map_err(failed)?)
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_round_trip() {
        for tool in TodoTool::ALL {
            assert_eq!(TodoTool::from_name(tool.name()), Some(tool));
        }
        assert_eq!(TodoTool::from_name("drop_table"), None);
    }

    #[test]
    fn definitions_declare_required_parameters() {
        let toolbox = TodoToolbox::new(TodoClient::new(DEFAULT_RESOURCE_URL));
        let defs = toolbox.definitions();
        assert_eq!(defs.len(), 5);
        let update = defs
            .iter()
            .find(|d| d.name == "update_todo")
            .expect("update_todo declared");
        assert_eq!(
            update.parameters["required"],
            json!(["todo_id", "title", "description"])
        );
    }

    #[test]
    fn status_error_embeds_code() {
        let err = ToolError::Status {
            action: "retrieve todos",
            status: StatusCode::INTERNAL_SERVER_ERROR,
        };
        assert_eq!(
            err.to_string(),
            "Failed to retrieve todos: 500 Internal Server Error"
        );
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = TodoClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_rejected() {
        let toolbox = TodoToolbox::new(TodoClient::new(DEFAULT_RESOURCE_URL));

        let err = toolbox
            .invoke(&ToolCall::new("c1", "drop_table", json!({})))
            .await
            .expect_err("unknown tool");
        assert!(matches!(err, AgentError::UnknownTool(name) if name == "drop_table"));

        let err = toolbox
            .invoke(&ToolCall::new("c2", "get_todo", json!({"todo_id": "seven"})))
            .await
            .expect_err("bad args");
        assert!(matches!(err, AgentError::InvalidArguments { ref name, .. } if name == "get_todo"));
    }

    #[tokio::test]
    async fn update_without_description_is_rejected_before_any_request() {
        // Port 9 is never listening; a decode failure must come first.
        let toolbox = TodoToolbox::new(TodoClient::new("http://127.0.0.1:9"));

        let err = toolbox
            .invoke(&ToolCall::new(
                "c1",
                "update_todo",
                json!({"todo_id": 1, "title": "T2"}),
            ))
            .await
            .expect_err("description is required");
        assert!(
            matches!(err, AgentError::InvalidArguments { ref name, .. } if name == "update_todo"),
            "{err}"
        );
        assert!(err.to_string().contains("description"), "{err}");
    }
}
