//! Agent side of the todo assistant: the model client, the rate-limited
//! dispatcher that lets the model drive the todo tools, and the chat façade.

pub mod chat;
pub mod dispatcher;
pub mod error;
pub mod openrouter;
pub mod rate_limit;
pub mod tools;

pub use chat::{ChatCommand, ChatFacade};
pub use dispatcher::Dispatcher;
pub use error::AgentError;
