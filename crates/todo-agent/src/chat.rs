use tracing::debug;

use crate::dispatcher::Dispatcher;

pub const FAREWELL: &str = "Goodbye! Thank you for using the Todo List Manager.";
pub const SHOW_INSTRUCTION: &str = "show - todo display all todos in a structured table format";

/// What a line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Exit,
    Dispatch(String),
}

/// Text-in, text-out entry point used by the CLI.
#[derive(Clone)]
pub struct ChatFacade {
    dispatcher: Dispatcher,
}

impl ChatFacade {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn interpret(input: &str) -> ChatCommand {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("exit") {
            ChatCommand::Exit
        } else if trimmed.eq_ignore_ascii_case("show") {
            ChatCommand::Dispatch(SHOW_INSTRUCTION.to_string())
        } else {
            ChatCommand::Dispatch(input.to_string())
        }
    }

    pub async fn chat(&self, input: &str) -> String {
        match Self::interpret(input) {
            ChatCommand::Exit => FAREWELL.to_string(),
            ChatCommand::Dispatch(instruction) => {
                debug!(len = instruction.len(), "forwarding to dispatcher");
                self.dispatcher.dispatch(&instruction).await
            }
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
