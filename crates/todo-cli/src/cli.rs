use std::{net::SocketAddr, path::PathBuf};

use clap::{Parser, Subcommand};

/// Command line for the todo assistant.
#[derive(Parser, Debug)]
#[command(
    name = "todo",
    about = "Manage a todo list by talking to an LLM agent",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to the interactive chat when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Chat with the assistant (type `exit` or press Ctrl-D to leave).
    Chat,
    /// Send a single instruction and print the reply.
    Ask {
        /// Instruction text, e.g. `todo ask add milk to my list`.
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Run the todo resource store over HTTP.
    Serve {
        /// Address to listen on; overrides the config file.
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// SQLite file to persist todos in; in-memory when omitted.
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Print version and exit.
    Version,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_chat_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["todo"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_ask_with_multiple_words() {
        let cli = Cli::try_parse_from(["todo", "ask", "add", "buy", "milk"])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Ask {
                prompt: vec!["add".into(), "buy".into(), "milk".into()]
            })
        );
    }

    #[test]
    fn ask_requires_a_prompt() {
        assert!(Cli::try_parse_from(["todo", "ask"]).is_err());
    }

    #[test]
    fn parses_serve_flags() {
        let cli = Cli::try_parse_from([
            "todo",
            "serve",
            "--bind",
            "0.0.0.0:9000",
            "--database",
            "/tmp/todos.db",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Some(Command::Serve {
                bind: Some("0.0.0.0:9000".parse().expect("addr")),
                database: Some(PathBuf::from("/tmp/todos.db")),
            })
        );
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["todo", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }
}
