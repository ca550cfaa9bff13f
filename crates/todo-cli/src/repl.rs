use color_eyre::Result;
use todo_agent::{ChatCommand, ChatFacade};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

const BANNER: &str = "Todo List Manager. Type `show` to list your todos or `exit` to quit.";
const PROMPT: &str = "> ";

/// Interactive loop on stdin/stdout.
pub async fn run(facade: &ChatFacade) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run_with(facade, stdin, stdout).await
}

/// Read lines until `exit` or end of input, printing each reply.
pub async fn run_with<R, W>(facade: &ChatFacade, input: R, mut output: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(format!("{BANNER}\n").as_bytes()).await?;
    let mut lines = input.lines();
    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            output.write_all(b"\n").await?;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = facade.chat(&line).await;
        output.write_all(format!("{reply}\n").as_bytes()).await?;
        if ChatFacade::interpret(&line) == ChatCommand::Exit {
            break;
        }
    }
    output.flush().await?;
    Ok(())
}
