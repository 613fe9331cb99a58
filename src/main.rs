use chat_stream::init::{config_from_env, init_logging};
use chat_stream::types::Language;
use chat_stream::{ChatMessageParams, ChatStreamSession, ErrorCode, SessionUpdate, Submission};
use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    log::info!("🚀 Starting chat stream client...");

    let config = config_from_env()?;
    let language = config.language;
    let mut session = ChatStreamSession::with_http(config)?;

    // One-shot mode: the prompt is on the command line.
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        ask(&mut session, args.join(" ")).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    show_prompt()?;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else { break };

        match line.trim() {
            "" => {}
            "/quit" => break,
            "/reset" => {
                session.reset_messages();
                println!("(transcript cleared)");
            }
            "/history" => print_history(&session, language),
            text => match text.strip_prefix("/once ") {
                Some(prompt) => ask_once(&mut session, prompt.to_string()).await,
                None => ask(&mut session, text.to_string()).await?,
            },
        }
        show_prompt()?;
    }

    log::info!("👋 Bye");
    Ok(())
}

async fn ask(session: &mut ChatStreamSession, text: String) -> chat_stream::Result<()> {
    match session.submit_prompt(vec![ChatMessageParams::user(text)])? {
        Submission::Accepted { request_id } => log::debug!("[{}] streaming", request_id),
        Submission::Rejected(reason) => {
            println!("(rejected: {:?})", reason);
            return Ok(());
        }
    }

    // Ctrl-C aborts the reply instead of the process.
    let mut cancel = session.cancel_handle();
    let mut stdout = std::io::stdout();
    {
        let mut updates = std::pin::pin!(session.updates());
        let mut ctrl_c = std::pin::pin!(tokio::signal::ctrl_c());
        loop {
            let update = tokio::select! {
                update = updates.next() => update,
                _ = &mut ctrl_c, if cancel.is_some() => {
                    if let Some(cancel) = cancel.take() {
                        cancel.cancel();
                    }
                    continue;
                }
            };
            let Some(update) = update else { break };

            match update {
                SessionUpdate::Delta { content, .. } => {
                    print!("{}", content);
                    stdout.flush()?;
                }
                SessionUpdate::Aborted => println!("\n(cancelled)"),
                SessionUpdate::Finalized(reply) => println!(
                    "\n({}, {} tokens)",
                    reply.meta.response_time,
                    reply.token_count()
                ),
                _ => {}
            }
        }
    }

    match session.last_error() {
        Some(error) if error.code != ErrorCode::Cancelled => eprintln!("error: {}", error),
        _ => {}
    }
    Ok(())
}

/// Non-streaming request; the reply is printed once it is complete.
async fn ask_once(session: &mut ChatStreamSession, text: String) {
    match session.submit_completion(vec![ChatMessageParams::user(text)]).await {
        Ok(Submission::Accepted { .. }) => {
            if let Some(reply) = session.transcript().last() {
                println!("{}\n({})", reply.content, reply.meta.response_time);
            }
        }
        Ok(Submission::Rejected(reason)) => println!("(rejected: {:?})", reason),
        Err(error) => eprintln!("error: {}", error),
    }
}

fn print_history(session: &ChatStreamSession, language: Language) {
    for message in session.messages() {
        println!(
            "[{}] {}: {}",
            message.formatted_timestamp(language),
            message.role,
            message.content
        );
    }
}

fn show_prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}
