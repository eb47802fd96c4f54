use crate::agent::{ MuminAgent, Rejection, SendOutcome };
use crate::reveal::{ RevealEvent, RevealHandle };

use futures::{ Future, StreamExt };
use log::{ error, info };
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, BufReader, Lines };

const ALERT_TITLE: &str = "Hata";
const ALERT_RETRY: &str = "Lütfen tekrar deneyin.";
const LOADING_TEXT: &str = "Yanıtlanıyor...";

enum Command<'a> {
    Quit,
    Reset,
    Ask(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    match line.trim() {
        "/quit" | "/exit" => Command::Quit,
        "/reset" => Command::Reset,
        _ => Command::Ask(line),
    }
}

fn prompt_marker() -> std::io::Result<()> {
    let mut out = std::io::stdout();
    write!(out, "> ")?;
    out.flush()
}

/// Renders a reveal as it happens. Ctrl-C stops the reveal, not the program.
async fn render_reveal(mut handle: RevealHandle) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut out = std::io::stdout();
    write!(out, "Mümin: ")?;
    out.flush()?;

    if let Some(mut events) = handle.take_events() {
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(RevealEvent::Tick { grapheme, .. }) => {
                        write!(out, "{}", grapheme)?;
                        out.flush()?;
                    }
                    Some(RevealEvent::Finished { .. }) => {
                        writeln!(out)?;
                        break;
                    }
                    Some(RevealEvent::Cancelled) => {
                        writeln!(out, " [durduruldu]")?;
                        break;
                    }
                    None => break,
                },
                _ = ctrl_c() => {
                    handle.cancel();
                }
            }
        }
    }

    let outcome = handle.wait().await;
    info!("Reveal ended: {:?}", outcome);
    Ok(())
}

/// Next input line, or `None` on EOF or when `interrupt` fires first.
async fn read_line<R, I>(lines: &mut Lines<R>, interrupt: I) -> std::io::Result<Option<String>>
    where R: AsyncBufRead + Unpin, I: Future<Output = ()>
{
    tokio::select! {
        biased;
        _ = interrupt => Ok(None),
        line = lines.next_line() => line,
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        futures::future::pending::<()>().await;
    }
}

/// Interactive chat on stdin/stdout until EOF, `/quit` or Ctrl-C at the
/// prompt. Ctrl-C while a reply is pending cancels that turn only.
pub async fn run_console(agent: &MuminAgent, bubble: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", bubble);
    println!("(/reset yeni sohbet, /quit çıkış)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt_marker()?;

    while let Some(line) = read_line(&mut lines, ctrl_c()).await? {
        match parse_command(&line) {
            Command::Quit => {
                break;
            }
            Command::Reset => {
                agent.reset().await?;
                println!("Yeni sohbet başlatıldı.");
            }
            Command::Ask(text) => {
                let send = agent.send(text);
                tokio::pin!(send);
                let finished = tokio::select! {
                    sent = &mut send => Some(sent),
                    _ = ctrl_c() => None,
                };
                let sent = match finished {
                    Some(sent) => sent,
                    None => {
                        agent.shutdown();
                        send.await
                    }
                };
                match sent {
                    Ok(SendOutcome::Started(handle)) => render_reveal(handle).await?,
                    Ok(SendOutcome::Cancelled) => println!("[durduruldu]"),
                    Ok(SendOutcome::Rejected(Rejection::EmptyInput)) => {}
                    Ok(SendOutcome::Rejected(Rejection::Busy)) => println!("{}", LOADING_TEXT),
                    Err(e) => {
                        error!("Turn failed: {}", e);
                        println!("{}: {} {}", ALERT_TITLE, e.user_message(), ALERT_RETRY);
                    }
                }
            }
        }
        prompt_marker()?;
    }

    agent.shutdown();
    Ok(())
}
