use std::error::Error;
use std::io::{ self, Write };
use log::info;
use tokio::io::{ AsyncBufReadExt, BufReader };

use super::transport::HttpTransport;
use super::turn::run_turn;
use super::view::{ render_transcript, TerminalRenderer };
use super::ChatSession;
use crate::cli::ChatArgs;
use crate::models::chat::SendMessageRequest;

const GREETING: &str = "The Ancient Traveler
A Keeper of Ages Past \u{2022} A Guide Through Time's Mysteries

Greetings, seeker of knowledge. I have walked through the corridors of time,
witnessed the rise and fall of empires, and gathered the wisdom of countless
ages. Ask me of ancient civilizations, forgotten histories, or the secrets
that time has tried to bury.";

const EMPTY_HINT: &str = "The sands of time await your first question...
(Ask about any historical period, ancient civilization, or timeless wisdom. /history reprints the conversation, /exit leaves.)";

fn prompt(stdout: &mut impl Write) -> io::Result<()> {
    write!(stdout, "\n\n> ")?;
    stdout.flush()
}

/// Puts a typed line in the compose box and sends it only when the session
/// would enable its send control.
fn compose(session: &mut ChatSession, line: String) -> Option<SendMessageRequest> {
    session.set_input(line);
    if !session.can_send() {
        return None;
    }
    session.submit_pending()
}

/// Interactive chat against a running relay.
pub async fn run_repl(args: ChatArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    let transport = HttpTransport::new(&args.relay_url)?;
    info!("Chatting through {}", transport.endpoint());

    let mut session = ChatSession::new();
    let mut renderer = TerminalRenderer::new(io::stdout());

    let mut stdout = io::stdout();
    writeln!(stdout, "{}\n\n{}", GREETING, EMPTY_HINT)?;
    prompt(&mut stdout)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/exit" | "/quit" => {
                break;
            }
            "/history" => {
                write!(stdout, "{}", render_transcript(&session))?;
                prompt(&mut stdout)?;
                continue;
            }
            _ => {}
        }

        let request = match compose(&mut session, line) {
            Some(request) => request,
            None => {
                write!(stdout, "> ")?;
                stdout.flush()?;
                continue;
            }
        };

        writeln!(stdout)?;
        run_turn(&mut session, &transport, request, &mut renderer).await;
        prompt(&mut stdout)?;
    }

    writeln!(stdout)?;
    Ok(())
}
