use futures::StreamExt;
use log::{ debug, warn };

use super::transport::ChatTransport;
use super::view::Renderer;
use super::ChatSession;
use crate::models::chat::SendMessageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The body was read to the end.
    Completed,
    /// The body broke off after streaming started.
    Truncated,
    /// No reply text arrived at all.
    Failed,
}

/// Incremental UTF-8 decoding: a character split across chunks is held back
/// until its remaining bytes arrive.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    out.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flushes bytes left over at end of stream.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Drives one turn from send to idle, re-rendering after every change.
pub async fn run_turn<T, R>(
    session: &mut ChatSession,
    transport: &T,
    request: SendMessageRequest,
    renderer: &mut R
) -> TurnOutcome
    where T: ChatTransport + ?Sized, R: Renderer + ?Sized
{
    renderer.render(session);

    let mut body = match transport.send(&request).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Chat turn failed before streaming: {}", e);
            session.fail_turn();
            renderer.render(session);
            return TurnOutcome::Failed;
        }
    };

    session.begin_reply();
    renderer.render(session);

    let mut decoder = Utf8StreamDecoder::new();
    let mut outcome = TurnOutcome::Completed;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                let text = decoder.decode(&bytes);
                if !text.is_empty() && session.append_fragment(&text) {
                    renderer.render(session);
                }
            }
            Err(e) => {
                warn!("Chat stream broke off: {}", e);
                outcome = TurnOutcome::Truncated;
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        session.append_fragment(&tail);
    }

    let reply_is_empty = session.messages().last().map_or(true, |m| m.content.is_empty());
    if outcome == TurnOutcome::Completed && reply_is_empty {
        warn!("Relay closed the reply without any text");
        outcome = TurnOutcome::Failed;
    }

    match outcome {
        TurnOutcome::Completed => session.finish_turn(),
        _ => session.fail_turn(),
    }
    renderer.render(session);

    debug!("Chat turn ended: {:?}", outcome);
    outcome
}
