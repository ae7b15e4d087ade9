use chrono::{ Local, TimeZone };
use log::debug;
use std::io::Write;

use super::ChatSession;
use crate::models::chat::Role;

pub const CURSOR: char = '▌';

pub trait Renderer {
    /// Called after every change to the session.
    fn render(&mut self, session: &ChatSession);
}

pub fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "You",
        Role::Assistant => "Traveler",
    }
}

/// Local wall-clock `HH:MM` for an epoch-millisecond timestamp.
pub fn format_time(timestamp_ms: i64) -> String {
    Local.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Full redraw of the conversation, cursor included.
pub fn render_transcript(session: &ChatSession) -> String {
    let mut out = String::new();
    for (index, msg) in session.messages().iter().enumerate() {
        if index > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("{} [{}]\n", speaker(msg.role), format_time(msg.timestamp)));
        out.push_str(&msg.content);
        if session.shows_cursor(index) {
            out.push(CURSOR);
        }
    }
    out
}

/// Append-only terminal view. Output only ever grows at the bottom, so the
/// newest message is always the one in sight.
pub struct TerminalRenderer<W: Write> {
    out: W,
    shown_messages: usize,
    shown_bytes: usize,
    cursor_visible: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, shown_messages: 0, shown_bytes: 0, cursor_visible: false }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn render(&mut self, session: &ChatSession) {
        let messages = session.messages();
        let mut buf = String::new();

        if self.cursor_visible {
            buf.push_str("\u{8} \u{8}");
            self.cursor_visible = false;
        }

        self.shown_messages = self.shown_messages.min(messages.len());
        if self.shown_messages > 0 {
            let current = &messages[self.shown_messages - 1];
            if let Some(rest) = current.content.get(self.shown_bytes..) {
                buf.push_str(rest);
            }
            self.shown_bytes = current.content.len();
        }

        for msg in &messages[self.shown_messages..] {
            if self.shown_messages > 0 {
                buf.push_str("\n\n");
            }
            buf.push_str(&format!("{} [{}]\n", speaker(msg.role), format_time(msg.timestamp)));
            buf.push_str(&msg.content);
            self.shown_messages += 1;
            self.shown_bytes = msg.content.len();
        }

        if let Some(last) = messages.len().checked_sub(1) {
            if session.shows_cursor(last) {
                buf.push(CURSOR);
                self.cursor_visible = true;
            }
        }

        if buf.is_empty() {
            return;
        }
        if let Err(e) = self.out.write_all(buf.as_bytes()).and_then(|_| self.out.flush()) {
            debug!("Terminal write failed: {}", e);
        }
    }
}
