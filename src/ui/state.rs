//! Conversation state of the chat surface.
//!
//! One turn at a time: a submission moves the session from `Idle` to
//! `AwaitingResponse`, the first token to `Streaming`, and the end of the
//! reply back to `Idle`. While a turn is in flight every way of submitting
//! is refused, so the message list has a single writer.

use crate::models::chat::{ ChatRequest, FeedbackSignal, Message, Role };
use log::info;
use thiserror::Error;

pub const QUICK_REPLIES: [&str; 5] = [
    "Property tax payment",
    "Water bill status",
    "Garbage collection schedule",
    "Report a civic issue",
    "Birth certificate application",
];

pub const WELCOME_TITLE: &str = "Welcome to Ahmedabad Municipal Corporation's AI Assistant";
pub const WELCOME_PROMPT: &str = "How can I help you today?";
pub const FEEDBACK_PROMPT: &str = "Was this helpful?";
pub const FEEDBACK_THANKS: &str = "Thank you for your feedback!";
pub const TYPING_INDICATOR: &str = "Typing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingResponse,
    Streaming,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Feedback {
    Hidden,
    Prompting {
        message_id: String,
    },
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackView {
    Hidden,
    Prompt,
    Acknowledged,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("nothing to send")]
    EmptyInput,
    #[error("a reply is still in progress")]
    Busy,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no reply is in progress")]
    NotInFlight,
}

/// Everything a renderer needs to draw the chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatView<'a> {
    pub show_welcome: bool,
    pub messages: &'a [Message],
    pub typing: bool,
    pub input: &'a str,
    pub input_enabled: bool,
    pub send_enabled: bool,
    pub quick_replies_enabled: bool,
    pub feedback: FeedbackView,
    pub notice: Option<&'a str>,
    pub scroll_revision: u64,
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<Message>,
    input: String,
    phase: Phase,
    feedback: Feedback,
    notice: Option<String>,
    scroll_revision: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            input: String::new(),
            phase: Phase::Idle,
            feedback: Feedback::Hidden,
            notice: None,
            scroll_revision: 0,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Replaces the input text. Ignored while a reply is in flight, like a
    /// disabled text box.
    pub fn set_input(&mut self, text: impl Into<String>) {
        if !self.is_busy() {
            self.input = text.into();
        }
    }

    /// Sends the current input as a user message and returns the request to
    /// hand to the relay.
    pub fn submit(&mut self) -> Result<ChatRequest, SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::Busy);
        }
        if self.input.trim().is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        let content = std::mem::take(&mut self.input);
        self.messages.push(Message::stamped(Role::User, content));
        self.phase = Phase::AwaitingResponse;
        self.feedback = Feedback::Hidden;
        self.notice = None;
        self.touch();

        Ok(ChatRequest { messages: self.messages.clone() })
    }

    /// Same path as typing `query` and pressing send.
    pub fn quick_reply(&mut self, query: &str) -> Result<ChatRequest, SubmitError> {
        if self.is_busy() {
            return Err(SubmitError::Busy);
        }
        self.set_input(query);
        self.submit()
    }

    /// Appends a streamed token to the reply, starting the reply on the first one.
    pub fn push_token(&mut self, token: &str) -> Result<(), SessionError> {
        match self.phase {
            Phase::Idle => {
                return Err(SessionError::NotInFlight);
            }
            Phase::AwaitingResponse => {
                self.messages.push(Message::stamped(Role::Assistant, token));
                self.phase = Phase::Streaming;
            }
            Phase::Streaming => {
                if let Some(last) = self.messages.last_mut() {
                    last.content.push_str(token);
                }
            }
        }
        self.touch();
        Ok(())
    }

    pub fn finish_response(&mut self) -> Result<(), SessionError> {
        if !self.is_busy() {
            return Err(SessionError::NotInFlight);
        }
        self.phase = Phase::Idle;
        self.feedback = match self.messages.last() {
            Some(Message { role: Role::Assistant, id: Some(id), .. }) =>
                Feedback::Prompting { message_id: id.clone() },
            _ => Feedback::Hidden,
        };
        self.touch();
        Ok(())
    }

    /// Ends the turn after a transport or provider failure. Whatever part of
    /// the reply arrived stays; the error is shown until the next submission.
    pub fn fail_response(&mut self, error: impl Into<String>) -> Result<(), SessionError> {
        if !self.is_busy() {
            return Err(SessionError::NotInFlight);
        }
        self.phase = Phase::Idle;
        self.feedback = Feedback::Hidden;
        self.notice = Some(error.into());
        self.touch();
        Ok(())
    }

    /// Records a thumbs up/down for the latest reply. Only the first rating
    /// per reply counts; the outcome is logged and goes nowhere else.
    pub fn give_feedback(&mut self, helpful: bool) -> Option<FeedbackSignal> {
        let Feedback::Prompting { message_id } = &self.feedback else {
            return None;
        };
        let signal = FeedbackSignal { message_id: message_id.clone(), helpful };
        info!("User gave {} feedback", if helpful { "positive" } else { "negative" });
        self.feedback = Feedback::Submitted;
        self.touch();
        Some(signal)
    }

    pub fn view(&self) -> ChatView<'_> {
        let busy = self.is_busy();
        ChatView {
            show_welcome: self.messages.is_empty(),
            messages: &self.messages,
            typing: busy,
            input: &self.input,
            input_enabled: !busy,
            send_enabled: !busy && !self.input.trim().is_empty(),
            quick_replies_enabled: !busy,
            feedback: match self.feedback {
                Feedback::Hidden => FeedbackView::Hidden,
                Feedback::Prompting { .. } => FeedbackView::Prompt,
                Feedback::Submitted => FeedbackView::Acknowledged,
            },
            notice: self.notice.as_deref(),
            scroll_revision: self.scroll_revision,
        }
    }

    // every change to the visible log moves the scroll anchor
    fn touch(&mut self) {
        self.scroll_revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn answered(reply: &str) -> ChatSession {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();
        session.push_token(reply).unwrap();
        session.finish_response().unwrap();
        session
    }

    #[test]
    fn blank_input_is_never_sent() {
        let mut session = ChatSession::new();
        assert_eq!(session.submit(), Err(SubmitError::EmptyInput));
        session.set_input("   \t\n");
        assert_eq!(session.submit(), Err(SubmitError::EmptyInput));
        assert!(session.messages().is_empty());
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.view().send_enabled);
    }

    #[test]
    fn submit_sends_whole_conversation_and_clears_input() {
        let mut session = answered("Hi there");
        session.set_input("  Pay property tax  ");
        let req = session.submit().unwrap();

        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.messages[2].role, Role::User);
        assert_eq!(req.messages[2].content, "  Pay property tax  ");
        assert_eq!(session.input(), "");
        assert_eq!(session.phase(), Phase::AwaitingResponse);
    }

    #[test]
    fn message_ids_are_unique() {
        let mut session = answered("one");
        session.set_input("again");
        session.submit().unwrap();
        session.push_token("two").unwrap();
        session.finish_response().unwrap();

        let mut ids: Vec<_> = session
            .messages()
            .iter()
            .map(|m| m.id.clone().unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn controls_are_disabled_while_in_flight() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();

        let view = session.view();
        assert!(view.typing);
        assert!(!view.input_enabled);
        assert!(!view.send_enabled);
        assert!(!view.quick_replies_enabled);
        assert_eq!(session.quick_reply(QUICK_REPLIES[0]), Err(SubmitError::Busy));

        session.push_token("Hi").unwrap();
        assert_eq!(session.phase(), Phase::Streaming);
        session.set_input("ignored");
        assert_eq!(session.submit(), Err(SubmitError::Busy));
        assert_eq!(session.input(), "");

        session.finish_response().unwrap();
        let view = session.view();
        assert!(!view.typing);
        assert!(view.input_enabled);
        assert!(view.quick_replies_enabled);
    }

    #[test]
    fn tokens_accumulate_in_trailing_reply() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();
        for tok in ["Nam", "aste", "!"] {
            session.push_token(tok).unwrap();
        }
        assert_eq!(session.messages().len(), 2);
        assert_eq!(session.messages()[1].role, Role::Assistant);
        assert_eq!(session.messages()[1].content, "Namaste!");
    }

    #[test]
    fn tokens_outside_a_turn_are_rejected() {
        let mut session = ChatSession::new();
        assert_eq!(session.push_token("stray"), Err(SessionError::NotInFlight));
        assert_eq!(session.finish_response(), Err(SessionError::NotInFlight));
    }

    #[test]
    fn quick_reply_submits_exact_text() {
        let mut session = ChatSession::new();
        session.set_input("half typed");
        let req = session.quick_reply("Water bill status").unwrap();
        let last = req.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, "Water bill status");
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn welcome_only_for_empty_conversation() {
        let mut session = ChatSession::new();
        assert!(session.view().show_welcome);
        session.set_input("Hello");
        session.submit().unwrap();
        assert!(!session.view().show_welcome);
    }

    #[test]
    fn feedback_appears_after_reply_and_is_idempotent() {
        let mut session = ChatSession::new();
        assert_eq!(session.view().feedback, FeedbackView::Hidden);
        assert_eq!(session.give_feedback(true), None);

        session.set_input("Hello");
        session.submit().unwrap();
        session.push_token("Hi").unwrap();
        assert_eq!(session.view().feedback, FeedbackView::Hidden);
        session.finish_response().unwrap();
        assert_eq!(session.view().feedback, FeedbackView::Prompt);

        let reply_id = session.messages()[1].id.clone().unwrap();
        let signal = session.give_feedback(false).unwrap();
        assert_eq!(signal, FeedbackSignal { message_id: reply_id, helpful: false });
        assert_eq!(session.view().feedback, FeedbackView::Acknowledged);
        assert_eq!(session.give_feedback(true), None);
    }

    #[test]
    fn next_submission_hides_feedback() {
        let mut session = answered("Hi");
        session.set_input("More");
        session.submit().unwrap();
        assert_eq!(session.view().feedback, FeedbackView::Hidden);

        let mut session = answered("Hi");
        session.give_feedback(true).unwrap();
        session.quick_reply(QUICK_REPLIES[2]).unwrap();
        assert_eq!(session.view().feedback, FeedbackView::Hidden);
    }

    #[test]
    fn empty_reply_offers_no_feedback() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();
        session.finish_response().unwrap();
        assert_eq!(session.view().feedback, FeedbackView::Hidden);
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn failure_keeps_partial_reply_and_shows_notice() {
        let mut session = ChatSession::new();
        session.set_input("Hello");
        session.submit().unwrap();
        session.push_token("Part").unwrap();
        session.fail_response("relay unreachable").unwrap();

        let view = session.view();
        assert_eq!(view.notice, Some("relay unreachable"));
        assert_eq!(view.feedback, FeedbackView::Hidden);
        assert_eq!(view.messages[1].content, "Part");
        assert!(view.input_enabled);

        session.set_input("retry");
        session.submit().unwrap();
        assert_eq!(session.view().notice, None);
    }

    #[test]
    fn every_visible_change_moves_scroll_anchor() {
        let mut session = ChatSession::new();
        let mut last = session.view().scroll_revision;
        session.set_input("Hello");
        assert_eq!(session.view().scroll_revision, last);

        session.submit().unwrap();
        assert!(session.view().scroll_revision > last);
        last = session.view().scroll_revision;

        session.push_token("a").unwrap();
        assert!(session.view().scroll_revision > last);
        last = session.view().scroll_revision;

        session.push_token("b").unwrap();
        assert!(session.view().scroll_revision > last);
    }
}
