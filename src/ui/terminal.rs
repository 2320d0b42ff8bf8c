//! Line-oriented terminal front end for the chat.

use super::client::RelayClient;
use super::state::{
    ChatSession,
    FeedbackView,
    SubmitError,
    FEEDBACK_PROMPT,
    FEEDBACK_THANKS,
    QUICK_REPLIES,
    TYPING_INDICATOR,
    WELCOME_PROMPT,
    WELCOME_TITLE,
};
use crate::cli::ChatArgs;
use crate::codec::StreamProtocol;
use crate::llm::chat::BoxError;
use crate::models::chat::{ ChatRequest, Message, Role };
use chrono::{ Datelike, Local };
use futures::StreamExt;
use log::{ info, warn };
use tokio::io::{ AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader };

pub const HEADER_TITLE: &str = "AMDAVAD MUNICIPAL CORPORATION";
pub const HEADER_SUBTITLE: &str = "અમદાવાદ મ્યુનિસિપલ કોર્પોરેશન";
pub const CHAT_TITLE: &str = "AI Agents for the Ahmedabad Municipal Corporation";
const ASSISTANT_LABEL: &str = "AMC Assistant";
const USER_LABEL: &str = "You";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    QuickReply(usize),
    Feedback(bool),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Command {
    match line.trim() {
        "/quit" | "/exit" => Command::Quit,
        "/help" => Command::Help,
        "/up" | "/yes" => Command::Feedback(true),
        "/down" | "/no" => Command::Feedback(false),
        cmd => {
            let quick = cmd
                .strip_prefix('/')
                .and_then(|n| n.parse::<usize>().ok())
                .filter(|n| (1..=QUICK_REPLIES.len()).contains(n));
            match quick {
                Some(n) => Command::QuickReply(n - 1),
                None => Command::Send(line.to_string()),
            }
        }
    }
}

pub fn render_header() -> String {
    format!("{}\n{}\n\n== {} ==\n", HEADER_TITLE, HEADER_SUBTITLE, CHAT_TITLE)
}

pub fn render_footer(year: i32) -> String {
    format!("© {} Ahmedabad Municipal Corporation. All rights reserved.\n", year)
}

pub fn render_welcome() -> String {
    format!("{}\n{}\n", WELCOME_TITLE, WELCOME_PROMPT)
}

pub fn render_message(message: &Message) -> String {
    let label = match message.role {
        Role::User => USER_LABEL,
        Role::Assistant => ASSISTANT_LABEL,
        Role::System => "System",
    };
    format!("{}: {}", label, message.content)
}

pub fn render_quick_replies(enabled: bool) -> String {
    let items = QUICK_REPLIES.iter()
        .enumerate()
        .map(|(i, q)| format!("[/{}] {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("  ");
    if enabled {
        format!("Common queries: {}\n", items)
    } else {
        format!("Common queries (unavailable while replying): {}\n", items)
    }
}

pub fn render_feedback(feedback: FeedbackView) -> Option<String> {
    match feedback {
        FeedbackView::Hidden => None,
        FeedbackView::Prompt => Some(format!("{} [/up] [/down]\n", FEEDBACK_PROMPT)),
        FeedbackView::Acknowledged => Some(format!("{}\n", FEEDBACK_THANKS)),
    }
}

fn render_help() -> String {
    "Type a message and press Enter to send it.\n\
     /1../5 send a common query, /up or /down rate the last reply, /quit leaves.\n".to_string()
}

pub struct ChatTerminal<W> {
    session: ChatSession,
    client: RelayClient,
    out: W,
}

impl<W: AsyncWrite + Unpin> ChatTerminal<W> {
    pub fn new(client: RelayClient, out: W) -> Self {
        Self { session: ChatSession::new(), client, out }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.out
    }

    async fn write(&mut self, text: &str) -> Result<(), BoxError> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    pub async fn greet(&mut self) -> Result<(), BoxError> {
        let mut intro = render_header();
        if self.session.view().show_welcome {
            intro.push_str(&render_welcome());
        }
        intro.push('\n');
        intro.push_str(&render_quick_replies(true));
        intro.push_str("Type /help for commands.\n");
        intro.push_str(&render_footer(Local::now().year()));
        self.write(&intro).await
    }

    /// Handles one line of input. Returns `false` once the user asked to leave.
    pub async fn handle_line(&mut self, line: &str) -> Result<bool, BoxError> {
        let submitted = match parse_command(line) {
            Command::Quit => {
                return Ok(false);
            }
            Command::Help => {
                self.write(&render_help()).await?;
                return Ok(true);
            }
            Command::Feedback(helpful) => {
                if self.session.give_feedback(helpful).is_some() {
                    if let Some(ack) = render_feedback(self.session.view().feedback) {
                        self.write(&ack).await?;
                    }
                }
                return Ok(true);
            }
            Command::QuickReply(index) => {
                let query = QUICK_REPLIES[index];
                let result = self.session.quick_reply(query);
                if result.is_ok() {
                    self.write(&format!("{}\n", render_message(&Message::user(query)))).await?;
                }
                result
            }
            Command::Send(text) => {
                self.session.set_input(text);
                self.session.submit()
            }
        };

        match submitted {
            Ok(request) => self.run_turn(request).await?,
            Err(SubmitError::EmptyInput) => {}
            Err(e @ SubmitError::Busy) => self.write(&format!("{}\n", e)).await?,
        }
        Ok(true)
    }

    async fn run_turn(&mut self, request: ChatRequest) -> Result<(), BoxError> {
        self.write(TYPING_INDICATOR).await?;

        let mut tokens = match self.client.send(&request).await {
            Ok(tokens) => tokens,
            Err(e) => {
                self.session.fail_response(e.to_string())?;
                return self.show_outcome(false).await;
            }
        };

        let mut started = false;
        while let Some(item) = tokens.next().await {
            match item {
                Ok(token) => {
                    if !started {
                        self.write(&format!("\r{}: ", ASSISTANT_LABEL)).await?;
                        started = true;
                    }
                    self.session.push_token(&token)?;
                    self.write(&token).await?;
                }
                Err(e) => {
                    self.session.fail_response(e.to_string())?;
                    return self.show_outcome(started).await;
                }
            }
        }

        self.session.finish_response()?;
        self.show_outcome(started).await
    }

    async fn show_outcome(&mut self, streamed: bool) -> Result<(), BoxError> {
        let view = self.session.view();
        let mut text = String::new();
        if !streamed {
            // clear the typing indicator
            text.push_str(&format!("\r{}\r", " ".repeat(TYPING_INDICATOR.len())));
        } else {
            text.push('\n');
        }
        if let Some(notice) = view.notice {
            text.push_str(&format!("Error: {}\n", notice));
        }
        if let Some(feedback) = render_feedback(view.feedback) {
            text.push_str(&feedback);
        }
        text.push_str(&render_quick_replies(view.quick_replies_enabled));
        self.write(&text).await
    }
}

pub async fn run(args: ChatArgs) -> Result<(), BoxError> {
    let protocol: StreamProtocol = args.protocol.parse()?;
    let client = RelayClient::new(&args.relay_url, protocol)?;
    info!("Chatting through relay at {}", client.endpoint());
    if !protocol.signals_failures() {
        warn!("The {} protocol cannot mark failed replies; a cut-off answer will look complete", protocol);
    }

    let mut terminal = ChatTerminal::new(client, tokio::io::stdout());
    terminal.greet().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if !terminal.handle_line(&line).await? {
            break;
        }
    }

    info!("Chat closed after {} messages", terminal.session().messages().len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command(" /2 "), Command::QuickReply(1));
        assert_eq!(parse_command("/up"), Command::Feedback(true));
        assert_eq!(parse_command("/down"), Command::Feedback(false));
        assert_eq!(parse_command("/9"), Command::Send("/9".into()));
        assert_eq!(parse_command("water bill"), Command::Send("water bill".into()));
    }

    #[test]
    fn quick_reply_bar_lists_all_queries() {
        let bar = render_quick_replies(true);
        for (i, q) in QUICK_REPLIES.iter().enumerate() {
            assert!(bar.contains(&format!("[/{}] {}", i + 1, q)));
        }
        assert!(render_quick_replies(false).contains("unavailable"));
    }

    #[test]
    fn feedback_rendering_matches_state() {
        assert_eq!(render_feedback(FeedbackView::Hidden), None);
        assert!(render_feedback(FeedbackView::Prompt).unwrap().starts_with(FEEDBACK_PROMPT));
        assert_eq!(render_feedback(FeedbackView::Acknowledged).unwrap(), format!("{}\n", FEEDBACK_THANKS));
    }

    #[test]
    fn messages_are_labelled_by_role() {
        assert_eq!(render_message(&Message::user("Hi")), "You: Hi");
        assert_eq!(render_message(&Message::assistant("Hello")), "AMC Assistant: Hello");
    }

    #[tokio::test]
    async fn greeting_shows_header_and_welcome() {
        let client = RelayClient::new("http://127.0.0.1:9", StreamProtocol::Data).unwrap();
        let mut terminal = ChatTerminal::new(client, Vec::new());
        terminal.greet().await.unwrap();
        let out = String::from_utf8(terminal.into_output()).unwrap();
        assert!(out.contains(HEADER_TITLE));
        assert!(out.contains(WELCOME_TITLE));
        assert!(out.contains("Common queries:"));
        assert!(out.ends_with(&render_footer(Local::now().year())));
    }

    #[test]
    fn footer_carries_the_year() {
        assert_eq!(
            render_footer(2025),
            "© 2025 Ahmedabad Municipal Corporation. All rights reserved.\n"
        );
    }

    #[tokio::test]
    async fn blank_lines_and_early_feedback_do_nothing() {
        let client = RelayClient::new("http://127.0.0.1:9", StreamProtocol::Data).unwrap();
        let mut terminal = ChatTerminal::new(client, Vec::new());
        assert!(terminal.handle_line("   ").await.unwrap());
        assert!(terminal.handle_line("/up").await.unwrap());
        assert!(terminal.session().messages().is_empty());
        assert!(terminal.into_output().is_empty());
    }

    #[tokio::test]
    async fn unreachable_relay_is_reported_and_input_reopens() {
        // port 9 (discard) is not expected to run an HTTP server
        let client = RelayClient::new("http://127.0.0.1:9", StreamProtocol::Data).unwrap();
        let mut terminal = ChatTerminal::new(client, Vec::new());
        assert!(terminal.handle_line("Hello").await.unwrap());

        let view = terminal.session().view();
        assert!(view.notice.is_some());
        assert!(view.input_enabled);
        let out = String::from_utf8(terminal.into_output()).unwrap();
        assert!(out.contains("Error: "));
    }

    #[tokio::test]
    async fn quit_stops_the_loop() {
        let client = RelayClient::new("http://127.0.0.1:9", StreamProtocol::Data).unwrap();
        let mut terminal = ChatTerminal::new(client, Vec::new());
        assert!(!terminal.handle_line("/quit").await.unwrap());
    }
}
