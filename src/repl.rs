use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

use crate::conversation::{ConversationError, ConversationManager};
use crate::session::{Message, Role, VocabularyItem};

const HELP: &str = "commands: /clear  /vocab  /history  /dismiss  /help  /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Send(String),
    Clear,
    Vocabulary,
    History,
    DismissError,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> ReplCommand {
    let trimmed = line.trim();
    let Some(cmd) = trimmed.strip_prefix('/') else {
        return ReplCommand::Send(trimmed.to_owned());
    };
    match cmd.split_whitespace().next().unwrap_or("").to_ascii_lowercase().as_str() {
        "clear" | "new" => ReplCommand::Clear,
        "vocab" | "vocabulary" => ReplCommand::Vocabulary,
        "history" => ReplCommand::History,
        "dismiss" => ReplCommand::DismissError,
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_owned()),
    }
}

pub fn render_message(msg: &Message) -> String {
    let who = match msg.role {
        Role::User => "you",
        Role::Assistant => "tutor",
        Role::System => "system",
    };
    let mut out = format!("[{}] {}: {}", msg.timestamp.format("%H:%M"), who, msg.content);
    if let Some(meta) = &msg.metadata {
        for note in &meta.grammar_notes {
            out.push_str(&format!("\n    grammar: {}", note));
        }
        for item in &meta.vocabulary {
            out.push_str(&format!("\n    new word: {}", render_word(item)));
        }
        if !meta.suggestions.is_empty() {
            out.push_str(&format!("\n    try: {}", meta.suggestions.join(" | ")));
        }
        if let Some(audio) = &meta.audio_url {
            out.push_str(&format!("\n    audio: {}", audio));
        }
    }
    out
}

pub fn render_word(item: &VocabularyItem) -> String {
    let mut out = format!("{} = {}", item.word, item.translation);
    if let Some(p) = &item.pronunciation {
        out.push_str(&format!(" [{}]", p));
    }
    if let Some(pos) = &item.part_of_speech {
        out.push_str(&format!(" ({})", pos));
    }
    if let Some(ex) = &item.example {
        out.push_str(&format!(" e.g. \"{}\"", ex));
    }
    out
}

/// Runs the chat loop until `/quit` or end of input.
pub async fn run<R, W>(manager: &ConversationManager, input: R, out: &mut W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "Practising {}. {}", manager.options().language, HELP)?;
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let cmd = parse_command(&line);
        debug!(?cmd, "repl command");
        match cmd {
            ReplCommand::Send(text) => match manager.send(&text).await {
                Ok(Some(reply)) => writeln!(out, "{}", render_message(&reply))?,
                Ok(None) => {}
                Err(ConversationError::Busy) => writeln!(out, "! still waiting for the previous reply")?,
                Err(ConversationError::Service(err)) => writeln!(out, "! {}", err)?,
            },
            ReplCommand::Clear => {
                // the end-session notification runs on its own
                drop(manager.clear());
                writeln!(out, "conversation cleared")?;
            }
            ReplCommand::Vocabulary => {
                let vocab = manager.vocabulary();
                if vocab.is_empty() {
                    writeln!(out, "no words yet")?;
                }
                for item in &vocab {
                    writeln!(out, "  {}", render_word(item))?;
                }
            }
            ReplCommand::History => {
                for msg in manager.messages() {
                    writeln!(out, "{}", render_message(&msg))?;
                }
            }
            ReplCommand::DismissError => manager.set_error(None),
            ReplCommand::Help => writeln!(out, "{}", HELP)?,
            ReplCommand::Quit => break,
            ReplCommand::Unknown(name) => writeln!(out, "unknown command /{}; {}", name, HELP)?,
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationOptions;
    use crate::session::{ChatRequest, ChatResponse};
    use crate::tutor::{TutorError, TutorService};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct EchoService {
        ended: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TutorService for EchoService {
        async fn exchange(&self, req: &ChatRequest) -> Result<ChatResponse, TutorError> {
            if req.message == "fail" {
                return Err(TutorError::Api { status: 500, message: "tutor unavailable".into() });
            }
            let mut resp = ChatResponse::text(format!("echo {}", req.message));
            resp.session_id = Some("s1".into());
            resp.vocabulary = vec![VocabularyItem::new("balay", "house")];
            Ok(resp)
        }

        async fn end_session(&self, session_id: &str) -> Result<(), TutorError> {
            self.ended.lock().unwrap().push(session_id.to_owned());
            Ok(())
        }
    }

    #[test]
    fn parses_commands_and_plain_text() {
        assert_eq!(parse_command("  Kumusta ka? "), ReplCommand::Send("Kumusta ka?".into()));
        assert_eq!(parse_command("/clear"), ReplCommand::Clear);
        assert_eq!(parse_command("/VOCAB"), ReplCommand::Vocabulary);
        assert_eq!(parse_command("/exit now"), ReplCommand::Quit);
        assert_eq!(parse_command("/dismiss"), ReplCommand::DismissError);
        assert_eq!(parse_command("/dance"), ReplCommand::Unknown("dance".into()));
        assert_eq!(parse_command(""), ReplCommand::Send(String::new()));
    }

    #[test]
    fn renders_word_with_optional_parts() {
        let mut item = VocabularyItem::new("kaon", "eat");
        item.part_of_speech = Some("verb".into());
        item.example = Some("Kaon ta!".into());
        assert_eq!(render_word(&item), "kaon = eat (verb) e.g. \"Kaon ta!\"");
    }

    #[tokio::test]
    async fn drives_manager_from_input_lines() {
        let service = Arc::new(EchoService { ended: Mutex::new(Vec::new()) });
        let manager = ConversationManager::new(service.clone(), ConversationOptions::default());
        let input: &[u8] = b"Kumusta!\n\nfail\n/vocab\n/history\n/quit\nnever sent\n";
        let mut out = Vec::new();

        run(&manager, input, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("tutor: echo Kumusta!"));
        assert!(text.contains("! tutor unavailable"));
        assert!(text.contains("  balay = house"));
        assert!(!text.contains("never sent"));
        assert_eq!(manager.messages().len(), 2);
        assert_eq!(manager.error().as_deref(), Some("tutor unavailable"));
    }

    #[tokio::test]
    async fn clear_and_dismiss_reset_state() {
        let service = Arc::new(EchoService { ended: Mutex::new(Vec::new()) });
        let manager = ConversationManager::new(service.clone(), ConversationOptions::default());
        let input: &[u8] = b"hello\nfail\n/dismiss\n/clear\n";
        let mut out = Vec::new();

        run(&manager, input, &mut out).await.unwrap();
        assert!(manager.messages().is_empty());
        assert!(manager.session_id().is_none());
        assert!(manager.error().is_none());
        assert!(String::from_utf8(out).unwrap().contains("conversation cleared"));
    }
}
