//! Prompt text and conversation memory

use std::collections::VecDeque;

/// Reply the model gives when the screen shows no game
pub const IDLE_REPLY: &str = "Waiting for gameplay...";

pub fn system_prompt(max_response_length: u32) -> String {
    format!(
        "You are a game partner looking at screenshots of the player's screen. \
Give strategic advice based on what you see.\n\
\n\
If the screenshot shows no active gameplay (a desktop, an editor, a launcher):\n\
- with no user message, reply only with: '{IDLE_REPLY}'\n\
- with a user message, answer it briefly and mention you are waiting for gameplay.\n\
\n\
When gameplay is visible:\n\
- keep the reply under {max_response_length} characters, in one or two short sentences\n\
- focus on what changed since your last suggestion\n\
- prefer the immediate tactical move over long-term strategy\n\
- say so briefly if part of the image is unclear\n\
\n\
Refer back to earlier messages when it helps continuity."
    )
}

/// Text block sent alongside the screenshot
pub fn user_text(prompt: Option<&str>, max_response_length: u32) -> String {
    let mut text = String::new();
    if let Some(message) = prompt.map(str::trim).filter(|m| !m.is_empty()) {
        text.push_str("User message: ");
        text.push_str(message);
        text.push_str("\n\n");
    }
    text.push_str(&format!(
        "Analyze this screenshot.\n\
Keep your response under {max_response_length} characters and give one clear, actionable suggestion."
    ));
    text
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Most recent exchanges, oldest dropped first
#[derive(Debug, Clone)]
pub struct Conversation {
    exchanges: VecDeque<Exchange>,
    window: usize,
}

impl Conversation {
    pub fn new(window: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn record(&mut self, user: String, assistant: String) {
        if self.window == 0 {
            return;
        }
        while self.exchanges.len() >= self.window {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange { user, assistant });
    }

    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_text_includes_message_first() {
        let text = user_text(Some("  where do I go?  "), 150);
        assert!(text.starts_with("User message: where do I go?\n\n"));
        assert!(text.contains("under 150 characters"));
    }

    #[test]
    fn test_user_text_without_message() {
        let text = user_text(None, 80);
        assert!(text.starts_with("Analyze this screenshot."));
        assert_eq!(user_text(Some("   "), 80), text);
    }

    #[test]
    fn test_system_prompt_mentions_limit_and_idle_reply() {
        let prompt = system_prompt(120);
        assert!(prompt.contains("under 120 characters"));
        assert!(prompt.contains(IDLE_REPLY));
    }

    #[test]
    fn test_conversation_keeps_window() {
        let mut memory = Conversation::new(2);
        for i in 0..5 {
            memory.record(format!("q{i}"), format!("a{i}"));
            assert!(memory.len() <= 2);
        }
        let users: Vec<&str> = memory.exchanges().map(|e| e.user.as_str()).collect();
        assert_eq!(users, vec!["q3", "q4"]);
    }

    #[test]
    fn test_zero_window_keeps_nothing() {
        let mut memory = Conversation::new(0);
        memory.record("q".into(), "a".into());
        assert_eq!(memory.len(), 0);
    }
}
