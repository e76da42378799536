//! Offline conversational agent
//!
//! Walks a fixed list of interview questions so the CLI can run without a
//! language model behind it. Each thread keeps its own position.

use std::collections::HashMap;
use tokio::sync::Mutex;
use wren_core::session::{AgentReply, ConversationalAgent};

pub const OPENING_QUESTION: &str = "Let's start simple. Name 3 books or stories you've loved, \
and 1 you couldn't finish or actively disliked.";

const QUESTIONS: &[&str] = &[
    "What was it about those books that stayed with you?",
    "How would you describe the writing style you enjoy most: dense and lyrical, or lean and fast?",
    "Is there a story you wish someone would write for you?",
    "How do you usually read? When, where, and for how long at a time?",
    "Which ending hits harder for you: tragic, bittersweet or hopeful?",
    "Do you care more about the world a story builds or the people in it?",
    "What makes you put a book down for good?",
    "Which author's voice would you recognise without seeing the cover?",
    "Do you read in print, on a screen, or listen to audiobooks?",
    "What theme do you keep coming back to, even when you don't mean to?",
    "If a book arrived in small daily pieces, how many pages would suit you?",
];

const CLOSING: &str = "Thank you, that gives me a clear picture of you as a reader.";

/// Scripted agent used by `wren interview` and `wren turn`
pub struct OfflineAgent {
    positions: Mutex<HashMap<String, u32>>,
}

impl OfflineAgent {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
        }
    }

    /// Continue a thread that already has `turns` answered questions
    pub async fn resume_at(&self, thread_id: &str, turns: u32) {
        self.positions.lock().await.insert(thread_id.to_string(), turns);
    }
}

impl Default for OfflineAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConversationalAgent for OfflineAgent {
    async fn reply(&self, thread_id: &str, user_input: &str) -> anyhow::Result<AgentReply> {
        let mut positions = self.positions.lock().await;
        let turn = positions.entry(thread_id.to_string()).or_insert(0);
        *turn += 1;

        let question = QUESTIONS.get(*turn as usize - 1).copied();
        let message = match question {
            Some(q) => {
                let echo: String = user_input.chars().take(40).collect();
                format!("You mentioned \"{}\". {}", echo, q)
            }
            None => CLOSING.to_string(),
        };

        Ok(AgentReply {
            turn_count: *turn,
            is_complete: question.is_none(),
            ..AgentReply::new(message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_questions_advance_per_thread() {
        let agent = OfflineAgent::new();
        let a1 = agent.reply("a", "Dune").await.unwrap();
        let a2 = agent.reply("a", "the sand").await.unwrap();
        let b1 = agent.reply("b", "Emma").await.unwrap();

        assert_eq!(a1.turn_count, 1);
        assert_eq!(a2.turn_count, 2);
        assert_eq!(b1.turn_count, 1);
        assert!(a1.message.contains(QUESTIONS[0]));
        assert!(a2.message.contains(QUESTIONS[1]));
        assert!(b1.message.contains("Emma"));
    }

    #[tokio::test]
    async fn test_runs_out_of_questions() {
        let agent = OfflineAgent::new();
        agent.resume_at("a", QUESTIONS.len() as u32).await;
        let reply = agent.reply("a", "done").await.unwrap();
        assert!(reply.is_complete);
        assert_eq!(reply.message, CLOSING);
    }
}
