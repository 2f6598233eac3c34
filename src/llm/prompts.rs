//! Prompt text for the analysis pipelines.

use super::LlmRequest;
use crate::db::schemas::TranscriptMessage;

const KEY_POINTS_SYSTEM: &str = "You summarise a live small-group discussion into short key points. \
Only report ideas that are genuinely new: do not repeat, reword or merge any of the existing points. \
Each point is one sentence of at most 20 words. \
Answer with JSON only, in the form {\"points\": [\"...\"]}. \
Answer {\"points\": []} when nothing new was said.";

const ETHICS_SYSTEM: &str = "You label discussion messages with the ethical theme they raise. \
Use exactly one category per message from this list: {categories}. \
Use \"none\" when a message raises no ethical theme. \
Answer with JSON only, in the form {\"classifications\": [{\"messageId\": \"...\", \"category\": \"...\"}]}.";

fn transcript_lines(messages: &[TranscriptMessage]) -> String {
    messages
        .iter()
        .map(|message| format!("[{}] {}: {}", message.id, message.author, message.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn key_points(topic: &str, existing: &[String], messages: &[TranscriptMessage]) -> LlmRequest {
    let existing = if existing.is_empty() {
        "(none yet)".to_string()
    } else {
        existing
            .iter()
            .map(|point| format!("- {point}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    LlmRequest {
        system_prompt: KEY_POINTS_SYSTEM.to_string(),
        user_prompt: format!(
            "Discussion prompt:\n{topic}\n\nExisting points:\n{existing}\n\nNew messages:\n{}",
            transcript_lines(messages)
        ),
    }
}

pub fn ethical_classification(categories: &[&str], messages: &[TranscriptMessage]) -> LlmRequest {
    LlmRequest {
        system_prompt: ETHICS_SYSTEM.replace("{categories}", &categories.join(", ")),
        user_prompt: format!("Messages:\n{}", transcript_lines(messages)),
    }
}
