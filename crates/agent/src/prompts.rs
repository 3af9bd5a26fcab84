//! Prompt texts and output schemas for the advisor model and the assistant.

use chrono::NaiveDate;
use maestro_core::provider::ResponseFormat;
use maestro_core::topic::Topic;

/// Default system prompt of the assistant.
pub const SYSTEM_PROMPT: &str = "\
You are Maestro, a friendly expert on classical music. \
Answer questions about composers, works, instruments, performers and recordings. \
Keep answers concise and accurate, and say so when you are not sure. \
When asked what is popular, use the list_popular_things tool rather than guessing.";

pub const CAPTURE_MEMORY: &str = "\
You decide whether a message from a user contains something worth remembering \
about them for future conversations: their tastes, instruments they play, \
concerts they attend, composers they love or dislike, and similar lasting facts. \
Questions, greetings and small talk are not worth remembering. \
Reply with JSON: {\"useful\": true|false, \"content\": \"a short note about the user, or null\"}.";

const TOPIC_GUARD: &str = "\
Classify the topic of the following content. \
Reply with JSON {\"topic\": T} where T is one of {topics}. \
Use OTHER for anything that fits none of the other topics, including music.

Content:
{content}";

const SAVE_PERFORMANCE: &str = "\
The following content may announce an upcoming performance of a musical work. \
Today is {now}. If it does, extract the work, its composer and the date of the \
performance as YYYY-MM-DD, resolving relative dates against today. \
Reply with JSON {\"work\": ..., \"composer\": ..., \"date\": ...}, \
using null for anything that is not stated.

Content:
{content}";

/// Opens the block the retrieval advisor appends to the user text.
pub const RETRIEVED_CONTEXT_HEADER: &str = "Related notes:\n---";

/// Closes the retrieved block.
pub const RETRIEVED_CONTEXT_FOOTER: &str = "\
---
Use these notes where they are relevant to the message above.";

pub fn topic_guard(content: &str) -> String {
    let topics: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
    TOPIC_GUARD
        .replace("{topics}", &topics.join(", "))
        .replace("{content}", content)
}

pub fn save_performance(content: &str, now: NaiveDate) -> String {
    SAVE_PERFORMANCE
        .replace("{now}", &now.format("%Y-%m-%d").to_string())
        .replace("{content}", content)
}

pub fn memory_schema() -> ResponseFormat {
    ResponseFormat::new(
        "memory_capture",
        serde_json::json!({
            "type": "object",
            "properties": {
                "useful": { "type": "boolean" },
                "content": { "type": ["string", "null"] }
            },
            "required": ["useful"]
        }),
    )
}

pub fn topic_schema() -> ResponseFormat {
    let topics: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
    ResponseFormat::new(
        "topic_classification",
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "enum": topics }
            },
            "required": ["topic"]
        }),
    )
}

pub fn performance_schema() -> ResponseFormat {
    ResponseFormat::new(
        "performance_extraction",
        serde_json::json!({
            "type": "object",
            "properties": {
                "work": { "type": ["string", "null"] },
                "composer": { "type": ["string", "null"] },
                "date": { "type": ["string", "null"], "format": "date" }
            }
        }),
    )
}
