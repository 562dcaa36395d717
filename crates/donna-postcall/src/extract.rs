use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use donna_agent::provider::{ChatRequest, LlmProvider};
use donna_agent::repair::parse_json_lenient;
use donna_core::types::ChatMessage;
use donna_memory::{MemoryStore, MemoryType};

const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);
/// Never write more than this many memories from one call.
const MAX_MEMORIES_PER_CALL: usize = 8;

const EXTRACTION_SYSTEM: &str = "You extract long-term memories from companion-call transcripts. \
Respond with ONLY a JSON array (possibly empty) of objects: \
[{\"type\": \"fact|preference|event|concern|relationship\", \"content\": \"one self-contained \
sentence\", \"importance\": 0-100}]. Only include things worth remembering across calls: \
people, health changes, preferences, plans, worries. Never include small talk.";

#[derive(Deserialize)]
struct ExtractedMemory {
    #[serde(rename = "type")]
    memory_type: String,
    content: String,
    #[serde(default = "default_importance")]
    importance: f64,
}

fn default_importance() -> f64 {
    50.0
}

/// Read the transcript, ask the model for memory candidates, and issue
/// deduped writes. Failures degrade to zero writes.
pub async fn extract_memories(
    provider: Arc<dyn LlmProvider>,
    model: &str,
    memory: Arc<MemoryStore>,
    senior_id: &str,
    call_id: &str,
    transcript: &str,
) -> usize {
    if transcript.trim().is_empty() {
        return 0;
    }

    let mut req = ChatRequest::new(model, EXTRACTION_SYSTEM);
    req.messages = vec![ChatMessage::user(transcript.to_string())];
    req.max_tokens = 600;
    req.temperature = 0.2;

    let response = match tokio::time::timeout(EXTRACTION_TIMEOUT, provider.send(&req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!(error = %e, "memory extraction failed");
            return 0;
        }
        Err(_) => {
            warn!("memory extraction timed out");
            return 0;
        }
    };

    let Some(value) = parse_json_lenient(&response.content) else {
        warn!("memory extraction output unparseable");
        return 0;
    };
    let Ok(candidates) = serde_json::from_value::<Vec<ExtractedMemory>>(value) else {
        warn!("memory extraction output is not an array of memories");
        return 0;
    };

    let mut written = 0;
    for candidate in candidates.into_iter().take(MAX_MEMORIES_PER_CALL) {
        let memory_type: MemoryType = match candidate.memory_type.parse() {
            Ok(t) => t,
            Err(_) => MemoryType::Fact,
        };
        if candidate.content.trim().is_empty() {
            continue;
        }
        match memory
            .remember(
                senior_id,
                memory_type,
                candidate.content.trim(),
                candidate.importance,
                Some(call_id),
            )
            .await
        {
            Ok(Some(_)) => written += 1,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "memory write failed"),
        }
    }
    info!(senior_id, call_id, written, "memory extraction complete");
    written
}
