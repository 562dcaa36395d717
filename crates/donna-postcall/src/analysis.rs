use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use donna_agent::provider::{ChatRequest, LlmProvider};
use donna_agent::repair::parse_json_lenient;
use donna_core::types::ChatMessage;

/// Total budget for the post-call analysis request.
const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Structured result of the AI call review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnalysis {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// 0–100.
    #[serde(default = "default_engagement")]
    pub engagement_score: u32,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub positive_observations: Vec<String>,
    #[serde(default)]
    pub follow_up_suggestions: Vec<String>,
    #[serde(default = "default_quality")]
    pub call_quality: String,
}

fn default_engagement() -> u32 {
    50
}
fn default_quality() -> String {
    "unknown".to_string()
}

impl Default for CallAnalysis {
    /// The neutral substitute when the model's output is unusable.
    fn default() -> Self {
        Self {
            summary: "Call completed; automatic analysis unavailable.".to_string(),
            topics: Vec::new(),
            engagement_score: default_engagement(),
            concerns: Vec::new(),
            positive_observations: Vec::new(),
            follow_up_suggestions: Vec::new(),
            call_quality: default_quality(),
        }
    }
}

const ANALYSIS_SYSTEM: &str = "You review transcripts of companion phone calls with elderly \
people. Respond with ONLY a JSON object: {\"summary\": \"2-3 sentences\", \"topics\": \
[\"...\"], \"engagement_score\": 0-100, \"concerns\": [\"...\"], \"positive_observations\": \
[\"...\"], \"follow_up_suggestions\": [\"...\"], \"call_quality\": \
\"good|fair|poor\"}";

/// Run the analysis. Timeouts, provider errors, and unusable JSON all
/// degrade to [`CallAnalysis::default`].
pub async fn analyze_call(
    provider: Arc<dyn LlmProvider>,
    model: &str,
    senior_name: &str,
    transcript: &str,
) -> CallAnalysis {
    let mut req = ChatRequest::new(model, ANALYSIS_SYSTEM);
    req.messages = vec![ChatMessage::user(format!(
        "Senior: {senior_name}\n\nTranscript:\n{transcript}"
    ))];
    req.max_tokens = 700;
    req.temperature = 0.3;

    let response = match tokio::time::timeout(ANALYSIS_TIMEOUT, provider.send(&req)).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => {
            warn!(error = %e, "call analysis failed, using default");
            return CallAnalysis::default();
        }
        Err(_) => {
            warn!("call analysis timed out, using default");
            return CallAnalysis::default();
        }
    };

    parse_json_lenient(&response.content)
        .and_then(|v| serde_json::from_value::<CallAnalysis>(v).ok())
        .unwrap_or_else(|| {
            warn!("call analysis unparseable after repair, using default");
            CallAnalysis::default()
        })
}
