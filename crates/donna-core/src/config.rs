use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Audio constants — fixed by the Twilio media-stream format.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8_000;
pub const TTS_SAMPLE_RATE: u32 = 24_000;
/// Outbound audio is framed into ~400 ms packets (8 kHz μ-law, 1 byte/sample).
pub const OUTBOUND_PACKET_BYTES: usize = 3_200;
/// Transcript ring buffer depth (turns).
pub const MAX_TRANSCRIPT_TURNS: usize = 40;
/// Embedding vector width (text-embedding-3-small).
pub const EMBEDDING_DIMS: usize = 1_536;

/// Top-level config (donna.toml + DONNA_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonnaConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub twilio: TwilioConfig,
    #[serde(default)]
    pub deepgram: DeepgramConfig,
    #[serde(default)]
    pub elevenlabs: ElevenLabsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub calls: CallsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for DonnaConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            twilio: TwilioConfig::default(),
            deepgram: DeepgramConfig::default(),
            elevenlabs: ElevenLabsConfig::default(),
            llm: LlmConfig::default(),
            embeddings: EmbeddingsConfig::default(),
            calls: CallsConfig::default(),
            memory: MemoryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build the media-stream WS URL
    /// in TwiML and to reconstruct the signed webhook URL.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// E.164 caller id for outbound calls.
    pub from_number: String,
    /// When false, X-Twilio-Signature checks are skipped (local dev only).
    #[serde(default = "bool_true")]
    pub validate_signatures: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepgramConfig {
    pub api_key: String,
    #[serde(default = "default_stt_model")]
    pub model: String,
    /// Silence (ms) to consider end-of-utterance.
    #[serde(default = "default_endpointing_ms")]
    pub endpointing_ms: u32,
    /// Forced utterance close (ms).
    #[serde(default = "default_utterance_end_ms")]
    pub utterance_end_ms: u32,
}

impl Default for DeepgramConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_stt_model(),
            endpointing_ms: default_endpointing_ms(),
            utterance_end_ms: default_utterance_end_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: String::new(),
            model: default_tts_model(),
        }
    }
}

/// Which LLM backend generates conversational replies. A configuration
/// decision made once per process, not per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Anthropic,
    OpenAi,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub backend: LlmBackend,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub gemini_api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Anthropic,
            model: default_llm_model(),
            anthropic_api_key: String::new(),
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    /// Soft maximum call length; the hard kill fires at 1.2× this.
    #[serde(default = "default_max_call_minutes")]
    pub max_duration_minutes: u32,
    /// Delay between a strong goodbye and the scheduled end frame.
    #[serde(default = "default_goodbye_silence")]
    pub goodbye_silence_seconds: f64,
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            max_duration_minutes: default_max_call_minutes(),
            goodbye_silence_seconds: default_goodbye_silence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Cosine threshold above which two memories are the same memory.
    #[serde(default = "default_dedup_similarity")]
    pub dedup_similarity: f32,
    /// Cosine floor for semantic search hits.
    #[serde(default = "default_search_threshold")]
    pub search_threshold: f32,
    /// Exponential importance decay half-life.
    #[serde(default = "default_decay_half_life")]
    pub decay_half_life_days: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dedup_similarity: default_dedup_similarity(),
            search_threshold: default_search_threshold(),
            decay_half_life_days: default_decay_half_life(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.donna/donna.db", home)
}
fn default_stt_model() -> String {
    "nova-2".to_string()
}
fn default_endpointing_ms() -> u32 {
    300
}
fn default_utterance_end_ms() -> u32 {
    1_000
}
fn default_tts_model() -> String {
    "eleven_turbo_v2_5".to_string()
}
fn default_llm_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_call_minutes() -> u32 {
    10
}
fn default_goodbye_silence() -> f64 {
    3.5
}
fn default_dedup_similarity() -> f32 {
    0.90
}
fn default_search_threshold() -> f32 {
    0.65
}
fn default_decay_half_life() -> f64 {
    30.0
}
fn default_poll_interval() -> u64 {
    60
}

impl DonnaConfig {
    /// Load config from a TOML file with DONNA_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.donna/donna.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: DonnaConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("DONNA_").split("_"))
            .extract()
            .map_err(|e| crate::error::DonnaError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Hard-kill ceiling: 1.2× the configured maximum duration.
    pub fn hard_limit_minutes(&self) -> f64 {
        self.calls.max_duration_minutes as f64 * 1.2
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.donna/donna.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DonnaConfig::default();
        assert_eq!(cfg.calls.max_duration_minutes, 10);
        assert_eq!(cfg.calls.goodbye_silence_seconds, 3.5);
        assert_eq!(cfg.deepgram.endpointing_ms, 300);
        assert_eq!(cfg.deepgram.utterance_end_ms, 1_000);
        assert_eq!(cfg.memory.dedup_similarity, 0.90);
        assert_eq!(cfg.memory.search_threshold, 0.65);
        assert_eq!(cfg.memory.decay_half_life_days, 30.0);
        assert_eq!(cfg.scheduler.poll_interval_seconds, 60);
    }

    #[test]
    fn hard_limit_is_twelve_minutes_at_default() {
        let cfg = DonnaConfig::default();
        assert!((cfg.hard_limit_minutes() - 12.0).abs() < f64::EPSILON);
    }
}
