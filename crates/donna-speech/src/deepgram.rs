use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use donna_core::config::DeepgramConfig;
use donna_pipeline::{Direction, Frame, PipelineError, PipelineHandle, Processor, ProcessorContext};
use donna_session::SharedSession;

/// Barge-in requires more than this many characters of speech, so breath
/// noise and "mm" don't cut Donna off.
const BARGE_IN_MIN_CHARS: usize = 2;

/// Streaming speech-to-text stage ("stt").
///
/// Audio frames are fed to a Deepgram live socket running in a worker task;
/// transcripts come back through the pipeline handle. Interim results only
/// drive barge-in; finals enter the guidance stack. One silent reconnect is
/// attempted on socket failure, after which the call continues as a silent
/// listener that yields no transcripts.
pub struct SttProcessor {
    config: DeepgramConfig,
    session: SharedSession,
    handle: PipelineHandle,
    audio_tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl SttProcessor {
    pub fn new(config: DeepgramConfig, session: SharedSession, handle: PipelineHandle) -> Self {
        Self {
            config,
            session,
            handle,
            audio_tx: None,
        }
    }

    fn start_worker(&mut self) {
        let (tx, rx) = mpsc::channel::<Vec<u8>>(256);
        self.audio_tx = Some(tx);
        let config = self.config.clone();
        let session = self.session.clone();
        let handle = self.handle.clone();
        tokio::spawn(async move {
            run_stt(config, rx, session, handle).await;
        });
    }
}

#[async_trait]
impl Processor for SttProcessor {
    fn name(&self) -> &'static str {
        "stt"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match (&frame, direction) {
            (Frame::Start, Direction::Downstream) => {
                self.start_worker();
                ctx.forward(frame, direction);
            }
            (Frame::Audio(audio), Direction::Downstream) => {
                // audio terminates here; transcripts continue downstream
                if let Some(tx) = &self.audio_tx {
                    if tx.try_send(audio.bytes.clone()).is_err() {
                        trace!("stt audio queue full, dropping frame");
                    }
                }
            }
            (Frame::End { .. } | Frame::Cancel, _) => {
                // dropping the sender closes the worker's stream gracefully
                self.audio_tx = None;
                ctx.forward(frame, direction);
            }
            _ => ctx.forward(frame, direction),
        }
        Ok(())
    }
}

/// Build the Deepgram live URL for telephony PCM.
fn listen_url(config: &DeepgramConfig) -> String {
    format!(
        "wss://api.deepgram.com/v1/listen?model={}&language=en-US&encoding=linear16\
         &sample_rate=8000&channels=1&interim_results=true&smart_format=true\
         &endpointing={}&utterance_end_ms={}",
        config.model, config.endpointing_ms, config.utterance_end_ms
    )
}

/// Worker: one reconnect attempt, then silent-listener degradation.
async fn run_stt(
    config: DeepgramConfig,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    session: SharedSession,
    handle: PipelineHandle,
) {
    for attempt in 0..2 {
        match stream_session(&config, &mut audio_rx, &session, &handle).await {
            Ok(()) => return,
            Err(e) => {
                warn!(attempt, error = %e, "deepgram session failed");
            }
        }
    }
    // both attempts failed: the call continues, the LLM just receives no
    // further input
    info!("stt degraded to silent listener");
    while audio_rx.recv().await.is_some() {}
}

async fn stream_session(
    config: &DeepgramConfig,
    audio_rx: &mut mpsc::Receiver<Vec<u8>>,
    session: &SharedSession,
    handle: &PipelineHandle,
) -> Result<(), String> {
    let mut request = listen_url(config)
        .into_client_request()
        .map_err(|e| e.to_string())?;
    request.headers_mut().insert(
        "Authorization",
        format!("Token {}", config.api_key)
            .parse()
            .map_err(|_| "bad auth header".to_string())?,
    );

    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| e.to_string())?;
    let (mut sink, mut stream) = ws.split();
    debug!("deepgram socket open");

    // segments finalized since the last endpoint, joined on speech_final
    let mut utterance = String::new();

    loop {
        tokio::select! {
            audio = audio_rx.recv() => {
                match audio {
                    Some(bytes) => {
                        sink.send(Message::Binary(bytes.into()))
                            .await
                            .map_err(|e| e.to_string())?;
                    }
                    None => {
                        // pipeline ended — close out politely
                        let _ = sink
                            .send(Message::Text(r#"{"type":"CloseStream"}"#.into()))
                            .await;
                        return Ok(());
                    }
                }
            }
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => return Err(e.to_string()),
                    None => return Err("deepgram closed the socket".to_string()),
                };
                if let Message::Text(text) = msg {
                    handle_result(&text, &mut utterance, session, handle).await;
                }
            }
        }
    }
}

async fn handle_result(
    raw: &str,
    utterance: &mut String,
    session: &SharedSession,
    handle: &PipelineHandle,
) {
    let Ok(result) = serde_json::from_str::<DgMessage>(raw) else {
        trace!("unparseable deepgram message");
        return;
    };
    if result.kind != "Results" {
        return;
    }
    let transcript = result
        .channel
        .as_ref()
        .and_then(|c| c.alternatives.first())
        .map(|a| a.transcript.trim())
        .unwrap_or("");

    if transcript.is_empty() {
        return;
    }

    // any speech while Donna is talking (or during the goodbye-silence
    // window) cuts her off
    if barge_in(session, transcript) {
        debug!(transcript, "barge-in detected");
        handle.inject_upstream("stt", Frame::InterruptClear).await;
    }

    if result.is_final {
        if !utterance.is_empty() {
            utterance.push(' ');
        }
        utterance.push_str(transcript);
    }
    if result.speech_final && !utterance.is_empty() {
        let text = std::mem::take(utterance);
        debug!(text = %text, "final transcript");
        handle
            .inject_after(
                "stt",
                Frame::Transcription {
                    text,
                    is_final: true,
                },
            )
            .await;
    } else if !result.is_final {
        handle
            .inject_after(
                "stt",
                Frame::Transcription {
                    text: transcript.to_string(),
                    is_final: false,
                },
            )
            .await;
    }
}

fn barge_in(session: &SharedSession, transcript: &str) -> bool {
    if transcript.chars().count() <= BARGE_IN_MIN_CHARS {
        return false;
    }
    let s = session.lock().unwrap();
    s.is_speaking || s.goodbye_in_progress
}

// Deepgram live message types (private — deserialization only)

#[derive(Deserialize)]
struct DgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    channel: Option<DgChannel>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
}

#[derive(Deserialize)]
struct DgChannel {
    #[serde(default)]
    alternatives: Vec<DgAlternative>,
}

#[derive(Deserialize)]
struct DgAlternative {
    #[serde(default)]
    transcript: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_core::types::{CallId, CallType, SeniorId};
    use donna_pipeline::Pipeline;
    use donna_session::CallSession;
    use std::time::Duration;

    fn shared_session() -> SharedSession {
        CallSession::new(
            CallId::from("CA-stt"),
            SeniorId::from("senior-1"),
            CallType::CheckIn,
            Duration::from_secs(600),
        )
        .shared()
    }

    #[test]
    fn url_carries_endpointing_options() {
        let cfg = DeepgramConfig {
            api_key: "k".into(),
            model: "nova-2".into(),
            endpointing_ms: 300,
            utterance_end_ms: 1000,
        };
        let url = listen_url(&cfg);
        assert!(url.contains("model=nova-2"));
        assert!(url.contains("endpointing=300"));
        assert!(url.contains("utterance_end_ms=1000"));
        assert!(url.contains("sample_rate=8000"));
    }

    #[test]
    fn barge_in_requires_speech_and_a_speaking_or_goodbye_state() {
        let session = shared_session();
        assert!(!barge_in(&session, "hello there"));

        session.lock().unwrap().is_speaking = true;
        assert!(barge_in(&session, "hello there"));
        // too short — breath noise
        assert!(!barge_in(&session, "mm"));

        session.lock().unwrap().is_speaking = false;
        session.lock().unwrap().goodbye_in_progress = true;
        assert!(barge_in(&session, "oh wait"));
    }

    #[tokio::test]
    async fn segments_accumulate_until_speech_final() {
        let session = shared_session();
        let mut pipeline = Pipeline::new("CA-stt", None);
        pipeline.add(Box::new(SttProcessor::new(
            DeepgramConfig::default(),
            session.clone(),
            pipeline.handle(),
        )));
        let handle = pipeline.handle();
        // drive handle_result directly — no socket involved
        let mut utterance = String::new();

        handle_result(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"I went to"}]},"is_final":true,"speech_final":false}"#,
            &mut utterance,
            &session,
            &handle,
        )
        .await;
        assert_eq!(utterance, "I went to");

        handle_result(
            r#"{"type":"Results","channel":{"alternatives":[{"transcript":"the garden"}]},"is_final":true,"speech_final":true}"#,
            &mut utterance,
            &session,
            &handle,
        )
        .await;
        assert!(utterance.is_empty(), "utterance flushed on speech_final");
    }

    #[tokio::test]
    async fn audio_frames_are_consumed_not_forwarded() {
        let session = shared_session();
        let pipeline = Pipeline::new("CA-stt", None);
        let mut stt = SttProcessor::new(DeepgramConfig::default(), session, pipeline.handle());
        let mut ctx = ProcessorContext::default();
        stt.process(
            Frame::Audio(donna_pipeline::AudioFrame {
                bytes: vec![0; 320],
                sample_rate: 8000,
                encoding: donna_pipeline::AudioEncoding::Pcm16,
            }),
            Direction::Downstream,
            &mut ctx,
        )
        .await
        .unwrap();
        assert!(ctx.out.is_empty());
    }
}
