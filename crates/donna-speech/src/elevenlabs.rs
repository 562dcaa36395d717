use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use donna_core::config::{ElevenLabsConfig, TTS_SAMPLE_RATE};
use donna_pipeline::{
    AudioEncoding, AudioFrame, Direction, Frame, PipelineError, PipelineHandle, Processor,
    ProcessorContext,
};

/// Consecutive synthesis failures before the worker stops trying and the
/// call goes on without a voice.
const MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// Streaming text-to-speech stage ("tts").
///
/// Sentence chunks are queued to a synthesis worker; the worker streams PCM
/// back into the pipeline as it arrives, so speech starts before the full
/// reply is synthesized. A barge-in clear terminates the current synthesis
/// immediately: the old worker's cancellation token fires and a fresh worker
/// takes over the queue.
pub struct TtsProcessor {
    config: ElevenLabsConfig,
    handle: PipelineHandle,
    text_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
}

impl TtsProcessor {
    pub fn new(config: ElevenLabsConfig, handle: PipelineHandle) -> Self {
        let (text_tx, cancel) = spawn_worker(&config, &handle);
        Self {
            config,
            handle,
            text_tx,
            cancel,
        }
    }

    /// Abandon partially-synthesized audio and start clean.
    fn terminate(&mut self) {
        self.cancel.cancel();
        let (text_tx, cancel) = spawn_worker(&self.config, &self.handle);
        self.text_tx = text_tx;
        self.cancel = cancel;
    }
}

fn spawn_worker(
    config: &ElevenLabsConfig,
    handle: &PipelineHandle,
) -> (mpsc::Sender<String>, CancellationToken) {
    let (tx, rx) = mpsc::channel::<String>(64);
    let token = CancellationToken::new();
    let worker = SynthWorker {
        config: config.clone(),
        handle: handle.clone(),
        client: reqwest::Client::new(),
        cancel: token.clone(),
    };
    tokio::spawn(worker.run(rx));
    (tx, token)
}

#[async_trait]
impl Processor for TtsProcessor {
    fn name(&self) -> &'static str {
        "tts"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match (&frame, direction) {
            (Frame::Text { text }, Direction::Downstream) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() && self.text_tx.try_send(trimmed.to_string()).is_err() {
                    warn!("tts queue full, dropping sentence");
                }
                // text terminates here; audio re-enters via the handle
            }
            (Frame::InterruptClear, _) => {
                self.terminate();
                ctx.forward(frame, direction);
            }
            (Frame::End { .. } | Frame::Cancel, _) => {
                self.cancel.cancel();
                ctx.forward(frame, direction);
            }
            _ => ctx.forward(frame, direction),
        }
        Ok(())
    }
}

struct SynthWorker {
    config: ElevenLabsConfig,
    handle: PipelineHandle,
    client: reqwest::Client,
    cancel: CancellationToken,
}

impl SynthWorker {
    async fn run(self, mut text_rx: mpsc::Receiver<String>) {
        let mut failures = 0u32;
        loop {
            let text = tokio::select! {
                _ = self.cancel.cancelled() => return,
                t = text_rx.recv() => match t {
                    Some(t) => t,
                    None => return,
                },
            };

            if failures >= MAX_CONSECUTIVE_FAILURES {
                // degraded: swallow text so the queue never backs up
                trace!("tts degraded, dropping sentence");
                continue;
            }

            match self.synthesize(&text).await {
                Ok(()) => failures = 0,
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, failures, "tts synthesis failed");
                }
            }
        }
    }

    /// Stream one sentence, injecting audio chunks as they arrive. Observes
    /// the cancellation token at every chunk.
    async fn synthesize(&self, text: &str) -> Result<(), String> {
        use futures_util::StreamExt;

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}/stream?output_format=pcm_24000",
            self.config.voice_id
        );

        debug!(chars = text.len(), "synthesizing");

        let resp = self
            .client
            .post(&url)
            .header("xi-api-key", &self.config.api_key)
            .json(&serde_json::json!({
                "text": text,
                "model_id": self.config.model,
                "voice_settings": { "stability": 0.5, "similarity_boost": 0.75 },
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !resp.status().is_success() {
            return Err(format!("status {}", resp.status().as_u16()));
        }

        let mut stream = resp.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                c = stream.next() => match c {
                    Some(Ok(c)) => c,
                    Some(Err(e)) => return Err(e.to_string()),
                    None => break,
                },
            };
            if chunk.is_empty() {
                continue;
            }
            self.handle
                .inject_after(
                    "tts",
                    Frame::Audio(AudioFrame {
                        bytes: chunk.to_vec(),
                        sample_rate: TTS_SAMPLE_RATE,
                        encoding: AudioEncoding::Pcm16,
                    }),
                )
                .await;
        }
        Ok(())
    }
}
