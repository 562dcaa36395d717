use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use donna_core::config::{OUTBOUND_PACKET_BYTES, TELEPHONY_SAMPLE_RATE, TTS_SAMPLE_RATE};
use donna_pipeline::{
    AudioEncoding, AudioFrame, Direction, Frame, PipelineError, PipelineHandle, Processor,
    ProcessorContext,
};
use donna_session::SharedSession;

use crate::events::OutboundMessage;
use crate::mulaw;

/// Burst this many packets before pacing kicks in, to prime the jitter buffer.
const PACING_BURST_PACKETS: usize = 2;
/// Per-packet pacing sleep — slightly under the 400 ms of audio per packet so
/// the stream stays ahead of real time without flooding the provider buffer.
const PACING_SLEEP: Duration = Duration::from_millis(320);

/// Monotone counter bumped on every barge-in. Outbound packets are tagged
/// with the epoch current when they were synthesized; the paced writer drops
/// anything from a superseded epoch, which is how "purge pending utterances"
/// is implemented without locking the queue.
#[derive(Clone)]
pub struct InterruptEpoch(Arc<AtomicU64>);

impl InterruptEpoch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Default for InterruptEpoch {
    fn default() -> Self {
        Self::new()
    }
}

/// Head of the chain ("transport_in").
///
/// Decodes inbound μ-law to PCM-16 for STT and anchors the barge-in path:
/// an upstream `interrupt-clear` arriving here marks the transport silent,
/// tells the provider to drop its buffered audio, withdraws any pending
/// goodbye end, and is reflected downstream so every buffering processor
/// observes it.
pub struct TransportIn {
    session: SharedSession,
    handle: PipelineHandle,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    epoch: InterruptEpoch,
}

impl TransportIn {
    pub fn new(
        session: SharedSession,
        handle: PipelineHandle,
        outbound_tx: mpsc::Sender<OutboundMessage>,
        epoch: InterruptEpoch,
    ) -> Self {
        Self {
            session,
            handle,
            outbound_tx,
            epoch,
        }
    }
}

#[async_trait]
impl Processor for TransportIn {
    fn name(&self) -> &'static str {
        "transport_in"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match (frame, direction) {
            (Frame::Audio(audio), Direction::Downstream)
                if audio.encoding == AudioEncoding::MulawU8 =>
            {
                let pcm = mulaw::decode(&audio.bytes);
                ctx.emit(Frame::Audio(AudioFrame {
                    bytes: pcm,
                    sample_rate: TELEPHONY_SAMPLE_RATE,
                    encoding: AudioEncoding::Pcm16,
                }));
            }
            (Frame::InterruptClear, Direction::Upstream) => {
                self.epoch.bump();
                {
                    let mut session = self.session.lock().unwrap();
                    session.is_speaking = false;
                    if session.goodbye_in_progress || session.call_ending_initiated {
                        debug!(call_id = %session.call_id, "barge-in during goodbye window");
                        session.clear_goodbye();
                    }
                }
                self.handle.cancel_scheduled_end();
                if self.outbound_tx.send(OutboundMessage::Clear).await.is_err() {
                    warn!("outbound channel closed while sending clear");
                }
                // reflect downstream so LLM/TTS/stripper abandon their work
                ctx.emit(Frame::InterruptClear);
            }
            (frame, direction) => ctx.forward(frame, direction),
        }
        Ok(())
    }
}

/// Tail of the chain ("transport_out").
///
/// Re-encodes synthesized PCM to μ-law 8 kHz, frames it into ~400 ms
/// packets, and hands them to the paced writer. Control frames are
/// forwarded so terminal frames exit past the tail.
pub struct TransportOut {
    session: SharedSession,
    audio_tx: mpsc::Sender<(u64, Vec<u8>)>,
    epoch: InterruptEpoch,
}

impl TransportOut {
    pub fn new(
        session: SharedSession,
        audio_tx: mpsc::Sender<(u64, Vec<u8>)>,
        epoch: InterruptEpoch,
    ) -> Self {
        Self {
            session,
            audio_tx,
            epoch,
        }
    }
}

#[async_trait]
impl Processor for TransportOut {
    fn name(&self) -> &'static str {
        "transport_out"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match (frame, direction) {
            (Frame::Audio(audio), Direction::Downstream) => {
                let encoded = match audio.encoding {
                    AudioEncoding::MulawU8 => audio.bytes,
                    AudioEncoding::Pcm16 if audio.sample_rate == TTS_SAMPLE_RATE => {
                        mulaw::encode(&mulaw::downsample_24k_to_8k(&audio.bytes))
                    }
                    AudioEncoding::Pcm16 => mulaw::encode(&audio.bytes),
                };

                let tag = self.epoch.current();
                self.session.lock().unwrap().is_speaking = true;
                for packet in encoded.chunks(OUTBOUND_PACKET_BYTES) {
                    if self.audio_tx.send((tag, packet.to_vec())).await.is_err() {
                        return Err(PipelineError::ChannelClosed);
                    }
                }
            }
            (frame, direction) => ctx.forward(frame, direction),
        }
        Ok(())
    }
}

/// Paced packet writer — one task per call.
///
/// Pulls epoch-tagged μ-law packets from the transport-out queue, drops
/// anything a barge-in superseded, and emits each surviving packet plus a
/// trailing mark through the socket channel. One await per packet keeps the
/// abort latency inside a single packet.
pub async fn paced_writer(
    mut audio_rx: mpsc::Receiver<(u64, Vec<u8>)>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    epoch: InterruptEpoch,
) {
    let mut sent_in_burst = 0usize;

    while let Some((tag, packet)) = audio_rx.recv().await {
        if tag < epoch.current() {
            trace!(tag, "dropping superseded audio packet");
            sent_in_burst = 0;
            continue;
        }

        if sent_in_burst >= PACING_BURST_PACKETS {
            tokio::time::sleep(PACING_SLEEP).await;
            // the interrupt may have landed while we slept
            if tag < epoch.current() {
                sent_in_burst = 0;
                continue;
            }
        }

        if outbound_tx.send(OutboundMessage::Media(packet)).await.is_err() {
            return;
        }
        sent_in_burst += 1;

        // queue momentarily dry — drop a mark so the provider tells us when
        // playback actually finished
        if audio_rx.is_empty() {
            sent_in_burst = 0;
            if outbound_tx
                .send(OutboundMessage::Mark("utterance-end".to_string()))
                .await
                .is_err()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_core::types::{CallId, CallType, EndReason, SeniorId};
    use donna_pipeline::Pipeline;
    use donna_session::CallSession;

    fn shared_session() -> SharedSession {
        CallSession::new(
            CallId::from("CA-transport"),
            SeniorId::from("senior-1"),
            CallType::CheckIn,
            Duration::from_secs(600),
        )
        .shared()
    }

    #[tokio::test]
    async fn inbound_mulaw_is_decoded_to_pcm16() {
        let (out_tx, _out_rx) = mpsc::channel(8);
        let pipeline = Pipeline::new("CA-t", None);
        let mut t = TransportIn::new(
            shared_session(),
            pipeline.handle(),
            out_tx,
            InterruptEpoch::new(),
        );

        let mut ctx = ProcessorContext::default();
        t.process(
            Frame::Audio(AudioFrame {
                bytes: vec![0xFF, 0xFF],
                sample_rate: 8000,
                encoding: AudioEncoding::MulawU8,
            }),
            Direction::Downstream,
            &mut ctx,
        )
        .await
        .unwrap();

        match &ctx.out[0].0 {
            Frame::Audio(a) => {
                assert_eq!(a.encoding, AudioEncoding::Pcm16);
                assert_eq!(a.bytes.len(), 4);
                assert_eq!(a.sample_rate, 8000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upstream_clear_purges_goodbye_and_notifies_provider() {
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let pipeline = Pipeline::new("CA-t", None);
        let handle = pipeline.handle();
        let session = shared_session();
        session.lock().unwrap().goodbye_in_progress = true;
        session.lock().unwrap().call_ending_initiated = true;
        handle.schedule_end(Duration::from_secs(5), EndReason::Goodbye, true);

        let epoch = InterruptEpoch::new();
        let mut t = TransportIn::new(session.clone(), handle.clone(), out_tx, epoch.clone());
        let mut ctx = ProcessorContext::default();
        t.process(Frame::InterruptClear, Direction::Upstream, &mut ctx)
            .await
            .unwrap();

        assert!(matches!(out_rx.recv().await, Some(OutboundMessage::Clear)));
        assert_eq!(epoch.current(), 1);
        let s = session.lock().unwrap();
        assert!(!s.goodbye_in_progress);
        assert!(!s.call_ending_initiated);
        assert!(!s.is_speaking);
        // clear is reflected downstream
        assert!(matches!(
            ctx.out[0],
            (Frame::InterruptClear, Direction::Downstream)
        ));
        // the scheduled goodbye end was withdrawn
        assert!(!handle.cancel_scheduled_end());
    }

    #[tokio::test]
    async fn outbound_pcm24k_is_framed_into_mulaw_packets() {
        let (audio_tx, mut audio_rx) = mpsc::channel(64);
        let session = shared_session();
        let mut t = TransportOut::new(session.clone(), audio_tx, InterruptEpoch::new());

        // one second of 24 kHz PCM (48000 bytes) → 8000 μ-law bytes →
        // 2 packets of 3200 + 1 of 1600
        let pcm = vec![0u8; 48_000];
        let mut ctx = ProcessorContext::default();
        t.process(
            Frame::Audio(AudioFrame {
                bytes: pcm,
                sample_rate: TTS_SAMPLE_RATE,
                encoding: AudioEncoding::Pcm16,
            }),
            Direction::Downstream,
            &mut ctx,
        )
        .await
        .unwrap();

        assert!(session.lock().unwrap().is_speaking);
        let mut sizes = Vec::new();
        while let Ok((_, p)) = audio_rx.try_recv() {
            sizes.push(p.len());
        }
        assert_eq!(sizes, vec![3200, 3200, 1600]);
    }

    #[tokio::test]
    async fn paced_writer_drops_superseded_packets() {
        let (audio_tx, audio_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let epoch = InterruptEpoch::new();

        audio_tx.send((0, vec![1u8; 10])).await.unwrap();
        audio_tx.send((0, vec![2u8; 10])).await.unwrap();
        epoch.bump();
        audio_tx.send((1, vec![3u8; 10])).await.unwrap();
        drop(audio_tx);

        paced_writer(audio_rx, out_tx, epoch).await;

        let mut media = Vec::new();
        while let Ok(msg) = out_rx.try_recv() {
            if let OutboundMessage::Media(m) = msg {
                media.push(m[0]);
            }
        }
        // only the post-interrupt packet survives
        assert_eq!(media, vec![3]);
    }
}
