use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use donna_core::types::EndReason;

use crate::frame::{Direction, Frame};
use crate::processor::{Processor, ProcessorContext};

/// Queue depth between background injectors and the pipeline task.
const INJECT_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("processor error: {0}")]
    Processor(String),

    #[error("pipeline channel closed")]
    ChannelClosed,
}

/// Lifecycle of a call pipeline.
///
/// `Constructing → Running` on the first frame, `Running → Draining` when an
/// `end` frame is observed, `Draining → Ended` once it has flushed through
/// every processor. `cancel` jumps straight to `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Constructing,
    Running,
    Draining,
    Ended,
}

/// A frame re-entering the chain from outside the pipeline task.
struct InjectEvent {
    /// Anchor processor name; `None` means the chain head.
    origin: Option<&'static str>,
    direction: Direction,
    frame: Frame,
}

struct ScheduledEnd {
    task: tokio::task::JoinHandle<()>,
    cancellable: bool,
}

/// Cloneable entry point for feeding frames into a running pipeline.
///
/// Held by the telephony socket task (source frames) and by processors that
/// produce frames from async callbacks: STT results, TTS audio, LLM deltas,
/// and the delayed goodbye/hard-limit `end` frames.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<InjectEvent>,
    scheduled_end: Arc<Mutex<Option<ScheduledEnd>>>,
}

impl PipelineHandle {
    /// Feed a frame in at the chain head, downstream. Used by the telephony
    /// socket task for inbound audio and control frames.
    pub async fn push(&self, frame: Frame) -> bool {
        self.tx
            .send(InjectEvent {
                origin: None,
                direction: Direction::Downstream,
                frame,
            })
            .await
            .is_ok()
    }

    /// Inject a frame as if it had been emitted downstream by `origin`.
    pub async fn inject_after(&self, origin: &'static str, frame: Frame) -> bool {
        self.tx
            .send(InjectEvent {
                origin: Some(origin),
                direction: Direction::Downstream,
                frame,
            })
            .await
            .is_ok()
    }

    /// Inject a frame as if `origin` had emitted it upstream.
    pub async fn inject_upstream(&self, origin: &'static str, frame: Frame) -> bool {
        self.tx
            .send(InjectEvent {
                origin: Some(origin),
                direction: Direction::Upstream,
                frame,
            })
            .await
            .is_ok()
    }

    /// Schedule an `end` frame after `delay`, replacing any previously
    /// scheduled end. A cancellable end (the goodbye-silence window) is
    /// withdrawn by [`cancel_scheduled_end`](Self::cancel_scheduled_end);
    /// hard-limit ends are not.
    pub fn schedule_end(&self, delay: Duration, reason: EndReason, cancellable: bool) {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(InjectEvent {
                    origin: None,
                    direction: Direction::Downstream,
                    frame: Frame::End { reason },
                })
                .await;
        });

        let mut slot = self.scheduled_end.lock().unwrap();
        if let Some(prev) = slot.take() {
            prev.task.abort();
        }
        *slot = Some(ScheduledEnd { task, cancellable });
    }

    /// Withdraw a pending cancellable end (the false-goodbye path). Returns
    /// true when something was actually cancelled.
    pub fn cancel_scheduled_end(&self) -> bool {
        let mut slot = self.scheduled_end.lock().unwrap();
        match slot.as_ref() {
            Some(s) if s.cancellable => {
                slot.take().unwrap().task.abort();
                true
            }
            _ => false,
        }
    }

    fn abort_scheduled_end(&self) {
        if let Some(s) = self.scheduled_end.lock().unwrap().take() {
            s.task.abort();
        }
    }
}

/// A linear chain of processors run as a single logical task owning all
/// per-call resources.
pub struct Pipeline {
    /// Call identifier, for log correlation only.
    label: String,
    chain: Vec<Box<dyn Processor>>,
    rx: mpsc::Receiver<InjectEvent>,
    handle: PipelineHandle,
    state: PipelineState,
    /// Ambient deadline; expiry converts to a graceful `end` frame.
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(label: impl Into<String>, deadline: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(INJECT_QUEUE_DEPTH);
        Self {
            label: label.into(),
            chain: Vec::new(),
            rx,
            handle: PipelineHandle {
                tx,
                scheduled_end: Arc::new(Mutex::new(None)),
            },
            state: PipelineState::Constructing,
            deadline,
        }
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Append a processor to the tail of the chain.
    pub fn add(&mut self, processor: Box<dyn Processor>) {
        self.chain.push(processor);
    }

    /// Drive the pipeline until a terminal frame has traversed the chain or
    /// the deadline expires. Returns the termination reason.
    pub async fn run(mut self) -> EndReason {
        info!(call_id = %self.label, processors = self.chain.len(), "pipeline starting");

        let deadline = self.deadline.unwrap_or(Duration::from_secs(60 * 60));
        let deadline_sleep = tokio::time::sleep(deadline);
        tokio::pin!(deadline_sleep);

        let reason = loop {
            tokio::select! {
                ev = self.rx.recv() => {
                    let Some(ev) = ev else {
                        // every handle dropped — treat as a dead socket
                        break EndReason::SocketClosed;
                    };
                    if self.state == PipelineState::Constructing {
                        self.state = PipelineState::Running;
                        debug!(call_id = %self.label, "pipeline running");
                    }
                    if let Some(reason) = self.dispatch(ev).await {
                        break reason;
                    }
                }
                _ = &mut deadline_sleep => {
                    debug!(call_id = %self.label, "deadline expired, draining");
                    let ev = InjectEvent {
                        origin: None,
                        direction: Direction::Downstream,
                        frame: Frame::End { reason: EndReason::DeadlineExpired },
                    };
                    if let Some(reason) = self.dispatch(ev).await {
                        break reason;
                    }
                }
            }
        };

        self.state = PipelineState::Ended;
        self.handle.abort_scheduled_end();
        info!(call_id = %self.label, %reason, "pipeline ended");
        reason
    }

    /// Walk one event through the chain, depth-first so that frames emitted
    /// by a processor fully propagate before its next emission starts. This
    /// preserves per-edge FIFO ordering.
    ///
    /// Returns `Some(reason)` when a terminal frame has left the chain.
    async fn dispatch(&mut self, ev: InjectEvent) -> Option<EndReason> {
        let entry = match self.entry_index(&ev) {
            Some(i) => i,
            None => {
                // injected past either edge of the chain — frame exits here
                return match ev.frame {
                    Frame::End { reason } => Some(reason),
                    Frame::Cancel => Some(EndReason::Cancelled),
                    _ => None,
                };
            }
        };

        let mut stack: Vec<(usize, Direction, Frame)> = vec![(entry, ev.direction, ev.frame)];

        while let Some((idx, direction, frame)) = stack.pop() {
            if matches!(frame, Frame::Cancel) {
                // hard abort: drop everything in flight, no draining
                return Some(EndReason::Cancelled);
            }
            if matches!(frame, Frame::End { .. }) && self.state == PipelineState::Running {
                self.state = PipelineState::Draining;
                debug!(call_id = %self.label, "pipeline draining");
            }

            // Control frames are pre-cloned so an erroring processor cannot
            // swallow a termination or barge-in; bulk frames are not worth it.
            let recovery = match &frame {
                Frame::Audio(_) | Frame::Text { .. } => None,
                other => Some(other.clone()),
            };

            let mut ctx = ProcessorContext::default();
            let proc = &mut self.chain[idx];
            if let Err(e) = proc.process(frame, direction, &mut ctx).await {
                warn!(
                    call_id = %self.label,
                    processor = proc.name(),
                    error = %e,
                    "processor failed, skipping for this frame"
                );
                ctx.out.clear();
                if let Some(f) = recovery {
                    ctx.out.push((f, direction));
                }
            }

            // Reverse push so the first emission is processed first.
            for (f, dir) in ctx.out.into_iter().rev() {
                let next = match dir {
                    Direction::Downstream => {
                        if idx + 1 < self.chain.len() {
                            idx + 1
                        } else {
                            // exited past the tail
                            match f {
                                Frame::End { reason } => return Some(reason),
                                Frame::Cancel => return Some(EndReason::Cancelled),
                                _ => continue,
                            }
                        }
                    }
                    Direction::Upstream => {
                        if idx > 0 {
                            idx - 1
                        } else {
                            match f {
                                Frame::End { reason } => return Some(reason),
                                Frame::Cancel => return Some(EndReason::Cancelled),
                                _ => continue,
                            }
                        }
                    }
                };
                stack.push((next, dir, f));
            }
        }

        None
    }

    fn entry_index(&self, ev: &InjectEvent) -> Option<usize> {
        match ev.origin {
            None => {
                if self.chain.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Some(name) => {
                let anchor = self.chain.iter().position(|p| p.name() == name)?;
                match ev.direction {
                    Direction::Downstream => {
                        if anchor + 1 < self.chain.len() {
                            Some(anchor + 1)
                        } else {
                            None
                        }
                    }
                    Direction::Upstream => {
                        if anchor > 0 {
                            Some(anchor - 1)
                        } else {
                            None
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Records every frame kind it sees and forwards everything.
    struct Tap {
        name: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Processor for Tap {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn process(
            &mut self,
            frame: Frame,
            direction: Direction,
            ctx: &mut ProcessorContext,
        ) -> Result<(), PipelineError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, frame.kind()));
            ctx.forward(frame, direction);
            Ok(())
        }
    }

    /// Echoes an upstream InterruptClear for every final transcription.
    struct BargeIn;

    #[async_trait]
    impl Processor for BargeIn {
        fn name(&self) -> &'static str {
            "barge"
        }

        async fn process(
            &mut self,
            frame: Frame,
            direction: Direction,
            ctx: &mut ProcessorContext,
        ) -> Result<(), PipelineError> {
            if let Frame::Transcription { is_final: true, .. } = &frame {
                ctx.emit_upstream(Frame::InterruptClear);
            }
            ctx.forward(frame, direction);
            Ok(())
        }
    }

    fn tap(name: &'static str, seen: &Arc<Mutex<Vec<String>>>) -> Box<Tap> {
        Box::new(Tap {
            name,
            seen: Arc::clone(seen),
        })
    }

    #[tokio::test]
    async fn frames_traverse_in_order_and_end_terminates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new("CA-test", None);
        p.add(tap("a", &seen));
        p.add(tap("b", &seen));
        let h = p.handle();

        let runner = tokio::spawn(p.run());
        h.push(Frame::Start).await;
        h.push(Frame::Text {
            text: "hi".into(),
        })
        .await;
        h.push(Frame::End {
            reason: EndReason::Goodbye,
        })
        .await;

        let reason = runner.await.unwrap();
        assert_eq!(reason, EndReason::Goodbye);
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec!["a:start", "b:start", "a:text", "b:text", "a:end", "b:end"]
        );
    }

    #[tokio::test]
    async fn upstream_frames_travel_toward_head() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new("CA-test", None);
        p.add(tap("head", &seen));
        p.add(Box::new(BargeIn));
        p.add(tap("tail", &seen));
        let h = p.handle();

        let runner = tokio::spawn(p.run());
        h.push(Frame::Transcription {
            text: "stop".into(),
            is_final: true,
        })
        .await;
        h.push(Frame::End {
            reason: EndReason::SocketClosed,
        })
        .await;
        runner.await.unwrap();

        let seen = seen.lock().unwrap();
        // head sees the transcription going down, then the clear coming back
        assert!(seen.contains(&"head:interrupt_clear".to_string()));
        // the clear never travels past the emitting processor downstream
        assert!(!seen.contains(&"tail:interrupt_clear".to_string()));
    }

    #[tokio::test]
    async fn cancel_aborts_without_draining() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new("CA-test", None);
        p.add(tap("only", &seen));
        let h = p.handle();

        let runner = tokio::spawn(p.run());
        h.push(Frame::Cancel).await;
        let reason = runner.await.unwrap();
        assert_eq!(reason, EndReason::Cancelled);
        // cancel is never delivered to processors
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_end_fires_and_cancellable_end_can_be_withdrawn() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new("CA-test", None);
        p.add(tap("only", &seen));
        let h = p.handle();

        let runner = tokio::spawn(p.run());
        h.schedule_end(Duration::from_millis(10), EndReason::Goodbye, true);
        let reason = tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, EndReason::Goodbye);

        // a withdrawn goodbye never fires
        let mut p = Pipeline::new("CA-test2", None);
        p.add(Box::new(BargeIn));
        let h = p.handle();
        let runner = tokio::spawn(p.run());
        h.schedule_end(Duration::from_millis(50), EndReason::Goodbye, true);
        assert!(h.cancel_scheduled_end());
        tokio::time::sleep(Duration::from_millis(80)).await;
        h.push(Frame::End {
            reason: EndReason::HardLimit,
        })
        .await;
        let reason = runner.await.unwrap();
        assert_eq!(reason, EndReason::HardLimit);
    }

    #[tokio::test]
    async fn hard_limit_end_is_not_cancellable() {
        let p = Pipeline::new("CA-test", None);
        let h = p.handle();
        h.schedule_end(Duration::from_secs(30), EndReason::HardLimit, false);
        assert!(!h.cancel_scheduled_end());
        h.abort_scheduled_end();
    }

    #[tokio::test]
    async fn deadline_converts_to_graceful_end() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut p = Pipeline::new("CA-test", Some(Duration::from_millis(20)));
        p.add(tap("only", &seen));
        let _h = p.handle();

        let reason = p.run().await;
        assert_eq!(reason, EndReason::DeadlineExpired);
        // graceful: the end frame was delivered for draining
        assert_eq!(*seen.lock().unwrap(), vec!["only:end"]);
    }
}
