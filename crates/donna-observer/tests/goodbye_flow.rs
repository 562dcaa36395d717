// End-to-end goodbye handling through a real pipeline: a strong goodbye
// arms a delayed end, and speech inside the silence window withdraws it
// via the barge-in path.

use std::time::Duration;

use tokio::sync::mpsc;

use donna_core::types::{CallId, CallType, EndReason};
use donna_observer::QuickObserver;
use donna_pipeline::{Direction, Frame, Pipeline, PipelineError, Processor, ProcessorContext};
use donna_session::{CallSession, ContextAggregator, SharedSession};
use donna_telephony::{InterruptEpoch, OutboundMessage, TransportIn};

/// Swallows everything at the tail so terminal frames exit the chain.
struct Sink;

#[async_trait::async_trait]
impl Processor for Sink {
    fn name(&self) -> &'static str {
        "sink"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        ctx.forward(frame, direction);
        Ok(())
    }
}

struct Call {
    session: SharedSession,
    handle: donna_pipeline::PipelineHandle,
    runner: tokio::task::JoinHandle<EndReason>,
    _out_rx: mpsc::Receiver<OutboundMessage>,
}

fn start_call(goodbye_silence: Duration) -> Call {
    let session = CallSession::new(
        CallId::from("CA-flow"),
        donna_core::types::SeniorId::from("senior-1"),
        CallType::CheckIn,
        Duration::from_secs(600),
    )
    .shared();

    let (out_tx, out_rx) = mpsc::channel(16);
    let mut pipeline = Pipeline::new("CA-flow", None);
    let handle = pipeline.handle();
    pipeline.add(Box::new(TransportIn::new(
        session.clone(),
        handle.clone(),
        out_tx,
        InterruptEpoch::new(),
    )));
    pipeline.add(Box::new(QuickObserver::new(
        session.clone(),
        handle.clone(),
        goodbye_silence,
    )));
    pipeline.add(Box::new(ContextAggregator::new()));
    pipeline.add(Box::new(Sink));

    let runner = tokio::spawn(pipeline.run());
    Call {
        session,
        handle,
        runner,
        _out_rx: out_rx,
    }
}

#[tokio::test]
async fn strong_goodbye_ends_the_call_after_the_silence_window() {
    let call = start_call(Duration::from_millis(80));

    call.handle.push(Frame::Start).await;
    call.handle
        .push(Frame::Transcription {
            text: "Goodbye Donna, talk to you tomorrow!".into(),
            is_final: true,
        })
        .await;

    let reason = tokio::time::timeout(Duration::from_secs(2), call.runner)
        .await
        .expect("call should end inside the window")
        .unwrap();
    assert_eq!(reason, EndReason::Goodbye);

    let s = call.session.lock().unwrap();
    assert!(s.senior_said_goodbye);
}

#[tokio::test]
async fn speaking_inside_the_window_cancels_the_goodbye() {
    let call = start_call(Duration::from_millis(120));

    call.handle.push(Frame::Start).await;
    call.handle
        .push(Frame::Transcription {
            text: "Goodbye Donna, talk to you tomorrow!".into(),
            is_final: true,
        })
        .await;
    assert!(call.session.lock().unwrap().goodbye_in_progress);

    // the senior speaks again — the STT path would emit this clear
    tokio::time::sleep(Duration::from_millis(30)).await;
    call.handle
        .inject_upstream("observer", Frame::InterruptClear)
        .await;
    call.handle
        .push(Frame::Transcription {
            text: "Oh wait, I forgot to tell you something.".into(),
            is_final: true,
        })
        .await;

    // well past the original window: the call must still be alive
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!call.runner.is_finished(), "goodbye end must be withdrawn");
    assert!(!call.session.lock().unwrap().goodbye_in_progress);

    call.handle
        .push(Frame::End {
            reason: EndReason::SocketClosed,
        })
        .await;
    let reason = call.runner.await.unwrap();
    assert_eq!(reason, EndReason::SocketClosed);
}
