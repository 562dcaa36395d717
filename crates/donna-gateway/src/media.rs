//! The Twilio media-stream socket — one connection per live call.
//!
//! The socket task is the only owner of the WebSocket. It multiplexes
//! between provider messages (decoded and pushed into the pipeline) and
//! outbound messages from the paced writer. The frame pipeline itself runs
//! as a sibling task; when it ends, post-call orchestration is detached
//! with its own error boundary.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use donna_agent::{ResponseGenerator, SystemPromptBuilder};
use donna_core::types::{CallId, CallType, EndReason};
use donna_director::{DirectorContext, DirectorProcessor};
use donna_observer::QuickObserver;
use donna_pipeline::{AudioEncoding, AudioFrame, Frame, GuidanceStripper, Pipeline};
use donna_scheduler::PreparedCallContext;
use donna_session::{CallSession, ContextAggregator, ConversationTracker};
use donna_speech::{SttProcessor, TtsProcessor};
use donna_telephony::{
    normalize_phone, paced_writer, InterruptEpoch, OutboundMessage, TransportIn, TransportOut,
    TwilioEvent,
};

use crate::app::AppState;

/// Outbound socket queue depth: small, so the paced writer backpressures
/// instead of building a deep provider-side buffer.
const OUTBOUND_QUEUE: usize = 8;
/// Grace on top of the hard kill before the ambient deadline fires.
const DEADLINE_GRACE_SECS: u64 = 120;

/// Axum handler — upgrades HTTP to WebSocket at GET /twilio/media.
pub async fn media_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_media_stream(socket, state))
}

/// Per-connection task — lives for the entire call.
async fn handle_media_stream(mut socket: WebSocket, state: Arc<AppState>) {
    info!("media stream connected");

    // phase 1: wait for the start event that names the call
    let (stream_sid, call_id, context) = loop {
        let msg = match socket.recv().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                info!("media stream closed before start");
                return;
            }
            Some(Err(e)) => {
                warn!("media socket error before start: {e}");
                return;
            }
            _ => continue,
        };

        let event: TwilioEvent = match serde_json::from_str(&msg) {
            Ok(e) => e,
            Err(e) => {
                // malformed control message: logged and ignored
                warn!("unparseable stream message: {e}");
                continue;
            }
        };

        if let TwilioEvent::Start { stream_sid, start } = event {
            let call_id = CallId::from(start.call_sid.clone());
            let phone = start
                .custom_parameters
                .get("phone")
                .map(|p| normalize_phone(p));

            let context =
                match resolve_context(&state, &call_id, phone.as_deref(), &start.custom_parameters)
                    .await
                {
                    Some(ctx) => ctx,
                    None => {
                        warn!(call_id = %call_id, "no senior resolvable for call, dropping");
                        return;
                    }
                };
            break (stream_sid, call_id, context);
        }
    };

    info!(call_id = %call_id, stream_sid = %stream_sid, senior = %context.senior.id, "call starting");

    // phase 2: assemble the per-call pipeline
    let max_duration = Duration::from_secs(state.config.calls.max_duration_minutes as u64 * 60);
    let session = CallSession::new(
        call_id.clone(),
        context.senior.id.clone(),
        context.call_type,
        max_duration,
    );
    let session = {
        let mut s = session;
        s.pending_reminders = context.pending_reminders.clone();
        s.shared()
    };

    let system_prompt = SystemPromptBuilder::new(&context.senior.first_name, context.call_type)
        .interests(&context.senior.interests)
        .medical_notes(context.senior.medical_notes.as_deref())
        .family(context.senior.family.as_deref())
        .memory_context(Some(context.memory_block.as_str()))
        .daily_context(Some(context.daily_block.as_str()))
        .reminder_block(Some(context.reminder_block.as_str()))
        .build();

    let deadline =
        Duration::from_secs_f64(state.config.hard_limit_minutes() * 60.0 + DEADLINE_GRACE_SECS as f64);
    let mut pipeline = Pipeline::new(call_id.as_str(), Some(deadline));
    let handle = pipeline.handle();

    let epoch = InterruptEpoch::new();
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE);
    let (audio_tx, audio_rx) = mpsc::channel::<(u64, Vec<u8>)>(64);

    pipeline.add(Box::new(TransportIn::new(
        session.clone(),
        handle.clone(),
        out_tx.clone(),
        epoch.clone(),
    )));
    pipeline.add(Box::new(SttProcessor::new(
        state.config.deepgram.clone(),
        session.clone(),
        handle.clone(),
    )));
    pipeline.add(Box::new(QuickObserver::new(
        session.clone(),
        handle.clone(),
        Duration::from_secs_f64(state.config.calls.goodbye_silence_seconds),
    )));
    pipeline.add(Box::new(DirectorProcessor::new(
        session.clone(),
        handle.clone(),
        Arc::clone(&state.provider),
        state.config.llm.model.clone(),
        DirectorContext {
            senior_name: context.senior.first_name.clone(),
            profile_summary: context.senior.summary(),
            memories_block: context.memory_block.clone(),
            daily_block: context.daily_block.clone(),
        },
    )));
    pipeline.add(Box::new(ContextAggregator::new()));
    pipeline.add(Box::new(ResponseGenerator::new(
        Arc::clone(&state.provider),
        state.config.llm.model.clone(),
        system_prompt,
        session.clone(),
        handle.clone(),
    )));
    pipeline.add(Box::new(ConversationTracker::new(session.clone())));
    pipeline.add(Box::new(GuidanceStripper::new()));
    pipeline.add(Box::new(TtsProcessor::new(
        state.config.elevenlabs.clone(),
        handle.clone(),
    )));
    pipeline.add(Box::new(TransportOut::new(
        session.clone(),
        audio_tx,
        epoch.clone(),
    )));

    tokio::spawn(paced_writer(audio_rx, out_tx, epoch));
    let pipeline_task = tokio::spawn(pipeline.run());

    handle.push(Frame::Start).await;

    // speak the pre-generated greeting and seed it into LLM context
    handle
        .push(Frame::MessagesAppend {
            messages: vec![donna_core::types::ChatMessage::assistant(
                context.greeting.clone(),
            )],
            run_llm: false,
        })
        .await;
    handle
        .inject_after(
            "llm",
            Frame::Text {
                text: context.greeting.clone(),
            },
        )
        .await;

    // phase 3: shuttle between the socket and the pipeline
    loop {
        tokio::select! {
            ws_msg = socket.recv() => {
                let text = match ws_msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        info!(call_id = %call_id, "media socket closed");
                        handle.push(Frame::End { reason: EndReason::SocketClosed }).await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(call_id = %call_id, "media socket error: {e}");
                        handle.push(Frame::End { reason: EndReason::SocketClosed }).await;
                        break;
                    }
                    _ => continue,
                };

                let event: TwilioEvent = match serde_json::from_str(&text) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(call_id = %call_id, "unparseable stream message: {e}");
                        continue;
                    }
                };

                match event {
                    TwilioEvent::Media { media } => {
                        match media.decode() {
                            Ok(mulaw) => {
                                handle.push(Frame::Audio(AudioFrame {
                                    bytes: mulaw,
                                    sample_rate: 8000,
                                    encoding: AudioEncoding::MulawU8,
                                })).await;
                            }
                            Err(e) => warn!(call_id = %call_id, "bad media payload: {e}"),
                        }
                    }
                    TwilioEvent::Mark { mark } => {
                        // playback drained on the provider side
                        debug!(call_id = %call_id, name = ?mark.as_ref().map(|m| &m.name), "mark");
                        session.lock().unwrap().is_speaking = false;
                    }
                    TwilioEvent::Stop { .. } => {
                        info!(call_id = %call_id, "stream stopped");
                        handle.push(Frame::End { reason: EndReason::SocketClosed }).await;
                        break;
                    }
                    TwilioEvent::Connected { .. } | TwilioEvent::Start { .. } => {}
                }
            }

            out_msg = out_rx.recv() => {
                match out_msg {
                    Some(msg) => {
                        let json = msg.to_json(&stream_sid);
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            warn!(call_id = %call_id, "socket send failed");
                            handle.push(Frame::End { reason: EndReason::SocketClosed }).await;
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // phase 4: wait for the pipeline to drain, then finalize. Dropping the
    // outbound receiver first unblocks the paced writer so a mid-flush TTS
    // can never wedge the drain.
    drop(out_rx);
    let reason = match pipeline_task.await {
        Ok(reason) => reason,
        Err(e) => {
            warn!(call_id = %call_id, "pipeline task join error: {e}");
            EndReason::SocketClosed
        }
    };

    let orchestrator = Arc::clone(&state.orchestrator);
    let session_for_postcall = session.clone();
    tokio::spawn(async move {
        orchestrator.run(&session_for_postcall, reason).await;
    });
}

/// Resolve the prepared context: stash (scheduler/manual prefetch) first,
/// then a fresh build for inbound calls carrying a senior id parameter.
async fn resolve_context(
    state: &Arc<AppState>,
    call_id: &CallId,
    normalized_phone: Option<&str>,
    params: &std::collections::HashMap<String, String>,
) -> Option<PreparedCallContext> {
    if let Some(ctx) = state.stash.take(call_id.as_str(), normalized_phone) {
        debug!(call_id = %call_id, "prefetched context consumed");
        return Some(ctx);
    }

    // inbound path: build on the spot
    let senior_id = params.get("senior_id")?;
    let profile = state
        .seniors
        .get(&donna_core::types::SeniorId::from(senior_id.clone()))
        .ok()?;
    let call_type = params
        .get("call_type")
        .and_then(|t| t.parse::<CallType>().ok())
        .unwrap_or(CallType::CheckIn);

    Some(state.engine.prepare_context_for(&profile, call_type).await)
}
