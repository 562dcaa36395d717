use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use donna_core::types::Role;
use donna_pipeline::{Direction, Frame, PipelineError, Processor, ProcessorContext};

use crate::state::SharedSession;

/// Curated topic keyword table. Matching is case-insensitive over final user
/// transcripts; hits land in `topics_discussed`.
const TOPIC_PATTERNS: &[(&str, &str)] = &[
    ("gardening", r"garden|flower|rose|tomato|plant|weed"),
    ("cooking", r"cook|recipe|bak(e|ing)|kitchen|dinner|casserole"),
    ("walking", r"\bwalk|stroll"),
    ("reading", r"read|book|novel|magazine"),
    ("religion", r"church|pray|bible|pastor|mass|service"),
    ("tv", r"\btv\b|television|show|episode|watch"),
    ("grandchildren", r"grandson|granddaughter|grandkid|grandchild"),
    ("family", r"\bson\b|daughter|sister|brother|niece|nephew|family"),
    ("medical", r"doctor|appointment|medic|prescription|nurse|clinic"),
    ("weather", r"weather|rain|sunny|snow|cold out|hot out"),
    ("sleep", r"sleep|slept|nap|insomnia|tired"),
    ("friends", r"friend|neighbor|neighbour"),
    ("pain", r"pain|ache|hurts?|sore"),
    ("pets", r"\bdog\b|\bcat\b|puppy|kitten|\bpet\b|\bbird\b"),
    ("music", r"music|\bsong\b|radio|sing|piano"),
    ("crafts", r"knit|crochet|quilt|sew|craft|puzzle"),
];

/// Verb openers that mark an advice clause in assistant speech.
const ADVICE_OPENERS: &[&str] = &[
    "you should",
    "try to",
    "don't forget to",
    "make sure to",
    "remember to",
    "how about",
];

/// Keeps the session transcript and extraction lists current.
///
/// User turns are recorded on final transcription frames with topic keyword
/// matching; assistant text chunks are concatenated into the in-progress
/// message until a sentence boundary, then recorded with question and advice
/// extraction. Every frame is forwarded unchanged.
pub struct ConversationTracker {
    session: SharedSession,
    topics: Vec<(&'static str, Regex)>,
    sanitize: Regex,
    /// Assistant text accumulated since the last sentence boundary.
    partial: String,
}

impl ConversationTracker {
    pub fn new(session: SharedSession) -> Self {
        let topics = TOPIC_PATTERNS
            .iter()
            .map(|(label, pat)| (*label, Regex::new(&format!("(?i){pat}")).unwrap()))
            .collect();
        Self {
            session,
            topics,
            sanitize: Regex::new(r"(?is)<guidance>.*?</guidance>|\[[A-Z][A-Z0-9 ,_\-]*\]")
                .unwrap(),
            partial: String::new(),
        }
    }

    fn on_user_transcript(&mut self, text: &str) {
        let mut session = self.session.lock().unwrap();
        session.push_turn(Role::User, text);
        session.metrics.user_turns += 1;
        for (label, re) in &self.topics {
            if re.is_match(text) {
                session.note_topic(label);
            }
        }
    }

    fn on_assistant_chunk(&mut self, text: &str) {
        self.partial.push_str(text);
        // hold until a sentence completes; everything up to the last
        // terminator is flushed, the tail keeps accumulating
        if let Some(boundary) = self.partial.rfind(['.', '!', '?']) {
            let complete: String = self.partial.drain(..=boundary).collect();
            self.record_assistant(&complete);
        }
    }

    fn record_assistant(&mut self, raw: &str) {
        let text = self.sanitize.replace_all(raw, " ");
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let mut session = self.session.lock().unwrap();
        session.push_turn(Role::Assistant, text);
        session.metrics.assistant_turns += 1;

        for sentence in split_sentences(text) {
            if sentence.ends_with('?') {
                session.note_question(sentence);
                continue;
            }
            let lower = sentence.to_lowercase();
            for opener in ADVICE_OPENERS {
                if let Some(pos) = lower.find(opener) {
                    session.note_advice(sentence[pos..].trim_end_matches(['.', '!']).trim());
                    break;
                }
            }
        }
        debug!(
            call_id = %session.call_id,
            topics = session.topics_discussed.len(),
            questions = session.questions_asked.len(),
            "tracker updated"
        );
    }

    fn flush_partial(&mut self) {
        if !self.partial.is_empty() {
            let rest = std::mem::take(&mut self.partial);
            self.record_assistant(&rest);
        }
    }
}

/// Split on sentence terminators, keeping the terminator attached.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let sentence = text[start..=i].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = i + 1;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

#[async_trait]
impl Processor for ConversationTracker {
    fn name(&self) -> &'static str {
        "tracker"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match &frame {
            Frame::Transcription {
                text,
                is_final: true,
            } if direction == Direction::Downstream => {
                self.on_user_transcript(text);
            }
            Frame::Text { text } if direction == Direction::Downstream => {
                self.on_assistant_chunk(text);
            }
            Frame::InterruptClear => {
                // the cut-off tail was never spoken — discard it
                self.partial.clear();
                self.session.lock().unwrap().metrics.interruptions += 1;
            }
            Frame::End { .. } => {
                self.flush_partial();
            }
            _ => {}
        }
        ctx.forward(frame, direction);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CallSession;
    use donna_core::types::{CallId, CallType, SeniorId};
    use std::time::Duration;

    fn shared_session() -> SharedSession {
        CallSession::new(
            CallId::from("CA-track"),
            SeniorId::from("senior-1"),
            CallType::CheckIn,
            Duration::from_secs(600),
        )
        .shared()
    }

    async fn drive(tracker: &mut ConversationTracker, frame: Frame) {
        let mut ctx = ProcessorContext::default();
        tracker
            .process(frame, Direction::Downstream, &mut ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn final_transcripts_record_turns_and_topics() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(
            &mut t,
            Frame::Transcription {
                text: "I was out in the garden with my granddaughter".into(),
                is_final: true,
            },
        )
        .await;

        let s = session.lock().unwrap();
        assert_eq!(s.transcript_len(), 1);
        assert!(s.topics_discussed.contains(&"gardening".to_string()));
        assert!(s.topics_discussed.contains(&"grandchildren".to_string()));
        assert_eq!(s.metrics.user_turns, 1);
    }

    #[tokio::test]
    async fn interim_transcripts_are_ignored() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(
            &mut t,
            Frame::Transcription {
                text: "I was out in the".into(),
                is_final: false,
            },
        )
        .await;
        assert_eq!(session.lock().unwrap().transcript_len(), 0);
    }

    #[tokio::test]
    async fn assistant_chunks_buffer_until_sentence_boundary() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(&mut t, Frame::Text { text: "That sounds".into() }).await;
        assert_eq!(session.lock().unwrap().transcript_len(), 0);

        drive(
            &mut t,
            Frame::Text {
                text: " wonderful! Did you".into(),
            },
        )
        .await;
        // "That sounds wonderful!" flushed; " Did you" still pending
        assert_eq!(session.lock().unwrap().transcript_len(), 1);

        drive(&mut t, Frame::Text { text: " plant roses?".into() }).await;
        let s = session.lock().unwrap();
        assert_eq!(s.transcript_len(), 2);
        assert_eq!(s.questions_asked, vec!["Did you plant roses?"]);
    }

    #[tokio::test]
    async fn advice_clauses_are_extracted() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(
            &mut t,
            Frame::Text {
                text: "Make sure to drink some water this afternoon.".into(),
            },
        )
        .await;
        let s = session.lock().unwrap();
        assert_eq!(
            s.advice_given,
            vec!["Make sure to drink some water this afternoon"]
        );
    }

    #[tokio::test]
    async fn interrupt_discards_unspoken_partial() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(&mut t, Frame::Text { text: "Let me tell".into() }).await;
        let mut ctx = ProcessorContext::default();
        t.process(Frame::InterruptClear, Direction::Upstream, &mut ctx)
            .await
            .unwrap();
        drive(
            &mut t,
            Frame::End {
                reason: donna_core::types::EndReason::Goodbye,
            },
        )
        .await;
        let s = session.lock().unwrap();
        assert_eq!(s.transcript_len(), 0);
        assert_eq!(s.metrics.interruptions, 1);
    }

    #[tokio::test]
    async fn end_flushes_pending_assistant_text() {
        let session = shared_session();
        let mut t = ConversationTracker::new(session.clone());
        drive(&mut t, Frame::Text { text: "Take care".into() }).await;
        drive(
            &mut t,
            Frame::End {
                reason: donna_core::types::EndReason::Goodbye,
            },
        )
        .await;
        assert_eq!(session.lock().unwrap().transcript_len(), 1);
    }
}
