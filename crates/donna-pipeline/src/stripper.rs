use async_trait::async_trait;
use regex::Regex;

use crate::frame::{Direction, Frame};
use crate::processor::{Processor, ProcessorContext};
use crate::runtime::PipelineError;

const OPEN_TAG: &str = "<guidance>";
const CLOSE_TAG: &str = "</guidance>";

/// Streaming text filter between the LLM output and TTS.
///
/// Removes `<guidance>…</guidance>` blocks (case-insensitive, including
/// blocks split across frames), bracketed `[UPPERCASE]` directives, and
/// collapses redundant whitespace. Text trailing an unclosed open tag is
/// buffered and released once the close tag arrives; text still held inside
/// a guidance block when the call ends is dropped as guidance. Non-text
/// frames pass through unchanged.
pub struct GuidanceStripper {
    /// Unemitted tail: a partial tag/bracket prefix, or everything from an
    /// unclosed `<guidance>` onward.
    carry: String,
    in_guidance: bool,
    /// Whether the previous emission ended in a space, so whitespace collapse
    /// works across frame boundaries.
    last_was_space: bool,
    bracket_re: Regex,
}

impl GuidanceStripper {
    pub fn new() -> Self {
        Self {
            carry: String::new(),
            in_guidance: false,
            last_was_space: true,
            bracket_re: Regex::new(r"\[[A-Z][A-Z0-9 ,_\-]*\]").unwrap(),
        }
    }

    fn reset(&mut self) {
        self.carry.clear();
        self.in_guidance = false;
        self.last_was_space = true;
    }

    /// Run the carry buffer through the filter. `flush` is set on `end`:
    /// held non-guidance text is released, held guidance is dropped.
    fn drain(&mut self, flush: bool) -> String {
        let mut raw = String::new();

        loop {
            if self.in_guidance {
                match find_ci(&self.carry, CLOSE_TAG) {
                    Some(pos) => {
                        self.carry.drain(..pos + CLOSE_TAG.len());
                        self.in_guidance = false;
                    }
                    None => {
                        if flush {
                            // unterminated guidance at call end — dropped
                            self.carry.clear();
                            self.in_guidance = false;
                        }
                        break;
                    }
                }
                continue;
            }

            match find_ci(&self.carry, OPEN_TAG) {
                Some(pos) => {
                    raw.push_str(&self.carry[..pos]);
                    self.carry.drain(..pos + OPEN_TAG.len());
                    self.in_guidance = true;
                }
                None => {
                    // hold a tail that may be the start of a tag or directive
                    let keep = if flush {
                        0
                    } else {
                        partial_open_len(&self.carry).max(partial_bracket_len(&self.carry))
                    };
                    let split = self.carry.len() - keep;
                    raw.push_str(&self.carry[..split]);
                    self.carry.drain(..split);
                    break;
                }
            }
        }

        let no_brackets = self.bracket_re.replace_all(&raw, "");
        self.collapse(&no_brackets)
    }

    /// Collapse whitespace runs to single spaces, tracking state across
    /// frames so two adjacent emissions never produce a double space.
    fn collapse(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for ch in text.chars() {
            if ch.is_whitespace() {
                if !self.last_was_space {
                    out.push(' ');
                    self.last_was_space = true;
                }
            } else {
                out.push(ch);
                self.last_was_space = false;
            }
        }
        out
    }
}

impl Default for GuidanceStripper {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive substring search over ASCII tags.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let ned = needle.as_bytes();
    if ned.is_empty() || hay.len() < ned.len() {
        return None;
    }
    (0..=hay.len() - ned.len())
        .find(|&i| hay[i..i + ned.len()].eq_ignore_ascii_case(ned))
}

/// Length of the longest suffix of `s` that is a proper prefix of
/// `<guidance>` (case-insensitive) — the part we must hold back.
fn partial_open_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let tag = OPEN_TAG.as_bytes();
    let max = bytes.len().min(tag.len() - 1);
    for keep in (1..=max).rev() {
        if bytes[bytes.len() - keep..].eq_ignore_ascii_case(&tag[..keep]) {
            return keep;
        }
    }
    0
}

/// Length of a trailing unclosed `[DIRECTIVE`-shaped fragment.
fn partial_bracket_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let Some(open) = s.rfind('[') else { return 0 };
    if s[open..].contains(']') {
        return 0;
    }
    let body = &s[open + 1..];
    // only hold when what follows still looks like an uppercase directive
    if body
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || " ,_-".contains(c))
    {
        bytes.len() - open
    } else {
        0
    }
}

#[async_trait]
impl Processor for GuidanceStripper {
    fn name(&self) -> &'static str {
        "guidance_stripper"
    }

    async fn process(
        &mut self,
        frame: Frame,
        direction: Direction,
        ctx: &mut ProcessorContext,
    ) -> Result<(), PipelineError> {
        match frame {
            Frame::Text { text } if direction == Direction::Downstream => {
                self.carry.push_str(&text);
                let cleaned = self.drain(false);
                if !cleaned.is_empty() {
                    ctx.emit(Frame::Text { text: cleaned });
                }
            }
            Frame::InterruptClear => {
                self.reset();
                ctx.forward(Frame::InterruptClear, direction);
            }
            Frame::End { reason } => {
                let cleaned = self.drain(true);
                if !cleaned.is_empty() {
                    ctx.emit(Frame::Text { text: cleaned });
                }
                ctx.forward(Frame::End { reason }, direction);
            }
            other => ctx.forward(other, direction),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donna_core::types::EndReason;

    async fn feed(stripper: &mut GuidanceStripper, chunks: &[&str]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            let mut ctx = ProcessorContext::default();
            stripper
                .process(
                    Frame::Text {
                        text: chunk.to_string(),
                    },
                    Direction::Downstream,
                    &mut ctx,
                )
                .await
                .unwrap();
            for (f, _) in ctx.out {
                if let Frame::Text { text } = f {
                    out.push_str(&text);
                }
            }
        }
        out
    }

    async fn feed_end(stripper: &mut GuidanceStripper) -> String {
        let mut ctx = ProcessorContext::default();
        stripper
            .process(
                Frame::End {
                    reason: EndReason::Goodbye,
                },
                Direction::Downstream,
                &mut ctx,
            )
            .await
            .unwrap();
        let mut out = String::new();
        for (f, _) in ctx.out {
            if let Frame::Text { text } = f {
                out.push_str(&text);
            }
        }
        out
    }

    #[tokio::test]
    async fn removes_complete_guidance_block() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["Hello <guidance>be warm</guidance> there!"]).await;
        assert_eq!(out, "Hello there!");
    }

    #[tokio::test]
    async fn removes_block_split_across_frames() {
        let mut s = GuidanceStripper::new();
        let out = feed(
            &mut s,
            &["I hear you. <guid", "ance>slow dow", "n</guidance> Tell me more."],
        )
        .await;
        assert_eq!(out, "I hear you. Tell me more.");
    }

    #[tokio::test]
    async fn buffers_after_unclosed_open_until_close_arrives() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["Sure. <guidance>wrap up soon"]).await;
        assert_eq!(out, "Sure. ");
        let out = feed(&mut s, &[" gently</guidance>Sounds lovely."]).await;
        assert_eq!(out, "Sounds lovely.");
    }

    #[tokio::test]
    async fn case_insensitive_tags() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["A <GUIDANCE>x</Guidance> B"]).await;
        assert_eq!(out, "A B");
    }

    #[tokio::test]
    async fn strips_bracketed_directives() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["[CHECK IN] How was your morning?"]).await;
        assert_eq!(out, "How was your morning?");
    }

    #[tokio::test]
    async fn bracketed_directive_split_across_frames() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["Well [SAFETY", " HIGH] stay seated."]).await;
        assert_eq!(out, "Well stay seated.");
    }

    #[tokio::test]
    async fn lowercase_brackets_survive() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["your [reading] glasses"]).await;
        assert_eq!(out, "your [reading] glasses");
    }

    #[tokio::test]
    async fn collapses_whitespace_across_frames() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["Hello  ", "  world"]).await;
        assert_eq!(out, "Hello world");
    }

    #[tokio::test]
    async fn unclosed_guidance_dropped_at_end() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["Bye now. <guidance>never closed"]).await;
        assert_eq!(out, "Bye now. ");
        let flushed = feed_end(&mut s).await;
        assert_eq!(flushed, "");
    }

    #[tokio::test]
    async fn held_tag_prefix_that_was_not_a_tag_is_released() {
        let mut s = GuidanceStripper::new();
        let out = feed(&mut s, &["1 <gui", "tar string"]).await;
        assert_eq!(out, "1 <guitar string");
    }

    #[tokio::test]
    async fn no_guidance_substring_ever_reaches_output() {
        let mut s = GuidanceStripper::new();
        let out = feed(
            &mut s,
            &[
                "a<guidance>1</guidance>",
                "b<guidance>2",
                "</guidance>c",
                "[WRAP UP]d",
            ],
        )
        .await;
        let flushed = feed_end(&mut s).await;
        let all = format!("{out}{flushed}");
        assert!(!all.to_lowercase().contains("<guidance>"));
        assert!(!all.contains("[WRAP UP]"));
        assert_eq!(all, "abcd");
    }

    #[tokio::test]
    async fn interrupt_clear_resets_held_state_and_passes_through() {
        let mut s = GuidanceStripper::new();
        feed(&mut s, &["<guidance>partial"]).await;
        let mut ctx = ProcessorContext::default();
        s.process(Frame::InterruptClear, Direction::Upstream, &mut ctx)
            .await
            .unwrap();
        assert!(matches!(ctx.out[0].0, Frame::InterruptClear));
        let out = feed(&mut s, &["fresh text"]).await;
        assert_eq!(out, "fresh text");
    }

    #[tokio::test]
    async fn non_text_frames_pass_through() {
        let mut s = GuidanceStripper::new();
        let mut ctx = ProcessorContext::default();
        s.process(Frame::Start, Direction::Downstream, &mut ctx)
            .await
            .unwrap();
        assert!(matches!(ctx.out[0].0, Frame::Start));
    }
}
