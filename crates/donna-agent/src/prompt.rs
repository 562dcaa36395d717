use donna_core::types::CallType;

/// Assembles the per-call system prompt. Built once per call, usually on the
/// first turn, from the senior profile and the pre-rendered context blocks
/// the memory store produces.
///
/// Guidance the observers inject later arrives as user-role messages tagged
/// `[CATEGORY]` or wrapped in `<guidance>` sentinels; the prompt teaches the
/// model to obey them silently so the stripper never has anything real to
/// remove.
#[derive(Debug, Clone, Default)]
pub struct SystemPromptBuilder {
    senior_name: String,
    call_type: CallType,
    interests: Vec<String>,
    medical_notes: Option<String>,
    family: Option<String>,
    memory_context: Option<String>,
    daily_context: Option<String>,
    reminder_block: Option<String>,
}

impl SystemPromptBuilder {
    pub fn new(senior_name: impl Into<String>, call_type: CallType) -> Self {
        Self {
            senior_name: senior_name.into(),
            call_type,
            ..Default::default()
        }
    }

    pub fn interests(mut self, interests: &[String]) -> Self {
        self.interests = interests.to_vec();
        self
    }

    pub fn medical_notes(mut self, notes: Option<&str>) -> Self {
        self.medical_notes = notes.map(str::to_string);
        self
    }

    pub fn family(mut self, family: Option<&str>) -> Self {
        self.family = family.map(str::to_string);
        self
    }

    /// Tiered memory block rendered by the memory store.
    pub fn memory_context(mut self, block: Option<&str>) -> Self {
        self.memory_context = block.filter(|b| !b.is_empty()).map(str::to_string);
        self
    }

    /// "Earlier today" block rendered from the daily call context.
    pub fn daily_context(mut self, block: Option<&str>) -> Self {
        self.daily_context = block.filter(|b| !b.is_empty()).map(str::to_string);
        self
    }

    /// Pre-formatted reminder prompt from the scheduler's prefetch.
    pub fn reminder_block(mut self, block: Option<&str>) -> Self {
        self.reminder_block = block.filter(|b| !b.is_empty()).map(str::to_string);
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::with_capacity(2048);

        out.push_str(&format!(
            "You are Donna, a warm and attentive phone companion for {name}, \
             an elderly person you call regularly. You are speaking with \
             {name} on the phone right now.\n\n\
             Speak naturally for voice: short sentences, one thought at a \
             time, no lists, no markdown. Never mention that you are an AI \
             assistant unless asked directly. Ask at most one question per \
             turn and leave room for {name} to talk.\n",
            name = self.senior_name
        ));

        match self.call_type {
            CallType::CheckIn => {
                out.push_str("This is a friendly check-in call.\n");
            }
            CallType::Reminder => {
                out.push_str(
                    "This call was placed to deliver a reminder. Work it in \
                     naturally after a little warm-up, not as the first thing \
                     you say.\n",
                );
            }
            CallType::Scheduled => {
                out.push_str("This is a regularly scheduled call.\n");
            }
        }

        if !self.interests.is_empty() {
            out.push_str(&format!(
                "\n{} enjoys: {}.\n",
                self.senior_name,
                self.interests.join(", ")
            ));
        }
        if let Some(notes) = &self.medical_notes {
            out.push_str(&format!("\nHealth notes (never recite these): {notes}\n"));
        }
        if let Some(family) = &self.family {
            out.push_str(&format!("\nFamily: {family}\n"));
        }

        if let Some(block) = &self.memory_context {
            out.push_str("\n## What you remember\n");
            out.push_str(block);
            out.push('\n');
        }
        if let Some(block) = &self.daily_context {
            out.push_str("\n## Earlier today\n");
            out.push_str(block);
            out.push('\n');
        }
        if let Some(block) = &self.reminder_block {
            out.push_str("\n## Reminders for this call\n");
            out.push_str(block);
            out.push('\n');
        }

        out.push_str(
            "\nDuring the call you may receive coaching messages tagged like \
             [HEALTH] or wrapped in <guidance></guidance>. Follow them \
             silently. Never read a tag, a bracketed instruction, or \
             anything inside guidance markers out loud, and never refer to \
             the coaching.\n",
        );

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_profile_and_context_blocks() {
        let prompt = SystemPromptBuilder::new("Margaret", CallType::Reminder)
            .interests(&["gardening".to_string(), "quilting".to_string()])
            .medical_notes(Some("mild arthritis"))
            .memory_context(Some("- Loves her rose garden"))
            .daily_context(Some("Morning call covered: weather, her son Tom"))
            .reminder_block(Some("- Blood pressure pill at 2pm"))
            .build();

        assert!(prompt.contains("Margaret"));
        assert!(prompt.contains("gardening, quilting"));
        assert!(prompt.contains("mild arthritis"));
        assert!(prompt.contains("Loves her rose garden"));
        assert!(prompt.contains("Earlier today"));
        assert!(prompt.contains("Blood pressure pill"));
        assert!(prompt.contains("deliver a reminder"));
    }

    #[test]
    fn empty_blocks_are_omitted() {
        let prompt = SystemPromptBuilder::new("Harold", CallType::CheckIn)
            .memory_context(Some(""))
            .build();
        assert!(!prompt.contains("What you remember"));
        assert!(prompt.contains("friendly check-in"));
    }
}
