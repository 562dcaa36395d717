//! Signal bundle → one guidance line and a token-budget recommendation.
//!
//! Priority when several categories match:
//! safety > end-of-life > ADL > cognitive > hydration > health > emotion >
//! social/family > activity > time > engagement > goodbye.

use crate::rules::{Category, Intensity, Severity};
use crate::signals::SignalBundle;

const DEFAULT_BUDGET: u32 = 150;

/// Compose the single guidance line for a bundle, or `None` when nothing
/// matched. The line always starts with the winning category's tag.
pub fn compose_guidance(bundle: &SignalBundle) -> Option<String> {
    if let Some(top) = SignalBundle::max_severity(&bundle.safety) {
        let line = match top {
            Severity::High | Severity::Critical => {
                "Address the safety concern right away, calmly. Ask if they are hurt and whether anyone is with them."
            }
            _ => "Acknowledge the safety worry and gently ask what would make things feel safer.",
        };
        return Some(tagged(Category::Safety, line));
    }

    if let Some(top) = SignalBundle::max_severity(&bundle.end_of_life) {
        let line = match top {
            Severity::Critical => {
                "They may be expressing a wish to die. Respond with warmth, take it seriously, stay with the feeling, and encourage them to talk to someone they trust today."
            }
            _ => "They are reflecting on mortality. Listen without changing the subject; let them say what they need to say.",
        };
        return Some(tagged(Category::EndOfLife, line));
    }

    if SignalBundle::max_severity(&bundle.adl) >= Some(Severity::High) {
        return Some(tagged(
            Category::Adl,
            "Daily living is getting harder. Ask one gentle follow-up about what is most difficult; do not lecture.",
        ));
    }

    if let Some(top) = SignalBundle::max_severity(&bundle.cognitive) {
        let line = match top {
            Severity::High | Severity::Critical => {
                "Possible memory trouble. Keep things simple, reassure, and avoid quizzing them."
            }
            _ => "A small memory slip came up. Treat it lightly and move on unless they dwell on it.",
        };
        return Some(tagged(Category::Cognitive, line));
    }

    if SignalBundle::max_severity(&bundle.hydration) >= Some(Severity::High) {
        return Some(tagged(
            Category::Hydration,
            "Signs of poor hydration. Suggest a glass of water now, in a caring way, and ask when they last drank something.",
        ));
    }

    if let Some(top) = SignalBundle::max_severity(&bundle.health) {
        let line = match top {
            Severity::High | Severity::Critical => {
                "A significant health symptom was mentioned. Ask how bad it is right now and whether they have told their doctor or family."
            }
            Severity::Medium => {
                "A health complaint came up. Acknowledge it with care and ask one follow-up question."
            }
            Severity::Low => "Note the health mention and keep the tone light.",
        };
        return Some(tagged(Category::Health, line));
    }

    if let Some(emotion) = bundle.negative_emotion() {
        let line = match emotion.intensity {
            Intensity::High => {
                "They are hurting. Slow down, name the feeling back to them, and do not rush to fix it."
            }
            _ => "A low mood is showing. Be warm, validate, and invite them to say more.",
        };
        return Some(tagged(Category::Emotion, line));
    }
    if !bundle.emotion.is_empty() {
        return Some(tagged(
            Category::Emotion,
            "Their mood is showing through. Reflect it back and build on it.",
        ));
    }

    if !bundle.family.is_empty() {
        return Some(tagged(
            Category::Family,
            "Family came up. Show genuine interest; ask a specific question about the person mentioned.",
        ));
    }
    if !bundle.social.is_empty() {
        return Some(tagged(
            Category::Social,
            "A social connection came up. Encourage it and ask how it went.",
        ));
    }
    if !bundle.help_request.is_empty() {
        return Some(tagged(
            Category::HelpRequest,
            "They asked for help. Answer plainly, then confirm the answer actually helped.",
        ));
    }
    if !bundle.activity.is_empty() {
        return Some(tagged(
            Category::Activity,
            "An activity they enjoy came up. Draw them out with one curious question about it.",
        ));
    }
    if !bundle.transportation.is_empty() {
        return Some(tagged(
            Category::Transportation,
            "Getting around came up. Note any barrier it creates and stay practical.",
        ));
    }
    if !bundle.time_reference.is_empty() {
        return Some(tagged(
            Category::TimeReference,
            "They anchored to a day or date. Use it to keep the story straight.",
        ));
    }
    if bundle.low_engagement() {
        return Some(tagged(
            Category::Engagement,
            "Short answers. Switch to a topic they love and ask an easy, open question.",
        ));
    }
    if !bundle.engagement.is_empty() {
        return Some(tagged(
            Category::Engagement,
            "They're engaged. Follow their lead and keep the thread going.",
        ));
    }
    if bundle.strong_goodbye() {
        return Some(tagged(
            Category::Goodbye,
            "They are saying goodbye. Give a warm, brief send-off; do not open a new topic.",
        ));
    }
    if !bundle.goodbye.is_empty() {
        return Some(tagged(
            Category::Goodbye,
            "They may be winding down. Begin a gentle close without cutting them off.",
        ));
    }
    if !bundle.question.is_empty() {
        return Some(tagged(
            Category::Question,
            "Direct question. Answer it simply before anything else.",
        ));
    }
    if !bundle.acknowledgment.is_empty() {
        return Some(tagged(
            Category::Acknowledgment,
            "They answered the reminder. Confirm it warmly and don't repeat it.",
        ));
    }
    if !bundle.news.is_empty() || !bundle.environment.is_empty() {
        return Some(tagged(
            Category::News,
            "Light small talk. Match their energy and keep it easy.",
        ));
    }

    None
}

fn tagged(category: Category, line: &str) -> String {
    format!("[{}] {}", category.tag(), line)
}

/// Max-token recommendation for the next reply, from the category budgets.
/// Informational: downstream routing may ignore it.
pub fn token_budget(bundle: &SignalBundle) -> u32 {
    if SignalBundle::max_severity(&bundle.end_of_life) == Some(Severity::Critical) {
        return 250;
    }
    if SignalBundle::max_severity(&bundle.safety) >= Some(Severity::High) {
        return 200;
    }
    if SignalBundle::max_severity(&bundle.adl) >= Some(Severity::High) {
        return 180;
    }
    if SignalBundle::max_severity(&bundle.cognitive) >= Some(Severity::High) {
        return 180;
    }
    if SignalBundle::max_severity(&bundle.hydration) >= Some(Severity::High) {
        return 160;
    }
    match SignalBundle::max_severity(&bundle.health) {
        Some(Severity::High) | Some(Severity::Critical) => return 180,
        Some(Severity::Medium) => return 150,
        _ => {}
    }
    if !bundle.end_of_life.is_empty() {
        return 180;
    }
    if !bundle.help_request.is_empty() {
        return 150;
    }
    if let Some(e) = bundle.negative_emotion() {
        if e.intensity == Intensity::High {
            return 180;
        }
    }
    if bundle.low_engagement() {
        return 130;
    }
    if !bundle.question.is_empty() {
        return 80;
    }
    if !bundle.family.is_empty() {
        return 100;
    }
    DEFAULT_BUDGET
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleSet;

    fn classify(text: &str) -> SignalBundle {
        RuleSet::compile().classify(text)
    }

    #[test]
    fn safety_outranks_health_and_emotion() {
        let bundle = classify("I fell this morning and my hip hurts and I'm scared");
        let line = compose_guidance(&bundle).unwrap();
        assert!(line.starts_with("[SAFETY]"), "got: {line}");
    }

    #[test]
    fn end_of_life_outranks_everything_but_safety() {
        let bundle = classify("my knees ache and honestly I don't want to be here anymore");
        let line = compose_guidance(&bundle).unwrap();
        assert!(line.starts_with("[END OF LIFE]"), "got: {line}");
    }

    #[test]
    fn health_beats_family() {
        let bundle = classify("my daughter visited but this headache won't quit");
        let line = compose_guidance(&bundle).unwrap();
        assert!(line.starts_with("[HEALTH]"), "got: {line}");
    }

    #[test]
    fn no_match_means_no_guidance() {
        let bundle = classify("well now, that is that");
        assert!(bundle.is_empty());
        assert!(compose_guidance(&bundle).is_none());
    }

    #[test]
    fn budgets_follow_the_table() {
        assert_eq!(
            token_budget(&classify("I just don't want to be here anymore")),
            250
        );
        assert_eq!(token_budget(&classify("I fell off the step stool")), 200);
        assert_eq!(token_budget(&classify("my head aches")), 150);
        assert_eq!(token_budget(&classify("what time is it?")), 80);
        assert_eq!(
            token_budget(&classify("my grandson graduated yesterday")),
            100
        );
        assert_eq!(token_budget(&classify("the mail came early")), 150);
    }

    #[test]
    fn goodbye_guidance_still_composes_when_nothing_else_matched() {
        let bundle = classify("goodbye dear");
        let line = compose_guidance(&bundle).unwrap();
        assert!(line.starts_with("[GOODBYE]"));
    }
}
