use crate::rules::{Category, Intensity, Rule, Severity, Strength, Valence};

#[derive(Debug, Clone)]
pub struct SeveritySignal {
    pub signal: &'static str,
    pub severity: Severity,
}

#[derive(Debug, Clone)]
pub struct LabelSignal {
    pub signal: &'static str,
}

#[derive(Debug, Clone)]
pub struct EmotionSignal {
    pub signal: &'static str,
    pub valence: Valence,
    pub intensity: Intensity,
}

#[derive(Debug, Clone)]
pub struct GoodbyeSignal {
    pub signal: &'static str,
    pub strength: Strength,
}

#[derive(Debug, Clone)]
pub struct AckSignal {
    pub signal: &'static str,
    pub confidence: f64,
}

/// The typed result of classifying one transcript: a fixed struct with one
/// field per category, not a grab-bag map.
#[derive(Debug, Clone, Default)]
pub struct SignalBundle {
    pub health: Vec<SeveritySignal>,
    pub family: Vec<LabelSignal>,
    pub emotion: Vec<EmotionSignal>,
    pub safety: Vec<SeveritySignal>,
    pub social: Vec<LabelSignal>,
    pub activity: Vec<LabelSignal>,
    pub time_reference: Vec<LabelSignal>,
    pub environment: Vec<LabelSignal>,
    pub adl: Vec<SeveritySignal>,
    pub cognitive: Vec<SeveritySignal>,
    pub help_request: Vec<LabelSignal>,
    pub end_of_life: Vec<SeveritySignal>,
    pub hydration: Vec<SeveritySignal>,
    pub transportation: Vec<LabelSignal>,
    pub news: Vec<LabelSignal>,
    pub goodbye: Vec<GoodbyeSignal>,
    pub question: Vec<LabelSignal>,
    pub engagement: Vec<LabelSignal>,
    pub acknowledgment: Vec<AckSignal>,
}

impl SignalBundle {
    pub(crate) fn add(&mut self, rule: &'static Rule) {
        let severity = rule.severity.unwrap_or(Severity::Low);
        match rule.category {
            Category::Health => self.health.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::Safety => self.safety.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::Adl => self.adl.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::Cognitive => self.cognitive.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::EndOfLife => self.end_of_life.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::Hydration => self.hydration.push(SeveritySignal {
                signal: rule.signal,
                severity,
            }),
            Category::Emotion => self.emotion.push(EmotionSignal {
                signal: rule.signal,
                valence: rule.valence.unwrap_or(Valence::Neutral),
                intensity: rule.intensity.unwrap_or(Intensity::Low),
            }),
            Category::Goodbye => self.goodbye.push(GoodbyeSignal {
                signal: rule.signal,
                strength: rule.strength.unwrap_or(Strength::Weak),
            }),
            Category::Acknowledgment => self.acknowledgment.push(AckSignal {
                signal: rule.signal,
                confidence: rule.confidence,
            }),
            Category::Family => self.family.push(LabelSignal { signal: rule.signal }),
            Category::Social => self.social.push(LabelSignal { signal: rule.signal }),
            Category::Activity => self.activity.push(LabelSignal { signal: rule.signal }),
            Category::TimeReference => {
                self.time_reference.push(LabelSignal { signal: rule.signal })
            }
            Category::Environment => self.environment.push(LabelSignal { signal: rule.signal }),
            Category::HelpRequest => self.help_request.push(LabelSignal { signal: rule.signal }),
            Category::Transportation => {
                self.transportation.push(LabelSignal { signal: rule.signal })
            }
            Category::News => self.news.push(LabelSignal { signal: rule.signal }),
            Category::Question => self.question.push(LabelSignal { signal: rule.signal }),
            Category::Engagement => self.engagement.push(LabelSignal { signal: rule.signal }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.health.is_empty()
            && self.family.is_empty()
            && self.emotion.is_empty()
            && self.safety.is_empty()
            && self.social.is_empty()
            && self.activity.is_empty()
            && self.time_reference.is_empty()
            && self.environment.is_empty()
            && self.adl.is_empty()
            && self.cognitive.is_empty()
            && self.help_request.is_empty()
            && self.end_of_life.is_empty()
            && self.hydration.is_empty()
            && self.transportation.is_empty()
            && self.news.is_empty()
            && self.goodbye.is_empty()
            && self.question.is_empty()
            && self.engagement.is_empty()
            && self.acknowledgment.is_empty()
    }

    pub fn max_severity(signals: &[SeveritySignal]) -> Option<Severity> {
        signals.iter().map(|s| s.severity).max()
    }

    pub fn strong_goodbye(&self) -> bool {
        self.goodbye.iter().any(|g| g.strength == Strength::Strong)
    }

    pub fn best_acknowledgment(&self) -> Option<&AckSignal> {
        self.acknowledgment
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }

    /// Strongest negative emotion, if any.
    pub fn negative_emotion(&self) -> Option<&EmotionSignal> {
        self.emotion
            .iter()
            .filter(|e| e.valence == Valence::Negative)
            .max_by_key(|e| e.intensity)
    }

    /// Low-engagement markers (minimal or disinterested replies); lively
    /// signals like storytelling never count.
    pub fn low_engagement(&self) -> bool {
        self.engagement.iter().any(|e| {
            matches!(
                e.signal,
                "minimal" | "disinterest" | "tired_of_talking" | "trailing_off" | "distracted"
            )
        })
    }
}
