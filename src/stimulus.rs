use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{DrillError, Result};
use crate::kind::TestKind;

/// Multiple-choice item (OIR and scored mock tests)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub options: [String; 4],
    pub correct_option_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Picture {
    pub id: String,
    pub image_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Situation {
    pub id: String,
    pub text: String,
}

/// One unit shown to the test-taker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    Question {
        question: Question,
        image_url: Option<String>,
    },
    Picture {
        picture: Picture,
        image_url: Option<String>,
    },
    Word(Word),
    Situation(Situation),
}

impl Stimulus {
    pub fn question(question: Question) -> Self {
        Stimulus::Question {
            question,
            image_url: None,
        }
    }

    pub fn picture(picture: Picture) -> Self {
        Stimulus::Picture {
            picture,
            image_url: None,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Stimulus::Question { question, .. } => &question.id,
            Stimulus::Picture { picture, .. } => &picture.id,
            Stimulus::Word(w) => &w.id,
            Stimulus::Situation(s) => &s.id,
        }
    }

    pub fn image_ref(&self) -> Option<&str> {
        match self {
            Stimulus::Question { question, .. } => question.image_ref.as_deref(),
            Stimulus::Picture { picture, .. } => Some(&picture.image_ref),
            _ => None,
        }
    }

    /// Displayable URL, once resolved through a blob store
    pub fn image_url(&self) -> Option<&str> {
        match self {
            Stimulus::Question { image_url, .. } | Stimulus::Picture { image_url, .. } => {
                image_url.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn set_image_url(&mut self, url: String) {
        match self {
            Stimulus::Question { image_url, .. } | Stimulus::Picture { image_url, .. } => {
                *image_url = Some(url)
            }
            _ => {}
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Stimulus::Question { question, .. } => question.text.as_deref(),
            Stimulus::Word(w) => Some(&w.text),
            Stimulus::Situation(s) => Some(&s.text),
            Stimulus::Picture { .. } => None,
        }
    }

    pub fn as_question(&self) -> Option<&Question> {
        match self {
            Stimulus::Question { question, .. } => Some(question),
            _ => None,
        }
    }

    pub fn matches_kind(&self, kind: TestKind) -> bool {
        matches!(
            (self, kind),
            (Stimulus::Question { .. }, TestKind::Oir)
                | (Stimulus::Picture { .. }, TestKind::Tat | TestKind::Ppdt)
                | (Stimulus::Word(_), TestKind::Wat)
                | (Stimulus::Situation(_), TestKind::Srt)
        )
    }

    /// Decode one stored document into the shape its collection holds
    pub fn from_document(kind: TestKind, fields: &serde_json::Value) -> Result<Self> {
        let stimulus = match kind {
            TestKind::Oir => {
                let question: Question = serde_json::from_value(fields.clone())?;
                if question.correct_option_index >= question.options.len() {
                    return Err(DrillError::InvalidChoice {
                        index: question.correct_option_index,
                        options: question.options.len(),
                    });
                }
                Stimulus::question(question)
            }
            TestKind::Tat | TestKind::Ppdt => Stimulus::picture(serde_json::from_value(fields.clone())?),
            TestKind::Wat => Stimulus::Word(serde_json::from_value(fields.clone())?),
            TestKind::Srt => Stimulus::Situation(serde_json::from_value(fields.clone())?),
        };
        Ok(stimulus)
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        let value = match self {
            Stimulus::Question { question, .. } => serde_json::to_value(question)?,
            Stimulus::Picture { picture, .. } => serde_json::to_value(picture)?,
            Stimulus::Word(w) => serde_json::to_value(w)?,
            Stimulus::Situation(s) => serde_json::to_value(s)?,
        };
        Ok(value)
    }
}

/// Ordered stimuli for one test kind. Never mutated once built; selection
/// and image resolution produce new pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusPool {
    kind: TestKind,
    stimuli: Vec<Stimulus>,
}

impl StimulusPool {
    /// Build a pool, dropping repeated ids (first wins). Fails on an empty result.
    pub fn new(kind: TestKind, stimuli: Vec<Stimulus>) -> Result<Self> {
        let mut seen = HashSet::new();
        let before = stimuli.len();
        let stimuli: Vec<Stimulus> = stimuli
            .into_iter()
            .filter(|s| seen.insert(s.id().to_string()))
            .collect();
        if stimuli.len() != before {
            tracing::warn!(
                kind = %kind,
                dropped = before - stimuli.len(),
                "duplicate stimulus ids dropped from pool"
            );
        }
        if stimuli.is_empty() {
            return Err(DrillError::EmptyPool(kind));
        }
        Ok(Self { kind, stimuli })
    }

    pub(crate) fn from_parts(kind: TestKind, stimuli: Vec<Stimulus>) -> Self {
        Self { kind, stimuli }
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stimulus> {
        self.stimuli.get(index)
    }

    pub fn find(&self, id: &str) -> Option<&Stimulus> {
        self.stimuli.iter().find(|s| s.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find(id).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Stimulus> {
        self.stimuli.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.stimuli.iter().map(Stimulus::id).collect()
    }

    pub(crate) fn into_stimuli(self) -> Vec<Stimulus> {
        self.stimuli
    }
}
