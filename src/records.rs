use serde::{Deserialize, Serialize};

/// Option 1 carries the correct answer by input contract. The `correct`
/// attributes on option elements are advisory and never feed this value.
pub const ANSWER_INDEX: u8 = 1;

/// Seconds allotted per question when no override applies.
pub const DEFAULT_TIME_ESTIMATE: u32 = 60;

/// One accepted quiz item in the fixed column schema the importer consumes.
/// Optional fields that were not extracted stay as empty strings so the
/// columns are always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub text: String,
    pub options: [String; 5],
    #[serde(rename = "answerIndex")]
    pub answer_index: u8,
    pub topic: String,
    pub tag: String,
    pub path: String,
    pub chapter_no: String,
    #[serde(rename = "CHAPTER_TITLE")]
    pub chapter_title: String,
}

/// A [`QuizRecord`] with the overlay columns filled in by
/// [`enhance`](crate::enhance::enhance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedRecord {
    #[serde(flatten)]
    pub record: QuizRecord,
    pub difficulty: Difficulty,
    pub time_estimate: u32,
}

impl From<QuizRecord> for EnhancedRecord {
    fn from(record: QuizRecord) -> Self {
        Self {
            record,
            difficulty: Difficulty::default(),
            time_estimate: DEFAULT_TIME_ESTIMATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────
