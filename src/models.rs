use crate::srs::{ScheduleState, ScheduleUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    New,
    Learning,
    Review,
}

impl ProgressStatus {
    pub fn from_repetitions(repetitions: u32) -> Self {
        match repetitions {
            0 => ProgressStatus::New,
            1 | 2 => ProgressStatus::Learning,
            _ => ProgressStatus::Review,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::New => "new",
            ProgressStatus::Learning => "learning",
            ProgressStatus::Review => "review",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    /// Self-graded.
    #[default]
    Basic,
    /// Free-text answer graded by an `AnswerGrader`.
    Subjective,
}

impl CardType {
    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Basic => "basic",
            CardType::Subjective => "subjective",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "subjective" => CardType::Subjective,
            _ => CardType::Basic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    pub card_type: CardType,
    pub created_at: DateTime<Utc>,
}

/// A deck with the card counts shown on a deck list. `due_count` includes
/// new cards, matching what a study session would serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckSummary {
    #[serde(flatten)]
    pub deck: Deck,
    pub total_cards: usize,
    pub new_cards: usize,
    pub due_count: usize,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeckUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardUpdate {
    #[serde(default)]
    pub front: Option<String>,
    #[serde(default)]
    pub back: Option<String>,
    #[serde(default)]
    pub card_type: Option<CardType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardWithProgress {
    #[serde(flatten)]
    pub card: Card,
    pub progress: Option<CardProgress>,
}

/// Stored scheduling state of one card. Exists only after the first review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardProgress {
    pub card_id: Uuid,
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub next_review_date: DateTime<Utc>,
    pub status: ProgressStatus,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; used as the compare-and-swap token.
    pub version: i64,
}

impl CardProgress {
    pub fn from_update(card_id: Uuid, update: &ScheduleUpdate, version: i64) -> Self {
        Self {
            card_id,
            repetitions: update.repetitions,
            easiness_factor: update.easiness_factor,
            interval_days: update.interval_days,
            next_review_date: update.next_review_date,
            status: update.status,
            updated_at: Utc::now(),
            version,
        }
    }

    pub fn schedule_state(&self) -> ScheduleState {
        ScheduleState {
            repetitions: self.repetitions,
            easiness_factor: self.easiness_factor,
            interval_days: self.interval_days,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date <= now
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            repetitions: self.repetitions,
            easiness_factor: self.easiness_factor,
            interval_days: self.interval_days,
            status: self.status,
        }
    }
}

/// What a study item shows about a card's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub repetitions: u32,
    pub easiness_factor: f64,
    pub interval_days: u32,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyItem {
    pub card_id: Uuid,
    pub front: String,
    pub back: String,
    pub card_type: CardType,
    /// `None` for a card that has never been reviewed.
    pub progress: Option<ProgressSnapshot>,
}

impl StudyItem {
    pub fn new(card: Card, progress: Option<&CardProgress>) -> Self {
        Self {
            card_id: card.id,
            front: card.front,
            back: card.back,
            card_type: card.card_type,
            progress: progress.map(CardProgress::snapshot),
        }
    }

    pub fn is_new(&self) -> bool {
        self.progress.is_none()
    }
}

/// A review as received from the caller. `quality` is unvalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSubmission {
    pub card_id: Uuid,
    pub quality: i64,
    #[serde(default)]
    pub user_answer: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ReviewSubmission {
    pub fn new(card_id: Uuid, quality: i64) -> Self {
        Self {
            card_id,
            quality,
            user_answer: None,
            feedback: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub id: Uuid,
    pub card_id: Uuid,
    pub quality: u8,
    pub user_answer: Option<String>,
    pub feedback: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}
