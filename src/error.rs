use thiserror::Error;
use uuid::Uuid;

/// Failures of the pure scheduler. None of them touch stored state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("quality must be an integer between 0 and 5, got {0}")]
    InvalidQuality(f64),
    #[error("next review date is out of range ({0} days ahead)")]
    DateOutOfRange(u32),
}

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("grader unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the storage-facing study operations.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("card {0} not found")]
    CardNotFound(Uuid),
    #[error("deck {0} not found")]
    DeckNotFound(Uuid),
    #[error(transparent)]
    Grading(#[from] GradingError),
    #[error("review of card {0} kept losing to concurrent reviews")]
    Conflict(Uuid),
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}

impl StudyError {
    pub fn is_invalid_quality(&self) -> bool {
        matches!(self, StudyError::Schedule(ScheduleError::InvalidQuality(_)))
    }
}
