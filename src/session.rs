use crate::db::Db;
use crate::error::StudyError;
use crate::grading::AnswerGrader;
use crate::models::{CardProgress, ReviewSubmission, StudyItem};
use crate::srs::Quality;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of a graded free-text answer.
#[derive(Debug, Clone)]
pub struct GradedReview {
    pub quality: Quality,
    pub feedback: String,
    pub progress: CardProgress,
}

/// One pass over a deck's study queue.
///
/// The queue is read once in `start` and never refreshed, so a card answered
/// earlier in the session does not reshuffle what is left.
pub struct StudySession {
    pub deck_id: Uuid,
    queue: Vec<StudyItem>,
    current_index: usize,
    pub started_at: DateTime<Utc>,
}

impl StudySession {
    pub async fn start(db: &Db, deck_id: Uuid) -> Result<Self, StudyError> {
        let queue = db.study_cards(deck_id).await?;
        log::info!("study session for deck {} with {} cards", deck_id, queue.len());
        Ok(Self::from_queue(deck_id, queue))
    }

    pub fn from_queue(deck_id: Uuid, queue: Vec<StudyItem>) -> Self {
        Self {
            deck_id,
            queue,
            current_index: 0,
            started_at: Utc::now(),
        }
    }

    pub fn current(&self) -> Option<&StudyItem> {
        self.queue.get(self.current_index)
    }

    /// Zero-based index of the current card.
    pub fn position(&self) -> usize {
        self.current_index
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.queue.len().saturating_sub(self.current_index)
    }

    pub fn is_finished(&self) -> bool {
        self.current_index >= self.queue.len()
    }

    /// Moves past the current card without recording a review.
    pub fn skip(&mut self) -> Option<&StudyItem> {
        if self.is_finished() {
            return None;
        }
        self.current_index += 1;
        self.current()
    }

    /// Records a review of the current card. The session only advances when
    /// the review was stored. Returns `Ok(None)` once the session is finished.
    pub async fn answer(
        &mut self,
        db: &Db,
        quality: i64,
        user_answer: Option<String>,
        feedback: Option<String>,
    ) -> Result<Option<CardProgress>, StudyError> {
        let Some(item) = self.current() else {
            return Ok(None);
        };

        let submission = ReviewSubmission {
            card_id: item.card_id,
            quality,
            user_answer,
            feedback,
        };
        let progress = db.submit_review(self.deck_id, &submission).await?;

        self.current_index += 1;
        Ok(Some(progress))
    }

    /// Grades a typed answer to the current card and records it.
    ///
    /// The grader's output is validated before anything is written; an
    /// out-of-range grade fails the answer and leaves the session in place.
    pub async fn answer_free_text<G: AnswerGrader>(
        &mut self,
        db: &Db,
        grader: &G,
        user_answer: &str,
    ) -> Result<Option<GradedReview>, StudyError> {
        let Some(item) = self.current() else {
            return Ok(None);
        };

        let grade = grader.grade(&item.front, &item.back, user_answer).await?;
        let (quality, feedback) = grade.validate()?;

        let progress = self
            .answer(
                db,
                i64::from(quality.value()),
                Some(user_answer.to_string()),
                Some(feedback.clone()),
            )
            .await?;

        Ok(progress.map(|progress| GradedReview {
            quality,
            feedback,
            progress,
        }))
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
