//! Free-text answer grading.
//!
//! Whatever produces a grade (a model behind an API, a person, the word
//! overlap fallback here), its output is untrusted until `Grade::validate`
//! turns it into a `Quality`.

use crate::error::{GradingError, ScheduleError};
use crate::srs::Quality;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;

/// Similarity cut-offs, highest first, and the quality each one earns.
const SIMILARITY_THRESHOLDS: [(f64, Quality); 5] = [
    (0.9, Quality::PERFECT),
    (0.7, Quality::GOOD),
    (0.5, Quality::HARD),
    (0.3, Quality::BARELY),
    (0.1, Quality::WRONG),
];

/// Raw grader output. `quality` may be anything the grader returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub quality: f64,
    pub feedback: String,
}

impl Grade {
    /// Rejects out-of-range and fractional qualities instead of clamping them.
    pub fn validate(self) -> Result<(Quality, String), ScheduleError> {
        let quality = Quality::try_from(self.quality)?;
        Ok((quality, self.feedback))
    }
}

pub trait AnswerGrader {
    fn grade(
        &self,
        question: &str,
        correct_answer: &str,
        user_answer: &str,
    ) -> impl Future<Output = Result<Grade, GradingError>> + Send;
}

/// Jaccard similarity of the two answers' word sets, ignoring case and
/// extra whitespace.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a == b {
        return 1.0;
    }

    let words_a: HashSet<&str> = a.split(' ').collect();
    let words_b: HashSet<&str> = b.split(' ').collect();
    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }
    words_a.intersection(&words_b).count() as f64 / union as f64
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn quality_from_similarity(similarity: f64) -> Quality {
    SIMILARITY_THRESHOLDS
        .iter()
        .find(|(threshold, _)| similarity >= *threshold)
        .map_or(Quality::BLACKOUT, |(_, quality)| *quality)
}

/// Grades by word overlap with the reference answer. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityGrader;

impl SimilarityGrader {
    pub fn grade_now(&self, correct_answer: &str, user_answer: &str) -> Grade {
        let score = similarity(correct_answer, user_answer);
        let quality = quality_from_similarity(score);

        let mut feedback = format!(
            "{}: your answer shares {:.0}% of its words with the reference answer.",
            quality.label(),
            score * 100.0
        );
        if !quality.is_passing() {
            feedback.push_str(&format!(" Expected: {}", correct_answer.trim()));
        }

        Grade {
            quality: f64::from(quality.value()),
            feedback,
        }
    }
}

impl AnswerGrader for SimilarityGrader {
    async fn grade(
        &self,
        _question: &str,
        correct_answer: &str,
        user_answer: &str,
    ) -> Result<Grade, GradingError> {
        Ok(self.grade_now(correct_answer, user_answer))
    }
}

/// Tries `primary` first and falls back to word overlap when it fails.
#[derive(Debug, Clone)]
pub struct FallbackGrader<P> {
    primary: P,
    fallback: SimilarityGrader,
}

impl<P> FallbackGrader<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: SimilarityGrader,
        }
    }
}

impl<P: AnswerGrader + Sync> AnswerGrader for FallbackGrader<P> {
    async fn grade(
        &self,
        question: &str,
        correct_answer: &str,
        user_answer: &str,
    ) -> Result<Grade, GradingError> {
        match self.primary.grade(question, correct_answer, user_answer).await {
            Ok(grade) => Ok(grade),
            Err(err) => {
                log::warn!("answer grader failed, using word overlap instead: {}", err);
                let mut grade = self.fallback.grade_now(correct_answer, user_answer);
                grade
                    .feedback
                    .push_str(" (Automatic grading was unavailable; scored by text similarity.)");
                Ok(grade)
            }
        }
    }
}
