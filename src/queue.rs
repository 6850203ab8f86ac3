//! Study queue selection and ordering.
//!
//! New cards (never reviewed) come first, then cards whose review date has
//! passed, each group shuffled on its own. Cards scheduled for later are left
//! out. The random source is supplied by the caller.

use crate::models::{Card, CardProgress, StudyItem};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    New,
    Due,
    NotDue,
}

pub fn classify(progress: Option<&CardProgress>, now: DateTime<Utc>) -> Readiness {
    match progress {
        None => Readiness::New,
        Some(p) if p.is_due(now) => Readiness::Due,
        Some(_) => Readiness::NotDue,
    }
}

/// The cards of one deck and whatever progress rows exist for them, as read
/// at a single point in time.
#[derive(Debug, Clone, Default)]
pub struct DeckSnapshot {
    pub cards: Vec<Card>,
    pub progress: HashMap<Uuid, CardProgress>,
}

impl DeckSnapshot {
    pub fn count(&self, readiness: Readiness, now: DateTime<Utc>) -> usize {
        self.cards
            .iter()
            .filter(|card| classify(self.progress.get(&card.id), now) == readiness)
            .count()
    }
}

pub fn build_queue<R: Rng + ?Sized>(
    snapshot: DeckSnapshot,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<StudyItem> {
    let DeckSnapshot { cards, progress } = snapshot;

    let mut fresh = Vec::new();
    let mut due = Vec::new();
    for card in cards {
        let entry = progress.get(&card.id);
        match classify(entry, now) {
            Readiness::New => fresh.push(StudyItem::new(card, None)),
            Readiness::Due => due.push(StudyItem::new(card, entry)),
            Readiness::NotDue => {}
        }
    }

    fresh.shuffle(rng);
    due.shuffle(rng);

    fresh.extend(due);
    fresh
}
