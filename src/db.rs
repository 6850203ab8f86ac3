use crate::error::StudyError;
use crate::models::{
    Card, CardProgress, CardType, CardUpdate, CardWithProgress, Deck, DeckSummary, DeckUpdate,
    ProgressStatus, ReviewLog, ReviewSubmission, StudyItem,
};
use crate::queue::{self, DeckSnapshot, Readiness};
use crate::srs::{self, Quality};
use chrono::{Local, Utc};
use rand::Rng;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{ConnectOptions, Pool, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// A review that keeps losing the compare-and-swap gives up after this many rounds.
const MAX_REVIEW_ATTEMPTS: usize = 8;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS decks (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cards (
        id BLOB PRIMARY KEY,
        deck_id BLOB NOT NULL REFERENCES decks(id) ON DELETE CASCADE,
        front TEXT NOT NULL,
        back TEXT NOT NULL,
        card_type TEXT NOT NULL DEFAULT 'basic',
        created_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cards_deck_id ON cards(deck_id)",
    r#"
    CREATE TABLE IF NOT EXISTS card_progress (
        card_id BLOB PRIMARY KEY REFERENCES cards(id) ON DELETE CASCADE,
        repetitions INTEGER NOT NULL DEFAULT 0,
        easiness_factor REAL NOT NULL DEFAULT 2.5,
        interval_days INTEGER NOT NULL DEFAULT 0,
        next_review_date DATETIME NOT NULL,
        status TEXT NOT NULL DEFAULT 'new',
        version INTEGER NOT NULL DEFAULT 0,
        updated_at DATETIME NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS review_logs (
        id BLOB PRIMARY KEY,
        card_id BLOB NOT NULL REFERENCES cards(id) ON DELETE CASCADE,
        quality INTEGER NOT NULL,
        user_answer TEXT,
        feedback TEXT,
        reviewed_at DATETIME NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_review_logs_card_id ON review_logs(card_id)",
];

fn column_u32(row: &SqliteRow, column: &str) -> Result<u32, sqlx::Error> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Deck {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Deck {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for Card {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let card_type: String = row.try_get("card_type")?;

        Ok(Card {
            id: row.try_get("id")?,
            deck_id: row.try_get("deck_id")?,
            front: row.try_get("front")?,
            back: row.try_get("back")?,
            card_type: CardType::parse(&card_type),
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for CardProgress {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let repetitions = column_u32(row, "repetitions")?;

        // The stored status column is for SQL-side filtering only; the
        // repetition count is the source of truth.
        Ok(CardProgress {
            card_id: row.try_get("card_id")?,
            repetitions,
            easiness_factor: row.try_get("easiness_factor")?,
            interval_days: column_u32(row, "interval_days")?,
            next_review_date: row.try_get("next_review_date")?,
            status: ProgressStatus::from_repetitions(repetitions),
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for ReviewLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let quality: i64 = row.try_get("quality")?;

        Ok(ReviewLog {
            id: row.try_get("id")?,
            card_id: row.try_get("card_id")?,
            quality: u8::try_from(quality).map_err(|e| sqlx::Error::ColumnDecode {
                index: "quality".to_string(),
                source: Box::new(e),
            })?,
            user_answer: row.try_get("user_answer")?,
            feedback: row.try_get("feedback")?,
            reviewed_at: row.try_get("reviewed_at")?,
        })
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including extended codes such as BUSY_SNAPSHOT.
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map_or(false, |code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    pub async fn connect(url: &str) -> Result<Self, StudyError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    /// A private in-memory database. Held on one connection so every query
    /// sees the same data.
    pub async fn in_memory() -> Result<Self, StudyError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .foreign_keys(true)
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: Pool<Sqlite>) -> Result<Self, StudyError> {
        let db = Db { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StudyError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn create_deck(&self, name: &str, description: &str) -> Result<Deck, StudyError> {
        let deck = Deck {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO decks (id, name, description, created_at) VALUES (?, ?, ?, ?)")
            .bind(deck.id)
            .bind(&deck.name)
            .bind(&deck.description)
            .bind(deck.created_at)
            .execute(&self.pool)
            .await?;

        log::info!("created deck {} ({})", deck.name, deck.id);
        Ok(deck)
    }

    pub async fn get_deck(&self, deck_id: Uuid) -> Result<Option<Deck>, StudyError> {
        let deck = sqlx::query_as::<_, Deck>("SELECT * FROM decks WHERE id = ?")
            .bind(deck_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(deck)
    }

    pub async fn update_deck(&self, deck_id: Uuid, update: &DeckUpdate) -> Result<Deck, StudyError> {
        let result = sqlx::query(
            "UPDATE decks SET name = COALESCE(?, name), description = COALESCE(?, description) WHERE id = ?",
        )
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(deck_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyError::DeckNotFound(deck_id));
        }
        self.get_deck(deck_id)
            .await?
            .ok_or(StudyError::DeckNotFound(deck_id))
    }

    /// Deletes the deck with all of its cards, progress and review history.
    pub async fn delete_deck(&self, deck_id: Uuid) -> Result<bool, StudyError> {
        let result = sqlx::query("DELETE FROM decks WHERE id = ?")
            .bind(deck_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn add_card(
        &self,
        deck_id: Uuid,
        front: &str,
        back: &str,
        card_type: CardType,
    ) -> Result<Card, StudyError> {
        if self.get_deck(deck_id).await?.is_none() {
            return Err(StudyError::DeckNotFound(deck_id));
        }

        let card = Card {
            id: Uuid::new_v4(),
            deck_id,
            front: front.to_string(),
            back: back.to_string(),
            card_type,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO cards (id, deck_id, front, back, card_type, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(card.id)
        .bind(card.deck_id)
        .bind(&card.front)
        .bind(&card.back)
        .bind(card.card_type.as_str())
        .bind(card.created_at)
        .execute(&self.pool)
        .await?;

        Ok(card)
    }

    pub async fn get_card(&self, card_id: Uuid) -> Result<Option<Card>, StudyError> {
        let card = sqlx::query_as::<_, Card>("SELECT * FROM cards WHERE id = ?")
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(card)
    }

    pub async fn cards_for_deck(&self, deck_id: Uuid) -> Result<Vec<Card>, StudyError> {
        let cards = sqlx::query_as::<_, Card>(
            "SELECT * FROM cards WHERE deck_id = ? ORDER BY created_at, rowid",
        )
        .bind(deck_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(cards)
    }

    /// Edits a card's content. Its schedule and review history are kept.
    pub async fn update_card(&self, card_id: Uuid, update: &CardUpdate) -> Result<Card, StudyError> {
        let result = sqlx::query(
            r#"
            UPDATE cards
            SET front = COALESCE(?, front), back = COALESCE(?, back), card_type = COALESCE(?, card_type)
            WHERE id = ?
            "#,
        )
        .bind(update.front.as_deref())
        .bind(update.back.as_deref())
        .bind(update.card_type.map(CardType::as_str))
        .bind(card_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StudyError::CardNotFound(card_id));
        }
        self.get_card(card_id)
            .await?
            .ok_or(StudyError::CardNotFound(card_id))
    }

    /// Deletes a card; its progress row and review logs go with it.
    pub async fn delete_card(&self, card_id: Uuid) -> Result<bool, StudyError> {
        let result = sqlx::query("DELETE FROM cards WHERE id = ?")
            .bind(card_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn progress_for_card(&self, card_id: Uuid) -> Result<Option<CardProgress>, StudyError> {
        let progress = sqlx::query_as::<_, CardProgress>("SELECT * FROM card_progress WHERE card_id = ?")
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(progress)
    }

    /// Review history of a card, newest first.
    pub async fn review_logs(&self, card_id: Uuid) -> Result<Vec<ReviewLog>, StudyError> {
        let logs = sqlx::query_as::<_, ReviewLog>(
            "SELECT * FROM review_logs WHERE card_id = ? ORDER BY reviewed_at DESC, rowid DESC",
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    /// Reads a deck's cards and their progress rows in one transaction.
    pub async fn deck_snapshot(&self, deck_id: Uuid) -> Result<DeckSnapshot, StudyError> {
        let mut tx = self.pool.begin().await?;

        let cards = sqlx::query_as::<_, Card>(
            "SELECT * FROM cards WHERE deck_id = ? ORDER BY created_at, rowid",
        )
        .bind(deck_id)
        .fetch_all(&mut *tx)
        .await?;

        let progress = sqlx::query_as::<_, CardProgress>(
            r#"
            SELECT p.* FROM card_progress p
            JOIN cards c ON c.id = p.card_id
            WHERE c.deck_id = ?
            "#,
        )
        .bind(deck_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(DeckSnapshot {
            cards,
            progress: progress.into_iter().map(|p| (p.card_id, p)).collect(),
        })
    }

    /// New cards first, then due cards, each group shuffled. An unknown or
    /// empty deck gives an empty queue.
    pub async fn study_cards(&self, deck_id: Uuid) -> Result<Vec<StudyItem>, StudyError> {
        let snapshot = self.deck_snapshot(deck_id).await?;
        Ok(queue::build_queue(snapshot, Utc::now(), &mut rand::thread_rng()))
    }

    pub async fn study_cards_with_rng<R: Rng + ?Sized>(
        &self,
        deck_id: Uuid,
        rng: &mut R,
    ) -> Result<Vec<StudyItem>, StudyError> {
        let snapshot = self.deck_snapshot(deck_id).await?;
        Ok(queue::build_queue(snapshot, Utc::now(), rng))
    }

    /// Cards a session started now would serve: new plus due.
    pub async fn count_due(&self, deck_id: Uuid) -> Result<usize, StudyError> {
        let snapshot = self.deck_snapshot(deck_id).await?;
        let now = Utc::now();
        Ok(snapshot.count(Readiness::New, now) + snapshot.count(Readiness::Due, now))
    }

    /// Every deck, newest first, with its card counts.
    pub async fn list_decks_with_counts(&self) -> Result<Vec<DeckSummary>, StudyError> {
        let mut tx = self.pool.begin().await?;

        let decks = sqlx::query_as::<_, Deck>("SELECT * FROM decks ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&mut *tx)
            .await?;
        let cards = sqlx::query_as::<_, Card>("SELECT * FROM cards")
            .fetch_all(&mut *tx)
            .await?;
        let progress = sqlx::query_as::<_, CardProgress>("SELECT * FROM card_progress")
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut progress: HashMap<Uuid, CardProgress> =
            progress.into_iter().map(|p| (p.card_id, p)).collect();
        let mut snapshots: HashMap<Uuid, DeckSnapshot> = HashMap::new();
        for card in cards {
            let snapshot = snapshots.entry(card.deck_id).or_default();
            if let Some(p) = progress.remove(&card.id) {
                snapshot.progress.insert(card.id, p);
            }
            snapshot.cards.push(card);
        }

        let now = Utc::now();
        Ok(decks
            .into_iter()
            .map(|deck| {
                let snapshot = snapshots.remove(&deck.id).unwrap_or_default();
                let new_cards = snapshot.count(Readiness::New, now);
                DeckSummary {
                    total_cards: snapshot.cards.len(),
                    new_cards,
                    due_count: new_cards + snapshot.count(Readiness::Due, now),
                    deck,
                }
            })
            .collect())
    }

    /// A deck's cards in creation order, each with its progress row if any.
    pub async fn cards_with_progress(
        &self,
        deck_id: Uuid,
    ) -> Result<Vec<CardWithProgress>, StudyError> {
        let DeckSnapshot {
            cards,
            mut progress,
        } = self.deck_snapshot(deck_id).await?;

        Ok(cards
            .into_iter()
            .map(|card| CardWithProgress {
                progress: progress.remove(&card.id),
                card,
            })
            .collect())
    }

    /// Schedules a review and records it.
    ///
    /// The progress upsert and the review-log append commit together. The
    /// progress row is written with a compare-and-swap on its version; when a
    /// concurrent review of the same card wins, the whole read-schedule-write
    /// cycle runs again on the fresh row.
    pub async fn submit_review(
        &self,
        deck_id: Uuid,
        submission: &ReviewSubmission,
    ) -> Result<CardProgress, StudyError> {
        let quality = Quality::new(submission.quality)?;

        for attempt in 1..=MAX_REVIEW_ATTEMPTS {
            match self.try_submit_review(deck_id, submission, quality).await {
                Ok(Some(progress)) => {
                    log::debug!(
                        "card {} reviewed with quality {}: {} reps, next in {} days",
                        submission.card_id,
                        quality.value(),
                        progress.repetitions,
                        progress.interval_days
                    );
                    return Ok(progress);
                }
                Ok(None) => {
                    log::debug!(
                        "card {} changed under review, retrying (attempt {})",
                        submission.card_id,
                        attempt
                    );
                }
                Err(StudyError::Storage(err)) if is_busy(&err) => {
                    log::debug!(
                        "card {} review hit a locked database, retrying (attempt {}): {}",
                        submission.card_id,
                        attempt,
                        err
                    );
                }
                Err(err) => return Err(err),
            }
        }

        log::warn!(
            "giving up on review of card {} after {} attempts",
            submission.card_id,
            MAX_REVIEW_ATTEMPTS
        );
        Err(StudyError::Conflict(submission.card_id))
    }

    /// One read-schedule-write round. `Ok(None)` means the compare-and-swap
    /// lost and nothing was written.
    async fn try_submit_review(
        &self,
        deck_id: Uuid,
        submission: &ReviewSubmission,
        quality: Quality,
    ) -> Result<Option<CardProgress>, StudyError> {
        let card_id = submission.card_id;
        let mut tx = self.pool.begin().await?;

        let in_deck: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM cards WHERE id = ? AND deck_id = ?")
                .bind(card_id)
                .bind(deck_id)
                .fetch_optional(&mut *tx)
                .await?;
        if in_deck.is_none() {
            return Err(StudyError::CardNotFound(card_id));
        }

        let existing = sqlx::query_as::<_, CardProgress>("SELECT * FROM card_progress WHERE card_id = ?")
            .bind(card_id)
            .fetch_optional(&mut *tx)
            .await?;

        let prior = existing
            .as_ref()
            .map(CardProgress::schedule_state)
            .unwrap_or_default();
        let update = srs::schedule(&prior, quality, &Local::now())?;
        let version = existing.as_ref().map_or(0, |p| p.version) + 1;
        let progress = CardProgress::from_update(card_id, &update, version);

        let written = match &existing {
            Some(current) => {
                sqlx::query(
                    r#"
                    UPDATE card_progress
                    SET repetitions = ?, easiness_factor = ?, interval_days = ?,
                        next_review_date = ?, status = ?, version = ?, updated_at = ?
                    WHERE card_id = ? AND version = ?
                    "#,
                )
                .bind(i64::from(progress.repetitions))
                .bind(progress.easiness_factor)
                .bind(i64::from(progress.interval_days))
                .bind(progress.next_review_date)
                .bind(progress.status.as_str())
                .bind(progress.version)
                .bind(progress.updated_at)
                .bind(card_id)
                .bind(current.version)
                .execute(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO card_progress
                        (card_id, repetitions, easiness_factor, interval_days,
                         next_review_date, status, version, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(card_id) DO NOTHING
                    "#,
                )
                .bind(card_id)
                .bind(i64::from(progress.repetitions))
                .bind(progress.easiness_factor)
                .bind(i64::from(progress.interval_days))
                .bind(progress.next_review_date)
                .bind(progress.status.as_str())
                .bind(progress.version)
                .bind(progress.updated_at)
                .execute(&mut *tx)
                .await?
            }
        };

        if written.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO review_logs (id, card_id, quality, user_answer, feedback, reviewed_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(card_id)
        .bind(i64::from(quality.value()))
        .bind(submission.user_answer.as_deref())
        .bind(submission.feedback.as_deref())
        .bind(progress.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(progress))
    }
}
