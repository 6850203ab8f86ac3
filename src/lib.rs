pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod grading;
pub mod models;
pub mod queue;
pub mod session;
pub mod srs;

pub use db::Db;
pub use error::{GradingError, ScheduleError, StudyError};
pub use grading::{AnswerGrader, FallbackGrader, Grade, SimilarityGrader};
pub use models::{
    Card, CardProgress, CardType, CardUpdate, CardWithProgress, Deck, DeckSummary, DeckUpdate,
    ProgressStatus, ReviewLog, ReviewSubmission, StudyItem,
};
pub use queue::{build_queue, DeckSnapshot};
pub use session::StudySession;
pub use srs::{schedule, update, Quality, ScheduleState, ScheduleUpdate};
