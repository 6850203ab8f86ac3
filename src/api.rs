use crate::db::Db;
use crate::error::{ScheduleError, StudyError};
use crate::grading::{AnswerGrader, SimilarityGrader};
use crate::models::{
    Card, CardProgress, CardType, CardUpdate, CardWithProgress, Deck, DeckSummary, DeckUpdate,
    ReviewLog, ReviewSubmission, StudyItem,
};
use crate::srs::Quality;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiState {
    pub db: Db,
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/decks", get(list_decks).post(create_deck))
        .route("/api/decks/:deck_id", patch(update_deck))
        .route("/api/decks/:deck_id/cards", get(list_cards).post(add_card))
        .route("/api/cards/:card_id", patch(update_card))
        .route("/api/decks/:deck_id/study", get(study_cards))
        .route("/api/decks/:deck_id/reviews", post(submit_review))
        .route("/api/cards/:card_id/reviews", get(review_history))
        .route("/api/grade", post(grade_answer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ApiError(StudyError);

impl From<StudyError> for ApiError {
    fn from(err: StudyError) -> Self {
        ApiError(err)
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        ApiError(StudyError::Schedule(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StudyError::Schedule(ScheduleError::InvalidQuality(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            StudyError::CardNotFound(_) | StudyError::DeckNotFound(_) => StatusCode::NOT_FOUND,
            StudyError::Conflict(_) => StatusCode::CONFLICT,
            StudyError::Grading(_) => StatusCode::BAD_GATEWAY,
            StudyError::Schedule(ScheduleError::DateOutOfRange(_)) | StudyError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            log::error!("request failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Deserialize)]
struct NewDeck {
    name: String,
    #[serde(default)]
    description: String,
}

async fn create_deck(
    State(state): State<ApiState>,
    Json(payload): Json<NewDeck>,
) -> Result<impl IntoResponse, ApiError> {
    let deck: Deck = state.db.create_deck(&payload.name, &payload.description).await?;
    Ok((StatusCode::CREATED, Json(deck)))
}

async fn list_decks(State(state): State<ApiState>) -> Result<Json<Vec<DeckSummary>>, ApiError> {
    Ok(Json(state.db.list_decks_with_counts().await?))
}

async fn update_deck(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
    Json(payload): Json<DeckUpdate>,
) -> Result<Json<Deck>, ApiError> {
    Ok(Json(state.db.update_deck(deck_id, &payload).await?))
}

#[derive(Deserialize)]
struct NewCard {
    front: String,
    back: String,
    #[serde(default)]
    card_type: CardType,
}

async fn add_card(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
    Json(payload): Json<NewCard>,
) -> Result<impl IntoResponse, ApiError> {
    let card: Card = state
        .db
        .add_card(deck_id, &payload.front, &payload.back, payload.card_type)
        .await?;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn list_cards(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<Vec<CardWithProgress>>, ApiError> {
    if state.db.get_deck(deck_id).await?.is_none() {
        return Err(StudyError::DeckNotFound(deck_id).into());
    }
    Ok(Json(state.db.cards_with_progress(deck_id).await?))
}

async fn update_card(
    State(state): State<ApiState>,
    Path(card_id): Path<Uuid>,
    Json(payload): Json<CardUpdate>,
) -> Result<Json<Card>, ApiError> {
    Ok(Json(state.db.update_card(card_id, &payload).await?))
}

async fn study_cards(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
) -> Result<Json<Vec<StudyItem>>, ApiError> {
    Ok(Json(state.db.study_cards(deck_id).await?))
}

/// Quality arrives as any JSON number so that fractional or out-of-range
/// values get the same error as the rest of the API.
#[derive(Deserialize)]
struct ReviewRequest {
    card_id: Uuid,
    quality: f64,
    #[serde(default)]
    user_answer: Option<String>,
    #[serde(default)]
    feedback: Option<String>,
}

async fn submit_review(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<CardProgress>, ApiError> {
    let quality = Quality::try_from(payload.quality)?;
    let submission = ReviewSubmission {
        card_id: payload.card_id,
        quality: i64::from(quality.value()),
        user_answer: payload.user_answer,
        feedback: payload.feedback,
    };
    Ok(Json(state.db.submit_review(deck_id, &submission).await?))
}

async fn review_history(
    State(state): State<ApiState>,
    Path(card_id): Path<Uuid>,
) -> Result<Json<Vec<ReviewLog>>, ApiError> {
    if state.db.get_card(card_id).await?.is_none() {
        return Err(StudyError::CardNotFound(card_id).into());
    }
    Ok(Json(state.db.review_logs(card_id).await?))
}

#[derive(Deserialize)]
struct GradeRequest {
    question: String,
    correct_answer: String,
    user_answer: String,
}

#[derive(Serialize)]
struct GradeResponse {
    quality: Quality,
    label: &'static str,
    feedback: String,
}

async fn grade_answer(Json(payload): Json<GradeRequest>) -> Result<Json<GradeResponse>, ApiError> {
    let grade = SimilarityGrader
        .grade(&payload.question, &payload.correct_answer, &payload.user_answer)
        .await
        .map_err(StudyError::from)?;
    let (quality, feedback) = grade.validate()?;
    Ok(Json(GradeResponse {
        quality,
        label: quality.label(),
        feedback,
    }))
}
