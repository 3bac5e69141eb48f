use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::BloodGroup;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::records::models::{CorrectionOutcome, NewPrediction, PredictionRecord, TrainingSample};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Feature vector serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn insert_prediction(&self, new: &NewPrediction) -> Result<i64, RepositoryError>;

    async fn get_prediction(&self, id: i64) -> Result<Option<PredictionRecord>, RepositoryError>;

    /// Sets `actual_label` if it is still unset and appends the training sample,
    /// both in one transaction.
    async fn apply_correction(
        &self,
        id: i64,
        actual_label: BloodGroup,
        features: Option<&[f32]>,
    ) -> Result<CorrectionOutcome, RepositoryError>;

    async fn list_training_samples(&self) -> Result<Vec<TrainingSample>, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    subject_ref: Option<String>,
    image_path: String,
    predicted_label: String,
    confidence: f64,
    actual_label: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for PredictionRecord {
    type Error = RepositoryError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            subject_ref: row.subject_ref,
            image_path: row.image_path,
            predicted_label: parse_label(&row.predicted_label)?,
            confidence: row.confidence as f32,
            actual_label: row.actual_label.as_deref().map(parse_label).transpose()?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TrainingSampleRow {
    id: i64,
    image_path: String,
    actual_label: String,
    feature_vector_json: Option<String>,
    captured_at: DateTime<Utc>,
}

impl TryFrom<TrainingSampleRow> for TrainingSample {
    type Error = RepositoryError;

    fn try_from(row: TrainingSampleRow) -> Result<Self, Self::Error> {
        let features = row
            .feature_vector_json
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()?;
        Ok(Self {
            id: row.id,
            image_path: row.image_path,
            actual_label: parse_label(&row.actual_label)?,
            features,
            captured_at: row.captured_at,
        })
    }
}

fn parse_label(raw: &str) -> Result<BloodGroup, RepositoryError> {
    BloodGroup::from_str(raw)
        .map_err(|_| RepositoryError::CorruptRow(format!("unknown blood group {:?}", raw)))
}

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database and makes sure both tables exist.
    pub async fn connect(database_url: &str) -> Result<Self, RepositoryError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database lives and dies with its single connection.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let repo = Self::new(pool);
        repo.init_schema().await?;
        Ok(repo)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init_schema(&self) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject_ref TEXT,
                image_path TEXT NOT NULL,
                predicted_label TEXT NOT NULL,
                confidence REAL NOT NULL,
                actual_label TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                image_path TEXT NOT NULL,
                actual_label TEXT NOT NULL,
                feature_vector_json TEXT,
                captured_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PredictionRepository for SqliteRepository {
    async fn insert_prediction(&self, new: &NewPrediction) -> Result<i64, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO predictions (subject_ref, image_path, predicted_label, confidence, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.subject_ref.as_deref())
        .bind(&new.image_path)
        .bind(new.predicted_label.as_ref())
        .bind(f64::from(new.confidence))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn get_prediction(&self, id: i64) -> Result<Option<PredictionRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT id, subject_ref, image_path, predicted_label, confidence, actual_label, created_at
            FROM predictions WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PredictionRecord::try_from).transpose()
    }

    async fn apply_correction(
        &self,
        id: i64,
        actual_label: BloodGroup,
        features: Option<&[f32]>,
    ) -> Result<CorrectionOutcome, RepositoryError> {
        let feature_json = features.map(serde_json::to_string).transpose()?;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE predictions SET actual_label = ? WHERE id = ? AND actual_label IS NULL",
        )
        .bind(actual_label.as_ref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM predictions WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(match exists {
                Some(_) => CorrectionOutcome::AlreadyCorrected,
                None => CorrectionOutcome::NotFound,
            });
        }

        let image_path: String = sqlx::query_scalar("SELECT image_path FROM predictions WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let captured_at = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO training_samples (image_path, actual_label, feature_vector_json, captured_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&image_path)
        .bind(actual_label.as_ref())
        .bind(feature_json)
        .bind(captured_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CorrectionOutcome::Applied(TrainingSample {
            id: inserted.last_insert_rowid(),
            image_path,
            actual_label,
            features: features.map(<[f32]>::to_vec),
            captured_at,
        }))
    }

    async fn list_training_samples(&self) -> Result<Vec<TrainingSample>, RepositoryError> {
        let rows = sqlx::query_as::<_, TrainingSampleRow>(
            r#"
            SELECT id, image_path, actual_label, feature_vector_json, captured_at
            FROM training_samples ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TrainingSample::try_from).collect()
    }
}
