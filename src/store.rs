use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Student role, stored as text in the student table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Master,
    Admin,
}

impl Role {
    /// Parse a stored role value; unknown values fall back to `Member`
    pub fn parse(value: &str) -> Self {
        match value {
            "master" => Self::Master,
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }

    /// Master and admin are granted content-curation actions
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::Master | Self::Admin)
    }
}

/// Reaction vocabulary for photos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Like,
    Love,
    Wow,
    Clap,
}

impl ReactionKind {
    /// Parse a reaction value; anything outside the vocabulary is `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "like" => Some(Self::Like),
            "love" => Some(Self::Love),
            "wow" => Some(Self::Wow),
            "clap" => Some(Self::Clap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Wow => "wow",
            Self::Clap => "clap",
        }
    }
}

/// A student record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub id: i64,
    pub name: String,
    /// Argon2 PHC-string hash; absent for passwordless accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl Student {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// An uploaded photo
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Photo {
    pub id: i64,
    pub student_id: i64,
    pub image_url: String,
    /// Legacy free-text field, unused by the feed
    pub feedback: Option<String>,
    pub is_monthly_winner: bool,
    pub created_at: DateTime<Utc>,
}

/// A reaction row as stored; `reaction` is raw text, validated at read time
#[derive(Debug, Clone, FromRow)]
pub struct ReactionRow {
    pub photo_id: i64,
    pub student_id: i64,
    pub reaction: String,
}

/// A feedback entry on a photo
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackRow {
    pub id: i64,
    pub photo_id: i64,
    pub student_id: i64,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

/// A book in the PDF catalog
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A support ticket
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SupportRequest {
    pub id: i64,
    pub student_id: i64,
    pub subject: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Record store client backed by PostgreSQL
pub struct RecordStore {
    pool: PgPool,
}

impl RecordStore {
    /// Create a new record store with connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_secs)))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ---------- Students ----------

    /// Find a student by display name, case-insensitively, at the query level
    #[instrument(skip(self))]
    pub async fn find_student_by_name(&self, name: &str) -> Result<Option<Student>, sqlx::Error> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(None);
        }

        sqlx::query_as::<_, Student>(
            r#"
            SELECT id, name, password_hash, role, created_at
            FROM students
            WHERE lower(trim(name)) = $1
            "#,
        )
        .bind(&needle)
        .fetch_optional(&self.pool)
        .await
    }

    /// Get a student by id
    pub async fn get_student(&self, id: i64) -> Result<Option<Student>, sqlx::Error> {
        sqlx::query_as::<_, Student>(
            r#"
            SELECT id, name, password_hash, role, created_at
            FROM students
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Set a student's password hash
    #[instrument(skip(self, hash))]
    pub async fn set_password_hash(&self, student_id: i64, hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE students SET password_hash = $1 WHERE id = $2")
            .bind(hash)
            .bind(student_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Resolve a batch of student ids to display names
    pub async fn resolve_student_names(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, String>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM students WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    // ---------- Photos ----------

    /// List all photos, newest first
    pub async fn list_photos(&self) -> Result<Vec<Photo>, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, student_id, image_url, feedback, is_monthly_winner, created_at
            FROM photos
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// List photos owned by one student
    pub async fn list_photos_by_owner(&self, student_id: i64) -> Result<Vec<Photo>, sqlx::Error> {
        sqlx::query_as::<_, Photo>(
            r#"
            SELECT id, student_id, image_url, feedback, is_monthly_winner, created_at
            FROM photos
            WHERE student_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a photo record and return the stored row
    #[instrument(skip(self, image_url))]
    pub async fn insert_photo(
        &self,
        student_id: i64,
        image_url: &str,
    ) -> Result<Photo, sqlx::Error> {
        let photo = sqlx::query_as::<_, Photo>(
            r#"
            INSERT INTO photos (student_id, image_url, feedback, is_monthly_winner, created_at)
            VALUES ($1, $2, NULL, FALSE, NOW())
            RETURNING id, student_id, image_url, feedback, is_monthly_winner, created_at
            "#,
        )
        .bind(student_id)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await?;

        metrics::counter!("community.photos.inserted").increment(1);

        Ok(photo)
    }

    /// Mark exactly one photo as the monthly winner
    ///
    /// The clear and the set run in a single transaction so concurrent calls
    /// cannot leave zero or two winners behind.
    #[instrument(skip(self))]
    pub async fn set_monthly_winner(&self, photo_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE photos SET is_monthly_winner = FALSE WHERE is_monthly_winner = TRUE")
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE photos SET is_monthly_winner = TRUE WHERE id = $1")
            .bind(photo_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(photo_id = photo_id, "Monthly winner updated");

        Ok(())
    }

    // ---------- Reactions ----------

    /// Set or replace a student's reaction on a photo
    ///
    /// The (photo_id, student_id) pair carries a unique index, so this is a
    /// single atomic upsert rather than a check-then-act sequence.
    #[instrument(skip(self))]
    pub async fn upsert_reaction(
        &self,
        photo_id: i64,
        student_id: i64,
        kind: ReactionKind,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO photo_reactions (photo_id, student_id, reaction, created_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (photo_id, student_id)
            DO UPDATE SET reaction = EXCLUDED.reaction, created_at = EXCLUDED.created_at
            "#,
        )
        .bind(photo_id)
        .bind(student_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        metrics::counter!("community.reactions.upserted").increment(1);

        Ok(())
    }

    /// Fetch all reactions for a set of photos
    pub async fn list_reactions_for(
        &self,
        photo_ids: &[i64],
    ) -> Result<Vec<ReactionRow>, sqlx::Error> {
        sqlx::query_as::<_, ReactionRow>(
            r#"
            SELECT photo_id, student_id, reaction
            FROM photo_reactions
            WHERE photo_id = ANY($1)
            "#,
        )
        .bind(photo_ids)
        .fetch_all(&self.pool)
        .await
    }

    // ---------- Feedback ----------

    /// Append a feedback entry to a photo
    #[instrument(skip(self, feedback))]
    pub async fn insert_feedback(
        &self,
        photo_id: i64,
        student_id: i64,
        feedback: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO photo_feedbacks (photo_id, student_id, feedback, created_at)
            VALUES ($1, $2, $3, NOW())
            "#,
        )
        .bind(photo_id)
        .bind(student_id)
        .bind(feedback)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch all feedback for a set of photos, newest first
    pub async fn list_feedback_for(
        &self,
        photo_ids: &[i64],
    ) -> Result<Vec<FeedbackRow>, sqlx::Error> {
        sqlx::query_as::<_, FeedbackRow>(
            r#"
            SELECT id, photo_id, student_id, feedback, created_at
            FROM photo_feedbacks
            WHERE photo_id = ANY($1)
            ORDER BY created_at DESC
            "#,
        )
        .bind(photo_ids)
        .fetch_all(&self.pool)
        .await
    }

    // ---------- Books ----------

    /// List the book catalog, newest first
    pub async fn list_books(&self) -> Result<Vec<Book>, sqlx::Error> {
        sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, url, created_at
            FROM books
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a book record and return the stored row
    #[instrument(skip(self, url))]
    pub async fn insert_book(&self, title: &str, url: &str) -> Result<Book, sqlx::Error> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, url, created_at)
            VALUES ($1, $2, NOW())
            RETURNING id, title, url, created_at
            "#,
        )
        .bind(title)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;

        metrics::counter!("community.books.inserted").increment(1);

        Ok(book)
    }

    // ---------- Support ----------

    /// Open a support ticket for a student
    #[instrument(skip(self, subject, message))]
    pub async fn insert_support_request(
        &self,
        student_id: i64,
        subject: &str,
        message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO support_requests (student_id, subject, message, status, created_at)
            VALUES ($1, $2, $3, 'open', NOW())
            "#,
        )
        .bind(student_id)
        .bind(subject)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("master"), Role::Master);
        assert_eq!(Role::parse("member"), Role::Member);
        assert_eq!(Role::parse("something-else"), Role::Member);
    }

    #[test]
    fn test_role_elevation() {
        assert!(Role::Admin.is_elevated());
        assert!(Role::Master.is_elevated());
        assert!(!Role::Member.is_elevated());
    }

    #[test]
    fn test_reaction_vocabulary() {
        assert_eq!(ReactionKind::parse("like"), Some(ReactionKind::Like));
        assert_eq!(ReactionKind::parse("clap"), Some(ReactionKind::Clap));
        assert_eq!(ReactionKind::parse("dislike"), None);
        assert_eq!(ReactionKind::parse(""), None);
        assert_eq!(ReactionKind::Love.as_str(), "love");
    }

    #[test]
    fn test_student_password_flag() {
        let student = Student {
            id: 1,
            name: "Ayşe".to_string(),
            password_hash: None,
            role: "member".to_string(),
            created_at: Utc::now(),
        };
        assert!(!student.has_password());
        assert_eq!(student.role(), Role::Member);
    }
}
