//! Flat content tables: quick tips, rules, workshops, FAQs, education, products.
//!
//! Each table follows the same shape: GET lists rows, POST validates trimmed
//! non-empty required fields and inserts one row. List failures degrade to an
//! empty list; insert failures surface as errors.

use crate::api::AppState;
use crate::error::ApiError;
use crate::store::RecordStore;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuickTip {
    pub id: i64,
    pub tip: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Rule {
    pub id: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Workshop {
    pub id: i64,
    pub title: String,
    pub instructor: String,
    pub location: String,
    /// Free-form date string, used for ascending ordering
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Faq {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EducationContent {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub short_description: String,
    pub steps: String,
}

/// Trim an optional payload field down to a non-empty value
fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Trim an optional field, defaulting to empty when absent
fn trimmed_or_empty(value: &Option<String>) -> String {
    trimmed(value).unwrap_or_default()
}

impl RecordStore {
    pub async fn list_quick_tips(&self) -> Result<Vec<QuickTip>, sqlx::Error> {
        sqlx::query_as("SELECT id, tip, created_at FROM quick_tips ORDER BY created_at DESC")
            .fetch_all(self.pool())
            .await
    }

    pub async fn insert_quick_tip(&self, tip: &str) -> Result<QuickTip, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO quick_tips (tip, created_at)
            VALUES ($1, NOW())
            RETURNING id, tip, created_at
            "#,
        )
        .bind(tip)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_rules(&self) -> Result<Vec<Rule>, sqlx::Error> {
        sqlx::query_as("SELECT id, title, description FROM rules")
            .fetch_all(self.pool())
            .await
    }

    pub async fn insert_rule(&self, title: &str, description: &str) -> Result<Rule, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO rules (title, description)
            VALUES ($1, $2)
            RETURNING id, title, description
            "#,
        )
        .bind(title)
        .bind(description)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_workshops(&self) -> Result<Vec<Workshop>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, title, instructor, location, date FROM workshops ORDER BY date ASC",
        )
        .fetch_all(self.pool())
        .await
    }

    pub async fn insert_workshop(
        &self,
        title: &str,
        instructor: &str,
        location: &str,
        date: &str,
    ) -> Result<Workshop, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO workshops (title, instructor, location, date)
            VALUES ($1, $2, $3, $4)
            RETURNING id, title, instructor, location, date
            "#,
        )
        .bind(title)
        .bind(instructor)
        .bind(location)
        .bind(date)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_faqs(&self) -> Result<Vec<Faq>, sqlx::Error> {
        sqlx::query_as("SELECT id, question, answer, category FROM faqs")
            .fetch_all(self.pool())
            .await
    }

    pub async fn insert_faq(
        &self,
        question: &str,
        answer: &str,
        category: &str,
    ) -> Result<Faq, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO faqs (question, answer, category)
            VALUES ($1, $2, $3)
            RETURNING id, question, answer, category
            "#,
        )
        .bind(question)
        .bind(answer)
        .bind(category)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_education(&self) -> Result<Vec<EducationContent>, sqlx::Error> {
        sqlx::query_as("SELECT id, title, content, category FROM education_content")
            .fetch_all(self.pool())
            .await
    }

    pub async fn insert_education(
        &self,
        title: &str,
        content: &str,
        category: &str,
    ) -> Result<EducationContent, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO education_content (title, content, category)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, category
            "#,
        )
        .bind(title)
        .bind(content)
        .bind(category)
        .fetch_one(self.pool())
        .await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, short_description, steps FROM products")
            .fetch_all(self.pool())
            .await
    }

    pub async fn insert_product(
        &self,
        name: &str,
        short_description: &str,
        steps: &str,
    ) -> Result<Product, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO products (name, short_description, steps)
            VALUES ($1, $2, $3)
            RETURNING id, name, short_description, steps
            "#,
        )
        .bind(name)
        .bind(short_description)
        .bind(steps)
        .fetch_one(self.pool())
        .await
    }
}

// ---------- Handlers ----------

#[derive(Debug, Deserialize)]
pub struct CreateQuickTip {
    pub tip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRule {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkshop {
    pub title: Option<String>,
    /// Accepted as an alias for `title`
    pub workshop: Option<String>,
    pub instructor: Option<String>,
    pub location: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFaq {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateEducation {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub steps: Option<String>,
}

/// Routes for all flat content tables
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/quick-tips", get(list_quick_tips).post(create_quick_tip))
        .route("/api/rules", get(list_rules).post(create_rule))
        .route("/api/workshops", get(list_workshops).post(create_workshop))
        .route("/api/faqs", get(list_faqs).post(create_faq))
        .route("/api/education", get(list_education).post(create_education))
        .route("/api/products", get(list_products).post(create_product))
}

/// Degrade a failed list query to an empty list
fn degrade<T>(table: &str, result: Result<Vec<T>, sqlx::Error>) -> Json<Vec<T>> {
    match result {
        Ok(rows) => Json(rows),
        Err(e) => {
            warn!(table = table, error = %e, "Content list failed; returning empty list");
            Json(Vec::new())
        }
    }
}

async fn list_quick_tips(State(state): State<AppState>) -> Json<Vec<QuickTip>> {
    degrade("quick_tips", state.store.list_quick_tips().await)
}

async fn create_quick_tip(
    State(state): State<AppState>,
    Json(payload): Json<CreateQuickTip>,
) -> Result<(StatusCode, Json<QuickTip>), ApiError> {
    let tip = trimmed(&payload.tip).ok_or_else(|| ApiError::invalid("tip is required"))?;

    let created = state.store.insert_quick_tip(&tip).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_rules(State(state): State<AppState>) -> Json<Vec<Rule>> {
    degrade("rules", state.store.list_rules().await)
}

async fn create_rule(
    State(state): State<AppState>,
    Json(payload): Json<CreateRule>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    let title = trimmed(&payload.title).ok_or_else(|| ApiError::invalid("title is required"))?;
    let description = trimmed(&payload.description)
        .ok_or_else(|| ApiError::invalid("description is required"))?;

    let created = state.store.insert_rule(&title, &description).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_workshops(State(state): State<AppState>) -> Json<Vec<Workshop>> {
    degrade("workshops", state.store.list_workshops().await)
}

async fn create_workshop(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkshop>,
) -> Result<(StatusCode, Json<Workshop>), ApiError> {
    let title = trimmed(&payload.title)
        .or_else(|| trimmed(&payload.workshop))
        .ok_or_else(|| ApiError::invalid("title is required"))?;
    let instructor =
        trimmed(&payload.instructor).ok_or_else(|| ApiError::invalid("instructor is required"))?;
    let location = trimmed_or_empty(&payload.location);
    let date = trimmed_or_empty(&payload.date);

    let created = state
        .store
        .insert_workshop(&title, &instructor, &location, &date)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_faqs(State(state): State<AppState>) -> Json<Vec<Faq>> {
    degrade("faqs", state.store.list_faqs().await)
}

async fn create_faq(
    State(state): State<AppState>,
    Json(payload): Json<CreateFaq>,
) -> Result<(StatusCode, Json<Faq>), ApiError> {
    let question =
        trimmed(&payload.question).ok_or_else(|| ApiError::invalid("question is required"))?;
    let answer = trimmed(&payload.answer).ok_or_else(|| ApiError::invalid("answer is required"))?;
    let category = trimmed_or_empty(&payload.category);

    let created = state.store.insert_faq(&question, &answer, &category).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_education(State(state): State<AppState>) -> Json<Vec<EducationContent>> {
    degrade("education_content", state.store.list_education().await)
}

async fn create_education(
    State(state): State<AppState>,
    Json(payload): Json<CreateEducation>,
) -> Result<(StatusCode, Json<EducationContent>), ApiError> {
    let title = trimmed(&payload.title).ok_or_else(|| ApiError::invalid("title is required"))?;
    let content =
        trimmed(&payload.content).ok_or_else(|| ApiError::invalid("content is required"))?;
    let category = trimmed_or_empty(&payload.category);

    let created = state
        .store
        .insert_education(&title, &content, &category)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    degrade("products", state.store.list_products().await)
}

async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let name = trimmed(&payload.name).ok_or_else(|| ApiError::invalid("name is required"))?;
    let short_description = trimmed(&payload.short_description)
        .ok_or_else(|| ApiError::invalid("short_description is required"))?;
    let steps = trimmed_or_empty(&payload.steps);

    let created = state
        .store
        .insert_product(&name, &short_description, &steps)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_rejects_blank_fields() {
        assert_eq!(trimmed(&Some("  ".to_string())), None);
        assert_eq!(trimmed(&None), None);
        assert_eq!(
            trimmed(&Some("  Use aftercare balm  ".to_string())),
            Some("Use aftercare balm".to_string())
        );
    }

    #[test]
    fn test_trimmed_or_empty_defaults() {
        assert_eq!(trimmed_or_empty(&None), "");
        assert_eq!(trimmed_or_empty(&Some(" Ankara ".to_string())), "Ankara");
    }

    #[test]
    fn test_workshop_title_alias() {
        let payload = CreateWorkshop {
            title: None,
            workshop: Some("Microblading 101".to_string()),
            instructor: Some("Elif".to_string()),
            location: None,
            date: None,
        };

        let title = trimmed(&payload.title).or_else(|| trimmed(&payload.workshop));
        assert_eq!(title, Some("Microblading 101".to_string()));
    }
}
