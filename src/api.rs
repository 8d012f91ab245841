use crate::auth;
use crate::config::ApiConfig;
use crate::content;
use crate::error::ApiError;
use crate::feed::{FeedAggregator, FeedPhoto};
use crate::object_store::{file_extension, ObjectStore};
use crate::store::{Book, Photo, ReactionKind, RecordStore};
use anyhow::{Context, Result};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::time::Duration as CookieDuration;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub objects: Arc<ObjectStore>,
    pub aggregator: Arc<FeedAggregator>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(CookieDuration::seconds(
            config.session_ttl_secs as i64,
        )));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/", get(index))
        .route("/login", get(login_page).post(login_submit))
        .route("/logout", get(logout).post(logout))
        .route("/dashboard", get(dashboard))
        .route("/api/student", get(get_student))
        .route("/api/auth/check", get(auth_check))
        .route("/api/support", post(create_support_request))
        .route("/api/books", get(list_books))
        .route("/api/books/upload", post(upload_book))
        .route("/api/photos", get(list_own_photos).post(upload_photo))
        .route("/api/photos/feed", get(photo_feed))
        .route("/api/photos/reaction", post(set_reaction))
        .route("/api/photos/feedback", post(add_feedback))
        .route("/api/photos/monthly_winner", post(set_monthly_winner))
        .route("/api/account/password", post(update_password))
        .merge(content::router())
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting community API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "community-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match sqlx::query("SELECT 1").fetch_one(state.store.pool()).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

// ---------- Pages ----------

async fn index() -> Redirect {
    Redirect::to("/login")
}

/// Login form
#[derive(Debug, Deserialize)]
struct LoginForm {
    full_name: Option<String>,
    password: Option<String>,
}

async fn login_page() -> Html<String> {
    Html(render_login_page(None, false))
}

async fn login_submit(
    session: Session,
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    let full_name = form.full_name.as_deref().unwrap_or("").trim();
    let password = form.password.as_deref().unwrap_or("").trim();

    if full_name.is_empty() {
        return Html(render_login_page(Some("Please enter your full name."), false))
            .into_response();
    }

    let student = match state.store.find_student_by_name(full_name).await {
        Ok(student) => student,
        Err(e) => {
            error!(error = %e, "Student lookup failed during login");
            return Html(render_login_page(Some("Login is temporarily unavailable."), false))
                .into_response();
        }
    };

    let Some(student) = student else {
        return Html(render_login_page(
            Some("Student not found. Check your details."),
            false,
        ))
        .into_response();
    };

    match &student.password_hash {
        Some(stored_hash) => {
            if password.is_empty() {
                return Html(render_login_page(
                    Some("A password is required for this account."),
                    true,
                ))
                .into_response();
            }
            if !auth::verify_password(stored_hash, password) {
                return Html(render_login_page(Some("Incorrect password."), true))
                    .into_response();
            }
        }
        // No password set; allow passwordless login
        None => {}
    }

    if let Err(e) = auth::log_in(&session, student.id).await {
        return e.into_response();
    }

    Redirect::to("/dashboard").into_response()
}

async fn logout(session: Session) -> Result<Redirect, ApiError> {
    auth::log_out(&session).await?;
    Ok(Redirect::to("/login"))
}

async fn dashboard(session: Session, State(state): State<AppState>) -> Response {
    match auth::current_student(&session, &state.store).await {
        Ok(Some(student)) => Html(render_dashboard_page(&student.name)).into_response(),
        Ok(None) => Redirect::to("/login").into_response(),
        Err(e) => e.into_response(),
    }
}

fn render_login_page(error: Option<&str>, show_password: bool) -> String {
    let error_html = error
        .map(|e| format!("<p class=\"error\">{e}</p>"))
        .unwrap_or_default();
    let password_field = if show_password {
        "<input type=\"password\" name=\"password\" placeholder=\"Password\">"
    } else {
        ""
    };

    format!(
        "<!DOCTYPE html><html><head><title>Sign in</title></head><body>\
         <h1>Sign in</h1>{error_html}\
         <form method=\"post\" action=\"/login\">\
         <input type=\"text\" name=\"full_name\" placeholder=\"Full name\">\
         {password_field}\
         <button type=\"submit\">Sign in</button></form>\
         </body></html>"
    )
}

fn render_dashboard_page(name: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Dashboard</title></head><body>\
         <h1>Welcome, {name}</h1>\
         <form method=\"post\" action=\"/logout\"><button type=\"submit\">Sign out</button></form>\
         </body></html>"
    )
}

// ---------- Auth API ----------

/// Current student, without the stored hash
async fn get_student(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;

    // `password_hash` is skipped during serialization
    let mut body = serde_json::to_value(&student).map_err(|e| {
        error!(error = %e, "Student serialization failed");
        ApiError::BackendUnavailable
    })?;
    body["has_password"] = serde_json::Value::Bool(student.has_password());

    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
struct AuthCheckQuery {
    full_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthCheckResponse {
    found: bool,
    requires_password: bool,
}

/// Pre-login probe: does this name exist, and does it need a password?
async fn auth_check(
    State(state): State<AppState>,
    Query(params): Query<AuthCheckQuery>,
) -> Json<AuthCheckResponse> {
    let full_name = params.full_name.as_deref().unwrap_or("").trim();
    if full_name.is_empty() {
        return Json(AuthCheckResponse {
            found: false,
            requires_password: false,
        });
    }

    match state.store.find_student_by_name(full_name).await {
        Ok(Some(student)) => Json(AuthCheckResponse {
            found: true,
            requires_password: student.has_password(),
        }),
        Ok(None) => Json(AuthCheckResponse {
            found: false,
            requires_password: false,
        }),
        Err(e) => {
            error!(error = %e, "Auth check lookup failed");
            Json(AuthCheckResponse {
                found: false,
                requires_password: false,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct PasswordPayload {
    password: Option<String>,
}

async fn update_password(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<PasswordPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;

    let password = payload.password.as_deref().unwrap_or("").trim().to_string();
    if password.len() < auth::MIN_PASSWORD_LEN {
        return Err(ApiError::invalid("password must be at least 6 characters"));
    }

    let hash = auth::hash_password(&password).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::BackendUnavailable
    })?;
    state.store.set_password_hash(student.id, &hash).await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

// ---------- Support ----------

#[derive(Debug, Deserialize)]
struct SupportPayload {
    subject: Option<String>,
    message: Option<String>,
}

#[instrument(skip(session, state, payload))]
async fn create_support_request(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<SupportPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;

    let subject = payload.subject.as_deref().unwrap_or("").trim().to_string();
    let message = payload.message.as_deref().unwrap_or("").trim().to_string();
    if subject.is_empty() || message.is_empty() {
        return Err(ApiError::invalid("subject and message are required"));
    }

    state
        .store
        .insert_support_request(student.id, &subject, &message)
        .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

// ---------- Books ----------

async fn list_books(State(state): State<AppState>) -> Json<Vec<Book>> {
    match state.store.list_books().await {
        Ok(books) => Json(books),
        Err(e) => {
            error!(error = %e, "Book list failed");
            Json(Vec::new())
        }
    }
}

#[instrument(skip_all)]
async fn upload_book(
    session: Session,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let student = auth::require_student(&session, &state.store).await?;
    auth::require_elevated(&student)?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::invalid("malformed multipart body"))?
    {
        let name = field.name().map(ToOwned::to_owned);
        match name.as_deref() {
            Some("book") => {
                let content_type = field.content_type().unwrap_or("").to_string();
                if !is_pdf_content_type(&content_type) {
                    return Err(ApiError::invalid("only PDF uploads are accepted"));
                }
                filename = field.file_name().map(ToOwned::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::invalid("failed to read uploaded file"))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("title") => {
                let text = field
                    .text()
                    .await
                    .map_err(|_| ApiError::invalid("failed to read title field"))?;
                let text = text.trim().to_string();
                if !text.is_empty() {
                    title = Some(text);
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::invalid("PDF file is missing"))?;
    if file_bytes.is_empty() {
        return Err(ApiError::invalid("uploaded file is empty"));
    }

    // Title falls back to the uploaded filename
    let title = title
        .or(filename)
        .unwrap_or_else(|| "Book".to_string());

    let key = state.objects.book_key();
    let url = state
        .objects
        .upload_book(&key, file_bytes)
        .await
        .map_err(|e| {
            error!(error = %e, "Book upload failed");
            ApiError::BackendUnavailable
        })?;

    let book = state.store.insert_book(&title, &url).await?;

    Ok((StatusCode::CREATED, Json(book)))
}

// ---------- Photos ----------

async fn list_own_photos(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<Vec<Photo>>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;
    let photos = state.store.list_photos_by_owner(student.id).await?;
    Ok(Json(photos))
}

#[instrument(skip_all)]
async fn upload_photo(
    session: Session,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Photo>), ApiError> {
    let student = auth::require_student(&session, &state.store).await?;

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut content_type = String::new();
    let mut filename = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::invalid("malformed multipart body"))?
    {
        if field.name() == Some("photo") {
            content_type = field.content_type().unwrap_or("").to_string();
            filename = field.file_name().unwrap_or("").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::invalid("failed to read uploaded file"))?;
            file_bytes = Some(bytes.to_vec());
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::invalid("photo file is missing"))?;
    if !content_type.starts_with("image/") {
        return Err(ApiError::invalid("please upload a valid image file"));
    }
    if file_bytes.is_empty() {
        return Err(ApiError::invalid("uploaded file is empty"));
    }

    let key = state.objects.image_key(student.id, file_extension(&filename));
    let image_url = state
        .objects
        .upload_image(&key, file_bytes, &content_type)
        .await
        .map_err(|e| {
            error!(error = %e, "Photo upload failed");
            ApiError::BackendUnavailable
        })?;

    let photo = state.store.insert_photo(student.id, &image_url).await?;

    Ok((StatusCode::CREATED, Json(photo)))
}

async fn photo_feed(
    session: Session,
    State(state): State<AppState>,
) -> Result<Json<Vec<FeedPhoto>>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;
    let feed = state.aggregator.feed_for(student.id).await?;
    Ok(Json(feed))
}

#[derive(Debug, Deserialize)]
struct ReactionPayload {
    photo_id: Option<i64>,
    reaction: Option<String>,
}

async fn set_reaction(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<ReactionPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;

    let photo_id = payload
        .photo_id
        .ok_or_else(|| ApiError::invalid("photo_id is required"))?;
    let kind = payload
        .reaction
        .as_deref()
        .map(str::trim)
        .and_then(ReactionKind::parse)
        .ok_or_else(|| ApiError::invalid("unknown reaction kind"))?;

    state
        .store
        .upsert_reaction(photo_id, student.id, kind)
        .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
struct FeedbackPayload {
    photo_id: Option<i64>,
    feedback: Option<String>,
}

async fn add_feedback(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<FeedbackPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;
    auth::require_elevated(&student)?;

    let photo_id = payload
        .photo_id
        .ok_or_else(|| ApiError::invalid("photo_id is required"))?;
    let feedback = payload.feedback.as_deref().unwrap_or("").trim().to_string();
    if feedback.is_empty() {
        return Err(ApiError::invalid("feedback is required"));
    }

    state
        .store
        .insert_feedback(photo_id, student.id, &feedback)
        .await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
struct MonthlyWinnerPayload {
    photo_id: Option<i64>,
}

async fn set_monthly_winner(
    session: Session,
    State(state): State<AppState>,
    Json(payload): Json<MonthlyWinnerPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = auth::require_student(&session, &state.store).await?;
    auth::require_admin(&student)?;

    let photo_id = payload
        .photo_id
        .ok_or_else(|| ApiError::invalid("photo_id is required"))?;

    state.store.set_monthly_winner(photo_id).await?;

    Ok(Json(serde_json::json!({"ok": true})))
}

fn is_pdf_content_type(content_type: &str) -> bool {
    content_type == "application/pdf"
        || content_type == "application/octet-stream"
        || content_type.ends_with("pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_content_type() {
        assert!(is_pdf_content_type("application/pdf"));
        assert!(is_pdf_content_type("application/octet-stream"));
        assert!(is_pdf_content_type("application/x-pdf"));
        assert!(!is_pdf_content_type("image/png"));
        assert!(!is_pdf_content_type("text/plain"));
    }

    #[test]
    fn test_login_page_renders_error_and_password_field() {
        let page = render_login_page(Some("Incorrect password."), true);
        assert!(page.contains("Incorrect password."));
        assert!(page.contains("name=\"password\""));

        let bare = render_login_page(None, false);
        assert!(!bare.contains("class=\"error\""));
        assert!(!bare.contains("name=\"password\""));
    }

    #[test]
    fn test_dashboard_page_greets_student() {
        let page = render_dashboard_page("Ayşe");
        assert!(page.contains("Welcome, Ayşe"));
    }
}
