use crate::error::ApiError;
use crate::store::{RecordStore, Student};
use anyhow::{anyhow, Result};
use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use tower_sessions::Session;
use tracing::debug;

/// Session key holding the authenticated student's numeric id
const STUDENT_ID_KEY: &str = "student_id";

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password into a salted PHC string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hashing failed: {e}"))
}

/// Verify a password against a stored PHC-string hash
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Write the student id into the session
pub async fn log_in(session: &Session, student_id: i64) -> Result<(), ApiError> {
    session.insert(STUDENT_ID_KEY, student_id).await?;
    debug!(student_id = student_id, "Session established");
    Ok(())
}

/// Destroy the session
pub async fn log_out(session: &Session) -> Result<(), ApiError> {
    session.flush().await?;
    Ok(())
}

/// Resolve the current student, re-fetching the row on every request
pub async fn current_student(
    session: &Session,
    store: &RecordStore,
) -> Result<Option<Student>, ApiError> {
    let student_id: Option<i64> = session.get(STUDENT_ID_KEY).await?;
    let Some(student_id) = student_id else {
        return Ok(None);
    };

    Ok(store.get_student(student_id).await?)
}

/// Resolve the current student or fail with `Unauthenticated`
pub async fn require_student(session: &Session, store: &RecordStore) -> Result<Student, ApiError> {
    current_student(session, store)
        .await?
        .ok_or(ApiError::Unauthenticated)
}

/// Require an elevated role (master or admin)
pub fn require_elevated(student: &Student) -> Result<(), ApiError> {
    if student.role().is_elevated() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Require the admin role
pub fn require_admin(student: &Student) -> Result<(), ApiError> {
    if student.role() == crate::store::Role::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use chrono::Utc;

    fn student_with_role(role: &str) -> Student {
        Student {
            id: 7,
            name: "Test Student".to_string(),
            password_hash: None,
            role: role.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("s3cretpw").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "s3cretpw"));
        assert!(!verify_password(&hash, "wrong-password"));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn test_role_guards() {
        let member = student_with_role("member");
        let master = student_with_role("master");
        let admin = student_with_role("admin");

        assert!(require_elevated(&member).is_err());
        assert!(require_elevated(&master).is_ok());
        assert!(require_elevated(&admin).is_ok());

        // Monthly winner selection is admin-only; master is still forbidden
        assert!(require_admin(&master).is_err());
        assert!(require_admin(&admin).is_ok());
        assert_eq!(admin.role(), Role::Admin);
    }
}
