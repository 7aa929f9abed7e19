use crate::db::PollsStorage;
use crate::db::models::DbUser;
use crate::db::sqlite::NewUser;
use crate::error::PollsError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::Utc;
use rand::RngCore;
use tracing::{debug, info};

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 8;
const USERNAME_TAKEN: &str = "A user with that username already exists.";

/// Hash with argon2id and a fresh random salt; returns a PHC string.
pub fn hash_password(password: &str) -> Result<String, PollsError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;

    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// False for a wrong password and for hashes that cannot be parsed.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        debug!("stored password hash is not a valid PHC string");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn is_password_hash(value: &str) -> bool {
    value.starts_with("$argon2")
}

/// Letters, digits and `@ . + - _`, at most 150 characters.
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("A username is required.".to_string());
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(format!(
            "Ensure the username has at most {USERNAME_MAX_LEN} characters."
        ));
    }
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !valid {
        return Err(
            "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters."
                .to_string(),
        );
    }
    Ok(())
}

pub fn validate_password(password: &str, username: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LEN {
        errors.push(format!(
            "This password is too short. It must contain at least {PASSWORD_MIN_LEN} characters."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.push("This password is entirely numeric.".to_string());
    }
    if !username.is_empty() && password.eq_ignore_ascii_case(username) {
        errors.push("The password is too similar to the username.".to_string());
    }
    errors
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

#[derive(Debug)]
pub enum RegisterError {
    /// User-facing field errors; the form should be shown again.
    Invalid(Vec<String>),
    Internal(PollsError),
}

impl From<PollsError> for RegisterError {
    fn from(e: PollsError) -> Self {
        RegisterError::Internal(e)
    }
}

/// Validate a signup form and create a regular (non-staff) account.
pub async fn register(storage: &PollsStorage, form: &Registration) -> Result<i64, RegisterError> {
    let username = form.username.trim();
    let mut errors = Vec::new();

    if let Err(e) = validate_username(username) {
        errors.push(e);
    } else if storage.username_taken(username).await? {
        errors.push(USERNAME_TAKEN.to_string());
    }
    if form.password1 != form.password2 {
        errors.push("The two password fields didn't match.".to_string());
    }
    errors.extend(validate_password(&form.password1, username));

    if !errors.is_empty() {
        return Err(RegisterError::Invalid(errors));
    }

    let created = storage
        .create_user(&NewUser {
            username: username.to_string(),
            email: String::new(),
            password_hash: hash_password(&form.password1)?,
            is_staff: false,
            is_superuser: false,
        })
        .await;
    match created {
        Ok(id) => Ok(id),
        // Lost a race with a concurrent signup for the same name.
        Err(e) if e.is_unique_violation() => Err(RegisterError::Invalid(vec![
            USERNAME_TAKEN.to_string(),
        ])),
        Err(e) => Err(e.into()),
    }
}

/// Create a staff superuser for the `createsuperuser` command.
pub async fn create_superuser(
    storage: &PollsStorage,
    username: &str,
    email: &str,
    password: &str,
) -> Result<i64, PollsError> {
    let username = username.trim();
    validate_username(username).map_err(PollsError::Validation)?;
    if storage.username_taken(username).await? {
        return Err(PollsError::Validation(USERNAME_TAKEN.to_string()));
    }
    if let Some(problem) = validate_password(password, username).into_iter().next() {
        return Err(PollsError::Validation(problem));
    }

    let id = storage
        .create_user(&NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            is_staff: true,
            is_superuser: true,
        })
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                PollsError::Validation(USERNAME_TAKEN.to_string())
            } else {
                e
            }
        })?;
    info!(id, username = %username, "superuser created");
    Ok(id)
}

/// Check credentials of an active user and stamp `last_login`.
pub async fn authenticate(
    storage: &PollsStorage,
    username: &str,
    password: &str,
) -> Result<Option<DbUser>, PollsError> {
    let Some(user) = storage.get_user_by_username(username).await? else {
        return Ok(None);
    };
    if !user.is_active || !verify_password(password, &user.password) {
        return Ok(None);
    }
    storage.touch_last_login(user.id, Utc::now()).await?;
    Ok(Some(user))
}
