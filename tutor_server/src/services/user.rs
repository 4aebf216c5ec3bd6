use crate::{
    error::AppError,
    models::{CreateUser, SigninUser},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use sqlx::PgPool;
use tracing::info;
use tutor_core::{PublicUser, User, UserRole};

#[derive(Clone)]
pub(crate) struct UserService {
    pool: PgPool,
}

impl UserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as(
            "SELECT id, fullname, email, role, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as(
            "SELECT id, fullname, email, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn create(&self, input: &CreateUser) -> Result<User, AppError> {
        if input.role.is_admin() {
            return Err(AppError::InvalidInput(
                "role must be student or teacher".to_string(),
            ));
        }
        if input.email.is_empty() || input.password.is_empty() {
            return Err(AppError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }
        if self.find_by_email(&input.email).await?.is_some() {
            return Err(AppError::EmailAlreadyExists(input.email.to_string()));
        }
        let password_hash = hash_password(&input.password)?;
        let user: User = sqlx::query_as(
            r#"
        INSERT INTO users (email, fullname, role, password_hash)
        VALUES ($1, $2, $3, $4)
        RETURNING id, fullname, email, role, created_at
        "#,
        )
        .bind(&input.email)
        .bind(&input.fullname)
        .bind(input.role)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        info!("user {} signed up as {:?}", user.id, user.role);
        Ok(user)
    }

    /// The account matching both email and password, if any. Accounts
    /// provisioned without a password can never sign in.
    pub async fn verify(&self, input: &SigninUser) -> Result<Option<User>, AppError> {
        let Some(mut user) = self.find_by_email(&input.email).await? else {
            return Ok(None);
        };
        let Some(password_hash) = user.password_hash.take() else {
            return Ok(None);
        };
        Ok(verify_password(&input.password, &password_hash)?.then_some(user))
    }

    pub async fn fetch_public_by_id(&self, id: i64) -> Result<Option<PublicUser>, AppError> {
        let user = sqlx::query_as("SELECT id, fullname, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    pub async fn fetch_all(&self) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as(
            r#"
        SELECT id, fullname, email, role, created_at
        FROM users
        ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    pub async fn is_admin(&self, id: i64) -> Result<bool, AppError> {
        let role: Option<UserRole> = sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role.is_some_and(UserRole::is_admin))
    }
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(password_hash)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
impl CreateUser {
    pub fn new(fullname: &str, email: &str, password: &str, role: UserRole) -> Self {
        Self {
            fullname: fullname.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
        }
    }
}

#[cfg(test)]
impl SigninUser {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}
