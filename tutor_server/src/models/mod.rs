mod file;

use serde::{Deserialize, Serialize};
use tutor_core::UserRole;
use utoipa::ToSchema;

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize, PartialEq)]
pub struct CreateUser {
    pub fullname: String,
    pub email: String,
    pub password: String,
    /// `student` or `teacher`; admins are never created by signup.
    pub role: UserRole,
}

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize, PartialEq)]
pub struct SigninUser {
    pub email: String,
    pub password: String,
}

/// An uploaded file, addressed by the sha1 of its content.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub ext: String,
    pub hash: String,
}
