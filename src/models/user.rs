use serde::Serialize;
use uuid::Uuid;

use super::session::AuthUser;

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

impl UserAccount {
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            user_id: self.user_id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
        }
    }
}
