//! Password hashing and credential verification

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::RngCore;

use super::directory::{DirectoryError, SharedDirectory, User};

/// Plaintext used to build the dummy hash for unknown accounts
const DUMMY_PASSWORD: &str = "tollgate-dummy-password";

/// Hash a password into a PHC string (Argon2id, random salt)
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)?;

    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Compare a password with a stored PHC string.
///
/// A malformed stored hash verifies as false.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}

/// Checks an email/password pair against the user directory
#[derive(Clone)]
pub struct CredentialVerifier {
    directory: SharedDirectory,
    dummy_hash: Option<String>,
}

impl CredentialVerifier {
    pub fn new(directory: SharedDirectory) -> Self {
        let dummy_hash = match hash_password(DUMMY_PASSWORD) {
            Ok(hash) => Some(hash),
            Err(e) => {
                tracing::warn!(error = %e, "Could not build dummy password hash");
                None
            }
        };
        Self {
            directory,
            dummy_hash,
        }
    }

    pub fn directory(&self) -> &SharedDirectory {
        &self.directory
    }

    /// Returns the user when the password matches an active account.
    ///
    /// Unknown and inactive accounts still pay for one hash comparison.
    pub async fn verify(&self, email: &str, password: &str) -> Result<Option<User>, DirectoryError> {
        let user = self.directory.find_by_email(email).await?;

        let (stored_hash, candidate) = match user {
            Some(user) if user.is_active => (user.password_hash.clone(), Some(user)),
            Some(user) => {
                tracing::warn!(user_id = %user.id, "Login attempt for inactive account");
                (self.dummy_hash.clone().unwrap_or_default(), None)
            }
            None => {
                tracing::warn!(reason = "unknown_email", "Login attempt for unknown account");
                (self.dummy_hash.clone().unwrap_or_default(), None)
            }
        };

        let password = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .unwrap_or(false);

        match candidate {
            Some(user) if matches => Ok(Some(user)),
            Some(user) => {
                tracing::warn!(user_id = %user.id, reason = "wrong_password", "Password mismatch");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
