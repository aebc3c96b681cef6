//! Authentication: credential checks, token issuance, session cache and
//! refresh rotation

pub mod directory;
#[cfg(test)]
mod edge_case_tests;
mod error;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod refresh;
pub mod service;
pub mod sessions;
pub mod tokens;

pub use directory::{
    DirectoryError, InMemoryUserDirectory, PgUserDirectory, SharedDirectory, User, UserDirectory,
};
pub use error::AuthError;
pub use jwt::{Claims, JwtManager, TokenError};
pub use middleware::{
    clear_refresh_cookie, extract_bearer_token, extract_cookie, rate_limit_login, refresh_cookie,
    require_auth, AuthUser, ClientInfo, REFRESH_COOKIE_NAME,
};
pub use password::{hash_password, verify_password, CredentialVerifier};
pub use refresh::{IssuedSession, RefreshCoordinator, SessionTtls};
pub use service::AuthService;
pub use sessions::{AccessTokenRecord, RefreshTokenRecord, SessionCache, SessionIndex};
pub use tokens::{generate_refresh_token, IssuedTokens, TokenIssuer};
