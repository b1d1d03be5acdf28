//! Cross-site request forgery tokens.
//!
//! A token is `base64(issued_at + origin + nonce)`: the ten-digit Unix time it
//! was issued, the SHA-256 hex of the client's IP address and user agent when
//! origin checking is on, and random characters drawn from the configured seed.
//! The token lives in the session data store and is echoed back by forms.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::{Rng, thread_rng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::{
    application::session::SessionState,
    domain::settings::{DEFAULT_CSRF_SEED, ForumSettings},
};

pub const CSRF_SESSION_KEY: &str = "CSRFToken";
pub const CSRF_FIELD: &str = "csrf_token";

const ISSUED_AT_LEN: usize = 10;
const NONCE_LEN: usize = 32;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityError {
    #[error("security token is missing")]
    MissingToken,
    #[error("security token was issued to a different client")]
    OriginMismatch,
    #[error("security token does not match")]
    TokenMismatch,
    #[error("security token has expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfPolicy {
    pub enabled: bool,
    pub one_time: bool,
    pub origin_check: bool,
    /// Zero disables expiry.
    pub expiration_secs: i64,
    pub seed: String,
}

impl From<&ForumSettings> for CsrfPolicy {
    fn from(settings: &ForumSettings) -> Self {
        Self {
            enabled: settings.csrf_enabled,
            one_time: settings.csrf_one_time_tokens,
            origin_check: settings.csrf_origin_check,
            expiration_secs: settings.csrf_expiration_seconds,
            seed: settings.csrf_seed.clone(),
        }
    }
}

/// IP address and user agent the token is bound to.
#[derive(Debug, Clone, Copy)]
pub struct ClientOrigin<'a> {
    pub ip: &'a str,
    pub user_agent: &'a str,
}

impl ClientOrigin<'_> {
    fn digest(&self) -> String {
        sha256_hex(&format!("{}{}", self.ip, self.user_agent))
    }
}

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Random characters drawn from `seed`.
pub(crate) fn random_from_seed(seed: &str, len: usize) -> String {
    let alphabet: Vec<char> = if seed.is_empty() {
        DEFAULT_CSRF_SEED.chars().collect()
    } else {
        seed.chars().collect()
    };
    let mut rng = thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

pub fn generate_token(policy: &CsrfPolicy, origin: ClientOrigin<'_>, now: i64) -> String {
    let origin = if policy.origin_check {
        origin.digest()
    } else {
        String::new()
    };
    let raw = format!(
        "{:0>width$}{origin}{}",
        now.max(0),
        random_from_seed(&policy.seed, NONCE_LEN),
        width = ISSUED_AT_LEN
    );
    STANDARD.encode(raw)
}

/// The token to embed in a form. One-time tokens are reissued on every call.
pub fn csrf_token(
    policy: &CsrfPolicy,
    session: &mut SessionState,
    origin: ClientOrigin<'_>,
    now: i64,
) -> String {
    if !policy.one_time
        && let Some(existing) = session.get_str(CSRF_SESSION_KEY)
    {
        return existing.to_string();
    }

    let token = generate_token(policy, origin, now);
    session.set_data(CSRF_SESSION_KEY, token.clone());
    token
}

/// Check a submitted token against the session's.
///
/// One-time tokens are consumed even when validation fails.
pub fn validate_csrf(
    policy: &CsrfPolicy,
    session: &mut SessionState,
    submitted: Option<&str>,
    origin: ClientOrigin<'_>,
    now: i64,
) -> Result<(), SecurityError> {
    if !policy.enabled {
        return Ok(());
    }

    let stored = session
        .get_str(CSRF_SESSION_KEY)
        .map(str::to_string)
        .ok_or(SecurityError::MissingToken)?;
    let submitted = submitted
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(SecurityError::MissingToken)?;

    if policy.one_time {
        session.remove_data(CSRF_SESSION_KEY);
    }

    let decoded = STANDARD
        .decode(&stored)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(SecurityError::TokenMismatch)?;

    if policy.origin_check {
        let expected = origin.digest();
        let embedded = decoded.get(ISSUED_AT_LEN..ISSUED_AT_LEN + expected.len());
        if embedded != Some(expected.as_str()) {
            return Err(SecurityError::OriginMismatch);
        }
    }

    if stored.as_bytes().ct_eq(submitted.as_bytes()).unwrap_u8() == 0 {
        return Err(SecurityError::TokenMismatch);
    }

    if policy.expiration_secs > 0 {
        let issued_at: i64 = decoded
            .get(..ISSUED_AT_LEN)
            .and_then(|digits| digits.parse().ok())
            .ok_or(SecurityError::TokenMismatch)?;
        if now - issued_at > policy.expiration_secs {
            return Err(SecurityError::Expired);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::domain::sessions::SessionRecord;

    const NOW: i64 = 1_700_000_000;

    fn session() -> SessionState {
        let record: SessionRecord = serde_json::from_value(json!({"id": "s"})).expect("record");
        SessionState::new(record, Map::new(), true)
    }

    fn policy() -> CsrfPolicy {
        CsrfPolicy::from(&ForumSettings::default())
    }

    fn origin() -> ClientOrigin<'static> {
        ClientOrigin {
            ip: "10.0.0.1",
            user_agent: "Firefox",
        }
    }

    #[test]
    fn token_layout_is_time_origin_nonce() {
        let mut policy = policy();
        policy.origin_check = true;
        let token = generate_token(&policy, origin(), NOW);
        let decoded = String::from_utf8(STANDARD.decode(token).expect("base64")).expect("utf8");

        assert_eq!(&decoded[..10], "1700000000");
        assert_eq!(decoded.len(), 10 + 64 + 32);
        assert_eq!(&decoded[10..74], origin().digest());
    }

    #[test]
    fn reusable_tokens_are_stable_and_validate() {
        let policy = policy();
        let mut session = session();
        let first = csrf_token(&policy, &mut session, origin(), NOW);
        let second = csrf_token(&policy, &mut session, origin(), NOW);
        assert_eq!(first, second);

        validate_csrf(&policy, &mut session, Some(&first), origin(), NOW).expect("valid");
        validate_csrf(&policy, &mut session, Some(&first), origin(), NOW).expect("still valid");
    }

    #[test]
    fn one_time_tokens_rotate_and_are_consumed() {
        let mut policy = policy();
        policy.one_time = true;
        let mut session = session();

        let first = csrf_token(&policy, &mut session, origin(), NOW);
        let second = csrf_token(&policy, &mut session, origin(), NOW);
        assert_ne!(first, second);

        validate_csrf(&policy, &mut session, Some(&second), origin(), NOW).expect("valid");
        assert_eq!(
            validate_csrf(&policy, &mut session, Some(&second), origin(), NOW),
            Err(SecurityError::MissingToken)
        );
    }

    #[test]
    fn failures_are_classified() {
        let mut policy = policy();
        let mut session = session();
        assert_eq!(
            validate_csrf(&policy, &mut session, Some("x"), origin(), NOW),
            Err(SecurityError::MissingToken)
        );

        let token = csrf_token(&policy, &mut session, origin(), NOW);
        assert_eq!(
            validate_csrf(&policy, &mut session, None, origin(), NOW),
            Err(SecurityError::MissingToken)
        );
        assert_eq!(
            validate_csrf(&policy, &mut session, Some("forged"), origin(), NOW),
            Err(SecurityError::TokenMismatch)
        );

        policy.expiration_secs = 60;
        assert_eq!(
            validate_csrf(&policy, &mut session, Some(&token), origin(), NOW + 61),
            Err(SecurityError::Expired)
        );
    }

    #[test]
    fn origin_check_rejects_other_clients() {
        let mut policy = policy();
        policy.origin_check = true;
        let mut session = session();
        let token = csrf_token(&policy, &mut session, origin(), NOW);

        let elsewhere = ClientOrigin {
            ip: "10.0.0.2",
            user_agent: "Firefox",
        };
        assert_eq!(
            validate_csrf(&policy, &mut session, Some(&token), elsewhere, NOW),
            Err(SecurityError::OriginMismatch)
        );
    }

    #[test]
    fn disabled_policy_accepts_anything() {
        let mut policy = policy();
        policy.enabled = false;
        validate_csrf(&policy, &mut session(), None, origin(), NOW).expect("disabled");
    }
}
