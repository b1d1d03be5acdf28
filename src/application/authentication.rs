//! Credential checks, account lockout and the sign-in and sign-out flows.

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use serde::Serialize;
use time::Duration;
use tracing::{info, warn};

use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
        localization::Localization,
        security::{random_from_seed, sha256_hex},
        session::{DEVICE_COOKIE, MEMBER_TOKEN_COOKIE, MEMBER_TOKEN_KEY},
    },
    domain::{
        members::{LockoutState, Member, MemberDevice},
        settings::ForumSettings,
    },
    infra::db::SqlValue,
};

const TOKEN_LEN: usize = 32;
const DEVICE_COOKIE_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub enabled: bool,
    pub max_attempts: u32,
    pub allow_expire: bool,
    pub expiration_secs: i64,
}

impl From<&ForumSettings> for LockoutPolicy {
    fn from(settings: &ForumSettings) -> Self {
        Self {
            enabled: settings.account_lockout_enabled,
            max_attempts: settings.account_lockout_max_failed_attempts,
            allow_expire: settings.account_lockout_allow_expire,
            expiration_secs: settings.account_lockout_expiration_minutes * 60,
        }
    }
}

impl LockoutPolicy {
    /// State after a wrong password.
    pub fn record_failure(&self, state: LockoutState, now: i64) -> LockoutState {
        let attempts = state.attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            LockoutState {
                locked: true,
                attempts,
                expires: self.allow_expire.then_some(now + self.expiration_secs),
            }
        } else {
            LockoutState { attempts, ..state }
        }
    }

    /// Whether a correct password lifts an existing lock.
    pub fn can_release(&self, state: LockoutState, now: i64) -> bool {
        state.locked
            && (state.attempts < self.max_attempts
                || (self.allow_expire && state.expires.is_none_or(|expires| expires <= now)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureReason {
    SignInFailed,
    LockedOut,
}

/// Outcome of a credential check, shaped for the JSON preauthorize endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCheck {
    pub status: bool,
    pub reason: Option<FailureReason>,
    pub message: Option<String>,
    pub attempts: u32,
    pub expires: Option<i64>,
    pub member_id: Option<i64>,
}

impl CredentialCheck {
    fn accepted(member_id: i64) -> Self {
        Self {
            status: true,
            reason: None,
            message: None,
            attempts: 0,
            expires: None,
            member_id: Some(member_id),
        }
    }

    fn rejected(reason: FailureReason, message: String, member_id: Option<i64>) -> Self {
        Self {
            status: false,
            reason: Some(reason),
            message: Some(message),
            attempts: 0,
            expires: None,
            member_id,
        }
    }

    fn locked_out(localization: &Localization, state: LockoutState, member_id: i64, now: i64) -> Self {
        Self {
            attempts: state.attempts,
            expires: state.expires,
            ..Self::rejected(
                FailureReason::LockedOut,
                locked_message(localization, state, now),
                Some(member_id),
            )
        }
    }
}

fn locked_message(localization: &Localization, state: LockoutState, now: i64) -> String {
    match state.expires {
        None => localization.get("errors", "lockedOutExpiredDisabled"),
        Some(expires) => {
            let minutes = ((expires - now).max(0) + 59) / 60;
            localization.replace("errors", "lockedOutExpiredEnabled", "total", minutes.max(1))
        }
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::unexpected(format!("password hashing failed: {err}")))
}

/// Check `password` against a PHC string; an unparsable hash never matches.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            warn!(
                target = "bulletin_fusion::application::authentication",
                error = %err,
                "Stored password hash is not a valid PHC string"
            );
            false
        }
    }
}

/// Opaque member token stored in the `MemberToken` cookie and on the device row.
pub fn generate_auth_token(member: &Member, now: i64) -> String {
    let mut token = sha256_hex(&format!(
        "{}{}{now}{}",
        member.id,
        member.email,
        random_from_seed("", TOKEN_LEN)
    ));
    token.truncate(TOKEN_LEN);
    token
}

pub fn device_id(token: &str, user_agent: &str) -> String {
    let mut id = sha256_hex(&format!("{token}{user_agent}"));
    id.truncate(TOKEN_LEN);
    id
}

/// Check an email and password pair, applying the lockout policy.
///
/// Failed attempts are persisted on the member row so the remaining count
/// shown to the visitor is accurate across requests.
pub async fn validate_credentials(
    ctx: &mut RequestContext,
    email: &str,
    password: &str,
) -> Result<CredentialCheck, AppError> {
    let members: Vec<Member> = ctx.data()?.cache.decode("members")?;
    let email = email.trim();
    let Some(member) = members
        .into_iter()
        .find(|member| !email.is_empty() && member.email.eq_ignore_ascii_case(email))
    else {
        return Ok(CredentialCheck::rejected(
            FailureReason::SignInFailed,
            ctx.localization.get("errors", "userCredentialsInvalid"),
            None,
        ));
    };

    let policy = LockoutPolicy::from(&ctx.settings);
    let state = member.lockout_state();
    let now = unix_now();

    if !verify_password(&member.password_hash, password) {
        if !policy.enabled {
            return Ok(CredentialCheck::rejected(
                FailureReason::SignInFailed,
                ctx.localization.get("errors", "userCredentialsInvalid"),
                Some(member.id),
            ));
        }

        let next = policy.record_failure(state, now);
        store_lockout(ctx, member.id, Some(next)).await?;
        if next.locked {
            info!(
                target = "bulletin_fusion::application::authentication",
                request_id = %ctx.request_id,
                member_id = member.id,
                attempts = next.attempts,
                "Account locked after repeated failed sign-ins"
            );
            return Ok(CredentialCheck::locked_out(&ctx.localization, next, member.id, now));
        }

        let remaining = policy.max_attempts.saturating_sub(next.attempts);
        return Ok(CredentialCheck {
            attempts: next.attempts,
            ..CredentialCheck::rejected(
                FailureReason::SignInFailed,
                ctx.localization.replace_all(
                    "errors",
                    "signInFailedWithAttemptsRemaining",
                    &[("attempts", remaining), ("total", policy.max_attempts)],
                ),
                Some(member.id),
            )
        });
    }

    if policy.enabled && state.locked {
        if !policy.can_release(state, now) {
            return Ok(CredentialCheck {
                attempts: 0,
                ..CredentialCheck::locked_out(&ctx.localization, state, member.id, now)
            });
        }
        store_lockout(ctx, member.id, Some(LockoutState::cleared())).await?;
    }

    Ok(CredentialCheck::accepted(member.id))
}

async fn store_lockout(
    ctx: &mut RequestContext,
    member_id: i64,
    state: Option<LockoutState>,
) -> Result<(), AppError> {
    let encoded = state
        .map(|state| serde_json::to_string(&state))
        .transpose()
        .map_err(|err| AppError::unexpected(format!("failed to encode lockout state: {err}")))?;
    let data = ctx.data_mut()?;
    data.builder
        .reset()
        .update("members")
        .set([("lockout", SqlValue::from(encoded))])
        .filter("id = ?", [member_id]);
    data.commit(&["members"]).await?;
    Ok(())
}

/// Register the device, issue the member token and bind the session.
pub async fn complete_sign_in(
    ctx: &mut RequestContext,
    member: &Member,
    remember_me: bool,
) -> Result<(), AppError> {
    let now = unix_now();
    let token = generate_auth_token(member, now);
    let user_agent = ctx.user_agent().to_string();

    let devices: Vec<MemberDevice> = ctx.data()?.cache.decode("member_devices")?;
    let known_device = ctx.cookie(DEVICE_COOKIE).filter(|id| {
        devices
            .iter()
            .any(|device| device.member_id == member.id && &device.id == id)
    });

    let data = ctx.data_mut()?;
    let new_device = match known_device.as_deref() {
        Some(id) => {
            data.builder
                .reset()
                .update("member_devices")
                .set([
                    ("token", SqlValue::from(token.as_str())),
                    ("user_agent", user_agent.as_str().into()),
                    ("last_used", now.into()),
                ])
                .filter("id = ?", [id]);
            None
        }
        None => {
            let id = device_id(&token, &user_agent);
            data.builder
                .reset()
                .insert(
                    "member_devices",
                    &["id", "member_id", "token", "user_agent", "last_used"],
                )
                .values([
                    SqlValue::from(id.as_str()),
                    member.id.into(),
                    token.as_str().into(),
                    user_agent.as_str().into(),
                    now.into(),
                ]);
            Some(id)
        }
    };
    data.commit(&["member_devices"]).await?;

    if let Some(id) = new_device {
        ctx.set_cookie(DEVICE_COOKIE, id, Some(Duration::days(DEVICE_COOKIE_DAYS)));
    }
    let lifetime = if remember_me {
        Duration::days(ctx.settings.remember_me_cookie_expiration_days)
    } else {
        Duration::minutes(ctx.settings.session_duration_minutes)
    };
    ctx.set_cookie(MEMBER_TOKEN_COOKIE, token.clone(), Some(lifetime));

    let state = member.lockout_state();
    if state.attempts != 0 && !state.locked {
        store_lockout(ctx, member.id, None).await?;
    }

    let session = ctx.session_mut()?;
    session.set_data(MEMBER_TOKEN_KEY, token);
    session.record.member_id = member.id;
    session.record.display_on_whos_online = member.display_on_whos_online;
    let session_id = session.id().to_string();

    let data = ctx.data_mut()?;
    data.builder
        .reset()
        .update("sessions")
        .set([
            ("member_id", SqlValue::from(member.id)),
            (
                "display_on_whos_online",
                i64::from(member.display_on_whos_online).into(),
            ),
        ])
        .filter("id = ?", [session_id.as_str()]);
    data.commit(&["sessions", "member_devices"]).await?;

    ctx.member = member.clone();
    info!(
        target = "bulletin_fusion::application::authentication",
        request_id = %ctx.request_id,
        member_id = member.id,
        remember_me,
        "Member signed in"
    );
    Ok(())
}

/// Revoke the device token, record the last-online time and drop the
/// member's session row.
pub async fn sign_out(ctx: &mut RequestContext) -> Result<(), AppError> {
    if ctx.member.is_guest() {
        return Ok(());
    }
    let now = unix_now();
    let member_id = ctx.member.id;
    let token = ctx.cookie(MEMBER_TOKEN_COOKIE);
    let session_id = ctx.session()?.id().to_string();

    let data = ctx.data_mut()?;
    if let Some(token) = token.as_deref() {
        data.builder
            .reset()
            .update("member_devices")
            .set([("token", SqlValue::from("")), ("last_used", now.into())])
            .filter("token = ?", [token]);
        data.commit(&["member_devices"]).await?;
    }
    data.builder
        .reset()
        .update("members")
        .set([("last_online", now)])
        .filter("id = ?", [member_id]);
    data.commit(&["members"]).await?;
    data.builder
        .reset()
        .delete("sessions")
        .filter("id = ?", [session_id.as_str()]);
    data.commit(&["sessions"]).await?;

    ctx.session_mut()?.remove_data(MEMBER_TOKEN_KEY);
    ctx.remove_cookie(MEMBER_TOKEN_COOKIE);
    ctx.member = Member::guest();
    info!(
        target = "bulletin_fusion::application::authentication",
        request_id = %ctx.request_id,
        member_id,
        "Member signed out"
    );
    Ok(())
}
