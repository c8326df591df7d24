//! Access links: the time-bounded token that lets a client open its
//! conference remotely.
//!
//! Expiry and regeneration are the only ways a link stops working.

use crate::errors::{CoreError, CoreResult};
use crate::model::Conference;
use crate::notify::alert::Condition;
use crate::notify::ledger::DedupLedger;
use crate::storage::Store;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

/// Token entropy in bytes (256 bits).
pub const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkGrant {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Hex token drawn from the thread-local CSPRNG, which is seeded from the OS.
pub fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn generate(ttl_days: u32, now: DateTime<Utc>) -> CoreResult<LinkGrant> {
    if ttl_days == 0 {
        return Err(CoreError::Config(
            "link ttl must be at least one day".into(),
        ));
    }
    Ok(LinkGrant {
        token: new_token(),
        expires_at: now + Duration::days(i64::from(ttl_days)),
    })
}

pub fn is_expired(conf: &Conference, now: DateTime<Utc>) -> bool {
    conf.link_expires_at <= now
}

/// Replaces the token and expiry of a conference. The previous token stops
/// resolving as soon as this returns, and the link alerts of the conference
/// are re-armed.
pub fn regenerate(
    store: &Store,
    ledger: &dyn DedupLedger,
    conference_id: &str,
    ttl_days: u32,
    now: DateTime<Utc>,
) -> CoreResult<LinkGrant> {
    let grant = generate(ttl_days, now)?;
    store.update_conference(conference_id, |c| {
        c.link_token = grant.token.clone();
        c.link_expires_at = grant.expires_at;
        c.updated_at = now;
        Ok(())
    })?;
    let cleared = ledger.clear(conference_id, Condition::LINK)?;
    tracing::info!(
        event = "migconf.link.regenerated",
        conference_id = %conference_id,
        expires_at = %grant.expires_at.to_rfc3339(),
        cleared_keys = cleared,
    );
    Ok(grant)
}

/// Looks a token up. Unknown and expired tokens are told apart here for
/// logging; callers facing clients use [`resolve_public`].
pub fn resolve(store: &Store, token: &str, now: DateTime<Utc>) -> CoreResult<Conference> {
    let token = token.trim();
    if token.is_empty() {
        return Err(CoreError::LinkNotFound);
    }
    let conf = store
        .find_conference_by_token(token)?
        .ok_or(CoreError::LinkNotFound)?;
    if is_expired(&conf, now) {
        return Err(CoreError::LinkExpired);
    }
    Ok(conf)
}

pub fn resolve_public(store: &Store, token: &str, now: DateTime<Utc>) -> CoreResult<Conference> {
    resolve(store, token, now).map_err(|e| {
        if matches!(e, CoreError::LinkNotFound | CoreError::LinkExpired) {
            tracing::info!(event = "migconf.link.rejected", reason = %e);
        }
        e.into_public()
    })
}

pub fn public_url(base_url: &str, token: &str) -> String {
    format!("{}/c/{}", base_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_long_and_distinct() {
        let tokens: HashSet<String> = (0..64).map(|_| new_token()).collect();
        assert_eq!(tokens.len(), 64);
        assert!(tokens.iter().all(|t| t.len() == TOKEN_BYTES * 2));
    }

    #[test]
    fn expiry_is_in_the_future() {
        let now = Utc::now();
        let g = generate(7, now).unwrap();
        assert_eq!(g.expires_at, now + Duration::days(7));
        assert!(g.expires_at > now);
        assert!(generate(0, now).is_err());
    }

    #[test]
    fn public_url_trims_slash() {
        assert_eq!(public_url("https://x.test/", "abc"), "https://x.test/c/abc");
    }
}
