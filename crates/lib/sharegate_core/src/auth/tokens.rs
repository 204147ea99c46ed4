//! Share-token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying identity, an optional share scope, a
//! permission set and a unique `jti`. Revocation is an in-memory set keyed
//! by `jti`; it does not survive a restart.

use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, warn};

use super::TokenError;
use crate::models::auth::TokenClaims;
use crate::uuid::new_jti;

/// Default token lifetime: 2 hours.
pub const DEFAULT_TTL_SECS: i64 = 2 * 60 * 60;

/// Default `iss` claim.
pub const DEFAULT_ISSUER: &str = "sharegate";

/// Default `aud` claim.
pub const DEFAULT_AUDIENCE: &str = "sharegate-share";

/// Signing and claim settings for [`TokenService`].
#[derive(Clone, Debug)]
pub struct TokenSettings {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_secs: i64,
}

impl TokenSettings {
    /// Settings with the default issuer, audience and TTL.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Identity recovered from a valid token.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedToken {
    pub subject_id: String,
    pub subject_name: String,
    pub scope_id: Option<String>,
    pub permissions: Vec<String>,
    pub jti: String,
    pub expires_at: i64,
}

impl ValidatedToken {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

impl From<TokenClaims> for ValidatedToken {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject_id: claims.sub,
            subject_name: claims.name,
            scope_id: claims.scope,
            permissions: claims.perms,
            jti: claims.jti,
            expires_at: claims.exp,
        }
    }
}

/// Cheap structural check: three non-empty dot-separated segments.
pub fn looks_like_jwt(token: &str) -> bool {
    let mut segments = 0;
    for part in token.split('.') {
        if part.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

/// Issues, validates, revokes and refreshes share tokens.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl_secs: i64,
    /// Revoked `jti` → the token's `exp`, kept so the sweep can drop entries
    /// once the token can no longer be validated or refreshed.
    revoked: DashMap<String, i64>,
}

impl TokenService {
    pub fn new(settings: &TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Expiry is checked by hand so it can be ordered after the signature
        // check and evaluated against an explicit clock.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            ttl_secs: settings.ttl_secs,
            revoked: DashMap::new(),
        }
    }

    /// Token lifetime in seconds.
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token with a fresh `jti`.
    pub fn issue(
        &self,
        subject_id: &str,
        subject_name: &str,
        scope_id: Option<&str>,
        permissions: &[String],
    ) -> Result<String, TokenError> {
        self.issue_at(
            subject_id,
            subject_name,
            scope_id,
            permissions,
            Utc::now().timestamp(),
        )
    }

    /// Issue a token as of `now` (unix seconds).
    pub fn issue_at(
        &self,
        subject_id: &str,
        subject_name: &str,
        scope_id: Option<&str>,
        permissions: &[String],
        now: i64,
    ) -> Result<String, TokenError> {
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            name: subject_name.to_string(),
            scope: scope_id.map(str::to_string),
            perms: permissions.to_vec(),
            iat: now,
            exp: now + self.ttl_secs,
            jti: new_jti(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Validate a token against the current time.
    pub fn validate(
        &self,
        token: &str,
        expected_scope: Option<&str>,
    ) -> Result<ValidatedToken, TokenError> {
        self.validate_at(token, expected_scope, Utc::now().timestamp())
    }

    /// Validate a token as of `now` (unix seconds).
    ///
    /// Checks run in a fixed order: shape, signature/issuer/audience,
    /// expiry, revocation, scope.
    pub fn validate_at(
        &self,
        token: &str,
        expected_scope: Option<&str>,
        now: i64,
    ) -> Result<ValidatedToken, TokenError> {
        let claims = self.decode_claims(token)?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if self.revoked.contains_key(&claims.jti) {
            return Err(TokenError::Revoked);
        }
        if let (Some(expected), Some(scope)) = (expected_scope, claims.scope.as_deref())
            && expected != scope
        {
            return Err(TokenError::ScopeMismatch);
        }

        Ok(claims.into())
    }

    /// Revoke a signed token. The signature, issuer and audience must
    /// verify; expiry is not checked. Revoking twice is the same as once.
    pub fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.decode_claims(token)?;
        self.revoke_jti(&claims.jti, claims.exp);
        Ok(())
    }

    /// Revoke a `jti` taken from already-verified claims. `exp` is the
    /// token's expiry and bounds how long the entry is kept.
    pub fn revoke_jti(&self, jti: &str, exp: i64) {
        debug!(jti = %jti, "revoking share token");
        self.revoked.insert(jti.to_string(), exp);
    }

    /// Whether a `jti` has been revoked.
    pub fn is_revoked(&self, jti: &str) -> bool {
        self.revoked.contains_key(jti)
    }

    /// Exchange a token for a new one with the same subject, scope and
    /// permissions. The old `jti` is revoked.
    ///
    /// Expiry is ignored, but only for one TTL past `exp`.
    pub fn refresh(&self, old_token: &str) -> Result<String, TokenError> {
        self.refresh_at(old_token, Utc::now().timestamp())
    }

    /// Refresh as of `now` (unix seconds).
    pub fn refresh_at(&self, old_token: &str, now: i64) -> Result<String, TokenError> {
        let claims = self.decode_claims(old_token)?;
        if now >= claims.exp + self.ttl_secs {
            return Err(TokenError::Expired);
        }
        if self.revoked.contains_key(&claims.jti) {
            return Err(TokenError::Revoked);
        }
        let fresh = self.issue_at(
            &claims.sub,
            &claims.name,
            claims.scope.as_deref(),
            &claims.perms,
            now,
        )?;
        self.revoke_jti(&claims.jti, claims.exp);
        Ok(fresh)
    }

    /// Drop revocations for tokens that can no longer be validated or
    /// refreshed. Returns the number of entries removed.
    pub fn sweep_revocations(&self, now: i64) -> usize {
        let before = self.revoked.len();
        let horizon = self.ttl_secs;
        self.revoked.retain(|_, exp| *exp + horizon > now);
        before.saturating_sub(self.revoked.len())
    }

    /// Number of revoked `jti`s currently tracked.
    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }

    /// Shape check plus signature/issuer/audience verification. Expiry is
    /// not checked here.
    fn decode_claims(&self, token: &str) -> Result<TokenClaims, TokenError> {
        if !looks_like_jwt(token) {
            return Err(TokenError::MalformedToken);
        }
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidIssuer
                | ErrorKind::InvalidAudience
                | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    warn!(error = %e, "unexpected share token decode failure");
                    TokenError::AuthFailed(e.to_string())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&TokenSettings::with_secret("test-secret"))
    }

    fn perms() -> Vec<String> {
        vec!["read".to_string(), "chat".to_string()]
    }

    #[test]
    fn issue_then_validate_returns_identity() {
        let svc = service();
        let token = svc.issue("u-1", "alice", Some("share-9"), &perms()).unwrap();
        let v = svc.validate(&token, None).unwrap();
        assert_eq!(v.subject_id, "u-1");
        assert_eq!(v.subject_name, "alice");
        assert_eq!(v.scope_id.as_deref(), Some("share-9"));
        assert!(v.has_permission("chat"));
        assert!(!v.has_permission("admin"));
    }

    #[test]
    fn every_issue_gets_a_fresh_jti() {
        let svc = service();
        let a = svc.validate(&svc.issue("u-1", "alice", None, &perms()).unwrap(), None);
        let b = svc.validate(&svc.issue("u-1", "alice", None, &perms()).unwrap(), None);
        assert_ne!(a.unwrap().jti, b.unwrap().jti);
    }

    #[test]
    fn non_jwt_input_is_malformed() {
        let svc = service();
        for input in ["", "plain-legacy-token", "a.b", "a.b.c.d", "a..c"] {
            assert_eq!(svc.validate(input, None), Err(TokenError::MalformedToken), "{input}");
        }
    }

    #[test]
    fn foreign_secret_is_invalid_signature() {
        let other = TokenService::new(&TokenSettings::with_secret("other-secret"));
        let token = other.issue("u-1", "alice", None, &perms()).unwrap();
        assert_eq!(service().validate(&token, None), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn foreign_audience_is_invalid_signature() {
        let mut settings = TokenSettings::with_secret("test-secret");
        settings.audience = "someone-else".into();
        let token = TokenService::new(&settings)
            .issue("u-1", "alice", None, &perms())
            .unwrap();
        assert_eq!(service().validate(&token, None), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn expiry_is_monotonic() {
        let svc = service();
        let issued_at = 1_700_000_000;
        let token = svc
            .issue_at("u-1", "alice", None, &perms(), issued_at)
            .unwrap();
        let exp = issued_at + DEFAULT_TTL_SECS;
        for now in [issued_at, issued_at + 1, exp - 60, exp - 1] {
            assert!(svc.validate_at(&token, None, now).is_ok(), "now={now}");
        }
        for now in [exp, exp + 1, exp + 10_000] {
            assert_eq!(svc.validate_at(&token, None, now), Err(TokenError::Expired), "now={now}");
        }
    }

    #[test]
    fn revocation_is_idempotent_and_sticky() {
        let svc = service();
        let token = svc.issue("u-1", "alice", None, &perms()).unwrap();
        svc.revoke(&token).unwrap();
        svc.revoke(&token).unwrap();
        assert_eq!(svc.revoked_count(), 1);
        assert_eq!(svc.validate(&token, None), Err(TokenError::Revoked));
    }

    #[test]
    fn revoke_by_verified_jti() {
        let svc = service();
        let token = svc.issue("u-1", "alice", None, &perms()).unwrap();
        let v = svc.validate(&token, None).unwrap();
        svc.revoke_jti(&v.jti, v.expires_at);
        assert!(svc.is_revoked(&v.jti));
        assert_eq!(svc.validate(&token, None), Err(TokenError::Revoked));
    }

    #[test]
    fn revoke_records_nothing_for_unverified_input() {
        let svc = service();
        assert_eq!(svc.revoke(""), Err(TokenError::MalformedToken));
        assert_eq!(svc.revoke("legacy-opaque"), Err(TokenError::MalformedToken));

        let other = TokenService::new(&TokenSettings::with_secret("other-secret"));
        let forged = other.issue("u-1", "alice", None, &perms()).unwrap();
        assert_eq!(svc.revoke(&forged), Err(TokenError::InvalidSignature));

        assert_eq!(svc.revoked_count(), 0);
    }

    #[test]
    fn scope_must_match_when_both_present() {
        let svc = service();
        let scoped = svc.issue("u-1", "alice", Some("share-1"), &perms()).unwrap();
        assert!(svc.validate(&scoped, Some("share-1")).is_ok());
        assert_eq!(svc.validate(&scoped, Some("share-2")), Err(TokenError::ScopeMismatch));

        let unscoped = svc.issue("u-1", "alice", None, &perms()).unwrap();
        assert!(svc.validate(&unscoped, Some("share-2")).is_ok());
    }

    #[test]
    fn refresh_revokes_old_and_keeps_claims() {
        let svc = service();
        let old = svc.issue("u-1", "alice", Some("share-1"), &perms()).unwrap();
        let fresh = svc.refresh(&old).unwrap();

        assert_eq!(svc.validate(&old, None), Err(TokenError::Revoked));
        let v = svc.validate(&fresh, None).unwrap();
        assert_eq!(v.subject_id, "u-1");
        assert_eq!(v.scope_id.as_deref(), Some("share-1"));
        assert_eq!(v.permissions, perms());

        assert_eq!(svc.refresh(&old), Err(TokenError::Revoked));
    }

    #[test]
    fn refresh_accepts_recently_expired_tokens_only() {
        let svc = service();
        let issued_at = 1_700_000_000;
        let token = svc
            .issue_at("u-1", "alice", None, &perms(), issued_at)
            .unwrap();
        let exp = issued_at + DEFAULT_TTL_SECS;
        assert!(svc.refresh_at(&token, exp + 5).is_ok());

        let stale = svc
            .issue_at("u-1", "alice", None, &perms(), issued_at)
            .unwrap();
        assert_eq!(
            svc.refresh_at(&stale, exp + DEFAULT_TTL_SECS),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn sweep_drops_only_unusable_revocations() {
        let svc = service();
        let issued_at = 1_700_000_000;
        let token = svc
            .issue_at("u-1", "alice", None, &perms(), issued_at)
            .unwrap();
        svc.revoke(&token).unwrap();
        let exp = issued_at + DEFAULT_TTL_SECS;

        assert_eq!(svc.sweep_revocations(exp), 0);
        assert_eq!(svc.sweep_revocations(exp + DEFAULT_TTL_SECS), 1);
        assert_eq!(svc.revoked_count(), 0);
    }
}
