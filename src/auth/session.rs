use chrono::Utc;
use hmac::{ Hmac, Mac };
use sha2::Sha256;
use uuid::Uuid;

use super::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

/// Issues and checks stateless session tokens of the form
/// `user_id.expires_at.nonce.signature`, signed with HMAC-SHA256.
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl SessionSigner {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs,
        }
    }

    /// Signer with a per-process secret; tokens die with the process.
    pub fn random(ttl_secs: i64) -> Self {
        let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        Self::new(&secret, ttl_secs)
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidKey)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn issue(&self, user_id: i64) -> Result<String, AuthError> {
        self.issue_until(user_id, Utc::now().timestamp() + self.ttl_secs)
    }

    pub(crate) fn issue_until(&self, user_id: i64, expires_at: i64) -> Result<String, AuthError> {
        let payload = format!("{}.{}.{}", user_id, expires_at, Uuid::new_v4().simple());
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Returns the user id the token was issued for.
    pub fn verify(&self, token: &str) -> Result<i64, AuthError> {
        let (payload, signature) = token.rsplit_once('.').ok_or(AuthError::MalformedToken)?;
        let mut parts = payload.split('.');
        let (Some(user_id), Some(expires_at), Some(_nonce), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(AuthError::MalformedToken);
        };

        let signature = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let expires_at: i64 = expires_at.parse().map_err(|_| AuthError::MalformedToken)?;
        if Utc::now().timestamp() >= expires_at {
            return Err(AuthError::Expired);
        }
        user_id.parse().map_err(|_| AuthError::MalformedToken)
    }

    pub fn cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.ttl_secs
        )
    }

    pub fn clear_cookie() -> String {
        format!("{}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let signer = SessionSigner::new("secret", 60);
        let token = signer.issue(42).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn tokens_are_unique_per_issue() {
        let signer = SessionSigner::new("secret", 60);
        assert_ne!(signer.issue(1).unwrap(), signer.issue(1).unwrap());
    }

    #[test]
    fn other_secret_is_rejected() {
        let token = SessionSigner::new("secret", 60).issue(42).unwrap();
        let err = SessionSigner::new("other", 60).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::BadSignature));
    }

    #[test]
    fn tampered_user_id_is_rejected() {
        let signer = SessionSigner::new("secret", 60);
        let token = signer.issue(42).unwrap();
        let forged = token.replacen("42.", "43.", 1);
        assert!(matches!(signer.verify(&forged).unwrap_err(), AuthError::BadSignature));
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = SessionSigner::new("secret", 60);
        let token = signer.issue_until(42, Utc::now().timestamp() - 1).unwrap();
        assert!(matches!(signer.verify(&token).unwrap_err(), AuthError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = SessionSigner::new("secret", 60);
        for token in ["", "abc", "1.2.zz", "1.2.3.4.5", "x.y.z.not-hex"] {
            assert!(
                matches!(signer.verify(token).unwrap_err(), AuthError::MalformedToken),
                "{token}"
            );
        }
    }

    #[test]
    fn cookies_set_and_clear_the_session() {
        let signer = SessionSigner::new("secret", 60);
        assert_eq!(signer.cookie("t"), "session=t; HttpOnly; Path=/; SameSite=Lax; Max-Age=60");
        assert!(SessionSigner::clear_cookie().contains("Max-Age=0"));
    }
}
