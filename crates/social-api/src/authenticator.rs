use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use social_types::api::Claims;

/// Issues and verifies HS256 bearer tokens. Handlers only ever see the
/// verified [`Claims`].
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    ttl: chrono::Duration,
}

impl JwtAuthenticator {
    /// `issuer` doubles as the audience: tokens are only valid for the
    /// service that minted them.
    pub fn new(secret: &str, issuer: &str, ttl: chrono::Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.validate_nbf = true;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: issuer.to_string(),
            ttl,
        }
    }

    pub fn issue(&self, user_id: i64) -> jsonwebtoken::errors::Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
            exp: (now + self.ttl).timestamp() as usize,
            nbf: now.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(secret: &str, issuer: &str) -> JwtAuthenticator {
        JwtAuthenticator::new(secret, issuer, chrono::Duration::hours(1))
    }

    #[test]
    fn issued_token_verifies() {
        let a = auth("k", "social");
        let token = a.issue(42).unwrap();
        let claims = a.verify(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.aud, "social");
    }

    #[test]
    fn subject_is_a_string_claim() {
        let a = auth("k", "social");
        let token = a.issue(7).unwrap();

        // Inspect the payload without validation
        let mut raw = Validation::new(Algorithm::HS256);
        raw.insecure_disable_signature_validation();
        raw.validate_aud = false;
        raw.required_spec_claims.clear();
        let payload =
            decode::<serde_json::Value>(&token, &DecodingKey::from_secret(b""), &raw).unwrap();
        assert_eq!(payload.claims["sub"], serde_json::json!("7"));
    }

    #[test]
    fn non_numeric_subject_has_no_user_id() {
        let a = auth("k", "social");
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "alice".into(),
            iss: "social".into(),
            aud: "social".into(),
            exp: now + 3600,
            nbf: now,
            iat: now,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &a.encoding).unwrap();

        let verified = a.verify(&token).unwrap();
        assert_eq!(verified.user_id(), None);
    }

    #[test]
    fn wrong_secret_or_issuer_is_rejected() {
        let token = auth("k", "social").issue(1).unwrap();
        assert!(auth("other", "social").verify(&token).is_err());
        assert!(auth("k", "elsewhere").verify(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let a = JwtAuthenticator::new("k", "social", chrono::Duration::hours(-2));
        let token = a.issue(1).unwrap();
        assert!(a.verify(&token).is_err());
    }
}
