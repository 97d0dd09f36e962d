//! HS256 token issue and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::Claims;

/// Signs tokens with the application secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenIssuer {
    pub fn new(secret: &str, lifetime_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    pub fn issue(
        &self,
        user_id: i64,
        company_id: i64,
        email: &str,
        role: &str,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        self.issue_at(user_id, company_id, email, role, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: i64,
        company_id: i64,
        email: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, jsonwebtoken::errors::Error> {
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: user_id,
            company_id,
            email: email.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let issuer = TokenIssuer::new("test-secret", 24);
        let issued = issuer.issue(7, 3, "a@acme.com", "manager").unwrap();
        let claims = issuer.verify(&issued.token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.company_id, 3);
        assert_eq!(claims.role, "manager");
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn rejects_other_secret() {
        let issued = TokenIssuer::new("one", 24).issue(1, 1, "a@b.c", "admin").unwrap();
        assert!(TokenIssuer::new("two", 24).verify(&issued.token).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let issuer = TokenIssuer::new("test-secret", 1);
        let issued = issuer
            .issue_at(1, 1, "a@b.c", "admin", Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(issuer.verify(&issued.token).is_err());
    }
}
