//! Bearer tickets: short opaque strings exchanged at `/authenticate` and
//! verified at the WebSocket upgrade. HS256 JWTs with an expiry claim —
//! the subject is the username.

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("ticket expired")]
    Expired,
    #[error("ticket invalid: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

/// Issues and verifies bearer tickets. Object-safe so handlers and tests
/// can carry any implementation.
pub trait Issuer: Send + Sync {
    fn issue(&self, subject: &str) -> Result<String, TicketError>;
    fn verify(&self, token: &str) -> Result<String, TicketError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: u64,
}

pub struct Ticket {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Ticket {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Ticket {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation
    }
}

impl Issuer for Ticket {
    fn issue(&self, subject: &str) -> Result<String, TicketError> {
        let claims = Claims {
            sub: subject.to_owned(),
            exp: jsonwebtoken::get_current_timestamp() + self.ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(TicketError::Invalid)
    }

    fn verify(&self, token: &str) -> Result<String, TicketError> {
        let data =
            decode::<Claims>(token, &self.decoding, &Self::validation()).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => TicketError::Expired,
                    _ => TicketError::Invalid(e),
                }
            })?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket::new(b"secret :)", Duration::from_secs(3600))
    }

    #[test]
    fn issue_then_verify() {
        let t = ticket();
        let token = t.issue("john").unwrap();
        assert_eq!(t.verify(&token).unwrap(), "john");
    }

    #[test]
    fn garbage_token_is_invalid() {
        let t = ticket();
        assert!(matches!(t.verify("bad"), Err(TicketError::Invalid(_))));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = ticket().issue("john").unwrap();
        let other = Ticket::new(b"different secret", Duration::from_secs(3600));
        assert!(matches!(other.verify(&token), Err(TicketError::Invalid(_))));
    }

    #[test]
    fn expired_ticket_is_reported_as_expired() {
        let t = ticket();
        let stale = Claims {
            sub: "john".into(),
            exp: jsonwebtoken::get_current_timestamp() - 120,
        };
        let token = encode(&Header::default(), &stale, &t.encoding).unwrap();
        assert!(matches!(t.verify(&token), Err(TicketError::Expired)));
    }

    #[test]
    fn subject_round_trips_verbatim() {
        let t = ticket();
        for subject in ["alice", "user with spaces", "émoji👋"] {
            let token = t.issue(subject).unwrap();
            assert_eq!(t.verify(&token).unwrap(), subject);
        }
    }
}
