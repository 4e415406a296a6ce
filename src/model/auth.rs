use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::id::ActorId;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// A verified caller identity, carried as a signed JWT in the
/// [`AUTH_TOKEN_COOKIE`] cookie.
///
/// Tokens are issued by the identity layer in front of the ledger. Whether the
/// caller is an administrator is not part of the token; that is decided by the
/// ledger's authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub id: ActorId,
}

impl AuthToken {
    pub fn new(id: impl Into<ActorId>) -> Self {
        Self { id: id.into() }
    }

    /// Sign this token, valid for the configured lifetime.
    pub fn encode(self, config: &Config) -> String {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings")
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        Cookie::build(AUTH_TOKEN_COOKIE, self.encode(config))
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Verify and decode a signed token.
    pub fn decode(token: &str, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            token,
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        if token.id.is_blank() {
            return Err(Error::Status(
                Status::Unauthorized,
                "Auth token has no subject".to_string(),
            ));
        }
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return Outcome::Failure((
                Status::InternalServerError,
                Error::Status(Status::InternalServerError, "Config is not managed".to_string()),
            ));
        };

        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return Outcome::Failure((
                Status::Unauthorized,
                Error::Status(Status::Unauthorized, "No auth token".to_string()),
            ));
        };

        match Self::decode(cookie.value(), config) {
            Ok(token) => Outcome::Success(token),
            Err(err) => {
                debug!("Rejected auth token: {err}");
                Outcome::Failure((Status::Unauthorized, err))
            }
        }
    }
}
