// LiveKit access tokens: HS256-signed JWTs carrying video grants.


use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use ring::hmac;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LiveKitConfig;
use crate::{RagError, Result};

const DEFAULT_TTL_HOURS: i64 = 6;

/// Room permissions encoded into the token's `video` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrants {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
}

impl VideoGrants {
    /// Join, publish, and subscribe to one room. The only grant shape the
    /// token service issues.
    #[inline]
    pub fn join_room(room: &str) -> Self {
        Self {
            room: room.to_string(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    name: &'a str,
    nbf: i64,
    exp: i64,
    video: &'a VideoGrants,
}

/// Builder for a signed room-join token.
#[derive(Debug)]
pub struct AccessToken<'a> {
    api_key: &'a str,
    api_secret: &'a str,
    identity: String,
    name: String,
    grants: Option<VideoGrants>,
    ttl: Duration,
}

impl<'a> AccessToken<'a> {
    #[inline]
    pub fn new(config: &'a LiveKitConfig) -> Self {
        Self {
            api_key: &config.api_key,
            api_secret: &config.api_secret,
            identity: String::new(),
            name: String::new(),
            grants: None,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    #[inline]
    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }

    #[inline]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    #[inline]
    pub fn with_grants(mut self, grants: VideoGrants) -> Self {
        self.grants = Some(grants);
        self
    }

    #[inline]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sign the token. Requires a non-blank identity and a grant set.
    #[inline]
    pub fn to_jwt(&self) -> Result<String> {
        if self.identity.trim().is_empty() {
            return Err(RagError::Token(
                "Token identity must not be empty".to_string(),
            ));
        }
        let grants = self
            .grants
            .as_ref()
            .ok_or_else(|| RagError::Token("Token requires video grants".to_string()))?;

        let now = Utc::now();
        let claims = Claims {
            iss: self.api_key,
            sub: &self.identity,
            name: &self.name,
            nbf: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            video: grants,
        };

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = serde_json::to_string(&claims)
            .map_err(|e| RagError::Token(format!("Failed to serialize claims: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signing_input = format!("{header}.{payload}");

        let key = hmac::Key::new(hmac::HMAC_SHA256, self.api_secret.as_bytes());
        let signature = hmac::sign(&key, signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(signature.as_ref());

        Ok(format!("{signing_input}.{signature}"))
    }
}

/// Generate a room name of the form `rag-room-` plus 8 hex characters.
#[inline]
pub fn generate_room_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("rag-room-{}", &id[..8])
}
