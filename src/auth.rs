//! Authorization header shaping and OAuth2 token lifecycle.
//!
//! Covers the static schemes (Bearer, Basic, API-key pair, HMAC signature,
//! JWT) plus the OAuth2 client-credentials refresh flow, bounded to one
//! refresh per original call (see the open question this resolves in
//! `DESIGN.md`).

use std::time::{Duration, SystemTime};

use base64::Engine;
use jsonwebtoken::{EncodingKey, Header, encode as jwt_encode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{Result, error::RuntimeError};

/// A secret value that is zeroized on drop.
pub type Secret = Zeroizing<String>;

/// A single authorization scheme applied to outgoing requests.
#[derive(Debug, Clone, Default)]
pub enum AuthScheme {
    #[default]
    None,
    Bearer {
        token: Secret,
    },
    Basic {
        client_id: String,
        client_secret: Secret,
    },
    ApiKeys {
        public_key: String,
        secret_key: Secret,
        header_public: String,
        header_secret: String,
    },
    Hmac {
        message: String,
        secret: Secret,
        header: String,
    },
    Jwt {
        payload: serde_json::Map<String, serde_json::Value>,
        secret: Secret,
        algorithm: jsonwebtoken::Algorithm,
        ttl: Duration,
    },
}

impl AuthScheme {
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthScheme::Bearer {
            token: Zeroizing::new(token.into()),
        }
    }

    pub fn basic(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        AuthScheme::Basic {
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
        }
    }

    /// Applies this scheme's header(s) onto `headers`, prefixed as described
    /// in the component design for `AuthManager`.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            AuthScheme::None => {}
            AuthScheme::Bearer { token } => {
                set_authorization(headers, &format!("Bearer {}", token.trim()))?;
            }
            AuthScheme::Basic {
                client_id,
                client_secret,
            } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{client_id}:{}", client_secret.as_str()));
                set_authorization(headers, &format!("Basic {encoded}"))?;
                headers.insert(
                    reqwest::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
            }
            AuthScheme::ApiKeys {
                public_key,
                secret_key,
                header_public,
                header_secret,
            } => {
                insert_header(headers, header_public, public_key)?;
                insert_header(headers, header_secret, secret_key.as_str())?;
            }
            AuthScheme::Hmac {
                message,
                secret,
                header,
            } => {
                // Plain SHA-256 of `message || secret`, not a keyed HMAC
                // construction: matches the original system's signature
                // scheme so headers stay interoperable.
                let digest = Sha256::digest(format!("{message}{}", secret.as_str()).as_bytes());
                let signature = hex::encode(digest);
                insert_header(headers, header, &signature)?;
            }
            AuthScheme::Jwt {
                payload,
                secret,
                algorithm,
                ttl,
            } => {
                let token = encode_jwt(payload, secret, *algorithm, *ttl)?;
                set_authorization(headers, &format!("Bearer {token}"))?;
            }
        }
        Ok(())
    }
}

fn set_authorization(headers: &mut HeaderMap, value: &str) -> Result<()> {
    insert_header(headers, "Authorization", value)
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| RuntimeError::other(format!("invalid header name {name}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| RuntimeError::other(format!("invalid header value: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

fn encode_jwt(
    payload: &serde_json::Map<String, serde_json::Value>,
    secret: &Secret,
    algorithm: jsonwebtoken::Algorithm,
    ttl: Duration,
) -> Result<String> {
    let mut claims = payload.clone();
    let exp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        + ttl.as_secs();
    claims.insert("exp".to_string(), serde_json::Value::from(exp));

    jwt_encode(
        &Header::new(algorithm),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|source| RuntimeError::Jwt { source })
}

/// OAuth2 client-credentials configuration, as supplied to
/// [`crate::request::RequestCore::oauth2`].
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Secret,
    pub endpoint: String,
    pub scope: String,
    pub grant: String,
    pub token_key: Option<String>,
    /// Overrides the server's `expires_in`, if set.
    pub refresh_in: Option<Duration>,
}

impl OAuth2Config {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Zeroizing::new(client_secret.into()),
            endpoint: "oauth2/token".to_string(),
            scope: String::new(),
            grant: "client_credentials".to_string(),
            token_key: None,
            refresh_in: None,
        }
    }
}

/// Live OAuth2 state: the configuration plus the absolute expiry of the
/// current access token.
#[derive(Debug, Clone)]
pub struct OAuth2State {
    pub config: OAuth2Config,
    pub expiry: Option<SystemTime>,
}

impl OAuth2State {
    pub fn new(config: OAuth2Config) -> Self {
        Self {
            config,
            expiry: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => SystemTime::now() >= expiry,
            None => true,
        }
    }
}

#[derive(Debug, Serialize)]
struct BasicTokenRequest<'a> {
    grant_type: &'a str,
    scope: &'a str,
}

#[derive(Debug, Serialize)]
struct BodyCredentialsTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    scope: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

/// The result of a successful OAuth2 client-credentials exchange.
pub struct OAuth2Token {
    pub authorization: String,
    pub expires_in: Option<Duration>,
}

/// Runs the OAuth2 client-credentials flow against `base_url` + `config.endpoint`:
/// first with HTTP Basic auth, then, on failure, exactly once more with the
/// credentials in the body.
pub async fn run_oauth2_flow(
    client: &reqwest::Client,
    base_url: &str,
    config: &OAuth2Config,
) -> Result<OAuth2Token> {
    let url = if config.endpoint.starts_with("http") {
        config.endpoint.clone()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            config.endpoint.trim_start_matches('/')
        )
    };

    let basic_attempt = client
        .post(&url)
        .basic_auth(&config.client_id, Some(config.client_secret.as_str()))
        .json(&BasicTokenRequest {
            grant_type: &config.grant,
            scope: &config.scope,
        })
        .send()
        .await;

    let response = match basic_attempt {
        Ok(resp) if resp.status().is_success() => resp,
        _ => {
            debug!("oauth2 basic-auth attempt failed, retrying with body credentials");
            client
                .post(&url)
                .json(&BodyCredentialsTokenRequest {
                    client_id: &config.client_id,
                    client_secret: config.client_secret.as_str(),
                    grant_type: &config.grant,
                    scope: &config.scope,
                })
                .send()
                .await
                .map_err(|e| RuntimeError::OAuth {
                    message: format!("token request failed: {e}"),
                })?
        }
    };

    if !response.status().is_success() {
        return Err(RuntimeError::OAuth {
            message: format!("token endpoint returned {}", response.status()),
        });
    }

    let parsed: TokenResponse = response.json().await.map_err(|e| RuntimeError::OAuth {
        message: format!("token response was not valid json: {e}"),
    })?;

    let token_key = config.token_key.as_deref();
    let access_token = parsed
        .access_token
        .clone()
        .or_else(|| {
            token_key
                .and_then(|k| parsed.rest.get(k))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .ok_or_else(|| RuntimeError::OAuth {
            message: "token response did not contain an access token".to_string(),
        })?;

    let token_type = parsed.token_type.unwrap_or_else(|| "Bearer".to_string());
    let expires_in = config
        .refresh_in
        .or_else(|| parsed.expires_in.map(Duration::from_secs));

    Ok(OAuth2Token {
        authorization: format!("{token_type} {access_token}"),
        expires_in,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_sets_authorization_header() {
        let mut headers = HeaderMap::new();
        AuthScheme::bearer("abc123").apply(&mut headers).unwrap();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer abc123");
    }

    #[test]
    fn basic_sets_base64_header_and_form_content_type() {
        let mut headers = HeaderMap::new();
        AuthScheme::basic("id", "secret")
            .apply(&mut headers)
            .unwrap();
        let expected = format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode("id:secret")
        );
        assert_eq!(headers.get("Authorization").unwrap(), expected.as_str());
        assert_eq!(
            headers.get("content-type").unwrap(),
            "application/x-www-form-urlencoded"
        );
    }

    #[test]
    fn hmac_signature_is_deterministic() {
        let mut headers = HeaderMap::new();
        let scheme = AuthScheme::Hmac {
            message: "payload".to_string(),
            secret: Zeroizing::new("secret".to_string()),
            header: "X-Signature".to_string(),
        };
        scheme.apply(&mut headers).unwrap();
        let sig1 = headers.get("X-Signature").unwrap().to_str().unwrap();

        let mut headers2 = HeaderMap::new();
        scheme.apply(&mut headers2).unwrap();
        assert_eq!(sig1, headers2.get("X-Signature").unwrap());
    }

    #[test]
    fn hmac_signature_matches_plain_sha256_of_message_and_secret() {
        let mut headers = HeaderMap::new();
        let scheme = AuthScheme::Hmac {
            message: "payload".to_string(),
            secret: Zeroizing::new("secret".to_string()),
            header: "X-Signature".to_string(),
        };
        scheme.apply(&mut headers).unwrap();

        let expected = hex::encode(Sha256::digest(b"payloadsecret"));
        assert_eq!(headers.get("X-Signature").unwrap(), expected.as_str());
    }

    #[test]
    fn jwt_embeds_expiry_claim() {
        let mut headers = HeaderMap::new();
        let mut payload = serde_json::Map::new();
        payload.insert("sub".into(), "user-1".into());
        let scheme = AuthScheme::Jwt {
            payload,
            secret: Zeroizing::new("secret".to_string()),
            algorithm: jsonwebtoken::Algorithm::HS256,
            ttl: Duration::from_secs(3600),
        };
        scheme.apply(&mut headers).unwrap();
        let header_val = headers.get("Authorization").unwrap().to_str().unwrap();
        assert!(header_val.starts_with("Bearer "));
    }

    #[test]
    fn oauth2_state_is_expired_with_no_expiry() {
        let state = OAuth2State::new(OAuth2Config::new("id", "secret"));
        assert!(state.is_expired());
    }
}
