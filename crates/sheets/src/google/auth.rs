//! Service-account authentication for Google APIs.
//!
//! A service account proves its identity with a self-signed RS256 JWT
//! (the "assertion") which the token endpoint exchanges for a short-lived
//! bearer token:
//!
//! ```text
//! base64url(header) . base64url(claims) . base64url(RSASSA-PKCS1-v1_5(SHA-256))
//! ```
//!
//! # Security
//!
//! - The private key and issued tokens are never logged
//! - Tokens are held in `SecretString` and refreshed shortly before expiry

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SheetsError};

/// Read/write access to spreadsheets, plus read-only Drive access to find
/// a spreadsheet by its title.
pub const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each assertion (Google's maximum).
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Fields of a service-account key file that authentication needs.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

/// Issues and caches bearer tokens for one service account.
pub struct ServiceAccountAuth {
    client_email: String,
    key_id: Option<String>,
    token_uri: String,
    private_key: RsaPrivateKey,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ServiceAccountAuth {
    /// Parses a service-account key file.
    ///
    /// Accepts JSON or a Python dict literal (single quotes, `True`/`None`).
    /// Literal `\n` sequences in the PEM are accepted, as produced when the
    /// key is pasted into a single-line environment variable.
    ///
    /// # Errors
    /// Returns `Configuration` if the key or the private key is malformed.
    pub fn from_json(raw: &SecretString) -> Result<Self> {
        let raw = raw.expose_secret();
        let key: ServiceAccountKey = serde_json::from_str(raw)
            .or_else(|json_err| {
                python_dict_to_json(raw)
                    .and_then(|converted| serde_json::from_str::<ServiceAccountKey>(&converted).ok())
                    .ok_or(json_err)
            })
            .map_err(|e| {
                SheetsError::Configuration(format!(
                    "GOOGLE_CREDS_JSON must be a service-account key as JSON or a Python dict literal: {e}"
                ))
            })?;

        let pem = key.private_key.replace("\\n", "\n");
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| SheetsError::Configuration(format!("failed to parse private key: {e}")))?;

        Ok(Self {
            client_email: key.client_email,
            key_id: key.private_key_id,
            token_uri: key
                .token_uri
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            private_key,
            cached: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    #[must_use]
    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Builds the signed JWT assertion for a given issue time (Unix seconds).
    ///
    /// # Errors
    /// Returns `Serialization` if the header or claims cannot be encoded.
    pub fn assertion(&self, issued_at: i64) -> Result<String> {
        let mut header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        if let Some(kid) = &self.key_id {
            header["kid"] = serde_json::Value::String(kid.clone());
        }
        let claims = serde_json::json!({
            "iss": self.client_email,
            "scope": SCOPES,
            "aud": self.token_uri,
            "iat": issued_at,
            "exp": issued_at + ASSERTION_LIFETIME_SECS,
        });

        let signing_input = format!(
            "{}.{}",
            BASE64URL.encode(serde_json::to_vec(&header)?),
            BASE64URL.encode(serde_json::to_vec(&claims)?)
        );

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign(signing_input.as_bytes());

        Ok(format!("{signing_input}.{}", BASE64URL.encode(signature.to_bytes())))
    }

    /// Returns a valid bearer token, exchanging a fresh assertion if the
    /// cached token is missing or about to expire.
    ///
    /// # Errors
    /// Returns `Auth` if the token endpoint rejects the assertion.
    pub async fn access_token(&self, http: &Client) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.token.expose_secret().to_string());
            }
        }

        let assertion = self.assertion(now.timestamp())?;
        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode(GRANT_TYPE),
            urlencoding::encode(&assertion)
        );

        let response = http
            .post(&self.token_uri)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("token exchange failed ({status}): {text}")));
        }

        let token: TokenResponse = serde_json::from_str(&response.text().await?)?;
        let expires_at = now + Duration::seconds(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS));
        debug!(client_email = %self.client_email, %expires_at, "Obtained Google access token");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            token: SecretString::from(token.access_token),
            expires_at,
        });
        Ok(value)
    }
}

/// Rewrites a Python dict literal as JSON: quotes become double quotes and
/// `True`/`False`/`None` become `true`/`false`/`null`. Returns `None` on an
/// unterminated string or any other bare word.
fn python_dict_to_json(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            '\'' => out.push('\''),
                            escaped => {
                                out.push('\\');
                                out.push(escaped);
                            }
                        },
                        quote if quote == c => break,
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() && next != '_' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => return None,
                });
            }
            other => out.push(other),
        }
    }
    Some(out)
}
