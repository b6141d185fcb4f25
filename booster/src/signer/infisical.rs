//! [Vault] backed by Infisical: encrypted keys are stored as secrets named after the operator's
//! checksummed address and decrypted with a KMS key.

use super::{Error, Vault};
use crate::http;
use alloy::primitives::Address;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Refresh the access token this long before it expires.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

/// Connection parameters for an Infisical project.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Settings {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    pub project_id: String,
    pub environment: String,
    pub key_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct SecretResponse {
    secret: Secret,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Secret {
    secret_value: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    ciphertext: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

struct Session {
    token: Zeroizing<String>,
    expires_at: Instant,
}

/// Infisical client authenticated with universal auth.
pub struct Infisical {
    http: http::Client,
    settings: Settings,
    session: Mutex<Session>,
}

impl Infisical {
    /// Logs in and returns a connected client.
    pub async fn connect(http: http::Client, settings: Settings) -> Result<Self, Error> {
        let session = login(&http, &settings).await?;
        info!(url = %settings.url, project = %settings.project_id, "connected to infisical");
        Ok(Self {
            http,
            settings,
            session: Mutex::new(session),
        })
    }

    async fn token(&self) -> Result<Zeroizing<String>, Error> {
        let mut session = self.session.lock().await;
        if Instant::now() + TOKEN_MARGIN >= session.expires_at {
            debug!("refreshing infisical token");
            *session = login(&self.http, &self.settings).await?;
        }
        Ok(session.token.clone())
    }

    /// Forces the next [Self::token] call to log in again.
    async fn invalidate(&self) {
        self.session.lock().await.expires_at = Instant::now();
    }

    /// Fetches the encrypted key for `address` and decrypts it.
    async fn fetch(&self, address: Address) -> Result<Zeroizing<String>, Error> {
        let token = self.token().await?;
        let bearer = Zeroizing::new(format!("Bearer {}", token.as_str()));
        let headers = [("authorization", bearer.as_str())];

        // Step 1: fetch the encrypted key
        let url = self.endpoint(&format!(
            "/api/v3/secrets/raw/{}",
            address.to_checksum(None)
        ));
        let query = [
            ("workspaceId", self.settings.project_id.as_str()),
            ("environment", self.settings.environment.as_str()),
            ("secretPath", "/"),
        ];
        let body = match self.http.get(&url, &query, &headers).await {
            Ok(body) => body,
            Err(err) if err.status() == Some(StatusCode::NOT_FOUND) => {
                return Err(Error::MissingKey(address))
            }
            Err(err) => return Err(err.into()),
        };
        let secret: SecretResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Malformed(e.to_string()))?;

        // Step 2: decrypt it
        let url = self.endpoint(&format!("/api/v1/kms/keys/{}/decrypt", self.settings.key_id));
        let body = self
            .http
            .post(
                &url,
                &headers,
                &DecryptRequest {
                    ciphertext: &secret.secret.secret_value,
                },
            )
            .await?;
        let response: DecryptResponse =
            serde_json::from_slice(&body).map_err(|e| Error::Malformed(e.to_string()))?;
        let plaintext = Zeroizing::new(
            STANDARD
                .decode(response.plaintext.as_bytes())
                .map_err(|e| Error::Malformed(e.to_string()))?,
        );
        let key = std::str::from_utf8(&plaintext).map_err(|_| Error::InvalidKey(address))?;
        debug!(%address, "fetched private key");
        Ok(Zeroizing::new(key.to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.settings.url.trim_end_matches('/'), path)
    }
}

async fn login(http: &http::Client, settings: &Settings) -> Result<Session, Error> {
    let url = format!(
        "{}/api/v1/auth/universal-auth/login",
        settings.url.trim_end_matches('/')
    );
    let body = http
        .post(
            &url,
            &[],
            &LoginRequest {
                client_id: &settings.client_id,
                client_secret: &settings.client_secret,
            },
        )
        .await?;
    let response: LoginResponse =
        serde_json::from_slice(&body).map_err(|e| Error::Malformed(e.to_string()))?;
    Ok(Session {
        token: Zeroizing::new(response.access_token),
        expires_at: Instant::now() + Duration::from_secs(response.expires_in),
    })
}

impl Vault for Infisical {
    async fn private_key(&self, address: Address) -> Result<Zeroizing<String>, Error> {
        match self.fetch(address).await {
            // The token was revoked before it expired
            Err(Error::Http(err)) if err.status() == Some(StatusCode::UNAUTHORIZED) => {
                warn!(%address, "infisical rejected access token, logging in again");
                self.invalidate().await;
                self.fetch(address).await
            }
            result => result,
        }
    }
}
