use std::fs;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::{config::GmailConfig, HttpClient};

/// Google service-account key file, as downloaded from the cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub token_uri: String,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    sub: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

enum TokenSource {
    /// JWT-bearer grant, impersonating the configured mailbox.
    ServiceAccount {
        key: ServiceAccountKey,
        subject: String,
        scopes: Vec<String>,
    },
    /// Fixed token, used by tests and one-off tooling.
    Static(String),
}

/// Mints and caches access tokens for the Gmail client.
pub struct GmailAuthenticator {
    http_client: HttpClient,
    source: TokenSource,
    cached: tokio::sync::Mutex<Option<CachedToken>>,
}

impl GmailAuthenticator {
    pub fn from_key_file(
        http_client: HttpClient,
        cfg: &GmailConfig,
        subject: &str,
    ) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(&cfg.key_file)
            .with_context(|| format!("Could not read service account key {}", cfg.key_file))?;
        let key: ServiceAccountKey =
            serde_json::from_str(&raw).context("Service account key is invalid")?;

        Ok(GmailAuthenticator {
            http_client,
            source: TokenSource::ServiceAccount {
                key,
                subject: subject.to_string(),
                scopes: cfg.scopes.clone(),
            },
            cached: tokio::sync::Mutex::new(None),
        })
    }

    pub fn with_static_token(http_client: HttpClient, access_token: String) -> Self {
        GmailAuthenticator {
            http_client,
            source: TokenSource::Static(access_token),
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns a valid bearer token, minting a fresh one when the cached
    /// token is absent or within 60s of expiry.
    pub async fn access_token(&self) -> anyhow::Result<String> {
        let (key, subject, scopes) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ServiceAccount {
                key,
                subject,
                scopes,
            } => (key, subject, scopes),
        };

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() + Duration::seconds(60) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.mint(key, subject, scopes).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);

        Ok(access_token)
    }

    async fn mint(
        &self,
        key: &ServiceAccountKey,
        subject: &str,
        scopes: &[String],
    ) -> anyhow::Result<CachedToken> {
        let now = Utc::now();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: scopes.join(" "),
            aud: &key.token_uri,
            sub: subject,
            iat: now.timestamp(),
            exp: (now + Duration::seconds(3600)).timestamp(),
        };

        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                .context("Service account private key is not a valid RSA PEM")?,
        )
        .context("Could not sign token assertion")?;

        let resp = self
            .http_client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &assertion),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Token exchange failed for {}: {} {}",
                key.client_email,
                status,
                body
            ));
        }

        let token = resp.json::<TokenResponse>().await?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}
