//! Autenticación web3 challenge/response
//!
//! Obtiene JWTs para las llamadas autenticadas a APIs externas firmando un
//! challenge con la clave del developer. El token se cachea hasta expirar.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use k256::ecdsa::SigningKey;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::environment::EnvironmentConfig;
use crate::utils::eip712::keccak256;
use crate::utils::errors::{AppError, AppResult};

#[derive(Debug, Deserialize)]
struct AuthChallenge {
    #[serde(default)]
    state: String,
    #[serde(default)]
    challenge: String,
}

#[derive(Debug, Serialize)]
struct SubmitChallengePayload {
    state: String,
    signature: String,
    client_id: String,
    domain: String,
    grant_type: String,
}

#[derive(Debug, Deserialize)]
struct SubmitChallengeResponse {
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    exp: i64,
}

struct CachedToken {
    raw: String,
    expires_at: DateTime<Utc>,
}

pub struct AuthService {
    auth_url: String,
    client_id: String,
    domain: String,
    signing_key: SigningKey,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl AuthService {
    pub fn new(config: &EnvironmentConfig) -> AppResult<Self> {
        let pk_hex = config.developer_pk.trim_start_matches("0x");
        let pk_bytes = hex::decode(pk_hex)
            .map_err(|e| AppError::Crypto(format!("invalid developer private key: {}", e)))?;
        let signing_key = SigningKey::from_slice(&pk_bytes)
            .map_err(|e| AppError::Crypto(format!("invalid developer private key: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            auth_url: config.auth_url.clone(),
            client_id: config.auth_client_id.clone(),
            domain: config.auth_domain.clone(),
            signing_key,
            client,
            token: Mutex::new(None),
        })
    }

    /// JWT vigente, renovándolo cuando el cacheado expiró
    pub async fn get_token(&self) -> AppResult<String> {
        let mut guard = self.token.lock().await;

        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() {
                debug!("Auth token vigente en cache");
                return Ok(cached.raw.clone());
            }
            debug!("Auth token expirado, renovando");
        }

        let fresh = self.get_new_token().await?;
        let raw = fresh.raw.clone();
        *guard = Some(fresh);

        Ok(raw)
    }

    async fn get_new_token(&self) -> AppResult<CachedToken> {
        let challenge = self.get_challenge().await?;
        let signature = self.sign_challenge(&challenge.challenge)?;

        let response = self
            .submit_challenge(SubmitChallengePayload {
                state: challenge.state,
                signature,
                client_id: self.client_id.clone(),
                domain: self.domain.clone(),
                grant_type: "authorization_code".to_string(),
            })
            .await?;

        if response.access_token.is_empty() {
            return Err(AppError::ExternalApi(
                "auth service returned empty access token".to_string(),
            ));
        }

        let expires_at = read_expiry(&response.access_token)?;

        Ok(CachedToken {
            raw: response.access_token,
            expires_at,
        })
    }

    /// Firma EIP-191 (personal_sign) del challenge con la clave del developer
    fn sign_challenge(&self, challenge: &str) -> AppResult<String> {
        let prefixed = format!(
            "\x19Ethereum Signed Message:\n{}{}",
            challenge.len(),
            challenge
        );
        let digest = keccak256(prefixed.as_bytes());

        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| AppError::Crypto(format!("challenge signing failed: {}", e)))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = recovery_id.to_byte() + 27;

        Ok(format!("0x{}", hex::encode(out)))
    }

    async fn get_challenge(&self) -> AppResult<AuthChallenge> {
        let address = {
            let verifying_key = self.signing_key.verifying_key();
            let encoded = verifying_key.to_encoded_point(false);
            let hash = keccak256(&encoded.as_bytes()[1..]);
            format!("0x{}", hex::encode(&hash[12..]))
        };

        let response = self
            .client
            .post(format!("{}/auth/web3/generate_challenge", self.auth_url))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("domain", self.domain.as_str()),
                ("address", address.as_str()),
                ("scope", "openid email"),
                ("response_type", "code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApi(format!(
                "challenge request failed with status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn submit_challenge(
        &self,
        payload: SubmitChallengePayload,
    ) -> AppResult<SubmitChallengeResponse> {
        let response = self
            .client
            .post(format!("{}/auth/web3/submit_challenge", self.auth_url))
            .form(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApi(format!(
                "challenge submit failed with status {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

/// Lee el claim `exp` sin verificar la firma: el emisor es quien la validará
fn read_expiry(token: &str) -> AppResult<DateTime<Utc>> {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<TokenClaims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(&[]),
        &validation,
    )
    .map_err(|e| AppError::Jwt(format!("malformed access token: {}", e)))?;

    Utc.timestamp_opt(data.claims.exp, 0)
        .single()
        .ok_or_else(|| AppError::Jwt("invalid token expiry".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_token(claims: &serde_json::Value) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test"),
        )
        .unwrap()
    }

    #[test]
    fn test_read_expiry() {
        let token = encode_token(&serde_json::json!({"exp": 1_700_000_000}));
        let expiry = read_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_read_expiry_rejects_malformed() {
        assert!(read_expiry("not-a-jwt").is_err());
    }

    #[test]
    fn test_sign_challenge_is_recoverable() {
        let config_key = "4c0883a69102937d6231471b5dbb6204fe512961708279f2e3e8a5d4b8e3e974";
        let signing_key =
            SigningKey::from_slice(&hex::decode(config_key).unwrap()).unwrap();

        let service = AuthService {
            auth_url: String::new(),
            client_id: String::new(),
            domain: String::new(),
            signing_key: signing_key.clone(),
            client: Client::new(),
            token: Mutex::new(None),
        };

        let signature_hex = service.sign_challenge("login challenge").unwrap();
        let signature_bytes = hex::decode(signature_hex.trim_start_matches("0x")).unwrap();
        assert_eq!(signature_bytes.len(), 65);
        assert!(signature_bytes[64] == 27 || signature_bytes[64] == 28);

        let prefixed = format!("\x19Ethereum Signed Message:\n{}{}", 15, "login challenge");
        let digest = keccak256(prefixed.as_bytes());
        let mut fixed = [0u8; 65];
        fixed.copy_from_slice(&signature_bytes);
        let recovered =
            crate::services::sd_wallet_service::recover_address(&digest, &fixed).unwrap();
        let expected = crate::services::sd_wallet_service::address_from_key(&signing_key);
        assert_eq!(recovered, expected);
    }
}
