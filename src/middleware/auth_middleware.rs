//! Middleware de autenticación
//!
//! Verifica el Bearer JWT y deja el claim `ethereum_address` disponible
//! como extensión del request para los handlers.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::utils::errors::AppError;

/// Claims del JWT emitido por el servicio de login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub ethereum_address: String,
    #[serde(default)]
    pub exp: usize,
}

/// Identidad del caller, inyectada por el middleware
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub wallet_address: String,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = extract_token_from_header(auth_header)?;
    let claims = verify_token(token, &state.config.jwt_secret)?;

    if claims.ethereum_address.is_empty() {
        return Err(AppError::Unauthorized(
            "wallet address not found in claims".to_string(),
        ));
    }

    request.extensions_mut().insert(AuthenticatedUser {
        wallet_address: claims.ethereum_address,
    });

    Ok(next.run(request).await)
}

/// Extraer el token del header Authorization
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, AppError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Jwt("Authorization header must start with 'Bearer '".to_string()))?;

    if token.is_empty() {
        return Err(AppError::Jwt("Token cannot be empty".to_string()));
    }

    Ok(token)
}

/// Verificar y decodificar el JWT
pub fn verify_token(token: &str, secret: &str) -> Result<JwtClaims, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    let token_data = decode::<JwtClaims>(
        token,
        &decoding_key,
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::Jwt(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}
