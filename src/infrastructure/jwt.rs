//! JWT Token 生成和验证模块
//! 身份来源是平台登录（Telegram），sub 携带整型用户ID

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,         // Subject (Telegram user id)
    pub username: String,    // 平台用户名
    pub auth_method: String, // 认证方式（telegram）
    pub role: String,        // user / admin
    pub exp: i64,            // Expiration time
    pub iat: i64,            // Issued at
    pub jti: String,         // 每个token唯一
}

impl Claims {
    pub fn new(
        user_id: i64,
        username: String,
        auth_method: String,
        role: String,
        expires_in_secs: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            username,
            auth_method,
            role,
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// 获取整型用户ID
    pub fn user_id(&self) -> Result<i64> {
        self.sub
            .parse::<i64>()
            .map_err(|e| anyhow!("Invalid user ID in claims: {}", e))
    }
}

/// 生成JWT Token
pub fn generate_token(
    user_id: i64,
    username: String,
    auth_method: String,
    role: String,
) -> Result<String> {
    let expires_in_secs = std::env::var("JWT_TOKEN_EXPIRY_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600); // 默认1小时

    let secret = get_jwt_secret()?;
    let claims = Claims::new(user_id, username, auth_method, role, expires_in_secs);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("Failed to encode token: {}", e))
}

/// 验证JWT Token
pub fn verify_token(token: &str) -> Result<Claims> {
    let secret = get_jwt_secret()?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 10; // 允许10秒时钟偏差

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::warn!("JWT: token verification failed: {}", e);
        anyhow!("Token verification failed: {}", e)
    })?;

    let claims = token_data.claims;

    // sub 必须是整型用户ID
    claims
        .sub
        .parse::<i64>()
        .map_err(|e| anyhow!("Invalid user_id format in token: {}", e))?;

    Ok(claims)
}

/// 从环境变量获取JWT密钥
fn get_jwt_secret() -> Result<String> {
    std::env::var("JWT_SECRET").map_err(|_| anyhow!("JWT_SECRET environment variable not set"))
}
