//! AES-256-GCM 加密/解密模块
//! 充值Memo协议的底层原语：密文布局为 nonce(12字节) + ciphertext

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::service::error::ServiceError;

/// 加密数据
///
/// # Arguments
/// * `data` - 要加密的原始数据
/// * `key` - 32字节加密密钥
///
/// # Returns
/// 返回加密后的数据（nonce + ciphertext）
pub fn encrypt_data(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, ServiceError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ServiceError::internal(format!("invalid key: {}", e)))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| ServiceError::internal(format!("encryption failed: {}", e)))?;

    let mut result = nonce.to_vec();
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// 解密数据
///
/// GCM认证失败按完整性错误处理，不暴露底层细节
pub fn decrypt_data(encrypted: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, ServiceError> {
    if encrypted.len() < 12 {
        return Err(ServiceError::MemoIntegrity(
            "ciphertext too short".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| ServiceError::internal(format!("invalid key: {}", e)))?;

    let nonce = Nonce::from_slice(&encrypted[..12]);
    let ciphertext = &encrypted[12..];

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ServiceError::MemoIntegrity("decryption failed".to_string()))
}

/// 派生每Memo专用密钥：SHA-256(secret || salt || timestamp)
/// 即使进程密钥事后泄露，单个Memo的密钥也无法推导其他Memo
pub fn derive_memo_key(secret: &[u8], salt: &[u8], timestamp: i64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(salt);
    hasher.update(timestamp.to_be_bytes());
    hasher.finalize().into()
}

/// 进程级Memo密钥（使用Zeroize保护）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MemoSecret {
    secret: Vec<u8>,
}

impl MemoSecret {
    /// 密钥来自配置；至少16字节，不足则拒绝启动
    pub fn new(secret: impl Into<Vec<u8>>) -> anyhow::Result<Self> {
        let secret = secret.into();
        if secret.len() < 16 {
            anyhow::bail!("memo secret too short (min 16 bytes)");
        }
        Ok(Self { secret })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.secret
    }
}
