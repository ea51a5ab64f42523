//! 充值Memo加密协议
//!
//! Memo把一笔链上转账绑定到发起它的用户与金额上，两层完整性校验：
//! - 外层哈希：HMAC-SHA256(密文 || salt || 时间戳)，解密前先验，防篡改后解密的oracle攻击
//! - 内层校验和：SHA-256(金额 | 付款地址 | 时间戳)，解密后复核，确认载荷本身未被伪造
//!
//! 每个Memo的加密密钥由进程密钥 + 随机salt + 时间戳派生，
//! 互不相同，单个密钥泄露不波及其他Memo

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    infrastructure::encryption::{decrypt_data, derive_memo_key, encrypt_data, MemoSecret},
    service::error::ServiceError,
};

type HmacSha256 = Hmac<Sha256>;

/// 加密后的Memo，随充值意图下发给付款方
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EncryptedMemo {
    /// base64(nonce + ciphertext)
    pub encrypted_data: String,
    /// hex(16字节随机salt)
    pub salt: String,
    /// Memo创建时间（unix秒），1小时后过期
    pub timestamp: i64,
    /// hex(HMAC-SHA256(ciphertext || salt || timestamp))
    pub hash: String,
}

/// 解密出的载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoPayload {
    pub amount: Decimal,
    pub payer_address: String,
    pub timestamp: i64,
}

/// 与链上观测转账的比对结果
#[derive(Debug, Clone)]
pub struct MemoValidation {
    pub is_valid: bool,
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct InnerPayload {
    amount: String,
    payer_address: String,
    timestamp: i64,
    checksum: String,
}

pub struct MemoCipher {
    secret: MemoSecret,
    ttl_secs: i64,
    amount_tolerance: Decimal,
}

impl MemoCipher {
    pub fn new(secret: MemoSecret, ttl_secs: i64, amount_tolerance: Decimal) -> Self {
        Self {
            secret,
            ttl_secs,
            amount_tolerance,
        }
    }

    pub fn encrypt_memo(
        &self,
        amount: Decimal,
        payer_address: &str,
        timestamp: i64,
    ) -> Result<EncryptedMemo, ServiceError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);

        let inner = InnerPayload {
            amount: amount.to_string(),
            payer_address: payer_address.to_string(),
            timestamp,
            checksum: Self::inner_checksum(amount, payer_address, timestamp),
        };
        let plaintext = serde_json::to_vec(&inner)
            .map_err(|e| ServiceError::internal(format!("memo serialization: {}", e)))?;

        let key = derive_memo_key(self.secret.as_bytes(), &salt, timestamp);
        let ciphertext = encrypt_data(&plaintext, &key)?;

        let hash = self.outer_hash(&ciphertext, &salt, timestamp)?;

        Ok(EncryptedMemo {
            encrypted_data: BASE64.encode(&ciphertext),
            salt: hex::encode(salt),
            timestamp,
            hash,
        })
    }

    pub fn decrypt_memo(&self, memo: &EncryptedMemo) -> Result<MemoPayload, ServiceError> {
        self.decrypt_memo_at(memo, Utc::now().timestamp())
    }

    /// 解密与校验；now 显式传入便于测试时间窗口
    pub fn decrypt_memo_at(
        &self,
        memo: &EncryptedMemo,
        now: i64,
    ) -> Result<MemoPayload, ServiceError> {
        let ciphertext = BASE64
            .decode(&memo.encrypted_data)
            .map_err(|_| ServiceError::MemoIntegrity("invalid ciphertext encoding".into()))?;
        let salt = hex::decode(&memo.salt)
            .map_err(|_| ServiceError::MemoIntegrity("invalid salt encoding".into()))?;

        // 外层哈希先验，任何解密尝试之前
        let expected = self.outer_hash(&ciphertext, &salt, memo.timestamp)?;
        if !constant_time_eq(expected.as_bytes(), memo.hash.as_bytes()) {
            return Err(ServiceError::MemoIntegrity("outer hash mismatch".into()));
        }

        // 重放窗口
        if now - memo.timestamp > self.ttl_secs {
            return Err(ServiceError::MemoIntegrity("memo expired".into()));
        }

        let key = derive_memo_key(self.secret.as_bytes(), &salt, memo.timestamp);
        let plaintext = decrypt_data(&ciphertext, &key)?;

        let inner: InnerPayload = serde_json::from_slice(&plaintext)
            .map_err(|_| ServiceError::MemoIntegrity("malformed payload".into()))?;
        let amount: Decimal = inner
            .amount
            .parse()
            .map_err(|_| ServiceError::MemoIntegrity("malformed amount".into()))?;

        // 内层校验和复核
        let checksum = Self::inner_checksum(amount, &inner.payer_address, inner.timestamp);
        if !constant_time_eq(checksum.as_bytes(), inner.checksum.as_bytes()) {
            return Err(ServiceError::MemoIntegrity("inner checksum mismatch".into()));
        }

        Ok(MemoPayload {
            amount,
            payer_address: inner.payer_address,
            timestamp: inner.timestamp,
        })
    }

    /// 与链上观测到的转账比对
    ///
    /// 金额允许一个很小的绝对容差吸收链上精度取整；更大的偏差按不匹配处理
    pub fn validate_transaction(
        &self,
        observed_amount: Decimal,
        memo: &EncryptedMemo,
        expected_payer_address: &str,
    ) -> MemoValidation {
        let payload = match self.decrypt_memo(memo) {
            Ok(p) => p,
            Err(e) => {
                return MemoValidation {
                    is_valid: false,
                    reason: Some(e.to_string()),
                }
            }
        };

        if payload.payer_address != expected_payer_address {
            return MemoValidation {
                is_valid: false,
                reason: Some("payer address mismatch".into()),
            };
        }

        let delta = (observed_amount - payload.amount).abs();
        if delta > self.amount_tolerance {
            return MemoValidation {
                is_valid: false,
                reason: Some(format!(
                    "amount mismatch: observed {}, expected {}",
                    observed_amount, payload.amount
                )),
            };
        }

        MemoValidation {
            is_valid: true,
            reason: None,
        }
    }

    fn outer_hash(
        &self,
        ciphertext: &[u8],
        salt: &[u8],
        timestamp: i64,
    ) -> Result<String, ServiceError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ServiceError::internal(format!("hmac init: {}", e)))?;
        mac.update(ciphertext);
        mac.update(salt);
        mac.update(&timestamp.to_be_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn inner_checksum(amount: Decimal, payer_address: &str, timestamp: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}|{}|{}", amount, payer_address, timestamp));
        hex::encode(hasher.finalize())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
