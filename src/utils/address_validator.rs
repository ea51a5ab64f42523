//! 地址验证模块
//! 统一的提现/收款地址格式校验

/// 地址验证器
pub struct AddressValidator;

impl AddressValidator {
    /// 验证链上地址格式
    ///
    /// 支持两种格式：
    /// - User-friendly: EQ... 或 UQ...（48个字符，Base64url）
    /// - Raw: workchain:hex64（如 0:ab...）
    pub fn validate(address: &str) -> bool {
        Self::validate_friendly(address) || Self::validate_raw(address)
    }

    fn validate_friendly(address: &str) -> bool {
        if address.len() != 48 {
            return false;
        }
        if !(address.starts_with("EQ") || address.starts_with("UQ")) {
            return false;
        }
        address
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '+' || c == '/')
    }

    fn validate_raw(address: &str) -> bool {
        let Some((workchain, hex_part)) = address.split_once(':') else {
            return false;
        };
        if workchain.parse::<i32>().is_err() {
            return false;
        }
        hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_user_friendly_addresses() {
        assert!(AddressValidator::validate(
            "EQDrLq-X6jKZNHAScgghh0h1iog3StK71zn8dcmrOj8jPWRA"
        ));
        assert!(AddressValidator::validate(
            "UQDrLq-X6jKZNHAScgghh0h1iog3StK71zn8dcmrOj8jPTk5"
        ));
    }

    #[test]
    fn accepts_raw_addresses() {
        assert!(AddressValidator::validate(&format!("0:{}", "ab".repeat(32))));
        assert!(AddressValidator::validate(&format!("-1:{}", "0f".repeat(32))));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!AddressValidator::validate(""));
        assert!(!AddressValidator::validate("EQshort"));
        assert!(!AddressValidator::validate(&format!("x:{}", "ab".repeat(32))));
        assert!(!AddressValidator::validate(&format!("0:{}", "zz".repeat(32))));
        // 前缀合法但长度不对
        assert!(!AddressValidator::validate(
            "EQDrLq-X6jKZNHAScgghh0h1iog3StK71zn8dcmrOj8jPWRAxx"
        ));
    }
}
