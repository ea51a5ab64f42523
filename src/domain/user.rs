//! 用户实体
//! 首次认证时创建；整型ID来自平台侧，本服务永不删除用户

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 平台用户ID（Telegram），不可变
    pub id: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub auth_method: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
