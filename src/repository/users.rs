// 用户数据访问 Repository

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{domain::User, service::error::ServiceError};

#[derive(Debug, Clone)]
pub struct UpsertUserParams {
    pub id: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub auth_method: String,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 首次认证时创建，已存在则刷新展示信息；ID不可变
    async fn upsert(&self, params: UpsertUserParams) -> Result<User, ServiceError>;

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, ServiceError>;
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    display_name: String,
    username: Option<String>,
    auth_method: String,
    role: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            display_name: row.display_name,
            username: row.username,
            auth_method: row.auth_method,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert(&self, params: UpsertUserParams) -> Result<User, ServiceError> {
        let row = sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (id, display_name, username, auth_method, role)
             VALUES ($1, $2, $3, $4, 'user')
             ON CONFLICT (id) DO UPDATE
               SET display_name = EXCLUDED.display_name,
                   username = EXCLUDED.username
             RETURNING id, display_name, username, auth_method, role, created_at",
        )
        .bind(params.id)
        .bind(&params.display_name)
        .bind(&params.username)
        .bind(&params.auth_method)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, ServiceError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, display_name, username, auth_method, role, created_at
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
