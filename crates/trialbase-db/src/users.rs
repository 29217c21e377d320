//! PostgreSQL identity repositories: users, roles, and assignments.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use trialbase_core::{
    CreateUserRequest, Error, Result, Role, RoleRepository, User, UserPatch, UserRepository,
    UserRoleAssignment, UserRoleDetail, UserRoleRepository, UserRoleWithName,
};

const USER_COLUMNS: &str = "id, username, email, password, company, designation, phone, \
     country, region, sex, age, plan, created_at, updated_at";

/// System roles that can never be renamed or deleted.
pub const PROTECTED_ROLES: &[&str] = &["User", "Admin", "Manager"];

/// Whether a role name is a protected system role (case-sensitive).
pub fn is_protected_role(role_name: &str) -> bool {
    PROTECTED_ROLES.contains(&role_name)
}

// =========================================================================
// USERS
// =========================================================================

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, req: CreateUserRequest) -> Result<User> {
        let sql = format!(
            "INSERT INTO users \
             (username, email, password, company, designation, phone, country, region, sex, age, plan) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&req.username)
            .bind(&req.email)
            .bind(&req.password)
            .bind(&req.company)
            .bind(&req.designation)
            .bind(&req.phone)
            .bind(&req.country)
            .bind(&req.region)
            .bind(&req.sex)
            .bind(req.age)
            .bind(&req.plan)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_all(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET \
             email = COALESCE($2, email), \
             company = COALESCE($3, company), \
             designation = COALESCE($4, designation), \
             phone = COALESCE($5, phone), \
             country = COALESCE($6, country), \
             region = COALESCE($7, region), \
             sex = COALESCE($8, sex), \
             age = COALESCE($9, age), \
             plan = COALESCE($10, plan), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&patch.email)
            .bind(&patch.company)
            .bind(&patch.designation)
            .bind(&patch.phone)
            .bind(&patch.country)
            .bind(&patch.region)
            .bind(&patch.sex)
            .bind(patch.age)
            .bind(&patch.plan)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

// =========================================================================
// ROLES
// =========================================================================

#[derive(Clone)]
pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fail with [`Error::Protected`] when the given role id names a
    /// protected system role.
    async fn guard_protected(&self, id: Uuid, action: &str) -> Result<()> {
        let existing = self.find_by_id(id).await?;
        if let Some(role) = existing {
            if is_protected_role(&role.role_name) {
                return Err(Error::Protected(format!(
                    "Cannot {action} protected system role: {}",
                    role.role_name
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn create(&self, role_name: &str) -> Result<Role> {
        sqlx::query_as::<_, Role>(
            "INSERT INTO roles (role_name) VALUES ($1) RETURNING id, role_name, created_at",
        )
        .bind(role_name)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn find_all(&self) -> Result<Vec<Role>> {
        sqlx::query_as::<_, Role>("SELECT id, role_name, created_at FROM roles ORDER BY role_name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        sqlx::query_as::<_, Role>("SELECT id, role_name, created_at FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_name(&self, role_name: &str) -> Result<Option<Role>> {
        sqlx::query_as::<_, Role>(
            "SELECT id, role_name, created_at FROM roles WHERE role_name = $1",
        )
        .bind(role_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn update(&self, id: Uuid, role_name: &str) -> Result<Option<Role>> {
        self.guard_protected(id, "rename").await?;
        sqlx::query_as::<_, Role>(
            "UPDATE roles SET role_name = $2 WHERE id = $1 RETURNING id, role_name, created_at",
        )
        .bind(id)
        .bind(role_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.guard_protected(id, "delete").await?;
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

// =========================================================================
// USER-ROLE ASSIGNMENTS
// =========================================================================

#[derive(Clone)]
pub struct PgUserRoleRepository {
    pool: PgPool,
}

impl PgUserRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRoleRepository for PgUserRoleRepository {
    async fn assign(&self, user_id: Uuid, role_id: Uuid) -> Result<Option<UserRoleAssignment>> {
        sqlx::query_as::<_, UserRoleAssignment>(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) \
             ON CONFLICT ON CONSTRAINT user_roles_unique DO NOTHING \
             RETURNING id, user_id, role_id",
        )
        .bind(user_id)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn remove(&self, user_id: Uuid, role_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<UserRoleWithName>> {
        sqlx::query_as::<_, UserRoleWithName>(
            "SELECT ur.id, ur.user_id, ur.role_id, r.role_name \
             FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 ORDER BY r.role_name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn users_with_role(&self, role_id: Uuid) -> Result<Vec<UserRoleAssignment>> {
        sqlx::query_as::<_, UserRoleAssignment>(
            "SELECT id, user_id, role_id FROM user_roles WHERE role_id = $1",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn list_all(&self) -> Result<Vec<UserRoleDetail>> {
        sqlx::query_as::<_, UserRoleDetail>(
            "SELECT ur.id, ur.user_id, ur.role_id, u.username, u.email, r.role_name \
             FROM user_roles ur \
             JOIN users u ON u.id = ur.user_id \
             JOIN roles r ON r.id = ur.role_id \
             ORDER BY u.username, r.role_name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_role_list() {
        for name in ["User", "Admin", "Manager"] {
            assert!(is_protected_role(name));
        }
        assert!(!is_protected_role("Analyst"));
        // Case-sensitive: only the exact seeded spellings are protected.
        assert!(!is_protected_role("admin"));
    }
}
