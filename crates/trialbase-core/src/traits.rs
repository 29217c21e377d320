//! Repository traits for trialbase abstractions.
//!
//! These traits define the seams between the HTTP layer and the PostgreSQL
//! implementations, enabling testability and alternative backends.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

/// Append-only audit log.
#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    /// Append one entry. Fails on storage errors; callers that must not let
    /// audit defects break the primary operation use [`log_non_fatal`].
    ///
    /// [`log_non_fatal`]: ActivityLogRepository::log_non_fatal
    async fn log(&self, entry: NewActivityEntry) -> Result<ActivityLogEntry>;

    /// Append one entry, swallowing failures. Returns `None` (after a WARN
    /// log) instead of an error so audit-logging defects never abort the
    /// triggering operation.
    async fn log_non_fatal(&self, entry: NewActivityEntry) -> Option<ActivityLogEntry>;

    /// All entries for one actor, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ActivityLogEntry>>;

    /// All entries, optionally filtered by table and/or action, newest first.
    async fn list_all(
        &self,
        table_name: Option<&str>,
        action_type: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>>;

    /// Remove every entry for a user. Only used by the hard user-deletion
    /// cascade; the log is otherwise immutable.
    async fn delete_by_user(&self, user_id: Uuid) -> Result<u64>;
}

/// Approval queue for proposed mutations.
#[async_trait]
pub trait PendingChangeRepository: Send + Sync {
    async fn submit(&self, req: SubmitChangeRequest) -> Result<PendingChange>;

    async fn find_all(&self, filter: PendingChangeFilter) -> Result<Vec<PendingChange>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PendingChange>>;

    /// Mark approved. Clears any prior rejection state. Returns `None` when
    /// the change does not exist.
    async fn approve(&self, id: Uuid, approved_by: Uuid) -> Result<Option<PendingChange>>;

    /// Mark rejected with an optional free-text reason.
    async fn reject(
        &self,
        id: Uuid,
        approved_by: Uuid,
        reason: Option<&str>,
    ) -> Result<Option<PendingChange>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// User CRUD.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, req: CreateUserRequest) -> Result<User>;

    async fn find_all(&self) -> Result<Vec<User>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// Role CRUD.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role_name: &str) -> Result<Role>;

    async fn find_all(&self) -> Result<Vec<Role>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>>;

    async fn find_by_name(&self, role_name: &str) -> Result<Option<Role>>;

    async fn update(&self, id: Uuid, role_name: &str) -> Result<Option<Role>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

/// User-role assignments (many-to-many).
#[async_trait]
pub trait UserRoleRepository: Send + Sync {
    /// Insert an assignment. Returns `None` when the pair already exists.
    async fn assign(&self, user_id: Uuid, role_id: Uuid) -> Result<Option<UserRoleAssignment>>;

    async fn remove(&self, user_id: Uuid, role_id: Uuid) -> Result<bool>;

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<UserRoleWithName>>;

    async fn users_with_role(&self, role_id: Uuid) -> Result<Vec<UserRoleAssignment>>;

    async fn list_all(&self) -> Result<Vec<UserRoleDetail>>;

    /// Remove every assignment for a user (hard user-deletion cascade).
    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;
}
