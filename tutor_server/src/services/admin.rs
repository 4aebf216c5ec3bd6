use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tutor_core::User;
use utoipa::ToSchema;

use crate::error::AppError;

use super::UserService;

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonateUser {
    pub user_id: i64,
}

/// Admin console operations. Session tokens are minted by the caller;
/// this service only decides who a new session should belong to.
#[derive(Clone)]
pub(crate) struct AdminService {
    user_svc: Arc<UserService>,
}

impl AdminService {
    pub fn new(user_svc: UserService) -> Self {
        Self {
            user_svc: Arc::new(user_svc),
        }
    }

    /// Check the caller holds the admin designation in the store, not just
    /// in a possibly stale token.
    pub async fn ensure_admin(&self, caller: &User) -> Result<(), AppError> {
        if caller.is_impersonating() || !self.user_svc.is_admin(caller.id).await? {
            warn!("user {} is not allowed to use the admin console", caller.id);
            return Err(AppError::PermissionDeny);
        }
        Ok(())
    }

    pub async fn list_users(&self, caller: &User) -> Result<Vec<User>, AppError> {
        self.ensure_admin(caller).await?;
        self.user_svc.fetch_all().await
    }

    /// Resolve the user an admin session should switch to.
    pub async fn start_impersonation(
        &self,
        caller: &User,
        input: ImpersonateUser,
    ) -> Result<User, AppError> {
        self.ensure_admin(caller).await?;
        if input.user_id == caller.id {
            return Err(AppError::InvalidInput(
                "cannot impersonate yourself".to_string(),
            ));
        }
        let target = match self.user_svc.find_by_id(input.user_id).await? {
            Some(target) => target,
            None => return Err(AppError::NotFound("user id not found".to_string())),
        };
        if target.role.is_admin() {
            return Err(AppError::PermissionDeny);
        }
        info!("admin {} starts impersonating user {}", caller.id, target.id);
        Ok(target)
    }

    /// Resolve the admin an impersonation session returns to.
    pub async fn stop_impersonation(&self, caller: &User) -> Result<User, AppError> {
        let Some(admin_id) = caller.impersonated_by else {
            return Err(AppError::InvalidInput(
                "session is not impersonating".to_string(),
            ));
        };
        let admin = match self.user_svc.find_by_id(admin_id).await? {
            Some(admin) => admin,
            None => return Err(AppError::NotFound("admin id not found".to_string())),
        };
        if !admin.role.is_admin() {
            return Err(AppError::PermissionDeny);
        }
        info!("admin {} stops impersonating user {}", admin.id, caller.id);
        Ok(admin)
    }
}

#[cfg(test)]
impl ImpersonateUser {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }
}

#[cfg(test)]
mod tests {
    use crate::test_util::get_test_pool;

    use super::*;
    use anyhow::Result;
    use tutor_core::UserRole;

    async fn new_svc() -> (sqlx_db_tester::TestPg, AdminService) {
        let (tdb, pool) = get_test_pool(None).await;
        (tdb, AdminService::new(UserService::new(pool)))
    }

    fn admin() -> User {
        User::new(1, "Alice", "alice@school.dev", UserRole::Admin)
    }

    #[tokio::test]
    async fn start_impersonation_should_work() -> Result<()> {
        let (_tdb, svc) = new_svc().await;
        let target = svc
            .start_impersonation(&admin(), ImpersonateUser::new(3))
            .await?;
        assert_eq!(target.id, 3);
        assert_eq!(target.role, UserRole::Student);
        Ok(())
    }

    #[tokio::test]
    async fn start_impersonation_without_admin_should_fail() -> Result<()> {
        let (_tdb, svc) = new_svc().await;
        let teacher = User::new(2, "Tom", "tom@school.dev", UserRole::Teacher);
        assert!(matches!(
            svc.start_impersonation(&teacher, ImpersonateUser::new(3)).await,
            Err(AppError::PermissionDeny)
        ));

        // a forged admin role in the token is not enough
        let forged = User::new(2, "Tom", "tom@school.dev", UserRole::Admin);
        assert!(matches!(
            svc.start_impersonation(&forged, ImpersonateUser::new(3)).await,
            Err(AppError::PermissionDeny)
        ));

        // nor is acting from inside an impersonation session
        let mut nested = admin();
        nested.impersonated_by = Some(1);
        assert!(matches!(
            svc.start_impersonation(&nested, ImpersonateUser::new(3)).await,
            Err(AppError::PermissionDeny)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn start_impersonation_with_bad_target_should_fail() -> Result<()> {
        let (_tdb, svc) = new_svc().await;
        assert!(matches!(
            svc.start_impersonation(&admin(), ImpersonateUser::new(1)).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            svc.start_impersonation(&admin(), ImpersonateUser::new(999)).await,
            Err(AppError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn stop_impersonation_should_restore_admin() -> Result<()> {
        let (_tdb, svc) = new_svc().await;
        let mut session = User::new(3, "Sara", "sara@school.dev", UserRole::Student);
        assert!(matches!(
            svc.stop_impersonation(&session).await,
            Err(AppError::InvalidInput(_))
        ));

        session.impersonated_by = Some(1);
        let admin = svc.stop_impersonation(&session).await?;
        assert_eq!(admin.id, 1);
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.impersonated_by, None);

        // the recorded impersonator must still be an admin
        session.impersonated_by = Some(2);
        assert!(matches!(
            svc.stop_impersonation(&session).await,
            Err(AppError::PermissionDeny)
        ));
        Ok(())
    }
}
