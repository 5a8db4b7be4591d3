use std::sync::Arc;

use crate::auth::RequestIdentity;
use crate::domain::DashboardStats;
use crate::error::AppError;
use crate::ports::{LocationDirectory, TransactionRepository, UserDirectory};

pub const MANAGER_ROLE: &str = "Manager";

/// Sales figures over successful transactions. The caller's role is always
/// resolved through the User service, never trusted from headers.
pub struct Dashboard {
    users: Arc<dyn UserDirectory>,
    merchants: Arc<dyn LocationDirectory>,
    transactions: Arc<dyn TransactionRepository>,
}

impl Dashboard {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        merchants: Arc<dyn LocationDirectory>,
        transactions: Arc<dyn TransactionRepository>,
    ) -> Self {
        Self {
            users,
            merchants,
            transactions,
        }
    }

    pub async fn global(&self, caller: &RequestIdentity) -> Result<DashboardStats, AppError> {
        let user = self.users.get_user(caller.user_id).await?;
        if !user.has_role(MANAGER_ROLE) {
            return Err(AppError::Forbidden("Manager role required".to_string()));
        }

        Ok(self.transactions.dashboard_stats(None).await?)
    }

    pub async fn for_merchant(
        &self,
        caller: &RequestIdentity,
        merchant_id: i64,
    ) -> Result<DashboardStats, AppError> {
        let user = self.users.get_user(caller.user_id).await?;
        let merchant = self.merchants.get_location(merchant_id).await?;

        if merchant.keeper_id != Some(user.id) {
            tracing::warn!(
                user_id = user.id,
                merchant_id,
                "dashboard access denied, caller does not keep this merchant"
            );
            return Err(AppError::Forbidden(
                "Only the merchant's keeper can view this dashboard".to_string(),
            ));
        }

        Ok(self.transactions.dashboard_stats(Some(merchant_id)).await?)
    }
}
