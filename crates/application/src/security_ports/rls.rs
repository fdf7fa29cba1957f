use async_trait::async_trait;

use vizgate_core::AppResult;
use vizgate_domain::{DatasetId, RowLevelSecurityRule};

/// Read port for administrator-defined row-level-security rules.
#[async_trait]
pub trait RlsRuleRepository: Send + Sync {
    /// Lists rules applicable to one dataset, in any order.
    async fn list_rules_for_dataset(
        &self,
        dataset_id: DatasetId,
    ) -> AppResult<Vec<RowLevelSecurityRule>>;
}
