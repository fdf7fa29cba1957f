use vizgate_core::AppResult;
use vizgate_domain::{DatasetRecord, Principal, RlsFilter, combine_rls_clauses};

use super::AccessService;

impl AccessService {
    /// Returns the row-level-security filters applied to `dataset` for the
    /// principal.
    ///
    /// Stored rules come first, ordered by rule id; guest-token clauses for
    /// the dataset follow in token order.
    pub async fn get_rls_filters(
        &self,
        principal: &Principal,
        dataset: &DatasetRecord,
    ) -> AppResult<Vec<RlsFilter>> {
        let role_ids = self.resolve_access(principal).await?.role_ids;

        let mut rules: Vec<_> = self
            .rls_rules
            .list_rules_for_dataset(dataset.id())
            .await?
            .into_iter()
            .filter(|rule| rule.applies_to(dataset.id(), &role_ids))
            .collect();
        rules.sort_by_key(|rule| rule.id());

        let mut filters: Vec<RlsFilter> = rules.iter().map(RlsFilter::from_rule).collect();
        if let Some(guest) = principal.as_guest() {
            filters.extend(
                guest
                    .rls_rules()
                    .iter()
                    .filter(|rule| rule.applies_to(dataset.id()))
                    .map(|rule| RlsFilter::guest(rule.clause.as_str())),
            );
        }

        Ok(filters)
    }

    /// Returns the ordered cache-key tokens of the principal's filters.
    pub async fn get_rls_cache_key(
        &self,
        principal: &Principal,
        dataset: &DatasetRecord,
    ) -> AppResult<Vec<String>> {
        Ok(self
            .get_rls_filters(principal, dataset)
            .await?
            .iter()
            .map(RlsFilter::cache_key_token)
            .collect())
    }

    /// Returns the combined predicate to AND into queries on `dataset`.
    pub async fn get_rls_clause(
        &self,
        principal: &Principal,
        dataset: &DatasetRecord,
    ) -> AppResult<Option<String>> {
        let filters = self.get_rls_filters(principal, dataset).await?;
        Ok(combine_rls_clauses(&filters))
    }
}
