use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vizgate_core::{AppError, AppResult, NonEmptyString};

use crate::{DatasetId, RlsRuleId, RoleId};

/// How a row-level-security rule relates to the roles it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RlsFilterType {
    /// Applies to principals holding one of the rule's roles.
    Regular,
    /// Applies to principals holding none of the rule's roles.
    Base,
}

impl RlsFilterType {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "Regular",
            Self::Base => "Base",
        }
    }
}

impl FromStr for RlsFilterType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Regular" => Ok(Self::Regular),
            "Base" => Ok(Self::Base),
            _ => Err(AppError::Validation(format!(
                "unknown row level security filter type '{value}'"
            ))),
        }
    }
}

/// An administrator-defined row-level-security rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLevelSecurityRule {
    id: RlsRuleId,
    filter_type: RlsFilterType,
    clause: NonEmptyString,
    group_key: Option<String>,
    roles: BTreeSet<RoleId>,
    datasets: BTreeSet<DatasetId>,
}

impl RowLevelSecurityRule {
    /// Creates a validated rule.
    pub fn new(
        id: RlsRuleId,
        filter_type: RlsFilterType,
        clause: impl Into<String>,
        group_key: Option<String>,
        roles: BTreeSet<RoleId>,
        datasets: BTreeSet<DatasetId>,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            filter_type,
            clause: NonEmptyString::new(clause)?,
            group_key: group_key.filter(|value| !value.trim().is_empty()),
            roles,
            datasets,
        })
    }

    /// Returns the rule identifier.
    #[must_use]
    pub fn id(&self) -> RlsRuleId {
        self.id
    }

    /// Returns the filter type.
    #[must_use]
    pub fn filter_type(&self) -> RlsFilterType {
        self.filter_type
    }

    /// Returns the SQL predicate.
    #[must_use]
    pub fn clause(&self) -> &str {
        self.clause.as_str()
    }

    /// Returns the group key; rules sharing one are ORed together.
    #[must_use]
    pub fn group_key(&self) -> Option<&str> {
        self.group_key.as_deref()
    }

    /// Returns the roles the rule names.
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<RoleId> {
        &self.roles
    }

    /// Returns the datasets the rule applies to.
    #[must_use]
    pub fn datasets(&self) -> &BTreeSet<DatasetId> {
        &self.datasets
    }

    /// Returns whether a principal holding `principal_roles` gets this rule
    /// applied on `dataset_id`.
    #[must_use]
    pub fn applies_to(&self, dataset_id: DatasetId, principal_roles: &BTreeSet<RoleId>) -> bool {
        if !self.datasets.contains(&dataset_id) {
            return false;
        }

        let holds_rule_role = !self.roles.is_disjoint(principal_roles);
        match self.filter_type {
            RlsFilterType::Regular => holds_rule_role,
            RlsFilterType::Base => !holds_rule_role,
        }
    }
}

/// A resolved filter ready to be applied to a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RlsFilter {
    /// Source rule, or `None` for clauses carried by a guest token.
    pub rule_id: Option<RlsRuleId>,
    /// SQL predicate.
    pub clause: String,
    /// Group key for OR-combination.
    pub group_key: Option<String>,
}

impl RlsFilter {
    /// Builds the filter for a stored rule.
    #[must_use]
    pub fn from_rule(rule: &RowLevelSecurityRule) -> Self {
        Self {
            rule_id: Some(rule.id()),
            clause: rule.clause().to_owned(),
            group_key: rule.group_key().map(str::to_owned),
        }
    }

    /// Builds the filter for a guest-token clause.
    #[must_use]
    pub fn guest(clause: impl Into<String>) -> Self {
        Self {
            rule_id: None,
            clause: clause.into(),
            group_key: None,
        }
    }

    /// Returns the cache-key token for this filter.
    #[must_use]
    pub fn cache_key_token(&self) -> String {
        match self.rule_id {
            Some(_) => format!(
                "{}-{}",
                self.clause,
                self.group_key.as_deref().unwrap_or_default()
            ),
            None => self.clause.clone(),
        }
    }
}

/// Combines filters into one SQL predicate.
///
/// Clauses sharing a group key are ORed; groups, ungrouped clauses and guest
/// clauses are ANDed. Returns `None` when there is nothing to apply.
#[must_use]
pub fn combine_rls_clauses(filters: &[RlsFilter]) -> Option<String> {
    let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut conjuncts = Vec::new();

    for filter in filters {
        match filter.group_key.as_deref() {
            Some(group_key) => grouped
                .entry(group_key)
                .or_default()
                .push(filter.clause.as_str()),
            None => conjuncts.push(format!("({})", filter.clause)),
        }
    }

    for clauses in grouped.values() {
        let disjunction = clauses
            .iter()
            .map(|clause| format!("({clause})"))
            .collect::<Vec<_>>()
            .join(" OR ");
        conjuncts.push(format!("({disjunction})"));
    }

    (!conjuncts.is_empty()).then(|| conjuncts.join(" AND "))
}
