use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from its stored integer value.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the stored integer value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a registered database connection.
    DatabaseId
);
numeric_id!(
    /// Identifier of a dataset (a table registered for exploration).
    DatasetId
);
numeric_id!(
    /// Identifier of a saved chart.
    ChartId
);
numeric_id!(
    /// Identifier of a dashboard.
    DashboardId
);
numeric_id!(
    /// Identifier of a registered user.
    UserId
);
numeric_id!(
    /// Identifier of a role.
    RoleId
);
numeric_id!(
    /// Identifier of a grant row in the permission registry.
    GrantId
);
numeric_id!(
    /// Identifier of a row-level-security rule.
    RlsRuleId
);
