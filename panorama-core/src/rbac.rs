//! Row-level access control.
//!
//! Cached row sets are organization-agnostic; the caller's [`RbacScope`] is
//! applied on every read. The filter fails closed: a row without a readable
//! organization identifier is dropped, and an empty scope yields no rows.

use crate::row::{scalar_key, RawRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// The set of organizations a caller may read rows for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "organizations", rename_all = "snake_case")]
pub enum RbacScope {
    /// Explicit set of accessible organization identifiers.
    Organizations(BTreeSet<String>),
    /// Every organization. Only for explicitly privileged callers.
    AllOrganizations,
}

impl RbacScope {
    /// Scope limited to the given organization identifiers.
    pub fn organizations<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Organizations(ids.into_iter().map(Into::into).collect())
    }

    /// A scope that can see nothing.
    pub fn empty() -> Self {
        Self::Organizations(BTreeSet::new())
    }

    /// Whether the scope grants access to at least one organization.
    pub fn is_resolvable(&self) -> bool {
        match self {
            Self::Organizations(ids) => !ids.is_empty(),
            Self::AllOrganizations => true,
        }
    }

    /// Whether a row carrying `organization` as its identifier is visible.
    pub fn permits(&self, organization: &Value) -> bool {
        let Some(key) = scalar_key(organization) else {
            return false;
        };
        self.permits_id(&key)
    }

    pub fn permits_id(&self, organization_id: &str) -> bool {
        match self {
            Self::Organizations(ids) => ids.contains(organization_id),
            Self::AllOrganizations => true,
        }
    }

    /// Whether `row` is visible, reading its identifier from `rbac_column`.
    ///
    /// Rows without a scalar identifier are never visible.
    pub fn permits_row(&self, row: &RawRow, rbac_column: &str) -> bool {
        row.get(rbac_column).is_some_and(|org| self.permits(org))
    }

    /// Short description for logs; never lists identifiers.
    pub fn describe(&self) -> String {
        match self {
            Self::Organizations(ids) => format!("{} organizations", ids.len()),
            Self::AllOrganizations => "all organizations".to_string(),
        }
    }
}

/// Drop every row whose `rbac_column` value is outside `scope`.
pub fn filter_rows(rows: Vec<RawRow>, scope: &RbacScope, rbac_column: &str) -> Vec<RawRow> {
    if !scope.is_resolvable() {
        return Vec::new();
    }
    rows.into_iter()
        .filter(|row| scope.permits_row(row, rbac_column))
        .collect()
}
