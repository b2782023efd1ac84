//! Permission table primitives: features, actions and their union algebra.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use leadworks_core::AppError;
use serde::{Deserialize, Serialize};

/// Application capability areas that permissions are scoped to.
///
/// The set is closed: callers validate free-form feature strings at the
/// boundary, and an unknown string resolves to "no permission entry".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Lead records and lead conversion.
    LeadManagement,
    /// Contact records.
    ContactManagement,
    /// Account records.
    AccountManagement,
    /// Opportunity records and pipeline stages.
    OpportunityManagement,
    /// Tasks, calls and meetings.
    ActivityManagement,
    /// Reports and statistics views.
    ReportManagement,
    /// User administration.
    UserManagement,
    /// Role administration.
    RoleManagement,
    /// Group administration.
    GroupManagement,
}

impl Feature {
    /// Returns a stable storage value for this feature.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadManagement => "lead_management",
            Self::ContactManagement => "contact_management",
            Self::AccountManagement => "account_management",
            Self::OpportunityManagement => "opportunity_management",
            Self::ActivityManagement => "activity_management",
            Self::ReportManagement => "report_management",
            Self::UserManagement => "user_management",
            Self::RoleManagement => "role_management",
            Self::GroupManagement => "group_management",
        }
    }

    /// Returns all known features.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Feature] = &[
            Feature::LeadManagement,
            Feature::ContactManagement,
            Feature::AccountManagement,
            Feature::OpportunityManagement,
            Feature::ActivityManagement,
            Feature::ReportManagement,
            Feature::UserManagement,
            Feature::RoleManagement,
            Feature::GroupManagement,
        ];

        ALL
    }
}

impl FromStr for Feature {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "lead_management" => Ok(Self::LeadManagement),
            "contact_management" => Ok(Self::ContactManagement),
            "account_management" => Ok(Self::AccountManagement),
            "opportunity_management" => Ok(Self::OpportunityManagement),
            "activity_management" => Ok(Self::ActivityManagement),
            "report_management" => Ok(Self::ReportManagement),
            "user_management" => Ok(Self::UserManagement),
            "role_management" => Ok(Self::RoleManagement),
            "group_management" => Ok(Self::GroupManagement),
            _ => Err(AppError::Validation(format!(
                "unknown feature value '{value}'"
            ))),
        }
    }
}

/// Actions that can be granted per feature.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create new records.
    Create,
    /// Read records.
    Read,
    /// Update existing records.
    Update,
    /// Delete records.
    Delete,
    /// Convert a record into another kind (e.g. lead to opportunity).
    Convert,
    /// Bulk import records.
    Import,
    /// Bulk export records.
    Export,
    /// Superset grant: implies every other action for the feature.
    Manage,
}

impl ActionKind {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Convert => "convert",
            Self::Import => "import",
            Self::Export => "export",
            Self::Manage => "manage",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ActionKind] = &[
            ActionKind::Create,
            ActionKind::Read,
            ActionKind::Update,
            ActionKind::Delete,
            ActionKind::Convert,
            ActionKind::Import,
            ActionKind::Export,
            ActionKind::Manage,
        ];

        ALL
    }
}

impl FromStr for ActionKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "read" => Ok(Self::Read),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "convert" => Ok(Self::Convert),
            "import" => Ok(Self::Import),
            "export" => Ok(Self::Export),
            "manage" => Ok(Self::Manage),
            _ => Err(AppError::Validation(format!(
                "unknown action value '{value}'"
            ))),
        }
    }
}

/// Mapping from feature to the set of granted actions.
///
/// At most one entry exists per feature; repeated grants accumulate into the
/// per-feature action set. Merging two tables is a per-feature set union,
/// which makes resolution order-independent across permission sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable(BTreeMap<Feature, BTreeSet<ActionKind>>);

impl PermissionTable {
    /// Creates an empty permission table.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Unions the given actions into the feature's grant set.
    pub fn grant(&mut self, feature: Feature, actions: impl IntoIterator<Item = ActionKind>) {
        self.0.entry(feature).or_default().extend(actions);
    }

    /// Builds a table from `(feature, actions)` pairs.
    #[must_use]
    pub fn from_grants<A>(grants: impl IntoIterator<Item = (Feature, A)>) -> Self
    where
        A: IntoIterator<Item = ActionKind>,
    {
        let mut table = Self::new();
        for (feature, actions) in grants {
            table.grant(feature, actions);
        }
        table
    }

    /// Unions another table into this one.
    pub fn merge_from(&mut self, other: &Self) {
        for (feature, actions) in &other.0 {
            self.0.entry(*feature).or_default().extend(actions.iter().copied());
        }
    }

    /// Returns the union of two tables.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        merged.merge_from(other);
        merged
    }

    /// Returns whether the table grants `action` on `feature`.
    ///
    /// `Manage` on a feature implies every other action for that feature.
    /// An absent feature grants nothing.
    #[must_use]
    pub fn allows(&self, feature: Feature, action: ActionKind) -> bool {
        self.0
            .get(&feature)
            .is_some_and(|actions| actions.contains(&action) || actions.contains(&ActionKind::Manage))
    }

    /// Returns the granted action set for a feature, if any.
    #[must_use]
    pub fn actions_for(&self, feature: Feature) -> Option<&BTreeSet<ActionKind>> {
        self.0.get(&feature)
    }

    /// Returns whether the table holds no grants at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(feature, actions)` entries in stable feature order.
    pub fn entries(&self) -> impl Iterator<Item = (Feature, &BTreeSet<ActionKind>)> {
        self.0.iter().map(|(feature, actions)| (*feature, actions))
    }
}
