//! Reconciliation planning: observed console state + rules + groups -> changes.
//!
//! A cycle goes through four stages:
//! 1. snapshot every console user and every organization with its members,
//! 2. seed a change for every (user, org) pair that grants nothing,
//! 3. let every rule raise the staged role of the pairs it addresses,
//! 4. drop no-ops and changes the policy forbids.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::console::{ConsoleError, ConsoleUser, OrgUser, RateLimitedConsole};
use crate::groups::{GroupTree, LookupError};
use crate::role::Role;
use crate::rules::types::Rule;
use crate::rules::{resolve_affected_users, RuleSet};
use crate::settings::SyncSettings;

/// Removals from this organization need `remove_from_main_org`.
pub const MAIN_ORG_ID: i64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub members: Vec<OrgUser>,
}

impl Organization {
    pub fn find_member(&self, email: &str) -> Option<&OrgUser> {
        self.members.iter().find(|m| m.email == email)
    }

    /// Observed role of a user, `Role::None` if not a member.
    pub fn role_of(&self, email: &str) -> Role {
        self.find_member(email).map(|m| m.role).unwrap_or(Role::None)
    }
}

/// Console state at the start of a cycle.
#[derive(Debug, Clone, Default)]
pub struct ConsoleSnapshot {
    pub users: Vec<ConsoleUser>,
    pub organizations: Vec<Arc<Organization>>,
}

/// Fetch all users and all organizations with their members. Any failure
/// aborts the whole snapshot.
pub async fn fetch_snapshot(console: &RateLimitedConsole) -> Result<ConsoleSnapshot, ConsoleError> {
    let users = console.list_all_users().await?;
    let mut orgs = console.list_orgs().await?;
    orgs.sort_by_key(|o| o.id);

    let mut organizations = Vec::with_capacity(orgs.len());
    for org in orgs {
        let members = console.list_org_users(org.id).await?;
        organizations.push(Arc::new(Organization {
            id: org.id,
            name: org.name,
            members,
        }));
    }

    tracing::debug!(
        users = users.len(),
        organizations = organizations.len(),
        "Fetched console snapshot"
    );

    Ok(ConsoleSnapshot {
        users,
        organizations,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Remove,
    Promote,
    Demote,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct UserRoleChange {
    pub organization: Arc<Organization>,
    pub old_role: Role,
    pub new_role: Role,
    /// Rule that granted `new_role`; `None` when no rule grants anything
    pub reason: Option<Arc<Rule>>,
}

impl UserRoleChange {
    pub fn kind(&self) -> ChangeKind {
        if self.old_role == self.new_role {
            ChangeKind::Unchanged
        } else if self.old_role == Role::None {
            ChangeKind::Add
        } else if self.new_role == Role::None {
            ChangeKind::Remove
        } else if self.new_role.is_higher_than(self.old_role) {
            ChangeKind::Promote
        } else {
            ChangeKind::Demote
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub email: String,
    pub changes: Vec<UserRoleChange>,
}

/// Policy filters applied to a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanPolicy {
    pub can_demote: bool,
    pub remove_from_main_org: bool,
}

impl From<&SyncSettings> for PlanPolicy {
    fn from(s: &SyncSettings) -> Self {
        Self {
            can_demote: s.can_demote,
            remove_from_main_org: s.remove_from_main_org,
        }
    }
}

impl PlanPolicy {
    fn keeps(&self, change: &UserRoleChange) -> bool {
        if change.old_role == change.new_role {
            return false;
        }
        if !self.can_demote && change.new_role.is_lower_than(change.old_role) {
            return false;
        }
        if change.organization.id == MAIN_ORG_ID
            && change.new_role == Role::None
            && !self.remove_from_main_org
        {
            return false;
        }
        true
    }
}

/// Changes to apply, one entry per affected user, sorted by email.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub updates: Vec<UserUpdate>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn affected_users(&self) -> usize {
        self.updates.len()
    }

    pub fn total_changes(&self) -> usize {
        self.updates.iter().map(|u| u.changes.len()).sum()
    }

    /// Flat `(email, org id, old role, new role)` view, sorted.
    pub fn entries(&self) -> Vec<(String, i64, Role, Role)> {
        let mut entries: Vec<_> = self
            .updates
            .iter()
            .flat_map(|u| {
                u.changes
                    .iter()
                    .map(|c| (u.email.clone(), c.organization.id, c.old_role, c.new_role))
            })
            .collect();
        entries.sort();
        entries
    }

    /// Log every change in a human readable form.
    pub fn log(&self) {
        tracing::info!(
            affected_users = self.affected_users(),
            total_changes = self.total_changes(),
            "Update plan"
        );

        for update in &self.updates {
            for change in &update.changes {
                let reason = change
                    .reason
                    .as_ref()
                    .map(|r| r.describe())
                    .unwrap_or_else(|| "no matching rule".to_string());
                let org = change.organization.name.as_str();
                match change.kind() {
                    ChangeKind::Add => tracing::info!(
                        user = %update.email, org, role = %change.new_role, reason,
                        "Add user to org"
                    ),
                    ChangeKind::Remove => tracing::info!(
                        user = %update.email, org, old_role = %change.old_role, reason,
                        "Remove user from org"
                    ),
                    ChangeKind::Promote => tracing::info!(
                        user = %update.email, org, old_role = %change.old_role, role = %change.new_role, reason,
                        "Promote user"
                    ),
                    ChangeKind::Demote => tracing::info!(
                        user = %update.email, org, old_role = %change.old_role, role = %change.new_role, reason,
                        "Demote user"
                    ),
                    ChangeKind::Unchanged => {}
                }
            }
        }
    }
}

/// Compute the changes that bring the console in line with the rules.
///
/// Fails without a plan when a group holds a member kind that cannot be
/// interpreted, since its users would otherwise be planned for removal.
pub async fn build_plan(
    snapshot: &ConsoleSnapshot,
    tree: &mut GroupTree,
    rules: &RuleSet,
    policy: PlanPolicy,
) -> Result<Plan, LookupError> {
    // seed: nobody is granted anything
    let mut staged: BTreeMap<String, Vec<UserRoleChange>> = BTreeMap::new();
    for user in &snapshot.users {
        staged.entry(user.email.clone()).or_insert_with(|| {
            snapshot
                .organizations
                .iter()
                .map(|org| UserRoleChange {
                    organization: org.clone(),
                    old_role: org.role_of(&user.email),
                    new_role: Role::None,
                    reason: None,
                })
                .collect()
        });
    }

    // rules: keep the highest role per (user, org)
    for rule in rules.iter() {
        let affected = resolve_affected_users(rule, tree).await?;
        for email in &affected {
            let Some(changes) = staged.get_mut(email) else {
                tracing::debug!(user = %email, rule = %rule.describe(), "user not known to the console, skipping");
                continue;
            };
            for change in changes.iter_mut() {
                if rule.matches_org(&change.organization.name)
                    && rule.role.is_higher_than(change.new_role)
                {
                    change.new_role = rule.role;
                    change.reason = Some(rule.clone());
                }
            }
        }
    }

    // filter
    let updates = staged
        .into_iter()
        .filter_map(|(email, changes)| {
            let changes: Vec<_> = changes.into_iter().filter(|c| policy.keeps(c)).collect();
            (!changes.is_empty()).then_some(UserUpdate { email, changes })
        })
        .collect();

    Ok(Plan { updates })
}
