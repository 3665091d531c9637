//! In-memory providers for unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::console::{ConsoleError, ConsoleProvider, ConsoleUser, OrgSummary, OrgUser};
use crate::groups::directory::{DirectoryError, DirectoryProvider, GroupSummary, Member, MemberKind};
use crate::plan::Organization;
use crate::role::Role;

pub(crate) fn user(id: i64, email: &str) -> ConsoleUser {
    ConsoleUser {
        id,
        email: email.to_string(),
        login: email.to_string(),
    }
}

pub(crate) fn org(id: i64, name: &str, members: &[(i64, &str, Role)]) -> Organization {
    Organization {
        id,
        name: name.to_string(),
        members: members
            .iter()
            .map(|(user_id, email, role)| OrgUser {
                user_id: *user_id,
                email: email.to_string(),
                login: email.to_string(),
                role: *role,
            })
            .collect(),
    }
}

#[derive(Default)]
pub(crate) struct MockDirectory {
    groups: HashMap<String, Vec<Member>>,
    failures: Mutex<HashMap<String, DirectoryError>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_group(mut self, key: &str, members: Vec<Member>) -> Self {
        self.groups.insert(key.to_string(), members);
        self
    }

    pub(crate) fn fail(&self, key: &str, err: DirectoryError) {
        self.failures.lock().unwrap().insert(key.to_string(), err);
    }

    pub(crate) fn heal(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    pub(crate) fn calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DirectoryProvider for MockDirectory {
    async fn list_members(&self, group_key: &str) -> Result<Vec<Member>, DirectoryError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(group_key.to_string())
            .or_default() += 1;

        if let Some(err) = self.failures.lock().unwrap().get(group_key) {
            return Err(err.clone());
        }
        self.groups
            .get(group_key)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(group_key.to_string()))
    }

    async fn list_user_groups(&self, user_key: &str) -> Result<Vec<GroupSummary>, DirectoryError> {
        let mut found: Vec<GroupSummary> = self
            .groups
            .iter()
            .filter(|(_, members)| {
                members
                    .iter()
                    .any(|m| m.kind == MemberKind::User && m.email == user_key)
            })
            .map(|(key, _)| GroupSummary {
                name: key.clone(),
                email: key.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(found)
    }
}

/// Console call as recorded by [`MockConsole`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ConsoleCall {
    Add(i64, String, Role),
    Remove(i64, i64),
    Update(i64, i64, Role),
}

#[derive(Default)]
pub(crate) struct MockConsole {
    users: Vec<ConsoleUser>,
    orgs: Vec<Organization>,
    calls: Mutex<Vec<ConsoleCall>>,
    reads: Mutex<usize>,
    /// Write calls touching these org ids fail
    failing_orgs: Mutex<Vec<i64>>,
    /// `list_org_users` fails for these org ids
    unreadable_orgs: Mutex<Vec<i64>>,
}

impl MockConsole {
    pub(crate) fn new(users: Vec<ConsoleUser>, orgs: Vec<Organization>) -> Self {
        Self {
            users,
            orgs,
            ..Default::default()
        }
    }

    pub(crate) fn fail_writes_to(&self, org_id: i64) {
        self.failing_orgs.lock().unwrap().push(org_id);
    }

    pub(crate) fn fail_reads_of(&self, org_id: i64) {
        self.unreadable_orgs.lock().unwrap().push(org_id);
    }

    pub(crate) fn calls(&self) -> Vec<ConsoleCall> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }

    fn record(&self, org_id: i64, call: ConsoleCall) -> Result<(), ConsoleError> {
        self.calls.lock().unwrap().push(call);
        if self.failing_orgs.lock().unwrap().contains(&org_id) {
            return Err(ConsoleError::Remote {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConsoleProvider for MockConsole {
    async fn list_all_users(&self) -> Result<Vec<ConsoleUser>, ConsoleError> {
        *self.reads.lock().unwrap() += 1;
        Ok(self.users.clone())
    }

    async fn list_orgs(&self) -> Result<Vec<OrgSummary>, ConsoleError> {
        *self.reads.lock().unwrap() += 1;
        Ok(self
            .orgs
            .iter()
            .map(|o| OrgSummary {
                id: o.id,
                name: o.name.clone(),
            })
            .collect())
    }

    async fn list_org_users(&self, org_id: i64) -> Result<Vec<OrgUser>, ConsoleError> {
        *self.reads.lock().unwrap() += 1;
        if self.unreadable_orgs.lock().unwrap().contains(&org_id) {
            return Err(ConsoleError::Transport("connection reset".to_string()));
        }
        self.orgs
            .iter()
            .find(|o| o.id == org_id)
            .map(|o| o.members.clone())
            .ok_or(ConsoleError::Remote {
                status: 404,
                message: "Organization not found".to_string(),
            })
    }

    async fn add_org_user(&self, org_id: i64, email: &str, role: Role) -> Result<(), ConsoleError> {
        self.record(org_id, ConsoleCall::Add(org_id, email.to_string(), role))
    }

    async fn remove_org_user(&self, org_id: i64, user_id: i64) -> Result<(), ConsoleError> {
        self.record(org_id, ConsoleCall::Remove(org_id, user_id))
    }

    async fn update_org_user(&self, org_id: i64, user_id: i64, role: Role) -> Result<(), ConsoleError> {
        self.record(org_id, ConsoleCall::Update(org_id, user_id, role))
    }
}
