pub mod errors;
pub mod loader;
pub mod parser;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::groups::{GroupTree, LookupError};
use errors::RuleError;
use types::{distinct, Rule, RuleDef};

/// Validated, immutable set of sync rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    pub fn from_defs(defs: &[RuleDef]) -> Result<Self, RuleError> {
        let rules = defs
            .iter()
            .enumerate()
            .map(|(i, def)| types::validate(def, i).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Distinct group keys referenced by any rule.
    pub fn all_groups(&self) -> Vec<String> {
        let all: Vec<String> = self.rules.iter().flat_map(|r| r.groups.clone()).collect();
        distinct(&all)
    }

    /// Distinct user keys listed directly on any rule.
    pub fn all_users(&self) -> Vec<String> {
        let all: Vec<String> = self.rules.iter().flat_map(|r| r.users.clone()).collect();
        distinct(&all)
    }
}

/// Users a rule applies to: everyone reachable from its groups plus its
/// literal users. Groups that fail to resolve are logged and skipped, except
/// for fatal lookup errors which are returned.
pub async fn resolve_affected_users(
    rule: &Rule,
    tree: &mut GroupTree,
) -> Result<BTreeSet<String>, LookupError> {
    let mut users = BTreeSet::new();

    for group_key in &rule.groups {
        if let Err(err) = tree.resolve_group(group_key).await {
            if err.is_fatal() {
                return Err(err);
            }
            tracing::error!(
                group = %group_key,
                rule = %rule.describe(),
                "unable to get group: {err}"
            );
            continue;
        }
        users.extend(tree.all_users(group_key).into_iter().map(|u| u.email.clone()));
    }

    users.extend(rule.users.iter().cloned());
    Ok(users)
}
