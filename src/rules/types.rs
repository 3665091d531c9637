use crate::matcher::Matcher;
use crate::role::Role;
use crate::rules::errors::RuleError;

/// A rule as written in the rule file, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDef {
    /// Role literal, e.g. "Editor"
    pub role: String,
    pub groups: Vec<String>,
    pub users: Vec<String>,
    /// Org names or `/regex/` patterns
    pub orgs: Vec<String>,
    pub note: Option<String>,
}

/// A validated rule: who gets which role in which organizations.
#[derive(Debug, Clone)]
pub struct Rule {
    pub groups: Vec<String>,
    pub users: Vec<String>,
    pub orgs: Vec<Matcher>,
    pub role: Role,
    pub note: Option<String>,
    /// Position in the rule file, for diagnostics only
    pub index: usize,
}

impl Rule {
    /// Literal equality for plain matchers, regex search for `/.../` matchers.
    pub fn matches_org(&self, org_name: &str) -> bool {
        self.orgs.iter().any(|m| m.is_match(org_name))
    }

    /// Short human readable identification for logs.
    pub fn describe(&self) -> String {
        match &self.note {
            Some(note) => format!("rule #{} ({}): {}", self.index, self.role, note),
            None => format!("rule #{} ({})", self.index, self.role),
        }
    }
}

/// Validate a parsed rule and compile its org matchers.
pub fn validate(def: &RuleDef, index: usize) -> Result<Rule, RuleError> {
    let role: Role = def.role.parse()?;
    if !role.is_assignable() {
        return Err(RuleError::InvalidRole(def.role.clone()));
    }

    if def.orgs.is_empty() {
        return Err(RuleError::InvalidRule(format!(
            "rule #{index} ({role}) does not name any organization"
        )));
    }

    let orgs = def
        .orgs
        .iter()
        .map(|raw| {
            Matcher::parse(raw).map_err(|e| RuleError::InvalidPattern {
                pattern: raw.clone(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Rule {
        groups: distinct(&def.groups),
        users: distinct(&def.users),
        orgs,
        role,
        note: def.note.clone(),
        index,
    })
}

/// Remove duplicates, keeping first occurrence order.
pub(crate) fn distinct(items: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .cloned()
        .collect()
}
