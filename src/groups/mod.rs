pub mod directory;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::matcher::Matcher;
use directory::{DirectoryError, DirectoryProvider, MemberKind};

#[derive(Debug, Error, Diagnostic)]
pub enum LookupError {
    #[error("Group `{key}` is blacklisted by `{pattern}`")]
    #[diagnostic(code(permsync::groups::blacklisted))]
    Blacklisted { key: String, pattern: String },

    #[error("Failed to fetch members of group `{key}`")]
    #[diagnostic(code(permsync::groups::fetch))]
    Fetch {
        key: String,
        #[source]
        source: DirectoryError,
    },

    #[error("Group `{group}` contains member `{email}` of unexpected type `{kind}`")]
    #[diagnostic(
        code(permsync::groups::unexpected_member),
        help("Only USER and GROUP members can be synchronized")
    )]
    UnexpectedMember {
        group: String,
        kind: String,
        email: String,
    },
}

impl LookupError {
    /// The directory returned data this process cannot interpret. Planning on
    /// top of such a group would treat its members as absent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LookupError::UnexpectedMember { .. })
    }
}

/// A resolved group. Children and members are referenced by key into the
/// owning [`GroupTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    pub subgroups: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub email: String,
}

/// Lazily filled cache of directory groups.
///
/// Each group key is fetched at most once per cache generation; [`GroupTree::clear`]
/// starts a new generation. A group entry is inserted before its sub-groups are
/// expanded, so membership cycles terminate on the cache check.
pub struct GroupTree {
    directory: Arc<dyn DirectoryProvider>,
    blacklist: Vec<Matcher>,
    groups: HashMap<String, Group>,
    users: HashMap<String, User>,
}

impl GroupTree {
    pub fn new(directory: Arc<dyn DirectoryProvider>, blacklist: Vec<Matcher>) -> Self {
        Self {
            directory,
            blacklist,
            groups: HashMap::new(),
            users: HashMap::new(),
        }
    }

    /// Drop every cached group and user.
    pub fn clear(&mut self) {
        self.groups.clear();
        self.users.clear();
    }

    pub fn set_blacklist(&mut self, blacklist: Vec<Matcher>) {
        self.blacklist = blacklist;
    }

    pub fn blacklisted_by(&self, key: &str) -> Option<&Matcher> {
        self.blacklist.iter().find(|m| m.is_match(key))
    }

    pub fn group(&self, key: &str) -> Option<&Group> {
        self.groups.get(key)
    }

    pub fn cached_group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn cached_user_count(&self) -> usize {
        self.users.len()
    }

    /// Resolve a group and, transitively, all of its sub-groups.
    ///
    /// Errors for `key` itself are returned. Sub-groups that are blacklisted or
    /// cannot be fetched are logged and left out of their parent. A sub-group
    /// with an unexpected member kind fails the whole resolution, and nothing
    /// fetched by this call stays cached.
    pub async fn resolve_group(&mut self, key: &str) -> Result<&Group, LookupError> {
        if !self.groups.contains_key(key) {
            let children = self.fetch_into_cache(key).await?;
            let mut fetched = vec![key.to_string()];

            // (parent, child) pairs still to resolve; depth first like a recursive walk
            let mut stack: Vec<(String, String)> = children
                .into_iter()
                .rev()
                .map(|child| (key.to_string(), child))
                .collect();

            while let Some((parent, child)) = stack.pop() {
                if self.groups.contains_key(&child) {
                    continue;
                }
                match self.fetch_into_cache(&child).await {
                    Ok(grandchildren) => {
                        fetched.push(child.clone());
                        stack.extend(
                            grandchildren
                                .into_iter()
                                .rev()
                                .map(|gc| (child.clone(), gc)),
                        );
                    }
                    Err(err) if err.is_fatal() => {
                        for k in &fetched {
                            self.groups.remove(k);
                        }
                        return Err(err);
                    }
                    Err(err) => {
                        match &err {
                            LookupError::Fetch { source, .. } => {
                                tracing::warn!(group = %child, parent = %parent, error = %source, "{err}");
                            }
                            _ => tracing::info!(group = %child, parent = %parent, "{err}"),
                        }
                        if let Some(p) = self.groups.get_mut(&parent) {
                            p.subgroups.retain(|k| k != &child);
                        }
                    }
                }
            }
        }

        Ok(&self.groups[key])
    }

    /// Fetch the direct members of one group and cache it. Returns the keys of
    /// sub-groups that are not cached yet.
    async fn fetch_into_cache(&mut self, key: &str) -> Result<Vec<String>, LookupError> {
        if let Some(m) = self.blacklisted_by(key) {
            return Err(LookupError::Blacklisted {
                key: key.to_string(),
                pattern: m.to_string(),
            });
        }

        let members = self
            .directory
            .list_members(key)
            .await
            .map_err(|source| LookupError::Fetch {
                key: key.to_string(),
                source,
            })?;

        let mut group = Group {
            key: key.to_string(),
            subgroups: Vec::new(),
            users: Vec::new(),
        };

        for member in members {
            match member.kind {
                MemberKind::Group => {
                    if !group.subgroups.contains(&member.email) {
                        group.subgroups.push(member.email);
                    }
                }
                MemberKind::User => {
                    self.users
                        .entry(member.email.clone())
                        .or_insert_with(|| User {
                            email: member.email.clone(),
                        });
                    if !group.users.contains(&member.email) {
                        group.users.push(member.email);
                    }
                }
                MemberKind::Other(kind) => {
                    return Err(LookupError::UnexpectedMember {
                        group: key.to_string(),
                        kind,
                        email: member.email,
                    });
                }
            }
        }

        let pending = group
            .subgroups
            .iter()
            .filter(|k| !self.groups.contains_key(k.as_str()))
            .cloned()
            .collect();

        tracing::debug!(
            group = %key,
            users = group.users.len(),
            subgroups = group.subgroups.len(),
            "Fetched group members"
        );
        self.groups.insert(key.to_string(), group);

        Ok(pending)
    }

    /// Every user reachable from `key`, each reported once, in breadth-first
    /// discovery order. Groups that are not cached contribute nothing.
    pub fn all_users(&self, key: &str) -> Vec<&User> {
        let mut result = Vec::new();
        let mut seen_groups: HashSet<&str> = HashSet::new();
        let mut seen_users: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([key]);

        while let Some(current) = queue.pop_front() {
            if !seen_groups.insert(current) {
                continue;
            }
            let Some(group) = self.groups.get(current) else {
                continue;
            };

            for email in &group.users {
                if seen_users.insert(email.as_str()) {
                    if let Some(user) = self.users.get(email) {
                        result.push(user);
                    }
                }
            }
            for sub in &group.subgroups {
                if !seen_groups.contains(sub.as_str()) {
                    queue.push_back(sub.as_str());
                }
            }
        }

        result
    }
}
