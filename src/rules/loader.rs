use std::path::Path;

use crate::rules::errors::RuleError;
use crate::rules::parser::parse_kdl_rules;
use crate::rules::RuleSet;

/// Load and validate rules from a `.kdl` file, or from every `.kdl` file in a
/// directory (in file name order).
pub fn load_rules(path: &Path) -> Result<RuleSet, RuleError> {
    let files = if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .map_err(|source| RuleError::RuleLoad {
                path: path.display().to_string(),
                source,
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "kdl").unwrap_or(false))
            .collect();
        entries.sort();
        entries
    } else {
        vec![path.to_path_buf()]
    };

    let mut defs = Vec::new();
    for file in &files {
        let contents =
            std::fs::read_to_string(file).map_err(|source| RuleError::RuleLoad {
                path: file.display().to_string(),
                source,
            })?;
        defs.extend(parse_kdl_rules(&contents)?);
    }

    let rules = RuleSet::from_defs(&defs)?;

    tracing::info!(
        files = files.len(),
        rules = rules.len(),
        groups = rules.all_groups().len(),
        users = rules.all_users().len(),
        "Loaded sync rules"
    );

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.kdl");
        std::fs::write(
            &path,
            r#"
rule "Editor" {
    groups {
        - "eng@x"
    }
    orgs {
        - "Platform"
    }
}

rule "Admin" {
    users {
        - "a@x"
    }
    orgs {
        - "Platform"
    }
}
"#,
        )
        .unwrap();

        let rules = load_rules(&path).unwrap();
        assert_eq!(rules.len(), 2);
        let roles: Vec<Role> = rules.iter().map(|r| r.role).collect();
        assert_eq!(roles, vec![Role::Editor, Role::Admin]);
        assert_eq!(rules.iter().map(|r| r.index).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.kdl"), r#"rule "Admin" { users "a@x"; orgs "B"; }"#)
            .unwrap();
        std::fs::write(dir.path().join("a.kdl"), r#"rule "Viewer" { groups "g@x"; orgs "A"; }"#)
            .unwrap();
        std::fs::write(dir.path().join("README.md"), "not rules").unwrap();

        let rules = load_rules(dir.path()).unwrap();
        assert_eq!(rules.len(), 2);
        // a.kdl is read first
        assert_eq!(rules.iter().next().unwrap().role, Role::Viewer);
    }

    #[test]
    fn test_load_rejects_invalid_role() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.kdl");
        std::fs::write(&path, r#"rule "Owner" { orgs "A"; }"#).unwrap();
        let err = load_rules(&path).unwrap_err();
        assert!(matches!(err, RuleError::InvalidRole(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_rules(Path::new("/nonexistent/rules.kdl")).unwrap_err();
        assert!(matches!(err, RuleError::RuleLoad { .. }));
    }
}
