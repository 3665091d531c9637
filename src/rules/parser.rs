use crate::rules::errors::RuleError;
use crate::rules::types::RuleDef;
use kdl::KdlDocument;

/// Parse a KDL rule document into raw rule definitions, in file order.
pub fn parse_kdl_rules(source: &str) -> Result<Vec<RuleDef>, RuleError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| RuleError::KdlParse(e.to_string()))?;

    let mut rules = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "rule" => {
                let role = first_string_arg(node).ok_or_else(|| {
                    RuleError::InvalidRule(
                        "rule node requires a role argument (e.g. rule \"Editor\")".into(),
                    )
                })?;

                let note = node
                    .get("note")
                    .and_then(|v| v.as_string())
                    .map(|s| s.to_string());

                let mut def = RuleDef {
                    role,
                    note,
                    ..Default::default()
                };

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "groups" => def.groups.extend(string_list(child)),
                            "users" => def.users.extend(string_list(child)),
                            "orgs" => def.orgs.extend(string_list(child)),
                            other => {
                                return Err(RuleError::InvalidRule(format!(
                                    "unexpected child `{other}` in rule #{} (expected `groups`, `users` or `orgs`)",
                                    rules.len()
                                )));
                            }
                        }
                    }
                }

                rules.push(def);
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(rules)
}

/// Extract the first positional string argument from a KDL node.
fn first_string_arg(node: &kdl::KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Collect the values of a list node. Both forms are accepted and merged:
/// ```kdl
/// orgs "Platform" "Sales"
/// orgs {
///     - "Platform"
///     - "/^Team .*$/"
/// }
/// ```
fn string_list(node: &kdl::KdlNode) -> Vec<String> {
    let mut values: Vec<String> = node
        .entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect();

    if let Some(children) = node.children() {
        values.extend(
            children
                .nodes()
                .iter()
                .filter(|n| n.name().value() == "-")
                .filter_map(first_string_arg),
        );
    }

    values
}
