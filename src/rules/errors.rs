use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RuleError {
    #[error("Failed to load rule file `{path}`")]
    #[diagnostic(
        code(permsync::rules::rule_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    RuleLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid role `{0}`")]
    #[diagnostic(
        code(permsync::rules::invalid_role),
        help("A rule must grant one of: Viewer, Editor, Admin")
    )]
    InvalidRole(String),

    #[error("Invalid pattern `{pattern}`: {reason}")]
    #[diagnostic(
        code(permsync::rules::invalid_pattern),
        help("Patterns are written as /regex/ and must compile as regular expressions")
    )]
    InvalidPattern { pattern: String, reason: String },

    #[error("Invalid rule: {0}")]
    #[diagnostic(
        code(permsync::rules::invalid_rule),
        help("Rule syntax: rule \"<Role>\" note=\"...\" {{ groups {{ - \"a@x\" }} users {{ - \"b@x\" }} orgs {{ - \"Org\" }} }}")
    )]
    InvalidRule(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(permsync::rules::kdl_parse),
        help("Check your KDL file syntax, see https://kdl.dev for the specification")
    )]
    KdlParse(String),
}
