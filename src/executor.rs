use crate::console::{ConsoleError, RateLimitedConsole};
use crate::plan::{ChangeKind, Plan, UserRoleChange};
use crate::role::Role;

/// Outcome counters of one plan execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
enum ApplyResult {
    Applied,
    Skipped,
}

/// Execute every change of a plan against the console.
///
/// A failing change is logged and counted; the rest of the batch still runs.
pub async fn apply(plan: &Plan, console: &RateLimitedConsole) -> ApplyReport {
    let mut report = ApplyReport::default();

    for update in &plan.updates {
        for change in &update.changes {
            match apply_change(&update.email, change, console).await {
                Ok(ApplyResult::Applied) => report.applied += 1,
                Ok(ApplyResult::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        user = %update.email,
                        org = %change.organization.name,
                        org_id = change.organization.id,
                        old_role = %change.old_role,
                        new_role = %change.new_role,
                        "Failed to apply change: {err}"
                    );
                }
            }
        }
    }

    tracing::info!(
        "Plan applied: {} applied, {} failed, {} skipped",
        report.applied,
        report.failed,
        report.skipped
    );

    report
}

async fn apply_change(
    email: &str,
    change: &UserRoleChange,
    console: &RateLimitedConsole,
) -> Result<ApplyResult, ConsoleError> {
    let org = &change.organization;

    if change.kind() == ChangeKind::Unchanged {
        return Ok(ApplyResult::Skipped);
    }

    // a membership without a role reads as `Role::None` but still exists
    let member = match org.find_member(email) {
        Some(member) => member,
        None if change.old_role == Role::None => {
            console.add_org_user(org.id, email, change.new_role).await?;
            return Ok(ApplyResult::Applied);
        }
        None => {
            tracing::warn!(
                user = %email,
                org = %org.name,
                "User is not a member of the organization anymore, skipping"
            );
            return Ok(ApplyResult::Skipped);
        }
    };

    if change.new_role == Role::None {
        console.remove_org_user(org.id, member.user_id).await?;
    } else {
        console
            .update_org_user(org.id, member.user_id, change.new_role)
            .await?;
    }
    Ok(ApplyResult::Applied)
}
