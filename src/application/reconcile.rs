use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::{
    MoveLine, PartialReconcile, group_open_lines_by_account, plan_reconciliation,
};
use crate::storage::Repository;

use super::AppError;

/// Reconcile a set of open lines sharing one account.
pub async fn reconcile_lines(
    repo: &Repository,
    conn: &mut SqliteConnection,
    lines: &[MoveLine],
) -> Result<Vec<PartialReconcile>, AppError> {
    let plan = plan_reconciliation(lines)?;
    Ok(repo.apply_reconcile_plan(conn, plan).await?)
}

/// Reconcile lines account by account. Accounts with fewer than two open
/// lines are left alone, and lines on different accounts never meet.
pub async fn reconcile_by_account(
    repo: &Repository,
    conn: &mut SqliteConnection,
    lines: &[MoveLine],
) -> Result<Vec<PartialReconcile>, AppError> {
    let mut recorded = Vec::new();
    for (account_id, group) in group_open_lines_by_account(lines) {
        debug!(account = %account_id, lines = group.len(), "reconciling account");
        recorded.extend(reconcile_lines(repo, conn, &group).await?);
    }
    Ok(recorded)
}
