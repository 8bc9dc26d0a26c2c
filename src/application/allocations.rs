use std::collections::HashMap;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::{Allocation, JournalId, Move};
use crate::storage::Repository;

use super::AppError;

/// Every match between a receivable line of `invoice` and the line of an
/// inbound customer payment.
///
/// Matches against entries that do not come from a payment (statement lines,
/// manual entries) are skipped, and so are outbound and supplier payments.
/// This must run before any partial is deleted: the partials are the only
/// link from the invoice to its payments.
pub async fn collect_allocations(
    repo: &Repository,
    conn: &mut SqliteConnection,
    invoice: &Move,
) -> Result<Vec<Allocation>, AppError> {
    let mut allocations = Vec::new();
    let mut journal_names: HashMap<JournalId, String> = HashMap::new();

    for line in repo.receivable_lines(conn, invoice.id).await? {
        for partial in repo.partials_for_line(conn, line.id).await? {
            let other_id = partial.counterpart_of(line.id);
            let other = repo
                .get_line(conn, other_id)
                .await?
                .ok_or_else(|| AppError::MoveNotFound(format!("line {}", other_id)))?;

            let Some(payment) = repo.payment_for_move(conn, other.move_id).await? else {
                debug!(invoice = %invoice.name, partial = %partial.id, "skipping match without payment");
                continue;
            };
            if !payment.is_customer_inbound() {
                debug!(
                    invoice = %invoice.name,
                    payment = %payment.name,
                    "skipping payment that is not an inbound customer payment"
                );
                continue;
            }

            let payment_move = repo
                .get_move(conn, other.move_id)
                .await?
                .ok_or_else(|| AppError::MoveNotFound(other.move_id.to_string()))?;

            let journal_name = match journal_names.get(&payment.journal_id) {
                Some(name) => name.clone(),
                None => {
                    let journal = repo
                        .get_journal(conn, payment.journal_id)
                        .await?
                        .ok_or_else(|| AppError::JournalNotFound(payment.journal_id.to_string()))?;
                    journal_names.insert(journal.id, journal.name.clone());
                    journal.name
                }
            };

            allocations.push(Allocation {
                partial_id: partial.id,
                invoice_line_id: line.id,
                payment_move_id: payment_move.id,
                payment_move_name: payment_move.name,
                journal_name,
                counterpart_line_id: other.id,
                counterpart_account_id: other.account_id,
                amount: partial.amount,
                payment,
            });
        }
    }

    debug!(invoice = %invoice.name, count = allocations.len(), "collected allocations");
    Ok(allocations)
}
