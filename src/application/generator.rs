use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::info;

use crate::domain::{Move, MoveLine, MoveState};
use crate::storage::Repository;

use super::{AppError, ReversalAction};

/// The standard reversal action: one credit note per invoice, mirroring its
/// lines and pointing back at it through `reversed_entry_id`.
pub async fn generate_credit_notes(
    repo: &Repository,
    conn: &mut SqliteConnection,
    invoices: &[Move],
    action: ReversalAction,
    date: NaiveDate,
    reason: Option<&str>,
) -> Result<Vec<Move>, AppError> {
    let mut credit_notes = Vec::with_capacity(invoices.len());

    for invoice in invoices {
        let lines = repo.lines_for_move(conn, invoice.id).await?;
        let mut credit_note = invoice.create_credit_note(date, reason);
        let reversed: Vec<MoveLine> = lines.iter().map(|l| l.reversed_for(credit_note.id)).collect();
        if action.posts_immediately() {
            credit_note.state = MoveState::Posted;
        }

        repo.save_move(conn, &mut credit_note, "CN", &reversed).await?;
        info!(
            invoice = %invoice.name,
            credit_note = %credit_note.name,
            action = %action,
            "generated credit note"
        );
        credit_notes.push(credit_note);
    }

    Ok(credit_notes)
}
