use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, LineId, MoveId, PartialId, Payment};

/// One payment's contribution toward settling one invoice: a single partial
/// reconciliation between an invoice receivable line and the receivable line
/// of an inbound customer payment. Computed on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub partial_id: PartialId,
    pub invoice_line_id: LineId,
    pub payment: Payment,
    pub payment_move_id: MoveId,
    pub payment_move_name: String,
    pub journal_name: String,
    /// Payment line matched against the invoice
    pub counterpart_line_id: LineId,
    pub counterpart_account_id: AccountId,
    /// Amount of this particular match, in company currency
    pub amount: Cents,
}

/// Allocations of one payment to one invoice, summed.
#[derive(Debug, Clone)]
pub struct RefundGroup {
    pub payment: Payment,
    pub journal_name: String,
    pub account_id: AccountId,
    pub amount: Cents,
    pub partial_ids: Vec<PartialId>,
}

/// Group allocations by originating payment, summing their amounts.
/// Groups keep the order in which each payment first appears; the account is
/// the one of the payment's first matched line.
pub fn group_by_payment(allocations: &[Allocation]) -> Vec<RefundGroup> {
    let mut groups: Vec<RefundGroup> = Vec::new();
    for allocation in allocations {
        match groups
            .iter_mut()
            .find(|g| g.payment.id == allocation.payment.id)
        {
            Some(group) => {
                group.amount += allocation.amount;
                group.partial_ids.push(allocation.partial_id);
            }
            None => groups.push(RefundGroup {
                payment: allocation.payment.clone(),
                journal_name: allocation.journal_name.clone(),
                account_id: allocation.counterpart_account_id,
                amount: allocation.amount,
                partial_ids: vec![allocation.partial_id],
            }),
        }
    }
    groups
}

/// Total collected against an invoice through its allocations.
pub fn total_allocated(allocations: &[Allocation]) -> Cents {
    allocations.iter().map(|a| a.amount).sum()
}
