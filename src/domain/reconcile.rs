use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, AccountType, Cents, LineId, MoveLine};

pub type PartialId = Uuid;

/// "`amount` of the debit line was settled by the credit line."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialReconcile {
    pub id: PartialId,
    /// Monotonically increasing, assigned by the repository
    pub sequence: i64,
    pub debit_line_id: LineId,
    pub credit_line_id: LineId,
    pub amount: Cents,
}

impl PartialReconcile {
    pub fn new(debit_line_id: LineId, credit_line_id: LineId, amount: Cents) -> Self {
        assert!(amount > 0, "Partial reconciliation amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            debit_line_id,
            credit_line_id,
            amount,
        }
    }

    /// The line on the other side of this match, seen from `line_id`.
    pub fn counterpart_of(&self, line_id: LineId) -> LineId {
        if self.credit_line_id == line_id {
            self.debit_line_id
        } else {
            self.credit_line_id
        }
    }
}

/// The outcome of matching a set of lines: the partials to record and the
/// residual each line is left with.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub partials: Vec<PartialReconcile>,
    pub residuals: Vec<(LineId, Cents)>,
}

impl ReconcilePlan {
    pub fn residual_of(&self, line_id: LineId) -> Option<Cents> {
        self.residuals
            .iter()
            .find(|(id, _)| *id == line_id)
            .map(|(_, residual)| *residual)
    }
}

/// Match debit lines against credit lines in the given order.
///
/// All lines must share one receivable or payable account and still be
/// open. Each debit is consumed
/// by the credits in turn until one side runs out; the amount of a match is
/// the smaller of the two open amounts, so no line is ever matched beyond its
/// face amount.
pub fn plan_reconciliation(lines: &[MoveLine]) -> Result<ReconcilePlan, ReconcileError> {
    if lines.len() < 2 {
        return Err(ReconcileError::NotEnoughLines(lines.len()));
    }

    let account = lines[0].account_id;
    if let Some(other) = lines.iter().find(|l| l.account_id != account) {
        return Err(ReconcileError::MixedAccounts {
            expected: account,
            found: other.account_id,
        });
    }
    if let Some(line) = lines.iter().find(|l| !l.is_reconcilable()) {
        return Err(ReconcileError::NotReconcilable {
            line: line.id,
            account_type: line.account_type,
        });
    }
    if let Some(closed) = lines.iter().find(|l| !l.is_open()) {
        return Err(ReconcileError::AlreadyReconciled(closed.id));
    }

    let mut debits: Vec<(LineId, Cents)> = lines
        .iter()
        .filter(|l| l.residual > 0)
        .map(|l| (l.id, l.residual))
        .collect();
    let mut credits: Vec<(LineId, Cents)> = lines
        .iter()
        .filter(|l| l.residual < 0)
        .map(|l| (l.id, -l.residual))
        .collect();

    let mut plan = ReconcilePlan::default();
    let (mut d, mut c) = (0, 0);
    while d < debits.len() && c < credits.len() {
        let amount = debits[d].1.min(credits[c].1);
        plan.partials
            .push(PartialReconcile::new(debits[d].0, credits[c].0, amount));
        debits[d].1 -= amount;
        credits[c].1 -= amount;
        if debits[d].1 == 0 {
            d += 1;
        }
        if credits[c].1 == 0 {
            c += 1;
        }
    }

    plan.residuals = debits
        .into_iter()
        .chain(credits.into_iter().map(|(id, open)| (id, -open)))
        .collect();
    Ok(plan)
}

/// Open receivable and payable lines grouped by account, keeping only
/// accounts with at least two lines. Groups come out in order of first
/// appearance.
pub fn group_open_lines_by_account(lines: &[MoveLine]) -> Vec<(AccountId, Vec<MoveLine>)> {
    let mut groups: Vec<(AccountId, Vec<MoveLine>)> = Vec::new();
    for line in lines.iter().filter(|l| l.is_open() && l.is_reconcilable()) {
        match groups.iter_mut().find(|(account, _)| *account == line.account_id) {
            Some((_, group)) => group.push(line.clone()),
            None => groups.push((line.account_id, vec![line.clone()])),
        }
    }
    groups.retain(|(_, group)| group.len() >= 2);
    groups
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    NotEnoughLines(usize),
    MixedAccounts { expected: AccountId, found: AccountId },
    NotReconcilable { line: LineId, account_type: AccountType },
    AlreadyReconciled(LineId),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::NotEnoughLines(n) => {
                write!(f, "Reconciliation needs at least two lines, got {}", n)
            }
            ReconcileError::MixedAccounts { expected, found } => {
                write!(
                    f,
                    "Cannot reconcile lines on different accounts ({} and {})",
                    expected, found
                )
            }
            ReconcileError::NotReconcilable { line, account_type } => {
                write!(f, "Line {} is on a {} account, which is not reconcilable", line, account_type)
            }
            ReconcileError::AlreadyReconciled(id) => {
                write!(f, "Line {} is already fully reconciled", id)
            }
        }
    }
}

impl std::error::Error for ReconcileError {}
