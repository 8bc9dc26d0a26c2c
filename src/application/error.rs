use thiserror::Error;

use crate::domain::{Cents, ReconcileError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No invoice selected for reversal")]
    NoInvoiceSelected,

    #[error("Only posted customer invoices can be reversed with their payments: {0}")]
    NotPostedCustomerInvoice(String),

    #[error("Move not found: {0}")]
    MoveNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Partner not found: {0}")]
    PartnerNotFound(String),

    #[error("Partner already exists: {0}")]
    PartnerAlreadyExists(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Journal not found: {0}")]
    JournalNotFound(String),

    #[error("Journal already exists: {0}")]
    JournalAlreadyExists(String),

    #[error("Journal {0} does not accept payments")]
    JournalRejectsPayments(String),

    #[error("Payment method not found: {0}")]
    PaymentMethodNotFound(String),

    #[error("Payment method already exists: {0}")]
    PaymentMethodAlreadyExists(String),

    #[error(
        "No outbound payment method to refund payment {payment} on journal {journal}: \
         the payment uses '{method}' but no outbound line is configured"
    )]
    MissingOutboundMethod {
        payment: String,
        journal: String,
        method: String,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unbalanced move: debit {debit}, credit {credit}")]
    UnbalancedMove { debit: Cents, credit: Cents },

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
