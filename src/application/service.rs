use chrono::NaiveDate;
use sqlx::SqliteConnection;
use tracing::info;

use crate::domain::{
    Account, AccountId, AccountType, Allocation, Cents, Journal, JournalType, LogMessage, Move,
    MoveLine, MoveState, MoveType, PartialReconcile, Partner, PartnerType, Payment,
    PaymentMethod, PaymentMethodLine, PaymentType, totals,
};
use crate::storage::{LedgerStats, Repository};

use super::allocations::collect_allocations;
use super::reconcile::{reconcile_by_account, reconcile_lines};
use super::{
    AppError, ReversalMode, ReversalRequest, ReversalSummary, ReversalWizard, WizardConfig,
};

/// Application service providing high-level operations on the ledger.
/// This is the primary interface for any client (CLI, tests, ...).
pub struct LedgerService {
    repo: Repository,
    config: WizardConfig,
}

/// One income line of an invoice.
#[derive(Debug, Clone)]
pub struct InvoiceItem {
    pub label: String,
    /// Account code; the journal's default account when unset
    pub account: Option<String>,
    pub amount: Cents,
}

impl InvoiceItem {
    pub fn new(label: impl Into<String>, amount: Cents) -> Self {
        Self {
            label: label.into(),
            account: None,
            amount,
        }
    }
}

/// Input for a customer invoice.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub partner: String,
    pub journal: String,
    pub receivable_account: String,
    pub date: NaiveDate,
    pub items: Vec<InvoiceItem>,
    /// Amounts of the receivable lines; a single line for the total when empty
    pub installments: Vec<Cents>,
    pub reference: Option<String>,
}

/// Input for a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_type: PaymentType,
    pub partner_type: PartnerType,
    pub partner: String,
    pub journal: String,
    /// Payment method name; the journal's first line for the direction when unset
    pub method: Option<String>,
    pub amount: Cents,
    pub date: NaiveDate,
    pub reference: Option<String>,
    /// Counterpart account code; taken from the first invoice when unset
    pub account: Option<String>,
    /// Invoices the payment is matched against, in order
    pub apply_to: Vec<String>,
}

impl NewPayment {
    /// Money received from a customer.
    pub fn customer_inbound(
        partner: impl Into<String>,
        journal: impl Into<String>,
        amount: Cents,
        date: NaiveDate,
    ) -> Self {
        Self {
            payment_type: PaymentType::Inbound,
            partner_type: PartnerType::Customer,
            partner: partner.into(),
            journal: journal.into(),
            method: None,
            amount,
            date,
            reference: None,
            account: None,
            apply_to: Vec::new(),
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn applied_to(mut self, invoice: impl Into<String>) -> Self {
        self.apply_to.push(invoice.into());
        self
    }
}

/// One line of a manual journal entry.
#[derive(Debug, Clone)]
pub struct EntryLine {
    pub account: String,
    pub label: String,
    pub debit: Cents,
    pub credit: Cents,
}

/// Result of registering a payment
pub struct PaymentResult {
    pub payment: Payment,
    pub entry: Move,
    pub partials: Vec<PartialReconcile>,
}

/// A move with its lines and the matches touching them
pub struct DocumentInfo {
    pub document: Move,
    pub lines: Vec<MoveLine>,
    pub partials: Vec<PartialReconcile>,
    pub payment: Option<Payment>,
    pub credit_notes: Vec<Move>,
}

impl LedgerService {
    pub fn new(repo: Repository) -> Self {
        Self::with_config(repo, WizardConfig::default())
    }

    pub fn with_config(repo: Repository, config: WizardConfig) -> Self {
        Self { repo, config }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, config: WizardConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::with_config(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, config: WizardConfig) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::with_config(repo, config))
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    // ========================
    // Setup
    // ========================

    pub async fn create_partner(&self, name: &str) -> Result<Partner, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_partner_by_name(&mut conn, name).await?.is_some() {
            return Err(AppError::PartnerAlreadyExists(name.to_string()));
        }
        let partner = Partner::new(name);
        self.repo.save_partner(&mut conn, &partner).await?;
        Ok(partner)
    }

    pub async fn list_partners(&self) -> Result<Vec<Partner>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_partners(&mut conn).await?)
    }

    pub async fn create_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_account_by_code(&mut conn, code).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(code.to_string()));
        }
        let account = Account::new(code, name, account_type);
        self.repo.save_account(&mut conn, &account).await?;
        Ok(account)
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_accounts(&mut conn).await?)
    }

    pub async fn create_journal(
        &self,
        code: &str,
        name: &str,
        journal_type: JournalType,
        default_account: &str,
    ) -> Result<Journal, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_journal_by_code(&mut conn, code).await?.is_some() {
            return Err(AppError::JournalAlreadyExists(code.to_string()));
        }
        let account = self.account_by_code(&mut conn, default_account).await?;
        let journal = Journal::new(code, name, journal_type, account.id);
        self.repo.save_journal(&mut conn, &journal).await?;
        Ok(journal)
    }

    pub async fn list_journals(&self) -> Result<Vec<Journal>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_journals(&mut conn).await?)
    }

    pub async fn create_payment_method(
        &self,
        code: &str,
        name: &str,
    ) -> Result<PaymentMethod, AppError> {
        let mut conn = self.repo.acquire().await?;
        if self.repo.get_payment_method_by_name(&mut conn, name).await?.is_some() {
            return Err(AppError::PaymentMethodAlreadyExists(name.to_string()));
        }
        let method = PaymentMethod::new(code, name);
        self.repo.save_payment_method(&mut conn, &method).await?;
        Ok(method)
    }

    /// Enable a payment method on a journal for one direction.
    pub async fn add_payment_method_line(
        &self,
        journal: &str,
        method: &str,
        payment_type: PaymentType,
    ) -> Result<PaymentMethodLine, AppError> {
        let mut conn = self.repo.acquire().await?;
        let journal = self.journal_by_code(&mut conn, journal).await?;
        let method = self
            .repo
            .get_payment_method_by_name(&mut conn, method)
            .await?
            .ok_or_else(|| AppError::PaymentMethodNotFound(method.to_string()))?;

        let existing = self
            .repo
            .method_lines_for_journal(&mut conn, journal.id, payment_type)
            .await?;
        let line_name = format!("{} ({})", method.name, payment_type);
        let line = PaymentMethodLine::new(journal.id, method.id, payment_type, line_name)
            .with_sequence((existing.len() as i64 + 1) * 10);
        self.repo.save_payment_method_line(&mut conn, &line).await?;
        Ok(line)
    }

    // ========================
    // Documents
    // ========================

    /// Create and post a customer invoice.
    pub async fn create_invoice(&self, input: NewInvoice) -> Result<(Move, Vec<MoveLine>), AppError> {
        if input.items.is_empty() {
            return Err(AppError::InvalidAmount("an invoice needs at least one item".into()));
        }
        if let Some(item) = input.items.iter().find(|i| i.amount <= 0) {
            return Err(AppError::InvalidAmount(format!(
                "item '{}' must have a positive amount",
                item.label
            )));
        }
        let total: Cents = input.items.iter().map(|i| i.amount).sum();
        let installments = if input.installments.is_empty() {
            vec![total]
        } else {
            input.installments.clone()
        };
        if installments.iter().any(|a| *a <= 0) {
            return Err(AppError::InvalidAmount("installments must be positive".into()));
        }

        let mut tx = self.repo.begin().await?;
        let partner = self.partner_by_name(&mut tx, &input.partner).await?;
        let journal = self.journal_by_code(&mut tx, &input.journal).await?;
        let receivable = self.account_by_code(&mut tx, &input.receivable_account).await?;
        if !receivable.account_type.is_receivable() {
            return Err(AppError::AccountNotFound(format!(
                "{} is not a receivable account",
                receivable.code
            )));
        }

        let mut invoice = Move::new(
            MoveType::OutInvoice,
            journal.id,
            input.date,
            self.config.company_currency.clone(),
        )
        .with_partner(partner.id);
        if let Some(reference) = &input.reference {
            invoice = invoice.with_reference(reference.clone());
        }
        invoice.state = MoveState::Posted;

        let count = installments.len();
        let mut lines = Vec::with_capacity(count + input.items.len());
        for (i, amount) in installments.iter().enumerate() {
            let label = if count == 1 {
                "Amount due".to_string()
            } else {
                format!("Installment {}/{}", i + 1, count)
            };
            lines.push(
                MoveLine::debit(invoice.id, receivable.id, receivable.account_type, label, *amount)
                    .with_partner(Some(partner.id)),
            );
        }
        for item in &input.items {
            let account = match &item.account {
                Some(code) => self.account_by_code(&mut tx, code).await?,
                None => self.account_by_id(&mut tx, journal.default_account_id).await?,
            };
            lines.push(
                MoveLine::credit(
                    invoice.id,
                    account.id,
                    account.account_type,
                    item.label.clone(),
                    item.amount,
                )
                .with_partner(Some(partner.id)),
            );
        }

        let (debit, credit) = totals(&lines);
        if debit != credit {
            return Err(AppError::UnbalancedMove { debit, credit });
        }

        self.repo.save_move(&mut tx, &mut invoice, "INV", &lines).await?;
        Repository::commit(tx).await?;
        info!(invoice = %invoice.name, total, "created invoice");
        Ok((invoice, lines))
    }

    /// Post a manual entry on a journal. Used for bank statement lines and
    /// write-offs that settle receivables without a payment.
    pub async fn create_entry(
        &self,
        journal: &str,
        partner: Option<&str>,
        date: NaiveDate,
        entry_lines: &[EntryLine],
    ) -> Result<(Move, Vec<MoveLine>), AppError> {
        let mut tx = self.repo.begin().await?;
        let journal = self.journal_by_code(&mut tx, journal).await?;
        let partner_id = match partner {
            Some(name) => Some(self.partner_by_name(&mut tx, name).await?.id),
            None => None,
        };

        let mut entry = Move::new(
            MoveType::Entry,
            journal.id,
            date,
            self.config.company_currency.clone(),
        );
        entry.partner_id = partner_id;
        entry.state = MoveState::Posted;

        let mut lines = Vec::with_capacity(entry_lines.len());
        for input in entry_lines {
            if input.debit < 0 || input.credit < 0 || (input.debit == 0) == (input.credit == 0)
            {
                return Err(AppError::InvalidAmount(format!(
                    "line '{}' needs exactly one positive side",
                    input.label
                )));
            }
            let account = self.account_by_code(&mut tx, &input.account).await?;
            let line = if input.debit > 0 {
                MoveLine::debit(entry.id, account.id, account.account_type, input.label.clone(), input.debit)
            } else {
                MoveLine::credit(entry.id, account.id, account.account_type, input.label.clone(), input.credit)
            };
            lines.push(line.with_partner(partner_id));
        }

        let (debit, credit) = totals(&lines);
        if debit != credit || debit == 0 {
            return Err(AppError::UnbalancedMove { debit, credit });
        }

        self.repo.save_move(&mut tx, &mut entry, "MISC", &lines).await?;
        Repository::commit(tx).await?;
        Ok((entry, lines))
    }

    /// Record a payment and match it against the invoices it settles.
    pub async fn register_payment(&self, input: NewPayment) -> Result<PaymentResult, AppError> {
        if input.amount <= 0 {
            return Err(AppError::InvalidAmount("payment amount must be positive".into()));
        }

        let mut tx = self.repo.begin().await?;
        let partner = self.partner_by_name(&mut tx, &input.partner).await?;
        let journal = self.journal_by_code(&mut tx, &input.journal).await?;
        if !journal.journal_type.accepts_payments() {
            return Err(AppError::JournalRejectsPayments(journal.code));
        }

        let mut invoices = Vec::with_capacity(input.apply_to.len());
        for name in &input.apply_to {
            invoices.push(self.move_by_name(&mut tx, name).await?);
        }

        let account = match &input.account {
            Some(code) => self.account_by_code(&mut tx, code).await?,
            None => {
                let invoice = invoices.first().ok_or_else(|| {
                    AppError::AccountNotFound("no counterpart account for the payment".into())
                })?;
                let line = self
                    .repo
                    .receivable_lines(&mut tx, invoice.id)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        AppError::AccountNotFound(format!("receivable line of {}", invoice.name))
                    })?;
                self.account_by_id(&mut tx, line.account_id).await?
            }
        };

        let lines = self
            .repo
            .method_lines_for_journal(&mut tx, journal.id, input.payment_type)
            .await?;
        let method_line = match &input.method {
            Some(name) => {
                let method = self
                    .repo
                    .get_payment_method_by_name(&mut tx, name)
                    .await?
                    .ok_or_else(|| AppError::PaymentMethodNotFound(name.clone()))?;
                let line = lines
                    .into_iter()
                    .find(|l| l.payment_method_id == method.id)
                    .ok_or_else(|| {
                        AppError::PaymentMethodNotFound(format!(
                            "{} ({}) on journal {}",
                            name, input.payment_type, journal.code
                        ))
                    })?;
                Some(line)
            }
            None => lines.into_iter().next(),
        };

        let mut payment = Payment::new(
            input.payment_type,
            input.partner_type,
            partner.id,
            journal.id,
            input.amount,
            input.date,
            self.config.company_currency.clone(),
        );
        if let Some(line) = &method_line {
            payment = payment.with_method_line(line.id);
        }
        if let Some(reference) = &input.reference {
            payment = payment.with_reference(reference.clone());
        }

        let entry = self.repo.create_payment(&mut tx, &mut payment, &account).await?;

        let mut partials = Vec::new();
        for invoice in &invoices {
            let payment_lines = self
                .repo
                .open_lines_on_account(&mut tx, entry.id, account.id)
                .await?;
            if payment_lines.is_empty() {
                break;
            }
            let mut lines = self
                .repo
                .open_lines_on_account(&mut tx, invoice.id, account.id)
                .await?;
            if lines.is_empty() {
                continue;
            }
            lines.extend(payment_lines);
            partials.extend(reconcile_lines(&self.repo, &mut tx, &lines).await?);
        }

        Repository::commit(tx).await?;
        info!(payment = %payment.name, amount = payment.amount, matched = partials.len(), "registered payment");
        Ok(PaymentResult {
            payment,
            entry,
            partials,
        })
    }

    /// Match open lines of two documents on every account they share.
    pub async fn reconcile_documents(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Vec<PartialReconcile>, AppError> {
        let mut tx = self.repo.begin().await?;
        let first = self.move_by_name(&mut tx, first).await?;
        let second = self.move_by_name(&mut tx, second).await?;

        let mut lines = self.repo.lines_for_move(&mut tx, first.id).await?;
        lines.extend(self.repo.lines_for_move(&mut tx, second.id).await?);
        let partials = reconcile_by_account(&self.repo, &mut tx, &lines).await?;

        Repository::commit(tx).await?;
        Ok(partials)
    }

    pub async fn get_move(&self, name: &str) -> Result<Move, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.move_by_name(&mut conn, name).await
    }

    pub async fn get_payment(&self, name: &str) -> Result<Payment, AppError> {
        let mut conn = self.repo.acquire().await?;
        self.repo
            .find_payment_by_name(&mut conn, name)
            .await?
            .ok_or_else(|| AppError::PaymentNotFound(name.to_string()))
    }

    pub async fn get_document(&self, name: &str) -> Result<DocumentInfo, AppError> {
        let mut conn = self.repo.acquire().await?;
        let document = self.move_by_name(&mut conn, name).await?;
        let lines = self.repo.lines_for_move(&mut conn, document.id).await?;

        let mut partials: Vec<PartialReconcile> = Vec::new();
        for line in &lines {
            for partial in self.repo.partials_for_line(&mut conn, line.id).await? {
                if !partials.iter().any(|p| p.id == partial.id) {
                    partials.push(partial);
                }
            }
        }
        partials.sort_by_key(|p| p.sequence);

        let payment = self.repo.payment_for_move(&mut conn, document.id).await?;
        let credit_notes = self.repo.moves_reversing(&mut conn, &[document.id]).await?;

        Ok(DocumentInfo {
            document,
            lines,
            partials,
            payment,
            credit_notes,
        })
    }

    pub async fn list_moves(&self, move_type: Option<MoveType>) -> Result<Vec<Move>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_moves(&mut conn, move_type).await?)
    }

    pub async fn list_payments(&self) -> Result<Vec<Payment>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.list_payments(&mut conn).await?)
    }

    /// Inbound customer payments currently applied to an invoice.
    pub async fn allocations(&self, invoice: &str) -> Result<Vec<Allocation>, AppError> {
        let mut conn = self.repo.acquire().await?;
        let invoice = self.move_by_name(&mut conn, invoice).await?;
        collect_allocations(&self.repo, &mut conn, &invoice).await
    }

    pub async fn activity_log(&self, name: &str) -> Result<Vec<LogMessage>, AppError> {
        let mut conn = self.repo.acquire().await?;
        let document = self.move_by_name(&mut conn, name).await?;
        Ok(self.repo.messages_for_move(&mut conn, document.id).await?)
    }

    pub async fn ledger_stats(&self) -> Result<LedgerStats, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(self.repo.ledger_stats(&mut conn).await?)
    }

    // ========================
    // Reversal wizard
    // ========================

    /// Reverse invoices with their payments.
    pub async fn reverse(&self, request: &ReversalRequest) -> Result<ReversalSummary, AppError> {
        ReversalWizard::new(&self.repo, &self.config)
            .run(request, ReversalMode::Execute)
            .await
    }

    /// Log what a reversal of these invoices looks like, changing nothing.
    pub async fn report(&self, request: &ReversalRequest) -> Result<ReversalSummary, AppError> {
        ReversalWizard::new(&self.repo, &self.config)
            .run(request, ReversalMode::ReportOnly)
            .await
    }

    /// Build a request from invoice names.
    pub async fn request_for(&self, names: &[String]) -> Result<ReversalRequest, AppError> {
        let mut conn = self.repo.acquire().await?;
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.move_by_name(&mut conn, name).await?.id);
        }
        Ok(ReversalRequest::new(ids))
    }

    // ========================
    // Lookups
    // ========================

    async fn partner_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Partner, AppError> {
        self.repo
            .get_partner_by_name(conn, name)
            .await?
            .ok_or_else(|| AppError::PartnerNotFound(name.to_string()))
    }

    async fn account_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Account, AppError> {
        self.repo
            .get_account_by_code(conn, code)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(code.to_string()))
    }

    async fn account_by_id(
        &self,
        conn: &mut SqliteConnection,
        id: AccountId,
    ) -> Result<Account, AppError> {
        self.repo
            .get_account(conn, id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    async fn journal_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Journal, AppError> {
        self.repo
            .get_journal_by_code(conn, code)
            .await?
            .ok_or_else(|| AppError::JournalNotFound(code.to_string()))
    }

    async fn move_by_name(&self, conn: &mut SqliteConnection, name: &str) -> Result<Move, AppError> {
        self.repo
            .find_move_by_name(conn, name)
            .await?
            .ok_or_else(|| AppError::MoveNotFound(name.to_string()))
    }
}
