use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, Cents, Journal, JournalId, JournalType, LineId, LogMessage,
    Move, MoveId, MoveLine, MoveState, MoveType, PartialId, PartialReconcile, Partner,
    PartnerType, Payment, PaymentId, PaymentMethod, PaymentMethodId,
    PaymentMethodLine, PaymentMethodLineId, PaymentState, PaymentType, ReconcilePlan,
};

use super::MIGRATION_001_INITIAL;

const MOVE_COLUMNS: &str = "id, name, move_type, state, partner_id, journal_id, date, currency, reversed_entry_id, payment_id, reference";

const LINE_SELECT: &str = "SELECT l.id, l.move_id, l.account_id, a.account_type, l.partner_id, l.label, l.debit, l.credit, l.residual, l.reconciled FROM move_lines l JOIN accounts a ON a.id = l.account_id";

const PAYMENT_COLUMNS: &str = "id, name, payment_type, partner_type, partner_id, journal_id, payment_method_line_id, date, amount, currency, reference, state, move_id, reverses, source_invoice_id";

/// Row counts used to check that an operation left the ledger untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStats {
    pub move_count: i64,
    pub line_count: i64,
    pub partial_count: i64,
    pub payment_count: i64,
    pub message_count: i64,
    /// Sum of absolute open amounts on receivable and payable lines
    pub open_amount: Cents,
}

/// Ledger store backed by SQLite.
///
/// Every query takes the connection to run on, so callers decide the
/// transaction boundary: a whole wizard run shares one transaction and is
/// rolled back as a unit when it fails.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    ///
    /// The pool holds a single connection: SQLite has one writer, and a
    /// dropped transaction must be rolled back before the next query runs.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Open a transaction. Dropping it without calling `commit` rolls back.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }

    pub async fn commit(tx: Transaction<'static, Sqlite>) -> Result<()> {
        tx.commit().await.context("Failed to commit transaction")
    }

    /// A plain connection for read-only work.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    // ========================
    // Sequences
    // ========================

    async fn next_value(&self, conn: &mut SqliteConnection, name: &str) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counter (name, value) VALUES (?, 1)
            ON CONFLICT(name) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .with_context(|| format!("Failed to advance sequence '{}'", name))?;

        Ok(row.get("value"))
    }

    /// Next document name for a prefix: INV/0001, CN/0001, PAY/0001, ...
    pub async fn next_name(&self, conn: &mut SqliteConnection, prefix: &str) -> Result<String> {
        let value = self.next_value(conn, prefix).await?;
        Ok(format!("{}/{:04}", prefix, value))
    }

    // ========================
    // Partners and accounts
    // ========================

    pub async fn save_partner(&self, conn: &mut SqliteConnection, partner: &Partner) -> Result<()> {
        sqlx::query("INSERT INTO partners (id, name) VALUES (?, ?)")
            .bind(partner.id.to_string())
            .bind(&partner.name)
            .execute(&mut *conn)
            .await
            .context("Failed to save partner")?;
        Ok(())
    }

    pub async fn get_partner_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<Partner>> {
        let row = sqlx::query("SELECT id, name FROM partners WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch partner by name")?;
        row.as_ref().map(Self::row_to_partner).transpose()
    }

    pub async fn list_partners(&self, conn: &mut SqliteConnection) -> Result<Vec<Partner>> {
        let rows = sqlx::query("SELECT id, name FROM partners ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list partners")?;
        rows.iter().map(Self::row_to_partner).collect()
    }

    fn row_to_partner(row: &SqliteRow) -> Result<Partner> {
        Ok(Partner {
            id: parse_id(row.get("id"), "partner")?,
            name: row.get("name"),
        })
    }

    pub async fn save_account(&self, conn: &mut SqliteConnection, account: &Account) -> Result<()> {
        sqlx::query("INSERT INTO accounts (id, code, name, account_type) VALUES (?, ?, ?, ?)")
            .bind(account.id.to_string())
            .bind(&account.code)
            .bind(&account.name)
            .bind(account.account_type.as_str())
            .execute(&mut *conn)
            .await
            .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(
        &self,
        conn: &mut SqliteConnection,
        id: AccountId,
    ) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, code, name, account_type FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch account")?;
        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn get_account_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Account>> {
        let row = sqlx::query("SELECT id, code, name, account_type FROM accounts WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch account by code")?;
        row.as_ref().map(Self::row_to_account).transpose()
    }

    pub async fn list_accounts(&self, conn: &mut SqliteConnection) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT id, code, name, account_type FROM accounts ORDER BY code")
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list accounts")?;
        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let account_type: String = row.get("account_type");
        Ok(Account {
            id: parse_id(row.get("id"), "account")?,
            code: row.get("code"),
            name: row.get("name"),
            account_type: AccountType::from_str(&account_type)
                .ok_or_else(|| anyhow!("Invalid account type: {}", account_type))?,
        })
    }

    // ========================
    // Journals and payment methods
    // ========================

    pub async fn save_journal(&self, conn: &mut SqliteConnection, journal: &Journal) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO journals (id, code, name, journal_type, default_account_id)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(journal.id.to_string())
        .bind(&journal.code)
        .bind(&journal.name)
        .bind(journal.journal_type.as_str())
        .bind(journal.default_account_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to save journal")?;
        Ok(())
    }

    pub async fn get_journal(
        &self,
        conn: &mut SqliteConnection,
        id: JournalId,
    ) -> Result<Option<Journal>> {
        let row = sqlx::query(
            "SELECT id, code, name, journal_type, default_account_id FROM journals WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch journal")?;
        row.as_ref().map(Self::row_to_journal).transpose()
    }

    pub async fn get_journal_by_code(
        &self,
        conn: &mut SqliteConnection,
        code: &str,
    ) -> Result<Option<Journal>> {
        let row = sqlx::query(
            "SELECT id, code, name, journal_type, default_account_id FROM journals WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch journal by code")?;
        row.as_ref().map(Self::row_to_journal).transpose()
    }

    pub async fn list_journals(&self, conn: &mut SqliteConnection) -> Result<Vec<Journal>> {
        let rows = sqlx::query(
            "SELECT id, code, name, journal_type, default_account_id FROM journals ORDER BY code",
        )
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list journals")?;
        rows.iter().map(Self::row_to_journal).collect()
    }

    fn row_to_journal(row: &SqliteRow) -> Result<Journal> {
        let journal_type: String = row.get("journal_type");
        Ok(Journal {
            id: parse_id(row.get("id"), "journal")?,
            code: row.get("code"),
            name: row.get("name"),
            journal_type: JournalType::from_str(&journal_type)
                .ok_or_else(|| anyhow!("Invalid journal type: {}", journal_type))?,
            default_account_id: parse_id(row.get("default_account_id"), "account")?,
        })
    }

    pub async fn save_payment_method(
        &self,
        conn: &mut SqliteConnection,
        method: &PaymentMethod,
    ) -> Result<()> {
        sqlx::query("INSERT INTO payment_methods (id, code, name) VALUES (?, ?, ?)")
            .bind(method.id.to_string())
            .bind(&method.code)
            .bind(&method.name)
            .execute(&mut *conn)
            .await
            .context("Failed to save payment method")?;
        Ok(())
    }

    pub async fn get_payment_method(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentMethodId,
    ) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query("SELECT id, code, name FROM payment_methods WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch payment method")?;
        row.as_ref().map(Self::row_to_method).transpose()
    }

    pub async fn get_payment_method_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<PaymentMethod>> {
        let row = sqlx::query("SELECT id, code, name FROM payment_methods WHERE name = ?")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch payment method by name")?;
        row.as_ref().map(Self::row_to_method).transpose()
    }

    fn row_to_method(row: &SqliteRow) -> Result<PaymentMethod> {
        Ok(PaymentMethod {
            id: parse_id(row.get("id"), "payment method")?,
            code: row.get("code"),
            name: row.get("name"),
        })
    }

    pub async fn save_payment_method_line(
        &self,
        conn: &mut SqliteConnection,
        line: &PaymentMethodLine,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_method_lines (id, journal_id, payment_method_id, payment_type, name, sequence)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(line.id.to_string())
        .bind(line.journal_id.to_string())
        .bind(line.payment_method_id.to_string())
        .bind(line.payment_type.as_str())
        .bind(&line.name)
        .bind(line.sequence)
        .execute(&mut *conn)
        .await
        .context("Failed to save payment method line")?;
        Ok(())
    }

    pub async fn get_payment_method_line(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentMethodLineId,
    ) -> Result<Option<PaymentMethodLine>> {
        let row = sqlx::query(
            r#"
            SELECT id, journal_id, payment_method_id, payment_type, name, sequence
            FROM payment_method_lines
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch payment method line")?;
        row.as_ref().map(Self::row_to_method_line).transpose()
    }

    /// Method lines enabled on a journal for one direction, in priority order.
    pub async fn method_lines_for_journal(
        &self,
        conn: &mut SqliteConnection,
        journal_id: JournalId,
        payment_type: PaymentType,
    ) -> Result<Vec<PaymentMethodLine>> {
        let rows = sqlx::query(
            r#"
            SELECT id, journal_id, payment_method_id, payment_type, name, sequence
            FROM payment_method_lines
            WHERE journal_id = ? AND payment_type = ?
            ORDER BY sequence, name
            "#,
        )
        .bind(journal_id.to_string())
        .bind(payment_type.as_str())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list payment method lines")?;
        rows.iter().map(Self::row_to_method_line).collect()
    }

    /// The outbound method line able to refund `payment`: same journal, and a
    /// payment method equivalent to the one the payment came in with.
    /// Returns `None` when the payment has no method or the journal has no
    /// matching outbound line; the payment's own inbound line never qualifies.
    pub async fn outbound_method_line_for(
        &self,
        conn: &mut SqliteConnection,
        payment: &Payment,
    ) -> Result<Option<PaymentMethodLine>> {
        let Some(inbound_line_id) = payment.payment_method_line_id else {
            return Ok(None);
        };
        let Some(inbound_line) = self.get_payment_method_line(conn, inbound_line_id).await? else {
            return Ok(None);
        };
        let Some(inbound_method) = self
            .get_payment_method(conn, inbound_line.payment_method_id)
            .await?
        else {
            return Ok(None);
        };

        let candidates = self
            .method_lines_for_journal(conn, payment.journal_id, PaymentType::Outbound)
            .await?;
        for candidate in candidates {
            let method = self
                .get_payment_method(conn, candidate.payment_method_id)
                .await?;
            if method.is_some_and(|m| inbound_method.is_equivalent(&m)) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    fn row_to_method_line(row: &SqliteRow) -> Result<PaymentMethodLine> {
        let payment_type: String = row.get("payment_type");
        Ok(PaymentMethodLine {
            id: parse_id(row.get("id"), "payment method line")?,
            journal_id: parse_id(row.get("journal_id"), "journal")?,
            payment_method_id: parse_id(row.get("payment_method_id"), "payment method")?,
            payment_type: PaymentType::from_str(&payment_type)
                .ok_or_else(|| anyhow!("Invalid payment type: {}", payment_type))?,
            name: row.get("name"),
            sequence: row.get("sequence"),
        })
    }

    // ========================
    // Moves and lines
    // ========================

    /// Insert a move and its lines. A move without a name gets the next name
    /// for `prefix`.
    pub async fn save_move(
        &self,
        conn: &mut SqliteConnection,
        entry: &mut Move,
        prefix: &str,
        lines: &[MoveLine],
    ) -> Result<()> {
        if entry.name.is_empty() {
            entry.name = self.next_name(conn, prefix).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO moves (id, name, move_type, state, partner_id, journal_id, date, currency, reversed_entry_id, payment_id, reference)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.name)
        .bind(entry.move_type.as_str())
        .bind(entry.state.as_str())
        .bind(entry.partner_id.map(|id| id.to_string()))
        .bind(entry.journal_id.to_string())
        .bind(entry.date.to_string())
        .bind(&entry.currency)
        .bind(entry.reversed_entry_id.map(|id| id.to_string()))
        .bind(entry.payment_id.map(|id| id.to_string()))
        .bind(&entry.reference)
        .execute(&mut *conn)
        .await
        .context("Failed to save move")?;

        for (position, line) in lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO move_lines (id, move_id, position, account_id, partner_id, label, debit, credit, residual, reconciled)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(line.id.to_string())
            .bind(entry.id.to_string())
            .bind(position as i64)
            .bind(line.account_id.to_string())
            .bind(line.partner_id.map(|id| id.to_string()))
            .bind(&line.label)
            .bind(line.debit)
            .bind(line.credit)
            .bind(line.residual)
            .bind(line.reconciled)
            .execute(&mut *conn)
            .await
            .context("Failed to save move line")?;
        }

        debug!(name = %entry.name, lines = lines.len(), "saved move");
        Ok(())
    }

    pub async fn post_move(&self, conn: &mut SqliteConnection, id: MoveId) -> Result<()> {
        sqlx::query("UPDATE moves SET state = ? WHERE id = ?")
            .bind(MoveState::Posted.as_str())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to post move")?;
        Ok(())
    }

    pub async fn get_move(&self, conn: &mut SqliteConnection, id: MoveId) -> Result<Option<Move>> {
        let sql = format!("SELECT {} FROM moves WHERE id = ?", MOVE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch move")?;
        row.as_ref().map(Self::row_to_move).transpose()
    }

    pub async fn find_move_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<Move>> {
        let sql = format!("SELECT {} FROM moves WHERE name = ?", MOVE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch move by name")?;
        row.as_ref().map(Self::row_to_move).transpose()
    }

    /// Documents whose back-reference points at one of `source_ids`, by name.
    pub async fn moves_reversing(
        &self,
        conn: &mut SqliteConnection,
        source_ids: &[MoveId],
    ) -> Result<Vec<Move>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM moves WHERE reversed_entry_id IN ({}) ORDER BY name",
            MOVE_COLUMNS,
            placeholders(source_ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in source_ids {
            query = query.bind(id.to_string());
        }
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .context("Failed to fetch reversing moves")?;
        rows.iter().map(Self::row_to_move).collect()
    }

    pub async fn list_moves(
        &self,
        conn: &mut SqliteConnection,
        move_type: Option<MoveType>,
    ) -> Result<Vec<Move>> {
        let rows = match move_type {
            Some(move_type) => {
                let sql = format!(
                    "SELECT {} FROM moves WHERE move_type = ? ORDER BY name",
                    MOVE_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(move_type.as_str())
                    .fetch_all(&mut *conn)
                    .await
            }
            None => {
                let sql = format!("SELECT {} FROM moves ORDER BY name", MOVE_COLUMNS);
                sqlx::query(&sql).fetch_all(&mut *conn).await
            }
        }
        .context("Failed to list moves")?;
        rows.iter().map(Self::row_to_move).collect()
    }

    fn row_to_move(row: &SqliteRow) -> Result<Move> {
        let move_type: String = row.get("move_type");
        let state: String = row.get("state");
        let date: String = row.get("date");
        Ok(Move {
            id: parse_id(row.get("id"), "move")?,
            name: row.get("name"),
            move_type: MoveType::from_str(&move_type)
                .ok_or_else(|| anyhow!("Invalid move type: {}", move_type))?,
            state: MoveState::from_str(&state)
                .ok_or_else(|| anyhow!("Invalid move state: {}", state))?,
            partner_id: parse_opt_id(row.get("partner_id"), "partner")?,
            journal_id: parse_id(row.get("journal_id"), "journal")?,
            date: parse_date(&date)?,
            currency: row.get("currency"),
            reversed_entry_id: parse_opt_id(row.get("reversed_entry_id"), "move")?,
            payment_id: parse_opt_id(row.get("payment_id"), "payment")?,
            reference: row.get("reference"),
        })
    }

    pub async fn lines_for_move(
        &self,
        conn: &mut SqliteConnection,
        move_id: MoveId,
    ) -> Result<Vec<MoveLine>> {
        let sql = format!("{} WHERE l.move_id = ? ORDER BY l.position", LINE_SELECT);
        let rows = sqlx::query(&sql)
            .bind(move_id.to_string())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to fetch move lines")?;
        rows.iter().map(Self::row_to_line).collect()
    }

    /// Lines of a move on receivable accounts.
    pub async fn receivable_lines(
        &self,
        conn: &mut SqliteConnection,
        move_id: MoveId,
    ) -> Result<Vec<MoveLine>> {
        let sql = format!(
            "{} WHERE l.move_id = ? AND a.account_type = ? ORDER BY l.position",
            LINE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(move_id.to_string())
            .bind(AccountType::AssetReceivable.as_str())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to fetch receivable lines")?;
        rows.iter().map(Self::row_to_line).collect()
    }

    /// Lines of a move on one account that are still open.
    pub async fn open_lines_on_account(
        &self,
        conn: &mut SqliteConnection,
        move_id: MoveId,
        account_id: AccountId,
    ) -> Result<Vec<MoveLine>> {
        let sql = format!(
            "{} WHERE l.move_id = ? AND l.account_id = ? AND l.reconciled = 0 AND l.residual <> 0 ORDER BY l.position",
            LINE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(move_id.to_string())
            .bind(account_id.to_string())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to fetch open lines")?;
        rows.iter().map(Self::row_to_line).collect()
    }

    pub async fn get_line(&self, conn: &mut SqliteConnection, id: LineId) -> Result<Option<MoveLine>> {
        let sql = format!("{} WHERE l.id = ?", LINE_SELECT);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch move line")?;
        row.as_ref().map(Self::row_to_line).transpose()
    }

    fn row_to_line(row: &SqliteRow) -> Result<MoveLine> {
        let account_type: String = row.get("account_type");
        Ok(MoveLine {
            id: parse_id(row.get("id"), "line")?,
            move_id: parse_id(row.get("move_id"), "move")?,
            account_id: parse_id(row.get("account_id"), "account")?,
            account_type: AccountType::from_str(&account_type)
                .ok_or_else(|| anyhow!("Invalid account type: {}", account_type))?,
            partner_id: parse_opt_id(row.get("partner_id"), "partner")?,
            label: row.get("label"),
            debit: row.get("debit"),
            credit: row.get("credit"),
            residual: row.get("residual"),
            reconciled: row.get::<i32, _>("reconciled") != 0,
        })
    }

    // ========================
    // Reconciliation
    // ========================

    /// Partial reconciliations on either side of a line, oldest first.
    pub async fn partials_for_line(
        &self,
        conn: &mut SqliteConnection,
        line_id: LineId,
    ) -> Result<Vec<PartialReconcile>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, debit_line_id, credit_line_id, amount
            FROM partial_reconciles
            WHERE debit_line_id = ? OR credit_line_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(line_id.to_string())
        .bind(line_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to fetch partial reconciliations")?;
        rows.iter().map(Self::row_to_partial).collect()
    }

    pub async fn get_partial(
        &self,
        conn: &mut SqliteConnection,
        id: PartialId,
    ) -> Result<Option<PartialReconcile>> {
        let row = sqlx::query(
            "SELECT id, sequence, debit_line_id, credit_line_id, amount FROM partial_reconciles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch partial reconciliation")?;
        row.as_ref().map(Self::row_to_partial).transpose()
    }

    /// Record the partials of a plan and write back the residual of every line
    /// it touched. Returns the partials with their sequence numbers.
    pub async fn apply_reconcile_plan(
        &self,
        conn: &mut SqliteConnection,
        plan: ReconcilePlan,
    ) -> Result<Vec<PartialReconcile>> {
        let mut recorded = Vec::with_capacity(plan.partials.len());
        for mut partial in plan.partials {
            partial.sequence = self.next_value(conn, "partial_reconcile").await?;
            sqlx::query(
                r#"
                INSERT INTO partial_reconciles (id, sequence, debit_line_id, credit_line_id, amount)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(partial.id.to_string())
            .bind(partial.sequence)
            .bind(partial.debit_line_id.to_string())
            .bind(partial.credit_line_id.to_string())
            .bind(partial.amount)
            .execute(&mut *conn)
            .await
            .context("Failed to save partial reconciliation")?;
            recorded.push(partial);
        }

        for (line_id, residual) in plan.residuals {
            sqlx::query("UPDATE move_lines SET residual = ?, reconciled = ? WHERE id = ?")
                .bind(residual)
                .bind(residual == 0)
                .bind(line_id.to_string())
                .execute(&mut *conn)
                .await
                .context("Failed to update line residual")?;
        }

        Ok(recorded)
    }

    /// Remove a partial reconciliation and reopen both lines for its amount.
    pub async fn delete_partial(&self, conn: &mut SqliteConnection, id: PartialId) -> Result<()> {
        let Some(partial) = self.get_partial(conn, id).await? else {
            bail!("Partial reconciliation not found: {}", id);
        };

        sqlx::query("DELETE FROM partial_reconciles WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to delete partial reconciliation")?;

        sqlx::query("UPDATE move_lines SET residual = residual + ?, reconciled = 0 WHERE id = ?")
            .bind(partial.amount)
            .bind(partial.debit_line_id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to reopen debit line")?;

        sqlx::query("UPDATE move_lines SET residual = residual - ?, reconciled = 0 WHERE id = ?")
            .bind(partial.amount)
            .bind(partial.credit_line_id.to_string())
            .execute(&mut *conn)
            .await
            .context("Failed to reopen credit line")?;

        debug!(partial = %id, amount = partial.amount, "deleted partial reconciliation");
        Ok(())
    }

    fn row_to_partial(row: &SqliteRow) -> Result<PartialReconcile> {
        Ok(PartialReconcile {
            id: parse_id(row.get("id"), "partial reconciliation")?,
            sequence: row.get("sequence"),
            debit_line_id: parse_id(row.get("debit_line_id"), "line")?,
            credit_line_id: parse_id(row.get("credit_line_id"), "line")?,
            amount: row.get("amount"),
        })
    }

    // ========================
    // Payments
    // ========================

    /// Create a payment together with its posted journal entry and post both.
    /// `counterpart` is the partner-side account (receivable for customers);
    /// the liquidity side is the journal's default account.
    pub async fn create_payment(
        &self,
        conn: &mut SqliteConnection,
        payment: &mut Payment,
        counterpart: &Account,
    ) -> Result<Move> {
        let journal = self
            .get_journal(conn, payment.journal_id)
            .await?
            .ok_or_else(|| anyhow!("Journal not found: {}", payment.journal_id))?;
        let liquidity = self
            .get_account(conn, journal.default_account_id)
            .await?
            .ok_or_else(|| anyhow!("Account not found: {}", journal.default_account_id))?;

        payment.name = self.next_name(conn, "PAY").await?;

        let mut entry = Move::new(
            MoveType::Entry,
            journal.id,
            payment.date,
            payment.currency.clone(),
        )
        .with_partner(payment.partner_id)
        .with_payment(payment.id);
        entry.name = payment.name.clone();
        entry.reference = payment.reference.clone();
        entry.state = MoveState::Posted;

        let lines = payment.entry_lines(entry.id, counterpart, &liquidity);
        self.save_move(conn, &mut entry, "PAY", &lines).await?;

        payment.move_id = Some(entry.id);
        payment.state = PaymentState::Posted;

        sqlx::query(
            r#"
            INSERT INTO payments (id, name, payment_type, partner_type, partner_id, journal_id, payment_method_line_id, date, amount, currency, reference, state, move_id, reverses, source_invoice_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(&payment.name)
        .bind(payment.payment_type.as_str())
        .bind(payment.partner_type.as_str())
        .bind(payment.partner_id.to_string())
        .bind(payment.journal_id.to_string())
        .bind(payment.payment_method_line_id.map(|id| id.to_string()))
        .bind(payment.date.to_string())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.reference)
        .bind(payment.state.as_str())
        .bind(payment.move_id.map(|id| id.to_string()))
        .bind(payment.reverses.map(|id| id.to_string()))
        .bind(payment.source_invoice_id.map(|id| id.to_string()))
        .execute(&mut *conn)
        .await
        .context("Failed to save payment")?;

        Ok(entry)
    }

    pub async fn get_payment(
        &self,
        conn: &mut SqliteConnection,
        id: PaymentId,
    ) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE id = ?", PAYMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch payment")?;
        row.as_ref().map(Self::row_to_payment).transpose()
    }

    pub async fn find_payment_by_name(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE name = ?", PAYMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch payment by name")?;
        row.as_ref().map(Self::row_to_payment).transpose()
    }

    /// The payment owning a journal entry, if the entry came from a payment.
    pub async fn payment_for_move(
        &self,
        conn: &mut SqliteConnection,
        move_id: MoveId,
    ) -> Result<Option<Payment>> {
        let sql = format!("SELECT {} FROM payments WHERE move_id = ?", PAYMENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(move_id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch payment for move")?;
        row.as_ref().map(Self::row_to_payment).transpose()
    }

    /// Refund payments created while reversing an invoice.
    pub async fn reversals_for_invoice(
        &self,
        conn: &mut SqliteConnection,
        invoice_id: MoveId,
    ) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE source_invoice_id = ? ORDER BY name",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(invoice_id.to_string())
            .fetch_all(&mut *conn)
            .await
            .context("Failed to fetch reversals for invoice")?;
        rows.iter().map(Self::row_to_payment).collect()
    }

    pub async fn list_payments(&self, conn: &mut SqliteConnection) -> Result<Vec<Payment>> {
        let sql = format!("SELECT {} FROM payments ORDER BY name", PAYMENT_COLUMNS);
        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to list payments")?;
        rows.iter().map(Self::row_to_payment).collect()
    }

    fn row_to_payment(row: &SqliteRow) -> Result<Payment> {
        let payment_type: String = row.get("payment_type");
        let partner_type: String = row.get("partner_type");
        let state: String = row.get("state");
        let date: String = row.get("date");
        Ok(Payment {
            id: parse_id(row.get("id"), "payment")?,
            name: row.get("name"),
            payment_type: PaymentType::from_str(&payment_type)
                .ok_or_else(|| anyhow!("Invalid payment type: {}", payment_type))?,
            partner_type: PartnerType::from_str(&partner_type)
                .ok_or_else(|| anyhow!("Invalid partner type: {}", partner_type))?,
            partner_id: parse_id(row.get("partner_id"), "partner")?,
            journal_id: parse_id(row.get("journal_id"), "journal")?,
            payment_method_line_id: parse_opt_id(
                row.get("payment_method_line_id"),
                "payment method line",
            )?,
            date: parse_date(&date)?,
            amount: row.get("amount"),
            currency: row.get("currency"),
            reference: row.get("reference"),
            state: PaymentState::from_str(&state)
                .ok_or_else(|| anyhow!("Invalid payment state: {}", state))?,
            move_id: parse_opt_id(row.get("move_id"), "move")?,
            reverses: parse_opt_id(row.get("reverses"), "payment")?,
            source_invoice_id: parse_opt_id(row.get("source_invoice_id"), "move")?,
        })
    }

    // ========================
    // Activity log
    // ========================

    pub async fn append_message(
        &self,
        conn: &mut SqliteConnection,
        message: &mut LogMessage,
    ) -> Result<()> {
        message.sequence = self.next_value(conn, "message").await?;
        sqlx::query(
            r#"
            INSERT INTO messages (id, sequence, move_id, subject, body, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.sequence)
        .bind(message.move_id.to_string())
        .bind(&message.subject)
        .bind(&message.body)
        .bind(&message.payload)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to append message")?;
        Ok(())
    }

    pub async fn messages_for_move(
        &self,
        conn: &mut SqliteConnection,
        move_id: MoveId,
    ) -> Result<Vec<LogMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sequence, move_id, subject, body, payload, created_at
            FROM messages
            WHERE move_id = ?
            ORDER BY sequence
            "#,
        )
        .bind(move_id.to_string())
        .fetch_all(&mut *conn)
        .await
        .context("Failed to fetch messages")?;
        rows.iter().map(Self::row_to_message).collect()
    }

    fn row_to_message(row: &SqliteRow) -> Result<LogMessage> {
        let created_at: String = row.get("created_at");
        Ok(LogMessage {
            id: parse_id(row.get("id"), "message")?,
            sequence: row.get("sequence"),
            move_id: parse_id(row.get("move_id"), "move")?,
            subject: row.get("subject"),
            body: row.get("body"),
            payload: row.get("payload"),
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Statistics
    // ========================

    pub async fn ledger_stats(&self, conn: &mut SqliteConnection) -> Result<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM moves) as move_count,
                (SELECT COUNT(*) FROM move_lines) as line_count,
                (SELECT COUNT(*) FROM partial_reconciles) as partial_count,
                (SELECT COUNT(*) FROM payments) as payment_count,
                (SELECT COUNT(*) FROM messages) as message_count,
                (SELECT COALESCE(SUM(ABS(l.residual)), 0)
                    FROM move_lines l JOIN accounts a ON a.id = l.account_id
                    WHERE a.account_type IN (?, ?)) as open_amount
            "#,
        )
        .bind(AccountType::AssetReceivable.as_str())
        .bind(AccountType::LiabilityPayable.as_str())
        .fetch_one(&mut *conn)
        .await
        .context("Failed to compute ledger statistics")?;

        Ok(LedgerStats {
            move_count: row.get("move_count"),
            line_count: row.get("line_count"),
            partial_count: row.get("partial_count"),
            payment_count: row.get("payment_count"),
            message_count: row.get("message_count"),
            open_amount: row.get("open_amount"),
        })
    }
}

fn parse_id(value: String, what: &str) -> Result<Uuid> {
    Uuid::parse_str(&value).with_context(|| format!("Invalid {} ID: {}", what, value))
}

fn parse_opt_id(value: Option<String>, what: &str) -> Result<Option<Uuid>> {
    value.map(|v| parse_id(v, what)).transpose()
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    value
        .parse::<NaiveDate>()
        .with_context(|| format!("Invalid date: {}", value))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
