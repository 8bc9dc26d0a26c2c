use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use crate::application::{
    InvoiceItem, LedgerService, NewInvoice, NewPayment, ReversalAction, ReversalSummary,
    WizardConfig, WizardOutcome,
};
use crate::domain::{
    AccountType, JournalType, MoveType, PartnerType, PaymentType, format_amount, format_cents,
    parse_cents, total_allocated,
};

/// Storno - credit notes that take the payments with them
#[derive(Parser)]
#[command(name = "storno")]
#[command(about = "Reverse customer invoices together with the payments applied to them")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        env = "STORNO_DATABASE",
        default_value = "storno.db",
        global = true
    )]
    pub database: String,

    /// Company currency for new documents
    #[arg(long, env = "STORNO_CURRENCY", default_value = "EUR", global = true)]
    pub currency: String,

    /// How credit notes are generated: refund_moves (posted) or reverse_moves (draft)
    #[arg(
        long,
        env = "STORNO_REVERSAL_ACTION",
        default_value = "refund_moves",
        global = true
    )]
    pub reversal_action: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Partner management commands
    #[command(subcommand)]
    Partner(PartnerCommands),

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Journal management commands
    #[command(subcommand)]
    Journal(JournalCommands),

    /// Payment method commands
    #[command(subcommand)]
    Method(MethodCommands),

    /// Invoice commands
    #[command(subcommand)]
    Invoice(InvoiceCommands),

    /// Payment commands
    #[command(subcommand)]
    Payment(PaymentCommands),

    /// Show the customer payments applied to an invoice
    Allocations {
        /// Invoice name (e.g., INV/0001)
        invoice: String,
    },

    /// Reverse invoices: unlink payments, credit, refund and log
    Reverse {
        /// Invoice names
        #[arg(required = true)]
        invoices: Vec<String>,

        /// Accounting date of credit notes and refunds (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        /// Reason appended to the credit note reference
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Log the current payment situation of invoices without changing anything
    Report {
        /// Invoice names
        #[arg(required = true)]
        invoices: Vec<String>,
    },

    /// Show a document with its lines and reconciliations
    Show {
        /// Move name (e.g., INV/0001, CN/0001, PAY/0001)
        name: String,
    },

    /// Show the activity log of a document
    Log {
        /// Move name
        name: String,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: moves, payments, allocations, log, full
        export_type: String,

        /// Document the export is about (required for allocations and log)
        #[arg(long)]
        document: Option<String>,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum PartnerCommands {
    /// Create a new partner
    Add { name: String },
    /// List all partners
    List,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Add {
        /// Account code (e.g., 1100)
        code: String,
        /// Account name
        name: String,
        /// Account type: receivable, payable, cash, income, expense
        #[arg(short = 't', long = "type")]
        account_type: String,
    },
    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum JournalCommands {
    /// Create a new journal
    Add {
        /// Journal code (e.g., BNK1)
        code: String,
        /// Journal name
        name: String,
        /// Journal type: sale, bank, cash
        #[arg(short = 't', long = "type")]
        journal_type: String,
        /// Code of the default account (income for sales, liquidity for bank and cash)
        #[arg(long)]
        account: String,
    },
    /// List all journals
    List,
}

#[derive(Subcommand)]
pub enum MethodCommands {
    /// Create a payment method
    Add {
        /// Method code (e.g., manual); may be empty
        code: String,
        /// Method name
        name: String,
    },
    /// Enable a payment method on a journal for one direction
    Line {
        /// Journal code
        journal: String,
        /// Method name
        method: String,
        /// Direction: inbound or outbound
        #[arg(long, default_value = "inbound")]
        direction: String,
    },
}

#[derive(Subcommand)]
pub enum InvoiceCommands {
    /// Create and post a customer invoice
    Create {
        /// Customer name
        partner: String,
        /// Sales journal code
        #[arg(long)]
        journal: String,
        /// Receivable account code
        #[arg(long)]
        account: String,
        /// Invoice item as LABEL=AMOUNT (repeatable)
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        /// Installment amount (repeatable; one line for the total if omitted)
        #[arg(long = "installment")]
        installments: Vec<String>,
        /// Invoice date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Free text reference
        #[arg(long)]
        reference: Option<String>,
    },
    /// List invoices
    List,
}

#[derive(Subcommand)]
pub enum PaymentCommands {
    /// Register a customer payment and apply it to invoices
    Register {
        /// Partner name
        partner: String,
        /// Amount (e.g., "700.00")
        amount: String,
        /// Bank or cash journal code
        #[arg(long)]
        journal: String,
        /// Payment method name
        #[arg(long)]
        method: Option<String>,
        /// Invoice to apply the payment to (repeatable)
        #[arg(long = "invoice")]
        invoices: Vec<String>,
        /// Counterpart account code (defaults to the invoice's receivable account)
        #[arg(long)]
        account: Option<String>,
        /// Record the payment for a supplier instead of a customer
        #[arg(long)]
        supplier: bool,
        /// Payment date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Free text reference
        #[arg(long)]
        reference: Option<String>,
    },
    /// List all payments
    List,
}

impl Cli {
    fn config(&self) -> Result<WizardConfig> {
        let action = ReversalAction::from_str(&self.reversal_action).with_context(|| {
            format!(
                "Invalid reversal action '{}'. Valid: refund_moves, reverse_moves",
                self.reversal_action
            )
        })?;
        Ok(WizardConfig::default()
            .with_reversal_action(action)
            .with_company_currency(self.currency.clone()))
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;

        match self.command {
            Commands::Init => {
                LedgerService::init(&self.database, config).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Partner(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_partner_command(&service, cmd).await?;
            }

            Commands::Account(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_account_command(&service, cmd).await?;
            }

            Commands::Journal(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_journal_command(&service, cmd).await?;
            }

            Commands::Method(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_method_command(&service, cmd).await?;
            }

            Commands::Invoice(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_invoice_command(&service, cmd).await?;
            }

            Commands::Payment(cmd) => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_payment_command(&service, cmd).await?;
            }

            Commands::Allocations { invoice } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let allocations = service.allocations(&invoice).await?;
                if allocations.is_empty() {
                    println!("No customer payments applied to {}.", invoice);
                } else {
                    println!("{:<12} {:<12} {:<20} {:>15}", "PAYMENT", "ENTRY", "JOURNAL", "AMOUNT");
                    println!("{}", "-".repeat(62));
                    for a in &allocations {
                        println!(
                            "{:<12} {:<12} {:<20} {:>15}",
                            a.payment.name,
                            a.payment_move_name,
                            a.journal_name,
                            format_cents(a.amount)
                        );
                    }
                    println!("{}", "-".repeat(62));
                    println!("{:<46} {:>15}", "TOTAL", format_cents(total_allocated(&allocations)));
                }
            }

            Commands::Reverse {
                invoices,
                date,
                reason,
            } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let mut request = service.request_for(&invoices).await?;
                if let Some(date_str) = date {
                    request = request.with_date(parse_date(&date_str)?);
                }
                if let Some(reason) = reason {
                    request = request.with_reason(reason);
                }
                let summary = service.reverse(&request).await?;
                print_summary(&summary);
            }

            Commands::Report { invoices } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let request = service.request_for(&invoices).await?;
                let summary = service.report(&request).await?;
                print_summary(&summary);
            }

            Commands::Show { name } => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_show_command(&service, &name).await?;
            }

            Commands::Log { name } => {
                let service = LedgerService::connect(&self.database, config).await?;
                let messages = service.activity_log(&name).await?;
                if messages.is_empty() {
                    println!("No messages for {}.", name);
                }
                for message in &messages {
                    println!(
                        "[{}] #{} {}",
                        message.created_at.format("%Y-%m-%d %H:%M:%S"),
                        message.sequence,
                        message.subject
                    );
                    println!("{}", message.body);
                }
            }

            Commands::Export {
                export_type,
                document,
                output,
            } => {
                let service = LedgerService::connect(&self.database, config).await?;
                run_export_command(&service, &export_type, document.as_deref(), output.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

async fn run_partner_command(service: &LedgerService, cmd: PartnerCommands) -> Result<()> {
    match cmd {
        PartnerCommands::Add { name } => {
            let partner = service.create_partner(&name).await?;
            println!("Created partner: {}", partner.name);
        }
        PartnerCommands::List => {
            let partners = service.list_partners().await?;
            if partners.is_empty() {
                println!("No partners found.");
            }
            for partner in &partners {
                println!("{}", partner.name);
            }
        }
    }
    Ok(())
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Add {
            code,
            name,
            account_type,
        } => {
            let account_type = AccountType::from_str(&account_type).with_context(|| {
                format!(
                    "Invalid account type '{}'. Valid: receivable, payable, cash, income, expense",
                    account_type
                )
            })?;
            let account = service.create_account(&code, &name, account_type).await?;
            println!("Created account: {} ({})", account.display_name(), account.account_type);
        }
        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<10} {:<30} {:<20}", "CODE", "NAME", "TYPE");
                println!("{}", "-".repeat(60));
                for account in &accounts {
                    println!(
                        "{:<10} {:<30} {:<20}",
                        account.code, account.name, account.account_type
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_journal_command(service: &LedgerService, cmd: JournalCommands) -> Result<()> {
    match cmd {
        JournalCommands::Add {
            code,
            name,
            journal_type,
            account,
        } => {
            let journal_type = JournalType::from_str(&journal_type).with_context(|| {
                format!("Invalid journal type '{}'. Valid: sale, bank, cash", journal_type)
            })?;
            let journal = service
                .create_journal(&code, &name, journal_type, &account)
                .await?;
            println!("Created journal: {} ({})", journal.code, journal.journal_type);
        }
        JournalCommands::List => {
            let journals = service.list_journals().await?;
            if journals.is_empty() {
                println!("No journals found.");
            } else {
                println!("{:<10} {:<30} {:<8}", "CODE", "NAME", "TYPE");
                println!("{}", "-".repeat(50));
                for journal in &journals {
                    println!(
                        "{:<10} {:<30} {:<8}",
                        journal.code, journal.name, journal.journal_type
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_method_command(service: &LedgerService, cmd: MethodCommands) -> Result<()> {
    match cmd {
        MethodCommands::Add { code, name } => {
            let method = service.create_payment_method(&code, &name).await?;
            println!("Created payment method: {}", method.name);
        }
        MethodCommands::Line {
            journal,
            method,
            direction,
        } => {
            let payment_type = PaymentType::from_str(&direction).with_context(|| {
                format!("Invalid direction '{}'. Valid: inbound, outbound", direction)
            })?;
            let line = service
                .add_payment_method_line(&journal, &method, payment_type)
                .await?;
            println!("Enabled {} on journal {}", line.name, journal);
        }
    }
    Ok(())
}

async fn run_invoice_command(service: &LedgerService, cmd: InvoiceCommands) -> Result<()> {
    match cmd {
        InvoiceCommands::Create {
            partner,
            journal,
            account,
            items,
            installments,
            date,
            reference,
        } => {
            let items = items
                .iter()
                .map(|item| parse_item(item))
                .collect::<Result<Vec<_>>>()?;
            let installments = installments
                .iter()
                .map(|a| parse_cents(a).with_context(|| format!("Invalid installment '{}'", a)))
                .collect::<Result<Vec<_>>>()?;
            let date = parse_optional_date(date)?;

            let (invoice, lines) = service
                .create_invoice(NewInvoice {
                    partner,
                    journal,
                    receivable_account: account,
                    date,
                    items,
                    installments,
                    reference,
                })
                .await?;
            let total: i64 = lines.iter().map(|l| l.debit).sum();
            println!(
                "Created invoice: {} {}",
                invoice.name,
                format_amount(total, &invoice.currency)
            );
        }
        InvoiceCommands::List => {
            let invoices = service.list_moves(Some(MoveType::OutInvoice)).await?;
            if invoices.is_empty() {
                println!("No invoices found.");
            } else {
                println!("{:<12} {:<12} {:<8}", "NAME", "DATE", "STATE");
                println!("{}", "-".repeat(34));
                for invoice in &invoices {
                    println!("{:<12} {:<12} {:<8}", invoice.name, invoice.date, invoice.state);
                }
            }
        }
    }
    Ok(())
}

async fn run_payment_command(service: &LedgerService, cmd: PaymentCommands) -> Result<()> {
    match cmd {
        PaymentCommands::Register {
            partner,
            amount,
            journal,
            method,
            invoices,
            account,
            supplier,
            date,
            reference,
        } => {
            let amount =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let date = parse_optional_date(date)?;

            let mut input = NewPayment::customer_inbound(partner, journal, amount, date);
            if supplier {
                input.partner_type = PartnerType::Supplier;
            }
            input.method = method;
            input.apply_to = invoices;
            input.account = account;
            input.reference = reference;

            let result = service.register_payment(input).await?;
            println!(
                "Registered payment: {} {} ({} matches)",
                result.payment.name,
                format_amount(result.payment.amount, &result.payment.currency),
                result.partials.len()
            );
        }
        PaymentCommands::List => {
            let payments = service.list_payments().await?;
            if payments.is_empty() {
                println!("No payments found.");
            } else {
                println!(
                    "{:<12} {:<10} {:<10} {:<12} {:>15}",
                    "NAME", "TYPE", "PARTNER", "DATE", "AMOUNT"
                );
                println!("{}", "-".repeat(62));
                for p in &payments {
                    println!(
                        "{:<12} {:<10} {:<10} {:<12} {:>15}",
                        p.name,
                        p.payment_type,
                        p.partner_type.as_str(),
                        p.date,
                        format_cents(p.amount)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_show_command(service: &LedgerService, name: &str) -> Result<()> {
    let info = service.get_document(name).await?;
    let doc = &info.document;

    println!("Document: {}", doc.name);
    println!("  ID:        {}", doc.id);
    println!("  Type:      {}", doc.move_type);
    println!("  State:     {}", doc.state);
    println!("  Date:      {}", doc.date);
    println!("  Currency:  {}", doc.currency);
    if let Some(reference) = &doc.reference {
        println!("  Reference: {}", reference);
    }
    if let Some(payment) = &info.payment {
        println!("  Payment:   {} ({})", payment.name, payment.payment_type);
    }

    println!();
    println!("{:<30} {:>15} {:>15} {:>15}", "LABEL", "DEBIT", "CREDIT", "OPEN");
    println!("{}", "-".repeat(78));
    for line in &info.lines {
        println!(
            "{:<30} {:>15} {:>15} {:>15}",
            line.label,
            format_cents(line.debit),
            format_cents(line.credit),
            format_cents(line.residual)
        );
    }

    if !info.partials.is_empty() {
        println!();
        println!("Reconciliations:");
        for partial in &info.partials {
            println!("  #{} {}", partial.sequence, format_cents(partial.amount));
        }
    }

    if !info.credit_notes.is_empty() {
        println!();
        println!("Credit notes:");
        for credit_note in &info.credit_notes {
            println!("  {} ({})", credit_note.name, credit_note.state);
        }
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    document: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "moves" => {
            let count = exporter.export_moves_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} moves", count);
            }
        }
        "payments" => {
            let count = exporter.export_payments_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} payments", count);
            }
        }
        "allocations" => {
            let invoice = document.context("--document is required for allocations")?;
            let count = exporter.export_allocations_csv(invoice, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} allocations", count);
            }
        }
        "log" => {
            let name = document.context("--document is required for log")?;
            let messages = exporter.export_activity_log_json(name, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} messages", messages.len());
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} moves, {} payments",
                    snapshot.moves.len(),
                    snapshot.payments.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: moves, payments, allocations, log, full",
                export_type
            );
        }
    }

    Ok(())
}

fn print_summary(summary: &ReversalSummary) {
    for reversal in &summary.invoices {
        println!("{}", reversal.entry.render());
        println!();
    }
    if let WizardOutcome::OpenCreditNotes(ids) = &summary.outcome {
        println!(
            "Created {} credit note(s) and {} refund(s)",
            ids.len(),
            summary.refund_count()
        );
    }
}

fn parse_item(item: &str) -> Result<InvoiceItem> {
    let (label, amount) = item
        .rsplit_once('=')
        .with_context(|| format!("Invalid item '{}'. Use LABEL=AMOUNT", item))?;
    let amount =
        parse_cents(amount).with_context(|| format!("Invalid amount in item '{}'", item))?;
    Ok(InvoiceItem::new(label.trim(), amount))
}

fn parse_optional_date(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(date_str) => parse_date(&date_str),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))
}
