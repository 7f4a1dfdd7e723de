use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{AttendanceReceipt, AttendanceService};
use crate::domain::{FixedClock, InvoiceStatus, MembershipState};

/// Palestra - Gym memberships and monthly invoices
#[derive(Parser)]
#[command(name = "palestra")]
#[command(about = "Track gym membership credits and bill check-ins/check-outs on monthly invoices")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "PALESTRA_DATABASE", default_value = "palestra.db")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Pretend today is this date (YYYY-MM-DD)
    #[arg(long, env = "PALESTRA_TODAY", global = true)]
    pub today: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Membership management commands
    #[command(subcommand)]
    Membership(MembershipCommands),

    /// Check a member in (takes one credit)
    CheckIn {
        /// User ID or email
        user: String,

        /// Print the receipt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a member out (gives one credit back)
    CheckOut {
        /// User ID or email
        user: String,

        /// Print the receipt as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoice commands
    #[command(subcommand)]
    Invoice(InvoiceCommands),

    /// Verify that invoice totals match their lines
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: invoices, lines, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Only export lines of this invoice
        #[arg(long)]
        invoice: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Create {
        /// Email address (must be unique)
        email: String,

        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// List all users
    List,

    /// Show user details, membership and current invoice
    Show {
        /// User ID or email
        user: String,
    },
}

#[derive(Subcommand)]
pub enum MembershipCommands {
    /// Create a membership for a user
    Create {
        /// User ID or email
        user: String,

        /// Initial credits
        #[arg(short, long, allow_negative_numbers = true)]
        credits: i64,

        /// Start date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// State: active, cancelled
        #[arg(long, default_value = "active")]
        state: String,
    },

    /// Show a user's membership
    Show {
        /// User ID or email
        user: String,
    },

    /// Cancel a user's membership
    Cancel {
        /// User ID or email
        user: String,
    },

    /// Delete a user's membership
    Delete {
        /// User ID or email
        user: String,
    },
}

#[derive(Subcommand)]
pub enum InvoiceCommands {
    /// List invoices
    List {
        /// Filter by user ID or email
        #[arg(long)]
        user: Option<String>,
    },

    /// Show an invoice and its lines
    Show {
        /// Invoice ID
        id: String,
    },

    /// Add a line to an invoice by hand
    AddLine {
        /// Invoice ID
        id: String,

        /// Line amount
        amount: i64,

        /// Line description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Change an invoice's status
    Status {
        /// Invoice ID
        id: String,

        /// New status: outstanding, paid, void
        status: String,
    },
}

async fn open_service(database: &str, today: Option<&str>) -> Result<AttendanceService> {
    let service = AttendanceService::connect(database).await?;
    Ok(match today {
        Some(date_str) => service.with_clock(FixedClock(parse_date(date_str)?)),
        None => service,
    })
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                AttendanceService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::User(cmd) => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                run_user_command(&service, cmd).await?;
            }

            Commands::Membership(cmd) => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                run_membership_command(&service, cmd).await?;
            }

            Commands::CheckIn { user, json } => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                let user = service.resolve_user(&user).await?;
                let receipt = service.check_in(user.id).await?;
                print_receipt("Checked in", &user.email, &receipt, json)?;
            }

            Commands::CheckOut { user, json } => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                let user = service.resolve_user(&user).await?;
                let receipt = service.check_out(user.id).await?;
                print_receipt("Checked out", &user.email, &receipt, json)?;
            }

            Commands::Invoice(cmd) => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                run_invoice_command(&service, cmd).await?;
            }

            Commands::Check => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
                invoice,
            } => {
                let service = open_service(&self.database, self.today.as_deref()).await?;
                let invoice_id = invoice.as_deref().map(parse_id).transpose()?;
                run_export_command(&service, &export_type, output.as_deref(), invoice_id).await?;
            }
        }

        Ok(())
    }
}

fn print_receipt(action: &str, email: &str, receipt: &AttendanceReceipt, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(receipt)?);
        return Ok(());
    }

    println!("{}: {}", action, email);
    println!("  Invoice:       {} ({})", receipt.invoice_id, receipt.month);
    println!("  Invoice line:  {}", receipt.invoice_line_id);
    println!("  Invoice total: {}", receipt.invoice_amount);
    println!("  Credits left:  {}", receipt.credits);
    Ok(())
}

async fn run_user_command(service: &AttendanceService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Create { email, name } => {
            let user = service.register_user(&email, &name).await?;
            println!("Created user: {} ({})", user.email, user.id);
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<38} {:<30} {}", "ID", "EMAIL", "NAME");
                println!("{}", "-".repeat(90));
                for user in users {
                    println!("{:<38} {:<30} {}", user.id, user.email, user.name);
                }
            }
        }

        UserCommands::Show { user } => {
            let user = service.resolve_user(&user).await?;
            println!("User: {}", user.email);
            println!("  ID:      {}", user.id);
            if !user.name.is_empty() {
                println!("  Name:    {}", user.name);
            }
            println!("  Created: {}", user.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!();

            match service.find_membership(user.id).await? {
                Some(membership) => {
                    println!("  Membership: {}", membership.state);
                    println!("    Credits:  {}", membership.credits);
                    println!(
                        "    Valid:    {} to {}",
                        membership.start_date, membership.end_date
                    );
                }
                None => println!("  Membership: none"),
            }

            match service.current_invoice(user.id).await? {
                Some(invoice) => println!(
                    "  Invoice {}: {} ({}, amount {})",
                    invoice.month, invoice.id, invoice.status, invoice.amount
                ),
                None => println!("  No invoice for {}", service.current_month()),
            }
        }
    }
    Ok(())
}

async fn run_membership_command(service: &AttendanceService, cmd: MembershipCommands) -> Result<()> {
    match cmd {
        MembershipCommands::Create {
            user,
            credits,
            start,
            end,
            state,
        } => {
            let user = service.resolve_user(&user).await?;
            let start_date = match start {
                Some(s) => parse_date(&s)?,
                None => service.today(),
            };
            let end_date = parse_date(&end)?;
            let state = MembershipState::from_str(&state).ok_or_else(|| {
                anyhow::anyhow!("Invalid state '{}'. Valid states: active, cancelled", state)
            })?;

            let membership = service
                .create_membership(user.id, credits, start_date, end_date, state)
                .await?;
            println!(
                "Created membership for {}: {} credits, {} to {} ({})",
                user.email,
                membership.credits,
                membership.start_date,
                membership.end_date,
                membership.state
            );
        }

        MembershipCommands::Show { user } => {
            let user = service.resolve_user(&user).await?;
            let membership = service.get_membership(user.id).await?;
            println!("Membership: {}", user.email);
            println!("  ID:      {}", membership.id);
            println!("  State:   {}", membership.state);
            println!("  Credits: {}", membership.credits);
            println!("  Start:   {}", membership.start_date);
            println!("  End:     {}", membership.end_date);
        }

        MembershipCommands::Cancel { user } => {
            let user = service.resolve_user(&user).await?;
            service.cancel_membership(user.id).await?;
            println!("Cancelled membership of {}", user.email);
        }

        MembershipCommands::Delete { user } => {
            let user = service.resolve_user(&user).await?;
            service.delete_membership(user.id).await?;
            println!("Deleted membership of {}", user.email);
        }
    }
    Ok(())
}

async fn run_invoice_command(service: &AttendanceService, cmd: InvoiceCommands) -> Result<()> {
    match cmd {
        InvoiceCommands::List { user } => {
            let user_id = match user {
                Some(reference) => Some(service.resolve_user(&reference).await?.id),
                None => None,
            };
            let invoices = service.list_invoices(user_id).await?;

            if invoices.is_empty() {
                println!("No invoices found.");
            } else {
                println!(
                    "{:<38} {:<8} {:<12} {:>8}  {}",
                    "ID", "MONTH", "STATUS", "AMOUNT", "DESCRIPTION"
                );
                println!("{}", "-".repeat(100));
                for invoice in invoices {
                    println!(
                        "{:<38} {:<8} {:<12} {:>8}  {}",
                        invoice.id,
                        invoice.month,
                        invoice.status,
                        invoice.amount,
                        truncate(&invoice.description, 30)
                    );
                }
            }
        }

        InvoiceCommands::Show { id } => {
            let detail = service.get_invoice_detail(parse_id(&id)?).await?;
            let invoice = &detail.invoice;
            let owner = service.get_user(invoice.user_id).await?;

            println!("Invoice: {}", invoice.id);
            println!("  User:        {}", owner.email);
            println!("  Month:       {}", invoice.month);
            println!("  Status:      {}", invoice.status);
            println!("  Description: {}", invoice.description);
            println!("  Amount:      {}", invoice.amount);
            println!();

            if detail.lines.is_empty() {
                println!("  No lines.");
            } else {
                println!("  {:<38} {:>6}  {:<20} {}", "LINE", "AMOUNT", "CREATED", "DESCRIPTION");
                for line in &detail.lines {
                    println!(
                        "  {:<38} {:>6}  {:<20} {}",
                        line.id,
                        line.amount,
                        line.created_at.format("%Y-%m-%d %H:%M:%S"),
                        line.description
                    );
                }
            }
        }

        InvoiceCommands::AddLine {
            id,
            amount,
            description,
        } => {
            let line = service
                .add_invoice_line(parse_id(&id)?, amount, &description)
                .await?;
            let invoice = service.get_invoice(line.invoice_id).await?;
            println!(
                "Added line {} ({}) to invoice {}; new total {}",
                line.id, line.amount, invoice.id, invoice.amount
            );
        }

        InvoiceCommands::Status { id, status } => {
            let status = InvoiceStatus::from_str(&status).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid status '{}'. Valid statuses: outstanding, paid, void",
                    status
                )
            })?;
            let invoice = service.set_invoice_status(parse_id(&id)?, status).await?;
            println!("Invoice {} is now {}", invoice.id, invoice.status);
        }
    }
    Ok(())
}

async fn run_check_command(service: &AttendanceService) -> Result<()> {
    println!("Checking invoice integrity...\n");

    let report = service.check_integrity().await?;

    println!("Invoices: {}", report.invoice_count);
    println!("Lines:    {}", report.line_count);
    println!();

    if report.is_healthy() {
        println!("All invoice totals match their lines.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Invoice integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &AttendanceService,
    export_type: &str,
    output: Option<&str>,
    invoice_id: Option<Uuid>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

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
        "invoices" => {
            let count = exporter.export_invoices_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} invoices", count);
            }
        }
        "lines" => {
            let count = exporter.export_lines_csv(writer, invoice_id).await?;
            if output.is_some() {
                eprintln!("Exported {} invoice lines", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} users, {} memberships, {} invoices, {} lines",
                    snapshot.users.len(),
                    snapshot.memberships.len(),
                    snapshot.invoices.len(),
                    snapshot.invoice_lines.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: invoices, lines, full",
                export_type
            );
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}'. Use YYYY-MM-DD", date_str))
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).with_context(|| format!("Invalid ID '{}' (expected UUID)", id))
}
