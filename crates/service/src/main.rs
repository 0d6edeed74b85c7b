//! AgentPay CLI - Main entry point

use agentpay_ledger::{AccountType, PostingInput};
use agentpay_service::{commands, AppContext, PlatformConfig};
use agentpay_workflow::{Rail, RailPreferences, SelectionPriority};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentpay")]
#[command(about = "AgentPay - double-entry ledger and payment core", long_about = None)]
struct Cli {
    /// JSON config file; AGENTPAY_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory path
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create storage, optionally seeding an agent's chart of accounts
    Init {
        #[arg(long)]
        agent: Option<String>,
    },

    /// Create a ledger account
    CreateAccount {
        agent: String,
        name: String,
        /// asset, liability, equity, revenue or expense
        account_type: AccountType,
        /// Defaults to USD
        #[arg(long)]
        currency: Option<String>,
    },

    /// Post a balanced transaction
    Post {
        agent: String,
        description: String,
        /// ACCOUNT_ID=AMOUNT, positive debits and negative credits
        #[arg(long = "leg", required = true, value_parser = commands::parse_leg)]
        legs: Vec<PostingInput>,
        /// External reference id
        #[arg(long)]
        reference: Option<String>,
    },

    /// List live account balances
    Balances { agent: String },

    /// Balance sheet, optionally as of a past instant (RFC3339)
    BalanceSheet {
        agent: String,
        #[arg(long)]
        as_of: Option<DateTime<Utc>>,
    },

    /// Trial balance over the last N days
    TrialBalance {
        agent: String,
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Verify the transaction chain and balance integrity
    Verify { agent: String },

    /// Anchor new transactions into the block chain
    Anchor { agent: String },

    /// Publish pending outbox events
    Relay {
        /// Keep polling until Ctrl-C
        #[arg(long)]
        follow: bool,
    },

    /// Audit activity summary over the last N days
    AuditSummary {
        #[arg(long, default_value = "7")]
        days: i64,
    },

    /// Run a payment through risk, consent and execution
    Pay {
        agent: String,
        amount: Decimal,
        counterparty: String,
        /// Rail to use; selected automatically when omitted
        #[arg(long)]
        rail: Option<Rail>,
        /// Selection priority: optimal, speed, cost or security
        #[arg(long, default_value = "optimal")]
        priority: SelectionPriority,
        #[arg(long = "prefer")]
        preferred: Vec<Rail>,
        #[arg(long = "exclude")]
        excluded: Vec<Rail>,
        #[arg(long)]
        description: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PlatformConfig::from_file(path)?,
        None => PlatformConfig::default(),
    }
    .with_overrides(|key| std::env::var(key).ok())?;
    if let Some(data) = cli.data {
        config.data_dir = data;
    }

    let ctx = AppContext::new(config).await?;

    match cli.command {
        Commands::Init { agent } => commands::init(&ctx, agent.as_deref()).await?,

        Commands::CreateAccount {
            agent,
            name,
            account_type,
            currency,
        } => commands::create_account(&ctx, &agent, &name, account_type, currency.as_deref()).await?,

        Commands::Post {
            agent,
            description,
            legs,
            reference,
        } => commands::post(&ctx, &agent, &description, legs, reference).await?,

        Commands::Balances { agent } => commands::balances(&ctx, &agent).await?,

        Commands::BalanceSheet { agent, as_of } => commands::balance_sheet(&ctx, &agent, as_of).await?,

        Commands::TrialBalance { agent, days } => commands::trial_balance(&ctx, &agent, days).await?,

        Commands::Verify { agent } => commands::verify(&ctx, &agent).await?,

        Commands::Anchor { agent } => commands::anchor(&ctx, &agent).await?,

        Commands::Relay { follow } => commands::relay(&ctx, follow).await?,

        Commands::AuditSummary { days } => commands::audit_summary(&ctx, days).await?,

        Commands::Pay {
            agent,
            amount,
            counterparty,
            rail,
            priority,
            preferred,
            excluded,
            description,
        } => {
            let preferences = RailPreferences {
                priority,
                preferred,
                excluded,
                ..Default::default()
            };
            commands::pay(&ctx, &agent, amount, &counterparty, rail, preferences, description).await?
        }
    }

    Ok(())
}
