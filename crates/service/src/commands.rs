//! CLI commands

use crate::context::AppContext;
use agentpay_events::LoggingPublisher;
use agentpay_ledger::{AccountType, NewAccount, PostTransaction, PostingInput};
use agentpay_workflow::{PaymentRequest, Rail, RailPreferences};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

/// Standard chart of accounts seeded by `init --agent`
const DEFAULT_CHART: [(&str, AccountType); 5] = [
    ("Cash", AccountType::Asset),
    ("Payables", AccountType::Liability),
    ("Owner Capital", AccountType::Equity),
    ("Revenue", AccountType::Revenue),
    ("Operating Expenses", AccountType::Expense),
];

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prepare storage, optionally seeding an agent with a chart of accounts
pub async fn init(ctx: &AppContext, agent_id: Option<&str>) -> anyhow::Result<()> {
    println!("✅ Storage ready at {}", ctx.config.database_url());

    let Some(agent_id) = agent_id else {
        return Ok(());
    };
    if !ctx.ledger.list_accounts(agent_id).await?.is_empty() {
        anyhow::bail!("Agent {} already has accounts", agent_id);
    }

    for (name, account_type) in DEFAULT_CHART {
        let account = ctx
            .engine
            .create_account(NewAccount::new(agent_id, name, account_type))
            .await?;
        println!("   {:<20} {:<10} {}", account.name, account.account_type, account.id);
    }
    Ok(())
}

pub async fn create_account(
    ctx: &AppContext,
    agent_id: &str,
    name: &str,
    account_type: AccountType,
    currency: Option<&str>,
) -> anyhow::Result<()> {
    let mut request = NewAccount::new(agent_id, name, account_type);
    if let Some(currency) = currency {
        request = request.currency(currency);
    }

    let account = ctx.engine.create_account(request).await?;
    println!(
        "✅ Created {} account {} ({}) for {}",
        account.account_type, account.name, account.id, agent_id
    );
    Ok(())
}

/// Post a balanced set of legs, each given as `ACCOUNT_ID=AMOUNT`
pub async fn post(
    ctx: &AppContext,
    agent_id: &str,
    description: &str,
    legs: Vec<PostingInput>,
    reference: Option<String>,
) -> anyhow::Result<()> {
    let mut request = PostTransaction::new(agent_id, description);
    request.postings = legs;
    if let Some(reference) = reference {
        request = request.reference(reference);
    }

    let tx = ctx.engine.post_transaction(request).await?;
    println!(
        "✅ Posted {} {} {} (block {}, hash {})",
        tx.id, tx.amount, tx.currency, tx.block_index, tx.current_hash
    );
    Ok(())
}

/// Parse `ACCOUNT_ID=AMOUNT`
pub fn parse_leg(raw: &str) -> Result<PostingInput, String> {
    let (account_id, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ACCOUNT_ID=AMOUNT, got {:?}", raw))?;
    let amount: Decimal = amount
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount {:?}: {}", amount, e))?;
    Ok(PostingInput::new(account_id.trim(), amount))
}

pub async fn balances(ctx: &AppContext, agent_id: &str) -> anyhow::Result<()> {
    let balances = ctx.balances.get_agent_balances(agent_id).await?;
    if balances.is_empty() {
        println!("No accounts for {}", agent_id);
        return Ok(());
    }

    println!("Balances for {}:", agent_id);
    for b in &balances {
        println!(
            "  {:<10} {:<24} {:>14} {}",
            b.account_type, b.account_name, b.current_balance, b.currency
        );
    }
    Ok(())
}

pub async fn balance_sheet(ctx: &AppContext, agent_id: &str, as_of: Option<DateTime<Utc>>) -> anyhow::Result<()> {
    let sheet = ctx
        .balances
        .generate_balance_sheet(agent_id, as_of.unwrap_or_else(Utc::now))
        .await?;
    print_json(&sheet)
}

pub async fn trial_balance(ctx: &AppContext, agent_id: &str, days: i64) -> anyhow::Result<()> {
    let end = Utc::now();
    let tb = ctx
        .balances
        .generate_trial_balance(agent_id, end - Duration::days(days), end)
        .await?;
    print_json(&tb)?;

    if !tb.is_balanced {
        anyhow::bail!(
            "Trial balance does not balance: debits {} vs credits {}",
            tb.total_debits,
            tb.total_credits
        );
    }
    Ok(())
}

/// Verify the agent's transaction chain and run the balance integrity sweep
pub async fn verify(ctx: &AppContext, agent_id: &str) -> anyhow::Result<()> {
    let chain = ctx.engine.verify_agent_chain(agent_id).await?;
    let report = ctx.balances.validate_balance_integrity(agent_id).await?;

    if chain.valid {
        println!("✅ Chain valid ({} transactions)", chain.checked);
    } else if let Some(brk) = &chain.first_break {
        println!("❌ Chain broken: {}", brk);
    }

    if report.is_valid {
        println!("✅ Balances consistent ({} accounts)", report.total_accounts);
    } else {
        for issue in &report.issues {
            println!("❌ {}", issue);
        }
    }

    if !chain.valid || !report.is_valid {
        anyhow::bail!("Verification failed for {}", agent_id);
    }
    Ok(())
}

pub async fn anchor(ctx: &AppContext, agent_id: &str) -> anyhow::Result<()> {
    match ctx.anchorer.anchor_agent(agent_id).await? {
        Some(batch) => println!(
            "✅ Anchored {} transactions in block {} (root {})",
            batch.transaction_ids.len(),
            batch.block.index,
            batch.merkle_root()
        ),
        None => println!("Nothing new to anchor for {}", agent_id),
    }
    Ok(())
}

/// Sweep the outbox once, or keep sweeping until Ctrl-C
pub async fn relay(ctx: &AppContext, follow: bool) -> anyhow::Result<()> {
    let relay = ctx.relay(Arc::new(LoggingPublisher));

    if !follow {
        let report = relay.run_once().await?;
        println!("✅ Published {}, failed {}", report.published, report.failed);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });
    relay.run(shutdown_rx).await;
    println!("Relay stopped");
    Ok(())
}

pub async fn audit_summary(ctx: &AppContext, days: i64) -> anyhow::Result<()> {
    let end = Utc::now();
    let summary = ctx.audit.get_audit_summary(end - Duration::days(days), end).await?;
    print_json(&summary)
}

/// Run a payment through the workflow and wait for its outcome.
///
/// Without `rail`, one is selected from `preferences`.
pub async fn pay(
    ctx: &AppContext,
    agent_id: &str,
    amount: Decimal,
    counterparty: &str,
    rail: Option<Rail>,
    preferences: RailPreferences,
    description: Option<String>,
) -> anyhow::Result<()> {
    let mut request = PaymentRequest::new(agent_id, amount, counterparty)
        .preferences(preferences)
        .description(description.unwrap_or_default());
    if let Some(rail) = rail {
        request = request.rail(rail);
    }
    let workflow = ctx.payments.initiate(request).await?;
    println!("   Rail {} (fee {} USD)", workflow.rail, workflow.fee_usd);
    let handle = ctx.payments.start(&workflow.id).await?;
    let finished = handle.await?;

    match &finished.failure_reason {
        None => println!(
            "✅ Payment {} completed (ref {}, block {})",
            finished.id,
            finished.execution_reference.as_deref().unwrap_or("-"),
            finished.block_index.map(|i| i.to_string()).unwrap_or_default()
        ),
        Some(reason) => println!("❌ Payment {} failed: {}", finished.id, reason),
    }
    Ok(())
}
