//! Balance Calculator

use crate::config::BalanceConfig;
use crate::error::{BalanceError, BalanceResult};
use crate::outstanding::{OutstandingItemSource, OutstandingKind};
use crate::report::{
    AccountBalance, AgingBucket, AgingReport, BalanceHistory, BalancePoint, BalanceSheet, IntegrityIssue,
    IntegrityReport, ReconciliationResult, TrialBalance, TrialBalanceLine,
};
use agentpay_core::eq_to_cent;
use agentpay_hashchain::{verify_records, GENESIS_PREVIOUS_HASH};
use agentpay_ledger::{Account, AccountType, NormalSide, PostingQuery, SharedLedgerStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use strum::IntoEnumIterator;

/// Read-only reporting over the ledger
pub struct BalanceCalculator {
    store: SharedLedgerStore,
    outstanding: Arc<dyn OutstandingItemSource>,
    config: BalanceConfig,
}

impl BalanceCalculator {
    pub fn new(store: SharedLedgerStore, outstanding: Arc<dyn OutstandingItemSource>, config: BalanceConfig) -> Self {
        Self {
            store,
            outstanding,
            config,
        }
    }

    async fn account(&self, account_id: &str) -> BalanceResult<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or_else(|| BalanceError::account_not_found(account_id))
    }

    /// Posting totals per account for an agent, up to and including `as_of`
    async fn replayed_balances(
        &self,
        agent_id: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> BalanceResult<HashMap<String, Decimal>> {
        let query = PostingQuery {
            until: as_of,
            ..PostingQuery::for_agent(agent_id)
        };
        let mut totals: HashMap<String, Decimal> = HashMap::new();
        for posting in self.store.list_postings(&query).await? {
            *totals.entry(posting.account_id).or_default() += posting.amount;
        }
        Ok(totals)
    }

    pub async fn get_account_balance(&self, account_id: &str) -> BalanceResult<AccountBalance> {
        let account = self.account(account_id).await?;
        Ok(AccountBalance::from(&account))
    }

    /// Live balances ordered asset, liability, equity, revenue, expense
    pub async fn get_agent_balances(&self, agent_id: &str) -> BalanceResult<Vec<AccountBalance>> {
        let mut balances: Vec<AccountBalance> = self
            .store
            .list_accounts(agent_id)
            .await?
            .iter()
            .map(AccountBalance::from)
            .collect();
        balances.sort_by_key(|b| b.account_type);
        Ok(balances)
    }

    /// Balance sheet rebuilt from postings made on or before `as_of`.
    ///
    /// Covers the accounts open at `as_of`, including ones deleted since.
    pub async fn generate_balance_sheet(&self, agent_id: &str, as_of: DateTime<Utc>) -> BalanceResult<BalanceSheet> {
        let accounts = self.store.list_all_accounts(agent_id).await?;
        let replayed = self.replayed_balances(agent_id, Some(as_of)).await?;

        let mut sheet = BalanceSheet {
            agent_id: agent_id.to_string(),
            as_of,
            assets: Vec::new(),
            total_assets: Decimal::ZERO,
            liabilities: Vec::new(),
            total_liabilities: Decimal::ZERO,
            equity: Vec::new(),
            total_equity: Decimal::ZERO,
            net_worth: Decimal::ZERO,
        };

        for account in accounts.iter().filter(|a| a.was_open_at(as_of)) {
            let balance = replayed.get(&account.id).copied().unwrap_or_default();
            let line = AccountBalance::with_balance(account, balance);
            match account.account_type {
                AccountType::Asset => {
                    sheet.total_assets += line.normal_balance;
                    sheet.assets.push(line);
                }
                AccountType::Liability => {
                    sheet.total_liabilities += line.normal_balance;
                    sheet.liabilities.push(line);
                }
                AccountType::Equity => {
                    sheet.total_equity += line.normal_balance;
                    sheet.equity.push(line);
                }
                AccountType::Revenue | AccountType::Expense => {}
            }
        }

        sheet.net_worth = sheet.total_assets - sheet.total_liabilities;
        Ok(sheet)
    }

    /// Trial balance over live balances.
    ///
    /// A balance on the wrong side of its normal side is reclassified to the
    /// other column as its absolute value.
    pub async fn generate_trial_balance(
        &self,
        agent_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> BalanceResult<TrialBalance> {
        let accounts = self.store.list_accounts(agent_id).await?;

        let mut tb = TrialBalance {
            agent_id: agent_id.to_string(),
            period_start,
            period_end,
            debit_balances: Vec::new(),
            credit_balances: Vec::new(),
            total_debits: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            is_balanced: false,
        };

        for account in &accounts {
            let line = |amount: Decimal| TrialBalanceLine {
                account_id: account.id.clone(),
                account_name: account.name.clone(),
                account_type: account.account_type,
                amount,
            };

            let on_debit_side = match account.account_type.normal_side() {
                NormalSide::Debit => account.balance >= Decimal::ZERO,
                NormalSide::Credit => account.balance > Decimal::ZERO,
            };

            let amount = account.balance.abs();
            if on_debit_side {
                tb.total_debits += amount;
                tb.debit_balances.push(line(amount));
            } else {
                tb.total_credits += amount;
                tb.credit_balances.push(line(amount));
            }
        }

        tb.is_balanced = eq_to_cent(tb.total_debits, tb.total_credits);
        if !tb.is_balanced {
            tracing::warn!(
                agent_id,
                total_debits = %tb.total_debits,
                total_credits = %tb.total_credits,
                "Trial balance does not balance"
            );
        }
        Ok(tb)
    }

    /// Book balance adjusted for outstanding items, compared to the bank
    pub async fn reconcile_account(
        &self,
        account_id: &str,
        bank_balance: Decimal,
        reconciliation_date: DateTime<Utc>,
    ) -> BalanceResult<ReconciliationResult> {
        let account = self.account(account_id).await?;
        let items = self
            .outstanding
            .outstanding_items(account_id, reconciliation_date)
            .await?;

        let (outstanding_checks, deposits_in_transit): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| i.kind == OutstandingKind::Check);

        let checks: Decimal = outstanding_checks.iter().map(|i| i.amount).sum();
        let deposits: Decimal = deposits_in_transit.iter().map(|i| i.amount).sum();
        let reconciled_balance = account.balance + checks - deposits;
        let is_reconciled = eq_to_cent(reconciled_balance, bank_balance);

        tracing::info!(account_id, %reconciled_balance, %bank_balance, is_reconciled, "Account reconciled");

        Ok(ReconciliationResult {
            account_id: account_id.to_string(),
            book_balance: account.balance,
            bank_balance,
            outstanding_checks,
            deposits_in_transit,
            reconciled_balance,
            difference: reconciled_balance - bank_balance,
            reconciliation_date,
            is_reconciled,
        })
    }

    /// Outstanding items grouped by age
    pub async fn calculate_account_aging(&self, account_id: &str, as_of: DateTime<Utc>) -> BalanceResult<AgingReport> {
        self.account(account_id).await?;
        let items = self.outstanding.outstanding_items(account_id, as_of).await?;

        let mut buckets: BTreeMap<AgingBucket, Decimal> =
            AgingBucket::iter().map(|b| (b, Decimal::ZERO)).collect();
        for item in items.iter().filter(|i| i.date <= as_of) {
            let bucket = AgingBucket::for_age((as_of - item.date).num_days());
            *buckets.entry(bucket).or_default() += item.amount;
        }

        Ok(AgingReport {
            account_id: account_id.to_string(),
            as_of,
            total: buckets.values().copied().sum(),
            buckets,
        })
    }

    /// Opening balance at `start` plus one point per transaction in `[start, end]`
    pub async fn get_balance_history(
        &self,
        account_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BalanceResult<BalanceHistory> {
        self.account(account_id).await?;
        let postings = self
            .store
            .list_postings(&PostingQuery::for_account(account_id).until(end))
            .await?;

        let mut opening_balance = Decimal::ZERO;
        let mut points: Vec<BalancePoint> = Vec::new();
        let mut running = Decimal::ZERO;

        for posting in postings {
            running += posting.amount;
            if posting.created_at < start {
                opening_balance = running;
                continue;
            }
            match points.last_mut() {
                Some(last) if last.transaction_id == posting.transaction_id => {
                    last.delta += posting.amount;
                    last.balance = running;
                }
                _ => points.push(BalancePoint {
                    at: posting.created_at,
                    transaction_id: posting.transaction_id,
                    delta: posting.amount,
                    balance: running,
                }),
            }
        }

        Ok(BalanceHistory {
            account_id: account_id.to_string(),
            start,
            end,
            opening_balance,
            points,
            closing_balance: running,
        })
    }

    /// Integrity sweep. Findings are reported, never repaired.
    pub async fn validate_balance_integrity(&self, agent_id: &str) -> BalanceResult<IntegrityReport> {
        let all_accounts = self.store.list_all_accounts(agent_id).await?;
        let (accounts, deleted): (Vec<&Account>, Vec<&Account>) = all_accounts.iter().partition(|a| a.is_active());
        let mut issues = Vec::new();

        for account in &deleted {
            if !account.balance.is_zero() {
                issues.push(IntegrityIssue::DeletedWithBalance {
                    account_id: account.id.clone(),
                    balance: account.balance,
                });
            }
        }

        for account in &accounts {
            if account.balance.abs() > self.config.max_abs_balance {
                issues.push(IntegrityIssue::OutOfRange {
                    account_id: account.id.clone(),
                    balance: account.balance,
                    limit: self.config.max_abs_balance,
                });
            }
        }

        let present: HashSet<AccountType> = accounts.iter().map(|a| a.account_type).collect();
        for required in &self.config.required_account_types {
            if !present.contains(required) {
                issues.push(IntegrityIssue::MissingAccountType {
                    account_type: *required,
                });
            }
        }

        let replayed = self.replayed_balances(agent_id, None).await?;
        for account in &all_accounts {
            let total = replayed.get(&account.id).copied().unwrap_or_default();
            if account.balance != total {
                issues.push(IntegrityIssue::BalanceDrift {
                    account_id: account.id.clone(),
                    stored: account.balance,
                    replayed: total,
                });
            }
        }

        let transactions = self.store.list_transactions(agent_id).await?;
        for tx in &transactions {
            let sum = tx.posting_sum();
            if !sum.is_zero() {
                issues.push(IntegrityIssue::UnbalancedTransaction {
                    transaction_id: tx.id.clone(),
                    sum,
                });
            }
        }

        if let Some(chain_break) = verify_records(&transactions, GENESIS_PREVIOUS_HASH).first_break {
            issues.push(IntegrityIssue::ChainBroken { chain_break });
        }

        for issue in &issues {
            tracing::warn!(agent_id, %issue, "Balance integrity issue");
        }

        Ok(IntegrityReport {
            agent_id: agent_id.to_string(),
            total_accounts: accounts.len(),
            is_valid: issues.is_empty(),
            issues,
            checked_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outstanding::{InMemoryOutstandingItems, NoOutstandingItems, OutstandingItem};
    use agentpay_audit::{AuditTrail, InMemoryAuditStore};
    use agentpay_ledger::{AgentLocks, InMemoryLedgerStore, NewAccount, PostTransaction, PostingEngine};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    struct Fixture {
        engine: PostingEngine,
        store: Arc<InMemoryLedgerStore>,
        accounts: HashMap<&'static str, Account>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        let audit = Arc::new(AuditTrail::new(Arc::new(InMemoryAuditStore::new())));
        let engine = PostingEngine::new(store.clone(), audit, Arc::new(AgentLocks::new()));

        let mut accounts = HashMap::new();
        for (name, account_type) in [
            ("cash", AccountType::Asset),
            ("loan", AccountType::Liability),
            ("capital", AccountType::Equity),
            ("sales", AccountType::Revenue),
            ("fees", AccountType::Expense),
        ] {
            let account = engine
                .create_account(NewAccount::new("agent-a", name, account_type))
                .await
                .unwrap();
            accounts.insert(name, account);
        }

        Fixture {
            engine,
            store,
            accounts,
        }
    }

    impl Fixture {
        fn id(&self, name: &str) -> String {
            self.accounts[name].id.clone()
        }

        async fn post(&self, legs: &[(&str, Decimal)]) {
            let mut request = PostTransaction::new("agent-a", "test");
            for (name, amount) in legs {
                request = request.leg(self.id(name), *amount);
            }
            self.engine.post_transaction(request).await.unwrap();
        }

        fn calculator(&self, outstanding: Arc<dyn OutstandingItemSource>) -> BalanceCalculator {
            BalanceCalculator::new(self.store.clone(), outstanding, BalanceConfig::default())
        }
    }

    #[tokio::test]
    async fn test_agent_balances_sorted_by_type() {
        let f = fixture().await;
        let calc = f.calculator(Arc::new(NoOutstandingItems));

        let balances = calc.get_agent_balances("agent-a").await.unwrap();
        let types: Vec<_> = balances.iter().map(|b| b.account_type).collect();
        assert_eq!(types, AccountType::ALL.to_vec());

        assert!(matches!(
            calc.get_account_balance("missing").await,
            Err(BalanceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_balance_sheet_and_trial_balance() {
        let f = fixture().await;
        f.post(&[("cash", dec!(1000)), ("capital", dec!(-1000))]).await;
        f.post(&[("cash", dec!(500)), ("loan", dec!(-500))]).await;
        f.post(&[("cash", dec!(250)), ("sales", dec!(-250))]).await;
        f.post(&[("fees", dec!(50)), ("cash", dec!(-50))]).await;
        let calc = f.calculator(Arc::new(NoOutstandingItems));

        let sheet = calc.generate_balance_sheet("agent-a", Utc::now()).await.unwrap();
        assert_eq!(sheet.total_assets, dec!(1700));
        assert_eq!(sheet.total_liabilities, dec!(500));
        assert_eq!(sheet.total_equity, dec!(1000));
        assert_eq!(sheet.net_worth, dec!(1200));

        let now = Utc::now();
        let tb = calc
            .generate_trial_balance("agent-a", now - Duration::days(30), now)
            .await
            .unwrap();
        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits, dec!(1750));
        assert_eq!(tb.total_credits, dec!(1750));
    }

    #[tokio::test]
    async fn test_balance_sheet_as_of_ignores_later_postings() {
        let f = fixture().await;
        f.post(&[("cash", dec!(100)), ("capital", dec!(-100))]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        f.post(&[("cash", dec!(40)), ("loan", dec!(-40))]).await;

        let calc = f.calculator(Arc::new(NoOutstandingItems));
        let past = calc.generate_balance_sheet("agent-a", cutoff).await.unwrap();
        assert_eq!(past.total_assets, dec!(100));
        assert_eq!(past.total_liabilities, Decimal::ZERO);

        let present = calc.generate_balance_sheet("agent-a", Utc::now()).await.unwrap();
        assert_eq!(present.total_assets, dec!(140));
    }

    #[tokio::test]
    async fn test_wrong_side_balances_are_reclassified() {
        let f = fixture().await;
        // Overdrawn cash is a credit, a debit-balance loan is a debit
        f.post(&[("loan", dec!(30)), ("cash", dec!(-30))]).await;
        let calc = f.calculator(Arc::new(NoOutstandingItems));

        let now = Utc::now();
        let tb = calc.generate_trial_balance("agent-a", now, now).await.unwrap();
        let loan = tb.debit_balances.iter().find(|l| l.account_type == AccountType::Liability).unwrap();
        let cash = tb.credit_balances.iter().find(|l| l.account_type == AccountType::Asset).unwrap();
        assert_eq!(loan.amount, dec!(30));
        assert_eq!(cash.amount, dec!(30));
        assert!(tb.is_balanced);
    }

    #[tokio::test]
    async fn test_out_of_band_write_unbalances_trial_balance() {
        let f = fixture().await;
        f.post(&[("cash", dec!(10)), ("sales", dec!(-10))]).await;
        f.store.overwrite_balance(&f.id("cash"), dec!(11)).await.unwrap();

        let calc = f.calculator(Arc::new(NoOutstandingItems));
        let now = Utc::now();
        assert!(!calc.generate_trial_balance("agent-a", now, now).await.unwrap().is_balanced);

        let report = calc.validate_balance_integrity("agent-a").await.unwrap();
        assert!(!report.is_valid);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, IntegrityIssue::BalanceDrift { replayed, .. } if *replayed == dec!(10))));
    }

    #[tokio::test]
    async fn test_reconciliation_with_outstanding_items() {
        let f = fixture().await;
        f.post(&[("cash", dec!(1000)), ("capital", dec!(-1000))]).await;

        let items = Arc::new(InMemoryOutstandingItems::new());
        let now = Utc::now();
        items
            .add(
                f.id("cash"),
                OutstandingItem {
                    id: "chk-1".to_string(),
                    description: "Check #1".to_string(),
                    amount: dec!(200),
                    date: now - Duration::days(3),
                    kind: OutstandingKind::Check,
                },
            )
            .await;
        items
            .add(
                f.id("cash"),
                OutstandingItem {
                    id: "dep-1".to_string(),
                    description: "Deposit".to_string(),
                    amount: dec!(50),
                    date: now - Duration::days(45),
                    kind: OutstandingKind::Deposit,
                },
            )
            .await;

        let calc = f.calculator(items);
        let result = calc.reconcile_account(&f.id("cash"), dec!(1150), now).await.unwrap();
        assert_eq!(result.reconciled_balance, dec!(1150));
        assert!(result.is_reconciled);
        assert_eq!(result.difference, Decimal::ZERO);

        let off = calc.reconcile_account(&f.id("cash"), dec!(1149.50), now).await.unwrap();
        assert!(!off.is_reconciled);
        assert_eq!(off.difference, dec!(0.50));

        let aging = calc.calculate_account_aging(&f.id("cash"), now).await.unwrap();
        assert_eq!(aging.buckets[&AgingBucket::Current], dec!(200));
        assert_eq!(aging.buckets[&AgingBucket::Days30], dec!(50));
        assert_eq!(aging.buckets[&AgingBucket::Days120Plus], Decimal::ZERO);
        assert_eq!(aging.total, dec!(250));
    }

    #[tokio::test]
    async fn test_balance_history_window() {
        let f = fixture().await;
        f.post(&[("cash", dec!(100)), ("capital", dec!(-100))]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let start = Utc::now();
        f.post(&[("cash", dec!(25)), ("sales", dec!(-25))]).await;
        f.post(&[("fees", dec!(5)), ("cash", dec!(-5))]).await;

        let calc = f.calculator(Arc::new(NoOutstandingItems));
        let history = calc.get_balance_history(&f.id("cash"), start, Utc::now()).await.unwrap();
        assert_eq!(history.opening_balance, dec!(100));
        let balances: Vec<_> = history.points.iter().map(|p| p.balance).collect();
        assert_eq!(balances, vec![dec!(125), dec!(120)]);
        assert_eq!(history.closing_balance, dec!(120));
    }

    #[tokio::test]
    async fn test_integrity_flags_range_and_missing_types() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let audit = Arc::new(AuditTrail::new(Arc::new(InMemoryAuditStore::new())));
        let engine = PostingEngine::new(store.clone(), audit, Arc::new(AgentLocks::new()));
        let cash = engine
            .create_account(NewAccount::new("agent-z", "Cash", AccountType::Asset))
            .await
            .unwrap();
        let capital = engine
            .create_account(NewAccount::new("agent-z", "Capital", AccountType::Equity))
            .await
            .unwrap();
        engine
            .post_transaction(
                PostTransaction::new("agent-z", "Seed")
                    .leg(&cash.id, dec!(2000000))
                    .leg(&capital.id, dec!(-2000000)),
            )
            .await
            .unwrap();

        let calc = BalanceCalculator::new(store, Arc::new(NoOutstandingItems), BalanceConfig::default());
        let report = calc.validate_balance_integrity("agent-z").await.unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.total_accounts, 2);

        let out_of_range = report
            .issues
            .iter()
            .filter(|i| matches!(i, IntegrityIssue::OutOfRange { .. }))
            .count();
        assert_eq!(out_of_range, 2);
        let missing: Vec<_> = report
            .issues
            .iter()
            .filter_map(|i| match i {
                IntegrityIssue::MissingAccountType { account_type } => Some(*account_type),
                _ => None,
            })
            .collect();
        assert_eq!(missing, vec![AccountType::Liability, AccountType::Revenue, AccountType::Expense]);
    }

    #[tokio::test]
    async fn test_deleted_account_stays_in_earlier_balance_sheets() {
        let f = fixture().await;
        let bank = f
            .engine
            .create_account(NewAccount::new("agent-a", "bank", AccountType::Asset))
            .await
            .unwrap();
        f.post(&[("cash", dec!(100)), ("capital", dec!(-100))]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let funded = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let sweep = PostTransaction::new("agent-a", "sweep to bank")
            .leg(&bank.id, dec!(100))
            .leg(f.id("cash"), dec!(-100));
        f.engine.post_transaction(sweep).await.unwrap();
        f.engine.soft_delete_account(&f.id("cash")).await.unwrap();

        let calc = f.calculator(Arc::new(NoOutstandingItems));
        let past = calc.generate_balance_sheet("agent-a", funded).await.unwrap();
        assert_eq!(past.total_assets, dec!(100));
        assert!(past.assets.iter().any(|l| l.account_id == f.id("cash")));
        assert_eq!(past.total_equity, dec!(100));

        let present = calc.generate_balance_sheet("agent-a", Utc::now()).await.unwrap();
        assert_eq!(present.total_assets, dec!(100));
        assert!(present.assets.iter().all(|l| l.account_id != f.id("cash")));

        let report = calc.validate_balance_integrity("agent-a").await.unwrap();
        assert!(report.is_valid, "{:?}", report.issues);

        // A balance written onto the deleted row is still caught
        f.store.overwrite_balance(&f.id("cash"), dec!(5)).await.unwrap();
        let report = calc.validate_balance_integrity("agent-a").await.unwrap();
        assert!(report.issues.iter().any(|i| matches!(
            i,
            IntegrityIssue::DeletedWithBalance { account_id, balance } if *account_id == f.id("cash") && *balance == dec!(5)
        )));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, IntegrityIssue::BalanceDrift { .. })));
    }

    #[tokio::test]
    async fn test_clean_ledger_is_valid() {
        let f = fixture().await;
        f.post(&[("cash", dec!(10)), ("sales", dec!(-10))]).await;
        let calc = f.calculator(Arc::new(NoOutstandingItems));
        let report = calc.validate_balance_integrity("agent-a").await.unwrap();
        assert!(report.is_valid, "{:?}", report.issues);
    }
}
