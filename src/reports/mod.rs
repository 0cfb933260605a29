//! Read-only reporting over ledger and document state
//!
//! Nothing in this module mutates state; reports read the latest committed
//! records and do not take the posting lock.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::documents::DocumentKind;
use crate::traits::*;
use crate::types::*;

/// Outstanding-amount buckets keyed by days past due.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgingBuckets {
    /// Not yet due (as-of date on or before the due date)
    pub current: BigDecimal,
    pub days_1_to_30: BigDecimal,
    pub days_31_to_60: BigDecimal,
    pub days_61_to_90: BigDecimal,
    pub over_90: BigDecimal,
}

impl AgingBuckets {
    /// Add an amount to the bucket for the given days past due.
    pub fn add(&mut self, days_past_due: i64, amount: &BigDecimal) {
        let slot = match days_past_due {
            i64::MIN..=0 => &mut self.current,
            1..=30 => &mut self.days_1_to_30,
            31..=60 => &mut self.days_31_to_60,
            61..=90 => &mut self.days_61_to_90,
            _ => &mut self.over_90,
        };
        *slot += amount;
    }

    /// Sum across all buckets.
    pub fn total(&self) -> BigDecimal {
        &self.current + &self.days_1_to_30 + &self.days_31_to_60 + &self.days_61_to_90
            + &self.over_90
    }

    fn merge(&mut self, other: &AgingBuckets) {
        self.current += &other.current;
        self.days_1_to_30 += &other.days_1_to_30;
        self.days_31_to_60 += &other.days_31_to_60;
        self.days_61_to_90 += &other.days_61_to_90;
        self.over_90 += &other.over_90;
    }
}

/// One party's outstanding balances bucketed by age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartyAging {
    pub party_id: String,
    pub buckets: AgingBuckets,
}

/// Receivables or payables aging as of a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgingReport {
    pub as_of_date: NaiveDate,
    pub kind: DocumentKind,
    /// Per-party rows, ordered by party id
    pub parties: Vec<PartyAging>,
    /// Grand totals across all parties
    pub totals: AgingBuckets,
}

/// Trial balance - snapshot of all account balances at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub as_of_date: NaiveDate,
    /// Account balances keyed by account id
    pub balances: HashMap<String, AccountBalance>,
    pub total_debits: BigDecimal,
    pub total_credits: BigDecimal,
    pub is_balanced: bool,
}

/// Account balance information for the trial balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account: Account,
    pub debit_balance: Option<BigDecimal>,
    pub credit_balance: Option<BigDecimal>,
}

impl AccountBalance {
    /// Get the balance amount regardless of debit/credit side.
    pub fn balance_amount(&self) -> BigDecimal {
        self.debit_balance
            .clone()
            .or_else(|| self.credit_balance.clone())
            .unwrap_or_else(|| BigDecimal::from(0))
    }
}

/// Cached-vs-recomputed reconciliation result for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceMismatch {
    pub account_id: String,
    pub account_code: String,
    pub cached: BigDecimal,
    pub recomputed: BigDecimal,
}

/// Outcome of a full ledger integrity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub as_of_date: NaiveDate,
    pub is_valid: bool,
    /// Accounts whose cached balance drifted from a full recompute
    pub mismatches: Vec<BalanceMismatch>,
    pub trial_balance_total_debits: BigDecimal,
    pub trial_balance_total_credits: BigDecimal,
}

/// Read-only reporter over document and ledger state.
pub struct Reporter<S: BooksStorage> {
    storage: S,
}

impl<S: BooksStorage> Reporter<S> {
    /// Create a new reporter.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Bucket every outstanding document of a kind by days past due,
    /// grouped by party.
    pub async fn aging_report(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
        kind: DocumentKind,
    ) -> BooksResult<AgingReport> {
        let documents = self
            .storage
            .list_documents(tenant_id, Some(kind), None)
            .await?;

        // BTreeMap keeps party ordering deterministic.
        let mut per_party: BTreeMap<String, AgingBuckets> = BTreeMap::new();
        for document in documents {
            if !document.is_outstanding() || document.date > as_of_date {
                continue;
            }
            let balance = document.balance_due();
            let days_past_due = (as_of_date - document.due_date).num_days();
            per_party
                .entry(document.party_id.clone())
                .or_default()
                .add(days_past_due, &balance);
        }

        let mut totals = AgingBuckets::default();
        let parties = per_party
            .into_iter()
            .map(|(party_id, buckets)| {
                totals.merge(&buckets);
                PartyAging { party_id, buckets }
            })
            .collect();

        Ok(AgingReport {
            as_of_date,
            kind,
            parties,
            totals,
        })
    }

    /// Sum every account's posted lines up to `as_of_date` into a trial
    /// balance. Total debits must equal total credits.
    pub async fn trial_balance(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
    ) -> BooksResult<TrialBalance> {
        let accounts = self.storage.list_accounts(tenant_id, None).await?;
        let mut balances = HashMap::new();
        let mut total_debits = BigDecimal::from(0);
        let mut total_credits = BigDecimal::from(0);

        for account in accounts {
            let balance = self
                .storage
                .recompute_balance(&account.id, Some(as_of_date))
                .await?;

            // A negative balance sits on the opposite side of the account's
            // normal balance.
            let account_balance = match account.account_type.normal_balance() {
                EntryType::Debit => {
                    if balance >= BigDecimal::from(0) {
                        total_debits += &balance;
                        AccountBalance {
                            account,
                            debit_balance: Some(balance),
                            credit_balance: None,
                        }
                    } else {
                        total_credits += balance.abs();
                        AccountBalance {
                            account,
                            debit_balance: None,
                            credit_balance: Some(balance.abs()),
                        }
                    }
                }
                EntryType::Credit => {
                    if balance >= BigDecimal::from(0) {
                        total_credits += &balance;
                        AccountBalance {
                            account,
                            debit_balance: None,
                            credit_balance: Some(balance),
                        }
                    } else {
                        total_debits += balance.abs();
                        AccountBalance {
                            account,
                            debit_balance: Some(balance.abs()),
                            credit_balance: None,
                        }
                    }
                }
            };
            balances.insert(account_balance.account.id.clone(), account_balance);
        }

        let is_balanced = total_debits == total_credits;
        Ok(TrialBalance {
            as_of_date,
            balances,
            total_debits,
            total_credits,
            is_balanced,
        })
    }

    /// Verify every cached account balance against a full recompute and
    /// check the trial balance. The cache is a materialized view; any
    /// drift means a posting failed its atomicity contract.
    pub async fn verify_ledger(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
    ) -> BooksResult<IntegrityReport> {
        let accounts = self.storage.list_accounts(tenant_id, None).await?;
        let mut mismatches = Vec::new();
        for account in accounts {
            let recomputed = self.storage.recompute_balance(&account.id, None).await?;
            if recomputed != account.balance {
                mismatches.push(BalanceMismatch {
                    account_id: account.id.clone(),
                    account_code: account.code.clone(),
                    cached: account.balance.clone(),
                    recomputed,
                });
            }
        }

        let trial = self.trial_balance(tenant_id, as_of_date).await?;
        let is_valid = mismatches.is_empty() && trial.is_balanced;

        Ok(IntegrityReport {
            as_of_date,
            is_valid,
            mismatches,
            trial_balance_total_debits: trial.total_debits,
            trial_balance_total_credits: trial.total_credits,
        })
    }
}
