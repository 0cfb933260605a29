//! Journal entry posting and reversal
//!
//! Posting is the only way account balances change. A post validates the
//! entry, checks the fiscal period, then flips the status and applies every
//! line to the referenced accounts' cached balances as one unit, all while
//! holding the tenant's posting lock so concurrent posts cannot race on the
//! period check or lose balance updates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Per-tenant advisory posting locks.
///
/// Acquisition is non-blocking: contention surfaces immediately as a
/// retryable [`BooksError::ConcurrencyConflict`] instead of queueing, so no
/// posting path can deadlock or block indefinitely.
#[derive(Clone, Default)]
pub struct TenantLocks {
    inner: Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TenantLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the posting lock for a tenant.
    pub fn acquire(&self, tenant_id: &str) -> BooksResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut table = self
                .inner
                .lock()
                .map_err(|_| BooksError::ConcurrencyConflict(tenant_id.to_string()))?;
            table
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned()
            .map_err(|_| BooksError::ConcurrencyConflict(tenant_id.to_string()))
    }
}

/// Manager for the journal entry lifecycle.
pub struct JournalManager<S: BooksStorage> {
    storage: S,
    periods: Arc<dyn PeriodManager>,
    numbering: Arc<dyn NumberingService>,
    locks: TenantLocks,
}

impl<S: BooksStorage> JournalManager<S> {
    /// Create a new journal manager.
    pub fn new(
        storage: S,
        periods: Arc<dyn PeriodManager>,
        numbering: Arc<dyn NumberingService>,
        locks: TenantLocks,
    ) -> Self {
        Self {
            storage,
            periods,
            numbering,
            locks,
        }
    }

    /// The tenant lock table shared with the other managers, so document
    /// and payment flows can hold the posting lock across their own
    /// validation and writes.
    pub(crate) fn locks(&self) -> &TenantLocks {
        &self.locks
    }

    /// Record a new draft entry, allocating its entry number.
    pub async fn create_entry(
        &mut self,
        tenant_id: &str,
        date: NaiveDate,
        narration: &str,
        source: JournalSource,
        lines: Vec<JournalLine>,
    ) -> BooksResult<JournalEntry> {
        validation::validate_narration(narration)?;
        let fiscal_year = crate::documents::fiscal_year(date);
        let entry_number = self
            .numbering
            .next_number(tenant_id, "JRN", &fiscal_year)
            .await?;
        let entry = JournalEntry::new(
            tenant_id.to_string(),
            entry_number,
            date,
            narration.to_string(),
            source,
            lines,
        );
        entry.validate()?;
        self.storage.save_entry(&entry).await?;
        debug!(entry = %entry.entry_number, "journal entry drafted");
        Ok(entry)
    }

    /// Get an entry by id.
    pub async fn get_entry(&self, entry_id: &str) -> BooksResult<Option<JournalEntry>> {
        self.storage.get_entry(entry_id).await
    }

    /// Get an entry by id, returning an error if not found.
    pub async fn get_entry_required(&self, entry_id: &str) -> BooksResult<JournalEntry> {
        self.storage
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| BooksError::EntryNotFound(entry_id.to_string()))
    }

    /// List a tenant's entries within a date range.
    pub async fn list_entries(
        &self,
        tenant_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> BooksResult<Vec<JournalEntry>> {
        self.storage.list_entries(tenant_id, start_date, end_date).await
    }

    /// Post a draft entry: `Draft -> Posted`.
    ///
    /// Idempotent: posting an already-posted entry returns it unchanged so
    /// at-least-once callers never double-apply balances. Fails with
    /// [`BooksError::PeriodClosed`] when the period manager rejects the
    /// date, and [`BooksError::UnbalancedEntry`] when debits and credits
    /// differ at minor-unit precision.
    pub async fn post(&mut self, entry_id: &str) -> BooksResult<JournalEntry> {
        let entry = self.get_entry_required(entry_id).await?;
        let _guard = self.locks.acquire(&entry.tenant_id)?;
        self.post_locked(entry).await
    }

    /// Post while the caller already holds the tenant lock.
    async fn post_locked(&mut self, mut entry: JournalEntry) -> BooksResult<JournalEntry> {
        match entry.status {
            EntryStatus::Posted => {
                debug!(entry = %entry.entry_number, "entry already posted, returning as-is");
                return Ok(entry);
            }
            EntryStatus::Reversed => {
                return Err(BooksError::StateConflict(format!(
                    "entry '{}' is reversed and cannot be posted",
                    entry.entry_number
                )));
            }
            EntryStatus::Draft => {}
        }

        let accounts = self.prepare_posting(&mut entry).await?;
        self.storage.update_entry(&entry).await?;
        for account in &accounts {
            self.storage.update_account(account).await?;
        }

        info!(
            entry = %entry.entry_number,
            tenant = %entry.tenant_id,
            amount = %entry.total_debits(),
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Build, validate and post an entry in one step while the caller holds
    /// the tenant lock. Nothing is persisted and no entry number is consumed
    /// until every precondition has passed, so a failed post leaves neither
    /// an orphaned draft nor a gap in the sequence.
    pub(crate) async fn record_and_post_locked(
        &mut self,
        tenant_id: &str,
        date: NaiveDate,
        narration: &str,
        source: JournalSource,
        lines: Vec<JournalLine>,
    ) -> BooksResult<JournalEntry> {
        let mut entry = JournalEntry::new(
            tenant_id.to_string(),
            String::new(),
            date,
            narration.to_string(),
            source,
            lines,
        );
        let accounts = self.prepare_posting(&mut entry).await?;

        let fiscal_year = crate::documents::fiscal_year(date);
        entry.entry_number = self
            .numbering
            .next_number(tenant_id, "JRN", &fiscal_year)
            .await?;
        self.storage.save_entry(&entry).await?;
        for account in &accounts {
            self.storage.update_account(account).await?;
        }

        info!(
            entry = %entry.entry_number,
            tenant = %entry.tenant_id,
            amount = %entry.total_debits(),
            "journal entry posted"
        );
        Ok(entry)
    }

    /// Check the period, validate the entry and apply its lines to the
    /// touched accounts, flipping the entry to `Posted`. Returns the updated
    /// accounts for the caller to persist alongside the entry; nothing is
    /// written to storage here.
    async fn prepare_posting(&mut self, entry: &mut JournalEntry) -> BooksResult<Vec<Account>> {
        if !self
            .periods
            .is_period_open(&entry.tenant_id, entry.date)
            .await?
        {
            return Err(BooksError::PeriodClosed(entry.date));
        }

        if let Err(err) = entry.validate() {
            if matches!(err, BooksError::UnbalancedEntry { .. }) {
                error!(entry = %entry.id, %err, "refusing to post unbalanced entry");
            }
            return Err(err);
        }

        // Load every touched account before mutating anything, so a missing
        // or inactive account aborts with no partial state. Lines hitting
        // the same account accumulate on one copy.
        let mut touched: HashMap<String, Account> = HashMap::new();
        for line in &entry.lines {
            if !touched.contains_key(&line.account_id) {
                let account = self
                    .storage
                    .get_account(&line.account_id)
                    .await?
                    .ok_or_else(|| BooksError::AccountNotFound(line.account_id.clone()))?;
                if !account.is_active {
                    return Err(BooksError::StateConflict(format!(
                        "account '{}' is inactive",
                        account.code
                    )));
                }
                touched.insert(line.account_id.clone(), account);
            }
        }
        for line in &entry.lines {
            if let Some(account) = touched.get_mut(&line.account_id) {
                account.apply_line(line);
            }
        }

        entry.status = EntryStatus::Posted;
        entry.updated_at = chrono::Utc::now().naive_utc();
        Ok(touched.into_values().collect())
    }

    /// Reverse a posted entry: `Posted -> Reversed`.
    ///
    /// Creates and immediately posts a new entry with every line's debit and
    /// credit swapped, links it from the original, and marks the original
    /// reversed. The original's lines are never mutated. The reversal date
    /// defaults to today and must not precede the original date.
    pub async fn reverse(
        &mut self,
        entry_id: &str,
        reason: &str,
        date: Option<NaiveDate>,
    ) -> BooksResult<JournalEntry> {
        let original = self.get_entry_required(entry_id).await?;
        let _guard = self.locks.acquire(&original.tenant_id)?;
        self.reverse_locked(entry_id, reason, date).await
    }

    /// Reverse while the caller already holds the tenant lock. The entry is
    /// re-read under the lock so the status check cannot go stale.
    pub(crate) async fn reverse_locked(
        &mut self,
        entry_id: &str,
        reason: &str,
        date: Option<NaiveDate>,
    ) -> BooksResult<JournalEntry> {
        let mut original = self.get_entry_required(entry_id).await?;
        match original.status {
            EntryStatus::Draft => {
                return Err(BooksError::StateConflict(format!(
                    "entry '{}' is a draft and has nothing to reverse",
                    original.entry_number
                )));
            }
            EntryStatus::Reversed => {
                return Err(BooksError::StateConflict(format!(
                    "entry '{}' is already reversed",
                    original.entry_number
                )));
            }
            EntryStatus::Posted => {}
        }

        let reversal_date = date.unwrap_or_else(|| chrono::Utc::now().date_naive());
        if reversal_date < original.date {
            return Err(BooksError::validation(
                "date",
                "reversal date must not precede the original entry date",
            ));
        }

        let lines: Vec<JournalLine> = original.lines.iter().map(JournalLine::swapped).collect();
        let narration = format!("Reversal of {}: {}", original.entry_number, reason);
        let reversal = self
            .record_and_post_locked(
                &original.tenant_id,
                reversal_date,
                &narration,
                original.source.clone(),
                lines,
            )
            .await?;

        original.status = EntryStatus::Reversed;
        original.reversed_by = Some(reversal.id.clone());
        original.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_entry(&original).await?;

        info!(
            original = %original.entry_number,
            reversal = %reversal.entry_number,
            "journal entry reversed"
        );
        Ok(reversal)
    }

    /// Full recompute of an account's balance from posted lines.
    pub async fn recompute_balance(
        &self,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> BooksResult<BigDecimal> {
        self.storage.recompute_balance(account_id, as_of_date).await
    }
}

/// Builder for manual journal entries.
#[derive(Debug)]
pub struct JournalEntryBuilder {
    tenant_id: String,
    date: NaiveDate,
    narration: String,
    lines: Vec<JournalLine>,
}

impl JournalEntryBuilder {
    /// Start a manual entry for a tenant.
    pub fn new(tenant_id: &str, date: NaiveDate, narration: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            date,
            narration: narration.to_string(),
            lines: Vec::new(),
        }
    }

    /// Add a debit line.
    pub fn debit(mut self, account_id: &str, amount: BigDecimal) -> Self {
        self.lines
            .push(JournalLine::debit(account_id.to_string(), amount));
        self
    }

    /// Add a credit line.
    pub fn credit(mut self, account_id: &str, amount: BigDecimal) -> Self {
        self.lines
            .push(JournalLine::credit(account_id.to_string(), amount));
        self
    }

    /// Add a pre-built line.
    pub fn line(mut self, line: JournalLine) -> Self {
        self.lines.push(line);
        self
    }

    /// Record the entry as a draft through the given manager.
    pub async fn record<S: BooksStorage>(
        self,
        journal: &mut JournalManager<S>,
    ) -> BooksResult<JournalEntry> {
        journal
            .create_entry(
                &self.tenant_id,
                self.date,
                &self.narration,
                JournalSource::Manual,
                self.lines,
            )
            .await
    }
}
