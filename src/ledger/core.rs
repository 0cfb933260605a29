//! Main orchestrator that coordinates accounts, journal, documents,
//! payments and reporting

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::documents::{Document, DocumentEngine, DocumentKind, NewDocument, NewDocumentLine};
use crate::ledger::{AccountRegistry, JournalManager, PostingAccounts, TenantLocks};
use crate::payments::{AllocationStrategy, NewPayment, Payment, PaymentAllocator};
use crate::reports::{AgingReport, IntegrityReport, Reporter, TrialBalance};
use crate::traits::*;
use crate::types::*;

/// The ledger engine: one entry point over every subsystem.
///
/// All managers share the same storage backend and the same per-tenant
/// posting locks, so a document post and a manual journal post for one
/// tenant can never interleave their balance updates.
pub struct Books<S: BooksStorage> {
    accounts: AccountRegistry<S>,
    journal: JournalManager<S>,
    documents: DocumentEngine<S>,
    payments: PaymentAllocator<S>,
    reporter: Reporter<S>,
}

impl<S: BooksStorage + Clone> Books<S> {
    /// Create the engine over a storage backend and its external
    /// collaborators.
    pub fn new(
        storage: S,
        periods: Arc<dyn PeriodManager>,
        numbering: Arc<dyn NumberingService>,
    ) -> Self {
        Self::with_locks(storage, periods, numbering, TenantLocks::new())
    }

    /// Create the engine sharing a posting lock table with other engine
    /// handles over the same storage backend. Required whenever more than
    /// one `Books` serves a tenant, so their posts serialize.
    pub fn with_locks(
        storage: S,
        periods: Arc<dyn PeriodManager>,
        numbering: Arc<dyn NumberingService>,
        locks: TenantLocks,
    ) -> Self {
        let journal = JournalManager::new(
            storage.clone(),
            periods.clone(),
            numbering.clone(),
            locks.clone(),
        );
        let documents = DocumentEngine::new(
            storage.clone(),
            JournalManager::new(
                storage.clone(),
                periods.clone(),
                numbering.clone(),
                locks.clone(),
            ),
            numbering.clone(),
        );
        let payments = PaymentAllocator::new(
            storage.clone(),
            JournalManager::new(storage.clone(), periods, numbering, locks),
        );
        let reporter = Reporter::new(storage.clone());
        let accounts = AccountRegistry::new(storage);
        Self {
            accounts,
            journal,
            documents,
            payments,
            reporter,
        }
    }

    // Account operations

    /// Create a new account.
    pub async fn create_account(
        &mut self,
        tenant_id: &str,
        code: &str,
        name: &str,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> BooksResult<Account> {
        self.accounts
            .create_account(tenant_id, code, name, account_type, parent_id)
            .await
    }

    /// Get an account by id.
    pub async fn get_account(&self, account_id: &str) -> BooksResult<Option<Account>> {
        self.accounts.get_account(account_id).await
    }

    /// List all accounts for a tenant.
    pub async fn list_accounts(&self, tenant_id: &str) -> BooksResult<Vec<Account>> {
        self.accounts.list_accounts(tenant_id).await
    }

    /// Deactivate an account, preserving its history.
    pub async fn deactivate_account(
        &mut self,
        account_id: &str,
        acknowledge_non_zero: bool,
    ) -> BooksResult<Account> {
        self.accounts
            .deactivate(account_id, acknowledge_non_zero)
            .await
    }

    /// Delete an unused, non-system account.
    pub async fn delete_account(&mut self, account_id: &str) -> BooksResult<()> {
        self.accounts.delete_account(account_id).await
    }

    /// Signed balance from posted lines, optionally as of a date.
    pub async fn get_account_balance(
        &self,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> BooksResult<BigDecimal> {
        self.accounts.get_balance(account_id, as_of_date).await
    }

    /// Create the standard GST chart of accounts for a tenant.
    pub async fn setup_gst_chart(&mut self, tenant_id: &str) -> BooksResult<PostingAccounts> {
        crate::ledger::account::utils::setup_gst_chart(&mut self.accounts, tenant_id).await
    }

    // Journal operations

    /// Record a draft manual journal entry.
    pub async fn create_entry(
        &mut self,
        tenant_id: &str,
        date: NaiveDate,
        narration: &str,
        lines: Vec<JournalLine>,
    ) -> BooksResult<JournalEntry> {
        self.journal
            .create_entry(tenant_id, date, narration, JournalSource::Manual, lines)
            .await
    }

    /// Get a journal entry by id.
    pub async fn get_entry(&self, entry_id: &str) -> BooksResult<Option<JournalEntry>> {
        self.journal.get_entry(entry_id).await
    }

    /// List a tenant's journal entries within a date range.
    pub async fn list_entries(
        &self,
        tenant_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> BooksResult<Vec<JournalEntry>> {
        self.journal.list_entries(tenant_id, start_date, end_date).await
    }

    /// Post a journal entry. Idempotent for already-posted entries.
    pub async fn post_entry(&mut self, entry_id: &str) -> BooksResult<JournalEntry> {
        self.journal.post(entry_id).await
    }

    /// Reverse a posted journal entry.
    pub async fn reverse_entry(
        &mut self,
        entry_id: &str,
        reason: &str,
        date: Option<NaiveDate>,
    ) -> BooksResult<JournalEntry> {
        self.journal.reverse(entry_id, reason, date).await
    }

    // Document operations

    /// Create a draft invoice or bill.
    pub async fn create_document(&mut self, input: NewDocument) -> BooksResult<Document> {
        self.documents.create_document(input).await
    }

    /// Get a document by id.
    pub async fn get_document(&self, document_id: &str) -> BooksResult<Option<Document>> {
        self.documents.get_document(document_id).await
    }

    /// Replace a draft document's lines.
    pub async fn update_draft_lines(
        &mut self,
        document_id: &str,
        lines: Vec<NewDocumentLine>,
    ) -> BooksResult<Document> {
        self.documents.update_draft_lines(document_id, lines).await
    }

    /// Post a document into the ledger.
    pub async fn post_document(
        &mut self,
        document_id: &str,
        accounts: &PostingAccounts,
    ) -> BooksResult<Document> {
        self.documents.post_document(document_id, accounts).await
    }

    /// Void a document with nothing paid against it.
    pub async fn void_document(
        &mut self,
        document_id: &str,
        reason: &str,
    ) -> BooksResult<Document> {
        self.documents.void_document(document_id, reason).await
    }

    // Payment operations

    /// Record a payment and allocate it across outstanding documents.
    pub async fn record_payment(
        &mut self,
        input: NewPayment,
        strategy: AllocationStrategy,
        accounts: &PostingAccounts,
    ) -> BooksResult<Payment> {
        self.payments.record_payment(input, strategy, accounts).await
    }

    /// Void a payment via a reversing payment and journal entry.
    pub async fn void_payment(&mut self, payment_id: &str, reason: &str) -> BooksResult<Payment> {
        self.payments.void_payment(payment_id, reason).await
    }

    // Reporting operations

    /// Receivables or payables aging as of a date.
    pub async fn aging_report(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
        kind: DocumentKind,
    ) -> BooksResult<AgingReport> {
        self.reporter.aging_report(tenant_id, as_of_date, kind).await
    }

    /// Trial balance as of a date.
    pub async fn trial_balance(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
    ) -> BooksResult<TrialBalance> {
        self.reporter.trial_balance(tenant_id, as_of_date).await
    }

    /// Reconcile every cached balance against a full recompute.
    pub async fn verify_ledger(
        &self,
        tenant_id: &str,
        as_of_date: NaiveDate,
    ) -> BooksResult<IntegrityReport> {
        self.reporter.verify_ledger(tenant_id, as_of_date).await
    }
}
