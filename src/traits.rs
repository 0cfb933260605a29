//! Traits for storage abstraction and external collaborators
//!
//! [`BooksStorage`] keeps the engine database-agnostic: any backend
//! (PostgreSQL, SQLite, in-memory, ...) can host the ledger by implementing
//! these methods. [`PeriodManager`] and [`NumberingService`] are the
//! boundary contracts the engine consumes from outside; in-memory versions
//! live in [`crate::utils`].

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::documents::{Document, DocumentKind};
use crate::payments::Payment;
use crate::types::*;

/// Storage abstraction for the ledger engine.
///
/// Each aggregate (accounts, journal entries, documents, payments) persists
/// independently; journal entries reference accounts and documents by id
/// only, so nothing denormalized can drift from the source records.
#[async_trait]
pub trait BooksStorage: Send + Sync {
    // -- accounts --

    /// Save a new account.
    async fn save_account(&mut self, account: &Account) -> BooksResult<()>;

    /// Get an account by id.
    async fn get_account(&self, account_id: &str) -> BooksResult<Option<Account>>;

    /// Look up an account by its human code within a tenant.
    async fn find_account_by_code(
        &self,
        tenant_id: &str,
        code: &str,
    ) -> BooksResult<Option<Account>>;

    /// List a tenant's accounts, optionally filtered by type.
    async fn list_accounts(
        &self,
        tenant_id: &str,
        account_type: Option<AccountType>,
    ) -> BooksResult<Vec<Account>>;

    /// Update an existing account.
    async fn update_account(&mut self, account: &Account) -> BooksResult<()>;

    /// Delete an account. Callers must check references first.
    async fn delete_account(&mut self, account_id: &str) -> BooksResult<()>;

    /// Whether any journal line references the account.
    async fn account_has_lines(&self, account_id: &str) -> BooksResult<bool>;

    /// Whether any account names this one as its parent.
    async fn account_has_children(&self, account_id: &str) -> BooksResult<bool>;

    // -- journal entries --

    /// Save a new journal entry.
    async fn save_entry(&mut self, entry: &JournalEntry) -> BooksResult<()>;

    /// Get a journal entry by id.
    async fn get_entry(&self, entry_id: &str) -> BooksResult<Option<JournalEntry>>;

    /// Update an existing journal entry.
    async fn update_entry(&mut self, entry: &JournalEntry) -> BooksResult<()>;

    /// List a tenant's journal entries within a date range.
    async fn list_entries(
        &self,
        tenant_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> BooksResult<Vec<JournalEntry>>;

    // -- documents --

    /// Save a new document.
    async fn save_document(&mut self, document: &Document) -> BooksResult<()>;

    /// Get a document by id.
    async fn get_document(&self, document_id: &str) -> BooksResult<Option<Document>>;

    /// Update an existing document.
    async fn update_document(&mut self, document: &Document) -> BooksResult<()>;

    /// List a tenant's documents, optionally filtered by kind and party.
    async fn list_documents(
        &self,
        tenant_id: &str,
        kind: Option<DocumentKind>,
        party_id: Option<&str>,
    ) -> BooksResult<Vec<Document>>;

    // -- payments --

    /// Save a new payment.
    async fn save_payment(&mut self, payment: &Payment) -> BooksResult<()>;

    /// Get a payment by id.
    async fn get_payment(&self, payment_id: &str) -> BooksResult<Option<Payment>>;

    // -- balances --

    /// Recompute an account's signed balance from scratch by summing every
    /// posted journal line referencing it up to and including `as_of_date`,
    /// in the normal-balance sign convention. This is the source of truth
    /// the cached `Account::balance` must reconcile against.
    async fn recompute_balance(
        &self,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> BooksResult<BigDecimal>;
}

/// Fiscal period gate, consulted before every post.
///
/// Period open/close administration is outside the engine; the engine only
/// needs the answer for a given date.
#[async_trait]
pub trait PeriodManager: Send + Sync {
    /// Whether the fiscal period containing `date` accepts postings.
    async fn is_period_open(&self, tenant_id: &str, date: NaiveDate) -> BooksResult<bool>;
}

/// Gap-free document/entry number allocator.
///
/// Implementations must serialize allocation per (tenant, sequence, fiscal
/// year) so numbers never collide; the engine does not re-derive numbers.
#[async_trait]
pub trait NumberingService: Send + Sync {
    /// Allocate the next number in a tenant's sequence for a fiscal year.
    async fn next_number(
        &self,
        tenant_id: &str,
        sequence: &str,
        fiscal_year: &str,
    ) -> BooksResult<String>;
}
