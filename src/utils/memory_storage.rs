//! In-memory implementations for testing and development
//!
//! [`MemoryStorage`] backs the whole engine with shared hash maps; clones
//! share the same underlying data, which is what the orchestrator's
//! managers rely on. [`MemoryPeriodManager`] and [`MemoryNumbering`] stand
//! in for the external period and numbering collaborators.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::documents::{Document, DocumentKind};
use crate::payments::Payment;
use crate::traits::*;
use crate::types::*;

/// In-memory storage backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    entries: Arc<RwLock<HashMap<String, JournalEntry>>>,
    documents: Arc<RwLock<HashMap<String, Document>>>,
    payments: Arc<RwLock<HashMap<String, Payment>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all data (useful for testing).
    pub fn clear(&self) {
        self.accounts.write().unwrap().clear();
        self.entries.write().unwrap().clear();
        self.documents.write().unwrap().clear();
        self.payments.write().unwrap().clear();
    }
}

#[async_trait]
impl BooksStorage for MemoryStorage {
    async fn save_account(&mut self, account: &Account) -> BooksResult<()> {
        self.accounts
            .write()
            .unwrap()
            .insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn get_account(&self, account_id: &str) -> BooksResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }

    async fn find_account_by_code(
        &self,
        tenant_id: &str,
        code: &str,
    ) -> BooksResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .values()
            .find(|a| a.tenant_id == tenant_id && a.code == code)
            .cloned())
    }

    async fn list_accounts(
        &self,
        tenant_id: &str,
        account_type: Option<AccountType>,
    ) -> BooksResult<Vec<Account>> {
        let accounts = self.accounts.read().unwrap();
        let mut filtered: Vec<Account> = accounts
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && account_type.as_ref().is_none_or(|t| &a.account_type == t)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(filtered)
    }

    async fn update_account(&mut self, account: &Account) -> BooksResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        if accounts.contains_key(&account.id) {
            accounts.insert(account.id.clone(), account.clone());
            Ok(())
        } else {
            Err(BooksError::AccountNotFound(account.id.clone()))
        }
    }

    async fn delete_account(&mut self, account_id: &str) -> BooksResult<()> {
        if self.accounts.write().unwrap().remove(account_id).is_some() {
            Ok(())
        } else {
            Err(BooksError::AccountNotFound(account_id.to_string()))
        }
    }

    async fn account_has_lines(&self, account_id: &str) -> BooksResult<bool> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .values()
            .any(|e| e.lines.iter().any(|l| l.account_id == account_id)))
    }

    async fn account_has_children(&self, account_id: &str) -> BooksResult<bool> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .values()
            .any(|a| a.parent_id.as_deref() == Some(account_id)))
    }

    async fn save_entry(&mut self, entry: &JournalEntry) -> BooksResult<()> {
        self.entries
            .write()
            .unwrap()
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_entry(&self, entry_id: &str) -> BooksResult<Option<JournalEntry>> {
        Ok(self.entries.read().unwrap().get(entry_id).cloned())
    }

    async fn update_entry(&mut self, entry: &JournalEntry) -> BooksResult<()> {
        let mut entries = self.entries.write().unwrap();
        if entries.contains_key(&entry.id) {
            entries.insert(entry.id.clone(), entry.clone());
            Ok(())
        } else {
            Err(BooksError::EntryNotFound(entry.id.clone()))
        }
    }

    async fn list_entries(
        &self,
        tenant_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> BooksResult<Vec<JournalEntry>> {
        let entries = self.entries.read().unwrap();
        let mut filtered: Vec<JournalEntry> = entries
            .values()
            .filter(|e| {
                e.tenant_id == tenant_id
                    && start_date.is_none_or(|s| e.date >= s)
                    && end_date.is_none_or(|s| e.date <= s)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.date.cmp(&b.date).then(a.entry_number.cmp(&b.entry_number)));
        Ok(filtered)
    }

    async fn save_document(&mut self, document: &Document) -> BooksResult<()> {
        self.documents
            .write()
            .unwrap()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_document(&self, document_id: &str) -> BooksResult<Option<Document>> {
        Ok(self.documents.read().unwrap().get(document_id).cloned())
    }

    async fn update_document(&mut self, document: &Document) -> BooksResult<()> {
        let mut documents = self.documents.write().unwrap();
        if documents.contains_key(&document.id) {
            documents.insert(document.id.clone(), document.clone());
            Ok(())
        } else {
            Err(BooksError::DocumentNotFound(document.id.clone()))
        }
    }

    async fn list_documents(
        &self,
        tenant_id: &str,
        kind: Option<DocumentKind>,
        party_id: Option<&str>,
    ) -> BooksResult<Vec<Document>> {
        let documents = self.documents.read().unwrap();
        let mut filtered: Vec<Document> = documents
            .values()
            .filter(|d| {
                d.tenant_id == tenant_id
                    && kind.is_none_or(|k| d.kind == k)
                    && party_id.is_none_or(|p| d.party_id == p)
            })
            .cloned()
            .collect();
        filtered.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(filtered)
    }

    async fn save_payment(&mut self, payment: &Payment) -> BooksResult<()> {
        self.payments
            .write()
            .unwrap()
            .insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn get_payment(&self, payment_id: &str) -> BooksResult<Option<Payment>> {
        Ok(self.payments.read().unwrap().get(payment_id).cloned())
    }

    async fn recompute_balance(
        &self,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> BooksResult<BigDecimal> {
        let account = self
            .get_account(account_id)
            .await?
            .ok_or_else(|| BooksError::AccountNotFound(account_id.to_string()))?;
        let normal = account.account_type.normal_balance();

        let entries = self.entries.read().unwrap();
        let mut balance = BigDecimal::from(0);
        for entry in entries.values() {
            // Reversed entries stay in the sum; their reversal entries
            // cancel them out.
            if !matches!(entry.status, EntryStatus::Posted | EntryStatus::Reversed) {
                continue;
            }
            if as_of_date.is_some_and(|cutoff| entry.date > cutoff) {
                continue;
            }
            for line in &entry.lines {
                if line.account_id != account_id {
                    continue;
                }
                if line.entry_type() == normal {
                    balance += line.amount();
                } else {
                    balance -= line.amount();
                }
            }
        }
        Ok(balance)
    }
}

/// In-memory period gate with a lock date per tenant; everything on or
/// before the lock date is closed.
#[derive(Debug, Clone, Default)]
pub struct MemoryPeriodManager {
    lock_dates: Arc<RwLock<HashMap<String, NaiveDate>>>,
}

impl MemoryPeriodManager {
    /// Create a period manager with every period open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close all periods up to and including `date` for a tenant.
    pub fn close_through(&self, tenant_id: &str, date: NaiveDate) {
        self.lock_dates
            .write()
            .unwrap()
            .insert(tenant_id.to_string(), date);
    }

    /// Reopen all periods for a tenant.
    pub fn reopen_all(&self, tenant_id: &str) {
        self.lock_dates.write().unwrap().remove(tenant_id);
    }
}

#[async_trait]
impl PeriodManager for MemoryPeriodManager {
    async fn is_period_open(&self, tenant_id: &str, date: NaiveDate) -> BooksResult<bool> {
        Ok(self
            .lock_dates
            .read()
            .unwrap()
            .get(tenant_id)
            .is_none_or(|lock| date > *lock))
    }
}

/// In-memory gap-free number allocator, serialized by a mutex-guarded
/// counter per (tenant, sequence, fiscal year).
#[derive(Debug, Clone, Default)]
pub struct MemoryNumbering {
    counters: Arc<Mutex<HashMap<(String, String, String), u64>>>,
}

impl MemoryNumbering {
    /// Create a numbering service starting every sequence at 1.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NumberingService for MemoryNumbering {
    async fn next_number(
        &self,
        tenant_id: &str,
        sequence: &str,
        fiscal_year: &str,
    ) -> BooksResult<String> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| BooksError::Storage("numbering counter poisoned".to_string()))?;
        let counter = counters
            .entry((
                tenant_id.to_string(),
                sequence.to_string(),
                fiscal_year.to_string(),
            ))
            .or_insert(0);
        *counter += 1;
        Ok(format!("{}/{}/{:04}", sequence, fiscal_year, counter))
    }
}
