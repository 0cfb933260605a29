//! Core types and data structures for the ledger engine

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Assets - what the business owns (Bank, Receivables, Inventory, etc.)
    Asset,
    /// Liabilities - what the business owes (GST Payable, Accounts Payable, etc.)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Income/Revenue - money earned by the business
    Income,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance side for this account type.
    /// Assets and Expenses normally carry debit balances;
    /// Liabilities, Equity, and Income normally carry credit balances.
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => EntryType::Credit,
        }
    }
}

/// Sides of a double-entry posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit - increases Assets and Expenses, decreases the rest
    Debit,
    /// Credit - increases Liabilities, Equity, and Income, decreases the rest
    Credit,
}

/// A chart-of-accounts node.
///
/// `balance` is a cache over the posted journal lines referencing this
/// account. It is updated incrementally on every post and must always be
/// reconcilable with a full recompute from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Tenant that owns the account
    pub tenant_id: String,
    /// Human account code, unique per tenant
    pub code: String,
    /// Human-readable account name
    pub name: String,
    /// Type of account (Asset, Liability, etc.)
    pub account_type: AccountType,
    /// Optional subtype tag (bank, accounts_receivable, gst_payable, ...)
    pub subtype: Option<String>,
    /// Optional parent account for hierarchical chart of accounts
    pub parent_id: Option<String>,
    /// System accounts are created by chart setup and cannot be deleted
    pub is_system: bool,
    /// Deactivated accounts are kept for historical reporting
    pub is_active: bool,
    /// Cached signed balance in the normal-balance convention
    pub balance: BigDecimal,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new active account with a zero balance.
    pub fn new(
        tenant_id: String,
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            code,
            name,
            account_type,
            subtype: None,
            parent_id,
            is_system: false,
            is_active: true,
            balance: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Tag the account with a subtype.
    pub fn with_subtype(mut self, subtype: &str) -> Self {
        self.subtype = Some(subtype.to_string());
        self
    }

    /// Mark the account as a system account.
    pub fn as_system(mut self) -> Self {
        self.is_system = true;
        self
    }

    /// Update the cached balance for one posted line.
    pub fn apply_line(&mut self, line: &JournalLine) {
        match (self.account_type.normal_balance(), line.entry_type()) {
            // Normal balance side increases
            (EntryType::Debit, EntryType::Debit) | (EntryType::Credit, EntryType::Credit) => {
                self.balance += line.amount();
            }
            // Opposite side decreases
            (EntryType::Debit, EntryType::Credit) | (EntryType::Credit, EntryType::Debit) => {
                self.balance -= line.amount();
            }
        }
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// A single line of a journal entry.
///
/// Exactly one of `debit`/`credit` must be positive; the other is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Account being affected
    pub account_id: String,
    /// Debit amount, zero when this is a credit line
    pub debit: BigDecimal,
    /// Credit amount, zero when this is a debit line
    pub credit: BigDecimal,
    /// Tax code behind the amount, when tax-relevant
    pub tax_code_id: Option<String>,
    /// Customer/vendor tag for ledger-by-party queries
    pub contact_id: Option<String>,
    /// Optional description for this specific line
    pub description: Option<String>,
}

impl JournalLine {
    /// Create a debit line.
    pub fn debit(account_id: String, amount: BigDecimal) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: BigDecimal::from(0),
            tax_code_id: None,
            contact_id: None,
            description: None,
        }
    }

    /// Create a credit line.
    pub fn credit(account_id: String, amount: BigDecimal) -> Self {
        Self {
            account_id,
            debit: BigDecimal::from(0),
            credit: amount,
            tax_code_id: None,
            contact_id: None,
            description: None,
        }
    }

    /// Tag the line with a contact for party-wise ledger queries.
    pub fn with_contact(mut self, contact_id: &str) -> Self {
        self.contact_id = Some(contact_id.to_string());
        self
    }

    /// Tag the line with the tax code that produced it.
    pub fn with_tax_code(mut self, tax_code_id: &str) -> Self {
        self.tax_code_id = Some(tax_code_id.to_string());
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Which side of the entry this line sits on.
    pub fn entry_type(&self) -> EntryType {
        if self.debit > BigDecimal::from(0) {
            EntryType::Debit
        } else {
            EntryType::Credit
        }
    }

    /// The positive amount of the line, regardless of side.
    pub fn amount(&self) -> &BigDecimal {
        match self.entry_type() {
            EntryType::Debit => &self.debit,
            EntryType::Credit => &self.credit,
        }
    }

    /// Build this line's mirror image for a reversal entry.
    pub fn swapped(&self) -> JournalLine {
        JournalLine {
            account_id: self.account_id.clone(),
            debit: self.credit.clone(),
            credit: self.debit.clone(),
            tax_code_id: self.tax_code_id.clone(),
            contact_id: self.contact_id.clone(),
            description: self.description.clone(),
        }
    }

    /// Validate line shape: non-negative sides at minor-unit precision,
    /// exactly one positive.
    pub fn validate(&self) -> BooksResult<()> {
        let zero = BigDecimal::from(0);
        if self.debit < zero || self.credit < zero {
            return Err(BooksError::validation(
                "amount",
                "debit and credit amounts must not be negative",
            ));
        }
        // Sub-paisa amounts would make the raw line sums drift from their
        // rounded totals and silently unbalance the trial balance.
        if self.debit != crate::tax::round2(&self.debit)
            || self.credit != crate::tax::round2(&self.credit)
        {
            return Err(BooksError::validation(
                "amount",
                "amounts must not be finer than the minor currency unit",
            ));
        }
        let debit_set = self.debit > zero;
        let credit_set = self.credit > zero;
        if debit_set == credit_set {
            return Err(BooksError::validation(
                "amount",
                "exactly one of debit or credit must be positive",
            ));
        }
        Ok(())
    }
}

/// Journal entry posting lifecycle. Only `Draft -> Posted -> Reversed`
/// transitions are legal; a posted entry's lines are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryStatus {
    Draft,
    Posted,
    Reversed,
}

/// What produced a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalSource {
    /// Hand-keyed entry
    Manual,
    /// Generated by posting an invoice or bill
    Document(String),
    /// Generated by recording a payment
    Payment(String),
}

/// A balanced set of journal lines recorded as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier for the entry
    pub id: String,
    /// Tenant that owns the entry
    pub tenant_id: String,
    /// Sequential entry number, unique per tenant
    pub entry_number: String,
    /// Date the entry takes effect
    pub date: NaiveDate,
    /// Posting lifecycle state
    pub status: EntryStatus,
    /// Which document or payment produced the entry, or Manual
    pub source: JournalSource,
    /// Description of the entry
    pub narration: String,
    /// Lines that make up the entry
    pub lines: Vec<JournalLine>,
    /// Forward link to the reversal entry, once reversed
    pub reversed_by: Option<String>,
    /// When the entry was created
    pub created_at: NaiveDateTime,
    /// When the entry was last updated
    pub updated_at: NaiveDateTime,
}

impl JournalEntry {
    /// Create a new draft entry.
    pub fn new(
        tenant_id: String,
        entry_number: String,
        date: NaiveDate,
        narration: String,
        source: JournalSource,
        lines: Vec<JournalLine>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            entry_number,
            date,
            status: EntryStatus::Draft,
            source,
            narration,
            lines,
            reversed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total of all debit lines.
    pub fn total_debits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.debit).sum()
    }

    /// Total of all credit lines.
    pub fn total_credits(&self) -> BigDecimal {
        self.lines.iter().map(|l| &l.credit).sum()
    }

    /// Whether debits exactly equal credits.
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }

    /// Validate the entry shape before it can be posted.
    pub fn validate(&self) -> BooksResult<()> {
        if self.lines.len() < 2 {
            return Err(BooksError::validation(
                "lines",
                "entry must have at least two lines for double-entry bookkeeping",
            ));
        }
        for line in &self.lines {
            line.validate()?;
        }
        if !self.is_balanced() {
            return Err(BooksError::UnbalancedEntry {
                debits: self.total_debits(),
                credits: self.total_credits(),
            });
        }
        Ok(())
    }
}

/// Errors surfaced by the ledger engine.
///
/// The taxonomy separates user-correctable problems (validation, state and
/// period conflicts) from programming errors (invariant violations) and
/// retryable contention ([`BooksError::is_retryable`]).
#[derive(Debug, thiserror::Error)]
pub enum BooksError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("posting lock busy for tenant '{0}', retry the operation")]
    ConcurrencyConflict(String),
    #[error("fiscal period containing {0} is closed")]
    PeriodClosed(NaiveDate),
    #[error("entry is unbalanced: debits {debits} != credits {credits}")]
    UnbalancedEntry {
        debits: BigDecimal,
        credits: BigDecimal,
    },
    #[error("account code '{0}' already exists in this tenant")]
    DuplicateCode(String),
    #[error("invalid parent account: {0}")]
    InvalidParent(String),
    #[error("allocations total {allocated} exceeds payment amount {amount}")]
    OverAllocation {
        allocated: BigDecimal,
        amount: BigDecimal,
    },
    #[error("document {0} is already settled or void")]
    DocumentAlreadyPaid(String),
    #[error("document {document} does not belong to contact {contact}")]
    CrossPartyAllocation { document: String, contact: String },
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("payment not found: {0}")]
    PaymentNotFound(String),
}

impl BooksError {
    /// Shorthand for a field-level validation error.
    pub fn validation(field: &str, reason: &str) -> Self {
        BooksError::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller may safely retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BooksError::ConcurrencyConflict(_))
    }
}

/// Result type for ledger operations
pub type BooksResult<T> = Result<T, BooksError>;
