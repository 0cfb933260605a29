//! # Finbooks Core
//!
//! A double-entry bookkeeping engine for Indian small-business accounting,
//! covering the chart of accounts, GST tax computation, journal posting,
//! invoices and bills, payment allocation with TDS, and ageing reports.
//!
//! ## Features
//!
//! - **Double-entry bookkeeping**: balanced journal entries with a
//!   Draft -> Posted -> Reversed lifecycle and per-tenant posting locks
//! - **Account management**: hierarchical chart of accounts across Assets,
//!   Liabilities, Equity, Income, and Expense with cached balances
//! - **Indian GST**: CGST/SGST/IGST split by place of supply, exempt codes,
//!   input tax credit eligibility, and reverse charge flags
//! - **Documents**: sales invoices and purchase bills that post themselves
//!   to the ledger with tax and round-off lines
//! - **Payments**: explicit and oldest-first allocation against open
//!   documents, TDS deduction at payment time, on-account advances
//! - **Reporting**: receivables/payables ageing, trial balance, and cached
//!   balance reconciliation
//! - **Storage abstraction**: database-agnostic design with trait-based
//!   storage; an in-memory backend ships in [`utils`]
//!
//! ## Quick Start
//!
//! ```rust
//! use finbooks_core::{Books, MemoryNumbering, MemoryPeriodManager, MemoryStorage};
//! use std::sync::Arc;
//!
//! let storage = MemoryStorage::new();
//! let mut books = Books::new(
//!     storage,
//!     Arc::new(MemoryPeriodManager::new()),
//!     Arc::new(MemoryNumbering::new()),
//! );
//! // books.setup_gst_chart("tenant-1").await?; then create documents,
//! // post them, and record payments.
//! let _ = &mut books;
//! ```

pub mod documents;
pub mod ledger;
pub mod payments;
pub mod reports;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use documents::*;
pub use ledger::*;
pub use payments::*;
pub use reports::*;
pub use tax::gst::*;
pub use traits::*;
pub use types::*;
pub use utils::{MemoryNumbering, MemoryPeriodManager, MemoryStorage};
