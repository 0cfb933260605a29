//! Invoices and bills
//!
//! One [`Document`] type tagged with a [`DocumentKind`] covers both sales
//! invoices and purchase bills; the posting rules are symmetric with the
//! debit and credit sides selected by kind, so the balance and lifecycle
//! invariants live in one place.

use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::ledger::{JournalManager, PostingAccounts};
use crate::tax::{compute_tax, document_round_off, round2, TaxCode};
use crate::traits::*;
use crate::types::*;

/// The Indian fiscal year (April to March) containing a date, formatted
/// like `2024-25` for use in document number sequences.
pub fn fiscal_year(date: NaiveDate) -> String {
    let start = if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}-{:02}", start, (start + 1) % 100)
}

/// Whether a document is a sales invoice or a purchase bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// Sales invoice: debit receivables, credit revenue and output tax
    Sale,
    /// Purchase bill: debit expense and input tax credit, credit payables
    Purchase,
}

impl DocumentKind {
    /// Number sequence prefix for this kind.
    pub fn sequence(&self) -> &'static str {
        match self {
            DocumentKind::Sale => "INV",
            DocumentKind::Purchase => "BILL",
        }
    }
}

/// Document lifecycle. Line amounts freeze on `Posted`; `Partial` and
/// `Paid` are driven by payment allocation; `Void` requires zero paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Draft,
    Posted,
    Partial,
    Paid,
    Void,
}

/// Caller input for one document line.
#[derive(Debug, Clone)]
pub struct NewDocumentLine {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_rate: BigDecimal,
    pub discount_amount: BigDecimal,
    pub tax_code: TaxCode,
}

/// A computed document line with its GST split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_rate: BigDecimal,
    pub discount_amount: BigDecimal,
    pub tax_code: TaxCode,
    /// quantity * unit_rate - discount, rounded to the minor unit
    pub taxable_amount: BigDecimal,
    pub cgst_amount: BigDecimal,
    pub sgst_amount: BigDecimal,
    pub igst_amount: BigDecimal,
    /// taxable_amount plus this line's tax
    pub line_total: BigDecimal,
}

impl DocumentLine {
    /// Validate the input and compute tax for it within a supply context.
    pub fn compute(
        input: NewDocumentLine,
        seller_state: &str,
        place_of_supply: &str,
    ) -> BooksResult<Self> {
        let zero = BigDecimal::from(0);
        if input.quantity <= zero {
            return Err(BooksError::validation(
                "quantity",
                "quantity must be positive",
            ));
        }
        if input.unit_rate < zero {
            return Err(BooksError::validation(
                "unit_rate",
                "unit rate must not be negative",
            ));
        }
        if input.discount_amount < zero {
            return Err(BooksError::validation(
                "discount_amount",
                "discount must not be negative",
            ));
        }
        let gross = round2(&(&input.quantity * &input.unit_rate));
        if input.discount_amount > gross {
            return Err(BooksError::validation(
                "discount_amount",
                "discount cannot exceed the line amount",
            ));
        }
        let taxable = &gross - &input.discount_amount;
        let breakdown = compute_tax(&taxable, &input.tax_code, seller_state, place_of_supply)?;

        Ok(Self {
            description: input.description,
            quantity: input.quantity,
            unit_rate: input.unit_rate,
            discount_amount: input.discount_amount,
            tax_code: input.tax_code,
            taxable_amount: breakdown.taxable_amount,
            cgst_amount: breakdown.cgst_amount,
            sgst_amount: breakdown.sgst_amount,
            igst_amount: breakdown.igst_amount,
            line_total: breakdown.total_amount,
        })
    }

    /// This line's total tax.
    pub fn tax_amount(&self) -> BigDecimal {
        &self.cgst_amount + &self.sgst_amount + &self.igst_amount
    }
}

/// A sales invoice or purchase bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub tenant_id: String,
    pub kind: DocumentKind,
    /// Number unique per tenant, kind and fiscal year
    pub number: String,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    /// Customer (Sale) or vendor (Purchase)
    pub party_id: String,
    /// Tenant's GST registration state code
    pub seller_state: String,
    /// Place-of-supply state code; differing states make the supply interstate
    pub place_of_supply: String,
    pub lines: Vec<DocumentLine>,
    /// Sum of line taxable amounts
    pub subtotal: BigDecimal,
    /// Sum of line tax amounts
    pub tax_total: BigDecimal,
    /// Document-level round-off to the nearest whole unit
    pub round_off: BigDecimal,
    /// subtotal + tax_total + round_off
    pub total_amount: BigDecimal,
    /// Cash applied plus TDS treated as paid
    pub amount_paid: BigDecimal,
    pub status: DocumentStatus,
    /// Entry created when the document was posted
    pub journal_entry_id: Option<String>,
    /// TDS rate for purchase bills; deducted at payment time
    pub tds_rate: Option<BigDecimal>,
    /// TDS already routed to the TDS payable account
    pub tds_deducted: BigDecimal,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// Outstanding amount, always derived as `total_amount - amount_paid`.
    pub fn balance_due(&self) -> BigDecimal {
        &self.total_amount - &self.amount_paid
    }

    /// Whether the document can still absorb payment.
    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, DocumentStatus::Posted | DocumentStatus::Partial)
            && self.balance_due() > BigDecimal::from(0)
    }

    /// TDS not yet deducted for this bill, computed on the gross total.
    pub fn pending_tds(&self) -> BigDecimal {
        match (&self.tds_rate, self.kind) {
            (Some(rate), DocumentKind::Purchase) => {
                let full = round2(&(&self.total_amount * rate / BigDecimal::from(100)));
                let pending = full - &self.tds_deducted;
                if pending > BigDecimal::from(0) {
                    pending
                } else {
                    BigDecimal::from(0)
                }
            }
            _ => BigDecimal::from(0),
        }
    }

    /// Re-derive payment status from the paid amount. Draft and Void are
    /// never touched by payments.
    pub(crate) fn refresh_payment_status(&mut self) {
        if matches!(self.status, DocumentStatus::Draft | DocumentStatus::Void) {
            return;
        }
        let zero = BigDecimal::from(0);
        self.status = if self.balance_due() <= zero {
            DocumentStatus::Paid
        } else if self.amount_paid > zero {
            DocumentStatus::Partial
        } else {
            DocumentStatus::Posted
        };
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Caller input for creating a document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub tenant_id: String,
    pub kind: DocumentKind,
    pub date: NaiveDate,
    pub due_date: NaiveDate,
    pub party_id: String,
    pub seller_state: String,
    pub place_of_supply: String,
    pub lines: Vec<NewDocumentLine>,
    /// TDS rate, purchase bills only
    pub tds_rate: Option<BigDecimal>,
}

/// Engine for the document lifecycle: create as draft, post into the
/// ledger, void via reversal.
pub struct DocumentEngine<S: BooksStorage> {
    storage: S,
    journal: JournalManager<S>,
    numbering: Arc<dyn NumberingService>,
}

impl<S: BooksStorage> DocumentEngine<S> {
    /// Create a new document engine.
    pub fn new(storage: S, journal: JournalManager<S>, numbering: Arc<dyn NumberingService>) -> Self {
        Self {
            storage,
            journal,
            numbering,
        }
    }

    /// Create a draft document, computing per-line GST and the document
    /// round-off, and allocating its number for the date's fiscal year.
    pub async fn create_document(&mut self, input: NewDocument) -> BooksResult<Document> {
        if input.lines.is_empty() {
            return Err(BooksError::validation(
                "lines",
                "document must have at least one line",
            ));
        }
        if input.due_date < input.date {
            return Err(BooksError::validation(
                "due_date",
                "due date must not precede the document date",
            ));
        }
        if input.tds_rate.is_some() && input.kind == DocumentKind::Sale {
            return Err(BooksError::validation(
                "tds_rate",
                "TDS applies to purchase bills only",
            ));
        }

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in input.lines {
            lines.push(DocumentLine::compute(
                line,
                &input.seller_state,
                &input.place_of_supply,
            )?);
        }

        let subtotal: BigDecimal = lines.iter().map(|l| &l.taxable_amount).sum();
        let tax_total: BigDecimal = lines.iter().map(|l| l.tax_amount()).sum();
        let grand = &subtotal + &tax_total;
        let round_off = document_round_off(&grand);
        let total_amount = &grand + &round_off;

        let number = self
            .numbering
            .next_number(
                &input.tenant_id,
                input.kind.sequence(),
                &fiscal_year(input.date),
            )
            .await?;

        let now = chrono::Utc::now().naive_utc();
        let document = Document {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: input.tenant_id,
            kind: input.kind,
            number,
            date: input.date,
            due_date: input.due_date,
            party_id: input.party_id,
            seller_state: input.seller_state,
            place_of_supply: input.place_of_supply,
            lines,
            subtotal,
            tax_total,
            round_off,
            total_amount,
            amount_paid: BigDecimal::from(0),
            status: DocumentStatus::Draft,
            journal_entry_id: None,
            tds_rate: input.tds_rate,
            tds_deducted: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        };
        self.storage.save_document(&document).await?;
        Ok(document)
    }

    /// Get a document by id.
    pub async fn get_document(&self, document_id: &str) -> BooksResult<Option<Document>> {
        self.storage.get_document(document_id).await
    }

    /// Get a document by id, returning an error if not found.
    pub async fn get_document_required(&self, document_id: &str) -> BooksResult<Document> {
        self.storage
            .get_document(document_id)
            .await?
            .ok_or_else(|| BooksError::DocumentNotFound(document_id.to_string()))
    }

    /// Replace a draft document's lines and recompute its totals.
    /// Posted documents are frozen; editing them is a state conflict.
    pub async fn update_draft_lines(
        &mut self,
        document_id: &str,
        lines: Vec<NewDocumentLine>,
    ) -> BooksResult<Document> {
        let mut document = self.get_document_required(document_id).await?;
        if document.status != DocumentStatus::Draft {
            return Err(BooksError::StateConflict(format!(
                "document '{}' is {:?} and can no longer be edited",
                document.number, document.status
            )));
        }
        if lines.is_empty() {
            return Err(BooksError::validation(
                "lines",
                "document must have at least one line",
            ));
        }

        let mut computed = Vec::with_capacity(lines.len());
        for line in lines {
            computed.push(DocumentLine::compute(
                line,
                &document.seller_state,
                &document.place_of_supply,
            )?);
        }
        document.subtotal = computed.iter().map(|l| &l.taxable_amount).sum();
        document.tax_total = computed.iter().map(|l| l.tax_amount()).sum();
        let grand = &document.subtotal + &document.tax_total;
        document.round_off = document_round_off(&grand);
        document.total_amount = &grand + &document.round_off;
        document.lines = computed;
        document.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_document(&document).await?;
        Ok(document)
    }

    /// Post a draft document: build its balanced journal entry, post it via
    /// the ledger, and freeze the lines. Posting an already-posted document
    /// returns it unchanged.
    pub async fn post_document(
        &mut self,
        document_id: &str,
        accounts: &PostingAccounts,
    ) -> BooksResult<Document> {
        let tenant_id = self.get_document_required(document_id).await?.tenant_id;
        // Held through the status check, the post and the document write.
        let _guard = self.journal.locks().acquire(&tenant_id)?;
        let mut document = self.get_document_required(document_id).await?;
        match document.status {
            DocumentStatus::Draft => {}
            DocumentStatus::Posted => return Ok(document),
            other => {
                return Err(BooksError::StateConflict(format!(
                    "document '{}' is {:?} and cannot be posted",
                    document.number, other
                )));
            }
        }

        let lines = build_posting_lines(&document, accounts);
        let narration = format!(
            "{} {} for party {}",
            match document.kind {
                DocumentKind::Sale => "Invoice",
                DocumentKind::Purchase => "Bill",
            },
            document.number,
            document.party_id
        );
        let entry = self
            .journal
            .record_and_post_locked(
                &document.tenant_id,
                document.date,
                &narration,
                JournalSource::Document(document.id.clone()),
                lines,
            )
            .await?;

        document.status = DocumentStatus::Posted;
        document.journal_entry_id = Some(entry.id);
        document.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_document(&document).await?;

        info!(document = %document.number, total = %document.total_amount, "document posted");
        Ok(document)
    }

    /// Void a document. Only legal with nothing paid against it; a posted
    /// document gets a reversing journal entry, a draft is simply marked.
    pub async fn void_document(
        &mut self,
        document_id: &str,
        reason: &str,
    ) -> BooksResult<Document> {
        let tenant_id = self.get_document_required(document_id).await?.tenant_id;
        let _guard = self.journal.locks().acquire(&tenant_id)?;
        let mut document = self.get_document_required(document_id).await?;
        if document.amount_paid != BigDecimal::from(0) {
            return Err(BooksError::StateConflict(format!(
                "document '{}' has payments applied and cannot be voided",
                document.number
            )));
        }
        match document.status {
            DocumentStatus::Draft => {}
            DocumentStatus::Posted => {
                let entry_id = document.journal_entry_id.clone().ok_or_else(|| {
                    BooksError::InvariantViolation(format!(
                        "posted document '{}' has no journal entry",
                        document.number
                    ))
                })?;
                self.journal.reverse_locked(&entry_id, reason, None).await?;
            }
            other => {
                return Err(BooksError::StateConflict(format!(
                    "document '{}' is {:?} and cannot be voided",
                    document.number, other
                )));
            }
        }
        document.status = DocumentStatus::Void;
        document.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_document(&document).await?;

        info!(document = %document.number, "document voided");
        Ok(document)
    }
}

/// Build the journal lines for posting a document.
///
/// Sale: debit receivables for the total; credit sales for the taxable
/// subtotal; credit each GST output component; round-off on the income
/// side. Purchase mirrors it: credit payables, debit purchases, debit GST
/// input credit for ITC-eligible tax (ineligible tax stays in the expense).
/// TDS never appears here; it is deducted at payment time.
fn build_posting_lines(document: &Document, accounts: &PostingAccounts) -> Vec<JournalLine> {
    let zero = BigDecimal::from(0);
    let cgst: BigDecimal = document.lines.iter().map(|l| &l.cgst_amount).sum();
    let sgst: BigDecimal = document.lines.iter().map(|l| &l.sgst_amount).sum();
    let igst: BigDecimal = document.lines.iter().map(|l| &l.igst_amount).sum();

    let mut lines = Vec::new();
    match document.kind {
        DocumentKind::Sale => {
            lines.push(
                JournalLine::debit(
                    accounts.accounts_receivable.clone(),
                    document.total_amount.clone(),
                )
                .with_contact(&document.party_id),
            );
            lines.push(JournalLine::credit(
                accounts.sales.clone(),
                document.subtotal.clone(),
            ));
            if cgst > zero {
                lines.push(JournalLine::credit(accounts.cgst_payable.clone(), cgst));
            }
            if sgst > zero {
                lines.push(JournalLine::credit(accounts.sgst_payable.clone(), sgst));
            }
            if igst > zero {
                lines.push(JournalLine::credit(accounts.igst_payable.clone(), igst));
            }
            if document.round_off > zero {
                lines.push(JournalLine::credit(
                    accounts.round_off.clone(),
                    document.round_off.clone(),
                ));
            } else if document.round_off < zero {
                lines.push(JournalLine::debit(
                    accounts.round_off.clone(),
                    document.round_off.abs(),
                ));
            }
        }
        DocumentKind::Purchase => {
            // Tax under a non-ITC code is part of the cost of the purchase.
            let itc_tax: BigDecimal = document
                .lines
                .iter()
                .filter(|l| l.tax_code.is_itc_eligible)
                .map(|l| l.tax_amount())
                .sum();
            let non_itc_tax: BigDecimal = document
                .lines
                .iter()
                .filter(|l| !l.tax_code.is_itc_eligible)
                .map(|l| l.tax_amount())
                .sum();

            lines.push(JournalLine::debit(
                accounts.purchases.clone(),
                &document.subtotal + &non_itc_tax,
            ));
            if itc_tax > zero {
                lines.push(JournalLine::debit(accounts.gst_input_credit.clone(), itc_tax));
            }
            if document.round_off > zero {
                lines.push(JournalLine::debit(
                    accounts.round_off.clone(),
                    document.round_off.clone(),
                ));
            } else if document.round_off < zero {
                lines.push(JournalLine::credit(
                    accounts.round_off.clone(),
                    document.round_off.abs(),
                ));
            }
            lines.push(
                JournalLine::credit(
                    accounts.accounts_payable.clone(),
                    document.total_amount.clone(),
                )
                .with_contact(&document.party_id),
            );
        }
    }
    lines
}
