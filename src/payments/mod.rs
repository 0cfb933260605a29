//! Payment recording and allocation
//!
//! A payment is applied across one or more outstanding documents, either by
//! explicit caller-supplied amounts or oldest-first by due date. Whatever
//! cannot be allocated stays on the payment as an on-account advance; it is
//! tracked, never discarded. Each payment posts exactly one journal entry.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::documents::{Document, DocumentKind, DocumentStatus};
use crate::ledger::{JournalManager, PostingAccounts};
use crate::tax::round2;
use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Direction of cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentDirection {
    /// Money received from a customer
    Receive,
    /// Money paid to a vendor
    Pay,
}

impl PaymentDirection {
    /// The document kind this direction settles.
    pub fn document_kind(&self) -> DocumentKind {
        match self {
            PaymentDirection::Receive => DocumentKind::Sale,
            PaymentDirection::Pay => DocumentKind::Purchase,
        }
    }
}

/// One slice of a payment applied to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub document_id: String,
    /// Cash applied to the document
    pub amount: BigDecimal,
    /// TDS deducted alongside the cash, treated as paid on the document
    pub tds_amount: BigDecimal,
}

/// A recorded payment with its allocations.
///
/// Payments are create-only once posted; undoing one means a reversing
/// payment plus a reversing journal entry, never deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub direction: PaymentDirection,
    /// Bank or cash account the money moved through
    pub account_id: String,
    pub contact_id: String,
    pub allocations: Vec<PaymentAllocation>,
    /// On-account remainder not applied to any document
    pub unallocated: BigDecimal,
    pub journal_entry_id: Option<String>,
    /// Set on a reversing payment, linking the payment it undoes
    pub reverses: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Payment {
    /// Total cash applied across allocations.
    pub fn allocated_total(&self) -> BigDecimal {
        self.allocations.iter().map(|a| &a.amount).sum()
    }

    /// Total TDS deducted across allocations.
    pub fn tds_total(&self) -> BigDecimal {
        self.allocations.iter().map(|a| &a.tds_amount).sum()
    }
}

/// How a payment is spread across documents.
#[derive(Debug, Clone)]
pub enum AllocationStrategy {
    /// Caller supplies per-document cash amounts
    Explicit(Vec<(String, BigDecimal)>),
    /// Auto-apply to the party's outstanding documents, due date ascending
    /// then document date ascending
    OldestFirst,
}

/// Caller input for recording a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub tenant_id: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub direction: PaymentDirection,
    pub account_id: String,
    pub contact_id: String,
}

/// Allocates payments against outstanding documents and posts the
/// resulting journal entry.
pub struct PaymentAllocator<S: BooksStorage> {
    storage: S,
    journal: JournalManager<S>,
}

impl<S: BooksStorage> PaymentAllocator<S> {
    /// Create a new payment allocator.
    pub fn new(storage: S, journal: JournalManager<S>) -> Self {
        Self { storage, journal }
    }

    /// Get a payment by id, returning an error if not found.
    pub async fn get_payment_required(&self, payment_id: &str) -> BooksResult<Payment> {
        self.storage
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BooksError::PaymentNotFound(payment_id.to_string()))
    }

    /// Record a payment, allocate it per the strategy, post its journal
    /// entry, and update every touched document's balance and status.
    ///
    /// Everything is validated and computed before any mutation; the
    /// journal post is the commit point, and document/payment writes follow
    /// only on its success.
    pub async fn record_payment(
        &mut self,
        input: NewPayment,
        strategy: AllocationStrategy,
        accounts: &PostingAccounts,
    ) -> BooksResult<Payment> {
        validation::validate_positive_amount("amount", &input.amount)?;

        // Held from here through allocation, the journal post and the
        // document writes, so no concurrent post can settle the same
        // documents against a stale balance.
        let _guard = self.journal.locks().acquire(&input.tenant_id)?;

        let mut updated_docs: Vec<Document> = Vec::new();
        let mut allocations: Vec<PaymentAllocation> = Vec::new();

        match strategy {
            AllocationStrategy::Explicit(requested) => {
                let requested_total: BigDecimal = requested.iter().map(|(_, a)| a).sum();
                if requested_total > input.amount {
                    return Err(BooksError::OverAllocation {
                        allocated: requested_total,
                        amount: input.amount,
                    });
                }
                let mut seen = std::collections::HashSet::new();
                for (document_id, cash) in requested {
                    if cash <= BigDecimal::from(0) {
                        return Err(BooksError::validation(
                            "allocations",
                            "allocation amounts must be positive",
                        ));
                    }
                    if !seen.insert(document_id.clone()) {
                        return Err(BooksError::validation(
                            "allocations",
                            "a document may appear at most once per payment",
                        ));
                    }
                    let mut document = self
                        .storage
                        .get_document(&document_id)
                        .await?
                        .ok_or_else(|| BooksError::DocumentNotFound(document_id.clone()))?;
                    self.check_allocatable(&document, &input)?;

                    let tds = if input.direction == PaymentDirection::Pay {
                        document.pending_tds()
                    } else {
                        BigDecimal::from(0)
                    };
                    let applied_total = &cash + &tds;
                    if applied_total > document.balance_due() {
                        return Err(BooksError::validation(
                            "allocations",
                            &format!(
                                "allocation of {} (plus TDS {}) exceeds balance due {} on document {}",
                                cash,
                                tds,
                                document.balance_due(),
                                document.number
                            ),
                        ));
                    }

                    document.amount_paid += &applied_total;
                    document.tds_deducted += &tds;
                    document.refresh_payment_status();
                    allocations.push(PaymentAllocation {
                        document_id: document.id.clone(),
                        amount: cash,
                        tds_amount: tds,
                    });
                    updated_docs.push(document);
                }
            }
            AllocationStrategy::OldestFirst => {
                let mut outstanding: Vec<Document> = self
                    .storage
                    .list_documents(
                        &input.tenant_id,
                        Some(input.direction.document_kind()),
                        Some(&input.contact_id),
                    )
                    .await?
                    .into_iter()
                    .filter(Document::is_outstanding)
                    .collect();
                outstanding.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.date.cmp(&b.date)));

                let mut remaining = input.amount.clone();
                for mut document in outstanding {
                    if remaining <= BigDecimal::from(0) {
                        break;
                    }
                    let tds = if input.direction == PaymentDirection::Pay {
                        document.pending_tds()
                    } else {
                        BigDecimal::from(0)
                    };
                    // The cash the document can still absorb after TDS is
                    // treated as paid.
                    let cash_due = document.balance_due() - &tds;
                    if cash_due <= BigDecimal::from(0) {
                        continue;
                    }
                    let cash = if remaining < cash_due {
                        remaining.clone()
                    } else {
                        cash_due
                    };
                    remaining -= &cash;

                    document.amount_paid += &cash + &tds;
                    document.tds_deducted += &tds;
                    document.refresh_payment_status();
                    allocations.push(PaymentAllocation {
                        document_id: document.id.clone(),
                        amount: cash,
                        tds_amount: tds,
                    });
                    updated_docs.push(document);
                }
            }
        }

        let allocated: BigDecimal = allocations.iter().map(|a| &a.amount).sum();
        let unallocated = &input.amount - &allocated;

        let mut payment = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: input.tenant_id.clone(),
            date: input.date,
            amount: input.amount.clone(),
            direction: input.direction,
            account_id: input.account_id.clone(),
            contact_id: input.contact_id.clone(),
            allocations,
            unallocated,
            journal_entry_id: None,
            reverses: None,
            created_at: chrono::Utc::now().naive_utc(),
        };

        let lines = build_payment_lines(&payment, accounts);
        let narration = format!(
            "{} payment for contact {}",
            match payment.direction {
                PaymentDirection::Receive => "Customer",
                PaymentDirection::Pay => "Vendor",
            },
            payment.contact_id
        );
        let entry = self
            .journal
            .record_and_post_locked(
                &payment.tenant_id,
                payment.date,
                &narration,
                JournalSource::Payment(payment.id.clone()),
                lines,
            )
            .await?;
        payment.journal_entry_id = Some(entry.id);

        for document in &updated_docs {
            self.storage.update_document(document).await?;
        }
        self.storage.save_payment(&payment).await?;

        info!(
            payment = %payment.id,
            amount = %payment.amount,
            allocated = %payment.allocated_total(),
            unallocated = %payment.unallocated,
            "payment recorded"
        );
        Ok(payment)
    }

    /// Void a payment by recording its mirror image: the journal entry is
    /// reversed and every touched document's paid amount and status are
    /// restored. The original payment record is never deleted.
    pub async fn void_payment(&mut self, payment_id: &str, reason: &str) -> BooksResult<Payment> {
        let original = self.get_payment_required(payment_id).await?;
        if original.reverses.is_some() {
            return Err(BooksError::StateConflict(
                "a reversing payment cannot itself be voided".to_string(),
            ));
        }
        let entry_id = original.journal_entry_id.clone().ok_or_else(|| {
            BooksError::InvariantViolation(format!(
                "payment '{}' has no journal entry",
                original.id
            ))
        })?;

        let _guard = self.journal.locks().acquire(&original.tenant_id)?;
        let reversal_entry = self.journal.reverse_locked(&entry_id, reason, None).await?;

        for allocation in &original.allocations {
            let mut document = self
                .storage
                .get_document(&allocation.document_id)
                .await?
                .ok_or_else(|| {
                    BooksError::DocumentNotFound(allocation.document_id.clone())
                })?;
            document.amount_paid -= &allocation.amount + &allocation.tds_amount;
            document.tds_deducted -= &allocation.tds_amount;
            document.refresh_payment_status();
            self.storage.update_document(&document).await?;
        }

        let reversing = Payment {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: original.tenant_id.clone(),
            date: chrono::Utc::now().date_naive(),
            amount: original.amount.clone(),
            direction: original.direction,
            account_id: original.account_id.clone(),
            contact_id: original.contact_id.clone(),
            allocations: original.allocations.clone(),
            unallocated: original.unallocated.clone(),
            journal_entry_id: Some(reversal_entry.id),
            reverses: Some(original.id.clone()),
            created_at: chrono::Utc::now().naive_utc(),
        };
        self.storage.save_payment(&reversing).await?;

        info!(payment = %original.id, reversal = %reversing.id, "payment voided");
        Ok(reversing)
    }

    /// Preconditions shared by both strategies for one document.
    fn check_allocatable(&self, document: &Document, input: &NewPayment) -> BooksResult<()> {
        if document.tenant_id != input.tenant_id {
            return Err(BooksError::DocumentNotFound(document.id.clone()));
        }
        if matches!(document.status, DocumentStatus::Paid | DocumentStatus::Void) {
            return Err(BooksError::DocumentAlreadyPaid(document.number.clone()));
        }
        if !document.is_outstanding() {
            return Err(BooksError::StateConflict(format!(
                "document '{}' is {:?} and cannot absorb payment",
                document.number, document.status
            )));
        }
        if document.kind != input.direction.document_kind() {
            return Err(BooksError::validation(
                "allocations",
                "payment direction does not match the document kind",
            ));
        }
        if document.party_id != input.contact_id {
            return Err(BooksError::CrossPartyAllocation {
                document: document.number.clone(),
                contact: input.contact_id.clone(),
            });
        }
        Ok(())
    }
}

/// Build the single journal entry's lines for a payment.
///
/// Receive: debit bank for the full amount; credit receivables per
/// allocation; credit customer advances for any on-account remainder.
/// Pay: credit bank; debit payables for cash plus TDS per allocation;
/// credit TDS payable for the deducted tax; debit vendor advances for the
/// remainder. The TDS portion never touches the bank account.
fn build_payment_lines(payment: &Payment, accounts: &PostingAccounts) -> Vec<JournalLine> {
    let zero = BigDecimal::from(0);
    let mut lines = Vec::new();

    match payment.direction {
        PaymentDirection::Receive => {
            lines.push(JournalLine::debit(
                payment.account_id.clone(),
                payment.amount.clone(),
            ));
            for allocation in &payment.allocations {
                lines.push(
                    JournalLine::credit(
                        accounts.accounts_receivable.clone(),
                        allocation.amount.clone(),
                    )
                    .with_contact(&payment.contact_id),
                );
            }
            if payment.unallocated > zero {
                lines.push(
                    JournalLine::credit(
                        accounts.customer_advances.clone(),
                        payment.unallocated.clone(),
                    )
                    .with_contact(&payment.contact_id)
                    .with_description("On-account receipt"),
                );
            }
        }
        PaymentDirection::Pay => {
            for allocation in &payment.allocations {
                lines.push(
                    JournalLine::debit(
                        accounts.accounts_payable.clone(),
                        round2(&(&allocation.amount + &allocation.tds_amount)),
                    )
                    .with_contact(&payment.contact_id),
                );
            }
            if payment.unallocated > zero {
                lines.push(
                    JournalLine::debit(
                        accounts.vendor_advances.clone(),
                        payment.unallocated.clone(),
                    )
                    .with_contact(&payment.contact_id)
                    .with_description("On-account advance"),
                );
            }
            lines.push(JournalLine::credit(
                payment.account_id.clone(),
                payment.amount.clone(),
            ));
            let tds = payment.tds_total();
            if tds > zero {
                lines.push(
                    JournalLine::credit(accounts.tds_payable.clone(), tds)
                        .with_description("TDS deducted at payment"),
                );
            }
        }
    }
    lines
}
