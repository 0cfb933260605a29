//! Integration tests for finbooks-core

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;

use finbooks_core::{
    AllocationStrategy, Books, BooksError, DocumentKind, DocumentStatus, EntryStatus, JournalLine,
    MemoryNumbering, MemoryPeriodManager, MemoryStorage, NewDocument, NewDocumentLine, NewPayment,
    PaymentDirection, TaxCode, TenantLocks,
};

const TENANT: &str = "tenant-1";

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn amt(value: &str) -> BigDecimal {
    value.parse().unwrap()
}

fn setup() -> (Books<MemoryStorage>, MemoryPeriodManager) {
    let periods = MemoryPeriodManager::new();
    let books = Books::new(
        MemoryStorage::new(),
        Arc::new(periods.clone()),
        Arc::new(MemoryNumbering::new()),
    );
    (books, periods)
}

fn invoice_line(rate: &str, tax_code: TaxCode) -> NewDocumentLine {
    NewDocumentLine {
        description: "Services rendered".to_string(),
        quantity: BigDecimal::from(1),
        unit_rate: amt(rate),
        discount_amount: BigDecimal::from(0),
        tax_code,
    }
}

fn new_invoice(
    date: NaiveDate,
    due_date: NaiveDate,
    party: &str,
    lines: Vec<NewDocumentLine>,
) -> NewDocument {
    NewDocument {
        tenant_id: TENANT.to_string(),
        kind: DocumentKind::Sale,
        date,
        due_date,
        party_id: party.to_string(),
        seller_state: "KA".to_string(),
        place_of_supply: "KA".to_string(),
        lines,
        tds_rate: None,
    }
}

#[tokio::test]
async fn test_complete_invoice_workflow() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 5),
            d(2024, 2, 4),
            "cust-1",
            vec![invoice_line("1000.00", TaxCode::gst("gst18", BigDecimal::from(18)))],
        ))
        .await
        .unwrap();
    assert_eq!(invoice.status, DocumentStatus::Draft);
    assert_eq!(invoice.subtotal, amt("1000.00"));
    assert_eq!(invoice.tax_total, amt("180.00"));
    assert_eq!(invoice.total_amount, amt("1180.00"));
    assert_eq!(invoice.number, "INV/2023-24/0001");

    let invoice = books.post_document(&invoice.id, &accounts).await.unwrap();
    assert_eq!(invoice.status, DocumentStatus::Posted);

    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        amt("1180.00")
    );
    assert_eq!(
        books.get_account_balance(&accounts.sales, None).await.unwrap(),
        amt("1000.00")
    );
    assert_eq!(
        books
            .get_account_balance(&accounts.cgst_payable, None)
            .await
            .unwrap(),
        amt("90.00")
    );
    assert_eq!(
        books
            .get_account_balance(&accounts.sgst_payable, None)
            .await
            .unwrap(),
        amt("90.00")
    );

    let payment = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 1, 20),
                amount: amt("1180.00"),
                direction: PaymentDirection::Receive,
                account_id: accounts.bank.clone(),
                contact_id: "cust-1".to_string(),
            },
            AllocationStrategy::Explicit(vec![(invoice.id.clone(), amt("1180.00"))]),
            &accounts,
        )
        .await
        .unwrap();
    assert_eq!(payment.unallocated, BigDecimal::from(0));

    let invoice = books.get_document(&invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, DocumentStatus::Paid);
    assert_eq!(invoice.balance_due(), BigDecimal::from(0));

    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        BigDecimal::from(0)
    );
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("1180.00")
    );

    let trial = books.trial_balance(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(trial.is_balanced);
    assert_eq!(trial.total_debits, trial.total_credits);

    let integrity = books.verify_ledger(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(integrity.is_valid);
    assert!(integrity.mismatches.is_empty());
}

#[tokio::test]
async fn test_intrastate_odd_paisa_splits_and_rounds_off() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    // 101.00 at 18%: full tax 18.18 splits into 9.09 + 9.09, grand total
    // 119.18 rounds to 119.00 with a -0.18 round-off.
    let invoice = books
        .create_document(new_invoice(
            d(2024, 5, 1),
            d(2024, 5, 31),
            "cust-1",
            vec![invoice_line("101.00", TaxCode::gst("gst18", BigDecimal::from(18)))],
        ))
        .await
        .unwrap();
    assert_eq!(invoice.lines[0].cgst_amount, amt("9.09"));
    assert_eq!(invoice.lines[0].sgst_amount, amt("9.09"));
    assert_eq!(invoice.lines[0].igst_amount, BigDecimal::from(0));
    assert_eq!(invoice.tax_total, amt("18.18"));
    assert_eq!(invoice.round_off, amt("-0.18"));
    assert_eq!(invoice.total_amount, amt("119.00"));

    let invoice = books.post_document(&invoice.id, &accounts).await.unwrap();
    let entry = books
        .get_entry(invoice.journal_entry_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(entry.is_balanced());
    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        amt("119.00")
    );
    // Income normal balance; the 0.18 debit shows as a negative balance.
    assert_eq!(
        books
            .get_account_balance(&accounts.round_off, None)
            .await
            .unwrap(),
        amt("-0.18")
    );
}

#[tokio::test]
async fn test_interstate_supply_charges_igst_only() {
    let (mut books, _) = setup();
    let _ = books.setup_gst_chart(TENANT).await.unwrap();

    let mut input = new_invoice(
        d(2024, 5, 1),
        d(2024, 5, 31),
        "cust-1",
        vec![invoice_line("101.00", TaxCode::gst("gst18", BigDecimal::from(18)))],
    );
    input.place_of_supply = "MH".to_string();

    let invoice = books.create_document(input).await.unwrap();
    assert_eq!(invoice.lines[0].igst_amount, amt("18.18"));
    assert_eq!(invoice.lines[0].cgst_amount, BigDecimal::from(0));
    assert_eq!(invoice.lines[0].sgst_amount, BigDecimal::from(0));
    assert_eq!(invoice.tax_total, amt("18.18"));
}

#[tokio::test]
async fn test_oldest_first_allocation_order() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let first = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 10),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    let second = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 20),
            "cust-1",
            vec![invoice_line("150.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&first.id, &accounts).await.unwrap();
    books.post_document(&second.id, &accounts).await.unwrap();

    let payment = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 1, 25),
                amount: amt("120.00"),
                direction: PaymentDirection::Receive,
                account_id: accounts.bank.clone(),
                contact_id: "cust-1".to_string(),
            },
            AllocationStrategy::OldestFirst,
            &accounts,
        )
        .await
        .unwrap();

    assert_eq!(payment.allocations.len(), 2);
    assert_eq!(payment.allocations[0].document_id, first.id);
    assert_eq!(payment.allocations[0].amount, amt("100.00"));
    assert_eq!(payment.allocations[1].document_id, second.id);
    assert_eq!(payment.allocations[1].amount, amt("20.00"));
    assert_eq!(payment.unallocated, BigDecimal::from(0));

    let first = books.get_document(&first.id).await.unwrap().unwrap();
    let second = books.get_document(&second.id).await.unwrap().unwrap();
    assert_eq!(first.status, DocumentStatus::Paid);
    assert_eq!(second.status, DocumentStatus::Partial);
    assert_eq!(second.balance_due(), amt("130.00"));
}

#[tokio::test]
async fn test_unallocated_remainder_goes_on_account() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 31),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&invoice.id, &accounts).await.unwrap();

    let payment = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 1, 15),
                amount: amt("150.00"),
                direction: PaymentDirection::Receive,
                account_id: accounts.bank.clone(),
                contact_id: "cust-1".to_string(),
            },
            AllocationStrategy::OldestFirst,
            &accounts,
        )
        .await
        .unwrap();
    assert_eq!(payment.unallocated, amt("50.00"));

    assert_eq!(
        books
            .get_account_balance(&accounts.customer_advances, None)
            .await
            .unwrap(),
        amt("50.00")
    );
    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        BigDecimal::from(0)
    );
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("150.00")
    );
}

#[tokio::test]
async fn test_tds_deducted_at_payment_time() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let bill = books
        .create_document(NewDocument {
            tenant_id: TENANT.to_string(),
            kind: DocumentKind::Purchase,
            date: d(2024, 6, 1),
            due_date: d(2024, 6, 30),
            party_id: "vend-1".to_string(),
            seller_state: "KA".to_string(),
            place_of_supply: "KA".to_string(),
            lines: vec![invoice_line("10000.00", TaxCode::exempt("nil"))],
            tds_rate: Some(BigDecimal::from(10)),
        })
        .await
        .unwrap();
    assert_eq!(bill.total_amount, amt("10000.00"));
    assert_eq!(bill.pending_tds(), amt("1000.00"));
    books.post_document(&bill.id, &accounts).await.unwrap();

    // Vendor gets 9000 in cash; 1000 is withheld as TDS.
    let payment = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 6, 15),
                amount: amt("9000.00"),
                direction: PaymentDirection::Pay,
                account_id: accounts.bank.clone(),
                contact_id: "vend-1".to_string(),
            },
            AllocationStrategy::Explicit(vec![(bill.id.clone(), amt("9000.00"))]),
            &accounts,
        )
        .await
        .unwrap();
    assert_eq!(payment.allocations[0].tds_amount, amt("1000.00"));

    let bill = books.get_document(&bill.id).await.unwrap().unwrap();
    assert_eq!(bill.status, DocumentStatus::Paid);
    assert_eq!(bill.tds_deducted, amt("1000.00"));
    assert_eq!(bill.balance_due(), BigDecimal::from(0));

    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_payable, None)
            .await
            .unwrap(),
        BigDecimal::from(0)
    );
    assert_eq!(
        books
            .get_account_balance(&accounts.tds_payable, None)
            .await
            .unwrap(),
        amt("1000.00")
    );
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("-9000.00")
    );

    let trial = books.trial_balance(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(trial.is_balanced);
}

#[tokio::test]
async fn test_reversal_restores_balances() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let entry = books
        .create_entry(
            TENANT,
            d(2024, 2, 1),
            "Cash sale",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("500.00")),
                JournalLine::credit(accounts.sales.clone(), amt("500.00")),
            ],
        )
        .await
        .unwrap();
    books.post_entry(&entry.id).await.unwrap();
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("500.00")
    );

    let reversal = books
        .reverse_entry(&entry.id, "entered against wrong account", None)
        .await
        .unwrap();
    assert_eq!(reversal.status, EntryStatus::Posted);
    assert_eq!(reversal.lines[0].credit, amt("500.00"));
    assert_eq!(reversal.lines[1].debit, amt("500.00"));

    let original = books.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(original.status, EntryStatus::Reversed);
    assert_eq!(original.reversed_by.as_deref(), Some(reversal.id.as_str()));

    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        BigDecimal::from(0)
    );
    assert_eq!(
        books.get_account_balance(&accounts.sales, None).await.unwrap(),
        BigDecimal::from(0)
    );
}

#[tokio::test]
async fn test_posting_is_idempotent() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let entry = books
        .create_entry(
            TENANT,
            d(2024, 2, 1),
            "Cash sale",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("500.00")),
                JournalLine::credit(accounts.sales.clone(), amt("500.00")),
            ],
        )
        .await
        .unwrap();
    books.post_entry(&entry.id).await.unwrap();
    let second = books.post_entry(&entry.id).await.unwrap();
    assert_eq!(second.status, EntryStatus::Posted);

    // Balance applied exactly once.
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("500.00")
    );
}

#[tokio::test]
async fn test_closed_period_blocks_posting() {
    let (mut books, periods) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();
    periods.close_through(TENANT, d(2024, 3, 31));

    let entry = books
        .create_entry(
            TENANT,
            d(2024, 2, 15),
            "Late adjustment",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("100.00")),
                JournalLine::credit(accounts.sales.clone(), amt("100.00")),
            ],
        )
        .await
        .unwrap();

    let err = books.post_entry(&entry.id).await.unwrap_err();
    assert!(matches!(err, BooksError::PeriodClosed(_)));

    let entry = books.get_entry(&entry.id).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Draft);
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        BigDecimal::from(0)
    );

    // Posting works once the period reopens.
    periods.reopen_all(TENANT);
    books.post_entry(&entry.id).await.unwrap();
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        amt("100.00")
    );
}

#[tokio::test]
async fn test_void_payment_restores_documents() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 31),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&invoice.id, &accounts).await.unwrap();

    let payment = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 1, 15),
                amount: amt("100.00"),
                direction: PaymentDirection::Receive,
                account_id: accounts.bank.clone(),
                contact_id: "cust-1".to_string(),
            },
            AllocationStrategy::Explicit(vec![(invoice.id.clone(), amt("100.00"))]),
            &accounts,
        )
        .await
        .unwrap();

    let reversing = books
        .void_payment(&payment.id, "bounced cheque")
        .await
        .unwrap();
    assert_eq!(reversing.reverses.as_deref(), Some(payment.id.as_str()));

    let invoice = books.get_document(&invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, DocumentStatus::Posted);
    assert_eq!(invoice.balance_due(), amt("100.00"));
    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        amt("100.00")
    );
    assert_eq!(
        books.get_account_balance(&accounts.bank, None).await.unwrap(),
        BigDecimal::from(0)
    );
}

#[tokio::test]
async fn test_cross_party_allocation_rejected() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 31),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&invoice.id, &accounts).await.unwrap();

    let err = books
        .record_payment(
            NewPayment {
                tenant_id: TENANT.to_string(),
                date: d(2024, 1, 15),
                amount: amt("100.00"),
                direction: PaymentDirection::Receive,
                account_id: accounts.bank.clone(),
                contact_id: "cust-2".to_string(),
            },
            AllocationStrategy::Explicit(vec![(invoice.id.clone(), amt("100.00"))]),
            &accounts,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BooksError::CrossPartyAllocation { .. }));
}

#[tokio::test]
async fn test_void_posted_document_reverses_its_entry() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 31),
            "cust-1",
            vec![invoice_line("1000.00", TaxCode::gst("gst18", BigDecimal::from(18)))],
        ))
        .await
        .unwrap();
    books.post_document(&invoice.id, &accounts).await.unwrap();

    let invoice = books.void_document(&invoice.id, "duplicate entry").await.unwrap();
    assert_eq!(invoice.status, DocumentStatus::Void);

    assert_eq!(
        books
            .get_account_balance(&accounts.accounts_receivable, None)
            .await
            .unwrap(),
        BigDecimal::from(0)
    );
    assert_eq!(
        books.get_account_balance(&accounts.sales, None).await.unwrap(),
        BigDecimal::from(0)
    );
}

#[tokio::test]
async fn test_aging_report_buckets_by_due_date() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let overdue = books
        .create_document(new_invoice(
            d(2024, 1, 1),
            d(2024, 1, 10),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    let recent = books
        .create_document(new_invoice(
            d(2024, 3, 1),
            d(2024, 3, 10),
            "cust-2",
            vec![invoice_line("200.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    let not_due = books
        .create_document(new_invoice(
            d(2024, 3, 1),
            d(2024, 4, 1),
            "cust-2",
            vec![invoice_line("300.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&overdue.id, &accounts).await.unwrap();
    books.post_document(&recent.id, &accounts).await.unwrap();
    books.post_document(&not_due.id, &accounts).await.unwrap();

    // As of 2024-03-15: 65 days past due, 5 days past due, not yet due.
    let report = books
        .aging_report(TENANT, d(2024, 3, 15), DocumentKind::Sale)
        .await
        .unwrap();

    assert_eq!(report.totals.days_61_to_90, amt("100.00"));
    assert_eq!(report.totals.days_1_to_30, amt("200.00"));
    assert_eq!(report.totals.current, amt("300.00"));
    assert_eq!(report.totals.total(), amt("600.00"));

    let cust2 = report
        .parties
        .iter()
        .find(|p| p.party_id == "cust-2")
        .unwrap();
    assert_eq!(cust2.buckets.total(), amt("500.00"));
}

#[tokio::test]
async fn test_verify_ledger_detects_cached_balance_drift() {
    let storage = MemoryStorage::new();
    let periods = MemoryPeriodManager::new();
    let mut books = Books::new(
        storage.clone(),
        Arc::new(periods),
        Arc::new(MemoryNumbering::new()),
    );
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let entry = books
        .create_entry(
            TENANT,
            d(2024, 2, 1),
            "Cash sale",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("500.00")),
                JournalLine::credit(accounts.sales.clone(), amt("500.00")),
            ],
        )
        .await
        .unwrap();
    books.post_entry(&entry.id).await.unwrap();

    let integrity = books.verify_ledger(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(integrity.is_valid);

    // Corrupt the cached balance behind the engine's back.
    {
        use finbooks_core::BooksStorage;
        let mut handle = storage.clone();
        let mut bank = handle.get_account(&accounts.bank).await.unwrap().unwrap();
        bank.balance += BigDecimal::from(1);
        handle.update_account(&bank).await.unwrap();
    }

    let integrity = books.verify_ledger(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(!integrity.is_valid);
    assert_eq!(integrity.mismatches.len(), 1);
    assert_eq!(integrity.mismatches[0].account_id, accounts.bank);
    assert_eq!(integrity.mismatches[0].recomputed, amt("500.00"));
}

#[tokio::test]
async fn test_sub_paisa_amounts_never_reach_the_ledger() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let err = books
        .create_entry(
            TENANT,
            d(2024, 2, 1),
            "Precision drift",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("100.004")),
                JournalLine::credit(accounts.sales.clone(), amt("100.00")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BooksError::Validation { .. }));

    assert!(books.list_entries(TENANT, None, None).await.unwrap().is_empty());
    let tb = books.trial_balance(TENANT, d(2024, 12, 31)).await.unwrap();
    assert!(tb.is_balanced);
}

#[tokio::test]
async fn test_payment_and_document_posting_take_the_tenant_lock() {
    let storage = MemoryStorage::new();
    let periods = MemoryPeriodManager::new();
    let numbering = Arc::new(MemoryNumbering::new());
    let locks = TenantLocks::new();
    let mut books = Books::with_locks(
        storage.clone(),
        Arc::new(periods.clone()),
        numbering.clone(),
        locks.clone(),
    );
    let mut other = Books::with_locks(
        storage.clone(),
        Arc::new(periods),
        numbering,
        locks.clone(),
    );

    let accounts = books.setup_gst_chart(TENANT).await.unwrap();
    let invoice = books
        .create_document(new_invoice(
            d(2024, 1, 5),
            d(2024, 2, 4),
            "cust-1",
            vec![invoice_line("400.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();
    books.post_document(&invoice.id, &accounts).await.unwrap();
    let draft = books
        .create_document(new_invoice(
            d(2024, 1, 6),
            d(2024, 2, 5),
            "cust-1",
            vec![invoice_line("200.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();

    let payment = NewPayment {
        tenant_id: TENANT.to_string(),
        date: d(2024, 1, 20),
        amount: amt("400.00"),
        direction: PaymentDirection::Receive,
        account_id: accounts.bank.clone(),
        contact_id: "cust-1".to_string(),
    };

    // While one handle holds the tenant's posting lock, the other must
    // back off before it reads any document status or balance.
    let guard = locks.acquire(TENANT).unwrap();
    let err = other
        .record_payment(payment.clone(), AllocationStrategy::OldestFirst, &accounts)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    let err = other.post_document(&draft.id, &accounts).await.unwrap_err();
    assert!(err.is_retryable());
    drop(guard);

    let paid = other
        .record_payment(payment, AllocationStrategy::OldestFirst, &accounts)
        .await
        .unwrap();
    assert_eq!(paid.allocated_total(), amt("400.00"));
    let invoice = other.get_document(&invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, DocumentStatus::Paid);
}

#[tokio::test]
async fn test_failed_document_post_leaves_no_journal_residue() {
    let (mut books, periods) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let invoice = books
        .create_document(new_invoice(
            d(2024, 2, 15),
            d(2024, 3, 15),
            "cust-1",
            vec![invoice_line("100.00", TaxCode::exempt("nil"))],
        ))
        .await
        .unwrap();

    periods.close_through(TENANT, d(2024, 3, 31));
    let err = books.post_document(&invoice.id, &accounts).await.unwrap_err();
    assert!(matches!(err, BooksError::PeriodClosed(_)));

    // Nothing persisted, and no entry number burned by the failure.
    assert!(books.list_entries(TENANT, None, None).await.unwrap().is_empty());
    let invoice = books.get_document(&invoice.id).await.unwrap().unwrap();
    assert_eq!(invoice.status, DocumentStatus::Draft);

    periods.reopen_all(TENANT);
    books.post_document(&invoice.id, &accounts).await.unwrap();
    let entries = books.list_entries(TENANT, None, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry_number, "JRN/2023-24/0001");
}

#[tokio::test]
async fn test_blank_narration_rejected_at_draft() {
    let (mut books, _) = setup();
    let accounts = books.setup_gst_chart(TENANT).await.unwrap();

    let err = books
        .create_entry(
            TENANT,
            d(2024, 2, 1),
            "   ",
            vec![
                JournalLine::debit(accounts.bank.clone(), amt("50.00")),
                JournalLine::credit(accounts.sales.clone(), amt("50.00")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BooksError::Validation { .. }));
}
