//! Chart-of-accounts registry

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::traits::*;
use crate::types::*;
use crate::utils::validation;

/// Maximum depth of the chart-of-accounts tree.
const MAX_TREE_DEPTH: usize = 5;

/// Registry for chart-of-accounts operations.
pub struct AccountRegistry<S: BooksStorage> {
    pub(crate) storage: S,
}

impl<S: BooksStorage> AccountRegistry<S> {
    /// Create a new account registry.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Create a new account.
    ///
    /// Fails with [`BooksError::DuplicateCode`] when the code already exists
    /// in the tenant, and [`BooksError::InvalidParent`] when the parent is
    /// missing, of a different type, or already five levels deep.
    pub async fn create_account(
        &mut self,
        tenant_id: &str,
        code: &str,
        name: &str,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> BooksResult<Account> {
        self.create(
            Account::new(
                tenant_id.to_string(),
                code.to_string(),
                name.to_string(),
                account_type,
                parent_id,
            ),
        )
        .await
    }

    /// Create a pre-built account, used by chart setup for system accounts.
    pub async fn create(&mut self, account: Account) -> BooksResult<Account> {
        validation::validate_account_code(&account.code)?;
        validation::validate_account_name(&account.name)?;

        if self
            .storage
            .find_account_by_code(&account.tenant_id, &account.code)
            .await?
            .is_some()
        {
            return Err(BooksError::DuplicateCode(account.code.clone()));
        }

        if let Some(ref parent_id) = account.parent_id {
            let parent = self
                .storage
                .get_account(parent_id)
                .await?
                .ok_or_else(|| {
                    BooksError::InvalidParent(format!("parent account '{}' does not exist", parent_id))
                })?;
            if parent.tenant_id != account.tenant_id {
                return Err(BooksError::InvalidParent(
                    "parent account belongs to a different tenant".to_string(),
                ));
            }
            if parent.account_type != account.account_type {
                return Err(BooksError::InvalidParent(format!(
                    "parent account '{}' is {:?}, child must share the same type",
                    parent.code, parent.account_type
                )));
            }
            let parent_depth = self.depth_of(&parent).await?;
            if parent_depth + 1 > MAX_TREE_DEPTH {
                return Err(BooksError::InvalidParent(format!(
                    "account tree cannot exceed {} levels",
                    MAX_TREE_DEPTH
                )));
            }
        }

        self.storage.save_account(&account).await?;
        Ok(account)
    }

    /// Get an account by id.
    pub async fn get_account(&self, account_id: &str) -> BooksResult<Option<Account>> {
        self.storage.get_account(account_id).await
    }

    /// Get an account by id, returning an error if not found.
    pub async fn get_account_required(&self, account_id: &str) -> BooksResult<Account> {
        self.storage
            .get_account(account_id)
            .await?
            .ok_or_else(|| BooksError::AccountNotFound(account_id.to_string()))
    }

    /// List all accounts for a tenant.
    pub async fn list_accounts(&self, tenant_id: &str) -> BooksResult<Vec<Account>> {
        self.storage.list_accounts(tenant_id, None).await
    }

    /// List a tenant's accounts of one type.
    pub async fn list_accounts_by_type(
        &self,
        tenant_id: &str,
        account_type: AccountType,
    ) -> BooksResult<Vec<Account>> {
        self.storage
            .list_accounts(tenant_id, Some(account_type))
            .await
    }

    /// Deactivate an account without deleting it, preserving history.
    ///
    /// A non-zero cached balance is refused unless the caller explicitly
    /// acknowledges it with `acknowledge_non_zero`.
    pub async fn deactivate(
        &mut self,
        account_id: &str,
        acknowledge_non_zero: bool,
    ) -> BooksResult<Account> {
        let mut account = self.get_account_required(account_id).await?;
        if account.is_system {
            return Err(BooksError::StateConflict(format!(
                "system account '{}' cannot be deactivated",
                account.code
            )));
        }
        if account.balance != BigDecimal::from(0) && !acknowledge_non_zero {
            return Err(BooksError::StateConflict(format!(
                "account '{}' has a non-zero balance of {}; pass the acknowledgement flag to deactivate anyway",
                account.code, account.balance
            )));
        }
        account.is_active = false;
        account.updated_at = chrono::Utc::now().naive_utc();
        self.storage.update_account(&account).await?;
        Ok(account)
    }

    /// Delete an account.
    ///
    /// System accounts, accounts with children, and accounts referenced by
    /// any journal line are never deletable.
    pub async fn delete_account(&mut self, account_id: &str) -> BooksResult<()> {
        let account = self.get_account_required(account_id).await?;
        if account.is_system {
            return Err(BooksError::StateConflict(format!(
                "system account '{}' cannot be deleted",
                account.code
            )));
        }
        if self.storage.account_has_children(account_id).await? {
            return Err(BooksError::StateConflict(format!(
                "account '{}' has child accounts",
                account.code
            )));
        }
        if self.storage.account_has_lines(account_id).await? {
            return Err(BooksError::StateConflict(format!(
                "account '{}' is referenced by journal lines",
                account.code
            )));
        }
        self.storage.delete_account(account_id).await
    }

    /// Signed balance from posted lines up to `as_of_date` (all time when
    /// omitted), in the normal-balance convention.
    pub async fn get_balance(
        &self,
        account_id: &str,
        as_of_date: Option<NaiveDate>,
    ) -> BooksResult<BigDecimal> {
        // Existence check keeps the not-found error shape consistent.
        self.get_account_required(account_id).await?;
        self.storage.recompute_balance(account_id, as_of_date).await
    }

    /// Depth of an account within the tree (root = 1).
    async fn depth_of(&self, account: &Account) -> BooksResult<usize> {
        let mut depth = 1;
        let mut current = account.parent_id.clone();
        while let Some(parent_id) = current {
            let parent = self.get_account_required(&parent_id).await?;
            depth += 1;
            if depth > MAX_TREE_DEPTH {
                break;
            }
            current = parent.parent_id;
        }
        Ok(depth)
    }
}

/// Account ids the document engine and payment allocator post against.
///
/// Produced by [`utils::setup_gst_chart`]; callers with their own chart can
/// assemble one by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingAccounts {
    pub bank: String,
    pub accounts_receivable: String,
    pub accounts_payable: String,
    pub sales: String,
    pub purchases: String,
    pub cgst_payable: String,
    pub sgst_payable: String,
    pub igst_payable: String,
    pub gst_input_credit: String,
    pub tds_payable: String,
    pub customer_advances: String,
    pub vendor_advances: String,
    pub round_off: String,
}

/// Utility functions for working with accounts
pub mod utils {
    use super::*;

    async fn system_account<S: BooksStorage>(
        registry: &mut AccountRegistry<S>,
        tenant_id: &str,
        code: &str,
        name: &str,
        account_type: AccountType,
        subtype: &str,
    ) -> BooksResult<Account> {
        registry
            .create(
                Account::new(
                    tenant_id.to_string(),
                    code.to_string(),
                    name.to_string(),
                    account_type,
                    None,
                )
                .with_subtype(subtype)
                .as_system(),
            )
            .await
    }

    /// Create the system accounts a GST-registered business posts against
    /// and return their ids as a [`PostingAccounts`] map.
    pub async fn setup_gst_chart<S: BooksStorage>(
        registry: &mut AccountRegistry<S>,
        tenant_id: &str,
    ) -> BooksResult<PostingAccounts> {
        let bank = system_account(registry, tenant_id, "1000", "Bank", AccountType::Asset, "bank")
            .await?;
        let ar = system_account(
            registry,
            tenant_id,
            "1200",
            "Accounts Receivable",
            AccountType::Asset,
            "accounts_receivable",
        )
        .await?;
        let gst_input = system_account(
            registry,
            tenant_id,
            "1400",
            "GST Input Credit",
            AccountType::Asset,
            "gst_input_credit",
        )
        .await?;
        let vendor_advances = system_account(
            registry,
            tenant_id,
            "1500",
            "Advances to Vendors",
            AccountType::Asset,
            "vendor_advances",
        )
        .await?;

        let ap = system_account(
            registry,
            tenant_id,
            "2000",
            "Accounts Payable",
            AccountType::Liability,
            "accounts_payable",
        )
        .await?;
        let cgst = system_account(
            registry,
            tenant_id,
            "2310",
            "CGST Payable",
            AccountType::Liability,
            "gst_payable",
        )
        .await?;
        let sgst = system_account(
            registry,
            tenant_id,
            "2320",
            "SGST Payable",
            AccountType::Liability,
            "gst_payable",
        )
        .await?;
        let igst = system_account(
            registry,
            tenant_id,
            "2330",
            "IGST Payable",
            AccountType::Liability,
            "gst_payable",
        )
        .await?;
        let tds = system_account(
            registry,
            tenant_id,
            "2400",
            "TDS Payable",
            AccountType::Liability,
            "tds_payable",
        )
        .await?;
        let customer_advances = system_account(
            registry,
            tenant_id,
            "2500",
            "Customer Advances",
            AccountType::Liability,
            "customer_advances",
        )
        .await?;

        let sales = system_account(
            registry,
            tenant_id,
            "4000",
            "Sales",
            AccountType::Income,
            "sales",
        )
        .await?;
        let round_off = system_account(
            registry,
            tenant_id,
            "4900",
            "Round Off",
            AccountType::Income,
            "round_off",
        )
        .await?;

        let purchases = system_account(
            registry,
            tenant_id,
            "5000",
            "Purchases",
            AccountType::Expense,
            "purchases",
        )
        .await?;

        Ok(PostingAccounts {
            bank: bank.id,
            accounts_receivable: ar.id,
            accounts_payable: ap.id,
            sales: sales.id,
            purchases: purchases.id,
            cgst_payable: cgst.id,
            sgst_payable: sgst.id,
            igst_payable: igst.id,
            gst_input_credit: gst_input.id,
            tds_payable: tds.id,
            customer_advances: customer_advances.id,
            vendor_advances: vendor_advances.id,
            round_off: round_off.id,
        })
    }
}
