//! GST (Goods and Services Tax) computation for Indian tax compliance
//!
//! The functions here are pure: given a taxable amount, a tax code and the
//! supply context (seller state vs place of supply) they produce a
//! deterministic [`TaxBreakdown`]. All monetary rounding is round-half-up to
//! two decimal places, applied per line rather than on aggregates so that
//! rounding error never compounds across lines.

use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};

use crate::types::{BooksError, BooksResult};

/// Round half up to two decimal places (the minor currency unit).
pub fn round2(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(2, RoundingMode::HalfUp)
}

/// Round half up to the nearest whole currency unit.
pub fn round_whole(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(0, RoundingMode::HalfUp)
}

/// Document-level round-off adjustment: the signed difference between the
/// grand total rounded to a whole unit and the exact grand total. Posted to
/// a dedicated Round Off account so the correction stays auditable.
pub fn document_round_off(grand_total: &BigDecimal) -> BigDecimal {
    round_whole(grand_total) - grand_total
}

/// A GST tax code as configured per product or service category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxCode {
    /// Identifier used to tag journal lines
    pub id: String,
    /// Display name (e.g. "GST 18%")
    pub name: String,
    /// Total GST rate percentage (e.g. 18 for 18%)
    pub rate: BigDecimal,
    /// Exempt supplies carry no tax regardless of rate
    pub is_exempt: bool,
    /// Tax payable by the recipient rather than the supplier
    pub is_reverse_charge: bool,
    /// Whether input tax credit may be claimed on purchases
    pub is_itc_eligible: bool,
}

impl TaxCode {
    /// Create a standard GST code at the given total rate.
    pub fn gst(id: &str, rate: BigDecimal) -> Self {
        Self {
            name: format!("GST {}%", rate),
            id: id.to_string(),
            rate,
            is_exempt: false,
            is_reverse_charge: false,
            is_itc_eligible: true,
        }
    }

    /// Create an exempt code.
    pub fn exempt(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Exempt".to_string(),
            rate: BigDecimal::from(0),
            is_exempt: true,
            is_reverse_charge: false,
            is_itc_eligible: false,
        }
    }

    /// Mark the code as reverse charge.
    pub fn with_reverse_charge(mut self) -> Self {
        self.is_reverse_charge = true;
        self
    }

    /// Mark purchases under this code as ineligible for input tax credit.
    pub fn without_itc(mut self) -> Self {
        self.is_itc_eligible = false;
        self
    }

    /// Validate the rate is usable.
    pub fn validate(&self) -> BooksResult<()> {
        if self.rate < BigDecimal::from(0) {
            return Err(BooksError::validation(
                "rate",
                "tax rate must not be negative",
            ));
        }
        Ok(())
    }
}

/// Component-wise result of a GST computation for one line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    /// Base amount the tax was computed on
    pub taxable_amount: BigDecimal,
    /// Central GST component (intrastate only)
    pub cgst_amount: BigDecimal,
    /// State GST component (intrastate only)
    pub sgst_amount: BigDecimal,
    /// Integrated GST component (interstate only)
    pub igst_amount: BigDecimal,
    /// Sum of all components
    pub total_tax: BigDecimal,
    /// Taxable amount plus total tax
    pub total_amount: BigDecimal,
}

impl TaxBreakdown {
    fn untaxed(taxable_amount: BigDecimal) -> Self {
        let zero = BigDecimal::from(0);
        Self {
            total_amount: taxable_amount.clone(),
            taxable_amount,
            cgst_amount: zero.clone(),
            sgst_amount: zero.clone(),
            igst_amount: zero.clone(),
            total_tax: zero,
        }
    }
}

/// Compute the GST split for a taxable amount under a supply context.
///
/// Interstate supply (seller state differs from place of supply) attracts
/// IGST at the full rate. Intrastate supply splits the rate evenly between
/// CGST and SGST, each half rounded independently; when the two rounded
/// halves fall one paisa short of the rounded full-rate tax, the residual
/// is assigned to CGST by convention so the split stays deterministic.
pub fn compute_tax(
    taxable_amount: &BigDecimal,
    tax_code: &TaxCode,
    seller_state: &str,
    place_of_supply: &str,
) -> BooksResult<TaxBreakdown> {
    tax_code.validate()?;

    if tax_code.is_exempt {
        return Ok(TaxBreakdown::untaxed(round2(taxable_amount)));
    }

    let taxable = round2(taxable_amount);
    let hundred = BigDecimal::from(100);
    let full_tax = round2(&(&taxable * &tax_code.rate / &hundred));

    let is_interstate = seller_state != place_of_supply;
    let zero = BigDecimal::from(0);

    let (cgst, sgst, igst) = if is_interstate {
        (zero.clone(), zero.clone(), full_tax.clone())
    } else {
        let half = round2(&(&taxable * &tax_code.rate / BigDecimal::from(200)));
        let mut cgst = half.clone();
        let sgst = half;
        // Residual from independent half-rounding goes to CGST
        let residual = &full_tax - (&cgst + &sgst);
        if residual != zero {
            cgst += residual;
        }
        (cgst, sgst, zero)
    };

    let total_tax = &cgst + &sgst + &igst;
    let total_amount = &taxable + &total_tax;

    Ok(TaxBreakdown {
        taxable_amount: taxable,
        cgst_amount: cgst,
        sgst_amount: sgst,
        igst_amount: igst,
        total_tax,
        total_amount,
    })
}

/// Derive the taxable base from a GST-inclusive total (reverse calculation).
pub fn taxable_from_inclusive(
    inclusive_amount: &BigDecimal,
    tax_code: &TaxCode,
) -> BooksResult<BigDecimal> {
    tax_code.validate()?;
    if tax_code.is_exempt {
        return Ok(round2(inclusive_amount));
    }
    let hundred = BigDecimal::from(100);
    let divisor = &hundred + &tax_code.rate;
    Ok(round2(&(inclusive_amount * &hundred / divisor)))
}
