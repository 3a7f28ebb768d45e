//! Loan financing for an offer
//!
//! Annuity payment for principal `P`, annual rate `r` (percent) and `n` months:
//! `P * q * (1+q)^n / ((1+q)^n - 1)` with `q = r / 12 / 100`, or `P / n`
//! without interest. The monthly payment is rounded to cents before the
//! totals are derived from it, so the three figures printed in the table
//! always agree with each other.

use serde::{Deserialize, Serialize};

use crate::pricing::round_cents;
use crate::settings::PaymentTerms;

/// Principals below one cent are not financeable
const MIN_PRINCIPAL: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinancingBreakdown {
    pub payment: f64,
    pub total_payment: f64,
    pub total_interest: f64,
}

/// Monthly payment and totals. A term of zero months is a single lump payment.
pub fn calculate(principal: f64, annual_rate_pct: f64, term_months: i64) -> FinancingBreakdown {
    if term_months <= 0 {
        return FinancingBreakdown {
            payment: round_cents(principal),
            total_payment: round_cents(principal),
            total_interest: 0.0,
        };
    }

    let n = term_months as f64;
    let monthly_rate = annual_rate_pct / 12.0 / 100.0;
    let raw_payment = if monthly_rate.abs() < f64::EPSILON {
        principal / n
    } else {
        let growth = (1.0 + monthly_rate).powf(n);
        principal * monthly_rate * growth / (growth - 1.0)
    };

    let payment = round_cents(raw_payment);
    let total_payment = round_cents(payment * n);
    FinancingBreakdown {
        payment,
        total_payment,
        total_interest: round_cents(total_payment - principal),
    }
}

/// One financing variant requested for the offer. Absent values fall back
/// to the configured payment terms; an absent principal means the offer's
/// final price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancingOption {
    pub label: String,
    #[serde(default)]
    pub principal: Option<f64>,
    #[serde(default)]
    pub annual_rate_pct: Option<f64>,
    #[serde(default)]
    pub term_months: Option<i64>,
    #[serde(default)]
    pub processing_fee_pct: Option<f64>,
}

impl FinancingOption {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Fill in defaults and compute the breakdown. Returns the reason when the
    /// option cannot be financed.
    pub fn resolve(
        &self,
        terms: &PaymentTerms,
        offer_price: f64,
    ) -> Result<ResolvedFinancing, String> {
        let principal = self.principal.unwrap_or(offer_price);
        let annual_rate_pct = self.annual_rate_pct.unwrap_or(terms.annual_rate_pct);
        let term_months = self.term_months.unwrap_or(terms.term_months);
        let processing_fee_pct = self.processing_fee_pct.unwrap_or(terms.processing_fee_pct);

        if !principal.is_finite() || principal < MIN_PRINCIPAL {
            return Err(format!("principal {:.2} is not financeable", principal));
        }
        if term_months < 1 {
            return Err(format!("term of {} months is not financeable", term_months));
        }
        if !annual_rate_pct.is_finite() || annual_rate_pct < 0.0 {
            return Err(format!("interest rate {} % is invalid", annual_rate_pct));
        }
        if !processing_fee_pct.is_finite() || processing_fee_pct < 0.0 {
            return Err(format!("processing fee {} % is invalid", processing_fee_pct));
        }

        let fee_amount = round_cents(principal * processing_fee_pct / 100.0);
        let financed_amount = round_cents(principal + fee_amount);
        Ok(ResolvedFinancing {
            label: self.label.clone(),
            principal,
            fee_amount,
            financed_amount,
            annual_rate_pct,
            term_months,
            processing_fee_pct,
            breakdown: calculate(financed_amount, annual_rate_pct, term_months),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFinancing {
    pub label: String,
    pub principal: f64,
    pub fee_amount: f64,
    /// Principal plus processing fee
    pub financed_amount: f64,
    pub annual_rate_pct: f64,
    pub term_months: i64,
    pub processing_fee_pct: f64,
    pub breakdown: FinancingBreakdown,
}

impl ResolvedFinancing {
    /// Rows of the financing table, header first. Payment, total payment and
    /// total interest are always present together.
    pub fn table_rows(&self) -> Vec<Vec<String>> {
        let mut rows = vec![
            row("Item", "Amount"),
            row("Loan amount", &format_eur(self.principal)),
        ];
        if self.fee_amount > 0.0 {
            rows.push(row(
                &format!("Processing fee ({})", format_pct(self.processing_fee_pct)),
                &format_eur(self.fee_amount),
            ));
            rows.push(row("Financed amount", &format_eur(self.financed_amount)));
        }
        rows.extend([
            row("Interest rate (p.a.)", &format_pct(self.annual_rate_pct)),
            row("Term", &format!("{} months", self.term_months)),
            row("Monthly payment", &format_eur(self.breakdown.payment)),
            row("Total payment", &format_eur(self.breakdown.total_payment)),
            row("Total interest", &format_eur(self.breakdown.total_interest)),
        ]);
        rows
    }
}

fn row(label: &str, value: &str) -> Vec<String> {
    vec![label.to_string(), value.to_string()]
}

/// `1234.5` -> `1.234,50 €`
pub fn format_eur(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}{},{:02} €", sign, grouped, cents % 100)
}

pub fn format_pct(pct: f64) -> String {
    format!("{:.2} %", pct).replace('.', ",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 0.005
    }

    #[test]
    fn test_annuity_sixty_months() {
        let result = calculate(25_000.0, 4.5, 60);
        assert!(close(result.payment, 466.08), "payment {}", result.payment);
        assert!(close(result.total_payment, 27_964.80));
        assert!(close(result.total_interest, 2_964.80));
    }

    #[test]
    fn test_zero_rate_divides_evenly() {
        let result = calculate(12_000.0, 0.0, 24);
        assert_eq!(result.payment, 500.0);
        assert_eq!(result.total_payment, 12_000.0);
        assert_eq!(result.total_interest, 0.0);
    }

    #[test]
    fn test_zero_term_is_lump_sum() {
        let result = calculate(9_999.99, 4.0, 0);
        assert_eq!(result.payment, 9_999.99);
        assert_eq!(result.total_payment, 9_999.99);
        assert_eq!(result.total_interest, 0.0);
    }

    #[test]
    fn test_resolve_uses_defaults_and_offer_price() {
        let terms = PaymentTerms {
            annual_rate_pct: 4.5,
            term_months: 60,
            processing_fee_pct: 0.0,
        };
        let resolved = FinancingOption::new("Standard").resolve(&terms, 25_000.0).unwrap();
        assert_eq!(resolved.principal, 25_000.0);
        assert_eq!(resolved.financed_amount, 25_000.0);
        assert!(close(resolved.breakdown.payment, 466.08));
    }

    #[test]
    fn test_processing_fee_is_financed() {
        let terms = PaymentTerms::default();
        let option = FinancingOption {
            label: "With fee".to_string(),
            principal: Some(10_000.0),
            annual_rate_pct: Some(0.0),
            term_months: Some(100),
            processing_fee_pct: Some(2.0),
        };
        let resolved = option.resolve(&terms, 0.0).unwrap();
        assert_eq!(resolved.fee_amount, 200.0);
        assert_eq!(resolved.financed_amount, 10_200.0);
        assert_eq!(resolved.breakdown.payment, 102.0);
        assert_eq!(resolved.table_rows().len(), 9);
    }

    #[test]
    fn test_unfinanceable_options_are_rejected() {
        let terms = PaymentTerms::default();
        let zero = FinancingOption {
            principal: Some(0.0),
            ..FinancingOption::new("zero")
        };
        assert!(zero.resolve(&terms, 1000.0).is_err());

        let negative_term = FinancingOption {
            term_months: Some(-12),
            ..FinancingOption::new("negative")
        };
        assert!(negative_term.resolve(&terms, 1000.0).unwrap_err().contains("-12 months"));

        let no_term = FinancingOption {
            term_months: Some(0),
            ..FinancingOption::new("none")
        };
        assert!(no_term.resolve(&terms, 1000.0).is_err());
    }

    #[test]
    fn test_table_rows_keep_the_three_figures_together() {
        let resolved = FinancingOption::new("Plain")
            .resolve(&PaymentTerms::default(), 20_000.0)
            .unwrap();
        let rows = resolved.table_rows();
        let labels = rows.iter().map(|r| r[0].as_str()).collect::<Vec<_>>().join("|");
        assert!(labels.contains("Monthly payment|Total payment|Total interest"));
        assert!(!labels.contains("Processing fee"));
    }

    #[test]
    fn test_format_eur() {
        assert_eq!(format_eur(1234.5), "1.234,50 €");
        assert_eq!(format_eur(27_964.8), "27.964,80 €");
        assert_eq!(format_eur(0.0), "0,00 €");
        assert_eq!(format_eur(1_000_000.0), "1.000.000,00 €");
        assert_eq!(format_eur(-12.5), "-12,50 €");
        assert_eq!(format_pct(4.5), "4,50 %");
    }
}
