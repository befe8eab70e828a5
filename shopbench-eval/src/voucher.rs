//! Vouchers and the budget check of voucher tasks

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};

/// Where a voucher applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherScope {
    /// Applies to any basket
    Platform,
    /// Applies only when every item comes from one shop
    Shop,
}

/// Discount mechanism of a voucher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Discount {
    /// Subtract a fixed amount
    Fixed { face_value: f64 },
    /// Take a percentage off, limited by `cap`
    Percentage { discount: f64, cap: f64 },
}

/// Voucher record as produced by the synthesis stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub voucher_type: String,
    pub threshold: f64,
    pub discount_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap: Option<f64>,
    pub budget: f64,
}

/// A validated voucher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VoucherRecord", into = "VoucherRecord")]
pub struct Voucher {
    pub scope: VoucherScope,
    /// Minimum basket total for the discount to apply
    pub threshold: f64,
    pub discount: Discount,
    /// Spending limit the basket must fit into
    pub budget: f64,
}

impl TryFrom<VoucherRecord> for Voucher {
    type Error = EvalError;

    fn try_from(record: VoucherRecord) -> Result<Self> {
        let scope = match record.voucher_type.as_str() {
            "platform" => VoucherScope::Platform,
            "shop" => VoucherScope::Shop,
            other => return Err(EvalError::config(format!("unknown voucher type `{}`", other))),
        };
        let discount = match record.discount_type.as_str() {
            "fixed" => Discount::Fixed {
                face_value: record
                    .face_value
                    .ok_or_else(|| EvalError::config("fixed voucher without `face_value`"))?,
            },
            "percentage" => Discount::Percentage {
                discount: record
                    .discount
                    .ok_or_else(|| EvalError::config("percentage voucher without `discount`"))?,
                cap: record
                    .cap
                    .ok_or_else(|| EvalError::config("percentage voucher without `cap`"))?,
            },
            other => {
                return Err(EvalError::config(format!("unknown discount type `{}`", other)));
            }
        };
        Ok(Self { scope, threshold: record.threshold, discount, budget: record.budget })
    }
}

impl From<Voucher> for VoucherRecord {
    fn from(voucher: Voucher) -> Self {
        let voucher_type = match voucher.scope {
            VoucherScope::Platform => "platform",
            VoucherScope::Shop => "shop",
        };
        let mut record = VoucherRecord {
            voucher_type: voucher_type.to_string(),
            threshold: voucher.threshold,
            budget: voucher.budget,
            ..Default::default()
        };
        match voucher.discount {
            Discount::Fixed { face_value } => {
                record.discount_type = "fixed".to_string();
                record.face_value = Some(face_value);
            }
            Discount::Percentage { discount, cap } => {
                record.discount_type = "percentage".to_string();
                record.discount = Some(discount);
                record.cap = Some(cap);
            }
        }
        record
    }
}

impl Voucher {
    pub fn fixed(scope: VoucherScope, threshold: f64, face_value: f64, budget: f64) -> Self {
        Self { scope, threshold, discount: Discount::Fixed { face_value }, budget }
    }

    pub fn percentage(
        scope: VoucherScope,
        threshold: f64,
        discount: f64,
        cap: f64,
        budget: f64,
    ) -> Self {
        Self { scope, threshold, discount: Discount::Percentage { discount, cap }, budget }
    }

    /// Basket total after the discount
    ///
    /// A percentage discount never takes off more than `cap`.
    pub fn price_after_discount(&self, total: f64) -> f64 {
        match self.discount {
            Discount::Fixed { face_value } => total - face_value,
            Discount::Percentage { discount, cap } => (total * (1.0 - discount)).max(total - cap),
        }
    }

    /// Whether the voucher can be used on a basket spanning `shop_count` shops
    pub fn applies_to(&self, shop_count: usize) -> bool {
        match self.scope {
            VoucherScope::Platform => true,
            VoucherScope::Shop => shop_count == 1,
        }
    }

    /// Whether a basket fits the budget, with the voucher if it applies
    pub fn within_budget(&self, total: f64, shop_count: usize) -> bool {
        if total <= self.budget {
            return true;
        }
        self.applies_to(shop_count)
            && total >= self.threshold
            && self.price_after_discount(total) <= self.budget
    }
}
