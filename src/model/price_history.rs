use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::model::timestamp::iso_format;

/// One recorded sale price, keyed by (title_number, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub title_number: String,
    pub date: NaiveDateTime,
    pub price_amount: i64,
    pub price_currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryView {
    pub amount: i64,
    pub currency_code: String,
    pub date_iso: String,
    /// Unix seconds
    pub date: i64,
}

impl PriceHistory {
    pub fn new(title_number: &str, price_amount: i64, price_currency: &str, date: NaiveDateTime) -> Self {
        Self {
            title_number: title_number.to_uppercase(),
            date,
            price_amount,
            price_currency: price_currency.to_uppercase(),
        }
    }

    pub fn view(&self) -> PriceHistoryView {
        PriceHistoryView {
            amount: self.price_amount,
            currency_code: self.price_currency.clone(),
            date_iso: iso_format(&self.date),
            date: self.date.and_utc().timestamp(),
        }
    }
}
