use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw payment form fields as typed by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFields {
    pub number: String,
    /// `MM/YY`, `MM / YY` or `MMYY`.
    pub expiry: String,
    pub cvc: String,
}

impl CardFields {
    pub fn new(
        number: impl Into<String>,
        expiry: impl Into<String>,
        cvc: impl Into<String>,
    ) -> Self {
        Self { number: number.into(), expiry: expiry.into(), cvc: cvc.into() }
    }

    pub fn normalized_number(&self) -> String {
        digits_only(&self.number)
    }

    /// Last four digits, safe to log.
    pub fn last4(&self) -> String {
        let digits = self.normalized_number();
        digits.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CardValidationError {
    #[error("Please fill in all card details")]
    MissingFields,
    #[error("Invalid card number length")]
    InvalidNumberLength,
    #[error("Invalid expiry date")]
    InvalidExpiry,
    #[error("Invalid expiry month")]
    InvalidExpiryMonth,
    #[error("Card has expired")]
    Expired,
    #[error("Invalid CVC")]
    InvalidCvc,
}

/// Checks field shape the way a card form does before charging.
pub fn validate_card(card: &CardFields, today: NaiveDate) -> Result<(), CardValidationError> {
    let number = card.normalized_number();
    let expiry = digits_only(&card.expiry);
    let cvc = card.cvc.trim();

    if number.is_empty() || expiry.is_empty() || cvc.is_empty() {
        return Err(CardValidationError::MissingFields);
    }
    if !(13..=16).contains(&number.len()) {
        return Err(CardValidationError::InvalidNumberLength);
    }
    if expiry.len() != 4 {
        return Err(CardValidationError::InvalidExpiry);
    }

    let month: u32 = expiry[..2].parse().map_err(|_| CardValidationError::InvalidExpiry)?;
    let year: i32 = expiry[2..].parse().map_err(|_| CardValidationError::InvalidExpiry)?;
    if !(1..=12).contains(&month) {
        return Err(CardValidationError::InvalidExpiryMonth);
    }

    let current_year = today.year() % 100;
    let current_month = today.month();
    if year < current_year || (year == current_year && month < current_month) {
        return Err(CardValidationError::Expired);
    }

    if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(CardValidationError::InvalidCvc);
    }

    Ok(())
}

fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}
