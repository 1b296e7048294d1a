//! Processor sandbox test cards and payment method references.

use crate::error::{PaymentError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestCard {
    pub brand: &'static str,
    pub number: &'static str,
    pub cvc: &'static str,
    pub exp_month: &'static str,
    pub exp_year: &'static str,
    pub description: &'static str,
    pub payment_method: &'static str,
}

pub const TEST_CARDS: &[TestCard] = &[
    TestCard {
        brand: "Visa",
        number: "4242424242424242",
        cvc: "123",
        exp_month: "12",
        exp_year: "2030",
        description: "Successful Visa",
        payment_method: "pm_card_visa",
    },
    TestCard {
        brand: "Visa Debit",
        number: "4000056655665556",
        cvc: "123",
        exp_month: "12",
        exp_year: "2030",
        description: "Successful Visa Debit",
        payment_method: "pm_card_visa_debit",
    },
    TestCard {
        brand: "Mastercard",
        number: "5555555555554444",
        cvc: "123",
        exp_month: "11",
        exp_year: "2030",
        description: "Successful Mastercard",
        payment_method: "pm_card_mastercard",
    },
    TestCard {
        brand: "Mastercard (2-series)",
        number: "2223003122003222",
        cvc: "123",
        exp_month: "11",
        exp_year: "2030",
        description: "Mastercard 2-series",
        payment_method: "pm_card_mastercard",
    },
    TestCard {
        brand: "American Express",
        number: "378282246310005",
        cvc: "1234",
        exp_month: "10",
        exp_year: "2030",
        description: "Successful American Express",
        payment_method: "pm_card_amex",
    },
    TestCard {
        brand: "Discover",
        number: "6011111111111117",
        cvc: "123",
        exp_month: "09",
        exp_year: "2030",
        description: "Successful Discover",
        payment_method: "pm_card_discover",
    },
    TestCard {
        brand: "Diners Club",
        number: "30569309025904",
        cvc: "123",
        exp_month: "08",
        exp_year: "2030",
        description: "Diners Club international",
        payment_method: "pm_card_diners",
    },
    TestCard {
        brand: "JCB",
        number: "3566002020360505",
        cvc: "123",
        exp_month: "07",
        exp_year: "2030",
        description: "JCB test card",
        payment_method: "pm_card_jcb",
    },
    TestCard {
        brand: "UnionPay",
        number: "6200000000000005",
        cvc: "123",
        exp_month: "06",
        exp_year: "2030",
        description: "UnionPay test card",
        payment_method: "pm_card_unionpay",
    },
];

pub fn find_by_number(number: &str) -> Option<&'static TestCard> {
    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    TEST_CARDS.iter().find(|card| card.number == digits)
}

/// What to confirm a payment with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentMethodRef {
    /// A processor payment method reference such as `pm_card_visa`.
    Reference(String),
    /// A sandbox test card number, resolved through [`TEST_CARDS`].
    TestCard(String),
}

impl PaymentMethodRef {
    /// Interprets user input: all-digit strings are card numbers.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let looks_like_card = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_whitespace());
        if looks_like_card {
            PaymentMethodRef::TestCard(trimmed.to_string())
        } else {
            PaymentMethodRef::Reference(trimmed.to_string())
        }
    }

    /// The processor reference to send on confirm.
    pub fn resolve(&self) -> Result<String> {
        match self {
            PaymentMethodRef::Reference(reference) if reference.is_empty() => Err(
                PaymentError::ValidationError("Payment method is required".to_string()),
            ),
            PaymentMethodRef::Reference(reference) => Ok(reference.clone()),
            PaymentMethodRef::TestCard(number) => find_by_number(number)
                .map(|card| card.payment_method.to_string())
                .ok_or_else(|| {
                    PaymentError::ValidationError(format!(
                        "Unsupported test card number: {number}"
                    ))
                }),
        }
    }
}
