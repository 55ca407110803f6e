use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::money::Money;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One purchased book, priced at the moment of checkout.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub book_id: Uuid,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_times(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
    Stripe,
    BankTransfer,
    Gcash,
    Maya,
    CashDeposit,
    OverCounter,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Gcash => "gcash",
            PaymentMethod::Maya => "maya",
            PaymentMethod::CashDeposit => "cash_deposit",
            PaymentMethod::OverCounter => "over_counter",
        }
    }

    /// Methods settled by a human reviewing an uploaded proof of payment.
    pub fn is_manual(&self) -> bool {
        matches!(
            self,
            PaymentMethod::BankTransfer | PaymentMethod::CashDeposit | PaymentMethod::OverCounter
        )
    }

    /// Gateway `payment_method_allowed` values for a payment intent.
    pub fn gateway_methods(&self) -> &'static [&'static str] {
        match self {
            PaymentMethod::CreditCard | PaymentMethod::Stripe => &["card"],
            PaymentMethod::Paypal => &["paypal"],
            PaymentMethod::Gcash => &["gcash"],
            PaymentMethod::Maya => &["paymaya"],
            PaymentMethod::BankTransfer => &["billease"],
            PaymentMethod::CashDeposit | PaymentMethod::OverCounter => &["card"],
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(PaymentMethod::CreditCard),
            "paypal" => Ok(PaymentMethod::Paypal),
            "stripe" => Ok(PaymentMethod::Stripe),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "gcash" => Ok(PaymentMethod::Gcash),
            "maya" => Ok(PaymentMethod::Maya),
            "cash_deposit" => Ok(PaymentMethod::CashDeposit),
            "over_counter" => Ok(PaymentMethod::OverCounter),
            other => Err(format!("unknown payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofStatus {
    Submitted,
    Approved,
    Rejected,
}

/// Uploaded evidence for a manual payment, reviewed by an admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProof {
    pub file_path: String,
    pub notes: Option<String>,
    pub status: ProofStatus,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: Uuid,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<Uuid>,
    pub admin_notes: Option<String>,
}

/// Human-facing order number, allocated from a database sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn from_sequence(value: i64) -> Self {
        Self(format!("TXN-{:08}", value))
    }

    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_line_subtotal() {
        let line = OrderLine {
            book_id: Uuid::new_v4(),
            title: "Noli Me Tangere".into(),
            quantity: 3,
            unit_price: Money::from_cents(25_000),
        };
        assert_eq!(line.subtotal(), Some(Money::from_cents(75_000)));
    }

    #[test]
    fn test_status_round_trips_through_text_column() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&OrderStatus::Processing).unwrap(), "\"processing\"");
    }

    #[test]
    fn test_manual_methods() {
        assert!(PaymentMethod::BankTransfer.is_manual());
        assert!(PaymentMethod::CashDeposit.is_manual());
        assert!(PaymentMethod::OverCounter.is_manual());
        assert!(!PaymentMethod::Gcash.is_manual());
        assert!(!PaymentMethod::CreditCard.is_manual());
    }

    #[test]
    fn test_gateway_method_mapping() {
        assert_eq!(PaymentMethod::Stripe.gateway_methods(), &["card"]);
        assert_eq!(PaymentMethod::Maya.gateway_methods(), &["paymaya"]);
        assert_eq!(PaymentMethod::BankTransfer.gateway_methods(), &["billease"]);
    }

    #[test]
    fn test_payment_method_wire_names() {
        let method: PaymentMethod = serde_json::from_str("\"over_counter\"").unwrap();
        assert_eq!(method, PaymentMethod::OverCounter);
        assert_eq!("credit_card".parse::<PaymentMethod>().unwrap(), PaymentMethod::CreditCard);
    }

    #[test]
    fn test_transaction_id_is_zero_padded() {
        assert_eq!(TransactionId::from_sequence(1).as_str(), "TXN-00000001");
        assert_eq!(TransactionId::from_sequence(123_456_789).as_str(), "TXN-123456789");
    }
}
