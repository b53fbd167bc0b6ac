use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
  /// Goods or money given to the customer on credit
  Credit,
  /// Money received from the customer
  Payment,
}

/// A single ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
  pub id: String,
  pub customer_id: String,
  #[serde(default)]
  pub customer_name: Option<String>,
  pub amount: f64,
  pub transaction_type: TransactionType,
  #[serde(default)]
  pub note: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Customer with their running balance (positive = owes the business)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub phone_number: String,
  #[serde(default)]
  pub balance: f64,
  #[serde(default)]
  pub address: Option<String>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

/// Server-computed headline numbers for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
  #[serde(default)]
  pub total_customers: u64,
  #[serde(default)]
  pub total_outstanding: f64,
  #[serde(default)]
  pub total_collected: f64,
  #[serde(default)]
  pub pending_reminders: u64,
}

/// Signed-in user's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub phone_number: String,
  #[serde(default)]
  pub business_name: Option<String>,
  #[serde(default)]
  pub business_id: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub address: Option<String>,
  /// Whether profile onboarding has been completed
  #[serde(default)]
  pub onboarded: bool,
}
