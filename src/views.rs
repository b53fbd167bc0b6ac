//! Derived views over a sync snapshot.
//!
//! Everything here is a pure function of the snapshot and the caller's
//! "now"; nothing is accumulated between calls.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike};

use crate::cache::SyncSnapshot;
use crate::remote::types::{Customer, DashboardSummary, Transaction, TransactionType};

/// How many customers the "who owes" list shows.
pub const OWED_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
  /// Current calendar day in the local time zone
  Today,
  /// Current calendar month
  Month,
}

/// Totals of the transactions falling inside a period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PeriodStats {
  pub credits: f64,
  pub payments: f64,
  pub count: usize,
}

impl PeriodStats {
  /// Credit given minus payments received in the period
  pub fn net(&self) -> f64 {
    self.credits - self.payments
  }
}

fn in_period<Tz: TimeZone>(tx: &Transaction, period: Period, now: &DateTime<Tz>) -> bool {
  let tz = now.timezone();
  let at = tx.created_at.with_timezone(&tz);
  match period {
    Period::Today => {
      let midnight = now.date_naive().and_time(NaiveTime::MIN);
      let start = match tz.from_local_datetime(&midnight).earliest() {
        Some(start) => start,
        // Midnight skipped by a DST jump: the day starts at the first valid instant
        None => now.clone() - Duration::seconds(i64::from(now.time().num_seconds_from_midnight())),
      };
      let end = start.clone() + Duration::hours(24);
      start <= at && at < end
    }
    Period::Month => at.year() == now.year() && at.month() == now.month(),
  }
}

/// Sum credits and payments of the transactions inside `period`.
pub fn period_stats<Tz: TimeZone>(
  transactions: &[Transaction],
  period: Period,
  now: &DateTime<Tz>,
) -> PeriodStats {
  transactions
    .iter()
    .filter(|tx| in_period(tx, period, now))
    .fold(PeriodStats::default(), |mut stats, tx| {
      match tx.transaction_type {
        TransactionType::Credit => stats.credits += tx.amount,
        TransactionType::Payment => stats.payments += tx.amount,
      }
      stats.count += 1;
      stats
    })
}

/// Customers with a positive balance, largest first, at most `OWED_LIMIT`.
///
/// Equal balances keep their input order.
pub fn customers_who_owe(customers: &[Customer]) -> Vec<&Customer> {
  let mut owed: Vec<&Customer> = customers.iter().filter(|c| c.balance > 0.0).collect();
  // sort_by is stable
  owed.sort_by(|a, b| b.balance.total_cmp(&a.balance));
  owed.truncate(OWED_LIMIT);
  owed
}

/// Name (case-insensitive) or phone substring search.
///
/// A blank query shows the customers who owe instead of everyone.
pub fn search_customers<'a>(customers: &'a [Customer], query: &str) -> Vec<&'a Customer> {
  let query = query.trim();
  if query.is_empty() {
    return customers_who_owe(customers);
  }

  let needle = query.to_lowercase();
  customers
    .iter()
    .filter(|c| c.name.to_lowercase().contains(&needle) || c.phone_number.contains(query))
    .collect()
}

/// Everything the dashboard screen shows, derived from one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView<'a> {
  pub owner_name: Option<&'a str>,
  pub business_name: Option<&'a str>,
  pub summary: Option<&'a DashboardSummary>,
  pub today: PeriodStats,
  pub month: PeriodStats,
  pub owed: Vec<&'a Customer>,
}

impl<'a> DashboardView<'a> {
  pub fn from_snapshot<Tz: TimeZone>(snapshot: &'a SyncSnapshot, now: &DateTime<Tz>) -> Self {
    let transactions = snapshot.transactions().unwrap_or_default();
    let customers = snapshot.customers().unwrap_or_default();
    let profile = snapshot.profile();

    Self {
      owner_name: profile.map(|p| p.name.as_str()),
      business_name: profile.and_then(|p| p.business_name.as_deref()),
      summary: snapshot.dashboard(),
      today: period_stats(transactions, Period::Today, now),
      month: period_stats(transactions, Period::Month, now),
      owed: customers_who_owe(customers),
    }
  }
}
