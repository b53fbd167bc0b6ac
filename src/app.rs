use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use tally::cache::{
  CacheSource, FetchOutcome, KeyValueStore, MemoryStorage, RefreshReport, SqliteStorage,
  SyncSnapshot,
};
use tally::config::Config;
use tally::permissions::BusinessMember;
use tally::remote::types::{Customer, TransactionType};
use tally::remote::{HttpRemoteClient, RemoteResourceClient, ResourceKey};
use tally::screen::Screen;
use tally::team::TeamRoster;
use tally::views::{self, DashboardView, PeriodStats};

use crate::{Command, TeamAction};

/// Headless front end: mounts one screen per command and prints it.
pub struct App {
  config: Config,
  store: Arc<dyn KeyValueStore>,
  remote: Arc<dyn RemoteResourceClient>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let store: Arc<dyn KeyValueStore> = if config.cache.enabled {
      Arc::new(SqliteStorage::open(&config.cache_path()?)?)
    } else {
      Arc::new(MemoryStorage::new())
    };
    let remote: Arc<dyn RemoteResourceClient> = Arc::new(HttpRemoteClient::new(&config)?);

    Ok(Self {
      config,
      store,
      remote,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Dashboard => self.sync_screen(Screen::Dashboard, render_dashboard).await,
      Command::Customers { search } => {
        let query = search.unwrap_or_default();
        self
          .sync_screen(Screen::Customers, |snapshot| {
            render_customers(snapshot, &query)
          })
          .await
      }
      Command::Transactions => self.sync_screen(Screen::Transactions, render_transactions).await,
      Command::Profile => self.sync_screen(Screen::Profile, render_profile).await,
      Command::Team { action } => self.team(action).await,
    }
  }

  /// Show the cached state, wait for the refresh, show the result.
  async fn sync_screen<F>(&self, screen: Screen, render: F) -> Result<()>
  where
    F: Fn(&SyncSnapshot),
  {
    let coordinator = screen.mount(Arc::clone(&self.store), Arc::clone(&self.remote));
    let (cached, handle) = coordinator.refresh().await;

    if cached.entries().any(|e| !e.is_empty()) {
      println!("== cached ==");
      render(&cached);
      println!();
    }

    let report = handle.settled().await?;
    println!("== refreshed ==");
    render(&coordinator.snapshot());
    print_report(&coordinator.snapshot(), &report);
    Ok(())
  }

  async fn team(&self, action: TeamAction) -> Result<()> {
    let coordinator = Screen::Team.mount(Arc::clone(&self.store), Arc::clone(&self.remote));
    let (_, handle) = coordinator.refresh().await;
    let report = handle.settled().await?;
    let snapshot = coordinator.snapshot();

    let profile = snapshot.profile().ok_or_else(|| {
      eyre!(
        "Profile unavailable (no cache and refresh {:?}); cannot manage team",
        report.outcome(ResourceKey::Profile)
      )
    })?;
    let business_id = self
      .config
      .business_id
      .clone()
      .or_else(|| profile.business_id.clone())
      .ok_or_else(|| eyre!("No business configured. Set business_id or finish onboarding."))?;

    let mut roster = TeamRoster::load(Arc::clone(&self.store), business_id).await?;
    let owner = roster
      .bootstrap_owner(&profile.id, &profile.name, &profile.phone_number)
      .await?;

    match action {
      TeamAction::List => {}
      TeamAction::Invite { name, phone, role } => {
        let member = roster.invite(&owner.id, &name, &phone, role).await?;
        println!("Invited {} as {} ({})", member.name, member.role(), member.id);
      }
      TeamAction::Role { member, role } => {
        let member = roster.change_role(&owner.id, &member, role).await?;
        println!("{} is now {}", member.name, member.role());
      }
      TeamAction::Remove { member } => {
        let member = roster.remove(&owner.id, &member).await?;
        println!("Removed {}", member.name);
      }
    }

    println!("== team of {} ==", roster.business_id());
    for member in roster.active_members() {
      print_member(member);
    }
    Ok(())
  }
}

fn money(amount: f64) -> String {
  format!("{:.2}", amount)
}

fn print_stats(label: &str, stats: &PeriodStats) {
  println!(
    "{:<6} credit {:>10}  payment {:>10}  net {:>10}  ({} entries)",
    label,
    money(stats.credits),
    money(stats.payments),
    money(stats.net()),
    stats.count
  );
}

fn print_customer(customer: &Customer) {
  println!(
    "  {:<24} {:<14} {:>10}",
    customer.name,
    customer.phone_number,
    money(customer.balance)
  );
}

fn print_member(member: &BusinessMember) {
  println!(
    "  {:<20} {:<24} {:<14} {}",
    member.id,
    member.name,
    member.phone_number,
    member.role()
  );
}

fn render_dashboard(snapshot: &SyncSnapshot) {
  let view = DashboardView::from_snapshot(snapshot, &Local::now());

  match (view.business_name, view.owner_name) {
    (Some(business), Some(owner)) => println!("{} ({})", business, owner),
    (None, Some(owner)) => println!("{}", owner),
    _ => {}
  }
  if let Some(summary) = view.summary {
    println!(
      "customers {}  outstanding {}  collected {}  reminders {}",
      summary.total_customers,
      money(summary.total_outstanding),
      money(summary.total_collected),
      summary.pending_reminders
    );
  }
  print_stats("today", &view.today);
  print_stats("month", &view.month);

  if !view.owed.is_empty() {
    println!("customers who owe:");
    for customer in view.owed {
      print_customer(customer);
    }
  }
}

fn render_customers(snapshot: &SyncSnapshot, query: &str) {
  let customers = snapshot.customers().unwrap_or_default();
  let matches = views::search_customers(customers, query);
  if matches.is_empty() {
    println!("no matching customers");
  }
  for customer in matches {
    print_customer(customer);
  }
}

fn render_transactions(snapshot: &SyncSnapshot) {
  let Some(transactions) = snapshot.transactions() else {
    println!("no transactions loaded");
    return;
  };
  let customers = snapshot.customers().unwrap_or_default();

  let mut sorted: Vec<_> = transactions.iter().collect();
  sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
  for tx in sorted {
    let name = tx
      .customer_name
      .as_deref()
      .or_else(|| {
        customers
          .iter()
          .find(|c| c.id == tx.customer_id)
          .map(|c| c.name.as_str())
      })
      .unwrap_or(tx.customer_id.as_str());
    let kind = match tx.transaction_type {
      TransactionType::Credit => "credit",
      TransactionType::Payment => "payment",
    };
    println!(
      "  {}  {:<24} {:>8} {:>10}",
      tx.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
      name,
      kind,
      money(tx.amount)
    );
  }
}

fn render_profile(snapshot: &SyncSnapshot) {
  let Some(profile) = snapshot.profile() else {
    println!("no profile loaded");
    return;
  };
  println!("name      {}", profile.name);
  println!("phone     {}", profile.phone_number);
  if let Some(business) = &profile.business_name {
    println!("business  {}", business);
  }
  if let Some(email) = &profile.email {
    println!("email     {}", email);
  }
  if !profile.onboarded {
    println!("onboarding incomplete");
  }
}

fn print_report(snapshot: &SyncSnapshot, report: &RefreshReport) {
  for (key, outcome) in &report.outcomes {
    let note = match outcome {
      FetchOutcome::Applied | FetchOutcome::Superseded => continue,
      FetchOutcome::Failed => match snapshot.entry(*key).map(|e| (e.source, e.is_empty())) {
        Some((_, true)) | None => "refresh failed, nothing cached",
        Some((CacheSource::Cache, false)) => "refresh failed, showing cached data",
        Some((CacheSource::Network, false)) => "refresh failed, showing earlier data",
      },
      FetchOutcome::Abandoned => "refresh abandoned",
    };
    eprintln!("{}: {}", key, note);
  }
  for issue in &report.issues {
    tracing::debug!("{}", issue);
  }
}
