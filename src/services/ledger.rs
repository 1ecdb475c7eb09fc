//! ledger.rs
//!
//! Session ledger: decides which of a member's packages pays for a booking
//! and keeps the per-package credit counters in step with the bookings.
//!
//! Counters are never adjusted in place. Any booking state change triggers
//! a full recompute that recounts the signup bookings funded by the package,
//! so cancel, reuse and promotion paths cannot drift apart.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{BookingError, BookingResult};
use crate::models::{CreditCounters, MemberPackage, PackageType, SessionType};
use crate::services::clock::Clock;
use crate::store::BookingStore;

/// One credit taken from one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub member_package_id: i64,
    pub package_id: i64,
    /// Bucket the credit is drawn from; differs from the schedule type when a
    /// semi-private booking falls back to group or private credit.
    pub category: SessionType,
}

/// Gets told whenever a member's counters were rewritten.
#[async_trait]
pub trait LedgerWatcher: Send + Sync {
    async fn ledger_changed(&self, member_id: i64);
}

/// +50 inside the last week, +30 sliding down to +15 across the rest of the
/// month, nothing beyond that or before the clock starts.
pub fn expiry_boost(days_until_expiry: Option<i64>) -> i32 {
    match days_until_expiry {
        Some(days) if days <= 7 => 50,
        Some(days) if days <= 30 => 15 + ((30 - days) * 15 / 22) as i32,
        _ => 0,
    }
}

pub fn priority_score(package: &MemberPackage, today: NaiveDate) -> i32 {
    let days = package.end_date.map(|end| (end - today).num_days());
    package.package_type.base_priority() + expiry_boost(days)
}

fn usable_credits(package: &MemberPackage, category: SessionType) -> i32 {
    category
        .credit_sources()
        .iter()
        .map(|source| package.remaining(*source).max(0))
        .sum()
}

/// Active packages that can fund `category`, best candidate first.
pub fn rank_packages(packages: Vec<MemberPackage>, category: SessionType, today: NaiveDate) -> Vec<MemberPackage> {
    let mut eligible: Vec<MemberPackage> = packages
        .into_iter()
        .filter(|p| p.is_active(today) && usable_credits(p, category) > 0)
        .collect();

    // unset end_date sorts after every real date
    eligible.sort_by_key(|p| {
        (
            Reverse(priority_score(p, today)),
            p.end_date.unwrap_or(NaiveDate::MAX),
            p.id,
        )
    });
    eligible
}

/// Greedy draw over ranked packages: exhaust the top package, then move on.
pub fn plan_allocation(ranked: &[MemberPackage], category: SessionType, required: i32) -> BookingResult<Vec<Allocation>> {
    let mut allocations = Vec::with_capacity(required.max(0) as usize);
    let mut needed = required;

    'packages: for package in ranked {
        for source in category.credit_sources() {
            if needed == 0 {
                break 'packages;
            }
            let take = package.remaining(*source).max(0).min(needed);
            for _ in 0..take {
                allocations.push(Allocation {
                    member_package_id: package.id,
                    package_id: package.package_id,
                    category: *source,
                });
            }
            needed -= take;
        }
    }

    if needed > 0 {
        return Err(BookingError::InsufficientCredits {
            category,
            required,
            available: required - needed,
        });
    }
    Ok(allocations)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategoryBalance {
    pub total: i32,
    pub used: i32,
    pub remaining: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageBalance {
    pub member_package_id: i64,
    pub package_id: i64,
    pub package_type: PackageType,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    pub priority: i32,
    pub group: CategoryBalance,
    pub semi_private: CategoryBalance,
    pub private: CategoryBalance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailableCredits {
    pub group: i32,
    pub semi_private: i32,
    pub private: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub member_id: i64,
    pub as_of: NaiveDate,
    pub available: AvailableCredits,
    pub packages: Vec<PackageBalance>,
}

impl LedgerSummary {
    fn build(member_id: i64, today: NaiveDate, mut packages: Vec<MemberPackage>) -> Self {
        packages.sort_by_key(|p| (Reverse(p.is_active(today)), Reverse(priority_score(p, today)), p.id));

        let mut available = AvailableCredits::default();
        let balances = packages
            .iter()
            .map(|p| {
                let active = p.is_active(today);
                if active {
                    available.group += p.remaining_group;
                    available.semi_private += usable_credits(p, SessionType::SemiPrivate);
                    available.private += p.remaining_private;
                }
                let balance = |c: SessionType| CategoryBalance {
                    total: p.total(c),
                    used: p.used(c),
                    remaining: p.remaining(c),
                };
                PackageBalance {
                    member_package_id: p.id,
                    package_id: p.package_id,
                    package_type: p.package_type,
                    start_date: p.start_date,
                    end_date: p.end_date,
                    active,
                    priority: priority_score(p, today),
                    group: balance(SessionType::Group),
                    semi_private: balance(SessionType::SemiPrivate),
                    private: balance(SessionType::Private),
                }
            })
            .collect();

        Self {
            member_id,
            as_of: today,
            available,
            packages: balances,
        }
    }
}

pub struct SessionLedger {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    watchers: Vec<Arc<dyn LedgerWatcher>>,
    recompute_attempts: u32,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, recompute_attempts: u32) -> Self {
        Self {
            store,
            clock,
            watchers: Vec::new(),
            recompute_attempts: recompute_attempts.max(1),
        }
    }

    pub fn add_watcher(&mut self, watcher: Arc<dyn LedgerWatcher>) {
        self.watchers.push(watcher);
    }

    /// Picks `required` credits of `category` across the member's packages.
    pub async fn allocate(&self, member_id: i64, required: i32, category: SessionType) -> BookingResult<Vec<Allocation>> {
        if required <= 0 {
            return Err(BookingError::Validation("required credit count must be positive".to_string()));
        }
        let packages = self.current_packages(member_id).await?;
        let ranked = rank_packages(packages, category, self.clock.today());
        plan_allocation(&ranked, category, required)
    }

    /// One credit of `category` from this specific package, if it still has one.
    pub async fn allocate_from(&self, member_package_id: i64, category: SessionType) -> BookingResult<Option<Allocation>> {
        let today = self.clock.today();
        let package = match self.store.member_package(member_package_id).await? {
            Some(p) => self.recounted(p).await?,
            None => None,
        };

        Ok(package.filter(|p| p.is_active(today)).and_then(|p| {
            category
                .credit_sources()
                .iter()
                .find(|c| p.remaining(**c) > 0)
                .map(|c| Allocation {
                    member_package_id: p.id,
                    package_id: p.package_id,
                    category: *c,
                })
        }))
    }

    /// Rewrites every counter of the package from its signup bookings.
    /// Retried on failure; the recount is idempotent.
    pub async fn recompute(&self, member_package_id: i64) -> BookingResult<CreditCounters> {
        let mut attempt = 1;
        loop {
            match self.recompute_once(member_package_id).await {
                Ok(counters) => return Ok(counters),
                Err(BookingError::Store(e)) if attempt < self.recompute_attempts => {
                    warn!(
                        "Ledger recompute for member package {} failed (attempt {}/{}): {}",
                        member_package_id, attempt, self.recompute_attempts, e
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                    attempt += 1;
                }
                Err(BookingError::Store(e)) => {
                    error!(
                        "Ledger recompute for member package {} gave up after {} attempts: {}",
                        member_package_id, attempt, e
                    );
                    return Err(BookingError::LedgerSync {
                        member_package_id,
                        reason: e.to_string(),
                    });
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn recompute_once(&self, member_package_id: i64) -> BookingResult<CreditCounters> {
        let package = self
            .store
            .member_package(member_package_id)
            .await?
            .ok_or_else(|| BookingError::not_found("member package", member_package_id))?;

        let Some(counters) = self.recount(&package).await? else {
            error!("Member package {} is overdrawn, counters left untouched", member_package_id);
            return Err(BookingError::LedgerSync {
                member_package_id,
                reason: "funded signups exceed the package total".to_string(),
            });
        };
        self.store.write_counters(member_package_id, &counters).await?;

        self.notify_watchers(package.member_id).await;
        Ok(counters)
    }

    /// Counters the package should carry given its signup bookings; `None`
    /// when it is overdrawn.
    async fn recount(&self, package: &MemberPackage) -> BookingResult<Option<CreditCounters>> {
        let (mut group, mut semi_private, mut private) = (0, 0, 0);
        for category in self.store.funded_signup_categories(package.id).await? {
            match category {
                SessionType::Group => group += 1,
                SessionType::SemiPrivate => semi_private += 1,
                SessionType::Private => private += 1,
            }
        }
        Ok(CreditCounters::from_usage(package, group, semi_private, private))
    }

    /// The package with counters recounted from its bookings. Stored counters
    /// that lag behind (a recompute gave up earlier) are rewritten on the way.
    /// Overdrawn packages come back as `None` and cannot fund anything.
    async fn recounted(&self, mut package: MemberPackage) -> BookingResult<Option<MemberPackage>> {
        let Some(counters) = self.recount(&package).await? else {
            error!("Member package {} is overdrawn, skipped for allocation", package.id);
            return Ok(None);
        };
        if !counters.matches(&package) {
            warn!("Member package {} had stale counters, rewriting", package.id);
            match self.store.write_counters(package.id, &counters).await {
                Ok(()) => self.notify_watchers(package.member_id).await,
                Err(e) => warn!("Stale counters of member package {} not rewritten: {}", package.id, e),
            }
            package.apply_counters(&counters);
        }
        Ok(Some(package))
    }

    async fn current_packages(&self, member_id: i64) -> BookingResult<Vec<MemberPackage>> {
        let mut current = Vec::new();
        for package in self.store.member_packages(member_id).await? {
            if let Some(package) = self.recounted(package).await? {
                current.push(package);
            }
        }
        Ok(current)
    }

    async fn notify_watchers(&self, member_id: i64) {
        for watcher in &self.watchers {
            watcher.ledger_changed(member_id).await;
        }
    }

    /// Starts the package clock on first admitted use. No-op afterwards.
    pub async fn start_clock(&self, member_package_id: i64) -> BookingResult<bool> {
        let package = self
            .store
            .member_package(member_package_id)
            .await?
            .ok_or_else(|| BookingError::not_found("member package", member_package_id))?;
        if package.start_date.is_some() {
            return Ok(false);
        }

        let (start, end) = package.period_from(self.clock.today());
        let stamped = self.store.stamp_package_period(member_package_id, start, end).await?;
        if stamped {
            info!("Member package {} started: {} .. {}", member_package_id, start, end);
            self.notify_watchers(package.member_id).await;
        }
        Ok(stamped)
    }

    pub async fn summary(&self, member_id: i64) -> BookingResult<LedgerSummary> {
        let packages = self.store.member_packages(member_id).await?;
        Ok(LedgerSummary::build(member_id, self.clock.today(), packages))
    }

    /// Recomputes every package of the member and starts the clock of any
    /// package that funds a signup but never got its period, then reports.
    pub async fn reconcile_member(&self, member_id: i64) -> BookingResult<LedgerSummary> {
        let packages = self.store.member_packages(member_id).await?;
        info!("Reconciling {} package(s) of member {}", packages.len(), member_id);
        for package in &packages {
            let counters = self.recompute(package.id).await?;
            if counters.has_usage() && package.start_date.is_none() {
                self.start_clock(package.id).await?;
            }
        }
        self.summary(member_id).await
    }
}
