use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{Duration, NaiveDate};

use super::SessionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PackageType {
    Membership,
    FirstTrial,
    Promo,
    Bonus,
}

impl PackageType {
    /// Base allocation priority: credits that are cheapest to lose go first.
    pub fn base_priority(self) -> i32 {
        match self {
            PackageType::Bonus => 4,
            PackageType::Promo => 3,
            PackageType::FirstTrial => 2,
            PackageType::Membership => 1,
        }
    }
}

// Каталожная запись пакета
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Package {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub group_sessions: i32,
    pub semi_private_sessions: i32,
    pub private_sessions: i32,
    pub duration_days: i32,
}

/// One member's instance of a package: the credit ledger row.
///
/// Totals are joined from the catalog package; `used_*`/`remaining_*` are
/// only ever written by the ledger recompute.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MemberPackage {
    pub id: i64,
    pub member_id: i64,
    pub package_id: i64,
    pub package_type: PackageType,
    pub duration_days: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub total_group: i32,
    pub total_semi_private: i32,
    pub total_private: i32,
    pub used_group: i32,
    pub remaining_group: i32,
    pub used_semi_private: i32,
    pub remaining_semi_private: i32,
    pub used_private: i32,
    pub remaining_private: i32,
}

impl MemberPackage {
    /// A package whose clock has not started yet cannot have expired.
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.end_date.map_or(true, |end| end >= today)
    }

    pub fn total(&self, category: SessionType) -> i32 {
        match category {
            SessionType::Group => self.total_group,
            SessionType::SemiPrivate => self.total_semi_private,
            SessionType::Private => self.total_private,
        }
    }

    pub fn remaining(&self, category: SessionType) -> i32 {
        match category {
            SessionType::Group => self.remaining_group,
            SessionType::SemiPrivate => self.remaining_semi_private,
            SessionType::Private => self.remaining_private,
        }
    }

    pub fn used(&self, category: SessionType) -> i32 {
        match category {
            SessionType::Group => self.used_group,
            SessionType::SemiPrivate => self.used_semi_private,
            SessionType::Private => self.used_private,
        }
    }

    /// Period that starts ticking on first admitted use.
    pub fn period_from(&self, first_use: NaiveDate) -> (NaiveDate, NaiveDate) {
        (first_use, first_use + Duration::days(i64::from(self.duration_days)))
    }

    pub fn apply_counters(&mut self, counters: &CreditCounters) {
        self.used_group = counters.used_group;
        self.remaining_group = counters.remaining_group;
        self.used_semi_private = counters.used_semi_private;
        self.remaining_semi_private = counters.remaining_semi_private;
        self.used_private = counters.used_private;
        self.remaining_private = counters.remaining_private;
    }
}

/// Full counter set written back by a recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCounters {
    pub used_group: i32,
    pub remaining_group: i32,
    pub used_semi_private: i32,
    pub remaining_semi_private: i32,
    pub used_private: i32,
    pub remaining_private: i32,
}

impl CreditCounters {
    /// Builds counters from the package totals and the number of signup
    /// bookings funded from each bucket. `None` when any bucket is funded
    /// beyond its total.
    pub fn from_usage(package: &MemberPackage, group: i32, semi_private: i32, private: i32) -> Option<Self> {
        if group > package.total_group || semi_private > package.total_semi_private || private > package.total_private {
            return None;
        }
        Some(Self {
            used_group: group,
            remaining_group: package.total_group - group,
            used_semi_private: semi_private,
            remaining_semi_private: package.total_semi_private - semi_private,
            used_private: private,
            remaining_private: package.total_private - private,
        })
    }

    pub fn has_usage(&self) -> bool {
        self.used_group + self.used_semi_private + self.used_private > 0
    }

    pub fn matches(&self, package: &MemberPackage) -> bool {
        self.used_group == package.used_group
            && self.remaining_group == package.remaining_group
            && self.used_semi_private == package.used_semi_private
            && self.remaining_semi_private == package.remaining_semi_private
            && self.used_private == package.used_private
            && self.remaining_private == package.remaining_private
    }
}
