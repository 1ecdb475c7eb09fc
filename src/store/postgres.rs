use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{PgPool, Postgres, Transaction};

use super::{BookingStore, StoreResult};
use crate::database::Database;
use crate::models::{Booking, Commitment, CreditCounters, MemberPackage, NewBooking, Schedule, SessionType};

const SCHEDULE_COLUMNS: &str = "id, trainer_id, date_start, time_start, time_end, type AS session_type, pax, \
     min_signup, booking_deadline_hour, cancel_buffer_minutes, auto_cancel_checked_at, auto_cancelled";

const BOOKING_COLUMNS: &str = "id, member_id, schedule_id, package_id, member_package_id, credit_category, status, \
     attendance, cancelled_by, waitlist_joined_at, created_at, updated_at";

const MEMBER_PACKAGE_SELECT: &str = r#"
    SELECT mp.id, mp.member_id, mp.package_id, p.type AS package_type, p.duration_days,
           mp.start_date, mp.end_date,
           p.group_sessions AS total_group,
           p.semi_private_sessions AS total_semi_private,
           p.private_sessions AS total_private,
           mp.used_group, mp.remaining_group,
           mp.used_semi_private, mp.remaining_semi_private,
           mp.used_private, mp.remaining_private
    FROM member_packages mp
    JOIN packages p ON p.id = mp.package_id
"#;

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(db: &Database) -> Self {
        Self { pool: db.pool.clone() }
    }

    async fn insert_in_tx(tx: &mut Transaction<'_, Postgres>, new: &NewBooking) -> Result<Booking, sqlx::Error> {
        sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings
                (member_id, schedule_id, package_id, member_package_id, credit_category, status,
                 waitlist_joined_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(new.member_id)
        .bind(new.schedule_id)
        .bind(new.package_id)
        .bind(new.member_package_id)
        .bind(new.credit_category)
        .bind(new.status)
        .bind(new.waitlist_joined_at)
        .bind(new.created_at)
        .fetch_one(&mut **tx)
        .await
    }

    async fn update_in_tx(tx: &mut Transaction<'_, Postgres>, booking: &Booking) -> Result<u64, sqlx::Error> {
        sqlx::query(
            "UPDATE bookings
             SET package_id = $2, member_package_id = $3, credit_category = $4, status = $5,
                 cancelled_by = $6, waitlist_joined_at = $7, updated_at = $8
             WHERE id = $1",
        )
        .bind(booking.id)
        .bind(booking.package_id)
        .bind(booking.member_package_id)
        .bind(booking.credit_category)
        .bind(booking.status)
        .bind(booking.cancelled_by)
        .bind(booking.waitlist_joined_at)
        .bind(booking.updated_at)
        .execute(&mut **tx)
        .await
        .map(|r| r.rows_affected())
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn schedule(&self, id: i64) -> StoreResult<Option<Schedule>> {
        let schedule = sqlx::query_as::<_, Schedule>(&format!("SELECT {} FROM schedules WHERE id = $1", SCHEDULE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(schedule)
    }

    async fn schedules_starting_between(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Schedule>> {
        let schedules = sqlx::query_as::<_, Schedule>(&format!(
            "SELECT {} FROM schedules
             WHERE (date_start + time_start) >= $1 AND (date_start + time_start) < $2
             ORDER BY date_start, time_start, id",
            SCHEDULE_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(schedules)
    }

    async fn mark_schedule_resolved(&self, id: i64, at: NaiveDateTime, cancelled: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE schedules SET auto_cancel_checked_at = $2, auto_cancelled = $3
             WHERE id = $1 AND auto_cancel_checked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .bind(cancelled)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn flag_schedule_cancelled(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE schedules SET auto_cancelled = TRUE WHERE id = $1 AND auto_cancel_checked_at IS NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn member_commitments(&self, member_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        let rows = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT b.id, s.id AS schedule_id, s.date_start, s.time_start, s.time_end
            FROM bookings b
            JOIN schedules s ON s.id = b.schedule_id
            WHERE b.member_id = $1
              AND s.date_start = $2
              AND b.status IN ('signup', 'waiting_list')
            "#,
        )
        .bind(member_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn trainer_commitments(&self, trainer_id: i64, date: NaiveDate) -> StoreResult<Vec<Commitment>> {
        let rows = sqlx::query_as::<_, Commitment>(
            "SELECT id, id AS schedule_id, date_start, time_start, time_end
             FROM schedules
             WHERE trainer_id = $1 AND date_start = $2",
        )
        .bind(trainer_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn member_packages(&self, member_id: i64) -> StoreResult<Vec<MemberPackage>> {
        let rows = sqlx::query_as::<_, MemberPackage>(&format!("{} WHERE mp.member_id = $1 ORDER BY mp.id", MEMBER_PACKAGE_SELECT))
            .bind(member_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn member_package(&self, id: i64) -> StoreResult<Option<MemberPackage>> {
        let row = sqlx::query_as::<_, MemberPackage>(&format!("{} WHERE mp.id = $1", MEMBER_PACKAGE_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn funded_signup_categories(&self, member_package_id: i64) -> StoreResult<Vec<SessionType>> {
        let categories = sqlx::query_scalar::<_, SessionType>(
            r#"
            SELECT COALESCE(b.credit_category, s.type)
            FROM bookings b
            JOIN schedules s ON s.id = b.schedule_id
            WHERE b.member_package_id = $1 AND b.status = 'signup'
            "#,
        )
        .bind(member_package_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn write_counters(&self, member_package_id: i64, counters: &CreditCounters) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE member_packages
            SET used_group = $2, remaining_group = $3,
                used_semi_private = $4, remaining_semi_private = $5,
                used_private = $6, remaining_private = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(member_package_id)
        .bind(counters.used_group)
        .bind(counters.remaining_group)
        .bind(counters.used_semi_private)
        .bind(counters.remaining_semi_private)
        .bind(counters.used_private)
        .bind(counters.remaining_private)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stamp_package_period(&self, member_package_id: i64, start: NaiveDate, end: NaiveDate) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE member_packages SET start_date = $2, end_date = $3, updated_at = NOW()
             WHERE id = $1 AND start_date IS NULL",
        )
        .bind(member_package_id)
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn booking(&self, id: i64) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(booking)
    }

    async fn latest_booking(&self, member_id: i64, schedule_id: i64) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings
             WHERE member_id = $1 AND schedule_id = $2
             ORDER BY (status <> 'cancelled') DESC, updated_at DESC, id DESC
             LIMIT 1",
            BOOKING_COLUMNS
        ))
        .bind(member_id)
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn schedule_bookings(&self, schedule_id: i64) -> StoreResult<Vec<Booking>> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings WHERE schedule_id = $1 ORDER BY id",
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bookings)
    }

    async fn count_signups(&self, schedule_id: i64) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bookings WHERE schedule_id = $1 AND status = 'signup'",
        )
        .bind(schedule_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn next_waitlisted(&self, schedule_id: i64) -> StoreResult<Option<Booking>> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {} FROM bookings
             WHERE schedule_id = $1 AND status = 'waiting_list'
             ORDER BY COALESCE(waitlist_joined_at, created_at), created_at, id
             LIMIT 1",
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(booking)
    }

    async fn insert_booking(&self, booking: NewBooking) -> StoreResult<Booking> {
        let mut tx = self.pool.begin().await?;
        let inserted = Self::insert_in_tx(&mut tx, &booking).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn save_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        if Self::update_in_tx(&mut tx, booking).await? == 0 {
            tx.rollback().await?;
            return Err(sqlx::Error::RowNotFound.into());
        }
        tx.commit().await?;
        Ok(())
    }

    async fn apply_booking_batch(&self, inserts: Vec<NewBooking>, updates: Vec<Booking>) -> StoreResult<Vec<Booking>> {
        let mut tx = self.pool.begin().await?;
        let mut written = Vec::with_capacity(inserts.len() + updates.len());

        for booking in updates {
            if Self::update_in_tx(&mut tx, &booking).await? == 0 {
                // откатываем всю пачку
                tx.rollback().await?;
                return Err(sqlx::Error::RowNotFound.into());
            }
            written.push(booking);
        }
        for new in &inserts {
            written.push(Self::insert_in_tx(&mut tx, new).await?);
        }

        tx.commit().await?;
        Ok(written)
    }
}
