//! Typed persistence operations over `eventrank` and `timetable`.
//!
//! `PgStore` is the only implementation, but its operations are exposed
//! through the [`Store`] trait so the dispatcher can be driven against a
//! fake in tests without a live database.

use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::{Error, Result};
use crate::models::{Broadcast, ListenerRow};
use crate::schema::{eventrank, timetable};

pub type DbPool = Pool<AsyncPgConnection>;

/// Sentinel `t_lsnid` returned by [`Store::max_t_lsnid`] when a stream has
/// never had a snapshot before, matching the generation counter's
/// "first broadcast" case (`idx = 1`, see the glossary).
pub const NO_PRIOR_T_LSNID: i32 = 0;

pub trait Store: Send + Sync {
    async fn next_due_broadcast(&self, now: NaiveDateTime) -> Result<Option<Broadcast>>;

    /// Number of distinct prior snapshot timestamps and, if any exist, the
    /// latest one.
    async fn max_ts(&self, event_id: &str, user_id: i64) -> Result<(i64, Option<NaiveDateTime>)>;

    async fn load_snapshot(
        &self,
        event_id: &str,
        user_id: i64,
        ts: NaiveDateTime,
    ) -> Result<Vec<ListenerRow>>;

    async fn max_t_lsnid(&self, event_id: &str, user_id: i64) -> Result<i32>;

    async fn insert_snapshot(&self, rows: &[ListenerRow]) -> Result<()>;

    /// `0 -> 1` transition restricted to rows still at `status = 0`, so a
    /// broadcast already marked done by a prior (crashed-before-committing,
    /// then retried) tick is never overwritten.
    async fn mark_done(
        &self,
        event_id: &str,
        user_id: i64,
        sampletm1: NaiveDateTime,
        sampletm2: NaiveDateTime,
        total_points: i64,
    ) -> Result<()>;
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    pub fn build_pool(database_url: &str) -> Result<DbPool> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        Pool::builder(config)
            .build()
            .map_err(|err| Error::Pool(err.to_string()))
    }

    async fn conn(&self) -> Result<diesel_async::pooled_connection::deadpool::Object<AsyncPgConnection>> {
        self.pool.get().await.map_err(|err| Error::Pool(err.to_string()))
    }
}

impl Store for PgStore {
    async fn next_due_broadcast(&self, now: NaiveDateTime) -> Result<Option<Broadcast>> {
        let mut conn = self.conn().await?;

        timetable::table
            .filter(timetable::status.eq(0))
            .filter(timetable::sampletm1.lt(now))
            .order(timetable::sampletm1.asc())
            .select(Broadcast::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(Error::from)
    }

    async fn max_ts(&self, event_id: &str, user_id: i64) -> Result<(i64, Option<NaiveDateTime>)> {
        let mut conn = self.conn().await?;

        let count: i64 = eventrank::table
            .filter(eventrank::eventid.eq(event_id))
            .filter(eventrank::userid.eq(user_id))
            .select(diesel::dsl::count_distinct(eventrank::ts))
            .first(&mut conn)
            .await?;

        if count == 0 {
            return Ok((0, None));
        }

        let max_ts = eventrank::table
            .filter(eventrank::eventid.eq(event_id))
            .filter(eventrank::userid.eq(user_id))
            .select(diesel::dsl::max(eventrank::ts))
            .first::<Option<NaiveDateTime>>(&mut conn)
            .await?;

        Ok((count, max_ts))
    }

    async fn load_snapshot(
        &self,
        event_id: &str,
        user_id: i64,
        ts: NaiveDateTime,
    ) -> Result<Vec<ListenerRow>> {
        let mut conn = self.conn().await?;

        eventrank::table
            .filter(eventrank::eventid.eq(event_id))
            .filter(eventrank::userid.eq(user_id))
            .filter(eventrank::ts.eq(ts))
            .order(eventrank::norder.asc())
            .select(ListenerRow::as_select())
            .load(&mut conn)
            .await
            .map_err(Error::from)
    }

    async fn max_t_lsnid(&self, event_id: &str, user_id: i64) -> Result<i32> {
        let mut conn = self.conn().await?;

        let max: Option<i32> = eventrank::table
            .filter(eventrank::eventid.eq(event_id))
            .filter(eventrank::userid.eq(user_id))
            .select(diesel::dsl::max(eventrank::t_lsnid))
            .first(&mut conn)
            .await?;

        Ok(max.unwrap_or(NO_PRIOR_T_LSNID))
    }

    async fn insert_snapshot(&self, rows: &[ListenerRow]) -> Result<()> {
        let mut conn = self.conn().await?;

        diesel::insert_into(eventrank::table)
            .values(rows)
            .execute(&mut conn)
            .await?;

        Ok(())
    }

    async fn mark_done(
        &self,
        event_id: &str,
        user_id: i64,
        sampletm1: NaiveDateTime,
        sampletm2: NaiveDateTime,
        total_points: i64,
    ) -> Result<()> {
        let mut conn = self.conn().await?;

        let updated = diesel::update(timetable::table)
            .filter(timetable::eventid.eq(event_id))
            .filter(timetable::userid.eq(user_id))
            .filter(timetable::sampletm1.eq(sampletm1))
            .filter(timetable::status.eq(0))
            .set((
                timetable::sampletm2.eq(sampletm2),
                timetable::totalpoint.eq(total_points),
                timetable::status.eq(1),
            ))
            .execute(&mut conn)
            .await?;

        if updated == 0 {
            tracing::warn!(
                event_id,
                user_id,
                ?sampletm1,
                "mark_done matched no status=0 row; broadcast was already completed by another run"
            );
        }

        Ok(())
    }
}
