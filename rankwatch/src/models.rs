use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::schema::{eventrank, timetable};

/// A single listener's reconciled standing within one broadcast snapshot, as
/// persisted in `eventrank`. `t_lsnid` is the cross-snapshot identity the
/// reconciler assigns; `lsnid` only identifies the listener within this
/// snapshot's own ranking order.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = eventrank)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ListenerRow {
    pub eventid: String,
    pub userid: i64,
    pub ts: NaiveDateTime,
    pub listner: String,
    pub lastname: String,
    pub lsnid: i32,
    pub t_lsnid: i32,
    pub norder: i32,
    pub nrank: i32,
    pub point: i64,
    pub increment: i64,
    pub status: i32,
}

/// A broadcast waiting to be (re-)scraped, as read from `timetable`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = timetable)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Broadcast {
    pub eventid: String,
    pub userid: i64,
    pub sampletm1: NaiveDateTime,
    pub sampletm2: Option<NaiveDateTime>,
    pub totalpoint: i64,
    pub status: i32,
}

/// A row freshly scraped off the ranking page, before reconciliation has
/// assigned it a `t_lsnid`. `order` is the 1-based traversal index the
/// scraper saw it at; `rank` is the displayed (possibly tied) competitive
/// rank.
#[derive(Debug, Clone)]
pub struct ScrapedListener {
    pub listner: String,
    pub order: i32,
    pub rank: i32,
    pub point: i64,
}

/// Transient reconciliation marker carried on [`WorkingListener`] only for
/// the duration of one reconciliation pass. Distinct from `ListenerRow`'s
/// persisted `status` column, which instead tracks whether the row's
/// containing broadcast work item is done — this marker is never written
/// to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Unmatched,
    Matched,
    Dropped,
}

/// The reconciler's working copy of a listener: the merge of a prior
/// [`ListenerRow`] and whatever the current scrape matched it to, plus the
/// bookkeeping the four-phase algorithm needs while it walks candidates.
/// Kept separate from `ListenerRow` so the ephemeral `status` marker never
/// leaks into the persisted schema (see the design doc's DTO split note).
#[derive(Debug, Clone)]
pub struct WorkingListener {
    pub listner: String,
    pub lastname: String,
    pub t_lsnid: i32,
    pub order: i32,
    pub rank: i32,
    pub point: i64,
    pub incremental: i64,
    pub status: MatchStatus,
}

impl WorkingListener {
    /// Seeds a working row from the prior snapshot, unmatched and carrying
    /// no incremental yet — Phases 1-4 fill those in as they match it.
    pub fn from_prior(row: &ListenerRow) -> Self {
        WorkingListener {
            listner: row.listner.clone(),
            lastname: String::new(),
            t_lsnid: row.t_lsnid,
            order: row.norder,
            rank: row.nrank,
            point: row.point,
            incremental: -1,
            status: MatchStatus::Unmatched,
        }
    }

    pub fn into_row(self, eventid: &str, userid: i64, ts: NaiveDateTime, lsnid: i32) -> ListenerRow {
        ListenerRow {
            eventid: eventid.to_string(),
            userid,
            ts,
            listner: self.listner,
            lastname: self.lastname,
            lsnid,
            t_lsnid: self.t_lsnid,
            norder: self.order,
            nrank: self.rank,
            point: self.point,
            increment: self.incremental,
            status: 0,
        }
    }
}
