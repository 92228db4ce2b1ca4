//! Drives the work queue: polls `timetable` for due broadcasts, scrapes and
//! reconciles each one, waits for the next minute boundary, and checks the
//! scheduled-termination predicate. Single-threaded by design — see the
//! concurrency notes in the design doc for why no task fan-out is needed
//! here.

use chrono::NaiveDateTime;

use crate::clock;
use crate::models::WorkingListener;
use crate::reconciler;
use crate::scraper::RankingSource;
use crate::store::Store;

pub struct Dispatcher<S: Store, R: RankingSource> {
    store: S,
    scraper: R,
    interval_hour: i64,
}

impl<S: Store, R: RankingSource> Dispatcher<S, R> {
    pub fn new(store: S, scraper: R, interval_hour: i64) -> Self {
        Dispatcher {
            store,
            scraper,
            interval_hour,
        }
    }

    /// Runs until the scheduled-termination predicate fires.
    pub async fn run(&self) {
        loop {
            self.drain_due_broadcasts().await;

            let (hh, mm, _ss) = clock::wait_next_minute().await;
            if should_terminate(hh, mm, self.interval_hour) {
                tracing::info!(hh, mm, self.interval_hour, "scheduled termination reached");
                break;
            }
        }
    }

    async fn drain_due_broadcasts(&self) {
        loop {
            let now = chrono::Local::now().naive_local();

            let broadcast = match self.store.next_due_broadcast(now).await {
                Ok(Some(broadcast)) => broadcast,
                Ok(None) => break,
                Err(err) => {
                    tracing::error!(error = %err, "failed to poll for due broadcasts, will retry next tick");
                    break;
                }
            };

            if let Err(err) = self
                .process_one(&broadcast.eventid, broadcast.userid, broadcast.sampletm1)
                .await
            {
                tracing::error!(
                    event_id = %broadcast.eventid,
                    user_id = broadcast.userid,
                    error = %err,
                    "failed to process broadcast, leaving it status=0 for retry"
                );
                // `next_due_broadcast` would hand back the same row forever
                // since its status never advanced; stop draining this tick
                // and let the next one retry it instead.
                break;
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn process_one(
        &self,
        event_id: &str,
        user_id: i64,
        sampletm1: NaiveDateTime,
    ) -> crate::error::Result<()> {
        let (total_points, scraped) = self.scraper.fetch(event_id, user_id).await?;

        let (_, max_ts) = self.store.max_ts(event_id, user_id).await?;
        let prior_rows = match max_ts {
            Some(ts) => self.store.load_snapshot(event_id, user_id, ts).await?,
            None => Vec::new(),
        };

        let max_t_lsnid = self.store.max_t_lsnid(event_id, user_id).await?;
        // Preserves the historical generation-counter derivation verbatim,
        // including the re-division once `idx` itself crosses 1000 (keeps
        // `order + idx*1000` from outgrowing the id space over a stream's
        // lifetime).
        let mut idx = (max_t_lsnid as i64) / 1000;
        if idx >= 1000 {
            idx /= 1000;
        }
        idx += 1;

        let last: Vec<WorkingListener> = prior_rows.iter().map(WorkingListener::from_prior).collect();
        let reconciled = reconciler::reconcile(last, scraped, idx);

        let ts = clock::truncate_to_minute(chrono::Local::now().naive_local());
        let rows: Vec<_> = reconciled
            .merged
            .into_iter()
            .enumerate()
            .map(|(i, listener)| listener.into_row(event_id, user_id, ts, i as i32 + 1))
            .collect();

        self.store.insert_snapshot(&rows).await?;
        self.store
            .mark_done(event_id, user_id, sampletm1, ts, reconciled.total_incremental)
            .await?;

        tracing::debug!(total_points, listeners = rows.len(), "broadcast reconciled");

        Ok(())
    }
}

/// Matches the historical shared-hosting constraint: exit once the clock
/// rolls into an hour boundary that is a multiple of `interval_hour`, giving
/// a bounded-lifetime daemon. A very large `interval_hour` (the fallback
/// used when no environment file is configured) effectively disables this.
fn should_terminate(hh: u32, mm: u32, interval_hour: i64) -> bool {
    if interval_hour <= 0 {
        return false;
    }
    mm == 0 && (hh as i64 + 1) % interval_hour == 0
}
