//! The fetch → reconcile → derive → publish cycle and the periodic task
//! that drives it.

use chrono::{DateTime, Local, NaiveDate};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dashboard::{summary_line, DashboardView};
use crate::error::Result;
use crate::model::{DailyBaseline, DerivedStatus, RawCounters, CAPACITY};
use crate::source::DataSource;
use crate::store::BaselineStore;
use crate::tracker::{derive_status, reconcile_baseline};

/// Owns the authoritative baseline and publishes a view per cycle.
pub struct Monitor<S, B> {
    source: S,
    store: B,
    baseline: Option<DailyBaseline>,
    /// Set while the in-memory baseline differs from what the store holds.
    unsaved: bool,
    capacity: u64,
    view: watch::Sender<DashboardView>,
}

impl<S: DataSource, B: BaselineStore> Monitor<S, B> {
    pub fn new(source: S, store: B, view: watch::Sender<DashboardView>) -> Self {
        let baseline = store.load();
        match &baseline {
            Some(b) => tracing::info!(
                "restored baseline in={} out={} for {}",
                b.baseline_in,
                b.baseline_out,
                b.for_date
            ),
            None => tracing::info!("no stored baseline; first reading starts the day"),
        }
        Self {
            source,
            store,
            baseline,
            unsaved: false,
            capacity: CAPACITY,
            view,
        }
    }

    pub fn baseline(&self) -> Option<&DailyBaseline> {
        self.baseline.as_ref()
    }

    pub fn has_unsaved_baseline(&self) -> bool {
        self.unsaved
    }

    pub async fn run_cycle(&mut self) -> Result<DerivedStatus> {
        let now = Local::now();
        self.run_cycle_at(now.date_naive(), now).await
    }

    /// One full cycle against an explicit clock.
    ///
    /// On failure the previous status stays published next to the error.
    pub async fn run_cycle_at(
        &mut self,
        today: NaiveDate,
        now: DateTime<Local>,
    ) -> Result<DerivedStatus> {
        self.view.send_modify(|v| v.loading = true);

        let fetched = self.source.fetch().await;
        let outcome = fetched.map(|raw| {
            let baseline = self.reconcile(&raw, today);
            derive_status(&raw, &baseline, self.capacity)
        });

        match &outcome {
            Ok(status) => {
                let was_full = self.view.borrow().status.map(|s| s.is_full);
                self.view.send_modify(|v| {
                    v.status = Some(*status);
                    v.error = None;
                    v.last_update = Some(now);
                    v.loading = false;
                });
                if was_full != Some(status.is_full) {
                    tracing::info!("lot is now {}", status.label());
                }
                tracing::debug!("{}", summary_line(&self.view.borrow()));
            }
            Err(e) => {
                tracing::warn!("poll cycle failed: {}", e);
                self.view.send_modify(|v| {
                    v.error = Some(format!("failed to fetch data from Antares: {}", e));
                    v.loading = false;
                });
            }
        }
        outcome
    }

    fn reconcile(&mut self, raw: &RawCounters, today: NaiveDate) -> DailyBaseline {
        let next = reconcile_baseline(raw, self.baseline.as_ref(), today);
        if self.baseline != Some(next) {
            match self.baseline {
                Some(_) => tracing::info!(
                    "new day {}: baseline in={} out={}",
                    next.for_date,
                    next.baseline_in,
                    next.baseline_out
                ),
                None => tracing::info!(
                    "baseline captured for {}: in={} out={}",
                    next.for_date,
                    next.baseline_in,
                    next.baseline_out
                ),
            }
            self.baseline = Some(next);
            self.unsaved = true;
        }
        // retried every cycle until the store accepts it
        if self.unsaved {
            match self.store.save(&next) {
                Ok(()) => self.unsaved = false,
                Err(e) => tracing::warn!("could not persist baseline: {}", e),
            }
        }
        next
    }
}

/// Unit of work a [`PeriodicTask`] runs on every tick.
pub trait Job: Send + 'static {
    fn run(&mut self) -> impl Future<Output = ()> + Send;
}

impl<S, B> Job for Monitor<S, B>
where
    S: DataSource + 'static,
    B: BaselineStore + 'static,
{
    fn run(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            // failures are already published and logged
            let _ = self.run_cycle().await;
        }
    }
}

/// Cancellable fixed-period task. The first tick fires immediately; runs
/// never overlap and missed ticks are skipped.
pub struct PeriodicTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<J: Job>(period: Duration, mut job: J) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                tokio::select! {
                    _ = job.run() => {}
                    _ = stop_rx.changed() => break,
                }
            }
            tracing::debug!("periodic task stopped");
        });
        Self { stop, handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops ticking, abandoning any in-flight run, and waits for the task.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("periodic task ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard;
    use crate::error::MonitorError;
    use crate::store::MemoryBaselineStore;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<RawCounters>>>,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Result<RawCounters>>) -> Self {
            Self {
                script: Mutex::new(steps.into()),
            }
        }
    }

    impl DataSource for ScriptedSource {
        fn fetch(&self) -> impl Future<Output = Result<RawCounters>> + Send {
            let next = self.script.lock().pop_front();
            async move {
                next.unwrap_or_else(|| Err(MonitorError::Transport("script exhausted".into())))
            }
        }
    }

    fn raw(vehicles_in: u64, vehicles_out: u64) -> RawCounters {
        RawCounters {
            vehicles_in_total: vehicles_in,
            vehicles_out_total: vehicles_out,
            slots_remaining_reported: CAPACITY,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn at(d: u32, h: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_first_cycle_starts_the_day_and_persists() {
        let store = Arc::new(MemoryBaselineStore::default());
        let (tx, rx) = dashboard::channel();
        let source = ScriptedSource::new(vec![Ok(raw(40, 38)), Ok(raw(44, 39))]);
        let mut monitor = Monitor::new(source, store.clone(), tx);

        let first = monitor.run_cycle_at(day(19), at(19, 7)).await.unwrap();
        assert_eq!(first.slots_occupied, 0);
        assert_eq!(store.load().unwrap().baseline_in, 40);

        let second = monitor.run_cycle_at(day(19), at(19, 8)).await.unwrap();
        assert_eq!(second.vehicles_in_today, 4);
        assert_eq!(second.vehicles_out_today, 1);
        assert_eq!(second.slots_occupied, 3);

        let view = rx.borrow().clone();
        assert_eq!(view.status, Some(second));
        assert_eq!(view.last_update, Some(at(19, 8)));
        assert!(!view.loading);
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn test_restored_baseline_survives_restart() {
        let store = Arc::new(MemoryBaselineStore::with(DailyBaseline {
            baseline_in: 20,
            baseline_out: 18,
            for_date: day(19),
        }));
        let (tx, _rx) = dashboard::channel();
        let mut monitor = Monitor::new(ScriptedSource::new(vec![Ok(raw(25, 19))]), store, tx);

        let s = monitor.run_cycle_at(day(19), at(19, 12)).await.unwrap();
        assert_eq!(s.vehicles_in_today, 5);
        assert_eq!(s.vehicles_out_today, 1);
        assert_eq!(s.slots_occupied, 4);
    }

    #[tokio::test]
    async fn test_rollover_between_cycles() {
        let store = Arc::new(MemoryBaselineStore::default());
        let (tx, _rx) = dashboard::channel();
        let source = ScriptedSource::new(vec![Ok(raw(10, 2)), Ok(raw(50, 47)), Ok(raw(52, 47))]);
        let mut monitor = Monitor::new(source, store.clone(), tx);

        monitor.run_cycle_at(day(18), at(18, 23)).await.unwrap();
        let reset = monitor.run_cycle_at(day(19), at(19, 6)).await.unwrap();
        assert_eq!(reset.slots_occupied, 0);
        assert_eq!(
            store.load(),
            Some(DailyBaseline {
                baseline_in: 50,
                baseline_out: 47,
                for_date: day(19),
            })
        );

        let later = monitor.run_cycle_at(day(19), at(19, 7)).await.unwrap();
        assert_eq!(later.vehicles_in_today, 2);
        assert_eq!(monitor.baseline().unwrap().baseline_in, 50);
    }

    struct FlakyStore {
        failures_left: Mutex<u32>,
        saves: Mutex<u32>,
        inner: MemoryBaselineStore,
    }

    impl BaselineStore for FlakyStore {
        fn load(&self) -> Option<DailyBaseline> {
            self.inner.load()
        }

        fn save(&self, baseline: &DailyBaseline) -> Result<()> {
            *self.saves.lock() += 1;
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                return Err(MonitorError::Store("disk full".into()));
            }
            self.inner.save(baseline)
        }
    }

    #[tokio::test]
    async fn test_failed_save_is_retried_next_cycle() {
        let store = Arc::new(FlakyStore {
            failures_left: Mutex::new(2),
            saves: Mutex::new(0),
            inner: MemoryBaselineStore::default(),
        });
        let (tx, _rx) = dashboard::channel();
        let source = ScriptedSource::new((0..5).map(|i| Ok(raw(30 + i, 28))).collect());
        let mut monitor = Monitor::new(source, store.clone(), tx);

        monitor.run_cycle_at(day(19), at(19, 7)).await.unwrap();
        assert!(monitor.has_unsaved_baseline());
        assert!(store.load().is_none());

        monitor.run_cycle_at(day(19), at(19, 8)).await.unwrap();
        assert!(monitor.has_unsaved_baseline());

        let s = monitor.run_cycle_at(day(19), at(19, 9)).await.unwrap();
        assert!(!monitor.has_unsaved_baseline());
        assert_eq!(s.vehicles_in_today, 2);
        assert_eq!(
            store.load(),
            Some(DailyBaseline {
                baseline_in: 30,
                baseline_out: 28,
                for_date: day(19),
            })
        );

        // saved baseline is not rewritten on quiet cycles
        monitor.run_cycle_at(day(19), at(19, 10)).await.unwrap();
        monitor.run_cycle_at(day(19), at(19, 11)).await.unwrap();
        assert_eq!(*store.saves.lock(), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_status() {
        let store = Arc::new(MemoryBaselineStore::default());
        let (tx, rx) = dashboard::channel();
        let source = ScriptedSource::new(vec![
            Ok(raw(3, 1)),
            Err(MonitorError::DataFormat("expected value at line 1".into())),
            Err(MonitorError::Transport("connection refused".into())),
            Ok(raw(4, 1)),
        ]);
        let mut monitor = Monitor::new(source, store, tx);

        monitor.run_cycle_at(day(19), at(19, 9)).await.unwrap();
        let good = rx.borrow().clone();

        let err = monitor.run_cycle_at(day(19), at(19, 10)).await.unwrap_err();
        assert!(matches!(err, MonitorError::DataFormat(_)));
        let view = rx.borrow().clone();
        assert_eq!(view.status, good.status);
        assert_eq!(view.last_update, Some(at(19, 9)));
        assert!(view.error.as_deref().unwrap().contains("data format error"));
        assert!(!view.loading);

        assert!(monitor.run_cycle_at(day(19), at(19, 11)).await.is_err());
        assert!(rx.borrow().error.as_deref().unwrap().contains("connection refused"));

        let recovered = monitor.run_cycle_at(day(19), at(19, 12)).await.unwrap();
        assert_eq!(recovered.slots_occupied, 3);
        assert!(rx.borrow().error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_ticks_until_shutdown() {
        struct Counter(Arc<std::sync::atomic::AtomicUsize>);
        impl Job for Counter {
            fn run(&mut self) -> impl Future<Output = ()> + Send {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async {}
            }
        }

        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let task = PeriodicTask::spawn(Duration::from_millis(3000), Counter(count.clone()));

        tokio::time::sleep(Duration::from_millis(6010)).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);

        task.shutdown().await;
        tokio::time::sleep(Duration::from_millis(9000)).await;
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycles_do_not_stop_the_task() {
        let store = Arc::new(MemoryBaselineStore::default());
        let (tx, rx) = dashboard::channel();
        let source = ScriptedSource::new(vec![
            Err(MonitorError::Transport("timeout".into())),
            Ok(raw(6, 2)),
        ]);
        let task = PeriodicTask::spawn(Duration::from_millis(3000), Monitor::new(source, store, tx));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.borrow().error.is_some());
        assert!(rx.borrow().status.is_none());

        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(!task.is_finished());
        assert!(rx.borrow().error.is_none());
        assert!(rx.borrow().status.is_some());

        task.shutdown().await;
    }
}
