//! Periodic trigger for the rate e-mail fan-out.
//!
//! The scheduler keeps no record of past cycles: a tick that fails to
//! publish is logged and the next tick is the retry. Missed ticks are not
//! caught up.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use broker::{Broker, Producer, StartEmailSending};
use chrono::{DateTime, Utc};
use common::queues;
use cron::Schedule;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Every day at 10:00 UTC (seconds, minutes, hours, day of month, month, day of week).
pub const DEFAULT_SCHEDULER_CRON: &str = "0 0 10 * * *";

/// Source of fan-out ticks.
#[async_trait]
pub trait PeriodicTrigger: Send {
    /// Waits for the next tick. Returns false when no more ticks will come.
    async fn next_tick(&mut self) -> bool;
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Fires at the wall-clock times of a cron schedule, in UTC.
///
/// Fire times do not depend on when the process started, so restarts keep
/// the daily send time.
pub struct CronTrigger {
    schedule: Schedule,
    clock: Clock,
    last_fired: Option<DateTime<Utc>>,
}

impl CronTrigger {
    pub fn new(schedule: Schedule) -> Self {
        Self::with_clock(schedule, Utc::now)
    }

    /// Parses a six or seven field cron expression.
    pub fn parse(expression: &str) -> Result<Self, <Schedule as FromStr>::Err> {
        Schedule::from_str(expression).map(Self::new)
    }

    /// Uses `clock` instead of the system time.
    pub fn with_clock(
        schedule: Schedule,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        Self {
            schedule,
            clock: Box::new(clock),
            last_fired: None,
        }
    }

    /// Next fire time strictly after now and after the previous tick.
    pub fn next_fire_time(&self) -> Option<DateTime<Utc>> {
        let now = (self.clock)();
        let from = self.last_fired.map_or(now, |last| last.max(now));
        self.schedule.after(&from).next()
    }
}

#[async_trait]
impl PeriodicTrigger for CronTrigger {
    async fn next_tick(&mut self) -> bool {
        let Some(next) = self.next_fire_time() else {
            tracing::warn!("cron schedule has no future fire times");
            return false;
        };
        let delay = (next - (self.clock)()).to_std().unwrap_or_default();
        tracing::debug!(%next, ?delay, "waiting for next scheduled cycle");
        tokio::time::sleep_until(Instant::now() + delay).await;
        self.last_fired = Some(next);
        true
    }
}

/// Trigger fired by hand through a [`TriggerHandle`].
pub struct ManualTrigger {
    ticks: mpsc::Receiver<()>,
}

/// Fires a [`ManualTrigger`]. Dropping every handle ends the trigger.
#[derive(Clone)]
pub struct TriggerHandle {
    ticks: mpsc::Sender<()>,
}

impl ManualTrigger {
    pub fn channel() -> (Self, TriggerHandle) {
        let (tx, rx) = mpsc::channel(16);
        (Self { ticks: rx }, TriggerHandle { ticks: tx })
    }
}

impl TriggerHandle {
    pub async fn fire(&self) {
        let _ = self.ticks.send(()).await;
    }
}

#[async_trait]
impl PeriodicTrigger for ManualTrigger {
    async fn next_tick(&mut self) -> bool {
        self.ticks.recv().await.is_some()
    }
}

/// Publishes a `start_email_sending` trigger on every tick.
pub struct Scheduler<T, B>
where
    T: PeriodicTrigger,
    B: Broker + ?Sized,
{
    trigger: T,
    producer: Producer<B>,
}

impl<T, B> Scheduler<T, B>
where
    T: PeriodicTrigger,
    B: Broker + ?Sized,
{
    pub fn new(trigger: T, broker: Arc<B>) -> Self {
        Self {
            trigger,
            producer: Producer::new(broker),
        }
    }

    /// Runs until `shutdown` resolves or the trigger ends. Returns the number
    /// of triggers published.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> usize {
        tokio::pin!(shutdown);
        let mut published = 0;
        loop {
            let tick = tokio::select! {
                biased;
                _ = &mut shutdown => break,
                tick = self.trigger.next_tick() => tick,
            };
            if !tick {
                break;
            }

            match self
                .producer
                .send(StartEmailSending::default(), queues::TRIGGER_EMAILS_SENDING)
                .await
            {
                Ok(()) => {
                    published += 1;
                    metrics::counter!("scheduler_triggers_total").increment(1);
                    tracing::info!("email sending triggered");
                }
                Err(e) => {
                    metrics::counter!("scheduler_trigger_failures_total").increment(1);
                    tracing::error!(error = %e, "failed to publish email trigger");
                }
            }
        }
        tracing::info!(published, "scheduler stopped");
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::InMemoryBroker;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_publishes_one_trigger_per_tick() {
        let broker = Arc::new(InMemoryBroker::new());
        let (trigger, handle) = ManualTrigger::channel();
        let scheduler = Scheduler::new(trigger, Arc::clone(&broker));

        handle.fire().await;
        handle.fire().await;
        drop(handle);

        let published = scheduler.run(std::future::pending()).await;
        assert_eq!(published, 2);
        assert_eq!(broker.published(queues::TRIGGER_EMAILS_SENDING).await.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_scheduler() {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_fail_on_publish(true);
        let (trigger, handle) = ManualTrigger::channel();
        let scheduler = Scheduler::new(trigger, Arc::clone(&broker));

        handle.fire().await;
        drop(handle);

        assert_eq!(scheduler.run(std::future::pending()).await, 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let broker = Arc::new(InMemoryBroker::new());
        let (trigger, _handle) = ManualTrigger::channel();
        let scheduler = Scheduler::new(trigger, broker);

        assert_eq!(scheduler.run(async {}).await, 0);
    }

    fn paused_clock(base: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> + Clone + Send + Sync {
        let start = Instant::now();
        move || base + chrono::Duration::from_std(start.elapsed()).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_ticks_on_wall_clock_time() {
        let clock = paused_clock(utc(2026, 10, 18, 9, 59, 30));
        let schedule = Schedule::from_str(DEFAULT_SCHEDULER_CRON).unwrap();
        let mut trigger = CronTrigger::with_clock(schedule, clock.clone());

        assert!(trigger.next_tick().await);
        assert_eq!(clock(), utc(2026, 10, 18, 10, 0, 0));

        assert!(trigger.next_tick().await);
        assert_eq!(clock(), utc(2026, 10, 19, 10, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_fire_time_ignores_process_start() {
        // Started after today's send time: the next send is tomorrow at 10:00,
        // not 24 hours after start.
        let clock = paused_clock(utc(2026, 10, 18, 15, 42, 7));
        let schedule = Schedule::from_str(DEFAULT_SCHEDULER_CRON).unwrap();
        let mut trigger = CronTrigger::with_clock(schedule, clock.clone());

        assert_eq!(trigger.next_fire_time(), Some(utc(2026, 10, 19, 10, 0, 0)));
        assert!(trigger.next_tick().await);
        assert_eq!(clock(), utc(2026, 10, 19, 10, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_does_not_fire_twice_for_one_slot() {
        // A clock that never advances still moves on to the following slot.
        let fixed = utc(2026, 10, 18, 9, 0, 0);
        let schedule = Schedule::from_str("0 0 * * * *").unwrap();
        let mut trigger = CronTrigger::with_clock(schedule, move || fixed);

        assert!(trigger.next_tick().await);
        assert_eq!(trigger.next_fire_time(), Some(utc(2026, 10, 18, 11, 0, 0)));
    }

    #[test]
    fn test_cron_rejects_bad_expression() {
        assert!(CronTrigger::parse("every day at ten").is_err());
        assert!(CronTrigger::parse(DEFAULT_SCHEDULER_CRON).is_ok());
    }
}
