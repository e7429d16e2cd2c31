//! LedgerWatcher processor.
//!
//! The LedgerWatcher is responsible for:
//! - Reading the current chain height on every tick
//! - Fetching `PaymentMilestoneReached` logs for the unseen range `(cursor, head]`
//! - Decoding them in ledger order, skipping entries that fail to decode
//! - Handing each event to the `Broadcaster` before the next tick starts
//!
//! The cursor only moves forward, and only after a whole range was fetched,
//! so every event is applied exactly once.

use super::abi::{PAYMENT_MILESTONE_TOPIC, decode_milestone_log};
use super::rpc::{LedgerClient, LogFilter, RawLog};
use super::LedgerError;
use crate::config::WatcherConfig;
use crate::events::MilestoneEvent;
use crate::processors::Broadcaster;
use crate::utils::poll_schedule::PollSchedule;
use kanau::processor::Processor;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Result of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    /// Decoded events in ledger order.
    pub events: Vec<MilestoneEvent>,
    /// Cursor to use for the next poll.
    pub cursor: u64,
    /// Logs in range that failed to decode.
    pub skipped: usize,
}

/// Split the inclusive range `from..=to` into chunks of at most
/// `max_range` blocks. `None` or zero means a single chunk.
pub fn block_ranges(from: u64, to: u64, max_range: Option<u64>) -> Vec<(u64, u64)> {
    if from > to {
        return Vec::new();
    }
    let Some(step) = max_range.filter(|s| *s > 0) else {
        return vec![(from, to)];
    };

    let mut ranges = Vec::new();
    let mut start = from;
    loop {
        let end = start.saturating_add(step - 1).min(to);
        ranges.push((start, end));
        if end == to {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Discovers and decodes new milestone events.
pub struct LedgerWatcher<C: LedgerClient> {
    client: C,
    config: WatcherConfig,
}

impl<C: LedgerClient> LedgerWatcher<C> {
    pub fn new(client: C, config: WatcherConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Current chain height.
    pub async fn head(&self) -> Result<u64, LedgerError> {
        self.timed("eth_blockNumber", self.client.block_number()).await
    }

    /// Where to start watching: just before `start_block` if configured,
    /// otherwise the current head, so only later events are observed.
    pub async fn initial_cursor(&self) -> Result<u64, LedgerError> {
        match self.config.start_block {
            Some(start_block) => Ok(start_block.saturating_sub(1)),
            None => self.head().await,
        }
    }

    /// Fetch and decode everything in `(cursor, head]`.
    ///
    /// On error nothing is returned and the caller keeps its cursor.
    pub async fn poll(&self, cursor: u64) -> Result<PollOutcome, LedgerError> {
        let head = self.head().await?;
        if head <= cursor {
            return Ok(PollOutcome {
                events: Vec::new(),
                cursor,
                skipped: 0,
            });
        }

        let mut logs = Vec::new();
        for (from_block, to_block) in block_ranges(cursor + 1, head, self.config.max_block_range) {
            let filter = LogFilter {
                address: self.config.contract_address,
                topic0: *PAYMENT_MILESTONE_TOPIC,
                from_block,
                to_block,
            };
            debug!(from_block, to_block, "Fetching milestone logs");
            logs.extend(self.timed("eth_getLogs", self.client.get_logs(&filter)).await?);
        }

        let (events, skipped) = decode_logs(logs);
        Ok(PollOutcome {
            events,
            cursor: head,
            skipped,
        })
    }

    async fn timed<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let after = self.config.request_timeout;
        tokio::time::timeout(after, call)
            .await
            .map_err(|_| LedgerError::Timeout { operation, after })?
    }
}

/// Order logs by ledger position and decode them.
///
/// Returns the events and how many logs failed to decode. Logs removed by
/// a reorganisation are dropped without counting as failures.
fn decode_logs(mut logs: Vec<RawLog>) -> (Vec<MilestoneEvent>, usize) {
    // Stable: logs without a position keep their relative order, last.
    logs.sort_by_key(|log| {
        log.position()
            .map(|p| (p.block_number, p.log_index))
            .unwrap_or((u64::MAX, u64::MAX))
    });

    let mut events = Vec::with_capacity(logs.len());
    let mut skipped = 0;
    for log in logs {
        if log.removed {
            debug!(tx = ?log.transaction_hash, "Skipping removed log");
            continue;
        }
        match decode_milestone_log(&log) {
            Ok(event) => events.push(event),
            Err(e) => {
                warn!(
                    block = ?log.block_number,
                    log_index = ?log.log_index,
                    tx = ?log.transaction_hash,
                    error = %e,
                    "Skipping undecodable milestone log"
                );
                skipped += 1;
            }
        }
    }
    (events, skipped)
}

/// Runs a [`LedgerWatcher`] as the poll loop.
///
/// Ticks are serial: all events of one tick are applied and broadcast
/// before the next tick starts. Failed ticks back off per the configured
/// schedule.
pub struct LedgerWatcherRunner<C: LedgerClient> {
    watcher: LedgerWatcher<C>,
    broadcaster: Broadcaster,
    shutdown_rx: watch::Receiver<bool>,
}

impl<C: LedgerClient + 'static> LedgerWatcherRunner<C> {
    pub fn new(
        watcher: LedgerWatcher<C>,
        broadcaster: Broadcaster,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            watcher,
            broadcaster,
            shutdown_rx,
        }
    }

    /// Run until shutdown is signaled.
    pub async fn run(mut self) {
        let contract = self.watcher.config().contract_address;
        let mut schedule = PollSchedule::new(self.watcher.config().schedule);

        info!(%contract, "LedgerWatcher started");

        let mut cursor = loop {
            if *self.shutdown_rx.borrow() {
                info!("LedgerWatcher shutdown before start");
                return;
            }
            match self.watcher.initial_cursor().await {
                Ok(cursor) => break cursor,
                Err(e) => {
                    schedule.record_failure();
                    let retry_in = schedule.next_delay();
                    error!(error = %e, ?retry_in, "Failed to read initial chain height");
                    if !self.wait(retry_in).await {
                        return;
                    }
                }
            }
        };
        schedule.record_success();
        info!(cursor, "Listening for PaymentMilestoneReached events");

        while self.wait(schedule.next_delay()).await {
            cursor = self.tick(cursor, &mut schedule).await;
        }

        info!(cursor, "LedgerWatcher shutdown complete");
    }

    /// One poll-and-fan-out cycle. Returns the cursor for the next tick.
    async fn tick(&self, cursor: u64, schedule: &mut PollSchedule) -> u64 {
        match self.watcher.poll(cursor).await {
            Ok(outcome) => {
                if schedule.record_success() {
                    info!("Ledger reachable again, circuit breaker closed");
                }
                if outcome.cursor == cursor {
                    debug!(cursor, "No new blocks");
                    return cursor;
                }

                info!(
                    from_block = cursor + 1,
                    to_block = outcome.cursor,
                    events = outcome.events.len(),
                    skipped = outcome.skipped,
                    "Processed block range"
                );
                for event in outcome.events {
                    let _ = self.broadcaster.process(event).await;
                }
                outcome.cursor
            }
            Err(e) => {
                let opened = schedule.record_failure();
                error!(
                    error = %e,
                    cursor,
                    consecutive_failures = schedule.consecutive_failures(),
                    retry_in = ?schedule.next_delay(),
                    "Ledger poll failed"
                );
                if opened {
                    warn!(
                        cooldown = ?schedule.next_delay(),
                        "Circuit breaker opened, widening poll interval"
                    );
                }
                cursor
            }
        }
    }

    /// Sleep for `delay`. Returns `false` if shutdown was signaled first.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("LedgerWatcher received shutdown signal");
                        return false;
                    }
                }

                _ = &mut sleep => return true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollScheduleConfig, RegistryConfig};
    use crate::ledger::abi::tests::milestone_log;
    use crate::registry::ConnectionRegistry;
    use crate::state::StateStore;
    use alloy_primitives::Bytes;
    use async_trait::async_trait;
    use mona_sdk::objects::WsServerMessage;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory ledger. Returns matching logs newest-first so the watcher
    /// has to restore ledger order itself.
    #[derive(Default)]
    struct MockLedger {
        head: Mutex<u64>,
        logs: Mutex<Vec<RawLog>>,
        fail_logs: AtomicBool,
        /// Number of upcoming `block_number` calls that fail.
        fail_head: AtomicUsize,
        hang: AtomicBool,
        queries: Mutex<Vec<(u64, u64)>>,
    }

    impl MockLedger {
        fn at_height(head: u64) -> Arc<Self> {
            let ledger = Arc::new(Self::default());
            *ledger.head.lock() = head;
            ledger
        }

        fn push(&self, log: RawLog) {
            self.logs.lock().push(log);
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn block_number(&self) -> Result<u64, LedgerError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            let failing = self
                .fail_head
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(LedgerError::Status { status: 502 });
            }
            Ok(*self.head.lock())
        }

        async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, LedgerError> {
            self.queries.lock().push((filter.from_block, filter.to_block));
            if self.fail_logs.load(Ordering::SeqCst) {
                return Err(LedgerError::Rpc {
                    code: -32000,
                    message: "header not found".into(),
                });
            }
            let mut logs: Vec<RawLog> = self
                .logs
                .lock()
                .iter()
                .filter(|log| {
                    log.position().is_some_and(|p| {
                        p.block_number >= filter.from_block && p.block_number <= filter.to_block
                    })
                })
                .cloned()
                .collect();
            logs.reverse();
            Ok(logs)
        }
    }

    fn config() -> WatcherConfig {
        WatcherConfig {
            rpc_url: "http://localhost:8545".parse().unwrap(),
            contract_address: "0x7C3dc63D5Ba4046F57680b24A1362f4052535378".parse().unwrap(),
            request_timeout: Duration::from_secs(5),
            max_block_range: None,
            start_block: None,
            schedule: PollScheduleConfig::default(),
        }
    }

    fn percentages(events: &[MilestoneEvent]) -> Vec<u8> {
        events.iter().map(|e| e.payment_percentage.get()).collect()
    }

    #[test]
    fn test_block_ranges() {
        assert_eq!(block_ranges(1, 10, None), vec![(1, 10)]);
        assert_eq!(block_ranges(1, 10, Some(0)), vec![(1, 10)]);
        assert_eq!(
            block_ranges(1, 10, Some(3)),
            vec![(1, 3), (4, 6), (7, 9), (10, 10)]
        );
        assert_eq!(block_ranges(5, 5, Some(100)), vec![(5, 5)]);
        assert!(block_ranges(6, 5, None).is_empty());
        assert_eq!(
            block_ranges(u64::MAX - 1, u64::MAX, Some(10)),
            vec![(u64::MAX - 1, u64::MAX)]
        );
    }

    #[tokio::test]
    async fn test_no_new_blocks_leaves_cursor() {
        let ledger = MockLedger::at_height(10);
        let watcher = LedgerWatcher::new(ledger.clone(), config());

        let outcome = watcher.poll(10).await.unwrap();
        assert!(outcome.events.is_empty());
        assert_eq!(outcome.cursor, 10);

        // A lagging node reporting a lower head does not rewind the cursor.
        assert_eq!(watcher.poll(12).await.unwrap().cursor, 12);
        assert!(ledger.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_poll_returns_new_range_in_ledger_order() {
        let ledger = MockLedger::at_height(10);
        ledger.push(milestone_log(5, 0, 10, "already-seen"));
        ledger.push(milestone_log(8, 1, 30, "b"));
        ledger.push(milestone_log(8, 0, 20, "a"));
        ledger.push(milestone_log(10, 0, 40, "c"));
        let watcher = LedgerWatcher::new(ledger.clone(), config());

        let outcome = watcher.poll(6).await.unwrap();
        assert_eq!(percentages(&outcome.events), vec![20, 30, 40]);
        assert_eq!(outcome.cursor, 10);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(*ledger.queries.lock(), vec![(7, 10)]);
    }

    #[tokio::test]
    async fn test_undecodable_log_is_skipped() {
        let ledger = MockLedger::at_height(3);
        ledger.push(milestone_log(1, 0, 10, "a"));
        let mut bad = milestone_log(2, 0, 20, "b");
        bad.data = Bytes::from_static(&[0x12, 0x34]);
        ledger.push(bad);
        ledger.push(milestone_log(3, 0, 30, "c"));
        let watcher = LedgerWatcher::new(ledger, config());

        let outcome = watcher.poll(0).await.unwrap();
        assert_eq!(percentages(&outcome.events), vec![10, 30]);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.cursor, 3);
    }

    #[tokio::test]
    async fn test_removed_log_is_dropped() {
        let ledger = MockLedger::at_height(2);
        let mut reorged = milestone_log(1, 0, 90, "ghost");
        reorged.removed = true;
        ledger.push(reorged);
        ledger.push(milestone_log(2, 0, 15, "real"));
        let watcher = LedgerWatcher::new(ledger, config());

        let outcome = watcher.poll(0).await.unwrap();
        assert_eq!(percentages(&outcome.events), vec![15]);
        assert_eq!(outcome.skipped, 0);
    }

    #[tokio::test]
    async fn test_log_fetch_failure_is_an_error() {
        let ledger = MockLedger::at_height(5);
        ledger.push(milestone_log(4, 0, 10, "a"));
        ledger.fail_logs.store(true, Ordering::SeqCst);
        let watcher = LedgerWatcher::new(ledger, config());

        assert!(matches!(
            watcher.poll(0).await,
            Err(LedgerError::Rpc { code: -32000, .. })
        ));
    }

    #[tokio::test]
    async fn test_range_is_fetched_in_chunks() {
        let ledger = MockLedger::at_height(10);
        ledger.push(milestone_log(2, 0, 10, "a"));
        ledger.push(milestone_log(9, 0, 20, "b"));
        let watcher = LedgerWatcher::new(
            ledger.clone(),
            WatcherConfig {
                max_block_range: Some(3),
                ..config()
            },
        );

        let outcome = watcher.poll(0).await.unwrap();
        assert_eq!(percentages(&outcome.events), vec![10, 20]);
        assert_eq!(
            *ledger.queries.lock(),
            vec![(1, 3), (4, 6), (7, 9), (10, 10)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_times_out() {
        let ledger = MockLedger::at_height(10);
        ledger.hang.store(true, Ordering::SeqCst);
        let watcher = LedgerWatcher::new(ledger, config());

        match watcher.poll(0).await {
            Err(LedgerError::Timeout { operation, after }) => {
                assert_eq!(operation, "eth_blockNumber");
                assert_eq!(after, Duration::from_secs(5));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initial_cursor() {
        let ledger = MockLedger::at_height(500);
        let from_head = LedgerWatcher::new(ledger.clone(), config());
        assert_eq!(from_head.initial_cursor().await.unwrap(), 500);

        let from_block = LedgerWatcher::new(
            ledger,
            WatcherConfig {
                start_block: Some(100),
                ..config()
            },
        );
        assert_eq!(from_block.initial_cursor().await.unwrap(), 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_applies_each_event_once_across_failures() {
        let ledger = MockLedger::at_height(10);
        let registry = ConnectionRegistry::new(StateStore::new(), RegistryConfig::default());
        let mut subscription = registry.admit().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = LedgerWatcherRunner::new(
            LedgerWatcher::new(ledger.clone(), config()),
            Broadcaster::new(registry.clone()),
            shutdown_rx,
        );
        let handle = tokio::spawn(runner.run());

        // Runner now holds cursor 10; block 9 predates it.
        tokio::time::sleep(Duration::from_secs(1)).await;
        ledger.push(milestone_log(9, 0, 90, "before-start"));
        ledger.push(milestone_log(11, 0, 50, "1stStoryWindows"));
        ledger.push(milestone_log(12, 0, 30, "1stStoryWindows"));
        *ledger.head.lock() = 12;

        // Tick at t=20 fails; the retry backs off to t=60.
        ledger.fail_logs.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(registry.store().latest_milestone().get(), 0);

        ledger.fail_logs.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(41)).await;
        assert_eq!(registry.store().latest_milestone().get(), 50);
        assert!(!registry.store().contains("before-start"));

        // Further ticks see no new blocks.
        tokio::time::sleep(Duration::from_secs(45)).await;

        let messages = drain(&mut subscription);
        assert_eq!(messages.len(), 3);
        assert!(matches!(
            messages[0],
            WsServerMessage::Snapshot {
                current_milestone: 0,
                ..
            }
        ));
        assert_eq!(ledger.queries.lock().as_slice(), &[(11, 12), (11, 12)]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    fn drain(subscription: &mut crate::registry::Subscription) -> Vec<WsServerMessage> {
        std::iter::from_fn(|| subscription.try_recv())
            .map(|frame| serde_json::from_str(&frame).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_retries_initial_height() {
        let ledger = MockLedger::at_height(10);
        ledger.fail_head.store(2, Ordering::SeqCst);
        let registry = ConnectionRegistry::new(StateStore::new(), RegistryConfig::default());
        let mut subscription = registry.admit().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let runner = LedgerWatcherRunner::new(
            LedgerWatcher::new(ledger.clone(), config()),
            Broadcaster::new(registry.clone()),
            shutdown_rx,
        );
        let handle = tokio::spawn(runner.run());

        // Reads at t=0 and t=40 fail; the third at t=120 succeeds.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(ledger.queries.lock().is_empty());
        ledger.push(milestone_log(12, 0, 90, "before-start"));
        *ledger.head.lock() = 15;

        // The cursor is the head seen on success, so block 12 is never read.
        tokio::time::sleep(Duration::from_secs(25)).await;
        ledger.push(milestone_log(16, 0, 60, "2ndStoryWindows"));
        *ledger.head.lock() = 16;

        // First tick after recovery runs at t=140.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(registry.store().latest_milestone().get(), 60);
        assert!(!registry.store().contains("before-start"));

        tokio::time::sleep(Duration::from_secs(44)).await;
        let messages = drain(&mut subscription);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            WsServerMessage::Update {
                payment_percentage: 60,
                window_name: "2ndStoryWindows".into(),
            }
        );
        assert_eq!(ledger.queries.lock().as_slice(), &[(16, 16)]);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
