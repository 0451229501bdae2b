//! The task that drives a [`RotationScheduler`] in real time.
//!
//! The scheduler itself has no clock.  This loop owns the one-second ticker
//! and feeds it transport events, so the scheduler only ever sees one caller
//! at a time through its mutex.
//!
//! The ticker exists only while the scheduler is not idle: the loop watches
//! the scheduler's snapshot channel and creates the ticker on arming and
//! drops it on disarming.  An idle scheduler costs no wakeups.
//!
//! Cancelling the token stops the loop promptly, including in the middle of
//! a cycle that is still waiting on probes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::rotate_targets::{RotationPhase, RotationScheduler, TransportEvent};

/// Period between scheduler ticks.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Runs the rotation until `cancel` fires.
pub async fn run_rotation_loop(
    scheduler: Arc<Mutex<RotationScheduler>>,
    mut events: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) {
    let mut snapshots = scheduler.lock().await.subscribe();
    let mut ticker: Option<Interval> = None;
    let mut events_open = true;

    let initial = snapshots.borrow_and_update().phase;
    sync_ticker(&mut ticker, initial);
    info!("rotation loop started");

    'run: loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break 'run,

            event = events.recv(), if events_open => match event {
                Some(event) => scheduler.lock().await.handle_event(event),
                None => {
                    debug!("transport event channel closed");
                    events_open = false;
                }
            },

            changed = snapshots.changed() => {
                if changed.is_err() {
                    break 'run;
                }
                let phase = snapshots.borrow_and_update().phase;
                sync_ticker(&mut ticker, phase);
            }

            _ = next_tick(&mut ticker) => {
                let mut guard = scheduler.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => break 'run,
                    result = guard.tick() => {
                        if let Err(e) = result {
                            warn!("rotation cycle failed: {e}");
                        }
                    }
                }
            }
        }
    }

    info!("rotation loop stopped");
}

/// Creates or drops the ticker to match `phase`.
fn sync_ticker(ticker: &mut Option<Interval>, phase: RotationPhase) {
    match (phase, ticker.is_some()) {
        (RotationPhase::Idle, true) => {
            debug!("ticker stopped");
            *ticker = None;
        }
        (RotationPhase::Armed | RotationPhase::Switching, false) => {
            let mut interval = tokio::time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("ticker started");
            *ticker = Some(interval);
        }
        _ => {}
    }
}

/// Waits for the next tick, or forever when there is no ticker.
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::rotate_targets::{PresenceProbe, SwitchTransport};
    use crate::infrastructure::transport::mock::{MockTransport, StaticPresenceProbe};
    use kvm_switch_core::{PortNumber, RotationConfig, Target, TargetId};

    fn two_targets() -> Vec<Target> {
        vec![
            Target::new(TargetId::new("a"), "A", PortNumber::new(1).unwrap()),
            Target::new(TargetId::new("b"), "B", PortNumber::new(2).unwrap()),
        ]
    }

    fn shared_scheduler(enabled: bool) -> (Arc<Mutex<RotationScheduler>>, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let scheduler = RotationScheduler::new(
            Arc::clone(&transport) as Arc<dyn SwitchTransport>,
            Arc::new(StaticPresenceProbe::new()) as Arc<dyn PresenceProbe>,
            two_targets(),
            RotationConfig::new(enabled, 5).unwrap(),
        );
        (Arc::new(Mutex::new(scheduler)), transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_switches_once_per_interval() {
        // Arrange
        let (scheduler, transport) = shared_scheduler(false);
        {
            let mut s = scheduler.lock().await;
            s.handle_event(TransportEvent::Connected);
            s.set_enabled(true).unwrap();
        }
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(Arc::clone(&scheduler), rx, cancel.clone()));

        // Act
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        let after_one = transport.sent_commands();
        tokio::time::sleep(Duration::from_secs(5)).await;
        let after_two = transport.sent_commands();

        // Assert
        assert_eq!(after_one, vec!["X1,1$"]);
        assert_eq!(after_two, vec!["X1,1$", "X2,1$"]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connected_event_arms_enabled_scheduler() {
        // Arrange
        let (scheduler, transport) = shared_scheduler(true);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(Arc::clone(&scheduler), rx, cancel.clone()));

        // Act
        tx.send(TransportEvent::Connected).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5_500)).await;

        // Assert
        assert_eq!(scheduler.lock().await.phase(), RotationPhase::Armed);
        assert_eq!(transport.sent_count(), 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_scheduler_is_never_ticked() {
        let (scheduler, transport) = shared_scheduler(false);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(Arc::clone(&scheduler), rx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(transport.sent_count(), 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_switching() {
        // Arrange
        let (scheduler, transport) = shared_scheduler(false);
        {
            let mut s = scheduler.lock().await;
            s.handle_event(TransportEvent::Connected);
            s.set_enabled(true).unwrap();
        }
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(Arc::clone(&scheduler), rx, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        // Act
        scheduler.lock().await.set_enabled(false).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        // Assert
        assert_eq!(transport.sent_count(), 0);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_event_stops_rotation() {
        let (scheduler, transport) = shared_scheduler(false);
        {
            let mut s = scheduler.lock().await;
            s.handle_event(TransportEvent::Connected);
            s.set_enabled(true).unwrap();
        }
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(Arc::clone(&scheduler), rx, cancel.clone()));

        tx.send(TransportEvent::Disconnected).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(transport.sent_count(), 0);
        assert_eq!(scheduler.lock().await.phase(), RotationPhase::Idle);
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_loop_even_after_events_close() {
        let (scheduler, _transport) = shared_scheduler(false);
        let (tx, rx) = mpsc::channel(4);
        drop(tx);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_rotation_loop(scheduler, rx, cancel.clone()));

        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
