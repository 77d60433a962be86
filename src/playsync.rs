// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::{Condvar, Mutex};

/// Represents the current cancel state.
#[derive(PartialEq)]
enum CancelState {
    Untouched,
    Cancelled,
}

/// A cancel handle is shared between a worker thread and its owner. It's the worker's
/// responsibility to check it every loop iteration and exit once it's been cancelled.
#[derive(Clone)]
pub struct CancelHandle {
    /// Set to cancelled once the owner wants the worker to stop.
    cancelled: Arc<Mutex<CancelState>>,
    /// The condvar will handle notification of cancelling.
    condvar: Arc<Condvar>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Creates a new cancel handle.
    pub fn new() -> CancelHandle {
        CancelHandle {
            cancelled: Arc::new(Mutex::new(CancelState::Untouched)),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Returns true if the worker has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock() == CancelState::Cancelled
    }

    /// Sleeps for up to the given timeout, waking early if cancelled. Returns true if the
    /// handle was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.cancelled.lock();
        if *state == CancelState::Untouched {
            let _ = self.condvar.wait_for(&mut state, timeout);
        }
        *state == CancelState::Cancelled
    }

    /// Cancel the worker.
    pub fn cancel(&self) {
        let mut cancel_state = self.cancelled.lock();
        if *cancel_state == CancelState::Untouched {
            *cancel_state = CancelState::Cancelled;
            self.condvar.notify_all();
        }
    }
}

/// A single-producer, multi-consumer fan out of snapshots. The producer never blocks: a
/// subscriber that hasn't drained its previous snapshot has it replaced by the new one, and
/// subscribers that have been dropped are forgotten on the next publish.
pub struct Broadcast<T: Clone> {
    subscribers: Mutex<Vec<Slot<T>>>,
}

/// The producer's side of one subscription. The receiver is kept so a stale value can be
/// taken back out; the weak token tells whether the subscriber still exists.
struct Slot<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    alive: Weak<()>,
}

impl<T> Slot<T> {
    /// Offers the value, replacing one the subscriber hasn't picked up yet.
    fn offer(&self, value: T) -> bool {
        if self.alive.strong_count() == 0 {
            return false;
        }
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(TrySendError::Full(value)) => {
                let _ = self.rx.try_recv();
                // The subscriber may have taken the stale value in between; either way one
                // slot is free now.
                let _ = self.tx.try_send(value);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// The subscriber's side of a [Broadcast]. Holds at most the latest snapshot.
pub struct Subscription<T> {
    rx: Receiver<T>,
    _alive: Arc<()>,
}

impl<T> Subscription<T> {
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.rx.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Broadcast<T> {
    pub fn new() -> Broadcast<T> {
        Broadcast {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber. Dropping the subscription unregisters it.
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let alive = Arc::new(());
        self.subscribers.lock().push(Slot {
            tx,
            rx: rx.clone(),
            alive: Arc::downgrade(&alive),
        });
        Subscription { rx, _alive: alive }
    }

    /// Sends the value to every live subscriber.
    pub fn publish(&self, value: &T) {
        self.subscribers
            .lock()
            .retain(|slot| slot.offer(value.clone()));
    }

    /// The number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_cancel_handle_cancelled() {
        let cancel_handle = CancelHandle::new();
        assert!(!cancel_handle.is_cancelled());

        let join = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || cancel_handle.wait_timeout(Duration::from_secs(10)))
        };

        cancel_handle.cancel();
        assert!(join.join().unwrap());
        assert!(cancel_handle.is_cancelled());
    }

    #[test]
    fn test_cancel_handle_timeout() {
        let cancel_handle = CancelHandle::new();
        let start = Instant::now();
        assert!(!cancel_handle.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!cancel_handle.is_cancelled());
    }

    #[test]
    fn test_broadcast_fan_out() {
        let broadcast = Broadcast::new();
        let a = broadcast.subscribe();
        let b = broadcast.subscribe();

        broadcast.publish(&1);
        assert_eq!(Ok(1), a.try_recv());
        assert_eq!(Ok(1), b.try_recv());
    }

    #[test]
    fn test_broadcast_never_blocks_on_slow_subscriber() {
        let broadcast = Broadcast::new();
        let slow = broadcast.subscribe();

        broadcast.publish(&1);
        broadcast.publish(&2);
        broadcast.publish(&3);
        assert_eq!(Ok(3), slow.try_recv());
        assert!(slow.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_lagging_subscriber_gets_latest() {
        let broadcast = Broadcast::new();
        let fast = broadcast.subscribe();
        let lagging = broadcast.subscribe();

        for value in 1..=5 {
            broadcast.publish(&value);
            assert_eq!(Ok(value), fast.try_recv());
        }
        assert_eq!(Ok(5), lagging.try_recv());
        assert_eq!(2, broadcast.subscriber_count());
    }

    #[test]
    fn test_broadcast_drops_disconnected() {
        let broadcast = Broadcast::new();
        let kept = broadcast.subscribe();
        {
            let _dropped = broadcast.subscribe();
        }
        assert_eq!(2, broadcast.subscriber_count());
        broadcast.publish(&"tick");
        assert_eq!(1, broadcast.subscriber_count());
        assert_eq!(Ok("tick"), kept.try_recv());
    }
}
