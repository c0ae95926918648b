//! State shared between tasks and with the outside world
//!
//! Each of the three live records has exactly one writer role, enforced by
//! a handle that can be taken once:
//!
//! | Record            | Writer handle          | Owner             |
//! |-------------------|------------------------|-------------------|
//! | `SensorSnapshot`  | [`SnapshotPublisher`]  | acquisition task  |
//! | `ProtectionState` | [`ProtectionPublisher`]| protection engine |
//! | `RelayState`      | [`RelayPublisher`]     | relay interlock   |
//!
//! Records are replaced whole inside a short critical section and read by
//! copy, so a reader never holds the lock while it works on the data and
//! never sees a half-written record.
//!
//! The store also carries the externally written [`DynamicConfig`] and a
//! bounded inbox for commands decoded at the network boundary.
//!
//! ```rust
//! use inverter_core::store::SharedStateStore;
//!
//! static STORE: SharedStateStore = SharedStateStore::new();
//!
//! let publisher = STORE.take_snapshot_publisher();
//! assert!(publisher.is_some());
//! assert!(STORE.take_snapshot_publisher().is_none());
//! ```

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::Deque;

use crate::command::Command;
use crate::config::DynamicConfig;
use crate::errors::CommandError;
use crate::protection::ProtectionState;
use crate::relay::RelayState;
use crate::snapshot::SensorSnapshot;

/// Commands held between control ticks
pub const INBOX_CAPACITY: usize = 8;

/// Latest published state of the controller
pub struct SharedStateStore {
    snapshot: Mutex<Cell<SensorSnapshot>>,
    protection: Mutex<Cell<ProtectionState>>,
    relays: Mutex<Cell<RelayState>>,
    dynamic: Mutex<Cell<DynamicConfig>>,
    inbox: Mutex<RefCell<Deque<Command, INBOX_CAPACITY>>>,
    samples: AtomicU32,
    snapshot_taken: AtomicBool,
    protection_taken: AtomicBool,
    relays_taken: AtomicBool,
}

impl SharedStateStore {
    /// Empty store with default dynamic config, usable in `static` items
    pub const fn new() -> Self {
        Self {
            snapshot: Mutex::new(Cell::new(SensorSnapshot::empty())),
            protection: Mutex::new(Cell::new(ProtectionState::new())),
            relays: Mutex::new(Cell::new(RelayState::all_off())),
            dynamic: Mutex::new(Cell::new(DynamicConfig::new())),
            inbox: Mutex::new(RefCell::new(Deque::new())),
            samples: AtomicU32::new(0),
            snapshot_taken: AtomicBool::new(false),
            protection_taken: AtomicBool::new(false),
            relays_taken: AtomicBool::new(false),
        }
    }

    /// Writer handle for sensor snapshots; `None` once taken
    pub fn take_snapshot_publisher(&self) -> Option<SnapshotPublisher<'_>> {
        take(&self.snapshot_taken).then_some(SnapshotPublisher { store: self })
    }

    /// Writer handle for protection state; `None` once taken
    pub fn take_protection_publisher(&self) -> Option<ProtectionPublisher<'_>> {
        take(&self.protection_taken).then_some(ProtectionPublisher { store: self })
    }

    /// Writer handle for relay state; `None` once taken
    pub fn take_relay_publisher(&self) -> Option<RelayPublisher<'_>> {
        take(&self.relays_taken).then_some(RelayPublisher { store: self })
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> SensorSnapshot {
        critical_section::with(|cs| self.snapshot.borrow(cs).get())
    }

    /// Copy of the current protection state
    pub fn protection_state(&self) -> ProtectionState {
        critical_section::with(|cs| self.protection.borrow(cs).get())
    }

    /// Copy of the current relay state
    pub fn relay_state(&self) -> RelayState {
        critical_section::with(|cs| self.relays.borrow(cs).get())
    }

    /// Copy of the current dynamic config
    pub fn dynamic_config(&self) -> DynamicConfig {
        critical_section::with(|cs| self.dynamic.borrow(cs).get())
    }

    /// Replace the dynamic config; takes effect at the next evaluation
    pub fn update_dynamic_config(&self, config: DynamicConfig) {
        critical_section::with(|cs| self.dynamic.borrow(cs).set(config));
    }

    /// Snapshots published since boot, monotonic until it wraps at `u32::MAX`
    pub fn sample_count(&self) -> u32 {
        self.samples.load(Ordering::Acquire)
    }

    /// Queue a command for the control task
    pub fn push_command(&self, command: Command) -> Result<(), CommandError> {
        critical_section::with(|cs| {
            self.inbox
                .borrow(cs)
                .borrow_mut()
                .push_back(command)
                .map_err(|_| CommandError::InboxFull)
        })
    }

    /// Oldest queued command
    pub fn next_command(&self) -> Option<Command> {
        critical_section::with(|cs| self.inbox.borrow(cs).borrow_mut().pop_front())
    }

    /// Commands waiting
    pub fn pending_commands(&self) -> usize {
        critical_section::with(|cs| self.inbox.borrow(cs).borrow().len())
    }
}

impl Default for SharedStateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take(flag: &AtomicBool) -> bool {
    !flag.swap(true, Ordering::AcqRel)
}

/// Sole writer of [`SensorSnapshot`]
pub struct SnapshotPublisher<'a> {
    store: &'a SharedStateStore,
}

impl SnapshotPublisher<'_> {
    /// Swap in a new snapshot, stamping it with the next sample number
    pub fn publish(&mut self, mut snapshot: SensorSnapshot) -> u32 {
        let store = self.store;
        critical_section::with(|cs| {
            let sample = store.samples.load(Ordering::Relaxed).wrapping_add(1);
            snapshot.sample = sample;
            store.snapshot.borrow(cs).set(snapshot);
            store.samples.store(sample, Ordering::Release);
            sample
        })
    }
}

/// Sole writer of [`ProtectionState`]
pub struct ProtectionPublisher<'a> {
    store: &'a SharedStateStore,
}

impl ProtectionPublisher<'_> {
    /// Swap in a new protection state
    pub fn publish(&mut self, state: ProtectionState) {
        critical_section::with(|cs| self.store.protection.borrow(cs).set(state));
    }
}

/// Sole writer of [`RelayState`]
pub struct RelayPublisher<'a> {
    store: &'a SharedStateStore,
}

impl RelayPublisher<'_> {
    /// Swap in a new relay state
    pub fn publish(&mut self, state: RelayState) {
        critical_section::with(|cs| self.store.relays.borrow(cs).set(state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayChannel;

    #[test]
    fn publishers_taken_once() {
        let store = SharedStateStore::new();
        assert!(store.take_protection_publisher().is_some());
        assert!(store.take_protection_publisher().is_none());
        assert!(store.take_relay_publisher().is_some());
        assert!(store.take_relay_publisher().is_none());
    }

    #[test]
    fn publish_stamps_monotonic_sample() {
        let store = SharedStateStore::new();
        let mut publisher = store.take_snapshot_publisher().unwrap();

        assert_eq!(store.sample_count(), 0);
        let first = publisher.publish(SensorSnapshot { soc_pct: 40.0, ..SensorSnapshot::empty() });
        let second = publisher.publish(SensorSnapshot { soc_pct: 41.0, ..SensorSnapshot::empty() });

        assert_eq!((first, second), (1, 2));
        assert_eq!(store.sample_count(), 2);
        let current = store.snapshot();
        assert_eq!(current.sample, 2);
        assert_eq!(current.soc_pct, 41.0);
    }

    #[test]
    fn inbox_rejects_when_full() {
        let store = SharedStateStore::new();
        for _ in 0..INBOX_CAPACITY {
            store.push_command(Command::RunStrategy).unwrap();
        }
        assert_eq!(store.push_command(Command::EmergencyAllOff), Err(CommandError::InboxFull));
        assert_eq!(store.pending_commands(), INBOX_CAPACITY);
    }

    #[test]
    fn inbox_is_fifo() {
        let store = SharedStateStore::new();
        store.push_command(Command::SetRelay { channel: RelayChannel::Load, on: true }).unwrap();
        store.push_command(Command::EmergencyAllOff).unwrap();

        assert_eq!(
            store.next_command(),
            Some(Command::SetRelay { channel: RelayChannel::Load, on: true })
        );
        assert_eq!(store.next_command(), Some(Command::EmergencyAllOff));
        assert_eq!(store.next_command(), None);
    }

    #[test]
    fn dynamic_config_replaced_whole() {
        let store = SharedStateStore::new();
        let config = DynamicConfig { protection_enabled: false, ..store.dynamic_config() };
        store.update_dynamic_config(config);
        assert!(!store.dynamic_config().protection_enabled);
        assert_eq!(store.dynamic_config().battery_capacity_wh, 5_000.0);
    }
}
