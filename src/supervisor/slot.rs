//! Worker slot table (spec.md §3, "Worker slot"), grounded on
//! `FatController.cpp`'s `childrenpids` array and its invariants,
//! generalized from a raw pid array into a typed slot table.

use std::os::unix::net::UnixStream;
use std::time::Instant;

use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Unused,
    Initializing,
    Idle,
    Busy,
    Culled,
}

pub struct Slot {
    pub pid: Option<Pid>,
    pub channel: Option<UnixStream>,
    pub state: SlotState,
    /// When the slot last changed state, used for the 2-minute
    /// max-spare persistence rule (spec.md §4.8).
    pub since: Instant,
}

impl Slot {
    fn unused() -> Self {
        Self {
            pid: None,
            channel: None,
            state: SlotState::Unused,
            since: Instant::now(),
        }
    }
}

/// Fixed-size array of `max_workers` slots (spec.md §3). Invariants
/// enforced by construction, not asserted at runtime: a slot with
/// `state == Unused` always has `pid = None` and `channel = None`.
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new(max_workers: usize) -> Self {
        Self {
            slots: (0..max_workers).map(|_| Slot::unused()).collect(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Slot)> {
        self.slots.iter_mut().enumerate()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    /// First slot with `state == Unused`, to allocate a newly-forked child into.
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.state == SlotState::Unused)
    }

    /// First slot with `state == Idle`, to hand an accept off to.
    pub fn first_idle(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.state == SlotState::Idle)
    }

    pub fn occupy(&mut self, index: usize, pid: Pid, channel: UnixStream) {
        let slot = &mut self.slots[index];
        slot.pid = Some(pid);
        slot.channel = Some(channel);
        slot.state = SlotState::Initializing;
        slot.since = Instant::now();
    }

    pub fn set_state(&mut self, index: usize, state: SlotState) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.state = state;
            slot.since = Instant::now();
        }
    }

    /// Frees a slot after its child has been reaped.
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Slot::unused();
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<usize> {
        self.slots.iter().position(|s| s.pid == Some(pid))
    }

    pub fn num_workers(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Initializing | SlotState::Idle | SlotState::Busy))
            .count()
    }

    pub fn num_busy(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Busy).count()
    }

    pub fn num_idle(&self) -> usize {
        self.slots.iter().filter(|s| s.state == SlotState::Idle).count()
    }

    pub fn num_initializing(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Initializing)
            .count()
    }

    /// True once `idle > max_spare` has held continuously for at least
    /// `persistence`, matching `tmaxspare` in `FatController.cpp`.
    pub fn idle_excess_since(&self, max_spare: usize) -> Option<Instant> {
        if self.num_idle() <= max_spare {
            return None;
        }
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Idle)
            .map(|s| s.since)
            .max()
    }
}
