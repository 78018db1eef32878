//! Shared fixtures for the lifecycle tests: a settable RTC, a power controller
//! that records its calls, a scheduler that records what it was told, and a
//! helper that models a power cycle by moving backup memory into a fresh
//! coordinator.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use los_hibernate::{
    AllocatorExtents, BackupArea, BackupLayout, BlockingCall, Clock, Pid, PowerControl,
    PowerError, ProcessSpec, RamBackup, ResumeEntry, SuspendManager, SyscallId, ThreadIndex,
    ThreadRef, ThreadScheduler, Ticks,
};

pub const SRAM_BASE: usize = 0x4002_4000;
pub const EXTENTS: AllocatorExtents = AllocatorExtents::new(0x200, 0x100);
pub const LAYOUT: BackupLayout = BackupLayout::new(256, 128);

pub type Manager = SuspendManager<RamBackup, SimClock>;

/// RTC that only moves when told to.
pub struct SimClock(AtomicI64);

impl SimClock {
    pub fn at(t: i64) -> Self {
        Self(AtomicI64::new(t))
    }

    pub fn set(&self, t: i64) {
        self.0.store(t, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Ticks {
        Ticks(self.0.load(Ordering::SeqCst))
    }
}

/// Power controller that "cuts" power by recording the wake alarm.
#[derive(Default)]
pub struct SimPower {
    pub alarms: Mutex<Vec<Option<Ticks>>>,
    /// Latest time the RTC alarm can be programmed for.
    pub alarm_limit: Option<Ticks>,
}

impl SimPower {
    pub fn cuts(&self) -> usize {
        self.alarms.lock().unwrap().len()
    }
}

impl PowerControl for SimPower {
    fn power_down(&self, wake_at: Option<Ticks>) -> Result<(), PowerError> {
        if let (Some(at), Some(limit)) = (wake_at, self.alarm_limit) {
            if at > limit {
                return Err(PowerError::AlarmOutOfRange);
            }
        }
        self.alarms.lock().unwrap().push(wake_at);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    Wake(ThreadRef),
    Timer(ResumeEntry),
}

#[derive(Default)]
pub struct SimScheduler {
    pub events: Vec<Scheduled>,
}

impl ThreadScheduler for SimScheduler {
    fn wake_now(&mut self, thread: ThreadRef) {
        self.events.push(Scheduled::Wake(thread));
    }

    fn arm_timer(&mut self, entry: ResumeEntry) {
        self.events.push(Scheduled::Timer(entry));
    }
}

/// Fresh backup memory with room for `slots` records.
pub fn backup_memory(slots: usize) -> RamBackup {
    RamBackup::new(SRAM_BASE, EXTENTS.reserved() + slots * LAYOUT.slot_size())
}

pub fn boot(memory: RamBackup, now: i64) -> Manager {
    let area = BackupArea::new(memory, EXTENTS, LAYOUT).unwrap();
    SuspendManager::new(area, SimClock::at(now))
}

/// Drop main memory: only the backup memory reaches the next boot.
pub fn power_cycle(manager: Manager, now: i64) -> Manager {
    boot(manager.into_backup().into_memory(), now)
}

pub fn call(id: u32, deadline: i64) -> BlockingCall {
    BlockingCall::new(SyscallId::new(id).unwrap(), Ticks(deadline))
}

/// Image whose bytes encode `pid`, so mixed-up restores are visible.
pub fn image_of(pid: u32, len: usize) -> Vec<u8> {
    (0..len).map(|i| (pid as usize * 31 + i) as u8).collect()
}

/// Register `pid`, park its only thread until `deadline` and suspend it.
pub fn park_and_suspend(m: &Manager, pid: u32, deadline: i64) {
    m.process_port()
        .register(
            ProcessSpec::new(Pid(pid))
                .parent(Pid(0))
                .image(image_of(pid, 64))
                .program(vec![0xC0 | pid as u8; 32]),
        )
        .unwrap();
    m.enter_interruption_point(Pid(pid), ThreadIndex(0), &call(pid, deadline))
        .unwrap();
    m.request_suspend(Pid(pid)).unwrap();
}
