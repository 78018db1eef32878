//! TEAM_430: Hibernate task.
//!
//! Sleeps on the coordinator's barrier. Each time every live process is
//! suspended it asks the policy, writes one record per process, seals the
//! pass and hands off to the power controller.

use crate::backup::BackupMemory;
use crate::coordinator::SuspendManager;
use crate::error::{BackupError, PowerError, SerializeError};
use crate::traits::{BarrierSnapshot, Clock, HibernationPolicy, PowerControl};
use crate::types::Ticks;

/// How one hibernation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HibernateOutcome {
    /// Policy said no; the system keeps running suspended.
    Declined,
    /// A process woke, terminated or appeared while the pass was open.
    BarrierLost,
    /// The backup area filled up. Records written so far stay valid; the
    /// barrier is not released.
    Aborted { serialized: usize, overflow: usize },
    /// Power was cut (only observable in simulation).
    Hibernated { serialized: usize, wake_at: Option<Ticks> },
    /// The controller refused; the pass was abandoned.
    PowerDownFailed(PowerError),
}

/// The task that drives the hibernation side of the lifecycle.
pub struct HibernateTask<'a, M, C, P, W>
where
    M: BackupMemory,
    C: Clock,
{
    manager: &'a SuspendManager<M, C>,
    policy: P,
    power: W,
    seen_epoch: Option<u64>,
}

impl<'a, M, C, P, W> HibernateTask<'a, M, C, P, W>
where
    M: BackupMemory,
    C: Clock,
    P: HibernationPolicy,
    W: PowerControl,
{
    pub fn new(manager: &'a SuspendManager<M, C>, policy: P, power: W) -> Self {
        Self {
            manager,
            policy,
            power,
            seen_epoch: None,
        }
    }

    pub fn power(&self) -> &W {
        &self.power
    }

    /// [HT1] Task body. Never returns; on hardware a successful pass ends in
    /// a power cut.
    pub fn run(&mut self) -> ! {
        loop {
            let outcome = self.run_once();
            log::debug!("[HIBERNATE] Attempt ended: {:?}", outcome);
        }
    }

    /// [HT2] Wait for a barrier not yet acted on, then attempt once.
    ///
    /// After a declined or failed attempt the next call blocks until the
    /// coordinator state changes.
    pub fn run_once(&mut self) -> HibernateOutcome {
        let snapshot = self.manager.wait_for_barrier(self.seen_epoch);
        self.seen_epoch = Some(snapshot.epoch);
        self.attempt(&snapshot)
    }

    /// [HT3] One attempt against `snapshot`.
    ///
    /// Per-process failures drop that process and the pass goes on; only an
    /// exhausted backup area stops it early.
    pub fn attempt(&mut self, snapshot: &BarrierSnapshot) -> HibernateOutcome {
        if !self.policy.should_hibernate(snapshot) {
            log::debug!(
                "[HIBERNATE] Policy declined ({} suspended)",
                snapshot.suspended.len()
            );
            return HibernateOutcome::Declined;
        }

        let pids = match self.manager.begin_pass(snapshot) {
            Ok(pids) => pids,
            Err(e) => {
                log::debug!("[HIBERNATE] Not starting pass: {}", e);
                return HibernateOutcome::BarrierLost;
            }
        };
        log::info!("[HIBERNATE] Serializing {} processes", pids.len());

        let mut serialized = 0;
        for (i, &pid) in pids.iter().enumerate() {
            match self.manager.serialize_process(pid) {
                Ok(_) => serialized += 1,
                Err(SerializeError::Vanished) => {
                    log::debug!("[HIBERNATE] pid {} vanished, skipping", pid);
                }
                Err(e @ SerializeError::Backup(BackupError::Exhausted)) => {
                    let overflow = pids.len() - i;
                    log::error!(
                        "[HIBERNATE] {}: {} written, {} left over",
                        e,
                        serialized,
                        overflow
                    );
                    return HibernateOutcome::Aborted {
                        serialized,
                        overflow,
                    };
                }
                Err(e @ SerializeError::Backup(_)) => {
                    log::error!("[HIBERNATE] pid {} dropped: {}", pid, e);
                }
                Err(e @ (SerializeError::NoLongerSuspended | SerializeError::BarrierLost)) => {
                    log::info!("[HIBERNATE] pid {}: {}, abandoning pass", pid, e);
                    self.manager.abandon_pass();
                    return HibernateOutcome::BarrierLost;
                }
            }
        }

        let sealed = match self.manager.seal_pass() {
            Ok(sealed) => sealed,
            Err(e) => {
                log::info!("[HIBERNATE] {}, abandoning pass", e);
                self.manager.abandon_pass();
                return HibernateOutcome::BarrierLost;
            }
        };
        let wake_at = sealed.wake_at();
        match sealed.power_down(&self.power) {
            Ok(()) => HibernateOutcome::Hibernated {
                serialized,
                wake_at,
            },
            Err(e) => {
                log::error!("[HIBERNATE] {}", e);
                self.manager.abandon_pass();
                HibernateOutcome::PowerDownFailed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::{BackupArea, RamBackup};
    use crate::config::{AllocatorExtents, BackupLayout};
    use crate::process::ProcessSpec;
    use crate::registry::BlockingCall;
    use crate::types::{Pid, SyscallId, ThreadIndex};
    use core::cell::Cell;

    struct StoppedClock;

    impl Clock for StoppedClock {
        fn now(&self) -> Ticks {
            Ticks(10)
        }
    }

    #[derive(Default)]
    struct Power {
        calls: Cell<usize>,
        refuse: bool,
    }

    impl PowerControl for Power {
        fn power_down(&self, _wake_at: Option<Ticks>) -> Result<(), PowerError> {
            self.calls.set(self.calls.get() + 1);
            if self.refuse {
                Err(PowerError::Refused)
            } else {
                Ok(())
            }
        }
    }

    fn suspended_system(slots: usize, pids: &[u32]) -> SuspendManager<RamBackup, StoppedClock> {
        let layout = BackupLayout::new(8, 8);
        let mem = RamBackup::new(0, slots * layout.slot_size());
        let m = SuspendManager::new(
            BackupArea::new(mem, AllocatorExtents::default(), layout).unwrap(),
            StoppedClock,
        );
        for &pid in pids {
            m.process_port().register(ProcessSpec::new(Pid(pid))).unwrap();
            m.enter_interruption_point(
                Pid(pid),
                ThreadIndex(0),
                &BlockingCall::new(SyscallId::new(1).unwrap(), Ticks(100 + i64::from(pid))),
            )
            .unwrap();
            m.request_suspend(Pid(pid)).unwrap();
        }
        m
    }

    /// Tests: [HT3] declined policy writes nothing
    #[test]
    fn test_policy_decline() {
        let m = suspended_system(2, &[1]);
        let mut task = HibernateTask::new(&m, |_: &BarrierSnapshot| false, Power::default());
        assert_eq!(task.run_once(), HibernateOutcome::Declined);
        assert_eq!(task.power().calls.get(), 0);
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 0);
    }

    /// Tests: [HT3] approved pass powers down with the earliest deadline
    #[test]
    fn test_pass_powers_down() {
        let m = suspended_system(4, &[1, 2, 3]);
        let mut task = HibernateTask::new(&m, |_: &BarrierSnapshot| true, Power::default());
        assert_eq!(
            task.run_once(),
            HibernateOutcome::Hibernated {
                serialized: 3,
                wake_at: Some(Ticks(101))
            }
        );
        assert_eq!(task.power().calls.get(), 1);
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 3);
    }

    /// Tests: [HT3] exhaustion stops the pass and keeps earlier records
    #[test]
    fn test_exhaustion_aborts() {
        let m = suspended_system(2, &[1, 2, 3]);
        let mut task = HibernateTask::new(&m, |_: &BarrierSnapshot| true, Power::default());
        assert_eq!(
            task.run_once(),
            HibernateOutcome::Aborted {
                serialized: 2,
                overflow: 1
            }
        );
        assert_eq!(task.power().calls.get(), 0);
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 2);
        assert!(m.hibernation_barrier_satisfied());
    }

    #[test]
    fn test_refused_power_down_abandons() {
        let m = suspended_system(2, &[1]);
        let power = Power {
            refuse: true,
            ..Power::default()
        };
        let mut task = HibernateTask::new(&m, |_: &BarrierSnapshot| true, power);
        assert_eq!(
            task.run_once(),
            HibernateOutcome::PowerDownFailed(PowerError::Refused)
        );
        assert_eq!(m.with_backup(|b| b.scan_dirty().count()), 0);
        assert_eq!(
            m.process(Pid(1)).map(|p| p.state()),
            Some(crate::types::ProcessState::Suspended)
        );
    }
}
