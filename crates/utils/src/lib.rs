#![cfg_attr(not(feature = "std"), no_std)]

pub mod condvar;

// TEAM_211: Re-export spin crate types as our lock API
pub use spin::{Lazy, Once};
pub use spin::{Mutex, MutexGuard};

// TEAM_212: Re-export hashbrown collections
pub use hashbrown::{HashMap, HashSet};

pub use condvar::CondVar;

/// Back off inside a busy-wait loop.
///
/// On the target this is a CPU relax hint; host builds yield so that test
/// threads sharing a core make progress.
#[inline]
pub fn relax() {
    #[cfg(feature = "std")]
    std::thread::yield_now();
    #[cfg(not(feature = "std"))]
    core::hint::spin_loop();
}

// ============================================================================
// Unit Tests
// ============================================================================
