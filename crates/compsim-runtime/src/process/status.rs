//! Process status state machine.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Lifecycle state of a process.
///
/// ```text
///            start                 complete / fail
/// Waiting ──────────► Active ─────────────────────► Ready
///                     │   ▲                           │
///          read_line  ▼   │ line arrives              │ start
///                   Waiting                           ▼
///                                                   Active
///
/// kill: any state ──► Interrupted (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    /// Currently executing.
    Active,
    /// Idle and startable.
    Ready,
    /// Not yet started, or blocked on input.
    Waiting,
    /// Killed. Execution is refused from here on.
    Interrupted,
}

impl ProcessStatus {
    /// Boundary string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Ready => "ready",
            Self::Waiting => "waiting",
            Self::Interrupted => "interrupted",
        }
    }

    const fn to_u8(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Ready => 1,
            Self::Waiting => 2,
            Self::Interrupted => 3,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Active,
            1 => Self::Ready,
            2 => Self::Waiting,
            _ => Self::Interrupted,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown process status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ProcessStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "ready" => Ok(Self::Ready),
            "waiting" => Ok(Self::Waiting),
            "interrupted" => Ok(Self::Interrupted),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Why [`StatusCell::begin`] refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeginError {
    Busy,
    Interrupted,
}

/// Lock-free status holder shared between a process and its observers.
///
/// `running` is separate from the status so a process blocked on input
/// (status `Waiting`) still counts as executing.
#[derive(Debug)]
pub(crate) struct StatusCell {
    status: AtomicU8,
    running: AtomicBool,
}

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(ProcessStatus::Waiting.to_u8()),
            running: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self) -> ProcessStatus {
        ProcessStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claims the process for one execution and marks it `Active`.
    pub(crate) fn begin(&self) -> Result<(), BeginError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(BeginError::Busy);
        }
        let claimed = self.status.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            (ProcessStatus::from_u8(s) != ProcessStatus::Interrupted)
                .then_some(ProcessStatus::Active.to_u8())
        });
        if claimed.is_err() {
            self.running.store(false, Ordering::Release);
            return Err(BeginError::Interrupted);
        }
        Ok(())
    }

    /// Ends an execution. A kill during the run is kept.
    pub(crate) fn finish(&self) {
        self.transition(&[ProcessStatus::Active, ProcessStatus::Waiting], ProcessStatus::Ready);
        self.running.store(false, Ordering::Release);
    }

    /// `Active` → `Waiting` while blocked on input.
    pub(crate) fn wait(&self) {
        self.transition(&[ProcessStatus::Active], ProcessStatus::Waiting);
    }

    /// `Waiting` → `Active` once input arrived.
    pub(crate) fn resume(&self) {
        self.transition(&[ProcessStatus::Waiting], ProcessStatus::Active);
    }

    /// Forces `Interrupted`; returns the previous status.
    pub(crate) fn kill(&self) -> ProcessStatus {
        ProcessStatus::from_u8(
            self.status
                .swap(ProcessStatus::Interrupted.to_u8(), Ordering::AcqRel),
        )
    }

    fn transition(&self, from: &[ProcessStatus], to: ProcessStatus) {
        let _ = self.status.fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
            from.contains(&ProcessStatus::from_u8(s)).then_some(to.to_u8())
        });
    }
}
