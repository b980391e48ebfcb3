//! Common error-handling support for the kernel crate, mirrored from the
//! teacher's own split between errors a caller should expect (`Code`) and
//! errors that mean the kernel found one of its own invariants broken.

use abi::Code;

/// A kernel-level result: either a `Code` the caller is expected to act on,
/// or a bug we refuse to paper over.
#[derive(Copy, Clone, Debug)]
pub enum KernelError {
    /// An ordinary, expected failure: not found, would block, timed out...
    Recoverable(Code),
    /// An invariant the kernel itself is responsible for maintaining has
    /// been violated. These are not meant to be caught; the process aborts.
    Unrecoverable(Bug),
}

#[derive(Copy, Clone, Debug)]
pub enum Bug {
    /// A monitor's owner/recursion-count invariant (`owner == None` iff
    /// `recursion == 0`) no longer holds.
    MonitorInvariant,
    /// The blocking graph thread → monitor → owner contains a cycle.
    MonitorDeadlock,
    /// A capability table slot was addressed outside occupied/free state.
    CaptableCorrupt,
    /// A TCP endpoint's sequence-number invariants no longer hold.
    SequenceInvariant,
}

impl Bug {
    /// The `Code` a bug maps to when it must be reported across the wire
    /// rather than simply aborting the process in place (e.g. a deadlock
    /// detected while dispatching an RPC, rather than from a purely local
    /// call).
    pub fn code(self) -> Code {
        match self {
            Bug::MonitorDeadlock => Code::Deadlock,
            Bug::MonitorInvariant | Bug::CaptableCorrupt | Bug::SequenceInvariant => {
                Code::UnsupportedOperation
            }
        }
    }
}

impl From<Code> for KernelError {
    fn from(c: Code) -> Self {
        KernelError::Recoverable(c)
    }
}

impl From<Bug> for KernelError {
    fn from(b: Bug) -> Self {
        KernelError::Unrecoverable(b)
    }
}

impl KernelError {
    /// Collapses to the `Code` a broker reply carries; unrecoverable bugs
    /// never reach the wire; this is provided only for call sites
    /// (network/ring) that always deal in already-recoverable errors.
    pub fn code(self) -> Code {
        match self {
            KernelError::Recoverable(c) => c,
            KernelError::Unrecoverable(_) => Code::UnsupportedOperation,
        }
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;
