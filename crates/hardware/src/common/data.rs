//! Memory Access Types.
//!
//! This module classifies the requests that reach the DRAM controller. The
//! classification is used for:
//! 1. **Fault Penalties:** Translation accesses carry their own fixed penalty and
//!    supply their virtual address as a hint to the latency estimator.
//! 2. **Diagnostics:** Trace events and deadlock dumps name the access type.

use std::fmt;

/// Type of memory access carried by a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AccessType {
    /// Demand data load.
    #[default]
    Load,

    /// Read-for-ownership issued ahead of a store.
    Rfo,

    /// Hardware prefetch.
    Prefetch,

    /// Dirty line written back from the cache hierarchy.
    Write,

    /// Page-table entry fetch issued by a page-table walker.
    Translation,
}

impl AccessType {
    /// Returns `true` for page-table-walk accesses.
    #[inline]
    pub const fn is_translation(self) -> bool {
        matches!(self, Self::Translation)
    }

    /// Returns a short upper-case name, matching the statistics output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Load => "LOAD",
            Self::Rfo => "RFO",
            Self::Prefetch => "PREFETCH",
            Self::Write => "WRITE",
            Self::Translation => "TRANSLATION",
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
