//! # Capability Gate
//!
//! Ports are only reachable through [`PortHandle`]s. A handle names the
//! issuing engine, the port kind, the slot in that kind's table, and the
//! rights granted to the holder. Handles cannot be built outside this crate:
//! the only ways to obtain one are `CoportEngine::open` and
//! [`PortHandle::derive`].
//!
//! ## Properties
//!
//! - **Monotonicity**: derived handles have at most the rights of the parent
//! - **No Forgery**: fields are private; foreign or out-of-range handles are
//!   rejected by the table before any port field is read
//! - **Type Safety**: a handle is only valid against the table of its kind

pub mod rights;

pub use rights::Rights;

use crate::error::{CoportError, Result};
use crate::port::PortKind;

/// Permission-scoped reference to a port
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PortHandle {
    engine: u64,
    kind: PortKind,
    index: u32,
    rights: Rights,
}

impl PortHandle {
    pub(crate) fn new(engine: u64, kind: PortKind, index: u32, rights: Rights) -> Self {
        Self {
            engine,
            kind,
            index,
            rights,
        }
    }

    /// Transfer discipline of the referenced port
    pub fn kind(&self) -> PortKind {
        self.kind
    }

    /// Rights granted by this handle
    pub fn rights(&self) -> Rights {
        self.rights
    }

    pub(crate) fn engine(&self) -> u64 {
        self.engine
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }

    /// Check if this handle has the required rights
    #[inline]
    pub fn has_rights(&self, required: Rights) -> bool {
        self.rights.contains(required)
    }

    /// Require specific rights, returning an invalid-argument error if absent
    pub fn require(&self, required: Rights) -> Result<()> {
        if self.has_rights(required) {
            Ok(())
        } else {
            Err(CoportError::invalid(format!(
                "handle lacks rights {:?} (has {:?})",
                required - self.rights,
                self.rights
            )))
        }
    }

    /// Derive a new handle with reduced rights
    ///
    /// Requires GRANT. The result is the intersection with `mask`, with
    /// GRANT stripped so delegation does not chain.
    pub fn derive(&self, mask: Rights) -> Result<PortHandle> {
        if !self.rights.contains(Rights::GRANT) {
            return Err(CoportError::invalid("handle lacks GRANT right"));
        }

        let rights = self.rights & mask & !Rights::GRANT;
        if rights.is_empty() {
            return Err(CoportError::invalid("derived handle would have no rights"));
        }

        Ok(PortHandle {
            rights,
            ..self.clone()
        })
    }
}

impl std::fmt::Debug for PortHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PortHandle({}:{}#{} {:?})",
            self.kind, self.engine, self.index, self.rights
        )
    }
}
