//! Plugin contract, descriptors and the plugin manager
//!
//! A plugin is a native library exporting:
//!
//! | Symbol    | Required      | Meaning                                   |
//! |-----------|---------------|-------------------------------------------|
//! | `type`    | yes           | [`Capabilities`] bitset (`u32`)           |
//! | `init`    | no            | [`abi::InitFn`], false aborts registration |
//! | `proc`    | iff `ASYNC`   | [`abi::ProcFn`], runs on its own thread   |
//! | `update`  | no, non-async | [`abi::UpdateFn`], once per host frame    |
//! | `cleanup` | no            | [`abi::CleanupFn`], before unload         |
//!
//! Rust plugins generate these exports with [`declare_plugin!`](crate::declare_plugin).

pub mod abi;
mod descriptor;
mod error;
mod macros;
mod manager;

pub use abi::{PluginHost, PluginTask};
pub(crate) use descriptor::file_digest;
pub use error::{PluginError, PluginResult};
pub use manager::{ManagerConfig, PluginManager};

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Capability bitset exported by a plugin as its `type` symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const OTHER: Self = Self(0x0001);
    pub const KEYBOARD: Self = Self(0x0010);
    /// Runs on a dedicated thread instead of being updated by the host loop.
    pub const ASYNC: Self = Self(0x0100);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_async(self) -> bool {
        self.contains(Self::ASYNC)
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl BitAnd for Capabilities {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::OTHER, "OTHER"),
            (Self::KEYBOARD, "KEYBOARD"),
            (Self::ASYNC, "ASYNC"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        if names.is_empty() {
            write!(f, "Capabilities({:#06x})", self.0)
        } else {
            write!(f, "Capabilities({})", names.join(" | "))
        }
    }
}

/// Lifecycle state of one plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Unloaded,
    /// Library open, contract symbols resolved
    Loaded,
    /// `init` succeeded
    Initialized,
    /// In the registry; updated by the host loop or running on its worker
    Running,
    /// Worker stopped, about to be unloaded
    Stopped,
}

/// Snapshot of a registered plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Hash of the plugin path
    pub uuid: u64,
    /// Path the plugin was loaded from
    pub path: PathBuf,
    /// Exported capability bitset
    pub capabilities: Capabilities,
    /// Current lifecycle state
    pub state: PluginState,
    /// SHA-256 of the library file at load time, when readable
    pub digest: Option<String>,
}

impl PluginInfo {
    pub fn is_async(&self) -> bool {
        self.capabilities.is_async()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_bits_match_contract() {
        assert_eq!(Capabilities::OTHER.bits(), 0x0001);
        assert_eq!(Capabilities::KEYBOARD.bits(), 0x0010);
        assert_eq!(Capabilities::ASYNC.bits(), 0x0100);
    }

    #[test]
    fn test_capability_set_operations() {
        let caps = Capabilities::KEYBOARD | Capabilities::ASYNC;
        assert!(caps.is_async());
        assert!(caps.contains(Capabilities::KEYBOARD));
        assert!(!caps.contains(Capabilities::OTHER));
        assert_eq!(caps & Capabilities::ASYNC, Capabilities::ASYNC);
        assert!(!Capabilities::OTHER.is_async());
    }

    #[test]
    fn test_capability_debug_names_flags() {
        let caps = Capabilities::OTHER | Capabilities::ASYNC;
        assert_eq!(format!("{caps:?}"), "Capabilities(OTHER | ASYNC)");
        assert_eq!(format!("{:?}", Capabilities::NONE), "Capabilities(0x0000)");
    }

    #[test]
    fn test_unknown_bits_are_preserved() {
        let caps = Capabilities::from_bits(0x1001);
        assert!(caps.contains(Capabilities::OTHER));
        assert_eq!(caps.bits(), 0x1001);
    }
}
