//! File event masks and translation from backend notifications

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind, RenameMode};

/// Bitmask describing a file change. Also used as a callback subscription mask.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileEvent(u32);

impl FileEvent {
    pub const NONE: Self = Self(0);
    /// The entry is a directory
    pub const DIRECTORY: Self = Self(0x0001);
    pub const ADDED: Self = Self(0x0010);
    pub const REMOVED: Self = Self(0x0100);
    /// Closed after being written
    pub const MODIFIED: Self = Self(0x1000);
    pub const ALL: Self = Self(0x1111);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_directory(self) -> bool {
        self.contains(Self::DIRECTORY)
    }

    /// Map a backend event kind onto a mask.
    ///
    /// Returns [`FileEvent::NONE`] for kinds the watcher does not report.
    /// The directory bit is set from the kind itself or from `is_directory`.
    pub fn translate(kind: &EventKind, is_directory: bool) -> Self {
        let (base, folder) = match kind {
            EventKind::Create(CreateKind::Folder) => (Self::ADDED, true),
            EventKind::Create(_) => (Self::ADDED, false),
            EventKind::Remove(RemoveKind::Folder) => (Self::REMOVED, true),
            EventKind::Remove(_) => (Self::REMOVED, false),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => (Self::ADDED, false),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => (Self::REMOVED, false),
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => (Self::MODIFIED, false),
            // inotify reports close-after-write; elsewhere data changes are all we get.
            #[cfg(not(target_os = "linux"))]
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => (Self::MODIFIED, false),
            _ => return Self::NONE,
        };

        if folder || is_directory {
            base | Self::DIRECTORY
        } else {
            base
        }
    }
}

impl BitOr for FileEvent {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FileEvent {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FileEvent {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::DIRECTORY, "DIRECTORY"),
            (Self::ADDED, "ADDED"),
            (Self::REMOVED, "REMOVED"),
            (Self::MODIFIED, "MODIFIED"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();

        if names.is_empty() {
            write!(f, "FileEvent(NONE)")
        } else {
            write!(f, "FileEvent({})", names.join(" | "))
        }
    }
}

/// A translated change, as delivered to callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: FileEvent,
    /// Full path of the changed entry
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: FileEvent, path: PathBuf) -> Self {
        Self { kind, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, MetadataKind};

    #[test]
    fn test_created_subdirectory_is_added_directory() {
        let kind = EventKind::Create(CreateKind::Folder);
        assert_eq!(
            FileEvent::translate(&kind, false),
            FileEvent::ADDED | FileEvent::DIRECTORY
        );
    }

    #[test]
    fn test_close_write_is_exactly_modified() {
        let kind = EventKind::Access(AccessKind::Close(AccessMode::Write));
        assert_eq!(FileEvent::translate(&kind, false), FileEvent::MODIFIED);
    }

    #[test]
    fn test_renames_map_to_added_and_removed() {
        let to = EventKind::Modify(ModifyKind::Name(RenameMode::To));
        let from = EventKind::Modify(ModifyKind::Name(RenameMode::From));
        assert_eq!(FileEvent::translate(&to, false), FileEvent::ADDED);
        assert_eq!(
            FileEvent::translate(&from, true),
            FileEvent::REMOVED | FileEvent::DIRECTORY
        );
    }

    #[test]
    fn test_file_removal() {
        let kind = EventKind::Remove(RemoveKind::File);
        assert_eq!(FileEvent::translate(&kind, false), FileEvent::REMOVED);
    }

    #[test]
    fn test_unreported_kinds_are_none() {
        let kinds = [
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            EventKind::Access(AccessKind::Open(AccessMode::Any)),
            EventKind::Other,
        ];
        for kind in kinds {
            assert!(FileEvent::translate(&kind, false).is_empty(), "{kind:?}");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_raw_data_change_is_ignored_on_linux() {
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert!(FileEvent::translate(&kind, false).is_empty());
    }

    #[test]
    fn test_mask_intersection() {
        let mask = FileEvent::ADDED | FileEvent::MODIFIED;
        assert!(mask.intersects(FileEvent::ADDED | FileEvent::DIRECTORY));
        assert!(!mask.intersects(FileEvent::REMOVED));
        assert_eq!(format!("{mask:?}"), "FileEvent(ADDED | MODIFIED)");
    }

    #[test]
    fn test_watch_event_file_name() {
        let event = WatchEvent::new(FileEvent::ADDED, PathBuf::from("/tmp/plugins/x.mod"));
        assert_eq!(event.file_name(), "x.mod");
        assert!(!event.is_directory());
    }
}
