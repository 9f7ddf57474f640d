//! Open flags and the copy-on-write open routing.

use crate::resolver::Resolution;

/// `access()` mode bits.
pub const F_OK: u32 = 0;
pub const X_OK: u32 = 1;
pub const W_OK: u32 = 2;
pub const R_OK: u32 = 4;

/// Open flags, host-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    /// `"r"`: read-only.
    pub fn read_only() -> Self {
        Self {
            read: true,
            write: false,
            append: false,
            create: false,
            truncate: false,
        }
    }

    /// `"w"`: write, create, truncate.
    pub fn write_only() -> Self {
        Self {
            read: false,
            write: true,
            append: false,
            create: true,
            truncate: true,
        }
    }

    /// `"a"`: append, create.
    pub fn append_only() -> Self {
        Self {
            read: false,
            write: false,
            append: true,
            create: true,
            truncate: false,
        }
    }

    /// Parse a host-style mode string (`r`, `r+`, `w`, `w+`, `a`, `a+`).
    pub fn from_mode_str(mode: &str) -> Option<Self> {
        match mode {
            "r" => Some(Self::read_only()),
            "r+" => Some(Self {
                read: true,
                write: true,
                append: false,
                create: false,
                truncate: false,
            }),
            "w" => Some(Self::write_only()),
            "w+" => Some(Self {
                read: true,
                ..Self::write_only()
            }),
            "a" => Some(Self::append_only()),
            "a+" => Some(Self {
                read: true,
                ..Self::append_only()
            }),
            _ => None,
        }
    }

    /// Whether the flags request no mutation at all.
    pub fn is_read_only(&self) -> bool {
        self.read && !self.write && !self.append && !self.create && !self.truncate
    }

    /// The same flags with truncation removed. Used when opening a freshly
    /// materialized copy, whose bytes are the file's initial content.
    pub(crate) fn without_truncate(&self) -> Self {
        Self {
            truncate: false,
            ..*self
        }
    }

    pub(crate) fn to_open_options(self) -> std::fs::OpenOptions {
        let mut options: std::fs::OpenOptions = std::fs::OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .append(self.append)
            .create(self.create || self.append)
            .truncate(self.truncate);
        options
    }
}

/// The four outcomes of an open through the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenRoute {
    /// Read-only open of a map file: open the cache path directly.
    MapRead,
    /// Mutating open of a map file: materialize, then open the real path.
    MapMaterialize,
    /// Read on an untracked path: real filesystem.
    RealRead,
    /// Write on an untracked path: real filesystem.
    RealWrite,
}

/// Why a resolution admits no open route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenDenied {
    /// Missing inside the dependency domain.
    Missing,
    /// The entry is a directory.
    IsDirectory,
}

/// Compute the open route for a resolution and flags.
pub(crate) fn open_route(
    resolution: &Resolution<'_>,
    flags: &OpenFlags,
) -> Result<OpenRoute, OpenDenied> {
    match resolution {
        Resolution::Untracked => Ok(if flags.is_read_only() {
            OpenRoute::RealRead
        } else {
            OpenRoute::RealWrite
        }),
        Resolution::Missing => Err(OpenDenied::Missing),
        Resolution::Dir(_) => Err(OpenDenied::IsDirectory),
        Resolution::File(_) => Ok(if flags.is_read_only() {
            OpenRoute::MapRead
        } else {
            OpenRoute::MapMaterialize
        }),
    }
}
