// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub use karst_err::*;

/// Attribute byte of a directory entry. Legal attribute bits are as defined
/// below:
///
/// ATTR_READ_ONLY 0x01
/// ATTR_HIDDEN 0x02
/// ATTR_SYSTEM 0x04
/// ATTR_VOLUME_ID 0x08
/// ATTR_DIRECTORY 0x10
/// ATTR_ARCHIVE 0x20
///
/// The upper two bits are reserved and are not interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Attributes(u8);

impl Attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_LABEL: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;

    pub fn is_read_only(&self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.0 & Self::HIDDEN != 0
    }

    pub fn is_system(&self) -> bool {
        self.0 & Self::SYSTEM != 0
    }

    pub fn is_volume_label(&self) -> bool {
        self.0 & Self::VOLUME_LABEL != 0
    }

    pub fn is_directory(&self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    pub fn is_archive(&self) -> bool {
        self.0 & Self::ARCHIVE != 0
    }
}

impl From<u8> for Attributes {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

/// A normalised directory entry as presented to callers.
#[derive(Clone, Debug)]
pub struct Entry {
    /// 8.3 name with pad spaces removed and the dot inserted only when the
    /// extension is non-blank, e.g. `HELLO.TXT` or `KERNEL`.
    pub name: String,
    /// Size in bytes; meaningful only for regular files.
    pub size: u32,
    pub attributes: Attributes,
}
