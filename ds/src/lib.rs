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

/// Size of one sector in bytes. Sector addressing is fixed at 512 bytes
/// regardless of what a filesystem's own metadata claims; a volume whose
/// logical sector size disagrees is rejected by the filesystem layer.
pub const SECTOR_SIZE: usize = 512;

pub trait SectorStorage {
    /// Reads `buffer.len() / SECTOR_SIZE` contiguous sectors starting at
    /// `first_sector` into `buffer`. The buffer length shall be a whole
    /// multiple of [`SECTOR_SIZE`]; there is no partial-sector IO. A short
    /// read is an error, never a partial success.
    fn read_sectors(&self, first_sector: u64, buffer: &mut [u8]) -> Result<()>;
}
