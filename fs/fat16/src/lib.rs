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

use std::io::SeekFrom;

use karst_ds::{SectorStorage, SECTOR_SIZE};
use karst_fs::{Attributes, Entry, Error, FsError, Result};
use log::error;
use zerocopy::{
    little_endian::{U16, U32},
    FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned,
};

/// FAT values at or above this mark the last cluster of a chain. 0xFFF7 (bad
/// cluster) is below the mark and never appears inside a consistent chain.
const FAT_CHAIN_END: u16 = 0xFFF8;

/// First filename byte of a slot that ends the directory.
const ENTRY_FREE: u8 = 0x00;
/// First filename byte of a deleted slot.
const ENTRY_DELETED: u8 = 0xE5;

/// The only directory path this volume resolves.
const ROOT_PATH: &str = "\\";

/// A FAT12/FAT16 boot sector. All multi-byte fields are little-endian.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BootSector {
    /// Jump instruction to boot code, 0xEB 0x?? 0x90 or 0xE9 0x?? 0x??.
    pub jump_code: [u8; 3],
    /// OEM name identifier, typically an indication of what system formatted
    /// the volume.
    pub oem_name: [u8; 8],
    /// Count of bytes per sector: 512, 1024, 2048 or 4096.
    pub bytes_per_sector: U16,
    /// Number of sectors per allocation unit. Shall be a power of 2.
    pub sectors_per_cluster: u8,
    /// Number of sectors in the reserved region, starting at the first sector
    /// of the volume. Shall not be 0.
    pub reserved_sectors: U16,
    /// The count of file allocation tables on the volume.
    pub number_of_fats: u8,
    /// Count of 32-byte entries in the root directory. The count multiplied
    /// by 32 shall be an even multiple of bytes per sector.
    pub root_dir_capacity: U16,
    /// Old 16-bit total count of sectors on the volume, covering all four
    /// regions. 0 means the 32-bit count is used instead.
    pub total_sectors_16: U16,
    pub media_descriptor: u8,
    /// Count of sectors occupied by one FAT.
    pub sectors_per_fat: U16,
    pub sectors_per_track: U16,
    pub number_of_heads: U16,
    /// Count of hidden sectors preceding the partition that contains this
    /// volume.
    pub hidden_sectors: U32,
    /// New 32-bit total count of sectors, used when the 16-bit count is 0.
    pub total_sectors_32: U32,
    pub drive_number: u8,
    pub reserved: u8,
    pub extended_boot_signature: u8,
    pub volume_serial_number: U32,
    /// Volume label, matching the volume-label entry in the root directory.
    pub volume_label: [u8; 11],
    /// Informational string, one of "FAT12   ", "FAT16   " or "FAT     ".
    /// Does not determine the FAT type.
    pub file_system_type: [u8; 8],
    pub boot_code: [u8; 448],
    /// Set to 0x55 (at byte offset 510) and 0xAA (at byte offset 511).
    pub signature: U16,
}

/// A 32-byte short-name directory entry.
#[repr(C)]
#[derive(Clone, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DirEntry {
    /// Base name, padded with spaces. The first byte doubles as the slot
    /// state: 0x00 ends the directory, 0xE5 marks a deleted slot.
    pub filename: [u8; 8],
    /// Extension, padded with spaces.
    pub extension: [u8; 3],
    pub attributes: u8,
    pub reserved: u8,
    /// Component of the creation time, in tenths of a second.
    pub creation_time_tenths: u8,
    /// Creation time with a granularity of 2 seconds.
    pub creation_time: U16,
    pub creation_date: U16,
    pub last_access_date: U16,
    /// High word of the first data cluster number. Shall be 0 on volumes
    /// formatted FAT12/FAT16.
    pub first_cluster_high: U16,
    pub modified_time: U16,
    pub modified_date: U16,
    /// Low word of the first data cluster number.
    pub first_cluster_low: U16,
    /// Size in bytes of the file described by this entry.
    pub size: U32,
}

impl DirEntry {
    /// The 8.3 name with pad spaces removed, e.g. `HELLO.TXT`. The dot is
    /// inserted only when the extension is non-blank.
    pub fn short_name(&self) -> String {
        let mut name = String::with_capacity(12);
        for &c in self.filename.iter().take_while(|&&c| c != b' ') {
            name.push(c as char);
        }
        if self.extension[0] != b' ' {
            name.push('.');
            for &c in self.extension.iter().take_while(|&&c| c != b' ') {
                name.push(c as char);
            }
        }
        name
    }

    fn to_entry(&self) -> Entry {
        Entry {
            name: self.short_name(),
            size: self.size.get(),
            attributes: Attributes::from(self.attributes),
        }
    }
}

/// A decoded FAT16 volume. All regions are read eagerly at open, so the
/// volume does not hold on to the storage it was decoded from.
pub struct Volume {
    boot_sector: BootSector,
    fat: Vec<U16>,
    root_directory: Vec<DirEntry>,
    data_area: Vec<u8>,

    bytes_per_cluster: usize,
    cluster_count: u32,
}

impl Volume {
    /// Decodes the FAT16 volume starting at `first_sector` of `storage`.
    /// Region offsets inside the volume are relative to `first_sector`.
    pub fn open<DS: SectorStorage>(storage: &DS, first_sector: u64) -> Result<Self> {
        let mut boot_sector = BootSector::new_zeroed();
        storage.read_sectors(first_sector, boot_sector.as_mut_bytes())?;

        let signature = boot_sector.signature.get();
        if signature != 0xAA55 {
            error!("Boot sector signature ({signature:#06X}) shall be 0xAA55");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let bytes_per_sector = boot_sector.bytes_per_sector.get() as usize;
        if bytes_per_sector != SECTOR_SIZE {
            error!("Bytes per sector ({bytes_per_sector}) shall be {SECTOR_SIZE}");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let sectors_per_cluster = boot_sector.sectors_per_cluster;
        if !sectors_per_cluster.is_power_of_two() {
            error!("Sectors per cluster ({sectors_per_cluster}) shall be a power of 2");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let number_of_fats = boot_sector.number_of_fats;
        if number_of_fats != 2 {
            error!("Number of FATs ({number_of_fats}) shall be 2");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let root_directory_length =
            boot_sector.root_dir_capacity.get() as usize * size_of::<DirEntry>();
        if root_directory_length % bytes_per_sector != 0 {
            error!("Root directory length ({root_directory_length}) shall be an even multiple of bytes per sector ({bytes_per_sector})");
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let reserved_sectors = boot_sector.reserved_sectors.get() as u64;
        let sectors_per_fat = boot_sector.sectors_per_fat.get() as u64;
        let fat_length = sectors_per_fat as usize * bytes_per_sector;
        let mut primary_fat = alloc_buffer(fat_length)?;
        storage.read_sectors(first_sector + reserved_sectors, &mut primary_fat)?;
        let mut secondary_fat = alloc_buffer(fat_length)?;
        storage.read_sectors(
            first_sector + reserved_sectors + sectors_per_fat,
            &mut secondary_fat,
        )?;
        if primary_fat != secondary_fat {
            error!("FAT copies shall be identical");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let fat = <[U16]>::ref_from_bytes(&primary_fat)
            .map_err(|_| Error::Fs(FsError::Inconsistent))?
            .to_vec();

        let root_directory_sector = reserved_sectors + 2 * sectors_per_fat;
        let root_directory_sectors = (root_directory_length / bytes_per_sector) as u64;
        let mut root_directory_buffer = alloc_buffer(root_directory_length)?;
        storage.read_sectors(
            first_sector + root_directory_sector,
            &mut root_directory_buffer,
        )?;
        let root_directory = <[DirEntry]>::ref_from_bytes(&root_directory_buffer)
            .map_err(|_| Error::Fs(FsError::Inconsistent))?
            .to_vec();

        let data_sector = root_directory_sector + root_directory_sectors;
        let total_sectors = if boot_sector.total_sectors_16.get() != 0 {
            boot_sector.total_sectors_16.get() as u64
        } else {
            boot_sector.total_sectors_32.get() as u64
        };
        if data_sector >= total_sectors {
            error!("Data area start ({data_sector}) shall be within the volume ({total_sectors} sectors)");
            return Err(Error::Fs(FsError::Inconsistent));
        }
        let data_sectors = total_sectors - data_sector;
        let mut data_area = alloc_buffer(data_sectors as usize * bytes_per_sector)?;
        storage.read_sectors(first_sector + data_sector, &mut data_area)?;

        let cluster_count = (data_sectors / sectors_per_cluster as u64) as u32;

        Ok(Self {
            boot_sector,
            fat,
            root_directory,
            data_area,
            bytes_per_cluster: sectors_per_cluster as usize * bytes_per_sector,
            cluster_count,
        })
    }

    /// Opens a directory for enumeration. Only the root path `"\\"` resolves;
    /// this volume format has no nested directory support.
    pub fn open_dir(&self, path: &str) -> Result<RootDir<'_>> {
        if path != ROOT_PATH {
            return Err(Error::NotFound);
        }

        Ok(RootDir {
            entries: &self.root_directory,
            position: 0,
        })
    }

    /// Looks up `name` in the root directory and materialises the file's
    /// bytes. An exhaustive scan without a match is `Ok(None)`, not an error.
    pub fn open_file(&self, name: &str) -> Result<Option<FileReader>> {
        for entry in &self.root_directory {
            if matches!(entry.filename[0], ENTRY_FREE | ENTRY_DELETED) {
                continue;
            }
            if entry.short_name() != name {
                continue;
            }
            if entry.attributes & (Attributes::DIRECTORY | Attributes::VOLUME_LABEL) != 0 {
                return Err(Error::Fs(FsError::IsDirectory));
            }

            let data = self.read_chain(entry)?;
            return Ok(Some(FileReader {
                entry: entry.clone(),
                data,
                position: 0,
            }));
        }

        Ok(None)
    }

    /// The raw boot sector the volume was decoded from.
    pub fn boot_sector(&self) -> &BootSector {
        &self.boot_sector
    }

    pub fn volume_label(&self) -> &[u8; 11] {
        &self.boot_sector.volume_label
    }

    pub fn serial_number(&self) -> u32 {
        self.boot_sector.volume_serial_number.get()
    }

    pub fn bytes_per_cluster(&self) -> usize {
        self.bytes_per_cluster
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    /// Concatenates the cluster chain of `entry` into a `size`-byte buffer.
    /// The last cluster of the chain contributes the tail when the size is
    /// not cluster-aligned and a whole cluster otherwise.
    fn read_chain(&self, entry: &DirEntry) -> Result<Vec<u8>> {
        let size = entry.size.get() as usize;
        let mut data = alloc_buffer(size)?;
        if size == 0 {
            return Ok(data);
        }

        let bytes_per_cluster = self.bytes_per_cluster;
        let tail = size % bytes_per_cluster;
        // The high first-cluster word is always 0 on FAT16.
        let mut cluster = entry.first_cluster_low.get();
        let mut filled = 0;
        loop {
            let content = self.cluster_content(cluster)?;
            let next = match self.fat.get(cluster as usize) {
                Some(next) => next.get(),
                None => {
                    error!("Cluster index ({cluster}) shall have a FAT entry");
                    return Err(Error::Fs(FsError::Inconsistent));
                }
            };
            if next >= FAT_CHAIN_END {
                let last = if tail > 0 { tail } else { bytes_per_cluster };
                if filled + last != size {
                    error!(
                        "Cluster chain length ({}) shall match the recorded size ({size})",
                        filled + last
                    );
                    return Err(Error::Fs(FsError::Inconsistent));
                }
                data[filled..].copy_from_slice(&content[..last]);
                return Ok(data);
            }
            if filled + bytes_per_cluster > size {
                error!("Cluster chain shall not exceed the recorded size ({size})");
                return Err(Error::Fs(FsError::Inconsistent));
            }
            data[filled..filled + bytes_per_cluster].copy_from_slice(content);
            filled += bytes_per_cluster;
            cluster = next;
        }
    }

    fn cluster_content(&self, cluster: u16) -> Result<&[u8]> {
        if cluster < 2 || (cluster as u32 - 2) >= self.cluster_count {
            error!(
                "Cluster index ({cluster}) shall address one of the {} data clusters",
                self.cluster_count
            );
            return Err(Error::Fs(FsError::Inconsistent));
        }

        let offset = (cluster as usize - 2) * self.bytes_per_cluster;
        Ok(&self.data_area[offset..offset + self.bytes_per_cluster])
    }
}

/// A cursor over the visible entries of the root directory. Deleted slots and
/// the volume label are skipped; the first free slot ends the enumeration for
/// good.
pub struct RootDir<'volume> {
    entries: &'volume [DirEntry],
    position: usize,
}

impl Iterator for RootDir<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        while self.position < self.entries.len() {
            let entry = &self.entries[self.position];
            self.position += 1;
            match entry.filename[0] {
                ENTRY_FREE => {
                    self.position = self.entries.len();
                    return None;
                }
                ENTRY_DELETED => continue,
                _ => {}
            }
            if Attributes::from(entry.attributes).is_volume_label() {
                continue;
            }

            return Some(entry.to_entry());
        }

        None
    }
}

/// A byte stream over one file, materialised from the cluster chain at open.
/// Holds its own copy of the directory entry and the data, so it stays usable
/// after the volume is dropped.
pub struct FileReader {
    entry: DirEntry,
    data: Vec<u8>,
    position: usize,
}

impl FileReader {
    pub fn size(&self) -> u32 {
        self.entry.size.get()
    }

    pub fn position(&self) -> u64 {
        self.position as u64
    }

    pub fn metadata(&self) -> Entry {
        self.entry.to_entry()
    }

    /// Copies up to `buffer.len()` bytes at the cursor and returns the number
    /// of bytes copied. 0 means the cursor is at the end of the file.
    pub fn read(&mut self, buffer: &mut [u8]) -> usize {
        self.read_records(buffer, 1)
    }

    /// Copies up to `buffer.len() / record_size` whole records at the cursor
    /// and returns the number of complete records copied. When fewer bytes
    /// remain than requested, the remaining bytes are all copied but only the
    /// complete records among them are counted.
    pub fn read_records(&mut self, buffer: &mut [u8], record_size: usize) -> usize {
        if record_size == 0 {
            return 0;
        }

        let records = buffer.len() / record_size;
        let requested = records * record_size;
        let remaining = self.data.len() - self.position;
        if requested <= remaining {
            buffer[..requested].copy_from_slice(&self.data[self.position..][..requested]);
            self.position += requested;
            records
        } else {
            buffer[..remaining].copy_from_slice(&self.data[self.position..]);
            self.position = self.data.len();
            remaining / record_size
        }
    }

    /// Moves the cursor. The target shall land within `[0, size]`; seeking
    /// forward from the end is rejected as an invalid argument.
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        let size = self.data.len();
        let target = match position {
            SeekFrom::Start(offset) => {
                if offset > size as u64 {
                    return Err(Error::Fs(FsError::OutOfBounds));
                }
                offset as usize
            }
            SeekFrom::Current(offset) => match (self.position as i64).checked_add(offset) {
                Some(target) if (0..=size as i64).contains(&target) => target as usize,
                _ => return Err(Error::Fs(FsError::OutOfBounds)),
            },
            SeekFrom::End(offset) => {
                if offset > 0 {
                    return Err(Error::InvalidArgument);
                }
                if offset.unsigned_abs() > size as u64 {
                    return Err(Error::Fs(FsError::OutOfBounds));
                }
                size - offset.unsigned_abs() as usize
            }
        };
        self.position = target;

        Ok(target as u64)
    }
}

fn alloc_buffer(length: usize) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(length)
        .map_err(|_| Error::OutOfMemory)?;
    buffer.resize(length, 0);

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_disk_layout() {
        assert_eq!(size_of::<BootSector>(), SECTOR_SIZE);
        assert_eq!(size_of::<DirEntry>(), 32);
    }

    fn entry_named(filename: &[u8; 8], extension: &[u8; 3]) -> DirEntry {
        let mut entry = DirEntry::new_zeroed();
        entry.filename = *filename;
        entry.extension = *extension;
        entry
    }

    #[test]
    fn short_name_with_extension() {
        assert_eq!(entry_named(b"HELLO   ", b"TXT").short_name(), "HELLO.TXT");
    }

    #[test]
    fn short_name_without_extension() {
        assert_eq!(entry_named(b"KERNEL  ", b"   ").short_name(), "KERNEL");
    }

    #[test]
    fn short_name_full_width() {
        assert_eq!(entry_named(b"ABCDEFGH", b"IJK").short_name(), "ABCDEFGH.IJK");
    }
}
