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

use std::{fs::File, os::unix::fs::FileExt, path::Path};

use karst_ds::{Error, IoError, Result, SectorStorage, SECTOR_SIZE};
use log::error;

/// A volume image backed by a regular file. The image length shall be a whole
/// multiple of [`SECTOR_SIZE`]; reads past the end of the image fail instead
/// of returning fewer sectors than requested.
pub struct DiskImage {
    file: File,
}

impl DiskImage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|error| {
            error!("Opening {} failed: {error}", path.as_ref().display());
            Error::NotFound
        })?;

        Ok(Self { file })
    }
}

impl SectorStorage for DiskImage {
    fn read_sectors(&self, first_sector: u64, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() % SECTOR_SIZE != 0 {
            return Err(Error::InvalidArgument);
        }

        self.file
            .read_exact_at(buffer, first_sector * SECTOR_SIZE as u64)
            .map_err(|error| {
                error!(
                    "Reading {} sectors at sector {first_sector} failed: {error}",
                    buffer.len() / SECTOR_SIZE
                );
                Error::Io(IoError::OutOfRange)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn image_with(tag: &str, sectors: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("karst-ds-std-{}-{tag}.img", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(sectors).unwrap();
        path
    }

    #[test]
    fn reads_sectors_at_offset() {
        let mut content = vec![0u8; 3 * SECTOR_SIZE];
        content[SECTOR_SIZE] = 0xAB;
        content[2 * SECTOR_SIZE - 1] = 0xCD;
        let path = image_with("offset", &content);

        let image = DiskImage::open(&path).unwrap();
        let mut buffer = [0u8; SECTOR_SIZE];
        image.read_sectors(1, &mut buffer).unwrap();
        assert_eq!(buffer[0], 0xAB);
        assert_eq!(buffer[SECTOR_SIZE - 1], 0xCD);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn short_read_is_out_of_range() {
        let path = image_with("short", &[0u8; SECTOR_SIZE]);

        let image = DiskImage::open(&path).unwrap();
        let mut buffer = [0u8; 2 * SECTOR_SIZE];
        assert!(matches!(
            image.read_sectors(0, &mut buffer),
            Err(Error::Io(IoError::OutOfRange))
        ));
        assert!(matches!(
            image.read_sectors(1, &mut buffer[..SECTOR_SIZE]),
            Err(Error::Io(IoError::OutOfRange))
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn unaligned_buffer_is_rejected() {
        let path = image_with("unaligned", &[0u8; SECTOR_SIZE]);

        let image = DiskImage::open(&path).unwrap();
        let mut buffer = [0u8; 100];
        assert!(matches!(
            image.read_sectors(0, &mut buffer),
            Err(Error::InvalidArgument)
        ));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_image_is_not_found() {
        assert!(matches!(
            DiskImage::open("/nonexistent/volume.img"),
            Err(Error::NotFound)
        ));
    }
}
