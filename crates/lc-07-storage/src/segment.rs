//! Append-only block segments.
//!
//! `blocks/blkNNNNN.dat`, each record framed as magic(4) ‖ length(4, LE) ‖
//! body. Segments roll at the configured cap; records never move once
//! written, so (segment, offset, length) is a stable block location.

use crate::errors::StorageError;
use crate::BLOCK_MAGIC;
use fs2::available_space;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Minimum free disk space required before an append is attempted.
const MIN_FREE_BYTES: u64 = 64 * 1024 * 1024;

/// Manages the segment file set under `blocks/`.
pub struct SegmentStore {
    dir: PathBuf,
    segment_max: u64,
    current_segment: u32,
    current_size: u64,
}

impl SegmentStore {
    /// Open (or create) the segment directory, resuming after the highest
    /// existing segment.
    pub fn open(data_dir: &Path, segment_max: u64) -> Result<Self, StorageError> {
        let dir = data_dir.join("blocks");
        std::fs::create_dir_all(&dir)?;

        let mut highest = 0u32;
        for entry in std::fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(number) = name
                .strip_prefix("blk")
                .and_then(|rest| rest.strip_suffix(".dat"))
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                highest = highest.max(number);
            }
        }

        let current_size = std::fs::metadata(segment_path(&dir, highest))
            .map(|m| m.len())
            .unwrap_or(0);

        info!(segment = highest, size = current_size, "segment store opened");
        Ok(Self {
            dir,
            segment_max,
            current_segment: highest,
            current_size,
        })
    }

    pub fn current_segment(&self) -> u32 {
        self.current_segment
    }

    /// Append one block body; returns its stable location.
    /// The file is fsynced before the location is handed out.
    pub fn append(&mut self, body: &[u8]) -> Result<(u32, u64, u32), StorageError> {
        let record_len = (BLOCK_MAGIC.len() + 4 + body.len()) as u64;

        let free = available_space(&self.dir)?;
        if free < MIN_FREE_BYTES {
            return Err(StorageError::DiskFull { available: free });
        }

        if self.current_size + record_len > self.segment_max && self.current_size > 0 {
            self.current_segment += 1;
            self.current_size = 0;
            debug!(segment = self.current_segment, "rolled to new segment");
        }

        let path = segment_path(&self.dir, self.current_segment);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let offset = self.current_size + (BLOCK_MAGIC.len() + 4) as u64;

        file.write_all(&BLOCK_MAGIC)?;
        file.write_all(&(body.len() as u32).to_le_bytes())?;
        file.write_all(body)?;
        file.sync_data()?;

        self.current_size += record_len;
        Ok((self.current_segment, offset, body.len() as u32))
    }

    /// Read one block body back by location.
    pub fn read(&self, segment: u32, offset: u64, length: u32) -> Result<Vec<u8>, StorageError> {
        let mut file = File::open(segment_path(&self.dir, segment))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut body = vec![0u8; length as usize];
        file.read_exact(&mut body)?;
        Ok(body)
    }

    /// Iterate every record across all segments in write order, for index
    /// reconstruction. Stops cleanly at a torn tail record.
    pub fn replay(&self) -> Result<Vec<Vec<u8>>, StorageError> {
        Ok(self
            .replay_with_locations()?
            .into_iter()
            .map(|(_, _, _, body)| body)
            .collect())
    }

    /// Like [`Self::replay`], but also yields each record's stable
    /// (segment, offset, length) so an index can be rebuilt in place.
    pub fn replay_with_locations(
        &self,
    ) -> Result<Vec<(u32, u64, u32, Vec<u8>)>, StorageError> {
        let mut records = Vec::new();
        for segment in 0..=self.current_segment {
            let path = segment_path(&self.dir, segment);
            let Ok(mut file) = File::open(&path) else {
                continue;
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;

            let mut pos = 0usize;
            while pos + 8 <= data.len() {
                if data[pos..pos + 4] != BLOCK_MAGIC {
                    return Err(StorageError::IndexCorruption {
                        detail: format!("bad magic in segment {segment} at {pos}"),
                    });
                }
                let len =
                    u32::from_le_bytes(data[pos + 4..pos + 8].try_into().unwrap()) as usize;
                if pos + 8 + len > data.len() {
                    // Torn tail write: everything before it is good.
                    break;
                }
                records.push((
                    segment,
                    (pos + 8) as u64,
                    len as u32,
                    data[pos + 8..pos + 8 + len].to_vec(),
                ));
                pos += 8 + len;
            }
        }
        Ok(records)
    }
}

fn segment_path(dir: &Path, segment: u32) -> PathBuf {
    dir.join(format!("blk{segment:05}.dat"))
}
