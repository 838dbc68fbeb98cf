//! Best-effort per-frame performance output files.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Result;

/// Line-oriented performance log, one record per frame.
///
/// Writes go straight to the file so a crash loses at most one line.
#[derive(Debug)]
pub struct StatsFile {
    file: File,
}

impl StatsFile {
    /// Creates (or truncates) the output file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: File::create(path)?,
        })
    }

    /// Sender record: one line per encoded frame.
    pub fn sender_record(
        &mut self,
        frame_id: u32,
        target_bitrate: u32,
        frame_size: usize,
        frame_generation_ts: u64,
        frame_encoded_ts: u64,
    ) -> Result<()> {
        writeln!(
            self.file,
            "{frame_id},{target_bitrate},{frame_size},{frame_generation_ts},{frame_encoded_ts}"
        )?;
        Ok(())
    }

    /// Receiver record: one line per decodable (or decoded) frame.
    pub fn receiver_record(&mut self, frame_id: u32, frame_size: usize, ts: u64) -> Result<()> {
        writeln!(self.file, "{frame_id},{frame_size},{ts}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_comma_separated_lines() {
        let path = std::env::temp_dir().join(format!("vtransport-stats-{}", std::process::id()));

        let mut stats = StatsFile::create(&path).unwrap();
        stats.sender_record(0, 500, 1200, 10, 20).unwrap();
        stats.receiver_record(1, 800, 30).unwrap();
        drop(stats);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "0,500,1200,10,20\n1,800,30\n");
        std::fs::remove_file(&path).unwrap();
    }
}
