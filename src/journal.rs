use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// First bytes of every journal file.
const MAGIC: &[u8; 8] = b"TRNJRNL1";

/// Encode a single event to `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or partial EOF.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of reading a journal back from disk.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte offset just past the last intact entry.
    pub valid_len: u64,
    /// Whether anything after `valid_len` was discarded.
    pub truncated: bool,
}

/// Append-only event journal.
///
/// Layout: an 8-byte magic header, then entries of
/// `[u32 LE: len][bincode: Event][u32 LE: crc32 of payload]`.
/// A torn or corrupt tail (crash mid-write) ends replay; `open` cuts the
/// file back to the last intact entry so new appends follow valid data.
pub struct Journal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Journal {
    /// Open (or create) the journal at `path`, repairing a torn tail.
    /// Returns the journal together with the events already in it.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new().create(true).write(true).truncate(false).open(path)?;
        let len = file.metadata()?.len();
        if replay.valid_len == 0 {
            // Brand new, or the header itself was torn on first start.
            if len > 0 {
                tracing::warn!(path = %path.display(), bytes = len, "rewriting torn journal header");
                file.set_len(0)?;
            }
            (&file).write_all(MAGIC)?;
            file.sync_all()?;
        } else if replay.truncated {
            tracing::warn!(
                path = %path.display(),
                kept = replay.valid_len,
                dropped = len - replay.valid_len,
                "truncating torn journal tail"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        drop(file);

        let file = OpenOptions::new().append(true).open(path)?;
        let journal = Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            // Replayed history counts toward the next compaction.
            appends_since_compact: replay.events.len() as u64,
        };
        Ok((journal, replay.events))
    }

    /// Buffer one event. Nothing is durable until [`Journal::flush_sync`].
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered events and fsync.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn snapshot_path(path: &Path) -> PathBuf {
        path.with_extension("journal.tmp")
    }

    /// Write a full snapshot to a side file and fsync it. Slow; does not touch the live journal.
    pub fn write_snapshot(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::snapshot_path(path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the journal and continue appending to it.
    pub fn swap_snapshot(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::snapshot_path(&self.path), &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read every intact event. A missing file replays as empty.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        if file_len == 0 {
            return Ok(Replay::default());
        }
        let mut reader = BufReader::new(file);

        if file_len < MAGIC.len() as u64 {
            let mut head = Vec::new();
            reader.read_to_end(&mut head)?;
            if MAGIC.starts_with(&head) {
                return Ok(Replay {
                    truncated: true,
                    ..Replay::default()
                });
            }
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a turnero journal"));
        }

        let mut magic = [0u8; 8];
        if !read_full(&mut reader, &mut magic)? || &magic != MAGIC {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a turnero journal"));
        }

        let mut replay = Replay {
            valid_len: MAGIC.len() as u64,
            ..Replay::default()
        };
        loop {
            let mut len_buf = [0u8; 4];
            if !read_full(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;
            if replay.valid_len + 8 + len as u64 > file_len {
                break;
            }
            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_full(&mut reader, &mut payload)? || !read_full(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(offset = replay.valid_len, "journal checksum mismatch, stopping replay");
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => replay.events.push(event),
                Err(e) => {
                    tracing::warn!(offset = replay.valid_len, "undecodable journal entry: {e}");
                    break;
                }
            }
            replay.valid_len += 8 + len as u64;
        }
        replay.truncated = replay.valid_len < file_len;
        Ok(replay)
    }
}
