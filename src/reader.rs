//! Streaming records out of one byte range of the input.
//!
//! A chunk `[start, end)` owns every record whose first byte lies in
//! `(start, end]`, or `[0, end]` for the first chunk. The reader keeps going
//! past `end` until it has consumed a newline at an offset `>= end`; the next
//! chunk discards the same bytes with [`ChunkReader::skip_partial_leading_record`].

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
};

use memchr::{memchr, memchr2};

use crate::error::{Error, MalformedKind, Result};
use crate::fixed::parse_tenths;

/// Upper bound on a single read once the reader has passed its end offset and
/// is only finishing the straddling record.
pub const OVERRUN_WINDOW: usize = 128;

/// One line of input, borrowed from the reader's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub key: &'a [u8],
    /// Value in tenths.
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingKey,
    ReadingValue,
}

pub struct ChunkReader<R> {
    source: R,
    buf: Box<[u8]>,
    /// Next unread byte in `buf`.
    pos: usize,
    /// Number of valid bytes in `buf`.
    len: usize,
    /// File offset of `buf[0]`.
    base: u64,
    /// Start of the record in progress. Everything from here on survives a refill.
    mark: usize,
    end: Option<u64>,
    delivered: u64,
    done: bool,
}

impl ChunkReader<File> {
    /// Opens `path` with its own cursor positioned at `start`.
    pub fn open(path: &Path, start: u64, end: Option<u64>, buffer_size: usize) -> Result<Self> {
        let mut file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        file.seek(SeekFrom::Start(start))?;
        Ok(Self::new(file, start, end, buffer_size))
    }
}

impl<R: Read> ChunkReader<R> {
    /// `source` must already be positioned at `start`. `end == None` reads to
    /// end of file.
    pub fn new(source: R, start: u64, end: Option<u64>, buffer_size: usize) -> Self {
        Self {
            source,
            buf: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
            pos: 0,
            len: 0,
            base: start,
            mark: 0,
            end,
            delivered: 0,
            done: false,
        }
    }

    /// File offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Bytes handed out so far, skipped bytes included.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_exhausted(&self) -> bool {
        self.done
    }

    fn ends_chunk(&self, newline: u64) -> bool {
        matches!(self.end, Some(end) if newline >= end)
    }

    /// Shifts the record in progress to the front of the buffer and reads more
    /// bytes behind it. Returns `false` at end of file.
    fn refill(&mut self) -> Result<bool> {
        if self.mark > 0 {
            self.buf.copy_within(self.mark..self.len, 0);
            self.base += self.mark as u64;
            self.pos -= self.mark;
            self.len -= self.mark;
            self.mark = 0;
        }

        let free = self.buf.len() - self.len;
        if free == 0 {
            return Err(Error::malformed(
                self.base,
                MalformedKind::RecordTooLong {
                    capacity: self.buf.len(),
                },
            ));
        }

        let tail = self.base + self.len as u64;
        let want = match self.end {
            // Read up to and including the byte at `end`.
            Some(end) if tail <= end => {
                free.min(usize::try_from(end - tail + 1).unwrap_or(usize::MAX))
            }
            Some(_) => free.min(OVERRUN_WINDOW),
            None => free,
        };

        let read = loop {
            match self.source.read(&mut self.buf[self.len..self.len + want]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };

        if read == 0 {
            if let Some(end) = self.end {
                if tail < end {
                    return Err(Error::NoProgress {
                        offset: tail,
                        expected_end: end,
                    });
                }
            }
            return Ok(false);
        }

        self.len += read;
        Ok(true)
    }

    #[inline(always)]
    fn advance(&mut self) -> Result<Option<u8>> {
        if self.pos == self.len && !self.refill()? {
            return Ok(None);
        }
        let byte = self.buf[self.pos];
        self.pos += 1;
        self.delivered += 1;
        Ok(Some(byte))
    }

    /// Next raw byte of `[start, end)`, or `None` once the range or the input
    /// is exhausted. Bytes read this way are not retained across refills.
    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        if self.done {
            return Ok(None);
        }
        if matches!(self.end, Some(end) if self.offset() >= end) {
            self.done = true;
            return Ok(None);
        }
        self.mark = self.pos;
        self.advance()
    }

    /// Discards everything up to and including the first newline.
    pub fn skip_partial_leading_record(&mut self) -> Result<()> {
        loop {
            if self.pos == self.len && !self.refill()? {
                self.done = true;
                return Ok(());
            }

            match memchr(b'\n', &self.buf[self.pos..self.len]) {
                Some(i) => {
                    let newline = self.base + (self.pos + i) as u64;
                    self.pos += i + 1;
                    self.mark = self.pos;
                    self.delivered += (i + 1) as u64;
                    self.done = self.ends_chunk(newline);
                    return Ok(());
                }
                None => {
                    self.delivered += (self.len - self.pos) as u64;
                    self.pos = self.len;
                    self.mark = self.pos;
                }
            }
        }
    }

    /// Reads the next complete record of this chunk.
    pub fn next_record(&mut self) -> Result<Option<Record<'_>>> {
        if self.done {
            return Ok(None);
        }

        self.mark = self.pos;
        let mut state = State::ReadingKey;
        // Offset of the ';' relative to `mark`, which refills keep stable.
        let mut delimiter = 0;

        loop {
            if self.pos == self.len && !self.refill()? {
                return self.finish(state, delimiter);
            }

            // Only the bytes that can change state are looked at. A stray ';'
            // inside the value is left for the number parser to reject.
            let window = &self.buf[self.pos..self.len];
            let found = match state {
                State::ReadingKey => memchr2(b';', b'\n', window),
                State::ReadingValue => memchr(b'\n', window),
            };
            let Some(i) = found else {
                self.delivered += window.len() as u64;
                self.pos = self.len;
                continue;
            };

            let at = self.pos + i;
            self.pos = at + 1;
            self.delivered += (i + 1) as u64;

            match (state, self.buf[at]) {
                (State::ReadingKey, b';') => {
                    delimiter = at - self.mark;
                    state = State::ReadingValue;
                }
                (State::ReadingKey, _) => {
                    return Err(Error::malformed(
                        self.base + at as u64,
                        MalformedKind::MissingDelimiter,
                    ));
                }
                (State::ReadingValue, _) => {
                    self.done = self.ends_chunk(self.base + at as u64);
                    return self.emit(delimiter, at).map(Some);
                }
            }
        }
    }

    fn finish(&mut self, state: State, delimiter: usize) -> Result<Option<Record<'_>>> {
        self.done = true;
        match state {
            State::ReadingValue => self.emit(delimiter, self.len).map(Some),
            State::ReadingKey if self.pos == self.mark => Ok(None),
            State::ReadingKey => Err(Error::malformed(
                self.offset(),
                MalformedKind::MissingDelimiter,
            )),
        }
    }

    fn emit(&self, delimiter: usize, value_end: usize) -> Result<Record<'_>> {
        let key_end = self.mark + delimiter;
        if delimiter == 0 {
            return Err(Error::malformed(
                self.base + self.mark as u64,
                MalformedKind::EmptyKey,
            ));
        }

        let value_start = key_end + 1;
        let value = parse_tenths(&self.buf[value_start..value_end]).map_err(|e| {
            Error::malformed(self.base + (value_start + e.index) as u64, e.kind)
        })?;

        Ok(Record {
            key: &self.buf[self.mark..key_end],
            value,
        })
    }
}
