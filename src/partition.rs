use std::io::{self, Read, Seek, SeekFrom};

use log::trace;

use crate::buffer::ByteWindow;
use crate::error::{Error, ErrorKind, Result};
use crate::matcher::LineEndMatcher;

const LOOKBEHIND_CHUNK: usize = 512;

/// Where a worker starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartPosition {
    /// Index of the file in the ordered file set.
    pub file_index: usize,
    /// Byte offset within this file.
    pub offset: u64,
    /// Whether the worker may have landed in the middle of a line, which
    /// must then be left to the previous worker.
    pub skip_partial_line: bool,
}

/// Byte range of the whole file set assigned to one worker.
///
/// A plan is a pure function of the ordered file sizes and of the worker
/// ordinal and count, so that every worker can compute its own without
/// coordinating with the others. A worker owns every row whose first byte
/// lies in `[range_start, range_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub total_size: u64,
    pub block_size: u64,
    pub range_start: u64,
    pub range_end: u64,
    /// `None` when the range starts past the end of the file set, in which
    /// case the worker has nothing to read.
    pub start: Option<StartPosition>,
}

impl PartitionPlan {
    /// Compute the plan of worker `worker` out of `workers`, for files of
    /// the given sizes. Range boundaries are aligned down to `unit` bytes,
    /// i.e. the width of a code unit of the encoding.
    pub fn compute(sizes: &[u64], worker: usize, workers: usize, unit: usize) -> Result<Self> {
        if workers == 0 || worker >= workers {
            return Err(Error::new(ErrorKind::InvalidWorker {
                ordinal: worker,
                count: workers,
            }));
        }

        let unit = unit.max(1) as u64;
        let total_size: u64 = sizes.iter().sum();

        // Rounds half up
        let n = workers as u128;
        let block_size = ((2 * total_size as u128 + n) / (2 * n)) as u64;

        let boundary =
            |ordinal: usize| Self::align(sizes, block_size.saturating_mul(ordinal as u64), unit);

        let range_start = boundary(worker);
        let range_end = if worker + 1 == workers {
            range_start.max(total_size)
        } else {
            boundary(worker + 1)
        };

        Ok(Self {
            total_size,
            block_size,
            range_start,
            range_end,
            start: Self::locate(sizes, range_start),
        })
    }

    /// Plan reading the whole file set at once.
    pub fn whole(sizes: &[u64]) -> Self {
        let total_size = sizes.iter().sum();

        Self {
            total_size,
            block_size: total_size,
            range_start: 0,
            range_end: total_size,
            start: Self::locate(sizes, 0),
        }
    }

    /// Align a position of the file set down to a code unit boundary of the
    /// file holding it.
    fn align(sizes: &[u64], position: u64, unit: u64) -> u64 {
        let mut cumulative = 0;

        for size in sizes.iter().copied() {
            if position < cumulative + size {
                let offset = position - cumulative;
                return cumulative + offset - offset % unit;
            }

            cumulative += size;
        }

        position
    }

    fn locate(sizes: &[u64], position: u64) -> Option<StartPosition> {
        let mut cumulative = 0;

        for (file_index, size) in sizes.iter().copied().enumerate() {
            if position < cumulative + size {
                let offset = position - cumulative;

                return Some(StartPosition {
                    file_index,
                    offset,
                    skip_partial_line: offset > 0,
                });
            }

            cumulative += size;
        }

        None
    }

    /// Number of bytes, counted from `range_start`, after which the worker
    /// must not start a new row.
    #[inline]
    pub fn bytes_to_read(&self) -> u64 {
        self.range_end - self.range_start
    }
}

/// Count the newline units found right before `offset`, reading backwards.
pub(crate) fn newlines_before<R: Read + Seek>(
    source: &mut R,
    offset: u64,
    line_end: LineEndMatcher,
) -> io::Result<u64> {
    let width = line_end.width() as u64;
    let mut chunk = [0; LOOKBEHIND_CHUNK];
    let mut end = offset;
    let mut count = 0;

    while end >= width {
        let len = (end.min(LOOKBEHIND_CHUNK as u64) / width * width) as usize;
        let start = end - len as u64;

        source.seek(SeekFrom::Start(start))?;
        source.read_exact(&mut chunk[..len])?;

        for pos in (0..len).step_by(width as usize).rev() {
            if !line_end.is_newline(&chunk[..len], pos) {
                return Ok(count);
            }

            count += 1;
        }

        end = start;
    }

    Ok(count)
}

/// Move to the first row starting at or after the offset a worker landed on.
///
/// The window must be opened at this offset, and `newlines_before` is the
/// number of newline units found right before it. Without any, the worker
/// landed inside a line, which is skipped along with its terminator.
///
/// When terminators are paired, a run of newline units is made of the
/// terminator of the line before it (first two units), then of blank rows
/// two units long: rows only start at an even distance from the run start.
pub(crate) fn skip_partial_line<R: Read>(
    window: &mut ByteWindow<R>,
    line_end: LineEndMatcher,
    newlines_before: u64,
    paired_terminators: bool,
) -> io::Result<()> {
    let width = line_end.width();

    if newlines_before > 0 {
        window.fill(width)?;

        if paired_terminators
            && newlines_before % 2 == 1
            && line_end.is_newline(window.bytes(), window.scan_pos())
        {
            window.advance_by(width, true)?;
        }

        window.commit();
        return Ok(());
    }

    let found = match line_end {
        LineEndMatcher::SingleByte => window.skip_to_any(b'\r', b'\n')?,
        _ => loop {
            if !window.fill(width)? {
                break false;
            }

            if line_end.is_newline(window.bytes(), window.scan_pos()) {
                break true;
            }

            window.advance_by(width, true)?;
        },
    };

    if found {
        window.advance_by(width, true)?;
        window.fill(width)?;

        if paired_terminators && line_end.is_newline(window.bytes(), window.scan_pos()) {
            window.advance_by(width, true)?;
        }
    }

    window.commit();

    trace!("skipped {} byte(s) of partial line", window.bytes_read());

    Ok(())
}
