use std::io::{self, Read};

use memchr::memchr2;

/// Extra room added on top of the computed size each time the window grows.
const GROWTH_SLACK: usize = 64;

/// An expandable window over a byte stream, scanned through two cursors.
///
/// Bytes in `[window_start, high_water_mark)` are unconsumed and always
/// survive a refill: they are copied to the front of `data` before new bytes
/// are appended, never re-read from the source. `data` only grows when a
/// single field is longer than what remains after compaction, so that the
/// common case is allocation-free once warmed up.
///
/// Invariant: `window_start <= scan_pos <= high_water_mark <= data.len()`.
pub(crate) struct ByteWindow<R> {
    inner: R,
    data: Vec<u8>,
    window_start: usize,
    scan_pos: usize,
    high_water_mark: usize,
    chunk_size: usize,
    exhausted: bool,
    bytes_read: u64,
}

impl<R: Read> ByteWindow<R> {
    pub(crate) fn with_capacity(chunk_size: usize, inner: R) -> Self {
        let chunk_size = chunk_size.max(1);

        Self {
            inner,
            data: vec![0; chunk_size],
            window_start: 0,
            scan_pos: 0,
            high_water_mark: 0,
            chunk_size,
            exhausted: false,
            bytes_read: 0,
        }
    }

    #[inline(always)]
    pub(crate) fn scan_pos(&self) -> usize {
        self.scan_pos
    }

    #[cfg(test)]
    fn window_start(&self) -> usize {
        self.window_start
    }

    #[cfg(test)]
    fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes stepped over with the counter bumped.
    #[inline(always)]
    pub(crate) fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Every valid byte currently held, to be indexed with
    /// [`Self::scan_pos`].
    #[inline(always)]
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data[..self.high_water_mark]
    }

    /// The bytes scanned but not yet consumed, i.e. `[window_start, scan_pos)`.
    #[inline(always)]
    pub(crate) fn window(&self) -> &[u8] {
        &self.data[self.window_start..self.scan_pos]
    }

    /// Consume everything scanned so far.
    #[inline(always)]
    pub(crate) fn commit(&mut self) {
        self.window_start = self.scan_pos;
    }

    fn compact(&mut self) {
        if self.window_start == 0 {
            return;
        }

        self.data
            .copy_within(self.window_start..self.high_water_mark, 0);

        self.scan_pos -= self.window_start;
        self.high_water_mark -= self.window_start;
        self.window_start = 0;
    }

    /// Read at most one chunk of new bytes from the source. Returns the number
    /// of bytes read, `0` meaning the source is exhausted.
    fn refill(&mut self) -> io::Result<usize> {
        if self.exhausted {
            return Ok(0);
        }

        self.compact();

        let span = self.high_water_mark;
        let capacity = self.data.len();

        if span + self.chunk_size > capacity {
            let grown = (capacity + capacity / 2).max(span + self.chunk_size) + GROWTH_SLACK;
            self.data.resize(grown, 0);
        }

        let end = self.high_water_mark + self.chunk_size;

        loop {
            match self.inner.read(&mut self.data[self.high_water_mark..end]) {
                Ok(0) => {
                    self.exhausted = true;
                    return Ok(0);
                }
                Ok(n) => {
                    self.high_water_mark += n;
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    /// Try to have at least `n` readable bytes starting at the scan position.
    /// Returns whether they are available.
    pub(crate) fn fill(&mut self, n: usize) -> io::Result<bool> {
        while self.high_water_mark - self.scan_pos < n {
            if self.refill()? == 0 {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Returns `true` when no byte can be found at the scan position anymore
    /// because the source is exhausted.
    #[inline]
    pub(crate) fn ensure_available(&mut self) -> io::Result<bool> {
        Ok(!self.fill(1)?)
    }

    /// Step over the byte at the scan position, refilling if needed. Returns
    /// whether the source is now exhausted.
    ///
    /// `bump_counter` should be `false` only when peeking at bytes that do not
    /// belong to the caller, e.g. the last byte of a previous worker's range.
    pub(crate) fn advance(&mut self, bump_counter: bool) -> io::Result<bool> {
        if self.scan_pos == self.high_water_mark && self.refill()? == 0 {
            return Ok(true);
        }

        self.scan_pos += 1;

        if bump_counter {
            self.bytes_read += 1;
        }

        self.ensure_available()
    }

    pub(crate) fn advance_by(&mut self, n: usize, bump_counter: bool) -> io::Result<bool> {
        for _ in 0..n {
            if self.advance(bump_counter)? {
                return Ok(true);
            }
        }

        self.ensure_available()
    }

    /// Discard bytes until one of `a` or `b` sits at the scan position.
    /// Returns whether one was found before the source ran out.
    pub(crate) fn skip_to_any(&mut self, a: u8, b: u8) -> io::Result<bool> {
        loop {
            if self.ensure_available()? {
                return Ok(false);
            }

            let haystack = &self.data[self.scan_pos..self.high_water_mark];

            let offset = match memchr2(a, b, haystack) {
                Some(offset) => offset,
                None => haystack.len(),
            };

            self.scan_pos += offset;
            self.bytes_read += offset as u64;
            self.commit();

            if self.scan_pos < self.high_water_mark {
                return Ok(true);
            }
        }
    }
}
