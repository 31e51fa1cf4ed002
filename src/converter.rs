//! The incremental converter contract and its carry buffer.
//!
//! A [`Converter`] turns UTF-16 code units into bytes of one target encoding.
//! Input handed to [`Converter::convert`] may stop anywhere, including between
//! the two halves of a surrogate pair, and the output region may be too small
//! for everything. Units that cannot be converted yet are *carried*: copied
//! into the converter's private [`CarryBuffer`] and processed on the next call
//! or by [`Converter::flush`].

use std::fmt;
use std::ops::Range;

use log::trace;

use crate::Result;

/// Capacity of the first allocation made by [`CarryBuffer::carry`].
pub const MIN_CARRY_CAPACITY: usize = 128;

/// Growable buffer of code units waiting to be converted.
///
/// The backing storage is allocated in whole slots, so `capacity()` is the
/// number of units that fit before the next reallocation and `len()` the number
/// of valid units. `capacity() >= len()` always holds.
#[derive(Debug, Clone, Default)]
pub struct CarryBuffer {
    buf: Vec<u16>,
    blen: usize,
    /// Address range of the region handed to `convert` by an ongoing flush.
    flushing: Option<Range<usize>>,
}

/// Buffered units detached from a [`CarryBuffer`] for the duration of a flush.
#[derive(Debug)]
pub struct Detached {
    buf: Vec<u16>,
    len: usize,
}

impl Detached {
    /// The units that were buffered when the flush started.
    pub fn units(&self) -> &[u16] {
        &self.buf[..self.len]
    }
}

impl CarryBuffer {
    /// Create an empty buffer. Nothing is allocated until the first carry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered units.
    pub fn len(&self) -> usize {
        self.blen
    }

    /// Whether no units are buffered.
    pub fn is_empty(&self) -> bool {
        self.blen == 0
    }

    /// Number of units the buffer holds without reallocating.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// The buffered units, oldest first.
    pub fn as_slice(&self) -> &[u16] {
        &self.buf[..self.blen]
    }

    /// Append `from` to the buffered units.
    ///
    /// The first allocation holds `max(128, from.len())` units; after that the
    /// capacity doubles until the new total fits. Units that belong to the
    /// region currently being flushed are ignored, so a leaf that carries its
    /// unconverted input while running under [`Converter::flush`] cannot put
    /// the flushed units back.
    pub fn carry(&mut self, from: &[u16]) {
        if self.is_flushing(from) {
            trace!("ignoring carry of {} units from the region being flushed", from.len());
            return;
        }

        let total = self.blen + from.len();
        if self.buf.is_empty() {
            self.buf = vec![0; from.len().max(MIN_CARRY_CAPACITY)];
        } else if total > self.buf.len() {
            let mut n = self.buf.len() * 2;
            while n < total {
                n *= 2;
            }
            trace!("growing carry buffer from {} to {} units", self.buf.len(), n);
            self.buf.resize(n, 0);
        }

        self.buf[self.blen..total].copy_from_slice(from);
        self.blen = total;
    }

    /// Move the buffered units out, leaving the buffer empty but keeping its
    /// allocation. Leaves use this to join carried units with fresh input.
    pub fn take_pending(&mut self) -> Vec<u16> {
        let pending = self.as_slice().to_vec();
        self.blen = 0;
        pending
    }

    /// Start a flush: reset the count and hand out the buffered units.
    ///
    /// Returns `None` when nothing is buffered.
    pub fn detach(&mut self) -> Option<Detached> {
        if self.blen == 0 {
            return None;
        }
        let len = std::mem::take(&mut self.blen);
        let buf = std::mem::take(&mut self.buf);
        let start = buf.as_ptr() as usize;
        self.flushing = Some(start..start + len * size_of::<u16>());
        Some(Detached { buf, len })
    }

    /// Finish a flush started by [`detach`](Self::detach).
    ///
    /// The old allocation is reused unless the flush carried new units into a
    /// fresh one.
    pub fn reattach(&mut self, detached: Detached) {
        self.flushing = None;
        if self.buf.is_empty() {
            self.buf = detached.buf;
        }
    }

    fn is_flushing(&self, from: &[u16]) -> bool {
        match &self.flushing {
            Some(region) if !from.is_empty() => region.contains(&(from.as_ptr() as usize)),
            _ => false,
        }
    }
}

/// Incremental character-to-byte converter for one encoding.
///
/// Implementations own a [`CarryBuffer`] and expose it through
/// [`carry_buffer`](Self::carry_buffer) and
/// [`carry_buffer_mut`](Self::carry_buffer_mut); `carry`, `pending` and
/// `flush` are provided on top of it.
///
/// A converter is driven by a single stream at a time. Streams that need
/// independent state each obtain their own instance from the
/// [`Registry`](crate::Registry).
pub trait Converter: Send + fmt::Debug {
    /// Canonical name of the encoding this converter produces.
    fn encoding(&self) -> &str;

    /// The carried units of this instance.
    fn carry_buffer(&self) -> &CarryBuffer;

    /// Mutable access to the carried units of this instance.
    fn carry_buffer_mut(&mut self) -> &mut CarryBuffer;

    /// Convert `from` into `to`, returning the number of bytes written.
    ///
    /// Units that cannot be converted in this call, such as a trailing high
    /// surrogate or input that does not fit in `to`, are carried.
    fn convert(&mut self, from: &[u16], to: &mut [u8]) -> Result<usize>;

    /// Number of bytes `convert` would write for `from`. Never less than the
    /// real count; does not change any state.
    fn number_of_bytes(&self, from: &[u16]) -> usize;

    /// Clone this converter, including its carried units.
    fn box_clone(&self) -> Box<dyn Converter>;

    /// Append `from` to the carried units.
    fn carry(&mut self, from: &[u16]) {
        self.carry_buffer_mut().carry(from);
    }

    /// Number of carried units.
    fn pending(&self) -> usize {
        self.carry_buffer().len()
    }

    /// Convert every carried unit into `to`.
    ///
    /// Returns 0 without touching anything when no units are carried.
    /// Otherwise the carried count drops to zero *before* the units are
    /// converted, so output that does not fit in `to` is lost. Size `to` with
    /// [`number_of_bytes`](Self::number_of_bytes) over the carried units.
    fn flush(&mut self, to: &mut [u8]) -> Result<usize> {
        flush_carried(self, to)
    }

    /// End the stream: flush, then write whatever a stateful encoding needs
    /// to return to its initial state.
    ///
    /// Stateless converters only flush.
    fn finish(&mut self, to: &mut [u8]) -> Result<usize> {
        self.flush(to)
    }
}

impl Clone for Box<dyn Converter> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// The default body of [`Converter::flush`], for implementations that
/// override `flush` and still want the standard draining step.
pub fn flush_carried<C: Converter + ?Sized>(conv: &mut C, to: &mut [u8]) -> Result<usize> {
    let Some(detached) = conv.carry_buffer_mut().detach() else {
        return Ok(0);
    };
    trace!("flushing {} carried units of {}", detached.len, conv.encoding());
    let result = conv.convert(detached.units(), to);
    conv.carry_buffer_mut().reattach(detached);
    result
}

/// Bytes needed to flush everything `conv` currently carries.
pub fn pending_bytes(conv: &dyn Converter) -> usize {
    conv.number_of_bytes(conv.carry_buffer().as_slice())
}
