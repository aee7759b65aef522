//! Replay buffer for streamed audio.
//!
//! Holds every byte the server has not acknowledged yet. On each new socket the
//! whole buffer is resent, so the stream has no gap whatever happened to the
//! previous connection.

use bytes::{Buf, Bytes, BytesMut};

/// Audio retained until acknowledged.
///
/// Offsets are absolute within the session: byte `n` is the `n`th byte ever
/// pushed. Not internally synchronized; the live session owns it.
#[derive(Debug, Default)]
pub struct AudioBuffer {
    pending: BytesMut,
    /// Absolute offset of the first pending byte.
    bytes_sent: u64,
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Drop everything before the absolute offset `byte_end`.
    ///
    /// Stale or repeated acknowledgments are ignored; an offset past the end of
    /// the buffer empties it.
    pub fn acknowledge(&mut self, byte_end: u64) {
        if byte_end <= self.bytes_sent {
            return;
        }
        let advance = (byte_end - self.bytes_sent).min(self.pending.len() as u64) as usize;
        self.pending.advance(advance);
        self.bytes_sent = byte_end;
    }

    /// Unacknowledged audio, in submission order.
    pub fn pending(&self) -> Bytes {
        Bytes::copy_from_slice(&self.pending)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_keeps_order() {
        let mut buffer = AudioBuffer::new();
        buffer.push(&[1, 2]);
        buffer.push(&[3]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(&buffer.pending()[..], &[1, 2, 3]);
    }

    #[test]
    fn test_acknowledge_trims_by_absolute_offset() {
        let mut buffer = AudioBuffer::new();
        buffer.push(&[0, 1, 2, 3, 4, 5]);
        buffer.acknowledge(2);
        assert_eq!(&buffer.pending()[..], &[2, 3, 4, 5]);
        assert_eq!(buffer.bytes_sent(), 2);

        buffer.push(&[6, 7]);
        buffer.acknowledge(5);
        assert_eq!(&buffer.pending()[..], &[5, 6, 7]);
        assert_eq!(buffer.bytes_sent(), 5);
    }

    #[test]
    fn test_stale_acknowledgment_is_ignored() {
        let mut buffer = AudioBuffer::new();
        buffer.push(&[0, 1, 2, 3]);
        buffer.acknowledge(3);
        buffer.acknowledge(1);
        buffer.acknowledge(3);
        assert_eq!(&buffer.pending()[..], &[3]);
        assert_eq!(buffer.bytes_sent(), 3);
    }

    #[test]
    fn test_acknowledge_past_end_empties() {
        let mut buffer = AudioBuffer::new();
        buffer.push(&[0, 1]);
        buffer.acknowledge(10);
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes_sent(), 10);
    }

    #[test]
    fn test_clear() {
        let mut buffer = AudioBuffer::new();
        buffer.push(&[9; 32]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes_sent(), 0);
    }
}
