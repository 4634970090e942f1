use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

use super::error::LinkError;

/// Per-byte noise source for the simulated link.
///
/// Every byte is independently replaced by a uniformly random byte with probability `rate`.
#[derive(Debug)]
pub struct Corruptor {
    rate: f64,
    rng: StdRng,
}

impl Corruptor {
    /// Create a corruptor seeded from the operating system.
    pub fn new(rate: f64) -> Result<Self, LinkError> {
        Self::with_rng(rate, StdRng::from_os_rng())
    }

    /// Create a corruptor with a deterministic seed.
    pub fn seeded(rate: f64, seed: u64) -> Result<Self, LinkError> {
        Self::with_rng(rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rate: f64, rng: StdRng) -> Result<Self, LinkError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(LinkError::InvalidCorruptionRate(rate));
        }
        Ok(Self { rate, rng })
    }

    /// Corrupt `buf` in place, returning how many bytes were replaced.
    ///
    /// A replacement may draw the same value the byte already held, so the count can exceed the
    /// number of bytes that actually differ.
    pub fn corrupt(&mut self, buf: &mut [u8]) -> usize {
        let mut replaced = 0;
        for byte in buf.iter_mut() {
            if self.rng.random::<f64>() < self.rate {
                *byte = self.rng.random::<u8>();
                replaced += 1;
            }
        }
        replaced
    }
}

struct SenderInner<W> {
    writer: W,
    corruptor: Corruptor,
}

/// The sending half of a corrupting channel.
///
/// Clones share the same writer so that concurrent senders never interleave within a single
/// call to [`send`](ChannelSender::send).
pub struct ChannelSender<W> {
    inner: Arc<Mutex<SenderInner<W>>>,
}

impl<W> Clone for ChannelSender<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> ChannelSender<W> {
    pub(super) fn new(writer: W, corruptor: Corruptor) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SenderInner { writer, corruptor })),
        }
    }

    /// Corrupt a copy of `bytes` and transmit it, returning the number of bytes written.
    pub async fn send(&self, bytes: &[u8]) -> Result<usize, LinkError> {
        let mut packet = bytes.to_vec();
        let mut inner = self.inner.lock().await;
        let replaced = inner.corruptor.corrupt(&mut packet);
        if replaced > 0 {
            trace!(replaced, len = packet.len(), "Corrupted outgoing bytes");
        }
        inner.writer.write_all(&packet).await?;
        inner.writer.flush().await?;
        Ok(packet.len())
    }
}

/// The receiving half of a corrupting channel.
pub struct ChannelReceiver<R> {
    reader: R,
    corruptor: Corruptor,
    buffer_size: usize,
}

impl<R: AsyncRead + Unpin> ChannelReceiver<R> {
    pub(super) fn new(reader: R, corruptor: Corruptor, buffer_size: usize) -> Self {
        Self {
            reader,
            corruptor,
            buffer_size,
        }
    }

    /// Read whatever is available into `buf` and corrupt the received region in place.
    ///
    /// A return of `0` means the peer closed the stream.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let n = self.reader.read(buf).await?;
        let replaced = self.corruptor.corrupt(&mut buf[..n]);
        if replaced > 0 {
            trace!(replaced, len = n, "Corrupted incoming bytes");
        }
        Ok(n)
    }

    /// Size of the scratch buffer callers should read into.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_rate_out_of_range_rejected() {
        assert!(matches!(
            Corruptor::new(1.5),
            Err(LinkError::InvalidCorruptionRate(r)) if r == 1.5
        ));
        assert!(Corruptor::new(-0.1).is_err());
        assert!(Corruptor::new(f64::NAN).is_err());
    }

    #[test]
    fn test_zero_rate_is_identity() {
        let mut corruptor = Corruptor::seeded(0.0, 7).unwrap();
        for _ in 0..100 {
            let original = sample(512);
            let mut buf = original.clone();
            assert_eq!(corruptor.corrupt(&mut buf), 0);
            assert_eq!(buf, original);
        }
    }

    #[test]
    fn test_full_rate_replaces_every_byte() {
        let mut corruptor = Corruptor::seeded(1.0, 7).unwrap();
        let mut buf = sample(4096);
        assert_eq!(corruptor.corrupt(&mut buf), 4096);

        // Replacement values are uniform, so only ~1/256 should coincide with the original.
        let unchanged = buf
            .iter()
            .zip(sample(4096))
            .filter(|(a, b)| **a == *b)
            .count();
        assert!(unchanged < 64, "{unchanged} bytes unchanged");
    }

    #[test]
    fn test_partial_rate_converges() {
        let mut corruptor = Corruptor::seeded(0.1, 42).unwrap();
        let mut buf = vec![0u8; 200_000];
        let replaced = corruptor.corrupt(&mut buf);
        let fraction = replaced as f64 / buf.len() as f64;
        assert!((fraction - 0.1).abs() < 0.005, "fraction was {fraction}");
    }

    #[test]
    fn test_empty_buffer() {
        let mut corruptor = Corruptor::seeded(1.0, 1).unwrap();
        assert_eq!(corruptor.corrupt(&mut []), 0);
    }

    #[tokio::test]
    async fn test_send_and_receive_without_noise() {
        let (near, far) = tokio::io::duplex(1024);
        let (_near_read, near_write) = tokio::io::split(near);
        let (far_read, _far_write) = tokio::io::split(far);

        let sender = ChannelSender::new(near_write, Corruptor::seeded(0.0, 1).unwrap());
        let mut receiver = ChannelReceiver::new(far_read, Corruptor::seeded(0.0, 2).unwrap(), 64);

        let written = sender.send(b"TAKEOFF\n").await.unwrap();
        assert_eq!(written, 8);

        let mut buf = vec![0u8; receiver.buffer_size()];
        let n = receiver.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"TAKEOFF\n");
    }

    #[tokio::test]
    async fn test_receive_reports_closed_peer() {
        let (near, far) = tokio::io::duplex(64);
        drop(far);
        let (near_read, _near_write) = tokio::io::split(near);
        let mut receiver = ChannelReceiver::new(near_read, Corruptor::seeded(0.0, 2).unwrap(), 64);

        let mut buf = [0u8; 64];
        assert_eq!(receiver.receive(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_send_leaves_caller_buffer_intact() {
        let (near, _far) = tokio::io::duplex(1024);
        let (_r, w) = tokio::io::split(near);
        let sender = ChannelSender::new(w, Corruptor::seeded(1.0, 3).unwrap());

        let packet = b"GOTO 1 2 3\n".to_vec();
        sender.send(&packet).await.unwrap();
        assert_eq!(packet, b"GOTO 1 2 3\n");
    }
}
