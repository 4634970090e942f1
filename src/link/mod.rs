//! The noisy byte-stream link shared by the drone and the ground station.
//!
//! A transport is split into a [`ChannelSender`] and a [`ChannelReceiver`], both of which pass
//! every byte through a [`Corruptor`]. Received bytes are then cut into newline-delimited lines
//! by a [`LineFramer`], exposed to the protocol loops as a stream via [`framed_lines`].

mod corrupt;
mod error;
mod framing;

pub use corrupt::{ChannelReceiver, ChannelSender, Corruptor};
pub use error::LinkError;
pub use framing::{CaseMode, LineFramer, Lines};

use async_stream::try_stream;
use bon::Builder;
use bytes::Bytes;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};

/// Prefix every acknowledgment line starts with.
pub const ACK_PREFIX: &str = "OK ";

/// Default per-byte corruption probability.
pub const DEFAULT_CORRUPTION_RATE: f64 = 0.1;

/// Configuration for a corrupting channel.
#[derive(Debug, Clone, Builder)]
pub struct LinkConfig {
    /// Probability in `[0, 1]` that any single byte is replaced in transit.
    #[builder(default = DEFAULT_CORRUPTION_RATE)]
    pub corruption_rate: f64,

    /// Fixed seed for the noise generators. When unset the generators are seeded from the OS.
    pub seed: Option<u64>,

    /// Size of each transport read.
    #[builder(default = 256)]
    pub read_buffer_size: usize,
}

impl LinkConfig {
    /// Wrap the two halves of a transport in corrupting sender and receiver halves.
    ///
    /// The two directions draw from independent generators.
    pub fn open<R, W>(&self, reader: R, writer: W) -> Result<(ChannelSender<W>, ChannelReceiver<R>), LinkError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (send_noise, receive_noise) = match self.seed {
            Some(seed) => (
                Corruptor::seeded(self.corruption_rate, seed)?,
                Corruptor::seeded(self.corruption_rate, seed.wrapping_add(1))?,
            ),
            None => (
                Corruptor::new(self.corruption_rate)?,
                Corruptor::new(self.corruption_rate)?,
            ),
        };

        Ok((
            ChannelSender::new(writer, send_noise),
            ChannelReceiver::new(reader, receive_noise, self.read_buffer_size.max(1)),
        ))
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Turn a receiver into a stream of complete lines.
///
/// The stream ends when the peer closes the transport (a zero-length read). A transport error is
/// yielded once and also ends the stream.
pub fn framed_lines<R>(
    mut receiver: ChannelReceiver<R>,
    mut framer: LineFramer,
) -> impl Stream<Item = Result<Bytes, LinkError>>
where
    R: AsyncRead + Unpin,
{
    try_stream! {
        let mut chunk = vec![0u8; receiver.buffer_size()];
        loop {
            let n = receiver.receive(&mut chunk).await?;
            if n == 0 {
                break;
            }
            framer.extend(&chunk[..n]);
            for line in framer.lines() {
                yield line;
            }
        }
    }
}
