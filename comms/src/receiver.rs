use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{DEFAULT_MAX_FRAME_LEN, Deserialize, LEN_TYPE_SIZE, LenType, READ_CHUNK_SIZE};

/// The receiving end handle of the communication.
pub struct FrameReceiver<R: AsyncRead + Unpin> {
    rx: R,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> FrameReceiver<R> {
    /// Creates a new `FrameReceiver` instance.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub(super) fn new(rx: R) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            max_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Sets the largest length prefix this receiver will accept.
    ///
    /// # Arguments
    /// * `max_len` - The maximum size in bytes of a single frame.
    ///
    /// # Returns
    /// The updated receiver.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// Waits to receive a new message from the inner reader.
    ///
    /// # Returns
    /// A result object that returns `T` on success or `io::Error` on failure.
    pub async fn recv<T: Deserialize>(&mut self) -> io::Result<T> {
        let frame = self.recv_frame().await?;
        T::deserialize(frame)
    }

    /// Reads one whole frame and returns its payload without the length prefix.
    ///
    /// The payload is read in chunks of at most `READ_CHUNK_SIZE` bytes, each capped to the
    /// amount still missing. A zero-length read before the frame is complete is reported
    /// as an `UnexpectedEof` error, never as a shorter message.
    ///
    /// # Returns
    /// The payload bytes, borrowed from this receiver's internal buffer.
    pub async fn recv_frame(&mut self) -> io::Result<&[u8]> {
        let len = self.read_len().await?;

        self.buf.clear();
        self.buf.resize(len, 0);

        let mut filled = 0;
        while filled < len {
            let end = len.min(filled + READ_CHUNK_SIZE);
            let n = self.rx.read(&mut self.buf[filled..end]).await?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of {len} payload bytes"),
                ));
            }

            filled += n;
        }

        Ok(&self.buf)
    }

    /// Reads the fixed-width big endian length prefix.
    async fn read_len(&mut self) -> io::Result<usize> {
        let mut size_buf = [0; LEN_TYPE_SIZE];
        let mut filled = 0;

        while filled < LEN_TYPE_SIZE {
            let n = self.rx.read(&mut size_buf[filled..]).await?;

            if n == 0 {
                let msg = match filled {
                    0 => "connection closed".to_string(),
                    _ => format!("connection closed after {filled} of {LEN_TYPE_SIZE} header bytes"),
                };

                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, msg));
            }

            filled += n;
        }

        let len = LenType::from_be_bytes(size_buf) as usize;
        if len > self.max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed length prefix: {len} exceeds the limit of {}", self.max_len),
            ));
        }

        Ok(len)
    }
}
