//! Byte stream to frame reassembly for transports that deliver raw bytes.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embedded_io_async::Read;
use log::debug;

use crate::{Error, Sds011Link, HEAD, INBOUND_FRAME_LEN, TAIL};

/// Collects bytes until a `HEAD ... TAIL` window of frame length is found.
///
/// Bytes before a header are skipped. When the window does not end with a
/// tail byte, the assembler re-synchronises on the next header inside it.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: [u8; INBOUND_FRAME_LEN],
    len: usize,
}

impl FrameAssembler {
    pub const fn new() -> Self {
        Self {
            buf: [0; INBOUND_FRAME_LEN],
            len: 0,
        }
    }

    /// Feeds one byte, returning a candidate frame once complete. The frame
    /// checksum is not verified here.
    pub fn push(&mut self, byte: u8) -> Option<[u8; INBOUND_FRAME_LEN]> {
        if self.len == 0 && byte != HEAD {
            return None;
        }
        self.buf[self.len] = byte;
        self.len += 1;

        if self.len < INBOUND_FRAME_LEN {
            return None;
        }
        if self.buf[INBOUND_FRAME_LEN - 1] == TAIL {
            self.len = 0;
            return Some(self.buf);
        }

        debug!("No tail in {:02X?}, resynchronising", self.buf);
        match self.buf[1..].iter().position(|&b| b == HEAD) {
            Some(offset) => {
                let start = offset + 1;
                self.buf.copy_within(start.., 0);
                self.len = INBOUND_FRAME_LEN - start;
            }
            None => self.len = 0,
        }
        None
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }
}

/// Reads `reader` and delivers every reassembled frame to `link`.
///
/// Returns `Ok(())` at end of stream or once the link is closed (checked
/// after every read).
pub async fn pump<R, M, const N: usize>(
    reader: &mut R,
    link: &Sds011Link<M, N>,
) -> Result<(), Error>
where
    R: Read,
    M: RawMutex,
{
    let mut assembler = FrameAssembler::new();
    let mut read_buffer = [0u8; 2 * INBOUND_FRAME_LEN];

    while !link.is_closed() {
        let bytes_read = reader
            .read(&mut read_buffer)
            .await
            .map_err(|_| Error::ReadFailure)?;
        if bytes_read == 0 {
            debug!("Serial stream ended");
            return Ok(());
        }

        for &byte in &read_buffer[..bytes_read] {
            if let Some(frame) = assembler.push(byte) {
                link.deliver(frame).await;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const PM_FRAME: [u8; 10] = [0xAA, 0xC0, 0x4B, 0x00, 0x51, 0x00, 0xE9, 0x77, 0xFC, 0xAB];

    fn feed(assembler: &mut FrameAssembler, bytes: &[u8]) -> std::vec::Vec<[u8; 10]> {
        bytes.iter().filter_map(|&b| assembler.push(b)).collect()
    }

    #[test]
    fn finds_frame_after_noise() {
        let mut assembler = FrameAssembler::new();
        let mut bytes = std::vec![0x00, 0x13, 0xAB];
        bytes.extend_from_slice(&PM_FRAME);
        assert_eq!(feed(&mut assembler, &bytes), std::vec![PM_FRAME]);
    }

    #[test]
    fn resynchronises_on_truncated_frame() {
        let mut assembler = FrameAssembler::new();
        let mut bytes = std::vec::Vec::from(&PM_FRAME[..4]);
        bytes.extend_from_slice(&PM_FRAME);
        bytes.extend_from_slice(&PM_FRAME);
        assert_eq!(feed(&mut assembler, &bytes), std::vec![PM_FRAME, PM_FRAME]);
    }

    #[test]
    fn splits_back_to_back_frames() {
        let mut assembler = FrameAssembler::new();
        let mut bytes = std::vec::Vec::from(PM_FRAME);
        bytes.extend_from_slice(&PM_FRAME);
        assert_eq!(feed(&mut assembler, &bytes).len(), 2);
    }

    struct Bytes<'a>(&'a [u8]);

    impl embedded_io_async::ErrorType for Bytes<'_> {
        type Error = Infallible;
    }

    impl Read for Bytes<'_> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.0.len()).min(3);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn pump_delivers_until_end_of_stream() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let mut bytes = std::vec![0x42];
        bytes.extend_from_slice(&PM_FRAME);
        let mut reader = Bytes(&bytes);

        assert_eq!(block_on(pump(&mut reader, &link)), Ok(()));
        assert_eq!(block_on(link.next_frame()), PM_FRAME);
    }
}
