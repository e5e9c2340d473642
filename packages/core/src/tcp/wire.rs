//! Framed wire primitives.
//!
//! Every field is big-endian and accumulates into a rolling CRC-16
//! (polynomial 0xA001, initial value 0). A message body is followed by the
//! 16-bit checksum; a mismatch is answered with a bare
//! `messageTransmissionError` byte.
//!
//! Reads carry deadlines: 5 seconds for fixed-size primitives, 15 seconds
//! for bulk payloads. An expired deadline cancels the read and tears the
//! connection down.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use uuid::Uuid;

use crate::services::ServiceError;

pub const SHORT_READ: Duration = Duration::from_secs(5);
pub const LONG_READ: Duration = Duration::from_secs(15);

/// Largest string field a peer may send.
pub const MAX_STRING: u16 = 4096;
/// Largest binary blob (row image) a peer may send.
pub const MAX_BLOB: u32 = 1 << 20;

const CRC_POLY: u16 = 0xA001;

fn crc_table() -> &'static [u16; 256] {
    static TABLE: std::sync::OnceLock<[u16; 256]> = std::sync::OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = 0u16;
            let mut c = i as u16;
            for _ in 0..8 {
                if (crc ^ c) & 0x0001 != 0 {
                    crc = (crc >> 1) ^ CRC_POLY;
                } else {
                    crc >>= 1;
                }
                c >>= 1;
            }
            *entry = crc;
        }
        table
    })
}

/// Fold one byte into a running CRC-16.
pub fn update_crc16(crc: u16, byte: u8) -> u16 {
    let table = crc_table();
    (crc >> 8) ^ table[((crc ^ u16::from(byte)) & 0x00ff) as usize]
}

/// Fold a buffer into a running CRC-16.
pub fn crc16(crc: u16, data: &[u8]) -> u16 {
    data.iter().fold(crc, |crc, byte| update_crc16(crc, *byte))
}

fn short_read() -> ServiceError {
    ServiceError::Transmission("Not enough data in the buffer".to_string())
}

fn timed_out() -> ServiceError {
    ServiceError::Transmission("Read deadline expired".to_string())
}

/// CRC-accumulating reader half.
pub struct WireReader<R> {
    inner: R,
    crc: u16,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, crc: 0 }
    }

    pub fn reset_crc(&mut self) {
        self.crc = 0;
    }

    async fn fill(&mut self, buf: &mut [u8], deadline: Duration) -> Result<(), ServiceError> {
        match timeout(deadline, self.inner.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(short_read()),
            Err(_) => Err(timed_out()),
        }
    }

    /// Read a frame opcode without touching the checksum. Returns `None` on
    /// a clean end of stream.
    pub async fn read_opcode(&mut self) -> Result<Option<u8>, ServiceError> {
        let mut buf = [0u8; 1];
        match timeout(LONG_READ, self.inner.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Ok(Some(buf[0])),
            Ok(Err(_)) => Ok(None),
            Err(_) => Err(timed_out()),
        }
    }

    pub async fn read_u8(&mut self) -> Result<u8, ServiceError> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf, SHORT_READ).await?;
        self.crc = update_crc16(self.crc, buf[0]);
        Ok(buf[0])
    }

    pub async fn read_u16(&mut self, max: u16) -> Result<u16, ServiceError> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf, SHORT_READ).await?;
        self.crc = crc16(self.crc, &buf);
        let value = u16::from_be_bytes(buf);
        if max != 0 && max < value {
            return Err(ServiceError::Transmission(format!(
                "Message size too big wanted {} read {}",
                max, value
            )));
        }
        Ok(value)
    }

    pub async fn read_u32(&mut self, max: u32) -> Result<u32, ServiceError> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf, SHORT_READ).await?;
        self.crc = crc16(self.crc, &buf);
        let value = u32::from_be_bytes(buf);
        if max != 0 && max < value {
            return Err(ServiceError::Transmission(format!(
                "Message size too big wanted {} read {}",
                max, value
            )));
        }
        Ok(value)
    }

    pub async fn read_u64(&mut self) -> Result<u64, ServiceError> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf, SHORT_READ).await?;
        self.crc = crc16(self.crc, &buf);
        Ok(u64::from_be_bytes(buf))
    }

    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ServiceError> {
        let mut buf = vec![0u8; len];
        if len != 0 {
            self.fill(&mut buf, LONG_READ).await?;
            self.crc = crc16(self.crc, &buf);
        }
        Ok(buf)
    }

    /// A `u16`-length-prefixed UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String, ServiceError> {
        let len = self.read_u16(MAX_STRING).await?;
        let raw = self.read_bytes(len as usize).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// A `u32`-length-prefixed binary blob (row image or primary key).
    pub async fn read_blob(&mut self) -> Result<Vec<u8>, ServiceError> {
        let len = self.read_u32(MAX_BLOB).await?;
        self.read_bytes(len as usize).await
    }

    /// A 36-byte ASCII UUID.
    pub async fn read_uuid(&mut self) -> Result<Uuid, ServiceError> {
        let raw = self.read_bytes(36).await?;
        Uuid::parse_str(&String::from_utf8_lossy(&raw))
            .map_err(|_| ServiceError::Transmission("Malformed uuid field".to_string()))
    }

    /// Read the trailing checksum and compare it against the accumulated
    /// CRC. Resets the accumulator for the next frame.
    pub async fn verify_checksum(&mut self) -> Result<(), ServiceError> {
        let expected = self.crc;
        let mut buf = [0u8; 2];
        self.fill(&mut buf, SHORT_READ).await?;
        self.crc = 0;
        if u16::from_be_bytes(buf) != expected {
            return Err(ServiceError::Transmission("Checksum mismatch".to_string()));
        }
        Ok(())
    }
}

/// CRC-accumulating writer half.
pub struct WireWriter<W> {
    inner: W,
    crc: u16,
}

impl<W: AsyncWrite + Unpin> WireWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, crc: 0 }
    }

    pub fn reset_crc(&mut self) {
        self.crc = 0;
    }

    async fn push(&mut self, data: &[u8]) -> Result<(), ServiceError> {
        self.inner
            .write_all(data)
            .await
            .map_err(|_| ServiceError::Transmission("Network error while writing".to_string()))
    }

    /// Write a bare byte outside the checksum, used for error replies.
    pub async fn write_raw_u8(&mut self, value: u8) -> Result<(), ServiceError> {
        self.push(&[value]).await
    }

    pub async fn write_u8(&mut self, value: u8) -> Result<(), ServiceError> {
        self.push(&[value]).await?;
        self.crc = update_crc16(self.crc, value);
        Ok(())
    }

    pub async fn write_u16(&mut self, value: u16) -> Result<(), ServiceError> {
        let buf = value.to_be_bytes();
        self.push(&buf).await?;
        self.crc = crc16(self.crc, &buf);
        Ok(())
    }

    pub async fn write_u32(&mut self, value: u32) -> Result<(), ServiceError> {
        let buf = value.to_be_bytes();
        self.push(&buf).await?;
        self.crc = crc16(self.crc, &buf);
        Ok(())
    }

    pub async fn write_u64(&mut self, value: u64) -> Result<(), ServiceError> {
        let buf = value.to_be_bytes();
        self.push(&buf).await?;
        self.crc = crc16(self.crc, &buf);
        Ok(())
    }

    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<(), ServiceError> {
        self.push(data).await?;
        self.crc = crc16(self.crc, data);
        Ok(())
    }

    pub async fn write_string(&mut self, value: &str) -> Result<(), ServiceError> {
        self.write_u16(value.len() as u16).await?;
        self.write_bytes(value.as_bytes()).await
    }

    pub async fn write_blob(&mut self, data: &[u8]) -> Result<(), ServiceError> {
        self.write_u32(data.len() as u32).await?;
        self.write_bytes(data).await
    }

    pub async fn write_uuid(&mut self, uuid: &Uuid) -> Result<(), ServiceError> {
        self.write_bytes(uuid.hyphenated().to_string().as_bytes())
            .await
    }

    /// Emit the accumulated CRC and reset it for the next frame.
    pub async fn write_checksum(&mut self) -> Result<(), ServiceError> {
        let crc = self.crc;
        self.push(&crc.to_be_bytes()).await?;
        self.crc = 0;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<(), ServiceError> {
        self.inner
            .flush()
            .await
            .map_err(|_| ServiceError::Transmission("Network error while flushing".to_string()))
    }
}
