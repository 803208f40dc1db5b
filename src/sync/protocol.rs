//! Datagram codec.
//!
//! Every datagram starts with a 13-byte ASCII tag. Clock messages append
//! little-endian `i64` millisecond timestamps of the sender's virtual clock.

use super::SyncError;

pub const START_TAG: &[u8; 13] = b"SSI:STRT:RUN1";
pub const STOP_TAG: &[u8; 13] = b"SSI:STOP:QUIT";
pub const REQUEST_TAG: &[u8; 13] = b"SSI:SYNC:RQST";
pub const TIME_TAG: &[u8; 13] = b"SSI:SYNC:TIME";

const TAG_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMessage {
    /// Start barrier
    Start,
    /// Coordinated shutdown
    Stop,
    /// Clock request carrying the requester's send time
    Request { sent_ms: i64 },
    /// Clock reply echoing the request time plus the master's time
    Time { request_sent_ms: i64, master_ms: i64 },
}

impl SyncMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TAG_LEN + 16);
        match self {
            SyncMessage::Start => out.extend_from_slice(START_TAG),
            SyncMessage::Stop => out.extend_from_slice(STOP_TAG),
            SyncMessage::Request { sent_ms } => {
                out.extend_from_slice(REQUEST_TAG);
                out.extend_from_slice(&sent_ms.to_le_bytes());
            }
            SyncMessage::Time {
                request_sent_ms,
                master_ms,
            } => {
                out.extend_from_slice(TIME_TAG);
                out.extend_from_slice(&request_sent_ms.to_le_bytes());
                out.extend_from_slice(&master_ms.to_le_bytes());
            }
        }
        out
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, SyncError> {
        if datagram.len() < TAG_LEN {
            return Err(SyncError::Malformed(format!(
                "{} bytes is shorter than a tag",
                datagram.len()
            )));
        }
        let (tag, body) = datagram.split_at(TAG_LEN);

        if tag == START_TAG {
            Ok(SyncMessage::Start)
        } else if tag == STOP_TAG {
            Ok(SyncMessage::Stop)
        } else if tag == REQUEST_TAG {
            Ok(SyncMessage::Request {
                sent_ms: read_i64(body, 0)?,
            })
        } else if tag == TIME_TAG {
            Ok(SyncMessage::Time {
                request_sent_ms: read_i64(body, 0)?,
                master_ms: read_i64(body, 8)?,
            })
        } else {
            Err(SyncError::Malformed(format!(
                "unknown tag {:?}",
                String::from_utf8_lossy(tag)
            )))
        }
    }
}

fn read_i64(body: &[u8], at: usize) -> Result<i64, SyncError> {
    body.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_le_bytes)
        .ok_or_else(|| SyncError::Malformed(format!("missing timestamp at byte {}", TAG_LEN + at)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_byte_exact() {
        assert_eq!(SyncMessage::Start.encode(), b"SSI:STRT:RUN1".to_vec());
        assert_eq!(SyncMessage::Stop.encode(), b"SSI:STOP:QUIT".to_vec());
    }

    #[test]
    fn test_time_layout() {
        let bytes = SyncMessage::Time {
            request_sent_ms: 1,
            master_ms: -2,
        }
        .encode();
        assert_eq!(bytes.len(), 29);
        assert_eq!(&bytes[..13], TIME_TAG);
        assert_eq!(&bytes[13..21], &1i64.to_le_bytes());
        assert_eq!(&bytes[21..29], &(-2i64).to_le_bytes());
        assert_eq!(
            SyncMessage::decode(&bytes).unwrap(),
            SyncMessage::Time {
                request_sent_ms: 1,
                master_ms: -2
            }
        );
    }

    #[test]
    fn test_request_decodes() {
        let bytes = SyncMessage::Request { sent_ms: 123_456 }.encode();
        assert_eq!(
            SyncMessage::decode(&bytes).unwrap(),
            SyncMessage::Request { sent_ms: 123_456 }
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            SyncMessage::decode(b"hello"),
            Err(SyncError::Malformed(_))
        ));
        assert!(matches!(
            SyncMessage::decode(b"SSI:XXXX:XXXX"),
            Err(SyncError::Malformed(_))
        ));
        // Truncated timestamp
        assert!(SyncMessage::decode(&REQUEST_TAG[..]).is_err());
    }
}
