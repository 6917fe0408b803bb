//! Network-configuration packet codec
//!
//! Big-endian layout:
//!
//! ```text
//! +------+-------------+----------+-----------------+----------+
//! | type | payload_len | seq/ack  | energy_or_flags | checksum |
//! |  u8  |     u8      |   u16    |       u16       |   u16    |
//! +------+-------------+----------+-----------------+----------+
//! | via: u16 | dest: u16 |  ... payload_len / 4 entries
//! +----------+-----------+
//! ```
//!
//! The checksum is the RFC 1071 ones'-complement sum over header and
//! payload with the checksum field zeroed. A packet verifies when the sum
//! over all of its bytes is `0xFFFF`. An ack has no payload and carries the
//! acknowledged sequence number plus one.

use crate::types::*;
use heapless::Vec;

/// Header size in bytes
pub const HEADER_LEN: usize = 8;

/// Size of one (via, dest) entry
pub const ENTRY_LEN: usize = 4;

/// Largest encoded packet
pub const MAX_PACKET_LEN: usize = HEADER_LEN + ENTRY_LEN * MAX_PAIRS_PER_SOURCE;

const CHECKSUM_OFFSET: usize = 6;

/// Encoded packet buffer
pub type PacketBuf = Vec<u8, MAX_PACKET_LEN>;

// ============================================================================
// Checksum
// ============================================================================

/// Ones'-complement addition with end-around carry
pub fn ones_complement_add(a: u16, b: u16) -> u16 {
    let sum = a as u32 + b as u32;
    ((sum & 0xFFFF) + (sum >> 16)) as u16
}

/// Fold `data` as big-endian words into `initial`
///
/// A trailing odd byte is padded with zero.
pub fn checksum_fold(initial: u16, data: &[u8]) -> u16 {
    let mut sum = initial;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum = ones_complement_add(sum, u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum = ones_complement_add(sum, u16::from_be_bytes([*last, 0]));
    }
    sum
}

/// RFC 1071 sum over `data` (not complemented)
pub fn internet_checksum(data: &[u8]) -> u16 {
    checksum_fold(0, data)
}

// ============================================================================
// Packet
// ============================================================================

/// Packet type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Network configuration
    Config = 6,
    /// Network configuration acknowledgment
    ConfigAck = 7,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(raw: u8) -> Result<Self> {
        match raw {
            6 => Ok(PacketType::Config),
            7 => Ok(PacketType::ConfigAck),
            _ => Err(Error::Malformed),
        }
    }
}

/// One forwarding instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteEntry {
    /// Next hop
    pub via: LinkAddr,
    /// Destination
    pub dest: LinkAddr,
}

/// Decoded network-configuration packet or ack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcPacket {
    /// Type byte
    pub kind: PacketType,
    /// Sequence number (config) or sequence + 1 (ack)
    pub seq: u16,
    /// Energy or flag word
    pub flags: u16,
    /// Forwarding entries
    pub entries: Vec<RouteEntry, MAX_PAIRS_PER_SOURCE>,
}

impl NcPacket {
    /// Configuration packet from route entries
    pub fn config<I>(seq: u16, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = RouteEntry>,
    {
        let mut out = Vec::new();
        for entry in entries {
            out.push(entry).map_err(|_| Error::RouteListFull)?;
        }
        Ok(Self {
            kind: PacketType::Config,
            seq,
            flags: 0,
            entries: out,
        })
    }

    /// Ack answering a configuration packet with sequence `seq`
    pub fn ack_for(seq: u16) -> Self {
        Self {
            kind: PacketType::ConfigAck,
            seq: seq.wrapping_add(1),
            flags: 0,
            entries: Vec::new(),
        }
    }

    /// Sequence number an ack refers to
    pub fn acknowledged_seq(&self) -> u16 {
        self.seq.wrapping_sub(1)
    }

    /// Serialize with checksum
    pub fn encode(&self) -> PacketBuf {
        let mut buf = PacketBuf::new();
        let payload_len = (self.entries.len() * ENTRY_LEN) as u8;
        // Entries are bounded, so the buffer never overflows
        let _ = buf.push(self.kind as u8);
        let _ = buf.push(payload_len);
        let _ = buf.extend_from_slice(&self.seq.to_be_bytes());
        let _ = buf.extend_from_slice(&self.flags.to_be_bytes());
        let _ = buf.extend_from_slice(&[0, 0]);
        for entry in &self.entries {
            let _ = buf.extend_from_slice(&entry.via.to_be_bytes());
            let _ = buf.extend_from_slice(&entry.dest.to_be_bytes());
        }

        let mut checksum = !internet_checksum(&buf);
        if checksum == 0 {
            checksum = 0xFFFF;
        }
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&checksum.to_be_bytes());
        buf
    }

    /// Parse and verify
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::Malformed);
        }
        let kind = PacketType::try_from(bytes[0])?;
        let payload_len = bytes[1] as usize;
        if payload_len % ENTRY_LEN != 0 || payload_len / ENTRY_LEN > MAX_PAIRS_PER_SOURCE {
            return Err(Error::Malformed);
        }
        let total = HEADER_LEN + payload_len;
        if bytes.len() < total {
            return Err(Error::Malformed);
        }
        let packet = &bytes[..total];
        if internet_checksum(packet) != 0xFFFF {
            return Err(Error::ChecksumMismatch);
        }

        let mut entries = Vec::new();
        for chunk in packet[HEADER_LEN..].chunks_exact(ENTRY_LEN) {
            let entry = RouteEntry {
                via: LinkAddr::from_be_bytes([chunk[0], chunk[1]]),
                dest: LinkAddr::from_be_bytes([chunk[2], chunk[3]]),
            };
            entries.push(entry).map_err(|_| Error::Malformed)?;
        }
        if kind == PacketType::ConfigAck && !entries.is_empty() {
            return Err(Error::Malformed);
        }

        Ok(Self {
            kind,
            seq: u16::from_be_bytes([packet[2], packet[3]]),
            flags: u16::from_be_bytes([packet[4], packet[5]]),
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(via: u16, dest: u16) -> RouteEntry {
        RouteEntry {
            via: LinkAddr(via),
            dest: LinkAddr(dest),
        }
    }

    #[test]
    fn test_rfc1071_example() {
        // RFC 1071 section 3 sample
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), 0xddf2);
    }

    #[test]
    fn test_odd_length_padding() {
        assert_eq!(internet_checksum(&[0x12]), 0x1200);
        assert_eq!(internet_checksum(&[0x12, 0x34, 0x56]), 0x1234 + 0x5600);
    }

    #[test]
    fn test_config_layout() {
        let packet = NcPacket::config(0x0102, [entry(0x0200, 0x0300)]).unwrap();
        let bytes = packet.encode();
        assert_eq!(bytes.len(), HEADER_LEN + ENTRY_LEN);
        assert_eq!(&bytes[..6], &[6, 4, 0x01, 0x02, 0, 0]);
        assert_eq!(&bytes[8..], &[0x02, 0x00, 0x03, 0x00]);
        assert_eq!(internet_checksum(&bytes), 0xFFFF);
        assert_eq!(NcPacket::decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_ack_seq_plus_one() {
        let ack = NcPacket::ack_for(0xFFFF);
        assert_eq!(ack.seq, 0);
        assert_eq!(ack.acknowledged_seq(), 0xFFFF);
        let bytes = ack.encode();
        assert_eq!(bytes[1], 0);
        assert_eq!(NcPacket::decode(&bytes).unwrap().kind, PacketType::ConfigAck);
    }

    #[test]
    fn test_corruption_detected() {
        let mut bytes = NcPacket::config(7, [entry(1, 2)]).unwrap().encode();
        bytes[9] ^= 0x40;
        assert_eq!(NcPacket::decode(&bytes), Err(Error::ChecksumMismatch));
    }

    #[test]
    fn test_malformed() {
        assert_eq!(NcPacket::decode(&[6, 0, 0]), Err(Error::Malformed));
        assert_eq!(NcPacket::decode(&[9, 0, 0, 0, 0, 0, 0, 0]), Err(Error::Malformed));
        // Claims one entry, carries none
        assert_eq!(NcPacket::decode(&[6, 4, 0, 0, 0, 0, 0, 0]), Err(Error::Malformed));
        assert_eq!(NcPacket::decode(&[6, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0]), Err(Error::Malformed));
    }

    #[test]
    fn test_too_many_entries() {
        let entries = (0..=MAX_PAIRS_PER_SOURCE as u16).map(|i| entry(i, i + 1));
        assert_eq!(NcPacket::config(1, entries), Err(Error::RouteListFull));
    }

    proptest! {
        /// Embedding the checksum makes the whole packet sum to 0xFFFF
        #[test]
        fn prop_checksum_verifies(
            seq in any::<u16>(),
            flags in any::<u16>(),
            raw in proptest::collection::vec((any::<u16>(), any::<u16>()), 0..=MAX_PAIRS_PER_SOURCE),
        ) {
            let mut packet = NcPacket::config(seq, raw.iter().map(|&(v, d)| entry(v, d))).unwrap();
            packet.flags = flags;
            let bytes = packet.encode();
            prop_assert_eq!(internet_checksum(&bytes), 0xFFFF);
            prop_assert_eq!(NcPacket::decode(&bytes).unwrap(), packet);
        }
    }
}
