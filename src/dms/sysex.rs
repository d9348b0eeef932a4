use std::fmt;

use crate::{
    Error,
    Ranged
};
use crate::dms::MIDIChannel;
use crate::dms::layout::BlockKind;

pub const SYSEX_START: u8 = 0xf0;
pub const SYSEX_END: u8 = 0xf7;

/// Wersi manufacturer id.
pub const MANUFACTURER_ID: u8 = 0x25;

/// Bytes before the nibble-encoded payload: start, manufacturer,
/// channel, frame tag, block address.
const HEADER_SIZE: usize = 5;
/// Checksum byte plus end marker after the payload.
const TRAILER_SIZE: usize = 2;

/// What one frame carries: a single block, or the request that starts
/// a dump.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FrameKind {
    Block(BlockKind),
    RequestDump,
}

impl FrameKind {
    pub fn tag(&self) -> u8 {
        match self {
            FrameKind::Block(BlockKind::Icb) => 0x01,
            FrameKind::Block(BlockKind::Vcf) => 0x02,
            FrameKind::Block(BlockKind::Ampl) => 0x03,
            FrameKind::Block(BlockKind::Freq) => 0x04,
            FrameKind::Block(BlockKind::Wave) => 0x05,
            FrameKind::RequestDump => 0x10,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(FrameKind::Block(BlockKind::Icb)),
            0x02 => Some(FrameKind::Block(BlockKind::Vcf)),
            0x03 => Some(FrameKind::Block(BlockKind::Ampl)),
            0x04 => Some(FrameKind::Block(BlockKind::Freq)),
            0x05 => Some(FrameKind::Block(BlockKind::Wave)),
            0x10 => Some(FrameKind::RequestDump),
            _ => None,
        }
    }

    /// Raw payload bytes carried by a frame of this kind.
    pub fn payload_size(&self) -> usize {
        match self {
            FrameKind::Block(kind) => kind.size(),
            FrameKind::RequestDump => 0,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{}",
            match self {
                FrameKind::Block(BlockKind::Icb) => "ICB",
                FrameKind::Block(BlockKind::Vcf) => "VCF",
                FrameKind::Block(BlockKind::Ampl) => "AMPL",
                FrameKind::Block(BlockKind::Freq) => "FREQ",
                FrameKind::Block(BlockKind::Wave) => "WAVE",
                FrameKind::RequestDump => "request dump",
            })
    }
}

/// One wire message: `F0 25 <channel> <tag> <address> <payload as
/// hi/lo nibble pairs> <checksum> F7`. Block bytes are nibble expanded
/// to stay seven bit clean; the checksum covers the nibbles.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub channel: MIDIChannel,
    pub kind: FrameKind,
    pub address: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn block(channel: MIDIChannel, kind: BlockKind, address: u8, payload: Vec<u8>) -> Self {
        Frame {
            channel,
            kind: FrameKind::Block(kind),
            address,
            payload,
        }
    }

    pub fn request_dump(channel: MIDIChannel) -> Self {
        Frame {
            channel,
            kind: FrameKind::RequestDump,
            address: 0,
            payload: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let nibbles = encode_nibbles(&self.payload);

        let mut data = Vec::with_capacity(HEADER_SIZE + nibbles.len() + TRAILER_SIZE);
        data.push(SYSEX_START);
        data.push(MANUFACTURER_ID);
        data.push(self.channel.as_byte());
        data.push(self.kind.tag());
        data.push(self.address);
        data.extend(&nibbles);
        data.push(sum_checksum(&nibbles));
        data.push(SYSEX_END);
        data
    }

    pub fn from_bytes(data: &[u8]) -> Result<Frame, Error> {
        if data.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(Error::InvalidLength(
                data.len() as u32, (HEADER_SIZE + TRAILER_SIZE) as u32));
        }
        if data[0] != SYSEX_START {
            return Err(Error::InvalidData(0));
        }
        if data[1] != MANUFACTURER_ID {
            return Err(Error::InvalidData(1));
        }
        if data[data.len() - 1] != SYSEX_END {
            return Err(Error::InvalidData(data.len() as u32 - 1));
        }
        if data[2] > 0x0f {
            return Err(Error::InvalidData(2));
        }

        let kind = FrameKind::from_tag(data[3]).ok_or(Error::InvalidData(3))?;
        let expected = HEADER_SIZE + 2 * kind.payload_size() + TRAILER_SIZE;
        if data.len() != expected {
            return Err(Error::InvalidLength(data.len() as u32, expected as u32));
        }

        let nibbles = &data[HEADER_SIZE..data.len() - TRAILER_SIZE];
        let stored = data[data.len() - TRAILER_SIZE];
        let computed = sum_checksum(nibbles);
        if computed != stored {
            return Err(Error::InvalidChecksum(computed, stored));
        }

        Ok(Frame {
            channel: MIDIChannel::new(data[2] as i32 + 1),
            kind,
            address: data[4],
            payload: decode_nibbles(nibbles, HEADER_SIZE)?,
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} frame for address {}, {} payload bytes",
            self.kind, self.address, self.payload.len())
    }
}

fn encode_nibbles(data: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(data.len() * 2);
    for b in data {
        nibbles.push(b >> 4);
        nibbles.push(b & 0x0f);
    }
    nibbles
}

// `base` is the offset of the nibble run inside the whole frame, so
// that errors point into the original message.
fn decode_nibbles(nibbles: &[u8], base: usize) -> Result<Vec<u8>, Error> {
    let mut data = Vec::with_capacity(nibbles.len() / 2);
    for (i, pair) in nibbles.chunks(2).enumerate() {
        if pair[0] > 0x0f {
            return Err(Error::InvalidData((base + i * 2) as u32));
        }
        if pair[1] > 0x0f {
            return Err(Error::InvalidData((base + i * 2 + 1) as u32));
        }
        data.push((pair[0] << 4) | pair[1]);
    }
    Ok(data)
}

/// Two's-complement sum checksum, masked to seven bits for the wire.
pub fn sum_checksum(data: &[u8]) -> u8 {
    let mut sum: u32 = 0;
    for b in data {
        sum += *b as u32;
    }

    let mut checksum: u8 = (sum & 0xff) as u8;
    checksum = !checksum;
    checksum = checksum.wrapping_add(1);
    checksum & 0x7f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dms::BlockData;
    use crate::dms::vcf::VcfBlock;

    fn sample_frame() -> Frame {
        Frame::block(
            MIDIChannel::new(2),
            BlockKind::Vcf,
            66,
            VcfBlock::new().to_bytes())
    }

    #[test]
    fn test_frame_round_trip() {
        let frame = sample_frame();
        let data = frame.to_bytes();
        assert_eq!(data.len(), HEADER_SIZE + 2 * 10 + TRAILER_SIZE);
        assert_eq!(Frame::from_bytes(&data).unwrap(), frame);
    }

    #[test]
    fn test_payload_is_seven_bit_clean() {
        let mut frame = sample_frame();
        frame.payload[3] = 0xff;
        let data = frame.to_bytes();
        assert!(data[1..data.len() - 1].iter().all(|b| *b < 0x80));
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let frame = sample_frame();
        let mut data = frame.to_bytes();
        data[HEADER_SIZE + 4] ^= 0x01;
        match Frame::from_bytes(&data) {
            Err(Error::InvalidChecksum(..)) => {},
            other => panic!("expected checksum error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_manufacturer_rejected() {
        let mut data = sample_frame().to_bytes();
        data[1] = 0x43;
        assert_eq!(Frame::from_bytes(&data), Err(Error::InvalidData(1)));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let data = sample_frame().to_bytes();
        assert!(matches!(
            Frame::from_bytes(&data[..10]),
            Err(Error::InvalidData(_)) | Err(Error::InvalidLength(..))));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut data = Frame::request_dump(MIDIChannel::new(1)).to_bytes();
        data[3] = 0x7e;
        assert_eq!(Frame::from_bytes(&data), Err(Error::InvalidData(3)));
    }

    #[test]
    fn test_request_dump_is_payload_free() {
        let data = Frame::request_dump(MIDIChannel::new(5)).to_bytes();
        assert_eq!(data.len(), HEADER_SIZE + TRAILER_SIZE);
        let frame = Frame::from_bytes(&data).unwrap();
        assert_eq!(frame.kind, FrameKind::RequestDump);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn test_sum_checksum() {
        // 1 + 2 + 3 = 6; two's complement of 6 is 0xFA, masked 0x7A.
        assert_eq!(sum_checksum(&[1, 2, 3]), 0x7a);
        assert_eq!(sum_checksum(&[]), 0);
    }
}
