use std::fmt;

use crate::{
    Error,
    Ranged
};
use crate::dms::BlockData;
use crate::dms::layout::{
    AMPL_SIZE,
    FREQ_SIZE
};

/// Envelope segment rate (0...63)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Rate(i32);

crate::ranged_impl!(Rate, 0, 63, 0);

impl Rate {
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

/// Envelope segment target level (0...63)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Level(i32);

crate::ranged_impl!(Level, 0, 63, 0);

impl Level {
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

/// One staged envelope segment: how fast to move, where to end up,
/// plus a raw flag byte (segment shape and trigger bits).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Segment {
    pub rate: Rate,
    pub level: Level,
    pub flags: u8,
}

impl Segment {
    pub fn new(rate: i32, level: i32) -> Self {
        Segment {
            rate: Rate::new(rate),
            level: Level::new(level),
            flags: 0,
        }
    }
}

impl Default for Segment {
    fn default() -> Self {
        Segment::new(0, 0)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "R={} L={}", self.rate, self.level)
    }
}

// Segment values are range checked on decode. An out-of-range byte is
// a data format error, never clamped.
fn parse_segments<const N: usize>(data: &[u8], base: usize) -> Result<[Segment; N], Error> {
    let mut segments = [Segment::default(); N];
    for (i, segment) in segments.iter_mut().enumerate() {
        let offset = base + i * 3;
        let rate = data[offset] as i32;
        if !Rate::contains(rate) {
            return Err(Error::InvalidData(offset as u32));
        }
        let level = data[offset + 1] as i32;
        if !Level::contains(level) {
            return Err(Error::InvalidData((offset + 1) as u32));
        }
        *segment = Segment {
            rate: Rate::new(rate),
            level: Level::new(level),
            flags: data[offset + 2],
        };
    }
    Ok(segments)
}

fn segment_bytes(segments: &[Segment]) -> Vec<u8> {
    let mut data = Vec::with_capacity(segments.len() * 3);
    for segment in segments {
        data.push(segment.rate.as_byte());
        data.push(segment.level.as_byte());
        data.push(segment.flags);
    }
    data
}

/// Amplitude envelope block: 14 staged segments.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AmplBlock {
    pub mode: u8,
    pub loop_segment: u8,  // 0...13
    pub segments: [Segment; 14],
}

impl AmplBlock {
    pub fn new() -> Self {
        AmplBlock {
            mode: 0,
            loop_segment: 0,
            segments: [Segment::default(); 14],
        }
    }

    /// Makes an ADSR-style amplitude envelope in the first four
    /// segments, the rest left flat.
    pub fn adsr(attack: i32, decay: i32, sustain: i32, release: i32) -> Self {
        let mut block = AmplBlock::new();
        block.segments[0] = Segment::new(attack, 63);
        block.segments[1] = Segment::new(decay, sustain);
        block.segments[2] = Segment::new(0, sustain);
        block.segments[3] = Segment::new(release, 0);
        block.loop_segment = 2;
        block
    }
}

impl Default for AmplBlock {
    fn default() -> Self {
        AmplBlock::new()
    }
}

impl BlockData for AmplBlock {
    const SIZE: usize = AMPL_SIZE;

    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidLength(data.len() as u32, Self::SIZE as u32));
        }
        if data[1] >= 14 {
            return Err(Error::InvalidData(1));
        }
        Ok(AmplBlock {
            mode: data[0],
            loop_segment: data[1],
            segments: parse_segments::<14>(data, 2)?,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![self.mode, self.loop_segment];
        data.extend(segment_bytes(&self.segments));
        assert_eq!(data.len(), Self::SIZE);
        data
    }
}

/// Frequency envelope block: 10 staged segments.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FreqBlock {
    pub mode: u8,
    pub loop_segment: u8,  // 0...9
    pub segments: [Segment; 10],
}

impl FreqBlock {
    pub fn new() -> Self {
        FreqBlock {
            mode: 0,
            loop_segment: 0,
            segments: [Segment::default(); 10],
        }
    }
}

impl Default for FreqBlock {
    fn default() -> Self {
        FreqBlock::new()
    }
}

impl BlockData for FreqBlock {
    const SIZE: usize = FREQ_SIZE;

    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidLength(data.len() as u32, Self::SIZE as u32));
        }
        if data[1] >= 10 {
            return Err(Error::InvalidData(1));
        }
        Ok(FreqBlock {
            mode: data[0],
            loop_segment: data[1],
            segments: parse_segments::<10>(data, 2)?,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut data = vec![self.mode, self.loop_segment];
        data.extend(segment_bytes(&self.segments));
        assert_eq!(data.len(), Self::SIZE);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ampl_round_trip() {
        let block = AmplBlock::adsr(10, 20, 40, 15);
        let data = block.to_bytes();
        assert_eq!(data.len(), AMPL_SIZE);
        assert_eq!(AmplBlock::from_bytes(&data).unwrap(), block);
    }

    #[test]
    fn test_freq_round_trip() {
        let mut block = FreqBlock::new();
        block.segments[0] = Segment::new(5, 63);
        block.segments[9] = Segment::new(63, 1);
        block.loop_segment = 9;
        let data = block.to_bytes();
        assert_eq!(data.len(), FREQ_SIZE);
        assert_eq!(FreqBlock::from_bytes(&data).unwrap(), block);
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let mut data = AmplBlock::new().to_bytes();
        data[2] = 64;  // first segment rate
        assert_eq!(AmplBlock::from_bytes(&data), Err(Error::InvalidData(2)));
    }

    #[test]
    fn test_out_of_range_level_rejected() {
        let mut data = FreqBlock::new().to_bytes();
        data[6] = 0x80;  // second segment level
        assert_eq!(FreqBlock::from_bytes(&data), Err(Error::InvalidData(6)));
    }

    #[test]
    fn test_bad_loop_segment_rejected() {
        let mut data = FreqBlock::new().to_bytes();
        data[1] = 10;
        assert_eq!(FreqBlock::from_bytes(&data), Err(Error::InvalidData(1)));
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert_eq!(
            AmplBlock::from_bytes(&[0u8; 10]),
            Err(Error::InvalidLength(10, 44)));
    }
}
