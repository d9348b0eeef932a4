use std::convert::TryFrom;
use std::fmt;

use crate::{
    Error,
    Ranged
};

pub mod layout;
pub mod icb;
pub mod envelope;
pub mod wave;
pub mod vcf;
pub mod store;
pub mod cartridge;
pub mod sysex;
pub mod device;

/// Parsing and generating the raw bytes of one fixed-size block.
pub trait BlockData: Sized {
    const SIZE: usize;

    fn from_bytes(data: &[u8]) -> Result<Self, Error>;
    fn to_bytes(&self) -> Vec<u8>;
}

/// The two supported instrument hardware families. They differ in
/// block addressing, not in block contents.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum Generation {
    Mk1 = 1,
    Dx10 = 2,
}

impl Generation {
    /// Slot address of the first instrument on a live device of this
    /// generation. Cartridges always address slots from 1; the device
    /// base differs by a fixed constant per generation.
    pub fn device_slot_base(&self) -> u8 {
        match self {
            Generation::Mk1 => 65,
            Generation::Dx10 => 33,
        }
    }
}

impl TryFrom<u8> for Generation {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Generation::Mk1),
            2 => Ok(Generation::Dx10),
            _ => Err(Error::InvalidData(0))
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f, "{}",
            match *self {
                Generation::Mk1 => "MK1",
                Generation::Dx10 => "DX10"
            })
    }
}

/// MIDI channel (1...16)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MIDIChannel(i32);

crate::ranged_impl!(MIDIChannel, 1, 16, 1);

impl MIDIChannel {
    pub fn as_byte(&self) -> u8 {
        (self.0 - 1) as u8  // adjust to 0...15 for the wire
    }
}

/// Key transpose in semitones (-24...+24), stored biased by +24.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Transpose(i32);

crate::ranged_impl!(Transpose, -24, 24, 0);

impl Transpose {
    pub fn as_byte(&self) -> u8 {
        (self.0 + 24) as u8
    }

    pub fn from_byte(value: u8) -> Result<Self, Error> {
        let v = value as i32 - 24;
        if Transpose::contains(v) {
            Ok(Transpose::new(v))
        }
        else {
            Err(Error::InvalidData(0))
        }
    }
}

/// Oscillator detune (-7...+7), stored biased by +7.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Detune(i32);

crate::ranged_impl!(Detune, -7, 7, 0);

impl Detune {
    pub fn as_byte(&self) -> u8 {
        (self.0 + 7) as u8
    }

    pub fn from_byte(value: u8) -> Result<Self, Error> {
        let v = value as i32 - 7;
        if Detune::contains(v) {
            Ok(Detune::new(v))
        }
        else {
            Err(Error::InvalidData(0))
        }
    }
}

// Finds the first offset where the two slices differ.
// Returns None if no differences are found, or if the slices
// are different lengths, Some<usize> with the offset otherwise.
pub fn first_different_offset(v1: &[u8], v2: &[u8]) -> Option<usize> {
    if v1.len() != v2.len() {
        return None;
    }

    for i in 0..v1.len() {
        if v1[i] != v2[i] {
            return Some(i);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_from_byte() {
        assert_eq!(Generation::try_from(1).unwrap(), Generation::Mk1);
        assert_eq!(Generation::try_from(2).unwrap(), Generation::Dx10);
        assert!(Generation::try_from(3).is_err());
    }

    #[test]
    fn test_device_slot_base() {
        assert_eq!(Generation::Mk1.device_slot_base(), 65);
        assert_eq!(Generation::Dx10.device_slot_base(), 33);
    }

    #[test]
    fn test_midi_channel_as_byte() {
        assert_eq!(MIDIChannel::new(1).as_byte(), 0);
        assert_eq!(MIDIChannel::new(16).as_byte(), 15);
    }

    #[test]
    fn test_transpose_bias() {
        assert_eq!(Transpose::new(0).as_byte(), 24);
        assert_eq!(Transpose::from_byte(0).unwrap().value(), -24);
        assert!(Transpose::from_byte(100).is_err());
    }

    #[test]
    fn test_detune_bias() {
        assert_eq!(Detune::new(-7).as_byte(), 0);
        assert_eq!(Detune::from_byte(14).unwrap().value(), 7);
        assert!(Detune::from_byte(15).is_err());
    }

    #[test]
    fn test_first_different_offset() {
        assert_eq!(first_different_offset(&[1, 2, 3], &[1, 2, 3]), None);
        assert_eq!(first_different_offset(&[1, 2, 3], &[1, 9, 3]), Some(1));
        assert_eq!(first_different_offset(&[1, 2], &[1, 2, 3]), None);
    }
}
