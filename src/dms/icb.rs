use std::fmt;
use bit::BitIndex;

use crate::{
    Error,
    Ranged
};
use crate::dms::{
    BlockData,
    Detune,
    Transpose
};
use crate::dms::layout::ICB_SIZE;

/// Instrument names are seven ASCII characters, space padded.
pub const NAME_LENGTH: usize = 7;

/// Dynamics level (0...3)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Dynamics(i32);

crate::ranged_impl!(Dynamics, 0, 3, 0);

impl Dynamics {
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

/// Voice assignment mode of an instrument.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum VoiceMode {
    Rotary = 0,
    Fixed = 1,
    Solo = 2,
}

impl VoiceMode {
    fn from_bits(value: u8) -> Option<Self> {
        match value {
            0 => Some(VoiceMode::Rotary),
            1 => Some(VoiceMode::Fixed),
            2 => Some(VoiceMode::Solo),
            _ => None,
        }
    }
}

/// Instrument Control Block: per-slot metadata with references (by
/// block address) to the envelope, waveform and filter blocks that
/// make up the instrument. References are resolved by the owning
/// store, never by the ICB itself; 0 means unset.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Icb {
    pub next: u8,   // slot of a chained ICB, 0 = none
    pub vcf: u8,
    pub ampl: u8,
    pub freq: u8,
    pub wave: u8,
    pub dynamics: Dynamics,
    pub low_select: bool,
    pub high_select: bool,
    pub voice_mode: VoiceMode,
    pub transpose: Transpose,
    pub detune: Detune,
    pub bright: bool,
    pub vcf_enabled: bool,
    pub wersivoice: bool,
    pub routing: u8,  // output routing, 0...7
    name: String,
}

impl Icb {
    pub fn new(name: &str) -> Result<Self, Error> {
        let mut icb = Icb {
            next: 0,
            vcf: 0,
            ampl: 0,
            freq: 0,
            wave: 0,
            dynamics: Dynamics::default(),
            low_select: false,
            high_select: false,
            voice_mode: VoiceMode::Rotary,
            transpose: Transpose::default(),
            detune: Detune::default(),
            bright: false,
            vcf_enabled: false,
            wersivoice: false,
            routing: 0,
            name: String::new(),
        };
        icb.set_name(name)?;
        Ok(icb)
    }

    /// The display name with padding trimmed.
    pub fn name(&self) -> &str {
        self.name.trim_end()
    }

    /// Renames the instrument. At most seven printable ASCII
    /// characters; the stored name is space padded to full length.
    pub fn set_name(&mut self, name: &str) -> Result<(), Error> {
        if name.len() > NAME_LENGTH
            || !name.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(Error::InvalidData(9));
        }
        self.name = format!("{:<1$}", name, NAME_LENGTH);
        Ok(())
    }

    pub fn ampl_block(&self) -> Option<u8> {
        if self.ampl == 0 { None } else { Some(self.ampl) }
    }

    pub fn freq_block(&self) -> Option<u8> {
        if self.freq == 0 { None } else { Some(self.freq) }
    }

    pub fn wave_block(&self) -> Option<u8> {
        if self.wave == 0 { None } else { Some(self.wave) }
    }

    pub fn vcf_block(&self) -> Option<u8> {
        if self.vcf == 0 { None } else { Some(self.vcf) }
    }

    /// An unused slot in a cartridge or device image is marked by a
    /// name field starting with 0x00 or 0xFF.
    pub fn is_empty_slot(data: &[u8]) -> bool {
        data.len() < ICB_SIZE || data[9] == 0x00 || data[9] == 0xff
    }
}

impl BlockData for Icb {
    const SIZE: usize = ICB_SIZE;

    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidLength(data.len() as u32, Self::SIZE as u32));
        }

        let select = data[5];
        let voice_mode = VoiceMode::from_bits(select.bit_range(4..7))
            .ok_or(Error::InvalidData(5))?;

        let transpose = Transpose::from_byte(data[6])
            .map_err(|_| Error::InvalidData(6))?;
        let detune = Detune::from_byte(data[7])
            .map_err(|_| Error::InvalidData(7))?;

        let name_bytes = &data[9..9 + NAME_LENGTH];
        for (i, b) in name_bytes.iter().enumerate() {
            if !(0x20..=0x7e).contains(b) {
                return Err(Error::InvalidData((9 + i) as u32));
            }
        }
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| Error::InvalidData(9))?;

        let output = data[8];

        Ok(Icb {
            next: data[0],
            vcf: data[1],
            ampl: data[2],
            freq: data[3],
            wave: data[4],
            dynamics: Dynamics::new(select.bit_range(0..2) as i32),
            low_select: select.bit(2),
            high_select: select.bit(3),
            voice_mode,
            transpose,
            detune,
            bright: output.bit(0),
            vcf_enabled: output.bit(1),
            wersivoice: output.bit(2),
            routing: output.bit_range(3..6),
            name,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut select = 0u8;
        select.set_bit_range(0..2, self.dynamics.as_byte());
        select.set_bit(2, self.low_select);
        select.set_bit(3, self.high_select);
        select.set_bit_range(4..7, self.voice_mode as u8);

        let mut output = 0u8;
        output.set_bit(0, self.bright);
        output.set_bit(1, self.vcf_enabled);
        output.set_bit(2, self.wersivoice);
        output.set_bit_range(3..6, self.routing);

        let mut data = vec![
            self.next,
            self.vcf,
            self.ampl,
            self.freq,
            self.wave,
            select,
            self.transpose.as_byte(),
            self.detune.as_byte(),
            output,
        ];
        data.extend(self.name.as_bytes());

        assert_eq!(data.len(), Self::SIZE);

        data
    }
}

impl fmt::Display for Icb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (AMPL {} FREQ {} WAVE {} VCF {})",
            self.name(), self.ampl, self.freq, self.wave, self.vcf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dms::first_different_offset;

    fn sample_icb() -> Icb {
        let mut icb = Icb::new("PIANO").unwrap();
        icb.ampl = 3;
        icb.freq = 3;
        icb.wave = 3;
        icb.vcf = 2;
        icb.transpose = Transpose::new(-12);
        icb.detune = Detune::new(2);
        icb.dynamics = Dynamics::new(1);
        icb.voice_mode = VoiceMode::Solo;
        icb.bright = true;
        icb.vcf_enabled = true;
        icb.routing = 5;
        icb
    }

    #[test]
    fn test_icb_round_trip() {
        let icb = sample_icb();
        let data = icb.to_bytes();
        assert_eq!(data.len(), ICB_SIZE);
        let decoded = Icb::from_bytes(&data).unwrap();
        assert_eq!(decoded, icb);
        assert_eq!(first_different_offset(&decoded.to_bytes(), &data), None);
    }

    #[test]
    fn test_name_is_padded() {
        let icb = Icb::new("ORGAN").unwrap();
        assert_eq!(icb.name(), "ORGAN");
        assert_eq!(&icb.to_bytes()[9..16], b"ORGAN  ");
    }

    #[test]
    fn test_name_too_long_rejected() {
        assert!(Icb::new("TOO LONG NAME").is_err());
    }

    #[test]
    fn test_bad_transpose_byte() {
        let mut data = sample_icb().to_bytes();
        data[6] = 0xf0;
        assert_eq!(Icb::from_bytes(&data), Err(Error::InvalidData(6)));
    }

    #[test]
    fn test_unprintable_name_rejected() {
        let mut data = sample_icb().to_bytes();
        data[11] = 0x01;
        assert_eq!(Icb::from_bytes(&data), Err(Error::InvalidData(11)));
    }

    #[test]
    fn test_empty_slot_marker() {
        let mut data = sample_icb().to_bytes();
        assert!(!Icb::is_empty_slot(&data));
        data[9] = 0xff;
        assert!(Icb::is_empty_slot(&data));
    }

    #[test]
    fn test_unset_references_are_none() {
        let icb = Icb::new("EMPTY").unwrap();
        assert_eq!(icb.ampl_block(), None);
        assert_eq!(icb.wave_block(), None);
        assert_eq!(sample_icb().wave_block(), Some(3));
    }
}
