use std::fmt;
use bit::BitIndex;

use crate::{
    Error,
    Ranged
};
use crate::dms::BlockData;
use crate::dms::layout::VCF_SIZE;

/// Filter cutoff (0...127)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Cutoff(i32);

crate::ranged_impl!(Cutoff, 0, 127, 64);

impl Cutoff {
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

/// Filter resonance (0...63)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Resonance(i32);

crate::ranged_impl!(Resonance, 0, 63, 0);

impl Resonance {
    pub fn as_byte(&self) -> u8 {
        self.0 as u8
    }
}

/// Filter block, only referenced by later device generations.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VcfBlock {
    pub low_pass: bool,
    pub noise: bool,
    pub distortion: bool,
    pub four_pole: bool,
    pub cutoff: Cutoff,
    pub resonance: Resonance,
    pub envelope_mode: u8,
    pub tracking: [u8; 6],
}

impl VcfBlock {
    pub fn new() -> Self {
        VcfBlock {
            low_pass: true,
            noise: false,
            distortion: false,
            four_pole: false,
            cutoff: Cutoff::default(),
            resonance: Resonance::default(),
            envelope_mode: 0,
            tracking: [0; 6],
        }
    }
}

impl Default for VcfBlock {
    fn default() -> Self {
        VcfBlock::new()
    }
}

impl BlockData for VcfBlock {
    const SIZE: usize = VCF_SIZE;

    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidLength(data.len() as u32, Self::SIZE as u32));
        }
        if !Cutoff::contains(data[1] as i32) {
            return Err(Error::InvalidData(1));
        }
        if !Resonance::contains(data[2] as i32) {
            return Err(Error::InvalidData(2));
        }

        let flags = data[0];
        let mut tracking = [0u8; 6];
        tracking.copy_from_slice(&data[4..10]);

        Ok(VcfBlock {
            low_pass: flags.bit(0),
            noise: flags.bit(1),
            distortion: flags.bit(2),
            four_pole: flags.bit(3),
            cutoff: Cutoff::new(data[1] as i32),
            resonance: Resonance::new(data[2] as i32),
            envelope_mode: data[3],
            tracking,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        flags.set_bit(0, self.low_pass);
        flags.set_bit(1, self.noise);
        flags.set_bit(2, self.distortion);
        flags.set_bit(3, self.four_pole);

        let mut data = vec![
            flags,
            self.cutoff.as_byte(),
            self.resonance.as_byte(),
            self.envelope_mode,
        ];
        data.extend(self.tracking);

        assert_eq!(data.len(), Self::SIZE);

        data
    }
}

impl fmt::Display for VcfBlock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "cutoff={} resonance={} {}",
            self.cutoff, self.resonance,
            if self.low_pass { "LP" } else { "BP" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vcf_round_trip() {
        let mut vcf = VcfBlock::new();
        vcf.cutoff = Cutoff::new(100);
        vcf.resonance = Resonance::new(30);
        vcf.four_pole = true;
        vcf.tracking = [1, 2, 3, 4, 5, 6];

        let data = vcf.to_bytes();
        assert_eq!(data.len(), VCF_SIZE);
        assert_eq!(VcfBlock::from_bytes(&data).unwrap(), vcf);
    }

    #[test]
    fn test_out_of_range_cutoff_rejected() {
        let mut data = VcfBlock::new().to_bytes();
        data[1] = 0x90;
        assert_eq!(VcfBlock::from_bytes(&data), Err(Error::InvalidData(1)));
    }

    #[test]
    fn test_out_of_range_resonance_rejected() {
        let mut data = VcfBlock::new().to_bytes();
        data[2] = 64;
        assert_eq!(VcfBlock::from_bytes(&data), Err(Error::InvalidData(2)));
    }
}
