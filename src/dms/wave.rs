use crate::Error;
use crate::dms::BlockData;
use crate::dms::layout::WAVE_SIZE;

pub const BASS_LENGTH: usize = 64;
pub const TENOR_LENGTH: usize = 64;
pub const ALTO_LENGTH: usize = 32;
pub const SOPRANO_LENGTH: usize = 16;
pub const FORMANT_LENGTH: usize = 32;

/// Waveform block: one signed sample table per voice register, plus
/// the fixed formant table. Higher registers get shorter tables.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WaveBlock {
    pub level: u8,
    pub flags: u8,
    pub bass: [i8; BASS_LENGTH],
    pub tenor: [i8; TENOR_LENGTH],
    pub alto: [i8; ALTO_LENGTH],
    pub soprano: [i8; SOPRANO_LENGTH],
    pub formant: [i8; FORMANT_LENGTH],
    pub reserved: [u8; 2],
}

impl WaveBlock {
    pub fn new() -> Self {
        WaveBlock {
            level: 0,
            flags: 0,
            bass: [0; BASS_LENGTH],
            tenor: [0; TENOR_LENGTH],
            alto: [0; ALTO_LENGTH],
            soprano: [0; SOPRANO_LENGTH],
            formant: [0; FORMANT_LENGTH],
            reserved: [0; 2],
        }
    }
}

impl Default for WaveBlock {
    fn default() -> Self {
        WaveBlock::new()
    }
}

fn read_samples<const N: usize>(data: &[u8], offset: usize) -> [i8; N] {
    let mut samples = [0i8; N];
    for (i, sample) in samples.iter_mut().enumerate() {
        *sample = data[offset + i] as i8;
    }
    samples
}

impl BlockData for WaveBlock {
    const SIZE: usize = WAVE_SIZE;

    fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        if data.len() < Self::SIZE {
            return Err(Error::InvalidLength(data.len() as u32, Self::SIZE as u32));
        }

        let mut offset = 2;
        let bass = read_samples::<BASS_LENGTH>(data, offset);
        offset += BASS_LENGTH;
        let tenor = read_samples::<TENOR_LENGTH>(data, offset);
        offset += TENOR_LENGTH;
        let alto = read_samples::<ALTO_LENGTH>(data, offset);
        offset += ALTO_LENGTH;
        let soprano = read_samples::<SOPRANO_LENGTH>(data, offset);
        offset += SOPRANO_LENGTH;
        let formant = read_samples::<FORMANT_LENGTH>(data, offset);
        offset += FORMANT_LENGTH;

        Ok(WaveBlock {
            level: data[0],
            flags: data[1],
            bass,
            tenor,
            alto,
            soprano,
            formant,
            reserved: [data[offset], data[offset + 1]],
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        data.push(self.level);
        data.push(self.flags);
        data.extend(self.bass.iter().map(|s| *s as u8));
        data.extend(self.tenor.iter().map(|s| *s as u8));
        data.extend(self.alto.iter().map(|s| *s as u8));
        data.extend(self.soprano.iter().map(|s| *s as u8));
        data.extend(self.formant.iter().map(|s| *s as u8));
        data.extend(self.reserved);

        assert_eq!(data.len(), Self::SIZE);

        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wave_round_trip() {
        let mut wave = WaveBlock::new();
        wave.level = 42;
        for (i, sample) in wave.bass.iter_mut().enumerate() {
            *sample = (i as i8).wrapping_mul(3).wrapping_sub(64);
        }
        wave.soprano[15] = -128;
        wave.formant[0] = 127;

        let data = wave.to_bytes();
        assert_eq!(data.len(), WAVE_SIZE);
        assert_eq!(WaveBlock::from_bytes(&data).unwrap(), wave);
    }

    #[test]
    fn test_register_table_offsets() {
        let mut wave = WaveBlock::new();
        wave.tenor[0] = -1;
        wave.alto[0] = -2;
        wave.soprano[0] = -3;

        let data = wave.to_bytes();
        assert_eq!(data[2 + BASS_LENGTH], 0xff);
        assert_eq!(data[2 + BASS_LENGTH + TENOR_LENGTH], 0xfe);
        assert_eq!(data[2 + BASS_LENGTH + TENOR_LENGTH + ALTO_LENGTH], 0xfd);
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert_eq!(
            WaveBlock::from_bytes(&[0u8; 100]),
            Err(Error::InvalidLength(100, 212)));
    }
}
