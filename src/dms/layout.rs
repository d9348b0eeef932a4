//! Fixed byte-offset tables for the DMS block formats.
//!
//! Everything in here is pure data: block sizes, table offsets inside a
//! cartridge or device image, and the slot/address arithmetic shared by
//! the codec and the transfer protocol. No behavior beyond accessors.

/// Instrument Control Block, one per patch slot.
pub const ICB_SIZE: usize = 16;
/// Filter block.
pub const VCF_SIZE: usize = 10;
/// Amplitude envelope block.
pub const AMPL_SIZE: usize = 44;
/// Frequency envelope block.
pub const FREQ_SIZE: usize = 32;
/// Waveform block (four voice registers plus formant table).
pub const WAVE_SIZE: usize = 212;

/// Header bytes at the start of every cartridge image.
pub const CARTRIDGE_HEADER_SIZE: usize = 16;

/// The only two cartridge image sizes ever produced.
pub const CARTRIDGE_SIZE_SMALL: usize = 8192;
pub const CARTRIDGE_SIZE_LARGE: usize = 16384;

/// Block counts in a live device's patch RAM. Both generations share
/// these; only the addressing base differs.
pub const DEVICE_ICB_COUNT: usize = 20;
pub const DEVICE_VCF_COUNT: usize = 10;
pub const DEVICE_AMPL_COUNT: usize = 20;
pub const DEVICE_FREQ_COUNT: usize = 20;
pub const DEVICE_WAVE_COUNT: usize = 20;

/// Total bytes of a full device dump. This is also the transfer-unit
/// budget for a read transaction.
pub const DEVICE_IMAGE_SIZE: usize =
    DEVICE_ICB_COUNT * ICB_SIZE
    + DEVICE_VCF_COUNT * VCF_SIZE
    + DEVICE_AMPL_COUNT * AMPL_SIZE
    + DEVICE_FREQ_COUNT * FREQ_SIZE
    + DEVICE_WAVE_COUNT * WAVE_SIZE;

/// The five block types of the DMS system.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BlockKind {
    Icb,
    Vcf,
    Ampl,
    Freq,
    Wave,
}

impl BlockKind {
    pub fn size(&self) -> usize {
        match self {
            BlockKind::Icb => ICB_SIZE,
            BlockKind::Vcf => VCF_SIZE,
            BlockKind::Ampl => AMPL_SIZE,
            BlockKind::Freq => FREQ_SIZE,
            BlockKind::Wave => WAVE_SIZE,
        }
    }
}

/// Block addresses above the tenth skip one address. The hardware keeps
/// something else at `base + 10`, so twenty blocks occupy a 21-address
/// window with a hole in the middle.
pub fn block_address(base: u8, index: usize) -> u8 {
    let mut addr = base as usize + index;
    if index >= 10 {
        addr += 1;
    }
    addr as u8
}

/// Inverse of [`block_address`]. Returns `None` for the hole address
/// and for addresses outside the window.
pub fn block_index(base: u8, addr: u8) -> Option<usize> {
    if addr < base {
        return None;
    }
    let offset = (addr - base) as usize;
    match offset {
        0..=9 => Some(offset),
        10 => None,
        11..=20 => Some(offset - 1),
        _ => None,
    }
}

/// Table offsets inside a cartridge image. One ICB, VCF, AMPL, FREQ and
/// WAVE block per slot; tables are laid out back to back after the
/// header, the remainder of the image is 0xFF fill.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CartridgeLayout {
    pub slots: usize,
}

impl CartridgeLayout {
    /// Picks the layout matching an image size, if any.
    pub fn for_image_size(size: usize) -> Option<Self> {
        match size {
            CARTRIDGE_SIZE_SMALL => Some(CartridgeLayout { slots: 10 }),
            CARTRIDGE_SIZE_LARGE => Some(CartridgeLayout { slots: 20 }),
            _ => None,
        }
    }

    pub fn image_size(&self) -> usize {
        if self.slots <= 10 { CARTRIDGE_SIZE_SMALL } else { CARTRIDGE_SIZE_LARGE }
    }

    /// End of the used data region; padding starts here.
    pub fn data_end(&self) -> usize {
        self.wave_offset(self.slots)
    }

    pub fn icb_offset(&self, index: usize) -> usize {
        CARTRIDGE_HEADER_SIZE + index * ICB_SIZE
    }

    pub fn vcf_offset(&self, index: usize) -> usize {
        self.icb_offset(self.slots) + index * VCF_SIZE
    }

    pub fn ampl_offset(&self, index: usize) -> usize {
        self.vcf_offset(self.slots) + index * AMPL_SIZE
    }

    pub fn freq_offset(&self, index: usize) -> usize {
        self.ampl_offset(self.slots) + index * FREQ_SIZE
    }

    pub fn wave_offset(&self, index: usize) -> usize {
        self.freq_offset(self.slots) + index * WAVE_SIZE
    }
}

/// Table offsets inside a full device dump image.
pub struct DeviceLayout;

impl DeviceLayout {
    pub fn icb_offset(index: usize) -> usize {
        index * ICB_SIZE
    }

    pub fn vcf_offset(index: usize) -> usize {
        DEVICE_ICB_COUNT * ICB_SIZE + index * VCF_SIZE
    }

    pub fn ampl_offset(index: usize) -> usize {
        Self::vcf_offset(DEVICE_VCF_COUNT) + index * AMPL_SIZE
    }

    pub fn freq_offset(index: usize) -> usize {
        Self::ampl_offset(DEVICE_AMPL_COUNT) + index * FREQ_SIZE
    }

    pub fn wave_offset(index: usize) -> usize {
        Self::freq_offset(DEVICE_FREQ_COUNT) + index * WAVE_SIZE
    }
}
