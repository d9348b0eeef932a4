use log::debug;

use crate::Error;
use crate::dms::{
    BlockData,
    Generation
};
use crate::dms::envelope::{
    AmplBlock,
    FreqBlock
};
use crate::dms::icb::Icb;
use crate::dms::layout::{
    CartridgeLayout,
    CARTRIDGE_HEADER_SIZE,
    CARTRIDGE_SIZE_LARGE,
    CARTRIDGE_SIZE_SMALL,
    ICB_SIZE
};
use crate::dms::store::{
    remap_contents,
    Bank,
    Instruments,
    InstrumentStore
};
use crate::dms::sysex::sum_checksum;
use crate::dms::vcf::VcfBlock;
use crate::dms::wave::WaveBlock;

/// An instrument store decoded from a cartridge image.
///
/// The two known layouts carry no reliable magic number, so decoding
/// sniffs: the MK1 layout is tried first, then the DX10 layout, and
/// the first one whose structural markers and checksum validate wins.
#[derive(Debug, Clone)]
pub struct CartridgeStore {
    generation: Generation,
    layout: CartridgeLayout,
    bank: Bank,
}

impl CartridgeStore {
    /// Creates an empty 8 KiB cartridge of the given generation.
    pub fn new(generation: Generation) -> Self {
        let mut store = CartridgeStore {
            generation,
            layout: CartridgeLayout { slots: 10 },
            bank: Bank::new(),
        };
        store.bank.buffer = store.to_bytes();
        store
    }

    /// Creates an empty 16 KiB cartridge. Only the DX10 layout ever
    /// shipped at this size.
    pub fn new_large() -> Self {
        let mut store = CartridgeStore {
            generation: Generation::Dx10,
            layout: CartridgeLayout { slots: 20 },
            bank: Bank::new(),
        };
        store.bank.buffer = store.to_bytes();
        store
    }

    /// Decodes a cartridge image. The input is never mutated; the
    /// store keeps its own private copy.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let layout = match CartridgeLayout::for_image_size(data.len()) {
            Some(layout) => layout,
            None => {
                let expected = if data.len() > CARTRIDGE_SIZE_SMALL {
                    CARTRIDGE_SIZE_LARGE
                }
                else {
                    CARTRIDGE_SIZE_SMALL
                };
                return Err(Error::InvalidLength(data.len() as u32, expected as u32));
            }
        };

        match parse_mk1(data, layout) {
            Ok(bank) => {
                debug!("cartridge image validated as MK1, {} slots", layout.slots);
                return Ok(CartridgeStore { generation: Generation::Mk1, layout, bank });
            }
            Err(e) => debug!("not an MK1 cartridge: {}", e),
        }

        match parse_dx10(data, layout) {
            Ok(bank) => {
                debug!("cartridge image validated as DX10, {} slots", layout.slots);
                return Ok(CartridgeStore { generation: Generation::Dx10, layout, bank });
            }
            Err(e) => debug!("not a DX10 cartridge: {}", e),
        }

        Err(Error::UnknownFormat)
    }

    /// Serializes the store back into a cartridge image, recomputing
    /// the layout's header markers and checksum.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut image = vec![0xffu8; self.layout.image_size()];
        image[..CARTRIDGE_HEADER_SIZE].fill(0);

        for (slot, icb) in &self.bank.icbs {
            let offset = self.layout.icb_offset(*slot as usize - 1);
            image[offset..offset + ICB_SIZE].copy_from_slice(&icb.to_bytes());
        }
        for (address, block) in &self.bank.vcfs {
            let offset = self.layout.vcf_offset(*address as usize - 1);
            image[offset..offset + VcfBlock::SIZE].copy_from_slice(&block.to_bytes());
        }
        for (address, block) in &self.bank.ampls {
            let offset = self.layout.ampl_offset(*address as usize - 1);
            image[offset..offset + AmplBlock::SIZE].copy_from_slice(&block.to_bytes());
        }
        for (address, block) in &self.bank.freqs {
            let offset = self.layout.freq_offset(*address as usize - 1);
            image[offset..offset + FreqBlock::SIZE].copy_from_slice(&block.to_bytes());
        }
        for (address, block) in &self.bank.waves {
            let offset = self.layout.wave_offset(*address as usize - 1);
            image[offset..offset + WaveBlock::SIZE].copy_from_slice(&block.to_bytes());
        }

        let end = self.layout.data_end();
        match self.generation {
            Generation::Mk1 => {
                image[0] = 0x00;
                image[1] = self.layout.slots as u8;
                image[2] = sum_checksum(&image[CARTRIDGE_HEADER_SIZE..end]);
            }
            Generation::Dx10 => {
                image[0] = self.layout.slots as u8;
                image[1] = 0x01;
                image[2] = xor_checksum(&image[CARTRIDGE_HEADER_SIZE..end]);
            }
        }

        image
    }

    pub fn set_icb(&mut self, slot: u8, icb: Icb) -> Result<(), Error> {
        if self.index_of(slot).is_none() {
            return Err(Error::InvalidData(slot as u32));
        }
        self.bank.icbs.insert(slot, icb);
        self.refresh();
        Ok(())
    }

    pub fn set_ampl(&mut self, address: u8, block: AmplBlock) -> Result<(), Error> {
        if self.index_of(address).is_none() {
            return Err(Error::InvalidData(address as u32));
        }
        self.bank.ampls.insert(address, block);
        self.refresh();
        Ok(())
    }

    pub fn set_freq(&mut self, address: u8, block: FreqBlock) -> Result<(), Error> {
        if self.index_of(address).is_none() {
            return Err(Error::InvalidData(address as u32));
        }
        self.bank.freqs.insert(address, block);
        self.refresh();
        Ok(())
    }

    pub fn set_wave(&mut self, address: u8, block: WaveBlock) -> Result<(), Error> {
        if self.index_of(address).is_none() {
            return Err(Error::InvalidData(address as u32));
        }
        self.bank.waves.insert(address, block);
        self.refresh();
        Ok(())
    }

    pub fn set_vcf(&mut self, address: u8, block: VcfBlock) -> Result<(), Error> {
        if self.index_of(address).is_none() {
            return Err(Error::InvalidData(address as u32));
        }
        self.bank.vcfs.insert(address, block);
        self.refresh();
        Ok(())
    }

    fn refresh(&mut self) {
        let image = self.to_bytes();
        self.bank.buffer = image;
    }
}

impl PartialEq for CartridgeStore {
    // Two stores are equal when their decoded contents are; the raw
    // backing images may differ in padding.
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
            && self.layout == other.layout
            && self.bank.icbs == other.bank.icbs
            && self.bank.vcfs == other.bank.vcfs
            && self.bank.ampls == other.bank.ampls
            && self.bank.freqs == other.bank.freqs
            && self.bank.waves == other.bank.waves
    }
}

impl InstrumentStore for CartridgeStore {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn capacity(&self) -> usize {
        self.layout.slots
    }

    // Cartridge addressing is dense and one based.
    fn address_of(&self, index: usize) -> u8 {
        (index + 1) as u8
    }

    fn index_of(&self, address: u8) -> Option<usize> {
        if address >= 1 && address as usize <= self.layout.slots {
            Some(address as usize - 1)
        }
        else {
            None
        }
    }

    fn icb(&self, slot: u8) -> Option<&Icb> {
        self.bank.icbs.get(&slot)
    }

    fn instruments(&self) -> Instruments<'_> {
        self.bank.instruments()
    }

    fn instrument_count(&self) -> usize {
        self.bank.icbs.len()
    }

    fn ampl(&self, address: u8) -> Option<&AmplBlock> {
        self.bank.ampls.get(&address)
    }

    fn freq(&self, address: u8) -> Option<&FreqBlock> {
        self.bank.freqs.get(&address)
    }

    fn wave(&self, address: u8) -> Option<&WaveBlock> {
        self.bank.waves.get(&address)
    }

    fn vcf(&self, address: u8) -> Option<&VcfBlock> {
        self.bank.vcfs.get(&address)
    }

    fn buffer(&self) -> &[u8] {
        &self.bank.buffer
    }

    fn copy_contents(&mut self, source: &dyn InstrumentStore) -> Result<(), Error> {
        let bank = remap_contents(
            source,
            self.generation,
            self.layout.slots,
            &|index| (index + 1) as u8)?;
        self.bank = bank;
        self.refresh();
        Ok(())
    }
}

fn parse_mk1(data: &[u8], layout: CartridgeLayout) -> Result<Bank, Error> {
    // MK1 cartridges were only ever 8 KiB.
    if data.len() != CARTRIDGE_SIZE_SMALL {
        return Err(Error::InvalidLength(data.len() as u32, CARTRIDGE_SIZE_SMALL as u32));
    }
    if data[0] != 0x00 {
        return Err(Error::InvalidData(0));
    }
    if data[1] as usize != layout.slots {
        return Err(Error::InvalidData(1));
    }
    let computed = sum_checksum(&data[CARTRIDGE_HEADER_SIZE..layout.data_end()]);
    if computed != data[2] {
        return Err(Error::InvalidChecksum(computed, data[2]));
    }

    decode_bank(data, layout)
}

fn parse_dx10(data: &[u8], layout: CartridgeLayout) -> Result<Bank, Error> {
    if data[0] as usize != layout.slots {
        return Err(Error::InvalidData(0));
    }
    if data[1] != 0x01 {
        return Err(Error::InvalidData(1));
    }
    let computed = xor_checksum(&data[CARTRIDGE_HEADER_SIZE..layout.data_end()]);
    if computed != data[2] {
        return Err(Error::InvalidChecksum(computed, data[2]));
    }

    decode_bank(data, layout)
}

// The structural layout after the header is shared; only the header
// markers and checksum algorithm tell the two generations apart.
fn decode_bank(data: &[u8], layout: CartridgeLayout) -> Result<Bank, Error> {
    let mut bank = Bank::new();

    for position in 0..layout.slots {
        let offset = layout.icb_offset(position);
        let raw = &data[offset..offset + ICB_SIZE];
        if Icb::is_empty_slot(raw) {
            continue;
        }
        let icb = Icb::from_bytes(raw).map_err(|e| rebase(e, offset))?;

        // Slot and block references must stay inside this cartridge.
        for (address, field) in [
            (icb.next, 0usize),
            (icb.vcf, 1),
            (icb.ampl, 2),
            (icb.freq, 3),
            (icb.wave, 4),
        ] {
            if address != 0 && address as usize > layout.slots {
                return Err(Error::InvalidData((offset + field) as u32));
            }
        }

        bank.icbs.insert((position + 1) as u8, icb);
    }

    // Decode only the blocks some ICB references; the rest of the
    // tables is padding.
    let mut vcf_refs = Vec::new();
    let mut ampl_refs = Vec::new();
    let mut freq_refs = Vec::new();
    let mut wave_refs = Vec::new();
    for icb in bank.icbs.values() {
        if let Some(address) = icb.vcf_block() {
            vcf_refs.push(address);
        }
        if let Some(address) = icb.ampl_block() {
            ampl_refs.push(address);
        }
        if let Some(address) = icb.freq_block() {
            freq_refs.push(address);
        }
        if let Some(address) = icb.wave_block() {
            wave_refs.push(address);
        }
    }

    for address in vcf_refs {
        let offset = layout.vcf_offset(address as usize - 1);
        let block = VcfBlock::from_bytes(&data[offset..offset + VcfBlock::SIZE])
            .map_err(|e| rebase(e, offset))?;
        bank.vcfs.insert(address, block);
    }
    for address in ampl_refs {
        let offset = layout.ampl_offset(address as usize - 1);
        let block = AmplBlock::from_bytes(&data[offset..offset + AmplBlock::SIZE])
            .map_err(|e| rebase(e, offset))?;
        bank.ampls.insert(address, block);
    }
    for address in freq_refs {
        let offset = layout.freq_offset(address as usize - 1);
        let block = FreqBlock::from_bytes(&data[offset..offset + FreqBlock::SIZE])
            .map_err(|e| rebase(e, offset))?;
        bank.freqs.insert(address, block);
    }
    for address in wave_refs {
        let offset = layout.wave_offset(address as usize - 1);
        let block = WaveBlock::from_bytes(&data[offset..offset + WaveBlock::SIZE])
            .map_err(|e| rebase(e, offset))?;
        bank.waves.insert(address, block);
    }

    bank.buffer = data.to_vec();

    Ok(bank)
}

fn rebase(error: Error, base: usize) -> Error {
    match error {
        Error::InvalidData(offset) => Error::InvalidData(offset + base as u32),
        other => other,
    }
}

fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::dms::envelope::Segment;
    use crate::dms::vcf::Cutoff;
    use crate::Ranged;

    fn put_instrument(store: &mut CartridgeStore, slot: u8, name: &str) {
        let mut icb = Icb::new(name).unwrap();
        icb.ampl = slot;
        icb.freq = slot;
        icb.wave = slot;
        icb.vcf = slot;

        let mut ampl = AmplBlock::adsr(8, 16, 32, 20);
        ampl.segments[0].flags = slot;
        let mut freq = FreqBlock::new();
        freq.segments[1] = Segment::new(slot as i32, 63);
        let mut wave = WaveBlock::new();
        wave.bass[0] = slot as i8;
        wave.soprano[3] = -(slot as i8);
        let mut vcf = VcfBlock::new();
        vcf.cutoff = Cutoff::new(slot as i32 + 60);

        store.set_icb(slot, icb).unwrap();
        store.set_ampl(slot, ampl).unwrap();
        store.set_freq(slot, freq).unwrap();
        store.set_wave(slot, wave).unwrap();
        store.set_vcf(slot, vcf).unwrap();
    }

    fn sample_store(generation: Generation) -> CartridgeStore {
        let mut store = CartridgeStore::new(generation);
        put_instrument(&mut store, 1, "PIANO");
        put_instrument(&mut store, 2, "STRINGS");
        put_instrument(&mut store, 5, "BRASS");
        store
    }

    #[test]
    fn test_mk1_round_trip() {
        let store = sample_store(Generation::Mk1);
        let image = store.to_bytes();
        assert_eq!(image.len(), CARTRIDGE_SIZE_SMALL);

        let decoded = CartridgeStore::from_bytes(&image).unwrap();
        assert_eq!(decoded.generation(), Generation::Mk1);
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_dx10_round_trip() {
        let store = sample_store(Generation::Dx10);
        let decoded = CartridgeStore::from_bytes(&store.to_bytes()).unwrap();
        assert_eq!(decoded.generation(), Generation::Dx10);
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_large_dx10_round_trip() {
        let mut store = CartridgeStore::new_large();
        put_instrument(&mut store, 1, "TUTTI");
        put_instrument(&mut store, 18, "CELESTA");

        let image = store.to_bytes();
        assert_eq!(image.len(), CARTRIDGE_SIZE_LARGE);

        let decoded = CartridgeStore::from_bytes(&image).unwrap();
        assert_eq!(decoded.generation(), Generation::Dx10);
        assert_eq!(decoded.capacity(), 20);
        assert_eq!(decoded, store);
    }

    #[test]
    fn test_invalid_size_rejected() {
        let err = CartridgeStore::from_bytes(&[0u8; 4096]).unwrap_err();
        assert_eq!(err, Error::InvalidLength(4096, 8192));
        assert_eq!(err.kind(), ErrorKind::DataFormat);

        assert!(CartridgeStore::from_bytes(&[0u8; 8193]).is_err());
    }

    #[test]
    fn test_all_zero_image_is_unknown() {
        assert_eq!(
            CartridgeStore::from_bytes(&[0u8; 8192]),
            Err(Error::UnknownFormat));
        assert_eq!(
            CartridgeStore::from_bytes(&[0u8; 16384]),
            Err(Error::UnknownFormat));
    }

    #[test]
    fn test_sniffing_is_deterministic() {
        // An image valid under one layout must never decode as the
        // other; the header markers are disjoint.
        let mk1 = sample_store(Generation::Mk1).to_bytes();
        let dx10 = sample_store(Generation::Dx10).to_bytes();
        assert_eq!(CartridgeStore::from_bytes(&mk1).unwrap().generation(), Generation::Mk1);
        assert_eq!(CartridgeStore::from_bytes(&dx10).unwrap().generation(), Generation::Dx10);
    }

    #[test]
    fn test_corrupted_image_rejected() {
        let store = sample_store(Generation::Mk1);
        let mut image = store.to_bytes();
        // Flip one payload byte without fixing the checksum.
        let offset = store.layout.wave_offset(0) + 10;
        image[offset] ^= 0x55;
        assert_eq!(CartridgeStore::from_bytes(&image), Err(Error::UnknownFormat));
    }

    #[test]
    fn test_dangling_next_link_rejected() {
        let mut store = sample_store(Generation::Mk1);
        let mut icb = store.icb(1).unwrap().clone();
        icb.next = 11;  // outside the ten slot window
        store.set_icb(1, icb).unwrap();

        // The image checksums fine under its own layout, but the
        // dangling slot link must still fail the decode.
        assert_eq!(
            CartridgeStore::from_bytes(&store.to_bytes()),
            Err(Error::UnknownFormat));
    }

    #[test]
    fn test_decode_does_not_mutate_input() {
        let image = sample_store(Generation::Dx10).to_bytes();
        let pristine = image.clone();
        let _ = CartridgeStore::from_bytes(&image).unwrap();
        assert_eq!(image, pristine);
    }

    #[test]
    fn test_reference_integrity() {
        let store = sample_store(Generation::Mk1);
        let decoded = CartridgeStore::from_bytes(&store.to_bytes()).unwrap();
        for (_, icb) in decoded.instruments() {
            if let Some(address) = icb.ampl_block() {
                assert!(decoded.ampl(address).is_some());
            }
            if let Some(address) = icb.freq_block() {
                assert!(decoded.freq(address).is_some());
            }
            if let Some(address) = icb.wave_block() {
                assert!(decoded.wave(address).is_some());
            }
            if let Some(address) = icb.vcf_block() {
                assert!(decoded.vcf(address).is_some());
            }
        }
    }

    #[test]
    fn test_empty_slots_stay_empty() {
        let store = sample_store(Generation::Mk1);
        let decoded = CartridgeStore::from_bytes(&store.to_bytes()).unwrap();
        assert_eq!(decoded.instrument_count(), 3);
        assert!(decoded.icb(3).is_none());
        assert!(decoded.icb(10).is_none());
    }

    #[test]
    fn test_copy_contents_same_generation() {
        let source = sample_store(Generation::Mk1);
        let mut dest = CartridgeStore::new(Generation::Mk1);
        dest.copy_contents(&source).unwrap();

        assert_eq!(dest.instrument_count(), source.instrument_count());
        // Slot 5 in the source is the third instrument, so it lands
        // in slot 3 of the freshly packed destination.
        let names: Vec<&str> = dest.instruments().map(|(_, icb)| icb.name()).collect();
        assert_eq!(names, vec!["PIANO", "STRINGS", "BRASS"]);
        let brass = dest.icb(3).unwrap();
        assert_eq!(brass.name(), "BRASS");
        let address = brass.wave_block().unwrap();
        assert_eq!(dest.wave(address).unwrap().bass[0], 5);
    }

    #[test]
    fn test_copy_contents_cross_generation_fails() {
        let source = sample_store(Generation::Mk1);
        let mut dest = sample_store(Generation::Dx10);
        let before = dest.clone();

        let err = dest.copy_contents(&source).unwrap_err();
        assert_eq!(err, Error::IncompatibleStores);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(dest, before);
    }

    #[test]
    fn test_out_of_range_slot_rejected() {
        let mut store = CartridgeStore::new(Generation::Mk1);
        assert!(store.set_icb(11, Icb::new("NOPE").unwrap()).is_err());
        assert!(store.set_icb(0, Icb::new("NOPE").unwrap()).is_err());
    }

    #[test]
    fn test_buffer_tracks_contents() {
        let store = sample_store(Generation::Mk1);
        assert_eq!(store.buffer(), &store.to_bytes()[..]);
    }
}
