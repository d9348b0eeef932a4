use std::collections::BTreeMap;
use std::collections::btree_map;

use log::debug;

use crate::Error;
use crate::dms::Generation;
use crate::dms::envelope::{
    AmplBlock,
    FreqBlock
};
use crate::dms::icb::Icb;
use crate::dms::vcf::VcfBlock;
use crate::dms::wave::WaveBlock;

/// Ordered iterator over the instruments of a store, slot order.
pub struct Instruments<'a> {
    inner: btree_map::Iter<'a, u8, Icb>,
}

impl<'a> Iterator for Instruments<'a> {
    type Item = (u8, &'a Icb);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(slot, icb)| (*slot, icb))
    }
}

/// The common behavior of every instrument source: one cartridge image
/// or one live device. ICBs reference their blocks by address; the
/// store resolves those references lazily through the accessors here.
pub trait InstrumentStore {
    fn generation(&self) -> Generation;

    /// Maximum number of instruments this store can hold.
    fn capacity(&self) -> usize;

    /// Maps an instrument/block position to this store's addressing
    /// scheme, and back. The two schemes differ between cartridges
    /// and devices.
    fn address_of(&self, index: usize) -> u8;
    fn index_of(&self, address: u8) -> Option<usize>;

    fn icb(&self, slot: u8) -> Option<&Icb>;
    fn instruments(&self) -> Instruments<'_>;
    fn instrument_count(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.instrument_count() == 0
    }

    fn ampl(&self, address: u8) -> Option<&AmplBlock>;
    fn freq(&self, address: u8) -> Option<&FreqBlock>;
    fn wave(&self, address: u8) -> Option<&WaveBlock>;
    fn vcf(&self, address: u8) -> Option<&VcfBlock>;

    /// The raw backing image this store owns. Dropped together with
    /// the store.
    fn buffer(&self) -> &[u8];

    /// Replaces this store's contents with a deep copy of `source`,
    /// remapped to this store's addressing scheme. Fails with a
    /// Configuration error if the layouts are incompatible; the
    /// destination is left untouched in that case.
    fn copy_contents(&mut self, source: &dyn InstrumentStore) -> Result<(), Error>;
}

/// Decoded contents shared by both store kinds. Keys are addresses in
/// the owning store's scheme.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Bank {
    pub(crate) icbs: BTreeMap<u8, Icb>,
    pub(crate) vcfs: BTreeMap<u8, VcfBlock>,
    pub(crate) ampls: BTreeMap<u8, AmplBlock>,
    pub(crate) freqs: BTreeMap<u8, FreqBlock>,
    pub(crate) waves: BTreeMap<u8, WaveBlock>,
    pub(crate) buffer: Vec<u8>,
}

impl Bank {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn instruments(&self) -> Instruments<'_> {
        Instruments { inner: self.icbs.iter() }
    }
}

// Remaps a source store's contents to a destination addressing scheme.
// All ICBs are copied in iteration order; only the blocks they
// reference come along. References to blocks outside the destination's
// window are unset rather than carried over dangling.
pub(crate) fn remap_contents(
    source: &dyn InstrumentStore,
    generation: Generation,
    capacity: usize,
    address_of: &dyn Fn(usize) -> u8,
) -> Result<Bank, Error> {
    if source.generation() != generation {
        return Err(Error::IncompatibleStores);
    }
    if source.instrument_count() > capacity {
        return Err(Error::IncompatibleStores);
    }

    let remap = |address: u8| -> u8 {
        match source.index_of(address) {
            Some(index) if index < capacity => address_of(index),
            _ => 0,
        }
    };

    let mut bank = Bank::new();
    for (position, (slot, icb)) in source.instruments().enumerate() {
        let dest_slot = address_of(position);
        let mut copy = icb.clone();
        copy.next = 0;

        if let Some(address) = icb.ampl_block() {
            copy.ampl = remap(address);
            if copy.ampl != 0 {
                if let Some(block) = source.ampl(address) {
                    bank.ampls.insert(copy.ampl, block.clone());
                }
                else {
                    copy.ampl = 0;
                }
            }
        }
        if let Some(address) = icb.freq_block() {
            copy.freq = remap(address);
            if copy.freq != 0 {
                if let Some(block) = source.freq(address) {
                    bank.freqs.insert(copy.freq, block.clone());
                }
                else {
                    copy.freq = 0;
                }
            }
        }
        if let Some(address) = icb.wave_block() {
            copy.wave = remap(address);
            if copy.wave != 0 {
                if let Some(block) = source.wave(address) {
                    bank.waves.insert(copy.wave, block.clone());
                }
                else {
                    copy.wave = 0;
                }
            }
        }
        if let Some(address) = icb.vcf_block() {
            copy.vcf = remap(address);
            if copy.vcf != 0 {
                if let Some(block) = source.vcf(address) {
                    bank.vcfs.insert(copy.vcf, block.clone());
                }
                else {
                    copy.vcf = 0;
                }
            }
        }

        debug!("remapped instrument '{}' from slot {} to slot {}",
            copy.name(), slot, dest_slot);
        bank.icbs.insert(dest_slot, copy);
    }

    Ok(bank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dms::BlockData;

    #[test]
    fn test_empty_bank() {
        let bank = Bank::new();
        assert_eq!(bank.instruments().count(), 0);
        assert!(bank.buffer.is_empty());
    }

    #[test]
    fn test_instruments_are_slot_ordered() {
        let mut bank = Bank::new();
        bank.icbs.insert(7, Icb::new("SEVEN").unwrap());
        bank.icbs.insert(2, Icb::new("TWO").unwrap());
        bank.icbs.insert(5, Icb::new("FIVE").unwrap());

        let slots: Vec<u8> = bank.instruments().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![2, 5, 7]);
    }

    #[test]
    fn test_bank_block_bytes_are_independent() {
        let mut bank = Bank::new();
        bank.waves.insert(1, WaveBlock::new());
        let mut other = bank.waves.get(&1).unwrap().clone();
        other.level = 9;
        assert_ne!(other.to_bytes(), bank.waves.get(&1).unwrap().to_bytes());
    }
}
