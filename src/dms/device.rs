use std::collections::HashSet;

use log::debug;

use crate::Error;
use crate::dms::{
    BlockData,
    Generation,
    MIDIChannel
};
use crate::dms::envelope::{
    AmplBlock,
    FreqBlock
};
use crate::dms::icb::Icb;
use crate::dms::layout::{
    block_address,
    block_index,
    BlockKind,
    DeviceLayout,
    DEVICE_AMPL_COUNT,
    DEVICE_FREQ_COUNT,
    DEVICE_ICB_COUNT,
    DEVICE_IMAGE_SIZE,
    DEVICE_VCF_COUNT,
    DEVICE_WAVE_COUNT
};
use crate::dms::store::{
    remap_contents,
    Bank,
    Instruments,
    InstrumentStore
};
use crate::dms::sysex::{
    Frame,
    FrameKind
};
use crate::dms::vcf::VcfBlock;
use crate::dms::wave::WaveBlock;

/// Inbound half of a device connection. `receive` blocks until one
/// complete wire message has arrived.
pub trait InputChannel {
    fn receive(&mut self) -> Result<Vec<u8>, Error>;
}

/// Outbound half of a device connection.
pub trait OutputChannel {
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;
}

/// Port enumeration and channel opening, implemented by whatever MIDI
/// backend the collaborator uses.
pub trait MidiPorts {
    fn input_ports(&self) -> Vec<String>;
    fn output_ports(&self) -> Vec<String>;
    fn open_input(&mut self, name: &str) -> Result<Box<dyn InputChannel>, Error>;
    fn open_output(&mut self, name: &str) -> Result<Box<dyn OutputChannel>, Error>;
}

/// Everything the core needs to know about one configured device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub input_port: String,
    pub output_port: String,
    pub channel: MIDIChannel,
    pub generation: Generation,
}

/// Terminal states of a transfer transaction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Transfer {
    Complete,
    /// The progress callback asked to stop. The store keeps exactly
    /// the blocks applied up to that point.
    Cancelled { received: u32 },
}

/// Progress callback: `(units_completed, units_total)`. Returning
/// `false` requests cooperative cancellation.
pub type ProgressCallback<'a> = dyn FnMut(u32, u32) -> bool + 'a;

/// An instrument store mirroring the patch RAM of a live device.
/// Created empty and populated by a read transaction.
#[derive(Debug, Clone)]
pub struct DeviceStore {
    generation: Generation,
    channel: MIDIChannel,
    bank: Bank,
}

impl DeviceStore {
    pub fn new(generation: Generation, channel: MIDIChannel) -> Self {
        let mut bank = Bank::new();
        bank.buffer = vec![0u8; DEVICE_IMAGE_SIZE];
        DeviceStore {
            generation,
            channel,
            bank,
        }
    }

    pub fn channel(&self) -> MIDIChannel {
        self.channel
    }

    /// Reads the device's entire patch RAM into this store. One
    /// request goes out, then blocks are accumulated until every
    /// expected count is met or the unit budget runs out. The caller
    /// holds both channels exclusively for the whole transaction.
    ///
    /// A frame that fails checksum or framing validation aborts the
    /// whole transaction; the store keeps the blocks applied so far
    /// and stays internally consistent.
    pub fn read_from_device(
        &mut self,
        input: &mut dyn InputChannel,
        output: &mut dyn OutputChannel,
        progress: &mut ProgressCallback<'_>,
    ) -> Result<Transfer, Error> {
        let total = DEVICE_IMAGE_SIZE as u32;
        output.send(&Frame::request_dump(self.channel).to_bytes())?;

        let mut seen: HashSet<(BlockKind, u8)> = HashSet::new();
        let mut received: u32 = 0;

        while received < total && !dump_complete(&seen) {
            let raw = input.receive()?;
            let frame = Frame::from_bytes(&raw)?;

            if frame.channel != self.channel {
                debug!("ignoring frame for channel {}", frame.channel);
                continue;
            }

            let kind = match frame.kind {
                FrameKind::Block(kind) => kind,
                // The device never sends requests back.
                FrameKind::RequestDump => return Err(Error::InvalidData(3)),
            };

            self.apply_block(kind, frame.address, &frame.payload)?;
            seen.insert((kind, frame.address));
            received += frame.payload.len() as u32;

            if !progress(received, total) {
                debug!("device read cancelled after {} of {} units", received, total);
                return Ok(Transfer::Cancelled { received });
            }
        }

        if dump_complete(&seen) {
            debug!("device read complete, {} units", received);
            Ok(Transfer::Complete)
        }
        else {
            Err(Error::IncompleteDump(received, total))
        }
    }

    // Decodes one received block and applies it to the store and its
    // backing image. A block is either applied whole or not at all.
    fn apply_block(&mut self, kind: BlockKind, address: u8, payload: &[u8]) -> Result<(), Error> {
        let base = self.generation.device_slot_base();
        let index = block_index(base, address).ok_or(Error::InvalidData(4))?;

        let offset = match kind {
            BlockKind::Icb => {
                if index >= DEVICE_ICB_COUNT {
                    return Err(Error::InvalidData(4));
                }
                if Icb::is_empty_slot(payload) {
                    self.bank.icbs.remove(&address);
                }
                else {
                    self.bank.icbs.insert(address, Icb::from_bytes(payload)?);
                }
                DeviceLayout::icb_offset(index)
            }
            BlockKind::Vcf => {
                if index >= DEVICE_VCF_COUNT {
                    return Err(Error::InvalidData(4));
                }
                self.bank.vcfs.insert(address, VcfBlock::from_bytes(payload)?);
                DeviceLayout::vcf_offset(index)
            }
            BlockKind::Ampl => {
                if index >= DEVICE_AMPL_COUNT {
                    return Err(Error::InvalidData(4));
                }
                self.bank.ampls.insert(address, AmplBlock::from_bytes(payload)?);
                DeviceLayout::ampl_offset(index)
            }
            BlockKind::Freq => {
                if index >= DEVICE_FREQ_COUNT {
                    return Err(Error::InvalidData(4));
                }
                self.bank.freqs.insert(address, FreqBlock::from_bytes(payload)?);
                DeviceLayout::freq_offset(index)
            }
            BlockKind::Wave => {
                if index >= DEVICE_WAVE_COUNT {
                    return Err(Error::InvalidData(4));
                }
                self.bank.waves.insert(address, WaveBlock::from_bytes(payload)?);
                DeviceLayout::wave_offset(index)
            }
        };

        self.bank.buffer[offset..offset + payload.len()].copy_from_slice(payload);
        Ok(())
    }

    // Rewrites the backing image from the decoded blocks.
    fn rebuild_buffer(&mut self) {
        let base = self.generation.device_slot_base();
        let mut buffer = vec![0u8; DEVICE_IMAGE_SIZE];

        for (address, icb) in &self.bank.icbs {
            if let Some(index) = block_index(base, *address) {
                let offset = DeviceLayout::icb_offset(index);
                buffer[offset..offset + Icb::SIZE].copy_from_slice(&icb.to_bytes());
            }
        }
        for (address, block) in &self.bank.vcfs {
            if let Some(index) = block_index(base, *address) {
                let offset = DeviceLayout::vcf_offset(index);
                buffer[offset..offset + VcfBlock::SIZE].copy_from_slice(&block.to_bytes());
            }
        }
        for (address, block) in &self.bank.ampls {
            if let Some(index) = block_index(base, *address) {
                let offset = DeviceLayout::ampl_offset(index);
                buffer[offset..offset + AmplBlock::SIZE].copy_from_slice(&block.to_bytes());
            }
        }
        for (address, block) in &self.bank.freqs {
            if let Some(index) = block_index(base, *address) {
                let offset = DeviceLayout::freq_offset(index);
                buffer[offset..offset + FreqBlock::SIZE].copy_from_slice(&block.to_bytes());
            }
        }
        for (address, block) in &self.bank.waves {
            if let Some(index) = block_index(base, *address) {
                let offset = DeviceLayout::wave_offset(index);
                buffer[offset..offset + WaveBlock::SIZE].copy_from_slice(&block.to_bytes());
            }
        }

        self.bank.buffer = buffer;
    }
}

fn dump_complete(seen: &HashSet<(BlockKind, u8)>) -> bool {
    let count = |kind: BlockKind| seen.iter().filter(|(k, _)| *k == kind).count();
    count(BlockKind::Icb) >= DEVICE_ICB_COUNT
        && count(BlockKind::Vcf) >= DEVICE_VCF_COUNT
        && count(BlockKind::Ampl) >= DEVICE_AMPL_COUNT
        && count(BlockKind::Freq) >= DEVICE_FREQ_COUNT
        && count(BlockKind::Wave) >= DEVICE_WAVE_COUNT
}

impl InstrumentStore for DeviceStore {
    fn generation(&self) -> Generation {
        self.generation
    }

    fn capacity(&self) -> usize {
        DEVICE_ICB_COUNT
    }

    fn address_of(&self, index: usize) -> u8 {
        block_address(self.generation.device_slot_base(), index)
    }

    fn index_of(&self, address: u8) -> Option<usize> {
        block_index(self.generation.device_slot_base(), address)
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
        let base = self.generation.device_slot_base();
        let bank = remap_contents(
            source,
            self.generation,
            DEVICE_ICB_COUNT,
            &|index| block_address(base, index))?;
        self.bank = bank;
        self.rebuild_buffer();
        Ok(())
    }
}

/// Sends a whole store to the device: ICBs first, then VCF, AMPL,
/// FREQ and WAVE blocks, one frame per populated block. The block
/// address window starts at the lowest non-zero ICB slot.
pub fn write_to_device(
    store: &dyn InstrumentStore,
    channel: MIDIChannel,
    output: &mut dyn OutputChannel,
) -> Result<(), Error> {
    let mut base: u8 = 0;

    for (slot, icb) in store.instruments() {
        output.send(&Frame::block(channel, BlockKind::Icb, slot, icb.to_bytes()).to_bytes())?;
        if base == 0 {
            base = slot;
        }
    }

    for i in 0..DEVICE_VCF_COUNT {
        let address = block_address(base, i);
        if let Some(block) = store.vcf(address) {
            output.send(&Frame::block(channel, BlockKind::Vcf, address, block.to_bytes()).to_bytes())?;
        }
    }

    for i in 0..DEVICE_AMPL_COUNT {
        let address = block_address(base, i);
        if let Some(block) = store.ampl(address) {
            output.send(&Frame::block(channel, BlockKind::Ampl, address, block.to_bytes()).to_bytes())?;
        }
    }

    for i in 0..DEVICE_FREQ_COUNT {
        let address = block_address(base, i);
        if let Some(block) = store.freq(address) {
            output.send(&Frame::block(channel, BlockKind::Freq, address, block.to_bytes()).to_bytes())?;
        }
    }

    for i in 0..DEVICE_WAVE_COUNT {
        let address = block_address(base, i);
        if let Some(block) = store.wave(address) {
            output.send(&Frame::block(channel, BlockKind::Wave, address, block.to_bytes()).to_bytes())?;
        }
    }

    Ok(())
}

/// One configured live instrument: an exclusively owned pair of open
/// channels plus the store mirroring its patch RAM. A device whose
/// channels cannot both be opened is never constructed, so a transfer
/// can only ever start on a fully initialized device.
pub struct Device {
    config: DeviceConfig,
    input: Box<dyn InputChannel>,
    output: Box<dyn OutputChannel>,
    store: DeviceStore,
}

impl Device {
    /// Resolves both configured port names and opens the channels.
    /// A missing port name is a Configuration error; an open failure
    /// is a System error. Any channel opened before the failing step
    /// is released on the way out.
    pub fn open(ports: &mut dyn MidiPorts, config: DeviceConfig) -> Result<Self, Error> {
        if !ports.input_ports().iter().any(|name| name == &config.input_port) {
            return Err(Error::PortNotFound(config.input_port.clone()));
        }
        if !ports.output_ports().iter().any(|name| name == &config.output_port) {
            return Err(Error::PortNotFound(config.output_port.clone()));
        }

        let input = ports.open_input(&config.input_port)?;
        let output = ports.open_output(&config.output_port)?;

        let store = DeviceStore::new(config.generation, config.channel);
        Ok(Device {
            config,
            input,
            output,
            store,
        })
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DeviceStore {
        &mut self.store
    }

    /// Runs a read transaction into this device's store.
    pub fn read(&mut self, progress: &mut ProgressCallback<'_>) -> Result<Transfer, Error> {
        self.store.read_from_device(&mut *self.input, &mut *self.output, progress)
    }

    /// Writes this device's store back to the instrument.
    pub fn write(&mut self) -> Result<(), Error> {
        write_to_device(&self.store, self.config.channel, &mut *self.output)
    }
}
