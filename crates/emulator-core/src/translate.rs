//! Execution engines: the interpreter and the block translator.
//!
//! The translator counts entries to each block start. Once a start reaches
//! the configured threshold, the straight-line run from it is decoded once
//! into a [`TranslatedBlock`] and later entries replay the pre-decoded
//! instructions through the same semantic functions the interpreter uses.
//! Replay advances one instruction per [`ExecutionEngine::step`], so the
//! CPU still polls events at every boundary.

use std::collections::HashMap;
use std::sync::Arc;

use log::Level;

use crate::api::{Bus, ExecutionStrategy, StepResult};
use crate::decoder::{decode, DecodedInstruction};
use crate::diag::{channel_log, LogChannel, LogChannels};
use crate::execute::{execute_instruction, step_one};
use crate::memory::bank_index;
use crate::state::Registers;
use crate::InterruptOutputs;

/// Longest translated block.
pub const MAX_BLOCK_INSTRUCTIONS: usize = 32;

/// Returns `true` when this host runs the translator. Other hosts fall back
/// to interpretation.
#[must_use]
pub const fn host_supports_translation() -> bool {
    cfg!(any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "arm",
        target_arch = "aarch64"
    ))
}

/// Strategy actually used for `requested` on this host.
#[must_use]
pub const fn effective_strategy(requested: ExecutionStrategy) -> ExecutionStrategy {
    match requested {
        ExecutionStrategy::Translate if host_supports_translation() => ExecutionStrategy::Translate,
        _ => ExecutionStrategy::Interpret,
    }
}

/// Builds the engine for `strategy`.
#[must_use]
pub fn engine_for(
    strategy: ExecutionStrategy,
    threshold: u32,
    channels: LogChannels,
) -> Box<dyn ExecutionEngine + Send> {
    match effective_strategy(strategy) {
        ExecutionStrategy::Interpret => Box::new(Interpreter),
        ExecutionStrategy::Translate => Box::new(Translator::new(threshold, channels)),
    }
}

/// Translation cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TranslationStats {
    /// Lookups that found a block.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Blocks compiled.
    pub compiles: u64,
    /// Blocks dropped because their code was stored to.
    pub invalidations: u64,
    /// Whole-cache flushes.
    pub flushes: u64,
}

/// One instruction-boundary step of guest execution.
pub trait ExecutionEngine {
    /// Strategy implemented by this engine.
    fn strategy(&self) -> ExecutionStrategy;

    /// Executes the instruction at the current PC.
    fn step(&mut self, regs: &mut Registers, vector_base: u32, bus: &mut dyn Bus) -> StepResult;

    /// Drops every translated block.
    fn invalidate_all(&mut self);

    /// Drops translated code in the bank holding `address`. Called for stores
    /// that did not go through [`ExecutionEngine::step`].
    fn invalidate_store(&mut self, address: u32) {
        let _ = address;
    }

    /// Cache counters; all zero for engines without a cache.
    fn stats(&self) -> TranslationStats {
        TranslationStats::default()
    }
}

/// Fetch, decode and execute per instruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl ExecutionEngine for Interpreter {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Interpret
    }

    fn step(&mut self, regs: &mut Registers, vector_base: u32, bus: &mut dyn Bus) -> StepResult {
        step_one(regs, vector_base, bus)
    }

    fn invalidate_all(&mut self) {}
}

/// Pre-decoded straight-line run of guest code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedBlock {
    start: u32,
    instructions: Box<[DecodedInstruction]>,
}

impl TranslatedBlock {
    /// Guest address of the first instruction.
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` when the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Decoded instructions in order.
    #[must_use]
    pub fn instructions(&self) -> &[DecodedInstruction] {
        &self.instructions
    }

    fn last_address(&self) -> u32 {
        let tail = u32::try_from(self.len().saturating_sub(1)).unwrap_or(0);
        self.start.wrapping_add(tail * 4)
    }

    /// Returns `true` when any instruction lies in `bank`.
    #[must_use]
    pub fn covers_bank(&self, bank: usize) -> bool {
        bank_index(self.start) == bank || bank_index(self.last_address()) == bank
    }
}

/// Translated blocks keyed by start address, with entry heat and a per-bank
/// index for store invalidation.
#[derive(Debug, Default)]
pub struct BlockCache {
    blocks: HashMap<u32, Arc<TranslatedBlock>>,
    heat: HashMap<u32, u32>,
    by_bank: HashMap<usize, Vec<u32>>,
    threshold: u32,
    stats: TranslationStats,
}

impl BlockCache {
    /// Creates an empty cache compiling blocks after `threshold` entries.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Block starting at `pc`.
    pub fn lookup(&mut self, pc: u32) -> Option<Arc<TranslatedBlock>> {
        let block = self.blocks.get(&pc).cloned();
        if block.is_some() {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
        block
    }

    /// Counts one entry to `pc`; returns `true` once the block is hot.
    pub fn note_entry(&mut self, pc: u32) -> bool {
        let heat = self.heat.entry(pc).or_insert(0);
        *heat = heat.saturating_add(1);
        *heat >= self.threshold
    }

    /// Decodes the run starting at `start` and caches it.
    pub fn compile(&mut self, bus: &mut dyn Bus, start: u32) -> Arc<TranslatedBlock> {
        let mut instructions = Vec::with_capacity(MAX_BLOCK_INSTRUCTIONS);
        let mut address = start;
        while instructions.len() < MAX_BLOCK_INSTRUCTIONS {
            let decoded = decode(bus.read32(address));
            instructions.push(decoded);
            if decoded.ends_block() {
                break;
            }
            address = address.wrapping_add(4);
        }
        let block = Arc::new(TranslatedBlock {
            start,
            instructions: instructions.into_boxed_slice(),
        });

        let first = bank_index(start);
        let last = bank_index(block.last_address());
        self.by_bank.entry(first).or_default().push(start);
        if last != first {
            self.by_bank.entry(last).or_default().push(start);
        }
        self.heat.remove(&start);
        self.blocks.insert(start, Arc::clone(&block));
        self.stats.compiles += 1;
        block
    }

    /// Drops every block with code in `bank`; returns how many were dropped.
    pub fn invalidate_bank(&mut self, bank: usize) -> usize {
        let Some(starts) = self.by_bank.remove(&bank) else {
            return 0;
        };
        let dropped = starts
            .into_iter()
            .filter(|start| self.blocks.remove(start).is_some())
            .count();
        self.stats.invalidations += dropped as u64;
        dropped
    }

    /// Drops every block and all heat.
    pub fn invalidate_all(&mut self) {
        self.blocks.clear();
        self.heat.clear();
        self.by_bank.clear();
        self.stats.flushes += 1;
    }

    /// Number of cached blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns `true` when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> TranslationStats {
        self.stats
    }
}

#[derive(Debug)]
struct BlockCursor {
    block: Arc<TranslatedBlock>,
    index: usize,
}

impl BlockCursor {
    fn pc(&self) -> Option<u32> {
        (self.index < self.block.len()).then(|| {
            let index = u32::try_from(self.index).unwrap_or(0);
            self.block.start.wrapping_add(index * 4)
        })
    }
}

/// Bus wrapper that remembers the address of a store.
struct StoreWatch<'a, B: Bus + ?Sized> {
    inner: &'a mut B,
    store: Option<u32>,
}

impl<'a, B: Bus + ?Sized> StoreWatch<'a, B> {
    fn new(inner: &'a mut B) -> Self {
        Self { inner, store: None }
    }
}

impl<B: Bus + ?Sized> Bus for StoreWatch<'_, B> {
    fn read8(&mut self, addr: u32) -> u8 {
        self.inner.read8(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        self.inner.read16(addr)
    }

    fn read32(&mut self, addr: u32) -> u32 {
        self.inner.read32(addr)
    }

    fn write8(&mut self, addr: u32, value: u8) {
        self.store = Some(addr);
        self.inner.write8(addr, value);
    }

    fn write16(&mut self, addr: u32, value: u16) {
        self.store = Some(addr);
        self.inner.write16(addr, value);
    }

    fn write32(&mut self, addr: u32, value: u32) {
        self.store = Some(addr);
        self.inner.write32(addr, value);
    }

    fn interrupt_outputs(&self) -> InterruptOutputs {
        self.inner.interrupt_outputs()
    }
}

/// Block-translating engine.
#[derive(Debug)]
pub struct Translator {
    cache: BlockCache,
    cursor: Option<BlockCursor>,
    sequential: Option<u32>,
    run_length: usize,
    channels: LogChannels,
}

impl Translator {
    /// Creates a translator compiling blocks after `threshold` entries.
    #[must_use]
    pub fn new(threshold: u32, channels: LogChannels) -> Self {
        Self {
            cache: BlockCache::new(threshold),
            cursor: None,
            sequential: None,
            run_length: 0,
            channels,
        }
    }

    /// Block cache.
    #[must_use]
    pub const fn cache(&self) -> &BlockCache {
        &self.cache
    }

    fn enter(&mut self, pc: u32, bus: &mut dyn Bus) -> Option<BlockCursor> {
        if let Some(block) = self.cache.lookup(pc) {
            return Some(BlockCursor { block, index: 0 });
        }
        if self.sequential == Some(pc) || !self.cache.note_entry(pc) {
            return None;
        }
        let block = self.cache.compile(bus, pc);
        channel_log!(
            self.channels,
            LogChannel::Cpu,
            Level::Debug,
            "translated {} instructions at {:#010x}",
            block.len(),
            pc
        );
        Some(BlockCursor { block, index: 0 })
    }
}

impl ExecutionEngine for Translator {
    fn strategy(&self) -> ExecutionStrategy {
        ExecutionStrategy::Translate
    }

    fn step(&mut self, regs: &mut Registers, vector_base: u32, bus: &mut dyn Bus) -> StepResult {
        let pc = regs.pc();
        let cursor = match self.cursor.take() {
            Some(cursor) if cursor.pc() == Some(pc) => Some(cursor),
            _ => self.enter(pc, bus),
        };

        let mut watch = StoreWatch::new(bus);
        let fall_through = pc.wrapping_add(4);
        let result = if let Some(mut cursor) = cursor {
            let decoded = cursor.block.instructions[cursor.index];
            let result = execute_instruction(regs, &decoded, pc, vector_base, &mut watch);
            cursor.index += 1;
            self.sequential = None;
            self.run_length = 0;
            if regs.pc() == fall_through && cursor.pc().is_some() {
                self.cursor = Some(cursor);
            }
            result
        } else {
            let decoded = decode(watch.read32(pc));
            let result = execute_instruction(regs, &decoded, pc, vector_base, &mut watch);
            self.run_length += 1;
            if decoded.ends_block()
                || regs.pc() != fall_through
                || self.run_length >= MAX_BLOCK_INSTRUCTIONS
            {
                self.sequential = None;
                self.run_length = 0;
            } else {
                self.sequential = Some(fall_through);
            }
            result
        };

        if let Some(address) = watch.store {
            self.invalidate_store(address);
        }
        result
    }

    fn invalidate_store(&mut self, address: u32) {
        let bank = bank_index(address);
        if self.cache.invalidate_bank(bank) > 0 {
            channel_log!(
                self.channels,
                LogChannel::Cpu,
                Level::Debug,
                "store to {:#010x} dropped translated code",
                address
            );
        }
        if self
            .cursor
            .as_ref()
            .is_some_and(|cursor| cursor.block.covers_bank(bank))
        {
            self.cursor = None;
        }
    }

    fn invalidate_all(&mut self) {
        self.cache.invalidate_all();
        self.cursor = None;
        self.sequential = None;
        self.run_length = 0;
    }

    fn stats(&self) -> TranslationStats {
        self.cache.stats()
    }
}
