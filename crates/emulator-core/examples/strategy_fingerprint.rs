//! Runs one guest program under both execution strategies and prints a
//! fingerprint of the final machine state for each. The two lines must match;
//! CI compares them across hosts.
//!
//! ```sh
//! cargo run -p pxa-emu-core --example strategy_fingerprint
//! ```

#![allow(clippy::pedantic)]

use bitflags as _;
use log as _;
use proptest as _;
use pxa_emu_core::{Emulator, EmulatorConfig, ExecutionStrategy, StopReason};
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

/// Fills 256 bytes of RAM with a running checksum, then spins.
const PROGRAM: [u32; 10] = [
    0xE3A0_020A, // MOV r0, #0xA0000000
    0xE3A0_1000, // MOV r1, #0
    0xE3A0_2C01, // MOV r2, #0x100
    0xE3A0_3005, // MOV r3, #5
    0xE023_3391, // MLA r3, r1, r3, r3
    0xE4C0_3001, // STRB r3, [r0], #1
    0xE281_1001, // ADD r1, r1, #1
    0xE151_0002, // CMP r1, r2
    0xBAFF_FFFA, // BLT 0x10
    0xEAFF_FFFE, // B .
];

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint(strategy: ExecutionStrategy) -> String {
    let config = EmulatorConfig {
        ram_size: 0x1_0000,
        rom_size: 0x1_0000,
        strategy,
        translation_threshold: 2,
        ..EmulatorConfig::default()
    };
    let mut emu = Emulator::new(config).expect("example configuration is valid");
    let image: Vec<u8> = PROGRAM.iter().flat_map(|word| word.to_be_bytes()).collect();
    emu.load_rom(&image).expect("program fits in rom");

    let mut retired = 0u64;
    for _ in 0..64 {
        let outcome = emu.run_cycles(1_000);
        retired += u64::from(outcome.instructions);
        assert_eq!(outcome.stop, StopReason::BudgetExhausted);
    }

    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    hash_bytes(&mut hash, &retired.to_le_bytes());
    let regs = emu.cpu().registers();
    for n in 0..16 {
        hash_bytes(&mut hash, &regs.reg(n).to_le_bytes());
    }
    hash_bytes(&mut hash, &regs.cpsr().to_le_bytes());
    hash_bytes(&mut hash, &emu.ram()[..0x100]);

    let stats = emu.cpu().translation_stats();
    eprintln!(
        "{:?}: {} blocks compiled, {} hits",
        emu.cpu().strategy(),
        stats.compiles,
        stats.hits
    );
    format!("{hash:016x}")
}

fn main() {
    println!("{}", fingerprint(ExecutionStrategy::Interpret));
    println!("{}", fingerprint(ExecutionStrategy::Translate));
}
