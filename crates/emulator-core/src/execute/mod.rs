//! Instruction semantics shared by every execution strategy.
//!
//! The PC is advanced to the next instruction before the body runs, so any
//! write to r15 by the instruction overrides it. Reads of r15 as an operand
//! see the instruction address plus 8 (plus 12 when a register-specified
//! shift or a stored PC is involved).

#![allow(
    clippy::pedantic,
    clippy::nursery,
    clippy::similar_names,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::too_many_arguments,
    clippy::fn_params_excessive_bools,
    unknown_lints
)]

mod flags;
mod helpers;

pub use flags::FlagsUpdate;
pub use helpers::{add_with_carry, expand_immediate, shift_immediate, shift_register, Shifted};

use crate::api::{Bus, StepResult};
use crate::decoder::{
    decode, DecodedInstruction, DpOpcode, Instruction, Operand2, ShiftAmount, StatusSource,
    TransferOffset,
};
use crate::state::{Exception, Mode, Registers, CPSR_C, CPSR_T, LR, PC};
use crate::timing::{cost, CycleCostKind};

/// Fetches, decodes and executes the instruction at the current PC.
pub fn step_one(regs: &mut Registers, vector_base: u32, bus: &mut dyn Bus) -> StepResult {
    let address = regs.pc();
    let decoded = decode(bus.read32(address));
    execute_instruction(regs, &decoded, address, vector_base, bus)
}

/// Executes one decoded instruction fetched from `address`.
pub fn execute_instruction(
    regs: &mut Registers,
    decoded: &DecodedInstruction,
    address: u32,
    vector_base: u32,
    bus: &mut dyn Bus,
) -> StepResult {
    let next = address.wrapping_add(4);
    regs.set_pc(next);
    if !decoded.condition.passes(regs.cpsr()) {
        return retired(CycleCostKind::ConditionFailed);
    }

    match decoded.instruction {
        Instruction::DataProcessing {
            opcode,
            set_flags,
            rn,
            rd,
            operand,
        } => data_processing(regs, address, opcode, set_flags, rn, rd, operand),
        Instruction::Multiply {
            accumulate,
            set_flags,
            rd,
            rn,
            rs,
            rm,
        } => multiply(regs, address, accumulate, set_flags, rd, rn, rs, rm),
        Instruction::SingleTransfer {
            load,
            byte,
            pre_index,
            up,
            write_back,
            rn,
            rd,
            offset,
        } => single_transfer(
            regs, bus, address, load, byte, pre_index, up, write_back, rn, rd, offset,
        ),
        Instruction::Branch { link, offset } => {
            if link {
                regs.set_reg(LR, next);
            }
            regs.set_pc(address.wrapping_add(8).wrapping_add(offset as u32));
            retired(CycleCostKind::Branch)
        }
        Instruction::BranchExchange { rm } => {
            let target = operand(regs, rm, address, 8);
            if target & 1 != 0 {
                // Thumb state is not modelled.
                return exception(regs, Exception::Undefined, next, vector_base);
            }
            regs.set_pc(target);
            retired(CycleCostKind::BranchExchange)
        }
        Instruction::StatusRead { spsr, rd } => {
            let value = if spsr {
                regs.spsr().unwrap_or_else(|| regs.cpsr())
            } else {
                regs.cpsr()
            };
            write_register(regs, rd, value);
            retired(CycleCostKind::StatusAccess)
        }
        Instruction::StatusWrite {
            spsr,
            field_mask,
            source,
        } => {
            let value = match source {
                StatusSource::Immediate(value) => value,
                StatusSource::Register(rm) => operand(regs, rm, address, 8),
            };
            status_write(regs, spsr, field_mask, value);
            retired(CycleCostKind::StatusAccess)
        }
        Instruction::SoftwareInterrupt { .. } => {
            exception(regs, Exception::SoftwareInterrupt, next, vector_base)
        }
        Instruction::WaitForInterrupt => StepResult::WaitForInterrupt {
            cycles: cost(CycleCostKind::WaitForInterrupt),
        },
        Instruction::Undefined => exception(regs, Exception::Undefined, next, vector_base),
    }
}

fn retired(kind: CycleCostKind) -> StepResult {
    StepResult::Retired { cycles: cost(kind) }
}

fn exception(
    regs: &mut Registers,
    kind: Exception,
    return_address: u32,
    vector_base: u32,
) -> StepResult {
    regs.enter_exception(kind, return_address, vector_base);
    StepResult::Exception {
        exception: kind,
        cycles: cost(CycleCostKind::SynchronousException),
    }
}

/// Register read as an operand; r15 reads ahead of the instruction address.
fn operand(regs: &Registers, index: u8, address: u32, pc_offset: u32) -> u32 {
    if usize::from(index) == PC {
        address.wrapping_add(pc_offset)
    } else {
        regs.reg(usize::from(index))
    }
}

fn write_register(regs: &mut Registers, index: u8, value: u32) {
    if usize::from(index) == PC {
        regs.set_pc(value);
    } else {
        regs.set_reg(usize::from(index), value);
    }
}

fn data_processing(
    regs: &mut Registers,
    address: u32,
    opcode: DpOpcode,
    set_flags: bool,
    rn: u8,
    rd: u8,
    operand2: Operand2,
) -> StepResult {
    let carry_in = regs.flag(CPSR_C);
    let mut cycles = cost(CycleCostKind::DataProcessing);
    let shifted = match operand2 {
        Operand2::Immediate { imm8, rotate } => expand_immediate(imm8, rotate, carry_in),
        Operand2::Register {
            rm,
            shift,
            amount: ShiftAmount::Immediate(amount),
        } => shift_immediate(operand(regs, rm, address, 8), shift, amount, carry_in),
        Operand2::Register {
            rm,
            shift,
            amount: ShiftAmount::Register(rs),
        } => {
            cycles += cost(CycleCostKind::RegisterShift);
            let amount = operand(regs, rs, address, 12);
            shift_register(operand(regs, rm, address, 12), shift, amount, carry_in)
        }
    };
    let pc_offset = if matches!(
        operand2,
        Operand2::Register {
            amount: ShiftAmount::Register(_),
            ..
        }
    ) {
        12
    } else {
        8
    };
    let a = operand(regs, rn, address, pc_offset);
    let b = shifted.value;

    let logical = |result: u32| FlagsUpdate::Logical {
        result,
        carry: shifted.carry,
    };
    let arithmetic = |(result, carry, overflow): (u32, bool, bool)| FlagsUpdate::Arithmetic {
        result,
        carry,
        overflow,
    };
    let update = match opcode {
        DpOpcode::And | DpOpcode::Tst => logical(a & b),
        DpOpcode::Eor | DpOpcode::Teq => logical(a ^ b),
        DpOpcode::Orr => logical(a | b),
        DpOpcode::Mov => logical(b),
        DpOpcode::Bic => logical(a & !b),
        DpOpcode::Mvn => logical(!b),
        DpOpcode::Sub | DpOpcode::Cmp => arithmetic(add_with_carry(a, !b, true)),
        DpOpcode::Rsb => arithmetic(add_with_carry(b, !a, true)),
        DpOpcode::Add | DpOpcode::Cmn => arithmetic(add_with_carry(a, b, false)),
        DpOpcode::Adc => arithmetic(add_with_carry(a, b, carry_in)),
        DpOpcode::Sbc => arithmetic(add_with_carry(a, !b, carry_in)),
        DpOpcode::Rsc => arithmetic(add_with_carry(b, !a, carry_in)),
    };
    let result = update.result().unwrap_or_default();

    if opcode.is_test() {
        regs.set_flags(update.apply(regs.cpsr()));
    } else if usize::from(rd) == PC {
        if set_flags {
            // Exception return: SPSR back into CPSR.
            if let Some(spsr) = regs.spsr() {
                regs.set_cpsr(spsr);
            }
        }
        regs.set_pc(result);
        cycles += cost(CycleCostKind::PcWrite);
    } else {
        regs.set_reg(usize::from(rd), result);
        if set_flags {
            regs.set_flags(update.apply(regs.cpsr()));
        }
    }
    StepResult::Retired { cycles }
}

fn multiply(
    regs: &mut Registers,
    address: u32,
    accumulate: bool,
    set_flags: bool,
    rd: u8,
    rn: u8,
    rs: u8,
    rm: u8,
) -> StepResult {
    let mut result = operand(regs, rm, address, 8).wrapping_mul(operand(regs, rs, address, 8));
    if accumulate {
        result = result.wrapping_add(operand(regs, rn, address, 8));
    }
    write_register(regs, rd, result);
    if set_flags {
        regs.set_flags(FlagsUpdate::NegativeZero { result }.apply(regs.cpsr()));
    }
    let mut cycles = cost(if accumulate {
        CycleCostKind::MultiplyAccumulate
    } else {
        CycleCostKind::Multiply
    });
    if usize::from(rd) == PC {
        cycles += cost(CycleCostKind::PcWrite);
    }
    StepResult::Retired { cycles }
}

fn single_transfer(
    regs: &mut Registers,
    bus: &mut dyn Bus,
    address: u32,
    load: bool,
    byte: bool,
    pre_index: bool,
    up: bool,
    write_back: bool,
    rn: u8,
    rd: u8,
    offset: TransferOffset,
) -> StepResult {
    let base = operand(regs, rn, address, 8);
    let distance = match offset {
        TransferOffset::Immediate(value) => u32::from(value),
        TransferOffset::Register { rm, shift, amount } => shift_immediate(
            operand(regs, rm, address, 8),
            shift,
            amount,
            regs.flag(CPSR_C),
        )
        .value,
    };
    let offset_address = if up {
        base.wrapping_add(distance)
    } else {
        base.wrapping_sub(distance)
    };
    let target = if pre_index { offset_address } else { base };
    let update_base = (!pre_index || write_back) && usize::from(rn) != PC;

    if load {
        let value = if byte {
            u32::from(bus.read8(target))
        } else {
            bus.read32(target & !3).rotate_right(8 * (target & 3))
        };
        if update_base {
            regs.set_reg(usize::from(rn), offset_address);
        }
        write_register(regs, rd, value);
        let mut cycles = cost(CycleCostKind::Load);
        if usize::from(rd) == PC {
            cycles += cost(CycleCostKind::PcWrite);
        }
        StepResult::Retired { cycles }
    } else {
        let value = operand(regs, rd, address, 12);
        if byte {
            bus.write8(target, value as u8);
        } else {
            bus.write32(target & !3, value);
        }
        if update_base {
            regs.set_reg(usize::from(rn), offset_address);
        }
        retired(CycleCostKind::Store)
    }
}

fn status_write(regs: &mut Registers, spsr: bool, field_mask: u8, value: u32) {
    let mut mask = 0u32;
    for field in 0..4 {
        if field_mask & (1 << field) != 0 {
            mask |= 0xFF << (8 * field);
        }
    }
    if spsr {
        if let Some(old) = regs.spsr() {
            regs.set_spsr((old & !mask) | (value & mask));
        }
        return;
    }
    if regs.mode() == Mode::User {
        mask &= 0xFF00_0000;
    }
    mask &= !CPSR_T;
    let cpsr = regs.cpsr();
    regs.set_cpsr((cpsr & !mask) | (value & mask));
}
