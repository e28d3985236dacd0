// SPDX-FileCopyrightText: 2026 armlet contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The dispatch loop.
//!
//! One step: sample the control word, fetch the 32-bit word at PC, classify
//! it by its top byte, and run the family executor. The top byte partitions
//! nearly all A64 encodings into small disjoint islands, so each arm below
//! only needs a handful of sub-field tests to reach a concrete instruction.
//! Per-family inline decoding is deliberate; there is no intermediate
//! instruction representation.

use std::sync::Arc;

use armlet_common::bits::opbit;
use armlet_common::{VAddr, INSN_SIZE, SP_ALIGN};

use crate::disasm;
use crate::host::Host;
use crate::interpreter::StepResult;
use crate::memory::{GuestMem, MemoryFault};
use crate::state::{Control, ControlWord, CpuState};

/// A single emulated hart plus its borrowed guest memory and host hooks.
pub struct Cpu<'m, H: Host> {
    pub state: CpuState,
    pub mem: GuestMem<'m>,
    pub host: H,
    pub(crate) control: Arc<ControlWord>,
}

impl<'m, H: Host> Cpu<'m, H> {
    /// Construct a hart over `memory` (guest addresses `base..base+len`),
    /// with PC at `entry_pc` and SP at `top_of_stack`. The host has already
    /// laid out argc/argv/envp/auxv on the guest stack.
    pub fn new(
        memory: &'m mut [u8],
        base: VAddr,
        entry_pc: VAddr,
        stack_size: u64,
        top_of_stack: VAddr,
        host: H,
    ) -> Self {
        Self {
            state: CpuState::new(entry_pc, stack_size, top_of_stack),
            mem: GuestMem::new(memory, base),
            host,
            control: Arc::new(ControlWord::new()),
        }
    }

    /// The shared control word; hosts clone this to signal the loop from
    /// other threads.
    pub fn control(&self) -> Arc<ControlWord> {
        Arc::clone(&self.control)
    }

    /// Enable or disable per-instruction tracing; returns the previous setting.
    pub fn set_trace(&self, trace: bool) -> bool {
        self.control.set_trace(trace)
    }

    /// Request a clean return from `run` at the next instruction boundary.
    pub fn end_emulation(&self) {
        self.control.end_emulation()
    }

    /// Run up to `max_cycles` instructions. Returns the number retired by
    /// this call, which is smaller than `max_cycles` only if the
    /// end-emulation bit was raised (the bit is cleared on exit).
    pub fn run(&mut self, max_cycles: u64) -> u64 {
        let mut executed = 0u64;
        while executed < max_cycles {
            if self.control.contains(Control::END_EMULATION) {
                self.control.remove(Control::END_EMULATION);
                break;
            }

            #[cfg(debug_assertions)]
            self.check_guest_invariants();

            let pc = self.state.pc;
            let op = match self.mem.read_u32(pc) {
                Ok(w) => w,
                Err(f) => {
                    self.host
                        .hard_termination(&self.state, "pc out of address space:", f.addr())
                }
            };

            if self.control.contains(Control::TRACE_INSTRUCTIONS) {
                self.trace_step(op);
            }

            match self.step(op) {
                StepResult::Continue => self.state.pc = pc.wrapping_add(INSN_SIZE),
                StepResult::Branch => {}
            }
            self.state.cycles += 1;
            executed += 1;
        }
        executed
    }

    /// Guest-program sanity checks at the loop head (debug builds only).
    #[cfg(debug_assertions)]
    fn check_guest_invariants(&mut self) {
        let sp = self.state.sp();
        if sp % SP_ALIGN != 0 {
            self.host
                .hard_termination(&self.state, "stack pointer is misaligned:", sp);
        }
        if sp < self.state.stack_top.saturating_sub(self.state.stack_size) || sp > self.mem.end() {
            self.host
                .hard_termination(&self.state, "stack pointer out of stack region:", sp);
        }
        if self.state.pc % INSN_SIZE != 0 {
            self.host
                .hard_termination(&self.state, "pc is misaligned:", self.state.pc);
        }
    }

    fn trace_step(&self, op: u32) {
        // Fails silently when no logger (or a closed sink) is installed.
        log::trace!(
            target: "armlet::trace",
            "{:8} {:016x} {:08x}  {:32} {}",
            self.state.cycles,
            self.state.pc,
            op,
            disasm::disassemble(&self.state, op, &self.host),
            disasm::render_flags(&self.state),
        );
    }

    /// Decode failure: an encoding in a handled family whose sub-fields match
    /// no known instruction. There are no silent no-ops.
    pub(crate) fn unhandled(&mut self, op: u32) -> ! {
        self.host
            .hard_termination(&self.state, "unhandled instruction:", op as u64)
    }

    pub(crate) fn data_abort(&mut self, fault: MemoryFault) -> ! {
        self.host.hard_termination(
            &self.state,
            "memory reference out of address space:",
            fault.addr(),
        )
    }

    /// Classify by top byte and execute.
    fn step(&mut self, op: u32) -> StepResult {
        match (op >> 24) as u8 {
            // -- data processing (immediate) --------------------------------
            0x10 | 0x30 | 0x50 | 0x70 | 0x90 | 0xB0 | 0xD0 | 0xF0 => self.adr_adrp(op),
            0x11 | 0x31 | 0x51 | 0x71 | 0x91 | 0xB1 | 0xD1 | 0xF1 => self.add_sub_imm(op),
            0x12 | 0x32 | 0x52 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
                if opbit(op, 23) != 0 {
                    self.move_wide(op)
                } else {
                    self.logical_imm(op)
                }
            }
            0x13 | 0x33 | 0x53 | 0x93 | 0xB3 | 0xD3 => {
                if opbit(op, 23) != 0 {
                    self.extr(op)
                } else {
                    self.bitfield(op)
                }
            }

            // -- data processing (register) ---------------------------------
            0x0A | 0x2A | 0x4A | 0x6A | 0x8A | 0xAA | 0xCA | 0xEA => self.logical_shifted(op),
            0x0B | 0x2B | 0x4B | 0x6B | 0x8B | 0xAB | 0xCB | 0xEB => self.add_sub_reg(op),
            0x1A | 0x3A | 0x5A | 0x7A | 0x9A | 0xBA | 0xDA | 0xFA => self.dp_misc(op),
            0x1B | 0x9B => self.dp3_source(op),

            // -- branches, exception generation, system ---------------------
            0x14..=0x17 | 0x94..=0x97 => self.b_bl(op),
            0x34 | 0x35 | 0xB4 | 0xB5 => self.cbz_cbnz(op),
            0x36 | 0x37 | 0xB6 | 0xB7 => self.tbz_tbnz(op),
            0x54 => self.b_cond(op),
            0xD4 => self.exception_gen(op),
            0xD5 => self.system(op),
            0xD6 => self.br_blr_ret(op),

            // -- loads and stores -------------------------------------------
            0x08 | 0x48 | 0x88 | 0xC8 => self.ldst_exclusive(op),
            0x28 | 0x29 | 0x68 | 0x69 | 0xA8 | 0xA9 => self.ldst_pair_gpr(op),
            0x2C | 0x2D | 0x6C | 0x6D | 0xAC | 0xAD => self.ldst_pair_simd(op),
            0x18 | 0x58 | 0x98 | 0xD8 | 0x1C | 0x5C | 0x9C => self.ldr_literal(op),
            0x38 | 0x78 | 0xB8 | 0xF8 => self.ldst_reg_gpr(op),
            0x39 | 0x79 | 0xB9 | 0xF9 => self.ldst_unsigned_gpr(op),
            0x3C | 0x7C | 0xBC | 0xFC => self.ldst_reg_simd(op),
            0x3D | 0x7D | 0xBD | 0xFD => self.ldst_unsigned_simd(op),
            0x0C | 0x4C => self.ldst_multi_struct(op),
            0x0D | 0x4D => self.ldst_single_struct(op),

            // -- scalar floating point --------------------------------------
            0x1E | 0x9E => self.fp_scalar(op),
            0x1F => self.fp_dp3(op),

            // -- Advanced SIMD ----------------------------------------------
            0x0E | 0x2E | 0x4E | 0x6E => self.advsimd_vector(op),
            0x0F | 0x2F | 0x4F | 0x6F => self.advsimd_modimm_shift_indexed(op),
            0x5E | 0x7E => self.advsimd_scalar(op),
            0x5F | 0x7F => self.advsimd_scalar_shift_indexed(op),

            // UDF and every family this core does not model.
            _ => self.unhandled(op),
        }
    }

    // -- checked guest memory accessors -------------------------------------
    //
    // Executors use these; a fault is an unrecoverable guest error.

    #[inline]
    pub(crate) fn load_u8(&mut self, addr: VAddr) -> u8 {
        match self.mem.read_u8(addr) {
            Ok(v) => v,
            Err(f) => self.data_abort(f),
        }
    }

    #[inline]
    pub(crate) fn load_u16(&mut self, addr: VAddr) -> u16 {
        match self.mem.read_u16(addr) {
            Ok(v) => v,
            Err(f) => self.data_abort(f),
        }
    }

    #[inline]
    pub(crate) fn load_u32(&mut self, addr: VAddr) -> u32 {
        match self.mem.read_u32(addr) {
            Ok(v) => v,
            Err(f) => self.data_abort(f),
        }
    }

    #[inline]
    pub(crate) fn load_u64(&mut self, addr: VAddr) -> u64 {
        match self.mem.read_u64(addr) {
            Ok(v) => v,
            Err(f) => self.data_abort(f),
        }
    }

    #[inline]
    pub(crate) fn load_u128(&mut self, addr: VAddr) -> u128 {
        match self.mem.read_u128(addr) {
            Ok(v) => v,
            Err(f) => self.data_abort(f),
        }
    }

    #[inline]
    pub(crate) fn store_u8(&mut self, addr: VAddr, val: u8) {
        if let Err(f) = self.mem.write_u8(addr, val) {
            self.data_abort(f)
        }
    }

    #[inline]
    pub(crate) fn store_u16(&mut self, addr: VAddr, val: u16) {
        if let Err(f) = self.mem.write_u16(addr, val) {
            self.data_abort(f)
        }
    }

    #[inline]
    pub(crate) fn store_u32(&mut self, addr: VAddr, val: u32) {
        if let Err(f) = self.mem.write_u32(addr, val) {
            self.data_abort(f)
        }
    }

    #[inline]
    pub(crate) fn store_u64(&mut self, addr: VAddr, val: u64) {
        if let Err(f) = self.mem.write_u64(addr, val) {
            self.data_abort(f)
        }
    }

    #[inline]
    pub(crate) fn store_u128(&mut self, addr: VAddr, val: u128) {
        if let Err(f) = self.mem.write_u128(addr, val) {
            self.data_abort(f)
        }
    }
}
