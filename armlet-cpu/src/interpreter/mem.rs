// SPDX-FileCopyrightText: 2026 armlet contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Load/store executors: single registers, pairs, literals, exclusives,
//! atomic read-modify-writes, and SIMD structure loads/stores.

use armlet_common::bits::{opbit, opbits, sign_extend};

use super::alu::extend_reg;
use super::StepResult;
use crate::cpu::Cpu;
use crate::host::Host;

impl<'m, H: Host> Cpu<'m, H> {
    /// Zero-extended load of 1 << `size_log` bytes.
    fn load_sized(&mut self, addr: u64, size_log: u64) -> u64 {
        match size_log {
            0 => self.load_u8(addr) as u64,
            1 => self.load_u16(addr) as u64,
            2 => self.load_u32(addr) as u64,
            _ => self.load_u64(addr),
        }
    }

    fn store_sized(&mut self, addr: u64, size_log: u64, val: u64) {
        match size_log {
            0 => self.store_u8(addr, val as u8),
            1 => self.store_u16(addr, val as u16),
            2 => self.store_u32(addr, val as u32),
            _ => self.store_u64(addr, val),
        }
    }

    /// Effective address for the imm9 modes: 00 unscaled offset, 01
    /// post-index, 11 pre-index. Handles base writeback.
    fn imm9_addr(&mut self, rn: u32, imm9: i64, idx: u64) -> u64 {
        let base = self.state.reg_sp(rn);
        match idx {
            0b00 => base.wrapping_add(imm9 as u64),
            0b01 => {
                self.state.set_reg_sp(rn, base.wrapping_add(imm9 as u64));
                base
            }
            _ => {
                let addr = base.wrapping_add(imm9 as u64);
                self.state.set_reg_sp(rn, addr);
                addr
            }
        }
    }

    // -- load/store register, imm9 / register-offset group (top bit24 = 0) --

    pub(crate) fn ldst_reg_gpr(&mut self, op: u32) -> StepResult {
        let size = opbits(op, 30, 2);
        let opc = opbits(op, 22, 2);
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;
        let idx = opbits(op, 10, 2);

        if opbit(op, 21) != 0 {
            return match idx {
                0b00 => self.atomic_mem_op(op),
                0b10 => {
                    let option = opbits(op, 13, 3);
                    if option & 0b010 == 0 {
                        self.unhandled(op);
                    }
                    let shift = if opbit(op, 12) != 0 { size as u32 } else { 0 };
                    let rm = opbits(op, 16, 5) as u32;
                    let offset = extend_reg(self.state.reg(rm), option, shift);
                    let addr = self.state.reg_sp(rn).wrapping_add(offset);
                    self.gpr_access(op, addr, opc, size, rt)
                }
                _ => self.unhandled(op),
            };
        }

        if idx == 0b10 {
            // Unprivileged forms (LDTR/STTR) are not generated by user code.
            self.unhandled(op);
        }
        let imm9 = sign_extend(opbits(op, 12, 9), 9);
        // Stores must capture Rt before a post/pre-index writeback of Rn.
        let store_val = self.state.reg(rt);
        let addr = self.imm9_addr(rn, imm9, idx);
        self.gpr_access_with(op, addr, opc, size, rt, store_val)
    }

    // -- load/store register, unsigned scaled immediate (top bit24 = 1) -----

    pub(crate) fn ldst_unsigned_gpr(&mut self, op: u32) -> StepResult {
        let size = opbits(op, 30, 2);
        let opc = opbits(op, 22, 2);
        let imm12 = opbits(op, 10, 12);
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let addr = self.state.reg_sp(rn).wrapping_add(imm12 << size);
        self.gpr_access(op, addr, opc, size, rt)
    }

    fn gpr_access(&mut self, op: u32, addr: u64, opc: u64, size: u64, rt: u32) -> StepResult {
        let store_val = self.state.reg(rt);
        self.gpr_access_with(op, addr, opc, size, rt, store_val)
    }

    /// Shared body of the GPR load/store forms: `opc` selects store,
    /// zero-extending load, or the sign-extending loads.
    fn gpr_access_with(
        &mut self,
        op: u32,
        addr: u64,
        opc: u64,
        size: u64,
        rt: u32,
        store_val: u64,
    ) -> StepResult {
        match opc {
            0b00 => self.store_sized(addr, size, store_val),
            0b01 => {
                let val = self.load_sized(addr, size);
                self.state.set_reg(rt, val);
            }
            0b10 => {
                if size == 3 {
                    // PRFM/PRFUM: hint only.
                    return StepResult::Continue;
                }
                // LDRSB/LDRSH/LDRSW Xt
                let val = self.load_sized(addr, size);
                let bits = 8u32 << size;
                self.state.set_reg(rt, sign_extend(val, bits) as u64);
            }
            _ => {
                if size >= 2 {
                    self.unhandled(op);
                }
                // LDRSB/LDRSH Wt: sign-extend to 32, zero the upper half.
                let val = self.load_sized(addr, size);
                let bits = 8u32 << size;
                self.state
                    .set_reg(rt, (sign_extend(val, bits) as u64) & 0xFFFF_FFFF);
            }
        }
        StepResult::Continue
    }

    // -- atomic memory operations (LDADD family, SWP) ------------------------
    //
    // A single hart sees its own program order, so these are plain
    // read-modify-writes; the acquire/release bits have nothing to order.

    fn atomic_mem_op(&mut self, op: u32) -> StepResult {
        let size = opbits(op, 30, 2);
        let o3 = opbit(op, 15);
        let opc = opbits(op, 12, 3);
        let rs = opbits(op, 16, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let addr = self.state.reg_sp(rn);
        let loaded = self.load_sized(addr, size);
        let operand = self.state.reg(rs);

        let stored = if o3 != 0 {
            match opc {
                0b000 => operand, // SWP
                _ => self.unhandled(op),
            }
        } else {
            let bits = 8u32 << size;
            match opc {
                0b000 => loaded.wrapping_add(operand),
                0b001 => loaded & !operand,
                0b010 => loaded ^ operand,
                0b011 => loaded | operand,
                0b100 => {
                    // LDSMAX
                    let a = sign_extend(loaded, bits);
                    let b = sign_extend(operand, bits);
                    if a >= b {
                        loaded
                    } else {
                        operand
                    }
                }
                0b101 => {
                    let a = sign_extend(loaded, bits);
                    let b = sign_extend(operand, bits);
                    if a <= b {
                        loaded
                    } else {
                        operand
                    }
                }
                0b110 => loaded.max(operand),
                _ => loaded.min(operand),
            }
        };
        self.store_sized(addr, size, stored);
        self.state.set_reg(rt, loaded);
        StepResult::Continue
    }

    // -- load/store exclusive, ordered, and compare-and-swap ----------------
    //
    // One hart means the exclusive monitor is always granted: STXR/STLXR
    // write unconditionally and report status 0.

    pub(crate) fn ldst_exclusive(&mut self, op: u32) -> StepResult {
        let size = opbits(op, 30, 2);
        let o2 = opbit(op, 23);
        let l = opbit(op, 22);
        let o1 = opbit(op, 21);
        let rs = opbits(op, 16, 5) as u32;
        let rt2 = opbits(op, 10, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let addr = self.state.reg_sp(rn);

        // CAS/CASA/CASL/CASAL (and the B/H forms): o2=1, o1=1, Rt2=11111.
        if o2 == 1 && o1 == 1 {
            if rt2 != 31 {
                self.unhandled(op);
            }
            let compare = self.state.reg(rs);
            let new = self.state.reg(rt);
            let mask = if size == 3 {
                u64::MAX
            } else {
                (1u64 << (8 << size)) - 1
            };
            let loaded = self.load_sized(addr, size);
            if loaded == compare & mask {
                self.store_sized(addr, size, new);
            }
            self.state.set_reg(rs, loaded);
            return StepResult::Continue;
        }

        if o1 == 1 {
            // Pair forms, word or doubleword only.
            if size < 2 {
                self.unhandled(op);
            }
            let esize = if size == 3 { 8 } else { 4 };
            if l == 1 {
                // LDXP/LDAXP
                let lo = self.load_sized(addr, size);
                let hi = self.load_sized(addr + esize, size);
                self.state.set_reg(rt, lo);
                self.state.set_reg(rt2, hi);
            } else {
                // STXP/STLXP
                let lo = self.state.reg(rt);
                let hi = self.state.reg(rt2);
                self.store_sized(addr, size, lo);
                self.store_sized(addr + esize, size, hi);
                self.state.set_reg(rs, 0);
            }
            return StepResult::Continue;
        }

        if l == 1 {
            // LDXR/LDAXR (o2=0) and LDAR (o2=1): all plain loads here.
            let val = self.load_sized(addr, size);
            self.state.set_reg(rt, val);
        } else {
            let val = self.state.reg(rt);
            self.store_sized(addr, size, val);
            if o2 == 0 {
                // STXR/STLXR status: always success.
                self.state.set_reg(rs, 0);
            }
        }
        StepResult::Continue
    }

    // -- load/store pair (GPR) ----------------------------------------------

    pub(crate) fn ldst_pair_gpr(&mut self, op: u32) -> StepResult {
        let opc = opbits(op, 30, 2);
        let variant = opbits(op, 23, 3);
        let l = opbit(op, 22);
        let imm7 = sign_extend(opbits(op, 15, 7), 7);
        let rt2 = opbits(op, 10, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let (size, sign_ext) = match (opc, l) {
            (0b00, _) => (2u64, false),
            (0b01, 1) => (2, true), // LDPSW
            (0b10, _) => (3, false),
            _ => self.unhandled(op), // STGP and opc=11 are not modeled
        };
        let ebytes = 1u64 << size;
        let offset = (imm7 << size) as u64;

        let base = self.state.reg_sp(rn);
        let addr = match variant {
            0b000 | 0b010 => base.wrapping_add(offset), // no-alloc hint / signed offset
            0b001 => base,                              // post-index
            0b011 => base.wrapping_add(offset),         // pre-index
            _ => self.unhandled(op),
        };

        if l == 1 {
            let lo = self.load_sized(addr, size);
            let hi = self.load_sized(addr.wrapping_add(ebytes), size);
            let (lo, hi) = if sign_ext {
                (
                    sign_extend(lo, 32) as u64,
                    sign_extend(hi, 32) as u64,
                )
            } else {
                (lo, hi)
            };
            self.state.set_reg(rt, lo);
            self.state.set_reg(rt2, hi);
        } else {
            let lo = self.state.reg(rt);
            let hi = self.state.reg(rt2);
            self.store_sized(addr, size, lo);
            self.store_sized(addr.wrapping_add(ebytes), size, hi);
        }

        match variant {
            0b001 => self.state.set_reg_sp(rn, base.wrapping_add(offset)),
            0b011 => self.state.set_reg_sp(rn, addr),
            _ => {}
        }
        StepResult::Continue
    }

    // -- load/store pair (SIMD) ---------------------------------------------

    pub(crate) fn ldst_pair_simd(&mut self, op: u32) -> StepResult {
        let opc = opbits(op, 30, 2);
        let variant = opbits(op, 23, 3);
        let l = opbit(op, 22);
        let imm7 = sign_extend(opbits(op, 15, 7), 7);
        let rt2 = opbits(op, 10, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let size = match opc {
            0b00 => 2u64, // S
            0b01 => 3,    // D
            0b10 => 4,    // Q
            _ => self.unhandled(op),
        };
        let ebytes = 1u64 << size;
        let offset = (imm7 << size) as u64;

        let base = self.state.reg_sp(rn);
        let addr = match variant {
            0b000 | 0b010 | 0b011 => base.wrapping_add(offset),
            0b001 => base,
            _ => self.unhandled(op),
        };

        if l == 1 {
            // Each destination is zero-extended to the full 128 bits.
            let lo = self.load_vsized(addr, size);
            let hi = self.load_vsized(addr.wrapping_add(ebytes), size);
            self.state.vset_u128(rt, lo);
            self.state.vset_u128(rt2, hi);
        } else {
            let lo = self.state.vget_u128(rt);
            let hi = self.state.vget_u128(rt2);
            self.store_vsized(addr, size, lo);
            self.store_vsized(addr.wrapping_add(ebytes), size, hi);
        }

        match variant {
            0b001 => self.state.set_reg_sp(rn, base.wrapping_add(offset)),
            0b011 => self.state.set_reg_sp(rn, addr),
            _ => {}
        }
        StepResult::Continue
    }

    /// Zero-extended SIMD-width load: `size` 0..4 covers B/H/S/D/Q.
    fn load_vsized(&mut self, addr: u64, size: u64) -> u128 {
        if size == 4 {
            self.load_u128(addr)
        } else {
            self.load_sized(addr, size) as u128
        }
    }

    fn store_vsized(&mut self, addr: u64, size: u64, val: u128) {
        if size == 4 {
            self.store_u128(addr, val);
        } else {
            self.store_sized(addr, size, val as u64);
        }
    }

    // -- load register (literal) --------------------------------------------

    pub(crate) fn ldr_literal(&mut self, op: u32) -> StepResult {
        let opc = opbits(op, 30, 2);
        let is_simd = opbit(op, 26) != 0;
        let offset = sign_extend(opbits(op, 5, 19), 19) << 2;
        let rt = opbits(op, 0, 5) as u32;
        let addr = self.state.pc.wrapping_add(offset as u64);

        if is_simd {
            let size = match opc {
                0b00 => 2u64,
                0b01 => 3,
                0b10 => 4,
                _ => self.unhandled(op),
            };
            let val = self.load_vsized(addr, size);
            self.state.vset_u128(rt, val);
        } else {
            match opc {
                0b00 => {
                    let val = self.load_u32(addr) as u64;
                    self.state.set_reg(rt, val);
                }
                0b01 => {
                    let val = self.load_u64(addr);
                    self.state.set_reg(rt, val);
                }
                0b10 => {
                    let val = self.load_u32(addr) as u64;
                    self.state.set_reg(rt, sign_extend(val, 32) as u64);
                }
                _ => {} // PRFM (literal): hint only
            }
        }
        StepResult::Continue
    }

    // -- SIMD load/store register -------------------------------------------

    /// Access size 0..4 from size:opc, plus whether this is a load.
    fn simd_ldst_size(&mut self, op: u32) -> (u64, bool) {
        let size = opbits(op, 30, 2);
        let opc = opbits(op, 22, 2);
        let is_load = opc & 1 != 0;
        let size = if opc & 0b10 != 0 {
            if size != 0 {
                self.unhandled(op);
            }
            4
        } else {
            size
        };
        (size, is_load)
    }

    pub(crate) fn ldst_reg_simd(&mut self, op: u32) -> StepResult {
        let (size, is_load) = self.simd_ldst_size(op);
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;
        let idx = opbits(op, 10, 2);

        let addr = if opbit(op, 21) != 0 {
            if idx != 0b10 {
                self.unhandled(op);
            }
            let option = opbits(op, 13, 3);
            if option & 0b010 == 0 {
                self.unhandled(op);
            }
            let shift = if opbit(op, 12) != 0 { size as u32 } else { 0 };
            let rm = opbits(op, 16, 5) as u32;
            let offset = extend_reg(self.state.reg(rm), option, shift);
            self.state.reg_sp(rn).wrapping_add(offset)
        } else {
            if idx == 0b10 {
                self.unhandled(op);
            }
            let imm9 = sign_extend(opbits(op, 12, 9), 9);
            self.imm9_addr(rn, imm9, idx)
        };

        if is_load {
            let val = self.load_vsized(addr, size);
            self.state.vset_u128(rt, val);
        } else {
            let val = self.state.vget_u128(rt);
            self.store_vsized(addr, size, val);
        }
        StepResult::Continue
    }

    pub(crate) fn ldst_unsigned_simd(&mut self, op: u32) -> StepResult {
        let (size, is_load) = self.simd_ldst_size(op);
        let imm12 = opbits(op, 10, 12);
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        let addr = self.state.reg_sp(rn).wrapping_add(imm12 << size);
        if is_load {
            let val = self.load_vsized(addr, size);
            self.state.vset_u128(rt, val);
        } else {
            let val = self.state.vget_u128(rt);
            self.store_vsized(addr, size, val);
        }
        StepResult::Continue
    }

    // -- SIMD load/store multiple structures (LD1..LD4 / ST1..ST4) ----------

    pub(crate) fn ldst_multi_struct(&mut self, op: u32) -> StepResult {
        let q = opbit(op, 30) != 0;
        let post = opbit(op, 23) != 0;
        let l = opbit(op, 22) != 0;
        let rm = opbits(op, 16, 5) as u32;
        let opcode = opbits(op, 12, 4);
        let size = opbits(op, 10, 2) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        if !post && rm != 0 {
            self.unhandled(op);
        }

        let (rpt, selem): (u32, u32) = match opcode {
            0b0000 => (1, 4),
            0b0010 => (4, 1),
            0b0100 => (1, 3),
            0b0110 => (3, 1),
            0b0111 => (1, 1),
            0b1000 => (1, 2),
            0b1010 => (2, 1),
            _ => self.unhandled(op),
        };
        let esize = 8u32 << size;
        if esize == 64 && !q && selem != 1 {
            self.unhandled(op);
        }
        let datasize: u32 = if q { 128 } else { 64 };
        let elements = datasize / esize;
        let ebytes = (esize / 8) as u64;

        let base = self.state.reg_sp(rn);
        let mut addr = base;

        if l && !q {
            // Partial-width loads zero-extend every written register.
            for i in 0..rpt * selem {
                let reg = (rt + i) % 32;
                self.state.vset_u64(reg, 1, 0);
            }
        }

        for r in 0..rpt {
            for e in 0..elements {
                let mut tt = (rt + r) % 32;
                for _s in 0..selem {
                    if l {
                        let val = self.load_sized(addr, size as u64);
                        self.state.vset_elem(tt, e, esize, val);
                    } else {
                        let val = self.state.vget_elem(tt, e, esize);
                        self.store_sized(addr, size as u64, val);
                    }
                    addr = addr.wrapping_add(ebytes);
                    tt = (tt + rpt) % 32;
                }
            }
        }

        if post {
            let total = (rpt * selem) as u64 * elements as u64 * ebytes;
            let incr = if rm == 31 { total } else { self.state.reg(rm) };
            self.state.set_reg_sp(rn, base.wrapping_add(incr));
        }
        StepResult::Continue
    }

    // -- SIMD load/store single structure (lane forms and LDnR) -------------

    pub(crate) fn ldst_single_struct(&mut self, op: u32) -> StepResult {
        let q = opbits(op, 30, 1);
        let post = opbit(op, 23) != 0;
        let l = opbit(op, 22) != 0;
        let r = opbit(op, 21);
        let rm = opbits(op, 16, 5) as u32;
        let opcode = opbits(op, 13, 3);
        let s = opbit(op, 12);
        let size = opbits(op, 10, 2);
        let rn = opbits(op, 5, 5) as u32;
        let rt = opbits(op, 0, 5) as u32;

        if !post && rm != 0 {
            self.unhandled(op);
        }
        let selem = ((opcode & 1) << 1 | r) + 1;

        // LDnR: replicate one element to every lane.
        if opcode >> 1 == 0b11 {
            if !l || s != 0 {
                self.unhandled(op);
            }
            let esize = 8u32 << size;
            let ebytes = (esize / 8) as u64;
            let elements = (if q != 0 { 128 } else { 64 }) / esize;
            let base = self.state.reg_sp(rn);
            let mut addr = base;
            for i in 0..selem {
                let reg = (rt + i as u32) % 32;
                let val = self.load_sized(addr, size);
                self.state.zero_vreg(reg);
                for e in 0..elements {
                    self.state.vset_elem(reg, e, esize, val);
                }
                addr = addr.wrapping_add(ebytes);
            }
            if post {
                let total = selem * ebytes;
                let incr = if rm == 31 { total } else { self.state.reg(rm) };
                self.state.set_reg_sp(rn, base.wrapping_add(incr));
            }
            return StepResult::Continue;
        }

        // Lane forms: the scale comes from opcode<2:1>, the index from Q:S:size.
        let scale = opcode >> 1;
        let (esize_log, index) = match scale {
            0 => (0u64, (q << 3) | (s << 2) | size),
            1 => {
                if size & 1 != 0 {
                    self.unhandled(op);
                }
                (1, (q << 2) | (s << 1) | (size >> 1))
            }
            _ => {
                if size == 0 {
                    (2, (q << 1) | s)
                } else if size == 1 && s == 0 {
                    (3, q)
                } else {
                    self.unhandled(op)
                }
            }
        };
        let esize = 8u32 << esize_log;
        let ebytes = 1u64 << esize_log;

        let base = self.state.reg_sp(rn);
        let mut addr = base;
        for i in 0..selem {
            let reg = (rt + i as u32) % 32;
            if l {
                // Insert into the lane, preserving the other bytes.
                let val = self.load_sized(addr, esize_log);
                self.state.vset_elem(reg, index as u32, esize, val);
            } else {
                let val = self.state.vget_elem(reg, index as u32, esize);
                self.store_sized(addr, esize_log, val);
            }
            addr = addr.wrapping_add(ebytes);
        }

        if post {
            let total = selem * ebytes;
            let incr = if rm == 31 { total } else { self.state.reg(rm) };
            self.state.set_reg_sp(rn, base.wrapping_add(incr));
        }
        StepResult::Continue
    }
}
