// SPDX-FileCopyrightText: 2026 armlet contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Data-processing executors: immediate and register arithmetic, logicals,
//! bitfields, conditional ops, multiplies, divides, and bit manipulation.

use armlet_common::bits::{lowmask, opbit, opbits, replicate64, ror, sign_extend};

use super::StepResult;
use crate::cpu::Cpu;
use crate::host::Host;

/// Apply an LSL/LSR/ASR/ROR shift to a 64-bit operand. `amount` < 64.
#[inline]
pub(crate) fn shift64(val: u64, shift_type: u64, amount: u32) -> u64 {
    if amount == 0 {
        return val;
    }
    match shift_type {
        0 => val << amount,
        1 => val >> amount,
        2 => ((val as i64) >> amount) as u64,
        _ => val.rotate_right(amount),
    }
}

/// Apply an LSL/LSR/ASR/ROR shift to a 32-bit operand. `amount` < 32.
#[inline]
pub(crate) fn shift32(val: u32, shift_type: u64, amount: u32) -> u32 {
    if amount == 0 {
        return val;
    }
    match shift_type {
        0 => val << amount,
        1 => val >> amount,
        2 => ((val as i32) >> amount) as u32,
        _ => val.rotate_right(amount),
    }
}

/// UXTB/UXTH/UXTW/UXTX/SXTB/SXTH/SXTW/SXTX followed by a left shift.
#[inline]
pub(crate) fn extend_reg(val: u64, option: u64, shift: u32) -> u64 {
    let extended = match option {
        0 => val & 0xFF,
        1 => val & 0xFFFF,
        2 => val & 0xFFFF_FFFF,
        3 => val,
        4 => val as i8 as i64 as u64,
        5 => val as i16 as i64 as u64,
        6 => val as i32 as i64 as u64,
        _ => val,
    };
    extended << shift
}

/// Decode an A64 logical immediate from (N, immr, imms).
///
/// The element size comes from the position of the highest set bit of
/// `N:NOT(imms)`; the element is S+1 ones rotated right by R, replicated
/// across 64 bits. Returns `None` for reserved encodings.
pub(crate) fn decode_bitmask_imm(sf: bool, n: u64, immr: u64, imms: u64) -> Option<u64> {
    let nimms = ((n as u32) << 6) | ((imms as u32 ^ 0x3F) & 0x3F);
    if nimms == 0 {
        return None;
    }
    let len = 31 - nimms.leading_zeros();
    let esize = 1u32 << len;
    let levels = (esize - 1) as u64;

    // 32-bit forms cannot encode a 64-bit element.
    if !sf && n != 0 {
        return None;
    }

    let s = imms & levels;
    let r = immr & levels;
    if s == levels {
        return None; // all-ones element is reserved
    }

    let welem = (1u64 << (s + 1)) - 1;
    let rotated = ror(welem, esize, r as u32);
    let result = replicate64(rotated, esize);
    Some(if sf { result } else { result & 0xFFFF_FFFF })
}

impl<'m, H: Host> Cpu<'m, H> {
    // -- PC-relative addressing ---------------------------------------------

    /// ADR / ADRP.
    pub(crate) fn adr_adrp(&mut self, op: u32) -> StepResult {
        let rd = opbits(op, 0, 5) as u32;
        let imm = (opbits(op, 5, 19) << 2) | opbits(op, 29, 2);
        let imm = sign_extend(imm, 21);
        let value = if opbit(op, 31) == 0 {
            self.state.pc.wrapping_add(imm as u64)
        } else {
            (self.state.pc & !0xFFF).wrapping_add((imm << 12) as u64)
        };
        self.state.set_reg(rd, value);
        StepResult::Continue
    }

    // -- add/subtract (immediate) -------------------------------------------

    pub(crate) fn add_sub_imm(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let is_sub = opbit(op, 30) != 0;
        let set_flags = opbit(op, 29) != 0;
        let shift = opbit(op, 22) != 0;
        let imm12 = opbits(op, 10, 12);
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        let imm = if shift { imm12 << 12 } else { imm12 };
        let a = self.state.reg_sp(rn);

        let result = if sf {
            if is_sub {
                self.state.sub64(a, imm, set_flags)
            } else {
                self.state.add_with_carry64(a, imm, false, set_flags)
            }
        } else if is_sub {
            self.state.sub32(a as u32, imm as u32, set_flags) as u64
        } else {
            self.state
                .add_with_carry32(a as u32, imm as u32, false, set_flags) as u64
        };

        // Rd is SP for the non-flag-setting forms, XZR/WZR for ADDS/SUBS.
        if set_flags {
            self.state.set_reg(rd, result);
        } else {
            self.state.set_reg_sp(rd, result);
        }
        StepResult::Continue
    }

    // -- move wide (MOVN/MOVZ/MOVK) -----------------------------------------

    pub(crate) fn move_wide(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opc = opbits(op, 29, 2);
        let hw = opbits(op, 21, 2);
        let imm16 = opbits(op, 5, 16);
        let rd = opbits(op, 0, 5) as u32;

        if !sf && hw >= 2 {
            self.unhandled(op);
        }
        let pos = (hw * 16) as u32;
        let result = match opc {
            0b00 => !(imm16 << pos), // MOVN
            0b10 => imm16 << pos,    // MOVZ
            0b11 => {
                // MOVK: insert into the existing value
                (self.state.reg(rd) & !(0xFFFF << pos)) | (imm16 << pos)
            }
            _ => self.unhandled(op),
        };
        let result = if sf { result } else { result & 0xFFFF_FFFF };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    // -- logical (immediate) ------------------------------------------------

    pub(crate) fn logical_imm(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opc = opbits(op, 29, 2);
        let n = opbit(op, 22);
        let immr = opbits(op, 16, 6);
        let imms = opbits(op, 10, 6);
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        let imm = match decode_bitmask_imm(sf, n, immr, imms) {
            Some(imm) => imm,
            None => self.unhandled(op),
        };
        let a = self.state.reg(rn);
        let result = match opc {
            0b00 => a & imm,
            0b01 => a | imm,
            0b10 => a ^ imm,
            _ => a & imm, // ANDS
        };
        let result = if sf { result } else { result & 0xFFFF_FFFF };

        if opc == 0b11 {
            let top = if sf { 63 } else { 31 };
            self.state.set_n(result >> top != 0);
            self.state.set_z(result == 0);
            self.state.set_c(false);
            self.state.set_v(false);
            self.state.set_reg(rd, result);
        } else {
            // AND/ORR/EOR immediate write to SP when Rd is 31.
            self.state.set_reg_sp(rd, result);
        }
        StepResult::Continue
    }

    // -- bitfield (SBFM/BFM/UBFM) -------------------------------------------

    pub(crate) fn bitfield(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opc = opbits(op, 29, 2);
        let n = opbit(op, 22);
        let r = opbits(op, 16, 6) as u32;
        let s = opbits(op, 10, 6) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        let datasize: u32 = if sf { 64 } else { 32 };
        if opc == 0b11 || (sf && n == 0) || (!sf && (n != 0 || r >= 32 || s >= 32)) {
            self.unhandled(op);
        }

        let src = self.state.reg(rn) & lowmask(datasize);
        let dst = self.state.reg(rd) & lowmask(datasize);

        // A window of bits moves from source to destination; its position
        // depends on whether imms reaches down to immr or wraps.
        let result = if s >= r {
            let width = s - r + 1;
            let field = (src >> r) & lowmask(width);
            match opc {
                0b00 => (sign_extend(field, width) as u64) & lowmask(datasize),
                0b01 => (dst & !lowmask(width)) | field,
                _ => field,
            }
        } else {
            let width = s + 1;
            let field = src & lowmask(width);
            let pos = datasize - r;
            match opc {
                0b00 => ((sign_extend(field, width) as u64) << pos) & lowmask(datasize),
                0b01 => (dst & !(lowmask(width) << pos)) | (field << pos),
                _ => field << pos,
            }
        };
        self.state.set_reg(rd, result & lowmask(datasize));
        StepResult::Continue
    }

    // -- extract (EXTR) -----------------------------------------------------

    pub(crate) fn extr(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let n = opbit(op, 22);
        let o21 = opbits(op, 29, 2);
        let rm = opbits(op, 16, 5) as u32;
        let imms = opbits(op, 10, 6) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if o21 != 0 || opbit(op, 21) != 0 || n != sf as u64 || (!sf && imms >= 32) {
            self.unhandled(op);
        }

        let lo = self.state.reg(rm);
        let hi = self.state.reg(rn);
        let result = if sf {
            if imms == 0 {
                lo
            } else {
                (lo >> imms) | (hi << (64 - imms))
            }
        } else {
            let lo = lo as u32;
            let hi = hi as u32;
            (if imms == 0 {
                lo
            } else {
                (lo >> imms) | (hi << (32 - imms))
            }) as u64
        };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    // -- logical (shifted register) -----------------------------------------

    pub(crate) fn logical_shifted(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opc = opbits(op, 29, 2);
        let shift_type = opbits(op, 22, 2);
        let invert = opbit(op, 21) != 0;
        let rm = opbits(op, 16, 5) as u32;
        let amount = opbits(op, 10, 6) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if !sf && amount >= 32 {
            self.unhandled(op);
        }

        let a = self.state.reg(rn);
        let b = if sf {
            let b = shift64(self.state.reg(rm), shift_type, amount);
            if invert {
                !b
            } else {
                b
            }
        } else {
            let b = shift32(self.state.reg(rm) as u32, shift_type, amount);
            (if invert { !b } else { b }) as u64
        };
        let a = if sf { a } else { a & 0xFFFF_FFFF };

        let result = match opc {
            0b00 => a & b,
            0b01 => a | b,
            0b10 => a ^ b,
            _ => a & b, // ANDS/BICS
        };
        let result = if sf { result } else { result & 0xFFFF_FFFF };

        if opc == 0b11 {
            let top = if sf { 63 } else { 31 };
            self.state.set_n(result >> top != 0);
            self.state.set_z(result == 0);
            self.state.set_c(false);
            self.state.set_v(false);
        }
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    // -- add/subtract (shifted and extended register) -----------------------

    pub(crate) fn add_sub_reg(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let is_sub = opbit(op, 30) != 0;
        let set_flags = opbit(op, 29) != 0;
        let rm = opbits(op, 16, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;
        let extended = opbit(op, 21) != 0 && opbits(op, 22, 2) == 0;

        let (a, b, rd_is_sp) = if extended {
            let option = opbits(op, 13, 3);
            let shift = opbits(op, 10, 3) as u32;
            if shift > 4 {
                self.unhandled(op);
            }
            let a = self.state.reg_sp(rn);
            let b = extend_reg(self.state.reg(rm), option, shift);
            (a, b, !set_flags)
        } else {
            if opbit(op, 21) != 0 {
                self.unhandled(op);
            }
            let shift_type = opbits(op, 22, 2);
            let amount = opbits(op, 10, 6) as u32;
            if shift_type == 3 || (!sf && amount >= 32) {
                self.unhandled(op);
            }
            let a = self.state.reg(rn);
            let b = if sf {
                shift64(self.state.reg(rm), shift_type, amount)
            } else {
                shift32(self.state.reg(rm) as u32, shift_type, amount) as u64
            };
            (a, b, false)
        };

        let result = if sf {
            if is_sub {
                self.state.sub64(a, b, set_flags)
            } else {
                self.state.add_with_carry64(a, b, false, set_flags)
            }
        } else if is_sub {
            self.state.sub32(a as u32, b as u32, set_flags) as u64
        } else {
            self.state
                .add_with_carry32(a as u32, b as u32, false, set_flags) as u64
        };

        if rd_is_sp {
            self.state.set_reg_sp(rd, result);
        } else {
            self.state.set_reg(rd, result);
        }
        StepResult::Continue
    }

    // -- the 0bx1011010 islands: ADC/SBC, CCMN/CCMP, CSEL, 1/2-source -------

    pub(crate) fn dp_misc(&mut self, op: u32) -> StepResult {
        let sub_op = opbits(op, 21, 3);
        match sub_op {
            0b000 if opbits(op, 10, 6) == 0 => self.adc_sbc(op),
            0b010 => self.ccmn_ccmp(op),
            0b100 => self.csel_family(op),
            0b110 => {
                if opbit(op, 30) == 0 {
                    self.dp2_source(op)
                } else {
                    self.dp1_source(op)
                }
            }
            _ => self.unhandled(op),
        }
    }

    fn adc_sbc(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let is_sbc = opbit(op, 30) != 0;
        let set_flags = opbit(op, 29) != 0;
        let rm = opbits(op, 16, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        let a = self.state.reg(rn);
        let b = self.state.reg(rm);
        let carry = self.state.c();
        let result = if sf {
            let b = if is_sbc { !b } else { b };
            self.state.add_with_carry64(a, b, carry, set_flags)
        } else {
            let b = if is_sbc { !(b as u32) } else { b as u32 };
            self.state.add_with_carry32(a as u32, b, carry, set_flags) as u64
        };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    fn ccmn_ccmp(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let is_ccmp = opbit(op, 30) != 0;
        let is_imm = opbit(op, 11) != 0;
        let cond = opbits(op, 12, 4);
        let rn = opbits(op, 5, 5) as u32;
        let nzcv = opbits(op, 0, 4);

        if opbit(op, 29) == 0 || opbit(op, 10) != 0 || opbit(op, 4) != 0 {
            self.unhandled(op);
        }

        if !self.state.check_condition(cond) {
            self.state.set_flags_from_nzcv(nzcv);
            return StepResult::Continue;
        }

        let a = self.state.reg(rn);
        let b = if is_imm {
            opbits(op, 16, 5)
        } else {
            self.state.reg(opbits(op, 16, 5) as u32)
        };
        if sf {
            if is_ccmp {
                self.state.sub64(a, b, true);
            } else {
                self.state.add_with_carry64(a, b, false, true);
            }
        } else if is_ccmp {
            self.state.sub32(a as u32, b as u32, true);
        } else {
            self.state.add_with_carry32(a as u32, b as u32, false, true);
        }
        StepResult::Continue
    }

    fn csel_family(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let neg_style = opbit(op, 30) != 0; // CSINV/CSNEG half
        let op2 = opbits(op, 10, 2);
        let rm = opbits(op, 16, 5) as u32;
        let cond = opbits(op, 12, 4);
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if opbit(op, 29) != 0 || op2 >= 2 {
            self.unhandled(op);
        }

        let result = if self.state.check_condition(cond) {
            self.state.reg(rn)
        } else {
            let b = self.state.reg(rm);
            match (neg_style, op2) {
                (false, 0) => b,                 // CSEL
                (false, _) => b.wrapping_add(1), // CSINC
                (true, 0) => !b,                 // CSINV
                (true, _) => b.wrapping_neg(),   // CSNEG
            }
        };
        let result = if sf { result } else { result & 0xFFFF_FFFF };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    fn dp2_source(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opcode = opbits(op, 10, 6);
        let rm = opbits(op, 16, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if opbit(op, 29) != 0 {
            self.unhandled(op);
        }

        let a = self.state.reg(rn);
        let b = self.state.reg(rm);
        let datasize = if sf { 64 } else { 32 };
        let result = match opcode {
            // UDIV: division by zero yields 0, no trap.
            0b000010 => {
                if sf {
                    if b == 0 {
                        0
                    } else {
                        a / b
                    }
                } else {
                    let (a, b) = (a as u32, b as u32);
                    (if b == 0 { 0 } else { a / b }) as u64
                }
            }
            0b000011 => {
                if sf {
                    let (a, b) = (a as i64, b as i64);
                    (if b == 0 { 0 } else { a.wrapping_div(b) }) as u64
                } else {
                    let (a, b) = (a as i32, b as i32);
                    (if b == 0 { 0 } else { a.wrapping_div(b) }) as u32 as u64
                }
            }
            0b001000..=0b001011 => {
                let amount = (b % datasize as u64) as u32;
                if sf {
                    shift64(a, opcode & 3, amount)
                } else {
                    shift32(a as u32, opcode & 3, amount) as u64
                }
            }
            _ => self.unhandled(op),
        };
        let result = if sf { result } else { result & 0xFFFF_FFFF };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    fn dp1_source(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let opcode = opbits(op, 10, 6);
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if opbit(op, 29) != 0 || opbits(op, 16, 5) != 0 {
            self.unhandled(op);
        }

        let a = self.state.reg(rn);
        let result = match (opcode, sf) {
            (0b000000, true) => a.reverse_bits(),
            (0b000000, false) => ((a as u32).reverse_bits()) as u64,
            (0b000001, true) => {
                // REV16: byte-swap each halfword
                ((a & 0x00FF_00FF_00FF_00FF) << 8) | ((a >> 8) & 0x00FF_00FF_00FF_00FF)
            }
            (0b000001, false) => {
                let a = a as u32;
                (((a & 0x00FF_00FF) << 8) | ((a >> 8) & 0x00FF_00FF)) as u64
            }
            // REV (32-bit) / REV32 (64-bit): byte-swap each word
            (0b000010, false) => (a as u32).swap_bytes() as u64,
            (0b000010, true) => {
                let lo = (a as u32).swap_bytes() as u64;
                let hi = ((a >> 32) as u32).swap_bytes() as u64;
                lo | (hi << 32)
            }
            (0b000011, true) => a.swap_bytes(), // REV (64-bit)
            (0b000100, true) => a.leading_zeros() as u64,
            (0b000100, false) => (a as u32).leading_zeros() as u64,
            (0b000101, true) => (a ^ (((a as i64) >> 63) as u64)).leading_zeros() as u64 - 1,
            (0b000101, false) => {
                let a = a as u32;
                (a ^ (((a as i32) >> 31) as u32)).leading_zeros() as u64 - 1
            }
            _ => self.unhandled(op),
        };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }

    // -- data processing (3 source): multiply-add family --------------------

    pub(crate) fn dp3_source(&mut self, op: u32) -> StepResult {
        let sf = opbit(op, 31) != 0;
        let op31 = opbits(op, 21, 3);
        let o0 = opbit(op, 15);
        let rm = opbits(op, 16, 5) as u32;
        let ra = opbits(op, 10, 5) as u32;
        let rn = opbits(op, 5, 5) as u32;
        let rd = opbits(op, 0, 5) as u32;

        if opbits(op, 29, 2) != 0 {
            self.unhandled(op);
        }

        let n = self.state.reg(rn);
        let m = self.state.reg(rm);
        let acc = self.state.reg(ra);

        let result = match (op31, o0, sf) {
            (0b000, 0, true) => acc.wrapping_add(n.wrapping_mul(m)),
            (0b000, 1, true) => acc.wrapping_sub(n.wrapping_mul(m)),
            (0b000, 0, false) => {
                (acc as u32).wrapping_add((n as u32).wrapping_mul(m as u32)) as u64
            }
            (0b000, 1, false) => {
                (acc as u32).wrapping_sub((n as u32).wrapping_mul(m as u32)) as u64
            }
            (0b001, 0, true) => {
                acc.wrapping_add(((n as i32 as i64).wrapping_mul(m as i32 as i64)) as u64)
            }
            (0b001, 1, true) => {
                acc.wrapping_sub(((n as i32 as i64).wrapping_mul(m as i32 as i64)) as u64)
            }
            (0b101, 0, true) => acc.wrapping_add((n & 0xFFFF_FFFF).wrapping_mul(m & 0xFFFF_FFFF)),
            (0b101, 1, true) => acc.wrapping_sub((n & 0xFFFF_FFFF).wrapping_mul(m & 0xFFFF_FFFF)),
            (0b010, 0, true) if ra == 31 => {
                (((n as i64 as i128) * (m as i64 as i128)) >> 64) as u64
            }
            (0b110, 0, true) if ra == 31 => (((n as u128) * (m as u128)) >> 64) as u64,
            _ => self.unhandled(op),
        };
        self.state.set_reg(rd, result);
        StepResult::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn test_decode_bitmask_imm() {
        // 0x5555...: size 2, S=0, R=0
        assert_eq!(
            decode_bitmask_imm(true, 0, 0b111100, 0b111100),
            Some(0x5555_5555_5555_5555)
        );
        // imms=0b011101, immr=0: 30 ones in a 32-bit element
        assert_eq!(
            decode_bitmask_imm(true, 0, 0, 0b011101),
            Some(0x3FFF_FFFF_3FFF_FFFF)
        );
        // 64-bit element, 33 ones rotated: N=1 imms=0b100000 immr=0b000001
        assert_eq!(
            decode_bitmask_imm(true, 1, 1, 0b100000),
            Some(0x8000_0000_FFFF_FFFF)
        );
        // all-ones is reserved
        assert_eq!(decode_bitmask_imm(true, 1, 0, 0b111111), None);
        // 32-bit form cannot use N=1
        assert_eq!(decode_bitmask_imm(false, 1, 0, 0), None);
    }

    #[test]
    fn test_bitmask_imm_is_injective() {
        // Every valid 13-bit field decodes to a distinct 64-bit mask, so
        // decode followed by re-encode is the identity.
        let mut seen = std::collections::HashSet::new();
        let mut valid = 0u32;
        for field in 0u64..(1 << 13) {
            let n = field >> 12;
            let immr = (field >> 6) & 0x3F;
            let imms = field & 0x3F;
            if let Some(mask) = decode_bitmask_imm(true, n, immr, imms) {
                assert_ne!(mask, 0);
                assert_ne!(mask, u64::MAX);
                assert!(seen.insert(mask), "duplicate mask for field {field:#x}");
                valid += 1;
            }
        }
        assert_eq!(valid, 5334); // the architectural count of valid encodings
    }

    #[test]
    fn test_add_flags_scenario_s2() {
        // MOV W0, #0xffff...; via MOVN W0, #0; MOV W1, #1; ADDS W2, W0, W1
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x1280_0000, // MOVN W0, #0  -> 0xffffffff
                0x5280_0021, // MOVZ W1, #1
                0x2B01_0002, // ADDS W2, W0, W1
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(2), 0);
        assert!(!cpu.state.n());
        assert!(cpu.state.z());
        assert!(cpu.state.c());
        assert!(!cpu.state.v_flag());
    }

    #[test]
    fn test_adds_signed_overflow_scenario_s3() {
        // X0 = 0x7fffffffffffffff via MOVN X0, #0x8000, LSL #48
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x92F0_0000, // MOVN X0, #0x8000, LSL #48
                movz(1, 1),  // MOVZ X1, #1
                0xAB01_0002, // ADDS X2, X0, X1
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(0), 0x7FFF_FFFF_FFFF_FFFF);
        assert_eq!(cpu.state.reg(2), 0x8000_0000_0000_0000);
        assert!(cpu.state.n());
        assert!(!cpu.state.z());
        assert!(!cpu.state.c());
        assert!(cpu.state.v_flag());
    }

    #[test]
    fn test_subs_borrow_scenario_s6() {
        // MOV W0, #0x80000000; MOV W1, #1; SUBS W2, W0, W1
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x52B0_0000, // MOVZ W0, #0x8000, LSL #16
                0x5280_0021, // MOVZ W1, #1
                0x6B01_0002, // SUBS W2, W0, W1
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(0), 0x8000_0000);
        assert_eq!(cpu.state.reg(2), 0x7FFF_FFFF);
        assert!(!cpu.state.n());
        assert!(!cpu.state.z());
        assert!(cpu.state.c());
        assert!(cpu.state.v_flag());
    }

    #[test]
    fn test_add_imm_writes_sp() {
        // ADD SP, SP, #16 then SUB SP, SP, #16
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0x9100_43FF, 0xD100_43FF, SVC0]);
        cpu.run(10);
        assert_eq!(cpu.state.sp(), STACK_TOP);
    }

    #[test]
    fn test_zero_register_destination() {
        // ADDS XZR, X0, #1 (aka CMN X0, #1): flags written, X31 untouched
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[movz(0, 7), 0xB100_041F, SVC0]);
        cpu.run(10);
        assert_eq!(cpu.state.sp(), STACK_TOP);
        assert!(!cpu.state.z());
    }

    #[test]
    fn test_movk_inserts() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0xD2BF_D7C0, // MOVZ X0, #0xFEBE, LSL #16
                0xF280_ACE0, // MOVK X0, #0x0567
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(0), 0xFEBE_0567);
    }

    #[test]
    fn test_logical_imm_and_ors() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 0xF0F0),
                0x9240_0C01, // AND X1, X0, #0xF
                0xB240_0C02, // ORR X2, X0, #0xF
                0xD240_0C03, // EOR X3, X0, #0xF
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0x0);
        assert_eq!(cpu.state.reg(2), 0xF0FF);
        assert_eq!(cpu.state.reg(3), 0xF0FF);
    }

    #[test]
    fn test_ubfm_lsr_lsl() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 0xABCD),
                0xD344_FC01, // LSR X1, X0, #4
                0xD37C_EC02, // LSL X2, X0, #4  (UBFM X2, X0, #60, #59)
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0xABC);
        assert_eq!(cpu.state.reg(2), 0xABCD0);
    }

    #[test]
    fn test_sbfm_asr_sxtb() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x1280_1FE0, // MOVN W0, #0xFF -> 0xFFFFFF00
                0x9340_1C01, // SBFM X1, X0, #0, #7 (sign-extend byte 0x00)
                movz(2, 0x80),
                0x9340_1C43, // SBFM X3, X2, #0, #7 -> sign-extend 0x80
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0); // low byte of X0 is 0x00
        assert_eq!(cpu.state.reg(3), 0xFFFF_FFFF_FFFF_FF80);
    }

    #[test]
    fn test_bfm_preserves_untouched_bits() {
        // BFI X1, X0, #8, #8 == BFM X1, X0, #56, #7
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0xB378_1C01, SVC0]);
        cpu.state.x[0] = 0xAB;
        cpu.state.x[1] = 0x1111_1111;
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0x1111_AB11);
    }

    #[test]
    fn test_extr_ror() {
        // ROR X1, X0, #8 == EXTR X1, X0, X0, #8
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0x93C0_2001, SVC0]);
        cpu.state.x[0] = 0x1122_3344_5566_7788;
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0x8811_2233_4455_6677);
    }

    #[test]
    fn test_csel_csinc_csinv_csneg() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 5),
                movz(1, 9),
                0xEB01_001F, // CMP X0, X1 (lt)
                0x9A81_B002, // CSEL X2, X0, X1, LT  -> X0
                0x9A81_A403, // CSINC X3, X0, X1, GE -> X1+1
                0xDA81_A004, // CSINV X4, X0, X1, GE -> !X1
                0xDA81_B405, // CSNEG X5, X0, X1, LT -> X0
                SVC0,
            ],
        );
        cpu.run(20);
        assert_eq!(cpu.state.reg(2), 5);
        assert_eq!(cpu.state.reg(3), 10);
        assert_eq!(cpu.state.reg(4), !9u64);
        assert_eq!(cpu.state.reg(5), 5);
    }

    #[test]
    fn test_ccmp_paths() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 3),
                movz(1, 3),
                0xEB01_001F, // CMP X0, X1 -> EQ
                0xFA41_0000, // CCMP X0, X1, #0, EQ -> condition true: compare again, EQ
                SVC0,
            ],
        );
        cpu.run(10);
        assert!(cpu.state.z());

        // Failing condition installs the nzcv immediate.
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 3),
                movz(1, 4),
                0xEB01_001F, // CMP X0, X1 -> NE, borrow
                0xFA41_0002, // CCMP X0, X1, #2, EQ -> cond false: NZCV = 0b0010 (C)
                SVC0,
            ],
        );
        cpu.run(10);
        assert!(!cpu.state.n());
        assert!(!cpu.state.z());
        assert!(cpu.state.c());
        assert!(!cpu.state.v_flag());
    }

    #[test]
    fn test_madd_msub_mul_high() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 7),
                movz(1, 6),
                movz(2, 100),
                0x9B01_0803, // MADD X3, X0, X1, X2 -> 142
                0x9B01_8804, // MSUB X4, X0, X1, X2 -> 58
                0x9B41_7C05, // SMULH X5, X0, X1
                0x9BC1_7C06, // UMULH X6, X0, X1
                SVC0,
            ],
        );
        cpu.run(20);
        assert_eq!(cpu.state.reg(3), 142);
        assert_eq!(cpu.state.reg(4), 58);
        assert_eq!(cpu.state.reg(5), 0);
        assert_eq!(cpu.state.reg(6), 0);
    }

    #[test]
    fn test_smaddl_umaddl() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x1280_0000, // MOVN W0, #0 -> W0 = 0xFFFFFFFF (-1)
                0x5280_0041, // MOVZ W1, #2
                0x9B21_7C02, // SMULL X2, W0, W1 -> -2
                0x9BA1_7C03, // UMULL X3, W0, W1 -> 0x1FFFFFFFE
                SVC0,
            ],
        );
        cpu.run(10);
        assert_eq!(cpu.state.reg(2) as i64, -2);
        assert_eq!(cpu.state.reg(3), 0x1_FFFF_FFFE);
    }

    #[test]
    fn test_division_by_zero_yields_zero() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                movz(0, 1234),
                movz(1, 0),
                0x9AC1_0802, // UDIV X2, X0, X1
                0x9AC1_0C03, // SDIV X3, X0, X1
                SVC0,
            ],
        );
        cpu.state.x[2] = 0xAAAA;
        cpu.state.x[3] = 0xBBBB;
        cpu.run(10);
        assert_eq!(cpu.state.reg(2), 0);
        assert_eq!(cpu.state.reg(3), 0);
    }

    #[test]
    fn test_sdiv_int_min_overflow() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0x9AC1_0C02, SVC0]); // SDIV X2, X0, X1
        cpu.state.x[0] = i64::MIN as u64;
        cpu.state.x[1] = -1i64 as u64;
        cpu.run(10);
        assert_eq!(cpu.state.reg(2), i64::MIN as u64);
    }

    #[test]
    fn test_variable_shifts() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x9AC2_2001, // LSLV X1, X0, X2
                0x9AC2_2403, // LSRV X3, X0, X2
                0x9AC2_2804, // ASRV X4, X0, X2
                0x9AC2_2C05, // RORV X5, X0, X2
                SVC0,
            ],
        );
        cpu.state.x[0] = 0x8000_0000_0000_0001;
        cpu.state.x[2] = 68; // mod 64 -> 4
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 0x10);
        assert_eq!(cpu.state.reg(3), 0x0800_0000_0000_0000);
        assert_eq!(cpu.state.reg(4), 0xF800_0000_0000_0000);
        assert_eq!(cpu.state.reg(5), 0x1800_0000_0000_0000);
    }

    #[test]
    fn test_rev_rbit_clz() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0xDAC0_0C01, // REV X1, X0
                0xDAC0_0C22, // REV X2, X1 (applied twice: identity)
                0xDAC0_0003, // RBIT X3, X0
                0xDAC0_0064, // RBIT X4, X3
                0xDAC0_1005, // CLZ X5, X0
                0xDAC0_0806, // REV32 X6, X0
                0xDAC0_0407, // REV16 X7, X0
                SVC0,
            ],
        );
        cpu.state.x[0] = 0x0123_4567_89AB_CDEF;
        cpu.run(20);
        assert_eq!(cpu.state.reg(1), 0xEFCD_AB89_6745_2301);
        assert_eq!(cpu.state.reg(2), 0x0123_4567_89AB_CDEF);
        assert_eq!(cpu.state.reg(4), 0x0123_4567_89AB_CDEF);
        assert_eq!(cpu.state.reg(5), 7);
        assert_eq!(cpu.state.reg(6), 0x6745_2301_EFCD_AB89);
        assert_eq!(cpu.state.reg(7), 0x2301_6745_AB89_EFCD);
    }

    #[test]
    fn test_cls() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0xDAC0_1401, SVC0]); // CLS X1, X0
        cpu.state.x[0] = 0xFFFF_FFFF_0000_0000;
        cpu.run(10);
        assert_eq!(cpu.state.reg(1), 31);
    }

    #[test]
    fn test_logical_shifted_bic_orn_ands() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0x8A21_0002, // BIC X2, X0, X1
                0xAA21_0003, // ORN X3, X0, X1
                0xEA01_0004, // ANDS X4, X0, X1
                SVC0,
            ],
        );
        cpu.state.x[0] = 0xFF00;
        cpu.state.x[1] = 0x0F00;
        cpu.run(10);
        assert_eq!(cpu.state.reg(2), 0xF000);
        assert_eq!(cpu.state.reg(3), u64::MAX);
        assert_eq!(cpu.state.reg(4), 0x0F00);
        assert!(!cpu.state.z());
        assert!(!cpu.state.n());
    }

    #[test]
    fn test_add_extended_register() {
        // ADD X2, SP, W1, UXTW #2
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(&mut mem, &[0x8B21_4BE2, SVC0]);
        cpu.state.x[1] = 0xFFFF_FFFF_0000_0004; // UXTW drops the high half
        cpu.run(10);
        assert_eq!(cpu.state.reg(2), STACK_TOP + 16);
    }

    #[test]
    fn test_adc_sbc_carry_chain() {
        let mut mem = vec![0u8; MEM_SIZE];
        let mut cpu = make_cpu(
            &mut mem,
            &[
                0xAB01_001F, // CMN X0, X1: 0xFFFF..FF + 1 -> carry out
                0x9A03_0044, // ADC X4, X2, X3 -> X2+X3+1
                SVC0,
            ],
        );
        cpu.state.x[0] = u64::MAX;
        cpu.state.x[1] = 1;
        cpu.state.x[2] = 10;
        cpu.state.x[3] = 20;
        cpu.run(10);
        assert_eq!(cpu.state.reg(4), 31);
    }
}
