// SPDX-FileCopyrightText: 2026 armlet contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Instruction rendering for the tracer.
//!
//! A pure function of the machine state and the 32-bit word: never mutates
//! anything, resolves branch targets through [`Host::symbol_lookup`], and
//! falls back to `.inst 0x????????` for encodings it does not know. Output
//! goes through the `log` facade, so a closed or absent sink drops it
//! silently.

use armlet_common::bits::{opbit, opbits, sign_extend};

use crate::host::Host;
use crate::interpreter::alu::decode_bitmask_imm;
use crate::state::CpuState;

/// X-form or W-form register name; register 31 renders as the zero register.
pub fn reg_name(r: u64, sf: bool) -> String {
    match (r, sf) {
        (31, true) => "xzr".into(),
        (31, false) => "wzr".into(),
        (r, true) => format!("x{r}"),
        (r, false) => format!("w{r}"),
    }
}

/// Like [`reg_name`] but register 31 is SP.
pub fn reg_or_sp_name(r: u64, sf: bool) -> String {
    match (r, sf) {
        (31, _) => "sp".into(),
        (r, true) => format!("x{r}"),
        (r, false) => format!("w{r}"),
    }
}

pub fn vreg_name(r: u64) -> String {
    format!("v{r}")
}

/// The NZCV flags as a compact trace suffix.
pub fn render_flags(state: &CpuState) -> String {
    format!(
        "[{}{}{}{}]",
        if state.n() { 'N' } else { 'n' },
        if state.z() { 'Z' } else { 'z' },
        if state.c() { 'C' } else { 'c' },
        if state.v_flag() { 'V' } else { 'v' },
    )
}

fn cond_name(cond: u64) -> &'static str {
    match cond & 0xF {
        0x0 => "eq",
        0x1 => "ne",
        0x2 => "cs",
        0x3 => "cc",
        0x4 => "mi",
        0x5 => "pl",
        0x6 => "vs",
        0x7 => "vc",
        0x8 => "hi",
        0x9 => "ls",
        0xA => "ge",
        0xB => "lt",
        0xC => "gt",
        0xD => "le",
        0xE => "al",
        _ => "nv",
    }
}

fn shift_name(shift_type: u64) -> &'static str {
    match shift_type & 3 {
        0 => "lsl",
        1 => "lsr",
        2 => "asr",
        _ => "ror",
    }
}

fn extend_name(option: u64) -> &'static str {
    match option & 7 {
        0 => "uxtb",
        1 => "uxth",
        2 => "uxtw",
        3 => "uxtx",
        4 => "sxtb",
        5 => "sxth",
        6 => "sxtw",
        _ => "sxtx",
    }
}

/// Branch target with a best-effort symbol annotation.
fn target<H: Host>(host: &H, addr: u64) -> String {
    match host.symbol_lookup(addr) {
        Some((name, 0)) => format!("{addr:#x} <{name}>"),
        Some((name, off)) => format!("{addr:#x} <{name}+{off:#x}>"),
        None => format!("{addr:#x}"),
    }
}

/// Render the instruction at the current PC.
pub fn disassemble<H: Host>(state: &CpuState, op: u32, host: &H) -> String {
    let pc = state.pc;
    let rd = opbits(op, 0, 5);
    let rn = opbits(op, 5, 5);
    let rm = opbits(op, 16, 5);
    let rt = rd;
    let sf = opbit(op, 31) != 0;

    match (op >> 24) as u8 {
        0x10 | 0x30 | 0x50 | 0x70 | 0x90 | 0xB0 | 0xD0 | 0xF0 => {
            let imm = sign_extend((opbits(op, 5, 19) << 2) | opbits(op, 29, 2), 21);
            if opbit(op, 31) == 0 {
                format!("adr x{rd}, {}", target(host, pc.wrapping_add(imm as u64)))
            } else {
                let page = (pc & !0xFFF).wrapping_add((imm << 12) as u64);
                format!("adrp x{rd}, {}", target(host, page))
            }
        }
        0x11 | 0x31 | 0x51 | 0x71 | 0x91 | 0xB1 | 0xD1 | 0xF1 => {
            let mnem = match (opbit(op, 30), opbit(op, 29)) {
                (0, 0) => "add",
                (0, 1) => "adds",
                (1, 0) => "sub",
                _ => "subs",
            };
            let imm = opbits(op, 10, 12) << (12 * opbit(op, 22));
            let dst = if opbit(op, 29) != 0 {
                reg_name(rd, sf)
            } else {
                reg_or_sp_name(rd, sf)
            };
            format!("{mnem} {dst}, {}, #{imm:#x}", reg_or_sp_name(rn, sf))
        }
        0x12 | 0x32 | 0x52 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
            if opbit(op, 23) != 0 {
                let mnem = match opbits(op, 29, 2) {
                    0b00 => "movn",
                    0b10 => "movz",
                    _ => "movk",
                };
                let imm16 = opbits(op, 5, 16);
                let hw = opbits(op, 21, 2) * 16;
                if hw == 0 {
                    format!("{mnem} {}, #{imm16:#x}", reg_name(rd, sf))
                } else {
                    format!("{mnem} {}, #{imm16:#x}, lsl #{hw}", reg_name(rd, sf))
                }
            } else {
                let mnem = match opbits(op, 29, 2) {
                    0b00 => "and",
                    0b01 => "orr",
                    0b10 => "eor",
                    _ => "ands",
                };
                let imm = decode_bitmask_imm(sf, opbit(op, 22), opbits(op, 16, 6), opbits(op, 10, 6));
                match imm {
                    Some(imm) => format!(
                        "{mnem} {}, {}, #{imm:#x}",
                        reg_or_sp_name(rd, sf),
                        reg_name(rn, sf)
                    ),
                    None => format!(".inst {op:#010x}"),
                }
            }
        }
        0x13 | 0x33 | 0x53 | 0x93 | 0xB3 | 0xD3 => {
            if opbit(op, 23) != 0 {
                format!(
                    "extr {}, {}, {}, #{}",
                    reg_name(rd, sf),
                    reg_name(rn, sf),
                    reg_name(rm, sf),
                    opbits(op, 10, 6)
                )
            } else {
                let mnem = match opbits(op, 29, 2) {
                    0b00 => "sbfm",
                    0b01 => "bfm",
                    _ => "ubfm",
                };
                format!(
                    "{mnem} {}, {}, #{}, #{}",
                    reg_name(rd, sf),
                    reg_name(rn, sf),
                    opbits(op, 16, 6),
                    opbits(op, 10, 6)
                )
            }
        }
        0x0A | 0x2A | 0x4A | 0x6A | 0x8A | 0xAA | 0xCA | 0xEA => {
            let mnem = match (opbits(op, 29, 2), opbit(op, 21)) {
                (0b00, 0) => "and",
                (0b00, _) => "bic",
                (0b01, 0) => "orr",
                (0b01, _) => "orn",
                (0b10, 0) => "eor",
                (0b10, _) => "eon",
                (_, 0) => "ands",
                _ => "bics",
            };
            let amount = opbits(op, 10, 6);
            if amount == 0 && opbits(op, 22, 2) == 0 {
                format!(
                    "{mnem} {}, {}, {}",
                    reg_name(rd, sf),
                    reg_name(rn, sf),
                    reg_name(rm, sf)
                )
            } else {
                format!(
                    "{mnem} {}, {}, {}, {} #{amount}",
                    reg_name(rd, sf),
                    reg_name(rn, sf),
                    reg_name(rm, sf),
                    shift_name(opbits(op, 22, 2))
                )
            }
        }
        0x0B | 0x2B | 0x4B | 0x6B | 0x8B | 0xAB | 0xCB | 0xEB => {
            let mnem = match (opbit(op, 30), opbit(op, 29)) {
                (0, 0) => "add",
                (0, 1) => "adds",
                (1, 0) => "sub",
                _ => "subs",
            };
            if opbit(op, 21) != 0 && opbits(op, 22, 2) == 0 {
                format!(
                    "{mnem} {}, {}, {}, {} #{}",
                    reg_name(rd, sf),
                    reg_or_sp_name(rn, sf),
                    reg_name(rm, sf),
                    extend_name(opbits(op, 13, 3)),
                    opbits(op, 10, 3)
                )
            } else {
                let amount = opbits(op, 10, 6);
                if amount == 0 {
                    format!(
                        "{mnem} {}, {}, {}",
                        reg_name(rd, sf),
                        reg_name(rn, sf),
                        reg_name(rm, sf)
                    )
                } else {
                    format!(
                        "{mnem} {}, {}, {}, {} #{amount}",
                        reg_name(rd, sf),
                        reg_name(rn, sf),
                        reg_name(rm, sf),
                        shift_name(opbits(op, 22, 2))
                    )
                }
            }
        }
        0x1A | 0x3A | 0x5A | 0x7A | 0x9A | 0xBA | 0xDA | 0xFA => dp_misc_str(op, sf),
        0x1B | 0x9B => {
            let mnem = match (opbits(op, 21, 3), opbit(op, 15)) {
                (0b000, 0) => "madd",
                (0b000, _) => "msub",
                (0b001, 0) => "smaddl",
                (0b001, _) => "smsubl",
                (0b101, 0) => "umaddl",
                (0b101, _) => "umsubl",
                (0b010, 0) => "smulh",
                (0b110, 0) => "umulh",
                _ => return format!(".inst {op:#010x}"),
            };
            format!(
                "{mnem} {}, {}, {}, {}",
                reg_name(rd, sf),
                reg_name(rn, sf),
                reg_name(rm, sf),
                reg_name(opbits(op, 10, 5), sf)
            )
        }
        0x14..=0x17 | 0x94..=0x97 => {
            let offset = sign_extend(opbits(op, 0, 26), 26) << 2;
            let dest = pc.wrapping_add(offset as u64);
            let mnem = if opbit(op, 31) != 0 { "bl" } else { "b" };
            format!("{mnem} {}", target(host, dest))
        }
        0x34 | 0x35 | 0xB4 | 0xB5 => {
            let offset = sign_extend(opbits(op, 5, 19), 19) << 2;
            let mnem = if opbit(op, 24) != 0 { "cbnz" } else { "cbz" };
            format!(
                "{mnem} {}, {}",
                reg_name(rt, sf),
                target(host, pc.wrapping_add(offset as u64))
            )
        }
        0x36 | 0x37 | 0xB6 | 0xB7 => {
            let offset = sign_extend(opbits(op, 5, 14), 14) << 2;
            let bit = (opbit(op, 31) << 5) | opbits(op, 19, 5);
            let mnem = if opbit(op, 24) != 0 { "tbnz" } else { "tbz" };
            format!(
                "{mnem} {}, #{bit}, {}",
                reg_name(rt, bit >= 32),
                target(host, pc.wrapping_add(offset as u64))
            )
        }
        0x54 => {
            let offset = sign_extend(opbits(op, 5, 19), 19) << 2;
            format!(
                "b.{} {}",
                cond_name(opbits(op, 0, 4)),
                target(host, pc.wrapping_add(offset as u64))
            )
        }
        0xD4 => match (opbits(op, 21, 3), opbits(op, 0, 5)) {
            (0b000, 0b00001) => format!("svc #{:#x}", opbits(op, 5, 16)),
            (0b001, 0b00000) => format!("brk #{:#x}", opbits(op, 5, 16)),
            _ => format!(".inst {op:#010x}"),
        },
        0xD5 => system_str(op),
        0xD6 => {
            let reg = reg_name(rn, true);
            match opbits(op, 21, 4) {
                0b0000 => format!("br {reg}"),
                0b0001 => format!("blr {reg}"),
                0b0010 => {
                    if rn == 30 {
                        "ret".into()
                    } else {
                        format!("ret {reg}")
                    }
                }
                _ => format!(".inst {op:#010x}"),
            }
        }
        0x08 | 0x48 | 0x88 | 0xC8 => exclusive_str(op),
        0x28 | 0x29 | 0x68 | 0x69 | 0xA8 | 0xA9 | 0x2C | 0x2D | 0x6C | 0x6D | 0xAC | 0xAD => {
            pair_str(op)
        }
        0x18 | 0x58 | 0x98 | 0xD8 | 0x1C | 0x5C | 0x9C => {
            let offset = sign_extend(opbits(op, 5, 19), 19) << 2;
            let dest = pc.wrapping_add(offset as u64);
            let name = if opbit(op, 26) != 0 {
                let prefix = ["s", "d", "q", "?"][opbits(op, 30, 2) as usize];
                format!("{prefix}{rt}")
            } else {
                match opbits(op, 30, 2) {
                    0b00 => reg_name(rt, false),
                    0b01 => reg_name(rt, true),
                    0b10 => return format!("ldrsw {}, {}", reg_name(rt, true), target(host, dest)),
                    _ => return format!("prfm #{rt}, {}", target(host, dest)),
                }
            };
            format!("ldr {name}, {}", target(host, dest))
        }
        0x38 | 0x78 | 0xB8 | 0xF8 | 0x39 | 0x79 | 0xB9 | 0xF9 => gpr_ldst_str(op),
        0x3C | 0x7C | 0xBC | 0xFC | 0x3D | 0x7D | 0xBD | 0xFD => simd_ldst_str(op),
        0x0C | 0x4C => struct_ldst_str(op, true),
        0x0D | 0x4D => struct_ldst_str(op, false),
        0x1E | 0x9E => fp_str(op),
        0x1F => {
            let prefix = if opbits(op, 22, 2) == 0 { "s" } else { "d" };
            let mnem = match (opbit(op, 21), opbit(op, 15)) {
                (0, 0) => "fmadd",
                (0, 1) => "fmsub",
                (1, 0) => "fnmadd",
                _ => "fnmsub",
            };
            format!(
                "{mnem} {prefix}{rd}, {prefix}{rn}, {prefix}{rm}, {prefix}{}",
                opbits(op, 10, 5)
            )
        }
        0x0E | 0x2E | 0x4E | 0x6E | 0x0F | 0x2F | 0x4F | 0x6F | 0x5E | 0x7E | 0x5F | 0x7F => {
            vector_str(op)
        }
        _ => format!(".inst {op:#010x}"),
    }
}

fn dp_misc_str(op: u32, sf: bool) -> String {
    let rd = opbits(op, 0, 5);
    let rn = opbits(op, 5, 5);
    let rm = opbits(op, 16, 5);
    match opbits(op, 21, 3) {
        0b000 => {
            let mnem = match (opbit(op, 30), opbit(op, 29)) {
                (0, 0) => "adc",
                (0, 1) => "adcs",
                (1, 0) => "sbc",
                _ => "sbcs",
            };
            format!(
                "{mnem} {}, {}, {}",
                reg_name(rd, sf),
                reg_name(rn, sf),
                reg_name(rm, sf)
            )
        }
        0b010 => {
            let mnem = if opbit(op, 30) != 0 { "ccmp" } else { "ccmn" };
            let operand = if opbit(op, 11) != 0 {
                format!("#{rm}")
            } else {
                reg_name(rm, sf)
            };
            format!(
                "{mnem} {}, {operand}, #{:#x}, {}",
                reg_name(rn, sf),
                opbits(op, 0, 4),
                cond_name(opbits(op, 12, 4))
            )
        }
        0b100 => {
            let mnem = match (opbit(op, 30), opbits(op, 10, 2)) {
                (0, 0b00) => "csel",
                (0, 0b01) => "csinc",
                (1, 0b00) => "csinv",
                _ => "csneg",
            };
            format!(
                "{mnem} {}, {}, {}, {}",
                reg_name(rd, sf),
                reg_name(rn, sf),
                reg_name(rm, sf),
                cond_name(opbits(op, 12, 4))
            )
        }
        0b110 if opbit(op, 30) == 0 => {
            let mnem = match opbits(op, 10, 6) {
                0b000010 => "udiv",
                0b000011 => "sdiv",
                0b001000 => "lslv",
                0b001001 => "lsrv",
                0b001010 => "asrv",
                0b001011 => "rorv",
                _ => return format!(".inst {op:#010x}"),
            };
            format!(
                "{mnem} {}, {}, {}",
                reg_name(rd, sf),
                reg_name(rn, sf),
                reg_name(rm, sf)
            )
        }
        0b110 => {
            let mnem = match (opbits(op, 10, 6), sf) {
                (0b000000, _) => "rbit",
                (0b000001, _) => "rev16",
                (0b000010, false) => "rev",
                (0b000010, true) => "rev32",
                (0b000011, true) => "rev",
                (0b000100, _) => "clz",
                (0b000101, _) => "cls",
                _ => return format!(".inst {op:#010x}"),
            };
            format!("{mnem} {}, {}", reg_name(rd, sf), reg_name(rn, sf))
        }
        _ => format!(".inst {op:#010x}"),
    }
}

fn system_str(op: u32) -> String {
    let rt = opbits(op, 0, 5);
    let op0 = opbits(op, 19, 2);
    let crn = opbits(op, 12, 4);
    if op0 == 0 {
        return match crn {
            0b0010 => "nop".into(),
            0b0011 => match opbits(op, 5, 3) {
                0b010 => "clrex".into(),
                0b100 => "dsb".into(),
                0b101 => "dmb".into(),
                0b110 => "isb".into(),
                _ => "nop".into(),
            },
            _ => format!(".inst {op:#010x}"),
        };
    }
    if op0 == 1 {
        return format!("dc zva, x{rt}");
    }
    const fn pack(op0: u64, op1: u64, crn: u64, crm: u64, op2: u64) -> u64 {
        (op0 << 14) | (op1 << 11) | (crn << 7) | (crm << 3) | op2
    }
    let key = pack(
        op0,
        opbits(op, 16, 3),
        crn,
        opbits(op, 8, 4),
        opbits(op, 5, 3),
    );
    let name = if key == pack(3, 3, 13, 0, 2) {
        "tpidr_el0"
    } else if key == pack(3, 3, 14, 0, 0) {
        "cntfrq_el0"
    } else if key == pack(3, 3, 14, 0, 1) {
        "cntpct_el0"
    } else if key == pack(3, 3, 14, 0, 2) {
        "cntvct_el0"
    } else if key == pack(3, 3, 4, 4, 0) {
        "fpcr"
    } else if key == pack(3, 3, 4, 4, 1) {
        "fpsr"
    } else if key == pack(3, 3, 4, 2, 0) {
        "nzcv"
    } else if key == pack(3, 3, 0, 0, 1) {
        "ctr_el0"
    } else if key == pack(3, 3, 0, 0, 7) {
        "dczid_el0"
    } else if key == pack(3, 0, 0, 0, 0) {
        "midr_el1"
    } else if key == pack(3, 0, 0, 0, 5) {
        "mpidr_el1"
    } else {
        return format!(".inst {op:#010x}");
    };
    if opbit(op, 21) != 0 {
        format!("mrs x{rt}, {name}")
    } else {
        format!("msr {name}, x{rt}")
    }
}

fn exclusive_str(op: u32) -> String {
    let size = opbits(op, 30, 2);
    let sf = size == 3;
    let rt = reg_name(opbits(op, 0, 5), sf);
    let rs = reg_name(opbits(op, 16, 5), false);
    let rn = reg_or_sp_name(opbits(op, 5, 5), true);
    let suffix = ["b", "h", "", ""][size as usize];
    let (o2, l, o1, o0) = (opbit(op, 23), opbit(op, 22), opbit(op, 21), opbit(op, 15));
    if o2 == 1 && o1 == 1 {
        return format!("cas{suffix} {rs}, {rt}, [{rn}]");
    }
    match (o2, o1, l, o0) {
        (0, 0, 0, 0) => format!("stxr{suffix} {rs}, {rt}, [{rn}]"),
        (0, 0, 0, 1) => format!("stlxr{suffix} {rs}, {rt}, [{rn}]"),
        (0, 0, 1, 0) => format!("ldxr{suffix} {rt}, [{rn}]"),
        (0, 0, 1, 1) => format!("ldaxr{suffix} {rt}, [{rn}]"),
        (1, 0, 0, _) => format!("stlr{suffix} {rt}, [{rn}]"),
        (1, 0, 1, _) => format!("ldar{suffix} {rt}, [{rn}]"),
        (0, 1, 1, _) => format!("ldaxp {rt}, {}, [{rn}]", reg_name(opbits(op, 10, 5), sf)),
        (0, 1, 0, _) => format!(
            "stlxp {rs}, {rt}, {}, [{rn}]",
            reg_name(opbits(op, 10, 5), sf)
        ),
        _ => format!(".inst {op:#010x}"),
    }
}

fn pair_str(op: u32) -> String {
    let opc = opbits(op, 30, 2);
    let is_simd = opbit(op, 26) != 0;
    let l = opbit(op, 22) != 0;
    let rn = reg_or_sp_name(opbits(op, 5, 5), true);
    let (rt, rt2, scale) = if is_simd {
        let p = ["s", "d", "q", "?"][opc as usize];
        (
            format!("{p}{}", opbits(op, 0, 5)),
            format!("{p}{}", opbits(op, 10, 5)),
            2 + opc,
        )
    } else {
        let sf = opc != 0;
        (
            reg_name(opbits(op, 0, 5), sf),
            reg_name(opbits(op, 10, 5), sf),
            if opc == 0 { 2 } else { 3 },
        )
    };
    let offset = sign_extend(opbits(op, 15, 7), 7) << scale;
    let mnem = match (l, opc, is_simd) {
        (true, 0b01, false) => "ldpsw",
        (true, _, _) => "ldp",
        (false, _, _) => "stp",
    };
    match opbits(op, 23, 3) {
        0b001 => format!("{mnem} {rt}, {rt2}, [{rn}], #{offset}"),
        0b011 => format!("{mnem} {rt}, {rt2}, [{rn}, #{offset}]!"),
        _ if offset != 0 => format!("{mnem} {rt}, {rt2}, [{rn}, #{offset}]"),
        _ => format!("{mnem} {rt}, {rt2}, [{rn}]"),
    }
}

fn gpr_ldst_str(op: u32) -> String {
    let size = opbits(op, 30, 2);
    let opc = opbits(op, 22, 2);
    let rn = reg_or_sp_name(opbits(op, 5, 5), true);
    let unsigned_form = opbit(op, 24) != 0;

    let (mnem, sf) = match (opc, size) {
        (0b00, 0) => ("strb", false),
        (0b00, 1) => ("strh", false),
        (0b00, 2) => ("str", false),
        (0b00, _) => ("str", true),
        (0b01, 0) => ("ldrb", false),
        (0b01, 1) => ("ldrh", false),
        (0b01, 2) => ("ldr", false),
        (0b01, _) => ("ldr", true),
        (0b10, 0) => ("ldrsb", true),
        (0b10, 1) => ("ldrsh", true),
        (0b10, 2) => ("ldrsw", true),
        (0b10, _) => ("prfm", true),
        (_, 0) => ("ldrsb", false),
        (_, 1) => ("ldrsh", false),
        _ => return format!(".inst {op:#010x}"),
    };
    let rt = reg_name(opbits(op, 0, 5), sf);

    if unsigned_form {
        let offset = opbits(op, 10, 12) << size;
        if offset == 0 {
            return format!("{mnem} {rt}, [{rn}]");
        }
        return format!("{mnem} {rt}, [{rn}, #{offset:#x}]");
    }
    if opbit(op, 21) != 0 && opbits(op, 10, 2) == 0b10 {
        let rm = reg_name(opbits(op, 16, 5), opbit(op, 13) != 0);
        let ext = extend_name(opbits(op, 13, 3));
        let s = opbit(op, 12);
        if s != 0 {
            return format!("{mnem} {rt}, [{rn}, {rm}, {ext} #{size}]");
        }
        return format!("{mnem} {rt}, [{rn}, {rm}, {ext}]");
    }
    if opbit(op, 21) != 0 {
        // Atomic read-modify-write forms.
        let rs = reg_name(opbits(op, 16, 5), size == 3);
        let o3 = opbit(op, 15);
        let a_mnem = if o3 != 0 {
            "swp"
        } else {
            match opbits(op, 12, 3) {
                0b000 => "ldadd",
                0b001 => "ldclr",
                0b010 => "ldeor",
                0b011 => "ldset",
                0b100 => "ldsmax",
                0b101 => "ldsmin",
                0b110 => "ldumax",
                _ => "ldumin",
            }
        };
        return format!("{a_mnem} {rs}, {rt}, [{rn}]");
    }
    let imm9 = sign_extend(opbits(op, 12, 9), 9);
    match opbits(op, 10, 2) {
        0b00 => {
            let u_mnem = match mnem {
                "str" => "stur",
                "strb" => "sturb",
                "strh" => "sturh",
                "ldr" => "ldur",
                "ldrb" => "ldurb",
                "ldrh" => "ldurh",
                "ldrsb" => "ldursb",
                "ldrsh" => "ldursh",
                "ldrsw" => "ldursw",
                other => other,
            };
            format!("{u_mnem} {rt}, [{rn}, #{imm9}]")
        }
        0b01 => format!("{mnem} {rt}, [{rn}], #{imm9}"),
        0b11 => format!("{mnem} {rt}, [{rn}, #{imm9}]!"),
        _ => format!(".inst {op:#010x}"),
    }
}

fn simd_ldst_str(op: u32) -> String {
    let size = opbits(op, 30, 2);
    let opc = opbits(op, 22, 2);
    let rn = reg_or_sp_name(opbits(op, 5, 5), true);
    let scale = if opc & 0b10 != 0 { 4 } else { size };
    let prefix = ["b", "h", "s", "d", "q"][scale as usize];
    let rt = format!("{prefix}{}", opbits(op, 0, 5));
    let mnem = if opc & 1 != 0 { "ldr" } else { "str" };

    if opbit(op, 24) != 0 {
        let offset = opbits(op, 10, 12) << scale;
        if offset == 0 {
            return format!("{mnem} {rt}, [{rn}]");
        }
        return format!("{mnem} {rt}, [{rn}, #{offset:#x}]");
    }
    let imm9 = sign_extend(opbits(op, 12, 9), 9);
    match opbits(op, 10, 2) {
        0b00 => format!(
            "{} {rt}, [{rn}, #{imm9}]",
            if opc & 1 != 0 { "ldur" } else { "stur" }
        ),
        0b01 => format!("{mnem} {rt}, [{rn}], #{imm9}"),
        0b11 => format!("{mnem} {rt}, [{rn}, #{imm9}]!"),
        _ => format!("{mnem} {rt}, [{rn}, ...]"),
    }
}

fn struct_ldst_str(op: u32, multi: bool) -> String {
    let mnem = if opbit(op, 22) != 0 { "ld" } else { "st" };
    let rn = reg_or_sp_name(opbits(op, 5, 5), true);
    let rt = opbits(op, 0, 5);
    if multi {
        format!("{mnem}1.. {{v{rt}, ...}}, [{rn}]")
    } else {
        format!("{mnem}1.. {{v{rt}}}[lane], [{rn}]")
    }
}

fn fp_str(op: u32) -> String {
    let ftype = opbits(op, 22, 2);
    let p = ["s", "d", "?", "h"][ftype as usize];
    let rd = opbits(op, 0, 5);
    let rn = opbits(op, 5, 5);
    let rm = opbits(op, 16, 5);
    let sf = opbit(op, 31) != 0;

    if opbit(op, 21) == 1 && opbits(op, 10, 6) == 0 {
        let opcode = opbits(op, 16, 3);
        let rmode = opbits(op, 19, 2);
        let gp = |r: u64| reg_name(r, sf);
        return match (opcode, rmode) {
            (0b000, 0b11) => format!("fcvtzs {}, {p}{rn}", gp(rd)),
            (0b001, 0b11) => format!("fcvtzu {}, {p}{rn}", gp(rd)),
            (0b000, _) | (0b001, _) => format!("fcvt.. {}, {p}{rn}", gp(rd)),
            (0b010, _) => format!("scvtf {p}{rd}, {}", gp(rn)),
            (0b011, _) => format!("ucvtf {p}{rd}, {}", gp(rn)),
            (0b100, _) => format!("fcvtas {}, {p}{rn}", gp(rd)),
            (0b101, _) => format!("fcvtau {}, {p}{rn}", gp(rd)),
            (0b110, _) => format!("fmov {}, {p}{rn}", gp(rd)),
            _ => format!("fmov {p}{rd}, {}", gp(rn)),
        };
    }
    if opbit(op, 21) == 1 && opbits(op, 10, 5) == 0b10000 {
        let mnem = match opbits(op, 15, 6) {
            0b000000 => "fmov",
            0b000001 => "fabs",
            0b000010 => "fneg",
            0b000011 => "fsqrt",
            0b000100 => return format!("fcvt s{rd}, {p}{rn}"),
            0b000101 => return format!("fcvt d{rd}, {p}{rn}"),
            0b000111 => return format!("fcvt h{rd}, {p}{rn}"),
            0b001000 => "frintn",
            0b001001 => "frintp",
            0b001010 => "frintm",
            0b001011 => "frintz",
            0b001100 => "frinta",
            0b001110 => "frintx",
            0b001111 => "frinti",
            _ => return format!(".inst {op:#010x}"),
        };
        return format!("{mnem} {p}{rd}, {p}{rn}");
    }
    if opbit(op, 21) == 1 && opbits(op, 10, 4) == 0b1000 {
        return if opbit(op, 3) != 0 {
            format!("fcmp {p}{rn}, #0.0")
        } else {
            format!("fcmp {p}{rn}, {p}{rm}")
        };
    }
    if opbit(op, 21) == 1 && opbits(op, 10, 3) == 0b100 && opbits(op, 5, 5) == 0 {
        return format!("fmov {p}{rd}, #{:#x}", opbits(op, 13, 8));
    }
    if opbit(op, 21) == 1 {
        return match opbits(op, 10, 2) {
            0b01 => format!(
                "fccmp {p}{rn}, {p}{rm}, #{:#x}, {}",
                opbits(op, 0, 4),
                cond_name(opbits(op, 12, 4))
            ),
            0b10 => {
                let mnem = match opbits(op, 12, 4) {
                    0b0000 => "fmul",
                    0b0001 => "fdiv",
                    0b0010 => "fadd",
                    0b0011 => "fsub",
                    0b0100 => "fmax",
                    0b0101 => "fmin",
                    0b0110 => "fmaxnm",
                    0b0111 => "fminnm",
                    0b1000 => "fnmul",
                    _ => return format!(".inst {op:#010x}"),
                };
                format!("{mnem} {p}{rd}, {p}{rn}, {p}{rm}")
            }
            _ => format!(
                "fcsel {p}{rd}, {p}{rn}, {p}{rm}, {}",
                cond_name(opbits(op, 12, 4))
            ),
        };
    }
    format!(".inst {op:#010x}")
}

/// Vector-family rendering stays coarse: the executor families are named and
/// the registers shown; full arrangement decoding is not worth the surface.
fn vector_str(op: u32) -> String {
    let rd = opbits(op, 0, 5);
    let rn = opbits(op, 5, 5);
    let rm = opbits(op, 16, 5);
    let q = opbit(op, 30);
    let top = (op >> 24) as u8;
    match top {
        0x0E | 0x2E | 0x4E | 0x6E => {
            if opbit(op, 21) == 1 && opbit(op, 10) == 1 {
                format!("simd.3same v{rd}, v{rn}, v{rm} (q={q})")
            } else if opbit(op, 21) == 1 {
                format!("simd.misc v{rd}, v{rn} (q={q})")
            } else {
                format!("simd.perm v{rd}, v{rn}, v{rm} (q={q})")
            }
        }
        0x0F | 0x2F | 0x4F | 0x6F => {
            if opbit(op, 10) == 1 && opbits(op, 19, 4) == 0 {
                format!("movi v{rd}, #{:#x}", (opbits(op, 16, 3) << 5) | opbits(op, 5, 5))
            } else if opbit(op, 10) == 1 {
                format!("simd.shift v{rd}, v{rn} (q={q})")
            } else {
                format!("simd.elem v{rd}, v{rn}, v{rm}[..]")
            }
        }
        _ => format!("simd.scalar v{rd}, v{rn}, v{rm}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GuestMem;
    use crate::state::ControlWord;

    struct NullHost;
    impl Host for NullHost {
        fn invoke_svc(&mut self, _: &mut CpuState, _: &mut GuestMem<'_>, _: &ControlWord) {}
        fn hard_termination(&mut self, _: &CpuState, msg: &str, value: u64) -> ! {
            panic!("{msg} {value:#x}")
        }
    }

    struct SymHost;
    impl Host for SymHost {
        fn invoke_svc(&mut self, _: &mut CpuState, _: &mut GuestMem<'_>, _: &ControlWord) {}
        fn symbol_lookup(&self, addr: u64) -> Option<(String, u64)> {
            Some(("main".into(), addr - 0x1000))
        }
        fn hard_termination(&mut self, _: &CpuState, msg: &str, value: u64) -> ! {
            panic!("{msg} {value:#x}")
        }
    }

    fn dis(op: u32) -> String {
        let state = CpuState::new(0x1000, 0x1000, 0x8000);
        disassemble(&state, op, &NullHost)
    }

    #[test]
    fn test_alu_rendering() {
        assert_eq!(dis(0x91000441), "add x1, x2, #0x1");
        assert_eq!(dis(0xD2800540), "movz x0, #0x2a");
        assert_eq!(dis(0xF1000400), "subs x0, x0, #0x1");
        assert_eq!(dis(0x8B010002), "add x2, x0, x1");
        assert_eq!(dis(0x9AC10802), "udiv x2, x0, x1");
        assert_eq!(dis(0xDAC00C01), "rev x1, x0");
    }

    #[test]
    fn test_branch_rendering_with_symbols() {
        let state = CpuState::new(0x1000, 0x1000, 0x8000);
        // BL +12 from 0x1000
        let s = disassemble(&state, 0x94000003, &SymHost);
        assert_eq!(s, "bl 0x100c <main+0xc>");
        let s = disassemble(&state, 0x54000060, &SymHost); // B.EQ +12
        assert_eq!(s, "b.eq 0x100c <main+0xc>");
    }

    #[test]
    fn test_memory_rendering() {
        assert_eq!(dis(0xF94003E1), "ldr x1, [sp]");
        assert_eq!(dis(0xB90007E0), "str w0, [sp, #0x4]");
        assert_eq!(dis(0xF81F0FE0), "str x0, [sp, #-16]!");
        assert_eq!(dis(0xF84107E1), "ldr x1, [sp], #16");
        assert_eq!(dis(0xA9BF07E0), "stp x0, x1, [sp, #-16]!");
        assert_eq!(dis(0xC85F7FE1), "ldxr x1, [sp]");
        assert_eq!(dis(0x3DC003E0), "ldr q0, [sp]");
    }

    #[test]
    fn test_system_rendering() {
        assert_eq!(dis(0xD503201F), "nop");
        assert_eq!(dis(0xD53BD040), "mrs x0, tpidr_el0");
        assert_eq!(dis(0xD51BD040), "msr tpidr_el0, x0");
        assert_eq!(dis(0xD50B7420), "dc zva, x0");
        assert_eq!(dis(0xD4000001), "svc #0x0");
        assert_eq!(dis(0xD65F03C0), "ret");
    }

    #[test]
    fn test_fp_rendering() {
        assert_eq!(dis(0x1E610802), "fmul d2, d0, d1");
        assert_eq!(dis(0x1E632040), "fcmp d2, d3");
        assert_eq!(dis(0x1F410803), "fmadd d3, d0, d1, d2");
        assert_eq!(dis(0x9E620020), "scvtf d0, x1");
    }

    #[test]
    fn test_unknown_renders_inst() {
        assert_eq!(dis(0x00000000), ".inst 0x00000000");
    }

    #[test]
    fn test_render_flags() {
        let mut state = CpuState::new(0, 0, 0);
        state.set_z(true);
        state.set_c(true);
        assert_eq!(render_flags(&state), "[nZCv]");
    }
}
