// SPDX-FileCopyrightText: 2026 armlet contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The contract between the emulator core and its host.
//!
//! The host supplies the ELF image, the stack layout, and these three hooks.
//! Everything else (loader, CLI, syscall translation, heap management) lives
//! on the host side and never enters the core.

use armlet_common::VAddr;

use crate::memory::GuestMem;
use crate::state::{ControlWord, CpuState};

pub trait Host {
    /// Called when the guest executes `SVC`.
    ///
    /// The syscall number is in `x[8]` and arguments in `x[0..6]`; the hook
    /// writes the return value to `x[0]`. The hook may block, may mutate
    /// guest memory freely (the core is quiesced), and may set
    /// [`Control::END_EMULATION`](crate::state::Control) on process exit.
    /// Execution resumes at PC+4.
    fn invoke_svc(&mut self, state: &mut CpuState, mem: &mut GuestMem<'_>, control: &ControlWord);

    /// Best-guess symbol name and offset for an address. Used only by the
    /// trace renderer.
    fn symbol_lookup(&self, addr: VAddr) -> Option<(String, u64)> {
        let _ = addr;
        None
    }

    /// Called on unrecoverable decode or memory errors. Must not return.
    fn hard_termination(&mut self, state: &CpuState, msg: &str, value: u64) -> !;
}
