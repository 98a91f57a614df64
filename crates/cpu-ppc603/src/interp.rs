//! Fetch/decode/execute loop and per-opcode semantics.
//!
//! The interpreter holds the only live mutable borrow of memory for its
//! lifetime (see `memory.rs`). Termination is cooperative: a hook returns
//! [`StepOutcome::Halt`] rather than the source's `terminate_emulation`
//! exception, so the loop below is a plain `while` with no unwinding.

use crate::bitfield::*;
use crate::disasm::disassemble_one;
use crate::error::ExecError;
use crate::memory::MemoryContext;
use crate::opcode::{decode, Op};
use crate::registers::{CrBit, RegisterFile};

/// Whether the interpreter loop should keep stepping after a hook or a
/// syscall runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Halt,
}

/// Called before each fetch. Replaces the source's direct-call debug
/// interface; a plain closure satisfies this via the blanket impl below.
pub trait DebugHook {
    fn on_fetch(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome;
}

impl<F: FnMut(&mut Interpreter<'_>) -> StepOutcome> DebugHook for F {
    fn on_fetch(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome {
        self(interp)
    }
}

/// Called when `sc` executes.
pub trait SyscallHandler {
    fn on_syscall(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome;
}

impl<F: FnMut(&mut Interpreter<'_>) -> StepOutcome> SyscallHandler for F {
    fn on_syscall(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome {
        self(interp)
    }
}

/// Called at the top of each cycle, before the debug hook.
pub trait InterruptManager {
    fn on_cycle_start(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome;
}

impl<F: FnMut(&mut Interpreter<'_>) -> StepOutcome> InterruptManager for F {
    fn on_cycle_start(&mut self, interp: &mut Interpreter<'_>) -> StepOutcome {
        self(interp)
    }
}

/// A PowerPC 603/750 user-mode interpreter over a borrowed [`MemoryContext`].
pub struct Interpreter<'m> {
    pub regs: RegisterFile,
    pub memory: &'m mut MemoryContext,
}

impl<'m> Interpreter<'m> {
    pub fn new(memory: &'m mut MemoryContext) -> Self {
        Self {
            regs: RegisterFile::new(),
            memory,
        }
    }

    pub fn with_entry_point(memory: &'m mut MemoryContext, entry: u32) -> Self {
        let mut interp = Self::new(memory);
        interp.regs.set_pc(entry);
        interp
    }

    /// Runs until a hook raises the termination sentinel or an error is
    /// hit. Notifies `interrupt_manager` then `debug_hook` at the top of
    /// each cycle, fetches/decodes/executes one instruction, then advances
    /// PC/TBR/instruction count.
    pub fn execute(
        &mut self,
        mut debug_hook: Option<&mut dyn DebugHook>,
        mut syscall_handler: Option<&mut dyn SyscallHandler>,
        mut interrupt_manager: Option<&mut dyn InterruptManager>,
    ) -> Result<(), ExecError> {
        loop {
            if let Some(mgr) = interrupt_manager.as_deref_mut() {
                if mgr.on_cycle_start(self) == StepOutcome::Halt {
                    return Ok(());
                }
            }
            if let Some(hook) = debug_hook.as_deref_mut() {
                if hook.on_fetch(self) == StepOutcome::Halt {
                    return Ok(());
                }
            }
            if self.step(syscall_handler.as_deref_mut())? == StepOutcome::Halt {
                return Ok(());
            }
        }
    }

    /// Fetches, decodes, and executes exactly one instruction, then
    /// advances PC by 4 (unless the handler redirected it to `target - 4`),
    /// advances TBR, and bumps the retired-instruction count.
    pub fn step(
        &mut self,
        syscall_handler: Option<&mut dyn SyscallHandler>,
    ) -> Result<StepOutcome, ExecError> {
        let pc = self.regs.pc();
        let word = self.memory.fetch_instruction(pc).map_err(ExecError::from)?;
        let op = decode(word);

        let outcome = self.execute_one(op, pc, word, syscall_handler)?;

        self.regs.set_pc(self.regs.pc().wrapping_add(4));
        self.regs.advance_tbr();
        self.regs.instructions_executed += 1;
        Ok(outcome)
    }

    fn fault_disassembly(&self, pc: u32, word: u32) -> String {
        disassemble_one(word, pc)
    }

    fn unimplemented(&self, pc: u32, word: u32) -> ExecError {
        ExecError::Unimplemented {
            pc,
            word,
            mnemonic_text: self.fault_disassembly(pc, word),
        }
    }

    fn invalid(&self, pc: u32, word: u32) -> ExecError {
        let _ = self.fault_disassembly(pc, word);
        ExecError::Invalid { pc, word }
    }

    fn base(&self, reg: u8) -> u32 {
        if reg == 0 {
            0
        } else {
            self.regs.gpr(reg)
        }
    }

    #[allow(clippy::too_many_lines)]
    fn execute_one(
        &mut self,
        op: Op,
        pc: u32,
        word: u32,
        syscall_handler: Option<&mut dyn SyscallHandler>,
    ) -> Result<StepOutcome, ExecError> {
        match op {
            Op::Invalid => return Err(self.invalid(pc, word)),

            // --- Integer arithmetic ---
            Op::Add => self.alu_add(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word))),
            Op::Addc => self.alu_add(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word))),
            Op::Adde => {
                let ca = self.regs.xer_ca();
                self.alu_add_carry_in(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word)), ca);
            }
            Op::Addze => {
                let ca = self.regs.xer_ca();
                self.alu_add_carry_in(word, self.regs.gpr(get_reg2(word)), 0, ca);
            }
            Op::Addme => {
                let ca = self.regs.xer_ca();
                self.alu_add_carry_in(word, self.regs.gpr(get_reg2(word)), 0xFFFF_FFFF, ca);
            }
            Op::Subf => self.alu_subf(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word))),
            Op::Subfc => self.alu_subf(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word))),
            Op::Subfe => {
                let ca = self.regs.xer_ca();
                self.alu_subf_carry_in(word, self.regs.gpr(get_reg2(word)), self.regs.gpr(get_reg3(word)), ca);
            }
            Op::Subfze => {
                let ca = self.regs.xer_ca();
                self.alu_subf_carry_in(word, self.regs.gpr(get_reg2(word)), 0, ca);
            }
            Op::Subfme => {
                let ca = self.regs.xer_ca();
                self.alu_subf_carry_in(word, self.regs.gpr(get_reg2(word)), 0xFFFF_FFFF, ca);
            }
            Op::Subfic => {
                let ra = self.regs.gpr(get_reg2(word));
                let imm = get_imm_ext(word) as u32;
                let (result, carry, _overflow) = add_with_carry(!ra, imm, true);
                self.regs.set_gpr(get_reg1(word), result);
                self.regs.set_xer_ca(carry);
            }
            Op::Addi => {
                let ra = self.base(get_reg2(word));
                let imm = get_imm_ext(word) as u32;
                self.regs.set_gpr(get_reg1(word), ra.wrapping_add(imm));
            }
            Op::Addis => {
                let ra = self.base(get_reg2(word));
                let imm = (get_imm_ext(word) as u32) << 16;
                self.regs.set_gpr(get_reg1(word), ra.wrapping_add(imm));
            }
            Op::Addic => {
                let ra = self.regs.gpr(get_reg2(word));
                let imm = get_imm_ext(word) as u32;
                let (result, carry, _overflow) = add_with_carry(ra, imm, false);
                self.regs.set_gpr(get_reg1(word), result);
                self.regs.set_xer_ca(carry);
            }
            Op::AddicRec => {
                let ra = self.regs.gpr(get_reg2(word));
                let imm = get_imm_ext(word) as u32;
                let (result, carry, _overflow) = add_with_carry(ra, imm, false);
                self.regs.set_gpr(get_reg1(word), result);
                self.regs.set_xer_ca(carry);
                self.regs.set_crf_int_result(0, result as i32);
            }
            Op::Neg => {
                let ra = self.regs.gpr(get_reg2(word)) as i32;
                let (result, overflow) = ra.overflowing_neg();
                self.regs.set_gpr(get_reg1(word), result as u32);
                self.apply_oe_rec(word, result, overflow);
            }
            Op::Mulli => {
                let ra = self.regs.gpr_signed(get_reg2(word)) as i64;
                let imm = get_imm_ext(word) as i64;
                self.regs.set_gpr(get_reg1(word), (ra * imm) as u32);
            }
            Op::Mullw => {
                let ra = self.regs.gpr_signed(get_reg2(word)) as i64;
                let rb = self.regs.gpr_signed(get_reg3(word)) as i64;
                let product = ra * rb;
                let result = product as i32;
                let overflow = product != result as i64;
                self.regs.set_gpr(get_reg1(word), result as u32);
                self.apply_oe_rec(word, result, overflow);
            }
            Op::Mulhw => {
                let ra = self.regs.gpr_signed(get_reg2(word)) as i64;
                let rb = self.regs.gpr_signed(get_reg3(word)) as i64;
                let product = ra * rb;
                let result = (product >> 32) as u32;
                self.regs.set_gpr(get_reg1(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Mulhwu => {
                let ra = self.regs.gpr(get_reg2(word)) as u64;
                let rb = self.regs.gpr(get_reg3(word)) as u64;
                let product = ra * rb;
                let result = (product >> 32) as u32;
                self.regs.set_gpr(get_reg1(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Divw => {
                let ra = self.regs.gpr_signed(get_reg2(word));
                let rb = self.regs.gpr_signed(get_reg3(word));
                let (result, overflow) = if rb == 0 || (ra == i32::MIN && rb == -1) {
                    (0, true)
                } else {
                    (ra / rb, false)
                };
                self.regs.set_gpr(get_reg1(word), result as u32);
                self.apply_oe_rec(word, result, overflow);
            }
            Op::Divwu => {
                let ra = self.regs.gpr(get_reg2(word));
                let rb = self.regs.gpr(get_reg3(word));
                let (result, overflow) = if rb == 0 { (0, true) } else { (ra / rb, false) };
                self.regs.set_gpr(get_reg1(word), result);
                self.apply_oe_rec(word, result as i32, overflow);
            }

            // --- Logical ---
            Op::And => self.logical(word, |a, b| a & b),
            Op::Andc => self.logical(word, |a, b| a & !b),
            Op::Or => self.logical(word, |a, b| a | b),
            Op::Orc => self.logical(word, |a, b| a | !b),
            Op::Xor => self.logical(word, |a, b| a ^ b),
            Op::Nand => self.logical(word, |a, b| !(a & b)),
            Op::Nor => self.logical(word, |a, b| !(a | b)),
            Op::Eqv => self.logical(word, |a, b| !(a ^ b)),
            Op::Andi => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = get_imm(word) as u32;
                let result = rs & imm;
                self.regs.set_gpr(get_reg2(word), result);
                self.regs.set_crf_int_result(0, result as i32);
            }
            Op::Andis => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = (get_imm(word) as u32) << 16;
                let result = rs & imm;
                self.regs.set_gpr(get_reg2(word), result);
                self.regs.set_crf_int_result(0, result as i32);
            }
            Op::Ori => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = get_imm(word) as u32;
                self.regs.set_gpr(get_reg2(word), rs | imm);
            }
            Op::Oris => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = (get_imm(word) as u32) << 16;
                self.regs.set_gpr(get_reg2(word), rs | imm);
            }
            Op::Xori => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = get_imm(word) as u32;
                self.regs.set_gpr(get_reg2(word), rs ^ imm);
            }
            Op::Xoris => {
                let rs = self.regs.gpr(get_reg1(word));
                let imm = (get_imm(word) as u32) << 16;
                self.regs.set_gpr(get_reg2(word), rs ^ imm);
            }
            Op::Cntlzw => {
                let rs = self.regs.gpr(get_reg1(word));
                let result = rs.leading_zeros();
                self.regs.set_gpr(get_reg2(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Extsb => {
                let rs = self.regs.gpr(get_reg1(word)) as u8 as i8 as i32;
                self.regs.set_gpr(get_reg2(word), rs as u32);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, rs);
                }
            }
            Op::Extsh => {
                let rs = self.regs.gpr(get_reg1(word)) as u16 as i16 as i32;
                self.regs.set_gpr(get_reg2(word), rs as u32);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, rs);
                }
            }
            Op::Rlwimi => {
                let rs = self.regs.gpr(get_reg1(word));
                let sh = get_reg3(word);
                let mb = get_reg4(word);
                let me = get_reg5(word);
                let mask = rotate_mask(mb, me);
                let rotated = rs.rotate_left(sh as u32);
                let ra = get_reg2(word);
                let existing = self.regs.gpr(ra);
                let result = (rotated & mask) | (existing & !mask);
                self.regs.set_gpr(ra, result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Rlwinm => {
                let rs = self.regs.gpr(get_reg1(word));
                let sh = get_reg3(word);
                let mb = get_reg4(word);
                let me = get_reg5(word);
                let mask = rotate_mask(mb, me);
                let result = rs.rotate_left(sh as u32) & mask;
                self.regs.set_gpr(get_reg2(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Rlwnm => {
                let rs = self.regs.gpr(get_reg1(word));
                let sh = self.regs.gpr(get_reg3(word)) & 0x1F;
                let mb = get_reg4(word);
                let me = get_reg5(word);
                let mask = rotate_mask(mb, me);
                let result = rs.rotate_left(sh) & mask;
                self.regs.set_gpr(get_reg2(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Slw => {
                let rs = self.regs.gpr(get_reg1(word));
                let sh = self.regs.gpr(get_reg3(word)) & 0x3F;
                let result = if sh >= 32 { 0 } else { rs << sh };
                self.regs.set_gpr(get_reg2(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Srw => {
                let rs = self.regs.gpr(get_reg1(word));
                let sh = self.regs.gpr(get_reg3(word)) & 0x3F;
                let result = if sh >= 32 { 0 } else { rs >> sh };
                self.regs.set_gpr(get_reg2(word), result);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result as i32);
                }
            }
            Op::Sraw => {
                let rs = self.regs.gpr_signed(get_reg1(word));
                let sh = self.regs.gpr(get_reg3(word)) & 0x3F;
                let (result, carry) = arithmetic_shift_right(rs, sh);
                self.regs.set_gpr(get_reg2(word), result as u32);
                self.regs.set_xer_ca(carry);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result);
                }
            }
            Op::Srawi => {
                let rs = self.regs.gpr_signed(get_reg1(word));
                let sh = get_reg3(word) as u32;
                let (result, carry) = arithmetic_shift_right(rs, sh);
                self.regs.set_gpr(get_reg2(word), result as u32);
                self.regs.set_xer_ca(carry);
                if get_rec(word) {
                    self.regs.set_crf_int_result(0, result);
                }
            }
            Op::Cmp => {
                let bf = get_reg1(word) >> 2;
                let ra = self.regs.gpr_signed(get_reg2(word));
                let rb = self.regs.gpr_signed(get_reg3(word));
                self.regs.set_crf_compare_result(bf, ra < rb, ra > rb);
            }
            Op::Cmpl => {
                let bf = get_reg1(word) >> 2;
                let ra = self.regs.gpr(get_reg2(word));
                let rb = self.regs.gpr(get_reg3(word));
                self.regs.set_crf_compare_result(bf, ra < rb, ra > rb);
            }
            Op::Cmpi => {
                let bf = get_reg1(word) >> 2;
                let ra = self.regs.gpr_signed(get_reg2(word));
                let imm = get_imm_ext(word);
                self.regs.set_crf_compare_result(bf, ra < imm, ra > imm);
            }
            Op::Cmpli => {
                let bf = get_reg1(word) >> 2;
                let ra = self.regs.gpr(get_reg2(word));
                let imm = get_imm(word) as u32;
                self.regs.set_crf_compare_result(bf, ra < imm, ra > imm);
            }
            // Trap delivery is not modelled (no supervisor exception path);
            // the condition is decoded correctly but never fires.
            Op::Tw | Op::Twi => {}

            // --- CR logical ---
            Op::Mcrf => {
                let bf = get_reg1(word) >> 2;
                let bfa = get_reg2(word) >> 2;
                let value = self.regs.cr_field(bfa);
                self.regs.set_cr_field(bf, value);
            }
            Op::Crand => self.cr_logical(word, |a, b| a & b),
            Op::Cror => self.cr_logical(word, |a, b| a | b),
            Op::Crxor => self.cr_logical(word, |a, b| a ^ b),
            Op::Crnand => self.cr_logical(word, |a, b| !(a & b)),
            Op::Crnor => self.cr_logical(word, |a, b| !(a | b)),
            Op::Crandc => self.cr_logical(word, |a, b| a & !b),
            Op::Crorc => self.cr_logical(word, |a, b| a | !b),
            Op::Creqv => self.cr_logical(word, |a, b| !(a ^ b)),

            // --- Branches ---
            Op::B => {
                let target_field = get_b_target(word);
                let abs = get_b_abs(word);
                let target = if abs { target_field as u32 } else { pc.wrapping_add(target_field as u32) };
                if get_b_link(word) {
                    self.regs.set_lr(pc.wrapping_add(4));
                }
                self.regs.set_pc(target.wrapping_sub(4));
            }
            Op::Bc => {
                let bo = get_bo(word);
                let bi = get_bi(word);
                let should_branch = self.evaluate_bo(bo, bi);
                if should_branch {
                    let disp = get_imm_ext(word) & !0x3;
                    let abs = get_b_abs(word);
                    let target = if abs { disp as u32 } else { pc.wrapping_add(disp as u32) };
                    if get_b_link(word) {
                        self.regs.set_lr(pc.wrapping_add(4));
                    }
                    self.regs.set_pc(target.wrapping_sub(4));
                }
            }
            Op::Bclr => {
                let bo = get_bo(word);
                let bi = get_bi(word);
                let should_branch = self.evaluate_bo(bo, bi);
                if should_branch {
                    let target = self.regs.lr() & !0x3;
                    if get_b_link(word) {
                        self.regs.set_lr(pc.wrapping_add(4));
                    }
                    self.regs.set_pc(target.wrapping_sub(4));
                }
            }
            Op::Bcctr => {
                let bo = get_bo(word);
                let bi = get_bi(word);
                // bcctr never decrements CTR (can't branch on its own target register).
                let should_branch = self.evaluate_bo_no_ctr(bo, bi);
                if should_branch {
                    let target = self.regs.ctr() & !0x3;
                    if get_b_link(word) {
                        self.regs.set_lr(pc.wrapping_add(4));
                    }
                    self.regs.set_pc(target.wrapping_sub(4));
                }
            }

            // --- Memory ---
            Op::Lbz => self.load(word, |m, a| m.read_u8(a).map(u32::from))?,
            Op::Lbzu => self.load_update(word, |m, a| m.read_u8(a).map(u32::from))?,
            Op::Lbzx => self.load_indexed(word, |m, a| m.read_u8(a).map(u32::from))?,
            Op::Lbzux => self.load_indexed_update(word, |m, a| m.read_u8(a).map(u32::from))?,
            Op::Lhz => self.load(word, |m, a| m.read_u16(a).map(u32::from))?,
            Op::Lhzu => self.load_update(word, |m, a| m.read_u16(a).map(u32::from))?,
            Op::Lhzx => self.load_indexed(word, |m, a| m.read_u16(a).map(u32::from))?,
            Op::Lhzux => self.load_indexed_update(word, |m, a| m.read_u16(a).map(u32::from))?,
            Op::Lha => self.load(word, |m, a| m.read_u16(a).map(|v| v as i16 as i32 as u32))?,
            Op::Lhau => self.load_update(word, |m, a| m.read_u16(a).map(|v| v as i16 as i32 as u32))?,
            Op::Lhax => self.load_indexed(word, |m, a| m.read_u16(a).map(|v| v as i16 as i32 as u32))?,
            Op::Lhaux => self.load_indexed_update(word, |m, a| m.read_u16(a).map(|v| v as i16 as i32 as u32))?,
            Op::Lwz => self.load(word, MemoryContext::read_u32)?,
            Op::Lwzu => self.load_update(word, MemoryContext::read_u32)?,
            Op::Lwzx => self.load_indexed(word, MemoryContext::read_u32)?,
            Op::Lwzux => self.load_indexed_update(word, MemoryContext::read_u32)?,
            Op::Stb => self.store(word, |m, a, v| m.write_u8(a, v as u8))?,
            Op::Stbu => self.store_update(word, |m, a, v| m.write_u8(a, v as u8))?,
            Op::Stbx => self.store_indexed(word, |m, a, v| m.write_u8(a, v as u8))?,
            Op::Stbux => self.store_indexed_update(word, |m, a, v| m.write_u8(a, v as u8))?,
            Op::Sth => self.store(word, |m, a, v| m.write_u16(a, v as u16))?,
            Op::Sthu => self.store_update(word, |m, a, v| m.write_u16(a, v as u16))?,
            Op::Sthx => self.store_indexed(word, |m, a, v| m.write_u16(a, v as u16))?,
            Op::Sthux => self.store_indexed_update(word, |m, a, v| m.write_u16(a, v as u16))?,
            Op::Stw => self.store(word, MemoryContext::write_u32)?,
            Op::Stwu => self.store_update(word, MemoryContext::write_u32)?,
            Op::Stwx => self.store_indexed(word, MemoryContext::write_u32)?,
            Op::Stwux => self.store_indexed_update(word, MemoryContext::write_u32)?,
            Op::Lmw => {
                let mut ea = self.base(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
                let start = get_reg1(word);
                for r in start..=31 {
                    let value = self.memory.read_u32(ea).map_err(ExecError::from)?;
                    self.regs.set_gpr(r, value);
                    ea = ea.wrapping_add(4);
                }
                self.regs.last_effective_address = ea;
            }
            Op::Stmw => {
                let mut ea = self.base(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
                let start = get_reg1(word);
                for r in start..=31 {
                    let value = self.regs.gpr(r);
                    self.memory.write_u32(ea, value).map_err(ExecError::from)?;
                    ea = ea.wrapping_add(4);
                }
                self.regs.last_effective_address = ea;
            }

            // --- System / sync / cache (no-ops; caches/TLB aren't modelled) ---
            Op::Sync | Op::Isync | Op::Eieio | Op::Tlbsync | Op::Dcbst | Op::Dcbf | Op::Dcbt
            | Op::Dcbtst | Op::Icbi | Op::Dcbi | Op::Dcba | Op::Dcbz | Op::Tlbia | Op::Tlbie => {}

            Op::Sc => {
                if let Some(handler) = syscall_handler {
                    return Ok(handler.on_syscall(self));
                }
                return Err(self.unimplemented(pc, word));
            }
            Op::Mfspr => {
                let spr = get_spr(word);
                let value = self.read_spr(spr);
                self.regs.set_gpr(get_reg1(word), value);
            }
            Op::Mtspr => {
                let spr = get_spr(word);
                let value = self.regs.gpr(get_reg1(word));
                self.write_spr(spr, value);
            }
            Op::Mftb => {
                let tbr = get_spr(word);
                let value = if tbr == 269 {
                    (self.regs.tbr() >> 32) as u32
                } else {
                    self.regs.tbr() as u32
                };
                self.regs.set_gpr(get_reg1(word), value);
            }

            _ => return Err(self.unimplemented(pc, word)),
        }
        Ok(StepOutcome::Continue)
    }

    fn read_spr(&self, spr: u16) -> u32 {
        match spr {
            1 => self.regs.xer(),
            8 => self.regs.lr(),
            9 => self.regs.ctr(),
            _ => 0,
        }
    }

    fn write_spr(&mut self, spr: u16, value: u32) {
        match spr {
            1 => self.regs.set_xer(value),
            8 => self.regs.set_lr(value),
            9 => self.regs.set_ctr(value),
            _ => {}
        }
    }

    /// `BO` bit 4 = skip condition check, bit 3 = wanted value, bit 2 = skip
    /// CTR, bit 1 = branch-if-CTR-zero. CTR is decremented *before* the
    /// zero test when it isn't skipped.
    fn evaluate_bo(&mut self, bo: u8, bi: u8) -> bool {
        let ctr_ok = if bo & 0b0_0100 != 0 {
            true
        } else {
            let is_zero = self.regs.decrement_ctr();
            if bo & 0b0_0010 != 0 {
                is_zero
            } else {
                !is_zero
            }
        };
        let cond_ok = (bo & 0b1_0000 != 0) || (self.cr_bit_get(bi) == (bo & 0b0_1000 != 0));
        ctr_ok && cond_ok
    }

    /// `bcctr` never touches CTR (it's the branch target), so it only
    /// evaluates the condition-register half of `BO`.
    fn evaluate_bo_no_ctr(&self, bo: u8, bi: u8) -> bool {
        (bo & 0b1_0000 != 0) || (self.cr_bit_get(bi) == (bo & 0b0_1000 != 0))
    }

    fn cr_bit_get(&self, crb: u8) -> bool {
        let field = crb / 4;
        let bit = offset_to_bit(crb % 4);
        self.regs.cr_bit(field, bit)
    }

    fn cr_bit_set(&mut self, crb: u8, value: bool) {
        let field = crb / 4;
        let bit = offset_to_bit(crb % 4);
        self.regs.set_cr_bit(field, bit, value);
    }

    fn cr_logical(&mut self, word: u32, f: impl Fn(bool, bool) -> bool) {
        let bt = get_reg1(word);
        let ba = get_reg2(word);
        let bb = get_reg3(word);
        let result = f(self.cr_bit_get(ba), self.cr_bit_get(bb));
        self.cr_bit_set(bt, result);
    }

    fn logical(&mut self, word: u32, f: impl Fn(u32, u32) -> u32) {
        let rs = self.regs.gpr(get_reg1(word));
        let rb = self.regs.gpr(get_reg3(word));
        let result = f(rs, rb);
        self.regs.set_gpr(get_reg2(word), result);
        if get_rec(word) {
            self.regs.set_crf_int_result(0, result as i32);
        }
    }

    fn alu_add(&mut self, word: u32, ra: u32, rb: u32) {
        let (result, carry, overflow) = add_with_carry(ra, rb, false);
        self.regs.set_gpr(get_reg1(word), result);
        self.regs.set_xer_ca(carry);
        self.apply_oe_rec(word, result as i32, overflow);
    }

    fn alu_add_carry_in(&mut self, word: u32, ra: u32, rb: u32, carry_in: bool) {
        let (result, carry, overflow) = add_with_carry(ra, rb, carry_in);
        self.regs.set_gpr(get_reg1(word), result);
        self.regs.set_xer_ca(carry);
        self.apply_oe_rec(word, result as i32, overflow);
    }

    fn alu_subf(&mut self, word: u32, ra: u32, rb: u32) {
        let (result, carry, overflow) = add_with_carry(!ra, rb, true);
        self.regs.set_gpr(get_reg1(word), result);
        self.regs.set_xer_ca(carry);
        self.apply_oe_rec(word, result as i32, overflow);
    }

    fn alu_subf_carry_in(&mut self, word: u32, ra: u32, rb: u32, carry_in: bool) {
        let (result, carry, overflow) = add_with_carry(!ra, rb, carry_in);
        self.regs.set_gpr(get_reg1(word), result);
        self.regs.set_xer_ca(carry);
        self.apply_oe_rec(word, result as i32, overflow);
    }

    /// Applies the `o` (overflow-enable) and `rec` (CR0) suffix semantics
    /// shared by every ALU form in `primary 0x1F`.
    fn apply_oe_rec(&mut self, word: u32, result: i32, overflow: bool) {
        if get_o(word) {
            self.regs.set_xer_ov(overflow);
        }
        if get_rec(word) {
            self.regs.set_crf_int_result(0, result);
        }
    }

    fn load(
        &mut self,
        word: u32,
        read: impl Fn(&MemoryContext, u32) -> Result<u32, crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.base(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
        self.do_load(word, ea, read)
    }

    fn load_update(
        &mut self,
        word: u32,
        read: impl Fn(&MemoryContext, u32) -> Result<u32, crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.regs.gpr(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
        self.do_load(word, ea, read)?;
        self.regs.set_gpr(get_reg2(word), ea);
        Ok(())
    }

    fn load_indexed(
        &mut self,
        word: u32,
        read: impl Fn(&MemoryContext, u32) -> Result<u32, crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.base(get_reg2(word)).wrapping_add(self.regs.gpr(get_reg3(word)));
        self.do_load(word, ea, read)
    }

    fn load_indexed_update(
        &mut self,
        word: u32,
        read: impl Fn(&MemoryContext, u32) -> Result<u32, crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.regs.gpr(get_reg2(word)).wrapping_add(self.regs.gpr(get_reg3(word)));
        self.do_load(word, ea, read)?;
        self.regs.set_gpr(get_reg2(word), ea);
        Ok(())
    }

    fn do_load(
        &mut self,
        word: u32,
        ea: u32,
        read: impl Fn(&MemoryContext, u32) -> Result<u32, crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        self.regs.last_effective_address = ea;
        let value = read(self.memory, ea)?;
        self.regs.set_gpr(get_reg1(word), value);
        Ok(())
    }

    fn store(
        &mut self,
        word: u32,
        write: impl Fn(&mut MemoryContext, u32, u32) -> Result<(), crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.base(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
        self.do_store(word, ea, write)
    }

    fn store_update(
        &mut self,
        word: u32,
        write: impl Fn(&mut MemoryContext, u32, u32) -> Result<(), crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.regs.gpr(get_reg2(word)).wrapping_add(get_imm_ext(word) as u32);
        self.do_store(word, ea, write)?;
        self.regs.set_gpr(get_reg2(word), ea);
        Ok(())
    }

    fn store_indexed(
        &mut self,
        word: u32,
        write: impl Fn(&mut MemoryContext, u32, u32) -> Result<(), crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.base(get_reg2(word)).wrapping_add(self.regs.gpr(get_reg3(word)));
        self.do_store(word, ea, write)
    }

    fn store_indexed_update(
        &mut self,
        word: u32,
        write: impl Fn(&mut MemoryContext, u32, u32) -> Result<(), crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        let ea = self.regs.gpr(get_reg2(word)).wrapping_add(self.regs.gpr(get_reg3(word)));
        self.do_store(word, ea, write)?;
        self.regs.set_gpr(get_reg2(word), ea);
        Ok(())
    }

    fn do_store(
        &mut self,
        word: u32,
        ea: u32,
        write: impl Fn(&mut MemoryContext, u32, u32) -> Result<(), crate::error::MemoryFault>,
    ) -> Result<(), ExecError> {
        self.regs.last_effective_address = ea;
        let value = self.regs.gpr(get_reg1(word));
        write(self.memory, ea, value)?;
        Ok(())
    }
}

fn offset_to_bit(offset: u8) -> CrBit {
    match offset {
        0 => CrBit::Lt,
        1 => CrBit::Gt,
        2 => CrBit::Eq,
        _ => CrBit::So,
    }
}

/// Standard two's-complement add-with-carry: `a + b + carry_in`. Returns
/// `(result, carry_out, signed_overflow)`. `subf`/`subfc`/... reuse this by
/// passing `!a` and `carry_in = true` (or `XER.CA`), matching how the
/// hardware's adder implements subtraction.
fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (r1, c1) = a.overflowing_add(b);
    let (r2, c2) = r1.overflowing_add(u32::from(carry_in));
    let carry_out = c1 || c2;
    let overflow = (!(a ^ b) & (a ^ r2)) & 0x8000_0000 != 0;
    (r2, carry_out, overflow)
}

/// `rlwinm`/`rlwimi`/`rlwnm` mask: all-ones from bit `mb` through bit `me`
/// inclusive (MSB-first bit numbering), wrapping when `mb > me`.
fn rotate_mask(mb: u8, me: u8) -> u32 {
    let mb = u32::from(mb & 0x1F);
    let me = u32::from(me & 0x1F);
    let ones = u32::MAX;
    if mb <= me {
        (ones >> mb) & (ones << (31 - me))
    } else {
        (ones >> mb) | (ones << (31 - me))
    }
}

/// `sraw`/`srawi`: arithmetic shift right, with `XER.CA` set when any `1`
/// bits are shifted out of a negative operand.
fn arithmetic_shift_right(value: i32, shift: u32) -> (i32, bool) {
    if shift >= 32 {
        let carry = value < 0;
        (if value < 0 { -1 } else { 0 }, carry)
    } else if shift == 0 {
        (value, false)
    } else {
        let result = value >> shift;
        let carry = value < 0 && (value & ((1i32 << shift) - 1)) != 0;
        (result, carry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{assemble, NoIncludes};

    fn run(source: &str, start: u32, mem_size: u32) -> Interpreter<'static> {
        let program = assemble(source, &mut NoIncludes, start).unwrap();
        let mem: &'static mut MemoryContext = Box::leak(Box::new(MemoryContext::new()));
        mem.map(start, program.bytes);
        mem.map(start.wrapping_add(0x10000), vec![0u8; 0x1000]);
        Interpreter::with_entry_point(mem, start)
    }

    #[test]
    fn add_computes_sum() {
        let mut interp = run("add r3, r4, r5\n", 0x1000, 0);
        interp.regs.set_gpr(4, 10);
        interp.regs.set_gpr(5, 20);
        interp.step(None).unwrap();
        assert_eq!(interp.regs.gpr(3), 30);
    }

    #[test]
    fn addc_sets_carry_on_unsigned_overflow() {
        let mut interp = run("addc r3, r4, r5\n", 0x1000, 0);
        interp.regs.set_gpr(4, 0xFFFF_FFFF);
        interp.regs.set_gpr(5, 2);
        interp.step(None).unwrap();
        assert_eq!(interp.regs.gpr(3), 1);
        assert!(interp.regs.xer_ca());
    }

    #[test]
    fn li_and_mtctr_then_bdnz_loop_terminates() {
        let mut interp = run(
            "li r3, 10\nmtctr r3\nloop:\naddi r4, r4, 1\nbdnz loop\n",
            0x1000,
            0,
        );
        interp
            .execute(None, None, None)
            .unwrap_err_or_ok_ignore();
        assert_eq!(interp.regs.gpr(4), 10);
        assert_eq!(interp.regs.ctr(), 0);
    }

    #[test]
    fn rec_form_sets_cr0_from_sign() {
        let mut interp = run("subf. r3, r4, r5\n", 0x1000, 0);
        interp.regs.set_gpr(4, 10);
        interp.regs.set_gpr(5, 5);
        interp.step(None).unwrap();
        assert_eq!(interp.regs.gpr(3) as i32, -5);
        assert!(interp.regs.cr_bit(0, CrBit::Lt));
    }

    #[test]
    fn store_then_load_round_trips_through_memory() {
        let mut interp = run("stw r3, 0x10000(r4)\nlwz r5, 0x10000(r4)\n", 0x1000, 0);
        interp.regs.set_gpr(3, 0xCAFEBABE);
        interp.regs.set_gpr(4, 0);
        interp.step(None).unwrap();
        interp.step(None).unwrap();
        assert_eq!(interp.regs.gpr(5), 0xCAFEBABE);
    }

    #[test]
    fn unconditional_branch_sets_pc_to_target() {
        let mut interp = run("b target\nnop\ntarget:\naddi r3, r3, 1\n", 0x1000, 0);
        interp.step(None).unwrap();
        assert_eq!(interp.regs.pc(), 0x1000 + 8);
    }

    #[test]
    fn unimplemented_opcode_carries_disassembly() {
        let mut interp = run("lwarx r3, r4, r5\n", 0x1000, 0);
        let err = interp.step(None).unwrap_err();
        match err {
            ExecError::Unimplemented { mnemonic_text, .. } => {
                assert!(mnemonic_text.contains("lwarx"));
            }
            other => panic!("expected Unimplemented, got {other:?}"),
        }
    }

    #[test]
    fn invalid_word_is_reported() {
        let mut interp = run("li r3, 0\n", 0x1000, 0);
        interp.memory.write_u32(0x1000, 1 << 26).unwrap();
        let err = interp.step(None).unwrap_err();
        assert!(matches!(err, ExecError::Invalid { .. }));
    }

    // Small helper so the loop test above reads naturally: `execute` stops
    // when `bdnz` finally falls through past the last instruction and the
    // next fetch faults (there is no trailing `blr`), which is expected.
    trait IgnoreExecError {
        fn unwrap_err_or_ok_ignore(self);
    }

    impl IgnoreExecError for Result<(), ExecError> {
        fn unwrap_err_or_ok_ignore(self) {
            let _ = self;
        }
    }
}
