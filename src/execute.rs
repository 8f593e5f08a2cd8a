//! Executes one decoded instruction against a hart: computes the next
//! register/memory/pc state and, when instruction tracing is enabled,
//! writes the `<rendered mnemonic><pad>// <commentary>` trace line that
//! explains what the instruction just did.

use crate::decode::{self, AluImmOp, AluRegOp, BranchOp, CsrOp, Instr, LoadOp, StoreOp};
use crate::hart::Hart;
use crate::hex::to_hex0x32;

/// Column the `// ` commentary starts at; matches the disassembly width.
const TRACE_WIDTH: usize = 35;

fn render_reg(r: u32) -> String {
    format!("x{r}")
}

/// Shorthand for rendering a signed word as `0x`-prefixed hex.
fn hx(v: i32) -> String {
    to_hex0x32(v as u32)
}

fn trace(hart: &mut Hart, instr: &Instr, addr: u32, commentary: &str) {
    if !hart.show_instructions {
        return;
    }
    let rendered = instr.render(addr);
    hart.write_trace(&format!("{rendered:<TRACE_WIDTH$}// {commentary}"));
}

/// Decodes `insn` and carries out its effect on `hart`: registers, memory,
/// `pc`, and halt state. `hart.pc` is read once, at the instruction's own
/// address, before any of the arms below mutate it.
pub fn execute(insn: u32, hart: &mut Hart) {
    let instr = decode::decode(insn);
    let addr = hart.pc;

    match instr {
        Instr::Lui { rd, imm_u } => {
            trace(hart, &instr, addr, &format!("{} = {}", render_reg(rd), hx(imm_u)));
            hart.regs.set(rd, imm_u);
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::Auipc { rd, imm_u } => {
            let val = (addr as i32).wrapping_add(imm_u);
            trace(
                hart,
                &instr,
                addr,
                &format!("{} = {} + {} = {}", render_reg(rd), hx(addr as i32), hx(imm_u), hx(val)),
            );
            hart.regs.set(rd, val);
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::Jal { rd, imm_j } => {
            let link = (addr as i32).wrapping_add(4);
            let target = addr.wrapping_add(imm_j as u32);
            trace(
                hart,
                &instr,
                addr,
                &format!(
                    "{} = {},  pc = {} + {} = {}",
                    render_reg(rd),
                    hx(link),
                    hx(addr as i32),
                    hx(imm_j),
                    hx(target as i32)
                ),
            );
            hart.regs.set(rd, link);
            hart.pc = target;
        }

        Instr::Jalr { rd, rs1, imm_i } => {
            let rs1val = hart.regs.get(rs1);
            let target = (rs1val.wrapping_add(imm_i) as u32) & !1u32;
            let link = (addr as i32).wrapping_add(4);
            trace(
                hart,
                &instr,
                addr,
                &format!(
                    "{} = {},  pc = ({} + {}) & {} = {}",
                    render_reg(rd),
                    hx(link),
                    hx(imm_i),
                    hx(rs1val),
                    hx(!1i32),
                    hx(target as i32)
                ),
            );
            hart.regs.set(rd, link);
            hart.pc = target;
        }

        Instr::Branch { op, rs1, rs2, imm_b } => {
            let a = hart.regs.get(rs1);
            let b = hart.regs.get(rs2);
            let (taken, operator) = match op {
                BranchOp::Beq => (a == b, "=="),
                BranchOp::Bne => (a != b, "!="),
                BranchOp::Blt => (a < b, "<"),
                BranchOp::Bge => (a >= b, ">="),
                BranchOp::Bltu => ((a as u32) < (b as u32), "<U"),
                BranchOp::Bgeu => ((a as u32) >= (b as u32), ">=U"),
            };
            let delta: i32 = if taken { imm_b } else { 4 };
            let target = addr.wrapping_add(delta as u32);
            trace(
                hart,
                &instr,
                addr,
                &format!("pc += ({} {operator} {} ? {} : 4) = {}", hx(a), hx(b), hx(imm_b), hx(target as i32)),
            );
            hart.pc = target;
        }

        Instr::Load { op, rd, rs1, imm_i } => {
            let base = hart.regs.get(rs1);
            let ea = base.wrapping_add(imm_i) as u32;
            let (val, prefix) = match op {
                LoadOp::Lb => (hart.memory.get8_sx(ea), "sx(m8("),
                LoadOp::Lh => (hart.memory.get16_sx(ea), "sx(m16("),
                LoadOp::Lw => (hart.memory.get32_sx(ea), "sx(m32("),
                LoadOp::Lbu => (hart.memory.get8(ea) as i32, "zx(m8("),
                LoadOp::Lhu => (hart.memory.get16(ea) as i32, "zx(m16("),
            };
            trace(
                hart,
                &instr,
                addr,
                &format!("{} = {prefix}{} + {})) = {}", render_reg(rd), hx(base), hx(imm_i), hx(val)),
            );
            hart.regs.set(rd, val);
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::Store { op, rs1, rs2, imm_s } => {
            let base = hart.regs.get(rs1);
            let ea = base.wrapping_add(imm_s) as u32;
            let rs2val = hart.regs.get(rs2);
            let (width, stored) = match op {
                StoreOp::Sb => ("m8", rs2val & 0xff),
                StoreOp::Sh => ("m16", rs2val & 0xffff),
                StoreOp::Sw => ("m32", rs2val),
            };
            trace(hart, &instr, addr, &format!("{width}({} + {}) = {}", hx(base), hx(imm_s), hx(stored)));
            match op {
                StoreOp::Sb => hart.memory.set8(ea, stored as u8),
                StoreOp::Sh => hart.memory.set16(ea, stored as u16),
                StoreOp::Sw => hart.memory.set32(ea, stored as u32),
            }
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::AluImm { op, rd, rs1, imm_i } => {
            let a = hart.regs.get(rs1);
            let (val, commentary) = match op {
                AluImmOp::Addi => {
                    let val = a.wrapping_add(imm_i);
                    (val, format!("{} = {} + {} = {}", render_reg(rd), hx(a), hx(imm_i), hx(val)))
                }
                AluImmOp::Slti => {
                    let val = if a < imm_i { 1 } else { 0 };
                    (val, format!("{} = ({} < {imm_i}) ? 1 : 0 = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluImmOp::Sltiu => {
                    let val = if (a as u32) < (imm_i as u32) { 1 } else { 0 };
                    (val, format!("{} = ({} <U {imm_i}) ? 1 : 0 = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluImmOp::Xori => {
                    let val = a ^ imm_i;
                    (val, format!("{} = {} ^ {} = {}", render_reg(rd), hx(a), hx(imm_i), hx(val)))
                }
                AluImmOp::Ori => {
                    let val = a | imm_i;
                    (val, format!("{} = {} | {} = {}", render_reg(rd), hx(a), hx(imm_i), hx(val)))
                }
                AluImmOp::Andi => {
                    let val = a & imm_i;
                    (val, format!("{} = {} & {} = {}", render_reg(rd), hx(a), hx(imm_i), hx(val)))
                }
                AluImmOp::Slli => {
                    let shamt = (imm_i as u32) & 0x1f;
                    let val = ((a as u32) << shamt) as i32;
                    (val, format!("{} = {} << {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluImmOp::Srli => {
                    let shamt = (imm_i as u32) & 0x1f;
                    let val = ((a as u32) >> shamt) as i32;
                    (val, format!("{} = {} >> {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluImmOp::Srai => {
                    let shamt = (imm_i as u32) & 0x1f;
                    let val = a >> shamt;
                    (val, format!("{} = {} >> {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
            };
            trace(hart, &instr, addr, &commentary);
            hart.regs.set(rd, val);
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::AluReg { op, rd, rs1, rs2 } => {
            let a = hart.regs.get(rs1);
            let b = hart.regs.get(rs2);
            let (val, commentary) = match op {
                AluRegOp::Add => {
                    let val = a.wrapping_add(b);
                    (val, format!("{} = {} + {} = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                AluRegOp::Sub => {
                    let val = a.wrapping_sub(b);
                    (val, format!("{} = {} - {} = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                AluRegOp::Sll => {
                    let shamt = (b as u32) % 32;
                    let val = ((a as u32) << shamt) as i32;
                    (val, format!("{} = {} << {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluRegOp::Slt => {
                    let val = if a < b { 1 } else { 0 };
                    (val, format!("{} = ({} < {}) ? 1 : 0 = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                // Unsigned comparison, matching the ISA definition of `sltu`
                // (see DESIGN.md: the original source compared signed here).
                AluRegOp::Sltu => {
                    let val = if (a as u32) < (b as u32) { 1 } else { 0 };
                    (val, format!("{} = ({} <U {}) ? 1 : 0 = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                AluRegOp::Xor => {
                    let val = a ^ b;
                    (val, format!("{} = {} ^ {} = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                AluRegOp::Srl => {
                    let shamt = (b as u32) % 32;
                    let val = ((a as u32) >> shamt) as i32;
                    (val, format!("{} = {} >> {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluRegOp::Sra => {
                    let shamt = (b as u32) % 32;
                    let val = a >> shamt;
                    (val, format!("{} = {} >> {shamt} = {}", render_reg(rd), hx(a), hx(val)))
                }
                AluRegOp::Or => {
                    let val = a | b;
                    (val, format!("{} = {} | {} = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
                AluRegOp::And => {
                    let val = a & b;
                    (val, format!("{} = {} & {} = {}", render_reg(rd), hx(a), hx(b), hx(val)))
                }
            };
            trace(hart, &instr, addr, &commentary);
            hart.regs.set(rd, val);
            hart.pc = hart.pc.wrapping_add(4);
        }

        Instr::Ecall => {
            trace(hart, &instr, addr, "HALT");
            hart.halt = true;
            hart.halt_reason = "ECALL instruction".to_string();
        }

        Instr::Ebreak => {
            trace(hart, &instr, addr, "HALT");
            hart.halt = true;
            hart.halt_reason = "EBREAK instruction".to_string();
        }

        // Only `csrrs` reading `mhartid` (csr 0xf14) into a nonzero `rd` has
        // execute semantics. Every other csr* mnemonic decodes fine (for
        // disassembly) but halts here exactly like a decode-time `Illegal`,
        // tracing the generic illegal-instruction line rather than its own
        // rendering. A `csrrs` with the wrong csr or rd=0 halts too, but
        // prints nothing at all even with tracing on - see DESIGN.md.
        Instr::Csr { op, rd, csr, .. } => {
            if op != CsrOp::Csrrs {
                if hart.show_instructions {
                    let line = Instr::Illegal.render(addr);
                    hart.write_trace(&line);
                }
                hart.halt = true;
                hart.halt_reason = "Illegal instruction".to_string();
            } else if csr == 0xf14 && rd != 0 {
                trace(hart, &instr, addr, &format!("{} = {}", render_reg(rd), hart.mhartid));
                hart.regs.set(rd, hart.mhartid as i32);
                hart.pc = hart.pc.wrapping_add(4);
            } else {
                hart.halt = true;
                hart.halt_reason = "Illegal CSR in CSRRS instruction".to_string();
            }
        }

        Instr::Illegal => {
            if hart.show_instructions {
                let line = instr.render(addr);
                hart.write_trace(&line);
            }
            hart.halt = true;
            hart.halt_reason = "Illegal instruction".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode;
    use crate::memory::Memory;
    use std::cell::RefCell;
    use std::io::{self, Write};
    use std::rc::Rc;

    fn hart_with_memory(size: u32) -> Hart {
        Hart::with_trace_sink(Memory::new(size), Box::new(Vec::new()))
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lui_sets_upper_bits_and_advances_pc() {
        let mut hart = hart_with_memory(16);
        execute(encode::utype(0x37, 5, 0x12345), &mut hart);
        assert_eq!(hart.regs().get(5), 0x1234_5000u32 as i32);
        assert_eq!(hart.pc(), 4);
    }

    #[test]
    fn addi_is_twos_complement_wrapping() {
        let mut hart = hart_with_memory(16);
        hart.regs_mut().set(1, i32::MAX);
        execute(encode::itype(0x13, 2, 0, 1, 1), &mut hart);
        assert_eq!(hart.regs().get(2), i32::MIN);
    }

    #[test]
    fn slt_is_signed_but_sltu_is_unsigned() {
        let mut hart = hart_with_memory(16);
        hart.regs_mut().set(1, -1); // 0xffffffff
        hart.regs_mut().set(2, 1);
        execute(encode::rtype(0x33, 2, 0x00, 3, 1, 2), &mut hart); // slt x3, x1, x2
        assert_eq!(hart.regs().get(3), 1); // -1 < 1 signed

        execute(encode::rtype(0x33, 3, 0x00, 4, 1, 2), &mut hart); // sltu x4, x1, x2
        assert_eq!(hart.regs().get(4), 0); // 0xffffffff is not < 1 unsigned
    }

    #[test]
    fn branch_not_taken_still_advances_pc_by_four() {
        let mut hart = hart_with_memory(16);
        hart.set_pc(8);
        hart.regs_mut().set(1, 1);
        hart.regs_mut().set(2, 2);
        execute(encode::btype(0x63, 0, 1, 2, 100), &mut hart); // beq, not equal
        assert_eq!(hart.pc(), 12);
    }

    #[test]
    fn store_then_load_byte_round_trips_through_memory() {
        let mut hart = hart_with_memory(32);
        hart.regs_mut().set(1, 0x10);
        hart.regs_mut().set(2, -1); // low byte 0xff
        execute(encode::stype(0x23, 0, 1, 2, 0), &mut hart); // sb
        execute(encode::itype(0x03, 3, 4, 1, 0), &mut hart); // lbu
        assert_eq!(hart.regs().get(3), 0xff);
    }

    #[test]
    fn csrrs_mhartid_reads_configured_id() {
        let mut hart = hart_with_memory(16);
        hart.set_mhartid(7);
        execute(encode::itype(0x73, 5, 2, 0, 0xf14), &mut hart);
        assert_eq!(hart.regs().get(5), 7);
        assert!(!hart.is_halted());
    }

    #[test]
    fn csrrw_decodes_but_halts_as_illegal_instruction() {
        let mut hart = hart_with_memory(16);
        execute(encode::itype(0x73, 5, 1, 0, 0xf14), &mut hart); // csrrw, not csrrs
        assert!(hart.is_halted());
        assert_eq!(hart.halt_reason(), "Illegal instruction");
    }

    #[test]
    fn illegal_csr_target_halts_silently_even_with_tracing() {
        let buf = SharedBuf::default();
        let mut hart = Hart::with_trace_sink(Memory::new(16), Box::new(buf.clone()));
        hart.set_show_instructions(true);
        execute(encode::itype(0x73, 5, 2, 0, 0x000), &mut hart);
        assert!(hart.is_halted());
        assert_eq!(hart.halt_reason(), "Illegal CSR in CSRRS instruction");
        assert!(buf.0.borrow().is_empty());
    }

    #[test]
    fn ecall_commentary_is_halt() {
        let buf = SharedBuf::default();
        let mut hart = Hart::with_trace_sink(Memory::new(16), Box::new(buf.clone()));
        hart.set_show_instructions(true);
        execute(0x0000_0073, &mut hart);
        let output = String::from_utf8(buf.0.borrow().clone()).unwrap();
        assert!(output.contains("// HALT"));
        assert_eq!(hart.halt_reason(), "ECALL instruction");
    }
}
