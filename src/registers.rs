//! The hart's 32 general-purpose registers.

use crate::hex::to_hex32;

/// Register 1..31 value after `reset`, chosen so tests can detect an
/// uninitialized read.
const RESET_SENTINEL: i32 = 0xf0f0_f0f0u32 as i32;

const NUM_REGS: usize = 32;

#[derive(Debug, Clone)]
pub struct Registers {
    reg: [i32; NUM_REGS],
}

impl Default for Registers {
    fn default() -> Self {
        let mut registers = Self {
            reg: [0; NUM_REGS],
        };
        registers.reset();
        registers
    }
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// `x0` always reads as zero regardless of what was last written.
    pub fn get(&self, r: u32) -> i32 {
        if r == 0 {
            0
        } else {
            self.reg[r as usize]
        }
    }

    /// Writes to `x0` are silently discarded.
    pub fn set(&mut self, r: u32, value: i32) {
        if r != 0 {
            self.reg[r as usize] = value;
        }
    }

    /// `x0 <- 0`, `x1..x31 <- 0xf0f0f0f0`.
    pub fn reset(&mut self) {
        self.set(0, 0);
        for r in 1..NUM_REGS as u32 {
            self.set(r, RESET_SENTINEL);
        }
    }

    /// Eight registers per line, each line led by `header` and a
    /// right-aligned `x<n>` label for its first register.
    pub fn dump(&self, header: &str) -> String {
        let mut out = String::new();
        for i in 0..NUM_REGS {
            if i % 8 == 0 {
                out.push_str(&format!("{header}{:>3}", format!("x{i}")));
            }
            out.push_str(&format!(" {}", to_hex32(self.reg[i] as u32)));
            if (i + 1) % 4 == 0 && (i + 1) % 8 != 0 {
                out.push(' ');
            }
            if (i + 1) % 8 == 0 {
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x0_always_reads_zero() {
        let mut regs = Registers::new();
        regs.set(0, 0x1234);
        assert_eq!(regs.get(0), 0);
    }

    #[test]
    fn reset_sets_sentinel_on_nonzero_registers() {
        let regs = Registers::new();
        assert_eq!(regs.get(0), 0);
        for r in 1..32 {
            assert_eq!(regs.get(r), RESET_SENTINEL);
        }
    }

    #[test]
    fn round_trip_every_register() {
        let mut regs = Registers::new();
        for r in 1..32 {
            let value = (r as i32).wrapping_mul(0x1111_1111);
            regs.set(r, value);
            assert_eq!(regs.get(r), value);
        }
    }

    #[test]
    fn dump_has_four_lines() {
        let regs = Registers::new();
        let dump = regs.dump("");
        assert_eq!(dump.lines().count(), 4);
        assert!(dump.lines().next().unwrap().contains("x0"));
    }
}
