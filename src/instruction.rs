use std::fmt;

/// A fully decoded instruction.
///
/// Register fields are pre-masked to `0..8`, and immediate/offset fields are
/// already sign-extended to 16 bits, so execution never touches raw bits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Instr {
    Br { mask: u16, offset: u16 },
    Add { dr: u16, sr1: u16, src: Operand },
    Ld { dr: u16, offset: u16 },
    St { sr: u16, offset: u16 },
    Jsr { offset: u16 },
    Jsrr { base: u16 },
    And { dr: u16, sr1: u16, src: Operand },
    Ldr { dr: u16, base: u16, offset: u16 },
    Str { sr: u16, base: u16, offset: u16 },
    Not { dr: u16, sr: u16 },
    Ldi { dr: u16, offset: u16 },
    Sti { sr: u16, offset: u16 },
    Jmp { base: u16 },
    Lea { dr: u16, offset: u16 },
    Trap { vector: u16 },
}

/// Second operand of `ADD`/`AND`: register or sign-extended `imm5`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operand {
    Register(u16),
    Immediate(u16),
}

/// `RES` (0xD) and `RTI` (0x8) are not supported and stop the machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IllegalOpcode(pub u16);

impl fmt::Display for IllegalOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal opcode: 0x{:x}", self.0)
    }
}

impl Instr {
    pub fn decode(word: u16) -> Result<Self, IllegalOpcode> {
        let opcode = word >> 12;
        let instr = match opcode {
            0x0 => Self::Br {
                mask: (word >> 9) & 0b111,
                offset: sign_extend(word, 9),
            },
            0x1 => Self::Add {
                dr: dr(word),
                sr1: sr1(word),
                src: second_operand(word),
            },
            0x2 => Self::Ld {
                dr: dr(word),
                offset: sign_extend(word, 9),
            },
            0x3 => Self::St {
                sr: dr(word),
                offset: sign_extend(word, 9),
            },
            0x4 => {
                // Long flag distinguishes JSR from JSRR
                if word & 0x0800 != 0 {
                    Self::Jsr {
                        offset: sign_extend(word, 11),
                    }
                } else {
                    Self::Jsrr { base: sr1(word) }
                }
            }
            0x5 => Self::And {
                dr: dr(word),
                sr1: sr1(word),
                src: second_operand(word),
            },
            0x6 => Self::Ldr {
                dr: dr(word),
                base: sr1(word),
                offset: sign_extend(word, 6),
            },
            0x7 => Self::Str {
                sr: dr(word),
                base: sr1(word),
                offset: sign_extend(word, 6),
            },
            0x9 => Self::Not {
                dr: dr(word),
                sr: sr1(word),
            },
            0xA => Self::Ldi {
                dr: dr(word),
                offset: sign_extend(word, 9),
            },
            0xB => Self::Sti {
                sr: dr(word),
                offset: sign_extend(word, 9),
            },
            0xC => Self::Jmp { base: sr1(word) },
            0xE => Self::Lea {
                dr: dr(word),
                offset: sign_extend(word, 9),
            },
            0xF => Self::Trap {
                vector: word & 0xFF,
            },
            0x8 | 0xD => return Err(IllegalOpcode(opcode)),
            _ => unreachable!("opcode is 4 bits"),
        };
        Ok(instr)
    }
}

#[inline]
fn dr(word: u16) -> u16 {
    (word >> 9) & 0b111
}

#[inline]
fn sr1(word: u16) -> u16 {
    (word >> 6) & 0b111
}

#[inline]
fn second_operand(word: u16) -> Operand {
    if word & 0b10_0000 != 0 {
        Operand::Immediate(sign_extend(word, 5))
    } else {
        Operand::Register(word & 0b111)
    }
}

/// Widen the low `bits` bits of `val` to 16 bits, replicating the sign bit.
pub fn sign_extend(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    let shift = 16 - bits;
    (((val << shift) as i16) >> shift) as u16
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Br { mask, offset } => {
                write!(f, "BR")?;
                if mask & 0b100 != 0 {
                    write!(f, "n")?;
                }
                if mask & 0b010 != 0 {
                    write!(f, "z")?;
                }
                if mask & 0b001 != 0 {
                    write!(f, "p")?;
                }
                write!(f, " #{}", offset as i16)
            }
            Self::Add { dr, sr1, src } => write!(f, "ADD R{dr}, R{sr1}, {src}"),
            Self::And { dr, sr1, src } => write!(f, "AND R{dr}, R{sr1}, {src}"),
            Self::Not { dr, sr } => write!(f, "NOT R{dr}, R{sr}"),
            Self::Ld { dr, offset } => write!(f, "LD R{dr}, #{}", offset as i16),
            Self::Ldi { dr, offset } => write!(f, "LDI R{dr}, #{}", offset as i16),
            Self::Ldr { dr, base, offset } => write!(f, "LDR R{dr}, R{base}, #{}", offset as i16),
            Self::Lea { dr, offset } => write!(f, "LEA R{dr}, #{}", offset as i16),
            Self::St { sr, offset } => write!(f, "ST R{sr}, #{}", offset as i16),
            Self::Sti { sr, offset } => write!(f, "STI R{sr}, #{}", offset as i16),
            Self::Str { sr, base, offset } => write!(f, "STR R{sr}, R{base}, #{}", offset as i16),
            Self::Jmp { base: 7 } => write!(f, "RET"),
            Self::Jmp { base } => write!(f, "JMP R{base}"),
            Self::Jsr { offset } => write!(f, "JSR #{}", offset as i16),
            Self::Jsrr { base } => write!(f, "JSRR R{base}"),
            Self::Trap { vector } => write!(f, "TRAP 0x{vector:02x}"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Register(r) => write!(f, "R{r}"),
            Self::Immediate(imm) => write!(f, "#{}", imm as i16),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_extension() {
        // 5-bit fields
        assert_eq!(sign_extend(0x1F, 5), 0xFFFF);
        assert_eq!(sign_extend(0x0F, 5), 0x000F);
        assert_eq!(sign_extend(0x10, 5), 0xFFF0);
        // 9-bit fields
        assert_eq!(sign_extend(0x0FF, 9), 0x00FF);
        assert_eq!(sign_extend(0x1FF, 9), 0xFFFF);
        assert_eq!(sign_extend(0x100, 9), 0xFF00);
        // 6-bit fields
        assert_eq!(sign_extend(0x3F, 6), 0xFFFF);
        assert_eq!(sign_extend(0x1F, 6), 0x001F);
        // 11-bit fields
        assert_eq!(sign_extend(0x7FF, 11), 0xFFFF);
        assert_eq!(sign_extend(0x3FF, 11), 0x03FF);
        // High bits outside the field are ignored
        assert_eq!(sign_extend(0xFFE2, 5), 0x0002);
    }

    #[test]
    fn decodes_add_immediate() {
        // ADD R0, R1, #2
        assert_eq!(
            Instr::decode(0x1062),
            Ok(Instr::Add {
                dr: 0,
                sr1: 1,
                src: Operand::Immediate(2),
            })
        );
        // ADD R0, R1, #-1
        assert_eq!(
            Instr::decode(0x107F),
            Ok(Instr::Add {
                dr: 0,
                sr1: 1,
                src: Operand::Immediate(0xFFFF),
            })
        );
    }

    #[test]
    fn decodes_add_register() {
        // ADD R2, R3, R4
        assert_eq!(
            Instr::decode(0x14C4),
            Ok(Instr::Add {
                dr: 2,
                sr1: 3,
                src: Operand::Register(4),
            })
        );
    }

    #[test]
    fn decodes_branch_mask() {
        // BRnz #-2
        assert_eq!(
            Instr::decode(0x0DFE),
            Ok(Instr::Br {
                mask: 0b110,
                offset: 0xFFFE,
            })
        );
    }

    #[test]
    fn decodes_jsr_variants() {
        // JSR #16
        assert_eq!(Instr::decode(0x4810), Ok(Instr::Jsr { offset: 16 }));
        // JSRR R5
        assert_eq!(Instr::decode(0x4140), Ok(Instr::Jsrr { base: 5 }));
    }

    #[test]
    fn decodes_trap_vector() {
        assert_eq!(Instr::decode(0xF025), Ok(Instr::Trap { vector: 0x25 }));
    }

    #[test]
    fn rejects_reserved_opcodes() {
        assert_eq!(Instr::decode(0xD000), Err(IllegalOpcode(0xD)));
        assert_eq!(Instr::decode(0x8000), Err(IllegalOpcode(0x8)));
        assert_eq!(Instr::decode(0xDEAD), Err(IllegalOpcode(0xD)));
    }

    #[test]
    fn displays_decoded_form() {
        let cases: &[(u16, &str)] = &[
            (0x1062, "ADD R0, R1, #2"),
            (0x14C4, "ADD R2, R3, R4"),
            (0x0DFE, "BRnz #-2"),
            (0xC1C0, "RET"),
            (0xF025, "TRAP 0x25"),
        ];
        for (word, expected) in cases {
            assert_eq!(Instr::decode(*word).unwrap().to_string(), *expected);
        }
    }
}
