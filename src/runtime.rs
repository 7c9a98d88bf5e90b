use std::io::{stdout, Write as _};

use colored::Colorize;
use miette::{bail, Result};

use crate::debugger::{Action, Debugger, DebuggerOptions};
use crate::exec::{ExecutionState, Interrupt};
use crate::instruction::{Instr, Operand};
use crate::output::{Condition, Output};
use crate::{dprintln, print_char, term};

/// The machine can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Keyboard status register. Bit 15 set means a character is pending.
pub const MR_KBSR: u16 = 0xFE00;
/// Keyboard data register. Holds the last character noticed by a status read.
pub const MR_KBDR: u16 = 0xFE02;

/// Programs are loaded at and start from this address.
const PC_START: u16 = 0x3000;

/// Flat word-addressed store with the two keyboard-mapped addresses.
pub struct Memory {
    words: Box<[u16; MEMORY_MAX]>,
}

impl Memory {
    pub fn new() -> Self {
        let words = [0; MEMORY_MAX];
        Self {
            words: Box::new(words),
        }
    }

    /// Place an image into memory. The first word is the origin address; the
    /// rest is copied there verbatim.
    pub fn load_image(&mut self, raw: &[u16]) -> Result<()> {
        let Some((&origin, image)) = raw.split_first() else {
            bail!("image contains no origin word");
        };
        let origin = origin as usize;
        if origin + image.len() > MEMORY_MAX {
            bail!("image does not fit in memory at origin 0x{:04x}", origin);
        }
        self.words[origin..origin + image.len()].copy_from_slice(image);
        Ok(())
    }

    fn read(&mut self, addr: u16) -> u16 {
        self.read_with(addr, term::poll_byte)
    }

    /// Read with an explicit keyboard probe, so the status side effect can be
    /// driven deterministically in tests.
    fn read_with(&mut self, addr: u16, poll: impl FnOnce() -> Option<u8>) -> u16 {
        if addr == MR_KBSR {
            match poll() {
                Some(byte) => {
                    self.words[MR_KBSR as usize] = 1 << 15;
                    self.words[MR_KBDR as usize] = byte as u16;
                }
                None => self.words[MR_KBSR as usize] = 0,
            }
        }
        self.words[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u16) {
        self.words[addr as usize] = value;
    }

    /// Plain lookup without the memory-mapped side effect. Used by the string
    /// trap routines, which walk memory directly.
    fn get(&self, addr: u16) -> u16 {
        self.words[addr as usize]
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// Condition flag. Exactly one value holds at any time, reflecting the most
/// recent register write.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RunFlag {
    N = 0b100,
    Z = 0b010,
    P = 0b001,
}

/// Complete machine state: memory, general registers, PC, condition flag.
pub struct RunState {
    mem: Memory,
    pc: u16,
    reg: [u16; 8],
    flag: RunFlag,
}

impl RunState {
    fn new(mem: Memory) -> Self {
        Self {
            mem,
            pc: PC_START,
            reg: [0; 8],
            flag: RunFlag::Z,
        }
    }

    pub fn reg(&self, reg: u16) -> u16 {
        debug_assert!(reg < 8, "decoded register fields are 3 bits");
        self.reg[reg as usize]
    }

    fn set_reg(&mut self, reg: u16, value: u16) {
        debug_assert!(reg < 8, "decoded register fields are 3 bits");
        self.reg[reg as usize] = value;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flag(&self) -> RunFlag {
        self.flag
    }

    fn set_flags(&mut self, value: u16) {
        self.flag = if value == 0 {
            RunFlag::Z
        } else if value & 0x8000 != 0 {
            RunFlag::N
        } else {
            RunFlag::P
        };
    }

    fn operand(&self, src: Operand) -> u16 {
        match src {
            Operand::Register(r) => self.reg(r),
            Operand::Immediate(imm) => imm,
        }
    }

    /// Execute one decoded instruction. PC has already been incremented past
    /// it; all PC-relative addressing uses that incremented value.
    fn execute(&mut self, instr: Instr, mode: &mut ExecutionState) {
        match instr {
            Instr::Add { dr, sr1, src } => {
                let res = self.reg(sr1).wrapping_add(self.operand(src));
                self.set_reg(dr, res);
                self.set_flags(res);
            }
            Instr::And { dr, sr1, src } => {
                let res = self.reg(sr1) & self.operand(src);
                self.set_reg(dr, res);
                self.set_flags(res);
            }
            Instr::Not { dr, sr } => {
                let res = !self.reg(sr);
                self.set_reg(dr, res);
                self.set_flags(res);
            }

            Instr::Br { mask, offset } => {
                if self.flag as u16 & mask != 0 {
                    self.pc = self.pc.wrapping_add(offset);
                }
            }
            Instr::Jmp { base } => {
                self.pc = self.reg(base);
            }
            Instr::Jsr { offset } => {
                self.set_reg(7, self.pc);
                self.pc = self.pc.wrapping_add(offset);
            }
            Instr::Jsrr { base } => {
                // Read the target before R7 is clobbered, in case base is R7
                let target = self.reg(base);
                self.set_reg(7, self.pc);
                self.pc = target;
            }

            Instr::Ld { dr, offset } => {
                let addr = self.pc.wrapping_add(offset);
                let value = self.mem.read(addr);
                self.set_reg(dr, value);
                self.set_flags(value);
            }
            Instr::Ldi { dr, offset } => {
                let addr = self.pc.wrapping_add(offset);
                let indirect = self.mem.read(addr);
                let value = self.mem.read(indirect);
                self.set_reg(dr, value);
                self.set_flags(value);
            }
            Instr::Ldr { dr, base, offset } => {
                let addr = self.reg(base).wrapping_add(offset);
                let value = self.mem.read(addr);
                self.set_reg(dr, value);
                self.set_flags(value);
            }
            Instr::Lea { dr, offset } => {
                let addr = self.pc.wrapping_add(offset);
                self.set_reg(dr, addr);
                self.set_flags(addr);
            }

            Instr::St { sr, offset } => {
                let addr = self.pc.wrapping_add(offset);
                self.mem.write(addr, self.reg(sr));
            }
            Instr::Sti { sr, offset } => {
                let addr = self.pc.wrapping_add(offset);
                let indirect = self.mem.read(addr);
                self.mem.write(indirect, self.reg(sr));
            }
            Instr::Str { sr, base, offset } => {
                let addr = self.reg(base).wrapping_add(offset);
                self.mem.write(addr, self.reg(sr));
            }

            Instr::Trap { vector } => {
                self.set_reg(7, self.pc);
                self.trap(vector, mode);
            }
        }
    }

    fn trap(&mut self, vector: u16, mode: &mut ExecutionState) {
        match vector {
            // getc: read one character, no echo
            0x20 => {
                // End of input reads as 0xFFFF, like a C getchar() would
                let value = term::read_byte().map(u16::from).unwrap_or(0xFFFF);
                self.set_reg(0, value);
                self.set_flags(value);
            }
            // out
            0x21 => {
                print_char!((self.reg(0) & 0xFF) as u8 as char);
                stdout().flush().unwrap();
            }
            // puts: one character per word, zero-terminated
            0x22 => {
                let mut addr = self.reg(0);
                loop {
                    let word = self.mem.get(addr);
                    if word == 0 {
                        break;
                    }
                    print_char!((word & 0xFF) as u8 as char);
                    addr = addr.wrapping_add(1);
                }
                stdout().flush().unwrap();
            }
            // in: prompt, read one character with echo
            0x23 => {
                Output::Normal.print_str("Enter a character: ");
                stdout().flush().unwrap();
                let value = term::read_byte().map(u16::from).unwrap_or(0xFFFF);
                if let Some(ch) = char::from_u32(value as u32) {
                    print_char!(ch);
                }
                stdout().flush().unwrap();
                self.set_reg(0, value);
                self.set_flags(value);
            }
            // putsp: two characters per word, low byte first, zero-terminated
            0x24 => {
                let mut addr = self.reg(0);
                loop {
                    let word = self.mem.get(addr);
                    if word == 0 {
                        break;
                    }
                    print_char!((word & 0xFF) as u8 as char);
                    let high = word >> 8;
                    if high != 0 {
                        print_char!(high as u8 as char);
                    }
                    addr = addr.wrapping_add(1);
                }
                stdout().flush().unwrap();
            }
            // halt
            0x25 => {
                Output::Normal.start_new_line();
                println!("{:>12}", "Halted".cyan());
                stdout().flush().unwrap();
                *mode = ExecutionState::Off;
            }
            // Unknown vectors are reported but do not stop the machine
            _ => {
                dprintln!(Always, "invalid trap vector: 0x{:02x}", vector);
            }
        }
    }
}

/// Couples the machine state to the execution controller and debugger.
pub struct RunEnvironment {
    state: RunState,
    debugger: Debugger,
    mode: ExecutionState,
}

impl RunEnvironment {
    pub fn new(mem: Memory, opts: DebuggerOptions) -> Self {
        Self {
            state: RunState::new(mem),
            debugger: Debugger::new(opts),
            mode: ExecutionState::SingleStep,
        }
    }

    pub fn set_minimal(&mut self, minimal: bool) {
        Output::set_minimal(minimal);
    }

    /// Fetch-decode-execute until the controller reaches `Off`.
    pub fn run(&mut self) {
        dprintln!(
            Sometimes,
            "You are in single-step mode. Type `help` for help."
        );

        while self.mode != ExecutionState::Off {
            // Stop requests are only acted on at this safe point
            if Interrupt::take() {
                self.mode.demote();
                match self.mode {
                    ExecutionState::Off => {
                        dprintln!(Always, "Interrupted. Exiting...");
                        break;
                    }
                    ExecutionState::SingleStep => {
                        dprintln!(
                            Always,
                            "Dropped into single-step mode. Press Ctrl+C again to quit."
                        );
                    }
                    ExecutionState::Turbo => unreachable!("demotion never raises the mode"),
                }
            }

            let pc = self.state.pc;
            let word = self.state.mem.read(pc);
            self.state.pc = pc.wrapping_add(1);
            let decoded = Instr::decode(word);

            if self.mode == ExecutionState::SingleStep {
                match &decoded {
                    Ok(instr) => {
                        dprintln!(
                            Sometimes,
                            "Fetched 0x{:04x} from 0x{:04x}: {}",
                            word,
                            pc,
                            instr
                        )
                    }
                    Err(_) => dprintln!(Sometimes, "Fetched 0x{:04x} from 0x{:04x}.", word, pc),
                }
                match self.debugger.wait_for_action(&self.state) {
                    Action::Step => (),
                    Action::Resume => self.mode = ExecutionState::Turbo,
                    Action::Quit => {
                        self.mode = ExecutionState::Off;
                        break;
                    }
                }
            }

            match decoded {
                Ok(instr) => self.state.execute(instr, &mut self.mode),
                Err(illegal) => {
                    Output::Debugger(Condition::Always).start_new_line();
                    dprintln!(Always, "{}", illegal);
                    self.mode = ExecutionState::Off;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn state() -> RunState {
        RunState::new(Memory::new())
    }

    fn execute(state: &mut RunState, word: u16) -> ExecutionState {
        let mut mode = ExecutionState::SingleStep;
        let instr = Instr::decode(word).expect("test word must decode");
        state.execute(instr, &mut mode);
        mode
    }

    #[test]
    fn add_immediate_sets_result_and_flag() {
        let mut state = state();
        state.set_reg(1, 0x0005);
        // ADD R0, R1, #2
        execute(&mut state, 0x1062);
        assert_eq!(state.reg(0), 0x0007);
        assert_eq!(state.flag(), RunFlag::P);
    }

    #[test]
    fn add_wraps_modulo_65536() {
        let mut state = state();
        state.set_reg(1, 0xFFFF);
        // ADD R0, R1, #2
        execute(&mut state, 0x1062);
        assert_eq!(state.reg(0), 0x0001);
        assert_eq!(state.flag(), RunFlag::P);
    }

    #[test]
    fn flags_reflect_last_register_write() {
        let cases = [
            (0x0000, RunFlag::Z),
            (0x0001, RunFlag::P),
            (0x8000, RunFlag::N),
            (0xFFFF, RunFlag::N),
            (0x7FFF, RunFlag::P),
        ];
        for (value, expected) in cases {
            let mut state = state();
            state.set_reg(1, value);
            // ADD R0, R1, #0
            execute(&mut state, 0x1060);
            assert_eq!(state.flag(), expected, "flag for value 0x{value:04x}");
        }
    }

    #[test]
    fn store_instructions_leave_flag_unchanged() {
        let mut state = state();
        state.set_reg(1, 0x8000);
        // ADD R0, R1, #0 -- flag becomes N
        execute(&mut state, 0x1060);
        assert_eq!(state.flag(), RunFlag::N);
        // ST R0, #5
        execute(&mut state, 0x3005);
        assert_eq!(state.flag(), RunFlag::N);
    }

    #[test]
    fn str_stores_relative_to_base_register() {
        let mut state = state();
        state.set_reg(0, 0xBEEF);
        state.set_reg(3, 0x4000);
        // STR R0, R3, #2
        execute(&mut state, 0x70C2);
        assert_eq!(state.mem.get(0x4002), 0xBEEF);
        assert_eq!(state.flag(), RunFlag::Z);
    }

    #[test]
    fn sti_stores_through_indirection() {
        let mut state = state();
        state.pc = 0x3001;
        state.set_reg(4, 0x00AB);
        state.mem.write(0x3008, 0x5000);
        // STI R4, #7 -> pointer at 0x3008 -> 0x5000
        execute(&mut state, 0xB807);
        assert_eq!(state.mem.get(0x5000), 0x00AB);
        // The pointer itself is untouched
        assert_eq!(state.mem.get(0x3008), 0x5000);
    }

    #[test]
    fn ldi_reads_through_double_indirection() {
        let mut state = state();
        state.pc = 0x3001; // as if an instruction at 0x3000 was just fetched
        state.mem.write(0x3010, 0x4000);
        state.mem.write(0x4000, 0x00AB);
        // LDI R2, #0xF -> 0x3001 + 0xF = 0x3010
        execute(&mut state, 0xA40F);
        assert_eq!(state.reg(2), 0x00AB);
        assert_eq!(state.flag(), RunFlag::P);
    }

    #[test]
    fn lea_loads_address_not_contents() {
        let mut state = state();
        state.pc = 0x3001;
        state.mem.write(0x3003, 0x1234);
        // LEA R0, #2
        execute(&mut state, 0xE002);
        assert_eq!(state.reg(0), 0x3003);
    }

    #[test]
    fn branch_takes_only_matching_flags() {
        let mut state = state();
        state.pc = 0x3001;
        // Flag is Z initially; BRz #4 taken
        execute(&mut state, 0x0404);
        assert_eq!(state.pc(), 0x3005);
        // BRnp #4 not taken
        execute(&mut state, 0x0A04);
        assert_eq!(state.pc(), 0x3005);
    }

    #[test]
    fn jsrr_saves_return_address_before_jumping_through_r7() {
        let mut state = state();
        state.pc = 0x3001;
        state.set_reg(7, 0x4000);
        // JSRR R7
        execute(&mut state, 0x41C0);
        assert_eq!(state.pc(), 0x4000);
        assert_eq!(state.reg(7), 0x3001);
    }

    #[test]
    fn trap_saves_pc_in_r7() {
        let mut state = state();
        state.pc = 0x3001;
        // TRAP 0xFF -- unknown vector, no other effect
        let mode = execute(&mut state, 0xF0FF);
        assert_eq!(state.reg(7), 0x3001);
        assert_eq!(mode, ExecutionState::SingleStep);
        assert_eq!(state.flag(), RunFlag::Z);
    }

    #[test]
    fn trap_halt_turns_machine_off() {
        let mut state = state();
        let mode = execute(&mut state, 0xF025);
        assert_eq!(mode, ExecutionState::Off);
    }

    #[test]
    fn keyboard_status_reflects_pending_input() {
        let mut mem = Memory::new();
        // No input pending: bit 15 clear
        assert_eq!(mem.read_with(MR_KBSR, || None), 0x0000);
        // 'A' pending: status set, data register filled
        assert_eq!(mem.read_with(MR_KBSR, || Some(0x41)), 0x8000);
        assert_eq!(mem.read_with(MR_KBDR, || unreachable!()), 0x0041);
    }

    #[test]
    fn plain_addresses_never_probe_input() {
        let mut mem = Memory::new();
        mem.write(0x3000, 0xBEEF);
        assert_eq!(mem.read_with(0x3000, || unreachable!()), 0xBEEF);
        assert_eq!(mem.read_with(MR_KBDR, || unreachable!()), 0x0000);
    }

    #[test]
    fn image_loads_at_origin() {
        let mut mem = Memory::new();
        mem.load_image(&[0x3000, 0xE002, 0xF025]).unwrap();
        assert_eq!(mem.get(0x3000), 0xE002);
        assert_eq!(mem.get(0x3001), 0xF025);
        assert_eq!(mem.get(0x3002), 0x0000);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let mut mem = Memory::new();
        let image = vec![0xFFFF; 3];
        assert!(mem.load_image(&image).is_err());
        assert!(mem.load_image(&[]).is_err());
    }
}
