//! Reference register/memory machine.
//!
//! Executes one instruction per `step`. Output goes to the print sink as it is
//! produced; input arrives through `receive_input` and is consumed by the
//! `readi`/`readc` instructions, which wait without advancing the program
//! counter until a complete token is buffered.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::engine::{ExecutionEngine, PrintSink};
use crate::error::{EngineError, Result};
use crate::memory::{Memory, DEFAULT_MEMORY_BASE, DEFAULT_MEMORY_BYTES};
use crate::parser::{parse_program, Instruction, Opcode, Operand, Program};
use crate::registers::{self, RegisterFile, REGISTER_NAMES};
use crate::types::{MemoryBounds, RegisterValues, StepOutcome, WordSize};

/// Exit status of a program that ended in a runtime fault.
pub const FAULT_EXIT_STATUS: i64 = -1;

/// Machine shape, fixed for the lifetime of a [`Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub word_size: WordSize,
    pub memory_base: u64,
    pub memory_bytes: usize,
}

impl MachineConfig {
    /// Memory bounds this shape describes.
    ///
    /// Fails when the range overflows the address space or its top does not
    /// fit in a word, since `SP` starts there.
    pub fn validate(&self) -> Result<MemoryBounds> {
        let upper = u64::try_from(self.memory_bytes)
            .ok()
            .and_then(|bytes| self.memory_base.checked_add(bytes))
            .ok_or_else(|| {
                EngineError::Init(format!(
                    "memory of {} bytes at {:#x} overflows the address space",
                    self.memory_bytes, self.memory_base
                ))
            })?;
        if upper > self.word_size.max_address() {
            return Err(EngineError::Init(format!(
                "memory top {upper:#x} does not fit in a {}-byte word",
                self.word_size.bytes()
            )));
        }
        Ok(MemoryBounds::new(self.memory_base, upper))
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            word_size: WordSize::Four,
            memory_base: DEFAULT_MEMORY_BASE,
            memory_bytes: DEFAULT_MEMORY_BYTES,
        }
    }
}

/// Output fragments kept while no print sink is attached.
const UNFLUSHED_LIMIT: usize = 1024;

/// Control flow after one instruction.
enum Flow {
    Next,
    Jump(i64),
    Wait,
    Exit(i64),
}

pub struct Machine {
    config: MachineConfig,
    registers: RegisterFile,
    memory: Memory,
    program: Option<Program>,
    completed: bool,
    exit_status: Option<i64>,
    stop_requested: bool,
    input: VecDeque<char>,
    print_sink: Option<PrintSink>,
    unflushed: VecDeque<String>,
    config_error: Option<EngineError>,
}

impl Machine {
    /// Build a machine of the given shape.
    ///
    /// An invalid shape yields a machine without memory that fails `init` and
    /// `load` with the validation error. Use [`Machine::try_new`] to reject it
    /// up front.
    pub fn new(config: MachineConfig) -> Self {
        let (memory, config_error) = match config.validate() {
            Ok(_) => (Memory::new(config.memory_base, config.memory_bytes), None),
            Err(error) => {
                warn!(%error, "invalid machine configuration");
                (Memory::new(0, 0), Some(error))
            }
        };
        let mut machine = Self {
            config,
            registers: RegisterFile::new(config.word_size),
            memory,
            program: None,
            completed: false,
            exit_status: None,
            stop_requested: false,
            input: VecDeque::new(),
            print_sink: None,
            unflushed: VecDeque::new(),
            config_error,
        };
        machine.initialize();
        machine
    }

    pub fn try_new(config: MachineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    fn initialize(&mut self) {
        let top = self.memory.bounds().upper as i64;
        self.registers.set(registers::SP, top);
    }

    fn pc(&self) -> i64 {
        self.registers.get(registers::PC)
    }

    fn emit(&mut self, text: String) {
        match self.print_sink.as_mut() {
            Some(sink) => sink(&text),
            None => {
                if self.unflushed.len() == UNFLUSHED_LIMIT {
                    trace!("dropping oldest unflushed output");
                    self.unflushed.pop_front();
                }
                self.unflushed.push_back(text);
            }
        }
    }

    fn finish(&mut self, exit_status: i64) {
        self.completed = true;
        self.exit_status = Some(exit_status);
        debug!(exit_status, "program completed");
    }

    fn value(&self, operand: &Operand) -> std::result::Result<i64, String> {
        match operand {
            Operand::Register(index) => Ok(self.registers.get(*index)),
            Operand::Immediate(value) => Ok(*value),
            Operand::Label(label) => self
                .program
                .as_ref()
                .and_then(|program| program.labels.get(label))
                .map(|index| *index as i64)
                .ok_or_else(|| format!("label `{label}` does not exist")),
            Operand::Text(text) => Err(format!("string immediate {text:?} used as a value")),
        }
    }

    fn register(operand: &Operand) -> std::result::Result<usize, String> {
        match operand {
            Operand::Register(index) => Ok(*index),
            other => Err(format!("expected a register, found {other:?}")),
        }
    }

    fn address(value: i64) -> std::result::Result<u64, String> {
        u64::try_from(value).map_err(|_| format!("attempted access to address `{value}` which is negative"))
    }

    fn arithmetic(&mut self, opcode: Opcode, operands: &[Operand]) -> std::result::Result<Flow, String> {
        let (dst, lhs, rhs) = match operands {
            [dst, src] => {
                let dst = Self::register(dst)?;
                (dst, self.registers.get(dst), self.value(src)?)
            }
            [dst, lhs, rhs] => (Self::register(dst)?, self.value(lhs)?, self.value(rhs)?),
            _ => return Err(format!("malformed operands for {opcode:?}")),
        };
        let bits = self.config.word_size.bits();
        let result = match opcode {
            Opcode::Add => lhs.wrapping_add(rhs),
            Opcode::Sub => lhs.wrapping_sub(rhs),
            Opcode::Mul => {
                let wide = lhs as i128 * rhs as i128;
                self.registers.set(registers::LO, wide as i64);
                self.registers.set(registers::HI, (wide >> bits) as i64);
                wide as i64
            }
            Opcode::Div | Opcode::Rem if rhs == 0 => {
                return Err("attempted to divide by zero".to_string());
            }
            Opcode::Div => lhs.wrapping_div(rhs),
            Opcode::Rem => lhs.wrapping_rem(rhs),
            Opcode::And => lhs & rhs,
            Opcode::Or => lhs | rhs,
            Opcode::Xor => lhs ^ rhs,
            Opcode::Sll => lhs.wrapping_shl(rhs as u32 % bits),
            Opcode::Srl => {
                let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
                ((lhs as u64 & mask) >> (rhs as u32 % bits)) as i64
            }
            _ => return Err(format!("{opcode:?} is not arithmetic")),
        };
        self.registers.set(dst, result);
        Ok(Flow::Next)
    }

    fn branch(&self, opcode: Opcode, operands: &[Operand]) -> std::result::Result<Flow, String> {
        let [lhs, rhs, target] = operands else {
            return Err(format!("malformed operands for {opcode:?}"));
        };
        let (lhs, rhs) = (self.value(lhs)?, self.value(rhs)?);
        let taken = match opcode {
            Opcode::Beq => lhs == rhs,
            Opcode::Bne => lhs != rhs,
            Opcode::Blt => lhs < rhs,
            Opcode::Bgt => lhs > rhs,
            _ => return Err(format!("{opcode:?} is not a branch")),
        };
        if taken {
            Ok(Flow::Jump(self.value(target)?))
        } else {
            Ok(Flow::Next)
        }
    }

    /// Pop the next whitespace-delimited token and its terminator from the
    /// input buffer.
    ///
    /// Returns `None` while the token is not yet terminated by whitespace.
    fn take_input_word(&mut self) -> Option<String> {
        while self.input.front().is_some_and(|c| c.is_whitespace()) {
            self.input.pop_front();
        }
        let end = self.input.iter().position(|c| c.is_whitespace())?;
        let word = self.input.drain(..end).collect();
        self.input.pop_front();
        Some(word)
    }

    fn take_input_char(&mut self) -> Option<char> {
        self.input.pop_front()
    }

    fn execute(&mut self, instruction: &Instruction) -> std::result::Result<Flow, String> {
        let operands = instruction.operands.as_slice();
        match instruction.opcode {
            opcode @ (Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Sll
            | Opcode::Srl) => self.arithmetic(opcode, operands),
            opcode @ (Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bgt) => {
                self.branch(opcode, operands)
            }
            Opcode::Move => {
                let [dst, src] = operands else {
                    return Err("malformed operands for move".to_string());
                };
                let value = self.value(src)?;
                self.registers.set(Self::register(dst)?, value);
                Ok(Flow::Next)
            }
            Opcode::Load => {
                let [dst, address] = operands else {
                    return Err("malformed operands for load".to_string());
                };
                let address = Self::address(self.value(address)?)?;
                let value = self
                    .memory
                    .read_word(address, self.config.word_size)
                    .map_err(|err| err.to_string())?;
                self.registers.set(Self::register(dst)?, value);
                Ok(Flow::Next)
            }
            Opcode::Store => {
                let [src, address] = operands else {
                    return Err("malformed operands for store".to_string());
                };
                let value = self.value(src)?;
                let address = Self::address(self.value(address)?)?;
                self.memory
                    .write_word(address, value, self.config.word_size)
                    .map_err(|err| err.to_string())?;
                Ok(Flow::Next)
            }
            Opcode::Jump => {
                let [target] = operands else {
                    return Err("malformed operands for jump".to_string());
                };
                Ok(Flow::Jump(self.value(target)?))
            }
            Opcode::PrintI => {
                let [value] = operands else {
                    return Err("malformed operands for printi".to_string());
                };
                let text = self.value(value)?.to_string();
                self.emit(text);
                Ok(Flow::Next)
            }
            Opcode::PrintC => {
                let [value] = operands else {
                    return Err("malformed operands for printc".to_string());
                };
                let code = self.value(value)?;
                let c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.emit(c.to_string());
                Ok(Flow::Next)
            }
            Opcode::PrintS => match operands {
                [Operand::Text(text)] => {
                    self.emit(text.clone());
                    Ok(Flow::Next)
                }
                _ => Err("malformed operands for prints".to_string()),
            },
            Opcode::ReadI => {
                let [dst] = operands else {
                    return Err("malformed operands for readi".to_string());
                };
                let dst = Self::register(dst)?;
                let Some(word) = self.take_input_word() else {
                    return Ok(Flow::Wait);
                };
                let value = word
                    .parse::<i64>()
                    .map_err(|_| format!("invalid integer input `{word}`"))?;
                self.registers.set(dst, value);
                Ok(Flow::Next)
            }
            Opcode::ReadC => {
                let [dst] = operands else {
                    return Err("malformed operands for readc".to_string());
                };
                let dst = Self::register(dst)?;
                let Some(c) = self.take_input_char() else {
                    return Ok(Flow::Wait);
                };
                self.registers.set(dst, c as i64);
                Ok(Flow::Next)
            }
            Opcode::Exit => match operands {
                [] => Ok(Flow::Exit(self.registers.get(registers::R0))),
                [code] => Ok(Flow::Exit(self.value(code)?)),
                _ => Err("malformed operands for exit".to_string()),
            },
            Opcode::Nop => Ok(Flow::Next),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(MachineConfig::default())
    }
}

impl ExecutionEngine for Machine {
    fn init(&mut self) -> Result<()> {
        match &self.config_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn load(&mut self, source: &str) -> Result<()> {
        self.init()?;
        self.reset();
        let program = parse_program(source)?;
        debug!(instructions = program.len(), "program loaded");
        self.program = Some(program);
        Ok(())
    }

    fn step(&mut self) -> Result<StepOutcome> {
        let end = match &self.program {
            Some(program) => program.len() as i64,
            None => return Err(EngineError::NotLoaded),
        };
        if self.completed {
            return Ok(StepOutcome::Completed {
                exit_status: self.exit_status,
            });
        }
        if std::mem::take(&mut self.stop_requested) {
            debug!("stop request consumed");
            return Ok(StepOutcome::Stopped);
        }

        let pc = self.pc();
        if pc == end {
            let status = self.registers.get(registers::R0);
            self.finish(status);
            return Ok(StepOutcome::Completed {
                exit_status: Some(status),
            });
        }

        let instruction = match self.program.as_ref().and_then(|p| p.instructions.get(pc as usize)) {
            Some(instruction) if pc >= 0 => instruction.clone(),
            _ => {
                self.finish(FAULT_EXIT_STATUS);
                return Err(EngineError::Fault(format!("invalid program counter `{pc}`")));
            }
        };
        trace!(pc, line = instruction.line, opcode = ?instruction.opcode, "step");

        match self.execute(&instruction) {
            Ok(Flow::Next) => {
                self.registers.set(registers::PC, pc + 1);
                Ok(StepOutcome::Executed { pc: (pc + 1) as u64 })
            }
            Ok(Flow::Jump(target)) if (0..=end).contains(&target) => {
                self.registers.set(registers::PC, target);
                Ok(StepOutcome::Executed { pc: target as u64 })
            }
            Ok(Flow::Jump(target)) => {
                self.finish(FAULT_EXIT_STATUS);
                Err(EngineError::Fault(format!(
                    "line {}: invalid program counter `{target}`",
                    instruction.line
                )))
            }
            Ok(Flow::Wait) => Ok(StepOutcome::AwaitingInput),
            Ok(Flow::Exit(code)) => {
                self.registers.set(registers::R0, code);
                self.registers.set(registers::PC, pc + 1);
                let status = self.registers.get(registers::R0);
                self.finish(status);
                Ok(StepOutcome::Completed {
                    exit_status: Some(status),
                })
            }
            Err(message) => {
                self.finish(FAULT_EXIT_STATUS);
                Err(EngineError::Fault(format!("line {}: {message}", instruction.line)))
            }
        }
    }

    fn stop(&mut self) {
        if self.program.is_some() && !self.completed {
            self.stop_requested = true;
        }
    }

    fn reset(&mut self) {
        self.program = None;
        self.registers.reset();
        self.memory.reset();
        self.completed = false;
        self.exit_status = None;
        self.stop_requested = false;
        self.input.clear();
        self.initialize();
    }

    fn is_loaded(&self) -> bool {
        self.program.is_some()
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn exit_status(&self) -> Option<i64> {
        if self.completed {
            self.exit_status
        } else {
            None
        }
    }

    fn register_value(&self, name: &str) -> Result<i64> {
        self.registers
            .by_name(name)
            .ok_or_else(|| EngineError::UnknownRegister(name.to_string()))
    }

    fn register_names(&self) -> Vec<String> {
        REGISTER_NAMES.iter().map(|name| name.to_string()).collect()
    }

    fn register_values(&self) -> RegisterValues {
        self.registers.values()
    }

    fn memory_bounds(&self) -> MemoryBounds {
        self.memory.bounds()
    }

    fn memory_slice(&self, address: u64, length: u64) -> Result<Vec<u8>> {
        self.memory.slice(address, length).map(<[u8]>::to_vec)
    }

    fn word_size(&self) -> usize {
        self.config.word_size.bytes()
    }

    fn receive_input(&mut self, text: &str) {
        self.input.extend(text.chars());
        self.input.push_back('\n');
    }

    fn subscribe_print(&mut self, mut sink: PrintSink) {
        for text in self.unflushed.drain(..) {
            sink(&text);
        }
        self.print_sink = Some(sink);
    }
}
