//! Assembly parser for the reference machine.
//!
//! A program is a sequence of lines. Each line may start with one label
//! definition and may hold one instruction. Labels resolve to the index of the
//! next instruction, so they cost no step.

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::lexer::{tokenize_line, Token};
use crate::registers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Move,
    Load,
    Store,
    Jump,
    Beq,
    Bne,
    Blt,
    Bgt,
    PrintI,
    PrintC,
    PrintS,
    ReadI,
    ReadC,
    Exit,
    Nop,
}

impl Opcode {
    fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        let opcode = match mnemonic.to_ascii_lowercase().as_str() {
            "add" => Opcode::Add,
            "sub" => Opcode::Sub,
            "mul" => Opcode::Mul,
            "div" => Opcode::Div,
            "rem" => Opcode::Rem,
            "and" => Opcode::And,
            "or" => Opcode::Or,
            "xor" => Opcode::Xor,
            "sll" => Opcode::Sll,
            "srl" => Opcode::Srl,
            "move" => Opcode::Move,
            "load" => Opcode::Load,
            "store" => Opcode::Store,
            "jump" => Opcode::Jump,
            "beq" => Opcode::Beq,
            "bne" => Opcode::Bne,
            "blt" => Opcode::Blt,
            "bgt" => Opcode::Bgt,
            "printi" => Opcode::PrintI,
            "printc" => Opcode::PrintC,
            "prints" => Opcode::PrintS,
            "readi" => Opcode::ReadI,
            "readc" => Opcode::ReadC,
            "exit" => Opcode::Exit,
            "nop" => Opcode::Nop,
            _ => return None,
        };
        Some(opcode)
    }

    /// Operand shapes accepted by each opcode, one slice per accepted arity.
    fn signatures(self) -> &'static [&'static [Kind]] {
        use Kind::*;
        match self {
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Sll
            | Opcode::Srl => &[&[Register, Value], &[Register, Value, Value]],
            Opcode::Move | Opcode::Load => &[&[Register, Value]],
            Opcode::Store => &[&[Value, Value]],
            Opcode::Jump => &[&[Value]],
            Opcode::Beq | Opcode::Bne | Opcode::Blt | Opcode::Bgt => &[&[Value, Value, Value]],
            Opcode::PrintI | Opcode::PrintC => &[&[Value]],
            Opcode::PrintS => &[&[Text]],
            Opcode::ReadI | Opcode::ReadC => &[&[Register]],
            Opcode::Exit => &[&[], &[Value]],
            Opcode::Nop => &[&[]],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Register,
    Value,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Register(usize),
    Immediate(i64),
    Label(String),
    Text(String),
}

impl Operand {
    fn fits(&self, kind: Kind) -> bool {
        match kind {
            Kind::Register => matches!(self, Operand::Register(_)),
            Kind::Value => !matches!(self, Operand::Text(_)),
            Kind::Text => matches!(self, Operand::Text(_)),
        }
    }

    fn describe(&self) -> String {
        match self {
            Operand::Register(index) => format!("${}", registers::REGISTER_NAMES[*index]),
            Operand::Immediate(value) => value.to_string(),
            Operand::Label(label) => label.clone(),
            Operand::Text(text) => format!("{text:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    /// 1-based source line.
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub labels: HashMap<String, usize>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

fn load_error(line: usize, message: impl Into<String>) -> EngineError {
    EngineError::Load {
        line,
        message: message.into(),
    }
}

fn operand(token: Token, line: usize) -> Result<Operand> {
    match token {
        Token::Integer(value) => Ok(Operand::Immediate(value)),
        Token::Char(c) => Ok(Operand::Immediate(c as i64)),
        Token::String(text) => Ok(Operand::Text(text)),
        Token::Word(word) => match registers::index_of(&word) {
            Some(index) => Ok(Operand::Register(index)),
            None if word.starts_with('$') => {
                Err(load_error(line, format!("unrecognized register `{word}`")))
            }
            None => Ok(Operand::Label(word)),
        },
        Token::Colon => Err(load_error(line, "unexpected `:`")),
    }
}

/// Parse a whole program.
pub fn parse_program(source: &str) -> Result<Program> {
    let mut program = Program::default();
    let mut references: Vec<(String, usize)> = Vec::new();

    for (offset, text) in source.lines().enumerate() {
        let line = offset + 1;
        let mut tokens = tokenize_line(text)
            .map_err(|slice| load_error(line, format!("unrecognized token `{slice}`")))?
            .into_iter()
            .peekable();

        let mut head = tokens.next();
        if let Some(Token::Word(label)) = &head {
            if tokens.peek() == Some(&Token::Colon) {
                tokens.next();
                if program.labels.contains_key(label) {
                    return Err(load_error(line, format!("label `{label}` is already in use")));
                }
                program.labels.insert(label.clone(), program.instructions.len());
                head = tokens.next();
            }
        }

        let mnemonic = match head {
            None => continue,
            Some(Token::Word(word)) => word,
            Some(other) => return Err(load_error(line, format!("expected instruction, found {other:?}"))),
        };
        let opcode = Opcode::from_mnemonic(&mnemonic)
            .ok_or_else(|| load_error(line, format!("invalid given instruction `{mnemonic}`")))?;

        let operands = tokens
            .map(|token| operand(token, line))
            .collect::<Result<Vec<_>>>()?;

        let signature = opcode
            .signatures()
            .iter()
            .find(|signature| signature.len() == operands.len())
            .ok_or_else(|| {
                load_error(
                    line,
                    format!("instruction `{mnemonic}` does not accept {} arguments", operands.len()),
                )
            })?;
        for (index, (operand, kind)) in operands.iter().zip(signature.iter()).enumerate() {
            if !operand.fits(*kind) {
                return Err(load_error(
                    line,
                    format!(
                        "instruction `{mnemonic}` cannot accept argument `{}` at index {index}",
                        operand.describe()
                    ),
                ));
            }
            if let Operand::Label(label) = operand {
                references.push((label.clone(), line));
            }
        }

        program.instructions.push(Instruction {
            opcode,
            operands,
            line,
        });
    }

    for (label, line) in references {
        if !program.labels.contains_key(&label) {
            return Err(load_error(line, format!("label `{label}` does not exist")));
        }
    }

    Ok(program)
}
