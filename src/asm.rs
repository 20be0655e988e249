//! Assembly text parser.
//!
//! Parses the textual program format into a [`Program`] in two passes:
//! the first collects labels (a line ending in `:` binds a name to the
//! next instruction index), the second builds instructions and resolves
//! branch targets. Comments start with `#` or `;`; blank lines are
//! skipped; commas are interchangeable with whitespace.
//!
//! Parsing is all-or-nothing: any malformed line aborts the parse with a
//! [`SyntaxError`] naming that line, and no partial program escapes.

use std::collections::HashMap;

use thiserror::Error;

use crate::isa::{Instruction, Op, NUM_REGS};

/// Parse-time failure. Each variant carries the offending source line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unknown register '{token}' in: {line}")]
    UnknownRegister { token: String, line: String },

    #[error("malformed immediate '{token}' in: {line}")]
    BadImmediate { token: String, line: String },

    #[error("wrong operand count for '{op}' in: {line}")]
    BadArity { op: String, line: String },

    #[error("expected offset(base) address in: {line}")]
    BadAddress { line: String },

    #[error("unknown label '{label}' in: {line}")]
    UnknownLabel { label: String, line: String },

    #[error("branch target {target} outside program of length {len} in: {line}")]
    TargetOutOfRange {
        target: i64,
        len: usize,
        line: String,
    },

    #[error("unsupported op '{op}' in: {line}")]
    UnknownOpcode { op: String, line: String },

    #[error("empty label name")]
    EmptyLabel,
}

/// An ordered, immutable sequence of instructions. The program counter is
/// an index into this sequence; fetching past the end yields a bubble.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    insts: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn get(&self, pc: usize) -> Option<&Instruction> {
        self.insts.get(pc)
    }

    /// Fetch at `pc`, falling back to a bubble beyond the end.
    pub fn fetch(&self, pc: usize) -> Instruction {
        self.insts
            .get(pc)
            .cloned()
            .unwrap_or_else(Instruction::bubble)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.insts.iter()
    }
}

/// Strips a `#` or `;` comment and surrounding whitespace.
fn clean_line(line: &str) -> &str {
    line.split(['#', ';']).next().unwrap_or("").trim()
}

/// Resolves `x0`..`x31`, case-insensitive. Leading zeros and any other
/// spelling are rejected, matching the fixed register-name table.
fn parse_reg(tok: &str, line: &str) -> Result<usize, SyntaxError> {
    let err = || SyntaxError::UnknownRegister {
        token: tok.trim().to_string(),
        line: line.to_string(),
    };
    let t = tok.trim().to_ascii_lowercase();
    let digits = t.strip_prefix('x').ok_or_else(err)?;
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return Err(err());
    }
    let idx: usize = digits.parse().map_err(|_| err())?;
    if idx >= NUM_REGS {
        return Err(err());
    }
    Ok(idx)
}

/// Parses a decimal or `0x`-prefixed hex integer.
fn parse_int(tok: &str) -> Option<i64> {
    let t = tok.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        t.parse().ok()
    }
}

/// Splits an `offset(base)` address expression into its immediate and base
/// register. An empty offset means zero.
fn parse_address(tok: &str, line: &str) -> Result<(i64, usize), SyntaxError> {
    let (off_str, rest) = tok.split_once('(').ok_or_else(|| SyntaxError::BadAddress {
        line: line.to_string(),
    })?;
    let reg_str = rest
        .strip_suffix(')')
        .ok_or_else(|| SyntaxError::BadAddress {
            line: line.to_string(),
        })?;
    let imm = if off_str.trim().is_empty() {
        0
    } else {
        parse_int(off_str).ok_or_else(|| SyntaxError::BadImmediate {
            token: off_str.to_string(),
            line: line.to_string(),
        })?
    };
    let base = parse_reg(reg_str, line)?;
    Ok((imm, base))
}

/// Parses a full program. See the module docs for the accepted format.
pub fn parse_program(text: &str) -> Result<Program, SyntaxError> {
    let cleaned: Vec<&str> = text
        .lines()
        .map(clean_line)
        .filter(|l| !l.is_empty())
        .collect();

    // Pass 1: bind labels to instruction indices.
    let mut labels: HashMap<String, usize> = HashMap::new();
    let mut ops: Vec<&str> = Vec::new();
    for &line in &cleaned {
        if let Some(name) = line.strip_suffix(':') {
            let name = name.trim();
            if name.is_empty() {
                return Err(SyntaxError::EmptyLabel);
            }
            labels.insert(name.to_string(), ops.len());
        } else {
            ops.push(line);
        }
    }
    let len = ops.len();

    // Pass 2: build instructions, resolving branch targets.
    let mut insts = Vec::with_capacity(len);
    for (seq, line) in ops.into_iter().enumerate() {
        let spaced = line.replace(',', " ");
        let toks: Vec<&str> = spaced.split_whitespace().collect();
        let Some(&first) = toks.first() else {
            return Err(SyntaxError::UnknownOpcode {
                op: String::new(),
                line: line.to_string(),
            });
        };
        let op = first.to_ascii_lowercase();

        let arity = |expected: usize| -> Result<(), SyntaxError> {
            if toks.len() != expected {
                Err(SyntaxError::BadArity {
                    op: op.clone(),
                    line: line.to_string(),
                })
            } else {
                Ok(())
            }
        };

        let kind = match op.as_str() {
            "nop" => {
                arity(1)?;
                Op::Nop
            }
            "add" | "sub" => {
                arity(4)?;
                let rd = parse_reg(toks[1], line)?;
                let rs1 = parse_reg(toks[2], line)?;
                let rs2 = parse_reg(toks[3], line)?;
                if op == "add" {
                    Op::Add { rd, rs1, rs2 }
                } else {
                    Op::Sub { rd, rs1, rs2 }
                }
            }
            "lw" => {
                arity(3)?;
                let rd = parse_reg(toks[1], line)?;
                let (offset, base) = parse_address(toks[2], line)?;
                Op::Lw { rd, base, offset }
            }
            "sw" => {
                arity(3)?;
                let src = parse_reg(toks[1], line)?;
                let (offset, base) = parse_address(toks[2], line)?;
                Op::Sw { src, base, offset }
            }
            "beq" => {
                arity(4)?;
                let rs1 = parse_reg(toks[1], line)?;
                let rs2 = parse_reg(toks[2], line)?;
                let target = resolve_target(toks[3], &labels, len, line)?;
                Op::Beq { rs1, rs2, target }
            }
            _ => {
                return Err(SyntaxError::UnknownOpcode {
                    op: op.clone(),
                    line: line.to_string(),
                })
            }
        };

        insts.push(Instruction {
            op: kind,
            raw: line.to_string(),
            seq: seq as u32,
        });
    }

    Ok(Program { insts })
}

/// A branch target is a known label or a numeric absolute index; either
/// way it must land within `[0, len]` (`len` meaning "fall off the end").
fn resolve_target(
    tok: &str,
    labels: &HashMap<String, usize>,
    len: usize,
    line: &str,
) -> Result<usize, SyntaxError> {
    if let Some(&idx) = labels.get(tok) {
        return Ok(idx);
    }
    let value = parse_int(tok).ok_or_else(|| SyntaxError::UnknownLabel {
        label: tok.to_string(),
        line: line.to_string(),
    })?;
    if value < 0 || value as usize > len {
        return Err(SyntaxError::TargetOutOfRange {
            target: value,
            len,
            line: line.to_string(),
        });
    }
    Ok(value as usize)
}
