//! Binary chunk decoding into the prototype tree.
//!
//! The accepted image is the little-endian 64-bit layout emitted by the
//! reference 5.3 compiler for AMD64: a fixed header, one byte counting the
//! main closure's upvalues, then the recursively nested prototypes.

use std::rc::Rc;

use crescent_asm::{Instruction, Opcode};
use tracing::debug;

use crate::error::DecodeError;
use crate::value::Value;

const SIGNATURE: &[u8] = b"\x1bLua";
const VERSION: u8 = 0x53;
const FORMAT: u8 = 0;
const TAIL: &[u8] = b"\x19\x93\r\n\x1a\n";
const C_INT_SIZE: u8 = 4;
const SIZE_T_SIZE: u8 = 8;
const INSTRUCTION_SIZE: u8 = 4;
const INTEGER_SIZE: u8 = 8;
const NUMBER_SIZE: u8 = 8;
const CHECK_INT: i64 = 0x5678;
const CHECK_NUMBER: f64 = 370.5;

const TAG_NIL: u8 = 0x00;
const TAG_BOOLEAN: u8 = 0x01;
const TAG_NUMBER: u8 = 0x03;
const TAG_INTEGER: u8 = 0x13;
const TAG_SHORT_STR: u8 = 0x04;
const TAG_LONG_STR: u8 = 0x14;

/// Upvalue descriptor of a prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalDesc {
    /// Whether the captured variable lives in the enclosing frame's
    /// registers (as opposed to the enclosing closure's upvalues).
    pub in_stack: bool,
    /// Register or upvalue index, depending on `in_stack`.
    pub index: u8,
}

/// Local-variable debug record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocVar {
    /// Variable name.
    pub name: String,
    /// First instruction where the variable is live.
    pub start_pc: u32,
    /// First instruction where the variable is dead.
    pub end_pc: u32,
}

/// An immutable function prototype, shared by every closure instantiated
/// from it.
#[derive(Debug)]
pub struct Prototype {
    /// Source name; empty names inherit the parent's.
    pub source: Rc<str>,
    /// Line of the enclosing `function` keyword.
    pub line_defined: u32,
    /// Line of the matching `end`.
    pub last_line_defined: u32,
    /// Declared parameter count.
    pub num_params: u8,
    /// Whether the function accepts varargs.
    pub is_vararg: bool,
    /// Register count the code was compiled against.
    pub max_stack_size: u8,
    /// Instruction vector.
    pub code: Vec<Instruction>,
    /// Constant pool.
    pub constants: Vec<Value>,
    /// Upvalue descriptors.
    pub upvalues: Vec<UpvalDesc>,
    /// Nested prototypes.
    pub protos: Vec<Rc<Prototype>>,
    /// Per-instruction line numbers.
    pub line_info: Vec<u32>,
    /// Local-variable debug records.
    pub loc_vars: Vec<LocVar>,
    /// Upvalue names.
    pub upvalue_names: Vec<String>,
}

impl Default for Prototype {
    fn default() -> Self {
        Self {
            source: Rc::from(""),
            line_defined: 0,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2,
            code: Vec::new(),
            constants: Vec::new(),
            upvalues: Vec::new(),
            protos: Vec::new(),
            line_info: Vec::new(),
            loc_vars: Vec::new(),
            upvalue_names: Vec::new(),
        }
    }
}

/// Decode a binary chunk into its root prototype.
pub fn decode(bytes: &[u8]) -> Result<Prototype, DecodeError> {
    let mut r = ChunkReader { bytes, pos: 0 };
    r.check_header()?;
    r.read_byte()?; // upvalue count of the main closure
    let proto = r.read_proto(&Rc::from(""))?;
    debug!(source = %proto.source, "chunk decoded");
    Ok(proto)
}

struct ChunkReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).ok_or(DecodeError::UnexpectedEof)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(DecodeError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.read_bytes(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_integer(&mut self) -> Result<i64, DecodeError> {
        Ok(self.read_u64()? as i64)
    }

    fn read_number(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Length-prefixed string: a zero byte is the null string, `0xff`
    /// switches to a 64-bit length, anything else is the length itself.
    /// The stored length counts one more than the body.
    fn read_string(&mut self) -> Result<Vec<u8>, DecodeError> {
        let size = match self.read_byte()? {
            0x00 => return Ok(Vec::new()),
            0xff => self.read_u64()? as usize,
            n => n as usize,
        };
        let body = size.checked_sub(1).ok_or(DecodeError::UnexpectedEof)?;
        Ok(self.read_bytes(body)?.to_vec())
    }

    fn check_header(&mut self) -> Result<(), DecodeError> {
        if self.read_bytes(4)? != SIGNATURE {
            return Err(DecodeError::Signature);
        }
        let version = self.read_byte()?;
        if version != VERSION {
            return Err(DecodeError::Version(version));
        }
        let format = self.read_byte()?;
        if format != FORMAT {
            return Err(DecodeError::Format(format));
        }
        if self.read_bytes(6)? != TAIL {
            return Err(DecodeError::Tail);
        }
        let c_int = self.read_byte()?;
        if c_int != C_INT_SIZE {
            return Err(DecodeError::CIntSize(c_int));
        }
        let size_t = self.read_byte()?;
        if size_t != SIZE_T_SIZE {
            return Err(DecodeError::SizeTSize(size_t));
        }
        let instruction = self.read_byte()?;
        if instruction != INSTRUCTION_SIZE {
            return Err(DecodeError::InstructionSize(instruction));
        }
        let integer = self.read_byte()?;
        if integer != INTEGER_SIZE {
            return Err(DecodeError::IntegerSize(integer));
        }
        let number = self.read_byte()?;
        if number != NUMBER_SIZE {
            return Err(DecodeError::NumberSize(number));
        }
        let check_int = self.read_integer()?;
        if check_int != CHECK_INT {
            return Err(DecodeError::Endianness(check_int));
        }
        let check_number = self.read_number()?;
        if check_number != CHECK_NUMBER {
            return Err(DecodeError::FloatFormat(check_number));
        }
        Ok(())
    }

    fn read_proto(&mut self, parent_source: &Rc<str>) -> Result<Prototype, DecodeError> {
        let name = self.read_string()?;
        let source: Rc<str> = if name.is_empty() {
            parent_source.clone()
        } else {
            Rc::from(String::from_utf8_lossy(&name).as_ref())
        };
        let line_defined = self.read_u32()?;
        let last_line_defined = self.read_u32()?;
        let num_params = self.read_byte()?;
        let is_vararg = self.read_byte()? != 0;
        let max_stack_size = self.read_byte()?;
        let code = self.read_code()?;
        let constants = self.read_constants()?;
        let upvalues = self.read_upvalues()?;
        let protos = self.read_protos(&source)?;
        let line_info = self.read_line_info()?;
        let loc_vars = self.read_loc_vars()?;
        let upvalue_names = self.read_upvalue_names()?;
        Ok(Prototype {
            source,
            line_defined,
            last_line_defined,
            num_params,
            is_vararg,
            max_stack_size,
            code,
            constants,
            upvalues,
            protos,
            line_info,
            loc_vars,
            upvalue_names,
        })
    }

    fn read_code(&mut self) -> Result<Vec<Instruction>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut code = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            let instruction = Instruction::new(self.read_u32()?);
            if Opcode::try_from(instruction.op()).is_err() {
                return Err(DecodeError::UnknownOpcode(instruction.op()));
            }
            code.push(instruction);
        }
        Ok(code)
    }

    fn read_constants(&mut self) -> Result<Vec<Value>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut constants = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            constants.push(self.read_constant()?);
        }
        Ok(constants)
    }

    fn read_constant(&mut self) -> Result<Value, DecodeError> {
        match self.read_byte()? {
            TAG_NIL => Ok(Value::Nil),
            TAG_BOOLEAN => Ok(Value::Boolean(self.read_byte()? != 0)),
            TAG_INTEGER => Ok(Value::Integer(self.read_integer()?)),
            TAG_NUMBER => Ok(Value::Float(self.read_number()?)),
            TAG_SHORT_STR | TAG_LONG_STR => Ok(Value::from(self.read_string()?.as_slice())),
            tag => Err(DecodeError::ConstantTag(tag)),
        }
    }

    fn read_upvalues(&mut self) -> Result<Vec<UpvalDesc>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut upvalues = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            upvalues.push(UpvalDesc {
                in_stack: self.read_byte()? != 0,
                index: self.read_byte()?,
            });
        }
        Ok(upvalues)
    }

    fn read_protos(&mut self, source: &Rc<str>) -> Result<Vec<Rc<Prototype>>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut protos = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            protos.push(Rc::new(self.read_proto(source)?));
        }
        Ok(protos)
    }

    fn read_line_info(&mut self) -> Result<Vec<u32>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut lines = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            lines.push(self.read_u32()?);
        }
        Ok(lines)
    }

    fn read_loc_vars(&mut self) -> Result<Vec<LocVar>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut vars = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            let name = self.read_string()?;
            vars.push(LocVar {
                name: String::from_utf8_lossy(&name).into_owned(),
                start_pc: self.read_u32()?,
                end_pc: self.read_u32()?,
            });
        }
        Ok(vars)
    }

    fn read_upvalue_names(&mut self) -> Result<Vec<String>, DecodeError> {
        let len = self.read_u32()? as usize;
        let mut names = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            let name = self.read_string()?;
            names.push(String::from_utf8_lossy(&name).into_owned());
        }
        Ok(names)
    }
}
