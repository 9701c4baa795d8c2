//! Runtime fault taxonomy.
//!
//! Every fault carries (or renders to) a value; `pcall` reports that value
//! to the protected caller. Faults unwind through the dispatch loop as
//! `Err` results until a protection point or the top-level call consumes
//! them.

use thiserror::Error;

use crate::value::Value;

/// Faults raised while decoding or executing a chunk.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// An operation was applied to a value of the wrong type: arithmetic on
    /// non-numerics, indexing a non-table without `__index`, calling a
    /// non-function without `__call`, and friends.
    #[error("{0}")]
    Type(String),
    /// A `next` cursor names a key absent from the iteration snapshot.
    #[error("invalid key to next")]
    InvalidNextKey,
    /// The binary chunk was rejected.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A library argument check failed.
    #[error("bad argument #{arg} ({msg})")]
    Argument {
        /// One-based argument position.
        arg: usize,
        /// Failure description.
        msg: String,
    },
    /// Raised by the `error` library function with an arbitrary value.
    #[error("{0}")]
    User(Value),
}

impl VmError {
    /// The value pushed at a protection point for this fault.
    pub fn fault_value(&self) -> Value {
        match self {
            Self::User(v) => v.clone(),
            other => Value::from(other.to_string()),
        }
    }
}

/// Chunk decoding failures: one variant per header field, plus stream
/// shape and tag errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The four-byte signature is absent.
    #[error("input is not a compiled chunk")]
    Signature,
    /// The chunk was produced by an unsupported compiler version.
    #[error("unsupported chunk version {0:#04x}")]
    Version(u8),
    /// The chunk format byte is non-zero.
    #[error("unsupported chunk format {0}")]
    Format(u8),
    /// The conversion-catching data tail is corrupted.
    #[error("corrupted chunk tail")]
    Tail,
    /// The C `int` width differs from the expected 4 bytes.
    #[error("C int width mismatch: {0}")]
    CIntSize(u8),
    /// The `size_t` width differs from the expected 8 bytes.
    #[error("size_t width mismatch: {0}")]
    SizeTSize(u8),
    /// The instruction width differs from the expected 4 bytes.
    #[error("instruction width mismatch: {0}")]
    InstructionSize(u8),
    /// The integer width differs from the expected 8 bytes.
    #[error("integer width mismatch: {0}")]
    IntegerSize(u8),
    /// The number width differs from the expected 8 bytes.
    #[error("number width mismatch: {0}")]
    NumberSize(u8),
    /// The endianness-check integer does not read back as `0x5678`.
    #[error("endianness check failed: {0:#x}")]
    Endianness(i64),
    /// The float-format check constant does not read back as `370.5`.
    #[error("float format check failed: {0}")]
    FloatFormat(f64),
    /// The stream ended inside a structure.
    #[error("unexpected end of chunk")]
    UnexpectedEof,
    /// A constant carries an unknown tag byte.
    #[error("unknown constant tag {0:#04x}")]
    ConstantTag(u8),
    /// An instruction carries an unknown opcode.
    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),
}
