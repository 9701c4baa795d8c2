//! Register-based bytecode interpreter for compiled Lua 5.3 chunks.
//!
//! The engine consumes binary chunks produced by the reference compiler
//! (little-endian, 64-bit widths), materialises the prototype tree and
//! executes it with full support for closures, shared upvalue cells,
//! metatables, varargs, generic iteration and protected calls. Host
//! functions plug in through an index-based API on [`Interpreter`].
//!
//! [`Interpreter`]: crate::interpreter::Interpreter

pub mod chunk;
pub mod closure;
pub mod consts;
pub mod error;
pub mod interpreter;
pub mod number;
pub mod table;
pub mod value;

mod frame;
mod stdlib;

pub mod prelude {
    //! Single-import surface for embedders.

    pub use crescent_asm::{Instruction, OpMode, Opcode};

    pub use crate::chunk::{Prototype, UpvalDesc};
    pub use crate::closure::{Closure, Upvalue};
    pub use crate::consts::{REGISTRY_INDEX, RIDX_GLOBALS};
    pub use crate::error::{DecodeError, VmError};
    pub use crate::interpreter::{CallStatus, Interpreter};
    pub use crate::table::Table;
    pub use crate::value::{LuaType, Value};
}
