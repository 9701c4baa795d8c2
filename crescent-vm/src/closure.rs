//! Closures and the upvalue cells they capture.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::chunk::Prototype;
use crate::error::VmError;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Host callback: receives the engine and returns how many results it left
/// on top of its frame.
pub type HostFn = Rc<dyn Fn(&mut Interpreter) -> Result<usize, VmError>>;

/// A one-slot indirection shared by every closure capturing the same
/// variable.
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Aliases a live register of the frame identified by `frame`.
    Open {
        /// Owning frame id.
        frame: u64,
        /// Register index within that frame.
        index: usize,
    },
    /// Detached from any frame; the cell owns the value.
    Closed(Value),
}

/// Shared handle to an upvalue cell.
pub type UpvalueRef = Rc<RefCell<Upvalue>>;

/// Create a cell already holding a value.
pub fn closed_upvalue(v: Value) -> UpvalueRef {
    Rc::new(RefCell::new(Upvalue::Closed(v)))
}

/// The two closure shapes.
#[derive(Clone)]
pub enum ClosureKind {
    /// Instantiated from a chunk prototype.
    Lua(Rc<Prototype>),
    /// Host callback.
    Host(HostFn),
}

/// A callable value: a prototype or host callback plus its upvalue
/// bindings. Immutable after construction; the cells may still mutate.
#[derive(Clone)]
pub struct Closure {
    pub(crate) kind: ClosureKind,
    pub(crate) upvalues: Vec<UpvalueRef>,
}

impl Closure {
    /// Closure over a prototype with the given upvalue bindings.
    pub fn from_proto(proto: Rc<Prototype>, upvalues: Vec<UpvalueRef>) -> Self {
        Self {
            kind: ClosureKind::Lua(proto),
            upvalues,
        }
    }

    /// Closure over a host callback.
    pub fn from_host(f: HostFn, upvalues: Vec<UpvalueRef>) -> Self {
        Self {
            kind: ClosureKind::Host(f),
            upvalues,
        }
    }

    /// The prototype, for scripted closures.
    pub fn proto(&self) -> Option<&Rc<Prototype>> {
        match &self.kind {
            ClosureKind::Lua(p) => Some(p),
            ClosureKind::Host(_) => None,
        }
    }

    /// Upvalue cell at `index`.
    pub(crate) fn upvalue(&self, index: usize) -> Option<UpvalueRef> {
        self.upvalues.get(index).cloned()
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ClosureKind::Lua(p) => f
                .debug_struct("Closure")
                .field("source", &p.source)
                .field("upvalues", &self.upvalues.len())
                .finish(),
            ClosureKind::Host(_) => f
                .debug_struct("Closure")
                .field("host", &true)
                .field("upvalues", &self.upvalues.len())
                .finish(),
        }
    }
}
