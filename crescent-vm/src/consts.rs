//! Engine parameters and well-known indices.

/// Upper bound for stack growth within a single frame.
pub const MAX_STACK: isize = 1_000_000;

/// Pseudo-index addressing the registry table. Anything more negative
/// addresses an upvalue of the running closure.
pub const REGISTRY_INDEX: isize = -MAX_STACK - 1000;

/// Registry key under which the globals table lives.
pub const RIDX_GLOBALS: i64 = 2;

/// Registry key prefix for the per-type metatables of non-table values;
/// the type tag is appended (e.g. `_MT5` for strings).
pub(crate) const TYPE_METATABLE_PREFIX: &str = "_MT";

/// Bound on `__index`/`__newindex` chains before the engine gives up.
pub(crate) const MAX_META_DEPTH: usize = 100;
