use num_enum::TryFromPrimitive;

/// Operand layout of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpMode {
    /// Three operands `A`, `B`, `C`.
    ABC,
    /// `A` plus an 18-bit unsigned `Bx`.
    ABx,
    /// `A` plus an 18-bit signed `sBx`.
    AsBx,
    /// A single 26-bit `Ax`.
    Ax,
}

/// The opcode repertoire, one variant per 6-bit code.
///
/// Register transfer notation in the per-variant docs: `R(A)` is register
/// `A` of the current frame, `Kst(x)` a constant-pool entry, `RK(x)` either
/// depending on the operand's constant bit, `Up[x]` an upvalue of the
/// running closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
#[repr(u8)]
pub enum Opcode {
    /// `R(A) := R(B)`
    Move = 0x00,
    /// `R(A) := Kst(Bx)`
    LoadK = 0x01,
    /// `R(A) := Kst(extra arg)`; consumes a following `EXTRAARG`
    LoadKx = 0x02,
    /// `R(A) := (bool)B; if C, pc++`
    LoadBool = 0x03,
    /// `R(A), ..., R(A+B) := nil`
    LoadNil = 0x04,
    /// `R(A) := Up[B]`
    GetUpval = 0x05,
    /// `R(A) := Up[B][RK(C)]`
    GetTabUp = 0x06,
    /// `R(A) := R(B)[RK(C)]`
    GetTable = 0x07,
    /// `Up[A][RK(B)] := RK(C)`
    SetTabUp = 0x08,
    /// `Up[B] := R(A)`
    SetUpval = 0x09,
    /// `R(A)[RK(B)] := RK(C)`
    SetTable = 0x0a,
    /// `R(A) := {}` with size hints decoded from `B` and `C`
    NewTable = 0x0b,
    /// `R(A+1) := R(B); R(A) := R(B)[RK(C)]`
    #[strum(serialize = "SELF")]
    Self_ = 0x0c,
    /// `R(A) := RK(B) + RK(C)`
    Add = 0x0d,
    /// `R(A) := RK(B) - RK(C)`
    Sub = 0x0e,
    /// `R(A) := RK(B) * RK(C)`
    Mul = 0x0f,
    /// `R(A) := RK(B) % RK(C)`
    Mod = 0x10,
    /// `R(A) := RK(B) ^ RK(C)`
    Pow = 0x11,
    /// `R(A) := RK(B) / RK(C)`
    Div = 0x12,
    /// `R(A) := RK(B) // RK(C)`
    IDiv = 0x13,
    /// `R(A) := RK(B) & RK(C)`
    BAnd = 0x14,
    /// `R(A) := RK(B) | RK(C)`
    BOr = 0x15,
    /// `R(A) := RK(B) ~ RK(C)`
    BXor = 0x16,
    /// `R(A) := RK(B) << RK(C)`
    Shl = 0x17,
    /// `R(A) := RK(B) >> RK(C)`
    Shr = 0x18,
    /// `R(A) := -R(B)`
    Unm = 0x19,
    /// `R(A) := ~R(B)`
    BNot = 0x1a,
    /// `R(A) := not R(B)`
    Not = 0x1b,
    /// `R(A) := length of R(B)`
    Len = 0x1c,
    /// `R(A) := R(B).. ... ..R(C)`
    Concat = 0x1d,
    /// `pc += sBx`; if `A != 0`, close upvalues from `A-1`
    Jmp = 0x1e,
    /// `if (RK(B) == RK(C)) != A, pc++`
    Eq = 0x1f,
    /// `if (RK(B) < RK(C)) != A, pc++`
    Lt = 0x20,
    /// `if (RK(B) <= RK(C)) != A, pc++`
    Le = 0x21,
    /// `if bool(R(A)) != C, pc++`
    Test = 0x22,
    /// `if bool(R(B)) == C, R(A) := R(B); else pc++`
    TestSet = 0x23,
    /// `R(A), ..., R(A+C-2) := R(A)(R(A+1), ..., R(A+B-1))`
    Call = 0x24,
    /// `return R(A)(R(A+1), ..., R(A+B-1))`
    TailCall = 0x25,
    /// `return R(A), ..., R(A+B-2)`
    Return = 0x26,
    /// `R(A) += R(A+2); if loop holds, pc += sBx and R(A+3) := R(A)`
    ForLoop = 0x27,
    /// `R(A) -= R(A+2); pc += sBx`
    ForPrep = 0x28,
    /// `R(A+3), ..., R(A+2+C) := R(A)(R(A+1), R(A+2))`
    TForCall = 0x29,
    /// `if R(A+1) != nil, R(A) := R(A+1) and pc += sBx`
    TForLoop = 0x2a,
    /// `R(A)[(C-1)*FPF + i] := R(A+i), 1 <= i <= B`
    SetList = 0x2b,
    /// `R(A) := closure(KPROTO[Bx])`
    Closure = 0x2c,
    /// `R(A), ..., R(A+B-2) := vararg`
    Vararg = 0x2d,
    /// Extra 26-bit operand for the previous instruction
    ExtraArg = 0x2e,
}

impl Opcode {
    /// Operand layout of this opcode.
    pub const fn mode(self) -> OpMode {
        match self {
            Self::LoadK | Self::LoadKx | Self::Closure => OpMode::ABx,
            Self::Jmp | Self::ForLoop | Self::ForPrep | Self::TForLoop => OpMode::AsBx,
            Self::ExtraArg => OpMode::Ax,
            _ => OpMode::ABC,
        }
    }
}
