//! SSA instructions and their identifiers.
//!
//! An [`Instruction`] is an immutable-identity record representing one SSA
//! value/operation. The identifier is assigned at creation and stays fixed
//! until the end-of-program renumbering pass; equality is identity equality on
//! the id alone - opcodes and operands never factor in. Operands are
//! ownership-free references to other instructions by [`InstrId`], which keeps
//! the cyclic block graph free of ownership cycles.

use std::fmt;

use strum::Display;

/// Unique identifier for an SSA instruction.
///
/// SSA numbering is program-global, not per-block: a single monotonically
/// increasing counter on the block graph hands these out. Gaps can appear when
/// instructions are eliminated; the final renumbering pass closes them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(usize);

impl InstrId {
    /// Creates a new instruction identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0)
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0)
    }
}

/// The operation tag of an SSA instruction.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Division.
    Div,
    /// Comparison; branches reference its result.
    Cmp,

    /// Address arithmetic for an array access: base plus scaled offset.
    Adda,
    /// Memory read through an `adda` address.
    Load,
    /// Memory write: `x` is the stored value, `y` the `adda` address.
    Store,
    /// Phi function at a control-flow join.
    Phi,

    /// Program end marker.
    End,
    /// Unconditional branch; target instruction id in `x`.
    Bra,
    /// Branch if not equal.
    Bne,
    /// Branch if equal.
    Beq,
    /// Branch if less or equal.
    Ble,
    /// Branch if less.
    Blt,
    /// Branch if greater or equal.
    Bge,
    /// Branch if greater.
    Bgt,
    /// Call of a (stubbed) user-defined function.
    Jsr,
    /// Return from the current function.
    Ret,

    /// Read a number from input.
    Read,
    /// Write a number to output.
    Write,
    /// Write a newline to output.
    WriteNl,

    /// Invalidates cached loads of an array after a store in a branch.
    Kill,
    /// Base address of a declared array (lives in the constant block).
    Base,
    /// Placeholder instruction; used to give an empty else block a branch
    /// target.
    Nop,
    /// Interned compile-time constant (lives in the constant block).
    Const,
}

impl Opcode {
    /// Returns `true` for the conditional relational branches (`BNE`..`BGT`).
    #[must_use]
    pub const fn is_conditional_branch(&self) -> bool {
        matches!(
            self,
            Opcode::Bne | Opcode::Beq | Opcode::Ble | Opcode::Blt | Opcode::Bge | Opcode::Bgt
        )
    }

    /// Returns `true` for any branch, conditional or not.
    #[must_use]
    pub const fn is_branch(&self) -> bool {
        matches!(self, Opcode::Bra) || self.is_conditional_branch()
    }

    /// Returns `true` if this operation must never be deduplicated by CSE.
    ///
    /// Branches and phis are control flow, READ/WRITE/WRITE_NL/JSR have
    /// observable effects, RET terminates, and KILL/NOP/END are bookkeeping.
    /// Constants and bases are interned through their own pools instead.
    #[must_use]
    pub const fn is_cse_exempt(&self) -> bool {
        self.is_branch()
            || matches!(
                self,
                Opcode::Phi
                    | Opcode::Read
                    | Opcode::Write
                    | Opcode::WriteNl
                    | Opcode::Jsr
                    | Opcode::Ret
                    | Opcode::Kill
                    | Opcode::Nop
                    | Opcode::End
                    | Opcode::Const
                    | Opcode::Base
            )
    }
}

/// Key for the dominance-scoped CSE tables: operation plus both operands.
pub type CseKey = (Opcode, Option<InstrId>, Option<InstrId>);

/// One SSA instruction.
///
/// Mutated in place only to patch `x`/`y` after creation - when a branch
/// target or phi source becomes known later, or when CSE substitutes an
/// operand. Never copied between blocks.
///
/// The `x_var`/`y_var` tags record the source variable an operand was read
/// from; they are diagnostics/printing aids only and carry no semantics.
#[derive(Debug, Clone)]
pub struct Instruction {
    id: InstrId,
    op: Opcode,
    /// First operand; for `BRA` this is the branch target.
    pub(crate) x: Option<InstrId>,
    /// Second operand; for conditional branches this is the branch target.
    pub(crate) y: Option<InstrId>,
    /// Source variable name behind `x`, if the operand was a direct variable read.
    pub(crate) x_var: Option<String>,
    /// Source variable name behind `y`, if the operand was a direct variable read.
    pub(crate) y_var: Option<String>,
    /// Embedded value when this instruction denotes a compile-time constant.
    constant: Option<i64>,
    /// Array this instruction addresses (`ADDA`/`LOAD`/`STORE`/`KILL`/`BASE`).
    pub(crate) array: Option<String>,
}

impl Instruction {
    /// Creates a new instruction.
    #[must_use]
    pub fn new(id: InstrId, op: Opcode, x: Option<InstrId>, y: Option<InstrId>) -> Self {
        Self {
            id,
            op,
            x,
            y,
            x_var: None,
            y_var: None,
            constant: None,
            array: None,
        }
    }

    /// Creates an interned constant instruction.
    #[must_use]
    pub fn constant(id: InstrId, value: i64) -> Self {
        Self {
            id,
            op: Opcode::Const,
            x: None,
            y: None,
            x_var: None,
            y_var: None,
            constant: Some(value),
            array: None,
        }
    }

    /// Returns the instruction identifier.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    /// Returns the operation tag.
    #[must_use]
    pub const fn op(&self) -> Opcode {
        self.op
    }

    /// Returns the first operand.
    #[must_use]
    pub const fn x(&self) -> Option<InstrId> {
        self.x
    }

    /// Returns the second operand.
    #[must_use]
    pub const fn y(&self) -> Option<InstrId> {
        self.y
    }

    /// Returns the embedded constant value, if any.
    #[must_use]
    pub const fn constant_value(&self) -> Option<i64> {
        self.constant
    }

    /// Returns the array name this instruction addresses, if any.
    #[must_use]
    pub fn array(&self) -> Option<&str> {
        self.array.as_deref()
    }

    /// Returns the source variable tag of the first operand, if any.
    #[must_use]
    pub fn x_var(&self) -> Option<&str> {
        self.x_var.as_deref()
    }

    /// Returns the source variable tag of the second operand, if any.
    #[must_use]
    pub fn y_var(&self) -> Option<&str> {
        self.y_var.as_deref()
    }

    /// Returns the CSE table key for this instruction.
    #[must_use]
    pub const fn cse_key(&self) -> CseKey {
        (self.op, self.x, self.y)
    }

    /// Returns `true` if this is a reserved phi whose operands were never
    /// resolved.
    #[must_use]
    pub const fn is_unfilled_phi(&self) -> bool {
        matches!(self.op, Opcode::Phi) && self.x.is_none() && self.y.is_none()
    }

    /// Returns the operands that are value references (as opposed to branch
    /// targets): both for ordinary operations, only `x` for conditional
    /// branches, neither for `BRA`.
    #[must_use]
    pub fn value_operands(&self) -> (Option<InstrId>, Option<InstrId>) {
        if self.op == Opcode::Bra {
            (None, None)
        } else if self.op.is_conditional_branch() {
            (self.x, None)
        } else {
            (self.x, self.y)
        }
    }

    pub(crate) fn renumber(&mut self, map: &impl Fn(InstrId) -> InstrId) {
        self.id = map(self.id);
        self.x = self.x.map(map);
        self.y = self.y.map(map);
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Instruction {}

impl std::hash::Hash for Instruction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id.index(), self.op)?;
        if let Some(value) = self.constant {
            return write!(f, " #{value}");
        }
        if self.op == Opcode::Base {
            if let Some(array) = &self.array {
                return write!(f, " {array}");
            }
        }
        if let Some(x) = self.x {
            write!(f, " {x}")?;
        }
        if let Some(y) = self.y {
            write!(f, " {y}")?;
        }
        Ok(())
    }
}
