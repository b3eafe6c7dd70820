//! SSA intermediate representation: instructions, basic blocks, the block
//! graph and the on-the-fly SSA builder.
//!
//! The IR is built *while parsing*: the parser drives an [`SsaBuilder`] for
//! each language construct, which allocates blocks and instructions from the
//! [`BlockGraph`], inserts phi functions at `if`/`while` joins as assignments
//! are seen, and performs dominance-scoped common-subexpression elimination as
//! instructions are emitted. Loop bodies get a deferred treatment: once the
//! outermost `while` of a nest closes, the fix-up passes rewrite loop-carried
//! operands through the header phis and run CSE across the loop, and at end of
//! program all surviving instructions are renumbered into a dense range.
//!
//! # Module organization
//!
//! - [`instruction`] - [`Instruction`], [`InstrId`], [`Opcode`]
//! - [`block`] - [`BasicBlock`], [`BlockId`], [`BlockRelation`], [`BlockFlags`]
//! - [`graph`] - [`BlockGraph`], the arena and numbering authority
//! - [`builder`] - [`SsaBuilder`], the construction protocols
//! - [`fixup`] - the loop fix-up passes and final renumbering
//! - [`dot`] - Graphviz rendering of a finished graph

mod block;
mod builder;
mod dot;
mod fixup;
mod graph;
mod instruction;

pub use block::{BasicBlock, BlockFlags, BlockId, BlockRelation};
pub use builder::{SsaBuilder, Value};
pub use dot::render_dot;
pub use graph::{BlockGraph, Emitted, LeafJoinKind};
pub use instruction::{CseKey, InstrId, Instruction, Opcode};
