//! On-the-fly SSA construction.
//!
//! [`SsaBuilder`] is the surface the grammar driver talks to. Every language
//! construct maps to a short protocol of calls (`open_if` / `enter_then` /
//! `enter_else` / `close_if`, `open_while` / `enter_while_body` /
//! `close_while`), and every expression operator maps to one [`SsaBuilder::binary`]
//! call. The builder owns the [`BlockGraph`] plus the construct stacks, and it
//! is where the SSA decisions live:
//!
//! - phi ids are *reserved* at first assignment under an open join, before
//!   both operands are known, so instruction numbering reflects source order;
//! - common subexpressions are eliminated against the dominance-scoped table
//!   as instructions are emitted, except inside loop bodies where elimination
//!   is deferred to the fix-up passes (operands may still be rewritten through
//!   header phis);
//! - stores seed store-to-load forwarding entries unless the stored value or
//!   the address derives from external input;
//! - closing the outermost `while` of a nest triggers the loop fix-up passes.

use std::collections::{HashMap, HashSet};

use crate::ir::fixup;
use crate::ir::{
    BlockFlags, BlockGraph, BlockId, BlockRelation, Emitted, InstrId, LeafJoinKind, Opcode,
};

/// An SSA value produced by expression evaluation.
///
/// Carries the defining instruction plus, when the value came from a direct
/// variable read, the source variable name. The pair matters because phi
/// patching and CSE must distinguish "same value" from "same source variable"
/// when a variable is reassigned to a value it already held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub(crate) id: InstrId,
    pub(crate) var: Option<String>,
}

impl Value {
    pub(crate) fn temp(id: InstrId) -> Self {
        Self { id, var: None }
    }

    /// Returns the defining instruction of this value.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }
}

struct IfFrame {
    if_block: BlockId,
    join: BlockId,
    branch: Option<InstrId>,
    then_block: Option<BlockId>,
    else_block: Option<BlockId>,
    saved_join: Option<BlockId>,
}

struct WhileFrame {
    header: BlockId,
    branch: Option<InstrId>,
    saved_join: Option<BlockId>,
}

/// The SSA builder: block-graph construction driven by the grammar walk.
pub struct SsaBuilder {
    graph: BlockGraph,
    /// Declared array dimensions.
    arrays: HashMap<String, Vec<i64>>,
    /// Every ADDA emitted per array; a store through any of them clobbers all
    /// cached accesses of the array.
    array_addresses: HashMap<String, HashSet<InstrId>>,
    if_stack: Vec<IfFrame>,
    while_stack: Vec<WhileFrame>,
}

impl SsaBuilder {
    /// Creates a builder with the constant block and a committed entry block.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = BlockGraph::new();
        let constant_block = graph.constant_block();
        let entry = graph.create_block();
        graph.commit_block(entry);
        graph.add_relationship(constant_block, entry, BlockRelation::Normal);
        Self {
            graph,
            arrays: HashMap::new(),
            array_addresses: HashMap::new(),
            if_stack: Vec::new(),
            while_stack: Vec::new(),
        }
    }

    /// Returns the graph under construction.
    #[must_use]
    pub fn graph(&self) -> &BlockGraph {
        &self.graph
    }

    /// Consumes the builder, returning the finished graph.
    #[must_use]
    pub fn into_graph(self) -> BlockGraph {
        self.graph
    }

    fn in_loop(&self) -> bool {
        !self.while_stack.is_empty()
    }

    /// Interns a compile-time constant.
    pub fn constant(&mut self, value: i64) -> Value {
        Value::temp(self.graph.add_constant(value))
    }

    /// Looks up the current value of a scalar variable, if it has one along
    /// the active control path.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<Value> {
        let current = self.graph.current();
        self.graph.block(current).variable(name).map(|id| Value {
            id,
            var: Some(name.to_string()),
        })
    }

    /// Auto-declares an uninitialized variable to the interned constant zero
    /// and returns that value. The caller reports the diagnostic.
    pub fn auto_zero(&mut self, name: &str) -> Value {
        let zero = self.graph.add_constant(0);
        let current = self.graph.current();
        self.graph
            .block_mut(current)
            .vars
            .insert(name.to_string(), zero);
        Value {
            id: zero,
            var: Some(name.to_string()),
        }
    }

    /// Records an assignment in the current block and, if a join is open,
    /// eagerly reserves a phi slot for the variable in the join block. The
    /// reservation fixes the phi's id at first-assignment time; its operands
    /// are patched when the join closes.
    pub fn assign(&mut self, name: &str, value: Value) {
        let current = self.graph.current();
        self.graph.block_mut(current).assign_variable(name, value.id);

        let Some(join) = self.graph.current_join() else {
            return;
        };
        if join == current || self.graph.block(join).reserved_phis.contains_key(name) {
            return;
        }
        if let Emitted::New(id) = self.graph.add_instruction(join, Opcode::Phi, None, None, true) {
            if let Some(instr) = self.graph.instruction_mut(id) {
                instr.x_var = Some(name.to_string());
            }
            self.graph
                .block_mut(join)
                .reserved_phis
                .insert(name.to_string(), id);
        }
    }

    /// Emits a binary operation in the current block, subject to
    /// dominance-scoped CSE. After a `return` the emission is dropped and the
    /// left operand stands in, so evaluation can continue without allocating
    /// ids.
    pub fn binary(&mut self, op: Opcode, left: Value, right: Value) -> Value {
        let current = self.graph.current();
        match self
            .graph
            .add_instruction(current, op, Some(left.id), Some(right.id), self.in_loop())
        {
            Emitted::New(id) => {
                if let Some(instr) = self.graph.instruction_mut(id) {
                    instr.x_var = left.var;
                    instr.y_var = right.var;
                }
                Value::temp(id)
            }
            Emitted::Existing(id) => Value::temp(id),
            Emitted::Discarded => left,
        }
    }

    /// Emits a READ instruction (the `InputNum` intrinsic).
    pub fn input(&mut self) -> Value {
        let current = self.graph.current();
        match self
            .graph
            .add_instruction(current, Opcode::Read, None, None, self.in_loop())
        {
            Emitted::New(id) | Emitted::Existing(id) => Value::temp(id),
            Emitted::Discarded => self.constant(0),
        }
    }

    /// Emits a WRITE instruction (the `OutputNum` intrinsic).
    pub fn output(&mut self, value: Value) {
        let current = self.graph.current();
        if let Emitted::New(id) =
            self.graph
                .add_instruction(current, Opcode::Write, Some(value.id), None, self.in_loop())
        {
            if let Some(instr) = self.graph.instruction_mut(id) {
                instr.x_var = value.var;
            }
        }
    }

    /// Emits a WRITE_NL instruction (the `OutputNewLine` intrinsic).
    pub fn output_newline(&mut self) {
        let current = self.graph.current();
        self.graph
            .add_instruction(current, Opcode::WriteNl, None, None, self.in_loop());
    }

    /// Emits a JSR stub for a call of a user-defined function.
    pub fn call_unknown(&mut self, name: &str) -> Value {
        let current = self.graph.current();
        match self
            .graph
            .add_instruction(current, Opcode::Jsr, None, None, self.in_loop())
        {
            Emitted::New(id) => {
                if let Some(instr) = self.graph.instruction_mut(id) {
                    instr.x_var = Some(name.to_string());
                }
                Value::temp(id)
            }
            Emitted::Existing(id) => Value::temp(id),
            Emitted::Discarded => self.constant(0),
        }
    }

    /// Emits RET and freezes the current block; later non-RET emissions into
    /// it are dropped.
    pub fn return_statement(&mut self, value: Option<Value>) {
        let current = self.graph.current();
        let emitted = self.graph.add_instruction(
            current,
            Opcode::Ret,
            value.map(|v| v.id),
            None,
            self.in_loop(),
        );
        if emitted.is_new() {
            self.graph.block_mut(current).set_flag(BlockFlags::RETURN);
        }
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    /// Declares an array, interning its BASE instruction in the constant
    /// block.
    pub fn declare_array(&mut self, name: &str, dims: Vec<i64>) {
        self.graph.array_base(name);
        self.arrays.insert(name.to_string(), dims);
        self.array_addresses.entry(name.to_string()).or_default();
    }

    /// Returns `true` if `name` is a declared array.
    #[must_use]
    pub fn is_array(&self, name: &str) -> bool {
        self.arrays.contains_key(name)
    }

    /// Returns the declared dimensions of an array.
    #[must_use]
    pub fn array_dims(&self, name: &str) -> Option<&[i64]> {
        self.arrays.get(name).map(Vec::as_slice)
    }

    /// Linearizes an array access row-major with 4-byte elements and emits
    /// ADDA(base, offset). The address participates in CSE like any other
    /// value.
    pub fn array_address(&mut self, name: &str, indexes: &[Value]) -> Value {
        let dims = self.arrays.get(name).cloned().unwrap_or_default();

        // offset = ((i0*d1 + i1)*d2 + ... + ik) * 4
        let mut offset = match indexes.first() {
            Some(first) => first.clone(),
            None => self.constant(0),
        };
        for (at, index) in indexes.iter().enumerate().skip(1) {
            let dim = self.constant(dims.get(at).copied().unwrap_or(1));
            let scaled = self.binary(Opcode::Mul, offset, dim);
            offset = self.binary(Opcode::Add, scaled, index.clone());
        }
        let four = self.constant(4);
        let scaled = self.binary(Opcode::Mul, offset, four);

        let base = self.graph.array_base(name);
        let current = self.graph.current();
        match self.graph.add_instruction(
            current,
            Opcode::Adda,
            Some(base),
            Some(scaled.id),
            self.in_loop(),
        ) {
            Emitted::New(id) => {
                if let Some(instr) = self.graph.instruction_mut(id) {
                    instr.array = Some(name.to_string());
                }
                self.array_addresses
                    .entry(name.to_string())
                    .or_default()
                    .insert(id);
                Value::temp(id)
            }
            Emitted::Existing(id) => Value::temp(id),
            Emitted::Discarded => scaled,
        }
    }

    /// Emits a LOAD through an array address. A CSE hit may resolve to an
    /// earlier load or directly to a forwarded stored value.
    pub fn load_array(&mut self, name: &str, address: Value) -> Value {
        let current = self.graph.current();
        match self
            .graph
            .add_instruction(current, Opcode::Load, Some(address.id), None, self.in_loop())
        {
            Emitted::New(id) => {
                if let Some(instr) = self.graph.instruction_mut(id) {
                    instr.array = Some(name.to_string());
                }
                Value::temp(id)
            }
            Emitted::Existing(id) => Value::temp(id),
            Emitted::Discarded => address,
        }
    }

    /// Emits a STORE through an array address.
    ///
    /// Cached loads and prior stores of the array are evicted first (the
    /// store may alias any slot), then a store-to-load forwarding entry is
    /// seeded unless the stored value or the address derives from READ.
    pub fn store_array(&mut self, name: &str, address: Value, value: Value) {
        let current = self.graph.current();
        let addresses = self
            .array_addresses
            .get(name)
            .cloned()
            .unwrap_or_default();
        self.graph.block_mut(current).evict_array_entries(&addresses);

        let emitted = self.graph.add_instruction(
            current,
            Opcode::Store,
            Some(value.id),
            Some(address.id),
            self.in_loop(),
        );
        if let Emitted::New(id) = emitted {
            if let Some(instr) = self.graph.instruction_mut(id) {
                instr.array = Some(name.to_string());
                instr.x_var = value.var;
            }
            self.graph
                .block_mut(current)
                .stored_arrays
                .insert(name.to_string());

            if !self.in_loop()
                && !self.graph.originates_from_read(value.id)
                && !self.graph.originates_from_read(address.id)
            {
                self.graph
                    .block_mut(current)
                    .dom_cse
                    .insert((Opcode::Load, Some(address.id), None), value.id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Relations and control flow
    // ------------------------------------------------------------------

    /// Emits CMP plus the negated conditional branch for a relation. The
    /// branch target stays open until the else/exit block is placed. Returns
    /// `None` when emission was dropped by a frozen return block.
    pub fn relation(&mut self, left: Value, branch_op: Opcode, right: Value) -> Option<InstrId> {
        debug_assert!(branch_op.is_conditional_branch());
        let cmp = self.binary(Opcode::Cmp, left, right);
        let current = self.graph.current();
        self.graph
            .add_instruction(current, branch_op, Some(cmp.id), None, self.in_loop())
            .id()
    }

    /// Opens an `if`: allocates (but does not commit) the join block and makes
    /// it the current join.
    pub fn open_if(&mut self) {
        let join = self.graph.create_block();
        let saved_join = self.graph.current_join();
        self.graph.set_current_join(Some(join));
        self.if_stack.push(IfFrame {
            if_block: self.graph.current(),
            join,
            branch: None,
            then_block: None,
            else_block: None,
            saved_join,
        });
    }

    /// Commits the then block as FALL_THROUGH child of the if block.
    pub fn enter_then(&mut self, branch: Option<InstrId>) {
        let Some(if_block) = self.if_stack.last().map(|frame| frame.if_block) else {
            debug_assert!(false, "enter_then without open_if");
            return;
        };
        let then_block = self.graph.create_block();
        self.graph.inherit(then_block, if_block);
        self.graph.commit_block(then_block);
        self.graph
            .add_relationship(if_block, then_block, BlockRelation::FallThrough);
        if let Some(frame) = self.if_stack.last_mut() {
            frame.branch = branch;
            frame.then_block = Some(then_block);
        }
    }

    /// Commits the else block as BRANCH child of the if block. Called even
    /// when the source has no `else` keyword.
    pub fn enter_else(&mut self) {
        let Some((if_block, join)) = self
            .if_stack
            .last()
            .map(|frame| (frame.if_block, frame.join))
        else {
            debug_assert!(false, "enter_else without open_if");
            return;
        };
        let else_block = self.graph.create_block();
        self.graph.inherit(else_block, if_block);
        self.graph.commit_block(else_block);
        self.graph
            .add_relationship(if_block, else_block, BlockRelation::Branch);
        // nested constructs inside then may have replaced the join cursor
        self.graph.set_current_join(Some(join));
        if let Some(frame) = self.if_stack.last_mut() {
            frame.else_block = Some(else_block);
        }
    }

    /// Closes an `if`: resolves the join topology, fills or drops the
    /// reserved phis, and wires the then side's branch to the join.
    pub fn close_if(&mut self) {
        let Some(frame) = self.if_stack.pop() else {
            debug_assert!(false, "close_if without open_if");
            return;
        };
        let then_block = frame.then_block.unwrap_or(frame.if_block);
        let else_block = frame.else_block.unwrap_or(frame.if_block);
        let in_loop = self.in_loop();

        // An empty else still needs a first instruction as branch target.
        if self.graph.block(else_block).instructions().is_empty() {
            self.graph
                .add_instruction(else_block, Opcode::Nop, None, None, in_loop);
        }
        if let Some(branch) = frame.branch {
            let target = self.graph.block(else_block).first_instruction_id();
            self.graph.patch_y(branch, target);
        }

        // The join is committed only now, after all nested blocks, so its
        // number reflects final placement.
        self.graph.set_current_join(Some(frame.join));
        self.graph.commit_block(frame.join);
        self.graph.block_mut(frame.join).set_flag(BlockFlags::JOIN);

        // A side that branched further left its own join as the actual last
        // block of that side; the outer if must join with that block.
        let then_branches = self.graph.block(then_block).has_control_flow_children();
        let else_branches = self.graph.block(else_block).has_control_flow_children();
        let (then_pred, else_pred) = match (then_branches, else_branches) {
            (false, false) => (then_block, else_block),
            (true, false) => (
                self.graph
                    .pop_lowest_placed_leaf_join()
                    .unwrap_or(then_block),
                else_block,
            ),
            (false, true) => (
                then_block,
                self.graph
                    .pop_lowest_placed_leaf_join()
                    .unwrap_or(else_block),
            ),
            (true, true) => {
                // else side parsed later, so its leaf join is numbered higher
                let else_pred = self
                    .graph
                    .pop_lowest_placed_leaf_join()
                    .unwrap_or(else_block);
                let then_pred = self
                    .graph
                    .pop_lowest_placed_leaf_join()
                    .unwrap_or(then_block);
                (then_pred, else_pred)
            }
        };

        self.graph
            .add_relationship(then_pred, frame.join, BlockRelation::Branch);
        self.graph
            .add_relationship(else_pred, frame.join, BlockRelation::FallThrough);
        self.graph
            .add_relationship(frame.if_block, frame.join, BlockRelation::Dom);

        // The join is dominated by the if block; its environment and CSE
        // state start from there and are refined by the phi step.
        self.graph.inherit(frame.join, frame.if_block);
        self.kill_branch_stored_arrays(frame.join, frame.if_block, &[then_pred, else_pred], in_loop);

        let then_return = self.graph.block(then_pred).is_return_block();
        let else_return = self.graph.block(else_pred).is_return_block();
        self.insert_join_phis(
            frame.join,
            frame.if_block,
            (then_pred, then_return),
            (else_pred, else_return),
            in_loop,
        );
        self.remove_unfilled_phis(frame.join);

        if then_return && else_return {
            // Degenerate merge of two terminated paths - everything in the
            // join is unreachable.
            self.graph.discard_instructions(frame.join);
            self.graph.block_mut(frame.join).set_flag(BlockFlags::RETURN);
        }

        // The then side reaches the join over an explicit branch; its target
        // is re-derived by the repair passes once the join has instructions.
        let target = self.graph.block(frame.join).first_instruction_id();
        self.graph
            .add_instruction(then_pred, Opcode::Bra, target, None, in_loop);

        self.graph.update_leaf_joins(LeafJoinKind::If, frame.join);
        self.graph.set_current_join(frame.saved_join);
    }

    /// Opens a `while`: reuses the current block as loop header when it is
    /// still empty, otherwise commits a fresh header as its NORMAL child.
    pub fn open_while(&mut self) {
        let current = self.graph.current();
        let reusable = self.graph.block(current).instructions().is_empty()
            && !self.graph.block(current).is_return_block()
            && !self.graph.block(current).is_loop_header();
        let header = if reusable {
            current
        } else {
            let header = self.graph.create_block();
            self.graph.inherit(header, current);
            self.graph.commit_block(header);
            self.graph
                .add_relationship(current, header, BlockRelation::Normal);
            header
        };
        self.graph.block_mut(header).set_flag(BlockFlags::LOOP_HEADER);
        let saved_join = self.graph.current_join();
        self.graph.set_current_join(Some(header));
        self.while_stack.push(WhileFrame {
            header,
            branch: None,
            saved_join,
        });
    }

    /// Commits the loop body as FALL_THROUGH child of the header.
    pub fn enter_while_body(&mut self, branch: Option<InstrId>) {
        let Some(header) = self.while_stack.last().map(|frame| frame.header) else {
            debug_assert!(false, "enter_while_body without open_while");
            return;
        };
        let body = self.graph.create_block();
        self.graph.inherit(body, header);
        self.graph.commit_block(body);
        self.graph
            .add_relationship(header, body, BlockRelation::FallThrough);
        if let Some(frame) = self.while_stack.last_mut() {
            frame.branch = branch;
        }
    }

    /// Closes a `while`: resolves dangling joins left inside the body, wires
    /// the back edge, fills the header phis against the body's tail, places
    /// KILLs for body-stored arrays, commits the exit block, and - once the
    /// outermost loop of the nest closes - runs the fix-up passes.
    pub fn close_while(&mut self) {
        let Some(frame) = self.while_stack.pop() else {
            debug_assert!(false, "close_while without open_while");
            return;
        };
        let header = frame.header;
        let header_number = self.graph.block(header).number().unwrap_or(0);
        let in_loop = self.in_loop();

        self.resolve_dangling_joins(header, header_number, in_loop);

        // The block where parsing stopped loops back unless it already
        // branched (nested join) or returned.
        let current = self.graph.current();
        if !self.graph.block(current).has_control_flow_children()
            && !self.graph.block(current).is_return_block()
        {
            self.graph
                .add_instruction(current, Opcode::Bra, None, None, in_loop);
            self.graph
                .add_relationship(current, header, BlockRelation::Branch);
        }

        // The body's actual tail is the highest-numbered back-edge source;
        // nested loops can push the real tail past the naive body block.
        let back_edge_sources: Vec<BlockId> = self
            .graph
            .block(header)
            .parents()
            .iter()
            .filter(|(_, rel)| **rel == BlockRelation::Branch)
            .map(|(id, _)| *id)
            .filter(|id| self.graph.block(*id).number().unwrap_or(0) > header_number)
            .collect();
        let tail = back_edge_sources
            .iter()
            .copied()
            .max_by_key(|id| self.graph.block(*id).number())
            .unwrap_or(current);

        let tail_return = self.graph.block(tail).is_return_block();
        self.insert_header_phis(header, tail, tail_return, in_loop);
        self.remove_unfilled_phis(header);
        if self.graph.block(header).phis().next().is_some() {
            self.graph.block_mut(header).set_flag(BlockFlags::JOIN);
        }

        self.kill_body_stored_arrays(header, &back_edge_sources);

        // Loop exit: BRANCH child of the header, carrying the post-phi
        // environment. The conditional branch target is re-derived from this
        // edge by the repair passes.
        let exit = self.graph.create_block();
        self.graph.inherit(exit, header);
        self.graph.commit_block(exit);
        self.graph
            .add_relationship(header, exit, BlockRelation::Branch);
        let _ = frame.branch;

        self.graph.update_leaf_joins(LeafJoinKind::While, exit);
        self.graph.set_current_join(frame.saved_join);

        if self.while_stack.is_empty() {
            // Inner ids and phi chains are only stable once the whole nest is
            // parsed, so the fix-up runs at the outermost close.
            fixup::propagate_loop_phis(&mut self.graph, header);
            fixup::eliminate_loop_subexpressions(&mut self.graph, header, &self.array_addresses);
        }
    }

    /// Emits END and runs the end-of-program repairs: global branch-target
    /// resolution and dense renumbering.
    pub fn finish(&mut self) {
        let current = self.graph.current();
        self.graph
            .add_instruction(current, Opcode::End, None, None, false);
        self.graph.repair_branch_targets();
        self.graph.renumber_dense();
    }

    // ------------------------------------------------------------------
    // Join helpers
    // ------------------------------------------------------------------

    /// Phi step shared by `close_if`: for every variable updated along both
    /// effective predecessors, fill the reserved phi (or create one) unless
    /// both sides carry the same value. A returned predecessor contributes
    /// the branch-point environment instead - it has no live value of its
    /// own.
    fn insert_join_phis(
        &mut self,
        join: BlockId,
        if_block: BlockId,
        (then_pred, then_return): (BlockId, bool),
        (else_pred, else_return): (BlockId, bool),
        in_loop: bool,
    ) {
        let mut names: Vec<String> = self
            .graph
            .block(then_pred)
            .updated_vars
            .intersection(&self.graph.block(else_pred).updated_vars)
            .cloned()
            .collect();
        names.sort();

        for name in names {
            let then_value = if then_return {
                self.graph.block(if_block).variable(&name)
            } else {
                self.graph.block(then_pred).variable(&name)
            };
            let else_value = if else_return {
                self.graph.block(if_block).variable(&name)
            } else {
                self.graph.block(else_pred).variable(&name)
            };
            let (Some(then_value), Some(else_value)) = (then_value, else_value) else {
                continue;
            };
            if then_value == else_value {
                // No real merge; the reserved phi stays unfilled and is
                // removed when the join seals.
                self.graph.block_mut(join).assign_variable(&name, then_value);
                continue;
            }

            let phi = match self.graph.block(join).reserved_phis.get(&name).copied() {
                Some(reserved) => {
                    self.graph.patch_x(reserved, Some(then_value));
                    self.graph.patch_y(reserved, Some(else_value));
                    Some(reserved)
                }
                // Variables updated only inside nested joins reach this level
                // without a reservation.
                None => self
                    .graph
                    .add_instruction(
                        join,
                        Opcode::Phi,
                        Some(then_value),
                        Some(else_value),
                        in_loop,
                    )
                    .id(),
            };
            if let Some(phi) = phi {
                if let Some(instr) = self.graph.instruction_mut(phi) {
                    instr.x_var = Some(name.clone());
                }
                self.graph.block_mut(join).assign_variable(&name, phi);
            }
        }
    }

    /// Phi step for `close_while`: header environment versus the body tail's.
    fn insert_header_phis(&mut self, header: BlockId, tail: BlockId, tail_return: bool, in_loop: bool) {
        let mut names: Vec<String> = self
            .graph
            .block(header)
            .updated_vars
            .intersection(&self.graph.block(tail).updated_vars)
            .cloned()
            .collect();
        names.sort();

        for name in names {
            let header_value = self.graph.block(header).variable(&name);
            let body_value = if tail_return {
                header_value
            } else {
                self.graph.block(tail).variable(&name)
            };
            let (Some(header_value), Some(body_value)) = (header_value, body_value) else {
                continue;
            };
            if header_value == body_value {
                continue;
            }

            let phi = match self.graph.block(header).reserved_phis.get(&name).copied() {
                Some(reserved) => {
                    self.graph.patch_x(reserved, Some(header_value));
                    self.graph.patch_y(reserved, Some(body_value));
                    Some(reserved)
                }
                None => self
                    .graph
                    .add_instruction(
                        header,
                        Opcode::Phi,
                        Some(header_value),
                        Some(body_value),
                        in_loop,
                    )
                    .id(),
            };
            if let Some(phi) = phi {
                if let Some(instr) = self.graph.instruction_mut(phi) {
                    instr.x_var = Some(name.clone());
                }
                self.graph.block_mut(header).assign_variable(&name, phi);
            }
        }
    }

    /// Drops reserved phis that never received operands (eager reservations
    /// the join step found redundant or never consulted).
    fn remove_unfilled_phis(&mut self, block: BlockId) {
        let unfilled: Vec<InstrId> = self
            .graph
            .block(block)
            .phis()
            .filter(|phi| phi.is_unfilled_phi())
            .map(|phi| phi.id())
            .collect();
        for id in unfilled {
            self.graph.remove_instruction(block, id);
        }
        self.graph.block_mut(block).reserved_phis.clear();
    }

    /// Arrays stored in either branch of an if are clobbered from the join's
    /// point of view: evict their cached accesses and mark the invalidation
    /// with a KILL.
    fn kill_branch_stored_arrays(
        &mut self,
        join: BlockId,
        if_block: BlockId,
        preds: &[BlockId],
        in_loop: bool,
    ) {
        let mut clobbered: Vec<String> = {
            let before = &self.graph.block(if_block).stored_arrays;
            let mut names = HashSet::new();
            for pred in preds {
                for name in &self.graph.block(*pred).stored_arrays {
                    if !before.contains(name) {
                        names.insert(name.clone());
                    }
                }
            }
            names.into_iter().collect()
        };
        clobbered.sort();

        for name in clobbered {
            let addresses = self
                .array_addresses
                .get(&name)
                .cloned()
                .unwrap_or_default();
            self.graph.block_mut(join).evict_array_entries(&addresses);
            if let Emitted::New(id) =
                self.graph
                    .add_instruction(join, Opcode::Kill, None, None, in_loop)
            {
                if let Some(instr) = self.graph.instruction_mut(id) {
                    instr.array = Some(name.clone());
                }
            }
            self.graph
                .block_mut(join)
                .stored_arrays
                .insert(name);
        }
    }

    /// Arrays stored anywhere in a loop body are clobbered on every
    /// iteration: KILL right after the header phis so Pass B invalidates
    /// before any body instruction.
    fn kill_body_stored_arrays(&mut self, header: BlockId, back_edge_sources: &[BlockId]) {
        let mut clobbered: Vec<String> = {
            let before = &self.graph.block(header).stored_arrays;
            let mut names = HashSet::new();
            for source in back_edge_sources {
                for name in &self.graph.block(*source).stored_arrays {
                    if !before.contains(name) {
                        names.insert(name.clone());
                    }
                }
            }
            names.into_iter().collect()
        };
        clobbered.sort();

        for name in clobbered {
            let addresses = self
                .array_addresses
                .get(&name)
                .cloned()
                .unwrap_or_default();
            self.graph.block_mut(header).evict_array_entries(&addresses);
            self.graph.add_header_kill(header, &name);
            self.graph
                .block_mut(header)
                .stored_arrays
                .insert(name);
        }
    }

    /// Resolves leaf joins left dangling inside a loop body: an empty,
    /// non-current one is deleted with its parents rewired straight back to
    /// the header; one without children gets an explicit branch back.
    fn resolve_dangling_joins(&mut self, header: BlockId, header_number: u32, in_loop: bool) {
        let current = self.graph.current();
        for dangling in self.graph.drain_leaf_joins_above(header_number) {
            let empty = self.graph.block(dangling).instructions().is_empty();
            if empty && dangling != current {
                self.graph.block_mut(dangling).set_flag(BlockFlags::DELETED);
                let parents: Vec<(BlockId, BlockRelation)> = self
                    .graph
                    .block(dangling)
                    .parents()
                    .iter()
                    .map(|(id, rel)| (*id, *rel))
                    .collect();
                for (parent, relation) in parents {
                    self.graph.remove_relationship(parent, dangling);
                    if !relation.is_control_flow() {
                        continue;
                    }
                    self.graph
                        .add_relationship(parent, header, BlockRelation::Branch);
                    // A fall-through parent needs an explicit branch now that
                    // its successor moved.
                    let has_branch = self
                        .graph
                        .block(parent)
                        .instructions()
                        .last()
                        .is_some_and(|instr| instr.op().is_branch());
                    if !has_branch && !self.graph.block(parent).is_return_block() {
                        self.graph
                            .add_instruction(parent, Opcode::Bra, None, None, in_loop);
                    }
                }
            } else if !self.graph.block(dangling).has_control_flow_children() {
                self.graph
                    .add_instruction(dangling, Opcode::Bra, None, None, in_loop);
                self.graph
                    .add_relationship(dangling, header, BlockRelation::Branch);
            }
        }
    }
}

impl Default for SsaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_of(builder: &SsaBuilder, block: BlockId) -> Vec<Opcode> {
        builder
            .graph()
            .block(block)
            .instructions()
            .iter()
            .map(|instr| instr.op())
            .collect()
    }

    #[test]
    fn test_binary_cse_within_block() {
        let mut builder = SsaBuilder::new();
        let a = builder.constant(1);
        let b = builder.constant(2);
        let first = builder.binary(Opcode::Add, a.clone(), b.clone());
        let second = builder.binary(Opcode::Add, a, b);
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_assign_and_read_back() {
        let mut builder = SsaBuilder::new();
        let one = builder.constant(1);
        builder.assign("x", one.clone());
        let read = builder.variable("x").expect("x must be bound");
        assert_eq!(read.id(), one.id());
        assert_eq!(read.var.as_deref(), Some("x"));
    }

    #[test]
    fn test_if_join_phi() {
        let mut builder = SsaBuilder::new();
        let one = builder.constant(1);
        builder.assign("x", one.clone());

        builder.open_if();
        let ten = builder.constant(10);
        let x = builder.variable("x").unwrap();
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_then(branch);
        let two = builder.constant(2);
        builder.assign("x", two.clone());
        builder.enter_else();
        let three = builder.constant(3);
        builder.assign("x", three.clone());
        builder.close_if();

        let join = builder.graph().current();
        let phis: Vec<_> = builder.graph().block(join).phis().collect();
        assert_eq!(phis.len(), 1);
        assert_eq!(phis[0].x(), Some(two.id()));
        assert_eq!(phis[0].y(), Some(three.id()));
        assert_eq!(builder.variable("x").unwrap().id(), phis[0].id());
    }

    #[test]
    fn test_redundant_if_phi_is_dropped() {
        let mut builder = SsaBuilder::new();
        let one = builder.constant(1);
        builder.assign("x", one);

        builder.open_if();
        let ten = builder.constant(10);
        let x = builder.variable("x").unwrap();
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_then(branch);
        let five = builder.constant(5);
        builder.assign("x", five.clone());
        builder.enter_else();
        let five_again = builder.constant(5);
        builder.assign("x", five_again);
        builder.close_if();

        let join = builder.graph().current();
        assert_eq!(builder.graph().block(join).phis().count(), 0);
        assert_eq!(builder.variable("x").unwrap().id(), five.id());
    }

    #[test]
    fn test_while_header_phi_and_rewrite() {
        let mut builder = SsaBuilder::new();
        let zero = builder.constant(0);
        builder.assign("x", zero.clone());

        builder.open_while();
        let header = builder.graph().current_join().unwrap();
        let x = builder.variable("x").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_while_body(branch);
        let x_in_body = builder.variable("x").unwrap();
        let one = builder.constant(1);
        let next = builder.binary(Opcode::Add, x_in_body, one);
        builder.assign("x", next.clone());
        builder.close_while();

        let header_block = builder.graph().block(header);
        let phis: Vec<_> = header_block.phis().collect();
        assert_eq!(phis.len(), 1);
        assert_eq!(phis[0].x(), Some(zero.id()));
        assert_eq!(phis[0].y(), Some(next.id()));

        // After Pass A the comparison reads the phi, not the pre-loop value.
        let cmp = header_block
            .instructions()
            .iter()
            .find(|instr| instr.op() == Opcode::Cmp)
            .expect("header cmp");
        assert_eq!(cmp.x(), Some(phis[0].id()));

        // And the body increment consumes the loop-carried phi too.
        let add = builder.graph().instruction(next.id()).unwrap();
        assert_eq!(add.x(), Some(phis[0].id()));

        // Exit block carries the post-phi environment.
        assert_eq!(builder.variable("x").unwrap().id(), phis[0].id());
    }

    #[test]
    fn test_return_freezes_block() {
        let mut builder = SsaBuilder::new();
        let one = builder.constant(1);
        builder.return_statement(Some(one.clone()));

        let frozen = builder.graph().current();
        let before = ops_of(&builder, frozen);
        let count = builder.graph().allocated_instruction_count();

        let two = builder.constant(2);
        let sum = builder.binary(Opcode::Add, one.clone(), two);
        builder.output(sum.clone());

        assert_eq!(ops_of(&builder, frozen), before);
        // Only the interned constant 2 allocated an id.
        assert_eq!(builder.graph().allocated_instruction_count(), count + 1);
        // The left operand stood in for the dropped addition.
        assert_eq!(sum.id(), one.id());
    }

    #[test]
    fn test_store_to_load_forwarding() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let index = builder.constant(3);
        let seven = builder.constant(7);
        let address = builder.array_address("a", &[index.clone()]);
        builder.store_array("a", address.clone(), seven.clone());

        let address_again = builder.array_address("a", &[index]);
        assert_eq!(address_again.id(), address.id());
        let loaded = builder.load_array("a", address_again);
        assert_eq!(loaded.id(), seven.id());
    }

    #[test]
    fn test_read_origin_blocks_forwarding() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let index = builder.input();
        let five = builder.constant(5);
        let address = builder.array_address("a", &[index.clone()]);
        builder.store_array("a", address.clone(), five);

        let address_again = builder.array_address("a", &[index]);
        let loaded = builder.load_array("a", address_again);
        let load = builder.graph().instruction(loaded.id()).unwrap();
        assert_eq!(load.op(), Opcode::Load);
    }

    #[test]
    fn test_store_kills_prior_load_entries() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let zero = builder.constant(0);
        let address = builder.array_address("a", &[zero.clone()]);
        let first = builder.load_array("a", address.clone());

        let index = builder.input();
        let other = builder.array_address("a", &[index]);
        let nine = builder.constant(9);
        builder.store_array("a", other, nine);

        // The store may have hit slot 0, so the cached load is gone.
        let second = builder.load_array("a", address);
        assert_ne!(second.id(), first.id());
    }

    #[test]
    fn test_if_join_kills_branch_stored_array() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let one = builder.constant(1);
        builder.assign("x", one);

        builder.open_if();
        let ten = builder.constant(10);
        let x = builder.variable("x").unwrap();
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_then(branch);
        let zero = builder.constant(0);
        let address = builder.array_address("a", &[zero]);
        let two = builder.constant(2);
        builder.store_array("a", address, two);
        builder.enter_else();
        builder.close_if();

        let join = builder.graph().current();
        let kill = builder
            .graph()
            .block(join)
            .instructions()
            .iter()
            .find(|instr| instr.op() == Opcode::Kill)
            .expect("join kill marker");
        assert_eq!(kill.array(), Some("a"));
    }
}
