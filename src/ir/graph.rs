//! The block graph: block arena, instruction numbering, constant pool and the
//! join-tracking cursors.
//!
//! [`BlockGraph`] owns every [`BasicBlock`] in an index-addressed arena. Block
//! *creation* and block *commit* are split: [`BlockGraph::create_block`] hands
//! out an unnumbered block, [`BlockGraph::commit_block`] appends it to the
//! layout, assigns the next display number and makes it the current block. The
//! split exists because join blocks for `if`/`while` are allocated before the
//! branches they join are known, but must be numbered after all branch
//! sub-blocks so that numbering matches final layout.
//!
//! The instruction-id counter is program-global. It synchronizes 1:1 with
//! committed instructions: a CSE hit or a discarded emission never allocates,
//! so no rollback bookkeeping is needed and gaps only appear when the fix-up
//! passes remove instructions (closed again by [`BlockGraph::renumber_dense`]).

use std::collections::{HashMap, HashSet};

use crate::ir::{BasicBlock, BlockId, BlockRelation, InstrId, Instruction, Opcode};

/// Outcome of an instruction emission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    /// A new instruction was created with this id.
    New(InstrId),
    /// A dominance-scoped CSE hit: the pre-existing instruction is reused and
    /// nothing was emitted.
    Existing(InstrId),
    /// The target block is frozen by `return`; the emission was dropped.
    Discarded,
}

impl Emitted {
    /// Returns the resulting instruction id, if the emission produced or
    /// reused one.
    #[must_use]
    pub const fn id(&self) -> Option<InstrId> {
        match self {
            Emitted::New(id) | Emitted::Existing(id) => Some(*id),
            Emitted::Discarded => None,
        }
    }

    /// Returns `true` if a new instruction was created.
    #[must_use]
    pub const fn is_new(&self) -> bool {
        matches!(self, Emitted::New(_))
    }
}

/// Which construct kind a leaf join belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafJoinKind {
    /// Join block of a closed `if`.
    If,
    /// Exit block of a closed `while`.
    While,
}

/// The graph of basic blocks under construction.
///
/// Block 0 is reserved as the constant pool: interned compile-time constants
/// and array BASE instructions live there and are deduplicated by value/name.
#[derive(Debug)]
pub struct BlockGraph {
    blocks: Vec<BasicBlock>,
    layout: Vec<BlockId>,
    instr_count: usize,

    constants: HashMap<i64, InstrId>,
    bases: HashMap<String, InstrId>,

    current: BlockId,
    current_join: Option<BlockId>,

    if_leaf_joins: Vec<BlockId>,
    while_leaf_joins: Vec<BlockId>,

    instr_block: HashMap<InstrId, BlockId>,
    removed: Vec<InstrId>,
}

impl BlockGraph {
    /// Creates a graph holding only the committed constant block (number 0),
    /// which starts out as the current block.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            blocks: Vec::new(),
            layout: Vec::new(),
            instr_count: 0,
            constants: HashMap::new(),
            bases: HashMap::new(),
            current: BlockId::new(0),
            current_join: None,
            if_leaf_joins: Vec::new(),
            while_leaf_joins: Vec::new(),
            instr_block: HashMap::new(),
            removed: Vec::new(),
        };
        let constant_block = graph.create_block();
        graph.commit_block(constant_block);
        graph
    }

    /// Returns the constant block's id.
    #[must_use]
    pub fn constant_block(&self) -> BlockId {
        self.layout[0]
    }

    /// Returns a block by id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not created by this graph.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub(crate) fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    /// Iterates the committed, non-deleted blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.layout
            .iter()
            .map(|id| self.block(*id))
            .filter(|block| !block.is_deleted())
    }

    /// Returns the current block under construction.
    #[must_use]
    pub fn current(&self) -> BlockId {
        self.current
    }

    pub(crate) fn set_current(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Returns the join block of the innermost open `if`/`while`, if any.
    #[must_use]
    pub fn current_join(&self) -> Option<BlockId> {
        self.current_join
    }

    pub(crate) fn set_current_join(&mut self, block: Option<BlockId>) {
        self.current_join = block;
    }

    /// Allocates a block with no number and no edges. The block does not
    /// participate in the layout until committed.
    pub(crate) fn create_block(&mut self) -> BlockId {
        let id = BlockId::new(self.blocks.len());
        self.blocks.push(BasicBlock::new(id));
        id
    }

    /// Commits a block: appends it to the layout, assigns the next display
    /// number and makes it the current block.
    pub(crate) fn commit_block(&mut self, block: BlockId) {
        let number = u32::try_from(self.layout.len()).unwrap_or(u32::MAX);
        self.block_mut(block).set_number(number);
        self.layout.push(block);
        self.current = block;
    }

    /// Wires a typed parent/child relationship between two blocks.
    pub(crate) fn add_relationship(
        &mut self,
        parent: BlockId,
        child: BlockId,
        relation: BlockRelation,
    ) {
        self.block_mut(parent).add_child(child, relation);
        self.block_mut(child).add_parent(parent, relation);
    }

    pub(crate) fn remove_relationship(&mut self, parent: BlockId, child: BlockId) {
        self.block_mut(parent).remove_child(child);
        self.block_mut(child).remove_parent(parent);
    }

    /// Copies the parent's environment state into `child` (copy-on-branch).
    pub(crate) fn inherit(&mut self, child: BlockId, parent: BlockId) {
        debug_assert_ne!(child, parent);
        let (vars, updated, dom_cse, stored) = {
            let parent = self.block(parent);
            (
                parent.vars.clone(),
                parent.updated_vars.clone(),
                parent.dom_cse.clone(),
                parent.stored_arrays.clone(),
            )
        };
        let child = self.block_mut(child);
        child.vars = vars;
        child.updated_vars = updated;
        child.dom_cse = dom_cse;
        child.stored_arrays = stored;
    }

    /// Emits an instruction into `block`.
    ///
    /// If `in_loop` is false, the operation is CSE-eligible and the block's
    /// dominance-scoped table already holds `(op, x, y)`, the existing
    /// instruction is returned and nothing is created (pure memoization).
    /// Loop-body entries are deferred to the later fix-up pass because
    /// operands may still be rewritten.
    ///
    /// A block frozen by `return` accepts only RET; everything else is
    /// reported as discarded, modeling "unreachable code after return is
    /// dropped". No id is allocated in either short-circuit, keeping the
    /// counter synchronized 1:1 with committed instructions.
    pub(crate) fn add_instruction(
        &mut self,
        block: BlockId,
        op: Opcode,
        x: Option<InstrId>,
        y: Option<InstrId>,
        in_loop: bool,
    ) -> Emitted {
        if self.block(block).is_return_block() && op != Opcode::Ret {
            return Emitted::Discarded;
        }

        if !in_loop && !op.is_cse_exempt() {
            if let Some(existing) = self.block(block).dom_cse.get(&(op, x, y)) {
                return Emitted::Existing(*existing);
            }
        }

        let id = self.alloc_instr_id();
        self.block_mut(block)
            .push_instruction(Instruction::new(id, op, x, y));
        if !in_loop && !op.is_cse_exempt() {
            self.block_mut(block).dom_cse.insert((op, x, y), id);
        }
        self.instr_block.insert(id, block);
        Emitted::New(id)
    }

    fn alloc_instr_id(&mut self) -> InstrId {
        let id = InstrId::new(self.instr_count);
        self.instr_count += 1;
        id
    }

    /// Returns how many instruction ids have been allocated so far.
    #[must_use]
    pub fn allocated_instruction_count(&self) -> usize {
        self.instr_count
    }

    /// Interns `value` in the constant pool; idempotent.
    pub(crate) fn add_constant(&mut self, value: i64) -> InstrId {
        if let Some(existing) = self.constants.get(&value) {
            return *existing;
        }
        let id = self.alloc_instr_id();
        let block = self.constant_block();
        self.block_mut(block)
            .push_instruction(Instruction::constant(id, value));
        self.instr_block.insert(id, block);
        self.constants.insert(value, id);
        id
    }

    /// Interns the BASE instruction of a declared array; idempotent.
    pub(crate) fn array_base(&mut self, array: &str) -> InstrId {
        if let Some(existing) = self.bases.get(array) {
            return *existing;
        }
        let id = self.alloc_instr_id();
        let block = self.constant_block();
        let mut instr = Instruction::new(id, Opcode::Base, None, None);
        instr.array = Some(array.to_string());
        self.block_mut(block).push_instruction(instr);
        self.instr_block.insert(id, block);
        self.bases.insert(array.to_string(), id);
        id
    }

    /// Emits a KILL marker for `array` into a loop header, placed right after
    /// the header's phis so that Pass B sees the invalidation before any body
    /// instruction.
    pub(crate) fn add_header_kill(&mut self, header: BlockId, array: &str) -> InstrId {
        let id = self.alloc_instr_id();
        let mut instr = Instruction::new(id, Opcode::Kill, None, None);
        instr.array = Some(array.to_string());
        self.block_mut(header).insert_after_phis(instr);
        self.instr_block.insert(id, header);
        id
    }

    /// Returns `true` if `id` transitively derives from a READ instruction.
    /// External input is opaque, so READ-derived values and addresses are
    /// never assumed stable across stores.
    pub(crate) fn originates_from_read(&self, id: InstrId) -> bool {
        let mut pending = vec![id];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(instr) = self.instruction(id) else {
                continue;
            };
            match instr.op() {
                Opcode::Read => return true,
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Adda
                | Opcode::Phi
                | Opcode::Cmp => {
                    pending.extend(instr.x());
                    pending.extend(instr.y());
                }
                _ => {}
            }
        }
        false
    }

    /// Looks up an instruction anywhere in the graph.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        let block = *self.instr_block.get(&id)?;
        self.block(block).instruction(id)
    }

    pub(crate) fn instruction_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        let block = *self.instr_block.get(&id)?;
        self.block_mut(block).instruction_mut(id)
    }

    /// Returns the block an instruction lives in.
    #[must_use]
    pub fn block_of_instruction(&self, id: InstrId) -> Option<BlockId> {
        self.instr_block.get(&id).copied()
    }

    /// Patches the `x` operand of an existing instruction.
    pub(crate) fn patch_x(&mut self, id: InstrId, value: Option<InstrId>) {
        if let Some(instr) = self.instruction_mut(id) {
            instr.x = value;
        }
    }

    /// Patches the `y` operand of an existing instruction.
    pub(crate) fn patch_y(&mut self, id: InstrId, value: Option<InstrId>) {
        if let Some(instr) = self.instruction_mut(id) {
            instr.y = value;
        }
    }

    /// Removes an instruction from its block and records the id for the final
    /// renumbering.
    pub(crate) fn remove_instruction(&mut self, block: BlockId, id: InstrId) {
        if self.block_mut(block).remove_instruction(id).is_some() {
            self.instr_block.remove(&id);
            self.removed.push(id);
        }
    }

    /// Drops every instruction of a block (degenerate merge of two terminated
    /// paths: everything in the join is unreachable).
    pub(crate) fn discard_instructions(&mut self, block: BlockId) {
        let ids: Vec<InstrId> = self
            .block(block)
            .instructions()
            .iter()
            .map(Instruction::id)
            .collect();
        for id in ids {
            self.remove_instruction(block, id);
        }
    }

    /// Tracks a resolved join block so that an enclosing `if`/`while` can pull
    /// the innermost unresolved join instead of a stale outer one. If the
    /// worklist top is a parent of `block`, the chain collapsed and the top is
    /// replaced; otherwise `block` is pushed.
    pub(crate) fn update_leaf_joins(&mut self, kind: LeafJoinKind, block: BlockId) {
        let replace_top = {
            let list = self.leaf_list(kind);
            list.last()
                .copied()
                .is_some_and(|top| self.block(block).has_parent(top))
        };
        let list = match kind {
            LeafJoinKind::If => &mut self.if_leaf_joins,
            LeafJoinKind::While => &mut self.while_leaf_joins,
        };
        if replace_top {
            *list.last_mut().expect("non-empty worklist") = block;
        } else {
            list.push(block);
        }
    }

    fn leaf_list(&self, kind: LeafJoinKind) -> &Vec<BlockId> {
        match kind {
            LeafJoinKind::If => &self.if_leaf_joins,
            LeafJoinKind::While => &self.while_leaf_joins,
        }
    }

    /// Removes and returns the pending leaf join with the highest block
    /// number, i.e. the most recently placed block. Enclosing constructs
    /// always join with the textually last block of a nested construct.
    pub(crate) fn pop_lowest_placed_leaf_join(&mut self) -> Option<BlockId> {
        let pick = |list: &[BlockId], graph: &Self| {
            list.iter()
                .enumerate()
                .max_by_key(|(_, id)| graph.block(**id).number())
                .map(|(at, id)| (at, *id))
        };

        let best_if = pick(&self.if_leaf_joins, self);
        let best_while = pick(&self.while_leaf_joins, self);

        match (best_if, best_while) {
            (None, None) => None,
            (Some((at, id)), None) => {
                self.if_leaf_joins.remove(at);
                Some(id)
            }
            (None, Some((at, id))) => {
                self.while_leaf_joins.remove(at);
                Some(id)
            }
            (Some((if_at, if_id)), Some((while_at, while_id))) => {
                if self.block(if_id).number() >= self.block(while_id).number() {
                    self.if_leaf_joins.remove(if_at);
                    Some(if_id)
                } else {
                    self.while_leaf_joins.remove(while_at);
                    Some(while_id)
                }
            }
        }
    }

    /// Removes and returns every pending leaf join numbered above `number`
    /// (the dangling joins left inside a loop body), highest first.
    pub(crate) fn drain_leaf_joins_above(&mut self, number: u32) -> Vec<BlockId> {
        let mut drained = Vec::new();
        let blocks = &self.blocks;
        for list in [&mut self.if_leaf_joins, &mut self.while_leaf_joins] {
            let mut at = 0;
            while at < list.len() {
                if blocks[list[at].index()].number().unwrap_or(0) > number {
                    drained.push(list.remove(at));
                } else {
                    at += 1;
                }
            }
        }
        drained.sort_by_key(|id| std::cmp::Reverse(blocks[id.index()].number()));
        drained
    }

    /// Returns the first instruction of `block`, falling back to the first
    /// instruction of the next non-empty block in layout order (used to
    /// resolve branch targets into blocks that are still empty).
    #[must_use]
    pub fn first_instruction_from(&self, block: BlockId) -> Option<InstrId> {
        let start = self.layout.iter().position(|id| *id == block)?;
        self.layout[start..]
            .iter()
            .map(|id| self.block(*id))
            .filter(|candidate| !candidate.is_deleted())
            .find_map(BasicBlock::first_instruction_id)
    }

    /// Re-derives the target operand of every trailing branch from its block's
    /// BRANCH-edge child. Forward branches are emitted before their targets
    /// exist; this runs during Pass A for loop nests and once more at end of
    /// program so that no branch ships with a placeholder target.
    pub(crate) fn repair_branch_targets(&mut self) {
        let layout: Vec<BlockId> = self.layout.clone();
        for block_id in layout {
            self.repair_block_branch_target(block_id);
        }
    }

    pub(crate) fn repair_block_branch_target(&mut self, block_id: BlockId) {
        if self.block(block_id).is_deleted() {
            return;
        }
        let Some(child) = self.block(block_id).child_by_relation(BlockRelation::Branch) else {
            return;
        };
        let Some(last) = self.block(block_id).instructions().last() else {
            return;
        };
        let (last_id, op) = (last.id(), last.op());
        if !op.is_branch() {
            return;
        }
        let Some(target) = self.first_instruction_from(child) else {
            return;
        };
        if op == Opcode::Bra {
            self.patch_x(last_id, Some(target));
        } else {
            self.patch_y(last_id, Some(target));
        }
    }

    /// Final renumbering: every surviving instruction id is shifted down by
    /// the count of removed ids below it, yielding a dense `0..N` numbering.
    /// Environments and the pools are remapped along; the CSE tables are
    /// cleared (construction is over).
    pub(crate) fn renumber_dense(&mut self) {
        let mut removed = std::mem::take(&mut self.removed);
        removed.sort_unstable();
        removed.dedup();
        if removed.is_empty() {
            return;
        }

        let map = |id: InstrId| {
            let below = removed.partition_point(|gone| *gone < id);
            InstrId::new(id.index() - below)
        };

        for block in &mut self.blocks {
            for instr in block.instructions_mut() {
                instr.renumber(&map);
            }
            block.vars = block
                .vars
                .drain()
                .map(|(name, id)| (name, map(id)))
                .collect();
            block.reserved_phis.clear();
            block.dom_cse.clear();
        }

        self.constants = self
            .constants
            .drain()
            .map(|(value, id)| (value, map(id)))
            .collect();
        self.bases = self.bases.drain().map(|(name, id)| (name, map(id))).collect();
        self.instr_block = self
            .instr_block
            .drain()
            .map(|(id, block)| (map(id), block))
            .collect();
        self.instr_count -= removed.len();
    }
}

impl Default for BlockGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockFlags;

    fn committed_child(graph: &mut BlockGraph, parent: BlockId, relation: BlockRelation) -> BlockId {
        let block = graph.create_block();
        graph.commit_block(block);
        graph.add_relationship(parent, block, relation);
        block
    }

    fn committed_root(graph: &mut BlockGraph) -> BlockId {
        let constant_block = graph.constant_block();
        committed_child(graph, constant_block, BlockRelation::Normal)
    }

    #[test]
    fn test_constant_block_is_block_zero() {
        let graph = BlockGraph::new();
        let constant_block = graph.block(graph.constant_block());
        assert_eq!(constant_block.number(), Some(0));
        assert_eq!(graph.current(), graph.constant_block());
    }

    #[test]
    fn test_commit_assigns_sequential_numbers() {
        let mut graph = BlockGraph::new();
        let early = graph.create_block();
        let late = graph.create_block();
        // Committed in reverse creation order - numbering reflects placement.
        graph.commit_block(late);
        graph.commit_block(early);
        assert_eq!(graph.block(late).number(), Some(1));
        assert_eq!(graph.block(early).number(), Some(2));
        assert_eq!(graph.current(), early);
    }

    #[test]
    fn test_constant_interning() {
        let mut graph = BlockGraph::new();
        let a = graph.add_constant(7);
        let b = graph.add_constant(7);
        let c = graph.add_constant(8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.block(graph.constant_block()).instructions().len(), 2);
        assert_eq!(graph.instruction(a).unwrap().constant_value(), Some(7));
    }

    #[test]
    fn test_cse_hit_reuses_and_allocates_nothing() {
        let mut graph = BlockGraph::new();
        let block = committed_root(&mut graph);
        let a = graph.add_constant(1);
        let b = graph.add_constant(2);

        let first = graph.add_instruction(block, Opcode::Add, Some(a), Some(b), false);
        let count = graph.allocated_instruction_count();
        let second = graph.add_instruction(block, Opcode::Add, Some(a), Some(b), false);

        assert!(first.is_new());
        assert_eq!(second, Emitted::Existing(first.id().unwrap()));
        assert_eq!(graph.allocated_instruction_count(), count);
        assert_eq!(graph.block(block).instructions().len(), 1);
    }

    #[test]
    fn test_in_loop_defers_cse_registration() {
        let mut graph = BlockGraph::new();
        let block = committed_root(&mut graph);
        let a = graph.add_constant(1);

        let first = graph.add_instruction(block, Opcode::Add, Some(a), Some(a), true);
        let second = graph.add_instruction(block, Opcode::Add, Some(a), Some(a), true);
        assert!(first.is_new());
        assert!(second.is_new());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_return_block_freezes_emission() {
        let mut graph = BlockGraph::new();
        let block = committed_root(&mut graph);
        let value = graph.add_constant(3);
        graph.add_instruction(block, Opcode::Ret, Some(value), None, false);
        graph.block_mut(block).set_flag(BlockFlags::RETURN);

        let count = graph.allocated_instruction_count();
        let dropped = graph.add_instruction(block, Opcode::Add, Some(value), Some(value), false);

        assert_eq!(dropped, Emitted::Discarded);
        // Id counter did not move - subsequent ids stay contiguous.
        assert_eq!(graph.allocated_instruction_count(), count);
        assert_eq!(graph.block(block).instructions().len(), 1);

        let ret_again = graph.add_instruction(block, Opcode::Ret, None, None, false);
        assert!(ret_again.is_new());
    }

    #[test]
    fn test_leaf_join_replaces_parent_top() {
        let mut graph = BlockGraph::new();
        let outer = committed_root(&mut graph);
        let inner = committed_child(&mut graph, outer, BlockRelation::FallThrough);

        graph.update_leaf_joins(LeafJoinKind::If, outer);
        // `inner` hangs off `outer`, so it replaces it instead of stacking.
        graph.update_leaf_joins(LeafJoinKind::If, inner);

        assert_eq!(graph.pop_lowest_placed_leaf_join(), Some(inner));
        assert_eq!(graph.pop_lowest_placed_leaf_join(), None);
    }

    #[test]
    fn test_pop_takes_highest_numbered_across_kinds() {
        let mut graph = BlockGraph::new();
        let first = committed_root(&mut graph);
        let second = committed_child(&mut graph, first, BlockRelation::Normal);
        let third = committed_child(&mut graph, first, BlockRelation::Branch);

        graph.update_leaf_joins(LeafJoinKind::If, second);
        graph.update_leaf_joins(LeafJoinKind::While, third);

        assert_eq!(graph.pop_lowest_placed_leaf_join(), Some(third));
        assert_eq!(graph.pop_lowest_placed_leaf_join(), Some(second));
    }

    #[test]
    fn test_renumber_dense_closes_gaps() {
        let mut graph = BlockGraph::new();
        let block = committed_root(&mut graph);
        let a = graph.add_constant(1);
        let b = graph.add_constant(2);
        let sum = graph
            .add_instruction(block, Opcode::Add, Some(a), Some(b), false)
            .id()
            .unwrap();
        let dead = graph
            .add_instruction(block, Opcode::Sub, Some(a), Some(b), false)
            .id()
            .unwrap();
        let product = graph
            .add_instruction(block, Opcode::Mul, Some(sum), Some(b), false)
            .id()
            .unwrap();

        graph.remove_instruction(block, dead);
        graph.renumber_dense();

        let mut ids: Vec<usize> = graph
            .blocks()
            .flat_map(|block| block.instructions().iter().map(|i| i.id().index()))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        // Operands moved with their defs.
        let product = graph.instruction(InstrId::new(product.index() - 1)).unwrap();
        assert_eq!(product.op(), Opcode::Mul);
        assert_eq!(product.x(), Some(sum));
    }

    #[test]
    fn test_first_instruction_from_skips_empty_blocks() {
        let mut graph = BlockGraph::new();
        let empty = committed_root(&mut graph);
        let filled = committed_child(&mut graph, empty, BlockRelation::Normal);
        let value = graph.add_constant(1);
        let id = graph
            .add_instruction(filled, Opcode::Write, Some(value), None, false)
            .id()
            .unwrap();

        assert_eq!(graph.first_instruction_from(empty), Some(id));
    }

    #[test]
    fn test_repair_branch_targets() {
        let mut graph = BlockGraph::new();
        let source = committed_root(&mut graph);
        let value = graph.add_constant(1);
        let cmp = graph
            .add_instruction(source, Opcode::Cmp, Some(value), Some(value), false)
            .id()
            .unwrap();
        let branch = graph
            .add_instruction(source, Opcode::Beq, Some(cmp), None, false)
            .id()
            .unwrap();

        let target = committed_child(&mut graph, source, BlockRelation::Branch);
        let landing = graph
            .add_instruction(target, Opcode::Nop, None, None, false)
            .id()
            .unwrap();

        graph.repair_branch_targets();
        assert_eq!(graph.instruction(branch).unwrap().y(), Some(landing));
    }
}
