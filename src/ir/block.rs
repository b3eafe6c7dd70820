//! Basic blocks and their typed graph edges.
//!
//! A [`BasicBlock`] holds its instructions in program order plus the per-block
//! SSA bookkeeping: the variable environment (source variable to last-assigned
//! instruction, copy-on-branch), the set of updated variables used to compute
//! join intersections, the reserved-phi map that prevents duplicate phis, the
//! dominance-scoped CSE table, and the parent/child edge maps.
//!
//! Blocks are addressed by [`BlockId`] (an index into the graph's arena), which
//! keeps the cyclic graph - while back-edges point upwards - free of ownership
//! cycles. A block's *display number* is assigned separately, when the block is
//! committed into the graph's layout; join blocks are allocated before the
//! branches they join are known but numbered after them, so numbering reflects
//! final placement, not creation order.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use bitflags::bitflags;
use strum::Display;

use crate::ir::{CseKey, InstrId, Instruction, Opcode};

/// Index of a basic block in the graph's arena.
///
/// Stable for the lifetime of the graph; unrelated to the block's display
/// number, which is only assigned at commit time.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a new block identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// The kind of relation an edge between two blocks carries.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum BlockRelation {
    /// Straight-line fallthrough into a fresh block.
    Normal,
    /// The "then"/loop-body edge.
    FallThrough,
    /// The "else"/loop-exit edge, and the edge a `BRA` takes into a join.
    Branch,
    /// Dominance-only edge, used purely for CSE propagation, not control flow.
    Dom,
}

impl BlockRelation {
    /// Returns `true` if the edge carries control flow (everything except
    /// [`BlockRelation::Dom`]).
    #[must_use]
    pub const fn is_control_flow(&self) -> bool {
        !matches!(self, BlockRelation::Dom)
    }
}

bitflags! {
    /// Status flags of a basic block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        /// The block is a while-loop header.
        const LOOP_HEADER = 1 << 0;
        /// The block is a control-flow join point (holds at least one phi).
        const JOIN = 1 << 1;
        /// The block is terminated by `return`; no further computation may be
        /// appended (enforced by the builder, callers must check first).
        const RETURN = 1 << 2;
        /// The block was deleted during while-close cleanup; it is skipped by
        /// traversals and rendering.
        const DELETED = 1 << 3;
    }
}

/// A basic block of SSA instructions.
#[derive(Debug)]
pub struct BasicBlock {
    id: BlockId,
    number: Option<u32>,
    instructions: Vec<Instruction>,
    flags: BlockFlags,

    /// Variable environment: source variable to last-assigned instruction,
    /// copied from the parent when the block is opened.
    pub(crate) vars: HashMap<String, InstrId>,
    /// Variables with a known value along the path into this block
    /// (accumulated across parents; used to compute join intersections).
    pub(crate) updated_vars: HashSet<String>,
    /// Variables for which a phi id has already been reserved in this block.
    pub(crate) reserved_phis: HashMap<String, InstrId>,
    /// Dominance-scoped CSE table, valid along the current dominance chain.
    pub(crate) dom_cse: HashMap<CseKey, InstrId>,
    /// Arrays stored to along the path into this block.
    pub(crate) stored_arrays: HashSet<String>,

    parents: BTreeMap<BlockId, BlockRelation>,
    children: BTreeMap<BlockId, BlockRelation>,
}

impl BasicBlock {
    /// Creates a new block with no number, no edges and empty state.
    #[must_use]
    pub(crate) fn new(id: BlockId) -> Self {
        Self {
            id,
            number: None,
            instructions: Vec::new(),
            flags: BlockFlags::empty(),
            vars: HashMap::new(),
            updated_vars: HashSet::new(),
            reserved_phis: HashMap::new(),
            dom_cse: HashMap::new(),
            stored_arrays: HashSet::new(),
            parents: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    /// Returns the arena identifier of this block.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the display number, if the block has been committed.
    #[must_use]
    pub const fn number(&self) -> Option<u32> {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u32) {
        debug_assert!(self.number.is_none(), "block committed twice");
        self.number = Some(number);
    }

    /// Returns the status flags.
    #[must_use]
    pub const fn flags(&self) -> BlockFlags {
        self.flags
    }

    pub(crate) fn set_flag(&mut self, flag: BlockFlags) {
        self.flags |= flag;
    }

    /// Returns `true` if the block is a while-loop header.
    #[must_use]
    pub const fn is_loop_header(&self) -> bool {
        self.flags.contains(BlockFlags::LOOP_HEADER)
    }

    /// Returns `true` if the block is a join point.
    #[must_use]
    pub const fn is_join(&self) -> bool {
        self.flags.contains(BlockFlags::JOIN)
    }

    /// Returns `true` if the block is frozen by a `return`.
    #[must_use]
    pub const fn is_return_block(&self) -> bool {
        self.flags.contains(BlockFlags::RETURN)
    }

    /// Returns `true` if the block was deleted during loop cleanup.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.flags.contains(BlockFlags::DELETED)
    }

    /// Returns the instructions in program order.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub(crate) fn instructions_mut(&mut self) -> &mut Vec<Instruction> {
        &mut self.instructions
    }

    /// Returns the id of the first instruction, if the block has any.
    #[must_use]
    pub fn first_instruction_id(&self) -> Option<InstrId> {
        self.instructions.first().map(Instruction::id)
    }

    /// Looks up an instruction of this block by id.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.iter().find(|instr| instr.id() == id)
    }

    pub(crate) fn instruction_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        self.instructions.iter_mut().find(|instr| instr.id() == id)
    }

    /// Appends an instruction; phis in a loop header are inserted at the front
    /// of the list, after any already-present phis, so all phis remain
    /// contiguous at the head.
    pub(crate) fn push_instruction(&mut self, instr: Instruction) {
        if instr.op() == Opcode::Phi && self.is_loop_header() {
            let at = self.leading_phi_count();
            self.instructions.insert(at, instr);
        } else {
            self.instructions.push(instr);
        }
    }

    /// Inserts a non-phi instruction right after the leading phis (used for
    /// the KILL markers a loop header receives for arrays stored in its body).
    pub(crate) fn insert_after_phis(&mut self, instr: Instruction) {
        let at = self.leading_phi_count();
        self.instructions.insert(at, instr);
    }

    fn leading_phi_count(&self) -> usize {
        self.instructions
            .iter()
            .take_while(|instr| instr.op() == Opcode::Phi)
            .count()
    }

    /// Removes an instruction by id; returns it if it was present.
    pub(crate) fn remove_instruction(&mut self, id: InstrId) -> Option<Instruction> {
        let at = self.instructions.iter().position(|i| i.id() == id)?;
        Some(self.instructions.remove(at))
    }

    /// Returns the phi instructions of this block (always a leading prefix in
    /// loop headers, in creation order elsewhere).
    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|instr| instr.op() == Opcode::Phi)
    }

    /// Returns the variable environment of this block (debugging/inspection
    /// contract; the builder is the only writer).
    #[must_use]
    pub fn variables(&self) -> &HashMap<String, InstrId> {
        &self.vars
    }

    /// Looks up the current value of a source variable.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<InstrId> {
        self.vars.get(name).copied()
    }

    pub(crate) fn assign_variable(&mut self, name: &str, value: InstrId) {
        self.vars.insert(name.to_string(), value);
        self.updated_vars.insert(name.to_string());
    }

    /// Copies the parent's environment into this block: variable values,
    /// update set, dominance CSE table and stored-array set. Copy-on-branch -
    /// later writes never flow back to the parent.
    pub(crate) fn inherit_from(&mut self, parent: &BasicBlock) {
        self.vars = parent.vars.clone();
        self.updated_vars = parent.updated_vars.clone();
        self.dom_cse = parent.dom_cse.clone();
        self.stored_arrays = parent.stored_arrays.clone();
    }

    /// Removes every LOAD/STORE entry reached through one of the given
    /// addresses from the CSE table (a store may clobber any slot of the
    /// array, so cached loads and prior stores through any of its addresses
    /// become stale).
    pub(crate) fn evict_array_entries(&mut self, addresses: &HashSet<InstrId>) {
        self.dom_cse.retain(|(op, x, y), _| match op {
            Opcode::Load => !x.is_some_and(|addr| addresses.contains(&addr)),
            Opcode::Store => !y.is_some_and(|addr| addresses.contains(&addr)),
            _ => true,
        });
    }

    /// Returns the parent edges with their relation kinds.
    #[must_use]
    pub fn parents(&self) -> &BTreeMap<BlockId, BlockRelation> {
        &self.parents
    }

    /// Returns the child edges with their relation kinds.
    #[must_use]
    pub fn children(&self) -> &BTreeMap<BlockId, BlockRelation> {
        &self.children
    }

    /// Returns the child reached over the given relation kind, if any.
    #[must_use]
    pub fn child_by_relation(&self, relation: BlockRelation) -> Option<BlockId> {
        self.children
            .iter()
            .find(|(_, rel)| **rel == relation)
            .map(|(id, _)| *id)
    }

    /// Returns `true` if the block has any control-flow child.
    #[must_use]
    pub fn has_control_flow_children(&self) -> bool {
        self.children.values().any(BlockRelation::is_control_flow)
    }

    pub(crate) fn add_parent(&mut self, parent: BlockId, relation: BlockRelation) {
        self.parents.insert(parent, relation);
    }

    pub(crate) fn add_child(&mut self, child: BlockId, relation: BlockRelation) {
        self.children.insert(child, relation);
    }

    pub(crate) fn remove_parent(&mut self, parent: BlockId) {
        self.parents.remove(&parent);
    }

    pub(crate) fn remove_child(&mut self, child: BlockId) {
        self.children.remove(&child);
    }

    /// Returns `true` if `other` is a parent of this block.
    #[must_use]
    pub fn has_parent(&self, other: BlockId) -> bool {
        self.parents.contains_key(&other)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(number) => writeln!(f, "BB{number}:")?,
            None => writeln!(f, "BB?:")?,
        }
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(id: usize, op: Opcode) -> Instruction {
        Instruction::new(InstrId::new(id), op, None, None)
    }

    #[test]
    fn test_block_creation() {
        let block = BasicBlock::new(BlockId::new(3));
        assert_eq!(block.id(), BlockId::new(3));
        assert_eq!(block.number(), None);
        assert!(block.instructions().is_empty());
        assert!(!block.is_join());
        assert!(!block.is_loop_header());
    }

    #[test]
    fn test_phi_front_insertion_in_loop_header() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.set_flag(BlockFlags::LOOP_HEADER);

        block.push_instruction(instr(5, Opcode::Cmp));
        block.push_instruction(instr(6, Opcode::Blt));
        block.push_instruction(instr(7, Opcode::Phi));
        block.push_instruction(instr(8, Opcode::Phi));

        let ops: Vec<_> = block.instructions().iter().map(Instruction::op).collect();
        assert_eq!(ops, vec![Opcode::Phi, Opcode::Phi, Opcode::Cmp, Opcode::Blt]);
        // Second phi lands after the first, keeping reservation order.
        assert_eq!(block.instructions()[0].id(), InstrId::new(7));
        assert_eq!(block.instructions()[1].id(), InstrId::new(8));
    }

    #[test]
    fn test_phi_appended_in_plain_join() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.push_instruction(instr(5, Opcode::Nop));
        block.push_instruction(instr(6, Opcode::Phi));
        assert_eq!(block.instructions()[1].op(), Opcode::Phi);
    }

    #[test]
    fn test_insert_after_phis() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.set_flag(BlockFlags::LOOP_HEADER);
        block.push_instruction(instr(4, Opcode::Cmp));
        block.push_instruction(instr(5, Opcode::Phi));
        block.insert_after_phis(instr(6, Opcode::Kill));

        let ids: Vec<_> = block
            .instructions()
            .iter()
            .map(|i| i.id().index())
            .collect();
        assert_eq!(ids, vec![5, 6, 4]);
    }

    #[test]
    fn test_inherit_from_is_copy_on_branch() {
        let mut parent = BasicBlock::new(BlockId::new(0));
        parent.assign_variable("x", InstrId::new(1));
        parent
            .dom_cse
            .insert((Opcode::Add, Some(InstrId::new(1)), None), InstrId::new(2));

        let mut child = BasicBlock::new(BlockId::new(1));
        child.inherit_from(&parent);
        child.assign_variable("x", InstrId::new(9));

        assert_eq!(parent.variable("x"), Some(InstrId::new(1)));
        assert_eq!(child.variable("x"), Some(InstrId::new(9)));
        assert_eq!(child.dom_cse.len(), 1);
    }

    #[test]
    fn test_evict_array_entries() {
        let mut block = BasicBlock::new(BlockId::new(0));
        let addr = InstrId::new(4);
        let other = InstrId::new(7);
        block
            .dom_cse
            .insert((Opcode::Load, Some(addr), None), InstrId::new(5));
        block
            .dom_cse
            .insert((Opcode::Load, Some(other), None), InstrId::new(8));
        block
            .dom_cse
            .insert((Opcode::Store, Some(InstrId::new(2)), Some(addr)), InstrId::new(6));
        block
            .dom_cse
            .insert((Opcode::Add, Some(addr), Some(other)), InstrId::new(9));

        let addresses = HashSet::from([addr]);
        block.evict_array_entries(&addresses);

        assert!(!block.dom_cse.contains_key(&(Opcode::Load, Some(addr), None)));
        assert!(!block
            .dom_cse
            .contains_key(&(Opcode::Store, Some(InstrId::new(2)), Some(addr))));
        assert!(block.dom_cse.contains_key(&(Opcode::Load, Some(other), None)));
        assert!(block
            .dom_cse
            .contains_key(&(Opcode::Add, Some(addr), Some(other))));
    }

    #[test]
    fn test_edges() {
        let mut block = BasicBlock::new(BlockId::new(2));
        block.add_child(BlockId::new(3), BlockRelation::FallThrough);
        block.add_child(BlockId::new(4), BlockRelation::Branch);
        block.add_parent(BlockId::new(1), BlockRelation::Normal);

        assert_eq!(
            block.child_by_relation(BlockRelation::Branch),
            Some(BlockId::new(4))
        );
        assert_eq!(block.child_by_relation(BlockRelation::Dom), None);
        assert!(block.has_parent(BlockId::new(1)));
        assert!(block.has_control_flow_children());
    }

    #[test]
    fn test_dom_edge_is_not_control_flow() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.add_child(BlockId::new(1), BlockRelation::Dom);
        assert!(!block.has_control_flow_children());
        assert!(BlockRelation::Branch.is_control_flow());
        assert!(!BlockRelation::Dom.is_control_flow());
    }

    #[test]
    fn test_remove_instruction() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.push_instruction(instr(1, Opcode::Add));
        block.push_instruction(instr(2, Opcode::Sub));

        let removed = block.remove_instruction(InstrId::new(1));
        assert!(removed.is_some());
        assert_eq!(block.instructions().len(), 1);
        assert_eq!(block.first_instruction_id(), Some(InstrId::new(2)));
        assert!(block.remove_instruction(InstrId::new(1)).is_none());
    }

    #[test]
    fn test_display() {
        let mut block = BasicBlock::new(BlockId::new(0));
        block.set_number(2);
        block.push_instruction(instr(3, Opcode::Read));
        let text = block.to_string();
        assert!(text.contains("BB2:"));
        assert!(text.contains("3: read"));
    }
}
