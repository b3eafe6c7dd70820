//! Loop fix-up passes.
//!
//! Inside a `while` body, instruction operands and CSE decisions are
//! provisional: values that turn out to be loop-carried must be rerouted
//! through the header phis, and only then can subexpressions be compared
//! safely. Both passes therefore run once per *outermost* loop, when the whole
//! nest is parsed and the phi chains are stable.
//!
//! Pass A ([`propagate_loop_phis`]) reroutes operands through the phis and
//! patches forward branch targets. Pass B ([`eliminate_loop_subexpressions`])
//! runs dominance-scoped CSE across the loop, including redundant-load
//! detection against the per-array STORE/LOAD history, and physically removes
//! the duplicates. The ids freed here are compacted by the graph's
//! end-of-program renumbering.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockGraph, BlockId, BlockRelation, CseKey, InstrId, Opcode};

/// Pass A: reroute loop-carried operands through the header phis and patch
/// branch targets.
///
/// Walks the control-flow-reachable blocks in increasing number order
/// (deterministic left-to-right propagation matching source order), carrying a
/// map from superseded value to phi id. The map is seeded from the header's
/// phis (whose own operands stay untouched) and extended at every phi
/// encountered deeper in the nest, so multi-block chains propagate.
pub(crate) fn propagate_loop_phis(graph: &mut BlockGraph, header: BlockId) {
    let mut substitutions: HashMap<InstrId, InstrId> = HashMap::new();
    for phi in graph.block(header).phis() {
        if let Some(old) = phi.x() {
            substitutions.insert(old, phi.id());
        }
    }

    for block_id in loop_blocks_by_number(graph, header) {
        rewrite_block_operands(graph, block_id, header, &mut substitutions);
        graph.repair_block_branch_target(block_id);
    }
}

fn rewrite_block_operands(
    graph: &mut BlockGraph,
    block_id: BlockId,
    header: BlockId,
    substitutions: &mut HashMap<InstrId, InstrId>,
) {
    let ids: Vec<InstrId> = graph
        .block(block_id)
        .instructions()
        .iter()
        .map(|instr| instr.id())
        .collect();

    for id in ids {
        let Some(instr) = graph.instruction(id) else {
            continue;
        };
        if instr.op() == Opcode::Phi {
            // The header's own phis define the substitutions.
            if block_id == header {
                continue;
            }
            let old_x = instr.x();
            let (x, y) = (instr.x(), instr.y());
            if let Some(new) = x.and_then(|v| substitutions.get(&v).copied()) {
                graph.patch_x(id, Some(new));
            }
            if let Some(new) = y.and_then(|v| substitutions.get(&v).copied()) {
                graph.patch_y(id, Some(new));
            }
            // Downstream of this phi, the value it supersedes resolves to it.
            if let Some(old_x) = old_x {
                substitutions.insert(old_x, id);
            }
            continue;
        }

        let (x, y) = instr.value_operands();
        if let Some(new) = x.and_then(|v| substitutions.get(&v).copied()) {
            graph.patch_x(id, Some(new));
        }
        if let Some(new) = y.and_then(|v| substitutions.get(&v).copied()) {
            graph.patch_y(id, Some(new));
        }
    }
}

/// One entry of the per-array access history Pass B scans for redundant
/// loads.
#[derive(Clone)]
struct ArrayAccess {
    op: Opcode,
    address: InstrId,
    /// The load's own id, or the stored value for a STORE.
    value: InstrId,
}

/// Pass B: dominance-scoped CSE across the loop.
///
/// Every block starts from its immediate dominator's table (the DOM-edge
/// parent for joins, otherwise the lowest-numbered processed parent; the
/// header starts from its build-time table, which holds the pre-loop
/// entries). Pending substitutions are applied to each instruction's operands
/// *before* its own CSE membership is decided, so chains collapse in one
/// pass. Redundant loads resolve against the array history; a KILL resets
/// both table and history for its array.
pub(crate) fn eliminate_loop_subexpressions(
    graph: &mut BlockGraph,
    header: BlockId,
    array_addresses: &HashMap<String, HashSet<InstrId>>,
) {
    let order = loop_blocks_by_number(graph, header);
    let mut tables: HashMap<BlockId, HashMap<CseKey, InstrId>> = HashMap::new();
    let mut histories: HashMap<BlockId, HashMap<String, Vec<ArrayAccess>>> = HashMap::new();
    let mut substitutions: HashMap<InstrId, InstrId> = HashMap::new();

    for block_id in order.iter().copied() {
        let (mut table, mut history) = if block_id == header {
            (graph.block(header).dom_cse.clone(), HashMap::new())
        } else {
            match immediate_dominator(graph, block_id, &tables) {
                Some(idom) => (tables[&idom].clone(), histories[&idom].clone()),
                None => (HashMap::new(), HashMap::new()),
            }
        };

        let ids: Vec<InstrId> = graph
            .block(block_id)
            .instructions()
            .iter()
            .map(|instr| instr.id())
            .collect();

        for id in ids {
            apply_substitutions(graph, id, &substitutions);
            let Some(instr) = graph.instruction(id) else {
                continue;
            };
            match instr.op() {
                Opcode::Kill => {
                    if let Some(array) = instr.array().map(str::to_string) {
                        if let Some(addresses) = array_addresses.get(&array) {
                            evict_array_entries(&mut table, addresses);
                        }
                        history.remove(&array);
                    }
                }
                Opcode::Load => {
                    let (Some(address), Some(array)) =
                        (instr.x(), instr.array().map(str::to_string))
                    else {
                        continue;
                    };
                    if let Some(replacement) =
                        resolve_load(graph, history.get(&array), address)
                            .or_else(|| table.get(&(Opcode::Load, Some(address), None)).copied())
                    {
                        substitutions.insert(id, replacement);
                        graph.remove_instruction(block_id, id);
                    } else {
                        history.entry(array).or_default().push(ArrayAccess {
                            op: Opcode::Load,
                            address,
                            value: id,
                        });
                        table.insert((Opcode::Load, Some(address), None), id);
                    }
                }
                Opcode::Store => {
                    let (Some(value), Some(address), Some(array)) =
                        (instr.x(), instr.y(), instr.array().map(str::to_string))
                    else {
                        continue;
                    };
                    if let Some(addresses) = array_addresses.get(&array) {
                        evict_array_entries(&mut table, addresses);
                    }
                    // Stores are never memoized; loads reuse them through the
                    // history scan only.
                    history.entry(array).or_default().push(ArrayAccess {
                        op: Opcode::Store,
                        address,
                        value,
                    });
                }
                op if !op.is_cse_exempt() => {
                    let key = (op, instr.x(), instr.y());
                    if let Some(existing) = table.get(&key).copied() {
                        substitutions.insert(id, existing);
                        graph.remove_instruction(block_id, id);
                    } else {
                        table.insert(key, id);
                    }
                }
                _ => {}
            }
        }

        tables.insert(block_id, table);
        histories.insert(block_id, history);
    }

    if substitutions.is_empty() {
        return;
    }

    // Second sweep: phis visited early may reference instructions removed
    // later (a header phi's loop-carried operand in particular), and block
    // environments still point at removed ids.
    for block_id in order {
        let ids: Vec<InstrId> = graph
            .block(block_id)
            .instructions()
            .iter()
            .map(|instr| instr.id())
            .collect();
        for id in ids {
            apply_substitutions(graph, id, &substitutions);
        }

        let stale: Vec<(String, InstrId)> = graph
            .block(block_id)
            .vars
            .iter()
            .filter(|(_, value)| substitutions.contains_key(value))
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        for (name, value) in stale {
            let resolved = resolve(&substitutions, value);
            graph.block_mut(block_id).vars.insert(name, resolved);
        }
    }
}

/// The table a block inherits comes from its immediate dominator: the
/// DOM-edge parent when that parent has been processed, otherwise the
/// lowest-numbered processed control-flow parent (branch arms hang off their
/// dominator directly, so both resolutions agree for them; joins need the
/// DOM edge because neither arm dominates them).
fn immediate_dominator(
    graph: &BlockGraph,
    block_id: BlockId,
    tables: &HashMap<BlockId, HashMap<CseKey, InstrId>>,
) -> Option<BlockId> {
    let block = graph.block(block_id);
    let dom_parent = block
        .parents()
        .iter()
        .find(|(_, relation)| **relation == BlockRelation::Dom)
        .map(|(parent, _)| *parent);
    if let Some(parent) = dom_parent {
        if tables.contains_key(&parent) {
            return Some(parent);
        }
    }
    block
        .parents()
        .iter()
        .filter(|(parent, relation)| relation.is_control_flow() && tables.contains_key(*parent))
        .map(|(parent, _)| *parent)
        .min_by_key(|parent| graph.block(*parent).number())
}

/// Scans an array's access history backward for a value the load can reuse.
///
/// A STORE through the same address forwards its value unless that value or
/// the address derives from READ (external input is opaque). A STORE through
/// a *different* address may alias and stops the scan. Earlier loads of the
/// same address are reused directly.
fn resolve_load(
    graph: &BlockGraph,
    history: Option<&Vec<ArrayAccess>>,
    address: InstrId,
) -> Option<InstrId> {
    for access in history?.iter().rev() {
        match access.op {
            Opcode::Store if access.address == address => {
                if graph.originates_from_read(access.value)
                    || graph.originates_from_read(address)
                {
                    return None;
                }
                return Some(access.value);
            }
            Opcode::Store => return None,
            Opcode::Load if access.address == address => return Some(access.value),
            _ => {}
        }
    }
    None
}

fn evict_array_entries(table: &mut HashMap<CseKey, InstrId>, addresses: &HashSet<InstrId>) {
    table.retain(|(op, x, y), _| match op {
        Opcode::Load => !x.is_some_and(|addr| addresses.contains(&addr)),
        Opcode::Store => !y.is_some_and(|addr| addresses.contains(&addr)),
        _ => true,
    });
}

fn apply_substitutions(
    graph: &mut BlockGraph,
    id: InstrId,
    substitutions: &HashMap<InstrId, InstrId>,
) {
    let Some(instr) = graph.instruction(id) else {
        return;
    };
    let (x, y) = instr.value_operands();
    if let Some(x) = x {
        let resolved = resolve(substitutions, x);
        if resolved != x {
            graph.patch_x(id, Some(resolved));
        }
    }
    if let Some(y) = y {
        let resolved = resolve(substitutions, y);
        if resolved != y {
            graph.patch_y(id, Some(resolved));
        }
    }
}

/// Chases a substitution chain to its final replacement.
fn resolve(substitutions: &HashMap<InstrId, InstrId>, mut id: InstrId) -> InstrId {
    let mut hops = 0;
    while let Some(next) = substitutions.get(&id).copied() {
        id = next;
        hops += 1;
        if hops > substitutions.len() {
            break;
        }
    }
    id
}

/// Blocks control-flow-reachable from `header`, in increasing number order.
fn loop_blocks_by_number(graph: &BlockGraph, header: BlockId) -> Vec<BlockId> {
    let mut visited: HashSet<BlockId> = HashSet::from([header]);
    let mut stack = vec![header];
    while let Some(block) = stack.pop() {
        for (child, relation) in graph.block(block).children() {
            if relation.is_control_flow()
                && !graph.block(*child).is_deleted()
                && visited.insert(*child)
            {
                stack.push(*child);
            }
        }
    }
    let mut order: Vec<BlockId> = visited
        .into_iter()
        .filter(|id| graph.block(*id).number().is_some())
        .collect();
    order.sort_by_key(|id| graph.block(*id).number());
    order
}

#[cfg(test)]
mod tests {
    use crate::ir::{Opcode, SsaBuilder};

    #[test]
    fn test_loop_body_duplicates_collapse() {
        let mut builder = SsaBuilder::new();
        let zero = builder.constant(0);
        builder.assign("x", zero);

        builder.open_while();
        let x = builder.variable("x").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_while_body(branch);

        // Two identical multiplications; elimination is deferred until the
        // loop closes because operands may still be rewritten.
        let x1 = builder.variable("x").unwrap();
        let two = builder.constant(2);
        let first = builder.binary(Opcode::Mul, x1, two.clone());
        let x2 = builder.variable("x").unwrap();
        let second = builder.binary(Opcode::Mul, x2, two);
        assert_ne!(first.id(), second.id());
        builder.assign("y", second);

        let x3 = builder.variable("x").unwrap();
        let one = builder.constant(1);
        let next = builder.binary(Opcode::Add, x3, one);
        builder.assign("x", next);
        builder.close_while();

        let muls = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .filter(|instr| instr.op() == Opcode::Mul)
            .count();
        assert_eq!(muls, 1);

        // The surviving mul consumes the header phi for x.
        let phi = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .find(|instr| instr.op() == Opcode::Phi)
            .expect("loop phi")
            .id();
        let mul = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .find(|instr| instr.op() == Opcode::Mul)
            .unwrap();
        assert_eq!(mul.x(), Some(phi));
    }

    #[test]
    fn test_loop_invariant_reuses_preloop_instruction() {
        let mut builder = SsaBuilder::new();
        let one = builder.constant(1);
        builder.assign("a", one.clone());
        let two = builder.constant(2);
        let preloop = builder.binary(Opcode::Add, one.clone(), two.clone());
        builder.assign("b", preloop.clone());

        builder.open_while();
        let b = builder.variable("b").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(b, Opcode::Bge, ten);
        builder.enter_while_body(branch);

        // Same expression over loop-invariant operands - Pass B resolves it
        // against the pre-loop table inherited by the header.
        let again = builder.binary(Opcode::Add, one, two);
        let inner_id = again.id();

        let b2 = builder.variable("b").unwrap();
        let next = builder.binary(Opcode::Add, b2, again);
        builder.assign("b", next.clone());
        builder.close_while();

        assert!(builder.graph().instruction(inner_id).is_none());
        let next_instr = builder.graph().instruction(next.id()).unwrap();
        assert_eq!(next_instr.y(), Some(preloop.id()));
    }

    #[test]
    fn test_join_inside_loop_inherits_dominator_table() {
        let mut builder = SsaBuilder::new();
        let zero = builder.constant(0);
        builder.assign("x", zero);

        builder.open_while();
        let x = builder.variable("x").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(x, Opcode::Bge, ten);
        builder.enter_while_body(branch);

        let x1 = builder.variable("x").unwrap();
        let three = builder.constant(3);
        let first = builder.binary(Opcode::Mul, x1, three.clone());
        builder.assign("t", first);

        builder.open_if();
        let x2 = builder.variable("x").unwrap();
        let five = builder.constant(5);
        let inner = builder.relation(x2, Opcode::Bge, five);
        builder.enter_then(inner);
        let one = builder.constant(1);
        builder.assign("y", one);
        builder.enter_else();
        let two = builder.constant(2);
        builder.assign("y", two);
        builder.close_if();

        // Same multiplication again in the if-join; its table is inherited
        // across the blocks between it and the copy before the branch.
        let x3 = builder.variable("x").unwrap();
        let second = builder.binary(Opcode::Mul, x3, three);
        let second_id = second.id();
        builder.assign("u", second);

        let x4 = builder.variable("x").unwrap();
        let one = builder.constant(1);
        let next = builder.binary(Opcode::Add, x4, one);
        builder.assign("x", next);
        builder.close_while();

        assert!(builder.graph().instruction(second_id).is_none());
        let muls = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .filter(|instr| instr.op() == Opcode::Mul)
            .count();
        assert_eq!(muls, 1);
    }

    #[test]
    fn test_duplicate_stores_both_survive() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let zero = builder.constant(0);
        builder.assign("i", zero);

        builder.open_while();
        let i = builder.variable("i").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(i, Opcode::Bge, ten);
        builder.enter_while_body(branch);

        // Two identical stores are both observable memory writes; neither
        // build-time CSE nor the loop pass may merge them.
        let three = builder.constant(3);
        let seven = builder.constant(7);
        let addr1 = builder.array_address("a", &[three.clone()]);
        builder.store_array("a", addr1, seven.clone());
        let addr2 = builder.array_address("a", &[three]);
        builder.store_array("a", addr2, seven);

        let i2 = builder.variable("i").unwrap();
        let one = builder.constant(1);
        let next = builder.binary(Opcode::Add, i2, one);
        builder.assign("i", next);
        builder.close_while();

        let stores = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .filter(|instr| instr.op() == Opcode::Store)
            .count();
        assert_eq!(stores, 2);
    }

    #[test]
    fn test_loop_redundant_load_collapses() {
        let mut builder = SsaBuilder::new();
        builder.declare_array("a", vec![10]);
        let zero = builder.constant(0);
        builder.assign("s", zero);

        builder.open_while();
        let s = builder.variable("s").unwrap();
        let ten = builder.constant(10);
        let branch = builder.relation(s, Opcode::Bge, ten);
        builder.enter_while_body(branch);

        let three = builder.constant(3);
        let addr1 = builder.array_address("a", &[three.clone()]);
        let first = builder.load_array("a", addr1);
        let addr2 = builder.array_address("a", &[three]);
        let second = builder.load_array("a", addr2);
        assert_ne!(first.id(), second.id());
        let sum = builder.binary(Opcode::Add, first.clone(), second);
        builder.assign("s", sum);
        builder.close_while();

        let loads = builder
            .graph()
            .blocks()
            .flat_map(|block| block.instructions())
            .filter(|instr| instr.op() == Opcode::Load)
            .count();
        assert_eq!(loads, 1);
    }
}
