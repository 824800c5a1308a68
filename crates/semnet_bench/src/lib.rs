//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use semnet_core::{Address, ContentStream, ElementType, Memory};

/// Random bytes of the given length.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// A hub node with `fan_out` member nodes hanging off it in one commit.
///
/// Returns the hub and the members.
pub fn build_fan(memory: &Memory, fan_out: usize) -> (Address, Vec<Address>) {
    memory
        .transaction(|txn| {
            let hub = memory.node_new_in_txn(txn, ElementType::CONST_NODE_CLASS)?;
            let mut members = Vec::with_capacity(fan_out);
            for _ in 0..fan_out {
                let member = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, hub, member)?;
                members.push(member);
            }
            Ok((hub, members))
        })
        .expect("Failed to build fan")
}

/// A random graph: `nodes` nodes, a named link for every tenth node and
/// `arcs` arcs between random nodes, each arc carrying a role attribute
/// with probability one in four.
pub fn build_random_graph(memory: &Memory, nodes: usize, arcs: usize) -> Vec<Address> {
    let mut rng = rand::thread_rng();
    let role = memory
        .node_new(ElementType::CONST_NODE_ROLE)
        .expect("Failed to create role");
    memory
        .transaction(|txn| {
            let mut created = Vec::with_capacity(nodes);
            for i in 0..nodes {
                let node = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                if i % 10 == 0 {
                    let link = memory.link_new_in_txn(txn, ElementType::CONST_LINK)?;
                    let name = format!("node_{i}");
                    memory.set_link_content_in_txn(txn, link, ContentStream::from_str_content(&name))?;
                    memory.arc_new_in_txn(txn, ElementType::CONST_COMMON_ARC, node, link)?;
                }
                created.push(node);
            }
            if nodes > 1 {
                for _ in 0..arcs {
                    let begin = created[rng.gen_range(0..nodes)];
                    let end = created[rng.gen_range(0..nodes)];
                    if begin == end {
                        continue;
                    }
                    let arc = memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, begin, end)?;
                    if rng.gen_ratio(1, 4) {
                        memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, role, arc)?;
                    }
                }
            }
            Ok(created)
        })
        .expect("Failed to build random graph")
}
