//! Integration test helpers.
//!
//! [`IntegrationHarness`] mirrors the graph in plain maps so that a run of
//! operations can be checked against the public API afterwards. The
//! submodules hold end-to-end checks shared by the test suites.

use crate::generators::GraphOperation;
use semnet_core::{Address, ContentStream, ElementType, Memory};
use std::collections::HashMap;

#[derive(Debug, Clone)]
enum Tracked {
    Node(ElementType),
    Link(Vec<u8>),
    Connector {
        ty: ElementType,
        begin: Address,
        end: Address,
    },
}

/// Plain model of the expected graph.
#[derive(Debug, Default)]
pub struct IntegrationHarness {
    elements: HashMap<Address, Tracked>,
    /// Live elements in creation order; generated indices pick from here.
    live: Vec<Address>,
    erased: Vec<Address>,
}

impl IntegrationHarness {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live elements the model expects.
    pub fn tracked_count(&self) -> usize {
        self.live.len()
    }

    /// Creates a node and tracks it.
    pub fn node(&mut self, memory: &Memory, ty: ElementType) -> Address {
        let addr = memory.node_new(ty).expect("Failed to create node");
        self.track(addr, Tracked::Node(ty));
        addr
    }

    /// Creates a constant link with `content` in one transaction and tracks it.
    pub fn link(&mut self, memory: &Memory, content: &[u8]) -> Address {
        let addr = memory
            .transaction(|txn| {
                let link = memory.link_new_in_txn(txn, ElementType::CONST_LINK)?;
                memory.set_link_content_in_txn(txn, link, ContentStream::from_bytes(content))?;
                Ok(link)
            })
            .expect("Failed to create link");
        self.track(addr, Tracked::Link(content.to_vec()));
        addr
    }

    /// Creates a connector and tracks it.
    pub fn arc(&mut self, memory: &Memory, ty: ElementType, begin: Address, end: Address) -> Address {
        let addr = memory
            .arc_new(ty, begin, end)
            .expect("Failed to create connector");
        self.track(addr, Tracked::Connector { ty, begin, end });
        addr
    }

    /// Erases an element and checks the cascade size against the model.
    pub fn erase(&mut self, memory: &Memory, addr: Address) {
        let expected = self.cascade(addr);
        let erased = memory.erase_element(addr).expect("Failed to erase");
        assert_eq!(erased, expected.len(), "Cascade size for {addr}");
        for gone in expected {
            self.elements.remove(&gone);
            self.live.retain(|a| *a != gone);
            self.erased.push(gone);
        }
    }

    /// Replaces link content and tracks it.
    pub fn set_content(&mut self, memory: &Memory, addr: Address, content: &[u8]) {
        memory
            .set_link_content(addr, ContentStream::from_bytes(content))
            .expect("Failed to set content");
        self.elements.insert(addr, Tracked::Link(content.to_vec()));
    }

    /// Replays one generated operation. Operations that have nothing to act
    /// on (no live elements, a self-loop) are skipped.
    pub fn apply(&mut self, memory: &Memory, op: &GraphOperation) {
        match op {
            GraphOperation::CreateNode { ty } => {
                self.node(memory, *ty);
            }
            GraphOperation::CreateLink { content } => {
                self.link(memory, content);
            }
            GraphOperation::CreateArc { ty, begin, end } => {
                if self.live.is_empty() {
                    return;
                }
                let begin = *begin.get(&self.live);
                let end = *end.get(&self.live);
                if begin != end {
                    self.arc(memory, *ty, begin, end);
                }
            }
            GraphOperation::Erase { target } => {
                if !self.live.is_empty() {
                    let addr = *target.get(&self.live);
                    self.erase(memory, addr);
                }
            }
            GraphOperation::SetContent { target, content } => {
                let links = self.links();
                if !links.is_empty() {
                    self.set_content(memory, *target.get(&links), content);
                }
            }
        }
    }

    /// Checks every tracked element against `memory`.
    pub fn verify_all(&self, memory: &Memory) {
        let mut outgoing: HashMap<Address, u32> = HashMap::new();
        let mut incoming: HashMap<Address, u32> = HashMap::new();
        for tracked in self.elements.values() {
            if let Tracked::Connector { begin, end, .. } = tracked {
                *outgoing.entry(*begin).or_default() += 1;
                *incoming.entry(*end).or_default() += 1;
            }
        }

        for (addr, tracked) in &self.elements {
            assert!(memory.is_element(*addr), "{addr} should be live");
            let actual = memory.get_element_type(*addr).expect("type");
            match tracked {
                Tracked::Node(ty) => assert_eq!(actual, *ty, "type of {addr}"),
                Tracked::Link(content) => {
                    assert_eq!(actual, ElementType::CONST_LINK);
                    let stored = memory.get_link_content(*addr).expect("content");
                    assert_eq!(stored.as_bytes(), content.as_slice(), "content of {addr}");
                }
                Tracked::Connector { ty, begin, end } => {
                    assert_eq!(actual, *ty, "type of {addr}");
                    assert_eq!(memory.get_arc_info(*addr).expect("arc info"), (*begin, *end));
                }
            }
            assert_eq!(
                memory.outgoing_arcs_count(*addr).expect("outgoing"),
                outgoing.get(addr).copied().unwrap_or(0),
                "outgoing count of {addr}"
            );
            assert_eq!(
                memory.incoming_arcs_count(*addr).expect("incoming"),
                incoming.get(addr).copied().unwrap_or(0),
                "incoming count of {addr}"
            );
        }

        for addr in &self.erased {
            if !self.elements.contains_key(addr) {
                assert!(!memory.is_element(*addr), "{addr} should be erased");
            }
        }

        let stats = memory.stats().expect("stats");
        assert_eq!(stats.elements.total(), self.live.len() as u64);
    }

    fn track(&mut self, addr: Address, tracked: Tracked) {
        self.elements.insert(addr, tracked);
        self.live.push(addr);
        // A recycled slot brings its address back to life.
        self.erased.retain(|a| *a != addr);
    }

    fn links(&self) -> Vec<Address> {
        self.live
            .iter()
            .copied()
            .filter(|a| matches!(self.elements.get(a), Some(Tracked::Link(_))))
            .collect()
    }

    fn cascade(&self, root: Address) -> Vec<Address> {
        let mut out = vec![root];
        let mut index = 0;
        while index < out.len() {
            let current = out[index];
            for (addr, tracked) in &self.elements {
                if let Tracked::Connector { begin, end, .. } = tracked {
                    if (*begin == current || *end == current) && !out.contains(addr) {
                        out.push(*addr);
                    }
                }
            }
            index += 1;
        }
        out
    }
}

/// Dump and reload.
pub mod persistence {
    use super::*;
    use crate::fixtures::test_config;
    use std::path::Path;

    /// Builds a graph under `path`, closes it, reopens it and checks that
    /// addresses, types, arcs, content and keynodes all came back.
    pub fn test_dump_reload_isomorphic(path: &Path) {
        let mut harness = IntegrationHarness::new();
        let (epoch, keynode) = {
            let memory = Memory::open_with_config(path, test_config()).expect("open");
            let class = harness.node(&memory, ElementType::CONST_NODE_CLASS);
            let name = harness.link(&memory, b"fruit");
            harness.arc(&memory, ElementType::CONST_COMMON_ARC, class, name);
            for label in ["apple", "pear", "plum"] {
                let member = harness.node(&memory, ElementType::CONST_NODE);
                let arc = harness.arc(&memory, ElementType::CONST_PERM_POS_ARC, class, member);
                let role = harness.node(&memory, ElementType::CONST_NODE_ROLE);
                harness.arc(&memory, ElementType::CONST_PERM_POS_ARC, role, arc);
                let label = harness.link(&memory, label.as_bytes());
                harness.arc(&memory, ElementType::CONST_COMMON_ARC, member, label);
            }
            let doomed = harness.node(&memory, ElementType::VAR_NODE);
            harness.arc(&memory, ElementType::CONST_FUZ_ARC, class, doomed);
            harness.erase(&memory, doomed);

            let keynode = memory
                .resolve_keynode("nrel_main_idtf", ElementType::CONST_NODE_NOROLE)
                .expect("keynode");
            harness.track(keynode, Tracked::Node(ElementType::CONST_NODE_NOROLE));
            memory.close().expect("close");
            (memory.current_epoch(), keynode)
        };

        let memory = Memory::open_with_config(path, test_config()).expect("reopen");
        harness.verify_all(&memory);
        assert_eq!(memory.current_epoch(), epoch);
        assert_eq!(memory.find_keynode("nrel_main_idtf"), Some(keynode));
        assert_eq!(memory.find_links_with_content("pear").expect("find").len(), 1);
    }
}

/// Transaction behavior.
pub mod transaction {
    use super::*;
    use semnet_core::{CoreError, Epoch};

    /// A rolled back transaction leaves no element behind.
    pub fn test_rollback_leaves_no_trace(memory: &Memory) {
        let before = memory.stats().expect("stats").elements.total();
        let epoch = memory.current_epoch();

        let mut txn = memory.begin().expect("begin");
        let a = memory
            .node_new_in_txn(&mut txn, ElementType::CONST_NODE)
            .expect("node");
        let b = memory
            .node_new_in_txn(&mut txn, ElementType::CONST_NODE)
            .expect("node");
        memory
            .arc_new_in_txn(&mut txn, ElementType::CONST_PERM_POS_ARC, a, b)
            .expect("arc");
        assert!(!memory.is_element(a), "staged node must stay invisible");
        memory.rollback(&mut txn).expect("rollback");

        assert!(!memory.is_element(a));
        assert!(!memory.is_element(b));
        assert_eq!(memory.stats().expect("stats").elements.total(), before);
        assert_eq!(memory.current_epoch(), epoch);
    }

    /// Erasing an element conflicts with a connector committed to it in
    /// the meantime.
    pub fn test_erase_conflicts_with_new_arc(memory: &Memory) {
        let target = memory.node_new(ElementType::CONST_NODE).expect("node");
        let other = memory.node_new(ElementType::CONST_NODE).expect("node");

        let mut eraser = memory.begin().expect("begin");
        memory
            .erase_element_in_txn(&mut eraser, target)
            .expect("stage erase");

        let arc = memory
            .arc_new(ElementType::CONST_PERM_POS_ARC, other, target)
            .expect("arc");

        let result = memory.commit(&mut eraser);
        assert!(matches!(result, Err(CoreError::Conflict { .. })), "{result:?}");
        assert!(memory.is_element(target));
        assert!(memory.is_element(arc));
    }

    /// Queued transactions commit in the order they were queued.
    pub fn test_queue_is_fifo(memory: &Memory) {
        let start = memory.current_epoch().as_u64();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut txn = memory.begin().expect("begin");
            memory
                .node_new_in_txn(&mut txn, ElementType::CONST_NODE)
                .expect("node");
            ids.push(txn.id());
            memory.enqueue(txn).expect("enqueue");
        }

        let outcomes = memory.execute_queued().expect("execute");
        let order: Vec<_> = outcomes.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, ids);
        for (offset, (_, outcome)) in outcomes.into_iter().enumerate() {
            assert_eq!(
                outcome.expect("queued commit"),
                Epoch::new(start + offset as u64 + 1)
            );
        }
    }
}

/// Event delivery.
pub mod events {
    use super::*;
    use semnet_core::EventKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Events are published after commit, carry the commit epoch and are
    /// never published for rolled back work.
    pub fn test_delivery_after_commit(memory: &Memory) {
        let source = memory.node_new(ElementType::CONST_NODE).expect("node");
        let target = memory.node_new(ElementType::CONST_NODE).expect("node");
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        memory
            .subscribe_element(source, EventKind::OutgoingArcGenerated, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .expect("subscribe");
        let events = memory.listen().expect("listen");

        let mut discarded = memory.begin().expect("begin");
        memory
            .arc_new_in_txn(&mut discarded, ElementType::CONST_PERM_POS_ARC, source, target)
            .expect("arc");
        memory.rollback(&mut discarded).expect("rollback");

        let mut txn = memory.begin().expect("begin");
        let arc = memory
            .arc_new_in_txn(&mut txn, ElementType::CONST_PERM_POS_ARC, source, target)
            .expect("arc");
        let epoch = memory.commit(&mut txn).expect("commit");

        let first = events
            .recv_timeout(Duration::from_secs(5))
            .expect("event after commit");
        assert_eq!(first.epoch, epoch);
        assert_eq!(first.connector, arc);

        for _ in 0..500 {
            if calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
