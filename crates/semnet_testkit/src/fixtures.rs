//! Memory fixtures and prepared graphs.

use semnet_core::{Address, Config, ContentStream, ElementType, Memory};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test memory context with automatic cleanup.
pub struct TestMemory {
    /// The memory context.
    pub memory: Memory,
    /// Kept alive so the directory outlives the context.
    temp_dir: Option<TempDir>,
}

impl TestMemory {
    /// Creates an in-memory context with a single event worker.
    pub fn memory() -> Self {
        Self {
            memory: Memory::open_in_memory_with_config(test_config())
                .expect("Failed to open in-memory context"),
            temp_dir: None,
        }
    }

    /// Creates a persistent context in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let memory = Memory::open_with_config(&temp_dir.path().join("kb"), test_config())
            .expect("Failed to open persistent context");
        Self {
            memory,
            temp_dir: Some(temp_dir),
        }
    }

    /// Storage directory if persistent.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|dir| dir.path().join("kb"))
    }

    /// Closes the context and opens the same directory again.
    ///
    /// Panics for in-memory contexts.
    pub fn reopen(self) -> Self {
        let Self { memory, temp_dir } = self;
        let temp_dir = temp_dir.expect("Only persistent contexts can be reopened");
        memory.close().expect("Failed to close context");
        drop(memory);
        let memory = Memory::open_with_config(&temp_dir.path().join("kb"), test_config())
            .expect("Failed to reopen context");
        Self {
            memory,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestMemory {
    type Target = Memory;

    fn deref(&self) -> &Self::Target {
        &self.memory
    }
}

/// Configuration used by the fixtures: small segments, one event worker.
pub fn test_config() -> Config {
    Config::new()
        .segment_size(256)
        .max_segments(512)
        .monitor_table_size(31)
        .event_threads(1)
}

/// Runs a test with a temporary in-memory context.
pub fn with_temp_memory<F, R>(f: F) -> R
where
    F: FnOnce(&Memory) -> R,
{
    let test_memory = TestMemory::memory();
    f(&test_memory.memory)
}

/// Runs a test with a persistent context and its directory.
pub fn with_file_memory<F, R>(f: F) -> R
where
    F: FnOnce(&Memory, &Path) -> R,
{
    let test_memory = TestMemory::file();
    let path = test_memory.path().expect("File context should have a path");
    f(&test_memory.memory, &path)
}

/// Prepared graphs.
pub mod scenarios {
    use super::*;

    /// A class node with `members` member nodes, each connected by a
    /// constant positive permanent arc.
    #[derive(Debug, Clone)]
    pub struct ClassGraph {
        /// The class node.
        pub class: Address,
        /// Member nodes, in creation order.
        pub members: Vec<Address>,
        /// Membership arcs, parallel to `members`.
        pub arcs: Vec<Address>,
    }

    /// Builds a [`ClassGraph`] in one transaction.
    pub fn class_with_members(memory: &Memory, members: usize) -> ClassGraph {
        memory
            .transaction(|txn| {
                let class = memory.node_new_in_txn(txn, ElementType::CONST_NODE_CLASS)?;
                let mut graph = ClassGraph {
                    class,
                    members: Vec::with_capacity(members),
                    arcs: Vec::with_capacity(members),
                };
                for _ in 0..members {
                    let member = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                    let arc =
                        memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, class, member)?;
                    graph.members.push(member);
                    graph.arcs.push(arc);
                }
                Ok(graph)
            })
            .expect("Failed to build class graph")
    }

    /// A concept node named by a link through a common arc.
    pub fn named_concept(memory: &Memory, name: &str) -> (Address, Address) {
        memory
            .transaction(|txn| {
                let concept = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                let link = memory.link_new_in_txn(txn, ElementType::CONST_LINK)?;
                memory.set_link_content_in_txn(txn, link, ContentStream::from_str_content(name))?;
                memory.arc_new_in_txn(txn, ElementType::CONST_COMMON_ARC, concept, link)?;
                Ok((concept, link))
            })
            .expect("Failed to build named concept")
    }

    /// The attributed-arc shape: `attr -> (n1 -> n2)`.
    ///
    /// Returns `[n1, arc, n2, attr_arc, attr]`.
    pub fn attributed_arc(memory: &Memory) -> [Address; 5] {
        let n1 = memory.node_new(ElementType::CONST_NODE).expect("node");
        let n2 = memory.node_new(ElementType::CONST_NODE).expect("node");
        let attr = memory
            .node_new(ElementType::CONST_NODE_ROLE)
            .expect("attribute");
        let arc = memory
            .arc_new(ElementType::CONST_PERM_POS_ARC, n1, n2)
            .expect("arc");
        let attr_arc = memory
            .arc_new(ElementType::CONST_PERM_POS_ARC, attr, arc)
            .expect("attribute arc");
        [n1, arc, n2, attr_arc, attr]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_fixture() {
        let test_memory = TestMemory::memory();
        assert!(test_memory.is_open());
        assert!(test_memory.path().is_none());
    }

    #[test]
    fn class_graph_is_connected() {
        with_temp_memory(|memory| {
            let graph = scenarios::class_with_members(memory, 5);
            assert_eq!(memory.outgoing_arcs_count(graph.class).unwrap(), 5);
            for (member, arc) in graph.members.iter().zip(&graph.arcs) {
                assert_eq!(memory.get_arc_info(*arc).unwrap(), (graph.class, *member));
            }
        });
    }

    #[test]
    fn reopen_keeps_graph() {
        let test_memory = TestMemory::file();
        let (concept, link) = scenarios::named_concept(&test_memory, "apple");
        let test_memory = test_memory.reopen();
        assert!(test_memory.is_element(concept));
        assert_eq!(
            test_memory.find_links_with_content("apple").unwrap(),
            vec![link]
        );
    }

    #[test]
    fn file_fixture_has_directory() {
        with_file_memory(|memory, path| {
            assert_eq!(memory.path(), Some(path));
            assert!(path.join("LOCK").exists());
        });
    }
}
