//! Property-based test generators using proptest.
//!
//! Operations refer to existing elements by [`prop::sample::Index`] so a
//! generated sequence stays meaningful whatever the graph looks like when
//! it is replayed.

use proptest::prelude::*;
use proptest::sample::Index;
use semnet_core::ElementType;

/// Node types accepted by `node_new`.
pub const NODE_TYPES: [ElementType; 7] = [
    ElementType::CONST_NODE,
    ElementType::VAR_NODE,
    ElementType::CONST_NODE_CLASS,
    ElementType::CONST_NODE_TUPLE,
    ElementType::CONST_NODE_STRUCT,
    ElementType::CONST_NODE_ROLE,
    ElementType::CONST_NODE_NOROLE,
];

/// Connector types accepted by `arc_new`.
pub const CONNECTOR_TYPES: [ElementType; 7] = [
    ElementType::CONST_PERM_POS_ARC,
    ElementType::VAR_PERM_POS_ARC,
    ElementType::CONST_PERM_NEG_ARC,
    ElementType::CONST_TEMP_POS_ARC,
    ElementType::CONST_FUZ_ARC,
    ElementType::CONST_COMMON_ARC,
    ElementType::CONST_COMMON_EDGE,
];

/// Strategy for generating node types.
pub fn node_type_strategy() -> impl Strategy<Value = ElementType> {
    prop::sample::select(NODE_TYPES.to_vec())
}

/// Strategy for generating connector types.
pub fn connector_type_strategy() -> impl Strategy<Value = ElementType> {
    prop::sample::select(CONNECTOR_TYPES.to_vec())
}

/// Strategy for generating link content, small and mostly repeated so that
/// content lookups find more than one link.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        2 => prop::sample::select(vec!["apple", "pear", "plum"])
            .prop_map(|s| s.as_bytes().to_vec()),
        1 => prop::collection::vec(any::<u8>(), 0..64),
    ]
}

/// One mutation of the graph.
#[derive(Debug, Clone)]
pub enum GraphOperation {
    /// Create a node.
    CreateNode {
        /// Node type.
        ty: ElementType,
    },
    /// Create a constant link holding `content`.
    CreateLink {
        /// Initial content.
        content: Vec<u8>,
    },
    /// Connect two existing elements.
    CreateArc {
        /// Connector type.
        ty: ElementType,
        /// Picks the source among live elements.
        begin: Index,
        /// Picks the target among live elements.
        end: Index,
    },
    /// Erase an existing element and its incident connectors.
    Erase {
        /// Picks the element among live elements.
        target: Index,
    },
    /// Replace the content of an existing link.
    SetContent {
        /// Picks the link among live links.
        target: Index,
        /// New content.
        content: Vec<u8>,
    },
}

/// Strategy for generating graph operations.
pub fn graph_operation_strategy() -> impl Strategy<Value = GraphOperation> {
    prop_oneof![
        3 => node_type_strategy().prop_map(|ty| GraphOperation::CreateNode { ty }),
        2 => content_strategy().prop_map(|content| GraphOperation::CreateLink { content }),
        4 => (connector_type_strategy(), any::<Index>(), any::<Index>())
            .prop_map(|(ty, begin, end)| GraphOperation::CreateArc { ty, begin, end }),
        1 => any::<Index>().prop_map(|target| GraphOperation::Erase { target }),
        1 => (any::<Index>(), content_strategy())
            .prop_map(|(target, content)| GraphOperation::SetContent { target, content }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<GraphOperation>> {
    prop::collection::vec(graph_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 512,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestMemory;
    use crate::integration::IntegrationHarness;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_types_are_valid(node in node_type_strategy(), connector in connector_type_strategy()) {
            prop_assert!(node.is_valid_element() && node.is_node());
            prop_assert!(connector.is_valid_element() && connector.is_connector());
        }

        #[test]
        fn replayed_operations_match_model(ops in operation_sequence_strategy(1, 40)) {
            let memory = TestMemory::memory();
            let mut harness = IntegrationHarness::new();
            for op in &ops {
                harness.apply(&memory, op);
            }
            harness.verify_all(&memory);
        }

        #[test]
        fn replayed_operations_survive_reload(ops in operation_sequence_strategy(1, 25)) {
            let memory = TestMemory::file();
            let mut harness = IntegrationHarness::new();
            for op in &ops {
                harness.apply(&memory, op);
            }
            let memory = memory.reopen();
            harness.verify_all(&memory);
        }
    }
}
