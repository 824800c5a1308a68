//! Stress tests for SemNet.
//!
//! These drive one memory context from several threads at once.

use semnet_core::{Address, CoreError, ElementType, Memory};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the run.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per run, split across threads.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Elements created by each transaction.
    pub batch: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            batch: 4,
        }
    }
}

#[derive(Default)]
struct Tally {
    successful: AtomicUsize,
    failed: AtomicUsize,
}

impl Tally {
    fn record<T>(&self, result: Result<T, CoreError>) {
        match result {
            Ok(_) => self.successful.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn finish(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

/// Every thread commits transactions that hang `batch` new members off a
/// shared hub node.
///
/// Returns the result and the hub.
pub fn stress_concurrent_commits(memory: &Memory, config: &StressConfig) -> (StressTestResult, Address) {
    let hub = memory
        .node_new(ElementType::CONST_NODE_CLASS)
        .expect("Failed to create hub");
    let tally = Tally::default();
    let per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    tally.record(memory.transaction(|txn| {
                        for _ in 0..config.batch {
                            let member = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                            memory.arc_new_in_txn(
                                txn,
                                ElementType::CONST_PERM_POS_ARC,
                                hub,
                                member,
                            )?;
                        }
                        Ok(())
                    }));
                }
            });
        }
    });

    (tally.finish(start), hub)
}

/// Pairs of threads connect the same two nodes in opposite directions, so
/// their commits lock the same monitors with the endpoints swapped.
pub fn stress_reversed_lock_order(memory: &Memory, config: &StressConfig) -> StressTestResult {
    let a = memory.node_new(ElementType::CONST_NODE).expect("node");
    let b = memory.node_new(ElementType::CONST_NODE).expect("node");
    let tally = Tally::default();
    let per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let (begin, end) = if t % 2 == 0 { (a, b) } else { (b, a) };
            let tally = &tally;
            scope.spawn(move || {
                for _ in 0..per_thread {
                    tally.record(memory.transaction(|txn| {
                        memory.arc_new_in_txn(txn, ElementType::CONST_COMMON_ARC, begin, end)?;
                        memory.arc_new_in_txn(txn, ElementType::CONST_COMMON_ARC, end, begin)
                    }));
                }
            });
        }
    });

    tally.finish(start)
}

/// Writers attach members to a hub while readers iterate it. Every triple
/// a reader sees must start at the hub and end at a live member.
pub fn stress_readers_during_commits(memory: &Memory, config: &StressConfig) -> StressTestResult {
    let hub = memory
        .node_new(ElementType::CONST_NODE_CLASS)
        .expect("Failed to create hub");
    let tally = Tally::default();
    let writers = (config.threads / 2).max(1);
    let readers = config.threads.saturating_sub(writers).max(1);
    let per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..writers {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    tally.record(memory.transaction(|txn| {
                        let member = memory.node_new_in_txn(txn, ElementType::CONST_NODE)?;
                        memory.arc_new_in_txn(txn, ElementType::CONST_PERM_POS_ARC, hub, member)
                    }));
                }
            });
        }
        for _ in 0..readers {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    tally.record(memory.iter3(hub, ElementType::PERM_POS_ARC, ElementType::NODE).map(
                        |iter| {
                            for [source, _, target] in iter.into_triples() {
                                assert_eq!(source, hub);
                                assert!(!target.is_empty());
                            }
                        },
                    ));
                }
            });
        }
    });

    tally.finish(start)
}

/// Every thread stages work and rolls it back.
pub fn stress_transaction_rollbacks(memory: &Memory, config: &StressConfig) -> StressTestResult {
    let tally = Tally::default();
    let per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for _ in 0..config.threads {
            scope.spawn(|| {
                for _ in 0..per_thread {
                    let result = memory.begin().and_then(|mut txn| {
                        for _ in 0..config.batch {
                            memory.node_new_in_txn(&mut txn, ElementType::CONST_NODE)?;
                        }
                        memory.rollback(&mut txn)
                    });
                    tally.record(result);
                }
            });
        }
    });

    tally.finish(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestMemory;

    fn small() -> StressConfig {
        StressConfig {
            operations: 200,
            threads: 4,
            batch: 3,
        }
    }

    #[test]
    fn test_concurrent_commits() {
        let memory = TestMemory::memory();
        let config = small();
        let (result, hub) = stress_concurrent_commits(&memory, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(
            memory.outgoing_arcs_count(hub).unwrap() as usize,
            result.successful_ops * config.batch
        );
        assert_eq!(
            memory.current_epoch().as_u64() as usize,
            result.successful_ops + 1
        );
    }

    #[test]
    fn test_reversed_lock_order_completes() {
        let memory = TestMemory::memory();
        let result = stress_reversed_lock_order(&memory, &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.total_ops, 200);
    }

    #[test]
    fn test_readers_during_commits() {
        let memory = TestMemory::memory();
        let result = stress_readers_during_commits(&memory, &small());
        assert_eq!(result.failed_ops, 0);
    }

    #[test]
    fn test_rollbacks_release_slots() {
        let memory = TestMemory::memory();
        let result = stress_transaction_rollbacks(&memory, &small());
        assert_eq!(result.failed_ops, 0);
        let stats = memory.stats().unwrap();
        assert_eq!(stats.elements.total(), 0);
        assert_eq!(stats.transactions_rolled_back, 200);
    }
}
