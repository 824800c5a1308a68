//! Agents: event-driven behaviour registered as trait objects.

use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventBus, EventKind, SubscriptionId};
use crate::types::Address;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something that reacts to one kind of event on one element.
///
/// An agent that needs the graph captures its own handle to it.
pub trait Agent: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// The `(element, kind)` pair that triggers this agent.
    fn subscription(&self) -> (Address, EventKind);

    /// Decides whether `event` should start a run.
    fn initiation_template(&self, event: &Event) -> bool {
        let _ = event;
        true
    }

    /// Handles one event.
    fn run(&self, event: &Event) -> CoreResult<()>;
}

#[derive(Debug, Default)]
struct AgentCounters {
    runs: AtomicU64,
    failures: AtomicU64,
}

struct Registered {
    subscription: SubscriptionId,
    agent: Arc<dyn Agent>,
}

/// Agents currently attached to an [`EventBus`].
pub struct AgentRegistry {
    bus: Arc<EventBus>,
    agents: RwLock<BTreeMap<String, Registered>>,
    counters: Arc<AgentCounters>,
}

impl AgentRegistry {
    /// Creates an empty registry over `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            agents: RwLock::new(BTreeMap::new()),
            counters: Arc::new(AgentCounters::default()),
        }
    }

    /// Subscribes `agent` to its trigger.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if an agent with the same name is registered.
    pub fn register(&self, agent: Arc<dyn Agent>) -> CoreResult<SubscriptionId> {
        let name = agent.name().to_string();
        let mut agents = self.agents.write();
        if agents.contains_key(&name) {
            return Err(CoreError::invalid_argument(format!(
                "agent `{name}` is already registered"
            )));
        }

        let (element, kind) = agent.subscription();
        let runner = Arc::clone(&agent);
        let counters = Arc::clone(&self.counters);
        let subscription = self.bus.subscribe(element, kind, move |event| {
            if !runner.initiation_template(event) {
                return;
            }
            counters.runs.fetch_add(1, Ordering::SeqCst);
            if let Err(err) = runner.run(event) {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(agent = runner.name(), error = %err, "agent run failed");
            }
        });
        tracing::debug!(agent = %name, %element, %kind, "agent registered");
        agents.insert(
            name,
            Registered {
                subscription,
                agent,
            },
        );
        Ok(subscription)
    }

    /// Detaches the agent called `name`. Returns false if unknown.
    pub fn unregister(&self, name: &str) -> bool {
        match self.agents.write().remove(name) {
            Some(registered) => {
                self.bus.unsubscribe(registered.subscription);
                true
            }
            None => false,
        }
    }

    /// Looks up a registered agent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .get(name)
            .map(|registered| Arc::clone(&registered.agent))
    }

    /// Registered agent names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.agents.read().keys().cloned().collect()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// Returns true if no agent is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Agent runs started so far.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.counters.runs.load(Ordering::SeqCst)
    }

    /// Agent runs that returned an error.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.counters.failures.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .field("runs", &self.runs())
            .finish_non_exhaustive()
    }
}
