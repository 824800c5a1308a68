//! Memory context configuration.

/// Upper bound on event worker threads.
pub const MAX_EVENT_THREADS: usize = 32;

/// How strictly a commit checks the elements a transaction observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Observed elements must still be live with the same slot generation
    /// and type; arc endpoints must be live; deletions must cover every
    /// incident arc.
    #[default]
    Structural,
    /// Everything `Structural` checks, plus each observed element must not
    /// have been mutated since it was observed.
    Strict,
}

/// Configuration for a memory context.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the storage directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the storage directory already holds a graph.
    pub error_if_exists: bool,

    /// Whether closing a persistent context dumps it first.
    pub save_on_close: bool,

    /// Element slots per segment.
    pub segment_size: u16,

    /// Maximum number of segments.
    pub max_segments: u16,

    /// Number of striped monitors.
    pub monitor_table_size: usize,

    /// Commit validation strength.
    pub conflict_policy: ConflictPolicy,

    /// Event worker threads, clamped to `1..=MAX_EVENT_THREADS`.
    pub event_threads: usize,

    /// Pending event callbacks before submission blocks.
    pub event_queue_capacity: usize,

    /// Committed events kept for polling.
    pub max_event_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            save_on_close: true,
            segment_size: u16::MAX,
            max_segments: u16::MAX,
            monitor_table_size: 1021,
            conflict_policy: ConflictPolicy::Structural,
            event_threads: 4,
            event_queue_capacity: 1024,
            max_event_history: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if a graph already exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether closing dumps the graph.
    #[must_use]
    pub const fn save_on_close(mut self, value: bool) -> Self {
        self.save_on_close = value;
        self
    }

    /// Sets the number of slots per segment (at least 1).
    #[must_use]
    pub const fn segment_size(mut self, slots: u16) -> Self {
        self.segment_size = if slots == 0 { 1 } else { slots };
        self
    }

    /// Sets the maximum number of segments (at least 1).
    #[must_use]
    pub const fn max_segments(mut self, segments: u16) -> Self {
        self.max_segments = if segments == 0 { 1 } else { segments };
        self
    }

    /// Sets the monitor table size (at least 1).
    #[must_use]
    pub const fn monitor_table_size(mut self, size: usize) -> Self {
        self.monitor_table_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets the commit validation strength.
    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the number of event worker threads.
    #[must_use]
    pub const fn event_threads(mut self, threads: usize) -> Self {
        self.event_threads = threads;
        self
    }

    /// Sets the event queue bound (at least 1).
    #[must_use]
    pub const fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }

    /// Sets how many committed events are kept for polling.
    #[must_use]
    pub const fn max_event_history(mut self, events: usize) -> Self {
        self.max_event_history = events;
        self
    }

    /// Returns the worker count actually used.
    #[must_use]
    pub fn effective_event_threads(&self) -> usize {
        self.event_threads.clamp(1, MAX_EVENT_THREADS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert_eq!(config.monitor_table_size, 1021);
        assert_eq!(config.conflict_policy, ConflictPolicy::Structural);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .segment_size(16)
            .max_segments(2)
            .conflict_policy(ConflictPolicy::Strict)
            .save_on_close(false);

        assert_eq!(config.segment_size, 16);
        assert_eq!(config.max_segments, 2);
        assert_eq!(config.conflict_policy, ConflictPolicy::Strict);
        assert!(!config.save_on_close);
    }

    #[test]
    fn zero_sizes_are_raised() {
        let config = Config::new()
            .segment_size(0)
            .max_segments(0)
            .monitor_table_size(0)
            .event_queue_capacity(0);
        assert_eq!(config.segment_size, 1);
        assert_eq!(config.max_segments, 1);
        assert_eq!(config.monitor_table_size, 1);
        assert_eq!(config.event_queue_capacity, 1);
    }

    #[test]
    fn event_threads_are_clamped() {
        assert_eq!(Config::new().event_threads(0).effective_event_threads(), 1);
        assert_eq!(
            Config::new().event_threads(500).effective_event_threads(),
            MAX_EVENT_THREADS
        );
        assert_eq!(Config::new().event_threads(3).effective_event_threads(), 3);
    }
}
