use std::collections::{vec_deque, HashMap, VecDeque};

use livechat::message::{ChatEvent, Source};

use crate::config::LogConfig;

type DedupeKey = (Source, String);

#[derive(Debug, Clone, Copy, Default)]
pub struct AppendOptions {
    /// Drop events whose provider message id is already present, including
    /// repeats inside the same batch.
    pub dedupe: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AppendOutcome {
    /// Events accepted into the log, in order. A batch larger than the
    /// capacity may already have pushed some of them out again.
    pub appended: Vec<ChatEvent>,
    pub duplicates: usize,
    pub evicted: usize,
}

/// Bounded, insertion-ordered history of chat and application events.
#[derive(Debug)]
pub struct ChatLog {
    capacity: usize,
    entries: VecDeque<ChatEvent>,
    // entries per provider message id currently held
    index: HashMap<DedupeKey, usize>,
}

impl ChatLog {
    pub fn new(config: &LogConfig) -> Self {
        Self::with_capacity(config.capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            index: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn append(&mut self, events: Vec<ChatEvent>, options: AppendOptions) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();
        for event in events {
            let key = event
                .dedupe_key()
                .map(|(source, id)| (source, id.to_string()));
            if options.dedupe {
                if let Some(key) = &key {
                    if self.index.contains_key(key) {
                        outcome.duplicates += 1;
                        continue;
                    }
                }
            }
            if let Some(key) = key {
                *self.index.entry(key).or_insert(0) += 1;
            }
            self.entries.push_back(event.clone());
            outcome.appended.push(event);
        }
        while self.entries.len() > self.capacity {
            if let Some(old) = self.entries.pop_front() {
                self.forget(&old);
                outcome.evicted += 1;
            }
        }
        outcome
    }

    fn forget(&mut self, event: &ChatEvent) {
        let Some((source, id)) = event.dedupe_key() else {
            return;
        };
        let key = (source, id.to_string());
        if let Some(count) = self.index.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.index.remove(&key);
            }
        }
    }

    /// Empties the log, returning how many events were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.index.clear();
        dropped
    }

    pub fn project(&self) -> vec_deque::Iter<'_, ChatEvent> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<ChatEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn contains_provider_id(&self, source: Source, id: &str) -> bool {
        self.index.contains_key(&(source, id.to_string()))
    }
}
