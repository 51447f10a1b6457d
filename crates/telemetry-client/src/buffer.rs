// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory line buffers.
//!
//! The store holds one non-aggregated buffer plus one buffer per aggregation key. Keyed
//! buffers are created on first use and kept for the lifetime of the store; only their
//! content is cleared on reset.

use fnv::FnvBuildHasher;
use hashbrown::HashMap;

use crate::errors;
use crate::formatter::Line;
use crate::metric::AggregationKey;

/// Newline-joined lines and how many were appended since the last reset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buffer {
    content: String,
    count: usize,
}

impl Buffer {
    pub fn push(&mut self, line: &str) {
        if !self.content.is_empty() {
            self.content.push('\n');
        }
        self.content.push_str(line);
        self.count += 1;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

/// Buffers taken out of the store by a flush.
#[derive(Debug, Default, PartialEq)]
pub struct FlushPayload {
    pub non_aggregated: Buffer,
    /// Non-empty buckets only, ordered by key.
    pub aggregated: Vec<(AggregationKey, Buffer)>,
}

impl FlushPayload {
    pub fn non_aggregated_count(&self) -> usize {
        self.non_aggregated.count()
    }

    pub fn aggregated_count(&self) -> usize {
        self.aggregated.iter().map(|(_, buffer)| buffer.count()).sum()
    }

    pub fn total_count(&self) -> usize {
        self.non_aggregated_count() + self.aggregated_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }
}

pub struct BufferStore {
    non_aggregated: Buffer,
    aggregated: HashMap<AggregationKey, Buffer, FnvBuildHasher>,
    max_buckets: usize,
}

impl BufferStore {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            non_aggregated: Buffer::default(),
            aggregated: HashMap::with_hasher(FnvBuildHasher::default()),
            max_buckets,
        }
    }

    /// Appends a rendered line to the buffer its key selects.
    ///
    /// # Errors
    /// Returns [`errors::Insert::Overflow`] when the line needs a new bucket and the store
    /// already holds `max_buckets` of them.
    pub fn append(&mut self, line: Line) -> Result<(), errors::Insert> {
        let Some(key) = line.key else {
            self.non_aggregated.push(&line.text);
            return Ok(());
        };

        if let Some(buffer) = self.aggregated.get_mut(&key) {
            buffer.push(&line.text);
            return Ok(());
        }
        if self.aggregated.len() >= self.max_buckets {
            return Err(errors::Insert::Overflow(self.max_buckets));
        }
        self.aggregated.entry(key).or_default().push(&line.text);
        Ok(())
    }

    pub fn non_aggregated_count(&self) -> usize {
        self.non_aggregated.count()
    }

    pub fn aggregated_count(&self) -> usize {
        self.aggregated.values().map(Buffer::count).sum()
    }

    pub fn total_count(&self) -> usize {
        self.non_aggregated_count() + self.aggregated_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    /// Number of aggregation buckets ever created, empty or not.
    pub fn bucket_count(&self) -> usize {
        self.aggregated.len()
    }

    pub fn reset(&mut self) {
        self.non_aggregated = Buffer::default();
        for buffer in self.aggregated.values_mut() {
            *buffer = Buffer::default();
        }
    }

    /// Moves every non-empty buffer into a [`FlushPayload`] and leaves the store reset.
    pub fn take(&mut self) -> FlushPayload {
        let non_aggregated = std::mem::take(&mut self.non_aggregated);
        let mut aggregated: Vec<(AggregationKey, Buffer)> = self
            .aggregated
            .iter_mut()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(key, buffer)| (key.clone(), std::mem::take(buffer)))
            .collect();
        aggregated.sort_by(|(a, _), (b, _)| a.cmp(b));

        FlushPayload {
            non_aggregated,
            aggregated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Frequency;

    fn line(text: &str) -> Line {
        Line {
            text: text.to_string(),
            key: None,
        }
    }

    fn keyed(text: &str, function: &str, frequency: Frequency) -> Line {
        Line {
            text: text.to_string(),
            key: Some(AggregationKey::new(function, frequency)),
        }
    }

    #[test]
    fn test_append_joins_with_newlines() {
        let mut store = BufferStore::new(8);
        store.append(line("a 1 1")).expect("append");
        store.append(line("b 2 1")).expect("append");

        assert_eq!(store.non_aggregated_count(), 2);
        let payload = store.take();
        assert_eq!(payload.non_aggregated.content(), "a 1 1\nb 2 1");
        assert_eq!(payload.non_aggregated.count(), 2);
    }

    #[test]
    fn test_buckets_are_created_lazily() {
        let mut store = BufferStore::new(8);
        assert_eq!(store.bucket_count(), 0);

        store
            .append(keyed("x 3 1", "sum", Frequency::OneMinute))
            .expect("append");
        store
            .append(keyed("y 4 1", "sum", Frequency::OneMinute))
            .expect("append");
        store
            .append(keyed("z 5 1", "avg", Frequency::TenSeconds))
            .expect("append");

        assert_eq!(store.bucket_count(), 2);
        assert_eq!(store.aggregated_count(), 3);
        assert_eq!(store.non_aggregated_count(), 0);
        assert_eq!(store.total_count(), 3);
    }

    #[test]
    fn test_reset_clears_everything_and_keeps_buckets() {
        let mut store = BufferStore::new(8);
        store.append(line("a 1 1")).expect("append");
        store
            .append(keyed("x 3 1", "sum", Frequency::OneMinute))
            .expect("append");

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.total_count(), 0);
        assert_eq!(store.bucket_count(), 1);
        assert!(store.take().is_empty());

        // idempotent
        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.bucket_count(), 1);
    }

    #[test]
    fn test_take_returns_non_empty_buckets_and_resets() {
        let mut store = BufferStore::new(8);
        store
            .append(keyed("x 3 1", "sum", Frequency::OneMinute))
            .expect("append");
        store
            .append(keyed("z 5 1", "avg", Frequency::TenSeconds))
            .expect("append");
        store.take();
        store
            .append(keyed("w 6 1", "sum", Frequency::OneMinute))
            .expect("append");

        let payload = store.take();
        assert_eq!(payload.aggregated.len(), 1);
        let (key, buffer) = &payload.aggregated[0];
        assert_eq!(key, &AggregationKey::new("sum", Frequency::OneMinute));
        assert_eq!(buffer.content(), "w 6 1");
        assert!(payload.non_aggregated.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_bucket_limit() {
        let mut store = BufferStore::new(1);
        store
            .append(keyed("x 1 1", "sum", Frequency::OneMinute))
            .expect("append");

        assert_eq!(
            store.append(keyed("y 1 1", "avg", Frequency::OneMinute)),
            Err(errors::Insert::Overflow(1))
        );
        // existing keys and the flat buffer still accept lines
        store
            .append(keyed("x 2 1", "sum", Frequency::OneMinute))
            .expect("append");
        store.append(line("a 1 1")).expect("append");
        assert_eq!(store.total_count(), 3);
    }
}
