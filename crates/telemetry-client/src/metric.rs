// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metric model: kinds, tags, aggregation keys and the per-kind defaults applied when
//! an observation is rendered.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::Display;
use serde::Deserialize;

use crate::errors::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MetricKind {
    #[display("counter")]
    Counter,
    #[display("gauge")]
    Gauge,
    #[display("timer")]
    Timer,
    /// Generic metric without type defaults.
    #[display("custom")]
    Custom,
}

/// Aggregation window accepted by the collector, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u16)]
pub enum Frequency {
    #[default]
    TenSeconds = 10,
    ThirtySeconds = 30,
    OneMinute = 60,
    TwoMinutes = 120,
    ThreeMinutes = 180,
    FiveMinutes = 300,
}

impl Frequency {
    pub fn as_secs(self) -> u16 {
        self as u16
    }
}

impl TryFrom<u64> for Frequency {
    type Error = Rejection;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        match secs {
            10 => Ok(Self::TenSeconds),
            30 => Ok(Self::ThirtySeconds),
            60 => Ok(Self::OneMinute),
            120 => Ok(Self::TwoMinutes),
            180 => Ok(Self::ThreeMinutes),
            300 => Ok(Self::FiveMinutes),
            other => Err(Rejection::UnsupportedFrequency(other)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

/// Identifies an aggregated bucket and the path it is shipped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{function}/{frequency}")]
pub struct AggregationKey {
    pub function: String,
    pub frequency: Frequency,
}

impl AggregationKey {
    pub fn new(function: impl Into<String>, frequency: Frequency) -> Self {
        Self {
            function: function.into(),
            frequency,
        }
    }
}

/// Tag set kept in key order so rendered lines are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SortedTags {
    values: BTreeMap<String, String>,
}

impl SortedTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Copies every tag of `other` into `self`, replacing values of keys present in both.
    pub fn merge(&mut self, other: &SortedTags) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SortedTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One recorded value, as handed to the client by application code.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: String,
    pub value: f64,
    pub tags: SortedTags,
    /// Unix time in seconds; the current time is used when absent.
    pub timestamp: Option<i64>,
    pub aggregations: Option<Vec<String>>,
    /// Aggregation window in seconds, validated against [`Frequency`] when rendered.
    pub frequency: Option<u64>,
}

impl Observation {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            tags: SortedTags::new(),
            timestamp: None,
            aggregations: None,
            frequency: None,
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: SortedTags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_aggregations<I, S>(mut self, aggregations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aggregations = Some(aggregations.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_frequency(mut self, frequency: u64) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Aggregations and tags applied to every observation of one metric kind.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricTypeDefaults {
    pub aggregations: Vec<String>,
    pub tags: SortedTags,
}

impl MetricTypeDefaults {
    fn new(aggregations: &[&str], tags: SortedTags) -> Self {
        Self {
            aggregations: aggregations.iter().map(|a| (*a).to_string()).collect(),
            tags,
        }
    }

    fn apply(&mut self, overrides: &MetricTypeOverride) {
        if let Some(aggregations) = &overrides.aggregations {
            self.aggregations = aggregations.clone();
        }
        if let Some(tags) = &overrides.tags {
            self.tags = tags.clone();
        }
    }
}

/// Partial replacement of one kind's defaults. Absent fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricTypeOverride {
    pub aggregations: Option<Vec<String>>,
    pub tags: Option<SortedTags>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DefaultsOverride {
    pub counter: MetricTypeOverride,
    pub gauge: MetricTypeOverride,
    pub timer: MetricTypeOverride,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefaults {
    pub counter: MetricTypeDefaults,
    pub gauge: MetricTypeDefaults,
    pub timer: MetricTypeDefaults,
}

impl Default for TypeDefaults {
    fn default() -> Self {
        Self {
            counter: MetricTypeDefaults::new(&["sum"], SortedTags::new()),
            gauge: MetricTypeDefaults::new(&["last"], SortedTags::new()),
            timer: MetricTypeDefaults::new(
                &["avg", "p50", "p90", "p99"],
                SortedTags::from_iter([("unit", "ms")]),
            ),
        }
    }
}

impl TypeDefaults {
    pub fn with_overrides(overrides: &DefaultsOverride) -> Self {
        let mut defaults = Self::default();
        defaults.counter.apply(&overrides.counter);
        defaults.gauge.apply(&overrides.gauge);
        defaults.timer.apply(&overrides.timer);
        defaults
    }

    pub fn for_kind(&self, kind: MetricKind) -> Option<&MetricTypeDefaults> {
        match kind {
            MetricKind::Counter => Some(&self.counter),
            MetricKind::Gauge => Some(&self.gauge),
            MetricKind::Timer => Some(&self.timer),
            MetricKind::Custom => None,
        }
    }
}
