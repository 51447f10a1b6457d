// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Renders observations into wire lines.
//!
//! A line has the shape
//!
//! ```text
//! <namespace>.<name>,<k1>=<v1>,<k2>=<v2> <value> <timestamp>[ <agg1>,...,<aggN>,<frequency>[ <sampleRate>]]
//! ```
//!
//! The aggregation suffix is only written for observations that are not pre-aggregated;
//! pre-aggregated lines are shipped to a path that already names the function and
//! frequency.

use rand::Rng;
use tracing::trace;

use crate::config::ClientConfig;
use crate::constants::{APP_TAG_KEY, MAX_SAMPLE_RATE};
use crate::errors::Rejection;
use crate::metric::{AggregationKey, Frequency, MetricKind, Observation, SortedTags, TypeDefaults};
use crate::util::{is_line_safe, is_valid_aggregation_function};

/// A rendered observation and the bucket it belongs to. `key` is `None` for lines
/// destined to the non-aggregated buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub key: Option<AggregationKey>,
}

#[derive(Debug, Clone)]
pub struct LineFormatter {
    namespace: String,
    app: Option<String>,
    global_tags: SortedTags,
    defaults: TypeDefaults,
    sample_rate: f64,
}

impl LineFormatter {
    pub fn new(
        namespace: String,
        app: Option<String>,
        global_tags: SortedTags,
        defaults: TypeDefaults,
        sample_rate: f64,
    ) -> Self {
        Self {
            namespace,
            app,
            global_tags,
            defaults,
            sample_rate,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.namespace.trim().to_string(),
            config.app.clone(),
            config.tags.clone(),
            TypeDefaults::with_overrides(&config.defaults),
            config.sample_rate,
        )
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Renders `observation`, returning `Ok(None)` when sampling drops it.
    pub fn format(
        &self,
        kind: MetricKind,
        observation: &Observation,
        pre_aggregated: bool,
    ) -> Result<Option<Line>, Rejection> {
        self.format_with_rng(kind, observation, pre_aggregated, &mut rand::thread_rng())
    }

    pub fn format_with_rng<R: Rng + ?Sized>(
        &self,
        kind: MetricKind,
        observation: &Observation,
        pre_aggregated: bool,
        rng: &mut R,
    ) -> Result<Option<Line>, Rejection> {
        let sampled = !pre_aggregated && self.sample_rate < MAX_SAMPLE_RATE;
        let line = self.render(kind, observation, pre_aggregated, sampled)?;

        if sampled && !self.should_sample(rng) {
            trace!(
                "Dropping {} {} by sampling at rate {}",
                kind,
                observation.name,
                self.sample_rate
            );
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Renders a non-pre-aggregated observation that bypasses sampling, without the
    /// sample-rate token. Used for the client's own statistics.
    pub fn format_unsampled(
        &self,
        kind: MetricKind,
        observation: &Observation,
    ) -> Result<Line, Rejection> {
        self.render(kind, observation, false, false)
    }

    fn render(
        &self,
        kind: MetricKind,
        observation: &Observation,
        pre_aggregated: bool,
        sampled: bool,
    ) -> Result<Line, Rejection> {
        validate_scalars(observation)?;

        let defaults = self.defaults.for_kind(kind);
        let (key, suffix) = if pre_aggregated {
            (Some(aggregation_key(observation)?), String::new())
        } else {
            let aggregations = observation
                .aggregations
                .as_deref()
                .or_else(|| defaults.map(|d| d.aggregations.as_slice()))
                .unwrap_or_default();
            (
                None,
                self.aggregation_suffix(aggregations, observation.frequency, sampled)?,
            )
        };

        let tags = self.resolve_tags(kind, &observation.tags);
        if let Some((k, v)) = tags.iter().find(|(k, v)| !is_line_safe(k) || !is_line_safe(v)) {
            return Err(Rejection::InvalidTag(format!("{k}={v}")));
        }

        let timestamp = observation.timestamp.unwrap_or_else(now_in_seconds);
        let mut text = format!("{}.{}", self.namespace, observation.name);
        for (k, v) in tags.iter() {
            text.push(',');
            text.push_str(k);
            text.push('=');
            text.push_str(v);
        }
        text.push_str(&format!(" {} {}{}", observation.value, timestamp, suffix));

        Ok(Line { text, key })
    }

    /// Call-site tags < application tag < kind default tags < global tags.
    fn resolve_tags(&self, kind: MetricKind, call_site: &SortedTags) -> SortedTags {
        let mut tags = call_site.clone();
        if let Some(app) = &self.app {
            tags.insert(APP_TAG_KEY, app.as_str());
        }
        if let Some(defaults) = self.defaults.for_kind(kind) {
            tags.merge(&defaults.tags);
        }
        tags.merge(&self.global_tags);
        tags
    }

    fn aggregation_suffix(
        &self,
        aggregations: &[String],
        frequency: Option<u64>,
        sampled: bool,
    ) -> Result<String, Rejection> {
        let frequency = frequency
            .map(Frequency::try_from)
            .transpose()?
            .unwrap_or_default();
        if aggregations.is_empty() {
            return Ok(String::new());
        }
        if let Some(invalid) = aggregations
            .iter()
            .find(|a| !is_valid_aggregation_function(a))
        {
            return Err(Rejection::InvalidAggregation(invalid.clone()));
        }

        let mut suffix = format!(" {},{}", aggregations.join(","), frequency);
        if sampled {
            suffix.push_str(&format!(" {}", self.sample_rate));
        }
        Ok(suffix)
    }

    fn should_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        if self.sample_rate >= MAX_SAMPLE_RATE {
            return true;
        }
        rng.gen_range(0.0..MAX_SAMPLE_RATE) <= self.sample_rate
    }
}

fn validate_scalars(observation: &Observation) -> Result<(), Rejection> {
    if observation.name.is_empty() {
        return Err(Rejection::EmptyName);
    }
    if !is_line_safe(&observation.name) {
        return Err(Rejection::InvalidName(observation.name.clone()));
    }
    if !observation.value.is_finite() {
        return Err(Rejection::NonFiniteValue(observation.value));
    }
    match observation.timestamp {
        Some(ts) if ts < 0 => Err(Rejection::NegativeTimestamp(ts)),
        _ => Ok(()),
    }
}

fn aggregation_key(observation: &Observation) -> Result<AggregationKey, Rejection> {
    let function = match observation.aggregations.as_deref() {
        Some([function]) => function,
        _ => return Err(Rejection::MissingAggregation),
    };
    if !is_valid_aggregation_function(function) {
        return Err(Rejection::InvalidAggregation(function.clone()));
    }
    let frequency = observation.frequency.ok_or(Rejection::MissingFrequency)?;
    Ok(AggregationKey::new(
        function.as_str(),
        Frequency::try_from(frequency)?,
    ))
}

fn now_in_seconds() -> i64 {
    std::time::UNIX_EPOCH
        .elapsed()
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or_default())
        .unwrap_or_default()
}
