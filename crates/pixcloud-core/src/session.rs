//! Session controller for one visualization.
//!
//! [`Atlas`] owns the items, a feature-vector cache and the current
//! [`PositionMap`], and decides for every change whether the new item can be
//! projected next to its neighbors or whether a full recompute is needed.
//! Full recomputes are debounced, submitted to a [`ComputationHost`], and
//! their results are accepted only if nothing changed while they ran.
//!
//! Time is passed in explicitly (`now`) so callers drive the clock.

use crate::config::{AtlasConfig, FeatureWeights, ReduceConfig};
use crate::error::{AtlasError, ConfigError};
use crate::features::{extract, FeatureVariant};
use crate::host::{ComputationHost, HostEvent, Request, RequestId, Response};
use crate::incremental;
use crate::item::Item;
use crate::layout::{place, LayoutMode, Position, PositionMap};
use crate::reduce::{Embedding, Progress};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What changed after a call into the [`Atlas`].
#[derive(Debug, Clone, PartialEq)]
pub enum AtlasEvent {
    /// One item was projected incrementally
    Placed { id: String, position: Position },
    /// Progress of the current full recompute
    Progress(Progress),
    /// A full recompute finished; the whole map was replaced
    LayoutReplaced {
        positions: PositionMap,
        fallback: bool,
    },
}

struct InFlight {
    request: RequestId,
    ids: Vec<String>,
}

/// Embedding behind the current layout, kept for mode switches.
struct LastLayout {
    ids: Vec<String>,
    embedding: Embedding,
    fallback: bool,
}

pub struct Atlas {
    config: AtlasConfig,
    host: ComputationHost,
    items: BTreeMap<String, Item>,
    /// Vectors for the current variant and weights
    features: HashMap<String, Vec<f64>>,
    positions: PositionMap,
    /// Items placed incrementally since the last full layout
    incremental_count: usize,
    due: Option<Instant>,
    in_flight: Option<InFlight>,
    last_layout: Option<LastLayout>,
}

impl Atlas {
    pub fn new(config: AtlasConfig) -> Result<Self, AtlasError> {
        config.validate()?;
        let host = ComputationHost::spawn()?;
        Ok(Self {
            config,
            host,
            items: BTreeMap::new(),
            features: HashMap::new(),
            positions: PositionMap::new(),
            incremental_count: 0,
            due: None,
            in_flight: None,
            last_layout: None,
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// A recompute is scheduled or running.
    pub fn is_computing(&self) -> bool {
        self.due.is_some() || self.in_flight.is_some()
    }

    /// Add an item.
    ///
    /// Returns `Placed` when the item could be projected immediately;
    /// otherwise a full recompute is scheduled and `None` is returned.
    ///
    /// A projected item sits within `offset_scale` of its nearest neighbor,
    /// so `layout.min_spacing` is not enforced for it. Spacing holds again
    /// after the next full layout.
    pub fn insert(&mut self, item: Item, now: Instant) -> Option<AtlasEvent> {
        let id = item.id.clone();
        if let Some(existing) = self.items.get(&id) {
            if existing.pixels == item.pixels {
                return None;
            }
            debug!(id = %id, "item replaced, dropping cached vector");
            self.features.remove(&id);
            self.positions.remove(&id);
        }
        self.items.insert(id.clone(), item);

        if !self.positions.is_empty() && self.incremental_count < self.config.incremental.limit {
            if let Some(position) = self.project(&id) {
                self.positions.insert(id.clone(), position);
                self.incremental_count += 1;
                return Some(AtlasEvent::Placed { id, position });
            }
        }

        self.schedule(now);
        None
    }

    /// Change feature weights. Cached vectors are invalidated.
    pub fn set_weights(&mut self, weights: FeatureWeights, now: Instant) -> Result<(), ConfigError> {
        weights.validate()?;
        if weights == self.config.weights {
            return Ok(());
        }
        self.config.weights = weights;
        self.features.clear();
        self.schedule(now);
        Ok(())
    }

    /// Switch projector or its options and schedule a recompute.
    pub fn set_reduce_config(&mut self, reduce: ReduceConfig, now: Instant) -> Result<(), ConfigError> {
        reduce.validate()?;
        if reduce.feature_variant() != self.config.reduce.feature_variant() {
            self.features.clear();
        }
        self.config.reduce = reduce;
        self.schedule(now);
        Ok(())
    }

    /// Switch layout mode, re-placing the last embedding without recomputing.
    pub fn set_mode(&mut self, mode: LayoutMode) -> Option<AtlasEvent> {
        if mode == self.config.mode {
            return None;
        }
        self.config.mode = mode;
        let last = self.last_layout.as_ref()?;

        let items: Vec<Item> = last
            .ids
            .iter()
            .filter_map(|id| self.items.get(id).cloned())
            .collect();
        if items.len() != last.ids.len() {
            return None;
        }
        let mut positions = place(&items, &last.embedding, mode, &self.config.layout, Utc::now());
        for (id, position) in &self.positions {
            positions.entry(id.clone()).or_insert(*position);
        }
        self.positions = positions.clone();
        Some(AtlasEvent::LayoutReplaced {
            positions,
            fallback: last.fallback,
        })
    }

    /// Process everything the host has sent, then submit a due recompute.
    pub fn poll(&mut self, now: Instant) -> Result<Vec<AtlasEvent>, AtlasError> {
        let mut out = Vec::new();
        for event in self.host.drain() {
            if let Some(e) = self.handle(event, now) {
                out.push(e);
            }
        }

        if self.due.is_some_and(|due| due <= now) {
            self.due = None;
            self.submit()?;
        }
        Ok(out)
    }

    /// Discard the worker. A request that was running is submitted again.
    pub fn restart_host(&mut self) -> Result<(), AtlasError> {
        self.host.restart()?;
        if self.in_flight.take().is_some() {
            self.submit()?;
        }
        Ok(())
    }

    fn schedule(&mut self, now: Instant) {
        self.due = Some(now + self.config.debounce());
    }

    fn variant(&self) -> FeatureVariant {
        self.config.reduce.feature_variant()
    }

    fn vector(&mut self, id: &str) -> Option<&Vec<f64>> {
        if !self.features.contains_key(id) {
            let item = self.items.get(id)?;
            let vector = extract(&item.pixels, self.variant(), &self.config.weights);
            self.features.insert(id.to_string(), vector);
        }
        self.features.get(id)
    }

    fn project(&mut self, id: &str) -> Option<Position> {
        let placed: Vec<String> = self.positions.keys().cloned().collect();
        for other in &placed {
            self.vector(other);
        }
        let vector = self.vector(id)?.clone();
        let item = self.items.get(id)?;
        incremental::project(
            &item.pixels,
            &vector,
            &self.positions,
            &self.features,
            &self.config.incremental,
        )
    }

    fn submit(&mut self) -> Result<(), AtlasError> {
        let ids: Vec<String> = self.items.keys().cloned().collect();
        let mut vectors = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(v) = self.vector(id) {
                vectors.push(v.clone());
            }
        }
        let request = Request {
            vectors,
            config: self.config.reduce.clone(),
        };

        let id = match self.host.submit(request.clone()) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "computation worker gone, restarting");
                self.host.restart()?;
                self.host.submit(request)?
            }
        };
        if let Some(previous) = &self.in_flight {
            debug!(superseded = previous.request, by = id, "recompute superseded");
        }
        self.in_flight = Some(InFlight { request: id, ids });
        Ok(())
    }

    fn handle(&mut self, event: HostEvent, now: Instant) -> Option<AtlasEvent> {
        let current = self.in_flight.as_ref()?;
        if event.request != current.request {
            debug!(request = event.request, "dropping event for superseded request");
            return None;
        }

        match event.response {
            Response::Progress {
                iteration,
                total_iterations,
            } => Some(AtlasEvent::Progress(Progress {
                iteration,
                total_iterations,
            })),
            Response::Done {
                embeddings,
                fallback,
                iterations,
            } => {
                let InFlight { ids, .. } = self.in_flight.take()?;
                if !ids.iter().eq(self.items.keys()) {
                    debug!(request = event.request, "item set changed during recompute, rescheduling");
                    if self.due.is_none() {
                        self.schedule(now);
                    }
                    return None;
                }
                Some(self.apply_layout(ids, embeddings, fallback, iterations))
            }
        }
    }

    fn apply_layout(
        &mut self,
        ids: Vec<String>,
        embedding: Embedding,
        fallback: bool,
        iterations: usize,
    ) -> AtlasEvent {
        let items: Vec<Item> = ids.iter().filter_map(|id| self.items.get(id).cloned()).collect();
        let positions = place(&items, &embedding, self.config.mode, &self.config.layout, Utc::now());
        info!(
            items = positions.len(),
            iterations,
            fallback,
            mode = ?self.config.mode,
            "layout replaced"
        );

        self.positions = positions.clone();
        self.incremental_count = 0;
        self.last_layout = Some(LastLayout {
            ids,
            embedding,
            fallback,
        });
        AtlasEvent::LayoutReplaced {
            positions,
            fallback,
        }
    }
}
