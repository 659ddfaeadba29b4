/*!
Immutable snapshot generations and the store that publishes them.

This module defines:
- `Generation`: one bundle after graph build and classification. Never mutated once built.
- `SnapshotStore`: holds the current generation behind an atomic pointer. Writers build a
  new generation off to the side and swap it in; readers take an `Arc` and keep using it
  for the whole request, even if a newer generation is published meanwhile.
*/

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use arc_swap::ArcSwapOption;

use crate::{
    classify::{Classification, ClassificationReport, classify},
    config::EngineConfig,
    error::{EngineError, Warning},
    network::{forwarding::DeviceSnapshot, hints::EndpointHints, network_graph::TopologyGraph},
    parsers::bundle::SnapshotBundle,
    trace::{PathTrace, TraceRequest, Tracer},
};

#[derive(Debug)]
pub struct Generation {
    pub id: u64,
    pub published_at: SystemTime,
    pub collected_at: Option<SystemTime>,
    pub graph: TopologyGraph,
    pub snapshots: BTreeMap<String, DeviceSnapshot>,
    pub classification: Classification,
    /// Everything detected while building the graph and classifying it.
    pub warnings: Vec<Warning>,
}

impl Generation {
    /// Builds and classifies a generation. Config hints and bundle hints both apply.
    pub fn build(id: u64, bundle: SnapshotBundle, config: &EngineConfig) -> Self {
        let hints = EndpointHints::new(config.endpoint_hints.iter().chain(bundle.endpoint_hints.iter()));
        let (mut graph, mut warnings) = TopologyGraph::build(&bundle, &hints);
        let (classification, classify_warnings) = classify(&mut graph, &bundle.snapshots, config);
        warnings.extend(classify_warnings);

        Self {
            id,
            published_at: SystemTime::now(),
            collected_at: bundle.collected_at,
            graph,
            snapshots: bundle.snapshots,
            classification,
            warnings,
        }
    }

    pub fn report(&self) -> ClassificationReport {
        ClassificationReport::new(self.id, &self.graph, &self.classification, &self.warnings)
    }

    pub fn tracer(&self) -> Tracer<'_> {
        Tracer::new(&self.graph, &self.snapshots, &self.classification)
    }

    pub fn trace(&self, request: &TraceRequest) -> Result<PathTrace, EngineError> {
        let trace = self.tracer().trace(request)?;
        tracing::info!(
            "Traced {} -> {} in generation {}: {} ({} hops)",
            request.src_ip,
            request.dst_ip,
            self.id,
            trace.scenario,
            trace.hop_count
        );
        Ok(trace)
    }
}

pub struct SnapshotStore {
    current: ArcSwapOption<Generation>,
    /// Serialises writers and remembers the last id handed out.
    last_id: Mutex<u64>,
    config: EngineConfig,
}

impl SnapshotStore {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            current: ArcSwapOption::empty(),
            last_id: Mutex::new(0),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a generation from `bundle` and makes it current.
    ///
    /// The bundle's own generation number is used when it moves forward; otherwise the
    /// previous id plus one, so ids never go backwards.
    pub fn publish(&self, bundle: SnapshotBundle) -> Arc<Generation> {
        let mut last_id = self.last_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = match bundle.generation {
            Some(requested) if requested > *last_id => requested,
            Some(requested) => {
                tracing::warn!(
                    "Bundle generation {} does not advance past {}, using {}",
                    requested,
                    *last_id,
                    *last_id + 1
                );
                *last_id + 1
            }
            None => *last_id + 1,
        };

        let generation = Arc::new(Generation::build(id, bundle, &self.config));
        self.current.store(Some(Arc::clone(&generation)));
        *last_id = id;

        tracing::info!(
            "Published generation {} ({} devices, {} links, {} warnings)",
            id,
            generation.graph.len(),
            generation.graph.links().len(),
            generation.warnings.len()
        );
        generation
    }

    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.load_full()
    }

    pub fn current_id(&self) -> Option<u64> {
        self.current.load().as_ref().map(|generation| generation.id)
    }

    fn require_current(&self) -> Result<Arc<Generation>, EngineError> {
        self.current().ok_or(EngineError::NoGeneration)
    }

    pub fn classify(&self) -> Result<ClassificationReport, EngineError> {
        Ok(self.require_current()?.report())
    }

    pub fn trace_path(&self, request: &TraceRequest) -> Result<PathTrace, EngineError> {
        self.require_current()?.trace(request)
    }
}
