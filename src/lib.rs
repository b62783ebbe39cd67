//! # spacegraph-rs — Agentic 3D Scene Graph
//!
//! A scene graph whose nodes are autonomous agents. Objects negotiate
//! spatial relations (near, on-top-of, supports, beside, in) by message
//! exchange; an orchestrator advances logical ticks and commits
//! event-sourced patches with last-writer-wins semantics. A spatial
//! context analyzer and a rule-based question dispatcher answer
//! relationship, accessibility, stability and what-if questions on top.
//!
//! ## Design Principles
//!
//! 1. **One writer**: the store is the only mutable shared state; every
//!    mutation is a patch through one commit path
//! 2. **Event-sourced**: the append-only event log is ground truth;
//!    support indices, clusters and scores are rebuilt caches
//! 3. **Deterministic**: logical timestamps, sorted agent order, ordered
//!    maps — identical inputs replay to an identical event log
//! 4. **Agents own nothing**: an agent holds its node id and capabilities
//!    (store read handle, bus send), never references to other nodes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spacegraph_rs::Scene;
//!
//! # async fn example() -> spacegraph_rs::Result<()> {
//! let scene = Scene::bootstrap(r#"{ "scene": {
//!     "rooms": [{ "id": "kitchen", "pos": [2.5, 2, 1.25],
//!                 "bbox": { "type": "OBB", "xyz": [5, 4, 2.5] } }],
//!     "objects": [], "relations": [] } }"#).await?;
//!
//! scene.run_ticks(2).await?;
//! let answer = scene.ask("What is in the scene?").await?;
//! println!("{}", answer.answer_text);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod agent;
pub mod bootstrap;
pub mod bus;
pub mod command;
pub mod config;
pub mod context;
pub mod model;
pub mod orchestrator;
pub mod qa;
pub mod store;
pub mod support;
pub mod topo;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{Aabb, Mobility, Node, NodeId, PropertyMap, Quat, RelKey, RelKind, Relation, Value, Vec3};

// ============================================================================
// Re-exports: Store & events
// ============================================================================

pub use store::{Event, EventKind, NodeUpdate, Patch, SceneStore, Stamp, StoreSnapshot};

// ============================================================================
// Re-exports: Runtime surface
// ============================================================================

pub use command::{CommandRouter, Intent, IntentOutcome};
pub use config::{AgentProfile, ClusterRule, SceneConfig};
pub use context::{CompactContext, SpatialSnapshot};
pub use orchestrator::{EventSink, Orchestrator, TickReport};
pub use qa::{Answer, QuestionDispatcher, QuestionType};
pub use support::{AccessCategory, AccessReport, StabilityRisk, SupportSystem};

// ============================================================================
// External language layer seam
// ============================================================================

/// The optional external NL layer: questions classified `complex` are
/// forwarded here together with the spatial snapshot. The core stores no
/// dialog state.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn answer_complex(&self, snapshot: &SpatialSnapshot, question: &str) -> Result<String>;
}

// ============================================================================
// Top-level Scene handle
// ============================================================================

/// The primary entry point: a bootstrapped scene plus its orchestrator,
/// command router and question dispatcher.
pub struct Scene {
    store: Arc<SceneStore>,
    config: Arc<SceneConfig>,
    orchestrator: Mutex<Orchestrator>,
    router: CommandRouter,
    dispatcher: QuestionDispatcher,
    language: Option<Arc<dyn LanguageBackend>>,
}

impl Scene {
    /// Loads a bootstrap document with the default configuration.
    pub async fn bootstrap(json: &str) -> Result<Self> {
        Self::bootstrap_with(json, SceneConfig::default()).await
    }

    /// Loads a bootstrap document with an explicit configuration.
    pub async fn bootstrap_with(json: &str, config: SceneConfig) -> Result<Self> {
        let (nodes, relations) = bootstrap::parse(json)?;
        let store = Arc::new(SceneStore::new());
        store.load_bootstrap(nodes, relations)?;

        let config = Arc::new(config);
        let bus = Arc::new(bus::AgentBus::new());
        let orchestrator = Orchestrator::new(store.clone(), bus, config.clone());
        info!(nodes = store.node_count(), "scene ready");
        Ok(Self {
            store,
            config: config.clone(),
            orchestrator: Mutex::new(orchestrator),
            router: CommandRouter::new(),
            dispatcher: QuestionDispatcher::new((*config).clone()),
            language: None,
        })
    }

    /// Attaches the external language layer for `complex` questions.
    pub fn with_language_backend(mut self, backend: Arc<dyn LanguageBackend>) -> Self {
        self.language = Some(backend);
        self
    }

    // ========================================================================
    // Tick loop
    // ========================================================================

    /// Advances the scene by one tick.
    pub async fn tick(&self) -> Result<TickReport> {
        self.orchestrator.lock().tick()
    }

    /// Runs `n` ticks back to back.
    pub async fn run_ticks(&self, n: usize) -> Result<Vec<TickReport>> {
        let mut reports = Vec::with_capacity(n);
        for _ in 0..n {
            reports.push(self.orchestrator.lock().tick()?);
        }
        Ok(reports)
    }

    // ========================================================================
    // Commands & questions
    // ========================================================================

    /// Applies one parsed intent.
    pub async fn apply_intent(&self, intent: &Intent) -> Result<IntentOutcome> {
        let mut orchestrator = self.orchestrator.lock();
        self.router
            .apply(&mut orchestrator, &self.store, &self.dispatcher, intent)
    }

    /// Applies an intent batch atomically: the whole batch validates
    /// before the first patch lands.
    pub async fn apply_intents(&self, intents: &[Intent]) -> Result<Vec<IntentOutcome>> {
        let mut orchestrator = self.orchestrator.lock();
        self.router
            .apply_batch(&mut orchestrator, &self.store, &self.dispatcher, intents)
    }

    /// Like [`apply_intent`](Self::apply_intent) but gives up with
    /// `Error::Timeout` when the scene lock is contended past `deadline`.
    pub async fn apply_intent_within(
        &self,
        intent: &Intent,
        deadline: Duration,
    ) -> Result<IntentOutcome> {
        let mut orchestrator = self
            .orchestrator
            .try_lock_for(deadline)
            .ok_or_else(|| Error::Timeout(format!("scene busy for {deadline:?}")))?;
        self.router
            .apply(&mut orchestrator, &self.store, &self.dispatcher, intent)
    }

    /// Answers a question. Locally handled categories never touch the
    /// language backend; `complex` is forwarded when one is attached.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let (answer, snapshot) = {
            let orchestrator = self.orchestrator.lock();
            let snap = self.store.snapshot();
            let answer = self
                .dispatcher
                .answer(question, &snap, orchestrator.support());
            if answer.question_type != QuestionType::Complex {
                return Ok(answer);
            }
            let snapshot = context::assemble(&snap, orchestrator.support(), &self.config);
            (answer, snapshot)
        };
        match &self.language {
            Some(backend) => {
                let text = backend.answer_complex(&snapshot, question).await?;
                Ok(Answer { answer_text: text, confidence: 0.8, ..answer })
            }
            None => Ok(answer),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The full derived snapshot (analyzer output, export contract).
    pub fn snapshot(&self) -> SpatialSnapshot {
        let orchestrator = self.orchestrator.lock();
        context::assemble(&self.store.snapshot(), orchestrator.support(), &self.config)
    }

    /// Raw graph copy (nodes + relations).
    pub fn store_snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }

    /// Compact context around a viewer pose for external prompt builders.
    pub fn as_context(&self, viewer: &Vec3, roi: f64, k: usize) -> CompactContext {
        context::compact_context(&self.store.snapshot(), viewer, roi, k)
    }

    /// Exports the scene in bootstrap shape.
    pub fn export(&self, scene_id: &str) -> serde_json::Value {
        bootstrap::export(&self.store.snapshot(), scene_id)
    }

    /// Registers an observer for committed event batches.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.orchestrator.lock().subscribe(sink);
    }

    /// The append-only event log.
    pub fn event_log(&self) -> Vec<Event> {
        self.store.event_log()
    }

    /// Direct store access (advanced use, tests).
    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad bootstrap: {0}")]
    BadBootstrap(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dangling reference: {0}")]
    DanglingRef(String),

    #[error("bad intent: {0}")]
    BadIntent(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;
