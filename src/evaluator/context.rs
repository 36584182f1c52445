//! Evaluation Context (spec C10): root resource, `$this`, `$index`,
//! external variables, cancellation, service hooks, and depth/size counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::model::Collection;

/// Caller-supplied reference resolver (spec §4.11 `resolve()`, §6).
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, cancellation: &Cancellation, reference: &str) -> Result<Vec<u8>, String>;
}

/// Caller-supplied terminology service (spec §4.11 `memberOf()`).
pub trait TerminologyService: Send + Sync {
    fn member_of(
        &self,
        cancellation: &Cancellation,
        code_payload: &serde_json::Value,
        value_set_url: &str,
    ) -> Result<bool, String>;
}

/// Caller-supplied profile validator (spec §4.11 `conformsTo()`).
pub trait ProfileValidator: Send + Sync {
    fn conforms_to(
        &self,
        cancellation: &Cancellation,
        resource: &serde_json::Value,
        profile_url: &str,
    ) -> Result<bool, String>;
}

/// Deadline + explicit abort flag threaded through the context (spec §5).
#[derive(Clone)]
pub struct Cancellation {
    deadline: Option<Instant>,
    aborted: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { deadline: Some(Instant::now() + timeout), aborted: Arc::new(AtomicBool::new(false)) }
    }

    pub fn none() -> Self {
        Self { deadline: None, aborted: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_cancelled(&self) -> bool {
        if self.aborted.load(AtomicOrdering::Relaxed) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }

    pub fn abort(&self) {
        self.aborted.store(true, AtomicOrdering::Relaxed);
    }
}

/// Limits enforced uniformly by the evaluator (spec §4.12, §5 defaults).
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_depth: usize,
    pub max_collection_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self { max_depth: 100, max_collection_size: 10_000 }
    }
}

/// Caller-supplied evaluation options (spec §6 "Options enumerated").
#[derive(Clone, Default)]
pub struct EvaluationOptions {
    pub timeout: Option<Duration>,
    pub max_depth: Option<usize>,
    pub max_collection_size: Option<usize>,
    pub variables: HashMap<String, Collection>,
    pub resolver: Option<Arc<dyn ReferenceResolver>>,
    pub terminology: Option<Arc<dyn TerminologyService>>,
    pub validator: Option<Arc<dyn ProfileValidator>>,
    pub cancellation: Option<Cancellation>,
}

/// Per-evaluation counters for depth and collection-size caps (spec I6).
pub struct Counters {
    depth: AtomicU64,
    max_depth_seen: AtomicU64,
}

impl Counters {
    fn new() -> Self {
        Self { depth: AtomicU64::new(0), max_depth_seen: AtomicU64::new(0) }
    }
}

pub struct EvaluationContext {
    pub root: Collection,
    pub this: Collection,
    pub index: Option<i64>,
    /// `$total` — the running aggregate, valid only inside `aggregate()`.
    pub total: Option<Collection>,
    pub variables: Arc<HashMap<String, Collection>>,
    pub limits: Limits,
    pub cancellation: Cancellation,
    pub resolver: Option<Arc<dyn ReferenceResolver>>,
    pub terminology: Option<Arc<dyn TerminologyService>>,
    pub validator: Option<Arc<dyn ProfileValidator>>,
    counters: Arc<Counters>,
}

impl EvaluationContext {
    pub fn new(root: Collection, options: &EvaluationOptions) -> Self {
        let mut variables = options.variables.clone();
        variables.entry("resource".to_string()).or_insert_with(|| root.clone());
        variables.entry("context".to_string()).or_insert_with(|| root.clone());
        variables.entry("ucum".to_string()).or_insert_with(|| {
            Collection::single(crate::model::FhirPathValue::String(
                "http://unitsofmeasure.org".to_string(),
            ))
        });
        let limits = Limits {
            max_depth: options.max_depth.unwrap_or_else(|| Limits::default().max_depth),
            max_collection_size: options
                .max_collection_size
                .unwrap_or_else(|| Limits::default().max_collection_size),
        };
        let cancellation = options.cancellation.clone().unwrap_or_else(|| {
            options.timeout.map(Cancellation::with_timeout).unwrap_or_else(|| {
                Cancellation::with_timeout(Duration::from_secs(5))
            })
        });
        Self {
            this: root.clone(),
            root,
            index: None,
            total: None,
            variables: Arc::new(variables),
            limits,
            cancellation,
            resolver: options.resolver.clone(),
            terminology: options.terminology.clone(),
            validator: options.validator.clone(),
            counters: Arc::new(Counters::new()),
        }
    }

    /// A shallow clone overriding `$this`/`$index`: mutation of one clone
    /// (e.g. depth counters, which are shared) must not leak `$this`/`$index`
    /// back into the parent (spec §3 "Evaluation Context").
    pub fn with_this(&self, this: Collection, index: Option<i64>) -> Self {
        Self {
            root: self.root.clone(),
            this,
            index,
            total: self.total.clone(),
            variables: self.variables.clone(),
            limits: self.limits,
            cancellation: self.cancellation.clone(),
            resolver: self.resolver.clone(),
            terminology: self.terminology.clone(),
            validator: self.validator.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn with_total(&self, total: Collection) -> Self {
        let mut c = self.with_this(self.this.clone(), self.index);
        c.total = Some(total);
        c
    }

    pub fn variable(&self, name: &str) -> Option<Collection> {
        self.variables.get(name).cloned()
    }

    pub fn enter_depth(&self) -> Result<DepthGuard, crate::evaluator::error::EvalError> {
        let prev = self.counters.depth.fetch_add(1, AtomicOrdering::Relaxed);
        let current = prev + 1;
        let mut seen = self.counters.max_depth_seen.load(AtomicOrdering::Relaxed);
        while current > seen {
            match self.counters.max_depth_seen.compare_exchange_weak(
                seen,
                current,
                AtomicOrdering::Relaxed,
                AtomicOrdering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => seen = actual,
            }
        }
        if current as usize > self.limits.max_depth {
            self.counters.depth.fetch_sub(1, AtomicOrdering::Relaxed);
            return Err(crate::evaluator::error::EvalErrorKind::DepthExceeded.into());
        }
        Ok(DepthGuard { counters: self.counters.clone() })
    }

    pub fn check_size(&self, len: usize) -> Result<(), crate::evaluator::error::EvalError> {
        if len > self.limits.max_collection_size {
            return Err(crate::evaluator::error::EvalErrorKind::CollectionTooLarge.into());
        }
        Ok(())
    }

    pub fn check_cancelled(&self) -> Result<(), crate::evaluator::error::EvalError> {
        if self.cancellation.is_cancelled() {
            return Err(crate::evaluator::error::EvalErrorKind::Cancelled.into());
        }
        Ok(())
    }
}

/// Decrements the shared depth counter on drop (including on error unwind).
pub struct DepthGuard {
    counters: Arc<Counters>,
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.counters.depth.fetch_sub(1, AtomicOrdering::Relaxed);
    }
}
