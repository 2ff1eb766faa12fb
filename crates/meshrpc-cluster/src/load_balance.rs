use arc_swap::ArcSwap;
use meshrpc_client::Reference;
use meshrpc_common::protocol::{Request, Result, RpcError};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Snapshot of the references a load balance selects from.
pub type ReferenceSet = Arc<Vec<Arc<dyn Reference>>>;

/// Picks one reference per call out of the cluster's current set.
///
/// The set is replaced wholesale by [`on_refresh`](LoadBalance::on_refresh);
/// `select` always works on one complete snapshot, never a half-updated set.
pub trait LoadBalance: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_refresh(&self, references: Vec<Arc<dyn Reference>>);

    fn select(&self, request: &Request) -> Result<Arc<dyn Reference>>;

    fn references(&self) -> ReferenceSet;
}

fn no_reference(request: &Request) -> RpcError {
    RpcError::ServiceUnavailable(format!(
        "no available reference for {}.{}",
        request.interface_name, request.method_name
    ))
}

/// First available reference scanning from `start`, wrapping around.
fn first_available(references: &[Arc<dyn Reference>], start: usize) -> Option<Arc<dyn Reference>> {
    let len = references.len();
    (0..len)
        .map(|i| &references[(start + i) % len])
        .find(|r| r.is_available())
        .cloned()
}

/// Uniform random selection among available references.
pub struct RandomLoadBalance {
    references: ArcSwap<Vec<Arc<dyn Reference>>>,
}

impl Default for RandomLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomLoadBalance {
    pub fn new() -> Self {
        Self {
            references: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl LoadBalance for RandomLoadBalance {
    fn name(&self) -> &'static str {
        "random"
    }

    fn on_refresh(&self, references: Vec<Arc<dyn Reference>>) {
        self.references.store(Arc::new(references));
    }

    fn select(&self, request: &Request) -> Result<Arc<dyn Reference>> {
        let references = self.references.load();
        if references.is_empty() {
            return Err(no_reference(request));
        }
        let start = rand::rng().random_range(0..references.len());
        first_available(&references, start).ok_or_else(|| no_reference(request))
    }

    fn references(&self) -> ReferenceSet {
        self.references.load_full()
    }
}

/// Round-robin selection among available references.
pub struct RoundRobinLoadBalance {
    references: ArcSwap<Vec<Arc<dyn Reference>>>,
    next: AtomicUsize,
}

impl Default for RoundRobinLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinLoadBalance {
    pub fn new() -> Self {
        Self {
            references: ArcSwap::from_pointee(Vec::new()),
            next: AtomicUsize::new(0),
        }
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn on_refresh(&self, references: Vec<Arc<dyn Reference>>) {
        self.references.store(Arc::new(references));
    }

    fn select(&self, request: &Request) -> Result<Arc<dyn Reference>> {
        let references = self.references.load();
        if references.is_empty() {
            return Err(no_reference(request));
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % references.len();
        first_available(&references, start).ok_or_else(|| no_reference(request))
    }

    fn references(&self) -> ReferenceSet {
        self.references.load_full()
    }
}
