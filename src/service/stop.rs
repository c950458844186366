use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared request to end continuous acquisition
///
/// Clones observe the same flag; once requested it stays set.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
