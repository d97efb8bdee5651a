use std::sync::atomic::{AtomicU64, Ordering};

///Hands out unique, increasing ids. Owned by whoever needs unique names and passed where it is needed, there is no
/// process wide counter.
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        SequenceGenerator {
            next: AtomicU64::new(first),
        }
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    ///Returns `"{prefix}#{id}"` for the next id.
    pub fn next_name(&self, prefix: &str) -> String {
        format!("{}#{}", prefix, self.next())
    }
}
