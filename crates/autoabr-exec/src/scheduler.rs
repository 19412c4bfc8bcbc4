//! Fan-out policy for pairs and per-pair models.
//!
//! Outcomes are gathered into an ordered `Vec` first; callers fold them once
//! everything has resolved instead of mutating shared state from tasks.

use std::future::Future;

use futures::stream::{self, StreamExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// One at a time, in input order.
    Sequential,
    /// All in flight at once, or at most `limit`.
    Concurrent { limit: Option<usize> },
}

impl FanOut {
    pub fn from_flags(concurrency: bool, limit: Option<usize>) -> Self {
        if concurrency {
            FanOut::Concurrent { limit }
        } else {
            FanOut::Sequential
        }
    }
}

/// Run `f` over `items` under `policy`; outputs keep the input order.
pub async fn run_all<T, F, Fut>(items: Vec<T>, policy: FanOut, mut f: F) -> Vec<Fut::Output>
where
    F: FnMut(T) -> Fut,
    Fut: Future,
{
    match policy {
        FanOut::Sequential => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(f(item).await);
            }
            out
        }
        FanOut::Concurrent { limit: None } => futures::future::join_all(items.into_iter().map(f)).await,
        FanOut::Concurrent { limit: Some(n) } => stream::iter(items).map(f).buffered(n.max(1)).collect().await,
    }
}
