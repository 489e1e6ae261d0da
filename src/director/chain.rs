//! Sequential composition of directors.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::director::{Director, ProxyRequest};
use crate::error::{ProxyError, ProxyResult};

/// Ordered list of directors run as one.
///
/// Members run strictly one after another. The chain returns as soon as a
/// member cancels the request, and does nothing if the request arrives
/// already cancelled.
#[derive(Clone, Default)]
pub struct Chain {
    directors: Vec<Arc<dyn Director>>,
}

impl Chain {
    pub fn new(directors: Vec<Arc<dyn Director>>) -> Self {
        Self { directors }
    }

    /// Build a chain from slots that may be empty.
    ///
    /// Fails on the first empty slot; no chain is produced in that case.
    pub fn try_new<I>(directors: I) -> ProxyResult<Self>
    where
        I: IntoIterator<Item = Option<Arc<dyn Director>>>,
    {
        let directors = directors
            .into_iter()
            .enumerate()
            .map(|(position, slot)| {
                slot.ok_or_else(|| {
                    ProxyError::Construction(format!("director at position {} is missing", position))
                })
            })
            .collect::<ProxyResult<Vec<_>>>()?;
        Ok(Self { directors })
    }

    /// A new chain with `director` appended after the current members.
    pub fn appended(&self, director: Arc<dyn Director>) -> Self {
        let mut directors = self.directors.clone();
        directors.push(director);
        Self { directors }
    }

    /// Member names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.directors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.directors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directors.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[async_trait]
impl Director for Chain {
    async fn direct(&self, req: &mut ProxyRequest) {
        if req.is_cancelled() {
            return;
        }

        for director in &self.directors {
            director.direct(req).await;
            if req.is_cancelled() {
                tracing::debug!(
                    director = director.name(),
                    path = %req.original_path(),
                    "Chain stopped by cancellation"
                );
                return;
            }
        }
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}
