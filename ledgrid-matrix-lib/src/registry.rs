//! Named collection of the matrices a process drives.
//!
//! Built once at startup and then shared read-only; lookups by name are what
//! the control surface uses to find the target of a request.

use std::sync::Arc;

use derive_more::{Display, Error};
use indexmap::IndexMap;
use log::{info, warn};

use crate::matrix::LedMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("Matrix {name} is unknown. Valid matrix names are: {}", known.join(", "))]
pub struct UnknownMatrix {
    pub name: String,
    pub known: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MatrixRegistry {
    matrices: IndexMap<String, Arc<LedMatrix>>,
}

impl MatrixRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `matrix` under its name. A matrix already registered under the
    /// same name is replaced and returned.
    pub fn register(&mut self, matrix: LedMatrix) -> Option<Arc<LedMatrix>> {
        let name = matrix.name().to_string();
        let previous = self.matrices.insert(name.clone(), Arc::new(matrix));
        if previous.is_some() {
            warn!("Matrix '{name}' registered twice, the later definition wins");
        }
        previous
    }

    pub fn get(&self, name: &str) -> Result<&Arc<LedMatrix>, UnknownMatrix> {
        self.matrices.get(name).ok_or_else(|| UnknownMatrix {
            name: name.to_string(),
            known: self.names().map(str::to_string).collect(),
        })
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.matrices.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LedMatrix>> {
        self.matrices.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.matrices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matrices.is_empty()
    }

    /// Halt every matrix's task.
    pub async fn shutdown(&self) {
        for matrix in self.matrices.values() {
            matrix.halt().await;
        }
        info!("Halted {} matrices", self.matrices.len());
    }
}
