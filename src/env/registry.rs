//! Environment identifiers
//!
//! Maps the opaque task names callers use ("which task to run") to
//! environment factories.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{
    env::{cartpole::CartPole, grid_walk::GridWalk, pool::EnvPool, Environment},
    error::{Error, MissingCause, Result, Stage},
};

/// Factory producing one fresh simulation instance
pub type EnvFactory = Arc<dyn Fn() -> Box<dyn Environment> + Send + Sync>;

/// Registry of named environment factories
#[derive(Clone)]
pub struct EnvRegistry {
    factories: BTreeMap<String, EnvFactory>,
}

impl EnvRegistry {
    /// Registry without any environments
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Registry with the built-in tasks
    ///
    /// - `toy-balance-task` (also `CartPole-v1`): [`CartPole`]
    /// - `grid-walk-task`: [`GridWalk`]
    pub fn with_builtins() -> Self {
        Self::empty()
            .register(crate::env::cartpole::TASK_ID, || Box::new(CartPole::new()))
            .register("CartPole-v1", || Box::new(CartPole::new()))
            .register(crate::env::grid_walk::TASK_ID, || Box::new(GridWalk::new()))
    }

    /// Register (or replace) a factory under `id`
    pub fn register<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Environment> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
        self
    }

    /// Whether `id` resolves
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create a single instance of `id`
    pub fn make(&self, id: &str) -> Result<Box<dyn Environment>> {
        Ok((self.factory(id)?)())
    }

    /// Create `num_envs` instances of `id` stepped in lockstep
    pub fn make_pool(&self, id: &str, num_envs: usize) -> Result<EnvPool> {
        let factory = self.factory(id)?;
        EnvPool::new(|| factory(), num_envs)
    }

    fn factory(&self, id: &str) -> Result<EnvFactory> {
        self.factories.get(id).cloned().ok_or_else(|| {
            Error::missing(
                Stage::CreateEnvironment,
                format!("simulation '{id}'"),
                MissingCause::NotInstalled,
                format!(
                    "no environment is registered under this id; registered: [{}]",
                    self.ids().collect::<Vec<_>>().join(", ")
                ),
            )
        })
    }
}

impl Default for EnvRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for EnvRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
