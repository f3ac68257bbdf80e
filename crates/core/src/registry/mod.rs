//! Format registry.
//!
//! Maps a `(source, target)` format pair to the [`Recipe`] that performs the
//! conversion. The registry is filled once at start-up, then shared read-only
//! behind an `Arc`. Lookups are exact: an unsupported pair is reported as
//! [`RegistryError::NotFound`], never substituted.

mod builtin;
mod error;
mod recipe;

pub use builtin::builtin_recipes;
pub use error::RegistryError;
pub use recipe::{
    Recipe, ToolKind, INPUT_PLACEHOLDER, OUTPUT_DIR_PLACEHOLDER, OUTPUT_PLACEHOLDER,
};

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, ToolsConfig};
use crate::format::Format;

/// Exact-pair lookup table of conversion recipes.
#[derive(Debug, Default)]
pub struct FormatRegistry {
    recipes: HashMap<(Format, Format), Arc<Recipe>>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in recipe table.
    pub fn builtin(tools: &ToolsConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for recipe in builtin_recipes(tools) {
            registry.register(recipe)?;
        }
        Ok(registry)
    }

    /// Builds the registry described by the configuration.
    ///
    /// Custom recipes are registered after the built-in table, so a custom
    /// recipe for a built-in pair is rejected as a duplicate.
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        let mut registry = if config.registry.include_builtin {
            Self::builtin(&config.tools)?
        } else {
            Self::new()
        };

        for recipe_config in &config.registry.recipes {
            registry.register(recipe_config.to_recipe(&config.tools))?;
        }

        tracing::debug!(recipes = registry.len(), "Format registry initialized");
        Ok(registry)
    }

    /// Registers a recipe for its `(source, target)` pair.
    pub fn register(&mut self, recipe: Recipe) -> Result<(), RegistryError> {
        let (from, to) = (recipe.source, recipe.target);

        if from == to {
            return Err(RegistryError::InvalidRecipe {
                from,
                to,
                reason: "source and target are the same format".to_string(),
            });
        }
        if !recipe.has_input_placeholder() {
            return Err(RegistryError::InvalidRecipe {
                from,
                to,
                reason: format!("arguments never reference {}", INPUT_PLACEHOLDER),
            });
        }
        if recipe.max_duration.is_zero() {
            return Err(RegistryError::InvalidRecipe {
                from,
                to,
                reason: "maximum duration is zero".to_string(),
            });
        }
        if self.recipes.contains_key(&(from, to)) {
            return Err(RegistryError::DuplicateRecipe { from, to });
        }

        self.recipes.insert((from, to), Arc::new(recipe));
        Ok(())
    }

    /// Returns the recipe converting `source` into `target`.
    pub fn resolve(&self, source: Format, target: Format) -> Result<Arc<Recipe>, RegistryError> {
        self.recipes
            .get(&(source, target))
            .cloned()
            .ok_or(RegistryError::NotFound {
                from: source,
                to: target,
            })
    }

    /// Lists the formats `source` can be converted into, sorted.
    pub fn targets_for(&self, source: Format) -> Vec<Format> {
        let mut targets: Vec<Format> = self
            .recipes
            .keys()
            .filter(|(from, _)| *from == source)
            .map(|(_, to)| *to)
            .collect();
        targets.sort();
        targets
    }

    /// Lists every registered pair, sorted.
    pub fn pairs(&self) -> Vec<(Format, Format)> {
        let mut pairs: Vec<_> = self.recipes.keys().copied().collect();
        pairs.sort();
        pairs
    }

    /// Lists every format that appears as a source, sorted.
    pub fn sources(&self) -> Vec<Format> {
        let mut sources: Vec<Format> = self.recipes.keys().map(|(from, _)| *from).collect();
        sources.sort();
        sources.dedup();
        sources
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}
