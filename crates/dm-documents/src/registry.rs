//! Owner Registry
//!
//! Maps the owner type discriminator stored on a document to the owner kind
//! it names. Every record kind that can carry documents is registered once
//! at startup.

use std::collections::HashMap;
use std::sync::Arc;

use dm_core::config::OwnerConfig;
use dm_core::traits::{Id, Identifiable};

use crate::error::{DocumentError, DocumentResult};
use crate::model::OwnerRef;

/// A record kind that can have documents attached
///
/// ```rust,ignore
/// impl Documentable for Project {
///     const OWNER_TYPE: &'static str = "Project";
///     const TABLE_NAME: &'static str = "projects";
///     const OCRABLE: bool = true;
/// }
/// ```
pub trait Documentable: Identifiable {
    /// Discriminator stored in `documents.owner_type`
    const OWNER_TYPE: &'static str;

    /// Table holding the owner rows
    const TABLE_NAME: &'static str;

    /// Whether PDF documents of this owner get text extraction
    const OCRABLE: bool = false;

    /// Reference to this record, once persisted
    fn owner_ref(&self) -> Option<OwnerRef> {
        self.id().map(|id| OwnerRef::new(Self::OWNER_TYPE, id))
    }
}

/// Registration of one owner kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerType {
    /// Canonical discriminator
    pub name: String,
    /// Table holding the owner rows
    pub table: String,
    /// OCR capability
    pub ocrable: bool,
    /// Alternative discriminators resolving to this kind
    pub aliases: Vec<String>,
}

impl OwnerType {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            ocrable: false,
            aliases: Vec::new(),
        }
    }

    /// Registration derived from a [`Documentable`] type
    pub fn of<T: Documentable>() -> Self {
        let mut owner_type = Self::new(T::OWNER_TYPE, T::TABLE_NAME);
        owner_type.ocrable = T::OCRABLE;
        owner_type
    }

    pub fn ocrable(mut self) -> Self {
        self.ocrable = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn owner(&self, owner_id: Id) -> OwnerRef {
        OwnerRef::new(&self.name, owner_id)
    }
}

impl From<&OwnerConfig> for OwnerType {
    fn from(config: &OwnerConfig) -> Self {
        Self {
            name: config.name.clone(),
            table: config.table.clone(),
            ocrable: config.ocrable,
            aliases: config.aliases.clone(),
        }
    }
}

/// Discriminator to owner kind lookup
#[derive(Debug, Default)]
pub struct OwnerRegistry {
    types: HashMap<String, Arc<OwnerType>>,
    aliases: HashMap<String, String>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an owner kind; re-registering a name replaces it
    pub fn register(mut self, owner_type: OwnerType) -> Self {
        for alias in &owner_type.aliases {
            self.aliases.insert(alias.clone(), owner_type.name.clone());
        }
        self.types
            .insert(owner_type.name.clone(), Arc::new(owner_type));
        self
    }

    /// Registry holding every configured owner kind
    pub fn from_config(owners: &[OwnerConfig]) -> Self {
        owners
            .iter()
            .fold(Self::new(), |registry, owner| registry.register(owner.into()))
    }

    pub fn register_documentable<T: Documentable>(self) -> Self {
        self.register(OwnerType::of::<T>())
    }

    /// Resolve a discriminator or alias to its owner kind
    pub fn resolve(&self, discriminator: &str) -> DocumentResult<Arc<OwnerType>> {
        let name = self
            .aliases
            .get(discriminator)
            .map(String::as_str)
            .unwrap_or(discriminator);

        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| DocumentError::UnknownOwnerType(discriminator.to_string()))
    }

    /// Canonical reference for a discriminator/id pair
    pub fn owner_ref(&self, discriminator: &str, owner_id: Id) -> DocumentResult<OwnerRef> {
        Ok(self.resolve(discriminator)?.owner(owner_id))
    }

    pub fn contains(&self, discriminator: &str) -> bool {
        self.resolve(discriminator).is_ok()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn owner_types(&self) -> impl Iterator<Item = &OwnerType> {
        self.types.values().map(|t| t.as_ref())
    }
}
