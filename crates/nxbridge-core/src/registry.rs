// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag registry.
//!
//! The registry maps tag names to their [`TagDescriptor`] and to the node that
//! exposes them in the address space. It is built once at startup; the only
//! mutation afterwards is binding each tag to its node, which happens before
//! the registry is shared with the synchronization engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::publisher::NodeHandle;
use crate::types::{DataType, Value};

// =============================================================================
// TagDescriptor
// =============================================================================

/// Static description of one controller tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDescriptor {
    name: String,
    data_type: DataType,
    writable: bool,
    initial_value: Value,
}

impl TagDescriptor {
    /// Creates a descriptor whose initial value is the zero value of its type.
    pub fn new(name: impl Into<String>, data_type: DataType, writable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            writable,
            initial_value: data_type.default_value(),
        }
    }

    /// Sets the initial node value.
    ///
    /// The value is converted to the canonical form of the declared type;
    /// `None` is returned if it is not representable.
    pub fn with_initial_value(mut self, value: &Value) -> Option<Self> {
        self.initial_value = self.data_type.coerce(value)?;
        Some(self)
    }

    /// Returns the tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared type.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns `true` if OPC UA clients may write this tag.
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns the value the exposed node starts with.
    pub fn initial_value(&self) -> &Value {
        &self.initial_value
    }
}

// =============================================================================
// TagRegistry
// =============================================================================

/// Registry of all synchronized tags, in definition order.
#[derive(Debug, Default)]
pub struct TagRegistry {
    tags: Vec<TagDescriptor>,
    by_name: HashMap<String, usize>,
    nodes: Vec<Option<NodeHandle>>,
    by_node: HashMap<NodeHandle, usize>,
}

impl TagRegistry {
    /// Builds a registry from descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTag`] if two descriptors share a name.
    pub fn new(descriptors: impl IntoIterator<Item = TagDescriptor>) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for descriptor in descriptors {
            if registry.by_name.contains_key(descriptor.name()) {
                return Err(RegistryError::DuplicateTag {
                    name: descriptor.name().to_string(),
                });
            }
            registry
                .by_name
                .insert(descriptor.name().to_string(), registry.tags.len());
            registry.tags.push(descriptor);
            registry.nodes.push(None);
        }
        Ok(registry)
    }

    /// Binds a tag to the node that exposes it.
    pub fn bind_node(&mut self, name: &str, node: NodeHandle) -> Result<(), RegistryError> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTag {
                name: name.to_string(),
            })?;

        if let Some(existing) = &self.nodes[index] {
            return Err(RegistryError::AlreadyBound {
                name: name.to_string(),
                node: existing.to_string(),
            });
        }
        if self.by_node.contains_key(&node) {
            return Err(RegistryError::AlreadyBound {
                name: name.to_string(),
                node: node.to_string(),
            });
        }

        self.by_node.insert(node.clone(), index);
        self.nodes[index] = Some(node);
        Ok(())
    }

    /// Returns the descriptor for a tag name.
    pub fn get(&self, name: &str) -> Option<&TagDescriptor> {
        self.by_name.get(name).map(|&i| &self.tags[i])
    }

    /// Returns the node bound to a tag.
    pub fn node_of(&self, name: &str) -> Option<&NodeHandle> {
        self.by_name
            .get(name)
            .and_then(|&i| self.nodes[i].as_ref())
    }

    /// Resolves a node back to the tag it exposes.
    pub fn resolve_node(&self, node: &NodeHandle) -> Option<&TagDescriptor> {
        self.by_node.get(node).map(|&i| &self.tags[i])
    }

    /// Iterates over descriptors in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &TagDescriptor> {
        self.tags.iter()
    }

    /// Iterates over `(descriptor, node)` pairs for bound tags.
    pub fn bound(&self) -> impl Iterator<Item = (&TagDescriptor, &NodeHandle)> {
        self.tags
            .iter()
            .zip(self.nodes.iter())
            .filter_map(|(tag, node)| node.as_ref().map(|n| (tag, n)))
    }

    /// Returns the number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if no tags are registered.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
