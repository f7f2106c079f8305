// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address space bootstrap.

use tracing::{debug, info};

use crate::error::{BridgeResult, RegistryError};
use crate::publisher::{NodeHandle, NodePublisher};
use crate::registry::TagRegistry;
use crate::types::{DataType, Value};

/// Default name of the controller health node.
pub const DEFAULT_HEALTH_TAG: &str = "COM_PLC_FAIL";

/// Where the bridge's nodes live in the address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpaceLayout {
    /// Namespace URI registered for all bridge nodes.
    pub namespace_uri: String,
    /// Label of the object holding the tag variables.
    pub object_label: String,
    /// Name of the health node.
    pub health_tag: String,
}

/// Nodes created by [`expose_tags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedNodes {
    /// Index of the registered namespace.
    pub namespace_index: u16,
    /// The object holding the tag variables.
    pub object: NodeHandle,
    /// The health node.
    pub health: NodeHandle,
}

/// Creates the bridge's nodes and binds every tag to its variable.
///
/// Each tag becomes a variable named after the tag, holding the tag's
/// initial value and writable only if the tag is. The health node is a
/// read-only boolean starting at `false`.
pub fn expose_tags(
    registry: &mut TagRegistry,
    publisher: &dyn NodePublisher,
    layout: &AddressSpaceLayout,
) -> BridgeResult<ExposedNodes> {
    if registry.get(&layout.health_tag).is_some() {
        return Err(RegistryError::DuplicateTag {
            name: layout.health_tag.clone(),
        }
        .into());
    }

    let namespace_index = publisher.register_namespace(&layout.namespace_uri)?;
    let object = publisher.create_object(namespace_index, &layout.object_label)?;

    let mut bindings = Vec::with_capacity(registry.len());
    for tag in registry.iter() {
        let node = publisher.create_variable(
            namespace_index,
            &object,
            tag.name(),
            tag.initial_value(),
            tag.data_type(),
        )?;
        if tag.is_writable() {
            publisher.set_writable(&node, true)?;
        }
        debug!(
            tag = %tag.name(),
            node = %node,
            data_type = %tag.data_type(),
            writable = tag.is_writable(),
            "Variable created"
        );
        bindings.push((tag.name().to_string(), node));
    }
    for (name, node) in bindings {
        registry.bind_node(&name, node)?;
    }

    let health = publisher.create_variable(
        namespace_index,
        &object,
        &layout.health_tag,
        &Value::Bool(false),
        DataType::Bool,
    )?;

    info!(
        namespace = %layout.namespace_uri,
        namespace_index,
        object = %layout.object_label,
        tags = registry.len(),
        health = %health,
        "Address space ready"
    );

    Ok(ExposedNodes {
        namespace_index,
        object,
        health,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::TestPublisher;
    use crate::error::BridgeError;
    use crate::registry::TagDescriptor;

    fn layout() -> AddressSpaceLayout {
        AddressSpaceLayout {
            namespace_uri: "urn:nxbridge:test".into(),
            object_label: "PLC".into(),
            health_tag: DEFAULT_HEALTH_TAG.into(),
        }
    }

    #[test]
    fn test_expose_binds_all_tags() {
        let mut registry = TagRegistry::new([
            TagDescriptor::new("Speed", DataType::Int32, true)
                .with_initial_value(&Value::Int64(10))
                .unwrap(),
            TagDescriptor::new("Running", DataType::Bool, false),
        ])
        .unwrap();
        let publisher = TestPublisher::default();

        let nodes = expose_tags(&mut registry, &publisher, &layout()).unwrap();

        assert_eq!(nodes.health, NodeHandle::new(2, DEFAULT_HEALTH_TAG));
        assert_eq!(registry.bound().count(), 2);
        let values = publisher.values.lock();
        assert_eq!(values.get(&NodeHandle::new(2, "Speed")), Some(&Value::Int32(10)));
        assert_eq!(values.get(&nodes.health), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_health_tag_collision() {
        let mut registry =
            TagRegistry::new([TagDescriptor::new(DEFAULT_HEALTH_TAG, DataType::Bool, false)])
                .unwrap();
        let err = expose_tags(&mut registry, &TestPublisher::default(), &layout()).unwrap_err();
        assert!(matches!(err, BridgeError::Registry(RegistryError::DuplicateTag { .. })));
    }
}
