use std::rc::Rc;

use serde_json::{Map, Value};

use super::resource_node::{Children, Properties, ResourceNode};
use super::{METADATA_PREFIX, PRIMARY_TYPE};
use crate::client::RepositoryClient;
use crate::diff::PropertyValue;
use crate::path::resolve;
use crate::transport::Transport;

/// The loaded half-pair of a node. Both maps are shared read-only and only
/// ever replaced as a whole.
pub(super) struct NodeContents<T> {
    pub properties: Rc<Properties>,
    pub children: Rc<Children<T>>,
}

impl<T> Clone for NodeContents<T> {
    fn clone(&self) -> Self {
        Self {
            properties: Rc::clone(&self.properties),
            children: Rc::clone(&self.children),
        }
    }
}

impl<T: Transport + 'static> NodeContents<T> {
    /// Splits a node representation into properties and children.
    ///
    /// Objects become children: fully built when they carry a primary type,
    /// empty placeholders otherwise. Metadata keys only serve as type hints for
    /// the property of the same name.
    pub fn parse(client: &RepositoryClient<T>, path: &str, payload: &Map<String, Value>) -> Self {
        let mut properties = Properties::new();
        let mut children = Children::new();

        for (key, value) in payload {
            if key.starts_with(METADATA_PREFIX) {
                continue;
            }

            match value {
                Value::Object(child) => {
                    let child_path = resolve(path, key, 0);
                    let node = if child.contains_key(PRIMARY_TYPE) {
                        ResourceNode::from_payload(client.clone(), child_path, child)
                    } else {
                        ResourceNode::placeholder(client.clone(), child_path)
                    };
                    children.insert(key.clone(), node);
                }
                value => {
                    let hint = payload
                        .get(&format!("{METADATA_PREFIX}{key}"))
                        .and_then(Value::as_str);
                    if let Some(property) = PropertyValue::from_json(value, hint) {
                        properties.insert(key.clone(), property);
                    }
                }
            }
        }

        Self {
            properties: Rc::new(properties),
            children: Rc::new(children),
        }
    }
}
