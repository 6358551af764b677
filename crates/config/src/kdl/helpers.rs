//! Accessors for KDL nodes.
//!
//! Fields are child nodes carrying a single positional argument:
//!
//! ```kdl
//! budget {
//!     points 100
//! }
//! ```

use ::kdl::{KdlNode, KdlValue};

/// First positional argument of a node.
pub fn get_first_arg(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

/// Value of the child node `name`.
pub fn get_entry<'a>(node: &'a KdlNode, name: &str) -> Option<&'a KdlValue> {
    node.children()?
        .nodes()
        .iter()
        .find(|child| child.name().value() == name)
        .and_then(get_first_arg)
}

pub fn get_string_entry(node: &KdlNode, name: &str) -> Option<String> {
    get_entry(node, name)
        .and_then(|v| v.as_string())
        .map(str::to_string)
}

pub fn get_int_entry(node: &KdlNode, name: &str) -> Option<i128> {
    get_entry(node, name).and_then(|v| v.as_integer())
}

pub fn get_bool_entry(node: &KdlNode, name: &str) -> Option<bool> {
    get_entry(node, name).and_then(|v| v.as_bool())
}

/// Unsigned value of the child node `name`, rejecting negatives and overflow.
pub fn get_u64_entry(node: &KdlNode, name: &str) -> anyhow::Result<Option<u64>> {
    match get_int_entry(node, name) {
        None => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            anyhow::anyhow!(
                "'{}' in '{}' must be a non-negative integer, got {}",
                name,
                node.name().value(),
                v
            )
        }),
    }
}

/// Like [`get_u64_entry`] for `u32` fields.
pub fn get_u32_entry(node: &KdlNode, name: &str) -> anyhow::Result<Option<u32>> {
    match get_u64_entry(node, name)? {
        None => Ok(None),
        Some(v) => u32::try_from(v).map(Some).map_err(|_| {
            anyhow::anyhow!(
                "'{}' in '{}' is too large: {}",
                name,
                node.name().value(),
                v
            )
        }),
    }
}
