//! Rebuilds a nested accessibility tree from the flat CDP node list.

use resilio_common::AxNode;
use serde_json::Value;
use std::collections::HashMap;

const MAX_DEPTH: usize = 64;

/// Build the tree rooted at the first node. Ignored nodes are dropped and
/// their children promoted; `generic`/`none` wrappers without a name are
/// flattened the same way.
pub(crate) fn tree_from_cdp(nodes: &[Value]) -> Option<AxNode> {
    let root = nodes.first()?;
    let by_id: HashMap<&str, &Value> = nodes
        .iter()
        .filter_map(|n| n.get("nodeId").and_then(Value::as_str).map(|id| (id, n)))
        .collect();

    let mut children = Vec::new();
    collect_children(root, &by_id, 0, &mut children);
    Some(AxNode {
        role: text(root, "role").unwrap_or_default(),
        name: text(root, "name").unwrap_or_default(),
        value: text(root, "value").filter(|v| !v.is_empty()),
        children,
    })
}

fn collect_children(
    node: &Value,
    by_id: &HashMap<&str, &Value>,
    depth: usize,
    out: &mut Vec<AxNode>,
) {
    if depth >= MAX_DEPTH {
        return;
    }
    let Some(ids) = node.get("childIds").and_then(Value::as_array) else {
        return;
    };
    for child in ids
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|id| by_id.get(id).copied())
    {
        let role = text(child, "role").unwrap_or_default();
        let name = text(child, "name").unwrap_or_default();
        let ignored = child.get("ignored").and_then(Value::as_bool).unwrap_or(false);
        let transparent = ignored || (name.is_empty() && matches!(role.as_str(), "generic" | "none" | ""));

        if transparent {
            collect_children(child, by_id, depth + 1, out);
            continue;
        }

        let mut grandchildren = Vec::new();
        collect_children(child, by_id, depth + 1, &mut grandchildren);
        out.push(AxNode {
            role,
            name,
            value: text(child, "value").filter(|v| !v.is_empty()),
            children: grandchildren,
        });
    }
}

/// `node[field].value` rendered as text.
fn text(node: &Value, field: &str) -> Option<String> {
    match node.get(field)?.get("value")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
