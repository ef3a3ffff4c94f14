//! Structural visitor
//!
//! Depth-first walk over single, collection and map fields. Owner fields
//! are back-references and are never followed. Order is deterministic:
//! fields in declaration order (root ancestor type first), then list order
//! or map insertion order.
//!
//! A node's children are read after its callback returns, so children the
//! callback creates are visited in the same walk.

use arbor_model::{Breadcrumb, FieldKind, ObjectId, ObjectRef, Value};
use std::collections::HashSet;
use tracing::trace;

/// One visited node
#[derive(Debug)]
pub struct Visit<'a> {
    /// Breadcrumb path of the node
    pub path: &'a Breadcrumb,

    /// The node
    pub node: &'a ObjectRef,

    /// Field of the container holding the node; `None` for the root
    pub field: Option<&'a str>,

    /// Containment chain from the root down to the immediate container
    pub ancestors: &'a [ObjectRef],
}

impl Visit<'_> {
    /// Immediate container
    #[inline]
    #[must_use]
    pub fn container(&self) -> Option<&ObjectRef> {
        self.ancestors.last()
    }

    /// Nearest ancestor of type `type_name` (or a subtype)
    #[must_use]
    pub fn nearest_ancestor(&self, type_name: &str) -> Option<&ObjectRef> {
        self.ancestors.iter().rev().find(|a| a.is_a(type_name))
    }
}

/// Direct structural child of a node
#[derive(Debug, Clone)]
pub struct Child {
    /// Breadcrumb path of the child
    pub path: Breadcrumb,

    /// Holding field
    pub field: String,

    /// The child
    pub node: ObjectRef,
}

/// Structural children of `node`, given its own path
#[must_use]
pub fn children(node: &ObjectRef, path: &Breadcrumb) -> Vec<Child> {
    let mut out = Vec::new();
    for field in node.schema().fields() {
        let name = field.name();
        match (field.kind(), node.get_attribute(name)) {
            (FieldKind::Single, Value::Object(child)) => out.push(Child {
                path: path.field(name),
                field: name.to_string(),
                node: child,
            }),
            (FieldKind::Collection, Value::List(items)) => {
                for (position, item) in items.iter().enumerate() {
                    if let Value::Object(child) = item {
                        let child_path = match child.key_if_any() {
                            Some(key) => path.keyed(name, key),
                            None => path.indexed(name, position),
                        };
                        out.push(Child {
                            path: child_path,
                            field: name.to_string(),
                            node: child.clone(),
                        });
                    }
                }
            }
            (FieldKind::Map, Value::Map(entries)) => {
                for (key, value) in &entries {
                    if let Value::Object(child) = value {
                        out.push(Child {
                            path: path.keyed(name, key.as_str()),
                            field: name.to_string(),
                            node: child.clone(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// Visit every node reachable from `root`, root first
///
/// Each node's breadcrumb is refreshed before its callback runs.
///
/// # Errors
/// The first error returned by `callback`; the walk stops there.
pub fn visit<F, E>(root: &ObjectRef, mut callback: F) -> Result<(), E>
where
    F: FnMut(&Visit<'_>) -> Result<(), E>,
{
    let mut ancestors = Vec::new();
    walk(root, Breadcrumb::root(), None, &mut ancestors, &mut callback)
}

/// Visit the nodes reachable from `root` that are not yet in `seen`
///
/// Already-seen nodes are still descended into. Returns how many nodes
/// were visited.
///
/// # Errors
/// The first error returned by `callback`.
pub fn visit_unseen<F, E>(
    root: &ObjectRef,
    seen: &mut HashSet<ObjectId>,
    mut callback: F,
) -> Result<usize, E>
where
    F: FnMut(&Visit<'_>) -> Result<(), E>,
{
    let mut visited = 0;
    let mut ancestors = Vec::new();
    walk(root, Breadcrumb::root(), None, &mut ancestors, &mut |v| {
        if seen.insert(v.node.id()) {
            visited += 1;
            callback(v)?;
        }
        Ok(())
    })?;
    Ok(visited)
}

/// Every node reachable from `root`, in visiting order
#[must_use]
pub fn collect(root: &ObjectRef) -> Vec<ObjectRef> {
    let mut nodes = Vec::new();
    let _ = visit::<_, std::convert::Infallible>(root, |v| {
        nodes.push(v.node.clone());
        Ok(())
    });
    nodes
}

fn walk<F, E>(
    node: &ObjectRef,
    path: Breadcrumb,
    field: Option<&str>,
    ancestors: &mut Vec<ObjectRef>,
    callback: &mut F,
) -> Result<(), E>
where
    F: FnMut(&Visit<'_>) -> Result<(), E>,
{
    node.set_breadcrumb(path.clone());
    trace!(path = %path.label(), node = ?node, "visiting");

    callback(&Visit {
        path: &path,
        node,
        field,
        ancestors,
    })?;

    let kids = children(node, &path);
    ancestors.push(node.clone());
    for child in kids {
        walk(&child.node, child.path, Some(&child.field), ancestors, callback)?;
    }
    ancestors.pop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::{ElementType, FieldDescriptor, SchemaRegistry, TypeDescriptor};
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .with_type(
                TypeDescriptor::new("Root")
                    .field(FieldDescriptor::single("db", ElementType::Model("Leaf".into())))
                    .field(FieldDescriptor::collection("rules", ElementType::Model("Leaf".into())))
                    .field(FieldDescriptor::map("named", ElementType::Model("Named".into()))),
            )
            .with_type(
                TypeDescriptor::new("Leaf")
                    .field(FieldDescriptor::owner("root", "Root"))
                    .field(FieldDescriptor::single("inner", ElementType::Model("Leaf".into()))),
            )
            .with_type(TypeDescriptor::new("Named").field(FieldDescriptor::key("id")))
            .build()
            .unwrap()
    }

    fn make(reg: &SchemaRegistry, name: &str, key: Option<&str>) -> ObjectRef {
        ObjectRef::new(reg.get(name).unwrap(), key.map(str::to_string)).unwrap()
    }

    fn tree(reg: &SchemaRegistry) -> ObjectRef {
        let root = make(reg, "Root", None);
        let db = make(reg, "Leaf", None);
        db.set_attribute("inner", make(reg, "Leaf", None)).unwrap();
        db.set_attribute("root", root.clone()).unwrap();
        root.set_attribute("db", db).unwrap();
        root.add_element("rules", make(reg, "Leaf", None)).unwrap();
        root.add_element("rules", make(reg, "Leaf", None)).unwrap();
        root.put_keyed("named", make(reg, "Named", Some("b"))).unwrap();
        root.put_keyed("named", make(reg, "Named", Some("a"))).unwrap();
        root
    }

    #[test]
    fn paths_in_declaration_then_insertion_order() {
        let reg = registry();
        let root = tree(&reg);
        let mut paths = Vec::new();
        visit::<_, ()>(&root, |v| {
            paths.push(v.path.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(
            paths,
            vec!["", "/db", "/db/inner", "/rules[0]", "/rules[1]", "/named[b]", "/named[a]"]
        );
    }

    #[test]
    fn owner_edges_are_not_followed() {
        let reg = registry();
        let root = tree(&reg);
        // db points back at root through its owner field
        assert_eq!(collect(&root).len(), 7);
    }

    #[test]
    fn ancestors_and_breadcrumbs() {
        let reg = registry();
        let root = tree(&reg);
        visit::<_, ()>(&root, |v| {
            if v.path.to_string() == "/db/inner" {
                assert_eq!(v.ancestors.len(), 2);
                assert!(v.nearest_ancestor("Root").unwrap().ptr_eq(&root));
                assert_eq!(v.field, Some("inner"));
            }
            Ok(())
        })
        .unwrap();
        let db = root.get_attribute("db");
        assert_eq!(db.as_object().unwrap().breadcrumb().to_string(), "/db");
    }

    #[test]
    fn children_created_in_callback_are_visited() {
        let reg = registry();
        let root = make(&reg, "Root", None);
        let leaf_type = reg.get("Leaf").unwrap();
        let mut count = 0;
        visit::<_, arbor_model::ModelError>(&root, |v| {
            count += 1;
            if v.node.is_a("Root") {
                v.node
                    .set_attribute("db", ObjectRef::new(leaf_type.clone(), None)?)?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn unseen_only() {
        let reg = registry();
        let root = tree(&reg);
        let mut seen = HashSet::new();
        let first = visit_unseen::<_, ()>(&root, &mut seen, |_| Ok(())).unwrap();
        assert_eq!(first, 7);
        root.add_element("rules", make(&reg, "Leaf", None)).unwrap();
        let second = visit_unseen::<_, ()>(&root, &mut seen, |_| Ok(())).unwrap();
        assert_eq!(second, 1);
    }

    #[test]
    fn callback_error_stops_walk() {
        let reg = registry();
        let root = tree(&reg);
        let mut count = 0;
        let result = visit(&root, |_| {
            count += 1;
            if count == 3 {
                Err("stop")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(count, 3);
    }
}
