//! Template manager
//!
//! Thread-scoped stacks of active templates, one stack per type name.
//! Activation returns a [`TemplateGuard`]; dropping the guard restores the
//! enclosing state, on unwinding too. Nesting is strictly LIFO.

use crate::copy::copy_into;
use crate::error::MergeError;
use arbor_model::{ObjectRef, TemplateSnapshot};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

thread_local! {
    static ACTIVE: RefCell<BTreeMap<String, Vec<Option<ObjectRef>>>> =
        const { RefCell::new(BTreeMap::new()) };
}

/// Restores the template state that preceded an activation
///
/// Bound to the thread that created it.
#[must_use = "templates are deactivated when the guard is dropped"]
#[derive(Debug)]
pub struct TemplateGuard {
    // (type name, stack depth before the push)
    entries: Vec<(String, usize)>,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for TemplateGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            for (type_name, depth) in self.entries.drain(..).rev() {
                if let Some(stack) = active.get_mut(&type_name) {
                    stack.truncate(depth);
                    if stack.is_empty() {
                        active.remove(&type_name);
                    }
                }
            }
        });
    }
}

/// Entry point for template activation on the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct Templates;

impl Templates {
    /// Activate `template` for `type_name`; `None` masks any outer template
    ///
    /// # Errors
    /// See [`activate_all`](Self::activate_all).
    pub fn activate(
        type_name: &str,
        template: Option<ObjectRef>,
    ) -> Result<TemplateGuard, MergeError> {
        Self::activate_all([(type_name.to_string(), template)])
    }

    /// Activate several templates as one scope
    ///
    /// Either every mapping is installed or none is.
    ///
    /// # Errors
    /// - [`MergeError::NotATemplate`] for regular instances
    /// - [`MergeError::TemplateType`] if a template's type is unrelated to
    ///   the type it is activated for
    pub fn activate_all<I>(mappings: I) -> Result<TemplateGuard, MergeError>
    where
        I: IntoIterator<Item = (String, Option<ObjectRef>)>,
    {
        let mappings: Vec<_> = mappings.into_iter().collect();
        for (type_name, template) in &mappings {
            if let Some(template) = template {
                check_template(type_name, template)?;
            }
        }

        let entries: Vec<(String, usize)> = ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            mappings
                .into_iter()
                .map(|(type_name, template)| {
                    let stack = active.entry(type_name.clone()).or_default();
                    let depth = stack.len();
                    stack.push(template);
                    (type_name, depth)
                })
                .collect()
        });

        Ok(TemplateGuard {
            entries,
            _thread_bound: PhantomData,
        })
    }

    /// Run `body` with `template` active for `type_name`
    ///
    /// # Errors
    /// See [`activate_all`](Self::activate_all).
    pub fn with_template<R>(
        type_name: &str,
        template: &ObjectRef,
        body: impl FnOnce() -> R,
    ) -> Result<R, MergeError> {
        let _guard = Self::activate(type_name, Some(template.clone()))?;
        Ok(body())
    }

    /// Run `body` with several templates active as one scope
    ///
    /// # Errors
    /// See [`activate_all`](Self::activate_all).
    pub fn with_templates<'a, I, R>(mappings: I, body: impl FnOnce() -> R) -> Result<R, MergeError>
    where
        I: IntoIterator<Item = (&'a str, &'a ObjectRef)>,
    {
        let _guard = Self::activate_all(
            mappings
                .into_iter()
                .map(|(type_name, template)| (type_name.to_string(), Some(template.clone()))),
        )?;
        Ok(body())
    }

    /// Innermost active template for `type_name`
    #[must_use]
    pub fn active(type_name: &str) -> Option<ObjectRef> {
        ACTIVE.with(|active| {
            active
                .borrow()
                .get(type_name)
                .and_then(|stack| stack.last().cloned().flatten())
        })
    }

    /// Every template currently active on this thread, by type name
    #[must_use]
    pub fn snapshot() -> TemplateSnapshot {
        ACTIVE.with(|active| {
            active
                .borrow()
                .iter()
                .filter_map(|(type_name, stack)| {
                    stack
                        .last()
                        .cloned()
                        .flatten()
                        .map(|template| (type_name.clone(), template))
                })
                .collect()
        })
    }

    /// Run `body` with exactly the templates captured by `obj` active
    ///
    /// Templates active on the thread for other types are masked for the
    /// duration of `body`.
    pub fn with_snapshot<R>(obj: &ObjectRef, body: impl FnOnce() -> R) -> R {
        let captured = obj.captured_templates();
        let entries = ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            let masked: Vec<(String, Option<ObjectRef>)> = active
                .keys()
                .filter(|type_name| !captured.iter().any(|(t, _)| t == *type_name))
                .map(|type_name| (type_name.clone(), None))
                .collect();
            masked
                .into_iter()
                .chain(captured.into_iter().map(|(t, template)| (t, Some(template))))
                .map(|(type_name, template)| {
                    let stack = active.entry(type_name.clone()).or_default();
                    let depth = stack.len();
                    stack.push(template);
                    (type_name, depth)
                })
                .collect()
        });
        let guard = TemplateGuard {
            entries,
            _thread_bound: PhantomData,
        };
        let result = body();
        drop(guard);
        result
    }
}

fn check_template(type_name: &str, template: &ObjectRef) -> Result<(), MergeError> {
    if !template.is_template() {
        return Err(MergeError::NotATemplate {
            type_name: template.type_name().to_string(),
        });
    }
    if !template.is_a(type_name) {
        return Err(MergeError::TemplateType {
            expected: type_name.to_string(),
            actual: template.type_name().to_string(),
        });
    }
    Ok(())
}

/// Copy matching templates from `snapshot` into a freshly created object
///
/// Templates are applied from the root ancestor type down to the exact
/// type, so the most specific template is applied last. Returns the number
/// of templates applied.
///
/// # Errors
/// Any [`MergeError`] raised by [`copy_into`].
pub fn seed_from_templates(obj: &ObjectRef, snapshot: &TemplateSnapshot) -> Result<usize, MergeError> {
    let mut applied = 0;
    for level in obj.schema().hierarchy() {
        let found = snapshot
            .iter()
            .find(|(type_name, _)| *type_name == level.name);
        if let Some((_, template)) = found {
            copy_into(obj, template)?;
            applied += 1;
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::{ElementType, FieldDescriptor, SchemaRegistry, TypeDescriptor, Value};
    use pretty_assertions::assert_eq;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .with_type(
                TypeDescriptor::new("Base")
                    .field(FieldDescriptor::single("name", ElementType::Str))
                    .field(FieldDescriptor::single("port", ElementType::Int)),
            )
            .with_type(TypeDescriptor::new("Sub").extends("Base"))
            .with_type(TypeDescriptor::new("Other"))
            .build()
            .unwrap()
    }

    fn template(registry: &SchemaRegistry, type_name: &str) -> ObjectRef {
        ObjectRef::new_template(registry.get(type_name).unwrap())
    }

    #[test]
    fn nested_activation_restores_outer() {
        let reg = registry();
        let t1 = template(&reg, "Base");
        let t2 = template(&reg, "Base");

        Templates::with_template("Base", &t1, || {
            Templates::with_template("Base", &t2, || {
                assert!(Templates::active("Base").unwrap().ptr_eq(&t2));
            })
            .unwrap();
            assert!(Templates::active("Base").unwrap().ptr_eq(&t1));
        })
        .unwrap();
        assert!(Templates::active("Base").is_none());
    }

    #[test]
    fn restores_on_panic() {
        let reg = registry();
        let t1 = template(&reg, "Base");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Templates::with_template("Base", &t1, || panic!("boom")).unwrap();
        }));
        assert!(result.is_err());
        assert!(Templates::active("Base").is_none());
    }

    #[test]
    fn none_masks_outer_template() {
        let reg = registry();
        let t1 = template(&reg, "Base");
        let _outer = Templates::activate("Base", Some(t1.clone())).unwrap();
        {
            let _inner = Templates::activate("Base", None).unwrap();
            assert!(Templates::active("Base").is_none());
        }
        assert!(Templates::active("Base").unwrap().ptr_eq(&t1));
    }

    #[test]
    fn activate_all_is_atomic() {
        let reg = registry();
        let base = template(&reg, "Base");
        let other = template(&reg, "Other");
        let result = Templates::activate_all([
            ("Base".to_string(), Some(base)),
            ("Base".to_string(), Some(other)),
        ]);
        assert!(matches!(result, Err(MergeError::TemplateType { .. })));
        assert!(Templates::active("Base").is_none());
    }

    #[test]
    fn rejects_regular_instances() {
        let reg = registry();
        let plain = ObjectRef::new(reg.get("Base").unwrap(), None).unwrap();
        assert!(matches!(
            Templates::activate("Base", Some(plain)),
            Err(MergeError::NotATemplate { .. })
        ));
    }

    #[test]
    fn state_is_per_thread() {
        let reg = registry();
        let t1 = template(&reg, "Base");
        let _guard = Templates::activate("Base", Some(t1)).unwrap();
        let seen = std::thread::spawn(|| Templates::active("Base").is_some())
            .join()
            .unwrap();
        assert!(!seen);
    }

    #[test]
    fn seeds_most_specific_last() {
        let reg = registry();
        let base = template(&reg, "Base");
        base.set_attribute("name", "base").unwrap();
        base.set_attribute("port", 80).unwrap();
        let sub = template(&reg, "Sub");
        sub.set_attribute("name", "sub").unwrap();

        let obj = ObjectRef::new(reg.get("Sub").unwrap(), None).unwrap();
        let snapshot = vec![("Base".to_string(), base), ("Sub".to_string(), sub)];
        assert_eq!(seed_from_templates(&obj, &snapshot).unwrap(), 2);
        assert_eq!(obj.get_attribute("name"), Value::from("sub"));
        assert_eq!(obj.get_attribute("port"), Value::from(80));
    }

    #[test]
    fn with_snapshot_reactivates_captured() {
        let reg = registry();
        let base = template(&reg, "Base");
        let obj = ObjectRef::new(reg.get("Base").unwrap(), None).unwrap();
        obj.capture_templates(vec![("Base".to_string(), base.clone())]);

        let inside = Templates::with_snapshot(&obj, || Templates::active("Base"));
        assert!(inside.unwrap().ptr_eq(&base));
        assert!(Templates::active("Base").is_none());
    }

    #[test]
    fn with_snapshot_masks_templates_not_captured() {
        let reg = registry();
        let late = template(&reg, "Other");
        let outer = template(&reg, "Base");
        let obj = ObjectRef::new(reg.get("Base").unwrap(), None).unwrap();

        let _guard = Templates::activate_all([
            ("Other".to_string(), Some(late.clone())),
            ("Base".to_string(), Some(outer.clone())),
        ])
        .unwrap();
        let (other, base) = Templates::with_snapshot(&obj, || {
            (Templates::active("Other"), Templates::active("Base"))
        });
        assert!(other.is_none());
        assert!(base.is_none());
        assert!(Templates::snapshot().len() == 2);
        assert!(Templates::active("Other").unwrap().ptr_eq(&late));
    }
}
