//! Per-type property maps and the process-wide registry that caches them.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use tracing::{debug, warn};

use super::binding::{Binding, DataBound};

/// Upper-cased result field name to binding, for one target type.
#[derive(Debug)]
pub struct PropertyMap<T> {
    entries: HashMap<String, Binding<T>>,
}

impl<T: DataBound> PropertyMap<T> {
    /// Build a fresh map from `T::bindings()`.
    ///
    /// Field names are upper-cased. When two bindings share a name the last
    /// declaration wins.
    pub fn build() -> Self {
        let bindings = T::bindings();
        let mut entries = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            let key = binding.field_name().to_uppercase();
            if let Some(previous) = entries.insert(key, binding) {
                warn!(
                    target_type = type_name::<T>(),
                    field = binding.field_name(),
                    replaced = previous.property(),
                    property = binding.property(),
                    "duplicate data binding; last declaration wins"
                );
            }
        }
        Self { entries }
    }

    /// Shared map for `T`, built on first use and cached for the process.
    pub fn shared() -> Arc<Self> {
        let registry = registry();
        let key = TypeId::of::<T>();

        {
            let guard = registry.read().unwrap_or_else(|e| e.into_inner());
            if let Some(map) = guard.get(&key).and_then(downcast::<T>) {
                return map;
            }
        }

        let mut guard = registry.write().unwrap_or_else(|e| e.into_inner());
        if let Some(map) = guard.get(&key).and_then(downcast::<T>) {
            return map;
        }
        let map = Arc::new(Self::build());
        debug!(
            target_type = type_name::<T>(),
            bindings = map.len(),
            "registered property map"
        );
        guard.insert(key, map.clone());
        map
    }
}

impl<T> PropertyMap<T> {
    /// Look up a binding by normalized field name.
    pub fn get(&self, field: &str) -> Option<&Binding<T>> {
        self.entries.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.entries.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalized field names.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

type Registry = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn downcast<T: DataBound>(entry: &Arc<dyn Any + Send + Sync>) -> Option<Arc<PropertyMap<T>>> {
    entry.clone().downcast::<PropertyMap<T>>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Customer {
        primary: String,
        secondary: String,
    }

    crate::data_bindings!(Customer {
        primary => "Email",
        secondary => "email",
    });

    #[derive(Debug, Default)]
    struct Unbound;

    crate::data_bindings!(Unbound {});

    #[test]
    fn test_duplicate_field_last_declaration_wins() {
        let map = PropertyMap::<Customer>::build();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("EMAIL").map(|b| b.property()), Some("secondary"));
        assert!(map.get("email").is_none());
    }

    #[test]
    fn test_type_without_bindings_has_empty_map() {
        assert!(PropertyMap::<Unbound>::build().is_empty());
    }

    #[test]
    fn test_shared_map_is_cached() {
        let first = PropertyMap::<Customer>::shared();
        let second = PropertyMap::<Customer>::shared();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.contains("EMAIL"));
    }
}
