use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use duka_core::TenantId;

/// A slice of a tenant's records, in key order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<V> {
    pub items: Vec<V>,
    /// Offset of the following page, `None` on the last one.
    pub next_offset: Option<usize>,
}

/// Tenant-isolated key/value store abstraction for disposable read models.
///
/// `list` returns records in key order. Ledger ids are time-ordered, so for
/// id-keyed models that is creation order.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Clear all read-model records for a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);

    fn page(&self, tenant_id: TenantId, request: PageRequest) -> Page<V> {
        let all = self.list(tenant_id);
        let limit = request.limit.max(1);
        let end = request.offset.saturating_add(limit).min(all.len());
        let next_offset = (end < all.len()).then_some(end);
        let items = all.into_iter().skip(request.offset).take(limit).collect();
        Page { items, next_offset }
    }
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// In-memory tenant-isolated store for tests/dev.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    inner: RwLock<BTreeMap<TenantId, BTreeMap<K, V>>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Ord + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let map = self.inner.read().ok()?;
        map.get(&tenant_id)?.get(key).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut map) = self.inner.write() {
            map.entry(tenant_id).or_default().insert(key, value);
        }
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let map = match self.inner.read() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        map.get(&tenant_id)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut map) = self.inner.write() {
            map.remove(&tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenants_do_not_see_each_other() {
        let store = InMemoryTenantStore::<u32, &str>::new();
        let a = TenantId::new();
        let b = TenantId::new();
        store.upsert(a, 1, "a1");
        store.upsert(b, 1, "b1");

        assert_eq!(store.get(a, &1), Some("a1"));
        assert_eq!(store.list(b), vec!["b1"]);

        store.clear_tenant(a);
        assert!(store.list(a).is_empty());
        assert_eq!(store.get(b, &1), Some("b1"));
    }

    #[test]
    fn pages_follow_key_order() {
        let store = InMemoryTenantStore::<u32, u32>::new();
        let t = TenantId::new();
        for k in [5, 1, 4, 2, 3] {
            store.upsert(t, k, k * 10);
        }

        let first = store.page(t, PageRequest { offset: 0, limit: 2 });
        assert_eq!(first.items, vec![10, 20]);
        assert_eq!(first.next_offset, Some(2));

        let last = store.page(t, PageRequest { offset: 4, limit: 2 });
        assert_eq!(last.items, vec![50]);
        assert_eq!(last.next_offset, None);

        let past_end = store.page(t, PageRequest { offset: 9, limit: 2 });
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.next_offset, None);
    }
}
