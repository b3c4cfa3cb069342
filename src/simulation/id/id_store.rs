use ahash::{AHashMap, RandomState};
use std::any::TypeId;
use std::sync::Arc;

#[derive(Debug)]
pub(super) struct UntypedId {
    pub(super) internal: u64,
    pub(super) external: String,
}

impl UntypedId {
    pub(super) fn new(internal: u64, external: String) -> Self {
        Self { internal, external }
    }
}

/// Interns external ids per type. Internal ids are handed out consecutively starting at 0 for
/// each type, so that they can be used as indices and hashed with the NoHashHasher.
#[derive(Debug)]
pub(super) struct IdStore {
    ids: AHashMap<TypeId, Vec<Arc<UntypedId>>>,
    // use ahasher algorithm with fixed random state, to get predictable iteration
    mapping: AHashMap<TypeId, AHashMap<String, u64>>,
}

impl IdStore {
    pub(super) fn new() -> Self {
        Self {
            ids: AHashMap::with_hasher(RandomState::with_seed(42)),
            mapping: AHashMap::with_hasher(RandomState::with_seed(42)),
        }
    }

    pub(super) fn create_id(&mut self, type_id: TypeId, external: &str) -> Arc<UntypedId> {
        if let Some(existing) = self.try_get_from_ext(type_id, external) {
            return existing;
        }

        let type_ids = self.ids.entry(type_id).or_default();
        let next = Arc::new(UntypedId::new(
            type_ids.len() as u64,
            String::from(external),
        ));
        type_ids.push(next.clone());

        self.mapping
            .entry(type_id)
            .or_insert_with(|| AHashMap::with_hasher(RandomState::with_seed(42)))
            .insert(String::from(external), next.internal);
        next
    }

    pub(super) fn get(&self, type_id: TypeId, internal: u64) -> Arc<UntypedId> {
        let type_ids = self.ids.get(&type_id).unwrap_or_else(|| {
            panic!("No ids for type {type_id:?}. Use Id::create::<T>(...) to create ids")
        });

        type_ids
            .get(internal as usize)
            .unwrap_or_else(|| panic!("No id found for internal {internal}"))
            .clone()
    }

    pub(super) fn try_get_from_ext(&self, type_id: TypeId, external: &str) -> Option<Arc<UntypedId>> {
        let internal = self.mapping.get(&type_id)?.get(external)?;
        Some(self.get(type_id, *internal))
    }

    pub(super) fn len(&self, type_id: TypeId) -> usize {
        self.ids.get(&type_id).map_or(0, Vec::len)
    }
}
