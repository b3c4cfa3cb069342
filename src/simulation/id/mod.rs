use crate::simulation::id::id_store::{IdStore, UntypedId};
use std::any::TypeId;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

// keep this private, as we don't want to leak how we cache ids.
mod id_store;

/// This type represents a reference counted pointer to an interned id. It can be used in hash
/// maps/sets in combination with NoHashHasher, to achieve fast look ups with no randomness involved.
///
/// Using clone produces a new pointer to the actual id and is the intended way of passing ids
/// around. The pointer is an `Arc`, so ids can be handed to snapshot readers on other threads.
/// Creating and looking up ids goes through a thread local store, which lives on the thread
/// advancing the simulation.
pub struct Id<T> {
    // fn() -> T keeps Id Send + Sync regardless of the marker type
    _type_marker: PhantomData<fn() -> T>,
    id: Arc<UntypedId>,
}

thread_local! {static ID_STORE: RefCell<IdStore> = RefCell::new(IdStore::new())}

impl<T: 'static> Id<T> {
    fn new(untyped_id: Arc<UntypedId>) -> Self {
        Self {
            _type_marker: PhantomData,
            id: untyped_id,
        }
    }

    /// Creates an id which is not attached to any id storage. This method is intended for test
    /// cases. The intended way of creating ids is to use Id::create(external);
    #[cfg(test)]
    pub(crate) fn new_internal(internal: u64) -> Self {
        Self::new(Arc::new(UntypedId::new(internal, String::from(""))))
    }

    pub fn internal(&self) -> u64 {
        self.id.internal
    }

    pub fn external(&self) -> &str {
        &self.id.external
    }

    /// Returns the id for `external`. If it doesn't exist yet, it is created.
    pub fn create(external: &str) -> Self {
        ID_STORE.with(|store| Self::new(store.borrow_mut().create_id(TypeId::of::<T>(), external)))
    }

    pub fn get(internal: u64) -> Self {
        ID_STORE.with(|store| Self::new(store.borrow().get(TypeId::of::<T>(), internal)))
    }

    pub fn get_from_ext(external: &str) -> Self {
        Self::try_get_from_ext(external)
            .unwrap_or_else(|| panic!("Could not find id for external id: {external}"))
    }

    pub fn try_get_from_ext(external: &str) -> Option<Self> {
        ID_STORE.with(|store| {
            store
                .borrow()
                .try_get_from_ext(TypeId::of::<T>(), external)
                .map(Self::new)
        })
    }

    /// Number of ids created for this type on the current thread.
    pub fn count() -> usize {
        ID_STORE.with(|store| store.borrow().len(TypeId::of::<T>()))
    }
}

/// Drops all ids of the thread local store. Ids created afterwards start at internal id 0 again.
/// Ids handed out before keep working, but are no longer found by lookups.
pub fn reset_store() {
    ID_STORE.with(|store| store.replace(IdStore::new()));
}

/// Mark Id as enabled for the nohash_hasher::NoHashHasher
impl<T> nohash_hasher::IsEnabled for Id<T> {}
impl<T> nohash_hasher::IsEnabled for &Id<T> {}

/// Implement PartialEq, Eq, PartialOrd, Ord, so that Ids can be used in HashMaps and Ordered collections
/// all four methods rely on the internal id.
impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id.internal.eq(&other.id.internal)
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // use write u64 directly, so that we can use NoHashHasher with ids
        state.write_u64(self.id.internal);
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.internal.cmp(&other.id.internal)
    }
}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// This creates a new struct with a cloned Arc pointer
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        Self {
            _type_marker: PhantomData,
            id: self.id.clone(),
        }
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({}, {:?})", self.id.internal, self.id.external)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id.external)
    }
}

#[cfg(test)]
mod tests {
    use crate::simulation::id::Id;
    use macros::integration_test;
    use std::sync::Arc;

    use super::UntypedId;

    #[test]
    fn test_id_eq() {
        let id: Id<()> = Id::new(Arc::new(UntypedId::new(1, String::from("external-id"))));
        assert_eq!(id, id.clone());

        let equal = Id::new(Arc::new(UntypedId::new(
            1,
            String::from("other-external-value-which-should-be-ignored"),
        )));
        assert_eq!(id, equal);

        let unequal = Id::new(Arc::new(UntypedId::new(2, String::from("external-id"))));
        assert_ne!(id, unequal)
    }

    #[integration_test]
    fn create_id() {
        let external = String::from("external-id");

        let id: Id<()> = Id::create(&external);
        assert_eq!(external, id.external());
        assert_eq!(0, id.internal());
    }

    #[integration_test]
    fn create_id_duplicate() {
        let id: Id<()> = Id::create("external-id");
        let duplicate: Id<()> = Id::create("external-id");

        assert_eq!(id, duplicate);
        assert_eq!(1, Id::<()>::count());
    }

    #[integration_test]
    fn create_id_multiple_types() {
        let int_id: Id<u32> = Id::create("external-id");
        let float_id: Id<f32> = Id::create("external-id");

        assert_eq!(0, int_id.internal());
        assert_eq!(0, float_id.internal());
    }

    #[integration_test]
    fn get_from_internal_and_external() {
        let id_1: Id<()> = Id::create("id-1");
        let id_2: Id<()> = Id::create("id-2");

        assert_eq!("id-1", Id::<()>::get(id_1.internal()).external());
        assert_eq!(id_2, Id::get_from_ext("id-2"));
        assert!(Id::<()>::try_get_from_ext("id-3").is_none());
    }

    #[integration_test]
    fn reset_starts_over() {
        let _: Id<()> = Id::create("a");
        let _: Id<()> = Id::create("b");
        super::reset_store();

        let id: Id<()> = Id::create("b");
        assert_eq!(0, id.internal());
    }
}
