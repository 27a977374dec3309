//! Guest Cart Store
//!
//! The anonymous shopper's cart, persisted as a JSON array under a single storage key. Nothing
//! in here returns an error: storage failures are logged and degrade to an empty cart or a
//! no-op, and a corrupt entry is skipped without spoiling the rest of the payload.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    bundles::BundleOption,
    items::{LineItem, LineItemUuid, normalize_add_quantity, normalize_update_quantity},
    products::{ProductLookup, ProductSnapshot, ProductUuid},
    storage::LocalStorage,
};

/// Guest cart persisted in local storage.
pub struct GuestCartStore {
    storage: Arc<dyn LocalStorage>,
    key: String,

    /// Serialises read-modify-write cycles against the storage key.
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for GuestCartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestCartStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl GuestCartStore {
    /// Create a store persisting under `key`.
    pub fn new(storage: Arc<dyn LocalStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage key the cart lives under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current guest cart; missing or unreadable storage yields an empty cart.
    pub fn list(&self) -> Vec<LineItem> {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(error) => {
                warn!(key = %self.key, %error, "guest cart unreadable, treating as empty");
                return Vec::new();
            }
        };

        parse_items(&self.key, &raw)
    }

    /// Add units of a product, incrementing the existing line for the same product and tier.
    pub fn add(
        &self,
        product: ProductUuid,
        quantity: i64,
        bundle: Option<BundleOption>,
    ) -> LineItem {
        let quantity = normalize_add_quantity(quantity);
        let kind = bundle.as_ref().map(BundleOption::kind);

        let _lock = self.lock();
        let mut items = self.list();

        let existing = items.iter_mut().find(|item| item.matches(product, kind));

        let item = if let Some(existing) = existing {
            existing.quantity = existing.quantity.saturating_add(quantity);
            existing.touch();
            existing.clone()
        } else {
            let item = LineItem::new(product, quantity, bundle);
            items.push(item.clone());
            item
        };

        self.persist(&items);

        debug!(
            line_uuid = %item.uuid,
            product_uuid = %product,
            quantity = item.quantity,
            "guest cart add"
        );

        item
    }

    /// Set a line's quantity; a quantity of zero or less removes the line and returns `None`.
    pub fn update_quantity(&self, line: LineItemUuid, quantity: i64) -> Option<LineItem> {
        let _lock = self.lock();
        let mut items = self.list();

        let Some(quantity) = normalize_update_quantity(quantity) else {
            items.retain(|item| item.uuid != line);
            self.persist(&items);

            return None;
        };

        let item = items.iter_mut().find(|item| item.uuid == line).map(|item| {
            item.quantity = quantity;
            item.touch();
            item.clone()
        });

        if item.is_some() {
            self.persist(&items);
        }

        item
    }

    /// Remove a line; removing an unknown line is a no-op.
    pub fn remove(&self, line: LineItemUuid) {
        let _lock = self.lock();
        let mut items = self.list();
        let before = items.len();

        items.retain(|item| item.uuid != line);

        if items.len() != before {
            self.persist(&items);
        }
    }

    /// Empty the guest cart.
    pub fn clear(&self) {
        let _lock = self.lock();

        if let Err(error) = self.storage.remove(&self.key) {
            warn!(key = %self.key, %error, "failed to clear guest cart");
        }
    }

    /// Attach product snapshots to lines lacking fresh product data.
    ///
    /// Products that no longer resolve get a placeholder snapshot so the line stays visible and
    /// removable. Lookup failures leave the line as it was.
    pub async fn hydrate(&self, lookup: &dyn ProductLookup) -> Vec<LineItem> {
        let pending: Vec<ProductUuid> = {
            let mut products: Vec<ProductUuid> = self
                .list()
                .iter()
                .filter(|item| item.needs_hydration())
                .map(|item| item.product)
                .collect();

            products.sort_unstable();
            products.dedup();
            products
        };

        if pending.is_empty() {
            return self.list();
        }

        let mut snapshots: FxHashMap<ProductUuid, ProductSnapshot> = FxHashMap::default();

        for product in pending {
            match lookup.get_product(product).await {
                Ok(Some(found)) => {
                    snapshots.insert(product, found.snapshot());
                }
                Ok(None) => {
                    warn!(product_uuid = %product, "guest cart product no longer resolves");
                    snapshots.insert(product, ProductSnapshot::placeholder());
                }
                Err(error) => {
                    warn!(product_uuid = %product, %error, "guest cart product lookup failed");
                }
            }
        }

        // Re-read after the lookups: the cart may have changed while they were in flight.
        let _lock = self.lock();
        let mut items = self.list();
        let mut changed = false;

        for item in items.iter_mut().filter(|item| item.needs_hydration()) {
            if let Some(snapshot) = snapshots.get(&item.product)
                && item.cached_product.as_ref() != Some(snapshot)
            {
                item.cached_product = Some(snapshot.clone());
                changed = true;
            }
        }

        if changed {
            self.persist(&items);
        }

        items
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, items: &[LineItem]) {
        let serialized = match serde_json::to_string(items) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(key = %self.key, %error, "failed to serialise guest cart");
                return;
            }
        };

        if let Err(error) = self.storage.write(&self.key, &serialized) {
            warn!(key = %self.key, %error, "failed to persist guest cart");
        }
    }
}

/// Parse a stored payload, skipping entries that are malformed or carry a zero quantity.
fn parse_items(key: &str, raw: &str) -> Vec<LineItem> {
    let entries = match serde_json::from_str::<Vec<Value>>(raw) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(key, %error, "guest cart payload is corrupt, treating as empty");
            return Vec::new();
        }
    };

    let mut items: Vec<LineItem> = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<LineItem>(entry) {
            Ok(item) if item.quantity == 0 => {
                warn!(key, index, "skipping guest cart entry with zero quantity");
            }
            Ok(item) if items.iter().any(|existing| existing.uuid == item.uuid) => {
                warn!(key, index, line_uuid = %item.uuid, "skipping duplicate guest cart entry");
            }
            Ok(item) => items.push(item),
            Err(error) => {
                warn!(key, index, %error, "skipping corrupt guest cart entry");
            }
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::{
        bundles::BundleKind,
        products::{LookupError, MockProductLookup, Product},
        storage::{MemoryStorage, StorageError},
    };

    const KEY: &str = "storefront.cart";

    fn store() -> (Arc<MemoryStorage>, GuestCartStore) {
        let storage = Arc::new(MemoryStorage::new());
        let store = GuestCartStore::new(storage.clone(), KEY);

        (storage, store)
    }

    #[test]
    fn empty_storage_lists_nothing() {
        let (_, store) = store();

        assert!(store.list().is_empty());
    }

    #[test]
    fn adding_same_product_and_tier_increments() {
        let (_, store) = store();
        let product = ProductUuid::new();

        let first = store.add(product, 1, Some(BundleOption::Single));
        let second = store.add(product, 1, Some(BundleOption::Single));

        let items = store.list();

        assert_eq!(items.len(), 1);
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(items.first().map(|item| item.quantity), Some(2));
    }

    #[test]
    fn different_tiers_get_separate_lines() {
        let (_, store) = store();
        let product = ProductUuid::new();

        store.add(product, 1, Some(BundleOption::Single));
        store.add(product, 2, Some(BundleOption::Double { discount: 5_00 }));
        store.add(product, 1, None);

        let kinds: Vec<Option<BundleKind>> =
            store.list().iter().map(LineItem::bundle_kind).collect();

        assert_eq!(
            kinds,
            vec![Some(BundleKind::Single), Some(BundleKind::Double), None]
        );
    }

    #[test]
    fn non_positive_add_quantity_counts_as_one() {
        let (_, store) = store();

        let item = store.add(ProductUuid::new(), -3, None);

        assert_eq!(item.quantity, 1);
    }

    #[test]
    fn update_to_zero_removes_the_line() {
        let (_, store) = store();
        let item = store.add(ProductUuid::new(), 3, None);

        let updated = store.update_quantity(item.uuid, 0);

        assert!(updated.is_none());
        assert!(store.list().is_empty());
    }

    #[test]
    fn update_sets_quantity() {
        let (_, store) = store();
        let item = store.add(ProductUuid::new(), 3, None);

        let updated = store.update_quantity(item.uuid, 5);

        assert_eq!(updated.map(|item| item.quantity), Some(5));
        assert_eq!(store.list().first().map(|item| item.quantity), Some(5));
    }

    #[test]
    fn update_unknown_line_returns_none() {
        let (_, store) = store();
        store.add(ProductUuid::new(), 1, None);

        assert!(store.update_quantity(LineItemUuid::new(), 4).is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let (_, store) = store();
        let keep = store.add(ProductUuid::new(), 1, None);
        let gone = store.add(ProductUuid::new(), 1, None);

        store.remove(gone.uuid);
        let once = store.list();

        store.remove(gone.uuid);
        let twice = store.list();

        assert_eq!(once, twice);
        assert_eq!(twice.first().map(|item| item.uuid), Some(keep.uuid));
    }

    #[test]
    fn clear_empties_the_cart() {
        let (_, store) = store();
        store.add(ProductUuid::new(), 1, None);

        store.clear();

        assert!(store.list().is_empty());
    }

    #[test]
    fn corrupt_payload_lists_nothing() -> TestResult {
        let (storage, store) = store();

        storage.write(KEY, "{not json")?;

        assert!(store.list().is_empty());

        Ok(())
    }

    #[test]
    fn corrupt_entries_are_skipped() -> TestResult {
        let (storage, store) = store();
        let good = LineItem::new(ProductUuid::new(), 2, None);
        let zero = LineItem {
            quantity: 0,
            ..LineItem::new(ProductUuid::new(), 1, None)
        };

        let payload = serde_json::to_string(&vec![
            serde_json::to_value(&good)?,
            serde_json::json!({ "uuid": "nope" }),
            serde_json::to_value(&zero)?,
            serde_json::json!(42),
        ])?;

        storage.write(KEY, &payload)?;

        assert_eq!(store.list(), vec![good]);

        Ok(())
    }

    struct FailingStorage;

    impl LocalStorage for FailingStorage {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::InvalidKey("read".to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::InvalidKey("write".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::InvalidKey("remove".to_string()))
        }
    }

    #[test]
    fn failing_storage_degrades_to_no_ops() {
        let store = GuestCartStore::new(Arc::new(FailingStorage), KEY);

        let item = store.add(ProductUuid::new(), 1, None);

        assert_eq!(item.quantity, 1);
        assert!(store.list().is_empty());
        assert!(store.update_quantity(item.uuid, 2).is_none());

        store.remove(item.uuid);
        store.clear();
    }

    #[tokio::test]
    async fn hydrate_attaches_snapshots_and_placeholders() -> TestResult {
        let (_, store) = store();
        let known = ProductUuid::new();
        let missing = ProductUuid::new();

        store.add(known, 1, None);
        store.add(missing, 1, None);

        let mut lookup = MockProductLookup::new();

        lookup.expect_get_product().returning(move |product| {
            if product == known {
                Ok(Some(Product {
                    uuid: known,
                    name: "Serum".to_string(),
                    price: 50_00,
                    image: None,
                }))
            } else {
                Ok(None)
            }
        });

        let items = store.hydrate(&lookup).await;

        let names: Vec<Option<String>> = items
            .iter()
            .map(|item| item.cached_product.as_ref().map(|p| p.name.clone()))
            .collect();

        assert_eq!(
            names,
            vec![
                Some("Serum".to_string()),
                Some(crate::products::UNAVAILABLE_PRODUCT_NAME.to_string())
            ]
        );
        assert_eq!(store.list(), items, "hydrated snapshots should be persisted");

        Ok(())
    }

    #[tokio::test]
    async fn hydrate_survives_lookup_errors() {
        let (_, store) = store();
        let product = ProductUuid::new();

        store.add(product, 1, None);

        let mut lookup = MockProductLookup::new();

        lookup
            .expect_get_product()
            .times(1)
            .returning(|_| Err(LookupError::Unavailable("timeout".to_string())));

        let items = store.hydrate(&lookup).await;

        assert_eq!(items.len(), 1);
        assert!(items.iter().all(|item| item.cached_product.is_none()));
    }
}
