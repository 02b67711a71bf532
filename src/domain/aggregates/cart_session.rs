//! Both carts of one shopper, persisted through a [`KeyValueStore`].

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::domain::aggregates::cart::{CartError, CartKind, PreorderCart, PreorderLine, RegularCart, RegularLine};
use crate::domain::value_objects::{LineId, ProductId};
use crate::ports::KeyValueStore;

pub struct CartSession {
    session_key: String,
    regular: RegularCart,
    preorder: PreorderCart,
    store: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartSession")
            .field("session_key", &self.session_key)
            .field("regular", &self.regular)
            .field("preorder", &self.preorder)
            .finish()
    }
}

fn storage_key(session_key: &str, kind: CartKind) -> String { format!("cart:{session_key}:{kind}") }

impl CartSession {
    /// Restores both carts. Missing or unreadable entries start empty.
    pub fn load(store: Arc<dyn KeyValueStore>, session_key: impl Into<String>) -> Result<Self, CartError> {
        let session_key = session_key.into();
        let regular = restore(store.as_ref(), &storage_key(&session_key, CartKind::Regular))?;
        let preorder = restore(store.as_ref(), &storage_key(&session_key, CartKind::Preorder))?;
        Ok(Self { session_key, regular, preorder, store })
    }

    pub fn session_key(&self) -> &str { &self.session_key }
    pub fn regular(&self) -> &RegularCart { &self.regular }
    pub fn preorder(&self) -> &PreorderCart { &self.preorder }

    pub fn add_regular(&mut self, line: RegularLine) -> Result<(), CartError> {
        if self.preorder.contains_product(&line.product_id) {
            tracing::debug!(product_id = %line.product_id, "refusing regular add: product is in preorder cart");
            return Err(CartError::InOtherCart { product_id: line.product_id, other: CartKind::Preorder });
        }
        self.mutate_regular(|cart| cart.add(line))
    }

    pub fn update_regular(&mut self, key: &LineId, qty: i64) -> Result<(), CartError> {
        self.mutate_regular(|cart| cart.update_quantity(key, qty))
    }

    pub fn remove_regular(&mut self, key: &LineId) -> Result<(), CartError> {
        self.mutate_regular(|cart| cart.remove(key))
    }

    pub fn add_preorder(&mut self, line: PreorderLine) -> Result<(), CartError> {
        if self.regular.contains_product(&line.product_id) {
            tracing::debug!(product_id = %line.product_id, "refusing preorder add: product is in regular cart");
            return Err(CartError::InOtherCart { product_id: line.product_id, other: CartKind::Regular });
        }
        if let Some(held) = self.preorder.campaign_id() {
            if held != &line.campaign_id {
                return Err(CartError::CampaignMismatch { held: held.clone(), offered: line.campaign_id });
            }
        }
        self.mutate_preorder(|cart| cart.add(line))
    }

    pub fn update_preorder(&mut self, product_id: &ProductId, qty: i64) -> Result<(), CartError> {
        self.mutate_preorder(|cart| cart.update_quantity(product_id, qty))
    }

    pub fn remove_preorder(&mut self, product_id: &ProductId) -> Result<(), CartError> {
        self.mutate_preorder(|cart| cart.remove(product_id))
    }

    pub fn clear(&mut self, kind: CartKind) -> Result<(), CartError> {
        match kind {
            CartKind::Regular => self.mutate_regular(|cart| { cart.clear(); Ok(()) }),
            CartKind::Preorder => self.mutate_preorder(|cart| { cart.clear(); Ok(()) }),
        }
    }

    // Mutations run on a copy that only replaces the live cart once it is persisted.
    fn mutate_regular(&mut self, f: impl FnOnce(&mut RegularCart) -> Result<(), CartError>) -> Result<(), CartError> {
        let mut next = self.regular.clone();
        f(&mut next)?;
        persist(self.store.as_ref(), &storage_key(&self.session_key, CartKind::Regular), &next, next.is_empty())?;
        self.regular = next;
        Ok(())
    }

    fn mutate_preorder(&mut self, f: impl FnOnce(&mut PreorderCart) -> Result<(), CartError>) -> Result<(), CartError> {
        let mut next = self.preorder.clone();
        f(&mut next)?;
        persist(self.store.as_ref(), &storage_key(&self.session_key, CartKind::Preorder), &next, next.is_empty())?;
        self.preorder = next;
        Ok(())
    }
}

fn restore<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> Result<T, CartError> {
    match store.get(key)? {
        None => Ok(T::default()),
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(cart) => Ok(cart),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable cart");
                Ok(T::default())
            }
        },
    }
}

/// An empty cart is stored as no entry at all.
fn persist<T: Serialize>(store: &dyn KeyValueStore, key: &str, cart: &T, empty: bool) -> Result<(), CartError> {
    if empty {
        store.remove(key)?;
        return Ok(());
    }
    let raw = serde_json::to_string(cart).map_err(crate::ports::StorageError::from)?;
    store.set(key, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::ProductSnapshot;
    use crate::domain::value_objects::{CampaignId, Channel, Money, Percentage};
    use crate::infrastructure::memory::InMemoryKeyValueStore;
    use crate::ports::StorageError;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn regular(pid: &str) -> RegularLine {
        RegularLine::new(ProductId::new(pid), None, "Cleanser", BTreeMap::new(), Channel::B2c, 1, Money::new(dec!(18)))
    }

    fn preorder(pid: &str, campaign: &str) -> PreorderLine {
        PreorderLine {
            product_id: ProductId::new(pid),
            product: ProductSnapshot { name: "Essence".into(), ..Default::default() },
            campaign_id: CampaignId::new(campaign),
            quantity: 1,
            price_per_item: Money::new(dec!(20)),
            discount_percentage: Percentage::from_whole(10).unwrap(),
            discounted_price: Money::new(dec!(18)),
        }
    }

    #[test]
    fn test_survives_reload() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
        let mut session = CartSession::load(store.clone(), "s1").unwrap();
        session.add_regular(regular("A")).unwrap();
        session.add_preorder(preorder("B", "c1")).unwrap();

        let reloaded = CartSession::load(store, "s1").unwrap();
        assert_eq!(reloaded.regular().item_count(), 1);
        assert_eq!(reloaded.preorder().item_count(), 1);
    }

    #[test]
    fn test_product_in_one_cart_only() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
        let mut session = CartSession::load(store, "s1").unwrap();
        session.add_regular(regular("A")).unwrap();
        let err = session.add_preorder(preorder("A", "c1")).unwrap_err();
        assert!(matches!(err, CartError::InOtherCart { other: CartKind::Regular, .. }));
        assert!(session.preorder().is_empty());
    }

    #[test]
    fn test_campaigns_do_not_mix() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
        let mut session = CartSession::load(store, "s1").unwrap();
        session.add_preorder(preorder("A", "c1")).unwrap();
        assert!(matches!(session.add_preorder(preorder("B", "c2")), Err(CartError::CampaignMismatch { .. })));
    }

    struct FailingStore;
    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> { Ok(None) }
        fn set(&self, _key: &str, _value: String) -> Result<(), StorageError> { Err(StorageError::Unavailable("disk full".into())) }
        fn remove(&self, _key: &str) -> Result<(), StorageError> { Ok(()) }
    }

    #[test]
    fn test_failed_persist_leaves_cart_unchanged() {
        let mut session = CartSession::load(Arc::new(FailingStore), "s1").unwrap();
        assert!(matches!(session.add_regular(regular("A")), Err(CartError::Storage(_))));
        assert!(session.regular().is_empty());
    }

    #[test]
    fn test_emptied_cart_leaves_no_entry() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        let mut session = CartSession::load(store.clone(), "s1").unwrap();
        session.add_regular(regular("A")).unwrap();
        assert!(store.get("cart:s1:regular").unwrap().is_some());

        let key = session.regular().items()[0].line_id.clone();
        session.remove_regular(&key).unwrap();
        assert!(store.get("cart:s1:regular").unwrap().is_none());
        session.add_preorder(preorder("B", "c1")).unwrap();
        session.clear(CartKind::Preorder).unwrap();
        assert!(store.get("cart:s1:preorder").unwrap().is_none());
        assert!(CartSession::load(store, "s1").unwrap().preorder().is_empty());
    }

    #[test]
    fn test_corrupt_entry_starts_empty() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        store.set("cart:s1:regular", "{not json".into()).unwrap();
        let session = CartSession::load(store, "s1").unwrap();
        assert!(session.regular().is_empty());
    }
}
