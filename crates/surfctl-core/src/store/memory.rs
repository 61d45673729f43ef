use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{StoreError, SubscriberStore};
use crate::model::{Imsi, Subscriber};

/// Process-local store backed by a `DashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<Imsi, Subscriber>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<Subscriber> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Subscriber>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().map(|s| (s.imsi.clone(), s)).collect(),
        }
    }
}

impl SubscriberStore for MemoryStore {
    async fn get(&self, imsi: &Imsi) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.records.get(imsi).map(|r| r.value().clone()))
    }

    async fn put(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        self.records
            .insert(subscriber.imsi.clone(), subscriber.clone());
        Ok(())
    }

    async fn create(&self, subscriber: &Subscriber) -> Result<(), StoreError> {
        match self.records.entry(subscriber.imsi.clone()) {
            Entry::Occupied(_) => Err(StoreError::Exists {
                imsi: subscriber.imsi.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(subscriber.clone());
                Ok(())
            }
        }
    }

    async fn delete(&self, imsi: &Imsi) -> Result<bool, StoreError> {
        Ok(self.records.remove(imsi).is_some())
    }

    async fn list(&self) -> Result<Vec<Subscriber>, StoreError> {
        let mut all: Vec<Subscriber> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| a.imsi.cmp(&b.imsi));
        Ok(all)
    }
}
