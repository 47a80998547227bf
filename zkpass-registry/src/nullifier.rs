use std::{collections::HashMap, sync::Mutex};

use halo2curves_axiom::bn256::Fr;
use zkpass_common::{fr_to_bytes, EventId};

use crate::{
    store::{KvStore, WriteBatch},
    tree::decode_u64,
    RegistryError,
};

const NULLIFIER_PREFIX: &[u8] = b"nullifier/";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct NullifierKey {
    pub event_id: EventId,
    pub nullifier: [u8; 32],
}

impl NullifierKey {
    pub fn new(event_id: EventId, nullifier: &Fr) -> Self {
        Self {
            event_id,
            nullifier: fr_to_bytes(nullifier),
        }
    }

    fn storage_key(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(NULLIFIER_PREFIX.len() + 52);
        buf.extend_from_slice(NULLIFIER_PREFIX);
        buf.extend_from_slice(self.event_id.as_bytes());
        buf.extend_from_slice(&self.nullifier);
        buf
    }
}

/// Consumed admission tokens, partitioned by event.
///
/// Each entry maps to the admission sequence number it was issued under.
/// Entries are never removed.
pub struct NullifierLedger {
    store: KvStore,
    admitted: Mutex<HashMap<EventId, u64>>,
}

impl NullifierLedger {
    pub fn load(store: KvStore) -> Result<Self, RegistryError> {
        let mut admitted: HashMap<EventId, u64> = HashMap::new();
        for (key, _) in store.scan_prefix(NULLIFIER_PREFIX)? {
            let rest = &key[NULLIFIER_PREFIX.len()..];
            if rest.len() != EventId::LEN + 32 {
                return Err(RegistryError::Store("malformed nullifier key".into()));
            }
            let event_id = EventId::from_slice(&rest[..EventId::LEN])
                .map_err(|err| RegistryError::Store(err.to_string()))?;
            *admitted.entry(event_id).or_default() += 1;
        }
        Ok(Self {
            store,
            admitted: Mutex::new(admitted),
        })
    }

    pub fn already_spent(&self, key: &NullifierKey) -> Result<bool, RegistryError> {
        self.store.contains(&key.storage_key())
    }

    /// Sequence number the nullifier was admitted under, if any.
    pub fn token_of(&self, key: &NullifierKey) -> Result<Option<u64>, RegistryError> {
        self.store
            .get(&key.storage_key())?
            .map(|raw| decode_u64(&raw))
            .transpose()
    }

    /// Consume `key`, returning its admission sequence number within the event.
    ///
    /// The check and the insert happen under one lock, so of two concurrent
    /// records of the same key exactly one succeeds.
    pub fn record(&self, key: &NullifierKey) -> Result<u64, RegistryError> {
        let mut admitted = self.admitted.lock().map_err(|_| poisoned())?;
        if self.already_spent(key)? {
            return Err(RegistryError::NullifierReused(key.event_id));
        }
        let token_id = admitted.get(&key.event_id).copied().unwrap_or(0);
        let mut batch = WriteBatch::default();
        batch.put(key.storage_key(), token_id.to_be_bytes().to_vec());
        self.store.apply(batch)?;
        admitted.insert(key.event_id, token_id + 1);
        Ok(token_id)
    }

    pub fn admitted_count(&self, event_id: &EventId) -> Result<u64, RegistryError> {
        Ok(self
            .admitted
            .lock()
            .map_err(|_| poisoned())?
            .get(event_id)
            .copied()
            .unwrap_or(0))
    }
}

fn poisoned() -> RegistryError {
    RegistryError::Store("nullifier ledger lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_once_per_event() {
        let ledger = NullifierLedger::load(KvStore::in_memory()).unwrap();
        let event_a = EventId([1; 20]);
        let event_b = EventId([2; 20]);
        let nf = Fr::from(77u64);

        let key_a = NullifierKey::new(event_a, &nf);
        assert!(!ledger.already_spent(&key_a).unwrap());
        assert_eq!(ledger.record(&key_a).unwrap(), 0);
        assert!(ledger.already_spent(&key_a).unwrap());
        assert!(matches!(
            ledger.record(&key_a),
            Err(RegistryError::NullifierReused(id)) if id == event_a
        ));

        // Same value under another event is a separate namespace.
        let key_b = NullifierKey::new(event_b, &nf);
        assert_eq!(ledger.record(&key_b).unwrap(), 0);
        assert_eq!(ledger.admitted_count(&event_a).unwrap(), 1);
    }

    #[test]
    fn token_ids_are_sequential_per_event() {
        let ledger = NullifierLedger::load(KvStore::in_memory()).unwrap();
        let event = EventId([3; 20]);
        for i in 0..4u64 {
            let key = NullifierKey::new(event, &Fr::from(100 + i));
            assert_eq!(ledger.record(&key).unwrap(), i);
            assert_eq!(ledger.token_of(&key).unwrap(), Some(i));
        }
        assert_eq!(
            ledger
                .token_of(&NullifierKey::new(event, &Fr::from(1u64)))
                .unwrap(),
            None
        );
    }

    #[test]
    fn counts_survive_reload() {
        let store = KvStore::in_memory();
        let event = EventId([4; 20]);
        {
            let ledger = NullifierLedger::load(store.clone()).unwrap();
            ledger.record(&NullifierKey::new(event, &Fr::from(1u64))).unwrap();
            ledger.record(&NullifierKey::new(event, &Fr::from(2u64))).unwrap();
        }
        let ledger = NullifierLedger::load(store).unwrap();
        assert_eq!(ledger.admitted_count(&event).unwrap(), 2);
        assert_eq!(
            ledger.record(&NullifierKey::new(event, &Fr::from(3u64))).unwrap(),
            2
        );
        assert!(ledger
            .record(&NullifierKey::new(event, &Fr::from(1u64)))
            .is_err());
    }
}
