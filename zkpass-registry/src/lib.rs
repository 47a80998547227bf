// zkpass/zkpass-registry/src/lib.rs

//! Privacy-preserving identity registry and event admission.
//!
//! Users register an encrypted attribute record once; it is committed as a
//! leaf of an append-only Merkle tree. Organizers create events with a single
//! admission rule over one attribute. A user proves in zero knowledge that
//! their record satisfies the rule, and the event consumes the proof's
//! nullifier so the same user is admitted at most once.
//!
//! All state goes through an injected [`KvStore`]; a registry reopened on the
//! same store resumes exactly where it stopped.

mod admission;
mod config;
mod error;
mod events;
mod nullifier;
mod store;
mod tree;
mod users;

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use halo2curves_axiom::bn256::Fr;
use tracing::{debug, info};
use zkpass_common::{
    decrypt_fields, fr_to_hex, leaf_hash, secret_hash, AdmissionProof, EventId, Organizer,
    TreeProof, FIELD_COUNT,
};
use zkpass_prover::{CircuitClient, CircuitInput};
use zkpass_verifier::SnarkVerifier;

use admission::Admission;
use tree::MerkleTree;

pub use admission::{AdmissionReceipt, AdmissionStatus};
pub use config::{
    RegistryConfig, DEFAULT_PROVER_TIMEOUT_SECS, DEFAULT_ROOT_HISTORY_SIZE, PROVER_TIMEOUT_ENV,
    REGISTRY_DB_ENV, ROOT_HISTORY_ENV, VK_PATH_ENV,
};
pub use error::{ErrorContext, ErrorKind, RegistryError};
pub use events::{Event, EventDetails, EventInfo, ParsedDetails};
pub use nullifier::NullifierKey;
pub use store::{KvStore, WriteBatch};
pub use tree::{RootHistory, CAPACITY};
pub use users::{Registration, UserRecord};

use events::EventCriteriaStore;
use nullifier::NullifierLedger;
use users::{leaf_key, user_key};

/// Shared handle to a registry. Cloning is cheap and every clone sees the
/// same state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    store: KvStore,
    verifier: Arc<dyn SnarkVerifier>,
    config: RegistryConfig,
    tree: RwLock<MerkleTree>,
    events: EventCriteriaStore,
    nullifiers: NullifierLedger,
}

impl Registry {
    /// Open a registry on `store`, reloading whatever state it already holds.
    pub fn open(
        store: KvStore,
        verifier: Arc<dyn SnarkVerifier>,
        config: RegistryConfig,
    ) -> Result<Self, RegistryError> {
        let tree = MerkleTree::load(&store, config.effective_root_history())?;
        let events = EventCriteriaStore::load(store.clone())?;
        let nullifiers = NullifierLedger::load(store.clone())?;
        info!(
            size = tree.size(),
            events = events.len()?,
            root_history = config.effective_root_history(),
            persistent = store.is_persistent(),
            "registry opened"
        );
        Ok(Self {
            inner: Arc::new(RegistryInner {
                store,
                verifier,
                config,
                tree: RwLock::new(tree),
                events,
                nullifiers,
            }),
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &KvStore {
        &self.inner.store
    }

    /// Append a user record. Returns the assigned leaf index and the new root.
    pub fn register(
        &self,
        secret_hash: Fr,
        encrypted_fields: Vec<Fr>,
    ) -> Result<Registration, RegistryError> {
        if encrypted_fields.len() != FIELD_COUNT {
            return Err(RegistryError::FieldCountMismatch {
                expected: FIELD_COUNT,
                actual: encrypted_fields.len(),
            });
        }

        let mut tree = self.tree_write()?;
        let key = user_key(&secret_hash);
        if self.inner.store.contains(&key)? {
            return Err(RegistryError::DuplicateSecretHash(fr_to_hex(&secret_hash)));
        }

        let leaf = leaf_hash(&secret_hash, &encrypted_fields);
        let staged = tree.stage_insert(leaf)?;
        let record = UserRecord {
            secret_hash,
            encrypted_fields,
            leaf,
            tree_index: staged.index,
            exists: true,
        };

        let mut batch = WriteBatch::default();
        staged.write_to(&mut batch)?;
        batch.put(key, serde_json::to_vec(&record)?);
        batch.put(leaf_key(&leaf), staged.index.to_be_bytes().to_vec());
        self.inner.store.apply(batch)?;

        let registration = Registration {
            tree_index: staged.index,
            leaf,
            root: staged.root,
        };
        tree.commit(staged);
        info!(index = registration.tree_index, root = %fr_to_hex(&registration.root), "user registered");
        Ok(registration)
    }

    /// Look up a record. Unknown users yield a record with `exists == false`.
    pub fn get_user(&self, secret_hash: &Fr) -> Result<UserRecord, RegistryError> {
        match self.inner.store.get(&user_key(secret_hash))? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(UserRecord::absent(*secret_hash)),
        }
    }

    pub fn user_exists(&self, secret_hash: &Fr) -> Result<bool, RegistryError> {
        self.inner.store.contains(&user_key(secret_hash))
    }

    pub fn index_of_leaf(&self, leaf: &Fr) -> Result<Option<u64>, RegistryError> {
        self.inner
            .store
            .get(&leaf_key(leaf))?
            .map(|raw| tree::decode_u64(&raw))
            .transpose()
    }

    /// Inclusion path for leaf `index` against the current root.
    pub fn get_proof(&self, index: u64) -> Result<TreeProof, RegistryError> {
        self.tree_read()?.proof(index)
    }

    pub fn root(&self) -> Result<Fr, RegistryError> {
        Ok(self.tree_read()?.root())
    }

    pub fn size(&self) -> Result<u64, RegistryError> {
        Ok(self.tree_read()?.size())
    }

    pub fn is_known_root(&self, root: &Fr) -> Result<bool, RegistryError> {
        Ok(self.tree_read()?.is_known_root(root))
    }

    pub fn root_history(&self) -> Result<RootHistory, RegistryError> {
        Ok(self.tree_read()?.history().clone())
    }

    pub fn create_event(
        &self,
        organizer: Organizer,
        field_index: u64,
        op_code: u64,
        value: Fr,
        name: &str,
        info: EventInfo,
    ) -> Result<EventHandle, RegistryError> {
        let event = self
            .inner
            .events
            .create(organizer, field_index, op_code, value, name, info)?;
        Ok(EventHandle {
            registry: self.clone(),
            event,
        })
    }

    pub fn get_events(&self) -> Result<Vec<Event>, RegistryError> {
        self.inner.events.all()
    }

    pub fn get_event(&self, id: &EventId) -> Result<Event, RegistryError> {
        self.inner
            .events
            .get(id)?
            .ok_or(RegistryError::EventNotFound(*id))
    }

    /// Handle bound to one event, or `None` if no such event exists.
    pub fn event(&self, id: &EventId) -> Result<Option<EventHandle>, RegistryError> {
        Ok(self.inner.events.get(id)?.map(|event| EventHandle {
            registry: self.clone(),
            event,
        }))
    }

    /// Verify an admission proof for `event_id` and consume its nullifier.
    pub fn verify_and_admit(
        &self,
        event_id: &EventId,
        proof: &AdmissionProof,
    ) -> Result<AdmissionReceipt, RegistryError> {
        let event = self.get_event(event_id)?;
        self.admit(&event, proof)
    }

    pub fn admission_status(
        &self,
        event_id: &EventId,
        nullifier: &Fr,
    ) -> Result<AdmissionStatus, RegistryError> {
        let key = NullifierKey::new(*event_id, nullifier);
        Ok(match self.inner.nullifiers.token_of(&key)? {
            Some(token_id) => AdmissionStatus::Admitted { token_id },
            None => AdmissionStatus::NotAdmitted,
        })
    }

    pub fn admitted_count(&self, event_id: &EventId) -> Result<u64, RegistryError> {
        self.inner.nullifiers.admitted_count(event_id)
    }

    pub fn flush(&self) -> Result<(), RegistryError> {
        self.inner.store.flush()
    }

    fn admit(&self, event: &Event, proof: &AdmissionProof) -> Result<AdmissionReceipt, RegistryError> {
        let tree = self.tree_read()?;
        Admission {
            event,
            verifier: self.inner.verifier.as_ref(),
            nullifiers: &self.inner.nullifiers,
        }
        .run(proof, &tree)
    }

    fn tree_read(&self) -> Result<RwLockReadGuard<'_, MerkleTree>, RegistryError> {
        self.inner
            .tree
            .read()
            .map_err(|_| RegistryError::Store("merkle tree lock poisoned".into()))
    }

    fn tree_write(&self) -> Result<RwLockWriteGuard<'_, MerkleTree>, RegistryError> {
        self.inner
            .tree
            .write()
            .map_err(|_| RegistryError::Store("merkle tree lock poisoned".into()))
    }
}

/// One event together with the registry it belongs to.
#[derive(Clone)]
pub struct EventHandle {
    registry: Registry,
    event: Event,
}

impl EventHandle {
    pub fn id(&self) -> EventId {
        self.event.id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn organizer(&self) -> Organizer {
        self.event.organizer
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn info(&self) -> ParsedDetails {
        self.event.info.details()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn verify_and_admit(&self, proof: &AdmissionProof) -> Result<AdmissionReceipt, RegistryError> {
        self.registry.admit(&self.event, proof)
    }

    pub fn admission_status(&self, nullifier: &Fr) -> Result<AdmissionStatus, RegistryError> {
        self.registry.admission_status(&self.event.id, nullifier)
    }

    pub fn admitted_count(&self) -> Result<u64, RegistryError> {
        self.registry.admitted_count(&self.event.id)
    }

    /// Assemble the circuit input for the user holding `secret`, against the
    /// current root. Plaintext fields are recovered with the secret.
    pub fn circuit_input(&self, secret: &Fr) -> Result<CircuitInput, RegistryError> {
        let sh = secret_hash(secret);
        let user = self.registry.get_user(&sh)?;
        if !user.exists {
            return Err(RegistryError::UserNotFound(fr_to_hex(&sh)));
        }
        let path = self.registry.get_proof(user.tree_index)?;
        let fields = decrypt_fields(secret, &user.encrypted_fields);
        Ok(CircuitInput::new(*secret, self.event.id, &self.event.criteria, &path).with_fields(fields))
    }

    /// Build the circuit input and ask `client` for a proof.
    pub fn request_proof(
        &self,
        client: &dyn CircuitClient,
        secret: &Fr,
    ) -> Result<AdmissionProof, RegistryError> {
        let input = self.circuit_input(secret)?;
        debug!(event = %self.event.id, index = input.tree_index, "requesting admission proof");
        Ok(client.prove(&input)?)
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle").field("event", &self.event).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zkpass_common::{encrypt_fields, CriteriaOp};
    use zkpass_test_fixtures::{fixtures, test_user};

    fn open() -> Registry {
        Registry::open(
            KvStore::in_memory(),
            fixtures().verifier(),
            RegistryConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn register_rejects_wrong_field_count() {
        let registry = open();
        let secret = Fr::from(5u64);
        let enc = encrypt_fields(&secret, &[Fr::from(1u64)]);
        assert!(matches!(
            registry.register(secret_hash(&secret), enc),
            Err(RegistryError::FieldCountMismatch { expected: 4, actual: 1 })
        ));
        assert_eq!(registry.size().unwrap(), 0);
    }

    #[test]
    fn absent_user_is_a_sentinel() {
        let registry = open();
        let user = registry.get_user(&Fr::from(123u64)).unwrap();
        assert!(!user.exists);
        assert_eq!(user.secret_hash, Fr::from(123u64));
    }

    #[test]
    fn registration_is_indexed_by_leaf() {
        let registry = open();
        let user = test_user(0);
        let reg = registry
            .register(user.secret_hash(), user.encrypted_fields())
            .unwrap();
        assert_eq!(reg.tree_index, 0);
        assert_eq!(registry.index_of_leaf(&reg.leaf).unwrap(), Some(0));
        assert_eq!(registry.root().unwrap(), reg.root);
    }

    #[test]
    fn circuit_input_requires_registration() {
        let registry = open();
        let event = registry
            .create_event(Organizer([1; 20]), 0, CriteriaOp::Gte.code(), Fr::from(18u64), "e", EventInfo::default())
            .unwrap();
        let user = test_user(1);
        assert!(matches!(
            event.circuit_input(&user.secret),
            Err(RegistryError::UserNotFound(_))
        ));

        registry
            .register(user.secret_hash(), user.encrypted_fields())
            .unwrap();
        let input = event.circuit_input(&user.secret).unwrap();
        assert_eq!(input.merkle_root, registry.root().unwrap());
        assert_eq!(input.fields.as_deref(), Some(user.fields.as_slice()));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn unknown_event_lookup() {
        let registry = open();
        let id = EventId([9; 20]);
        assert!(registry.event(&id).unwrap().is_none());
        assert!(matches!(
            registry.get_event(&id),
            Err(RegistryError::EventNotFound(_))
        ));
    }
}
