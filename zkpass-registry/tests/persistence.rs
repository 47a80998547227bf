use halo2curves_axiom::bn256::Fr;
use zkpass_common::{CriteriaOp, Organizer};
use zkpass_registry::{
    AdmissionStatus, EventInfo, KvStore, Registry, RegistryConfig, RegistryError,
};
use zkpass_test_fixtures::{fixtures, test_user};

fn temporary_db() -> sled::Db {
    sled::Config::new().temporary(true).open().unwrap()
}

fn open(db: &sled::Db, config: RegistryConfig) -> Registry {
    Registry::open(KvStore::from_db(db.clone()), fixtures().verifier(), config).unwrap()
}

#[test]
fn registry_state_survives_reopen() {
    let db = temporary_db();
    let config = RegistryConfig::default().with_root_history(4);

    let (event_id, nullifier, root, first_root) = {
        let registry = open(&db, config.clone());
        let first = registry
            .register(test_user(0).secret_hash(), test_user(0).encrypted_fields())
            .unwrap();
        for n in 1..3 {
            let user = test_user(n);
            registry
                .register(user.secret_hash(), user.encrypted_fields())
                .unwrap();
        }
        let event = registry
            .create_event(
                Organizer([0x11; 20]),
                0,
                CriteriaOp::Gte.code(),
                Fr::from(21u64),
                "Reopened",
                EventInfo::new(r#"{"loc":"Dock 4"}"#),
            )
            .unwrap();
        let proof = event
            .request_proof(fixtures().circuit().as_ref(), &test_user(2).secret)
            .unwrap();
        let receipt = event.verify_and_admit(&proof).unwrap();
        registry.flush().unwrap();
        (event.id(), receipt.nullifier, registry.root().unwrap(), first.root)
    };

    let registry = open(&db, config);
    assert_eq!(registry.size().unwrap(), 3);
    assert_eq!(registry.root().unwrap(), root);
    assert!(registry.is_known_root(&first_root).unwrap());
    assert_eq!(registry.root_history().unwrap().len(), 4);

    let user = test_user(1);
    let record = registry.get_user(&user.secret_hash()).unwrap();
    assert!(record.exists);
    assert_eq!(record.tree_index, 1);
    assert_eq!(registry.index_of_leaf(&user.leaf()).unwrap(), Some(1));
    assert_eq!(registry.get_proof(1).unwrap().root, root);

    let event = registry.event(&event_id).unwrap().unwrap();
    assert_eq!(event.name(), "Reopened");
    assert_eq!(event.info().details.loc.as_deref(), Some("Dock 4"));
    assert_eq!(
        event.admission_status(&nullifier).unwrap(),
        AdmissionStatus::Admitted { token_id: 0 }
    );
    assert_eq!(event.admitted_count().unwrap(), 1);

    // The spent nullifier stays spent and the token counter resumes.
    let again = event
        .request_proof(fixtures().circuit().as_ref(), &test_user(2).secret)
        .unwrap();
    assert!(matches!(
        event.verify_and_admit(&again),
        Err(RegistryError::NullifierReused(_))
    ));
    let next = event
        .request_proof(fixtures().circuit().as_ref(), &test_user(1).secret)
        .unwrap();
    assert_eq!(event.verify_and_admit(&next).unwrap().token_id, 1);

    // Indices continue after the reloaded size.
    let late = test_user(3);
    let registration = registry
        .register(late.secret_hash(), late.encrypted_fields())
        .unwrap();
    assert_eq!(registration.tree_index, 3);

    // Event sequence numbers continue too, so ids do not collide.
    let second = registry
        .create_event(Organizer([0x11; 20]), 1, CriteriaOp::Lte.code(), Fr::from(2000u64), "Later", EventInfo::default())
        .unwrap();
    assert_ne!(second.id(), event_id);
    assert_eq!(registry.get_events().unwrap().len(), 2);
}

#[test]
fn duplicate_check_uses_persisted_users() {
    let db = temporary_db();
    let user = test_user(0);
    open(&db, RegistryConfig::default())
        .register(user.secret_hash(), user.encrypted_fields())
        .unwrap();

    let reopened = open(&db, RegistryConfig::default());
    assert!(matches!(
        reopened.register(user.secret_hash(), user.encrypted_fields()),
        Err(RegistryError::DuplicateSecretHash(_))
    ));
    assert_eq!(reopened.size().unwrap(), 1);
}

#[test]
fn shorter_history_on_reopen_keeps_newest_roots() {
    let db = temporary_db();
    let mut roots = Vec::new();
    {
        let registry = open(&db, RegistryConfig::default());
        for n in 0..4 {
            let user = test_user(n);
            roots.push(
                registry
                    .register(user.secret_hash(), user.encrypted_fields())
                    .unwrap()
                    .root,
            );
        }
    }

    let strict = open(&db, RegistryConfig::default().strict_roots());
    assert!(strict.is_known_root(&roots[3]).unwrap());
    assert!(!strict.is_known_root(&roots[2]).unwrap());
}
