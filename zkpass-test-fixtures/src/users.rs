use halo2curves_axiom::{bn256::Fr, ff::Field};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use zkpass_common::{encode_str, encrypt_fields, leaf_hash, secret_hash, FIELD_COUNT};

const NAMES: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Erin"];

/// Attribute layout used throughout the tests: `[age, birth year, country
/// code, name]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestUser {
    pub secret: Fr,
    pub fields: Vec<Fr>,
}

impl TestUser {
    pub fn new(secret: Fr, fields: Vec<Fr>) -> Self {
        assert_eq!(fields.len(), FIELD_COUNT, "test users carry {FIELD_COUNT} fields");
        Self { secret, fields }
    }

    pub fn secret_hash(&self) -> Fr {
        secret_hash(&self.secret)
    }

    pub fn encrypted_fields(&self) -> Vec<Fr> {
        encrypt_fields(&self.secret, &self.fields)
    }

    pub fn leaf(&self) -> Fr {
        leaf_hash(&self.secret_hash(), &self.encrypted_fields())
    }

    pub fn age(&self) -> Fr {
        self.fields[0]
    }
}

/// Deterministic user `n`, aged `20 + n`.
pub fn test_user(n: u64) -> TestUser {
    user_with_age(n, 20 + n)
}

/// Deterministic user `n` with the given age in field 0.
pub fn user_with_age(n: u64, age: u64) -> TestUser {
    let mut rng = ChaCha20Rng::seed_from_u64(0x7a6b_7061_7373 ^ n);
    let secret = Fr::random(&mut rng);
    let name = NAMES[(n as usize) % NAMES.len()];
    TestUser::new(
        secret,
        vec![
            Fr::from(age),
            Fr::from(2025 - age),
            Fr::from(840u64),
            encode_str(name).unwrap_or(Fr::zero()),
        ],
    )
}
