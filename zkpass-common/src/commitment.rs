use halo2curves_axiom::bn256::Fr;

use crate::poseidon::{hash1, hash2};

/// Registry lookup key for a user: `H(secret)`.
pub fn secret_hash(secret: &Fr) -> Fr {
    hash1(*secret)
}

/// Fold a secret commitment and the encrypted attributes into a tree leaf.
///
/// `acc = secret_hash; acc = H(acc, e)` for each encrypted field in order.
pub fn leaf_hash(secret_hash: &Fr, encrypted_fields: &[Fr]) -> Fr {
    encrypted_fields
        .iter()
        .fold(*secret_hash, |acc, field| hash2(acc, *field))
}

/// Event-scoped single-use token: `H(event, H(event, secret))`.
pub fn nullifier(event: &Fr, secret: &Fr) -> Fr {
    hash2(*event, hash2(*event, *secret))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::encrypt_fields;

    fn sample_fields() -> Vec<Fr> {
        vec![
            Fr::from(20u64),
            Fr::from(19_900_101u64),
            Fr::from(1u64),
            Fr::from(44u64),
        ]
    }

    #[test]
    fn leaf_is_deterministic() {
        let secret = Fr::from(1234u64);
        let enc = encrypt_fields(&secret, &sample_fields());
        let sh = secret_hash(&secret);
        assert_eq!(leaf_hash(&sh, &enc), leaf_hash(&sh, &enc));
    }

    #[test]
    fn leaf_changes_with_any_field() {
        let secret = Fr::from(1234u64);
        let enc = encrypt_fields(&secret, &sample_fields());
        let sh = secret_hash(&secret);
        let base = leaf_hash(&sh, &enc);
        for i in 0..enc.len() {
            let mut tweaked = enc.clone();
            tweaked[i] += Fr::one();
            assert_ne!(leaf_hash(&sh, &tweaked), base, "field {i}");
        }
    }

    #[test]
    fn leaf_binds_order_and_count() {
        let secret = Fr::from(99u64);
        let enc = encrypt_fields(&secret, &sample_fields());
        let sh = secret_hash(&secret);
        let base = leaf_hash(&sh, &enc);

        let mut swapped = enc.clone();
        swapped.swap(0, 1);
        assert_ne!(leaf_hash(&sh, &swapped), base);

        assert_ne!(leaf_hash(&sh, &enc[..3]), base);
        assert_eq!(leaf_hash(&sh, &[]), sh);
    }

    #[test]
    fn nullifier_is_event_scoped_and_stable() {
        let secret = Fr::from(42u64);
        let event_a = Fr::from(1001u64);
        let event_b = Fr::from(1002u64);
        assert_eq!(nullifier(&event_a, &secret), nullifier(&event_a, &secret));
        assert_ne!(nullifier(&event_a, &secret), nullifier(&event_b, &secret));
        assert_ne!(
            nullifier(&event_a, &secret),
            nullifier(&event_a, &Fr::from(43u64))
        );
    }
}
