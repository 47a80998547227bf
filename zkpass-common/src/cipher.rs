//! Additive one-time-pad over the scalar field.
//!
//! The key for field `i` is `H(secret, secret, i)`; encryption adds it and
//! decryption subtracts it, so the two are exact inverses for any secret and
//! any number of fields.

use halo2curves_axiom::bn256::Fr;

use crate::poseidon::hash3;

pub fn derive_field_key(secret: &Fr, field_index: u64) -> Fr {
    hash3(*secret, *secret, Fr::from(field_index))
}

pub fn encrypt_fields(secret: &Fr, fields: &[Fr]) -> Vec<Fr> {
    fields
        .iter()
        .enumerate()
        .map(|(i, value)| *value + derive_field_key(secret, i as u64))
        .collect()
}

pub fn decrypt_fields(secret: &Fr, encrypted: &[Fr]) -> Vec<Fr> {
    encrypted
        .iter()
        .enumerate()
        .map(|(i, value)| *value - derive_field_key(secret, i as u64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves_axiom::ff::Field;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn decrypt_inverts_encrypt_for_any_field_count() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for count in [0usize, 1, 4, 6, 9] {
            let secret = Fr::random(&mut rng);
            let fields: Vec<Fr> = (0..count).map(|_| Fr::random(&mut rng)).collect();
            let encrypted = encrypt_fields(&secret, &fields);
            assert_eq!(encrypted.len(), count);
            assert_eq!(decrypt_fields(&secret, &encrypted), fields);
        }
    }

    #[test]
    fn wraps_around_the_modulus() {
        let secret = Fr::from(3u64);
        let fields = vec![-Fr::one(), Fr::zero()];
        let encrypted = encrypt_fields(&secret, &fields);
        assert_eq!(decrypt_fields(&secret, &encrypted), fields);
    }

    #[test]
    fn keys_depend_on_position_and_secret() {
        let secret = Fr::from(11u64);
        assert_ne!(derive_field_key(&secret, 0), derive_field_key(&secret, 1));
        assert_ne!(
            derive_field_key(&secret, 0),
            derive_field_key(&Fr::from(12u64), 0)
        );
    }

    #[test]
    fn wrong_secret_does_not_decrypt() {
        let fields = vec![Fr::from(20u64), Fr::from(1u64)];
        let encrypted = encrypt_fields(&Fr::from(1u64), &fields);
        assert_ne!(decrypt_fields(&Fr::from(2u64), &encrypted), fields);
    }
}
