use std::{cmp::Ordering, fmt};

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};

use crate::{fr_cmp, CommonError, FIELD_COUNT};

/// Comparison applied to an attribute field during admission.
///
/// The numeric codes are what gets stored, shown to organizers and exposed as
/// the `op` public input, so they must never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum CriteriaOp {
    Eq = 0,
    Gte = 1,
    Lte = 2,
}

impl CriteriaOp {
    pub const fn code(self) -> u64 {
        self as u64
    }

    pub fn to_fr(self) -> Fr {
        Fr::from(self.code())
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CriteriaOp::Eq => "==",
            CriteriaOp::Gte => ">=",
            CriteriaOp::Lte => "<=",
        }
    }

    /// Evaluate `attribute <op> threshold` over canonical integer values.
    pub fn evaluate(self, attribute: &Fr, threshold: &Fr) -> bool {
        let ord = fr_cmp(attribute, threshold);
        match self {
            CriteriaOp::Eq => ord == Ordering::Equal,
            CriteriaOp::Gte => ord != Ordering::Less,
            CriteriaOp::Lte => ord != Ordering::Greater,
        }
    }
}

impl TryFrom<u64> for CriteriaOp {
    type Error = CommonError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(CriteriaOp::Eq),
            1 => Ok(CriteriaOp::Gte),
            2 => Ok(CriteriaOp::Lte),
            other => Err(CommonError::UnknownOp(other)),
        }
    }
}

impl From<CriteriaOp> for u64 {
    fn from(op: CriteriaOp) -> Self {
        op.code()
    }
}

impl fmt::Display for CriteriaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Admission rule of an event: `fields[field_index] <op> value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criteria {
    pub field_index: u64,
    pub op: CriteriaOp,
    #[serde(with = "crate::serde_fr")]
    pub value: Fr,
}

impl Criteria {
    pub fn new(field_index: u64, op: CriteriaOp, value: Fr) -> Self {
        Self {
            field_index,
            op,
            value,
        }
    }

    pub fn targets_known_field(&self) -> bool {
        (self.field_index as usize) < FIELD_COUNT
    }

    /// Check the rule against decrypted attribute values. A criteria pointing
    /// past the end of `plain_fields` is never satisfied.
    pub fn is_satisfied_by(&self, plain_fields: &[Fr]) -> bool {
        usize::try_from(self.field_index)
            .ok()
            .and_then(|idx| plain_fields.get(idx))
            .map(|field| self.op.evaluate(field, &self.value))
            .unwrap_or(false)
    }

    /// The `(fieldIndex, op, value)` triple as it appears in the public inputs.
    pub fn public_fields(&self) -> [Fr; 3] {
        [Fr::from(self.field_index), self.op.to_fr(), self.value]
    }
}

impl fmt::Display for Criteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match crate::fr_to_u64(&self.value) {
            Ok(v) => write!(f, "field[{}] {} {}", self.field_index, self.op, v),
            Err(_) => write!(
                f,
                "field[{}] {} {}",
                self.field_index,
                self.op,
                crate::fr_to_hex(&self.value)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_codes_are_fixed() {
        assert_eq!(CriteriaOp::Eq.code(), 0);
        assert_eq!(CriteriaOp::Gte.code(), 1);
        assert_eq!(CriteriaOp::Lte.code(), 2);
        for code in 0..3u64 {
            assert_eq!(CriteriaOp::try_from(code).unwrap().code(), code);
        }
        assert_eq!(CriteriaOp::try_from(3), Err(CommonError::UnknownOp(3)));
    }

    #[test]
    fn age_threshold_eligibility() {
        let rule = Criteria::new(0, CriteriaOp::Gte, Fr::from(18u64));
        assert!(rule.is_satisfied_by(&[Fr::from(20u64)]));
        assert!(rule.is_satisfied_by(&[Fr::from(18u64)]));
        assert!(!rule.is_satisfied_by(&[Fr::from(10u64)]));
    }

    #[test]
    fn eq_and_lte() {
        let fields = [Fr::from(5u64), Fr::from(7u64)];
        assert!(Criteria::new(1, CriteriaOp::Eq, Fr::from(7u64)).is_satisfied_by(&fields));
        assert!(!Criteria::new(1, CriteriaOp::Eq, Fr::from(6u64)).is_satisfied_by(&fields));
        assert!(Criteria::new(0, CriteriaOp::Lte, Fr::from(5u64)).is_satisfied_by(&fields));
        assert!(!Criteria::new(0, CriteriaOp::Lte, Fr::from(4u64)).is_satisfied_by(&fields));
    }

    #[test]
    fn out_of_range_field_is_never_satisfied() {
        let rule = Criteria::new(9, CriteriaOp::Gte, Fr::zero());
        assert!(!rule.targets_known_field());
        assert!(!rule.is_satisfied_by(&[Fr::from(1u64); FIELD_COUNT]));
    }

    #[test]
    fn serializes_op_as_code() {
        let rule = Criteria::new(0, CriteriaOp::Gte, Fr::from(18u64));
        let json = serde_json::to_value(rule).unwrap();
        assert_eq!(json["op"], 1);
        let back: Criteria = serde_json::from_value(json).unwrap();
        assert_eq!(back, rule);

        let bad = serde_json::json!({
            "field_index": 0,
            "op": 7,
            "value": crate::fr_to_hex(&Fr::one()),
        });
        assert!(serde_json::from_value::<Criteria>(bad).is_err());
    }

    #[test]
    fn display_reads_like_a_rule() {
        let rule = Criteria::new(0, CriteriaOp::Gte, Fr::from(18u64));
        assert_eq!(rule.to_string(), "field[0] >= 18");
    }
}
