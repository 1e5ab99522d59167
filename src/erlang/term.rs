use std::fmt;

/// Arbitrary precision integer as carried by `SMALL_BIG_EXT`/`LARGE_BIG_EXT`.
///
/// The magnitude is little-endian with no trailing zero bytes; zero has an
/// empty magnitude and is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BigInt {
    negative: bool,
    magnitude: Vec<u8>,
}

impl BigInt {
    pub fn new(negative: bool, mut magnitude: Vec<u8>) -> Self {
        while magnitude.last() == Some(&0) {
            magnitude.pop();
        }
        let negative = negative && !magnitude.is_empty();
        Self {
            negative,
            magnitude,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// Little-endian magnitude bytes.
    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    pub fn to_i128(&self) -> Option<i128> {
        if self.magnitude.len() > 16 {
            return None;
        }
        let mut bytes = [0u8; 16];
        bytes[..self.magnitude.len()].copy_from_slice(&self.magnitude);
        let magnitude = u128::from_le_bytes(bytes);

        if self.negative {
            if magnitude == 1 << 127 {
                Some(i128::MIN)
            } else {
                i128::try_from(magnitude).ok().map(|v| -v)
            }
        } else {
            i128::try_from(magnitude).ok()
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|v| i64::try_from(v).ok())
    }
}

impl From<i128> for BigInt {
    fn from(value: i128) -> Self {
        BigInt::new(value < 0, value.unsigned_abs().to_le_bytes().to_vec())
    }
}

impl From<i64> for BigInt {
    fn from(value: i64) -> Self {
        BigInt::from(value as i128)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_i128() {
            Some(v) => write!(f, "{v}"),
            None => {
                let sign = if self.negative { "-" } else { "" };
                write!(f, "{sign}0x")?;
                for byte in self.magnitude.iter().rev() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// A value in the Erlang External Term Format.
///
/// Integers are normalised: anything that fits in an `i64` is an
/// [`ErlangTerm::Integer`], and [`ErlangTerm::BigInteger`] only holds values
/// outside that range. Empty lists are [`ErlangTerm::Nil`]. Booleans are the
/// atoms `true` and `false`.
#[derive(Debug, Clone, PartialEq)]
pub enum ErlangTerm {
    Integer(i64),
    /// Only for values outside the `i64` range; build it with
    /// [`ErlangTerm::big`]. A hand-built in-range value encodes exactly like
    /// the equal `Integer` and decodes back as one.
    BigInteger(BigInt),
    Float(f64),
    Atom(String),
    Binary(Vec<u8>),
    Tuple(Vec<ErlangTerm>),
    List(Vec<ErlangTerm>),
    Nil,
}

impl ErlangTerm {
    pub fn atom(name: impl Into<String>) -> Self {
        ErlangTerm::Atom(name.into())
    }

    pub fn boolean(value: bool) -> Self {
        ErlangTerm::Atom(if value { "true" } else { "false" }.to_string())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        ErlangTerm::Binary(bytes.into())
    }

    pub fn big(value: BigInt) -> Self {
        match value.to_i64() {
            Some(v) => ErlangTerm::Integer(v),
            None => ErlangTerm::BigInteger(value),
        }
    }

    pub fn list(items: Vec<ErlangTerm>) -> Self {
        if items.is_empty() {
            ErlangTerm::Nil
        } else {
            ErlangTerm::List(items)
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            ErlangTerm::Atom(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.as_atom()? {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ErlangTerm::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            ErlangTerm::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[ErlangTerm]> {
        match self {
            ErlangTerm::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for ErlangTerm {
    fn from(value: i64) -> Self {
        ErlangTerm::Integer(value)
    }
}

impl From<i128> for ErlangTerm {
    fn from(value: i128) -> Self {
        ErlangTerm::big(BigInt::from(value))
    }
}

impl From<f64> for ErlangTerm {
    fn from(value: f64) -> Self {
        ErlangTerm::Float(value)
    }
}

impl From<bool> for ErlangTerm {
    fn from(value: bool) -> Self {
        ErlangTerm::boolean(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_int_normalises_magnitude() {
        let value = BigInt::new(true, vec![0, 0, 0]);
        assert!(!value.is_negative());
        assert!(value.magnitude().is_empty());
        assert_eq!(value.to_i64(), Some(0));

        let value = BigInt::new(false, vec![1, 0, 0]);
        assert_eq!(value.magnitude(), &[1]);
    }

    #[test]
    fn big_int_i128_extremes() {
        for v in [i128::MIN, i128::MAX, -1, 1, i64::MIN as i128 - 1] {
            assert_eq!(BigInt::from(v).to_i128(), Some(v));
        }
        assert_eq!(BigInt::from(i64::MAX as i128 + 1).to_i64(), None);
        assert_eq!(BigInt::new(false, vec![1; 17]).to_i128(), None);
    }

    #[test]
    fn big_term_demotes_to_integer() {
        assert_eq!(ErlangTerm::from(42i128), ErlangTerm::Integer(42));
        assert!(matches!(
            ErlangTerm::from(i64::MAX as i128 + 1),
            ErlangTerm::BigInteger(_)
        ));
    }

    #[test]
    fn boolean_atoms() {
        assert_eq!(ErlangTerm::boolean(true).as_boolean(), Some(true));
        assert_eq!(ErlangTerm::atom("false").as_boolean(), Some(false));
        assert_eq!(ErlangTerm::atom("True").as_boolean(), None);
    }
}
