use super::{BigInt, ErlangError, ErlangTerm, tag};

/// Incremental External Term Format writer.
///
/// The version byte is only written by [`TermEncoder::write_version`] (or by
/// [`encode`]), once per top-level value.
#[derive(Debug, Default)]
pub struct TermEncoder {
    buf: Vec<u8>,
}

impl TermEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_version(&mut self) {
        self.buf.push(tag::VERSION);
    }

    /// Writes `ATOM_EXT` for ASCII names and `ATOM_UTF8_EXT` otherwise; both
    /// carry a 2-byte length.
    pub fn write_atom(&mut self, name: &str) -> Result<(), ErlangError> {
        let length = u16::try_from(name.len()).map_err(|_| ErlangError::TooLong {
            kind: "atom",
            length: name.len(),
        })?;
        let t = if name.is_ascii() {
            tag::ATOM_EXT
        } else {
            tag::ATOM_UTF8_EXT
        };
        self.buf.push(t);
        self.buf.extend_from_slice(&length.to_be_bytes());
        self.buf.extend_from_slice(name.as_bytes());
        Ok(())
    }

    pub fn write_boolean(&mut self, value: bool) {
        let name: &[u8] = if value { b"true" } else { b"false" };
        self.buf.push(tag::ATOM_EXT);
        self.buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(name);
    }

    pub fn write_integer(&mut self, value: i64) {
        if let Ok(small) = u8::try_from(value) {
            self.buf.push(tag::SMALL_INTEGER_EXT);
            self.buf.push(small);
        } else if let Ok(int) = i32::try_from(value) {
            self.buf.push(tag::INTEGER_EXT);
            self.buf.extend_from_slice(&int.to_be_bytes());
        } else {
            self.write_big_unchecked(&BigInt::from(value));
        }
    }

    /// Writes `value` with the smallest integer tag that holds it.
    pub fn write_big(&mut self, value: &BigInt) {
        match value.to_i64() {
            Some(v) if i32::try_from(v).is_ok() => self.write_integer(v),
            _ => self.write_big_unchecked(value),
        }
    }

    fn write_big_unchecked(&mut self, value: &BigInt) {
        let magnitude = value.magnitude();
        match u8::try_from(magnitude.len()) {
            Ok(n) => {
                self.buf.push(tag::SMALL_BIG_EXT);
                self.buf.push(n);
            }
            Err(_) => {
                self.buf.push(tag::LARGE_BIG_EXT);
                self.buf
                    .extend_from_slice(&(magnitude.len() as u32).to_be_bytes());
            }
        }
        self.buf.push(u8::from(value.is_negative()));
        self.buf.extend_from_slice(magnitude);
    }

    pub fn write_float(&mut self, value: f64) {
        self.buf.push(tag::NEW_FLOAT_EXT);
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_binary(&mut self, bytes: &[u8]) -> Result<(), ErlangError> {
        let length = u32::try_from(bytes.len()).map_err(|_| ErlangError::TooLong {
            kind: "binary",
            length: bytes.len(),
        })?;
        self.buf.push(tag::BINARY_EXT);
        self.buf.extend_from_slice(&length.to_be_bytes());
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_tuple_header(&mut self, arity: usize) -> Result<(), ErlangError> {
        if let Ok(small) = u8::try_from(arity) {
            self.buf.push(tag::SMALL_TUPLE_EXT);
            self.buf.push(small);
            return Ok(());
        }
        let arity = u32::try_from(arity).map_err(|_| ErlangError::TooLong {
            kind: "tuple",
            length: arity,
        })?;
        self.buf.push(tag::LARGE_TUPLE_EXT);
        self.buf.extend_from_slice(&arity.to_be_bytes());
        Ok(())
    }

    /// Writes the `LIST_EXT` header. The caller writes `length` elements and
    /// then [`TermEncoder::write_nil`]. An empty list is just `write_nil`.
    pub fn write_list_header(&mut self, length: usize) -> Result<(), ErlangError> {
        let length = u32::try_from(length).map_err(|_| ErlangError::TooLong {
            kind: "list",
            length,
        })?;
        self.buf.push(tag::LIST_EXT);
        self.buf.extend_from_slice(&length.to_be_bytes());
        Ok(())
    }

    pub fn write_nil(&mut self) {
        self.buf.push(tag::NIL_EXT);
    }

    pub fn write_term(&mut self, term: &ErlangTerm) -> Result<(), ErlangError> {
        match term {
            ErlangTerm::Integer(v) => self.write_integer(*v),
            ErlangTerm::BigInteger(v) => self.write_big(v),
            ErlangTerm::Float(v) => self.write_float(*v),
            ErlangTerm::Atom(name) => self.write_atom(name)?,
            ErlangTerm::Binary(bytes) => self.write_binary(bytes)?,
            ErlangTerm::Tuple(items) => {
                self.write_tuple_header(items.len())?;
                for item in items {
                    self.write_term(item)?;
                }
            }
            ErlangTerm::List(items) if items.is_empty() => self.write_nil(),
            ErlangTerm::List(items) => {
                self.write_list_header(items.len())?;
                for item in items {
                    self.write_term(item)?;
                }
                self.write_nil();
            }
            ErlangTerm::Nil => self.write_nil(),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes a single top-level term, version byte included.
pub fn encode(term: &ErlangTerm) -> Result<Vec<u8>, ErlangError> {
    let mut encoder = TermEncoder::new();
    encoder.write_version();
    encoder.write_term(term)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(f: impl FnOnce(&mut TermEncoder)) -> Vec<u8> {
        let mut encoder = TermEncoder::new();
        f(&mut encoder);
        encoder.into_bytes()
    }

    #[test]
    fn integer_tag_selection() {
        assert_eq!(bytes_of(|e| e.write_integer(0)), vec![97, 0]);
        assert_eq!(bytes_of(|e| e.write_integer(255)), vec![97, 255]);
        assert_eq!(bytes_of(|e| e.write_integer(256)), vec![98, 0, 0, 1, 0]);
        assert_eq!(bytes_of(|e| e.write_integer(-1)), vec![98, 255, 255, 255, 255]);
        assert_eq!(
            bytes_of(|e| e.write_integer(i32::MAX as i64 + 1)),
            vec![110, 4, 0, 0, 0, 0, 128]
        );
        assert_eq!(
            bytes_of(|e| e.write_integer(i32::MIN as i64 - 1)),
            vec![110, 4, 1, 1, 0, 0, 128]
        );
    }

    #[test]
    fn small_big_demotes_on_write() {
        assert_eq!(bytes_of(|e| e.write_big(&BigInt::from(7i64))), vec![97, 7]);
    }

    #[test]
    fn float_is_new_float_big_endian() {
        assert_eq!(
            bytes_of(|e| e.write_float(1.0)),
            vec![70, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn booleans_are_atoms() {
        assert_eq!(
            bytes_of(|e| e.write_boolean(true)),
            vec![100, 0, 4, b't', b'r', b'u', b'e']
        );
    }

    #[test]
    fn binary_and_list_layout() {
        assert_eq!(
            bytes_of(|e| e.write_binary(b"ab").unwrap()),
            vec![109, 0, 0, 0, 2, b'a', b'b']
        );
        let list = ErlangTerm::List(vec![ErlangTerm::Integer(1)]);
        assert_eq!(
            bytes_of(|e| e.write_term(&list).unwrap()),
            vec![108, 0, 0, 0, 1, 97, 1, 106]
        );
        assert_eq!(
            bytes_of(|e| e.write_term(&ErlangTerm::List(vec![])).unwrap()),
            vec![106]
        );
    }

    #[test]
    fn tuple_arity_switches_to_large() {
        let bytes = bytes_of(|e| e.write_tuple_header(256).unwrap());
        assert_eq!(bytes, vec![105, 0, 0, 1, 0]);
    }

    #[test]
    fn atom_longer_than_u16_is_rejected() {
        let name = "a".repeat(u16::MAX as usize + 1);
        let mut encoder = TermEncoder::new();
        assert!(matches!(
            encoder.write_atom(&name),
            Err(ErlangError::TooLong { kind: "atom", .. })
        ));
        assert!(encoder.is_empty());
    }
}
