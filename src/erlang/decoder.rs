use super::{BigInt, ErlangError, ErlangTerm, MAX_DEPTH, tag};

/// Cursor over an External Term Format buffer.
///
/// Every read either consumes exactly the bytes it needs or fails with
/// [`ErlangError::UnexpectedEndOfStream`]; nothing is zero-filled.
#[derive(Debug, Clone)]
pub struct TermDecoder<'a> {
    buf: &'a [u8],
    position: usize,
}

impl<'a> TermDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.position
    }

    pub fn read_version(&mut self) -> Result<(), ErlangError> {
        match self.read1()? {
            tag::VERSION => Ok(()),
            other => Err(ErlangError::BadVersion(other)),
        }
    }

    /// Next tag byte, without consuming it.
    pub fn peek(&self) -> Result<u8, ErlangError> {
        self.buf
            .get(self.position)
            .copied()
            .ok_or(ErlangError::UnexpectedEndOfStream {
                needed: 1,
                remaining: 0,
            })
    }

    pub fn read1(&mut self) -> Result<u8, ErlangError> {
        let byte = self.peek()?;
        self.position += 1;
        Ok(byte)
    }

    /// Reads exactly `n` bytes. Fails at the end of the buffer even for
    /// `n == 0`.
    pub fn read_n(&mut self, n: usize) -> Result<&'a [u8], ErlangError> {
        let remaining = self.remaining();
        if remaining == 0 || n > remaining {
            return Err(ErlangError::UnexpectedEndOfStream {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.position..self.position + n];
        self.position += n;
        Ok(bytes)
    }

    /// Body of a length-prefixed value. A zero length consumes nothing and
    /// is valid even at the end of the buffer.
    fn read_body(&mut self, length: usize) -> Result<&'a [u8], ErlangError> {
        if length == 0 {
            return Ok(&[]);
        }
        self.read_n(length)
    }

    /// Fills `out` completely from the buffer.
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<(), ErlangError> {
        let bytes = self.read_n(out.len())?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    fn read_u16(&mut self) -> Result<u16, ErlangError> {
        let mut bytes = [0; 2];
        self.read_into(&mut bytes)?;
        Ok(u16::from_be_bytes(bytes))
    }

    fn read_u32(&mut self) -> Result<u32, ErlangError> {
        let mut bytes = [0; 4];
        self.read_into(&mut bytes)?;
        Ok(u32::from_be_bytes(bytes))
    }

    fn expect_tag(&mut self, expected: &'static str, wanted: &[u8]) -> Result<u8, ErlangError> {
        let found = self.peek()?;
        if !wanted.contains(&found) {
            return Err(ErlangError::UnexpectedTag { expected, found });
        }
        self.position += 1;
        Ok(found)
    }

    pub fn read_atom(&mut self) -> Result<String, ErlangError> {
        let t = self.expect_tag(
            "atom",
            &[
                tag::ATOM_EXT,
                tag::SMALL_ATOM_EXT,
                tag::ATOM_UTF8_EXT,
                tag::SMALL_ATOM_UTF8_EXT,
            ],
        )?;
        let length = match t {
            tag::ATOM_EXT | tag::ATOM_UTF8_EXT => self.read_u16()? as usize,
            _ => self.read1()? as usize,
        };
        let bytes = self.read_body(length)?;
        match t {
            // Latin-1 maps byte-for-byte onto the first 256 code points.
            tag::ATOM_EXT | tag::SMALL_ATOM_EXT => Ok(bytes.iter().map(|&b| b as char).collect()),
            _ => String::from_utf8(bytes.to_vec()).map_err(|_| ErlangError::InvalidAtom),
        }
    }

    pub fn read_boolean(&mut self) -> Result<bool, ErlangError> {
        let atom = self.read_atom()?;
        match atom.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ErlangError::InvalidBoolean(atom)),
        }
    }

    /// Reads any integer tag whose value fits in an `i64`.
    pub fn read_integer(&mut self) -> Result<i64, ErlangError> {
        match self.peek()? {
            tag::SMALL_INTEGER_EXT => {
                self.position += 1;
                Ok(self.read1()? as i64)
            }
            tag::INTEGER_EXT => {
                self.position += 1;
                Ok(self.read_u32()? as i32 as i64)
            }
            _ => self.read_big()?.to_i64().ok_or(ErlangError::IntegerOverflow),
        }
    }

    /// Reads any integer tag as an arbitrary precision value.
    pub fn read_big(&mut self) -> Result<BigInt, ErlangError> {
        let t = self.expect_tag(
            "integer",
            &[
                tag::SMALL_INTEGER_EXT,
                tag::INTEGER_EXT,
                tag::SMALL_BIG_EXT,
                tag::LARGE_BIG_EXT,
            ],
        )?;
        let length = match t {
            tag::SMALL_INTEGER_EXT => return Ok(BigInt::from(self.read1()? as i64)),
            tag::INTEGER_EXT => return Ok(BigInt::from(self.read_u32()? as i32 as i64)),
            tag::SMALL_BIG_EXT => self.read1()? as usize,
            _ => self.read_u32()? as usize,
        };
        let negative = self.read1()? != 0;
        let magnitude = self.read_body(length)?;
        Ok(BigInt::new(negative, magnitude.to_vec()))
    }

    pub fn read_float(&mut self) -> Result<f64, ErlangError> {
        let t = self.expect_tag("float", &[tag::NEW_FLOAT_EXT, tag::FLOAT_EXT])?;
        if t == tag::NEW_FLOAT_EXT {
            let mut bytes = [0; 8];
            self.read_into(&mut bytes)?;
            return Ok(f64::from_bits(u64::from_be_bytes(bytes)));
        }

        // FLOAT_EXT: 31 bytes of NUL padded "%.20e" text.
        let raw = self.read_n(31)?;
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\0').trim();
        text.parse::<f64>()
            .map_err(|_| ErlangError::InvalidFloat(text.to_string()))
    }

    pub fn read_binary(&mut self) -> Result<Vec<u8>, ErlangError> {
        self.expect_tag("binary", &[tag::BINARY_EXT])?;
        let length = self.read_u32()? as usize;
        Ok(self.read_body(length)?.to_vec())
    }

    pub fn read_tuple_header(&mut self) -> Result<usize, ErlangError> {
        match self.expect_tag("tuple", &[tag::SMALL_TUPLE_EXT, tag::LARGE_TUPLE_EXT])? {
            tag::SMALL_TUPLE_EXT => Ok(self.read1()? as usize),
            _ => Ok(self.read_u32()? as usize),
        }
    }

    /// Returns the element count of the next list. `NIL_EXT` is consumed and
    /// yields zero; for a non-empty list the caller reads the elements and
    /// then [`TermDecoder::read_nil`].
    pub fn read_list_header(&mut self) -> Result<usize, ErlangError> {
        match self.expect_tag("list", &[tag::LIST_EXT, tag::NIL_EXT])? {
            tag::NIL_EXT => Ok(0),
            _ => Ok(self.read_u32()? as usize),
        }
    }

    pub fn read_nil(&mut self) -> Result<(), ErlangError> {
        match self.read1()? {
            tag::NIL_EXT => Ok(()),
            other => Err(ErlangError::ImproperList(other)),
        }
    }

    pub fn read_term(&mut self) -> Result<ErlangTerm, ErlangError> {
        self.read_term_at(0)
    }

    fn read_term_at(&mut self, depth: usize) -> Result<ErlangTerm, ErlangError> {
        if depth > MAX_DEPTH {
            return Err(ErlangError::TooDeep);
        }

        let term = match self.peek()? {
            tag::SMALL_INTEGER_EXT | tag::INTEGER_EXT | tag::SMALL_BIG_EXT | tag::LARGE_BIG_EXT => {
                ErlangTerm::big(self.read_big()?)
            }
            tag::NEW_FLOAT_EXT | tag::FLOAT_EXT => ErlangTerm::Float(self.read_float()?),
            tag::ATOM_EXT | tag::SMALL_ATOM_EXT | tag::ATOM_UTF8_EXT | tag::SMALL_ATOM_UTF8_EXT => {
                ErlangTerm::Atom(self.read_atom()?)
            }
            tag::BINARY_EXT => ErlangTerm::Binary(self.read_binary()?),
            tag::SMALL_TUPLE_EXT | tag::LARGE_TUPLE_EXT => {
                let arity = self.read_tuple_header()?;
                let mut items = Vec::with_capacity(arity.min(self.remaining()));
                for _ in 0..arity {
                    items.push(self.read_term_at(depth + 1)?);
                }
                ErlangTerm::Tuple(items)
            }
            tag::NIL_EXT => {
                self.position += 1;
                ErlangTerm::Nil
            }
            tag::LIST_EXT => {
                let length = self.read_list_header()?;
                let mut items = Vec::with_capacity(length.min(self.remaining()));
                for _ in 0..length {
                    items.push(self.read_term_at(depth + 1)?);
                }
                self.read_nil()?;
                ErlangTerm::list(items)
            }
            tag::STRING_EXT => {
                self.position += 1;
                let length = self.read_u16()? as usize;
                let bytes = self.read_body(length)?;
                ErlangTerm::list(bytes.iter().map(|&b| ErlangTerm::Integer(b as i64)).collect())
            }
            other => return Err(ErlangError::UnsupportedTag(other)),
        };
        Ok(term)
    }
}

/// Decodes a single top-level term. The whole buffer must be consumed.
pub fn decode(bytes: &[u8]) -> Result<ErlangTerm, ErlangError> {
    let mut decoder = TermDecoder::new(bytes);
    decoder.read_version()?;
    let term = decoder.read_term()?;
    match decoder.remaining() {
        0 => Ok(term),
        n => Err(ErlangError::TrailingBytes(n)),
    }
}
