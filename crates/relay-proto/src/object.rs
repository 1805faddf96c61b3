//! Typed-object wire format used by the relay protocol.
//!
//! Every value on the wire is introduced by a 3-byte ASCII type code followed
//! by a type-specific payload. Inside composite values (hashtables, hdata
//! items) the types are declared up front and the payloads are written bare,
//! so encoding and decoding are driven by [`TypeCode`].

use bytes::{BufMut, BytesMut};

use crate::error::{ProtocolError, Result};

/// The 3-byte object type codes of the relay protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    /// `chr` - a single byte.
    Char,
    /// `int` - 32-bit big-endian signed integer.
    Int,
    /// `lon` - length-prefixed ASCII decimal integer.
    Long,
    /// `str` - 32-bit length-prefixed UTF-8 string (`-1` means null).
    Str,
    /// `buf` - 32-bit length-prefixed raw bytes (`-1` means null).
    Buf,
    /// `ptr` - length-prefixed ASCII hex pointer (no `0x` on the wire).
    Ptr,
    /// `tim` - length-prefixed ASCII decimal seconds since epoch.
    Time,
    /// `htb` - typed associative table.
    Hashtable,
    /// `hda` - typed tabular data with a declared key schema.
    Hdata,
    /// `inf` - a name/value string pair.
    Info,
}

impl TypeCode {
    /// The 3-byte wire representation of this type code.
    pub fn as_bytes(self) -> &'static [u8; 3] {
        match self {
            TypeCode::Char => b"chr",
            TypeCode::Int => b"int",
            TypeCode::Long => b"lon",
            TypeCode::Str => b"str",
            TypeCode::Buf => b"buf",
            TypeCode::Ptr => b"ptr",
            TypeCode::Time => b"tim",
            TypeCode::Hashtable => b"htb",
            TypeCode::Hdata => b"hda",
            TypeCode::Info => b"inf",
        }
    }

    /// Parse a 3-byte wire type code.
    pub fn from_bytes(code: &[u8; 3]) -> Result<Self> {
        match code {
            b"chr" => Ok(TypeCode::Char),
            b"int" => Ok(TypeCode::Int),
            b"lon" => Ok(TypeCode::Long),
            b"str" => Ok(TypeCode::Str),
            b"buf" => Ok(TypeCode::Buf),
            b"ptr" => Ok(TypeCode::Ptr),
            b"tim" => Ok(TypeCode::Time),
            b"htb" => Ok(TypeCode::Hashtable),
            b"hda" => Ok(TypeCode::Hdata),
            b"inf" => Ok(TypeCode::Info),
            other => Err(ProtocolError::UnknownType(*other)),
        }
    }

    /// Parse a type name as used in hdata key declarations (`number:int`).
    pub fn from_name(name: &str) -> Result<Self> {
        let bytes: &[u8] = name.as_bytes();
        let code: [u8; 3] = bytes
            .try_into()
            .map_err(|_| ProtocolError::UnknownType([0, 0, 0]))?;
        Self::from_bytes(&code)
    }
}

/// A single relay protocol value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    /// A single byte (`chr`).
    Char(u8),
    /// 32-bit signed integer (`int`).
    Int(i32),
    /// 64-bit signed integer (`lon`).
    Long(i64),
    /// Possibly-null UTF-8 string (`str`).
    Str(Option<String>),
    /// Possibly-null raw bytes (`buf`).
    Buf(Option<Vec<u8>>),
    /// Opaque pointer, carried in canonical `0x`-prefixed form (`ptr`).
    Ptr(String),
    /// Seconds since the Unix epoch (`tim`).
    Time(i64),
    /// Typed associative table (`htb`).
    Hashtable(Hashtable),
    /// Typed tabular data (`hda`).
    Hdata(Hdata),
    /// Name/value info pair (`inf`).
    Info(String, String),
}

impl Object {
    /// A non-null string object.
    pub fn str(value: impl Into<String>) -> Self {
        Object::Str(Some(value.into()))
    }

    /// The wire type code of this value.
    pub fn type_code(&self) -> TypeCode {
        match self {
            Object::Char(_) => TypeCode::Char,
            Object::Int(_) => TypeCode::Int,
            Object::Long(_) => TypeCode::Long,
            Object::Str(_) => TypeCode::Str,
            Object::Buf(_) => TypeCode::Buf,
            Object::Ptr(_) => TypeCode::Ptr,
            Object::Time(_) => TypeCode::Time,
            Object::Hashtable(_) => TypeCode::Hashtable,
            Object::Hdata(_) => TypeCode::Hdata,
            Object::Info(_, _) => TypeCode::Info,
        }
    }

    /// Append the bare payload (no leading type code) to `buf`.
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Object::Char(v) => buf.put_u8(*v),
            Object::Int(v) => buf.put_i32(*v),
            Object::Long(v) => put_counted_digits(buf, *v),
            Object::Str(v) => put_str(buf, v.as_deref()),
            Object::Buf(v) => put_bytes(buf, v.as_deref()),
            Object::Ptr(v) => put_ptr(buf, v),
            Object::Time(v) => put_counted_digits(buf, *v),
            Object::Hashtable(v) => v.encode(buf),
            Object::Hdata(v) => v.encode(buf),
            Object::Info(name, value) => {
                put_str(buf, Some(name));
                put_str(buf, Some(value));
            }
        }
    }

    /// Decode the bare payload of a value whose type is already known.
    pub fn decode_payload(code: TypeCode, r: &mut Reader<'_>) -> Result<Object> {
        match code {
            TypeCode::Char => Ok(Object::Char(r.u8("chr")?)),
            TypeCode::Int => Ok(Object::Int(r.i32("int")?)),
            TypeCode::Long => Ok(Object::Long(read_counted_digits(r, "lon")?)),
            TypeCode::Str => Ok(Object::Str(read_str(r, "str")?)),
            TypeCode::Buf => Ok(Object::Buf(read_bytes(r, "buf")?)),
            TypeCode::Ptr => Ok(Object::Ptr(read_ptr(r)?)),
            TypeCode::Time => Ok(Object::Time(read_counted_digits(r, "tim")?)),
            TypeCode::Hashtable => Ok(Object::Hashtable(Hashtable::decode(r)?)),
            TypeCode::Hdata => Ok(Object::Hdata(Hdata::decode(r)?)),
            TypeCode::Info => {
                let name = read_str(r, "inf")?.unwrap_or_default();
                let value = read_str(r, "inf")?.unwrap_or_default();
                Ok(Object::Info(name, value))
            }
        }
    }
}

/// A typed associative table with homogeneous key and value types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hashtable {
    /// Declared key type.
    pub key_type: TypeCode,
    /// Declared value type.
    pub value_type: TypeCode,
    /// Key/value pairs in insertion order.
    pub entries: Vec<(Object, Object)>,
}

impl Hashtable {
    /// Build a string-keyed, string-valued table from pairs.
    pub fn str_str<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Hashtable {
            key_type: TypeCode::Str,
            value_type: TypeCode::Str,
            entries: pairs
                .into_iter()
                .map(|(k, v)| (Object::str(k), Object::str(v)))
                .collect(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(self.key_type.as_bytes());
        buf.put_slice(self.value_type.as_bytes());
        buf.put_i32(self.entries.len() as i32);
        for (key, value) in &self.entries {
            key.encode_payload(buf);
            value.encode_payload(buf);
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let key_type = TypeCode::from_bytes(r.code("htb key type")?)?;
        let value_type = TypeCode::from_bytes(r.code("htb value type")?)?;
        let count = r.i32("htb count")?;
        if count < 0 {
            return Err(ProtocolError::InvalidLength {
                what: "htb",
                len: count as i64,
            });
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key = Object::decode_payload(key_type, r)?;
            let value = Object::decode_payload(value_type, r)?;
            entries.push((key, value));
        }
        Ok(Hashtable {
            key_type,
            value_type,
            entries,
        })
    }
}

/// One row of an hdata table: the path pointers plus the declared values
/// in declared key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdataItem {
    /// One pointer per `/`-separated path segment.
    pub pointers: Vec<String>,
    /// Values positionally matching the parsed key declarations.
    pub values: Vec<Object>,
}

/// Typed tabular data with a declared schema.
///
/// Items are positional: values are stored in the order the `keys` string
/// declares them, never in an associative structure, because the wire
/// carries no per-value names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hdata {
    /// The hdata path, e.g. `buffer` or `line_data`.
    pub path: String,
    /// Comma-separated `name:type` key declarations.
    pub keys: String,
    /// The rows.
    pub items: Vec<HdataItem>,
}

impl Hdata {
    /// Parse the declared keys into `(name, type)` pairs.
    pub fn key_specs(&self) -> Result<Vec<(&str, TypeCode)>> {
        if self.keys.is_empty() {
            return Ok(Vec::new());
        }
        self.keys
            .split(',')
            .map(|spec| {
                let (name, type_name) = spec
                    .split_once(':')
                    .ok_or(ProtocolError::MalformedCommand("hdata keys"))?;
                Ok((name, TypeCode::from_name(type_name)?))
            })
            .collect()
    }

    /// Number of `/`-separated path segments (pointers per item).
    pub fn path_depth(&self) -> usize {
        self.path.split('/').count()
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_str(buf, Some(&self.path));
        put_str(buf, Some(&self.keys));
        buf.put_i32(self.items.len() as i32);
        for item in &self.items {
            for pointer in &item.pointers {
                put_ptr(buf, pointer);
            }
            for value in &item.values {
                value.encode_payload(buf);
            }
        }
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self> {
        let path = read_str(r, "hda path")?.unwrap_or_default();
        let keys = read_str(r, "hda keys")?.unwrap_or_default();
        let count = r.i32("hda count")?;
        if count < 0 {
            return Err(ProtocolError::InvalidLength {
                what: "hda",
                len: count as i64,
            });
        }

        let hdata = Hdata {
            path,
            keys,
            items: Vec::new(),
        };
        let specs = hdata.key_specs()?;
        let depth = hdata.path_depth();

        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let mut pointers = Vec::with_capacity(depth);
            for _ in 0..depth {
                pointers.push(read_ptr(r)?);
            }
            let mut values = Vec::with_capacity(specs.len());
            for (_, code) in &specs {
                values.push(Object::decode_payload(*code, r)?);
            }
            items.push(HdataItem { pointers, values });
        }

        Ok(Hdata { items, ..hdata })
    }
}

// --- primitive encode helpers ---

fn put_str(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        None => buf.put_i32(-1),
        Some(s) => {
            buf.put_i32(s.len() as i32);
            buf.put_slice(s.as_bytes());
        }
    }
}

fn put_bytes(buf: &mut BytesMut, value: Option<&[u8]>) {
    match value {
        None => buf.put_i32(-1),
        Some(b) => {
            buf.put_i32(b.len() as i32);
            buf.put_slice(b);
        }
    }
}

fn put_counted_digits(buf: &mut BytesMut, value: i64) {
    let digits = value.to_string();
    buf.put_u8(digits.len() as u8);
    buf.put_slice(digits.as_bytes());
}

fn put_ptr(buf: &mut BytesMut, value: &str) {
    let hex = value.strip_prefix("0x").unwrap_or(value);
    buf.put_u8(hex.len() as u8);
    buf.put_slice(hex.as_bytes());
}

// --- primitive decode helpers ---

/// Bounds-checked reader over a byte slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Wrap a slice for decoding.
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take `n` bytes, erroring with the decode context on underrun.
    pub fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::Truncated {
                what,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn i32(&mut self, what: &'static str) -> Result<i32> {
        let bytes = self.take(4, what)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Take a 3-byte type code.
    pub fn code(&mut self, what: &'static str) -> Result<&'a [u8; 3]> {
        let bytes = self.take(3, what)?;
        Ok(bytes.try_into().expect("take returned 3 bytes"))
    }
}

fn read_str(r: &mut Reader<'_>, what: &'static str) -> Result<Option<String>> {
    let len = r.i32(what)?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength {
            what,
            len: n as i64,
        }),
        n => {
            let bytes = r.take(n as usize, what)?;
            String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|_| ProtocolError::InvalidUtf8(what))
        }
    }
}

fn read_bytes(r: &mut Reader<'_>, what: &'static str) -> Result<Option<Vec<u8>>> {
    let len = r.i32(what)?;
    match len {
        -1 => Ok(None),
        n if n < 0 => Err(ProtocolError::InvalidLength {
            what,
            len: n as i64,
        }),
        n => Ok(Some(r.take(n as usize, what)?.to_vec())),
    }
}

fn read_counted_digits(r: &mut Reader<'_>, what: &'static str) -> Result<i64> {
    let len = r.u8(what)?;
    let digits = r.take(len as usize, what)?;
    let text = std::str::from_utf8(digits).map_err(|_| ProtocolError::InvalidNumber(what))?;
    text.parse().map_err(|_| ProtocolError::InvalidNumber(what))
}

fn read_ptr(r: &mut Reader<'_>) -> Result<String> {
    let len = r.u8("ptr")?;
    let hex = r.take(len as usize, "ptr")?;
    let text = std::str::from_utf8(hex).map_err(|_| ProtocolError::InvalidUtf8("ptr"))?;
    Ok(format!("0x{text}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(obj: &Object) -> Object {
        let mut buf = BytesMut::new();
        obj.encode_payload(&mut buf);
        let mut r = Reader::new(&buf);
        let decoded = Object::decode_payload(obj.type_code(), &mut r).expect("decode");
        assert_eq!(r.remaining(), 0, "trailing bytes after decode");
        decoded
    }

    #[test]
    fn str_encoding_variants() {
        let mut buf = BytesMut::new();
        Object::Str(None).encode_payload(&mut buf);
        assert_eq!(&buf[..], &(-1i32).to_be_bytes());

        buf.clear();
        Object::str("").encode_payload(&mut buf);
        assert_eq!(&buf[..], &0i32.to_be_bytes());

        buf.clear();
        Object::str("hi").encode_payload(&mut buf);
        assert_eq!(&buf[..], b"\x00\x00\x00\x02hi");
    }

    #[test]
    fn pointer_strips_prefix_on_wire() {
        let mut buf = BytesMut::new();
        Object::Ptr("0x1a2b".into()).encode_payload(&mut buf);
        assert_eq!(&buf[..], b"\x041a2b");

        let mut r = Reader::new(&buf);
        let decoded = Object::decode_payload(TypeCode::Ptr, &mut r).unwrap();
        assert_eq!(decoded, Object::Ptr("0x1a2b".into()));
    }

    #[test]
    fn long_negative_roundtrip() {
        assert_eq!(roundtrip(&Object::Long(-12345)), Object::Long(-12345));
        assert_eq!(
            roundtrip(&Object::Time(1700000000)),
            Object::Time(1700000000)
        );
    }

    #[test]
    fn hashtable_roundtrip_preserves_order() {
        let table = Object::Hashtable(Hashtable::str_str([("b", "2"), ("a", "1")]));
        assert_eq!(roundtrip(&table), table);
    }

    #[test]
    fn hdata_roundtrip_preserves_key_order() {
        let hdata = Object::Hdata(Hdata {
            path: "buffer".into(),
            keys: "number:int,name:str".into(),
            items: vec![HdataItem {
                pointers: vec!["0x1".into()],
                values: vec![Object::Int(1), Object::str("core.weechat")],
            }],
        });
        let decoded = roundtrip(&hdata);
        assert_eq!(decoded, hdata);
        if let Object::Hdata(h) = decoded {
            let specs = h.key_specs().unwrap();
            assert_eq!(specs[0], ("number", TypeCode::Int));
            assert_eq!(specs[1], ("name", TypeCode::Str));
        }
    }

    #[test]
    fn truncated_str_reports_missing_bytes() {
        let mut r = Reader::new(b"\x00\x00\x00\x08onl");
        match read_str(&mut r, "str") {
            Err(ProtocolError::Truncated { needed, .. }) => assert_eq!(needed, 5),
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
