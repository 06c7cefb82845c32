//! Message options.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::ops::RangeInclusive;

use bytes::Bytes;
use itertools::Itertools;

/// Option numbers known by this crate.
pub mod number {
    pub const IF_MATCH: u16 = 1;
    pub const URI_HOST: u16 = 3;
    pub const ETAG: u16 = 4;
    pub const IF_NONE_MATCH: u16 = 5;
    pub const OBSERVE: u16 = 6;
    pub const URI_PORT: u16 = 7;
    pub const LOCATION_PATH: u16 = 8;
    pub const URI_PATH: u16 = 11;
    pub const CONTENT_FORMAT: u16 = 12;
    pub const MAX_AGE: u16 = 14;
    pub const URI_QUERY: u16 = 15;
    pub const ACCEPT: u16 = 17;
    pub const LOCATION_QUERY: u16 = 20;
    pub const PROXY_URI: u16 = 35;
    pub const PROXY_SCHEME: u16 = 39;
    pub const SIZE1: u16 = 60;
}

/// Largest option value the wire format can carry.
pub const MAX_OPTION_LEN: usize = 65535 + 269;

/// Returns the value length allowed for the option `number`.
pub fn value_len_bounds(number: u16) -> RangeInclusive<usize> {
    match number {
        number::IF_MATCH => 0..=8,
        number::URI_HOST => 1..=255,
        number::ETAG => 1..=8,
        number::IF_NONE_MATCH => 0..=0,
        number::OBSERVE => 0..=3,
        number::URI_PORT => 0..=2,
        number::LOCATION_PATH => 0..=255,
        number::URI_PATH => 0..=255,
        number::CONTENT_FORMAT => 0..=2,
        number::MAX_AGE => 0..=4,
        number::URI_QUERY => 0..=255,
        number::ACCEPT => 0..=2,
        number::LOCATION_QUERY => 0..=255,
        number::PROXY_URI => 1..=1034,
        number::PROXY_SCHEME => 1..=255,
        number::SIZE1 => 0..=4,
        _ => 0..=MAX_OPTION_LEN,
    }
}

/// The options of a message.
///
/// Values are grouped by option number in ascending order; repeated values
/// for the same number keep the order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: BTreeMap<u16, Vec<Bytes>>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of option values.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn contains(&self, number: u16) -> bool {
        self.entries.contains_key(&number)
    }

    /// Appends a value for `number`, keeping the existing ones.
    pub fn push(&mut self, number: u16, value: impl Into<Bytes>) {
        self.entries.entry(number).or_default().push(value.into());
    }

    /// Sets `number` to a single value, replacing the existing ones.
    pub fn insert(&mut self, number: u16, value: impl Into<Bytes>) {
        self.entries.insert(number, vec![value.into()]);
    }

    /// Sets `number` to the given values, replacing the existing ones.
    ///
    /// An empty `values` removes the option.
    pub fn insert_all<I, V>(&mut self, number: u16, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Bytes>,
    {
        let values: Vec<Bytes> = values.into_iter().map(Into::into).collect();
        match self.entries.entry(number) {
            Entry::Occupied(mut entry) if !values.is_empty() => {
                entry.insert(values);
            }
            Entry::Occupied(entry) => {
                entry.remove();
            }
            Entry::Vacant(entry) if !values.is_empty() => {
                entry.insert(values);
            }
            Entry::Vacant(_) => (),
        }
    }

    pub fn remove(&mut self, number: u16) -> Option<Vec<Bytes>> {
        self.entries.remove(&number)
    }

    /// Returns the first value of `number`.
    pub fn get(&self, number: u16) -> Option<&Bytes> {
        self.entries.get(&number).and_then(|values| values.first())
    }

    /// Returns all values of `number`.
    pub fn get_all(&self, number: u16) -> &[Bytes] {
        self.entries
            .get(&number)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterates over every `(number, value)` pair in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Bytes)> {
        self.entries
            .iter()
            .flat_map(|(number, values)| values.iter().map(move |value| (*number, value)))
    }

    /// Returns the target path, built from the `Uri-Path` segments.
    ///
    /// Each segment is percent-encoded and the result has a leading `/`.
    pub fn path(&self) -> Option<String> {
        let segments = self.entries.get(&number::URI_PATH)?;
        let path = segments.iter().map(|s| percent_encode(s)).join("/");

        Some(format!("/{path}"))
    }

    /// Replaces the `Uri-Path` segments with the ones of `path`.
    ///
    /// A leading `/` is stripped and every `/`-separated segment is
    /// percent-decoded. Fails when a segment holds an invalid escape.
    pub fn set_path(&mut self, path: &str) -> Result<(), InvalidPercentEncoding> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let segments = path
            .split('/')
            .map(percent_decode)
            .collect::<Result<Vec<_>, _>>()?;

        self.insert_all(number::URI_PATH, segments);

        Ok(())
    }

    pub fn host(&self) -> Option<String> {
        self.get(number::URI_HOST)
            .map(|host| String::from_utf8_lossy(host).into_owned())
    }

    pub fn set_host(&mut self, host: &str) {
        self.insert(number::URI_HOST, Bytes::copy_from_slice(host.as_bytes()));
    }

    pub fn port(&self) -> Option<u16> {
        self.get_uint(number::URI_PORT).map(|port| port as u16)
    }

    pub fn set_port(&mut self, port: u16) {
        self.set_uint(number::URI_PORT, port as u32);
    }

    pub fn content_format(&self) -> Option<u16> {
        self.get_uint(number::CONTENT_FORMAT)
            .map(|format| format as u16)
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.set_uint(number::CONTENT_FORMAT, format as u32);
    }

    pub fn observe(&self) -> Option<u32> {
        self.get_uint(number::OBSERVE)
    }

    pub fn set_observe(&mut self, counter: u32) {
        self.set_uint(number::OBSERVE, counter & 0x00ff_ffff);
    }

    /// Reads the first value of `number` as an unsigned integer.
    pub fn get_uint(&self, number: u16) -> Option<u32> {
        self.get(number).map(|value| decode_uint(value))
    }

    /// Sets `number` to `value` using the shortest big-endian encoding.
    pub fn set_uint(&mut self, number: u16, value: u32) {
        self.insert(number, encode_uint(value));
    }
}

impl FromIterator<(u16, Bytes)> for Options {
    fn from_iter<T: IntoIterator<Item = (u16, Bytes)>>(iter: T) -> Self {
        let mut options = Options::new();
        for (number, value) in iter {
            options.push(number, value);
        }
        options
    }
}

/// Encodes `value` as a big-endian unsigned integer without leading zeros.
pub fn encode_uint(value: u32) -> Bytes {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();

    Bytes::copy_from_slice(&bytes[skip..])
}

/// Decodes a big-endian unsigned integer, ignoring bytes beyond the fourth.
pub fn decode_uint(value: &[u8]) -> u32 {
    value
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

/// A path segment contained a malformed `%` escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPercentEncoding;

impl std::fmt::Display for InvalidPercentEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("invalid percent-encoding in path")
    }
}

impl std::error::Error for InvalidPercentEncoding {}

impl From<InvalidPercentEncoding> for crate::Error {
    fn from(value: InvalidPercentEncoding) -> Self {
        Self::PreparationError(value.to_string())
    }
}

#[inline(always)]
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}

/// Percent-encodes a path segment.
pub fn percent_encode(segment: &[u8]) -> String {
    let mut out = String::with_capacity(segment.len());
    for &b in segment {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Decodes the `%XX` escapes of a path segment.
pub fn percent_decode(segment: &str) -> Result<Vec<u8>, InvalidPercentEncoding> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(InvalidPercentEncoding)?;
            let hex = std::str::from_utf8(hex).map_err(|_| InvalidPercentEncoding)?;
            let byte = u8::from_str_radix(hex, 16).map_err(|_| InvalidPercentEncoding)?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Ok(out)
}
