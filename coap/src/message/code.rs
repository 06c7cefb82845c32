use std::fmt;

/// The code of a message.
///
/// Stored in the protocol-native layout `class * 32 + detail`. Codes below
/// `32` are request methods, codes from `32` upwards are responses and `0`
/// is the empty code used by bare acknowledgements, resets and pings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Code(pub u8);

impl Code {
    /// `0.00` Empty.
    pub const EMPTY: Code = Code(0);
    /// `0.01` GET.
    pub const GET: Code = Code(1);
    /// `0.02` POST.
    pub const POST: Code = Code(2);
    /// `0.03` PUT.
    pub const PUT: Code = Code(3);
    /// `0.04` DELETE.
    pub const DELETE: Code = Code(4);
    /// `2.01` Created.
    pub const CREATED: Code = Code::new(2, 1);
    /// `2.02` Deleted.
    pub const DELETED: Code = Code::new(2, 2);
    /// `2.03` Valid.
    pub const VALID: Code = Code::new(2, 3);
    /// `2.04` Changed.
    pub const CHANGED: Code = Code::new(2, 4);
    /// `2.05` Content.
    pub const CONTENT: Code = Code::new(2, 5);
    /// `4.00` Bad Request.
    pub const BAD_REQUEST: Code = Code::new(4, 0);
    /// `4.04` Not Found.
    pub const NOT_FOUND: Code = Code::new(4, 4);
    /// `4.05` Method Not Allowed.
    pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
    /// `5.00` Internal Server Error.
    pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
    /// `5.01` Not Implemented.
    pub const NOT_IMPLEMENTED: Code = Code::new(5, 1);

    /// Builds a code from its class and detail parts.
    pub const fn new(class: u8, detail: u8) -> Self {
        Self((class << 5) | (detail & 0x1f))
    }

    /// Converts an HTTP-style code (`class * 100 + detail`) into a code.
    ///
    /// Returns `None` when the value does not fit the native layout.
    pub const fn from_http(code: u16) -> Option<Self> {
        let class = code / 100;
        let detail = code % 100;
        if class > 7 || detail > 31 {
            return None;
        }
        Some(Self::new(class as u8, detail as u8))
    }

    /// Converts the code into the HTTP-style `class * 100 + detail` form.
    pub const fn to_http(self) -> u16 {
        self.class() as u16 * 100 + self.detail() as u16
    }

    #[inline]
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    #[inline]
    pub const fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_request(self) -> bool {
        self.0 > 0 && self.0 < 32
    }

    pub const fn is_response(self) -> bool {
        self.0 >= 32
    }

    /// Returns the method name for request codes.
    pub fn method_name(self) -> Option<&'static str> {
        match self {
            Code::GET => Some("GET"),
            Code::POST => Some("POST"),
            Code::PUT => Some("PUT"),
            Code::DELETE => Some("DELETE"),
            _ => None,
        }
    }
}

impl From<u8> for Code {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Code> for u8 {
    fn from(value: Code) -> Self {
        value.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.method_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}.{:02}", self.class(), self.detail()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_code_matches_http_205() {
        assert_eq!(Code::from_http(205), Some(Code::CONTENT));
        assert_eq!(Code::CONTENT.as_u8(), 69);
        assert_eq!(Code::CONTENT.to_http(), 205);
    }

    #[test]
    fn test_http_conversion_is_bidirectional() {
        for http in [100, 201, 202, 203, 204, 205, 231, 400, 404, 405, 500, 501, 731] {
            let code = Code::from_http(http).unwrap();
            assert_eq!(code.to_http(), http);
        }
        assert_eq!(Code::from_http(432), None);
        assert_eq!(Code::from_http(800), None);
    }

    #[test]
    fn test_request_and_response_ranges() {
        assert!(!Code::EMPTY.is_request());
        assert!(!Code::EMPTY.is_response());
        assert!(Code::EMPTY.is_empty());
        assert!(Code::GET.is_request());
        assert!(Code(31).is_request());
        assert!(Code(32).is_response());
        assert!(Code::NOT_FOUND.is_response());
    }

    #[test]
    fn test_display_uses_dotted_form_for_responses() {
        assert_eq!(Code::CONTENT.to_string(), "2.05");
        assert_eq!(Code::NOT_FOUND.to_string(), "4.04");
        assert_eq!(Code::EMPTY.to_string(), "0.00");
        assert_eq!(Code::GET.to_string(), "GET");
    }
}
