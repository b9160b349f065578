use crate::zedc::zson::ZsonError;
use std::io::Read;

pub const READ_SIZE: usize = 64 * 1024;
pub const MAX_SIZE: usize = 50 * 1024 * 1024;

/// A buffered scanner over ZSON text.
///
/// Offsets passed between the scanning helpers are relative to the cursor;
/// the buffer is compacted only when refilled, so those offsets stay valid
/// until the token is consumed.
pub struct Lexer<R> {
    reader: R,
    buf: Vec<u8>,
    cursor: usize,
    eof: bool,
    max_size: usize,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_size(reader, MAX_SIZE)
    }

    pub fn with_max_size(reader: R, max_size: usize) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_SIZE),
            cursor: 0,
            eof: false,
            max_size,
        }
    }

    fn fill(&mut self) -> Result<bool, ZsonError> {
        if self.eof {
            return Ok(false);
        }
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
        if self.buf.len() >= self.max_size {
            return Err(ZsonError::BufferOverflow);
        }
        let old = self.buf.len();
        let want = READ_SIZE.min(self.max_size - old);
        self.buf.resize(old + want, 0);
        let n = loop {
            match self.reader.read(&mut self.buf[old..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buf.truncate(old);
                    return Err(e.into());
                }
            }
        };
        self.buf.truncate(old + n);
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }

    fn ensure(&mut self, n: usize) -> Result<bool, ZsonError> {
        while self.cursor + n > self.buf.len() {
            if !self.fill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn byte_at(&mut self, off: usize) -> Result<Option<u8>, ZsonError> {
        if !self.ensure(off + 1)? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.cursor + off]))
    }

    /// Decodes the character at `off`, returning it with its encoded width.
    pub fn char_at(&mut self, off: usize) -> Result<Option<(char, usize)>, ZsonError> {
        let Some(first) = self.byte_at(off)? else {
            return Ok(None);
        };
        let width = match first {
            0x00..=0x7f => return Ok(Some((first as char, 1))),
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => return Ok(Some((char::REPLACEMENT_CHARACTER, 1))),
        };
        if !self.ensure(off + width)? {
            return Ok(Some((char::REPLACEMENT_CHARACTER, 1)));
        }
        let start = self.cursor + off;
        match std::str::from_utf8(&self.buf[start..start + width]) {
            Ok(s) => Ok(s.chars().next().map(|c| (c, width))),
            Err(_) => Ok(Some((char::REPLACEMENT_CHARACTER, 1))),
        }
    }

    pub fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.buf.len());
    }

    fn starts_with(&mut self, off: usize, s: &[u8]) -> Result<bool, ZsonError> {
        if !self.ensure(off + s.len())? {
            return Ok(false);
        }
        let start = self.cursor + off;
        Ok(&self.buf[start..start + s.len()] == s)
    }

    /// Skips whitespace (including Unicode spaces) and comments.
    pub fn skip_space(&mut self) -> Result<(), ZsonError> {
        loop {
            let Some((c, w)) = self.char_at(0)? else {
                return Ok(());
            };
            if c.is_whitespace() {
                self.advance(w);
                continue;
            }
            if self.starts_with(0, b"//")? {
                self.advance(2);
                while let Some(b) = self.byte_at(0)? {
                    self.advance(1);
                    if b == b'\n' {
                        break;
                    }
                }
                continue;
            }
            if self.starts_with(0, b"/*")? {
                self.advance(2);
                loop {
                    if self.starts_with(0, b"*/")? {
                        self.advance(2);
                        break;
                    }
                    if self.byte_at(0)?.is_none() {
                        return Ok(());
                    }
                    self.advance(1);
                }
                continue;
            }
            return Ok(());
        }
    }

    /// Next significant byte without consuming it. `None` at end of input.
    pub fn peek(&mut self) -> Result<Option<u8>, ZsonError> {
        self.skip_space()?;
        self.byte_at(0)
    }

    pub fn at_eof(&mut self) -> Result<bool, ZsonError> {
        Ok(self.peek()?.is_none())
    }

    pub fn match_byte(&mut self, b: u8) -> Result<bool, ZsonError> {
        self.skip_space()?;
        self.match_tight(b)
    }

    /// Matches `b` at the cursor without skipping space first.
    pub fn match_tight(&mut self, b: u8) -> Result<bool, ZsonError> {
        if self.byte_at(0)? == Some(b) {
            self.advance(1);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn match_bytes(&mut self, s: &[u8]) -> Result<bool, ZsonError> {
        self.skip_space()?;
        if self.starts_with(0, s)? {
            self.advance(s.len());
            return Ok(true);
        }
        Ok(false)
    }

    /// Peeks at `s` after space without consuming it.
    pub fn peek_bytes(&mut self, s: &[u8]) -> Result<bool, ZsonError> {
        self.skip_space()?;
        self.starts_with(0, s)
    }

    /// Scans a double-quoted string at the cursor and returns its unescaped body.
    pub fn scan_string(&mut self) -> Result<String, ZsonError> {
        self.skip_space()?;
        if !self.match_tight(b'"')? {
            return Err(syntax("mismatched string quotes"));
        }
        let mut out = String::new();
        loop {
            let Some((c, w)) = self.char_at(0)? else {
                return Err(syntax("no end quote"));
            };
            self.advance(w);
            match c {
                '"' => return Ok(out),
                '\n' => return Err(syntax("unescaped line break")),
                '\\' => self.scan_escape(&mut out)?,
                c if (c as u32) < 0x20 => return Err(syntax("illegal control code")),
                c => out.push(c),
            }
        }
    }

    fn scan_escape(&mut self, out: &mut String) -> Result<(), ZsonError> {
        let Some(b) = self.byte_at(0)? else {
            return Err(syntax("no end quote"));
        };
        self.advance(1);
        match b {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{8}'),
            b'f' => out.push('\u{c}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let hi = self.scan_hex4()?;
                if (0xd800..0xdc00).contains(&hi) && self.starts_with(0, b"\\u")? {
                    self.advance(2);
                    let lo = self.scan_hex4()?;
                    let combined = 0x10000 + ((hi - 0xd800) << 10) + (lo.wrapping_sub(0xdc00) & 0x3ff);
                    out.push(char::from_u32(combined).unwrap_or(char::REPLACEMENT_CHARACTER));
                } else {
                    out.push(char::from_u32(hi).unwrap_or(char::REPLACEMENT_CHARACTER));
                }
            }
            other => {
                return Err(syntax(format!("illegal escape (\\{})", other as char)));
            }
        }
        Ok(())
    }

    fn scan_hex4(&mut self) -> Result<u32, ZsonError> {
        if !self.ensure(4)? {
            return Err(syntax("short \\u escape"));
        }
        let start = self.cursor;
        let digits = &self.buf[start..start + 4];
        if !digits.iter().all(u8::is_ascii_hexdigit) {
            return Err(syntax("invalid hex digits in \\u escape"));
        }
        let text = std::str::from_utf8(digits)
            .map_err(|_| syntax("invalid hex digits in \\u escape"))?;
        let v = u32::from_str_radix(text, 16)
            .map_err(|_| syntax("invalid hex digits in \\u escape"))?;
        self.advance(4);
        Ok(v)
    }

    /// Scans a backtick string. A `=>` prefix keeps indentation verbatim;
    /// otherwise indentation following each newline is dropped along with a
    /// leading newline.
    pub fn scan_backtick(&mut self) -> Result<String, ZsonError> {
        self.skip_space()?;
        let keep_indent = self.starts_with(0, b"=>`")?;
        if keep_indent {
            self.advance(2);
        }
        if !self.match_tight(b'`')? {
            return Err(syntax("mismatched string backticks"));
        }
        let mut raw = String::new();
        loop {
            let Some((c, w)) = self.char_at(0)? else {
                return Err(syntax("unterminated backtick string"));
            };
            self.advance(w);
            if c == '`' {
                break;
            }
            raw.push(c);
        }
        if keep_indent {
            return Ok(raw);
        }
        let mut out = String::with_capacity(raw.len());
        let mut lines = raw.split('\n');
        if let Some(first) = lines.next() {
            out.push_str(first);
        }
        for line in lines {
            out.push('\n');
            out.push_str(line.trim_start_matches([' ', '\t']));
        }
        Ok(out.strip_prefix('\n').map(str::to_string).unwrap_or(out))
    }

    fn scan_while(&mut self, mut accept: impl FnMut(char, usize) -> bool) -> Result<String, ZsonError> {
        let mut out = String::new();
        let mut off = 0;
        while let Some((c, w)) = self.char_at(off)? {
            if !accept(c, out.len()) {
                break;
            }
            out.push(c);
            off += w;
        }
        self.advance(off);
        Ok(out)
    }

    pub fn scan_identifier(&mut self) -> Result<String, ZsonError> {
        self.skip_space()?;
        let id = self.scan_while(|c, n| {
            c == '_' || c == '$' || c.is_alphabetic() || (n > 0 && c.is_ascii_digit())
        })?;
        if id.is_empty() {
            return Err(syntax("malformed identifier"));
        }
        Ok(id)
    }

    /// Type names may also contain dots and start with digits (numeric typedefs).
    pub fn scan_type_name(&mut self) -> Result<Option<String>, ZsonError> {
        self.skip_space()?;
        if self.byte_at(0)? == Some(b'"') {
            return self.scan_string().map(Some);
        }
        let name = self.scan_while(|c, _| {
            c == '_' || c == '$' || c == '.' || c.is_alphanumeric()
        })?;
        Ok((!name.is_empty()).then_some(name))
    }

    /// Scans the text of a primitive value without classifying it.
    ///
    /// Colons are kept only when the whole token reads as an address or a
    /// timestamp, so map keys like `1:2` split at the colon.
    pub fn scan_primitive(&mut self) -> Result<Option<String>, ZsonError> {
        self.skip_space()?;
        let mut out = String::new();
        let mut off = 0;
        while let Some((c, w)) = self.char_at(off)? {
            let accepted = match c {
                ':' => {
                    let next = self.byte_at(off + 1)?;
                    out.ends_with(':')
                        || matches!(next, Some(b) if b.is_ascii_hexdigit() || b == b':')
                }
                c => c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_' | '/' | 'µ'),
            };
            if !accepted {
                break;
            }
            out.push(c);
            off += w;
        }
        if let Some(colon) = out.find(':') {
            if !colon_token(&out) {
                out.truncate(colon);
                off = colon;
            }
        }
        self.advance(off);
        Ok((!out.is_empty()).then_some(out))
    }
}

/// True for tokens that legitimately contain colons: IPv6 addresses and
/// networks, and RFC 3339 timestamps.
fn colon_token(s: &str) -> bool {
    let addr = s.split_once('/').map(|(a, _)| a).unwrap_or(s);
    addr.parse::<std::net::Ipv6Addr>().is_ok()
        || (s.contains('T') && s.as_bytes().first().is_some_and(u8::is_ascii_digit))
}

fn syntax(msg: impl Into<String>) -> ZsonError {
    ZsonError::Syntax(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(s: &str) -> Lexer<&[u8]> {
        Lexer::new(s.as_bytes())
    }

    #[test]
    fn strings_and_escapes() {
        let mut l = lexer(r#"  "a\tb\u00e9\ud83d\ude00" "#);
        assert_eq!(l.scan_string().unwrap(), "a\tb\u{e9}\u{1F600}");
        assert!(l.at_eof().unwrap());
    }

    #[test]
    fn string_errors() {
        let cases = [
            ("\"abc", "no end quote"),
            ("\"a\nb\"", "unescaped line break"),
            ("\"a\\qb\"", "illegal escape (\\q)"),
            ("\"\\u12zz\"", "invalid hex digits in \\u escape"),
            ("\"\\u1", "short \\u escape"),
            ("\"a\u{1}\"", "illegal control code"),
        ];
        for (input, want) in cases {
            let err = lexer(input).scan_string().unwrap_err();
            assert_eq!(err.to_string(), want, "input {input:?}");
        }
    }

    #[test]
    fn comments_and_unicode_space() {
        let mut l = lexer("// line\n /* block */\u{2003}x");
        assert_eq!(l.peek().unwrap(), Some(b'x'));
    }

    #[test]
    fn backticks() {
        let mut l = lexer("`\n    a\n    b`");
        assert_eq!(l.scan_backtick().unwrap(), "a\nb");
        let mut l = lexer("=>`\n  a`");
        assert_eq!(l.scan_backtick().unwrap(), "\n  a");
        assert_eq!(
            lexer("`abc").scan_backtick().unwrap_err().to_string(),
            "unterminated backtick string"
        );
    }

    #[test]
    fn primitives_split_on_map_colon() {
        let mut l = lexer("1:2");
        assert_eq!(l.scan_primitive().unwrap().as_deref(), Some("1"));
        let mut l = lexer("::1 ");
        assert_eq!(l.scan_primitive().unwrap().as_deref(), Some("::1"));
        let mut l = lexer("2021-01-02T03:04:05Z,");
        assert_eq!(
            l.scan_primitive().unwrap().as_deref(),
            Some("2021-01-02T03:04:05Z")
        );
        let mut l = lexer("fe80::1/64}");
        assert_eq!(l.scan_primitive().unwrap().as_deref(), Some("fe80::1/64"));
    }

    #[test]
    fn identifiers() {
        assert_eq!(lexer(" $a_1 ").scan_identifier().unwrap(), "$a_1");
        assert_eq!(
            lexer("1a").scan_identifier().unwrap_err().to_string(),
            "malformed identifier"
        );
        assert_eq!(
            lexer("ns.port=").scan_type_name().unwrap().as_deref(),
            Some("ns.port")
        );
    }

    #[test]
    fn overflow() {
        let big = "x".repeat(100);
        let mut l = Lexer::with_max_size(big.as_bytes(), 16);
        let err = l.scan_identifier().unwrap_err();
        assert_eq!(err, ZsonError::BufferOverflow);
    }
}
