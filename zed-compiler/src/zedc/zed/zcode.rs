//! Length-prefixed, tagged binary encoding of Zed values.
//!
//! Every value is a uvarint tag followed by its body. A tag of zero marks a
//! null value; otherwise the tag is the body length plus one. Container
//! bodies are the concatenation of their encoded children.

use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZcodeError {
    #[error("zcode: truncated tag")]
    TruncatedTag,
    #[error("zcode: body of {want} bytes exceeds remaining {have}")]
    TruncatedBody { want: usize, have: usize },
    #[error("zcode: uvarint overflow")]
    Overflow,
}

pub fn append_uvarint(dst: &mut Vec<u8>, mut u: u64) {
    while u >= 0x80 {
        dst.push((u as u8) | 0x80);
        u >>= 7;
    }
    dst.push(u as u8);
}

pub fn read_uvarint(src: &[u8]) -> Result<(u64, usize), ZcodeError> {
    let mut x = 0u64;
    let mut shift = 0u32;
    for (i, &b) in src.iter().enumerate() {
        if shift >= 64 {
            return Err(ZcodeError::Overflow);
        }
        x |= u64::from(b & 0x7f) << shift;
        if b < 0x80 {
            return Ok((x, i + 1));
        }
        shift += 7;
    }
    Err(ZcodeError::TruncatedTag)
}

/// Appends a tagged value. `None` encodes null.
pub fn append(dst: &mut Vec<u8>, body: Option<&[u8]>) {
    match body {
        None => append_uvarint(dst, 0),
        Some(b) => {
            append_uvarint(dst, b.len() as u64 + 1);
            dst.extend_from_slice(b);
        }
    }
}

/// Little-endian with trailing zero bytes trimmed; zero encodes as empty.
pub fn encode_uint(mut u: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    while u != 0 {
        out.push(u as u8);
        u >>= 8;
    }
    out
}

pub fn decode_uint(b: &[u8]) -> u64 {
    b.iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &byte)| acc | (u64::from(byte) << (8 * i)))
}

pub fn encode_int(i: i64) -> Vec<u8> {
    encode_uint(((i << 1) ^ (i >> 63)) as u64)
}

pub fn decode_int(b: &[u8]) -> i64 {
    let u = decode_uint(b);
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

pub fn encode_float64(f: f64) -> Vec<u8> {
    f.to_le_bytes().to_vec()
}

pub fn decode_float64(b: &[u8]) -> Option<f64> {
    let bytes: [u8; 8] = b.try_into().ok()?;
    Some(f64::from_le_bytes(bytes))
}

pub fn encode_float32(f: f32) -> Vec<u8> {
    f.to_le_bytes().to_vec()
}

pub fn encode_float16(f: f32) -> Vec<u8> {
    f32_to_f16_bits(f).to_le_bytes().to_vec()
}

fn f32_to_f16_bits(f: f32) -> u16 {
    let bits = f.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let man = bits & 0x007f_ffff;
    if exp == 0xff {
        let nan = if man != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }
    let e = exp - 127 + 15;
    if e >= 0x1f {
        return sign | 0x7c00;
    }
    if e <= 0 {
        if e < -10 {
            return sign;
        }
        let m = (man | 0x0080_0000) >> (1 - e);
        return sign | ((m + 0x1000) >> 13) as u16;
    }
    sign | (((e as u32) << 10) + ((man + 0x1000) >> 13)) as u16
}

pub fn encode_bool(b: bool) -> Vec<u8> {
    vec![u8::from(b)]
}

pub fn encode_ip(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Network address followed by its mask, both in address width.
pub fn encode_net(addr: IpAddr, prefix: u8) -> Vec<u8> {
    let mut out = encode_ip(addr);
    let width = out.len();
    let mut mask = vec![0u8; width];
    for (i, byte) in mask.iter_mut().enumerate() {
        let bits = (prefix as usize).saturating_sub(i * 8).min(8);
        *byte = if bits == 0 { 0 } else { 0xffu8 << (8 - bits) };
    }
    for (b, m) in out.iter_mut().zip(&mask) {
        *b &= m;
    }
    out.extend(mask);
    out
}

/// Incrementally builds a sequence of tagged values with nested containers.
#[derive(Debug, Default)]
pub struct Builder {
    bytes: Vec<u8>,
    containers: Vec<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_container(&mut self) {
        self.containers.push(self.bytes.len());
    }

    /// Closes the innermost open container. Unbalanced calls are ignored.
    pub fn end_container(&mut self) {
        if let Some(start) = self.containers.pop() {
            let body = self.bytes.split_off(start);
            append(&mut self.bytes, Some(&body));
        }
    }

    pub fn append(&mut self, body: Option<&[u8]>) {
        append(&mut self.bytes, body);
    }

    pub fn append_uint(&mut self, u: u64) {
        self.append(Some(&encode_uint(u)));
    }

    pub fn append_int(&mut self, i: i64) {
        self.append(Some(&encode_int(i)));
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Iterates the tagged values of a container body.
pub struct Iter<'a> {
    bytes: &'a [u8],
}

impl<'a> Iter<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn done(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<Option<&'a [u8]>, ZcodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.is_empty() {
            return None;
        }
        let (tag, n) = match read_uvarint(self.bytes) {
            Ok(v) => v,
            Err(e) => {
                self.bytes = &[];
                return Some(Err(e));
            }
        };
        self.bytes = &self.bytes[n..];
        if tag == 0 {
            return Some(Ok(None));
        }
        let len = (tag - 1) as usize;
        if len > self.bytes.len() {
            let err = ZcodeError::TruncatedBody {
                want: len,
                have: self.bytes.len(),
            };
            self.bytes = &[];
            return Some(Err(err));
        }
        let (body, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some(Ok(Some(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ints_zigzag() {
        for i in [0i64, 1, -1, 63, -64, i64::MIN, i64::MAX] {
            assert_eq!(decode_int(&encode_int(i)), i);
        }
        assert!(encode_uint(0).is_empty());
        assert_eq!(encode_uint(256), vec![0, 1]);
    }

    #[test]
    fn nested_containers() {
        let mut b = Builder::new();
        b.begin_container();
        b.append_int(1);
        b.append(None);
        b.begin_container();
        b.append(Some(b"hi"));
        b.end_container();
        b.end_container();
        let bytes = b.into_bytes();

        let mut outer = Iter::new(&bytes);
        let body = outer.next().unwrap().unwrap().unwrap();
        assert!(outer.next().is_none());
        let elems: Vec<_> = Iter::new(body).collect::<Result<_, _>>().unwrap();
        assert_eq!(elems.len(), 3);
        assert_eq!(decode_int(elems[0].unwrap()), 1);
        assert_eq!(elems[1], None);
        let inner: Vec<_> = Iter::new(elems[2].unwrap()).collect::<Result<_, _>>().unwrap();
        assert_eq!(inner, vec![Some(&b"hi"[..])]);
    }

    #[test]
    fn truncated_body_is_an_error() {
        let bytes = [5u8, 1];
        let mut it = Iter::new(&bytes);
        assert!(matches!(
            it.next(),
            Some(Err(ZcodeError::TruncatedBody { .. }))
        ));
        assert!(it.next().is_none());
    }

    #[test]
    fn net_masks_address() {
        let enc = encode_net(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3)), 12);
        assert_eq!(enc, vec![10, 0, 0, 0, 255, 240, 0, 0]);
    }

    #[test]
    fn float16_known_values() {
        assert_eq!(encode_float16(1.0), vec![0x00, 0x3c]);
        assert_eq!(encode_float16(-2.0), vec![0x00, 0xc0]);
    }
}
