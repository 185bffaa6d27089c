//! Class-file constant pool remapping
//!
//! Relocation only ever touches `CONSTANT_Utf8` payloads. Everything else
//! in the class file is copied verbatim, so constant indices, attribute
//! offsets and the bytecode itself never move.

use crate::error::{BuildError, BuildResult};
use crate::relocation::RelocationRuleSet;
use std::collections::HashSet;
use std::ops::Range;

const MAGIC: u32 = 0xCAFE_BABE;
const HEADER_LEN: usize = 10;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// A `CONSTANT_Utf8` entry and where its payload sits in the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utf8Constant {
    pub index: u16,
    payload: Range<usize>,
}

/// Parsed view over a class file's constant pool
#[derive(Debug)]
pub struct ConstantPool<'a> {
    bytes: &'a [u8],
    utf8: Vec<Utf8Constant>,
    module_names: HashSet<u16>,
}

struct Reader<'a> {
    path: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> BuildResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                BuildError::invalid_class(self.path, format!("truncated at offset {}", self.pos))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> BuildResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> BuildResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> BuildResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl<'a> ConstantPool<'a> {
    /// Parse the header and constant pool of a class file
    pub fn parse(path: &str, bytes: &'a [u8]) -> BuildResult<Self> {
        let mut reader = Reader {
            path,
            bytes,
            pos: 0,
        };

        if reader.u32()? != MAGIC {
            return Err(BuildError::invalid_class(path, "bad magic number"));
        }
        let _minor = reader.u16()?;
        let _major = reader.u16()?;
        let count = reader.u16()?;

        let mut utf8 = Vec::new();
        let mut module_names = HashSet::new();
        let mut index: u16 = 1;

        while index < count {
            let tag = reader.u8()?;
            let mut slots = 1;
            match tag {
                TAG_UTF8 => {
                    let len = reader.u16()? as usize;
                    let start = reader.pos;
                    reader.take(len)?;
                    utf8.push(Utf8Constant {
                        index,
                        payload: start..start + len,
                    });
                }
                TAG_CLASS | TAG_STRING | TAG_METHOD_TYPE | TAG_PACKAGE => {
                    reader.take(2)?;
                }
                TAG_MODULE => {
                    module_names.insert(reader.u16()?);
                }
                TAG_METHOD_HANDLE => {
                    reader.take(3)?;
                }
                TAG_INTEGER
                | TAG_FLOAT
                | TAG_FIELDREF
                | TAG_METHODREF
                | TAG_INTERFACE_METHODREF
                | TAG_NAME_AND_TYPE
                | TAG_DYNAMIC
                | TAG_INVOKE_DYNAMIC => {
                    reader.take(4)?;
                }
                TAG_LONG | TAG_DOUBLE => {
                    reader.take(8)?;
                    slots = 2;
                }
                other => {
                    return Err(BuildError::invalid_class(
                        path,
                        format!("unknown constant tag {} at index {}", other, index),
                    ));
                }
            }
            index = index.saturating_add(slots);
        }

        Ok(Self {
            bytes,
            utf8,
            module_names,
        })
    }

    /// Decoded `CONSTANT_Utf8` values; payloads that are not valid UTF-8 are skipped
    pub fn utf8_strings(&self) -> impl Iterator<Item = (u16, &'a str)> + '_ {
        let bytes: &'a [u8] = self.bytes;
        self.utf8.iter().filter_map(move |constant| {
            std::str::from_utf8(&bytes[constant.payload.clone()])
                .ok()
                .map(|value| (constant.index, value))
        })
    }
}

/// Rewrite every symbolic reference covered by a relocation rule.
///
/// Returns `None` when the class does not reference any relocated name, in
/// which case the original bytes are meant to be kept as they are.
pub fn remap_class(
    path: &str,
    bytes: &[u8],
    rules: &RelocationRuleSet,
) -> BuildResult<Option<Vec<u8>>> {
    if bytes.len() < HEADER_LEN {
        return Err(BuildError::invalid_class(path, "file too short"));
    }
    if rules.is_empty() {
        return Ok(None);
    }

    let pool = ConstantPool::parse(path, bytes)?;
    let mut out: Option<Vec<u8>> = None;
    let mut cursor = 0;

    for constant in &pool.utf8 {
        if pool.module_names.contains(&constant.index) {
            continue;
        }
        let Ok(value) = std::str::from_utf8(&bytes[constant.payload.clone()]) else {
            continue;
        };
        let Some(relocated) = remap_utf8(rules, value)? else {
            continue;
        };
        if relocated.len() > u16::MAX as usize {
            return Err(BuildError::invalid_class(
                path,
                format!("relocated constant #{} exceeds 65535 bytes", constant.index),
            ));
        }

        let buffer = out.get_or_insert_with(|| Vec::with_capacity(bytes.len() + 256));
        // the 2-byte length sits right before the payload
        let length_offset = constant.payload.start - 2;
        buffer.extend_from_slice(&bytes[cursor..length_offset]);
        buffer.extend_from_slice(&(relocated.len() as u16).to_be_bytes());
        buffer.extend_from_slice(relocated.as_bytes());
        cursor = constant.payload.end;
    }

    Ok(out.map(|mut buffer| {
        buffer.extend_from_slice(&bytes[cursor..]);
        buffer
    }))
}

/// Relocate one Utf8 value, whatever form of name it holds
pub(crate) fn remap_utf8(rules: &RelocationRuleSet, value: &str) -> BuildResult<Option<String>> {
    if value.contains('/') && is_internal_name(value) {
        return rules.relocate_internal_name(value);
    }

    if value.starts_with(['(', '[', 'L', '<']) {
        match SignatureRemapper::new(rules, value).run() {
            Ok(result) => return Ok(result),
            Err(Signature::Failed(error)) => return Err(error),
            Err(Signature::Malformed) => {}
        }
    }

    if value.contains('.') && is_dotted_name(value) {
        return rules.relocate_class_name(value);
    }

    if value.contains('/') && !value.contains(char::is_whitespace) {
        return rules.relocate_resource_path(value);
    }

    Ok(None)
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn is_internal_name(value: &str) -> bool {
    value.split('/').all(|s| !s.is_empty() && s.chars().all(is_identifier_char))
}

fn is_dotted_name(value: &str) -> bool {
    value.split('.').all(|s| !s.is_empty() && s.chars().all(is_identifier_char))
}

enum Signature {
    Malformed,
    Failed(BuildError),
}

type SignatureResult = Result<(), Signature>;

/// Recursive-descent rewriter for field/method descriptors and generic signatures
struct SignatureRemapper<'r, 's> {
    rules: &'r RelocationRuleSet,
    src: &'s str,
    pos: usize,
    out: String,
    changed: bool,
}

impl<'r, 's> SignatureRemapper<'r, 's> {
    fn new(rules: &'r RelocationRuleSet, src: &'s str) -> Self {
        Self {
            rules,
            src,
            pos: 0,
            out: String::with_capacity(src.len() + 32),
            changed: false,
        }
    }

    fn run(mut self) -> Result<Option<String>, Signature> {
        self.signature()?;
        Ok(self.changed.then_some(self.out))
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn copy_one(&mut self) -> SignatureResult {
        match self.peek() {
            Some(c) if c.is_ascii() => {
                self.out.push(c as char);
                self.pos += 1;
                Ok(())
            }
            _ => Err(Signature::Malformed),
        }
    }

    fn identifier_until(&mut self, stops: &[u8]) -> Result<&'s str, Signature> {
        let rest = &self.src.as_bytes()[self.pos..];
        let len = rest
            .iter()
            .position(|b| stops.contains(b))
            .filter(|len| *len > 0)
            .ok_or(Signature::Malformed)?;
        let identifier = &self.src[self.pos..self.pos + len];
        self.pos += len;
        Ok(identifier)
    }

    fn signature(&mut self) -> SignatureResult {
        if self.peek() == Some(b'<') {
            self.formal_type_parameters()?;
        }

        if self.peek() == Some(b'(') {
            self.copy_one()?;
            while self.peek() != Some(b')') {
                self.field_type()?;
            }
            self.copy_one()?;
            self.field_type()?;
            while self.peek() == Some(b'^') {
                self.copy_one()?;
                self.field_type()?;
            }
        } else {
            // field descriptor, or superclass followed by interfaces
            self.field_type()?;
            while self.pos < self.src.len() {
                self.field_type()?;
            }
        }

        if self.pos == self.src.len() {
            Ok(())
        } else {
            Err(Signature::Malformed)
        }
    }

    fn formal_type_parameters(&mut self) -> SignatureResult {
        self.copy_one()?;
        loop {
            if self.peek() == Some(b'>') {
                return self.copy_one();
            }
            let name = self.identifier_until(b":")?;
            self.out.push_str(name);
            self.copy_one()?;
            if matches!(self.peek(), Some(b'L') | Some(b'T') | Some(b'[')) {
                self.field_type()?;
            }
            while self.peek() == Some(b':') {
                self.copy_one()?;
                self.field_type()?;
            }
        }
    }

    fn field_type(&mut self) -> SignatureResult {
        match self.peek().ok_or(Signature::Malformed)? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' => self.copy_one(),
            b'[' => {
                self.copy_one()?;
                self.field_type()
            }
            b'T' => {
                self.copy_one()?;
                let name = self.identifier_until(b";")?;
                self.out.push_str(name);
                self.copy_one()
            }
            b'L' => self.class_type(),
            _ => Err(Signature::Malformed),
        }
    }

    fn class_type(&mut self) -> SignatureResult {
        self.copy_one()?;
        let name = self.identifier_until(b";<.")?;
        match self.rules.relocate_internal_name(name) {
            Ok(Some(relocated)) => {
                self.out.push_str(&relocated);
                self.changed = true;
            }
            Ok(None) => self.out.push_str(name),
            Err(error) => return Err(Signature::Failed(error)),
        }

        loop {
            match self.peek().ok_or(Signature::Malformed)? {
                b'<' => {
                    self.copy_one()?;
                    self.type_arguments()?;
                }
                b'.' => {
                    self.copy_one()?;
                    let inner = self.identifier_until(b";<.")?;
                    self.out.push_str(inner);
                }
                b';' => return self.copy_one(),
                _ => return Err(Signature::Malformed),
            }
        }
    }

    fn type_arguments(&mut self) -> SignatureResult {
        loop {
            match self.peek().ok_or(Signature::Malformed)? {
                b'>' => return self.copy_one(),
                b'*' => self.copy_one()?,
                b'+' | b'-' => {
                    self.copy_one()?;
                    self.field_type()?;
                }
                _ => self.field_type()?,
            }
        }
    }
}
