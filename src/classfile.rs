//! Minimal JVM class file reader.
//!
//! Only the parts needed to discover class references are decoded: the
//! constant pool, `this_class`/`super_class`, member descriptors, generic
//! signatures, annotations and local variable tables. Bytecode instructions
//! are skipped; anything they touch is already in the constant pool.

use indexmap::IndexSet;
use sha2::{Digest, Sha256};

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, thiserror::Error)]
pub enum ClassFileError {
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("class file truncated at offset {offset}")]
    Truncated { offset: usize },
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownTag { tag: u8, index: usize },
    #[error("invalid constant pool index {0}")]
    BadIndex(u16),
    #[error("unknown annotation element tag {0:?}")]
    UnknownElementTag(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub class_name: String,
    pub major_version: u16,
    /// Referenced internal class names, first occurrence order, without `class_name` itself.
    pub references: Vec<String>,
}

#[derive(Debug, Clone)]
enum Constant {
    Unusable,
    Utf8(String),
    Class(u16),
    NameAndType { descriptor: u16 },
    MethodType(u16),
    Other,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFileError::Truncated { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassFileError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFileError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFileError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

struct ConstantPool(Vec<Constant>);

impl ConstantPool {
    fn read(r: &mut Reader<'_>) -> Result<Self, ClassFileError> {
        let count = r.u16()? as usize;
        let mut entries = vec![Constant::Unusable; count.max(1)];

        let mut index = 1usize;
        while index < count {
            let tag = r.u8()?;
            let (constant, width) = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    let raw = r.take(len)?;
                    (Constant::Utf8(String::from_utf8_lossy(raw).into_owned()), 1)
                }
                3 | 4 => {
                    r.skip(4)?;
                    (Constant::Other, 1)
                }
                // long and double occupy two slots
                5 | 6 => {
                    r.skip(8)?;
                    (Constant::Other, 2)
                }
                7 => (Constant::Class(r.u16()?), 1),
                8 | 19 | 20 => {
                    r.skip(2)?;
                    (Constant::Other, 1)
                }
                9 | 10 | 11 | 17 | 18 => {
                    r.skip(4)?;
                    (Constant::Other, 1)
                }
                12 => {
                    let _name = r.u16()?;
                    (
                        Constant::NameAndType {
                            descriptor: r.u16()?,
                        },
                        1,
                    )
                }
                15 => {
                    r.skip(3)?;
                    (Constant::Other, 1)
                }
                16 => (Constant::MethodType(r.u16()?), 1),
                _ => return Err(ClassFileError::UnknownTag { tag, index }),
            };
            entries[index] = constant;
            index += width;
        }

        Ok(Self(entries))
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.0.get(index as usize) {
            Some(Constant::Utf8(s)) => Ok(s),
            _ => Err(ClassFileError::BadIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.0.get(index as usize) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassFileError::BadIndex(index)),
        }
    }
}

pub fn read_class_file(bytes: &[u8]) -> Result<ClassFile, ClassFileError> {
    let mut r = Reader::new(bytes);
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(ClassFileError::BadMagic(magic));
    }
    let _minor = r.u16()?;
    let major_version = r.u16()?;
    let pool = ConstantPool::read(&mut r)?;

    let _access = r.u16()?;
    let this_class = r.u16()?;
    let _super_class = r.u16()?;
    let class_name = pool.class_name(this_class)?.to_string();

    let interfaces = r.u16()? as usize;
    r.skip(interfaces * 2)?;

    let mut refs: IndexSet<String> = IndexSet::new();

    // fields, then methods
    for _ in 0..2 {
        let members = r.u16()?;
        for _ in 0..members {
            let _access = r.u16()?;
            let _name = r.u16()?;
            let descriptor = r.u16()?;
            collect_signature(pool.utf8(descriptor)?, &mut refs);
            read_attributes(&mut r, &pool, &mut refs)?;
        }
    }
    read_attributes(&mut r, &pool, &mut refs)?;

    for constant in &pool.0 {
        match constant {
            Constant::Class(name) => {
                let name = pool.utf8(*name)?;
                if name.starts_with('[') {
                    collect_signature(name, &mut refs);
                } else if !name.is_empty() {
                    refs.insert(name.to_string());
                }
            }
            Constant::NameAndType { descriptor } | Constant::MethodType(descriptor) => {
                collect_signature(pool.utf8(*descriptor)?, &mut refs);
            }
            Constant::Unusable | Constant::Utf8(_) | Constant::Other => {}
        }
    }

    refs.shift_remove(class_name.as_str());

    Ok(ClassFile {
        class_name,
        major_version,
        references: refs.into_iter().collect(),
    })
}

/// Reads an attribute table, collecting types from the attributes that name them.
/// Each body is parsed from its own slice so an unknown layout cannot desync the outer reader.
fn read_attributes(
    r: &mut Reader<'_>,
    pool: &ConstantPool,
    refs: &mut IndexSet<String>,
) -> Result<(), ClassFileError> {
    let count = r.u16()?;
    for _ in 0..count {
        let name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let mut body = Reader::new(r.take(len)?);
        match name {
            "Signature" => collect_signature(pool.utf8(body.u16()?)?, refs),
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                read_annotations(&mut body, pool, refs)?;
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let params = body.u8()?;
                for _ in 0..params {
                    read_annotations(&mut body, pool, refs)?;
                }
            }
            "AnnotationDefault" => read_element_value(&mut body, pool, refs)?,
            "Code" => {
                // max_stack, max_locals
                body.skip(4)?;
                let code_len = body.u32()? as usize;
                body.skip(code_len)?;
                let handlers = body.u16()? as usize;
                body.skip(handlers * 8)?;
                read_attributes(&mut body, pool, refs)?;
            }
            "LocalVariableTable" | "LocalVariableTypeTable" => {
                let entries = body.u16()?;
                for _ in 0..entries {
                    // start_pc, length, name_index
                    body.skip(6)?;
                    collect_signature(pool.utf8(body.u16()?)?, refs);
                    body.skip(2)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn read_annotations(
    r: &mut Reader<'_>,
    pool: &ConstantPool,
    refs: &mut IndexSet<String>,
) -> Result<(), ClassFileError> {
    let count = r.u16()?;
    for _ in 0..count {
        read_annotation(r, pool, refs)?;
    }
    Ok(())
}

fn read_annotation(
    r: &mut Reader<'_>,
    pool: &ConstantPool,
    refs: &mut IndexSet<String>,
) -> Result<(), ClassFileError> {
    collect_signature(pool.utf8(r.u16()?)?, refs);
    let pairs = r.u16()?;
    for _ in 0..pairs {
        let _name = r.u16()?;
        read_element_value(r, pool, refs)?;
    }
    Ok(())
}

fn read_element_value(
    r: &mut Reader<'_>,
    pool: &ConstantPool,
    refs: &mut IndexSet<String>,
) -> Result<(), ClassFileError> {
    let tag = r.u8()? as char;
    match tag {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 's' => r.skip(2)?,
        'e' => {
            collect_signature(pool.utf8(r.u16()?)?, refs);
            r.skip(2)?;
        }
        'c' => collect_signature(pool.utf8(r.u16()?)?, refs),
        '@' => read_annotation(r, pool, refs)?,
        '[' => {
            let values = r.u16()?;
            for _ in 0..values {
                read_element_value(r, pool, refs)?;
            }
        }
        other => return Err(ClassFileError::UnknownElementTag(other)),
    }
    Ok(())
}

/// Adds every class named in a descriptor or generic signature.
///
/// Malformed input stops the scan; whatever was collected before stays.
fn collect_signature(signature: &str, out: &mut IndexSet<String>) {
    let mut p = SignatureParser {
        s: signature.as_bytes(),
        pos: 0,
        text: signature,
        out,
    };
    let _ = p.signature();
}

struct SignatureParser<'a, 'o> {
    s: &'a [u8],
    pos: usize,
    text: &'a str,
    out: &'o mut IndexSet<String>,
}

impl SignatureParser<'_, '_> {
    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        while let Some(c) = self.peek() {
            match c {
                b'(' | b')' | b'^' => self.pos += 1,
                _ => self.java_type()?,
            }
        }
        Some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.pos += 1;
        while self.peek()? != b'>' {
            self.identifier();
            self.expect(b':')?;
            if matches!(self.peek()?, b'L' | b'T' | b'[') {
                self.java_type()?;
            }
            while self.peek()? == b':' {
                self.pos += 1;
                if matches!(self.peek()?, b'L' | b'T' | b'[') {
                    self.java_type()?;
                }
            }
        }
        self.pos += 1;
        Some(())
    }

    fn identifier(&mut self) -> &str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b';' | b'<' | b'>' | b'.' | b':') {
                break;
            }
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V' | b'*' => {
                self.pos += 1;
            }
            b'[' | b'+' | b'-' => {
                self.pos += 1;
                self.java_type()?;
            }
            b'T' => {
                self.pos += 1;
                self.identifier();
                self.expect(b';')?;
            }
            b'L' => self.class_type()?,
            _ => return None,
        }
        Some(())
    }

    fn class_type(&mut self) -> Option<()> {
        self.pos += 1;
        let mut name = self.identifier().to_string();
        loop {
            if name.is_empty() {
                return None;
            }
            self.out.insert(name.clone());
            if self.peek()? == b'<' {
                self.pos += 1;
                while self.peek()? != b'>' {
                    self.java_type()?;
                }
                self.pos += 1;
            }
            match self.peek()? {
                b';' => {
                    self.pos += 1;
                    return Some(());
                }
                b'.' => {
                    self.pos += 1;
                    let inner = self.identifier();
                    name = format!("{name}${inner}");
                }
                _ => return None,
            }
        }
    }

    fn expect(&mut self, c: u8) -> Option<()> {
        if self.peek()? == c {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }
}

pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}


#[cfg(test)]
mod tests {
    use super::test_support::{ClassBuilder, simple_class};
    use super::*;

    #[test]
    fn reads_name_version_and_class_constants() {
        let bytes = simple_class("com/app/Main", &["com/lib/Helper", "com/app/Main"]);
        let class = read_class_file(&bytes).unwrap();

        assert_eq!(class.class_name, "com/app/Main");
        assert_eq!(class.major_version, 52);
        assert_eq!(class.references, vec!["java/lang/Object", "com/lib/Helper"]);
    }

    #[test]
    fn collects_types_from_descriptors_and_arrays() {
        let mut b = ClassBuilder::new();
        let this = b.class("a/A");
        let sup = b.class("java/lang/Object");
        b.class("[[Lb/Elem;");
        b.class("[I");
        b.name_and_type("call", "(ILc/Arg;[Ld/Other;)Le/Ret;");
        b.field("list", "Lf/Field;");
        let bytes = b.finish(this, sup);

        let class = read_class_file(&bytes).unwrap();
        let mut refs = class.references.clone();
        refs.sort();
        assert_eq!(
            refs,
            vec!["b/Elem", "c/Arg", "d/Other", "e/Ret", "f/Field", "java/lang/Object"]
        );
    }

    #[test]
    fn collects_types_from_annotations_and_signatures() {
        let mut b = ClassBuilder::new();
        let this = b.class("a/A");
        let sup = b.class("java/lang/Object");
        let marker = b.utf8("Lcom/ann/Marker;");
        let value = b.utf8("value");
        let target = b.utf8("Lcom/ann/Target;");
        let level = b.utf8("Lcom/ann/Level;");
        let high = b.utf8("HIGH");
        let class_sig = b.utf8("<T:Lcom/gen/Bound;>Ljava/lang/Object;Lcom/gen/Iface<TT;>;");
        b.generic_field("items", "Ljava/util/List;", "Ljava/util/List<Lcom/gen/Item;>;");

        // @Marker(value = Target.class, level = Level.HIGH)
        let mut annotations = Vec::new();
        annotations.extend_from_slice(&1u16.to_be_bytes());
        annotations.extend_from_slice(&marker.to_be_bytes());
        annotations.extend_from_slice(&2u16.to_be_bytes());
        annotations.extend_from_slice(&value.to_be_bytes());
        annotations.push(b'c');
        annotations.extend_from_slice(&target.to_be_bytes());
        annotations.extend_from_slice(&value.to_be_bytes());
        annotations.push(b'e');
        annotations.extend_from_slice(&level.to_be_bytes());
        annotations.extend_from_slice(&high.to_be_bytes());
        b.attribute("RuntimeVisibleAnnotations", annotations);
        b.attribute("Signature", class_sig.to_be_bytes().to_vec());
        let bytes = b.finish(this, sup);

        let class = read_class_file(&bytes).unwrap();
        let mut refs = class.references.clone();
        refs.sort();
        assert_eq!(
            refs,
            vec![
                "com/ann/Level",
                "com/ann/Marker",
                "com/ann/Target",
                "com/gen/Bound",
                "com/gen/Iface",
                "com/gen/Item",
                "java/lang/Object",
                "java/util/List",
            ]
        );
    }

    #[test]
    fn unknown_annotation_element_tags_are_errors() {
        let mut b = ClassBuilder::new();
        let this = b.class("a/A");
        let sup = b.class("java/lang/Object");
        b.attribute("AnnotationDefault", vec![b'?', 0, 0]);
        let err = read_class_file(&b.finish(this, sup)).unwrap_err();
        assert!(matches!(err, ClassFileError::UnknownElementTag('?')));
    }

    #[test]
    fn generic_signatures_name_outer_and_inner_classes() {
        let mut out = IndexSet::new();
        collect_signature(
            "<K::Ljava/lang/Comparable<-TK;>;>(Lfoo/Outer<TK;>.Inner<[Lbar/X;*>;)V^Lbaz/Oops;",
            &mut out,
        );
        let refs: Vec<_> = out.into_iter().collect();
        assert_eq!(
            refs,
            vec![
                "java/lang/Comparable",
                "foo/Outer",
                "foo/Outer$Inner",
                "bar/X",
                "baz/Oops",
            ]
        );
    }

    #[test]
    fn long_constants_take_two_slots() {
        let mut b = ClassBuilder::new();
        b.long(42);
        let this = b.class("x/WithLong");
        let sup = b.class("java/lang/Object");
        let bytes = b.finish(this, sup);

        let class = read_class_file(&bytes).unwrap();
        assert_eq!(class.class_name, "x/WithLong");
    }

    #[test]
    fn class_names_containing_l_are_not_split() {
        let mut out = IndexSet::new();
        collect_signature("(Lorg/Lala/Loop;J)Lcom/L;", &mut out);
        let refs: Vec<_> = out.into_iter().collect();
        assert_eq!(refs, vec!["org/Lala/Loop", "com/L"]);
    }

    #[test]
    fn rejects_non_class_bytes() {
        let err = read_class_file(b"PK\x03\x04rest").unwrap_err();
        assert!(matches!(err, ClassFileError::BadMagic(0x504b_0304)));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = simple_class("a/A", &[]);
        let err = read_class_file(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassFileError::Truncated { .. }));
    }

    #[test]
    fn rejects_unknown_tags() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 52, 0, 2, 99]);
        let err = read_class_file(&bytes).unwrap_err();
        assert!(matches!(err, ClassFileError::UnknownTag { tag: 99, index: 1 }));
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
