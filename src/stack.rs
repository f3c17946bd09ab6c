use std::fmt;

use serde::{
    de::{self, SeqAccess, Visitor},
    ser::SerializeTuple,
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::string_table::StringTable;

/// One symbolized frame of a stack.
///
/// A resolved frame references the `files` and `funcs` tables of the
/// `StackTable` it was interned in.  An unresolved frame carries the reason it
/// could not be symbolized and is rendered verbatim.
///
/// Serializes as `[file, func, line]` or as a plain string respectively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SrcPos {
    Resolved { file: usize, func: usize, line: u32 },
    Unresolved(String),
}

impl SrcPos {
    pub fn unresolved(message: impl Into<String>) -> Self {
        SrcPos::Unresolved(message.into())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, SrcPos::Resolved { .. })
    }
}

impl Serialize for SrcPos {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SrcPos::Resolved { file, func, line } => {
                let mut tup = serializer.serialize_tuple(3)?;
                tup.serialize_element(file)?;
                tup.serialize_element(func)?;
                tup.serialize_element(line)?;
                tup.end()
            }
            SrcPos::Unresolved(message) => serializer.serialize_str(message),
        }
    }
}

impl<'de> Deserialize<'de> for SrcPos {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SrcPosVisitor;

        impl<'de> Visitor<'de> for SrcPosVisitor {
            type Value = SrcPos;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a [file, func, line] triple or an error string")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<SrcPos, E> {
                Ok(SrcPos::Unresolved(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<SrcPos, E> {
                Ok(SrcPos::Unresolved(v))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<SrcPos, A::Error> {
                let file = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let func = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let line = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(4, &self));
                }
                Ok(SrcPos::Resolved { file, func, line })
            }
        }

        deserializer.deserialize_any(SrcPosVisitor)
    }
}

/// A call stack, innermost (acquiring) frame first and outermost frame last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stack(pub Vec<SrcPos>);

impl Stack {
    pub fn new(frames: Vec<SrcPos>) -> Self {
        Stack(frames)
    }

    pub fn frames(&self) -> &[SrcPos] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn innermost(&self) -> Option<&SrcPos> {
        self.0.first()
    }

    pub fn outermost(&self) -> Option<&SrcPos> {
        self.0.last()
    }

    /// Polynomial rolling hash over the frames.  Only meant for bucketing
    /// stacks before an equality check; it is not part of graph identity.
    pub fn rolling_hash(&self) -> u64 {
        const MUL: u64 = 31;
        let mut h: u64 = 0;
        for pos in &self.0 {
            match pos {
                SrcPos::Resolved { file, func, line } => {
                    h = h.wrapping_mul(MUL).wrapping_add(*file as u64);
                    h = h.wrapping_mul(MUL).wrapping_add(*func as u64);
                    h = h.wrapping_mul(MUL).wrapping_add(u64::from(*line));
                }
                SrcPos::Unresolved(message) => {
                    for b in message.bytes() {
                        h = h.wrapping_mul(MUL).wrapping_add(u64::from(b));
                    }
                }
            }
        }
        h
    }
}

impl From<Vec<SrcPos>> for Stack {
    fn from(frames: Vec<SrcPos>) -> Self {
        Stack(frames)
    }
}

impl Serialize for Stack {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Stack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Stack(Vec::deserialize(deserializer)?))
    }
}

/// A symbolizer result for one (possibly inlined) frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineInfo {
    pub func: String,
    pub file: String,
    pub line: u32,
}

/// The tables that resolved `SrcPos` values point into.  The two tables are
/// independent; a file index never refers to the function table.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackTable {
    #[serde(deserialize_with = "null_as_default")]
    pub files: StringTable,
    #[serde(deserialize_with = "null_as_default")]
    pub funcs: StringTable,
}

impl StackTable {
    pub fn new() -> Self {
        StackTable::default()
    }

    /// Interns a frame's function and file, returning its position.
    pub fn intern(&self, func: &str, file: &str, line: u32) -> SrcPos {
        SrcPos::Resolved {
            file: self.files.add(file),
            func: self.funcs.add(func),
            line,
        }
    }

    /// Converts symbolizer output, innermost frame first, into a `Stack`.
    pub fn stack_from_lines(&self, lines: &[LineInfo]) -> Stack {
        Stack(
            lines
                .iter()
                .map(|l| self.intern(&l.func, &l.file, l.line))
                .collect(),
        )
    }

    /// The function name of a resolved frame.
    pub fn func_name(&self, pos: &SrcPos) -> Option<String> {
        match pos {
            SrcPos::Resolved { func, .. } => Some(self.funcs.get(*func)),
            SrcPos::Unresolved(_) => None,
        }
    }

    /// Renders one frame as `func file-basename:line`, or the error text.
    pub fn frame_string(&self, pos: &SrcPos) -> String {
        match pos {
            SrcPos::Resolved { file, func, line } => {
                let file = self.files.get(*file);
                format!("{} {}:{}", self.funcs.get(*func), basename(&file), line)
            }
            SrcPos::Unresolved(message) => message.clone(),
        }
    }

    /// Renders a stack one frame per line, innermost first.
    pub fn string_stack(&self, stack: &Stack) -> String {
        stack
            .frames()
            .iter()
            .map(|pos| self.frame_string(pos))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Checks that a resolved frame indexes inside both tables.
    pub fn check_pos(&self, pos: &SrcPos) -> std::result::Result<(), String> {
        if let SrcPos::Resolved { file, func, .. } = pos {
            if *file >= self.files.len() {
                return Err(format!(
                    "file index {} out of range ({} files)",
                    file,
                    self.files.len()
                ));
            }
            if *func >= self.funcs.len() {
                return Err(format!(
                    "func index {} out of range ({} funcs)",
                    func,
                    self.funcs.len()
                ));
            }
        }
        Ok(())
    }
}

/// Go encodes nil slices as `null`.  Use without `#[serde(default)]` so an
/// absent field is still an error.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

pub(crate) fn basename(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(base) if !base.is_empty() => base,
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_pos_wire_forms() {
        let resolved = SrcPos::Resolved {
            file: 1,
            func: 2,
            line: 30,
        };
        assert_eq!(serde_json::to_string(&resolved).unwrap(), "[1,2,30]");
        let unresolved = SrcPos::unresolved("bad PC 0x1234");
        assert_eq!(
            serde_json::to_string(&unresolved).unwrap(),
            r#""bad PC 0x1234""#
        );

        assert_eq!(
            serde_json::from_str::<SrcPos>("[1, 2, 30]").unwrap(),
            resolved
        );
        assert_eq!(
            serde_json::from_str::<SrcPos>(r#""bad PC 0x1234""#).unwrap(),
            unresolved
        );
    }

    #[test]
    fn test_src_pos_rejects_other_shapes() {
        for bad in ["42", "[1, 2]", "[1, 2, 3, 4]", r#"{"file": 1}"#, "true", r#"["a", 1, 2]"#] {
            assert!(
                serde_json::from_str::<SrcPos>(bad).is_err(),
                "{} should not decode",
                bad
            );
        }
    }

    #[test]
    fn test_string_stack() {
        let table = StackTable::new();
        let stack = Stack(vec![
            table.intern("runtime.lock", "/go/src/runtime/lock_futex.go", 47),
            SrcPos::unresolved("unknown PC 0xdead"),
            table.intern("runtime.main", "/go/src/runtime/proc.go", 200),
        ]);
        assert_eq!(
            table.string_stack(&stack),
            "runtime.lock lock_futex.go:47\nunknown PC 0xdead\nruntime.main proc.go:200"
        );
        assert_eq!(table.string_stack(&Stack::default()), "");
    }

    #[test]
    fn test_stack_from_lines_interns() {
        let table = StackTable::new();
        let lines = vec![
            LineInfo {
                func: "f".to_string(),
                file: "a.go".to_string(),
                line: 1,
            },
            LineInfo {
                func: "g".to_string(),
                file: "a.go".to_string(),
                line: 9,
            },
        ];
        let stack = table.stack_from_lines(&lines);
        assert_eq!(
            stack.frames(),
            &[
                SrcPos::Resolved {
                    file: 0,
                    func: 0,
                    line: 1
                },
                SrcPos::Resolved {
                    file: 0,
                    func: 1,
                    line: 9
                },
            ]
        );
        assert_eq!(table.files.len(), 1);
        assert_eq!(table.funcs.len(), 2);
    }

    #[test]
    fn test_rolling_hash_matches_equality() {
        let table = StackTable::new();
        let a = Stack(vec![table.intern("f", "a.go", 1), table.intern("g", "a.go", 2)]);
        let b = a.clone();
        let c = Stack(vec![table.intern("g", "a.go", 2), table.intern("f", "a.go", 1)]);
        assert_eq!(a, b);
        assert_eq!(a.rolling_hash(), b.rolling_hash());
        assert_ne!(a, c);
        assert_ne!(a.rolling_hash(), c.rolling_hash());
    }

    #[test]
    fn test_stack_table_null_and_missing_tables() {
        let table: StackTable =
            serde_json::from_str(r#"{"Files": null, "Funcs": ["f"]}"#).unwrap();
        assert!(table.files.is_empty());
        assert_eq!(table.funcs.get(0), "f");

        assert!(serde_json::from_str::<StackTable>(r#"{"Funcs": ["f"]}"#).is_err());
        assert!(serde_json::from_str::<StackTable>("{}").is_err());
    }
}
