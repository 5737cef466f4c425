use std::fmt;
use std::path::{Path, PathBuf};

/// A value held by a node input or produced by a node output.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    File(PathBuf),
    /// fixed-size group, e.g. an FSL `(bvec, bval)` pair
    Tuple(Vec<Value>),
    List(Vec<Value>),
}

/// Map of slot name to value, for one node.
pub type ValueMap = util::HashMap<&'static str, Value>;

/// The type a slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    File,
    FileTuple,
    IntList,
    FloatList,
    StrList,
    /// heterogeneous tuple, e.g. `("Affine", 0.1)`
    Tuple,
    /// accepts anything; used by sinks and identity nodes
    Any,
}

impl ValueKind {
    /// True if an output of kind `from` can be connected to an input of this kind.
    pub fn accepts(self, from: ValueKind) -> bool {
        use ValueKind::*;
        matches!(
            (self, from),
            (Any, _) | (_, Any) | (Str | File, Str | File) | (Float, Int)
        ) || self == from
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn file(p: impl Into<PathBuf>) -> Self {
        Self::File(p.into())
    }

    pub fn ints(items: &[i64]) -> Self {
        Self::List(items.iter().map(|i| Self::Int(*i)).collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Self::Tuple(items.into_iter().collect())
    }

    /// True if this value can be stored in a slot of kind `kind`.
    pub fn fits(&self, kind: ValueKind) -> bool {
        use ValueKind as K;
        match (kind, self) {
            (K::Any, _) => true,
            (K::Bool, Self::Bool(_)) | (K::Int, Self::Int(_)) => true,
            (K::Float, Self::Float(_) | Self::Int(_)) => true,
            (K::Str | K::File, Self::Str(_) | Self::File(_)) => true,
            (K::FileTuple, Self::Tuple(items)) => items.iter().all(|v| v.fits(K::File)),
            (K::IntList, Self::List(items)) => items.iter().all(|v| v.fits(K::Int)),
            (K::FloatList, Self::List(items)) => items.iter().all(|v| v.fits(K::Float)),
            (K::StrList, Self::List(items)) => items.iter().all(|v| v.fits(K::Str)),
            (K::Tuple, Self::Tuple(_)) => true,
            _ => false,
        }
    }

    /// Path held by a `File` or `Str` value.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(p) => Some(p),
            Self::Str(s) => Some(Path::new(s)),
            _ => None,
        }
    }

    /// Elements of a tuple or list; any other value is a single element.
    pub fn items(&self) -> &[Value] {
        match self {
            Self::Tuple(items) | Self::List(items) => items,
            _ => std::slice::from_ref(self),
        }
    }

    /// All file paths held by this value.
    pub fn files(&self) -> Vec<&Path> {
        match self {
            Self::File(p) => vec![p.as_path()],
            Self::Tuple(items) | Self::List(items) => {
                items.iter().flat_map(|v| v.files()).collect()
            }
            _ => Vec::with_capacity(0),
        }
    }

    /// `Bool(false)` counts as unset, like an unchecked flag.
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Bool(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::File(p) => write!(f, "{p:?}"),
            Self::Tuple(items) | Self::List(items) => {
                let (open, close) = match self {
                    Self::Tuple(_) => ('(', ')'),
                    _ => ('[', ']'),
                };
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Self::File(p)
    }
}

impl From<&Path> for Value {
    fn from(p: &Path) -> Self {
        Self::File(p.to_path_buf())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fits() {
        assert!(Value::from(3).fits(ValueKind::Float));
        assert!(!Value::from(0.5).fits(ValueKind::Int));
        assert!(Value::from("raw_dwi.mif").fits(ValueKind::File));
        assert!(Value::tuple([Value::from("a.bvec"), Value::file("a.bval")])
            .fits(ValueKind::FileTuple));
        assert!(!Value::tuple([Value::from(1), Value::file("a.bval")]).fits(ValueKind::FileTuple));
        assert!(Value::ints(&[3, 2]).fits(ValueKind::IntList));
    }

    #[test]
    fn test_accepts() {
        assert!(ValueKind::Str.accepts(ValueKind::File));
        assert!(ValueKind::Float.accepts(ValueKind::Int));
        assert!(!ValueKind::Int.accepts(ValueKind::Float));
        assert!(!ValueKind::FileTuple.accepts(ValueKind::File));
        assert!(ValueKind::Any.accepts(ValueKind::FileTuple));
    }
}
