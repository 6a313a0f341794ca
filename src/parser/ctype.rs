use std::fmt::Display;

/// Type descriptor for the supported C subset.
///
/// Scalars compare structurally; pointers are compatible when their pointees
/// are, with `void *` acting as the universal pointer type. An array decays
/// to a pointer to its element type everywhere except frame layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CType {
    Void,
    Char,
    Int,
    Float,
    Double,
    Pointer(Box<CType>),
    Array(Box<CType>, usize),
}

impl CType {
    pub fn pointer_to(self) -> CType {
        CType::Pointer(Box::new(self))
    }

    /// Operand size in bytes. Arrays answer with the size of their decayed
    /// address; [`CType::alloc_size`] is the storage they occupy.
    pub fn size(&self) -> usize {
        match self {
            CType::Void => 0,
            CType::Char => 1,
            CType::Int => 4,
            CType::Float => 4,
            CType::Double => 8,
            CType::Pointer(_) => 8,
            CType::Array(_, _) => 8,
        }
    }

    pub fn alloc_size(&self) -> usize {
        match self {
            CType::Array(elem, len) => elem.size() * len,
            other => other.size(),
        }
    }

    pub fn is_arith(&self) -> bool {
        matches!(self, CType::Int | CType::Float | CType::Double)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, CType::Float | CType::Double)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, CType::Pointer(_) | CType::Array(_, _))
    }

    pub fn pointee(&self) -> Option<&CType> {
        match self {
            CType::Pointer(p) => Some(p),
            CType::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// 6.2.7 compatibility, restricted to what the subset can express.
    pub fn compatible(&self, other: &CType) -> bool {
        if self == other {
            return true;
        }
        match (self.pointee(), other.pointee()) {
            (Some(a), Some(b)) => {
                *a == CType::Void || *b == CType::Void || a.compatible(b)
            }
            _ => false,
        }
    }
}

impl Display for CType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CType::Void => "void",
            CType::Char => "character",
            CType::Int => "int",
            CType::Float => "float",
            CType::Double => "double",
            CType::Pointer(_) => "pointer",
            CType::Array(_, _) => "pointer",
        })
    }
}

/// 6.3.1.8 usual arithmetic conversions over the rank int < float < double.
pub fn arith_conv(l: &CType, r: &CType) -> CType {
    if *l == CType::Double || *r == CType::Double {
        CType::Double
    } else if *l == CType::Float || *r == CType::Float {
        CType::Float
    } else {
        CType::Int
    }
}

/// The call signature of a declared or defined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncSig {
    pub ret: CType,
    pub params: Vec<CType>,
    pub variadic: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(CType::Char.size(), 1);
        assert_eq!(CType::Int.size(), 4);
        assert_eq!(CType::Float.size(), 4);
        assert_eq!(CType::Double.size(), 8);
        assert_eq!(CType::Int.pointer_to().size(), 8);
        assert_eq!(CType::Array(Box::new(CType::Int), 8).alloc_size(), 32);
    }

    #[test]
    fn test_void_pointer_is_universal() {
        let void_ptr = CType::Void.pointer_to();
        let int_ptr = CType::Int.pointer_to();
        let double_ptr = CType::Double.pointer_to();

        assert!(void_ptr.compatible(&int_ptr));
        assert!(double_ptr.compatible(&void_ptr));
        assert!(!int_ptr.compatible(&double_ptr));
        assert!(!int_ptr.compatible(&CType::Int));
    }

    #[test]
    fn test_array_decays_for_compatibility() {
        let arr = CType::Array(Box::new(CType::Int), 4);
        assert!(arr.compatible(&CType::Int.pointer_to()));
        assert!(!arr.compatible(&CType::Double.pointer_to()));
    }

    #[test]
    fn test_arith_conv_rank() {
        assert_eq!(arith_conv(&CType::Int, &CType::Int), CType::Int);
        assert_eq!(arith_conv(&CType::Int, &CType::Float), CType::Float);
        assert_eq!(arith_conv(&CType::Float, &CType::Double), CType::Double);
        assert_eq!(arith_conv(&CType::Double, &CType::Int), CType::Double);
    }
}
