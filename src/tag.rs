use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;


macro_rules! tags {
    ($($(#[$docs:meta])* $name:ident = $value:literal, $str:literal;)*) => {
        impl SymTag {
            $(
                $(#[$docs])*
                pub const $name: SymTag = SymTag($value);
            )*

            /// Retrieve the name of the tag.
            ///
            /// Values outside of the known categories are reported as
            /// `"Unknown"`.
            pub fn name(&self) -> &'static str {
                match self.0 {
                    $($value => $str,)*
                    _ => "Unknown",
                }
            }

            /// Retrieve the name of the tag as a NUL terminated byte
            /// string.
            #[doc(hidden)]
            pub fn as_bytes(&self) -> &'static [u8] {
                match self.0 {
                    $($value => concat!($str, "\0").as_bytes(),)*
                    _ => b"Unknown\0",
                }
            }

            /// Check whether the tag is one of the known categories.
            pub fn is_known(&self) -> bool {
                matches!(self.0, $($value)|*)
            }
        }
    };
}


/// The classification of a symbol, as reported by the debug information
/// backend.
///
/// The raw backend value is preserved as is, also for values not covered
/// by any of the associated constants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymTag(pub u32);

tags! {
    /// No classification.
    NULL = 0, "SymTagNull";
    /// An executable.
    EXE = 1, "SymTagExe";
    /// A compilation unit.
    COMPILAND = 2, "SymTagCompiland";
    /// Details about a compilation unit.
    COMPILAND_DETAILS = 3, "SymTagCompilandDetails";
    /// The environment of a compilation unit.
    COMPILAND_ENV = 4, "SymTagCompilandEnv";
    /// A function.
    FUNCTION = 5, "SymTagFunction";
    /// A nested lexical block.
    BLOCK = 6, "SymTagBlock";
    /// A variable, parameter, or other data object.
    DATA = 7, "SymTagData";
    /// An annotation.
    ANNOTATION = 8, "SymTagAnnotation";
    /// A code label.
    LABEL = 9, "SymTagLabel";
    /// A public (exported or linker visible) symbol.
    PUBLIC_SYMBOL = 10, "SymTagPublicSymbol";
    /// A user defined type.
    UDT = 11, "SymTagUDT";
    /// An enumeration.
    ENUM = 12, "SymTagEnum";
    /// A function type.
    FUNCTION_TYPE = 13, "SymTagFunctionType";
    /// A pointer type.
    POINTER_TYPE = 14, "SymTagPointerType";
    /// An array type.
    ARRAY_TYPE = 15, "SymTagArrayType";
    /// A base type.
    BASE_TYPE = 16, "SymTagBaseType";
    /// A type alias.
    TYPEDEF = 17, "SymTagTypedef";
    /// A base class.
    BASE_CLASS = 18, "SymTagBaseClass";
    /// A friend declaration.
    FRIEND = 19, "SymTagFriend";
    /// The type of a function argument.
    FUNCTION_ARG_TYPE = 20, "SymTagFunctionArgType";
    /// The end of a function's prologue.
    FUNC_DEBUG_START = 21, "SymTagFuncDebugStart";
    /// The start of a function's epilogue.
    FUNC_DEBUG_END = 22, "SymTagFuncDebugEnd";
    /// A namespace import.
    USING_NAMESPACE = 23, "SymTagUsingNamespace";
    /// The shape of a virtual function table.
    VTABLE_SHAPE = 24, "SymTagVTableShape";
    /// A virtual function table.
    VTABLE = 25, "SymTagVTable";
    /// A custom symbol.
    CUSTOM = 26, "SymTagCustom";
    /// A thunk.
    THUNK = 27, "SymTagThunk";
    /// A custom type.
    CUSTOM_TYPE = 28, "SymTagCustomType";
    /// A managed type.
    MANAGED_TYPE = 29, "SymTagManagedType";
    /// A dimension of an array type.
    DIMENSION = 30, "SymTagDimension";
}

impl Display for SymTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl From<u32> for SymTag {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<SymTag> for u32 {
    #[inline]
    fn from(tag: SymTag) -> Self {
        tag.0
    }
}


/// Retrieve the name of the symbol tag with the given raw value.
///
/// This function is total: unknown values map to `"Unknown"`.
#[inline]
pub fn tag_name(value: u32) -> &'static str {
    SymTag(value).name()
}


#[cfg(test)]
mod tests {
    use super::*;


    /// Check that all 31 known tags have distinct names and everything
    /// beyond is "Unknown".
    #[test]
    fn tag_names() {
        assert_eq!(tag_name(0), "SymTagNull");
        assert_eq!(tag_name(5), "SymTagFunction");
        assert_eq!(tag_name(7), "SymTagData");
        assert_eq!(tag_name(10), "SymTagPublicSymbol");
        assert_eq!(tag_name(30), "SymTagDimension");
        assert_eq!(tag_name(31), "Unknown");
        assert_eq!(tag_name(u32::MAX), "Unknown");

        let names = (0..31).map(tag_name).collect::<Vec<_>>();
        for (i, name) in names.iter().enumerate() {
            assert!(name.starts_with("SymTag"), "{name}");
            assert!(!names[i + 1..].contains(name), "{name}");
            assert!(SymTag(i as u32).is_known());
        }
        assert!(!SymTag(31).is_known());
    }

    /// Check that name lookup is a pure function.
    #[test]
    fn tag_name_idempotence() {
        for value in [0, 17, 29, 31, 1000] {
            assert_eq!(tag_name(value), tag_name(value));
        }
        assert_eq!(SymTag::UDT.to_string(), "SymTagUDT");
        assert_eq!(u32::from(SymTag::THUNK), 27);
    }

    /// Check that the NUL terminated names match the regular ones.
    #[test]
    fn tag_name_bytes() {
        for value in [0, 5, 30, 31, u32::MAX] {
            let tag = SymTag(value);
            let bytes = tag.as_bytes();
            assert_eq!(bytes.last(), Some(&0));
            assert_eq!(&bytes[..bytes.len() - 1], tag.name().as_bytes());
        }
    }
}
