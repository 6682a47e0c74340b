//! Code table declarations

/// Declares a `#[repr(u16)]` code table with its name, conversions and `Display`
macro_rules! code_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident : $unknown:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:literal => $label:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        #[repr(u16)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value, )*
        }

        impl $name {
            /// Protocol name of the code
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )*
                }
            }
        }

        impl From<$name> for u16 {
            fn from(code: $name) -> u16 {
                code as u16
            }
        }

        impl TryFrom<u16> for $name {
            type Error = $crate::error::Error;

            fn try_from(value: u16) -> $crate::error::Result<Self> {
                match value {
                    $( $value => Ok(Self::$variant), )*
                    _ => Err($crate::error::Error::$unknown(value)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(0x{:04X})", self.name(), *self as u16)
            }
        }
    };
}
