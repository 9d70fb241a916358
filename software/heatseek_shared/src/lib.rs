#![doc = include_str!("../README.md")]
#![allow(clippy::needless_range_loop)]

pub mod bitfield;
pub mod image;
pub mod regmap;

pub use bitfield::{Access, BitfieldRegister, FieldDescriptor, RegisterError, twos_complement};
pub use image::{IMAGE_SIZE, NUM_COLS, NUM_ROWS, Pattern, RefreshRate, Subpage};

/// Default I2C address of the MLX90640 camera
pub const DEFAULT_CAMERA_ADDRESS: u8 = 0x33;

/// Derive To/From with an added "Unknown" variant catch-all for converting
/// from numerical register values that do not match a valid variant in order to
/// avoid either panicking or cumbersome error handling.
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// Catch-all for values that do not match a variant
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}
