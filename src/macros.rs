// Heads up! This file must load before every other `mod` in `lib.rs` that
// uses these macros (see the comment there).

macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $( $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        enum_with_unknown! {
            $( #[$enum_attr] )*
            pub doc enum $name($ty) {
                $( $variant = $value ),+
            }
        }
    };
    (
        $( #[$enum_attr:meta] )*
        pub doc enum $name:ident($ty:ty) {
            $( $variant:ident = $value:expr ),+
        }
    ) => {
        #[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
        $( #[$enum_attr] )*
        pub enum $name {
            $( $variant ),+,
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),+,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),+,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

/// Format a log message at `trace` level, gated the same way as `net_debug!`.
///
/// Carried from the teacher's intent (`lib.rs` declares `mod macros;` before
/// everything else but the module itself was not part of the retrieved
/// slice); restored here as a thin wrapper over the `log` crate, the ambient
/// logging stack every other component in this crate uses.
macro_rules! net_trace {
    ($($arg:expr),*) => { log::trace!($($arg),*) }
}

macro_rules! net_debug {
    ($($arg:expr),*) => { log::debug!($($arg),*) }
}
