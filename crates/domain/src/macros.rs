//! Macro for enums that travel as lowercase strings (database columns, API
//! payloads, log fields).
//!
//! # Example
//!
//! ```rust
//! use timeflow_domain::impl_wire_name_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Visibility {
//!     Public,
//!     Private,
//! }
//!
//! impl_wire_name_conversions!(Visibility {
//!     Public => "public",
//!     Private => "private",
//! });
//!
//! assert_eq!(Visibility::Private.as_str(), "private");
//! assert_eq!("PUBLIC".parse::<Visibility>().unwrap(), Visibility::Public);
//! ```

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
///
/// Parsing is case-insensitive and fails with
/// [`TimeFlowError::InvalidInput`](crate::TimeFlowError::InvalidInput).
#[macro_export]
macro_rules! impl_wire_name_conversions {
    ($enum_name:ident { $($variant:ident => $str:literal),+ $(,)? }) => {
        impl $enum_name {
            /// Lowercase wire name of this variant.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $str,)+
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = $crate::TimeFlowError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    other => Err($crate::TimeFlowError::InvalidInput(format!(
                        "unknown {}: {:?}",
                        stringify!($enum_name),
                        other
                    ))),
                }
            }
        }
    };
}
