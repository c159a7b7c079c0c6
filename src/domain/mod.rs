//! Core domain types and logic.

/// Declares a closed enumeration that round-trips through its stored string
/// form. Parsing an unknown string yields a `Validation` error naming `$field`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($field:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
        #[serde(into = "&'static str")]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl From<$name> for &'static str {
            fn from(value: $name) -> Self {
                value.as_str()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::error::PropdeskError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::domain::error::PropdeskError::validation(
                        $field,
                        format!("unknown value '{other}'"),
                    )),
                }
            }
        }
    };
}

pub mod error;
pub mod ids;
pub mod catalog;
pub mod rule_value;
pub mod assignment;
pub mod account;
pub mod trade;
pub mod balance;
pub mod targets;
pub mod payout;
pub mod violation;
pub mod config_validation;
pub mod engine;
