//! Validated string newtypes.
//!
//! Each name type states its own validity rule; construction, parsing and
//! deserialization all go through that rule.

/// Define a string newtype whose values satisfy `rule`.
///
/// `rule` is a `fn(&str) -> bool`. `describe` is appended to parse errors.
macro_rules! define_newtype_string {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
        rule = $rule:expr;
        describe = $describe:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
        #[serde(transparent)]
        $vis struct $Name(String);

        impl $Name {
            /// Whether `candidate` is acceptable
            pub fn is_valid(candidate: &str) -> bool {
                let rule: fn(&str) -> bool = $rule;
                rule(candidate)
            }

            /// Build from a literal known to be valid.
            ///
            /// # Panics
            /// When the rule rejects `name`. Use [`try_new`](Self::try_new)
            /// for anything read at runtime.
            pub fn new(name: impl Into<String>) -> Self {
                let name = name.into();
                match Self::try_new(name.as_str()) {
                    Some(valid) => valid,
                    None => panic!("invalid {} '{}': {}", stringify!($Name), name, $describe),
                }
            }

            pub fn try_new(name: impl Into<String>) -> Option<Self> {
                let name = name.into();
                Self::is_valid(&name).then_some(Self(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::str::FromStr for $Name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_new(s)
                    .ok_or_else(|| format!("invalid {} '{}': {}", stringify!($Name), s, $describe))
            }
        }

        impl<'de> serde::Deserialize<'de> for $Name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::ops::Deref for $Name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $Name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $Name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $Name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

pub(crate) use define_newtype_string;
