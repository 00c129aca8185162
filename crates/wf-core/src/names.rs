//! Strongly-typed names for scripts and entities.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// Identifier of a migration script; its lexicographic order is the
    /// application order.
    pub struct ScriptName;
    rule = |s| !s.is_empty() && !s.starts_with('.') && !s.contains(['/', '\\']);
    describe = "must be a non-empty file stem";
}

define_newtype_string! {
    /// Name of an entity mapping, e.g. `User`.
    pub struct EntityName;
    rule = |s| {
        s.starts_with(|c: char| c.is_ascii_alphabetic())
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    describe = "must start with a letter and contain only letters, digits and '_'";
}

impl EntityName {
    /// Lower-camel form used for default foreign keys (`User` -> `user`).
    pub fn lower_camel(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    /// Default foreign-key attribute pointing at this entity (`userId`).
    pub fn foreign_key(&self) -> String {
        format!("{}Id", self.lower_camel())
    }

    /// Default table name (`User` -> `Users`).
    pub fn default_table(&self) -> String {
        format!("{}s", self.0)
    }
}
