//! World configuration.

/// Tunables for a [`World`](crate::World).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldConfig {
    /// Entity slots reserved up front.
    pub entity_capacity: usize,
    /// Separator used by path building and lookup.
    pub name_separator: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: 1024,
            name_separator: ".".to_string(),
        }
    }
}

impl WorldConfig {
    /// Read overrides from `TESSERA_ENTITY_CAPACITY` and
    /// `TESSERA_NAME_SEPARATOR`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`WorldConfig::from_env`], reading values through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            entity_capacity: lookup("TESSERA_ENTITY_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.entity_capacity),
            name_separator: lookup("TESSERA_NAME_SEPARATOR")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.name_separator),
        }
    }
}
