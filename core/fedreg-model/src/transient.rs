use crate::RegistryEntry;

/// Fields owned by the local installation rather than by the record's author.
///
/// A newer incoming record never clears them: unset values on an update are
/// copied forward from the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientField {
    PublishedLocations,
    LastPublished,
}

/// Every transient field, in write-back order.
pub const TRANSIENT_FIELDS: [TransientField; 2] =
    [TransientField::PublishedLocations, TransientField::LastPublished];

impl TransientField {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PublishedLocations => "published_locations",
            Self::LastPublished => "last_published",
        }
    }

    /// Whether `entry` carries a value for this field.
    #[must_use]
    pub fn is_set(self, entry: &RegistryEntry) -> bool {
        match self {
            Self::PublishedLocations => entry.published_locations.is_some(),
            Self::LastPublished => entry.last_published.is_some(),
        }
    }

    /// Copies this field's value from `from` into `to`.
    pub fn copy(self, from: &RegistryEntry, to: &mut RegistryEntry) {
        match self {
            Self::PublishedLocations => {
                to.published_locations = from.published_locations.clone();
            }
            Self::LastPublished => to.last_published = from.last_published,
        }
    }

    /// Whether `incoming` carries a value that differs from `stored`.
    ///
    /// An unset incoming value never differs; a set incoming value differs
    /// from an unset stored one.
    #[must_use]
    pub fn differs(self, incoming: &RegistryEntry, stored: &RegistryEntry) -> bool {
        match self {
            Self::PublishedLocations => match &incoming.published_locations {
                None => false,
                Some(new) => stored.published_locations.as_ref() != Some(new),
            },
            Self::LastPublished => match incoming.last_published {
                None => false,
                Some(new) => stored.last_published != Some(new),
            },
        }
    }
}
