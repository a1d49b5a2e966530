/// Maps an internal destination identifier to its external-facing name.
///
/// Implementations must be pure: the same input always yields the same name.
pub trait DestinationMapper: Send + Sync {
    fn map(&self, destination: &str) -> String;
}

/// Uses the destination unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapper;

impl DestinationMapper for IdentityMapper {
    fn map(&self, destination: &str) -> String {
        destination.to_string()
    }
}

/// Prepends a fixed prefix, `{prefix}.{destination}`.
#[derive(Debug, Clone)]
pub struct PrefixMapper {
    prefix: String,
}

impl PrefixMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl DestinationMapper for PrefixMapper {
    fn map(&self, destination: &str) -> String {
        if self.prefix.is_empty() {
            destination.to_string()
        } else {
            format!("{}.{}", self.prefix, destination)
        }
    }
}

/// Builds the mapper named by the `[mapper]` configuration table.
pub fn from_prefix(prefix: &str) -> Box<dyn DestinationMapper> {
    if prefix.is_empty() {
        Box::new(IdentityMapper)
    } else {
        Box::new(PrefixMapper::new(prefix))
    }
}
