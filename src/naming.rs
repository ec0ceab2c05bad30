//! Mapping of source descriptors to archive entry names.

use crate::source::SourceDescriptor;

/// Maps a source to the name of its archive entry.
///
/// Implementations must be pure and infallible. Name collisions are not
/// detected: two sources resolving to the same name become two entries.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, source: &SourceDescriptor) -> String;
}

impl<F> NameResolver for F
where
    F: Fn(&SourceDescriptor) -> String + Send + Sync,
{
    fn resolve(&self, source: &SourceDescriptor) -> String {
        self(source)
    }
}

/// Default resolver: drops a leading `scheme://` and flattens the rest.
///
/// Every `/`, `\` and `:` becomes the replacement character, so
/// `https://example.com/a/b` resolves to `example.com-a-b`.
#[derive(Debug, Clone, Copy)]
pub struct FlatNameResolver {
    replacement: char,
}

impl FlatNameResolver {
    pub fn new(replacement: char) -> Self {
        Self { replacement }
    }
}

impl Default for FlatNameResolver {
    fn default() -> Self {
        Self::new('-')
    }
}

impl NameResolver for FlatNameResolver {
    fn resolve(&self, source: &SourceDescriptor) -> String {
        strip_scheme(source.location())
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => self.replacement,
                c => c,
            })
            .collect()
    }
}

/// Remove an RFC 3986 `scheme://` prefix, if there is one.
fn strip_scheme(location: &str) -> &str {
    let Some((scheme, rest)) = location.split_once("://") else {
        return location;
    };

    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    if valid { rest } else { location }
}
