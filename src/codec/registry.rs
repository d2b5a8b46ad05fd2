//! Named codec factory. The original builds this as a singleton class
//! registry populated by static constructors; per spec.md §9's redesign
//! guidance this becomes a plain static table built once with `once_cell`,
//! the same crate the teacher already uses for its lazily-initialized
//! globals (see `galago/kstem_data.rs`'s stemmer tables).
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Everything a reader needs to open a segment written by one codec
/// version: just its name today, but kept as a struct so a future second
/// codec can add fields without changing the registry's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub name: &'static str,
}

pub const LOAM_1_0: CodecDescriptor = CodecDescriptor { name: "loam_1_0" };

type Constructor = fn() -> CodecDescriptor;

fn all_codecs() -> Vec<(&'static str, Constructor)> {
    vec![("loam_1_0", || LOAM_1_0)]
}

static REGISTRY: Lazy<HashMap<&'static str, Constructor>> =
    Lazy::new(|| all_codecs().into_iter().collect());

/// Looks up a codec by the name segment meta recorded for it. Returns
/// `None` for anything the registry wasn't built with, letting callers map
/// that to `Error::UnknownCodec`.
pub fn lookup(name: &str) -> Option<CodecDescriptor> {
    REGISTRY.get(name).map(|ctor| ctor())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codec_resolves() {
        let found = lookup("loam_1_0").unwrap();
        assert_eq!(found.name, "loam_1_0");
    }

    #[test]
    fn unknown_codec_is_none() {
        assert!(lookup("does_not_exist").is_none());
    }
}
