//! Discriminator-keyed decode dispatch
//!
//! Callers register the extension types they understand, each mapped into a
//! caller-chosen enum `E`. Payloads with kinds nobody registered come back as
//! [`Decoded::Unknown`] with the raw text untouched.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use super::{decode, peek_kind, Extension};
use crate::error::CodecError;

type DecodeFn<E> = Box<dyn Fn(&str) -> Result<E, CodecError> + Send + Sync>;

/// Outcome of dispatching one encoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<E> {
    Known(E),
    Unknown { kind: String, raw: String },
}

impl<E> Decoded<E> {
    pub fn known(self) -> Option<E> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown { .. } => None,
        }
    }
}

pub struct ExtensionDispatcher<E> {
    decoders: HashMap<&'static str, DecodeFn<E>>,
}

impl<E> Default for ExtensionDispatcher<E> {
    fn default() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }
}

impl<E> fmt::Debug for ExtensionDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.decoders.keys().collect();
        kinds.sort();
        f.debug_struct("ExtensionDispatcher")
            .field("kinds", &kinds)
            .finish()
    }
}

impl<E: 'static> ExtensionDispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route payloads of kind `T::KIND` through `wrap`
    ///
    /// Fails if another type already claimed the same kind.
    pub fn register<T, F>(mut self, wrap: F) -> Result<Self, CodecError>
    where
        T: Extension + 'static,
        F: Fn(T) -> E + Send + Sync + 'static,
    {
        match self.decoders.entry(T::KIND) {
            Entry::Occupied(_) => Err(CodecError::DuplicateKind(T::KIND.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Box::new(move |raw: &str| decode::<T>(raw).map(&wrap)));
                Ok(self)
            }
        }
    }

    pub fn understands(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    pub fn dispatch(&self, encoded: &str) -> Result<Decoded<E>, CodecError> {
        let kind = peek_kind(encoded)?;
        match self.decoders.get(kind.as_str()) {
            Some(decoder) => decoder(encoded).map(Decoded::Known),
            None => {
                tracing::debug!("no decoder for extension kind {}, keeping raw payload", kind);
                Ok(Decoded::Unknown {
                    kind,
                    raw: encoded.to_string(),
                })
            }
        }
    }

    /// Dispatch every entry of a spec's extension map
    pub fn dispatch_all<'a, I>(&self, extensions: I) -> Result<Vec<(String, Decoded<E>)>, CodecError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        extensions
            .into_iter()
            .map(|(key, raw)| Ok((key.clone(), self.dispatch(raw)?)))
            .collect()
    }
}
