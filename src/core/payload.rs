// Embedded native backend bytes, addressed by logical resource name.
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::core::error::{Error, ErrorKind};

#[cfg(volctl_payload)]
const BUNDLED_NAME: &str = env!("VOLCTL_PAYLOAD_NAME");
#[cfg(volctl_payload)]
const BUNDLED_BYTES: &[u8] = include_bytes!(env!("VOLCTL_PAYLOAD_PATH"));

#[derive(Clone, Debug, Default)]
pub struct PayloadStore {
    resources: BTreeMap<String, Cow<'static, [u8]>>,
}

impl PayloadStore {
    /// Resources compiled into this build.
    #[allow(unused_mut)]
    pub fn bundled() -> Self {
        let mut store = Self::empty();
        #[cfg(volctl_payload)]
        store.insert(BUNDLED_NAME, BUNDLED_BYTES);
        store
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) -> Self {
        self.insert(name, bytes);
        self
    }

    fn insert(&mut self, name: impl Into<String>, bytes: impl Into<Cow<'static, [u8]>>) {
        self.resources.insert(name.into(), bytes.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.get(name).is_some_and(|bytes| !bytes.is_empty())
    }

    /// Bytes for `name`; an empty resource counts as missing.
    pub fn lookup(&self, name: &str) -> Result<&[u8], Error> {
        match self.resources.get(name) {
            Some(bytes) if !bytes.is_empty() => Ok(bytes.as_ref()),
            _ => Err(Error::new(ErrorKind::PayloadMissing)
                .with_message(format!("embedded resource /{name} not found in this build"))),
        }
    }
}
