//! Base image references

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Identifier of a base runtime environment, e.g. `python:3.9`
///
/// The reference is kept verbatim and handed to the provisioner as-is.
/// The accessors only split it for display and validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(String);

/// Components of `[hostname/]repository[:tag][@digest]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParts<'a> {
    pub hostname: Option<&'a str>,
    pub repository: &'a str,
    pub tag: Option<&'a str>,
    pub digest: Option<&'a str>,
}

impl ImageRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the reference into its components
    pub fn parts(&self) -> ImageParts<'_> {
        let (name, digest) = match self.0.split_once('@') {
            Some((name, digest)) => (name, Some(digest)),
            None => (self.0.as_str(), None),
        };

        // The first path component is a registry only if it looks like a host
        let (hostname, rest) = match name.split_once('/') {
            Some((host, rest)) if host.contains(['.', ':']) || host == "localhost" => {
                (Some(host), rest)
            }
            _ => (None, name),
        };

        let (repository, tag) = match rest.rsplit_once(':') {
            Some((repository, tag)) => (repository, Some(tag)),
            None => (rest, None),
        };

        ImageParts {
            hostname,
            repository,
            tag,
            digest,
        }
    }

    pub fn repository(&self) -> &str {
        self.parts().repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.parts().tag
    }

    /// Check that the reference is usable by a provisioner
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.0.trim().is_empty() {
            anyhow::bail!("Image reference is empty");
        }
        if self.0.chars().any(char::is_whitespace) {
            anyhow::bail!("Image reference '{}' contains whitespace", self.0);
        }

        let parts = self.parts();
        if parts.repository.is_empty() {
            anyhow::bail!("Image reference '{}' has no repository", self.0);
        }
        if parts.tag == Some("") {
            anyhow::bail!("Image reference '{}' has an empty tag", self.0);
        }
        if parts.digest == Some("") {
            anyhow::bail!("Image reference '{}' has an empty digest", self.0);
        }

        Ok(())
    }

    /// Expand `$VAR` and `${VAR}` references against pipeline variables
    pub fn expand(&self, variables: &HashMap<String, String>) -> ImageRef {
        ImageRef(crate::core::context::expand_variables(&self.0, variables))
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageRef {
    fn from(reference: &str) -> Self {
        Self::new(reference)
    }
}

impl Serialize for ImageRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// `image:` accepts either a plain string or `{ name: ..., entrypoint: ... }`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawImage {
    Name(String),
    Detailed { name: String },
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawImage::deserialize(deserializer)? {
            RawImage::Name(name) | RawImage::Detailed { name } => Ok(ImageRef(name)),
        }
    }
}
