use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_NAMESPACE: &str = "minecraft";
pub const AIR_ID: &str = "minecraft:air";

/// A typed voxel unit: namespaced identifier plus block-state properties.
///
/// Properties are kept sorted by name, so two blocks compare equal whenever
/// their identifier and property sets match regardless of the order the
/// properties were written in. The string form is
/// `namespace:path[key=value,key=value]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Block {
    id: String,
    properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockParseError {
    #[error("block identifier is empty")]
    EmptyIdentifier,
    #[error("block identifier {0:?} has an empty namespace or path")]
    MalformedIdentifier(String),
    #[error("unterminated property list in {0:?}")]
    UnterminatedProperties(String),
    #[error("malformed property {property:?} in {input:?}")]
    MalformedProperty { input: String, property: String },
}

impl Block {
    /// Build a block from an identifier; a bare path gets the default namespace.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: qualify(id.into()),
            properties: BTreeMap::new(),
        }
    }

    pub fn air() -> Self {
        Self::new(AIR_ID)
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn namespace(&self) -> &str {
        self.id.split_once(':').map(|(ns, _)| ns).unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn path(&self) -> &str {
        self.id.split_once(':').map(|(_, path)| path).unwrap_or(&self.id)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn is_air(&self) -> bool {
        self.id == AIR_ID && self.properties.is_empty()
    }
}

fn qualify(id: String) -> String {
    if id.contains(':') {
        id
    } else {
        format!("{DEFAULT_NAMESPACE}:{id}")
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if self.properties.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (name, value)) in self.properties.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("]")
    }
}

impl FromStr for Block {
    type Err = BlockParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let (id, props) = match trimmed.find('[') {
            Some(open) => {
                let Some(body) = trimmed[open + 1..].strip_suffix(']') else {
                    return Err(BlockParseError::UnterminatedProperties(input.to_string()));
                };
                (&trimmed[..open], Some(body))
            }
            None => (trimmed, None),
        };

        if id.is_empty() {
            return Err(BlockParseError::EmptyIdentifier);
        }
        if let Some((ns, path)) = id.split_once(':') {
            if ns.is_empty() || path.is_empty() || path.contains(':') {
                return Err(BlockParseError::MalformedIdentifier(id.to_string()));
            }
        }

        let mut block = Block::new(id);
        for property in props.into_iter().flat_map(|body| body.split(',')) {
            let property = property.trim();
            if property.is_empty() {
                continue;
            }
            let malformed = || BlockParseError::MalformedProperty {
                input: input.to_string(),
                property: property.to_string(),
            };
            let (name, value) = property.split_once('=').ok_or_else(malformed)?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return Err(malformed());
            }
            block.properties.insert(name.to_string(), value.to_string());
        }
        Ok(block)
    }
}

impl TryFrom<String> for Block {
    type Error = BlockParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Block> for String {
    fn from(block: Block) -> Self {
        block.to_string()
    }
}
