use crate::block::Block;
use crate::{Token, UNSET_TOKEN};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::path::Path;

const CATALOG_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Token catalog
// ---------------------------------------------------------------------------
//
// Token 0 is reserved as the start / unset marker and is never handed out by
// registration.  A fresh catalog binds air to token 1; every other block gets
// the next unused token on first sight.  Bindings are append-only.

/// One block ↔ token binding, as persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub token: Token,
    pub block: Block,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("token {0} is not bound to any block")]
    UnknownToken(Token),
    #[error("token {token} is bound to both {first} and {second}")]
    DuplicateToken {
        token: Token,
        first: Block,
        second: Block,
    },
    #[error("block {block} is bound to both token {first} and token {second}")]
    DuplicateBlock {
        block: Block,
        first: Token,
        second: Token,
    },
    #[error("token {0} is beyond the assignable range")]
    TokenOutOfRange(Token),
    #[error("unsupported catalog schema version {actual}, expected {expected}")]
    UnsupportedSchemaVersion { expected: u32, actual: u32 },
    #[error("catalog io: {0}")]
    Io(#[from] io::Error),
    #[error("catalog json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    schema_version: u32,
    entries: Vec<CatalogEntry>,
}

/// Bidirectional Block ↔ Token registry owned by the caller.
#[derive(Clone, Debug)]
pub struct TokenCatalog {
    tokens: HashMap<Block, Token>,
    // Ordered so dumps are deterministic.
    blocks: BTreeMap<Token, Block>,
    next_token: Token,
    // Exclusive upper bound on assignable tokens (model vocabulary size).
    capacity: Option<usize>,
    frozen: bool,
    placeholder: Option<Token>,
    degraded: HashSet<Block>,
}

impl Default for TokenCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TokenCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.blocks == other.blocks && self.next_token == other.next_token
    }
}

impl TokenCatalog {
    /// Fresh catalog: token 0 reserved, air bound to token 1.
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.bind(crate::EMPTY_TOKEN, Block::air());
        catalog
    }

    fn empty() -> Self {
        Self {
            tokens: HashMap::new(),
            blocks: BTreeMap::new(),
            next_token: UNSET_TOKEN + 1,
            capacity: None,
            frozen: false,
            placeholder: None,
            degraded: HashSet::new(),
        }
    }

    /// Limit registration to tokens below `vocab_size`.
    pub fn with_capacity(mut self, vocab_size: usize) -> Self {
        self.capacity = Some(vocab_size);
        self
    }

    /// Stop registering new blocks; unseen blocks map to the placeholder.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn set_placeholder(&mut self, token: Token) -> Result<(), CatalogError> {
        if !self.blocks.contains_key(&token) {
            return Err(CatalogError::UnknownToken(token));
        }
        self.placeholder = Some(token);
        Ok(())
    }

    /// Token substituted for blocks the catalog cannot register.
    /// Defaults to the air token, or the unset marker if air is unknown.
    pub fn placeholder_token(&self) -> Token {
        self.placeholder
            .or_else(|| self.air_token())
            .unwrap_or(UNSET_TOKEN)
    }

    pub fn placeholder_block(&self) -> Option<&Block> {
        self.blocks.get(&self.placeholder_token())
    }

    pub fn air_token(&self) -> Option<Token> {
        self.token_for(&Block::air())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Token the next newly seen block would receive.
    pub fn next_token(&self) -> Token {
        self.next_token
    }

    /// Lookup without registering.
    pub fn token_for(&self, block: &Block) -> Option<Token> {
        self.tokens.get(block).copied()
    }

    /// Existing token for `block`, registering it on first sight.
    ///
    /// Never fails: a frozen or full catalog answers with the placeholder
    /// token instead, which makes encoding of such blocks lossy.
    pub fn block_to_token(&mut self, block: &Block) -> Token {
        if let Some(token) = self.token_for(block) {
            return token;
        }
        // The counter must stay representable after this assignment.
        let has_room = self.next_token < Token::MAX
            && self
                .capacity
                .map_or(true, |capacity| (self.next_token as usize) < capacity);
        if self.frozen || !has_room {
            let placeholder = self.placeholder_token();
            if self.degraded.insert(block.clone()) {
                log::warn!(
                    "catalog cannot register {block} (frozen={}, capacity={:?}); using placeholder token {placeholder}",
                    self.frozen,
                    self.capacity,
                );
            }
            return placeholder;
        }
        let token = self.next_token;
        self.bind(token, block.clone());
        log::trace!("registered {block} as token {token}");
        token
    }

    pub fn token_to_block(&self, token: Token) -> Result<&Block, CatalogError> {
        self.blocks
            .get(&token)
            .ok_or(CatalogError::UnknownToken(token))
    }

    fn bind(&mut self, token: Token, block: Block) {
        self.tokens.insert(block.clone(), token);
        self.blocks.insert(token, block);
        if let Some(next) = token.checked_add(1) {
            self.next_token = self.next_token.max(next);
        }
    }

    // -----------------------------------------------------------------------
    // Persistence boundary
    // -----------------------------------------------------------------------

    /// Rebuild a catalog from a persisted mapping. The counter resumes after
    /// the largest token present.
    pub fn load(entries: impl IntoIterator<Item = CatalogEntry>) -> Result<Self, CatalogError> {
        let mut catalog = Self::empty();
        for CatalogEntry { token, block } in entries {
            if token == Token::MAX {
                return Err(CatalogError::TokenOutOfRange(token));
            }
            if let Some(first) = catalog.blocks.get(&token) {
                return Err(CatalogError::DuplicateToken {
                    token,
                    first: first.clone(),
                    second: block,
                });
            }
            if let Some(&first) = catalog.tokens.get(&block) {
                return Err(CatalogError::DuplicateBlock {
                    block,
                    first,
                    second: token,
                });
            }
            catalog.bind(token, block);
        }
        Ok(catalog)
    }

    /// All bindings in token order.
    pub fn dump(&self) -> Vec<CatalogEntry> {
        self.blocks
            .iter()
            .map(|(&token, block)| CatalogEntry {
                token,
                block: block.clone(),
            })
            .collect()
    }

    pub fn save_json(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = CatalogFile {
            schema_version: CATALOG_SCHEMA_VERSION,
            entries: self.dump(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        std::fs::write(path, bytes)?;
        log::debug!("saved {} catalog entries to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read(path)?;
        let file: CatalogFile = serde_json::from_slice(&raw)?;
        if file.schema_version != CATALOG_SCHEMA_VERSION {
            return Err(CatalogError::UnsupportedSchemaVersion {
                expected: CATALOG_SCHEMA_VERSION,
                actual: file.schema_version,
            });
        }
        let catalog = Self::load(file.entries)?;
        log::debug!("loaded {} catalog entries from {}", catalog.len(), path.display());
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EMPTY_TOKEN;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_UNIQUIFIER: AtomicU64 = AtomicU64::new(0);

    fn test_path(name: &str) -> PathBuf {
        let serial = TEST_UNIQUIFIER.fetch_add(1, Ordering::Relaxed);
        let mut path = std::env::temp_dir();
        path.push(format!(
            "voxel-catalog-{name}-{}-{}.json",
            std::process::id(),
            serial
        ));
        path
    }

    fn entry(token: Token, id: &str) -> CatalogEntry {
        CatalogEntry {
            token,
            block: Block::new(id),
        }
    }

    #[test]
    fn fresh_catalog_reserves_unset_and_binds_air() {
        let catalog = TokenCatalog::new();
        assert_eq!(catalog.air_token(), Some(EMPTY_TOKEN));
        assert!(matches!(
            catalog.token_to_block(UNSET_TOKEN),
            Err(CatalogError::UnknownToken(0))
        ));
        assert_eq!(catalog.next_token(), 2);
    }

    #[test]
    fn registration_is_monotonic_and_stable() {
        let mut catalog = TokenCatalog::new();
        let stone = Block::new("stone");
        let dirt = Block::new("dirt");
        assert_eq!(catalog.block_to_token(&stone), 2);
        assert_eq!(catalog.block_to_token(&dirt), 3);
        assert_eq!(catalog.block_to_token(&stone), 2);
        assert_eq!(catalog.token_to_block(3).unwrap(), &dirt);
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn property_variants_get_distinct_tokens() {
        let mut catalog = TokenCatalog::new();
        let north = Block::new("oak_stairs").with_property("facing", "north");
        let south = Block::new("oak_stairs").with_property("facing", "south");
        assert_ne!(catalog.block_to_token(&north), catalog.block_to_token(&south));
    }

    #[test]
    fn frozen_catalog_degrades_to_placeholder() {
        let mut catalog = TokenCatalog::new();
        let stone = catalog.block_to_token(&Block::new("stone"));
        catalog.freeze();
        assert_eq!(catalog.block_to_token(&Block::new("stone")), stone);
        assert_eq!(catalog.block_to_token(&Block::new("gold_block")), EMPTY_TOKEN);
        assert_eq!(catalog.token_for(&Block::new("gold_block")), None);

        catalog.set_placeholder(stone).unwrap();
        assert_eq!(catalog.block_to_token(&Block::new("gold_block")), stone);
        assert_eq!(catalog.placeholder_block(), Some(&Block::new("stone")));
    }

    #[test]
    fn capacity_bounds_assignable_tokens() {
        let mut catalog = TokenCatalog::new().with_capacity(3);
        assert_eq!(catalog.block_to_token(&Block::new("stone")), 2);
        assert_eq!(catalog.block_to_token(&Block::new("dirt")), EMPTY_TOKEN);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn placeholder_must_be_bound() {
        let mut catalog = TokenCatalog::new();
        assert!(matches!(
            catalog.set_placeholder(42),
            Err(CatalogError::UnknownToken(42))
        ));
    }

    #[test]
    fn load_resumes_after_largest_token() {
        let mut catalog =
            TokenCatalog::load([entry(0, "air"), entry(1, "stone"), entry(2, "dirt")]).unwrap();
        assert_eq!(catalog.air_token(), Some(0));
        assert_eq!(catalog.block_to_token(&Block::new("sand")), 3);
    }

    #[test]
    fn load_rejects_non_bijective_mappings() {
        assert!(matches!(
            TokenCatalog::load([entry(2, "stone"), entry(2, "dirt")]),
            Err(CatalogError::DuplicateToken { token: 2, .. })
        ));
        assert!(matches!(
            TokenCatalog::load([entry(2, "stone"), entry(3, "stone")]),
            Err(CatalogError::DuplicateBlock { first: 2, second: 3, .. })
        ));
    }

    #[test]
    fn dump_then_load_reproduces_assignments() {
        let mut catalog = TokenCatalog::new();
        for id in ["stone", "dirt", "oak_log", "glass"] {
            catalog.block_to_token(&Block::new(id));
        }
        let dumped = catalog.dump();
        assert!(dumped.windows(2).all(|pair| pair[0].token < pair[1].token));

        let mut restored = TokenCatalog::load(dumped).unwrap();
        assert_eq!(restored, catalog);
        assert_eq!(
            restored.block_to_token(&Block::new("sand")),
            catalog.clone().block_to_token(&Block::new("sand"))
        );
    }

    #[test]
    fn json_file_persistence() {
        let path = test_path("roundtrip");
        let mut catalog = TokenCatalog::new();
        catalog.block_to_token(&Block::new("stone").with_property("variant", "smooth"));
        catalog.save_json(&path).expect("save catalog");

        let restored = TokenCatalog::load_json(&path).expect("load catalog");
        assert_eq!(restored, catalog);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn json_rejects_unknown_schema_version() {
        let path = test_path("schema");
        std::fs::write(&path, br#"{"schema_version": 99, "entries": []}"#).unwrap();
        assert!(matches!(
            TokenCatalog::load_json(&path),
            Err(CatalogError::UnsupportedSchemaVersion { actual: 99, .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_rejects_the_largest_token() {
        let entries = [CatalogEntry {
            token: Token::MAX,
            block: Block::new("stone"),
        }];
        assert!(matches!(
            TokenCatalog::load(entries),
            Err(CatalogError::TokenOutOfRange(Token::MAX))
        ));
    }

    #[test]
    fn exhausted_counter_degrades_to_placeholder() {
        let mut catalog = TokenCatalog::load([
            CatalogEntry {
                token: 1,
                block: Block::air(),
            },
            CatalogEntry {
                token: Token::MAX - 1,
                block: Block::new("stone"),
            },
        ])
        .unwrap();
        assert_eq!(catalog.next_token(), Token::MAX);

        assert_eq!(catalog.block_to_token(&Block::new("dirt")), 1);
        assert_eq!(catalog.token_for(&Block::new("dirt")), None);
        assert_eq!(catalog.next_token(), Token::MAX);
    }
}
