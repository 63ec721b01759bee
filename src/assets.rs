//! Asset Access
//!
//! The asset system proper (content-addressed storage, dependency
//! loading) is an external collaborator; this module is the narrow
//! contract the renderer consumes from it:
//!
//! - stable 128-bit asset UIDs rendered as hex strings,
//! - virtual path resolution (`/Engine/...`, `/Game/...`) against a set
//!   of candidate roots, and
//! - raw byte loading, with built-in shaders falling back to an
//!   embedded copy so the engine runs without an on-disk asset tree.

use std::path::{Path, PathBuf};

use rust_embed::RustEmbed;
use uuid::Uuid;

use crate::errors::{EmberError, Result};

/// Shaders compiled into the binary; the disk copy (when present) wins
/// so shaders can be iterated without rebuilding.
#[derive(RustEmbed)]
#[folder = "assets/shaders"]
pub struct EmbeddedShaders;

// ─── UIDs ─────────────────────────────────────────────────────────────────────

/// Stable 128-bit asset identifier, rendered as a hex string on disk.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct AssetUid(Uuid);

impl AssetUid {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }

    pub fn parse_hex(text: &str) -> Result<Self> {
        Uuid::parse_str(text)
            .map(Self)
            .map_err(|e| EmberError::DeserializationError {
                path: text.to_string(),
                detail: format!("invalid asset uid: {e}"),
            })
    }
}

impl std::fmt::Display for AssetUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ─── Virtual paths ────────────────────────────────────────────────────────────

const ENGINE_PREFIX: &str = "/Engine/";
const GAME_PREFIX: &str = "/Game/";

/// Physical roots behind the virtual asset hierarchy.
///
/// The engine searches multiple candidate directories at startup and
/// picks the first existing one.
#[derive(Clone, Debug)]
pub struct AssetRoots {
    engine_root: Option<PathBuf>,
    game_root: Option<PathBuf>,
}

impl AssetRoots {
    /// Probe the default candidate directories.
    #[must_use]
    pub fn discover() -> Self {
        let candidates = [
            PathBuf::from("assets"),
            PathBuf::from("../assets"),
            Path::new(env!("CARGO_MANIFEST_DIR")).join("assets"),
        ];
        let engine_root = candidates.iter().find(|p| p.is_dir()).cloned();
        if engine_root.is_none() {
            log::warn!("no engine asset root found; embedded assets only");
        }
        Self {
            engine_root,
            game_root: None,
        }
    }

    #[must_use]
    pub fn with_roots(engine_root: impl Into<PathBuf>, game_root: Option<PathBuf>) -> Self {
        Self {
            engine_root: Some(engine_root.into()),
            game_root,
        }
    }

    /// Resolve a virtual path to a physical one. Paths without a
    /// virtual prefix are treated as already physical.
    #[must_use]
    pub fn resolve(&self, virtual_path: &str) -> Option<PathBuf> {
        if let Some(rest) = virtual_path.strip_prefix(ENGINE_PREFIX) {
            return self.engine_root.as_ref().map(|root| root.join(rest));
        }
        if let Some(rest) = virtual_path.strip_prefix(GAME_PREFIX) {
            return self.game_root.as_ref().map(|root| root.join(rest));
        }
        Some(PathBuf::from(virtual_path))
    }

    /// Load the bytes behind a virtual path.
    pub fn load_bytes(&self, virtual_path: &str) -> Result<Vec<u8>> {
        if let Some(path) = self.resolve(virtual_path) {
            if path.is_file() {
                return Ok(std::fs::read(path)?);
            }
        }
        // Built-in shaders ship embedded.
        if let Some(rest) = virtual_path.strip_prefix("/Engine/shaders/") {
            if let Some(embedded) = EmbeddedShaders::get(rest) {
                return Ok(embedded.data.into_owned());
            }
        }
        if let Some(embedded) = EmbeddedShaders::get(virtual_path) {
            return Ok(embedded.data.into_owned());
        }
        Err(EmberError::AssetNotFound(virtual_path.to_string()))
    }
}

impl Default for AssetRoots {
    fn default() -> Self {
        Self::discover()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_hex_round_trip() {
        let uid = AssetUid::generate();
        let hex = uid.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(AssetUid::parse_hex(&hex).unwrap(), uid);
    }

    #[test]
    fn embedded_shaders_are_reachable() {
        let roots = AssetRoots {
            engine_root: None,
            game_root: None,
        };
        let bytes = roots.load_bytes("/Engine/shaders/blit.wgsl").unwrap();
        assert!(!bytes.is_empty());
    }
}
