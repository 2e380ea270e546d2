use rust_embed::Embed;
use wm_core::bundle::EmbeddedTree;
use wm_core::paths::UPSTREAM_PREFIX;

/// Default configuration shipped with this build. Only `assets/system/` is
/// part of the synced tree.
#[derive(Embed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
pub struct Assets;

pub fn upstream() -> EmbeddedTree<Assets> {
    EmbeddedTree::new(UPSTREAM_PREFIX)
}
