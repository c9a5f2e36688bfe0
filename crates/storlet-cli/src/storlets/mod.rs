//! 同梱 storlet と静的登録テーブル
//!
//! 実行時のロードはしません。ここに並べたものだけが `storlet_name` で選べます。

mod half;
mod identity;

pub use half::Half;
pub use identity::Identity;

use storlet_core::app::{RegistryError, StorletRegistry};

/// Registry holding every bundled storlet.
pub fn registry() -> Result<StorletRegistry, RegistryError> {
    let mut registry = StorletRegistry::new();
    registry.register(Identity)?;
    registry.register(Half)?;
    Ok(registry)
}
