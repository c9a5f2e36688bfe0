//! StorletRegistry - 名前から storlet を引く静的テーブル
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Arc による共有所有権
//! - 起動時に一度だけ解決する（実行時の動的ロードはしない）

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::Storlet;

#[derive(Default)]
pub struct StorletRegistry {
    storlets: HashMap<String, Arc<dyn Storlet>>,
}

/// RegistryError は StorletRegistry の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("storlet '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl StorletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: Storlet + 'static>(&mut self, storlet: S) -> Result<(), RegistryError> {
        let name = storlet.name().to_string();
        if self.storlets.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.storlets.insert(name, Arc::new(storlet));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Storlet>> {
        self.storlets.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.storlets.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorletError;
    use crate::stream::{InputStream, StorletLogger, StorletOutput};
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Storlet for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(
            &self,
            _inputs: &mut [InputStream],
            _outputs: &mut [StorletOutput],
            _params: &HashMap<String, String>,
            _logger: &mut StorletLogger,
        ) -> Result<(), StorletError> {
            Ok(())
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = StorletRegistry::new();
        registry.register(Named("identity")).unwrap();

        let storlet = registry.get("identity").unwrap();
        assert_eq!(storlet.name(), "identity");
        assert!(registry.get("half").is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = StorletRegistry::new();
        registry.register(Named("identity")).unwrap();
        let result = registry.register(Named("identity"));
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(n)) if n == "identity"));
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = StorletRegistry::new();
        registry.register(Named("half")).unwrap();
        registry.register(Named("identity")).unwrap();
        assert_eq!(registry.names(), vec!["half", "identity"]);
    }
}
