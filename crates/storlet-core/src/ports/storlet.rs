//! Storlet port - ユーザー処理ロジックの呼び出し契約
//!
//! デーモンは起動時に名前で 1 つの storlet を選び、Execute ごとに
//! `invoke` を 1 回呼びます。失敗は `StorletError::User` で返します。
//!
//! ストリームの close はデーモン側（実行ユニットのファイナライザ）が行うので、
//! storlet 側で close する必要はありません（しても二重 close にはならない）。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::StorletError;
use crate::stream::{InputStream, StorletLogger, StorletOutput};

/// User processing logic.
///
/// # 使用例
/// ```ignore
/// struct Upper;
///
/// #[async_trait]
/// impl Storlet for Upper {
///     fn name(&self) -> &str { "upper" }
///
///     async fn invoke(&self, inputs: &mut [InputStream], outputs: &mut [StorletOutput],
///                     _params: &HashMap<String, String>, _logger: &mut StorletLogger)
///         -> Result<(), StorletError>
///     {
///         let body = inputs[0].read_to_end_bytes().await?;
///         let out = outputs[0].object_mut()?;
///         out.set_metadata(inputs[0].metadata()).await?;
///         out.write_all(&body.to_ascii_uppercase()).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Storlet: Send + Sync {
    /// Name the daemon selects this storlet by.
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        inputs: &mut [InputStream],
        outputs: &mut [StorletOutput],
        params: &HashMap<String, String>,
        logger: &mut StorletLogger,
    ) -> Result<(), StorletError>;
}
