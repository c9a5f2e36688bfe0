//! identity - 入力 0 をそのまま出力 0 にコピーする
//!
//! パラメータ:
//! - `chunk_size`: 1 回の読み込みサイズ（既定 65536）
//! - `double`: `true` なら各チャンクを 2 回書く
//!
//! 出力メタデータは入力のメタデータに `Parameter-<key>` を足したもの。
//! 出力がコンテナハンドルなら `<container>/copy_target` を要求して書きます。

use std::collections::HashMap;

use async_trait::async_trait;
use storlet_core::domain::StorletError;
use storlet_core::ports::Storlet;
use storlet_core::stream::{InputStream, ObjectOutputStream, StorletLogger, StorletOutput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const DEFAULT_CHUNK_SIZE: usize = 65536;

pub struct Identity;

#[async_trait]
impl Storlet for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    async fn invoke(
        &self,
        inputs: &mut [InputStream],
        outputs: &mut [StorletOutput],
        params: &HashMap<String, String>,
        logger: &mut StorletLogger,
    ) -> Result<(), StorletError> {
        logger.emit("identity invoked").await;

        let chunk_size = match params.get("chunk_size") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| StorletError::user("The chunk_size parameter is not an integer"))?,
            None => DEFAULT_CHUNK_SIZE,
        };
        let double = params.get("double").is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let input = inputs
            .first_mut()
            .ok_or_else(|| StorletError::user("identity requires an input object"))?;
        let output = outputs
            .first_mut()
            .ok_or_else(|| StorletError::user("identity requires an output"))?;

        let mut metadata = input.metadata().clone();
        for (key, value) in params {
            metadata.insert(format!("Parameter-{key}"), value.clone());
        }

        let mut requested: ObjectOutputStream;
        let out = match output {
            StorletOutput::Object(out) => out,
            StorletOutput::Container(handle) => {
                let object_name = format!("{}/copy_target", handle.container_name());
                logger.emit(&format!("requesting output object {object_name}")).await;
                requested = handle.object_output_stream(&object_name).await?;
                handle.close().await;
                &mut requested
            }
        };

        out.set_metadata(&metadata).await?;

        let mut buf = vec![0u8; chunk_size];
        let mut total = 0usize;
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            if double {
                out.write_all(&buf[..n]).await?;
            }
            total += n;
        }
        out.close().await?;

        logger.emit(&format!("identity copied {total} bytes")).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storlets::testing::{output_pair, read_back, temp_input};

    #[tokio::test]
    async fn copies_data_and_metadata_with_parameters() {
        let origin = HashMap::from([("Content-Type".to_string(), "text/plain".to_string())]);
        let mut inputs = vec![InputStream::new(temp_input(b"some object body"), origin)];
        let (out, data, md) = output_pair();
        let mut outputs = vec![StorletOutput::Object(out)];
        let params = HashMap::from([("chunk_size".to_string(), "3".to_string())]);

        Identity
            .invoke(&mut inputs, &mut outputs, &params, &mut StorletLogger::discard())
            .await
            .unwrap();

        assert_eq!(read_back(data), b"some object body");
        let metadata: HashMap<String, String> = serde_json::from_slice(&read_back(md)).unwrap();
        assert_eq!(metadata["Content-Type"], "text/plain");
        assert_eq!(metadata["Parameter-chunk_size"], "3");
    }

    #[tokio::test]
    async fn double_writes_every_chunk_twice() {
        let mut inputs = vec![InputStream::new(temp_input(b"ab"), HashMap::new())];
        let (out, data, _md) = output_pair();
        let mut outputs = vec![StorletOutput::Object(out)];
        let params = HashMap::from([("double".to_string(), "true".to_string())]);

        Identity
            .invoke(&mut inputs, &mut outputs, &params, &mut StorletLogger::discard())
            .await
            .unwrap();
        assert_eq!(read_back(data), b"abab");
    }

    #[tokio::test]
    async fn bad_chunk_size_is_user_error() {
        let mut inputs = vec![InputStream::new(temp_input(b"x"), HashMap::new())];
        let (out, _data, _md) = output_pair();
        let mut outputs = vec![StorletOutput::Object(out)];
        let params = HashMap::from([("chunk_size".to_string(), "lots".to_string())]);

        let err = Identity
            .invoke(&mut inputs, &mut outputs, &params, &mut StorletLogger::discard())
            .await
            .unwrap_err();
        assert!(matches!(err, StorletError::User(_)));
    }
}
