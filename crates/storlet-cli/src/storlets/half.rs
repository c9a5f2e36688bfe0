//! half - 入力 0 のバイトを 1 つおきに出力 0 へ書く（先頭バイトは残す）

use std::collections::HashMap;

use async_trait::async_trait;
use storlet_core::domain::StorletError;
use storlet_core::ports::Storlet;
use storlet_core::stream::{InputStream, StorletLogger, StorletOutput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const CHUNK_SIZE: usize = 8192;

pub struct Half;

#[async_trait]
impl Storlet for Half {
    fn name(&self) -> &str {
        "half"
    }

    async fn invoke(
        &self,
        inputs: &mut [InputStream],
        outputs: &mut [StorletOutput],
        _params: &HashMap<String, String>,
        logger: &mut StorletLogger,
    ) -> Result<(), StorletError> {
        logger.emit("half invoked").await;

        let input = inputs
            .first_mut()
            .ok_or_else(|| StorletError::user("half requires an input object"))?;
        let out = outputs
            .first_mut()
            .ok_or_else(|| StorletError::user("half requires an output object"))?
            .object_mut()?;

        out.set_metadata(input.metadata()).await?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        // 偶奇はチャンク境界をまたいで引き継ぐ
        let mut keep = true;
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let mut kept = Vec::with_capacity(n / 2 + 1);
            for &byte in &buf[..n] {
                if keep {
                    kept.push(byte);
                }
                keep = !keep;
            }
            out.write_all(&kept).await?;
        }
        out.close().await?;

        logger.emit("half done").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storlets::testing::{output_pair, read_back, temp_input};

    #[tokio::test]
    async fn keeps_every_other_byte() {
        let origin = HashMap::from([("X-Object-Meta-Color".to_string(), "blue".to_string())]);
        let mut inputs = vec![InputStream::new(temp_input(b"abcdefg"), origin)];
        let (out, data, md) = output_pair();
        let mut outputs = vec![StorletOutput::Object(out)];

        Half.invoke(&mut inputs, &mut outputs, &HashMap::new(), &mut StorletLogger::discard())
            .await
            .unwrap();

        assert_eq!(read_back(data), b"aceg");
        let metadata: HashMap<String, String> = serde_json::from_slice(&read_back(md)).unwrap();
        assert_eq!(metadata["X-Object-Meta-Color"], "blue");
    }

    #[tokio::test]
    async fn missing_output_is_user_error() {
        let mut inputs = vec![InputStream::new(temp_input(b"ab"), HashMap::new())];
        let mut outputs: Vec<StorletOutput> = Vec::new();

        let err = Half
            .invoke(&mut inputs, &mut outputs, &HashMap::new(), &mut StorletLogger::discard())
            .await
            .unwrap_err();
        assert!(matches!(err, StorletError::User(_)));
    }
}
