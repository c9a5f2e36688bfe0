//! StorletExecution - Execute の本体（実行ユニット）
//!
//! 1. storlet の `invoke` をちょうど 1 回呼ぶ（キャンセル信号と競合させる）
//! 2. 結果にかかわらずファイナライザを走らせる
//!    - logger を flush して close
//!    - 入力・出力ストリームをすべて close（close は冪等）
//!
//! UserError と キャンセルは storlet ロガー（呼び出し元に返るログ）と `tracing` の
//! 両方に残して、ここで握りつぶします。デーモンには伝播させません。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::execution::{CancelSignal, ExecutionUnit};
use crate::ports::Storlet;
use crate::stream::{InputStream, StorletLogger, StorletOutput};

/// How one execution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

pub struct StorletExecution {
    storlet: Arc<dyn Storlet>,
    inputs: Vec<InputStream>,
    outputs: Vec<StorletOutput>,
    params: HashMap<String, String>,
    logger: StorletLogger,
}

impl StorletExecution {
    pub fn new(
        storlet: Arc<dyn Storlet>,
        inputs: Vec<InputStream>,
        outputs: Vec<StorletOutput>,
        params: HashMap<String, String>,
        logger: StorletLogger,
    ) -> Self {
        let logger = logger.named(storlet.name());
        Self {
            storlet,
            inputs,
            outputs,
            params,
            logger,
        }
    }

    pub async fn run(mut self, mut cancel: CancelSignal) -> ExecutionOutcome {
        let storlet = self.storlet.name().to_string();

        let outcome = {
            let invoke = self.storlet.invoke(
                &mut self.inputs,
                &mut self.outputs,
                &self.params,
                &mut self.logger,
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => ExecutionOutcome::Cancelled,
                result = invoke => match result {
                    Ok(()) => ExecutionOutcome::Completed,
                    Err(e) => ExecutionOutcome::Failed(e.to_string()),
                },
            }
        };

        match &outcome {
            ExecutionOutcome::Completed => tracing::debug!(%storlet, "storlet completed"),
            ExecutionOutcome::Failed(message) => {
                tracing::error!(%storlet, error = %message, "storlet failed");
                self.logger.error(message).await;
            }
            ExecutionOutcome::Cancelled => {
                tracing::info!(%storlet, "storlet cancelled");
                self.logger.warn("execution cancelled").await;
            }
        }

        self.finalize().await;
        outcome
    }

    async fn finalize(&mut self) {
        self.logger.close().await;
        for input in &mut self.inputs {
            input.close();
        }
        for output in &mut self.outputs {
            output.close().await;
        }
    }
}

#[async_trait]
impl ExecutionUnit for StorletExecution {
    async fn run(self: Box<Self>, cancel: CancelSignal) {
        StorletExecution::run(*self, cancel).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorletError;
    use crate::stream::ObjectOutputStream;
    use std::fs::File as StdFile;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::OwnedFd;
    use tokio::io::AsyncWriteExt;

    /// Upper-cases input 0 into output 0.
    struct Upper;

    #[async_trait]
    impl Storlet for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        async fn invoke(
            &self,
            inputs: &mut [InputStream],
            outputs: &mut [StorletOutput],
            _params: &HashMap<String, String>,
            logger: &mut StorletLogger,
        ) -> Result<(), StorletError> {
            let body = inputs[0].read_to_end_bytes().await?;
            let out = outputs[0].object_mut()?;
            out.set_metadata(&HashMap::new()).await?;
            out.write_all(&body.to_ascii_uppercase()).await?;
            logger.emit("done").await;
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Storlet for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn invoke(
            &self,
            _inputs: &mut [InputStream],
            _outputs: &mut [StorletOutput],
            _params: &HashMap<String, String>,
            logger: &mut StorletLogger,
        ) -> Result<(), StorletError> {
            logger.emit("about to fail").await;
            Err(StorletError::user("boom"))
        }
    }

    struct Forever;

    #[async_trait]
    impl Storlet for Forever {
        fn name(&self) -> &str {
            "forever"
        }

        async fn invoke(
            &self,
            _inputs: &mut [InputStream],
            _outputs: &mut [StorletOutput],
            _params: &HashMap<String, String>,
            _logger: &mut StorletLogger,
        ) -> Result<(), StorletError> {
            std::future::pending().await
        }
    }

    fn file_with(content: &[u8]) -> StdFile {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(content).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        file
    }

    fn read_all(mut file: StdFile) -> String {
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    fn dup(file: &StdFile) -> OwnedFd {
        OwnedFd::from(file.try_clone().unwrap())
    }

    fn execution(
        storlet: Arc<dyn Storlet>,
        input: &StdFile,
        data: &StdFile,
        md: &StdFile,
        log: &StdFile,
    ) -> StorletExecution {
        StorletExecution::new(
            storlet,
            vec![InputStream::new(dup(input), HashMap::new())],
            vec![StorletOutput::Object(ObjectOutputStream::new(dup(data), dup(md)))],
            HashMap::new(),
            StorletLogger::new(dup(log)),
        )
    }

    #[tokio::test]
    async fn success_runs_finalizer() {
        let (input, data, md, log) = (
            file_with(b"abc"),
            tempfile::tempfile().unwrap(),
            tempfile::tempfile().unwrap(),
            tempfile::tempfile().unwrap(),
        );
        let exec = execution(Arc::new(Upper), &input, &data, &md, &log);

        let outcome = exec.run(CancelSignal::never()).await;

        assert_eq!(outcome, ExecutionOutcome::Completed);
        assert_eq!(read_all(data), "ABC");
        assert_eq!(read_all(log), "done\n");
    }

    #[tokio::test]
    async fn user_error_is_contained_and_logger_flushed() {
        let (input, data, md, log) = (
            file_with(b"abc"),
            tempfile::tempfile().unwrap(),
            tempfile::tempfile().unwrap(),
            tempfile::tempfile().unwrap(),
        );
        let exec = execution(Arc::new(Failing), &input, &data, &md, &log);

        let outcome = exec.run(CancelSignal::never()).await;

        assert_eq!(outcome, ExecutionOutcome::Failed("boom".to_string()));
        assert_eq!(read_all(log), "about to fail\nfailing ERROR: boom\n");
    }

    #[tokio::test]
    async fn streams_are_closed_after_run() {
        // パイプの書き込み側がすべて閉じられていれば、読み込み側は EOF になる
        let (data_read, data_write) = nix::unistd::pipe().unwrap();
        let (md_read, md_write) = nix::unistd::pipe().unwrap();
        let input = file_with(b"xyz");

        let exec = StorletExecution::new(
            Arc::new(Upper),
            vec![InputStream::new(dup(&input), HashMap::new())],
            vec![StorletOutput::Object(ObjectOutputStream::new(data_write, md_write))],
            HashMap::new(),
            StorletLogger::discard(),
        );
        assert_eq!(exec.run(CancelSignal::never()).await, ExecutionOutcome::Completed);

        let mut out = String::new();
        StdFile::from(data_read).read_to_string(&mut out).unwrap();
        assert_eq!(out, "XYZ");
        let mut meta = String::new();
        StdFile::from(md_read).read_to_string(&mut meta).unwrap();
        assert_eq!(meta, "{}");
    }

    #[tokio::test]
    async fn cancellation_interrupts_and_still_finalizes() {
        let (log_read, log_write) = nix::unistd::pipe().unwrap();
        let exec = StorletExecution::new(
            Arc::new(Forever),
            Vec::new(),
            Vec::new(),
            HashMap::new(),
            StorletLogger::new(log_write),
        );

        let (tx, rx) = tokio::sync::watch::channel(false);
        let signal = CancelSignal::from_receiver(rx);
        let handle = tokio::spawn(exec.run(signal));
        tx.send(true).unwrap();

        assert_eq!(handle.await.unwrap(), ExecutionOutcome::Cancelled);
        let mut out = String::new();
        StdFile::from(log_read).read_to_string(&mut out).unwrap();
        assert_eq!(out, "forever WARN: execution cancelled\n");
    }
}
