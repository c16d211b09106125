use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command as TokioCommand;

/// A fully resolved encoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeCommand {
    pub program: String,
    pub args: Vec<OsString>,
    /// Directory the invocation writes into.
    pub output_dir: PathBuf,
}

impl EncodeCommand {
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Runs the external transcoder. The only place a child process is spawned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscodeExecutor: Send + Sync {
    async fn run(&self, command: &EncodeCommand) -> io::Result<Output>;
}

pub struct RealTranscodeExecutor {
    timeout: Duration,
}

impl RealTranscodeExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl TranscodeExecutor for RealTranscodeExecutor {
    async fn run(&self, command: &EncodeCommand) -> io::Result<Output> {
        let mut child = TokioCommand::new(&command.program);
        child
            .args(&command.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Dropping the output future on timeout kills the child.
        match tokio::time::timeout(self.timeout, child.output()).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("encoder did not finish within {}s", self.timeout.as_secs()),
            )),
        }
    }
}
