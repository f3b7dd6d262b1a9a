use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{BatchChannel, BatchKind, BatchPipe, BatchProvider};
use crate::config::BatchConfig;
use crate::error::{ProtocolError, ProtocolResult};
use crate::pool::PipePool;

/// A running `git cat-file --batch[-check]` process.
pub struct ProcessPipe {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ProcessPipe {
    pub fn spawn(config: &BatchConfig, repo_path: &Path, kind: BatchKind) -> ProtocolResult<Self> {
        let mut child = Command::new(&config.git_binary)
            .arg("cat-file")
            .arg(kind.flag())
            .current_dir(repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ProtocolError::Acquire(format!(
                    "spawning {} cat-file {}: {e}",
                    config.git_binary.display(),
                    kind.flag()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProtocolError::Acquire("cat-file pipes unavailable".into()));
        };
        debug!(%kind, pid = child.id(), repo = %repo_path.display(), "spawned batch process");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::with_capacity(config.read_buffer_capacity, stdout),
        })
    }
}

impl BatchPipe for ProcessPipe {
    fn writer(&mut self) -> &mut dyn Write {
        &mut self.stdin
    }

    fn reader(&mut self) -> &mut dyn BufRead {
        &mut self.stdout
    }
}

impl Drop for ProcessPipe {
    fn drop(&mut self) {
        let pid = self.child.id();
        if let Err(e) = self.child.kill() {
            warn!(pid, error = %e, "failed to kill batch process");
        }
        let _ = self.child.wait();
        debug!(pid, "batch process stopped");
    }
}

/// Provider backed by real `cat-file` processes in one repository.
///
/// Each flavor has its own pool; a lease gets an idle aligned process or a
/// freshly spawned one.
#[derive(Debug)]
pub struct ProcessBatchProvider {
    repo_path: PathBuf,
    config: BatchConfig,
    check: Arc<PipePool>,
    content: Arc<PipePool>,
}

impl ProcessBatchProvider {
    pub fn new(repo_path: impl Into<PathBuf>, config: BatchConfig) -> Self {
        let max_idle = config.max_idle_pipes;
        Self {
            repo_path: repo_path.into(),
            config,
            check: PipePool::new(BatchKind::Check, max_idle),
            content: PipePool::new(BatchKind::Content, max_idle),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn idle_pipes(&self, kind: BatchKind) -> usize {
        self.pool(kind).idle_count()
    }

    fn pool(&self, kind: BatchKind) -> &Arc<PipePool> {
        match kind {
            BatchKind::Check => &self.check,
            BatchKind::Content => &self.content,
        }
    }
}

impl BatchProvider for ProcessBatchProvider {
    fn acquire(&self, kind: BatchKind) -> ProtocolResult<BatchChannel> {
        self.pool(kind).checkout(|| {
            let pipe = ProcessPipe::spawn(&self.config, &self.repo_path, kind)?;
            Ok(Box::new(pipe) as Box<dyn BatchPipe>)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::process::Command;

    use gitbatch_types::{ObjectFormat, ObjectId, ObjectKind};

    use super::*;
    use crate::error::ProtocolError;
    use crate::reader::BoundedReader;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str], stdin: Option<&[u8]>) -> String {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        if let Some(data) = stdin {
            child.stdin.take().unwrap().write_all(data).unwrap();
        } else {
            drop(child.stdin.take());
        }
        let out = child.wait_with_output().unwrap();
        assert!(out.status.success(), "git {args:?} failed");
        String::from_utf8(out.stdout).unwrap().trim().to_string()
    }

    #[test]
    fn reads_blobs_from_a_real_repository() {
        if !git_available() {
            eprintln!("git not found; skipping");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        git(dir.path(), &["init", "-q"], None);
        let hex = git(dir.path(), &["hash-object", "-w", "--stdin"], Some(b"file2\n"));
        let id = ObjectId::from_hex(&hex).unwrap();
        assert_eq!(id, ObjectFormat::Sha1.hash_object(ObjectKind::Blob, b"file2\n"));

        let provider = ProcessBatchProvider::new(dir.path(), BatchConfig::default());

        let mut check = provider.acquire(BatchKind::Check).unwrap();
        check.request(&id).unwrap();
        let header = check.read_header().unwrap();
        assert_eq!((header.kind, header.size), (ObjectKind::Blob, 6));
        check.release();
        assert_eq!(provider.idle_pipes(BatchKind::Check), 1);

        for _ in 0..2 {
            let mut channel = provider.acquire(BatchKind::Content).unwrap();
            channel.request(&id).unwrap();
            let header = channel.read_header().unwrap();
            let mut rd = BoundedReader::truncated(channel, header.size, 4);
            let mut out = String::new();
            rd.read_to_string(&mut out).unwrap();
            assert_eq!(out, "file");
            rd.close().unwrap();
        }
        assert_eq!(provider.idle_pipes(BatchKind::Content), 1);

        let mut channel = provider.acquire(BatchKind::Content).unwrap();
        let missing = ObjectId::from_hex("0000000000000000000000000000000000000001").unwrap();
        channel.request(&missing).unwrap();
        assert!(matches!(
            channel.read_header(),
            Err(ProtocolError::NotExist { .. })
        ));
        channel.release();
    }

    #[test]
    fn missing_binary_is_an_acquire_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            git_binary: dir.path().join("no-such-git"),
            ..BatchConfig::default()
        };
        let provider = ProcessBatchProvider::new(dir.path(), config);
        let err = provider.acquire(BatchKind::Content).unwrap_err();
        assert!(matches!(err, ProtocolError::Acquire(_)));
    }
}
