use std::collections::{HashMap, VecDeque};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use gitbatch_types::{EntryMode, ObjectFormat, ObjectId, ObjectKind};
use tracing::trace;

use crate::channel::{BatchChannel, BatchKind, BatchPipe, BatchProvider};
use crate::config::BatchConfig;
use crate::error::ProtocolResult;
use crate::pool::PipePool;

type ObjectMap = HashMap<ObjectId, (ObjectKind, Arc<[u8]>)>;

/// In-memory object database that answers requests over the exact
/// `cat-file --batch` wire format.
///
/// Pipes are pooled the same way [`ProcessBatchProvider`](crate::ProcessBatchProvider)
/// pools processes, so reuse and desynchronisation behave identically.
#[derive(Debug)]
pub struct MemoryBatchProvider {
    format: ObjectFormat,
    objects: Arc<RwLock<ObjectMap>>,
    read_buffer_capacity: usize,
    check: Arc<PipePool>,
    content: Arc<PipePool>,
    spawned: AtomicUsize,
}

impl MemoryBatchProvider {
    pub fn new(format: ObjectFormat) -> Self {
        Self::with_config(format, &BatchConfig::default())
    }

    pub fn with_config(format: ObjectFormat, config: &BatchConfig) -> Self {
        Self {
            format,
            objects: Arc::new(RwLock::new(HashMap::new())),
            read_buffer_capacity: config.read_buffer_capacity,
            check: PipePool::new(BatchKind::Check, config.max_idle_pipes),
            content: PipePool::new(BatchKind::Content, config.max_idle_pipes),
            spawned: AtomicUsize::new(0),
        }
    }

    pub fn format(&self) -> ObjectFormat {
        self.format
    }

    /// Store an object under the id git would give it.
    pub fn insert(&self, kind: ObjectKind, data: impl Into<Vec<u8>>) -> ObjectId {
        let data: Vec<u8> = data.into();
        let id = self.format.hash_object(kind, &data);
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(id, (kind, Arc::from(data)));
        id
    }

    pub fn insert_blob(&self, data: impl Into<Vec<u8>>) -> ObjectId {
        self.insert(ObjectKind::Blob, data)
    }

    /// Encode and store a tree object. Entries are written in git's tree order.
    pub fn insert_tree<'a>(
        &self,
        entries: impl IntoIterator<Item = (EntryMode, &'a str, ObjectId)>,
    ) -> ObjectId {
        let mut entries: Vec<_> = entries.into_iter().collect();
        entries.sort_by(|a, b| tree_sort_key(a.0, a.1).cmp(&tree_sort_key(b.0, b.1)));

        let mut data = Vec::new();
        for (mode, name, id) in entries {
            data.extend_from_slice(format!("{:o} {name}\0", mode.mode_bits()).as_bytes());
            data.extend_from_slice(id.as_bytes());
        }
        self.insert(ObjectKind::Tree, data)
    }

    pub fn remove(&self, id: &ObjectId) -> bool {
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many pipes have been created over the provider's lifetime.
    pub fn spawned_pipes(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
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

    fn open_pipe(&self, kind: BatchKind) -> MemoryPipe {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        let output = Arc::new(Mutex::new(VecDeque::new()));
        MemoryPipe {
            writer: MemoryWriter {
                kind,
                objects: Arc::clone(&self.objects),
                pending: Vec::new(),
                output: Arc::clone(&output),
            },
            reader: BufReader::with_capacity(self.read_buffer_capacity, QueueReader { output }),
        }
    }
}

impl Default for MemoryBatchProvider {
    fn default() -> Self {
        Self::new(ObjectFormat::default())
    }
}

impl BatchProvider for MemoryBatchProvider {
    fn acquire(&self, kind: BatchKind) -> ProtocolResult<BatchChannel> {
        self.pool(kind)
            .checkout(|| Ok(Box::new(self.open_pipe(kind)) as Box<dyn BatchPipe>))
    }
}

/// Git orders tree entries by name, comparing directories as if they had a
/// trailing slash.
fn tree_sort_key(mode: EntryMode, name: &str) -> Vec<u8> {
    let mut key = name.as_bytes().to_vec();
    if mode == EntryMode::Tree {
        key.push(b'/');
    }
    key
}

struct MemoryPipe {
    writer: MemoryWriter,
    reader: BufReader<QueueReader>,
}

impl BatchPipe for MemoryPipe {
    fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn reader(&mut self) -> &mut dyn BufRead {
        &mut self.reader
    }
}

/// Request side: answers each complete request line by queueing its response.
struct MemoryWriter {
    kind: BatchKind,
    objects: Arc<RwLock<ObjectMap>>,
    pending: Vec<u8>,
    output: Arc<Mutex<VecDeque<u8>>>,
}

impl MemoryWriter {
    fn respond(&self, request: &[u8]) {
        let name = String::from_utf8_lossy(request);
        let found = ObjectId::from_hex(&name).ok().and_then(|id| {
            self.objects
                .read()
                .expect("lock poisoned")
                .get(&id)
                .map(|(kind, data)| (id, *kind, Arc::clone(data)))
        });

        let mut out = self.output.lock().expect("lock poisoned");
        match found {
            Some((id, kind, data)) => {
                trace!(%id, %kind, size = data.len(), "memory batch hit");
                out.extend(format!("{id} {kind} {}\n", data.len()).bytes());
                if self.kind == BatchKind::Content {
                    out.extend(data.iter().copied());
                    out.push_back(b'\n');
                }
            }
            None => out.extend(format!("{name} missing\n").bytes()),
        }
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(i) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=i).collect();
            self.respond(&line[..i]);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Response side. Reports end of stream once every queued byte is read,
/// standing in for a process that exited.
struct QueueReader {
    output: Arc<Mutex<VecDeque<u8>>>,
}

impl Read for QueueReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut queue = self.output.lock().expect("lock poisoned");
        let n = buf.len().min(queue.len());
        for (slot, byte) in buf.iter_mut().zip(queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
