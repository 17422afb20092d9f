//! Message pipeline demo
//!
//! Sends framed messages over socket pairs. The sender of each message runs
//! on one processor, the receiver on another:
//!
//! ```text
//!   SendMessage: compose header ─► WriteAll(header) ─► ChunkedBody ─► finish
//!                                                       └─► WriteAll(chunk) ...
//!   Receiver:    ReadExact(header) ─► parse ─► ReadExact(body) ─► verify ─► finish
//! ```
//!
//! Usage: `pipeline [messages] [body_bytes]`

use corun::prelude::*;

use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Instant;

/// `MSG <id:8> <len:12>\r\n`
const HEADER_LEN: usize = 27;

/// Largest values that fit the fixed-width header fields
const MAX_MESSAGES: u64 = 99_999_999;
const MAX_BODY_LEN: u64 = 999_999_999_999;

/// Body bytes per `WriteAll` child
const CHUNK: usize = 16 * 1024;

fn header(id: u64, len: usize) -> Vec<u8> {
    format!("MSG {:>8} {:>12}\r\n", id, len).into_bytes()
}

fn parse_header(raw: &[u8]) -> Result<(u64, usize), CoroutineError> {
    let text = std::str::from_utf8(raw).map_err(|e| CoroutineError::new("header is not utf-8").with_source(e))?;
    let mut fields = text.trim_end().split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some("MSG"), Some(id), Some(len)) => {
            let id = id.parse().map_err(|_| CoroutineError::new(format!("bad id in {:?}", text)))?;
            let len = len.parse().map_err(|_| CoroutineError::new(format!("bad length in {:?}", text)))?;
            Ok((id, len))
        }
        _ => Err(CoroutineError::new(format!("malformed header {:?}", text))),
    }
}

fn body(id: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i as u64 + id) % 251) as u8).collect()
}

/// Writes one framed message
struct SendMessage {
    stream: Rc<UnixStream>,
    id: u64,
    header: Vec<u8>,
    body: Vec<u8>,
}

impl SendMessage {
    fn new(stream: Rc<UnixStream>, id: u64, body: Vec<u8>) -> Self {
        Self {
            stream,
            id,
            header: Vec::new(),
            body,
        }
    }

    fn flush_header(&mut self) -> Action<Self> {
        let header = std::mem::take(&mut self.header);
        Action::start(WriteAll::new(self.stream.clone(), header), Self::header_flushed)
    }

    fn header_flushed(&mut self, outcome: Outcome) -> Action<Self> {
        match outcome.into_result() {
            Ok(_) => Action::yield_to(Self::write_body),
            Err(e) => Action::error(e),
        }
    }

    fn write_body(&mut self) -> Action<Self> {
        let body = ChunkedBody {
            stream: self.stream.clone(),
            body: std::mem::take(&mut self.body),
            offset: 0,
        };
        Action::start(body, Self::body_written)
    }

    fn body_written(&mut self, outcome: Outcome) -> Action<Self> {
        match outcome.into_value::<usize>() {
            Ok(n) => Action::finish_with(n),
            Err(e) => Action::error(e),
        }
    }
}

impl Coroutine for SendMessage {
    fn act(&mut self) -> Action<Self> {
        self.header = header(self.id, self.body.len());
        Action::yield_to(Self::flush_header)
    }

    fn name(&self) -> &'static str {
        "SendMessage"
    }
}

/// Streams a body as a sequence of `WriteAll` children
struct ChunkedBody {
    stream: Rc<UnixStream>,
    body: Vec<u8>,
    offset: usize,
}

impl ChunkedBody {
    fn chunk_written(&mut self, outcome: Outcome) -> Action<Self> {
        match outcome.into_value::<usize>() {
            Ok(n) => {
                self.offset += n;
                Action::repeat()
            }
            Err(e) => Action::error(e),
        }
    }
}

impl Coroutine for ChunkedBody {
    fn act(&mut self) -> Action<Self> {
        if self.offset == self.body.len() {
            return Action::finish_with(self.offset);
        }
        let end = (self.offset + CHUNK).min(self.body.len());
        let chunk = self.body[self.offset..end].to_vec();
        Action::start(WriteAll::new(self.stream.clone(), chunk), Self::chunk_written)
    }

    fn name(&self) -> &'static str {
        "ChunkedBody"
    }
}

/// Reads and verifies one framed message
struct Receiver {
    stream: Rc<UnixStream>,
    id: u64,
}

impl Receiver {
    fn header_read(&mut self, outcome: Outcome) -> Action<Self> {
        let raw = match outcome.into_value::<Vec<u8>>() {
            Ok(raw) => raw,
            Err(e) => return Action::error(e),
        };
        let (id, len) = match parse_header(&raw) {
            Ok(parsed) => parsed,
            Err(e) => return Action::error(e),
        };
        if id != self.id {
            return Action::error(CoroutineError::new(format!(
                "expected message {}, got {}",
                self.id, id
            )));
        }
        Action::start(ReadExact::new(self.stream.clone(), len), Self::body_read)
    }

    fn body_read(&mut self, outcome: Outcome) -> Action<Self> {
        match outcome.into_value::<Vec<u8>>() {
            Ok(bytes) if bytes == body(self.id, bytes.len()) => Action::finish_with(bytes.len()),
            Ok(_) => Action::error(CoroutineError::new(format!("message {} corrupted", self.id))),
            Err(e) => Action::error(e),
        }
    }
}

impl Coroutine for Receiver {
    fn act(&mut self) -> Action<Self> {
        Action::start(ReadExact::new(self.stream.clone(), HEADER_LEN), Self::header_read)
    }

    fn name(&self) -> &'static str {
        "Receiver"
    }
}

/// `[messages] [body_bytes]`, clamped to what the header can carry
fn parse_args(args: &[String]) -> (u64, usize) {
    let messages: u64 = args
        .first()
        .and_then(|s| s.parse().ok())
        .unwrap_or(200);
    let body_len: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(64 * 1024);
    if messages > MAX_MESSAGES {
        eprintln!("clamping message count to {}", MAX_MESSAGES);
    }
    (messages.min(MAX_MESSAGES), (body_len as u64).min(MAX_BODY_LEN) as usize)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    corun::init_logging();
    println!("=== corun pipeline ===\n");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (messages, body_len) = parse_args(&args);

    let mut config = ExecutorConfig::from_env();
    config.num_processors = config.num_processors.max(2);
    config.print();

    let executor = Executor::new(config)?;
    let n = executor.num_processors();
    let start = Instant::now();

    let mut handles = Vec::with_capacity(messages as usize * 2);
    for id in 0..messages {
        let (tx, rx) = UnixStream::pair()?;
        tx.set_nonblocking(true)?;
        rx.set_nonblocking(true)?;

        let send_on = id as usize % n;
        let recv_on = (id as usize + 1) % n;
        let payload = body(id, body_len);
        handles.push(executor.submit_to(send_on, move || {
            SendMessage::new(Rc::new(tx), id, payload)
        })?);
        handles.push(executor.submit_to(recv_on, move || Receiver {
            stream: Rc::new(rx),
            id,
        })?);
    }

    let mut failed = 0;
    for h in &handles {
        if let Err(e) = h.wait() {
            eprintln!("task {} failed: {}", h.id(), e);
            failed += 1;
        }
    }
    let elapsed = start.elapsed();

    executor.stop();
    executor.join()?;

    let bytes = messages as usize * (HEADER_LEN + body_len);
    println!("\n=== Results ===");
    println!("Messages:    {}", messages);
    println!("Body size:   {}", body_len);
    println!("Processors:  {}", n);
    println!("Failed:      {}", failed);
    println!("Time:        {:?}", elapsed);
    println!(
        "Throughput:  {:.1} MiB/s",
        bytes as f64 / (1024.0 * 1024.0) / elapsed.as_secs_f64()
    );

    if failed > 0 {
        return Err(format!("{} of {} tasks failed", failed, handles.len()).into());
    }
    Ok(())
}
