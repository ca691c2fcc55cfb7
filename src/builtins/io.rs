//! Purpose: `io` capability module: text files and in-memory text buffers.
//! Exports: `module`, `TextFile`, `StringIO`.
//! Role: Canonical producers of stateful, non-encodable results kept behind handles.
//! Invariants: Every operation on a closed stream raises `ValueError`.
//! Invariants: Bound methods share the stream state with the object they were read from.
use std::any::Any;
use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::rc::Rc;

use super::os_failure;
use crate::core::error::Error;
use crate::core::object::{BoundArgs, Module, NativeFunction, Object};
use crate::core::value::Value;

pub(crate) fn module() -> Module {
    Module::new("io")
        .with_function(NativeFunction::new("io.open", &["file", "mode"], |args| {
            let path: PathBuf = args.required("file")?;
            let mode: String = args.or("mode", "r".to_string())?;
            TextFile::open(path, mode).map(Value::object)
        }))
        .with_function(NativeFunction::new(
            "io.StringIO",
            &["initial_value"],
            |args| {
                let initial: String = args.or("initial_value", String::new())?;
                Ok(Value::object(StringIO::new(&initial)))
            },
        ))
}

fn closed_file() -> Error {
    Error::value_error("I/O operation on closed file.")
}

fn unsupported(what: &str) -> Error {
    Error::raised("UnsupportedOperation").with_message(what.to_string())
}

enum Stream {
    Reader {
        reader: BufReader<File>,
        pending: String,
    },
    Writer(File),
    Closed,
}

impl Stream {
    fn reader(&mut self) -> Result<(&mut BufReader<File>, &mut String), Error> {
        match self {
            Stream::Reader { reader, pending } => Ok((reader, pending)),
            Stream::Writer(_) => Err(unsupported("not readable")),
            Stream::Closed => Err(closed_file()),
        }
    }

    fn writer(&mut self) -> Result<&mut File, Error> {
        match self {
            Stream::Writer(file) => Ok(file),
            Stream::Reader { .. } => Err(unsupported("not writable")),
            Stream::Closed => Err(closed_file()),
        }
    }
}

type StreamMethod = fn(&mut Stream, &BoundArgs<'_>) -> Result<Value, Error>;

/// A text file opened with `io.open`.
pub struct TextFile {
    name: String,
    mode: String,
    stream: Rc<RefCell<Stream>>,
}

impl TextFile {
    pub fn open(path: impl Into<PathBuf>, mode: impl Into<String>) -> Result<Self, Error> {
        let path = path.into();
        let mode = mode.into();
        let mut options = OpenOptions::new();
        let writing = match mode.as_str() {
            "r" | "rt" => {
                options.read(true);
                false
            }
            "w" | "wt" => {
                options.write(true).create(true).truncate(true);
                true
            }
            "a" | "at" => {
                options.append(true).create(true);
                true
            }
            "x" | "xt" => {
                options.write(true).create_new(true);
                true
            }
            other => return Err(Error::value_error(format!("invalid mode: '{other}'"))),
        };
        let file = options.open(&path).map_err(|err| os_failure(err, &path))?;
        let stream = if writing {
            Stream::Writer(file)
        } else {
            Stream::Reader {
                reader: BufReader::new(file),
                pending: String::new(),
            }
        };
        tracing::debug!(path = %path.display(), mode = %mode, "file opened");
        Ok(Self {
            name: path.display().to_string(),
            mode,
            stream: Rc::new(RefCell::new(stream)),
        })
    }

    fn method(&self, name: &str, params: &'static [&'static str], body: StreamMethod) -> Value {
        let stream = Rc::clone(&self.stream);
        NativeFunction::new(format!("TextFile.{name}"), params, move |args| {
            body(&mut stream.borrow_mut(), args)
        })
        .into_value()
    }
}

fn read_failure(err: std::io::Error) -> Error {
    Error::os_error("read failed", err)
}

fn file_read(stream: &mut Stream, args: &BoundArgs<'_>) -> Result<Value, Error> {
    let size: i64 = args.or("size", -1)?;
    let (reader, pending) = stream.reader()?;
    let Ok(wanted) = usize::try_from(size) else {
        let mut rest = std::mem::take(pending);
        reader.read_to_string(&mut rest).map_err(read_failure)?;
        return Ok(Value::Str(rest));
    };
    while pending.chars().count() < wanted {
        if reader.read_line(pending).map_err(read_failure)? == 0 {
            break;
        }
    }
    let cut = pending
        .char_indices()
        .nth(wanted)
        .map_or(pending.len(), |(index, _)| index);
    let rest = pending.split_off(cut);
    Ok(Value::Str(std::mem::replace(pending, rest)))
}

fn file_readline(stream: &mut Stream, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    let (reader, pending) = stream.reader()?;
    if !pending.contains('\n') {
        reader.read_line(pending).map_err(read_failure)?;
    }
    let cut = pending.find('\n').map_or(pending.len(), |index| index + 1);
    let rest = pending.split_off(cut);
    Ok(Value::Str(std::mem::replace(pending, rest)))
}

fn file_write(stream: &mut Stream, args: &BoundArgs<'_>) -> Result<Value, Error> {
    let text: String = args.required("s")?;
    stream
        .writer()?
        .write_all(text.as_bytes())
        .map_err(|err| Error::os_error("write failed", err))?;
    Ok(Value::from(text.chars().count()))
}

fn file_close(stream: &mut Stream, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    if let Stream::Writer(file) = stream {
        file.flush()
            .map_err(|err| Error::os_error("flush failed", err))?;
    }
    *stream = Stream::Closed;
    Ok(Value::None)
}

impl Object for TextFile {
    fn type_name(&self) -> &str {
        "TextFile"
    }

    fn namespace(&self) -> &str {
        "io"
    }

    fn repr(&self) -> String {
        format!(
            "<io.TextFile name={} mode={}>",
            Value::str(&self.name).repr(),
            Value::str(&self.mode).repr()
        )
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::str(&self.name)),
            "mode" => Some(Value::str(&self.mode)),
            "closed" => Some(Value::Bool(matches!(
                *self.stream.borrow(),
                Stream::Closed
            ))),
            "read" => Some(self.method(name, &["size"], file_read)),
            "readline" => Some(self.method(name, &[], file_readline)),
            "write" => Some(self.method(name, &["s"], file_write)),
            "close" => Some(self.method(name, &[], file_close)),
            _ => None,
        }
    }

    /// Remaining lines, for `list()` and friends; `None` once closed or when write-only.
    fn iter_values(&self) -> Option<Vec<Value>> {
        let mut stream = self.stream.borrow_mut();
        let (reader, pending) = stream.reader().ok()?;
        let mut rest = std::mem::take(pending);
        reader.read_to_string(&mut rest).ok()?;
        Some(
            rest.split_inclusive('\n')
                .map(Value::str)
                .collect(),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Buffer {
    chars: Vec<char>,
    position: usize,
    closed: bool,
}

impl Buffer {
    fn open(&mut self) -> Result<&mut Self, Error> {
        if self.closed {
            return Err(closed_file());
        }
        Ok(self)
    }

    fn take(&mut self, count: usize) -> String {
        let end = self.chars.len().min(self.position.saturating_add(count));
        let start = self.position.min(end);
        self.position = end.max(self.position);
        self.chars[start..end].iter().collect()
    }
}

type BufferMethod = fn(&mut Buffer, &BoundArgs<'_>) -> Result<Value, Error>;

/// An in-memory text stream created with `io.StringIO`.
pub struct StringIO {
    buffer: Rc<RefCell<Buffer>>,
}

impl StringIO {
    pub fn new(initial: &str) -> Self {
        Self {
            buffer: Rc::new(RefCell::new(Buffer {
                chars: initial.chars().collect(),
                position: 0,
                closed: false,
            })),
        }
    }

    fn method(&self, name: &str, params: &'static [&'static str], body: BufferMethod) -> Value {
        let buffer = Rc::clone(&self.buffer);
        NativeFunction::new(format!("StringIO.{name}"), params, move |args| {
            body(&mut buffer.borrow_mut(), args)
        })
        .into_value()
    }
}

fn buffer_write(buffer: &mut Buffer, args: &BoundArgs<'_>) -> Result<Value, Error> {
    let text: String = args.required("s")?;
    let buffer = buffer.open()?;
    if buffer.position > buffer.chars.len() {
        let gap = buffer.position - buffer.chars.len();
        buffer
            .chars
            .try_reserve_exact(gap.saturating_add(text.len()))
            .map_err(|_| {
                Error::raised("MemoryError").with_message("cannot grow StringIO buffer")
            })?;
        buffer.chars.resize(buffer.position, '\0');
    }
    let mut written: usize = 0;
    for c in text.chars() {
        match buffer.chars.get_mut(buffer.position) {
            Some(slot) => *slot = c,
            None => buffer.chars.push(c),
        }
        buffer.position += 1;
        written += 1;
    }
    Ok(Value::from(written))
}

fn buffer_read(buffer: &mut Buffer, args: &BoundArgs<'_>) -> Result<Value, Error> {
    let size: i64 = args.or("size", -1)?;
    let buffer = buffer.open()?;
    let count = usize::try_from(size).unwrap_or(usize::MAX);
    Ok(Value::Str(buffer.take(count)))
}

fn buffer_readline(buffer: &mut Buffer, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    let buffer = buffer.open()?;
    let start = buffer.position.min(buffer.chars.len());
    let count = buffer.chars[start..]
        .iter()
        .position(|c| *c == '\n')
        .map_or(usize::MAX, |index| index + 1);
    Ok(Value::Str(buffer.take(count)))
}

fn buffer_getvalue(buffer: &mut Buffer, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    Ok(Value::Str(buffer.open()?.chars.iter().collect()))
}

fn buffer_seek(buffer: &mut Buffer, args: &BoundArgs<'_>) -> Result<Value, Error> {
    let offset: i64 = args.required("pos")?;
    let whence: i64 = args.or("whence", 0)?;
    let buffer = buffer.open()?;
    let position = match whence {
        0 => usize::try_from(offset)
            .map_err(|_| Error::value_error(format!("Negative seek position {offset}")))?,
        1 if offset == 0 => buffer.position,
        2 if offset == 0 => buffer.chars.len(),
        1 => return Err(nonzero_seek("cur")),
        2 => return Err(nonzero_seek("end")),
        other => {
            return Err(Error::value_error(format!(
                "Invalid whence ({other}, should be 0, 1 or 2)"
            )));
        }
    };
    buffer.position = position;
    Ok(Value::from(position))
}

fn nonzero_seek(anchor: &str) -> Error {
    Error::raised("OSError").with_message(format!("Can't do nonzero {anchor}-relative seeks"))
}

fn buffer_tell(buffer: &mut Buffer, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    Ok(Value::from(buffer.open()?.position))
}

fn buffer_close(buffer: &mut Buffer, _args: &BoundArgs<'_>) -> Result<Value, Error> {
    buffer.closed = true;
    Ok(Value::None)
}

impl Object for StringIO {
    fn type_name(&self) -> &str {
        "StringIO"
    }

    fn namespace(&self) -> &str {
        "io"
    }

    fn repr(&self) -> String {
        let buffer = self.buffer.borrow();
        format!(
            "<io.StringIO position={} length={}>",
            buffer.position,
            buffer.chars.len()
        )
    }

    fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "closed" => Some(Value::Bool(self.buffer.borrow().closed)),
            "write" => Some(self.method(name, &["s"], buffer_write)),
            "read" => Some(self.method(name, &["size"], buffer_read)),
            "readline" => Some(self.method(name, &[], buffer_readline)),
            "getvalue" => Some(self.method(name, &[], buffer_getvalue)),
            "seek" => Some(self.method(name, &["pos", "whence"], buffer_seek)),
            "tell" => Some(self.method(name, &[], buffer_tell)),
            "close" => Some(self.method(name, &[], buffer_close)),
            _ => None,
        }
    }

    fn iter_values(&self) -> Option<Vec<Value>> {
        let mut buffer = self.buffer.borrow_mut();
        let buffer = buffer.open().ok()?;
        let rest = buffer.take(usize::MAX);
        Some(rest.split_inclusive('\n').map(Value::str).collect())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
