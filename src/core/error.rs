//! Purpose: Define the crate-wide error value and its wire category names.
//! Exports: `Error`, `ErrorKind`, `to_exit_code`.
//! Role: Single failure record shared by resolution, invocation, dispatch and transport.
//! Invariants: `Error::category` is the exact string sent as `error.type` on the wire.
//! Invariants: Invocation failures carry the raising callable's own category name.
//! Invariants: Frames are kept in execution order (outermost step first).
use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Io,
    Decode,
    InvalidRequest,
    UnsupportedOperation,
    ModuleNotFound,
    InvalidUnit,
    UnknownReference,
    Attribute,
    Invocation,
}

impl ErrorKind {
    pub fn category(self) -> &'static str {
        match self {
            ErrorKind::Internal => "InternalError",
            ErrorKind::Usage => "UsageError",
            ErrorKind::Io => "OSError",
            ErrorKind::Decode => "DecodeError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::UnsupportedOperation => "UnsupportedOperation",
            ErrorKind::ModuleNotFound => "ModuleNotFound",
            ErrorKind::InvalidUnit => "InvalidUnit",
            ErrorKind::UnknownReference => "UnknownReference",
            ErrorKind::Attribute => "AttributeError",
            ErrorKind::Invocation => "RuntimeError",
        }
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    category: Option<Cow<'static, str>>,
    message: Option<String>,
    path: Option<PathBuf>,
    frames: Vec<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            category: None,
            message: None,
            path: None,
            frames: Vec::new(),
            source: None,
        }
    }

    /// Failure raised from inside a callable, e.g. `Error::raised("ValueError")`.
    pub fn raised(category: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Invocation).with_category(category)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raised("TypeError").with_message(message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::raised("ValueError").with_message(message)
    }

    pub fn os_error(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::raised("OSError")
            .with_message(format!("{}: {source}", message.into()))
            .with_source(source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .unwrap_or_else(|| self.kind.category())
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }

    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    pub fn frames(&self) -> &[String] {
        &self.frames
    }

    pub fn with_category(mut self, category: impl Into<Cow<'static, str>>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Prepends frames recorded by an enclosing step.
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = String>) -> Self {
        let mut outer: Vec<String> = frames.into_iter().collect();
        outer.append(&mut self.frames);
        self.frames = outer;
        self
    }

    pub fn with_frame(self, frame: impl Into<String>) -> Self {
        self.with_frames([frame.into()])
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Renders the recorded frames, the failure line and the cause chain.
    pub fn traceback(&self) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for frame in &self.frames {
            out.push_str("  ");
            out.push_str(frame);
            out.push('\n');
        }
        out.push_str(self.category());
        if let Some(message) = &self.message {
            out.push_str(": ");
            out.push_str(message);
        }
        out.push('\n');
        let mut cause = StdError::source(self);
        while let Some(err) = cause {
            out.push_str("caused by: ");
            out.push_str(&err.to_string());
            out.push('\n');
            cause = err.source();
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.category())?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Usage => 2,
        ErrorKind::Io => 8,
        _ => 1,
    }
}
