//! Log output with credential masking.
//!
//! Every formatted log line passes through [`Redactor`] before reaching
//! stderr, so bot tokens embedded in Telegram URLs and AWS keys never land in
//! the log stream.

use std::io::{self, Write};
use std::sync::Arc;

use regex::Regex;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Placeholder substituted for Telegram bot tokens.
pub const TOKEN_MASK: &str = "[TELEGRAM_TOKEN]";

/// Ordered set of masking rules applied to each log write.
pub struct Redactor {
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    /// Compile the masking rules.
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            (
                Regex::new(r"(https?://[^/\s]+/bot)[0-9]+:[A-Za-z0-9_-]+")?,
                "$1[TELEGRAM_TOKEN]",
            ),
            (
                Regex::new(r"(bot)[0-9]{8,10}:[A-Za-z0-9_-]+")?,
                "$1[TELEGRAM_TOKEN]",
            ),
            (Regex::new(r"\b[0-9]{8,10}:[A-Za-z0-9_-]{35}\b")?, TOKEN_MASK),
            (
                Regex::new(r"(AWS_ACCESS_KEY_ID\s*[=:]\s*)[^\s&,]+")?,
                "${1}[MASKED]",
            ),
            (
                Regex::new(r"(AWS_SECRET_ACCESS_KEY\s*[=:]\s*)[^\s&,]+")?,
                "${1}[MASKED]",
            ),
            (
                Regex::new(r"(AWS_SESSION_TOKEN\s*[=:]\s*)[^\s&,]+")?,
                "${1}[MASKED]",
            ),
            (Regex::new(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b")?, "[MASKED]"),
        ];
        Ok(Self { rules })
    }

    /// Return `input` with every known credential shape masked.
    #[must_use]
    pub fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |acc, (pattern, replacement)| {
                pattern.replace_all(&acc, *replacement).into_owned()
            })
    }
}

/// Writer that masks credentials before forwarding to `inner`.
pub struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<Redactor>,
}

impl<W: Write> RedactingWriter<W> {
    /// Wrap `inner` with `redactor`.
    pub const fn new(inner: W, redactor: Arc<Redactor>) -> Self {
        Self { inner, redactor }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let line = String::from_utf8_lossy(buf);
        self.inner.write_all(self.redactor.redact(&line).as_bytes())?;
        // Callers track progress against the unmasked buffer.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` producing [`RedactingWriter`]s for a tracing fmt layer.
pub struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<Redactor>,
}

impl<F> RedactingMakeWriter<F> {
    /// Wrap the writer factory `make_inner`.
    pub const fn new(make_inner: F, redactor: Arc<Redactor>) -> Self {
        Self {
            make_inner,
            redactor,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.redactor.clone())
    }
}

/// Install the global subscriber: `RUST_LOG` filter (default `info`) and
/// masked stderr output.
pub fn init_logging(redactor: Arc<Redactor>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, redactor);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}
