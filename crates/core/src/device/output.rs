//! Output filename handling.
//!
//! Output names support `%d`/`%ld`-style page number substitution plus two
//! pseudo-devices: `%stdout%` (write to standard output, never closed) and
//! `%pipe%command` (pipe through a shell command, which rules out seeking).

use crate::error::{RenderError, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use tracing::debug;

/// IO device a parsed output name addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDevice {
    /// The ordinary file system.
    Default,
    /// Standard output.
    Stdout,
    /// A spawned shell command reading from its stdin.
    Pipe,
}

/// A validated output file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOutputName<'a> {
    pub iodev: IoDevice,
    /// Remaining file name or pipe command.
    pub fname: &'a str,
    /// True when the name contains a page-number format.
    pub has_format: bool,
}

/// Parse and validate an output file name.
///
/// At most one `%…d`-style numeric format is allowed; `%%` is a literal
/// percent sign. Anything else after `%` is malformed.
pub fn parse_output_file_name(name: &str) -> Result<ParsedOutputName<'_>> {
    let (iodev, rest) = if let Some(rest) = name.strip_prefix("%stdout%") {
        (IoDevice::Stdout, rest)
    } else if let Some(rest) = name.strip_prefix("%pipe%") {
        (IoDevice::Pipe, rest)
    } else if let Some(rest) = name.strip_prefix('|') {
        (IoDevice::Pipe, rest)
    } else {
        (IoDevice::Default, name)
    };

    let mut has_format = false;
    let mut chars = rest.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '%' {
            continue;
        }
        match chars.peek() {
            Some((_, '%')) => {
                chars.next();
            }
            _ => {
                // Width, zero padding and a length modifier are accepted
                // ahead of the conversion.
                while matches!(chars.peek(), Some((_, '0'..='9'))) {
                    chars.next();
                }
                if matches!(chars.peek(), Some((_, 'l'))) {
                    chars.next();
                }
                match chars.next() {
                    Some((_, 'd' | 'i' | 'u' | 'o' | 'x' | 'X')) => {
                        if has_format {
                            return Err(RenderError::UndefinedFilename(format!(
                                "multiple page formats in {name}"
                            )));
                        }
                        has_format = true;
                    }
                    _ => {
                        return Err(RenderError::UndefinedFilename(format!(
                            "malformed format in {name}"
                        )));
                    }
                }
            }
        }
    }

    Ok(ParsedOutputName {
        iodev,
        fname: rest,
        has_format,
    })
}

/// Validate an output name without opening anything (parameter checking).
pub fn validate_output_file(name: &str) -> Result<()> {
    parse_output_file_name(name).map(|_| ())
}

/// Substitute the page number into a name containing a `%…d` format.
/// `%%` collapses to a literal percent.
pub fn substitute_page_number(fname: &str, page: i64) -> String {
    let mut out = String::with_capacity(fname.len() + 8);
    let mut chars = fname.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut width = String::new();
        while let Some(d @ '0'..='9') = chars.peek().copied() {
            width.push(d);
            chars.next();
        }
        if chars.peek() == Some(&'l') {
            chars.next();
        }
        match chars.next() {
            Some('d' | 'i' | 'u') => {
                if let Some(stripped) = width.strip_prefix('0') {
                    let w: usize = stripped.parse().unwrap_or(0);
                    out.push_str(&format!("{page:0w$}"));
                } else {
                    let w: usize = width.parse().unwrap_or(0);
                    out.push_str(&format!("{page:w$}"));
                }
            }
            Some('x') => out.push_str(&format!("{page:x}")),
            Some('X') => out.push_str(&format!("{page:X}")),
            Some('o') => out.push_str(&format!("{page:o}")),
            other => {
                out.push('%');
                out.push_str(&width);
                if let Some(o) = other {
                    out.push(o);
                }
            }
        }
    }
    out
}

/// An opened page output target.
#[derive(Debug)]
pub struct OutputFile {
    /// Actual name after page-number substitution (reports refer to it).
    pub name: String,
    pub kind: OutputKind,
}

#[derive(Debug)]
pub enum OutputKind {
    /// Seekable file: bands are written positionally.
    File(File),
    /// Standard output: sequential only, never closed.
    Stdout(std::io::Stdout),
    /// Shell pipe: sequential only.
    Pipe(Child),
}

impl OutputFile {
    /// True when seek-based band writes are possible.
    pub fn positionable(&self) -> bool {
        matches!(self.kind, OutputKind::File(_))
    }

    /// Flush the target and, for pipes, close the child's stdin and reap
    /// it. Stdout is flushed but never closed.
    pub fn finish(&mut self) -> Result<()> {
        match &mut self.kind {
            OutputKind::File(f) => f.flush()?,
            OutputKind::Stdout(s) => s.flush()?,
            OutputKind::Pipe(child) => {
                drop(child.stdin.take());
                let status = child.wait()?;
                if !status.success() {
                    return Err(RenderError::InvalidFileAccess(format!(
                        "pipe command exited with {status}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Open the raster output target for one page.
pub fn open_output_file(name: &str, page: i64) -> Result<OutputFile> {
    if name.is_empty() {
        return Err(RenderError::UndefinedFilename(
            "device requires an output file but none was specified".into(),
        ));
    }
    let parsed = parse_output_file_name(name)?;
    match parsed.iodev {
        IoDevice::Stdout => {
            if !parsed.fname.is_empty() {
                return Err(RenderError::UndefinedFilename(format!(
                    "%stdout% takes no file name, got {}",
                    parsed.fname
                )));
            }
            Ok(OutputFile {
                name: name.to_string(),
                kind: OutputKind::Stdout(std::io::stdout()),
            })
        }
        IoDevice::Pipe => {
            let cmd = substitute_page_number(parsed.fname, page);
            if cmd.is_empty() {
                return Err(RenderError::UndefinedFilename("empty pipe command".into()));
            }
            debug!(cmd, "opening output pipe");
            let child = Command::new("/bin/sh")
                .arg("-c")
                .arg(&cmd)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| {
                    RenderError::InvalidFileAccess(format!("cannot spawn pipe {cmd}: {e}"))
                })?;
            Ok(OutputFile {
                name: cmd,
                kind: OutputKind::Pipe(child),
            })
        }
        IoDevice::Default => {
            let fname = if parsed.has_format {
                substitute_page_number(parsed.fname, page)
            } else {
                parsed.fname.to_string()
            };
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&fname)
                .map_err(|e| {
                    RenderError::InvalidFileAccess(format!("cannot open {fname}: {e}"))
                })?;
            Ok(OutputFile {
                name: fname,
                kind: OutputKind::File(file),
            })
        }
    }
}

/// Open the per-page report file: append-binary, created on demand.
/// `%stdout%` is honored; report lines accumulate across pages.
pub fn open_report_file(name: &str) -> Result<Box<dyn Write + Send>> {
    if name.is_empty() {
        return Err(RenderError::UndefinedFilename(
            "no report file configured".into(),
        ));
    }
    let parsed = parse_output_file_name(name)?;
    match parsed.iodev {
        IoDevice::Stdout => Ok(Box::new(std::io::stdout())),
        IoDevice::Pipe => {
            let child = Command::new("/bin/sh")
                .arg("-c")
                .arg(parsed.fname)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| {
                    RenderError::InvalidFileAccess(format!(
                        "cannot spawn pipe {}: {e}",
                        parsed.fname
                    ))
                })?;
            let stdin = child.stdin.ok_or_else(|| {
                RenderError::InvalidFileAccess("pipe child has no stdin".into())
            })?;
            Ok(Box::new(stdin))
        }
        IoDevice::Default => {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(parsed.fname)
                .map_err(|e| {
                    RenderError::InvalidFileAccess(format!(
                        "cannot open report {}: {e}",
                        parsed.fname
                    ))
                })?;
            Ok(Box::new(file))
        }
    }
}
