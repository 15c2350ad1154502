//! Stack snapshots captured when an error is created or wrapped.
//!
//! A snapshot is taken once by [`Error::with_stack_trace`] and shared from
//! then on; [`Error::expose_stack_trace`] re-attaches the same snapshot to the
//! outermost layer instead of capturing a new one.
//!
//! # Environment Variables
//!
//! Read once per process:
//!
//! - `RUST_BACKTRACE=full` - disables frame filtering and shows full paths
//! - `FAULTLINE_BACKTRACE` - comma-separated options:
//!   - `off` - do not capture stack snapshots at all
//!   - `full_paths` - show full file paths
//!
//! [`Error::with_stack_trace`]: crate::Error::with_stack_trace
//! [`Error::expose_stack_trace`]: crate::Error::expose_stack_trace

use std::{fmt, sync::OnceLock};

use backtrace::BytesOrWideString;

/// An immutable snapshot of the call stack.
///
/// Frames are ordered from the most recent call to the oldest.
#[derive(Debug)]
pub struct StackTrace {
    frames: Vec<Frame>,
    omitted_frames: usize,
    show_full_path: bool,
}

/// One function call of a [`StackTrace`].
#[derive(Debug)]
pub struct Frame {
    /// The demangled symbol name, without the trailing hash.
    pub function: String,
    /// The source file of the call, if debug information is available.
    pub path: Option<FramePath>,
    /// The source line of the call, if debug information is available.
    pub line: Option<u32>,
}

/// The source file of a [`Frame`].
#[derive(Debug)]
pub struct FramePath {
    /// The path as recorded in the debug information.
    pub raw_path: String,
    /// The kind of well-known prefix that was recognized, such as
    /// `"RUST_SRC"` for the standard library or `"CARGO"` for registry crates.
    pub prefix_kind: Option<&'static str>,
    /// The part of the path following the recognized prefix.
    pub suffix: Option<String>,
}

/// Controls which frames end up in a [`StackTrace`].
///
/// # Examples
///
/// ```
/// use faultline::stack::{StackFilter, StackTrace};
///
/// let filter = StackFilter {
///     max_frames: 5,
///     ..StackFilter::DEFAULT
/// };
/// let trace = StackTrace::capture(&filter);
/// assert!(trace.frames().len() <= 5);
/// ```
#[derive(Copy, Clone, Debug)]
pub struct StackFilter {
    /// Whether snapshots are captured at all.
    pub enabled: bool,
    /// Crates whose frames are dropped while they appear at the top of the
    /// stack, before the first frame of any other crate.
    pub skipped_initial_crates: &'static [&'static str],
    /// Crates whose frames are dropped while they appear at the bottom of the
    /// stack.
    pub skipped_final_crates: &'static [&'static str],
    /// Maximum number of frames kept.
    pub max_frames: usize,
    /// Whether paths are displayed in full rather than shortened.
    pub show_full_path: bool,
}

impl StackFilter {
    /// Default filter settings.
    pub const DEFAULT: Self = Self {
        enabled: true,
        skipped_initial_crates: &["backtrace", "faultline", "std", "core", "alloc"],
        skipped_final_crates: &["std", "core", "alloc", "test", "tokio"],
        max_frames: 32,
        show_full_path: false,
    };

    /// No filtering at all.
    pub const FULL: Self = Self {
        enabled: true,
        skipped_initial_crates: &[],
        skipped_final_crates: &[],
        max_frames: usize::MAX,
        show_full_path: true,
    };

    /// Returns the filter selected by the `RUST_BACKTRACE` and
    /// `FAULTLINE_BACKTRACE` environment variables.
    pub fn new_from_env() -> Self {
        let env_options = EnvOptions::get();
        let base = if env_options.rust_backtrace_full {
            Self::FULL
        } else {
            Self::DEFAULT
        };
        Self {
            enabled: !env_options.disabled,
            show_full_path: base.show_full_path || env_options.show_full_path,
            ..base
        }
    }
}

impl Default for StackFilter {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug)]
struct EnvOptions {
    rust_backtrace_full: bool,
    disabled: bool,
    show_full_path: bool,
}

impl EnvOptions {
    fn get() -> &'static Self {
        static FAULTLINE_FLAGS: OnceLock<EnvOptions> = OnceLock::new();

        FAULTLINE_FLAGS.get_or_init(|| {
            let rust_backtrace_full =
                std::env::var_os("RUST_BACKTRACE").is_some_and(|var| var == "full");
            let mut disabled = false;
            let mut show_full_path = false;
            if let Some(var) = std::env::var_os("FAULTLINE_BACKTRACE") {
                for v in var.to_string_lossy().split(',') {
                    if v.eq_ignore_ascii_case("off") {
                        disabled = true;
                    } else if v.eq_ignore_ascii_case("full_paths") {
                        show_full_path = true;
                    }
                }
            }
            EnvOptions {
                rust_backtrace_full,
                disabled,
                show_full_path,
            }
        })
    }
}

impl StackTrace {
    /// Captures the current call stack.
    ///
    /// Frames without symbol or file information are ignored.
    #[inline(never)]
    pub fn capture(filter: &StackFilter) -> Self {
        let mut frames: Vec<Frame> = Vec::new();
        let mut omitted_frames = 0;
        let mut initial_filtering = !filter.skipped_initial_crates.is_empty();

        backtrace::trace(|frame| {
            backtrace::resolve_frame(frame, |symbol| {
                let (Some(sym), Some(filename_raw)) = (symbol.name(), symbol.filename_raw()) else {
                    return;
                };
                let function = format!("{sym:#}");

                if initial_filtering {
                    if filter
                        .skipped_initial_crates
                        .contains(&crate_of_symbol(&function))
                    {
                        omitted_frames += 1;
                        return;
                    }
                    initial_filtering = false;
                }

                if frames.len() >= filter.max_frames {
                    omitted_frames += 1;
                    return;
                }

                frames.push(Frame {
                    function,
                    path: Some(FramePath::new(filename_raw)),
                    line: symbol.lineno(),
                });
            });

            true
        });

        while let Some(last) = frames.last() {
            let skip = filter
                .skipped_final_crates
                .contains(&crate_of_symbol(&last.function))
                || last.function == "__libc_start_call_main"
                || last.function == "__libc_start_main_impl"
                || last.function == "_start";
            if !skip {
                break;
            }
            omitted_frames += 1;
            frames.pop();
        }

        Self {
            frames,
            omitted_frames,
            show_full_path: filter.show_full_path,
        }
    }

    /// Returns the captured frames, most recent first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Returns the number of frames dropped by filtering.
    pub fn omitted_frames(&self) -> usize {
        self.omitted_frames
    }

    /// Returns `true` if no frames were kept.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl fmt::Display for StackTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            write!(f, "    {}", frame.function)?;
            if let Some(path) = &frame.path {
                match (&path.suffix, self.show_full_path) {
                    (Some(suffix), false) => write!(f, " - [..]/{suffix}")?,
                    _ => write!(f, " - {}", path.raw_path)?,
                }
                if let Some(line) = frame.line {
                    write!(f, ":{line}")?;
                }
            }
            writeln!(f)?;
        }
        if self.omitted_frames > 0 {
            writeln!(
                f,
                "    note: {} frame(s) omitted. For a complete trace, set RUST_BACKTRACE=full.",
                self.omitted_frames
            )?;
        }
        Ok(())
    }
}

/// Returns the crate a demangled symbol belongs to.
///
/// Trait implementations such as `<foo::Bar as core::fmt::Debug>::fmt` are
/// attributed to the implementing type's crate.
fn crate_of_symbol(symbol: &str) -> &str {
    let symbol = symbol.trim_start_matches('<');
    let end = symbol
        .find(|c: char| c == ':' || c == ' ' || c == '<' || c == '>')
        .unwrap_or(symbol.len());
    &symbol[..end]
}

impl FramePath {
    fn new(path: BytesOrWideString<'_>) -> Self {
        Self::from_path_str(&path.to_str_lossy())
    }

    fn from_path_str(raw_path: &str) -> Self {
        static REGEXES: OnceLock<[regex::Regex; 2]> = OnceLock::new();
        let [std_regex, registry_regex] = REGEXES.get_or_init(|| {
            [
                // Rust standard library paths:
                // - /lib/rustlib/src/rust/library/{std|core|alloc}/src/...
                // - /rustc/{40-char-hash}/library/{std|core|alloc}/src/...
                regex::Regex::new(
                    r"(?:/lib/rustlib/src/rust|^/rustc/[0-9a-f]{40})/library/((?:std|core|alloc)/src/.*)$",
                )
                .expect("built-in regex pattern for std library paths should be valid"),
                // Cargo registry paths:
                // - /.cargo/registry/src/{index}-{16-char-hash}/{crate}-{version}/src/...
                regex::Regex::new(r"/\.cargo/registry/src/[^/]+-[0-9a-f]{16}/([^/]+/src/.*)$")
                    .expect("built-in regex pattern for cargo registry paths should be valid"),
            ]
        });

        let (prefix_kind, suffix) = if let Some(captures) = std_regex.captures(raw_path) {
            (Some("RUST_SRC"), captures.get(1))
        } else if let Some(captures) = registry_regex.captures(raw_path) {
            (Some("CARGO"), captures.get(1))
        } else {
            (None, None)
        };

        Self {
            raw_path: raw_path.to_string(),
            prefix_kind,
            suffix: suffix.map(|suffix| suffix.as_str().to_string()),
        }
    }
}
