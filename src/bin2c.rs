// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore varname vmsplice

//! Read arbitrary bytes on stdin, write a C/C++ array literal on stdout.
//!
//! The interesting parts live below: [`format`] compiles the per-byte
//! output format at build time, [`streams`] provides double-buffered
//! asynchronous stdin/stdout, and [`transport`] picks the fastest way to
//! move bytes between them for the current process environment.

#[macro_use]
mod macros;

mod args;
mod format;
#[cfg(target_os = "linux")]
mod hugepage;
mod platform;
mod streams;
mod transport;

use std::ffi::OsString;
use std::io;

use clap::error::ErrorKind;
use thiserror::Error;

use crate::args::options;

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;

/// Closing frame of the generated declaration, shared by both languages.
const SUFFIX: &[u8] = b" };\n";

#[derive(Debug, Error)]
pub(crate) enum Bin2cError {
    #[error("no data received, language requires data")]
    NoData,

    #[error("reading standard input failed: {0}")]
    Input(io::Error),

    #[error("writing standard output failed: {0}")]
    Output(io::Error),

    /// Zero-copy handoff to the stdout pipe failed after setup succeeded.
    #[error("splicing to standard output failed: {0}")]
    Splice(io::Error),
}

pub(crate) type Bin2cResult<T> = Result<T, Bin2cError>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Language {
    C,
    Cpp,
}

impl Language {
    /// Opening frame of the generated declaration. C requires the `=`
    /// before the brace initialiser, C++ accepts the brace directly.
    fn prefix(self, varname: &str) -> String {
        match self {
            Self::C => format!("const char {varname}[] = {{ "),
            Self::Cpp => format!("const char {varname}[] {{ "),
        }
    }
}

/// Parse `args` and run the conversion. Returns the process exit code.
///
/// Configuration problems (bad flags, unknown language, missing
/// arguments) report to stderr but still exit successfully; only I/O
/// failures during conversion are fatal.
pub fn run<I>(args: I) -> i32
where
    I: IntoIterator<Item = OsString>,
{
    let args: Vec<OsString> = args.into_iter().collect();

    // `--help` (and its `-h` alias) must stand alone. Handled before
    // clap because clap would happily print help and swallow the extra
    // arguments.
    if args
        .iter()
        .skip(1)
        .any(|arg| matches!(arg.to_str(), Some("--help" | "-h")))
    {
        if args.len() == 2 {
            let _ = args::app().print_long_help();
        } else {
            show_error!("--help does not take any other arguments");
        }
        return EXIT_SUCCESS;
    }

    let matches = match args::app().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return EXIT_SUCCESS;
        }
        Err(e) => {
            let rendered = e.to_string();
            let message = rendered.strip_prefix("error: ").unwrap_or(&rendered);
            show_error!("{}", message.trim_end());
            return EXIT_SUCCESS;
        }
    };

    let language = match matches.get_one::<String>(options::LANGUAGE) {
        Some(lang) if lang == "c" => Language::C,
        Some(_) => Language::Cpp,
        None => {
            show_error!("missing language argument");
            return EXIT_SUCCESS;
        }
    };
    let varname = matches
        .get_one::<String>(options::VARNAME)
        .map(String::as_str)
        .unwrap_or(args::DEFAULT_VARNAME);

    let prefix = language.prefix(varname);
    match transport::run(prefix.as_bytes(), SUFFIX) {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            show_error!("{e}");
            EXIT_FAILURE
        }
    }
}
