// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

// spell-checker:ignore varname

use clap::{crate_version, Arg, ArgAction, Command};

const ABOUT: &str = "Embed arbitrary binary data as a C or C++ source-code array
Reads bytes from standard input and writes the declaration to standard output.";
const USAGE: &str = "bin2c [--varname <NAME>] <LANGUAGE>";

pub const DEFAULT_VARNAME: &str = "data";

pub mod options {
    pub static VARNAME: &str = "varname";
    pub static LANGUAGE: &str = "language";
}

pub fn app() -> Command {
    Command::new("bin2c")
        .version(crate_version!())
        .override_usage(USAGE)
        .about(ABOUT)
        .infer_long_args(true)
        .arg(
            Arg::new(options::VARNAME)
                .long(options::VARNAME)
                .value_name("NAME")
                .help("name of the declared array variable")
                .default_value(DEFAULT_VARNAME)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new(options::LANGUAGE)
                .value_name("LANGUAGE")
                .help("output language for the generated fragment")
                .value_parser(["c", "c++"])
                .required(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_language() {
        let matches = app().try_get_matches_from(["bin2c", "c"]).unwrap();
        assert_eq!(matches.get_one::<String>(options::LANGUAGE).unwrap(), "c");
        assert_eq!(
            matches.get_one::<String>(options::VARNAME).unwrap(),
            DEFAULT_VARNAME
        );
    }

    #[test]
    fn accepts_varname_before_language() {
        let matches = app()
            .try_get_matches_from(["bin2c", "--varname", "blob", "c++"])
            .unwrap();
        assert_eq!(matches.get_one::<String>(options::VARNAME).unwrap(), "blob");
        assert_eq!(matches.get_one::<String>(options::LANGUAGE).unwrap(), "c++");
    }

    #[test]
    fn rejects_unknown_language() {
        assert!(app().try_get_matches_from(["bin2c", "rust"]).is_err());
    }

    #[test]
    fn rejects_missing_language() {
        assert!(app().try_get_matches_from(["bin2c"]).is_err());
    }

    #[test]
    fn rejects_repeated_varname() {
        assert!(app()
            .try_get_matches_from(["bin2c", "--varname", "a", "--varname", "b", "c"])
            .is_err());
    }

    #[test]
    fn rejects_varname_without_value() {
        assert!(app()
            .try_get_matches_from(["bin2c", "c", "--varname"])
            .is_err());
    }
}
